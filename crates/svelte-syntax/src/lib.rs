//! Lossless Svelte 5 component parser.
//!
//! This crate provides:
//! - A mode-stack lexer (tokenizer) using `logos` for markup and tag interiors
//! - A recursive descent parser building a `rowan` concrete syntax tree that
//!   covers every byte of the input
//! - Delegation of script bodies and template expressions to a pluggable
//!   [`ScriptParser`] (`swc` by default), spliced back into the tree
//! - A typed AST for all Svelte constructs
//! - Error recovery: parsing never fails, errors are reported alongside
//!
//! # Example
//!
//! ```
//! use svelte_syntax::parse;
//!
//! let source = r#"
//! <script>
//!     let count = $state(0);
//! </script>
//!
//! <button onclick={() => count++}>
//!     Count: {count}
//! </button>
//! "#;
//!
//! let result = parse(source);
//! assert!(result.errors().is_empty());
//! assert_eq!(result.syntax().text().to_string(), source);
//! ```

pub mod ast;
mod bridge;
mod error;
mod lexer;
mod parser;
mod scan;
mod script;
mod syntax_kind;

use std::fmt::Write;

use rowan::GreenNode;
use tracing::debug_span;

pub use ast::SvelteDocument;
pub use error::{ParseError, ParseErrorKind, Severity};
pub use lexer::{tokenize, tokenize_with, LexMode, Lexer, Token};
pub use parser::MAX_NESTING_DEPTH;
pub use script::{
    ScriptDiagnostic, ScriptFailure, ScriptLang, ScriptNodeKind, ScriptOutput, ScriptParser,
    ScriptTree, SwcScriptParser,
};
pub use source_map::Span;
pub use syntax_kind::{SvelteLanguage, SyntaxElement, SyntaxKind, SyntaxNode, SyntaxToken};

/// Options for parsing Svelte files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseConfig {
    /// Lexer mode at the start of the input. `Script` and `Style` parse a
    /// bare script or style body.
    pub start_mode: LexMode,
    /// Script language. Detected from the `lang` attribute of the first
    /// `<script>` tag when `None`.
    pub lang: Option<ScriptLang>,
    /// Whether embedded regions are handed to the script parser. When off
    /// they are kept as opaque text.
    pub delegate: bool,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            start_mode: LexMode::Markup,
            lang: None,
            delegate: true,
        }
    }
}

/// The result of parsing a Svelte file.
///
/// The tree always covers the whole input, whatever errors were found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parse {
    green: GreenNode,
    errors: Vec<ParseError>,
}

impl Parse {
    /// The root of the concrete syntax tree.
    pub fn syntax(&self) -> SyntaxNode {
        SyntaxNode::new_root(self.green.clone())
    }

    /// The underlying green tree.
    pub fn green(&self) -> &GreenNode {
        &self.green
    }

    /// Errors found while parsing, ordered by position.
    pub fn errors(&self) -> &[ParseError] {
        &self.errors
    }

    /// The innermost node covering the span of `error`.
    pub fn error_node(&self, error: &ParseError) -> SyntaxNode {
        let root = self.syntax();
        let range = error.span.to_range();
        if !root.text_range().contains_range(range) {
            return root;
        }
        match root.covering_element(range) {
            rowan::NodeOrToken::Node(node) => node,
            rowan::NodeOrToken::Token(token) => token.parent().unwrap_or(root),
        }
    }

    /// Builds the typed AST.
    pub fn document(&self) -> SvelteDocument {
        ast::build(&self.syntax())
    }

    /// Renders the tree as an indented dump, one node or token per line.
    ///
    /// ```
    /// let tree = svelte_syntax::parse("<b>x</b>").debug_tree();
    /// assert!(tree.starts_with("DOCUMENT@0..8\n  ELEMENT@0..8\n"));
    /// ```
    pub fn debug_tree(&self) -> String {
        let mut out = String::new();
        let mut depth = 0usize;
        for event in self.syntax().preorder_with_tokens() {
            match event {
                rowan::WalkEvent::Enter(element) => {
                    let range = element.text_range();
                    let _ = write!(
                        out,
                        "{:indent$}{:?}@{}..{}",
                        "",
                        element.kind(),
                        u32::from(range.start()),
                        u32::from(range.end()),
                        indent = depth * 2
                    );
                    if let rowan::NodeOrToken::Token(token) = &element {
                        let _ = write!(out, " {:?}", token.text());
                    }
                    out.push('\n');
                    depth += 1;
                }
                rowan::WalkEvent::Leave(_) => depth -= 1,
            }
        }
        out
    }
}

/// Parses a Svelte component with the default configuration and the `swc`
/// script parser.
pub fn parse(source: &str) -> Parse {
    parse_with(source, &ParseConfig::default(), &SwcScriptParser)
}

/// Parses `source` with an explicit configuration and script parser.
pub fn parse_with(source: &str, config: &ParseConfig, scripts: &dyn ScriptParser) -> Parse {
    let span = debug_span!("parse", len = source.len(), mode = ?config.start_mode);
    let _enter = span.enter();

    let (green, mut errors) = parser::Parser::new(source, config, scripts).parse();
    errors.sort_by_key(|error| (error.span.start, error.span.end));
    tracing::debug!(errors = errors.len(), "parsed");
    Parse { green, errors }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_empty() {
        let result = parse("");
        assert!(result.errors().is_empty());
        assert_eq!(result.debug_tree(), "DOCUMENT@0..0\n");
    }

    #[test]
    fn test_errors_are_sorted() {
        let result = parse("<a>{#if x}</b>");
        let starts: Vec<_> = result.errors().iter().map(|e| e.span.start).collect();
        let mut sorted = starts.clone();
        sorted.sort();
        assert_eq!(starts, sorted);
        assert_eq!(result.errors().len(), 3);
    }

    #[test]
    fn test_error_node() {
        let result = parse("<div><span></div>");
        let error = &result.errors()[0];
        let node = result.error_node(error);
        assert_eq!(node.kind(), SyntaxKind::START_TAG);
        assert_eq!(node.text().to_string(), "<span>");
    }

    #[test]
    fn test_error_node_for_unmatched_close() {
        let result = parse("x</p>");
        let node = result.error_node(&result.errors()[0]);
        assert_eq!(node.kind(), SyntaxKind::END_TAG);
        assert_eq!(node.parent().unwrap().kind(), SyntaxKind::ERROR);
    }

    #[test]
    fn test_debug_tree_format() {
        let tree = parse("<b>{x}</b>").debug_tree();
        let lines: Vec<_> = tree.lines().take(6).collect();
        assert_eq!(
            lines,
            vec![
                "DOCUMENT@0..10",
                "  ELEMENT@0..10",
                "    START_TAG@0..3",
                "      L_ANGLE@0..1 \"<\"",
                "      NAME@1..2 \"b\"",
                "      R_ANGLE@2..3 \">\"",
            ]
        );
    }

    #[test]
    fn test_style_start_mode() {
        let config = ParseConfig {
            start_mode: LexMode::Style,
            ..ParseConfig::default()
        };
        let result = parse_with("p { color: red }", &config, &SwcScriptParser);
        assert!(result.errors().is_empty());
        let body = result.syntax().first_child().unwrap();
        assert_eq!(body.kind(), SyntaxKind::STYLE_CONTENT);
    }

    #[test]
    fn test_script_start_mode() {
        let config = ParseConfig {
            start_mode: LexMode::Script,
            ..ParseConfig::default()
        };
        let result = parse_with("const a = 1;", &config, &SwcScriptParser);
        assert!(result.errors().is_empty());
        assert!(result
            .syntax()
            .descendants()
            .any(|n| n.kind() == SyntaxKind::JS_PROGRAM));
    }

    #[test]
    fn test_language_override() {
        let config = ParseConfig {
            lang: Some(ScriptLang::TypeScript),
            ..ParseConfig::default()
        };
        let result = parse_with("{value as string}", &config, &SwcScriptParser);
        assert!(result.errors().is_empty(), "{:?}", result.errors());
    }

    #[test]
    fn test_parse_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Parse>();
        assert_send_sync::<SwcScriptParser>();
    }
}
