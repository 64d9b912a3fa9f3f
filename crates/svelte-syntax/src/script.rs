//! The script parser seam.
//!
//! Script bodies and template expressions are not parsed by this crate's
//! grammar. They are handed to a [`ScriptParser`], which returns a small tree
//! of region-relative ranges that the bridge splices into the document.
//! [`SwcScriptParser`] is the default implementation.

use std::fmt;

use swc_common::{sync::Lrc, FileName, SourceFile, SourceMap, Spanned};
use swc_ecma_ast::{Expr, ModuleDecl, ModuleItem, Stmt};
use swc_ecma_parser::{lexer::Lexer, EsSyntax, Parser, StringInput, Syntax, TsSyntax};
use text_size::{TextRange, TextSize};
use thiserror::Error;

use crate::SyntaxKind;

/// Language of the script regions of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize), serde(rename_all = "lowercase"))]
pub enum ScriptLang {
    /// JavaScript.
    #[default]
    JavaScript,
    /// TypeScript, selected by `<script lang="ts">`.
    TypeScript,
}

impl ScriptLang {
    /// Maps the value of a `lang` or `type` attribute of a `<script>` tag.
    pub fn from_attribute(name: &str, value: &str) -> Option<Self> {
        let value = value.trim();
        match name {
            "lang" if value == "ts" || value == "typescript" => Some(Self::TypeScript),
            "type" if value.contains("typescript") => Some(Self::TypeScript),
            _ => None,
        }
    }
}

impl fmt::Display for ScriptLang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptLang::JavaScript => write!(f, "js"),
            ScriptLang::TypeScript => write!(f, "ts"),
        }
    }
}

/// Kinds of nodes a script parser may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptNodeKind {
    Program,
    Import,
    Export,
    Declaration,
    Statement,
    Expression,
    Pattern,
}

impl ScriptNodeKind {
    /// The syntax kind the node is spliced in as.
    pub fn syntax_kind(self) -> SyntaxKind {
        match self {
            ScriptNodeKind::Program => SyntaxKind::JS_PROGRAM,
            ScriptNodeKind::Import => SyntaxKind::JS_IMPORT,
            ScriptNodeKind::Export => SyntaxKind::JS_EXPORT,
            ScriptNodeKind::Declaration => SyntaxKind::JS_DECLARATION,
            ScriptNodeKind::Statement => SyntaxKind::JS_STATEMENT,
            ScriptNodeKind::Expression => SyntaxKind::JS_EXPRESSION,
            ScriptNodeKind::Pattern => SyntaxKind::JS_PATTERN,
        }
    }
}

/// A node returned by a script parser. Ranges are relative to the start of
/// the parsed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptTree {
    pub kind: ScriptNodeKind,
    pub range: TextRange,
    pub children: Vec<ScriptTree>,
}

impl ScriptTree {
    /// Creates a node without children.
    pub fn leaf(kind: ScriptNodeKind, range: TextRange) -> Self {
        Self {
            kind,
            range,
            children: Vec::new(),
        }
    }
}

/// A problem the script parser found while still producing a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptDiagnostic {
    pub message: String,
    /// Relative to the start of the parsed text.
    pub range: TextRange,
}

/// A successful script parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOutput {
    pub tree: ScriptTree,
    pub diagnostics: Vec<ScriptDiagnostic>,
}

/// A script parser could not produce any tree for a region.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptFailure {
    /// The parser rejected the text.
    #[error("{message}")]
    Rejected { message: String },

    /// The parser panicked.
    #[error("script parser panicked: {message}")]
    Panicked { message: String },
}

/// Parses the script regions of a component.
///
/// Implementations must be shareable across threads; the document parser
/// calls them synchronously, once per region.
pub trait ScriptParser: Send + Sync {
    /// Parses a whole `<script>` body.
    fn parse_program(&self, text: &str, lang: ScriptLang) -> Result<ScriptOutput, ScriptFailure>;

    /// Parses a single template expression.
    fn parse_expression(&self, text: &str, lang: ScriptLang) -> Result<ScriptOutput, ScriptFailure>;

    /// Parses a destructuring pattern or a parameter list, as found in each
    /// items, await values and snippet parameters.
    fn parse_binding(&self, text: &str, lang: ScriptLang) -> Result<ScriptOutput, ScriptFailure>;

    /// Parses the declarators of a `{@const ...}` tag, such as
    /// `doubled: number = item * 2`.
    fn parse_declaration(
        &self,
        text: &str,
        lang: ScriptLang,
    ) -> Result<ScriptOutput, ScriptFailure>;
}

/// A [`ScriptParser`] backed by `swc_ecma_parser`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SwcScriptParser;

impl SwcScriptParser {
    pub fn new() -> Self {
        Self
    }
}

/// A source file registered in a fresh source map.
struct SwcSource {
    _cm: Lrc<SourceMap>,
    fm: Lrc<SourceFile>,
}

impl SwcSource {
    fn new(text: &str) -> Self {
        let cm: Lrc<SourceMap> = Default::default();
        let fm = cm.new_source_file(
            FileName::Custom("svelte-script".into()).into(),
            text.to_string(),
        );
        Self { _cm: cm, fm }
    }

    fn parser(&self, lang: ScriptLang) -> Parser<Lexer<'_>> {
        let lexer = Lexer::new(
            syntax_for(lang),
            Default::default(),
            StringInput::from(&*self.fm),
            None,
        );
        Parser::new_from(lexer)
    }

    /// Converts an swc span to a range relative to the text, shifted by
    /// `-shift` and clamped to `[0, len]`.
    fn range(&self, span: swc_common::Span, shift: u32, len: u32) -> TextRange {
        let base = self.fm.start_pos.0 + shift;
        let start = span.lo.0.saturating_sub(base).min(len);
        let end = span.hi.0.saturating_sub(base).clamp(start, len);
        TextRange::new(TextSize::from(start), TextSize::from(end))
    }

    fn diagnostic(
        &self,
        error: &swc_ecma_parser::error::Error,
        shift: u32,
        len: u32,
    ) -> ScriptDiagnostic {
        ScriptDiagnostic {
            message: error.kind().msg().to_string(),
            range: self.range(error.span(), shift, len),
        }
    }
}

fn syntax_for(lang: ScriptLang) -> Syntax {
    match lang {
        ScriptLang::JavaScript => Syntax::Es(EsSyntax {
            jsx: false,
            ..Default::default()
        }),
        ScriptLang::TypeScript => Syntax::Typescript(TsSyntax {
            tsx: false,
            ..Default::default()
        }),
    }
}

fn text_len(text: &str) -> u32 {
    text.len() as u32
}

fn full_range(text: &str) -> TextRange {
    TextRange::up_to(TextSize::from(text_len(text)))
}

fn item_kind(item: &ModuleItem) -> ScriptNodeKind {
    match item {
        ModuleItem::ModuleDecl(ModuleDecl::Import(_)) => ScriptNodeKind::Import,
        ModuleItem::ModuleDecl(_) => ScriptNodeKind::Export,
        ModuleItem::Stmt(Stmt::Decl(_)) => ScriptNodeKind::Declaration,
        ModuleItem::Stmt(_) => ScriptNodeKind::Statement,
    }
}

impl ScriptParser for SwcScriptParser {
    fn parse_program(&self, text: &str, lang: ScriptLang) -> Result<ScriptOutput, ScriptFailure> {
        let source = SwcSource::new(text);
        let len = text_len(text);
        let mut parser = source.parser(lang);

        let (children, mut diagnostics) = match parser.parse_module() {
            Ok(module) => (
                module
                    .body
                    .iter()
                    .map(|item| {
                        ScriptTree::leaf(item_kind(item), source.range(item.span(), 0, len))
                    })
                    .collect(),
                Vec::new(),
            ),
            Err(error) => (Vec::new(), vec![source.diagnostic(&error, 0, len)]),
        };
        diagnostics.extend(
            parser
                .take_errors()
                .iter()
                .map(|error| source.diagnostic(error, 0, len)),
        );

        Ok(ScriptOutput {
            tree: ScriptTree {
                kind: ScriptNodeKind::Program,
                range: full_range(text),
                children,
            },
            diagnostics,
        })
    }

    fn parse_expression(
        &self,
        text: &str,
        lang: ScriptLang,
    ) -> Result<ScriptOutput, ScriptFailure> {
        let source = SwcSource::new(text);
        let len = text_len(text);
        let mut parser = source.parser(lang);

        let mut diagnostics = Vec::new();
        match parser.parse_expr() {
            Ok(expr) => {
                let range = source.range(expr.span(), 0, len);
                let rest = &text[usize::from(range.end())..];
                let trimmed = rest.trim_start();
                if !trimmed.is_empty() && !trimmed.starts_with("//") && !trimmed.starts_with("/*")
                {
                    let start = len - text_len(trimmed);
                    diagnostics.push(ScriptDiagnostic {
                        message: "Unexpected token".to_string(),
                        range: TextRange::new(TextSize::from(start), TextSize::from(len)),
                    });
                }
            }
            Err(error) => diagnostics.push(source.diagnostic(&error, 0, len)),
        }
        diagnostics.extend(
            parser
                .take_errors()
                .iter()
                .map(|error| source.diagnostic(error, 0, len)),
        );

        Ok(ScriptOutput {
            tree: ScriptTree::leaf(ScriptNodeKind::Expression, full_range(text)),
            diagnostics,
        })
    }

    fn parse_binding(&self, text: &str, lang: ScriptLang) -> Result<ScriptOutput, ScriptFailure> {
        // Patterns are parsed as the parameter list of an arrow function.
        let wrapped = format!("({text}) => 0");
        let source = SwcSource::new(&wrapped);
        let len = text_len(text);
        let mut parser = source.parser(lang);

        let mut diagnostics = Vec::new();
        match parser.parse_expr() {
            Ok(expr) => {
                let Expr::Arrow(arrow) = &*expr else {
                    return Err(ScriptFailure::Rejected {
                        message: "expected a binding pattern".to_string(),
                    });
                };
                let whole = arrow.span();
                if whole.hi.0.saturating_sub(whole.lo.0) != text_len(&wrapped) {
                    return Err(ScriptFailure::Rejected {
                        message: "expected a binding pattern".to_string(),
                    });
                }
            }
            Err(error) => diagnostics.push(source.diagnostic(&error, 1, len)),
        }
        diagnostics.extend(
            parser
                .take_errors()
                .iter()
                .map(|error| source.diagnostic(error, 1, len)),
        );

        Ok(ScriptOutput {
            tree: ScriptTree::leaf(ScriptNodeKind::Pattern, full_range(text)),
            diagnostics,
        })
    }

    fn parse_declaration(
        &self,
        text: &str,
        lang: ScriptLang,
    ) -> Result<ScriptOutput, ScriptFailure> {
        // Declarators are parsed as the body of a `const` statement.
        const PREFIX: &str = "const ";
        let wrapped = format!("{PREFIX}{text};");
        let source = SwcSource::new(&wrapped);
        let shift = text_len(PREFIX);
        let len = text_len(text);
        let mut parser = source.parser(lang);

        let mut diagnostics = Vec::new();
        match parser.parse_module() {
            Ok(module) => {
                let trailing = module
                    .body
                    .iter()
                    .skip(1)
                    .map(|item| source.range(item.span(), shift, len))
                    .find(|range| range.start() < TextSize::from(len));
                if let Some(range) = trailing {
                    diagnostics.push(ScriptDiagnostic {
                        message: "Unexpected token".to_string(),
                        range: TextRange::new(range.start(), TextSize::from(len)),
                    });
                }
            }
            Err(error) => diagnostics.push(source.diagnostic(&error, shift, len)),
        }
        diagnostics.extend(
            parser
                .take_errors()
                .iter()
                .map(|error| source.diagnostic(error, shift, len)),
        );

        Ok(ScriptOutput {
            tree: ScriptTree::leaf(ScriptNodeKind::Declaration, full_range(text)),
            diagnostics,
        })
    }
}
