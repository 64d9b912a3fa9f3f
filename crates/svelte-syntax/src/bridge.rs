//! Splices script parser output into the document tree.
//!
//! A delegated region always ends up covering exactly its own text: gaps
//! between returned children are filled with leaf tokens and children whose
//! ranges are out of order, overlapping or out of bounds are degraded to
//! plain text. A failed region becomes a single `ERROR` node holding one
//! opaque token.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use rowan::GreenNodeBuilder;
use source_map::Span;
use tracing::{debug, trace};

use crate::error::{ParseError, ParseErrorKind};
use crate::script::{ScriptFailure, ScriptLang, ScriptOutput, ScriptParser, ScriptTree};
use crate::SyntaxKind;

/// What a region contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RegionKind {
    Program,
    Expression,
    Binding,
    /// The body of `{@const ...}`.
    Declaration,
}

/// Hands regions to the injected script parser.
pub(crate) struct Bridge<'p> {
    parser: &'p dyn ScriptParser,
    lang: ScriptLang,
    enabled: bool,
}

impl<'p> Bridge<'p> {
    pub fn new(parser: &'p dyn ScriptParser, lang: ScriptLang, enabled: bool) -> Self {
        Self {
            parser,
            lang,
            enabled,
        }
    }

    /// Emits the subtree for `source[region]` into `builder`.
    pub fn splice(
        &self,
        builder: &mut GreenNodeBuilder<'static>,
        errors: &mut Vec<ParseError>,
        source: &str,
        region: Span,
        kind: RegionKind,
    ) {
        let text = &source[region.start_usize()..region.end_usize()];
        if !self.enabled {
            builder.token(SyntaxKind::JS_TEXT.into(), text);
            return;
        }

        match self.run(text, kind) {
            Ok(output) => {
                trace!(
                    ?kind,
                    ?region,
                    children = output.tree.children.len(),
                    "splicing script tree"
                );
                emit_tree(builder, text, &output.tree, 0, text.len());
                let bounds = Span::from_usize(0, text.len());
                errors.extend(output.diagnostics.into_iter().map(|diagnostic| {
                    ParseError::new(
                        ParseErrorKind::ScriptSyntax {
                            message: diagnostic.message,
                        },
                        Span::from(diagnostic.range).clamp(bounds).shift(region.start),
                    )
                }));
            }
            Err(failure) => {
                debug!(?kind, ?region, %failure, "script delegation failed");
                builder.start_node(SyntaxKind::ERROR.into());
                builder.token(SyntaxKind::JS_TEXT.into(), text);
                builder.finish_node();
                errors.push(ParseError::new(
                    ParseErrorKind::DelegationFailed {
                        message: failure.to_string(),
                    },
                    region,
                ));
            }
        }
    }

    fn run(&self, text: &str, kind: RegionKind) -> Result<ScriptOutput, ScriptFailure> {
        let result = panic::catch_unwind(AssertUnwindSafe(|| match kind {
            RegionKind::Program => self.parser.parse_program(text, self.lang),
            RegionKind::Expression => self.parser.parse_expression(text, self.lang),
            RegionKind::Binding => self.parser.parse_binding(text, self.lang),
            RegionKind::Declaration => self.parser.parse_declaration(text, self.lang),
        }));
        result.unwrap_or_else(|payload| {
            Err(ScriptFailure::Panicked {
                message: panic_message(payload.as_ref()),
            })
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Emits `tree` as a node covering `text[start..end]`, whatever range the
/// tree itself claims.
fn emit_tree(
    builder: &mut GreenNodeBuilder<'static>,
    text: &str,
    tree: &ScriptTree,
    start: usize,
    end: usize,
) {
    builder.start_node(tree.kind.syntax_kind().into());
    let mut cursor = start;
    for child in &tree.children {
        let child_start = usize::from(child.range.start());
        let child_end = usize::from(child.range.end());
        let well_formed = cursor <= child_start
            && child_start < child_end
            && child_end <= end
            && text.is_char_boundary(child_start)
            && text.is_char_boundary(child_end);
        if !well_formed {
            trace!(?child.kind, ?child.range, cursor, end, "skipping ill-formed script node");
            continue;
        }
        fill(builder, &text[cursor..child_start]);
        emit_tree(builder, text, child, child_start, child_end);
        cursor = child_end;
    }
    fill(builder, &text[cursor..end]);
    builder.finish_node();
}

/// Emits `gap` as alternating whitespace and `JS_TEXT` tokens.
fn fill(builder: &mut GreenNodeBuilder<'static>, mut gap: &str) {
    while !gap.is_empty() {
        let ws = gap.len() - gap.trim_start().len();
        let (kind, len) = if ws > 0 {
            (SyntaxKind::WHITESPACE, ws)
        } else {
            let len = gap
                .char_indices()
                .find(|(_, c)| c.is_whitespace())
                .map_or(gap.len(), |(i, _)| i);
            (SyntaxKind::JS_TEXT, len)
        };
        builder.token(kind.into(), &gap[..len]);
        gap = &gap[len..];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{ScriptDiagnostic, ScriptNodeKind};
    use crate::SyntaxNode;
    use text_size::TextRange;

    /// Returns a fixed output for every region.
    struct Canned(Result<ScriptOutput, ScriptFailure>);

    impl ScriptParser for Canned {
        fn parse_program(&self, _: &str, _: ScriptLang) -> Result<ScriptOutput, ScriptFailure> {
            self.0.clone()
        }
        fn parse_expression(&self, _: &str, _: ScriptLang) -> Result<ScriptOutput, ScriptFailure> {
            self.0.clone()
        }
        fn parse_binding(&self, _: &str, _: ScriptLang) -> Result<ScriptOutput, ScriptFailure> {
            self.0.clone()
        }
        fn parse_declaration(&self, _: &str, _: ScriptLang) -> Result<ScriptOutput, ScriptFailure> {
            self.0.clone()
        }
    }

    struct Panics;

    impl ScriptParser for Panics {
        fn parse_program(&self, _: &str, _: ScriptLang) -> Result<ScriptOutput, ScriptFailure> {
            panic!("boom")
        }
        fn parse_expression(&self, _: &str, _: ScriptLang) -> Result<ScriptOutput, ScriptFailure> {
            panic!("boom")
        }
        fn parse_binding(&self, _: &str, _: ScriptLang) -> Result<ScriptOutput, ScriptFailure> {
            panic!("boom")
        }
        fn parse_declaration(&self, _: &str, _: ScriptLang) -> Result<ScriptOutput, ScriptFailure> {
            panic!("boom")
        }
    }

    fn range(start: u32, end: u32) -> TextRange {
        TextRange::new(start.into(), end.into())
    }

    fn splice_with(
        parser: &dyn ScriptParser,
        source: &str,
        region: Span,
    ) -> (SyntaxNode, Vec<ParseError>) {
        let mut builder = GreenNodeBuilder::new();
        let mut errors = Vec::new();
        builder.start_node(SyntaxKind::EXPRESSION.into());
        Bridge::new(parser, ScriptLang::JavaScript, true).splice(
            &mut builder,
            &mut errors,
            source,
            region,
            RegionKind::Program,
        );
        builder.finish_node();
        (SyntaxNode::new_root(builder.finish()), errors)
    }

    #[test]
    fn test_gaps_are_filled() {
        let source = "xx a; b; yy";
        let output = ScriptOutput {
            tree: ScriptTree {
                kind: ScriptNodeKind::Program,
                range: range(0, 6),
                children: vec![
                    ScriptTree::leaf(ScriptNodeKind::Statement, range(1, 3)),
                    ScriptTree::leaf(ScriptNodeKind::Statement, range(4, 6)),
                ],
            },
            diagnostics: vec![],
        };
        let (root, errors) = splice_with(&Canned(Ok(output)), source, Span::from_usize(2, 9));
        assert!(errors.is_empty());

        let program = root.first_child().unwrap();
        assert_eq!(program.kind(), SyntaxKind::JS_PROGRAM);
        assert_eq!(program.text().to_string(), " a; b; ");
        let statements: Vec<_> = program.children().map(|n| n.text().to_string()).collect();
        assert_eq!(statements, vec!["a;", "b;"]);
    }

    #[test]
    fn test_ill_formed_children_become_text() {
        let source = "abcdef";
        let output = ScriptOutput {
            tree: ScriptTree {
                kind: ScriptNodeKind::Program,
                range: range(0, 6),
                children: vec![
                    ScriptTree::leaf(ScriptNodeKind::Statement, range(2, 4)),
                    // overlaps the previous child
                    ScriptTree::leaf(ScriptNodeKind::Statement, range(3, 5)),
                    // out of bounds
                    ScriptTree::leaf(ScriptNodeKind::Statement, range(5, 40)),
                ],
            },
            diagnostics: vec![],
        };
        let (root, _) = splice_with(&Canned(Ok(output)), source, Span::from_usize(0, 6));
        assert_eq!(root.text().to_string(), source);
        let program = root.first_child().unwrap();
        assert_eq!(program.children().count(), 1);
    }

    #[test]
    fn test_diagnostics_are_absolute_and_clamped() {
        let output = ScriptOutput {
            tree: ScriptTree::leaf(ScriptNodeKind::Program, range(0, 3)),
            diagnostics: vec![ScriptDiagnostic {
                message: "Unexpected token".to_string(),
                range: range(1, 99),
            }],
        };
        let (_, errors) = splice_with(&Canned(Ok(output)), "<<abc>>", Span::from_usize(2, 5));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].span, Span::from_usize(3, 5));
    }

    #[test]
    fn test_failure_becomes_error_node() {
        let failure = ScriptFailure::Rejected {
            message: "nope".to_string(),
        };
        let (root, errors) = splice_with(&Canned(Err(failure)), "let x", Span::from_usize(0, 5));
        let error = root.first_child().unwrap();
        assert_eq!(error.kind(), SyntaxKind::ERROR);
        assert_eq!(error.text().to_string(), "let x");
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0].kind, ParseErrorKind::DelegationFailed { .. }));
    }

    #[test]
    fn test_panic_is_contained() {
        let (root, errors) = splice_with(&Panics, "x", Span::from_usize(0, 1));
        assert_eq!(root.first_child().unwrap().kind(), SyntaxKind::ERROR);
        assert_eq!(
            errors[0].kind,
            ParseErrorKind::DelegationFailed {
                message: "script parser panicked: boom".to_string()
            }
        );
    }

    #[test]
    fn test_fill_splits_whitespace() {
        let mut builder = GreenNodeBuilder::new();
        builder.start_node(SyntaxKind::JS_PROGRAM.into());
        fill(&mut builder, " a  b\n");
        builder.finish_node();
        let root = SyntaxNode::new_root(builder.finish());
        let kinds: Vec<_> = root
            .children_with_tokens()
            .map(|t| t.kind())
            .collect();
        assert_eq!(
            kinds,
            vec![
                SyntaxKind::WHITESPACE,
                SyntaxKind::JS_TEXT,
                SyntaxKind::WHITESPACE,
                SyntaxKind::JS_TEXT,
                SyntaxKind::WHITESPACE,
            ]
        );
    }
}
