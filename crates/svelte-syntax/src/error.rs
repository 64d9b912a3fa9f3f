//! Parse error types.

use smol_str::SmolStr;
use source_map::Span;
use thiserror::Error;

/// How bad an error is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize), serde(rename_all = "lowercase"))]
pub enum Severity {
    /// The tree is complete and navigable despite the error.
    Recoverable,
    /// The input could not be tokenized. The lexer accepts any text, so a
    /// parse never reports this.
    Fatal,
}

/// An error that occurred during parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}")]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ParseError {
    /// The kind of error.
    pub kind: ParseErrorKind,
    /// The location in the source where the error occurred.
    pub span: Span,
    /// How bad the error is.
    pub severity: Severity,
}

impl ParseError {
    /// Creates a new recoverable parse error.
    pub fn new(kind: ParseErrorKind, span: Span) -> Self {
        Self {
            kind,
            span,
            severity: Severity::Recoverable,
        }
    }

    /// Returns true unless the error is fatal.
    pub fn is_recoverable(&self) -> bool {
        self.severity == Severity::Recoverable
    }
}

/// The kind of parse error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize), serde(tag = "type"))]
pub enum ParseErrorKind {
    /// An element was still open when its parent or the input ended.
    #[error("unclosed tag: <{name}>")]
    UnclosedTag {
        /// The name of the unclosed element.
        name: SmolStr,
    },

    /// A closing tag with no matching open element.
    #[error("unmatched closing tag: </{name}>")]
    UnmatchedClosingTag {
        /// The name in the closing tag.
        name: SmolStr,
    },

    /// `<!--` without `-->`.
    #[error("unterminated comment")]
    UnterminatedComment,

    /// A tag without its closing `>`.
    #[error("unterminated tag: <{name}")]
    UnterminatedTag {
        /// The tag name, empty if missing.
        name: SmolStr,
    },

    /// A quoted attribute value without its closing quote.
    #[error("unterminated attribute value")]
    UnterminatedAttributeValue,

    /// `=` not followed by a value.
    #[error("expected attribute value after '='")]
    ExpectedAttributeValue,

    /// A character that cannot appear inside a tag.
    #[error("unexpected '{text}' in tag")]
    UnexpectedTagContent {
        /// The offending text.
        text: SmolStr,
    },

    /// `<script` inside a script body.
    #[error("<script> cannot be nested inside <script>")]
    NestedScriptTag,

    /// A script or style body without its closing tag.
    #[error("unterminated <{name}> body")]
    UnterminatedRawText {
        /// `script` or `style`.
        name: SmolStr,
    },

    /// A block was still open when its parent or the input ended.
    #[error("unclosed block: {{#{block}}}")]
    UnclosedBlock {
        /// The block keyword.
        block: SmolStr,
    },

    /// `{/kind}` with no matching open block.
    #[error("unmatched block close: {{/{block}}}")]
    UnmatchedBlockClose {
        /// The block keyword.
        block: SmolStr,
    },

    /// A continuation that the enclosing block does not accept.
    #[error("{{:{clause}}} is not valid inside {{#{block}}}")]
    InvalidBlockContinuation {
        /// The continuation keyword, `else if` included.
        clause: SmolStr,
        /// The enclosing block keyword.
        block: SmolStr,
    },

    /// A continuation outside of any block.
    #[error("{{:{clause}}} must be inside a block")]
    ContinuationOutsideBlock {
        /// The continuation keyword.
        clause: SmolStr,
    },

    /// `{#name}` where `name` is not a block keyword.
    #[error("unknown block type: {{#{name}}}")]
    UnknownBlock {
        /// The keyword found, empty if missing.
        name: SmolStr,
    },

    /// `{@name}` where `name` is not a special tag.
    #[error("unknown special tag: {{@{name}}}")]
    UnknownSpecialTag {
        /// The keyword found, empty if missing.
        name: SmolStr,
    },

    /// Text after a block tag that takes no expression, such as `{:else}`
    /// or `{/if}`.
    #[error("unexpected text in {{{tag}}}")]
    UnexpectedBlockText {
        /// The tag without braces, e.g. `/if`.
        tag: SmolStr,
    },

    /// A mustache without its closing `}`.
    #[error("unterminated mustache")]
    UnterminatedMustache,

    /// A mustache or block header that needs an expression has none.
    #[error("expected an expression")]
    EmptyExpression,

    /// Whitespace between a mustache sigil and its keyword.
    #[error("whitespace is not allowed after '{sigil}'")]
    WhitespaceNotAllowed {
        /// The sigil.
        sigil: char,
    },

    /// An element or block opened with too many others already open. It is
    /// kept without children.
    #[error("nesting is deeper than {limit} elements and blocks")]
    NestingTooDeep {
        /// The maximum depth.
        limit: usize,
    },

    /// The index of an each block is not an identifier.
    #[error("expected an identifier for the each index, found '{text}'")]
    InvalidEachIndex {
        /// The index text.
        text: SmolStr,
    },

    /// A diagnostic reported by the script parser.
    #[error("{message}")]
    ScriptSyntax {
        /// The script parser's message.
        message: String,
    },

    /// The script parser failed on a whole region.
    #[error("script region could not be parsed: {message}")]
    DelegationFailed {
        /// Why the region failed.
        message: String,
    },
}

impl ParseErrorKind {
    /// A stable snake_case identifier for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnclosedTag { .. } => "unclosed_tag",
            Self::UnmatchedClosingTag { .. } => "unmatched_closing_tag",
            Self::UnterminatedComment => "unterminated_comment",
            Self::UnterminatedTag { .. } => "unterminated_tag",
            Self::UnterminatedAttributeValue => "unterminated_attribute_value",
            Self::ExpectedAttributeValue => "expected_attribute_value",
            Self::UnexpectedTagContent { .. } => "unexpected_tag_content",
            Self::NestedScriptTag => "nested_script_tag",
            Self::UnterminatedRawText { .. } => "unterminated_raw_text",
            Self::UnclosedBlock { .. } => "unclosed_block",
            Self::UnmatchedBlockClose { .. } => "unmatched_block_close",
            Self::InvalidBlockContinuation { .. } => "invalid_block_continuation",
            Self::ContinuationOutsideBlock { .. } => "continuation_outside_block",
            Self::UnknownBlock { .. } => "unknown_block",
            Self::UnknownSpecialTag { .. } => "unknown_special_tag",
            Self::UnexpectedBlockText { .. } => "unexpected_block_text",
            Self::UnterminatedMustache => "unterminated_mustache",
            Self::EmptyExpression => "empty_expression",
            Self::WhitespaceNotAllowed { .. } => "whitespace_not_allowed",
            Self::NestingTooDeep { .. } => "nesting_too_deep",
            Self::InvalidEachIndex { .. } => "invalid_each_index",
            Self::ScriptSyntax { .. } => "script_syntax",
            Self::DelegationFailed { .. } => "delegation_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ParseError::new(
            ParseErrorKind::UnclosedTag {
                name: "span".into(),
            },
            Span::from_usize(5, 11),
        );
        assert_eq!(error.to_string(), "unclosed tag: <span>");
        assert!(error.is_recoverable());
    }

    #[test]
    fn test_block_messages_escape_braces() {
        let kind = ParseErrorKind::InvalidBlockContinuation {
            clause: "then".into(),
            block: "if".into(),
        };
        assert_eq!(kind.to_string(), "{:then} is not valid inside {#if}");
        let kind = ParseErrorKind::UnknownBlock { name: "iff".into() };
        assert_eq!(kind.to_string(), "unknown block type: {#iff}");
        let kind = ParseErrorKind::UnexpectedBlockText { tag: "/if".into() };
        assert_eq!(kind.to_string(), "unexpected text in {/if}");
        assert_eq!(kind.code(), "unexpected_block_text");
    }
}
