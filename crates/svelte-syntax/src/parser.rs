//! Recursive descent parser building the lossless syntax tree.
//!
//! The parser walks the token stream once and emits every token into a
//! `rowan` green tree, so the tree always covers the input exactly. Open
//! elements and blocks are tracked on a frame stack: a closing tag or block
//! close that matches an outer frame closes the inner ones, which are
//! reported as unclosed. Anything that fits nowhere is wrapped in an `ERROR`
//! node.
//!
//! Expression text inside mustaches is split into the pieces of the block
//! header it belongs to (`items as item, i (key)`, `promise then value`, ...)
//! and each piece is handed to the script bridge.

use rowan::{GreenNode, GreenNodeBuilder};
use smol_str::SmolStr;
use source_map::Span;
use tracing::trace;

use crate::bridge::{Bridge, RegionKind};
use crate::error::{ParseError, ParseErrorKind};
use crate::lexer::{self, LexMode, RawTextKind, Token};
use crate::scan;
use crate::script::{ScriptLang, ScriptParser};
use crate::{ParseConfig, SyntaxKind, SyntaxKind::*};

/// HTML void elements that are self-closing and should not have closing tags.
/// See: https://developer.mozilla.org/en-US/docs/Glossary/Void_element
const HTML_VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Open elements and blocks beyond this depth are flattened.
pub const MAX_NESTING_DEPTH: usize = 256;

/// Returns true if the given element name is an HTML void element.
fn is_void_element(name: &str) -> bool {
    HTML_VOID_ELEMENTS.contains(&name)
}

/// The five kinds of template blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum BlockKind {
    If,
    Each,
    Await,
    Key,
    Snippet,
}

impl BlockKind {
    pub(crate) fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "if" => Some(Self::If),
            "each" => Some(Self::Each),
            "await" => Some(Self::Await),
            "key" => Some(Self::Key),
            "snippet" => Some(Self::Snippet),
            _ => None,
        }
    }

    pub(crate) fn keyword(self) -> &'static str {
        match self {
            Self::If => "if",
            Self::Each => "each",
            Self::Await => "await",
            Self::Key => "key",
            Self::Snippet => "snippet",
        }
    }

    fn node(self) -> SyntaxKind {
        match self {
            Self::If => IF_BLOCK,
            Self::Each => EACH_BLOCK,
            Self::Await => AWAIT_BLOCK,
            Self::Key => KEY_BLOCK,
            Self::Snippet => SNIPPET_BLOCK,
        }
    }

    /// Whether `{:clause}` may continue this block.
    fn accepts(self, clause: &str) -> bool {
        matches!(
            (self, clause),
            (Self::If, "else" | "else if") | (Self::Each, "else") | (Self::Await, "then" | "catch")
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Frame {
    Element(SmolStr),
    Block(BlockKind),
}

/// Why a run of content ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Eof,
    /// A closing tag matching an open element.
    EndTag,
    /// `{:...}` while a block is open.
    BlockClause,
    /// `{/kind}` matching an open block.
    BlockClose,
}

struct StartTag {
    name: SmolStr,
    span: Span,
    self_closing: bool,
    terminated: bool,
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// Finds the script language from the `lang` or `type` attribute of the
/// first `<script>` tag that has one.
fn detect_lang(tokens: &[Token<'_>]) -> ScriptLang {
    let mut in_script = false;
    let mut attribute = "";
    for (i, token) in tokens.iter().enumerate() {
        match token.kind {
            NAME if i > 0 && tokens[i - 1].kind == L_ANGLE => {
                in_script = token.text.eq_ignore_ascii_case("script");
                attribute = "";
            }
            NAME if in_script => attribute = token.text,
            ATTR_TEXT if in_script => {
                if let Some(lang) = ScriptLang::from_attribute(attribute, token.text) {
                    return lang;
                }
            }
            R_ANGLE | SLASH_R_ANGLE => in_script = false,
            _ => {}
        }
    }
    ScriptLang::JavaScript
}

/// Returns the offsets of `<script` occurrences in a script body.
fn nested_script_tags(body: &str) -> impl Iterator<Item = usize> + '_ {
    const NEEDLE: &[u8] = b"<script";
    let bytes = body.as_bytes();
    (0..bytes.len()).filter(move |&at| {
        bytes
            .get(at..at + NEEDLE.len())
            .is_some_and(|candidate| candidate.eq_ignore_ascii_case(NEEDLE))
            && match bytes.get(at + NEEDLE.len()) {
                None | Some(b'>' | b'/') => true,
                Some(b) => b.is_ascii_whitespace(),
            }
    })
}

/// The Svelte parser.
pub(crate) struct Parser<'src, 'p> {
    /// The source being parsed.
    source: &'src str,
    tokens: Vec<Token<'src>>,
    /// Current position in the token stream.
    pos: usize,
    builder: GreenNodeBuilder<'static>,
    /// Parse errors collected during parsing.
    errors: Vec<ParseError>,
    frames: Vec<Frame>,
    bridge: Bridge<'p>,
    /// Body kind of a document lexed in script or style mode.
    raw_start: RawTextKind,
}

impl<'src, 'p> Parser<'src, 'p> {
    /// Creates a new parser.
    pub fn new(source: &'src str, config: &ParseConfig, scripts: &'p dyn ScriptParser) -> Self {
        let tokens = lexer::tokenize_with(source, config.start_mode);
        let lang = config.lang.unwrap_or_else(|| detect_lang(&tokens));
        trace!(tokens = tokens.len(), %lang, "tokenized");
        Self {
            source,
            tokens,
            pos: 0,
            builder: GreenNodeBuilder::new(),
            errors: Vec::new(),
            frames: Vec::new(),
            bridge: Bridge::new(scripts, lang, config.delegate),
            raw_start: match config.start_mode {
                LexMode::Style => RawTextKind::Style,
                LexMode::Markup | LexMode::Script => RawTextKind::Script,
            },
        }
    }

    /// Parses the whole document.
    pub fn parse(mut self) -> (GreenNode, Vec<ParseError>) {
        self.start(DOCUMENT);
        // With no open frames nothing can stop the content early.
        self.parse_content();
        self.finish();
        (self.builder.finish(), self.errors)
    }

    // === Token helpers ===

    fn nth(&self, n: usize) -> Option<Token<'src>> {
        self.tokens.get(self.pos + n).copied()
    }

    fn nth_kind(&self, n: usize) -> Option<SyntaxKind> {
        self.nth(n).map(|t| t.kind)
    }

    fn current(&self) -> Option<Token<'src>> {
        self.nth(0)
    }

    fn current_kind(&self) -> Option<SyntaxKind> {
        self.nth_kind(0)
    }

    fn at(&self, kind: SyntaxKind) -> bool {
        self.current_kind() == Some(kind)
    }

    /// Start offset of the current token, or the end of input.
    fn offset(&self) -> usize {
        self.current()
            .map_or(self.source.len(), |t| t.span.start_usize())
    }

    /// End offset of the last consumed token.
    fn prev_end(&self) -> usize {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map_or(0, |t| t.span.end_usize())
    }

    fn span_from(&self, start: usize) -> Span {
        Span::from_usize(start, self.prev_end().max(start))
    }

    /// Moves the current token into the tree.
    fn bump(&mut self) {
        if let Some(token) = self.current() {
            self.builder.token(token.kind.into(), token.text);
            self.pos += 1;
        }
    }

    fn bump_whitespace(&mut self) {
        while self.at(WHITESPACE) {
            self.bump();
        }
    }

    /// Consumes the current token if it has `kind`, returning it without
    /// adding it to the tree.
    fn take(&mut self, kind: SyntaxKind) -> Option<Token<'src>> {
        let token = self.current().filter(|t| t.kind == kind)?;
        self.pos += 1;
        Some(token)
    }

    /// Emits a token for `source[start..end]`.
    fn emit(&mut self, kind: SyntaxKind, start: usize, end: usize) {
        if start < end {
            self.builder.token(kind.into(), &self.source[start..end]);
        }
    }

    /// Emits `source[start..end]` as whitespace or, if it has any other
    /// character, as script text.
    fn emit_text(&mut self, start: usize, end: usize) {
        let kind = if self.source[start..end].trim().is_empty() {
            WHITESPACE
        } else {
            JS_TEXT
        };
        self.emit(kind, start, end);
    }

    fn start(&mut self, kind: SyntaxKind) {
        self.builder.start_node(kind.into());
    }

    fn finish(&mut self) {
        self.builder.finish_node();
    }

    fn error(&mut self, kind: ParseErrorKind, span: Span) {
        trace!(%kind, ?span, "recoverable error");
        self.errors.push(ParseError::new(kind, span));
    }

    /// Name of the closing tag at the current position.
    fn end_tag_name(&self) -> &'src str {
        self.nth(1)
            .filter(|t| t.kind == NAME)
            .map_or("", |t| t.text)
    }

    fn element_open(&self, name: &str) -> bool {
        self.frames
            .iter()
            .any(|frame| matches!(frame, Frame::Element(open) if open.as_str() == name))
    }

    fn block_open(&self) -> bool {
        self.frames
            .iter()
            .any(|frame| matches!(frame, Frame::Block(_)))
    }

    fn missing_expression(&mut self) {
        let offset = self.offset();
        self.error(ParseErrorKind::EmptyExpression, Span::from_usize(offset, offset));
    }

    /// Reports an element or block that would open a frame past
    /// [`MAX_NESTING_DEPTH`]. Its content is then parsed as siblings.
    fn too_deep(&mut self, span: Span) -> bool {
        if self.frames.len() < MAX_NESTING_DEPTH {
            return false;
        }
        self.error(
            ParseErrorKind::NestingTooDeep {
                limit: MAX_NESTING_DEPTH,
            },
            span,
        );
        true
    }

    /// Keyword of the mustache at the current position, past its sigil.
    fn mustache_keyword(&self) -> Option<&'src str> {
        let n = if self.nth_kind(2) == Some(WHITESPACE) { 3 } else { 2 };
        self.nth(n).filter(|t| t.kind == KEYWORD).map(|t| t.text)
    }

    // === Content ===

    /// Parses content until the input ends or a token closes an open frame.
    fn parse_content(&mut self) -> Stop {
        loop {
            let Some(token) = self.current() else {
                return Stop::Eof;
            };
            match token.kind {
                TEXT | WHITESPACE => self.parse_text(),
                COMMENT => self.parse_comment(),
                L_ANGLE => self.parse_element(),
                L_ANGLE_SLASH => {
                    let name = self.end_tag_name();
                    if self.element_open(name) {
                        return Stop::EndTag;
                    }
                    self.parse_unmatched_end_tag(name);
                }
                L_CURLY => match self.nth_kind(1) {
                    Some(HASH) => self.parse_block(),
                    Some(COLON) if self.block_open() => return Stop::BlockClause,
                    Some(COLON) => self.parse_stray_clause(),
                    Some(SLASH) => {
                        let kind = self.mustache_keyword().and_then(BlockKind::from_keyword);
                        if kind.is_some_and(|kind| self.frames.contains(&Frame::Block(kind))) {
                            return Stop::BlockClose;
                        }
                        self.parse_unmatched_block_close();
                    }
                    Some(AT) => self.parse_special_tag(),
                    _ => self.parse_mustache(false),
                },
                RAW_TEXT => self.parse_raw_body(self.raw_start),
                _ => {
                    self.start(ERROR);
                    self.bump();
                    self.finish();
                }
            }
        }
    }

    fn parse_text(&mut self) {
        self.start(TEXT_NODE);
        while matches!(self.current_kind(), Some(TEXT | WHITESPACE)) {
            self.bump();
        }
        self.finish();
    }

    fn parse_comment(&mut self) {
        let start = self.offset();
        self.start(COMMENT_NODE);
        self.bump();
        if self.at(UNTERMINATED) {
            self.bump();
            self.error(ParseErrorKind::UnterminatedComment, self.span_from(start));
        }
        self.finish();
    }

    // === Elements ===

    fn parse_element(&mut self) {
        self.start(ELEMENT);
        let tag = self.parse_start_tag();

        if !tag.terminated || tag.self_closing || is_void_element(&tag.name) {
            self.finish();
            return;
        }

        if let Some(kind) = RawTextKind::from_tag_name(&tag.name) {
            self.parse_raw_element_rest(kind, &tag);
            self.finish();
            return;
        }

        if self.too_deep(tag.span) {
            self.finish();
            return;
        }

        self.frames.push(Frame::Element(tag.name.clone()));
        let stop = self.parse_content();
        self.frames.pop();

        if stop == Stop::EndTag && self.end_tag_name() == tag.name.as_str() {
            self.parse_end_tag();
        } else {
            self.error(ParseErrorKind::UnclosedTag { name: tag.name }, tag.span);
        }
        self.finish();
    }

    fn parse_start_tag(&mut self) -> StartTag {
        let start = self.offset();
        self.start(START_TAG);
        self.bump(); // <

        let name = match self.current() {
            Some(token) if token.kind == NAME => {
                self.bump();
                SmolStr::new(token.text)
            }
            _ => SmolStr::default(),
        };

        let mut self_closing = false;
        let mut terminated = false;
        loop {
            match self.current_kind() {
                Some(WHITESPACE) => self.bump(),
                Some(NAME) => self.parse_attribute(),
                Some(L_CURLY) => self.parse_attribute_mustache(),
                Some(R_ANGLE) => {
                    self.bump();
                    terminated = true;
                    break;
                }
                Some(SLASH_R_ANGLE) => {
                    self.bump();
                    self_closing = true;
                    terminated = true;
                    break;
                }
                Some(EQ | QUOTE | ATTR_TEXT | ERROR_TOKEN) => self.parse_tag_garbage(),
                Some(UNTERMINATED) => {
                    self.bump();
                    break;
                }
                _ => break,
            }
        }
        self.finish();

        let span = self.span_from(start);
        if !terminated {
            self.error(ParseErrorKind::UnterminatedTag { name: name.clone() }, span);
        }
        StartTag {
            name,
            span,
            self_closing,
            terminated,
        }
    }

    /// Wraps a stray token of a tag, and the value it introduces, in an
    /// `ERROR` node.
    fn parse_tag_garbage(&mut self) {
        let Some(token) = self.current() else {
            return;
        };
        self.error(
            ParseErrorKind::UnexpectedTagContent {
                text: SmolStr::new(token.text),
            },
            token.span,
        );
        self.start(ERROR);
        match token.kind {
            EQ => {
                self.bump();
                self.bump_whitespace();
                self.parse_attribute_value(token.span);
            }
            QUOTE => self.parse_attribute_value(token.span),
            _ => self.bump(),
        }
        self.finish();
    }

    fn parse_attribute(&mut self) {
        self.start(ATTRIBUTE);
        self.bump(); // name

        let mut ahead = 0;
        while self.nth_kind(ahead) == Some(WHITESPACE) {
            ahead += 1;
        }
        if let Some(eq) = self.nth(ahead).filter(|t| t.kind == EQ) {
            self.bump_whitespace();
            self.bump();
            self.bump_whitespace();
            self.parse_attribute_value(eq.span);
        }
        self.finish();
    }

    fn parse_attribute_value(&mut self, eq: Span) {
        match self.current_kind() {
            Some(QUOTE) => {
                let start = self.offset();
                self.start(ATTRIBUTE_VALUE);
                self.bump();
                loop {
                    match self.current_kind() {
                        Some(ATTR_TEXT) => self.bump(),
                        Some(L_CURLY) => self.parse_mustache(false),
                        Some(QUOTE) => {
                            self.bump();
                            break;
                        }
                        Some(UNTERMINATED) => {
                            self.bump();
                            self.error(
                                ParseErrorKind::UnterminatedAttributeValue,
                                self.span_from(start),
                            );
                            break;
                        }
                        _ => {
                            self.error(
                                ParseErrorKind::UnterminatedAttributeValue,
                                self.span_from(start),
                            );
                            break;
                        }
                    }
                }
                self.finish();
            }
            Some(ATTR_TEXT | L_CURLY) => {
                self.start(ATTRIBUTE_VALUE);
                while let Some(kind @ (ATTR_TEXT | L_CURLY)) = self.current_kind() {
                    if kind == ATTR_TEXT {
                        self.bump();
                    } else {
                        self.parse_mustache(false);
                    }
                }
                self.finish();
            }
            _ => self.error(ParseErrorKind::ExpectedAttributeValue, eq),
        }
    }

    /// `{...spread}`, `{shorthand}` or `{@attach fn}` in a start tag.
    fn parse_attribute_mustache(&mut self) {
        self.start(ATTRIBUTE);
        if self.nth_kind(1) == Some(AT) {
            self.parse_attach();
        } else {
            self.parse_mustache(true);
        }
        self.finish();
    }

    fn parse_attach(&mut self) {
        let start = self.offset();
        self.start(MUSTACHE);
        self.bump(); // {
        self.bump(); // @
        self.sigil_whitespace('@');
        let name = self.bump_keyword();
        if name != Some("attach") {
            self.error(
                ParseErrorKind::UnknownSpecialTag {
                    name: SmolStr::new(name.unwrap_or_default()),
                },
                self.span_from(start),
            );
        }
        self.bump_whitespace();
        self.parse_expression_text(true);
        self.close_mustache(start);
        self.finish();
    }

    fn parse_end_tag(&mut self) {
        let start = self.offset();
        self.start(END_TAG);
        self.bump(); // </
        let name = match self.current() {
            Some(token) if token.kind == NAME => {
                self.bump();
                token.text
            }
            _ => "",
        };

        let mut terminated = false;
        loop {
            match self.current_kind() {
                Some(WHITESPACE) => self.bump(),
                Some(R_ANGLE | SLASH_R_ANGLE) => {
                    self.bump();
                    terminated = true;
                    break;
                }
                Some(NAME | EQ | QUOTE | ATTR_TEXT | ERROR_TOKEN) => self.parse_tag_garbage(),
                Some(L_CURLY) => {
                    self.error(
                        ParseErrorKind::UnexpectedTagContent { text: "{".into() },
                        Span::from_usize(self.offset(), self.offset() + 1),
                    );
                    self.start(ERROR);
                    self.bump_mustache();
                    self.finish();
                }
                Some(UNTERMINATED) => {
                    self.bump();
                    break;
                }
                _ => break,
            }
        }
        self.finish();

        if !terminated {
            self.error(
                ParseErrorKind::UnterminatedTag {
                    name: SmolStr::new(name),
                },
                self.span_from(start),
            );
        }
    }

    fn parse_unmatched_end_tag(&mut self, name: &str) {
        let start = self.offset();
        trace!(name, offset = start, "closing tag matches no open element");
        self.start(ERROR);
        self.parse_end_tag();
        self.finish();
        self.error(
            ParseErrorKind::UnmatchedClosingTag {
                name: SmolStr::new(name),
            },
            self.span_from(start),
        );
    }

    /// The body and closing tag of a `<script>` or `<style>` element.
    fn parse_raw_element_rest(&mut self, kind: RawTextKind, tag: &StartTag) {
        if self.at(RAW_TEXT) {
            self.parse_raw_body(kind);
        }
        match self.current_kind() {
            Some(L_ANGLE_SLASH) => self.parse_end_tag(),
            Some(UNTERMINATED) => {
                self.bump();
                self.error(
                    ParseErrorKind::UnterminatedRawText {
                        name: tag.name.clone(),
                    },
                    self.span_from(tag.span.start_usize()),
                );
            }
            _ => self.error(
                ParseErrorKind::UnterminatedRawText {
                    name: tag.name.clone(),
                },
                self.span_from(tag.span.start_usize()),
            ),
        }
    }

    fn parse_raw_body(&mut self, kind: RawTextKind) {
        let Some(body) = self.current() else {
            return;
        };
        match kind {
            RawTextKind::Script => {
                self.start(SCRIPT_CONTENT);
                // The first closing tag ends the body, so an inner `<script`
                // can never be balanced.
                let base = body.span.start_usize();
                for at in nested_script_tags(body.text) {
                    self.error(
                        ParseErrorKind::NestedScriptTag,
                        Span::from_usize(base + at, base + at + "<script".len()),
                    );
                }
                self.pos += 1;
                self.bridge.splice(
                    &mut self.builder,
                    &mut self.errors,
                    self.source,
                    body.span,
                    RegionKind::Program,
                );
                self.finish();
            }
            RawTextKind::Style => {
                self.start(STYLE_CONTENT);
                self.bump();
                self.finish();
            }
        }
    }

    // === Mustaches ===

    /// Reports whitespace between a sigil and its keyword.
    fn sigil_whitespace(&mut self, sigil: char) {
        if let Some(token) = self.current().filter(|t| t.kind == WHITESPACE) {
            self.error(ParseErrorKind::WhitespaceNotAllowed { sigil }, token.span);
            self.bump();
        }
    }

    fn bump_keyword(&mut self) -> Option<&'src str> {
        let token = self.current().filter(|t| t.kind == KEYWORD)?;
        self.bump();
        Some(token.text)
    }

    /// Consumes a whole mustache as plain tokens.
    fn bump_mustache(&mut self) {
        self.bump(); // {
        while matches!(
            self.current_kind(),
            Some(HASH | COLON | SLASH | AT | KEYWORD | WHITESPACE | EXPR_TEXT)
        ) {
            self.bump();
        }
        if matches!(self.current_kind(), Some(R_CURLY | UNTERMINATED)) {
            self.bump();
        }
    }

    fn close_mustache(&mut self, start: usize) {
        match self.current_kind() {
            Some(R_CURLY) => self.bump(),
            Some(UNTERMINATED) => {
                self.bump();
                self.error(ParseErrorKind::UnterminatedMustache, self.span_from(start));
            }
            _ => self.error(ParseErrorKind::UnterminatedMustache, self.span_from(start)),
        }
    }

    /// `{expression}`, or `{...expression}` when `spread` is set.
    fn parse_mustache(&mut self, spread: bool) {
        let start = self.offset();
        self.start(MUSTACHE);
        self.bump(); // {

        match self.current() {
            Some(token) if matches!(token.kind, HASH | COLON | SLASH | AT) => {
                self.error(
                    ParseErrorKind::UnexpectedTagContent {
                        text: SmolStr::new(&self.source[start..token.span.end_usize()]),
                    },
                    Span::from_usize(start, token.span.end_usize()),
                );
                self.start(ERROR);
                while matches!(
                    self.current_kind(),
                    Some(HASH | COLON | SLASH | AT | KEYWORD | WHITESPACE | EXPR_TEXT)
                ) {
                    self.bump();
                }
                self.finish();
            }
            Some(token)
                if spread
                    && token.kind == EXPR_TEXT
                    && token.text.trim_start().starts_with("...") =>
            {
                self.pos += 1;
                let end = token.span.end_usize();
                let dots = end - token.text.trim_start().len();
                self.emit(WHITESPACE, token.span.start_usize(), dots);
                self.emit(DOTS, dots, dots + 3);
                self.region(EXPRESSION, RegionKind::Expression, dots + 3, end, true);
            }
            _ => {
                self.parse_expression_text(true);
            }
        }

        self.close_mustache(start);
        self.finish();
    }

    /// Delegates the current expression text, if any, as an expression.
    fn parse_expression_text(&mut self, required: bool) -> bool {
        self.parse_delegated_text(RegionKind::Expression, required)
    }

    fn parse_delegated_text(&mut self, kind: RegionKind, required: bool) -> bool {
        match self.take(EXPR_TEXT) {
            Some(token) => self.region(
                EXPRESSION,
                kind,
                token.span.start_usize(),
                token.span.end_usize(),
                required,
            ),
            None => {
                if required {
                    self.missing_expression();
                }
                false
            }
        }
    }

    /// Emits `source[start..end]` as a `wrapper` node around the delegated
    /// text, with surrounding whitespace outside the wrapper.
    fn region(
        &mut self,
        wrapper: SyntaxKind,
        kind: RegionKind,
        start: usize,
        end: usize,
        required: bool,
    ) -> bool {
        let text = &self.source[start..end];
        let inner_start = start + (text.len() - text.trim_start().len());
        let inner_end = end - (text.len() - text.trim_end().len());
        if inner_start >= inner_end {
            self.emit(WHITESPACE, start, end);
            if required {
                self.error(ParseErrorKind::EmptyExpression, Span::from_usize(start, end));
            }
            return false;
        }

        self.emit(WHITESPACE, start, inner_start);
        self.start(wrapper);
        self.bridge.splice(
            &mut self.builder,
            &mut self.errors,
            self.source,
            Span::from_usize(inner_start, inner_end),
            kind,
        );
        self.finish();
        self.emit(WHITESPACE, inner_end, end);
        true
    }

    fn parse_special_tag(&mut self) {
        let start = self.offset();
        self.start(SPECIAL_TAG);
        self.bump(); // {
        self.bump(); // @
        self.sigil_whitespace('@');
        let name = self.bump_keyword().unwrap_or_default();
        if !matches!(name, "html" | "const" | "debug" | "render") {
            self.error(
                ParseErrorKind::UnknownSpecialTag {
                    name: SmolStr::new(name),
                },
                self.span_from(start),
            );
        }
        self.bump_whitespace();
        match name {
            "const" => self.parse_delegated_text(RegionKind::Declaration, true),
            _ => self.parse_expression_text(name != "debug"),
        };
        self.close_mustache(start);
        self.finish();
    }

    // === Blocks ===

    fn parse_block(&mut self) {
        let start = self.offset();
        let keyword = self.mustache_keyword();
        let Some(kind) = keyword.and_then(BlockKind::from_keyword) else {
            self.start(ERROR);
            self.bump_mustache();
            self.finish();
            self.error(
                ParseErrorKind::UnknownBlock {
                    name: SmolStr::new(keyword.unwrap_or_default()),
                },
                self.span_from(start),
            );
            return;
        };

        trace!(block = kind.keyword(), offset = start, "open block");
        self.start(kind.node());
        self.start(BLOCK_BRANCH);
        let open = self.parse_block_open(kind);
        if self.too_deep(open) {
            self.finish(); // branch
            self.finish(); // block
            return;
        }
        let base = self.frames.len();
        self.frames.push(Frame::Block(kind));
        loop {
            let stop = self.parse_content();
            self.finish(); // branch
            match stop {
                Stop::BlockClause => {
                    self.start(BLOCK_BRANCH);
                    let checkpoint = self.builder.checkpoint();
                    let (clause, span) = self.parse_block_clause(kind);
                    // `{:else if}` nests in the AST, so it counts as a level.
                    if kind == BlockKind::If && clause == "else if" {
                        if self.too_deep(span) {
                            self.builder.start_node_at(checkpoint, ERROR.into());
                            self.finish();
                        } else {
                            self.frames.push(Frame::Block(kind));
                        }
                    }
                }
                Stop::BlockClose
                    if self.mustache_keyword().and_then(BlockKind::from_keyword) == Some(kind) =>
                {
                    self.parse_block_close();
                    break;
                }
                _ => {
                    self.error(
                        ParseErrorKind::UnclosedBlock {
                            block: kind.keyword().into(),
                        },
                        open,
                    );
                    break;
                }
            }
        }
        self.frames.truncate(base);
        self.finish(); // block
    }

    fn parse_block_open(&mut self, kind: BlockKind) -> Span {
        let start = self.offset();
        self.start(BLOCK_OPEN);
        self.bump(); // {
        self.bump(); // #
        self.sigil_whitespace('#');
        self.bump(); // keyword
        self.bump_whitespace();
        match kind {
            BlockKind::If | BlockKind::Key => {
                self.parse_expression_text(true);
            }
            BlockKind::Each => self.parse_each_header(),
            BlockKind::Await => self.parse_await_header(),
            BlockKind::Snippet => self.parse_snippet_header(),
        }
        self.close_mustache(start);
        self.finish();
        self.span_from(start)
    }

    /// `items as item, index (key)`
    fn parse_each_header(&mut self) {
        let Some(token) = self.take(EXPR_TEXT) else {
            self.missing_expression();
            return;
        };
        let (start, end) = (token.span.start_usize(), token.span.end_usize());
        let Some(&as_at) = scan::find_keyword(token.text, "as").last() else {
            self.region(EXPRESSION, RegionKind::Expression, start, end, true);
            return;
        };

        self.region(EXPRESSION, RegionKind::Expression, start, start + as_at, true);
        self.emit(KEYWORD, start + as_at, start + as_at + 2);

        let context_start = start + as_at + 2;
        let rest = &self.source[context_start..end];
        let key = scan::find_top_level(rest, b'(')
            .into_iter()
            .rev()
            .filter(|&open| !rest[..open].trim().is_empty())
            .find_map(|open| {
                let close = scan::find_closing_paren(rest, open + 1)?;
                rest[close + 1..]
                    .trim()
                    .is_empty()
                    .then_some((context_start + open, context_start + close))
            });
        let context_end = key.map_or(end, |(open, _)| open);

        let context = &self.source[context_start..context_end];
        match scan::find_top_level(context, b',').last() {
            Some(&comma) => {
                let comma = context_start + comma;
                self.region(BINDING, RegionKind::Binding, context_start, comma, true);
                self.emit(COMMA, comma, comma + 1);
                self.parse_each_index(comma + 1, context_end);
            }
            None => {
                self.region(BINDING, RegionKind::Binding, context_start, context_end, true);
            }
        }

        if let Some((open, close)) = key {
            self.start(EACH_KEY);
            self.emit(L_PAREN, open, open + 1);
            self.region(EXPRESSION, RegionKind::Expression, open + 1, close, true);
            self.emit(R_PAREN, close, close + 1);
            self.finish();
            self.emit(WHITESPACE, close + 1, end);
        }
    }

    fn parse_each_index(&mut self, start: usize, end: usize) {
        let text = &self.source[start..end];
        let inner_start = start + (text.len() - text.trim_start().len());
        let inner_end = end - (text.len() - text.trim_end().len());
        if inner_start >= inner_end {
            self.emit(WHITESPACE, start, end);
            self.error(ParseErrorKind::EmptyExpression, Span::from_usize(start, end));
            return;
        }
        if !is_identifier(&self.source[inner_start..inner_end]) {
            self.error(
                ParseErrorKind::InvalidEachIndex {
                    text: SmolStr::new(&self.source[inner_start..inner_end]),
                },
                Span::from_usize(inner_start, inner_end),
            );
        }
        self.emit(WHITESPACE, start, inner_start);
        self.start(EACH_INDEX);
        self.emit(NAME, inner_start, inner_end);
        self.finish();
        self.emit(WHITESPACE, inner_end, end);
    }

    /// `promise`, `promise then value` or `promise catch error`
    fn parse_await_header(&mut self) {
        let Some(token) = self.take(EXPR_TEXT) else {
            self.missing_expression();
            return;
        };
        let (start, end) = (token.span.start_usize(), token.span.end_usize());
        let split = ["then", "catch"]
            .iter()
            .filter_map(|keyword| {
                scan::find_keyword(token.text, keyword)
                    .first()
                    .map(|&at| (at, keyword.len()))
            })
            .min();

        match split {
            Some((at, len)) => {
                self.region(EXPRESSION, RegionKind::Expression, start, start + at, true);
                self.emit(KEYWORD, start + at, start + at + len);
                self.region(BINDING, RegionKind::Binding, start + at + len, end, false);
            }
            None => {
                self.region(EXPRESSION, RegionKind::Expression, start, end, true);
            }
        }
    }

    /// `name(params)`
    fn parse_snippet_header(&mut self) {
        let Some(token) = self.take(EXPR_TEXT) else {
            self.missing_expression();
            return;
        };
        let (start, end) = (token.span.start_usize(), token.span.end_usize());
        let text = token.text;
        let name_len = text
            .bytes()
            .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_' || *b == b'$')
            .count();
        if name_len == 0 {
            self.error(ParseErrorKind::EmptyExpression, token.span);
        }
        self.emit(NAME, start, start + name_len);

        let params = scan::find_top_level(&text[name_len..], b'(')
            .first()
            .map(|&open| name_len + open)
            .and_then(|open| Some((open, scan::find_closing_paren(text, open + 1)?)));
        match params {
            Some((open, close)) => {
                self.emit_text(start + name_len, start + open);
                self.start(SNIPPET_PARAMS);
                self.emit(L_PAREN, start + open, start + open + 1);
                self.region(BINDING, RegionKind::Binding, start + open + 1, start + close, false);
                self.emit(R_PAREN, start + close, start + close + 1);
                self.finish();
                self.emit_text(start + close + 1, end);
            }
            None => self.emit_text(start + name_len, end),
        }
    }

    fn parse_block_clause(&mut self, block: BlockKind) -> (SmolStr, Span) {
        let start = self.offset();
        self.start(BLOCK_CLAUSE);
        self.bump(); // {
        self.bump(); // :
        self.sigil_whitespace(':');
        let mut clause = SmolStr::new(self.bump_keyword().unwrap_or_default());
        if clause == "else" && self.nth(1).is_some_and(|t| t.kind == KEYWORD && t.text == "if") {
            self.bump_whitespace();
            self.bump();
            clause = SmolStr::new_static("else if");
        }
        self.bump_whitespace();

        if !block.accepts(&clause) {
            self.error(
                ParseErrorKind::InvalidBlockContinuation {
                    clause: clause.clone(),
                    block: block.keyword().into(),
                },
                self.span_from(start),
            );
        }

        match clause.as_str() {
            "else if" => {
                self.parse_expression_text(true);
            }
            "then" | "catch" => {
                if let Some(token) = self.take(EXPR_TEXT) {
                    self.region(
                        BINDING,
                        RegionKind::Binding,
                        token.span.start_usize(),
                        token.span.end_usize(),
                        false,
                    );
                }
            }
            _ => self.unexpected_block_text(&format!(":{clause}")),
        }
        self.close_mustache(start);
        self.finish();
        (clause, self.span_from(start))
    }

    fn parse_block_close(&mut self) {
        let start = self.offset();
        self.start(BLOCK_CLOSE);
        self.bump(); // {
        self.bump(); // /
        let keyword = self.bump_keyword().unwrap_or_default();
        self.bump_whitespace();
        self.unexpected_block_text(&format!("/{keyword}"));
        self.close_mustache(start);
        self.finish();
    }

    /// Wraps expression text in a tag that takes none in an `ERROR` node.
    fn unexpected_block_text(&mut self, tag: &str) {
        if let Some(token) = self.take(EXPR_TEXT) {
            self.start(ERROR);
            self.emit(JS_TEXT, token.span.start_usize(), token.span.end_usize());
            self.finish();
            self.error(ParseErrorKind::UnexpectedBlockText { tag: tag.into() }, token.span);
        }
    }

    fn parse_unmatched_block_close(&mut self) {
        let start = self.offset();
        let block = SmolStr::new(self.mustache_keyword().unwrap_or_default());
        trace!(%block, offset = start, "block close matches no open block");
        self.start(ERROR);
        self.parse_block_close();
        self.finish();
        self.error(ParseErrorKind::UnmatchedBlockClose { block }, self.span_from(start));
    }

    fn parse_stray_clause(&mut self) {
        let start = self.offset();
        let clause = SmolStr::new(self.mustache_keyword().unwrap_or_default());
        self.start(ERROR);
        self.bump_mustache();
        self.finish();
        self.error(
            ParseErrorKind::ContinuationOutsideBlock { clause },
            self.span_from(start),
        );
    }
}
