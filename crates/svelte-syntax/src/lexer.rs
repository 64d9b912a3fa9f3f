//! Mode-aware Svelte lexer.
//!
//! The lexer produces a lossless token stream: concatenating the text of
//! every token reproduces the input exactly. Markup and tag interiors are
//! tokenized with `logos`; quoted attribute values, mustaches, comments and
//! the bodies of `<script>`/`<style>` are scanned by hand because their end
//! depends on context the regular grammar cannot see.
//!
//! A stack of modes decides how the next bytes are read:
//! - markup: text, whitespace, comments and the start of tags and mustaches
//! - tag: names, `=`, values and the closing `>` or `/>`
//! - quoted: the inside of a quoted attribute value
//! - mustache: `{ ... }` with its optional sigil and keyword
//! - raw text: the body of a script or style element
//!
//! When the input ends while any construct is still open, a single
//! zero-length [`SyntaxKind::UNTERMINATED`] token is emitted last.

use std::collections::VecDeque;

use logos::Logos;
use source_map::Span;
use tracing::trace;

use crate::scan;
use crate::SyntaxKind;

/// A token produced by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'src> {
    /// The kind of token.
    pub kind: SyntaxKind,
    /// The span of the token in the source.
    pub span: Span,
    /// The source text covered by the token.
    pub text: &'src str,
}

/// The mode the lexer starts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LexMode {
    /// A whole `.svelte` component.
    #[default]
    Markup,
    /// The body of a `<script>` element.
    Script,
    /// The body of a `<style>` element.
    Style,
}

/// Elements whose body is not markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum RawTextKind {
    Script,
    Style,
}

impl RawTextKind {
    pub(crate) fn from_tag_name(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("script") {
            Some(Self::Script)
        } else if name.eq_ignore_ascii_case("style") {
            Some(Self::Style)
        } else {
            None
        }
    }

    fn close_needle(self) -> &'static str {
        match self {
            Self::Script => "</script",
            Self::Style => "</style",
        }
    }
}

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
enum MarkupToken {
    #[token("<!--")]
    CommentOpen,

    #[token("</")]
    LAngleSlash,

    #[token("<")]
    LAngle,

    #[token("{")]
    LCurly,

    #[regex(r"[ \t\r\n\f]+")]
    Whitespace,

    #[regex(r"[^<{ \t\r\n\f]+")]
    Text,
}

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
enum TagToken {
    #[token(">")]
    RAngle,

    #[token("/>")]
    SlashRAngle,

    #[token("/")]
    Slash,

    #[token("=")]
    Eq,

    #[token("{")]
    LCurly,

    #[token("}")]
    RCurly,

    #[token("\"")]
    #[token("'")]
    Quote,

    #[token("<")]
    LAngle,

    #[regex(r"[ \t\r\n\f]+")]
    Whitespace,

    #[regex(r#"[^ \t\r\n\f"'<>/={}]+"#)]
    Name,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct TagState {
    closing: bool,
    named: bool,
    raw: Option<RawTextKind>,
    after_eq: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Markup,
    Tag(TagState),
    Quoted(u8),
    Mustache,
    RawText(RawTextKind),
}

/// A lexer for Svelte source code.
pub struct Lexer<'src> {
    source: &'src str,
    pos: usize,
    /// Mode used when the stack is empty.
    base: Mode,
    modes: Vec<Mode>,
    pending: VecDeque<Token<'src>>,
    unterminated: bool,
    finished: bool,
}

impl<'src> Lexer<'src> {
    /// Creates a lexer for a whole component.
    pub fn new(source: &'src str) -> Self {
        Self::with_mode(source, LexMode::Markup)
    }

    /// Creates a lexer starting in the given mode.
    pub fn with_mode(source: &'src str, mode: LexMode) -> Self {
        let base = match mode {
            LexMode::Markup => Mode::Markup,
            LexMode::Script => Mode::RawText(RawTextKind::Script),
            LexMode::Style => Mode::RawText(RawTextKind::Style),
        };
        Self {
            source,
            pos: 0,
            base,
            modes: Vec::new(),
            pending: VecDeque::new(),
            unterminated: false,
            finished: false,
        }
    }

    /// Returns the source string being lexed.
    pub fn source(&self) -> &'src str {
        self.source
    }

    fn mode(&self) -> Mode {
        self.modes.last().copied().unwrap_or(self.base)
    }

    fn push_mode(&mut self, mode: Mode) {
        trace!(?mode, offset = self.pos, "enter lexer mode");
        self.modes.push(mode);
    }

    fn pop_mode(&mut self) {
        match self.modes.pop() {
            Some(mode) => trace!(?mode, offset = self.pos, "leave lexer mode"),
            None => self.base = Mode::Markup,
        }
    }

    fn set_tag_state(&mut self, state: TagState) {
        if let Some(Mode::Tag(current)) = self.modes.last_mut() {
            *current = state;
        }
    }

    /// Queues a token for `[self.pos, end)` and advances past it.
    fn emit(&mut self, kind: SyntaxKind, end: usize) {
        let start = self.pos;
        self.pending.push_back(Token {
            kind,
            span: Span::from_usize(start, end),
            text: &self.source[start..end],
        });
        self.pos = end;
    }

    fn rest(&self) -> &'src str {
        &self.source[self.pos..]
    }

    fn byte_at(&self, offset: usize) -> Option<u8> {
        self.source.as_bytes().get(offset).copied()
    }

    fn step(&mut self) {
        match self.mode() {
            Mode::Markup => self.lex_markup(),
            Mode::Tag(state) => self.lex_tag(state),
            Mode::Quoted(quote) => self.lex_quoted(quote),
            Mode::Mustache => self.lex_mustache(),
            Mode::RawText(kind) => self.lex_raw_text(kind),
        }
    }

    fn lex_markup(&mut self) {
        let rest = self.rest();
        let mut lex = MarkupToken::lexer(rest);
        let Some(result) = lex.next() else {
            return;
        };
        let end = self.pos + token_len(lex.span().end, rest);
        let starts_tag = self.byte_at(end).is_some_and(|b| b.is_ascii_alphabetic());

        match result {
            Ok(MarkupToken::CommentOpen) => self.lex_comment(),
            Ok(MarkupToken::LAngleSlash) if starts_tag => {
                self.emit(SyntaxKind::L_ANGLE_SLASH, end);
                self.push_mode(Mode::Tag(TagState {
                    closing: true,
                    ..TagState::default()
                }));
            }
            Ok(MarkupToken::LAngle) if starts_tag => {
                self.emit(SyntaxKind::L_ANGLE, end);
                self.push_mode(Mode::Tag(TagState::default()));
            }
            Ok(MarkupToken::LAngleSlash | MarkupToken::LAngle | MarkupToken::Text) => {
                self.emit(SyntaxKind::TEXT, end)
            }
            Ok(MarkupToken::LCurly) => self.push_mode(Mode::Mustache),
            Ok(MarkupToken::Whitespace) => self.emit(SyntaxKind::WHITESPACE, end),
            Err(()) => self.emit(SyntaxKind::ERROR_TOKEN, end),
        }
    }

    fn lex_comment(&mut self) {
        let body = self.pos + 4;
        let end = match self.source[body..].find("-->") {
            Some(i) => body + i + 3,
            None => {
                self.unterminated = true;
                self.source.len()
            }
        };
        self.emit(SyntaxKind::COMMENT, end);
    }

    fn lex_tag(&mut self, mut state: TagState) {
        let rest = self.rest();

        if state.after_eq && starts_unquoted_value(rest) {
            let len = rest
                .bytes()
                .enumerate()
                .find(|&(i, b)| {
                    matches!(b, b'"' | b'\'' | b'=' | b'<' | b'>' | b'`' | b'{')
                        || b.is_ascii_whitespace()
                        || rest.as_bytes()[i..].starts_with(b"/>")
                })
                .map_or(rest.len(), |(i, _)| i);
            state.after_eq = false;
            self.set_tag_state(state);
            self.emit(SyntaxKind::ATTR_TEXT, self.pos + len);
            return;
        }

        let mut lex = TagToken::lexer(rest);
        let Some(result) = lex.next() else {
            return;
        };
        let end = self.pos + token_len(lex.span().end, rest);

        match result {
            Ok(TagToken::RAngle) => {
                self.emit(SyntaxKind::R_ANGLE, end);
                self.pop_mode();
                if let (false, Some(kind)) = (state.closing, state.raw) {
                    self.push_mode(Mode::RawText(kind));
                }
            }
            Ok(TagToken::SlashRAngle) => {
                self.emit(SyntaxKind::SLASH_R_ANGLE, end);
                self.pop_mode();
            }
            Ok(TagToken::Eq) => {
                state.after_eq = true;
                self.set_tag_state(state);
                self.emit(SyntaxKind::EQ, end);
            }
            Ok(TagToken::LCurly) => {
                state.after_eq = false;
                self.set_tag_state(state);
                self.push_mode(Mode::Mustache);
            }
            Ok(TagToken::Quote) => {
                state.after_eq = false;
                self.set_tag_state(state);
                let quote = rest.as_bytes()[0];
                self.emit(SyntaxKind::QUOTE, end);
                self.push_mode(Mode::Quoted(quote));
            }
            // A new tag starts before this one was closed.
            Ok(TagToken::LAngle) => self.pop_mode(),
            Ok(TagToken::Whitespace) => self.emit(SyntaxKind::WHITESPACE, end),
            Ok(TagToken::Name) => {
                if !state.named {
                    state.named = true;
                    if !state.closing {
                        state.raw = RawTextKind::from_tag_name(&self.source[self.pos..end]);
                    }
                }
                state.after_eq = false;
                self.set_tag_state(state);
                self.emit(SyntaxKind::NAME, end);
            }
            Ok(TagToken::Slash | TagToken::RCurly) | Err(()) => {
                state.after_eq = false;
                self.set_tag_state(state);
                self.emit(SyntaxKind::ERROR_TOKEN, end);
            }
        }
    }

    fn lex_quoted(&mut self, quote: u8) {
        let rest = self.rest();
        match rest.as_bytes()[0] {
            b if b == quote => {
                self.emit(SyntaxKind::QUOTE, self.pos + 1);
                self.pop_mode();
            }
            b'{' => self.push_mode(Mode::Mustache),
            _ => {
                let len = rest
                    .bytes()
                    .position(|b| b == quote || b == b'{')
                    .unwrap_or(rest.len());
                self.emit(SyntaxKind::ATTR_TEXT, self.pos + len);
            }
        }
    }

    /// Lexes a whole mustache starting at its `{`.
    fn lex_mustache(&mut self) {
        self.pop_mode();
        self.emit(SyntaxKind::L_CURLY, self.pos + 1);

        let sigil = match self.byte_at(self.pos) {
            Some(b'#') => Some(SyntaxKind::HASH),
            Some(b':') => Some(SyntaxKind::COLON),
            Some(b'@') => Some(SyntaxKind::AT),
            Some(b'/') if closes_block(&self.source[self.pos + 1..]) => Some(SyntaxKind::SLASH),
            _ => None,
        };

        if let Some(sigil) = sigil {
            self.emit(sigil, self.pos + 1);
            self.lex_while(SyntaxKind::WHITESPACE, |b| b.is_ascii_whitespace());
            let keyword_start = self.pos;
            self.lex_while(SyntaxKind::KEYWORD, |b| b.is_ascii_alphabetic());
            if &self.source[keyword_start..self.pos] == "else" {
                let after_ws = self.pos
                    + self.rest().bytes().take_while(u8::is_ascii_whitespace).count();
                if after_ws > self.pos && is_word_at(self.source, after_ws, "if") {
                    self.emit(SyntaxKind::WHITESPACE, after_ws);
                    self.emit(SyntaxKind::KEYWORD, after_ws + 2);
                }
            }
            self.lex_while(SyntaxKind::WHITESPACE, |b| b.is_ascii_whitespace());
        }

        match scan::find_mustache_end(self.source, self.pos) {
            Some(close) => {
                if close > self.pos {
                    self.emit(SyntaxKind::EXPR_TEXT, close);
                }
                self.emit(SyntaxKind::R_CURLY, close + 1);
            }
            None => {
                if self.pos < self.source.len() {
                    self.emit(SyntaxKind::EXPR_TEXT, self.source.len());
                }
                self.unterminated = true;
            }
        }
    }

    /// Emits one token for the run of bytes matching `pred`, if any.
    fn lex_while(&mut self, kind: SyntaxKind, pred: impl Fn(&u8) -> bool) {
        let len = self.rest().bytes().take_while(|b| pred(b)).count();
        if len > 0 {
            self.emit(kind, self.pos + len);
        }
    }

    fn lex_raw_text(&mut self, kind: RawTextKind) {
        let needle = kind.close_needle().as_bytes();
        let bytes = self.source.as_bytes();
        let close = (self.pos..bytes.len()).find(|&at| {
            bytes[at] == b'<'
                && bytes
                    .get(at..at + needle.len())
                    .is_some_and(|candidate| candidate.eq_ignore_ascii_case(needle))
                && match bytes.get(at + needle.len()) {
                    None | Some(b'>' | b'/') => true,
                    Some(b) => b.is_ascii_whitespace(),
                }
        });

        match close {
            Some(at) => {
                if at > self.pos {
                    self.emit(SyntaxKind::RAW_TEXT, at);
                }
                self.pop_mode();
            }
            None => {
                self.emit(SyntaxKind::RAW_TEXT, self.source.len());
                if !self.modes.is_empty() {
                    self.unterminated = true;
                }
            }
        }
    }
}

impl<'src> Iterator for Lexer<'src> {
    type Item = Token<'src>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(token) = self.pending.pop_front() {
                return Some(token);
            }
            if self.finished {
                return None;
            }
            if self.pos >= self.source.len() {
                self.finished = true;
                if self.unterminated || !self.modes.is_empty() {
                    trace!(modes = ?self.modes, "input ended inside an open construct");
                    let end = self.source.len();
                    return Some(Token {
                        kind: SyntaxKind::UNTERMINATED,
                        span: Span::from_usize(end, end),
                        text: "",
                    });
                }
                return None;
            }
            self.step();
        }
    }
}

/// Length of a logos match, never zero so that the lexer always advances.
fn token_len(span_end: usize, rest: &str) -> usize {
    if span_end > 0 {
        span_end
    } else {
        rest.chars().next().map_or(0, char::len_utf8)
    }
}

fn starts_unquoted_value(rest: &str) -> bool {
    match rest.as_bytes().first() {
        Some(b'"' | b'\'' | b'{' | b'>' | b'<') | None => false,
        Some(b) if b.is_ascii_whitespace() => false,
        Some(_) => !rest.starts_with("/>"),
    }
}

/// `{/` closes a block only when followed by a block keyword; otherwise the
/// slash starts a regular expression.
fn closes_block(rest: &str) -> bool {
    ["if", "each", "await", "key", "snippet"]
        .iter()
        .any(|keyword| is_word_at(rest, 0, keyword))
}

fn is_word_at(text: &str, offset: usize, word: &str) -> bool {
    text[offset..].starts_with(word)
        && !text
            .as_bytes()
            .get(offset + word.len())
            .is_some_and(|b| b.is_ascii_alphanumeric() || *b == b'_' || *b == b'$')
}

/// Tokenizes a whole component.
pub fn tokenize(source: &str) -> Vec<Token<'_>> {
    Lexer::new(source).collect()
}

/// Tokenizes `source` starting in `mode`.
pub fn tokenize_with(source: &str, mode: LexMode) -> Vec<Token<'_>> {
    Lexer::with_mode(source, mode).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use SyntaxKind::*;

    fn kinds(source: &str) -> Vec<SyntaxKind> {
        tokenize(source).into_iter().map(|t| t.kind).collect()
    }

    fn texts(source: &str) -> Vec<&str> {
        tokenize(source).into_iter().map(|t| t.text).collect()
    }

    #[test]
    fn test_simple_tag() {
        assert_eq!(kinds("<div>"), vec![L_ANGLE, NAME, R_ANGLE]);
        assert_eq!(kinds("<br/>"), vec![L_ANGLE, NAME, SLASH_R_ANGLE]);
        assert_eq!(kinds("</div>"), vec![L_ANGLE_SLASH, NAME, R_ANGLE]);
    }

    #[test]
    fn test_quoted_attribute_with_mustache() {
        assert_eq!(
            kinds(r#"<div class="a {b}">"#),
            vec![
                L_ANGLE, NAME, WHITESPACE, NAME, EQ, QUOTE, ATTR_TEXT, L_CURLY, EXPR_TEXT,
                R_CURLY, QUOTE, R_ANGLE
            ]
        );
    }

    #[test]
    fn test_unquoted_attribute_value() {
        assert_eq!(
            kinds("<a href=/x/y>"),
            vec![L_ANGLE, NAME, WHITESPACE, NAME, EQ, ATTR_TEXT, R_ANGLE]
        );
        assert_eq!(texts("<a href=/x/y>")[5], "/x/y");
    }

    #[test]
    fn test_block_tokens() {
        assert_eq!(
            kinds("{#each items as item}{/each}"),
            vec![
                L_CURLY, HASH, KEYWORD, WHITESPACE, EXPR_TEXT, R_CURLY, L_CURLY, SLASH, KEYWORD,
                R_CURLY
            ]
        );
        assert_eq!(texts("{#each items as item}")[4], "items as item");
    }

    #[test]
    fn test_else_if() {
        assert_eq!(
            kinds("{:else if x}"),
            vec![L_CURLY, COLON, KEYWORD, WHITESPACE, KEYWORD, WHITESPACE, EXPR_TEXT, R_CURLY]
        );
        assert_eq!(kinds("{:else}"), vec![L_CURLY, COLON, KEYWORD, R_CURLY]);
    }

    #[test]
    fn test_plain_mustache_keeps_whitespace_in_expression() {
        assert_eq!(kinds("{ x }"), vec![L_CURLY, EXPR_TEXT, R_CURLY]);
        assert_eq!(texts("{ x }")[1], " x ");
    }

    #[test]
    fn test_regex_in_mustache() {
        assert_eq!(kinds("{/a/.test(x)}"), vec![L_CURLY, EXPR_TEXT, R_CURLY]);
    }

    #[test]
    fn test_brace_in_string() {
        assert_eq!(texts("{'}'}"), vec!["{", "'}'", "}"]);
    }

    #[test]
    fn test_template_literal() {
        assert_eq!(texts("{`a${b}c`}"), vec!["{", "`a${b}c`", "}"]);
    }

    #[test]
    fn test_script_body_is_raw_text() {
        let source = r#"<script>let a = "</div>";</script>"#;
        assert_eq!(
            kinds(source),
            vec![L_ANGLE, NAME, R_ANGLE, RAW_TEXT, L_ANGLE_SLASH, NAME, R_ANGLE]
        );
        assert_eq!(texts(source)[3], r#"let a = "</div>";"#);
    }

    #[test]
    fn test_style_body_with_braces() {
        let source = "<style>p { color: red; }</style>";
        assert_eq!(texts(source)[3], "p { color: red; }");
    }

    #[test]
    fn test_text_with_less_than() {
        assert_eq!(kinds("a < b"), vec![TEXT, WHITESPACE, TEXT, WHITESPACE, TEXT]);
    }

    #[test]
    fn test_comment() {
        assert_eq!(kinds("<!-- <div> -->x"), vec![COMMENT, TEXT]);
    }

    #[test]
    fn test_unterminated_constructs() {
        assert_eq!(kinds("<div"), vec![L_ANGLE, NAME, UNTERMINATED]);
        assert_eq!(kinds("{a"), vec![L_CURLY, EXPR_TEXT, UNTERMINATED]);
        assert_eq!(kinds("<!-- x"), vec![COMMENT, UNTERMINATED]);
        assert_eq!(
            kinds("<p title=\"x"),
            vec![L_ANGLE, NAME, WHITESPACE, NAME, EQ, QUOTE, ATTR_TEXT, UNTERMINATED]
        );
        assert_eq!(
            kinds("<script>x"),
            vec![L_ANGLE, NAME, R_ANGLE, RAW_TEXT, UNTERMINATED]
        );
    }

    #[test]
    fn test_unterminated_marker_is_last_and_empty() {
        let tokens = tokenize("<div {a");
        let last = tokens.last().unwrap();
        assert_eq!(last.kind, UNTERMINATED);
        assert!(last.span.is_empty());
        assert_eq!(tokens.iter().filter(|t| t.kind == UNTERMINATED).count(), 1);
    }

    #[test]
    fn test_tag_interrupted_by_new_tag() {
        assert_eq!(
            kinds("<div <span>"),
            vec![L_ANGLE, NAME, WHITESPACE, L_ANGLE, NAME, R_ANGLE]
        );
    }

    #[test]
    fn test_script_start_mode() {
        assert_eq!(
            tokenize_with("let x = 1;", LexMode::Script)
                .into_iter()
                .map(|t| t.kind)
                .collect::<Vec<_>>(),
            vec![RAW_TEXT]
        );
    }

    #[test]
    fn test_tokens_cover_source() {
        let source = concat!(
            "<script lang=\"ts\">let a: number = 1;</script>\n",
            "{#if a > 0}<p on:click={() => a++}>{a}</p>{:else}<!-- none -->{/if}",
        );
        let tokens = tokenize(source);
        let mut offset = 0;
        for token in &tokens {
            assert_eq!(token.span.start_usize(), offset);
            offset = token.span.end_usize();
        }
        assert_eq!(offset, source.len());
        let joined: String = tokens.iter().map(|t| t.text).collect();
        assert_eq!(joined, source);
    }
}
