//! JavaScript-aware byte scanning used to find the end of mustaches and the
//! top-level keywords of block headers.
//!
//! The scanner walks bytes and steps over string literals, template literals
//! (including nested `${}`), comments and regular expression literals, so
//! that only "code" bytes are reported together with their bracket depth.
//! All delimiters are ASCII, so every reported offset of an ASCII byte is a
//! character boundary.

/// A byte outside of literals and comments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CodeByte {
    pub offset: usize,
    pub byte: u8,
    /// Bracket depth before this byte.
    pub depth: u32,
}

pub(crate) struct CodeScanner<'a> {
    bytes: &'a [u8],
    pos: usize,
    depth: u32,
    /// Last significant byte, used to tell regex literals from division.
    prev: u8,
}

impl<'a> CodeScanner<'a> {
    pub fn new(text: &'a str) -> Self {
        Self::at(text.as_bytes(), 0)
    }

    pub fn at(bytes: &'a [u8], pos: usize) -> Self {
        Self {
            bytes,
            pos,
            depth: 0,
            prev: b'(',
        }
    }
}

impl Iterator for CodeScanner<'_> {
    type Item = CodeByte;

    fn next(&mut self) -> Option<CodeByte> {
        loop {
            let byte = *self.bytes.get(self.pos)?;
            match byte {
                b'"' | b'\'' => {
                    self.pos = skip_string(self.bytes, self.pos, byte);
                    self.prev = b'"';
                    continue;
                }
                b'`' => {
                    self.pos = skip_template(self.bytes, self.pos);
                    self.prev = b'"';
                    continue;
                }
                b'/' => match self.bytes.get(self.pos + 1) {
                    Some(b'/') => {
                        self.pos = find_byte(self.bytes, self.pos, b'\n');
                        continue;
                    }
                    Some(b'*') => {
                        self.pos = skip_block_comment(self.bytes, self.pos);
                        continue;
                    }
                    _ if could_start_regex(self.prev) => {
                        self.pos = skip_regex(self.bytes, self.pos);
                        self.prev = b'a';
                        continue;
                    }
                    _ => {}
                },
                _ => {}
            }

            let depth = self.depth;
            match byte {
                b'{' | b'(' | b'[' => self.depth += 1,
                b'}' | b')' | b']' => self.depth = self.depth.saturating_sub(1),
                _ => {}
            }
            if !byte.is_ascii_whitespace() {
                self.prev = byte;
            }
            let offset = self.pos;
            self.pos += 1;
            return Some(CodeByte {
                offset,
                byte,
                depth,
            });
        }
    }
}

/// `/` starts a regex after an operator, an opening bracket or a separator,
/// and is a division after an operand.
fn could_start_regex(prev: u8) -> bool {
    matches!(
        prev,
        b'=' | b'!'
            | b'+'
            | b'-'
            | b'*'
            | b'%'
            | b'<'
            | b'>'
            | b'&'
            | b'|'
            | b'^'
            | b'~'
            | b'?'
            | b':'
            | b'('
            | b'['
            | b'{'
            | b','
            | b';'
    )
}

/// Index of the next `needle` at or after `from`, or the end of input.
fn find_byte(bytes: &[u8], from: usize, needle: u8) -> usize {
    bytes[from..]
        .iter()
        .position(|&b| b == needle)
        .map_or(bytes.len(), |i| from + i)
}

/// Returns the index after the closing quote. Strings stop at a line break,
/// which keeps an unterminated literal from swallowing the document.
fn skip_string(bytes: &[u8], start: usize, quote: u8) -> usize {
    let mut i = start + 1;
    while let Some(&b) = bytes.get(i) {
        match b {
            b'\\' => i += 2,
            b'\n' => return i,
            _ if b == quote => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

fn skip_template(bytes: &[u8], start: usize) -> usize {
    let mut i = start + 1;
    while let Some(&b) = bytes.get(i) {
        match b {
            b'\\' => i += 2,
            b'`' => return i + 1,
            b'$' if bytes.get(i + 1) == Some(&b'{') => {
                let close = CodeScanner::at(bytes, i + 2)
                    .find(|c| c.byte == b'}' && c.depth == 0);
                match close {
                    Some(c) => i = c.offset + 1,
                    None => return bytes.len(),
                }
            }
            _ => i += 1,
        }
    }
    bytes.len()
}

fn skip_block_comment(bytes: &[u8], start: usize) -> usize {
    let mut i = start + 2;
    while i < bytes.len() {
        if bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/') {
            return i + 2;
        }
        i += 1;
    }
    bytes.len()
}

fn skip_regex(bytes: &[u8], start: usize) -> usize {
    let mut i = start + 1;
    let mut in_class = false;
    while let Some(&b) = bytes.get(i) {
        match b {
            b'\\' => {
                i += 2;
                continue;
            }
            b'\n' => return i,
            b'[' => in_class = true,
            b']' => in_class = false,
            b'/' if !in_class => {
                i += 1;
                while bytes.get(i).is_some_and(u8::is_ascii_alphabetic) {
                    i += 1;
                }
                return i;
            }
            _ => {}
        }
        i += 1;
    }
    bytes.len()
}

/// Finds the `}` closing a mustache whose content starts at `from`.
pub(crate) fn find_mustache_end(source: &str, from: usize) -> Option<usize> {
    CodeScanner::at(source.as_bytes(), from)
        .find(|c| c.byte == b'}' && c.depth == 0)
        .map(|c| c.offset)
}

/// Finds the `)` matching a `(` whose content starts at `from`.
pub(crate) fn find_closing_paren(text: &str, from: usize) -> Option<usize> {
    CodeScanner::at(text.as_bytes(), from)
        .find(|c| c.byte == b')' && c.depth == 0)
        .map(|c| c.offset)
}

/// Offsets of `keyword` at bracket depth 0, preceded by whitespace and followed
/// by whitespace or the end of the text.
pub(crate) fn find_keyword(text: &str, keyword: &str) -> Vec<usize> {
    let bytes = text.as_bytes();
    let needle = keyword.as_bytes();
    CodeScanner::new(text)
        .filter(|c| c.depth == 0 && bytes[c.offset..].starts_with(needle))
        .map(|c| c.offset)
        .filter(|&offset| {
            let before = offset
                .checked_sub(1)
                .and_then(|i| bytes.get(i))
                .is_some_and(u8::is_ascii_whitespace);
            let after = bytes
                .get(offset + needle.len())
                .map_or(true, u8::is_ascii_whitespace);
            before && after
        })
        .collect()
}

/// Offsets of `byte` at bracket depth 0.
pub(crate) fn find_top_level(text: &str, byte: u8) -> Vec<usize> {
    CodeScanner::new(text)
        .filter(|c| c.depth == 0 && c.byte == byte)
        .map(|c| c.offset)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mustache_end_nested_braces() {
        let src = "{items.map(x => { return x; })} tail";
        assert_eq!(find_mustache_end(src, 1), Some(30));
    }

    #[test]
    fn test_mustache_end_skips_strings_and_comments() {
        let src = "{'}' + \"}\" /* } */ + x} rest";
        assert_eq!(find_mustache_end(src, 1), Some(22));

        let src = "{a // }\n}";
        assert_eq!(find_mustache_end(src, 1), Some(8));
    }

    #[test]
    fn test_mustache_end_template_literal() {
        let src = "{`a${ {b: 1}.b }c`}";
        assert_eq!(find_mustache_end(src, 1), Some(18));
    }

    #[test]
    fn test_regex_versus_division() {
        // regex containing a brace
        let src = "{/}/.test(x)}";
        assert_eq!(find_mustache_end(src, 1), Some(12));
        // division
        let src = "{a / b}";
        assert_eq!(find_mustache_end(src, 1), Some(6));
    }

    #[test]
    fn test_unterminated_mustache() {
        assert_eq!(find_mustache_end("{a + (b}", 1), None);
    }

    #[test]
    fn test_find_keyword() {
        assert_eq!(find_keyword("items as item", "as"), vec![6]);
        assert_eq!(find_keyword("(x as T[]) as item", "as"), vec![11]);
        assert_eq!(find_keyword("'a as b' as c", "as"), vec![9]);
        assert!(find_keyword("alias", "as").is_empty());
        assert_eq!(find_keyword("p then", "then"), vec![2]);
    }

    #[test]
    fn test_find_top_level() {
        assert_eq!(find_top_level("{a, b}, i", b','), vec![6]);
        assert_eq!(find_top_level("item, i (item.id)", b'('), vec![8]);
    }

    #[test]
    fn test_find_closing_paren() {
        let text = "item (key(item, ')'))";
        assert_eq!(find_closing_paren(text, 6), Some(20));
        assert_eq!(find_closing_paren("(a", 1), None);
    }
}
