//! Offset to line/column lookup for diagnostics.

use crate::{ByteOffset, Span};
use text_size::TextSize;

/// A 0-indexed line and byte column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LineCol {
    /// 0-indexed line number.
    pub line: u32,
    /// 0-indexed column (byte offset within the line).
    pub col: u32,
}

impl LineCol {
    /// Creates a new line/column position.
    #[inline]
    pub fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }
}

/// Start offsets of every line of a source text.
///
/// Lookups are binary searches over the line starts.
#[derive(Debug, Clone)]
pub struct LineIndex {
    /// `line_starts[i]` is the offset where line `i` begins.
    line_starts: Vec<ByteOffset>,
    len: ByteOffset,
}

impl LineIndex {
    /// Indexes `text`. Lines are terminated by `\n`; a preceding `\r` stays
    /// part of the line.
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![TextSize::from(0)];
        line_starts.extend(
            text.bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(offset, _)| TextSize::from((offset + 1) as u32)),
        );

        Self {
            line_starts,
            len: TextSize::from(text.len() as u32),
        }
    }

    /// Returns the number of lines in the source.
    #[inline]
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Converts a byte offset to a line/column position.
    ///
    /// Returns `None` if the offset is past the end of the text.
    pub fn line_col(&self, offset: ByteOffset) -> Option<LineCol> {
        if offset > self.len {
            return None;
        }

        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(line) => line.saturating_sub(1),
        };

        let col = u32::from(offset) - u32::from(self.line_starts[line]);
        Some(LineCol {
            line: line as u32,
            col,
        })
    }

    /// Converts both ends of a span.
    pub fn span_line_cols(&self, span: Span) -> Option<(LineCol, LineCol)> {
        Some((self.line_col(span.start)?, self.line_col(span.end)?))
    }

    /// Converts a line/column position back to a byte offset.
    ///
    /// Returns `None` if the line is out of bounds.
    pub fn offset(&self, line_col: LineCol) -> Option<ByteOffset> {
        let line_start = *self.line_starts.get(line_col.line as usize)?;
        Some(line_start + TextSize::from(line_col.col))
    }

    /// Returns the byte offset where a line starts.
    pub fn line_start(&self, line: u32) -> Option<ByteOffset> {
        self.line_starts.get(line as usize).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_single_line() {
        let index = LineIndex::new("<div></div>");
        assert_eq!(index.line_count(), 1);
        assert_eq!(index.line_col(TextSize::from(0)), Some(LineCol::new(0, 0)));
        assert_eq!(index.line_col(TextSize::from(5)), Some(LineCol::new(0, 5)));
        assert_eq!(index.line_col(TextSize::from(11)), Some(LineCol::new(0, 11)));
        assert_eq!(index.line_col(TextSize::from(12)), None);
    }

    #[test]
    fn test_multiple_lines() {
        let index = LineIndex::new("{#if a}\n<p/>\n{/if}");
        assert_eq!(index.line_count(), 3);
        assert_eq!(index.line_col(TextSize::from(7)), Some(LineCol::new(0, 7)));
        assert_eq!(index.line_col(TextSize::from(8)), Some(LineCol::new(1, 0)));
        assert_eq!(index.line_col(TextSize::from(13)), Some(LineCol::new(2, 0)));
        assert_eq!(index.line_col(TextSize::from(17)), Some(LineCol::new(2, 4)));
    }

    #[test]
    fn test_offset_roundtrip() {
        let text = "<script>\nlet x;\n</script>";
        let index = LineIndex::new(text);

        for offset in 0..=text.len() {
            let offset = TextSize::from(offset as u32);
            let line_col = index.line_col(offset).unwrap();
            assert_eq!(index.offset(line_col), Some(offset));
        }
    }

    #[test]
    fn test_span_line_cols() {
        let index = LineIndex::new("a\nbc\n");
        let (start, end) = index
            .span_line_cols(Span::new(2u32, 4u32))
            .unwrap();
        assert_eq!(start, LineCol::new(1, 0));
        assert_eq!(end, LineCol::new(1, 2));
        assert_eq!(index.line_start(2), Some(TextSize::from(5)));
    }
}
