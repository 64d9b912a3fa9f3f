//! Byte spans and line/column lookup shared by the svelte-syntax crates.
//!
//! Every offset is a UTF-8 byte offset into the component source.
//! Regions handed to an embedded-language parser are addressed relative to
//! their own start; [`Span::shift`] moves such a region-relative span back to
//! document-absolute coordinates.

mod line_index;
mod span;

pub use line_index::{LineCol, LineIndex};
pub use span::{ByteOffset, Span};
