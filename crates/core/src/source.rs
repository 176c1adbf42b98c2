//! Byte offset to line/column mapping for diagnostic consumers.
//!
//! Spans carry a byte range and the line they start on. Editors and
//! reporters that also want a column build a [`LineIndex`] once per source
//! and query it per span.

use crate::ast::Span;

/// Start offsets of every line in a source text.
#[derive(Debug, Clone)]
pub struct LineIndex {
    starts: Vec<u32>,
    len: u32,
}

/// 1-based line and column. The column counts characters, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineCol {
    pub line: u32,
    pub column: u32,
}

impl LineIndex {
    pub fn new(src: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(
            src.bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i as u32 + 1),
        );
        LineIndex {
            starts,
            len: src.len() as u32,
        }
    }

    pub fn line_count(&self) -> usize {
        self.starts.len()
    }

    /// Position of `offset` in `src` (the text the index was built from).
    /// Offsets past the end clamp to the end.
    pub fn line_col(&self, src: &str, offset: u32) -> LineCol {
        let offset = offset.min(self.len);
        let line = self.starts.partition_point(|&s| s <= offset) - 1;
        let start = self.starts[line] as usize;
        let column = src
            .get(start..offset as usize)
            .map_or(0, |prefix| prefix.chars().count());
        LineCol {
            line: line as u32 + 1,
            column: column as u32 + 1,
        }
    }

    /// Byte range of a 1-based line, without its line terminator.
    pub fn line_span(&self, line: u32) -> Option<Span> {
        let idx = (line as usize).checked_sub(1)?;
        let start = *self.starts.get(idx)?;
        let end = self
            .starts
            .get(idx + 1)
            .map_or(self.len, |next| next - 1);
        Some(Span::new(start, end, line))
    }
}
