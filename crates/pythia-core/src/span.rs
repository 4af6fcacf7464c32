//! Byte spans, line/column positions, and the line index.
//!
//! All source positions in pythia are derived from byte offsets into the
//! UTF-8 source text. The tokenizer records byte spans; the [`LineIndex`]
//! converts them to [`Position`]s on demand. Lines are 1-based and columns
//! are 0-based byte columns, matching what the query layer reports.

use serde::{Deserialize, Serialize};

// ============================================================================
// Span
// ============================================================================

/// A half-open byte range `[start, end)` into UTF-8 source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    /// Inclusive start offset.
    pub start: u32,
    /// Exclusive end offset.
    pub end: u32,
}

impl Span {
    /// Create a new span. `start` must not exceed `end`.
    pub fn new(start: u32, end: u32) -> Self {
        debug_assert!(start <= end, "span start {start} > end {end}");
        Self { start, end }
    }

    /// The empty span at a single offset.
    pub fn at(offset: u32) -> Self {
        Self::new(offset, offset)
    }

    /// Length of the span in bytes.
    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    /// Whether the span covers zero bytes.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether `offset` falls inside the span.
    pub fn contains(&self, offset: u32) -> bool {
        self.start <= offset && offset < self.end
    }

    /// Whether `other` is entirely inside this span.
    pub fn contains_span(&self, other: Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// The smallest span covering both.
    pub fn cover(&self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

// ============================================================================
// Position / SourceRange
// ============================================================================

/// A line/column position: 1-based line, 0-based byte column.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Position {
    /// 1-based line number.
    pub line: u32,
    /// 0-based byte column within the line.
    pub column: u32,
}

impl Position {
    /// Create a new position.
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A pair of positions delimiting a source region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRange {
    /// Start position (inclusive).
    pub start: Position,
    /// End position (exclusive).
    pub end: Position,
}

impl SourceRange {
    /// Create a new range.
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }
}

impl std::fmt::Display for SourceRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

// ============================================================================
// LineIndex
// ============================================================================

/// A precomputed table of line-start offsets for a source buffer.
///
/// Built once per source version, then used for all span-to-position
/// conversions. Recognizes `\n` as the line terminator; `\r\n` sequences
/// fall out naturally because the `\n` still terminates the line.
#[derive(Debug, Clone)]
pub struct LineIndex {
    /// Byte offset of the first character of each line. `line_starts[0]` is
    /// always 0.
    line_starts: Vec<u32>,
    /// Total length of the indexed source.
    len: u32,
}

impl LineIndex {
    /// Build the index from source text.
    pub fn from_source(source: &str) -> Self {
        let mut line_starts = Vec::with_capacity(source.len() / 32 + 1);
        line_starts.push(0);
        for pos in memchr::memchr_iter(b'\n', source.as_bytes()) {
            line_starts.push(pos as u32 + 1);
        }
        Self {
            line_starts,
            len: source.len() as u32,
        }
    }

    /// Number of lines in the source (at least 1, even for empty input).
    pub fn line_count(&self) -> u32 {
        self.line_starts.len() as u32
    }

    /// Convert a byte offset to a position. Offsets past the end clamp to
    /// the final position.
    pub fn position_of(&self, offset: u32) -> Position {
        let offset = offset.min(self.len);
        let line = match self.line_starts.binary_search(&offset) {
            Ok(idx) => idx,
            Err(idx) => idx - 1,
        };
        Position {
            line: line as u32 + 1,
            column: offset - self.line_starts[line],
        }
    }

    /// Convert a position back to a byte offset. Returns `None` when the
    /// line does not exist.
    pub fn offset_of(&self, position: Position) -> Option<u32> {
        if position.line == 0 {
            return None;
        }
        let start = *self.line_starts.get(position.line as usize - 1)?;
        Some((start + position.column).min(self.len))
    }

    /// Convert a byte span to a source range.
    pub fn range_of(&self, span: Span) -> SourceRange {
        SourceRange::new(self.position_of(span.start), self.position_of(span.end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_source_has_one_line() {
        let index = LineIndex::from_source("");
        assert_eq!(index.line_count(), 1);
        assert_eq!(index.position_of(0), Position::new(1, 0));
    }

    #[test]
    fn position_of_offsets() {
        let index = LineIndex::from_source("ab\ncd\n");
        assert_eq!(index.position_of(0), Position::new(1, 0));
        assert_eq!(index.position_of(1), Position::new(1, 1));
        assert_eq!(index.position_of(3), Position::new(2, 0));
        assert_eq!(index.position_of(4), Position::new(2, 1));
        assert_eq!(index.position_of(6), Position::new(3, 0));
    }

    #[test]
    fn position_clamps_past_end() {
        let index = LineIndex::from_source("ab");
        assert_eq!(index.position_of(99), Position::new(1, 2));
    }

    #[test]
    fn offset_of_round_trips() {
        let source = "x = 1\ny = 2\n";
        let index = LineIndex::from_source(source);
        for offset in 0..source.len() as u32 {
            let pos = index.position_of(offset);
            assert_eq!(index.offset_of(pos), Some(offset));
        }
    }

    #[test]
    fn crlf_lines() {
        let index = LineIndex::from_source("ab\r\ncd");
        assert_eq!(index.position_of(4), Position::new(2, 0));
        // The \r belongs to line 1.
        assert_eq!(index.position_of(2), Position::new(1, 2));
    }

    #[test]
    fn span_cover_and_contains() {
        let a = Span::new(2, 5);
        let b = Span::new(4, 9);
        assert_eq!(a.cover(b), Span::new(2, 9));
        assert!(a.contains(4));
        assert!(!a.contains(5));
        assert!(Span::new(0, 10).contains_span(a));
    }
}
