use serde::{Deserialize, Serialize};
use std::fmt;

/// Source location span.
///
/// `start`/`end` are byte offsets into the source; `line`/`col` are the
/// 1-based position of `start`. Columns count characters, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: u32,
    pub end: u32,
    pub line: u32,
    #[serde(rename = "column")]
    pub col: u32,
}

impl Span {
    /// Create a new span.
    pub fn new(start: u32, end: u32, line: u32, col: u32) -> Self {
        Self {
            start,
            end,
            line,
            col,
        }
    }

    /// Create a zero-width span at a single position.
    pub fn point(offset: u32, line: u32, col: u32) -> Self {
        Self::new(offset, offset, line, col)
    }

    /// Length of the span in bytes.
    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    /// Returns `true` for a zero-width span.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Merge two spans into one that covers both.
    pub fn merge(self, other: Span) -> Span {
        let (first, _) = if self.start <= other.start {
            (self, other)
        } else {
            (other, self)
        };
        Span::new(
            first.start,
            self.end.max(other.end),
            first.line,
            first.col,
        )
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// Holds the source text for error reporting.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub source: String,
    /// Cached line start byte offsets for fast line lookup.
    line_starts: Vec<usize>,
}

impl SourceFile {
    /// Create a new source file.
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        let source = source.into();
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self {
            name: name.into(),
            source,
            line_starts,
        }
    }

    /// Extract a source line by 1-based line number.
    ///
    /// Returns `None` if the line number is out of range.
    pub fn line(&self, line_number: u32) -> Option<&str> {
        let idx = line_number.checked_sub(1)? as usize;
        if idx >= self.line_starts.len() {
            return None;
        }
        let start = self.line_starts[idx];
        let end = self
            .line_starts
            .get(idx + 1)
            .map(|&s| s.saturating_sub(1)) // strip the \n
            .unwrap_or(self.source.len());
        let line = &self.source[start..end];
        // Also strip trailing \r for CRLF
        Some(line.trim_end_matches('\r'))
    }

    /// Get the total number of lines.
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Convert a byte offset into a 1-based `(line, column)` pair.
    ///
    /// Offsets past the end clamp to the end of the source; offsets inside a
    /// multi-byte character resolve to that character's column.
    pub fn position(&self, offset: usize) -> (u32, u32) {
        let offset = offset.min(self.source.len());
        let idx = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let start = self.line_starts[idx];
        let col = self.source[start..]
            .char_indices()
            .take_while(|(i, _)| start + i < offset)
            .count();
        (idx as u32 + 1, col as u32 + 1)
    }

    /// Build a span covering `start..end` (byte offsets).
    pub fn span(&self, start: usize, end: usize) -> Span {
        let (line, col) = self.position(start);
        Span::new(start as u32, end.max(start) as u32, line, col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_point() {
        let s = Span::point(4, 1, 5);
        assert_eq!(s.start, 4);
        assert_eq!(s.end, 4);
        assert_eq!(s.line, 1);
        assert_eq!(s.col, 5);
        assert!(s.is_empty());
    }

    #[test]
    fn test_span_merge() {
        let a = Span::new(4, 9, 1, 5);
        let b = Span::new(12, 17, 2, 3);
        let merged = a.merge(b);
        assert_eq!(merged.start, 4);
        assert_eq!(merged.end, 17);
        assert_eq!(merged.line, 1);
        assert_eq!(merged.col, 5);
    }

    #[test]
    fn test_span_merge_reversed() {
        let a = Span::new(10, 12, 1, 11);
        let b = Span::new(2, 4, 1, 3);
        let merged = a.merge(b);
        assert_eq!(merged.start, 2);
        assert_eq!(merged.end, 12);
        assert_eq!(merged.col, 3);
    }

    #[test]
    fn test_span_display() {
        let s = Span::new(0, 8, 3, 7);
        assert_eq!(format!("{s}"), "3:7");
    }

    #[test]
    fn test_span_json_uses_column() {
        let json = serde_json::to_string(&Span::new(0, 1, 1, 1)).unwrap();
        assert!(json.contains("\"column\":1"));
    }

    #[test]
    fn test_source_file_line_extraction() {
        let src = SourceFile::new("test.fx", "line one\nline two\nline three");
        assert_eq!(src.line(1), Some("line one"));
        assert_eq!(src.line(2), Some("line two"));
        assert_eq!(src.line(3), Some("line three"));
        assert_eq!(src.line(0), None);
        assert_eq!(src.line(4), None);
    }

    #[test]
    fn test_source_file_crlf() {
        let src = SourceFile::new("test.fx", "line one\r\nline two\r\n");
        assert_eq!(src.line(1), Some("line one"));
        assert_eq!(src.line(2), Some("line two"));
    }

    #[test]
    fn test_source_file_line_count() {
        let src = SourceFile::new("test.fx", "a\nb\nc");
        assert_eq!(src.line_count(), 3);
    }

    #[test]
    fn test_source_file_empty() {
        let src = SourceFile::new("test.fx", "");
        assert_eq!(src.line_count(), 1);
        assert_eq!(src.line(1), Some(""));
    }

    #[test]
    fn test_position_of_offsets() {
        let src = SourceFile::new("test.fx", "ab\ncd\n");
        assert_eq!(src.position(0), (1, 1));
        assert_eq!(src.position(1), (1, 2));
        assert_eq!(src.position(3), (2, 1));
        assert_eq!(src.position(4), (2, 2));
        assert_eq!(src.position(100), (3, 1));
    }

    #[test]
    fn test_position_counts_characters() {
        let src = SourceFile::new("test.fx", "\"é\" + x");
        // `é` is two bytes; `+` sits at byte 5 but column 5.
        assert_eq!(src.position(5), (1, 5));
    }
}
