//! Source files and byte-offset to line/column mapping.
//!
//! Every other crate refers to source text only through [`SourceFile`]:
//! the lexer scans its buffer, the parser slices lexemes out of it, and
//! diagnostics resolve byte offsets into 1-based line/column pairs.

use serde::{Deserialize, Serialize};

/// Half-open byte range `[start, end)` into a source buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Smallest span enclosing both `self` and `other`.
    pub fn to(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Resolved source position attached to diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub offset: usize,
}

impl Location {
    pub fn unknown() -> Self {
        Self {
            file: "<unknown>".to_string(),
            line: 0,
            column: 0,
            offset: 0,
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// An immutable source buffer with a precomputed line-start table.
///
/// `\n`, `\r`, and `\r\n` all terminate a line; a `\r\n` pair counts once.
#[derive(Debug, Clone)]
pub struct SourceFile {
    name: String,
    src: String,
    line_starts: Vec<usize>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, src: impl Into<String>) -> Self {
        let src = src.into();
        let bytes = src.as_bytes();
        let mut line_starts = vec![0usize];
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'\n' => {
                    line_starts.push(i + 1);
                    i += 1;
                }
                b'\r' => {
                    if bytes.get(i + 1) == Some(&b'\n') {
                        line_starts.push(i + 2);
                        i += 2;
                    } else {
                        line_starts.push(i + 1);
                        i += 1;
                    }
                }
                _ => i += 1,
            }
        }
        Self {
            name: name.into(),
            src,
            line_starts,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.src
    }

    pub fn len(&self) -> usize {
        self.src.len()
    }

    pub fn is_empty(&self) -> bool {
        self.src.is_empty()
    }

    /// Character starting at `offset`, or `None` past the end.
    pub fn char_at(&self, offset: usize) -> Option<char> {
        self.src.get(offset..).and_then(|s| s.chars().next())
    }

    /// 1-based line and column for a byte offset, via binary search over the
    /// line-start table.
    pub fn line_col(&self, offset: usize) -> (u32, u32) {
        let line_idx = self.line_starts.partition_point(|&s| s <= offset) - 1;
        let col = offset - self.line_starts[line_idx] + 1;
        (line_idx as u32 + 1, col as u32)
    }

    /// Source text of line `line` (1-based), without its terminator.
    pub fn line_text(&self, line: u32) -> Option<&str> {
        let idx = line.checked_sub(1)? as usize;
        let start = *self.line_starts.get(idx)?;
        let end = self
            .line_starts
            .get(idx + 1)
            .copied()
            .unwrap_or(self.src.len());
        let text = self.src.get(start..end)?;
        Some(text.trim_end_matches(['\n', '\r']))
    }

    pub fn location(&self, offset: usize) -> Location {
        let (line, column) = self.line_col(offset.min(self.src.len()));
        Location {
            file: self.name.clone(),
            line,
            column,
            offset,
        }
    }

    pub fn slice(&self, span: Span) -> &str {
        self.src.get(span.start..span.end).unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_col_lf() {
        let file = SourceFile::new("t.kei", "ab\ncd\ne");
        assert_eq!(file.line_col(0), (1, 1));
        assert_eq!(file.line_col(1), (1, 2));
        assert_eq!(file.line_col(3), (2, 1));
        assert_eq!(file.line_col(6), (3, 1));
    }

    #[test]
    fn test_crlf_counts_once() {
        let file = SourceFile::new("t.kei", "ab\r\ncd\rx");
        assert_eq!(file.line_col(4), (2, 1));
        assert_eq!(file.line_col(7), (3, 1));
    }

    #[test]
    fn test_char_at_past_end() {
        let file = SourceFile::new("t.kei", "xy");
        assert_eq!(file.char_at(0), Some('x'));
        assert_eq!(file.char_at(2), None);
        assert_eq!(file.char_at(100), None);
    }

    #[test]
    fn test_line_text() {
        let file = SourceFile::new("t.kei", "let x = 1;\nlet y = 2;\n");
        assert_eq!(file.line_text(2), Some("let y = 2;"));
        assert_eq!(file.line_text(9), None);
    }

    #[test]
    fn test_span_join() {
        let a = Span::new(2, 5);
        let b = Span::new(4, 9);
        assert_eq!(a.to(b), Span::new(2, 9));
    }
}
