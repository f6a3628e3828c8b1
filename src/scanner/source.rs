use crate::error::Error;
use std::fmt;

/// A location inside a template source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    /// 1-based line number
    pub line: usize,
    /// 1-based column, counted in characters
    pub column: usize,
    /// Byte offset into the source
    pub offset: usize,
}

impl Position {
    /// Compute the line and column of a byte offset
    pub fn locate(src: &str, offset: usize) -> Self {
        let mut offset = offset.min(src.len());
        while !src.is_char_boundary(offset) {
            offset -= 1;
        }

        let before = &src[..offset];
        let line = before.matches('\n').count() + 1;
        let column = before
            .rsplit('\n')
            .next()
            .map(|tail| tail.chars().count())
            .unwrap_or(0)
            + 1;

        Self {
            line,
            column,
            offset,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Template text with helpers for producing located errors
#[derive(Debug, Clone, Copy)]
pub struct Source<'a> {
    text: &'a str,
}

impl<'a> Source<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { text }
    }

    pub fn text(&self) -> &'a str {
        self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn position(&self, offset: usize) -> Position {
        Position::locate(self.text, offset)
    }

    /// Build a syntax error pointing at `offset`
    pub fn error_at(&self, offset: usize, message: impl Into<String>) -> Error {
        Error::syntax(message, self.position(offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate_first_line() {
        let pos = Position::locate("hello", 2);
        assert_eq!(pos.line, 1);
        assert_eq!(pos.column, 3);
        assert_eq!(pos.offset, 2);
    }

    #[test]
    fn test_locate_after_newlines() {
        let src = "one\ntwo\nthree";
        let pos = Position::locate(src, src.find("three").unwrap());
        assert_eq!((pos.line, pos.column), (3, 1));
    }

    #[test]
    fn test_columns_count_characters() {
        let src = "héllo {{";
        let pos = Position::locate(src, src.find("{{").unwrap());
        assert_eq!(pos.column, 7);
    }

    #[test]
    fn test_offset_is_clamped() {
        let pos = Position::locate("ab", 99);
        assert_eq!(pos.offset, 2);
        assert_eq!(pos.column, 3);
    }

    #[test]
    fn test_error_at() {
        let source = Source::new("a\nb {{");
        let err = source.error_at(4, "expected close tag");
        assert_eq!(
            err.to_string(),
            "expected close tag (line 2, column 3)"
        );
        assert_eq!(err.position().map(|p| p.line), Some(2));
    }
}
