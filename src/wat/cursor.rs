//! Character cursor over WAT source, tracking line and column.

use super::token::Span;

/// A saved position in source text.
///
/// Taken before a token is consumed, so the token's span can run from here to
/// wherever the cursor stops.
#[derive(Debug, Clone, Copy)]
pub struct Position {
    /// Byte offset from start of source.
    pub offset: usize,
    /// Line number (1-indexed).
    pub line: u32,
    /// Column number (1-indexed, counts characters).
    pub column: u32,
}

impl Position {
    /// A span from this position up to `end`.
    #[must_use]
    pub fn span_to(self, end: &Position) -> Span {
        Span::new(self.offset, end.offset, self.line, self.column)
    }

    /// A zero-length span at this position.
    #[must_use]
    pub fn span_here(self) -> Span {
        Span::new(self.offset, self.offset, self.line, self.column)
    }
}

/// Walks source text one character at a time.
///
/// Columns count characters, so a multi-byte character still advances the
/// column by one.
pub struct Cursor<'a> {
    /// The complete source text.
    source: &'a str,
    /// Byte offset of the next character.
    offset: usize,
    /// Line number of the next character (1-indexed).
    line: u32,
    /// Column number of the next character (1-indexed, counts characters).
    column: u32,
}

impl<'a> Cursor<'a> {
    /// A cursor at the start of `source`.
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            offset: 0,
            line: 1,
            column: 1,
        }
    }

    /// The current position.
    pub fn position(&self) -> Position {
        Position {
            offset: self.offset,
            line: self.line,
            column: self.column,
        }
    }

    /// Source text from the current position on.
    fn remaining(&self) -> &'a str {
        &self.source[self.offset..]
    }

    /// The next character, without consuming it.
    pub fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    /// Whether the remaining input starts with `prefix`.
    pub fn starts_with(&self, prefix: &str) -> bool {
        self.remaining().starts_with(prefix)
    }

    /// Consumes and returns the next character, updating line and column.
    pub fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.offset += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    /// Consumes `n` characters.
    pub fn advance_by(&mut self, n: usize) {
        for _ in 0..n {
            self.advance();
        }
    }

    /// Consumes characters while `predicate` holds and returns them.
    pub fn take_while(&mut self, predicate: impl Fn(char) -> bool) -> &'a str {
        let start = self.offset;
        while let Some(c) = self.peek() {
            if !predicate(c) {
                break;
            }
            self.advance();
        }
        &self.source[start..self.offset]
    }

    /// The text between `start` and the current position.
    pub fn slice_from(&self, start: &Position) -> &'a str {
        &self.source[start.offset..self.offset]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newlines_reset_column() {
        let mut cursor = Cursor::new("a\nb");
        cursor.advance();
        cursor.advance();
        let pos = cursor.position();
        assert_eq!((pos.line, pos.column, pos.offset), (2, 1, 2));
    }

    #[test]
    fn columns_count_characters() {
        let mut cursor = Cursor::new("a\u{1F600}b");
        cursor.advance_by(2);
        let pos = cursor.position();
        assert_eq!(pos.offset, 5);
        assert_eq!(pos.column, 3);
        assert_eq!(cursor.peek(), Some('b'));
    }

    #[test]
    fn take_while_returns_consumed_text() {
        let mut cursor = Cursor::new("abc)");
        let start = cursor.position();
        assert_eq!(cursor.take_while(|c| c.is_ascii_alphabetic()), "abc");
        assert_eq!(cursor.slice_from(&start), "abc");
        assert_eq!(cursor.peek(), Some(')'));
        assert!(cursor.starts_with(")"));
    }

    #[test]
    fn eof() {
        let mut cursor = Cursor::new("x");
        assert_eq!(cursor.advance(), Some('x'));
        assert_eq!(cursor.peek(), None);
        assert_eq!(cursor.advance(), None);
    }
}
