//! Lexer for the WebAssembly Text Format.
//!
//! An iterator over [`Token`]s. Whitespace, `;;` line comments and nested
//! `(; ;)` block comments are skipped. Parenthesis balance is tracked here so
//! the parser never sees an unmatched `)`.
//!
//! ```
//! use watmod::wat::{Lexer, TokenKind};
//!
//! let tokens = Lexer::tokenise("(module $m)").unwrap();
//! assert!(matches!(tokens[2].kind, TokenKind::Id(ref id) if id == "m"));
//! ```

use super::cursor::{Cursor, Position};
use super::error::LexError;
use super::token::{FloatLit, FloatMagnitude, SignedValue, Token, TokenKind};

pub struct Lexer<'a> {
    cursor: Cursor<'a>,
    /// Number of `(` tokens not yet closed.
    depth: usize,
    /// Set once the input is exhausted or an error was returned.
    finished: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            cursor: Cursor::new(source),
            depth: 0,
            finished: false,
        }
    }

    /// Tokenises the entire source, returning all tokens or the first error.
    pub fn tokenise(source: &str) -> Result<Vec<Token>, LexError> {
        Lexer::new(source).collect()
    }

    fn error(&self, message: impl Into<String>, pos: Position) -> LexError {
        LexError::new(message, pos.span_here())
    }

    fn next_token(&mut self) -> Result<Option<Token>, LexError> {
        self.skip_whitespace_and_comments()?;

        let start = self.cursor.position();
        let Some(c) = self.cursor.peek() else {
            if self.depth > 0 {
                return Err(self.error("unexpected end of input: unbalanced '('", start));
            }
            return Ok(None);
        };

        let kind = match c {
            '(' => {
                self.cursor.advance();
                self.depth += 1;
                TokenKind::LeftParen
            }
            ')' => {
                if self.depth == 0 {
                    return Err(self.error("unbalanced ')'", start));
                }
                self.cursor.advance();
                self.depth -= 1;
                TokenKind::RightParen
            }
            '"' => {
                let kind = self.lex_string()?;
                self.check_token_boundary(start)?;
                kind
            }
            '$' => {
                self.cursor.advance();
                let name = self.cursor.take_while(is_idchar);
                if name.is_empty() {
                    return Err(self.error("expected identifier after '$'", start));
                }
                self.check_token_boundary(start)?;
                TokenKind::Id(name.to_string())
            }
            c if is_idchar(c) => {
                let word = self.cursor.take_while(is_idchar);
                self.check_token_boundary(start)?;
                classify_word(word).ok_or_else(|| self.error(format!("unknown operator: {}", word), start))?
            }
            c => {
                self.cursor.advance();
                return Err(self.error(format!("unexpected character: {:?}", c), start));
            }
        };

        Ok(Some(Token::new(kind, start.span_to(&self.cursor.position()))))
    }

    /// Whitespace, parens, comment starts and end of input end a token. WAT
    /// requires one of these between tokens, so `1x` or `"a""b"` are errors.
    fn check_token_boundary(&self, start: Position) -> Result<(), LexError> {
        match self.cursor.peek() {
            None | Some('(' | ')' | ';') => Ok(()),
            Some(c) if c.is_ascii_whitespace() => Ok(()),
            Some(_) => Err(self.error(
                format!("unknown operator: {}", self.cursor.slice_from(&start)),
                start,
            )),
        }
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), LexError> {
        loop {
            self.cursor.take_while(|c| c.is_ascii_whitespace());
            if self.cursor.starts_with(";;") {
                self.cursor.take_while(|c| c != '\n');
            } else if self.cursor.starts_with("(;") {
                self.skip_block_comment()?;
            } else {
                return Ok(());
            }
        }
    }

    fn skip_block_comment(&mut self) -> Result<(), LexError> {
        let start = self.cursor.position();
        self.cursor.advance_by(2);
        let mut nesting = 1;
        while nesting > 0 {
            if self.cursor.starts_with("(;") {
                self.cursor.advance_by(2);
                nesting += 1;
            } else if self.cursor.starts_with(";)") {
                self.cursor.advance_by(2);
                nesting -= 1;
            } else if self.cursor.advance().is_none() {
                return Err(self.error("unterminated block comment", start));
            }
        }
        Ok(())
    }

    fn lex_string(&mut self) -> Result<TokenKind, LexError> {
        let start = self.cursor.position();
        self.cursor.advance();

        let mut bytes = Vec::new();
        loop {
            match self.cursor.advance() {
                None => return Err(self.error("unterminated string", start)),
                Some('"') => return Ok(TokenKind::String(bytes)),
                Some('\\') => self.lex_escape(&mut bytes)?,
                Some(c) if (c as u32) < 0x20 || c == '\u{7f}' => {
                    return Err(self.error(format!("invalid character in string: {:?}", c), start))
                }
                Some(c) => {
                    let mut buf = [0u8; 4];
                    bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                }
            }
        }
    }

    fn lex_escape(&mut self, bytes: &mut Vec<u8>) -> Result<(), LexError> {
        let pos = self.cursor.position();
        let c = self
            .cursor
            .advance()
            .ok_or_else(|| self.error("unterminated string", pos))?;

        match c {
            't' => bytes.push(b'\t'),
            'n' => bytes.push(b'\n'),
            'r' => bytes.push(b'\r'),
            '"' => bytes.push(b'"'),
            '\'' => bytes.push(b'\''),
            '\\' => bytes.push(b'\\'),
            'u' => {
                if self.cursor.advance() != Some('{') {
                    return Err(self.error("expected '{' after \\u", pos));
                }
                let digits = self.cursor.take_while(|c| c.is_ascii_hexdigit() || c == '_');
                let c = clean_digits(digits, 16)
                    .and_then(|d| u32::from_str_radix(&d, 16).ok())
                    .and_then(char::from_u32)
                    .ok_or_else(|| self.error(format!("invalid unicode escape: \\u{{{}}}", digits), pos))?;
                if self.cursor.advance() != Some('}') {
                    return Err(self.error("expected '}' in unicode escape", pos));
                }
                let mut buf = [0u8; 4];
                bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
            high if high.is_ascii_hexdigit() => {
                let low = self
                    .cursor
                    .advance()
                    .and_then(|c| c.to_digit(16))
                    .ok_or_else(|| self.error("invalid hex escape", pos))?;
                // Both digits are below 16, so the byte cannot overflow.
                let high = high.to_digit(16).unwrap_or(0);
                bytes.push((high * 16 + low) as u8);
            }
            other => return Err(self.error(format!("invalid escape sequence: \\{}", other), pos)),
        }
        Ok(())
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_token() {
            Ok(Some(token)) => Some(Ok(token)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// Decides what a run of idchars is: a number, a special float or a keyword.
/// Returns `None` for words that start like a number but are malformed.
fn classify_word(word: &str) -> Option<TokenKind> {
    let (negative, has_sign, body) = match word.as_bytes()[0] {
        b'-' => (true, true, &word[1..]),
        b'+' => (false, true, &word[1..]),
        _ => (false, false, word),
    };

    let numeric = body.starts_with(|c: char| c.is_ascii_digit()) || body == "inf" || body.starts_with("nan");
    if !numeric {
        return if body.is_empty() || !has_sign || body.starts_with(|c: char| c.is_ascii_alphabetic()) {
            // `-`, `+` and words like `-foo` are not numbers in any form.
            Some(TokenKind::Keyword(word.to_string()))
        } else {
            None
        };
    }

    let magnitude = match body {
        "inf" => FloatMagnitude::Inf,
        "nan" => FloatMagnitude::Nan(None),
        _ if body.starts_with("nan:0x") => {
            let payload = clean_digits(&body[6..], 16).and_then(|d| u64::from_str_radix(&d, 16).ok())?;
            if payload == 0 {
                return None;
            }
            FloatMagnitude::Nan(Some(payload))
        }
        _ if body.starts_with("nan") => return Some(TokenKind::Keyword(word.to_string())),
        _ => {
            let (radix, digits, exponent_marks) = match body.strip_prefix("0x") {
                Some(hex) => (16, hex, ['p', 'P']),
                None => (10, body, ['e', 'E']),
            };
            let (mantissa, exponent) = match digits.find(exponent_marks) {
                Some(at) => (&digits[..at], Some(&digits[at + 1..])),
                None => (digits, None),
            };
            let (whole, fraction) = match mantissa.find('.') {
                Some(at) => (&mantissa[..at], Some(&mantissa[at + 1..])),
                None => (mantissa, None),
            };

            let whole = clean_digits(whole, radix)?;
            if fraction.is_none() && exponent.is_none() {
                if let Ok(value) = u64::from_str_radix(&whole, radix) {
                    let value = if has_sign {
                        SignedValue::signed(value, negative)
                    } else {
                        SignedValue::unsigned(value)
                    };
                    return Some(TokenKind::Integer(value));
                }
                // Too large for an integer, so only meaningful as a float.
            }

            let mut text = whole;
            if let Some(fraction) = fraction {
                text.push('.');
                if !fraction.is_empty() {
                    text.push_str(&clean_digits(fraction, radix)?);
                }
            }
            if let Some(exponent) = exponent {
                let (sign, exp_digits) = match exponent.as_bytes().first() {
                    Some(b'+') => ("+", &exponent[1..]),
                    Some(b'-') => ("-", &exponent[1..]),
                    _ => ("", exponent),
                };
                text.push(if radix == 16 { 'p' } else { 'e' });
                text.push_str(sign);
                text.push_str(&clean_digits(exp_digits, 10)?);
            }

            if radix == 16 {
                FloatMagnitude::Hex(format!("0x{}", text))
            } else {
                FloatMagnitude::Decimal(text)
            }
        }
    };

    Some(TokenKind::Float(FloatLit::new(negative, magnitude)))
}

/// Strips `_` separators from a digit group. Separators may only sit between
/// two digits; an empty group or a stray character is rejected.
fn clean_digits(group: &str, radix: u32) -> Option<String> {
    if group.is_empty() || group.starts_with('_') || group.ends_with('_') || group.contains("__") {
        return None;
    }
    if !group.chars().all(|c| c == '_' || c.is_digit(radix)) {
        return None;
    }
    Some(group.chars().filter(|&c| c != '_').collect())
}

/// Characters allowed in keywords and `$` identifiers.
fn is_idchar(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(
            c,
            '!' | '#'
                | '$'
                | '%'
                | '&'
                | '\''
                | '*'
                | '+'
                | '-'
                | '.'
                | '/'
                | ':'
                | '<'
                | '='
                | '>'
                | '?'
                | '@'
                | '\\'
                | '^'
                | '_'
                | '`'
                | '|'
                | '~'
        )
}
