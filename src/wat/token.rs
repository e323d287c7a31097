//! Token types for the WAT lexer.
//!
//! The lexer produces these tokens in source order; the module parser consumes
//! them one at a time.

use fhex::FromHex;
use std::fmt;

/// A location in source text.
///
/// Spans carry byte offsets (for slicing) and a 1-based line/column pair (for
/// diagnostics). Columns count Unicode characters, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// Byte offset where this span starts.
    pub start: usize,
    /// Byte offset just past the end of this span.
    pub end: usize,
    /// Line number (1-indexed).
    pub line: u32,
    /// Column number (1-indexed, counting characters not bytes).
    pub column: u32,
}

impl Span {
    /// A zero-length span at the start of source.
    pub const ZERO: Span = Span {
        start: 0,
        end: 0,
        line: 1,
        column: 1,
    };

    /// Create a span from byte offsets and the line/column of `start`.
    pub fn new(start: usize, end: usize, line: u32, column: u32) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }

    /// Length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Whether the span covers no input, as end-of-input errors do.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A lexical token with its location in source.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// What kind of token this is.
    pub kind: TokenKind,
    /// Where in the source it was found.
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// The source text of this token, sigils and quotes included.
    #[must_use]
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.span.start..self.span.end]
    }

    pub fn is_left_paren(&self) -> bool {
        matches!(self.kind, TokenKind::LeftParen)
    }

    pub fn is_right_paren(&self) -> bool {
        matches!(self.kind, TokenKind::RightParen)
    }

    /// The keyword text, if this is a keyword token.
    pub fn keyword(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Keyword(k) => Some(k),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.kind, self.span)
    }
}

/// The kind of token, with associated data where relevant.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    LeftParen,
    RightParen,

    /// A bare word such as `module`, `func` or `i32.add`.
    Keyword(String),

    /// A symbolic identifier. The stored string excludes the leading `$`.
    Id(String),

    /// A string literal with escapes resolved. WAT strings may hold
    /// arbitrary bytes, so this is not a Rust `String`.
    String(Vec<u8>),

    /// An integer literal with its sign kept apart from its magnitude.
    Integer(SignedValue<u64>),

    Float(FloatLit),
}

impl TokenKind {
    /// Short name of the kind, used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            TokenKind::LeftParen => "'('",
            TokenKind::RightParen => "')'",
            TokenKind::Keyword(_) => "keyword",
            TokenKind::Id(_) => "ID",
            TokenKind::String(_) => "string",
            TokenKind::Integer(_) => "uN",
            TokenKind::Float(_) => "float",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::LeftParen => write!(f, "("),
            TokenKind::RightParen => write!(f, ")"),
            TokenKind::Keyword(s) => write!(f, "{}", s),
            TokenKind::Id(s) => write!(f, "${}", s),
            TokenKind::String(bytes) => {
                write!(f, "\"")?;
                for &b in bytes {
                    if b.is_ascii_graphic() || b == b' ' {
                        write!(f, "{}", b as char)?;
                    } else {
                        write!(f, "\\{:02x}", b)?;
                    }
                }
                write!(f, "\"")
            }
            TokenKind::Integer(sv) => write!(f, "{}", sv),
            TokenKind::Float(fl) => write!(f, "{}", fl),
        }
    }
}

/// A value with an explicit sign.
///
/// Keeps `-0` distinct from `0` and covers the whole u64 range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignedValue<T> {
    /// The magnitude as written.
    pub value: T,
    /// Whether a `-` was written.
    pub negative: bool,
    /// Whether a `+` or `-` was written in the source.
    pub has_sign: bool,
}

impl<T> SignedValue<T> {
    /// A literal written with a `+` or `-`.
    pub fn signed(value: T, negative: bool) -> Self {
        Self {
            value,
            negative,
            has_sign: true,
        }
    }

    /// A literal written without a sign.
    pub fn unsigned(value: T) -> Self {
        Self {
            value,
            negative: false,
            has_sign: false,
        }
    }
}

impl SignedValue<u64> {
    /// The value as an index (`u32`), only for unsigned literals.
    #[must_use]
    pub fn to_index(self) -> Option<u32> {
        if self.has_sign {
            return None;
        }
        u32::try_from(self.value).ok()
    }

    /// Interprets the literal as a 32-bit integer constant.
    ///
    /// Unsigned literals up to `u32::MAX` wrap into the signed range, matching
    /// how `i32.const 0xffffffff` is written in the text format.
    #[must_use]
    pub fn to_i32(self) -> Option<i32> {
        if self.negative {
            if self.value <= 1 << 31 {
                Some((self.value as i64).wrapping_neg() as i32)
            } else {
                None
            }
        } else if self.value <= u32::MAX as u64 {
            Some(self.value as u32 as i32)
        } else {
            None
        }
    }

    /// Interprets the literal as a 64-bit integer constant, wrapping unsigned
    /// values above `i64::MAX`.
    #[must_use]
    pub fn to_i64(self) -> Option<i64> {
        if self.negative {
            if self.value <= 1 << 63 {
                Some((self.value as i64).wrapping_neg())
            } else {
                None
            }
        } else {
            Some(self.value as i64)
        }
    }
}

impl fmt::Display for SignedValue<u64> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.has_sign, self.negative) {
            (true, true) => write!(f, "-{}", self.value),
            (true, false) => write!(f, "+{}", self.value),
            _ => write!(f, "{}", self.value),
        }
    }
}

/// A floating-point literal.
///
/// The digits are kept as written so f32 and f64 conversions each round once
/// from the source text.
#[derive(Debug, Clone, PartialEq)]
pub struct FloatLit {
    pub negative: bool,
    pub magnitude: FloatMagnitude,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FloatMagnitude {
    /// Decimal digits with `_` separators removed, e.g. `1.5e-3`.
    Decimal(String),
    /// Hex digits with `_` separators removed, e.g. `0x1.8p+1`.
    Hex(String),
    Inf,
    /// NaN, with the significand payload when written as `nan:0x...`.
    Nan(Option<u64>),
}

impl FloatLit {
    pub fn new(negative: bool, magnitude: FloatMagnitude) -> Self {
        Self { negative, magnitude }
    }

    /// Converts to f32, or `None` if a finite literal does not fit or a NaN
    /// payload is outside `1..=0x7f_ffff`.
    #[must_use]
    pub fn to_f32(&self) -> Option<f32> {
        let v = match &self.magnitude {
            FloatMagnitude::Decimal(s) => s.parse::<f32>().map_or(None, finite)?,
            FloatMagnitude::Hex(s) => f32::from_hex(s).map_or(None, finite)?,
            FloatMagnitude::Inf => f32::INFINITY,
            FloatMagnitude::Nan(payload) => {
                let payload = payload.unwrap_or(1 << 22);
                if !(1..=0x007f_ffff).contains(&payload) {
                    return None;
                }
                f32::from_bits(0x7f80_0000 | payload as u32)
            }
        };
        Some(if self.negative { -v } else { v })
    }

    /// Converts to f64, or `None` if a finite literal does not fit or a NaN
    /// payload is outside `1..=0xf_ffff_ffff_ffff`.
    #[must_use]
    pub fn to_f64(&self) -> Option<f64> {
        let v = match &self.magnitude {
            FloatMagnitude::Decimal(s) => s.parse::<f64>().map_or(None, finite)?,
            FloatMagnitude::Hex(s) => f64::from_hex(s).map_or(None, finite)?,
            FloatMagnitude::Inf => f64::INFINITY,
            FloatMagnitude::Nan(payload) => {
                let payload = payload.unwrap_or(1 << 51);
                if !(1..=0x000f_ffff_ffff_ffff).contains(&payload) {
                    return None;
                }
                f64::from_bits(0x7ff0_0000_0000_0000 | payload)
            }
        };
        Some(if self.negative { -v } else { v })
    }
}

/// Rounding a written number up to infinity is an overflow, not a value.
fn finite<F: Into<f64> + Copy>(v: F) -> Option<F> {
    if v.into().is_finite() {
        Some(v)
    } else {
        None
    }
}

impl fmt::Display for FloatLit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            write!(f, "-")?;
        }
        match &self.magnitude {
            FloatMagnitude::Decimal(s) | FloatMagnitude::Hex(s) => write!(f, "{}", s),
            FloatMagnitude::Inf => write!(f, "inf"),
            FloatMagnitude::Nan(None) => write!(f, "nan"),
            FloatMagnitude::Nan(Some(p)) => write!(f, "nan:0x{:x}", p),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_display() {
        let span = Span::new(0, 5, 3, 7);
        assert_eq!(span.to_string(), "3:7");
        assert_eq!(span.len(), 5);
    }

    #[test]
    fn integer_to_index() {
        assert_eq!(SignedValue::unsigned(9u64).to_index(), Some(9));
        assert_eq!(SignedValue::unsigned(u32::MAX as u64 + 1).to_index(), None);
        // A sign makes it an integer constant, never an index.
        assert_eq!(SignedValue::signed(9u64, false).to_index(), None);
    }

    #[test]
    fn integer_to_i32_wraps_unsigned() {
        assert_eq!(SignedValue::unsigned(0xffff_ffffu64).to_i32(), Some(-1));
        assert_eq!(SignedValue::signed(0x8000_0000u64, true).to_i32(), Some(i32::MIN));
        assert_eq!(SignedValue::signed(0x8000_0001u64, true).to_i32(), None);
        assert_eq!(SignedValue::unsigned(0x1_0000_0000u64).to_i32(), None);
    }

    #[test]
    fn integer_to_i64() {
        assert_eq!(SignedValue::unsigned(u64::MAX).to_i64(), Some(-1));
        assert_eq!(SignedValue::signed(1u64 << 63, true).to_i64(), Some(i64::MIN));
        assert_eq!(SignedValue::signed(0u64, true).to_i64(), Some(0));
    }

    #[test]
    fn float_conversions() {
        let half = FloatLit::new(true, FloatMagnitude::Decimal("0.5".into()));
        assert_eq!(half.to_f64(), Some(-0.5));
        assert_eq!(half.to_f32(), Some(-0.5));

        let three = FloatLit::new(false, FloatMagnitude::Hex("0x1.8p+1".into()));
        assert_eq!(three.to_f64(), Some(3.0));

        let nan = FloatLit::new(false, FloatMagnitude::Nan(Some(0x1234)));
        assert_eq!(nan.to_f32().map(f32::to_bits), Some(0x7f80_1234));
        let canonical = FloatLit::new(true, FloatMagnitude::Nan(None));
        assert_eq!(canonical.to_f64().map(f64::to_bits), Some(0xfff8_0000_0000_0000));
        assert_eq!(FloatLit::new(false, FloatMagnitude::Inf).to_f32(), Some(f32::INFINITY));
    }

    #[test]
    fn float_conversions_reject_what_does_not_fit() {
        let nan = |payload| FloatLit::new(false, FloatMagnitude::Nan(Some(payload)));
        assert_eq!(nan(0).to_f32(), None);
        assert_eq!(nan(0x80_0000).to_f32(), None);
        assert!(nan(0x7f_ffff).to_f32().is_some());
        assert!(nan(0x80_0000).to_f64().is_some());
        assert_eq!(nan(0x10_0000_0000_0000).to_f64(), None);

        let big = FloatLit::new(false, FloatMagnitude::Decimal("1e39".into()));
        assert_eq!(big.to_f32(), None);
        assert_eq!(big.to_f64(), Some(1e39));
        assert_eq!(FloatLit::new(true, FloatMagnitude::Decimal("1e309".into())).to_f64(), None);
    }

    #[test]
    fn token_kind_display() {
        assert_eq!(TokenKind::Id("name".into()).to_string(), "$name");
        assert_eq!(TokenKind::String(vec![b'h', 0x00]).to_string(), "\"h\\00\"");
        assert_eq!(TokenKind::Integer(SignedValue::signed(42, true)).to_string(), "-42");
        assert_eq!(
            TokenKind::Float(FloatLit::new(true, FloatMagnitude::Inf)).to_string(),
            "-inf"
        );
    }

    #[test]
    fn token_text_keeps_sigil() {
        let source = "(module $test)";
        let token = Token::new(TokenKind::Id("test".into()), Span::new(8, 13, 1, 9));
        assert_eq!(token.text(source), "$test");
        assert_eq!(token.to_string(), "$test at 1:9");
    }
}
