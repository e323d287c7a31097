//! Error types for WAT parsing.

use super::token::{Span, Token, TokenKind};
use thiserror::Error;

/// An error encountered during lexical analysis.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{span}: {message}")]
#[must_use]
pub struct LexError {
    pub message: String,
    pub span: Span,
}

impl LexError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

/// An index namespace that symbolic identifiers resolve in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Type,
    Func,
    Local,
    Global,
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Namespace::Type => "type",
            Namespace::Func => "function",
            Namespace::Local => "local",
            Namespace::Global => "global",
        })
    }
}

/// What went wrong, without the position or field context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("{0}")]
    Lex(String),

    #[error("missing module field")]
    MissingModule,

    #[error("expected '(', but found {found}")]
    ExpectedLParen { found: String },

    #[error("expected field, but found {found}")]
    ExpectedField { found: String },

    #[error("unexpected field: {0}")]
    UnexpectedField(String),

    #[error("unexpected '('")]
    UnexpectedLParen,

    #[error("unexpected {kind}: {text}")]
    UnexpectedToken { kind: &'static str, text: String },

    #[error("unexpected trailing characters: {0}")]
    TrailingCharacters(String),

    #[error("redundant ID {0}")]
    RedundantId(String),

    #[error("redundant name: {0}")]
    RedundantName(String),

    #[error("redundant start")]
    RedundantStart,

    #[error("redundant index: {0}")]
    RedundantIndex(String),

    #[error("missing func field")]
    MissingFuncField,

    #[error("missing module and name")]
    MissingModuleAndName,

    #[error("missing name")]
    MissingName,

    #[error("missing description field")]
    MissingDescription,

    #[error("missing index")]
    MissingIndex,

    #[error("duplicate name {0:?}")]
    DuplicateName(String),

    #[error("duplicate identifier: ${0}")]
    DuplicateId(String),

    #[error("import after function")]
    ImportAfterFunction,

    #[error("unknown type: {0}")]
    UnknownValueType(String),

    #[error("malformed UTF-8 encoding")]
    MalformedUtf8,

    #[error("index out of range: {0}")]
    IndexOutOfRange(String),

    #[error("unknown {namespace}: {reference}")]
    Unresolved { namespace: Namespace, reference: String },

    #[error("unknown instruction: {0}")]
    UnknownInstruction(String),

    #[error("unsupported instruction: {0}")]
    UnsupportedInstruction(String),

    #[error("constant out of range: {0}")]
    ConstantOutOfRange(String),

    #[error("missing immediate for {0}")]
    MissingImmediate(String),

    #[error("relocation outside function body at offset {0}")]
    BadRelocation(usize),
}

/// A positioned parse failure: the single diagnostic a failed parse returns.
///
/// `context` is the dotted field path the parser was in, such as
/// `module.import[2].func`, or empty when no field had been entered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{line}:{column}: {kind}{}", in_context(.context))]
pub struct FormatError {
    pub line: u32,
    pub column: u32,
    pub context: String,
    #[source]
    pub kind: ParseErrorKind,
}

impl FormatError {
    pub fn new(span: Span, context: impl Into<String>, kind: ParseErrorKind) -> Self {
        Self {
            line: span.line,
            column: span.column,
            context: context.into(),
            kind,
        }
    }
}

fn in_context(context: &str) -> String {
    if context.is_empty() {
        String::new()
    } else {
        format!(" in {}", context)
    }
}

impl ParseErrorKind {
    /// The error for a token where a `(` was required.
    pub fn expected_lparen(token: &Token) -> Self {
        ParseErrorKind::ExpectedLParen { found: found(token) }
    }

    /// The error for a token where a field keyword was required after `(`.
    pub fn expected_field(token: &Token) -> Self {
        ParseErrorKind::ExpectedField { found: found(token) }
    }

    /// The error for a token that has no place at the current position.
    pub fn unexpected(token: &Token) -> Self {
        match &token.kind {
            // An unbalanced ')' never gets this far, the lexer rejects it.
            TokenKind::LeftParen => ParseErrorKind::UnexpectedLParen,
            kind => ParseErrorKind::UnexpectedToken {
                kind: kind.name(),
                text: kind.to_string(),
            },
        }
    }
}

fn found(token: &Token) -> String {
    match &token.kind {
        TokenKind::LeftParen | TokenKind::RightParen => token.kind.name().to_string(),
        kind => format!("{}: {}", kind.name(), kind),
    }
}

impl From<LexError> for ParseErrorKind {
    fn from(e: LexError) -> Self {
        ParseErrorKind::Lex(e.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lex_error_display() {
        let err = LexError::new("unexpected character", Span::new(10, 11, 3, 5));
        assert_eq!(err.to_string(), "3:5: unexpected character");
    }

    #[test]
    fn format_error_display() {
        let err = FormatError::new(
            Span::new(0, 0, 1, 30),
            "module.import[0]",
            ParseErrorKind::MissingName,
        );
        assert_eq!(err.to_string(), "1:30: missing name in module.import[0]");

        let err = FormatError::new(
            Span::ZERO,
            "",
            ParseErrorKind::ExpectedLParen {
                found: "keyword: module".into(),
            },
        );
        assert_eq!(err.to_string(), "1:1: expected '(', but found keyword: module");
    }

    #[test]
    fn unexpected_token() {
        let paren = Token::new(TokenKind::LeftParen, Span::ZERO);
        assert_eq!(ParseErrorKind::unexpected(&paren).to_string(), "unexpected '('");

        let id = Token::new(TokenKind::Id("x".into()), Span::ZERO);
        assert_eq!(ParseErrorKind::unexpected(&id).to_string(), "unexpected ID: $x");
        assert_eq!(
            ParseErrorKind::expected_field(&id).to_string(),
            "expected field, but found ID: $x"
        );
        let close = Token::new(TokenKind::RightParen, Span::ZERO);
        assert_eq!(
            ParseErrorKind::expected_lparen(&close).to_string(),
            "expected '(', but found ')'"
        );
    }

    #[test]
    fn unresolved_display() {
        let kind = ParseErrorKind::Unresolved {
            namespace: Namespace::Func,
            reference: "$main".into(),
        };
        assert_eq!(kind.to_string(), "unknown function: $main");
    }
}
