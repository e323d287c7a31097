//! Parser for a single index reference, as in `(start $main)` or
//! `(export "run" (func 0))`.

use super::error::ParseErrorKind;
use super::token::{Token, TokenKind};
use crate::module::{Index, Reference};

/// Reads one numeral or `$id`, then the closing `)` of the field holding it.
///
/// Which namespace the index belongs to is not checked here; that is left to
/// the binder.
#[derive(Debug, Default)]
pub struct IndexParser {
    index: Option<Reference>,
}

impl IndexParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self) {
        self.index = None;
    }

    /// Feeds one token. Returns the reference once the enclosing field's `)`
    /// has been consumed.
    pub fn parse(&mut self, token: &Token) -> Result<Option<Reference>, ParseErrorKind> {
        let index = match &token.kind {
            TokenKind::Integer(value) => match value.to_index() {
                Some(n) => Index::Numeric(n),
                None => return Err(ParseErrorKind::IndexOutOfRange(value.to_string())),
            },
            TokenKind::Id(id) => Index::Id(id.clone()),
            TokenKind::RightParen => {
                return match self.index.take() {
                    Some(reference) => Ok(Some(reference)),
                    None => Err(ParseErrorKind::MissingIndex),
                };
            }
            _ => return Err(ParseErrorKind::unexpected(token)),
        };
        if self.index.is_some() {
            return Err(ParseErrorKind::RedundantIndex(token.kind.to_string()));
        }
        self.index = Some(Reference::new(index, token.span));
        Ok(None)
    }
}
