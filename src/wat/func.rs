//! The part of a `(func ...)` field after its type use: `(local ...)` fields,
//! then the instructions, which go to a [`BodyParser`].

use super::body::BodyParser;
use super::error::ParseErrorKind;
use super::ids::{IdContext, LocalScope};
use super::token::{Token, TokenKind};
use crate::module::{DraftCode, NameAssoc, ValueType};

#[derive(Debug, Clone, PartialEq)]
enum State {
    Idle,
    /// Before the body, expecting `(local`, an instruction or the end.
    Locals,
    /// After a `(` that may open a local field.
    LocalKeyword(Token),
    Local { named: bool, count: usize },
    /// Inside the body; `depth` counts parens opened within it.
    Body { depth: usize, after_lparen: bool },
}

#[derive(Debug)]
pub struct FuncParser {
    state: State,
    /// Parameter count from the type use. `None` for a forward `(type $t)`,
    /// in which case locals are numbered from the first declared local.
    params: Option<u32>,
    locals: Vec<ValueType>,
    /// Parameter identifiers followed by local identifiers.
    local_ids: IdContext,
}

impl Default for FuncParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FuncParser {
    pub fn new() -> Self {
        Self {
            state: State::Idle,
            params: Some(0),
            locals: Vec::new(),
            local_ids: IdContext::new(),
        }
    }

    /// Starts a function whose type use declared `params` parameters, named
    /// per `param_ids`.
    pub fn begin(&mut self, params: Option<u32>, param_ids: IdContext, body: &mut dyn BodyParser) {
        self.state = State::Locals;
        self.params = params;
        self.locals.clear();
        self.local_ids = param_ids;
        body.begin();
    }

    pub fn context(&self) -> String {
        match self.state {
            State::Local { .. } => format!(".local[{}]", self.locals.len()),
            _ => String::new(),
        }
    }

    /// Feeds one token. Returns `true` once the function's closing `)` has
    /// been consumed.
    pub fn parse(&mut self, token: &Token, body: &mut dyn BodyParser) -> Result<bool, ParseErrorKind> {
        match self.state.clone() {
            State::Idle => Err(ParseErrorKind::unexpected(token)),
            State::Locals => match &token.kind {
                TokenKind::LeftParen => {
                    self.state = State::LocalKeyword(token.clone());
                    Ok(false)
                }
                TokenKind::RightParen => Ok(true),
                _ => self.parse_body(token, 0, false, body),
            },
            State::LocalKeyword(lparen) => {
                if token.keyword() == Some("local") {
                    self.state = State::Local {
                        named: false,
                        count: 0,
                    };
                    return Ok(false);
                }
                self.parse_body(&lparen, 0, false, body)?;
                self.parse(token, body)
            }
            State::Local { named, count } => self.parse_local(token, named, count),
            State::Body { depth, after_lparen } => self.parse_body(token, depth, after_lparen, body),
        }
    }

    fn parse_local(&mut self, token: &Token, named: bool, count: usize) -> Result<bool, ParseErrorKind> {
        match &token.kind {
            TokenKind::Id(id) => {
                if named {
                    return Err(ParseErrorKind::RedundantId(token.kind.to_string()));
                }
                if count > 0 {
                    return Err(ParseErrorKind::unexpected(token));
                }
                let base = self.params.unwrap_or(0);
                self.local_ids.set_id(id, base + self.locals.len() as u32)?;
                self.state = State::Local { named: true, count };
            }
            TokenKind::Keyword(keyword) => {
                if named && count == 1 {
                    return Err(ParseErrorKind::unexpected(token));
                }
                let local = ValueType::from_keyword(keyword)
                    .ok_or_else(|| ParseErrorKind::UnknownValueType(keyword.to_string()))?;
                self.locals.push(local);
                self.state = State::Local {
                    named,
                    count: count + 1,
                };
            }
            TokenKind::RightParen if !(named && count == 0) => self.state = State::Locals,
            _ => return Err(ParseErrorKind::unexpected(token)),
        }
        Ok(false)
    }

    fn parse_body(
        &mut self,
        token: &Token,
        depth: usize,
        after_lparen: bool,
        body: &mut dyn BodyParser,
    ) -> Result<bool, ParseErrorKind> {
        let depth = match &token.kind {
            TokenKind::RightParen if depth == 0 => return Ok(true),
            TokenKind::RightParen => depth - 1,
            TokenKind::LeftParen => depth + 1,
            TokenKind::Keyword(keyword) if after_lparen && keyword == "local" => {
                return Err(ParseErrorKind::UnexpectedField(keyword.clone()));
            }
            _ => depth,
        };
        body.feed(token, &LocalScope::new(&self.local_ids, self.params))?;
        self.state = State::Body {
            depth,
            after_lparen: token.is_left_paren(),
        };
        Ok(false)
    }

    /// The finished function, plus its parameter and local names by local
    /// index.
    pub fn take(&mut self, body: &mut dyn BodyParser) -> Result<(DraftCode, Vec<NameAssoc>), ParseErrorKind> {
        self.state = State::Idle;
        let code = DraftCode {
            locals: std::mem::take(&mut self.locals),
            body: body.finish()?,
            params_pending: self.params.is_none(),
        };
        let names = self.local_ids.names();
        self.local_ids.clear();
        Ok((code, names))
    }
}
