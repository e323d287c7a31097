//! Function signature and type-use parsing.
//!
//! A signature is a run of `(param ...)` fields followed by `(result ...)`
//! fields. A type use may additionally start with a `(type idx)` reference:
//!
//! ```text
//! (type $t (func (param $x i32) (result i64)))   ;; signature
//! (func $f (type $t) (param i32) (local i64) ...) ;; type use, then locals
//! ```
//!
//! In type-use mode the parser does not know where the signature ends until
//! it sees something that is not part of it. That token (or a `(` plus
//! keyword pair) is handed back to the caller as a [`Leftover`] to replay.

use super::error::ParseErrorKind;
use super::ids::IdContext;
use super::index::IndexParser;
use super::token::{Token, TokenKind};
use crate::module::{DraftModule, FunctionType, Reference, TypeUse, ValueType};

/// Tokens that follow a type use but are not part of it.
#[derive(Debug, Clone, PartialEq)]
pub enum Leftover {
    /// A token other than `(`, usually the enclosing field's `)`.
    Token(Token),
    /// A field whose keyword is not `type`, `param` or `result`.
    Field { lparen: Token, keyword: Token },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Continue,
    /// The `)` closing a `(func ...)` signature was consumed.
    Done,
    /// The type use ended; replay the leftover in the enclosing field.
    Yield(Leftover),
}

/// A finished type use.
#[derive(Debug, Clone)]
pub struct ParsedTypeUse {
    pub type_use: TypeUse,
    /// Number of parameters, when the signature is known at this point. It is
    /// not when only a forward `(type $t)` reference was given.
    pub param_count: Option<u32>,
    /// Named parameters, indexed by parameter position.
    pub param_ids: IdContext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Phase {
    Start,
    Type,
    Params,
    Results,
}

#[derive(Debug, Clone, PartialEq)]
enum State {
    Idle,
    /// Between fields, expecting `(` or the end.
    Fields,
    /// After `(`, expecting the field keyword.
    Keyword(Token),
    TypeIndex,
    Param { named: bool, count: usize },
    Result,
}

#[derive(Debug)]
pub struct TypeParser {
    state: State,
    type_use_mode: bool,
    phase: Phase,
    index: IndexParser,
    type_ref: Option<Reference>,
    params: Vec<ValueType>,
    results: Vec<ValueType>,
    param_ids: IdContext,
}

impl Default for TypeParser {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeParser {
    pub fn new() -> Self {
        Self {
            state: State::Idle,
            type_use_mode: false,
            phase: Phase::Start,
            index: IndexParser::new(),
            type_ref: None,
            params: Vec::new(),
            results: Vec::new(),
            param_ids: IdContext::new(),
        }
    }

    fn reset(&mut self, type_use_mode: bool) {
        self.state = State::Fields;
        self.type_use_mode = type_use_mode;
        self.phase = Phase::Start;
        self.type_ref = None;
        self.params.clear();
        self.results.clear();
        self.param_ids.clear();
    }

    /// Starts parsing the inside of `(func ...)` in a type field. The next
    /// token is the one after `func`.
    pub fn begin_signature(&mut self) {
        self.reset(false);
    }

    /// Starts parsing a type use. The next token is the first one after the
    /// function's optional identifier.
    pub fn begin_type_use(&mut self) {
        self.reset(true);
    }

    /// Where inside the signature the parser is, appended to the enclosing
    /// field's error context.
    pub fn context(&self) -> String {
        match self.state {
            State::TypeIndex => ".type".to_string(),
            State::Param { .. } => format!(".param[{}]", self.params.len()),
            State::Result => format!(".result[{}]", self.results.len()),
            _ => String::new(),
        }
    }

    pub fn parse(&mut self, token: &Token) -> Result<Step, ParseErrorKind> {
        // On error the state is left as it was, so `context` still describes
        // where the failing token was.
        match self.state.clone() {
            State::Idle => Err(ParseErrorKind::unexpected(token)),
            State::Fields => self.parse_fields(token),
            State::Keyword(lparen) => self.parse_keyword(lparen, token),
            State::TypeIndex => {
                if let Some(reference) = self.index.parse(token)? {
                    self.type_ref = Some(reference);
                    self.phase = Phase::Type;
                    self.state = State::Fields;
                }
                Ok(Step::Continue)
            }
            State::Param { named, count } => self.parse_param(token, named, count),
            State::Result => self.parse_result(token),
        }
    }

    fn parse_fields(&mut self, token: &Token) -> Result<Step, ParseErrorKind> {
        match &token.kind {
            TokenKind::LeftParen => {
                self.state = State::Keyword(token.clone());
                Ok(Step::Continue)
            }
            _ if self.type_use_mode => Ok(Step::Yield(Leftover::Token(token.clone()))),
            TokenKind::RightParen => Ok(Step::Done),
            _ => Err(ParseErrorKind::unexpected(token)),
        }
    }

    fn parse_keyword(&mut self, lparen: Token, token: &Token) -> Result<Step, ParseErrorKind> {
        let keyword = match token.keyword() {
            Some(k) => k,
            None => return Err(ParseErrorKind::expected_field(token)),
        };
        match keyword {
            "type" if self.type_use_mode => {
                if self.phase != Phase::Start {
                    return Err(ParseErrorKind::UnexpectedField(keyword.to_string()));
                }
                self.index.begin();
                self.state = State::TypeIndex;
            }
            "param" => {
                if self.phase > Phase::Params {
                    return Err(ParseErrorKind::UnexpectedField(keyword.to_string()));
                }
                self.phase = Phase::Params;
                self.state = State::Param {
                    named: false,
                    count: 0,
                };
            }
            "result" => {
                self.phase = Phase::Results;
                self.state = State::Result;
            }
            _ if self.type_use_mode => {
                return Ok(Step::Yield(Leftover::Field {
                    lparen,
                    keyword: token.clone(),
                }));
            }
            _ => return Err(ParseErrorKind::UnexpectedField(keyword.to_string())),
        }
        Ok(Step::Continue)
    }

    fn parse_param(&mut self, token: &Token, named: bool, count: usize) -> Result<Step, ParseErrorKind> {
        match &token.kind {
            TokenKind::Id(id) => {
                if named {
                    return Err(ParseErrorKind::RedundantId(token.kind.to_string()));
                }
                if count > 0 {
                    return Err(ParseErrorKind::unexpected(token));
                }
                self.param_ids.set_id(id, self.params.len() as u32)?;
                self.state = State::Param { named: true, count };
            }
            TokenKind::Keyword(keyword) => {
                // A named param declares exactly one value type.
                if named && count == 1 {
                    return Err(ParseErrorKind::unexpected(token));
                }
                self.params.push(value_type(keyword)?);
                self.state = State::Param {
                    named,
                    count: count + 1,
                };
            }
            TokenKind::RightParen if !(named && count == 0) => self.state = State::Fields,
            _ => return Err(ParseErrorKind::unexpected(token)),
        }
        Ok(Step::Continue)
    }

    fn parse_result(&mut self, token: &Token) -> Result<Step, ParseErrorKind> {
        match &token.kind {
            TokenKind::Keyword(keyword) => {
                self.results.push(value_type(keyword)?);
                self.state = State::Result;
            }
            TokenKind::RightParen => self.state = State::Fields,
            _ => return Err(ParseErrorKind::unexpected(token)),
        }
        Ok(Step::Continue)
    }

    /// The signature just parsed by [`TypeParser::begin_signature`].
    pub fn take_signature(&mut self) -> FunctionType {
        self.state = State::Idle;
        FunctionType {
            params: std::mem::take(&mut self.params),
            results: std::mem::take(&mut self.results),
        }
    }

    /// Reduces the type use just parsed to a [`TypeUse`], registering an
    /// implicit type on `draft` if the inline signature is new.
    ///
    /// An explicit `(type idx)` wins over any inline signature written next
    /// to it; the two are not compared.
    pub fn take_type_use(&mut self, draft: &mut DraftModule, type_ids: &IdContext) -> ParsedTypeUse {
        self.state = State::Idle;
        let inline = self.phase > Phase::Type;
        let signature = FunctionType {
            params: std::mem::take(&mut self.params),
            results: std::mem::take(&mut self.results),
        };
        let param_ids = std::mem::take(&mut self.param_ids);
        match self.type_ref.take() {
            Some(reference) => {
                let type_use = TypeUse::Ref(reference);
                let param_count = if inline {
                    Some(signature.params.len() as u32)
                } else {
                    draft
                        .signature(&type_use, type_ids)
                        .map(|sig| sig.params.len() as u32)
                };
                ParsedTypeUse {
                    type_use,
                    param_count,
                    param_ids,
                }
            }
            None => {
                let param_count = Some(signature.params.len() as u32);
                ParsedTypeUse {
                    type_use: draft.inline_type_use(signature),
                    param_count,
                    param_ids,
                }
            }
        }
    }
}

fn value_type(keyword: &str) -> Result<ValueType, ParseErrorKind> {
    ValueType::from_keyword(keyword).ok_or_else(|| ParseErrorKind::UnknownValueType(keyword.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::Index;
    use crate::wat::{Lexer, Span};
    use ValueType::*;

    fn tokens(source: &str) -> Vec<Token> {
        Lexer::new(source).map(|t| t.unwrap()).collect()
    }

    /// Feeds the tokens of `source` after its leading `(func`.
    fn signature(source: &str) -> Result<FunctionType, ParseErrorKind> {
        let mut parser = TypeParser::new();
        parser.begin_signature();
        for token in &tokens(source)[2..] {
            if parser.parse(token)? == Step::Done {
                return Ok(parser.take_signature());
            }
        }
        panic!("signature never closed");
    }

    /// Feeds the tokens of `source` after its leading `(func`, returning the
    /// leftover that ended the type use.
    fn type_use(parser: &mut TypeParser, source: &str) -> Result<Leftover, ParseErrorKind> {
        parser.begin_type_use();
        for token in &tokens(source)[2..] {
            if let Step::Yield(leftover) = parser.parse(token)? {
                return Ok(leftover);
            }
        }
        panic!("type use never ended");
    }

    #[test]
    fn empty_signature() {
        assert_eq!(signature("(func)"), Ok(FunctionType::default()));
    }

    #[test]
    fn params_and_results() {
        let sig = signature("(func (param i32 i64) (param $x f32) (result f64) (result i32))").unwrap();
        assert_eq!(sig.params, vec![I32, I64, F32]);
        assert_eq!(sig.results, vec![F64, I32]);
    }

    #[test]
    fn param_after_result() {
        assert_eq!(
            signature("(func (result i32) (param i32))"),
            Err(ParseErrorKind::UnexpectedField("param".into()))
        );
    }

    #[test]
    fn unknown_value_type() {
        assert_eq!(
            signature("(func (param i31))"),
            Err(ParseErrorKind::UnknownValueType("i31".into()))
        );
    }

    #[test]
    fn named_param_takes_one_type() {
        assert!(matches!(
            signature("(func (param $x i32 i64))"),
            Err(ParseErrorKind::UnexpectedToken { kind: "keyword", .. })
        ));
        assert!(matches!(
            signature("(func (param $x))"),
            Err(ParseErrorKind::UnexpectedToken { kind: "')'", .. })
        ));
        assert_eq!(
            signature("(func (param $x $y i32))"),
            Err(ParseErrorKind::RedundantId("$y".into()))
        );
    }

    #[test]
    fn duplicate_param_id() {
        assert_eq!(
            signature("(func (param $x i32) (param $x i32))"),
            Err(ParseErrorKind::DuplicateId("x".into()))
        );
    }

    #[test]
    fn type_keyword_outside_type_use() {
        assert_eq!(
            signature("(func (type 0))"),
            Err(ParseErrorKind::UnexpectedField("type".into()))
        );
    }

    #[test]
    fn empty_type_use_is_the_empty_signature() {
        let mut parser = TypeParser::new();
        let mut draft = DraftModule::default();
        let leftover = type_use(&mut parser, "(func)").unwrap();
        assert!(matches!(leftover, Leftover::Token(t) if t.is_right_paren()));

        let parsed = parser.take_type_use(&mut draft, &IdContext::new());
        assert_eq!(parsed.type_use, TypeUse::Inlined(0));
        assert_eq!(parsed.param_count, Some(0));
        assert_eq!(draft.inlined_types, vec![FunctionType::default()]);
    }

    #[test]
    fn inline_type_use_reuses_explicit_type() {
        let mut parser = TypeParser::new();
        let mut draft = DraftModule::default();
        draft.types.push(FunctionType {
            params: vec![I32],
            results: vec![],
        });
        type_use(&mut parser, "(func (param $a i32) (local i32))").unwrap();
        let parsed = parser.take_type_use(&mut draft, &IdContext::new());
        assert_eq!(
            parsed.type_use,
            TypeUse::Ref(Reference::new(Index::Numeric(0), Span::ZERO))
        );
        assert_eq!(parsed.param_ids.get("a"), Some(0));
        assert!(draft.inlined_types.is_empty());
    }

    #[test]
    fn explicit_type_use() {
        let mut parser = TypeParser::new();
        let mut draft = DraftModule::default();
        draft.types.push(FunctionType {
            params: vec![I32, I32],
            results: vec![I32],
        });
        let mut type_ids = IdContext::new();
        type_ids.set_id("$bin", 0).unwrap();

        let leftover = type_use(&mut parser, "(func (type $bin) (local.get 0))").unwrap();
        match leftover {
            Leftover::Field { keyword, .. } => assert_eq!(keyword.keyword(), Some("local.get")),
            other => panic!("unexpected leftover {:?}", other),
        }
        let parsed = parser.take_type_use(&mut draft, &type_ids);
        assert!(matches!(&parsed.type_use, TypeUse::Ref(r) if r.index == Index::Id("bin".into())));
        assert_eq!(parsed.param_count, Some(2));
    }

    #[test]
    fn forward_type_use_has_unknown_param_count() {
        let mut parser = TypeParser::new();
        let mut draft = DraftModule::default();
        type_use(&mut parser, "(func (type $later) nop)").unwrap();
        let parsed = parser.take_type_use(&mut draft, &IdContext::new());
        assert_eq!(parsed.param_count, None);
    }

    #[test]
    fn type_must_come_first() {
        let mut parser = TypeParser::new();
        assert_eq!(
            type_use(&mut parser, "(func (param i32) (type 0))"),
            Err(ParseErrorKind::UnexpectedField("type".into()))
        );
    }

    #[test]
    fn context_tracks_position() {
        let mut parser = TypeParser::new();
        parser.begin_signature();
        let toks = tokens("(func (param i32 i64) (result i32))");
        for token in &toks[2..5] {
            parser.parse(token).unwrap();
        }
        // Inside the param field, one param read so far.
        assert_eq!(parser.context(), ".param[1]");
        for token in &toks[5..9] {
            parser.parse(token).unwrap();
        }
        assert_eq!(parser.context(), ".result[0]");
    }

    #[test]
    fn reset_between_uses() {
        let mut parser = TypeParser::new();
        let mut draft = DraftModule::default();
        type_use(&mut parser, "(func (param $x i32))").unwrap();
        parser.take_type_use(&mut draft, &IdContext::new());

        type_use(&mut parser, "(func (param $x i64))").unwrap();
        let parsed = parser.take_type_use(&mut draft, &IdContext::new());
        assert_eq!(parsed.param_ids.get("x"), Some(0));
        assert_eq!(draft.inlined_types.len(), 2);
    }
}
