//! Function body parsing.
//!
//! The module parser does not know instruction syntax. It hands every token
//! of a function body to a [`BodyParser`], which owns the encoding. The
//! default, [`InstructionEncoder`], covers straight-line code: plain and
//! folded forms of the variable, call, constant and numeric instructions.

use super::error::{Namespace, ParseErrorKind};
use super::ids::{LocalIndex, LocalScope};
use super::token::{Span, Token, TokenKind};
use crate::encoding::{
    write_f32, write_f64, write_padded_vu32, write_vs32, write_vs64, write_vu32, OP_END,
};
use crate::module::{Body, Index, LocalRelocation, Reference, Relocation};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Receives the tokens of one function body.
///
/// `feed` is called for every token after the function's locals up to, but
/// not including, the function's closing `)`. Parentheses inside the body are
/// passed through and always balance.
pub trait BodyParser {
    fn begin(&mut self);

    /// `locals` resolves the function's parameter and local identifiers.
    fn feed(&mut self, token: &Token, locals: &LocalScope) -> Result<(), ParseErrorKind>;

    /// Completes the body, including its terminating `end`.
    fn finish(&mut self) -> Result<Body, ParseErrorKind>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Immediate {
    None,
    Local,
    Global,
    Func,
    I32,
    I64,
    F32,
    F64,
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Bytes(Vec<u8>),
    /// A call target, written as a padded placeholder and patched on bind.
    Func(Reference),
    /// A declared local of a function whose parameter count is not known yet.
    Local(u32, Span),
}

#[derive(Debug, Clone, PartialEq)]
struct Instruction {
    name: String,
    opcode: u8,
    immediate: Immediate,
    operand: Option<Operand>,
}

impl Instruction {
    fn needs_operand(&self) -> bool {
        self.immediate != Immediate::None && self.operand.is_none()
    }
}

const I32_COMPARE: [&str; 11] = [
    "eqz", "eq", "ne", "lt_s", "lt_u", "gt_s", "gt_u", "le_s", "le_u", "ge_s", "ge_u",
];
const F_COMPARE: [&str; 6] = ["eq", "ne", "lt", "gt", "le", "ge"];
const I_ARITH: [&str; 18] = [
    "clz", "ctz", "popcnt", "add", "sub", "mul", "div_s", "div_u", "rem_s", "rem_u", "and", "or",
    "xor", "shl", "shr_s", "shr_u", "rotl", "rotr",
];
const F_ARITH: [&str; 14] = [
    "abs", "neg", "ceil", "floor", "trunc", "nearest", "sqrt", "add", "sub", "mul", "div", "min",
    "max", "copysign",
];
const CONVERSIONS: [&str; 25] = [
    "i32.wrap_i64",
    "i32.trunc_f32_s",
    "i32.trunc_f32_u",
    "i32.trunc_f64_s",
    "i32.trunc_f64_u",
    "i64.extend_i32_s",
    "i64.extend_i32_u",
    "i64.trunc_f32_s",
    "i64.trunc_f32_u",
    "i64.trunc_f64_s",
    "i64.trunc_f64_u",
    "f32.convert_i32_s",
    "f32.convert_i32_u",
    "f32.convert_i64_s",
    "f32.convert_i64_u",
    "f32.demote_f64",
    "f64.convert_i32_s",
    "f64.convert_i32_u",
    "f64.convert_i64_s",
    "f64.convert_i64_u",
    "f64.promote_f32",
    "i32.reinterpret_f32",
    "i64.reinterpret_f64",
    "f32.reinterpret_i32",
    "f64.reinterpret_i64",
];

/// Numeric instructions without immediates. Each group occupies a contiguous
/// opcode range starting at the given base.
static NUMERIC_OPCODES: Lazy<HashMap<String, u8>> = Lazy::new(|| {
    let mut table = HashMap::new();
    let mut group = |prefix: &str, names: &[&str], base: u8| {
        for (i, name) in names.iter().enumerate() {
            let name = if prefix.is_empty() {
                name.to_string()
            } else {
                format!("{}.{}", prefix, name)
            };
            table.insert(name, base + i as u8);
        }
    };
    group("i32", &I32_COMPARE, 0x45);
    group("i64", &I32_COMPARE, 0x50);
    group("f32", &F_COMPARE, 0x5b);
    group("f64", &F_COMPARE, 0x61);
    group("i32", &I_ARITH, 0x67);
    group("i64", &I_ARITH, 0x79);
    group("f32", &F_ARITH, 0x8b);
    group("f64", &F_ARITH, 0x99);
    group("", &CONVERSIONS, 0xa7);
    table
});

fn lookup(keyword: &str) -> Result<(u8, Immediate), ParseErrorKind> {
    let found = match keyword {
        "unreachable" => (0x00, Immediate::None),
        "nop" => (0x01, Immediate::None),
        "return" => (0x0f, Immediate::None),
        "call" => (0x10, Immediate::Func),
        "drop" => (0x1a, Immediate::None),
        "select" => (0x1b, Immediate::None),
        "local.get" => (0x20, Immediate::Local),
        "local.set" => (0x21, Immediate::Local),
        "local.tee" => (0x22, Immediate::Local),
        "global.get" => (0x23, Immediate::Global),
        "global.set" => (0x24, Immediate::Global),
        "i32.const" => (0x41, Immediate::I32),
        "i64.const" => (0x42, Immediate::I64),
        "f32.const" => (0x43, Immediate::F32),
        "f64.const" => (0x44, Immediate::F64),
        "block" | "loop" | "if" | "else" | "end" | "br" | "br_if" | "br_table" | "call_indirect" => {
            return Err(ParseErrorKind::UnsupportedInstruction(keyword.to_string()));
        }
        _ => match NUMERIC_OPCODES.get(keyword) {
            Some(&opcode) => (opcode, Immediate::None),
            None => return Err(ParseErrorKind::UnknownInstruction(keyword.to_string())),
        },
    };
    Ok(found)
}

/// Encodes instructions straight to bytecode as their tokens arrive.
///
/// A plain instruction is written as soon as its immediate is known. A folded
/// one, `(i32.add (local.get 0) (i32.const 1))`, is written when its `)` is
/// reached, after the operands nested inside it.
#[derive(Debug, Default)]
pub struct InstructionEncoder {
    body: Body,
    /// Plain instruction waiting for its immediate.
    plain: Option<Instruction>,
    /// One entry per open `(`; `None` until its keyword is read.
    folded: Vec<Option<Instruction>>,
}

impl InstructionEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn emit(&mut self, instruction: Instruction) {
        let code = &mut self.body.code;
        code.push(instruction.opcode);
        match instruction.operand {
            Some(Operand::Bytes(bytes)) => code.extend_from_slice(&bytes),
            Some(Operand::Func(target)) => {
                self.body.relocations.push(Relocation {
                    offset: code.len(),
                    target,
                });
                write_padded_vu32(code, 0);
            }
            Some(Operand::Local(local, span)) => {
                self.body.local_relocations.push(LocalRelocation {
                    offset: code.len(),
                    local,
                    span,
                });
                write_padded_vu32(code, local);
            }
            None => {}
        }
    }

    fn check_no_pending(&self) -> Result<(), ParseErrorKind> {
        if let Some(instruction) = &self.plain {
            return Err(ParseErrorKind::MissingImmediate(instruction.name.clone()));
        }
        Ok(())
    }

    fn read_keyword(&mut self, keyword: &str) -> Result<(), ParseErrorKind> {
        self.check_no_pending()?;
        let (opcode, immediate) = lookup(keyword)?;
        let instruction = Instruction {
            name: keyword.to_string(),
            opcode,
            immediate,
            operand: None,
        };
        if matches!(self.folded.last(), Some(None)) {
            if let Some(slot) = self.folded.last_mut() {
                *slot = Some(instruction);
            }
        } else if immediate == Immediate::None {
            self.emit(instruction);
        } else {
            self.plain = Some(instruction);
        }
        Ok(())
    }

    fn read_operand(&mut self, token: &Token, locals: &LocalScope) -> Result<(), ParseErrorKind> {
        if let Some(mut instruction) = self.plain.take() {
            instruction.operand = Some(operand(&instruction, token, locals)?);
            self.emit(instruction);
            return Ok(());
        }
        match self.folded.last_mut() {
            Some(Some(instruction)) if instruction.needs_operand() => {
                instruction.operand = Some(operand(instruction, token, locals)?);
                Ok(())
            }
            _ => Err(ParseErrorKind::unexpected(token)),
        }
    }

    fn close(&mut self, token: &Token) -> Result<(), ParseErrorKind> {
        self.check_no_pending()?;
        match self.folded.pop() {
            Some(Some(instruction)) => {
                if instruction.needs_operand() {
                    return Err(ParseErrorKind::MissingImmediate(instruction.name));
                }
                self.emit(instruction);
                Ok(())
            }
            // `()` or a stray `)`.
            _ => Err(ParseErrorKind::unexpected(token)),
        }
    }
}

impl BodyParser for InstructionEncoder {
    fn begin(&mut self) {
        self.body = Body::default();
        self.plain = None;
        self.folded.clear();
    }

    fn feed(&mut self, token: &Token, locals: &LocalScope) -> Result<(), ParseErrorKind> {
        match &token.kind {
            TokenKind::LeftParen => {
                self.check_no_pending()?;
                if let Some(None) = self.folded.last() {
                    return Err(ParseErrorKind::expected_field(token));
                }
                self.folded.push(None);
                Ok(())
            }
            TokenKind::RightParen => self.close(token),
            TokenKind::Keyword(keyword) => {
                if let Some(None) = self.folded.last() {
                    return self.read_keyword(keyword);
                }
                // A folded instruction's immediate precedes its operands.
                if let Some(Some(parent)) = self.folded.last() {
                    if parent.needs_operand() {
                        return Err(ParseErrorKind::MissingImmediate(parent.name.clone()));
                    }
                }
                self.read_keyword(keyword)
            }
            TokenKind::Integer(_) | TokenKind::Float(_) | TokenKind::Id(_) => self.read_operand(token, locals),
            TokenKind::String(_) => Err(ParseErrorKind::unexpected(token)),
        }
    }

    fn finish(&mut self) -> Result<Body, ParseErrorKind> {
        self.check_no_pending()?;
        let mut body = std::mem::take(&mut self.body);
        body.code.push(OP_END);
        Ok(body)
    }
}

fn operand(instruction: &Instruction, token: &Token, locals: &LocalScope) -> Result<Operand, ParseErrorKind> {
    let mut bytes = Vec::new();
    match (instruction.immediate, &token.kind) {
        (Immediate::Local, TokenKind::Integer(v)) => {
            let index = v.to_index().ok_or_else(|| ParseErrorKind::IndexOutOfRange(v.to_string()))?;
            write_vu32(&mut bytes, index);
        }
        (Immediate::Local, TokenKind::Id(id)) => match locals.resolve(id)? {
            LocalIndex::Absolute(index) => write_vu32(&mut bytes, index),
            LocalIndex::Declared(local) => return Ok(Operand::Local(local, token.span)),
        },
        (Immediate::Global, TokenKind::Integer(v)) => {
            let index = v.to_index().ok_or_else(|| ParseErrorKind::IndexOutOfRange(v.to_string()))?;
            write_vu32(&mut bytes, index);
        }
        // Modules have no global fields, so no identifier can name one.
        (Immediate::Global, TokenKind::Id(id)) => {
            return Err(ParseErrorKind::Unresolved {
                namespace: Namespace::Global,
                reference: format!("${}", id),
            });
        }
        (Immediate::Func, TokenKind::Integer(v)) => {
            let index = v.to_index().ok_or_else(|| ParseErrorKind::IndexOutOfRange(v.to_string()))?;
            return Ok(Operand::Func(Reference::new(Index::Numeric(index), token.span)));
        }
        (Immediate::Func, TokenKind::Id(id)) => {
            return Ok(Operand::Func(Reference::new(Index::Id(id.clone()), token.span)));
        }
        (Immediate::I32, TokenKind::Integer(v)) => {
            let value = v.to_i32().ok_or_else(|| ParseErrorKind::ConstantOutOfRange(v.to_string()))?;
            write_vs32(&mut bytes, value);
        }
        (Immediate::I64, TokenKind::Integer(v)) => {
            let value = v.to_i64().ok_or_else(|| ParseErrorKind::ConstantOutOfRange(v.to_string()))?;
            write_vs64(&mut bytes, value);
        }
        (Immediate::F32, TokenKind::Float(f)) => {
            let value = f.to_f32().ok_or_else(|| ParseErrorKind::ConstantOutOfRange(f.to_string()))?;
            write_f32(&mut bytes, value);
        }
        (Immediate::F64, TokenKind::Float(f)) => {
            let value = f.to_f64().ok_or_else(|| ParseErrorKind::ConstantOutOfRange(f.to_string()))?;
            write_f64(&mut bytes, value);
        }
        (Immediate::F32, TokenKind::Integer(v)) => {
            let magnitude = v.value as f32;
            write_f32(&mut bytes, if v.negative { -magnitude } else { magnitude });
        }
        (Immediate::F64, TokenKind::Integer(v)) => {
            let magnitude = v.value as f64;
            write_f64(&mut bytes, if v.negative { -magnitude } else { magnitude });
        }
        _ => return Err(ParseErrorKind::unexpected(token)),
    }
    Ok(Operand::Bytes(bytes))
}
