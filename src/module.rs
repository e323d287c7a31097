//! In-memory module representation produced from WAT source.
//!
//! Parsing happens in two phases. The token sweep builds a [`DraftModule`],
//! whose index fields may still be symbolic [`Reference`]s and whose inline
//! signatures are queued rather than numbered. The index binder then turns the
//! draft into a [`Module`], where every index is a plain `u32`.

use crate::wat::Span;
use serde::{Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    I32,
    I64,
    F32,
    F64,
}

impl ValueType {
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "i32" => Some(ValueType::I32),
            "i64" => Some(ValueType::I64),
            "f32" => Some(ValueType::F32),
            "f64" => Some(ValueType::F64),
            _ => None,
        }
    }

    /// The binary format encoding of this type.
    pub fn byte(self) -> u8 {
        match self {
            ValueType::I32 => 0x7f,
            ValueType::I64 => 0x7e,
            ValueType::F32 => 0x7d,
            ValueType::F64 => 0x7c,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            ValueType::I32 => "i32",
            ValueType::I64 => "i64",
            ValueType::F32 => "f32",
            ValueType::F64 => "f64",
        })
    }
}

/// A function signature. Two types are the same type iff both lists match
/// element-wise, which is what inline signatures are deduplicated by.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FunctionType {
    pub params: Vec<ValueType>,
    pub results: Vec<ValueType>,
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let join = |types: &[ValueType]| types.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
        match self.results.len() {
            0 => write!(f, "({}) -> nil", join(&self.params)),
            1 => write!(f, "({}) -> {}", join(&self.params), self.results[0]),
            _ => write!(f, "({}) -> ({})", join(&self.params), join(&self.results)),
        }
    }
}

/// An index as written in source: a numeral or a `$` identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Index {
    Numeric(u32),
    /// Identifier without its sigil.
    Id(String),
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Index::Numeric(n) => write!(f, "{}", n),
            Index::Id(id) => write!(f, "${}", id),
        }
    }
}

/// An [`Index`] plus where it was read, so the binder can point at it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub index: Index,
    pub span: Span,
}

impl Reference {
    pub fn new(index: Index, span: Span) -> Self {
        Self { index, span }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportFunc {
    pub module: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportFunc {
    pub name: String,
    pub func_index: u32,
}

/// A call-site placeholder in a function body: the padded LEB128 at `offset`
/// is overwritten with the index `target` resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relocation {
    pub offset: usize,
    pub target: Reference,
}

/// A local index written before the function's parameter count was known.
/// The padded LEB128 at `offset` holds `local` until binding adds the
/// parameter count to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalRelocation {
    pub offset: usize,
    /// Position among the function's declared locals, parameters excluded.
    pub local: u32,
    /// Where the local was referenced, for diagnostics.
    pub span: Span,
}

/// The output of a body parser for one function.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Body {
    pub code: Vec<u8>,
    pub relocations: Vec<Relocation>,
    pub local_relocations: Vec<LocalRelocation>,
}

/// A locally defined function's locals and instruction bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Code {
    pub locals: Vec<ValueType>,
    #[serde(serialize_with = "serialize_hex")]
    pub body: Vec<u8>,
}

fn serialize_hex<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(bytes))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NameAssoc {
    pub index: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NameMapAssoc {
    pub index: u32,
    pub name_map: Vec<NameAssoc>,
}

/// Debug names recorded from `$` identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NameSection {
    pub module_name: Option<String>,
    pub function_names: Vec<NameAssoc>,
    pub local_names: Vec<NameMapAssoc>,
}

impl NameSection {
    pub fn is_empty(&self) -> bool {
        self.module_name.is_none() && self.function_names.is_empty() && self.local_names.is_empty()
    }
}

/// A fully resolved module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Module {
    /// Explicit types in declaration order, then implicit ones.
    pub types: Vec<FunctionType>,
    pub import_funcs: Vec<ImportFunc>,
    /// Type index of every function in the function index namespace:
    /// imports first, then local definitions.
    pub type_uses: Vec<u32>,
    /// One entry per locally defined function.
    pub code: Vec<Code>,
    pub export_funcs: Vec<ExportFunc>,
    pub start_function: Option<u32>,
    /// Absent unless at least one name was recorded.
    pub names: Option<NameSection>,
}

impl Module {
    /// Functions in the function index namespace, imports included.
    pub fn function_count(&self) -> u32 {
        self.type_uses.len() as u32
    }

    /// The signature of function `func_index`.
    pub fn function_type(&self, func_index: u32) -> Option<&FunctionType> {
        let type_index = *self.type_uses.get(func_index as usize)?;
        self.types.get(type_index as usize)
    }

    /// The recorded name of function `func_index`, if any.
    pub fn function_name(&self, func_index: u32) -> Option<&str> {
        self.names
            .as_ref()?
            .function_names
            .iter()
            .find(|n| n.index == func_index)
            .map(|n| n.name.as_str())
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(name) = self.names.as_ref().and_then(|n| n.module_name.as_ref()) {
            writeln!(f, "module ${}", name)?;
        } else {
            writeln!(f, "module")?;
        }
        for (i, ty) in self.types.iter().enumerate() {
            writeln!(f, "  type[{}] {}", i, ty)?;
        }
        let imported = self.import_funcs.len();
        for (i, type_index) in self.type_uses.iter().enumerate() {
            let name = self
                .function_name(i as u32)
                .map(|n| format!(" ${}", n))
                .unwrap_or_default();
            if let Some(import) = self.import_funcs.get(i) {
                writeln!(
                    f,
                    "  func[{}]{} sig={} <- {}.{}",
                    i, name, type_index, import.module, import.name
                )?;
            } else if let Some(code) = self.code.get(i - imported) {
                writeln!(
                    f,
                    "  func[{}]{} sig={} locals={} body={}",
                    i,
                    name,
                    type_index,
                    code.locals.len(),
                    hex::encode(&code.body)
                )?;
            }
        }
        for export in &self.export_funcs {
            writeln!(f, "  export {:?} -> func[{}]", export.name, export.func_index)?;
        }
        if let Some(start) = self.start_function {
            writeln!(f, "  start func[{}]", start)?;
        }
        Ok(())
    }
}

/// A type use before binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeUse {
    /// `(type idx)`, possibly symbolic.
    Ref(Reference),
    /// Position in [`DraftModule::inlined_types`]; its type index is only known
    /// once every explicit type has been seen.
    Inlined(u32),
}

/// An export before binding. `func` is `None` only while its `(func ...)`
/// description is still being parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftExport {
    pub name: String,
    pub func: Option<Reference>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftCode {
    pub locals: Vec<ValueType>,
    pub body: Body,
    /// The signature was a forward `(type $t)`, so local names were numbered
    /// from the first declared local and need the parameter count added.
    pub params_pending: bool,
}

/// The module as built by the token sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DraftModule {
    pub types: Vec<FunctionType>,
    /// Signatures that matched no explicit type, in first-seen order.
    pub inlined_types: Vec<FunctionType>,
    pub import_funcs: Vec<ImportFunc>,
    pub type_uses: Vec<TypeUse>,
    pub code: Vec<DraftCode>,
    pub export_funcs: Vec<DraftExport>,
    pub start_function: Option<Reference>,
    pub names: NameSection,
}

impl DraftModule {
    /// Reduces an inline signature to a type use: the first equal explicit
    /// type, else an existing or new entry in the inlined queue.
    pub fn inline_type_use(&mut self, signature: FunctionType) -> TypeUse {
        if let Some(i) = self.types.iter().position(|t| *t == signature) {
            return TypeUse::Ref(Reference::new(Index::Numeric(i as u32), Span::ZERO));
        }
        if let Some(i) = self.inlined_types.iter().position(|t| *t == signature) {
            return TypeUse::Inlined(i as u32);
        }
        log::trace!("queueing implicit type {}", signature);
        self.inlined_types.push(signature);
        TypeUse::Inlined(self.inlined_types.len() as u32 - 1)
    }

    /// Looks up the signature a type use refers to, as far as it is known
    /// during the sweep.
    pub fn signature(&self, type_use: &TypeUse, type_ids: &crate::wat::IdContext) -> Option<&FunctionType> {
        match type_use {
            TypeUse::Inlined(i) => self.inlined_types.get(*i as usize),
            TypeUse::Ref(reference) => {
                let i = match &reference.index {
                    Index::Numeric(n) => *n,
                    Index::Id(id) => type_ids.get(id)?,
                };
                self.types.get(i as usize)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(params: &[ValueType], results: &[ValueType]) -> FunctionType {
        FunctionType {
            params: params.to_vec(),
            results: results.to_vec(),
        }
    }

    #[test]
    fn function_type_display() {
        use ValueType::*;
        assert_eq!(sig(&[], &[]).to_string(), "() -> nil");
        assert_eq!(sig(&[I32, I64], &[F32]).to_string(), "(i32, i64) -> f32");
        assert_eq!(sig(&[], &[I32, F64]).to_string(), "() -> (i32, f64)");
    }

    #[test]
    fn inline_type_use_prefers_explicit_types() {
        use ValueType::*;
        let mut draft = DraftModule::default();
        draft.types.push(sig(&[I32], &[]));

        assert_eq!(
            draft.inline_type_use(sig(&[I32], &[])),
            TypeUse::Ref(Reference::new(Index::Numeric(0), Span::ZERO))
        );
        assert_eq!(draft.inline_type_use(sig(&[], &[I32])), TypeUse::Inlined(0));
        assert_eq!(draft.inline_type_use(sig(&[I64], &[])), TypeUse::Inlined(1));
        assert_eq!(draft.inline_type_use(sig(&[], &[I32])), TypeUse::Inlined(0));
        assert_eq!(draft.inlined_types.len(), 2);
    }

    #[test]
    fn code_serializes_body_as_hex() {
        let code = Code {
            locals: vec![ValueType::I64],
            body: vec![0x20, 0x00, 0x0b],
        };
        assert_eq!(
            serde_json::to_string(&code).unwrap(),
            r#"{"locals":["i64"],"body":"20000b"}"#
        );
    }

    #[test]
    fn value_type_keywords() {
        assert_eq!(ValueType::from_keyword("f64"), Some(ValueType::F64));
        assert_eq!(ValueType::from_keyword("v128"), None);
        assert_eq!(ValueType::I32.byte(), 0x7f);
    }
}
