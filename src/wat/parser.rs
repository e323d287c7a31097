//! WAT Parser: Token Stream -> Module.
//!
//! Consumes tokens one at a time, in source order, and builds a
//! [`DraftModule`]. Once the stream ends, implicit types are appended and the
//! draft is bound into a [`Module`].
//!
//! # Design Principles
//!
//! 1. **Fixed Depth**: The module grammar nests at most three fields deep
//!    (`module` > `import` > `func`), so the position is a single `Next`
//!    value rather than a stack. Only function bodies nest arbitrarily, and
//!    those are scoped off to [`FuncParser`].
//!
//! 2. **Typed Scratch State**: Strings read before their field is complete,
//!    such as an import's module and name, travel inside the `Next` variant
//!    that needs them.
//!
//! 3. **Fail Fast**: The first error aborts the parse. It carries the
//!    position of the failing token and the dotted path of the field the
//!    parser was in, e.g. `module.import[2].func`.
//!
//! 4. **Bind Later**: Exports, `start` and calls may name functions declared
//!    further down, so symbolic indices stay symbolic until [`bind`]. So do
//!    the local indices of a function typed by a later `(type $t)`, whose
//!    parameter count is not known during the sweep.
//!
//! # Grammar Reference
//!
//! ```text
//! module ::= '(' 'module' id? field* ')'
//! field  ::= '(' 'type' id? '(' 'func' param* result* ')' ')'
//!          | '(' 'import' string string '(' 'func' id? typeuse ')' ')'
//!          | '(' 'func' id? typeuse local* instr* ')'
//!          | '(' 'export' string '(' 'func' idx ')' ')'
//!          | '(' 'start' idx ')'
//! ```

use super::bind::bind;
use super::body::{BodyParser, InstructionEncoder};
use super::error::{FormatError, ParseErrorKind};
use super::func::FuncParser;
use super::ids::IdContext;
use super::index::IndexParser;
use super::lexer::Lexer;
use super::token::{Span, Token, TokenKind};
use super::types::{Leftover, Step, TypeParser};
use crate::module::{DraftExport, DraftModule, ImportFunc, Module, NameAssoc, NameMapAssoc};
use std::fmt;

/// Parses a module, encoding function bodies with [`InstructionEncoder`].
pub fn parse(source: &str) -> Result<Module, FormatError> {
    parse_with(source, &mut InstructionEncoder::new())
}

/// Parses a module, handing function bodies to `body`.
pub fn parse_with(source: &str, body: &mut dyn BodyParser) -> Result<Module, FormatError> {
    let mut parser = ModuleParser::new(body);
    let mut end = Span::ZERO;
    for token in Lexer::new(source) {
        match token {
            Ok(token) => {
                end = token.span;
                parser.feed(&token)?;
            }
            Err(e) => {
                let span = e.span;
                return Err(FormatError::new(span, parser.context(parser.next.field()), e.into()));
            }
        }
    }
    parser.finish(end)
}

// ============================================================================
// Field Positions
// ============================================================================

/// The field the parser is in, used for error context and tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Initial,
    Module,
    ModuleType,
    ModuleTypeFunc,
    ModuleImport,
    ModuleImportFunc,
    ModuleFunc,
    ModuleExport,
    ModuleExportFunc,
    ModuleStart,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Field::Initial => "initial",
            Field::Module => "module",
            Field::ModuleType => "module.type",
            Field::ModuleTypeFunc => "module.type.func",
            Field::ModuleImport => "module.import",
            Field::ModuleImportFunc => "module.import.func",
            Field::ModuleFunc => "module.func",
            Field::ModuleExport => "module.export",
            Field::ModuleExportFunc => "module.export.func",
            Field::ModuleStart => "module.start",
        })
    }
}

/// The field a `(` was read in, waiting for the keyword naming the child.
#[derive(Debug, Clone, PartialEq)]
enum Parent {
    Initial,
    Module,
    Type,
    Import { module: String, name: String },
    Export { name: String },
}

/// What the parser expects next.
#[derive(Debug, Clone, PartialEq)]
enum Next {
    /// The `(` opening the module.
    Initial,
    /// A field keyword after `(`.
    FieldName(Parent),
    /// Optional module `$id`, right after `module`.
    ModuleName,
    /// A module field or the module's `)`.
    Module,
    /// Optional type `$id`.
    TypeId,
    /// The `(func ...)` description.
    TypeDesc,
    /// Inside `(func ...)` of a type field.
    TypeFunc,
    /// The type's `)`.
    TypeEnd,
    ImportModule,
    ImportName { module: String },
    ImportDesc { module: String, name: String },
    ImportFuncId,
    ImportFunc,
    ImportEnd,
    FuncId,
    /// The function's type use.
    FuncUse,
    /// Locals and instructions.
    FuncBody,
    ExportName,
    ExportDesc { name: String },
    ExportFunc,
    ExportEnd,
    Start,
    /// The module is closed; nothing else may follow.
    Trailing,
}

impl Next {
    fn field(&self) -> Field {
        match self {
            Next::Initial | Next::FieldName(Parent::Initial) | Next::Trailing => Field::Initial,
            Next::ModuleName | Next::Module | Next::FieldName(Parent::Module) => Field::Module,
            Next::TypeId | Next::TypeDesc | Next::TypeEnd | Next::FieldName(Parent::Type) => Field::ModuleType,
            Next::TypeFunc => Field::ModuleTypeFunc,
            Next::ImportModule
            | Next::ImportName { .. }
            | Next::ImportDesc { .. }
            | Next::ImportEnd
            | Next::FieldName(Parent::Import { .. }) => Field::ModuleImport,
            Next::ImportFuncId | Next::ImportFunc => Field::ModuleImportFunc,
            Next::FuncId | Next::FuncUse | Next::FuncBody => Field::ModuleFunc,
            Next::ExportName | Next::ExportDesc { .. } | Next::ExportEnd | Next::FieldName(Parent::Export { .. }) => {
                Field::ModuleExport
            }
            Next::ExportFunc => Field::ModuleExportFunc,
            Next::Start => Field::ModuleStart,
        }
    }
}

// ============================================================================
// Module Parser
// ============================================================================

/// Push-style parser for one module.
///
/// Call [`ModuleParser::feed`] with each token, then [`ModuleParser::finish`].
/// After an error the parser must be discarded.
pub struct ModuleParser<'b> {
    next: Next,
    draft: DraftModule,
    /// Position in the type index namespace.
    type_index: u32,
    /// Position in the function index namespace, imports included.
    func_index: u32,
    export_index: u32,
    type_ids: IdContext,
    func_ids: IdContext,
    types: TypeParser,
    index: IndexParser,
    func: FuncParser,
    body: &'b mut dyn BodyParser,
}

impl<'b> ModuleParser<'b> {
    pub fn new(body: &'b mut dyn BodyParser) -> Self {
        Self {
            next: Next::Initial,
            draft: DraftModule::default(),
            type_index: 0,
            func_index: 0,
            export_index: 0,
            type_ids: IdContext::new(),
            func_ids: IdContext::new(),
            types: TypeParser::new(),
            index: IndexParser::new(),
            func: FuncParser::new(),
            body,
        }
    }

    /// The field the parser is currently in.
    pub fn current_field(&self) -> Field {
        self.next.field()
    }

    /// Feeds one token.
    pub fn feed(&mut self, token: &Token) -> Result<(), FormatError> {
        let field = self.next.field();
        self.dispatch(token)
            .map_err(|kind| FormatError::new(token.span, self.context(field), kind))
    }

    /// Completes the parse once the token stream is exhausted. `end` is where
    /// the stream ended, used when the source held no module at all.
    pub fn finish(self, end: Span) -> Result<Module, FormatError> {
        if self.next != Next::Trailing {
            return Err(FormatError::new(end, "", ParseErrorKind::MissingModule));
        }
        log::debug!(
            "parsed module: {} explicit types, {} implicit types, {} functions, {} exports",
            self.draft.types.len(),
            self.draft.inlined_types.len(),
            self.func_index,
            self.export_index
        );
        bind(self.draft, &self.type_ids, &self.func_ids)
    }

    fn context(&self, field: Field) -> String {
        match field {
            Field::Initial => String::new(),
            Field::Module => "module".to_string(),
            Field::ModuleType => format!("module.type[{}]", self.type_index),
            Field::ModuleTypeFunc => format!("module.type[{}].func{}", self.type_index, self.types.context()),
            Field::ModuleImport => format!("module.import[{}]", self.func_index),
            Field::ModuleImportFunc => format!("module.import[{}].func{}", self.func_index, self.types.context()),
            Field::ModuleFunc => {
                let mut context = self.types.context();
                if context.is_empty() {
                    context = self.func.context();
                }
                format!("module.func[{}]{}", self.func_index, context)
            }
            Field::ModuleExport => format!("module.export[{}]", self.export_index),
            Field::ModuleExportFunc => format!("module.export[{}].func", self.export_index),
            Field::ModuleStart => "module.start".to_string(),
        }
    }

    fn dispatch(&mut self, token: &Token) -> Result<(), ParseErrorKind> {
        match std::mem::replace(&mut self.next, Next::Initial) {
            Next::Initial => {
                if !token.is_left_paren() {
                    return Err(ParseErrorKind::expected_lparen(token));
                }
                self.next = Next::FieldName(Parent::Initial);
            }
            Next::FieldName(parent) => self.begin_field(parent, token)?,
            Next::ModuleName => match &token.kind {
                TokenKind::Id(id) => {
                    self.draft.names.module_name = Some(id.clone());
                    self.next = Next::Module;
                }
                _ => self.parse_module(token)?,
            },
            Next::Module => self.parse_module(token)?,
            Next::TypeId => match &token.kind {
                TokenKind::Id(id) => {
                    self.type_ids.set_id(id, self.type_index)?;
                    self.next = Next::TypeDesc;
                }
                _ => self.parse_type(token)?,
            },
            Next::TypeDesc => self.parse_type(token)?,
            Next::TypeFunc => {
                self.next = Next::TypeFunc;
                if self.types.parse(token)? == Step::Done {
                    let signature = self.types.take_signature();
                    log::trace!("type[{}] = {}", self.type_index, signature);
                    self.draft.types.push(signature);
                    self.next = Next::TypeEnd;
                }
            }
            Next::TypeEnd => match &token.kind {
                TokenKind::RightParen => {
                    self.type_index += 1;
                    self.end_field(Field::ModuleType);
                }
                TokenKind::Id(_) => return Err(ParseErrorKind::RedundantId(token.kind.to_string())),
                _ => return Err(ParseErrorKind::unexpected(token)),
            },
            Next::ImportModule => match &token.kind {
                TokenKind::String(bytes) => {
                    self.next = Next::ImportName {
                        module: utf8(bytes)?,
                    };
                }
                TokenKind::LeftParen | TokenKind::RightParen => return Err(ParseErrorKind::MissingModuleAndName),
                _ => return Err(ParseErrorKind::unexpected(token)),
            },
            Next::ImportName { module } => match &token.kind {
                TokenKind::String(bytes) => {
                    self.next = Next::ImportDesc {
                        module,
                        name: utf8(bytes)?,
                    };
                }
                TokenKind::LeftParen | TokenKind::RightParen => return Err(ParseErrorKind::MissingName),
                _ => return Err(ParseErrorKind::unexpected(token)),
            },
            Next::ImportDesc { module, name } => match &token.kind {
                TokenKind::String(bytes) => return Err(ParseErrorKind::RedundantName(lossy(bytes))),
                TokenKind::LeftParen => self.next = Next::FieldName(Parent::Import { module, name }),
                TokenKind::RightParen => return Err(ParseErrorKind::MissingDescription),
                _ => return Err(ParseErrorKind::unexpected(token)),
            },
            Next::ImportFuncId => {
                if let TokenKind::Id(id) = &token.kind {
                    self.set_func_id(id)?;
                    self.types.begin_type_use();
                    self.next = Next::ImportFunc;
                } else {
                    self.types.begin_type_use();
                    self.next = Next::ImportFunc;
                    self.parse_import_func(token)?;
                }
            }
            Next::ImportFunc => {
                self.next = Next::ImportFunc;
                self.parse_import_func(token)?;
            }
            Next::ImportEnd => match &token.kind {
                TokenKind::String(bytes) => return Err(ParseErrorKind::RedundantName(lossy(bytes))),
                TokenKind::RightParen => {
                    self.func_index += 1;
                    self.end_field(Field::ModuleImport);
                }
                _ => return Err(ParseErrorKind::unexpected(token)),
            },
            Next::FuncId => {
                if let TokenKind::Id(id) = &token.kind {
                    self.set_func_id(id)?;
                    self.types.begin_type_use();
                    self.next = Next::FuncUse;
                } else {
                    self.types.begin_type_use();
                    self.next = Next::FuncUse;
                    self.parse_func_use(token)?;
                }
            }
            Next::FuncUse => {
                self.next = Next::FuncUse;
                self.parse_func_use(token)?;
            }
            Next::FuncBody => {
                self.next = Next::FuncBody;
                self.parse_func_body(token)?;
            }
            Next::ExportName => match &token.kind {
                TokenKind::String(bytes) => {
                    let name = utf8(bytes)?;
                    if self.draft.export_funcs.iter().any(|e| e.name == name) {
                        return Err(ParseErrorKind::DuplicateName(name));
                    }
                    self.next = Next::ExportDesc { name };
                }
                TokenKind::LeftParen | TokenKind::RightParen => return Err(ParseErrorKind::MissingName),
                _ => return Err(ParseErrorKind::unexpected(token)),
            },
            Next::ExportDesc { name } => match &token.kind {
                TokenKind::String(bytes) => return Err(ParseErrorKind::RedundantName(lossy(bytes))),
                TokenKind::LeftParen => self.next = Next::FieldName(Parent::Export { name }),
                TokenKind::RightParen => return Err(ParseErrorKind::MissingDescription),
                _ => return Err(ParseErrorKind::unexpected(token)),
            },
            Next::ExportFunc => {
                self.next = Next::ExportFunc;
                if let Some(reference) = self.index.parse(token)? {
                    if let Some(export) = self.draft.export_funcs.last_mut() {
                        export.func = Some(reference);
                    }
                    self.next = Next::ExportEnd;
                }
            }
            Next::ExportEnd => match &token.kind {
                TokenKind::String(bytes) => return Err(ParseErrorKind::RedundantName(lossy(bytes))),
                TokenKind::RightParen => {
                    self.export_index += 1;
                    self.end_field(Field::ModuleExport);
                }
                _ => return Err(ParseErrorKind::unexpected(token)),
            },
            Next::Start => {
                self.next = Next::Start;
                if let Some(reference) = self.index.parse(token)? {
                    self.draft.start_function = Some(reference);
                    self.end_field(Field::ModuleStart);
                }
            }
            Next::Trailing => {
                self.next = Next::Trailing;
                return Err(ParseErrorKind::TrailingCharacters(token.kind.to_string()));
            }
        }
        Ok(())
    }

    /// Moves into the child field named by `token`, which follows a `(` read
    /// in `parent`.
    fn begin_field(&mut self, parent: Parent, token: &Token) -> Result<(), ParseErrorKind> {
        let keyword = match token.keyword() {
            Some(k) => k,
            None => return Err(ParseErrorKind::expected_field(token)),
        };
        self.next = match (parent, keyword) {
            (Parent::Initial, "module") => Next::ModuleName,
            (Parent::Module, "type") => Next::TypeId,
            (Parent::Module, "import") => {
                if !self.draft.code.is_empty() {
                    return Err(ParseErrorKind::ImportAfterFunction);
                }
                Next::ImportModule
            }
            (Parent::Module, "func") => Next::FuncId,
            (Parent::Module, "export") => Next::ExportName,
            (Parent::Module, "start") => {
                if self.draft.start_function.is_some() {
                    return Err(ParseErrorKind::RedundantStart);
                }
                self.index.begin();
                Next::Start
            }
            (Parent::Type, "func") => {
                self.types.begin_signature();
                Next::TypeFunc
            }
            (Parent::Import { module, name }, "func") => {
                self.draft.import_funcs.push(ImportFunc { module, name });
                Next::ImportFuncId
            }
            (Parent::Export { name }, "func") => {
                self.draft.export_funcs.push(DraftExport { name, func: None });
                self.index.begin();
                Next::ExportFunc
            }
            // TODO: table, memory and global imports and exports.
            _ => return Err(ParseErrorKind::UnexpectedField(keyword.to_string())),
        };
        log::trace!("begin {} at {}", self.next.field(), token.span);
        Ok(())
    }

    /// Returns to the parent of `field`, whose `)` was just read.
    fn end_field(&mut self, field: Field) {
        log::trace!("end {}", field);
        self.next = match field {
            Field::Module => Next::Trailing,
            Field::ModuleType | Field::ModuleImport | Field::ModuleFunc | Field::ModuleExport | Field::ModuleStart => {
                Next::Module
            }
            Field::ModuleTypeFunc => Next::TypeEnd,
            Field::ModuleImportFunc => Next::ImportEnd,
            Field::ModuleExportFunc => Next::ExportEnd,
            Field::Initial => Next::Initial,
        };
    }

    fn parse_module(&mut self, token: &Token) -> Result<(), ParseErrorKind> {
        match &token.kind {
            TokenKind::Id(_) => Err(ParseErrorKind::RedundantId(token.kind.to_string())),
            TokenKind::LeftParen => {
                self.next = Next::FieldName(Parent::Module);
                Ok(())
            }
            TokenKind::RightParen => {
                self.end_field(Field::Module);
                Ok(())
            }
            _ => Err(ParseErrorKind::unexpected(token)),
        }
    }

    fn parse_type(&mut self, token: &Token) -> Result<(), ParseErrorKind> {
        match &token.kind {
            TokenKind::Id(_) => Err(ParseErrorKind::RedundantId(token.kind.to_string())),
            TokenKind::LeftParen => {
                self.next = Next::FieldName(Parent::Type);
                Ok(())
            }
            TokenKind::RightParen => Err(ParseErrorKind::MissingFuncField),
            _ => Err(ParseErrorKind::unexpected(token)),
        }
    }

    fn set_func_id(&mut self, id: &str) -> Result<(), ParseErrorKind> {
        let name = self.func_ids.set_id(id, self.func_index)?;
        self.draft.names.function_names.push(NameAssoc {
            index: self.func_index,
            name,
        });
        Ok(())
    }

    fn parse_import_func(&mut self, token: &Token) -> Result<(), ParseErrorKind> {
        let leftover = match self.types.parse(token)? {
            Step::Yield(leftover) => leftover,
            _ => return Ok(()),
        };
        match leftover {
            Leftover::Token(t) if t.is_right_paren() => {
                let parsed = self.types.take_type_use(&mut self.draft, &self.type_ids);
                self.draft.type_uses.push(parsed.type_use);
                self.record_local_names(parsed.param_ids.names());
                self.end_field(Field::ModuleImportFunc);
                Ok(())
            }
            Leftover::Token(t) if matches!(t.kind, TokenKind::Id(_)) => {
                Err(ParseErrorKind::RedundantId(t.kind.to_string()))
            }
            Leftover::Token(t) => Err(ParseErrorKind::unexpected(&t)),
            // Imported functions have no locals or body.
            Leftover::Field { keyword, .. } => Err(ParseErrorKind::UnexpectedField(keyword.kind.to_string())),
        }
    }

    fn parse_func_use(&mut self, token: &Token) -> Result<(), ParseErrorKind> {
        let leftover = match self.types.parse(token)? {
            Step::Yield(leftover) => leftover,
            _ => return Ok(()),
        };
        let parsed = self.types.take_type_use(&mut self.draft, &self.type_ids);
        self.draft.type_uses.push(parsed.type_use);
        self.func.begin(parsed.param_count, parsed.param_ids, &mut *self.body);
        self.next = Next::FuncBody;
        match leftover {
            Leftover::Token(t) if matches!(t.kind, TokenKind::Id(_)) => {
                Err(ParseErrorKind::RedundantId(t.kind.to_string()))
            }
            Leftover::Token(t) => self.parse_func_body(&t),
            Leftover::Field { lparen, keyword } => {
                self.parse_func_body(&lparen)?;
                self.parse_func_body(&keyword)
            }
        }
    }

    fn parse_func_body(&mut self, token: &Token) -> Result<(), ParseErrorKind> {
        if !self.func.parse(token, &mut *self.body)? {
            return Ok(());
        }
        let (code, names) = self.func.take(&mut *self.body)?;
        log::trace!(
            "func[{}] locals={} body={}",
            self.func_index,
            code.locals.len(),
            hex::encode(&code.body.code)
        );
        self.draft.code.push(code);
        self.record_local_names(names);
        self.func_index += 1;
        self.end_field(Field::ModuleFunc);
        Ok(())
    }

    fn record_local_names(&mut self, name_map: Vec<NameAssoc>) {
        if !name_map.is_empty() {
            self.draft.names.local_names.push(NameMapAssoc {
                index: self.func_index,
                name_map,
            });
        }
    }
}

fn utf8(bytes: &[u8]) -> Result<String, ParseErrorKind> {
    String::from_utf8(bytes.to_vec()).map_err(|_| ParseErrorKind::MalformedUtf8)
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{FunctionType, ValueType};

    fn err(source: &str) -> String {
        parse(source).unwrap_err().to_string()
    }

    #[test]
    fn empty_module() {
        let module = parse("(module)").unwrap();
        assert_eq!(module, Module::default());
    }

    #[test]
    fn leading_comments_and_whitespace() {
        let module = parse(";; hello\n  (; block ;) (module $m)").unwrap();
        assert_eq!(module.names.unwrap().module_name.as_deref(), Some("m"));
    }

    #[test]
    fn current_field_follows_tokens() {
        let mut body = InstructionEncoder::new();
        let mut parser = ModuleParser::new(&mut body);
        let tokens = Lexer::tokenise("(module (import \"a\" \"b\" (func)))").unwrap();
        let mut fields = Vec::new();
        for token in &tokens {
            parser.feed(token).unwrap();
            fields.push(parser.current_field());
        }
        assert_eq!(
            fields,
            vec![
                Field::Initial,
                Field::Module,
                Field::Module,
                Field::ModuleImport,
                Field::ModuleImport,
                Field::ModuleImport,
                Field::ModuleImport,
                Field::ModuleImportFunc,
                Field::ModuleImport,
                Field::Module,
                Field::Initial,
            ]
        );
        assert_eq!(parser.func_index, 1);
    }

    #[test]
    fn type_field() {
        let module = parse("(module (type $t (func (param i32) (result i64))))").unwrap();
        assert_eq!(
            module.types,
            vec![FunctionType {
                params: vec![ValueType::I32],
                results: vec![ValueType::I64]
            }]
        );
        // Type names are not recorded in the name section.
        assert_eq!(module.names, None);
    }

    #[test]
    fn errors_carry_context() {
        assert_eq!(err("module"), "1:1: expected '(', but found keyword: module");
        assert_eq!(err("(func)"), "1:2: unexpected field: func");
        assert_eq!(err("(module $a $b)"), "1:12: redundant ID $b in module");
        assert_eq!(err("(module (type))"), "1:14: missing func field in module.type[0]");
        assert_eq!(
            err("(module (type (func (param i31))))"),
            "1:28: unknown type: i31 in module.type[0].func.param[0]"
        );
        assert_eq!(
            err("(module (func (local $x i32) (local $x i32)))"),
            "1:37: duplicate identifier: $x in module.func[0].local[1]"
        );
        assert_eq!(err("(module) (module)"), "1:10: unexpected trailing characters: (");
    }

    #[test]
    fn lex_errors_carry_context() {
        assert_eq!(
            err("(module (import \"a\" \"b\" (func $f \"x)))"),
            "1:34: unterminated string in module.import[0].func"
        );
    }

    #[test]
    fn empty_source() {
        assert_eq!(err(""), "1:1: missing module field");
        assert_eq!(err(";; nothing"), "1:1: missing module field");
    }
}
