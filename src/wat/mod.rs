//! WebAssembly Text Format (WAT) front end.
//!
//! Turns WAT source into a resolved [`Module`](crate::module::Module): the
//! lexer produces tokens, the module parser consumes them one at a time, and
//! the binder resolves symbolic indices once the whole source has been seen.
//!
//! # Example
//!
//! ```
//! use watmod::wat;
//!
//! let module = wat::parse(r#"
//!     (module
//!         (func $f (result i32) i32.const 42)
//!         (export "f" (func $f)))
//! "#).unwrap();
//!
//! assert_eq!(module.types.len(), 1);
//! assert_eq!(module.export_funcs[0].func_index, 0);
//! ```
//!
//! # Error Handling
//!
//! A failed parse returns a single [`FormatError`] with the position of the
//! offending token and the field the parser was in:
//!
//! ```
//! use watmod::wat;
//!
//! let err = wat::parse("(module (start 0) (start 0))").unwrap_err();
//! assert_eq!(err.to_string(), "1:20: redundant start in module");
//! ```

mod bind;
mod body;
mod cursor;
mod error;
mod func;
mod ids;
mod index;
mod lexer;
mod parser;
mod token;
mod types;

pub use bind::bind;
pub use body::{BodyParser, InstructionEncoder};
pub use error::{FormatError, LexError, Namespace, ParseErrorKind};
pub use ids::{IdContext, LocalIndex, LocalScope};
pub use lexer::Lexer;
pub use parser::{parse, parse_with, Field, ModuleParser};
pub use token::{FloatLit, FloatMagnitude, SignedValue, Span, Token, TokenKind};
