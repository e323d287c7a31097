//! A WebAssembly text format front end.
//!
//! watmod reads WAT source into an in-memory module description: types,
//! imported and defined functions, exports, the start function and debug
//! names, with every symbolic index resolved to its numeral.
//!
//! # Modules
//!
//! - [`wat`] -- Lexer, module parser and index binder.
//! - [`module`] -- The parsed [`module::Module`] and the draft it is built from.
//! - [`encoding`] -- LEB128 and IEEE 754 writers used to encode function bodies.
//!
//! # Example
//!
//! ```
//! use watmod::wat;
//!
//! let module = wat::parse(r#"
//!     (module $math
//!         (import "env" "log" (func $log (param i32)))
//!         (func $add (param $a i32) (param $b i32) (result i32)
//!             local.get $a
//!             local.get $b
//!             i32.add)
//!         (export "add" (func $add)))
//! "#).unwrap();
//!
//! assert_eq!(module.function_count(), 2);
//! assert_eq!(module.function_name(1), Some("add"));
//! assert_eq!(module.export_funcs[0].func_index, 1);
//! ```

pub mod encoding;
pub mod module;
pub mod wat;
