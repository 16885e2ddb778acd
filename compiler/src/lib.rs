//! Compiles regular expressions into programs for the `regjit_runtime`
//! execution model and lowers those programs for one of several backends.
//!
//! A pattern is parsed into a syntax tree, built into an NFA (optionally
//! determinized), emitted as bytecode and finally handed to a backend: the
//! runtime's interpreter, natively generated x86-64 code, or a reference
//! procedure that can also be rendered as Rust source.
//!
//! # Example
//!
//! ```rust
//! use regjit_compiler::{compile, compile_with_options, Backend, CompileOptions};
//!
//! // Compiling selects a backend up front. The interpreter is the default
//! // and is available on every target.
//! let pattern = compile("h(?:e|a)llo$", Backend::Interpreter).unwrap();
//!
//! assert!(pattern.is_match("oh hello"));
//! assert!(!pattern.is_match("hello world"));
//!
//! // The same program can be lowered for a different backend without
//! // compiling the pattern again.
//! let source = pattern.with_backend(Backend::Source).unwrap();
//! assert!(source.is_match("hallo"));
//!
//! // Running the subset construction first yields a program with the same
//! // language.
//! let options = CompileOptions::default().with_deterministic(true);
//! let deterministic = compile_with_options("h(?:e|a)llo$", options).unwrap();
//! assert!(deterministic.is_match("hallo"));
//!
//! // Captures are recorded as character offsets, with `$0` spanning the
//! // whole match.
//! let captures = pattern.captures("oh hello").unwrap();
//! let whole = captures.whole().unwrap();
//! assert_eq!((3, 8), (whole.start, whole.end));
//! ```

pub mod ast;
pub mod backend;
pub mod compiler;
pub mod error;
pub mod fsm;
pub mod parser;
pub mod pattern;

pub use backend::Backend;
pub use error::CompileError;
pub use parser::parse;
pub use pattern::{compile, compile_with_options, CompileOptions, CompiledPattern};
