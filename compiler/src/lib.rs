//! trc-compiler
//!
//! This crate implements:
//!  1) A tokenizer + parser for `.trc` tagged-record IDL files,
//!  2) A schema verifier (duplicate fields, bitset shape, default shapes, etc.),
//!  3) Message identity hashing (name + version → 64-bit wire discriminator),
//!  4) C++ code generation (`compile` → header/source text),
//!  5) Error types (`TrcError`).

pub mod compiler;
pub mod context;
pub mod emitter;
pub mod error;
pub mod gen_cpp;
pub mod ident;
pub mod parser;
pub mod tokenizer;
pub mod types;
pub mod utils;
pub mod verifier;

pub use compiler::compile;
pub use compiler::parse_source;
pub use gen_cpp::Generated;
