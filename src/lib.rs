//! A BBC BASIC (RISC OS "V/VI" dialect) interpreter: tokenizer, program
//! store, variable table, expression evaluator, statement executor, and a
//! `VDU`/graphics driver including a Mode 7 Teletext renderer.
//!
//! Grounded on `em68k::lib`'s `Emulator`/`Configuration` pair: a thin
//! top-level type that owns the execution core and is constructed from a
//! plain configuration struct, generalized here from a fixed memory image
//! to a generic collaborator backend.

pub mod arena;
pub mod collaborators;
pub mod config;
pub mod conversions;
pub mod error;
pub mod eval;
pub mod exec;
pub mod framebuffer;
pub mod graphics;
pub mod keywords;
pub mod mode7;
pub mod palette;
pub mod program;
pub mod rng;
pub mod strings;
pub mod swi;
pub mod token;
pub mod trace;
pub mod value;
pub mod variables;
pub mod vdu;

pub use config::Configuration;
pub use exec::Interpreter;
pub use error::{BasicError, ErrorKind, Result};
