//! rvback - back end for a closure-converted functional IR.
//!
//! Compiles the front end's IR dump into register-allocated, peephole-optimized assembly
//! for a RISC-V-like core with a 4-wide vector load/store extension.
//!
//! # Primary Usage
//!
//! ```ignore
//! use rvback::compiler::{compile_program, CompilerOptions};
//! use rvback::core::CompilationSession;
//! use rvback::ir::parse_program;
//! use bumpalo::Bump;
//!
//! let arena = Bump::new();
//! let session = CompilationSession::new(&arena);
//! let program = parse_program(&dump)?;
//! let listing = compile_program(&program, &CompilerOptions::default(), &session)?;
//! ```
//!
//! # Architecture
//!
//! - [`ir`] - IR types, dump parser and constant-register propagation
//! - [`lower`] - lowering to virtual-register instructions and address folding
//! - [`regalloc`] - liveness, interference graph and graph-colouring allocation
//! - [`riscv`] - runtime, tail calls, inlining and calling-convention expansion
//! - [`opt`] - machine-level optimizer
//! - [`compiler`] - whole-program driver

pub mod compiler;
pub mod core;
pub mod ir;
pub mod lower;
pub mod opt;
pub mod regalloc;
pub mod riscv;

pub use compiler::{compile_program, Compiler, CompilerOptions};
pub use self::core::{CompilationSession, CompileError, CompileResult, SessionStats};
