// This module defines the error type shared by every stage of the rvback pipeline, built on
// the thiserror crate. CompileError covers the failure taxonomy of the back end: malformed
// input (undefined variables in the type environment, dump reader errors), structural
// assumption violations (branches without their then/endif labels, jumps to missing
// labels), allocator failures (a non-candidate node that cannot be coloured, a virtual
// register left without a colour, exhausted spill progress), spill-slot lookups that fail
// on some path, and calls with more arguments than argument registers. None of these is
// recoverable; compilation of the program stops at the first one. CompileResult<T> is the
// alias every fallible function returns.

//! Error types for the rvback compiler.
//!
//! Using thiserror for idiomatic error handling.

use thiserror::Error;

/// Main error type for back-end compilation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("Undefined variable `{name}` while lowering {context}")]
    UndefinedVariable { name: String, context: String },

    #[error("Missing label `{label}` during {stage}")]
    MissingLabel { label: String, stage: &'static str },

    #[error("Node `{var}` could not be coloured and is not a spill candidate")]
    UncolorableNode { var: String },

    #[error("No register assigned to `{var}`")]
    UnassignedRegister { var: String },

    #[error("Variable `{var}` has no available spill slot")]
    SpillSlotUnavailable { var: String },

    #[error("Call to `{callee}` passes {count} {class} arguments, at most {max} fit in registers")]
    TooManyArguments {
        callee: String,
        class: &'static str,
        count: usize,
        max: usize,
    },

    #[error("Register allocation failed: {reason}")]
    RegisterAllocation { reason: String },

    #[error("Malformed instruction `{instr}` in {stage}")]
    MalformedInstruction { instr: String, stage: &'static str },

    #[error("Parse error at line {line}, column {column}: {reason}")]
    Parse {
        line: usize,
        column: usize,
        reason: String,
    },
}

/// Result type alias for compile operations.
pub type CompileResult<T> = Result<T, CompileError>;
