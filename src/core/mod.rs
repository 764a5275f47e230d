// Shared infrastructure used by every stage of the back end: the error type, the register
// model (physical names, reserved roles, allocation orders and bitsets), the instruction
// representation that lowering produces and the optimizer consumes, and the compilation
// session that owns the arena and the statistics.

//! Core infrastructure.

pub mod error;
pub mod instr;
pub mod register_file;
pub mod session;

pub use error::{CompileError, CompileResult};
pub use instr::{Instr, Opcode, Operand, Reg, Var};
pub use register_file::{AsmReg, RegBitSet, RegClass, RegisterFile};
pub use session::{CompilationSession, SessionStats};
