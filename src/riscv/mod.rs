//! Target-specific stages: runtime builtins, tail calls, intrinsic inlining, the calling
//! convention and its expansion.

pub mod expand;
pub mod frame;
pub mod inline;
pub mod runtime;
pub mod tail;

pub use expand::{expand, ClobberTable};
pub use frame::{CCAssigner, FunctionFrame, RvAssigner, VirtualStack};
pub use runtime::BuiltinTable;
