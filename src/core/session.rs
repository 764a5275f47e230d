// This module provides the compilation session shared by all per-function stages. The
// session owns a reference to a bumpalo arena used for short-lived per-function data such as
// the callee-save list of a stack frame, remembers which body is being compiled for log
// context, and accumulates SessionStats: functions compiled, allocator rebuild rounds,
// variables spilled per register class, tail calls rewritten, intrinsics inlined, vector
// accesses formed and the instruction count of the final listing. Interior mutability keeps
// the session shareable by reference across the pipeline.

//! Arena-based compilation session management.

use bumpalo::Bump;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

/// Arena-based compilation session.
pub struct CompilationSession<'arena> {
    /// Arena allocator for per-function scratch data.
    arena: &'arena Bump,

    /// Session statistics for debugging and tuning.
    stats: RefCell<SessionStats>,

    /// Body currently being compiled.
    current_function: RefCell<Option<String>>,
}

impl<'arena> CompilationSession<'arena> {
    pub fn new(arena: &'arena Bump) -> Self {
        Self {
            arena,
            stats: RefCell::new(SessionStats::default()),
            current_function: RefCell::new(None),
        }
    }

    /// Get the arena allocator.
    pub fn arena(&self) -> &'arena Bump {
        self.arena
    }

    pub fn set_current_function(&self, name: &str) {
        *self.current_function.borrow_mut() = Some(name.to_string());
    }

    pub fn current_function(&self) -> Option<String> {
        self.current_function.borrow().clone()
    }

    pub fn record_function_compiled(&self, name: &str, instructions: usize) {
        let mut stats = self.stats.borrow_mut();
        stats.functions_compiled += 1;
        stats.instructions_emitted += instructions;
        if instructions > stats.largest_function_size {
            stats.largest_function_size = instructions;
            stats.largest_function_name = name.to_string();
        }
    }

    pub fn record_allocation(&self, rounds: usize, spilled_int: usize, spilled_float: usize) {
        let mut stats = self.stats.borrow_mut();
        stats.allocator_rounds += rounds;
        stats.spilled_int += spilled_int;
        stats.spilled_float += spilled_float;
    }

    pub fn record_tail_calls(&self, count: usize) {
        self.stats.borrow_mut().tail_calls += count;
    }

    pub fn record_inlined(&self, callee: &str) {
        *self
            .stats
            .borrow_mut()
            .inlined
            .entry(callee.to_string())
            .or_insert(0) += 1;
    }

    pub fn record_vector_ops(&self, count: usize) {
        self.stats.borrow_mut().vector_ops += count;
    }

    pub fn stats(&self) -> SessionStats {
        self.stats.borrow().clone()
    }
}

/// Statistics gathered over one compilation.
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    /// Function bodies compiled, the top-level body included.
    pub functions_compiled: usize,

    /// Instructions in the final listing (runtime bodies excluded).
    pub instructions_emitted: usize,

    pub largest_function_size: usize,
    pub largest_function_name: String,

    /// Build/Simplify/Select rounds over all bodies.
    pub allocator_rounds: usize,

    pub spilled_int: usize,
    pub spilled_float: usize,

    pub tail_calls: usize,

    /// Inlined intrinsic calls per callee.
    pub inlined: HashMap<String, usize>,

    /// Vector loads and stores formed by the machine optimizer.
    pub vector_ops: usize,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Compilation Session Statistics:")?;
        writeln!(f, "  Functions compiled: {}", self.functions_compiled)?;
        writeln!(f, "  Instructions emitted: {}", self.instructions_emitted)?;
        writeln!(f, "  Allocator rounds: {}", self.allocator_rounds)?;
        writeln!(
            f,
            "  Spilled variables: {} int, {} float",
            self.spilled_int, self.spilled_float
        )?;
        writeln!(f, "  Tail calls: {}", self.tail_calls)?;
        writeln!(f, "  Vector accesses: {}", self.vector_ops)?;

        if !self.largest_function_name.is_empty() {
            writeln!(
                f,
                "  Largest function: {} ({} instructions)",
                self.largest_function_name, self.largest_function_size
            )?;
        }

        if !self.inlined.is_empty() {
            writeln!(f, "  Inlined intrinsics:")?;
            let mut sorted: Vec<_> = self.inlined.iter().collect();
            sorted.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
            for (callee, count) in sorted {
                writeln!(f, "    {}: {}", callee, count)?;
            }
        }
        Ok(())
    }
}
