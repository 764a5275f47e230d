// This module runs the whole back end over a program. Every function definition and then
// the top-level body go through constant-register propagation, lowering, address folding
// and a first peephole pass, then graph-colouring allocation with the order that suits the
// body (functions also get their parameter registers reconciled with the call-site order),
// tail-call rewriting and intrinsic inlining. Clobber sets can only be published once every
// function has reached that point, since a caller's expansion consults its callees. Each
// body is then expanded against its stack frame, finalised, run through the machine
// optimizer and rendered. The listing starts with the global declaration and the runtime
// bodies and ends with a breakpoint.

//! Whole-program compilation driver.

use crate::core::error::CompileResult;
use crate::core::instr::{Instr, Var};
use crate::core::register_file::RegisterFile;
use crate::core::session::CompilationSession;
use crate::ir::{const_reg, FunDef, Program};
use crate::lower::{const_fold::fold_addresses, Lowering, MAIN_LABEL};
use crate::opt::{delete_nops, optimize, peephole::peephole};
use crate::regalloc::{allocate, assign_param_registers};
use crate::riscv::expand::{expand, touched_registers, ClobberTable};
use crate::riscv::frame::{CCAssigner, FunctionFrame, RvAssigner, VirtualStack};
use crate::riscv::inline::inline_intrinsics;
use crate::riscv::runtime::BuiltinTable;
use crate::riscv::tail::rewrite_tail_calls;

/// Knobs of one compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Rounds of the machine optimizer loop.
    pub opt_rounds: usize,
    pub vectorize: bool,
    pub schedule_loads: bool,
    /// Also rewrite array get/put operands to constant registers.
    pub propagate_array_operands: bool,
    /// Prepend the runtime bodies to the listing.
    pub emit_runtime: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            opt_rounds: 10,
            vectorize: true,
            schedule_loads: true,
            propagate_array_operands: false,
            emit_runtime: true,
        }
    }
}

/// A body between allocation and expansion.
#[derive(Debug)]
struct AllocatedBody {
    name: Var,
    instrs: Vec<Instr>,
    is_function: bool,
}

/// Compiles programs within one session.
pub struct Compiler<'s, 'arena> {
    options: CompilerOptions,
    session: &'s CompilationSession<'arena>,
    runtime: BuiltinTable,
    cc: RvAssigner,
}

impl<'s, 'arena> Compiler<'s, 'arena> {
    pub fn new(options: CompilerOptions, session: &'s CompilationSession<'arena>) -> Self {
        Self {
            options,
            session,
            runtime: BuiltinTable::standard(),
            cc: RvAssigner::new(),
        }
    }

    /// Replace the standard runtime table.
    pub fn with_runtime(mut self, runtime: BuiltinTable) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// Compile `program` into an assembly listing.
    pub fn compile_program(&self, program: &Program) -> CompileResult<String> {
        let propagate_arrays = self.options.propagate_array_operands;
        let mut lowering = Lowering::new();
        let mut bodies = Vec::with_capacity(program.fundefs.len() + 1);
        for def in &program.fundefs {
            let def = FunDef {
                body: const_reg::propagate(&def.body, propagate_arrays),
                ..def.clone()
            };
            let instrs = lowering.lower_fundef(&def)?;
            bodies.push(self.allocate_body(def.name.0.clone(), instrs, true)?);
        }
        let main = const_reg::propagate(&program.body, propagate_arrays);
        let instrs = lowering.lower_main(&main, program.first_hp)?;
        bodies.push(self.allocate_body(Var::from(MAIN_LABEL), instrs, false)?);

        let mut clobbers = ClobberTable::from_runtime(&self.runtime);
        for body in bodies.iter().filter(|b| b.is_function) {
            if !clobbers.publish(&body.name, &body.instrs) {
                log::trace!("{} calls out, callers assume every caller-saved register", body.name);
            }
        }

        let mut listing = String::from(".globl main\n\n.text\n\n");
        if self.options.emit_runtime {
            for builtin in self.runtime.iter() {
                listing.push_str(&builtin.render());
                listing.push('\n');
            }
        }
        for body in bodies {
            for instr in self.finish_body(body, &clobbers)? {
                listing.push_str(&instr.to_string());
                listing.push('\n');
            }
        }
        listing.push_str("\n\tebreak\n");

        let stats = self.session.stats();
        log::info!(
            "compiled {} bodies into {} instructions ({} allocator rounds, {} int / {} float spills, {} tail calls)",
            stats.functions_compiled,
            stats.instructions_emitted,
            stats.allocator_rounds,
            stats.spilled_int,
            stats.spilled_float,
            stats.tail_calls
        );
        Ok(listing)
    }

    /// Stages up to and including intrinsic inlining.
    fn allocate_body(
        &self,
        name: Var,
        instrs: Vec<Instr>,
        is_function: bool,
    ) -> CompileResult<AllocatedBody> {
        self.session.set_current_function(&name);
        let instrs = delete_nops(peephole(fold_addresses(instrs)));
        let file = if is_function {
            RegisterFile::for_function()
        } else {
            RegisterFile::for_main()
        };
        let allocation = allocate(instrs, &file)?;
        self.session.record_allocation(
            allocation.rounds,
            allocation.spilled_int,
            allocation.spilled_float,
        );
        let mut instrs = allocation.instrs;
        if is_function {
            assign_param_registers(&mut instrs, &name)?;
        }

        let (instrs, tail_calls) = rewrite_tail_calls(instrs);
        self.session.record_tail_calls(tail_calls);
        let (instrs, inlined) = inline_intrinsics(instrs);
        for callee in &inlined {
            self.session.record_inlined(callee);
        }
        log::debug!("{name}: {} instructions after allocation", instrs.len());
        Ok(AllocatedBody {
            name,
            instrs,
            is_function,
        })
    }

    /// Expansion, optimisation and bookkeeping of one body.
    fn finish_body(&self, body: AllocatedBody, clobbers: &ClobberTable) -> CompileResult<Vec<Instr>> {
        self.session.set_current_function(&body.name);
        let frame = if body.is_function {
            let touched = touched_registers(&body.instrs)?;
            Some(FunctionFrame::for_body(
                self.session.arena(),
                self.cc.get_ccinfo(),
                &touched,
            ))
        } else {
            None
        };
        let (expanded, _) = expand(
            &body.instrs,
            VirtualStack::new(),
            frame.as_ref(),
            &self.cc,
            clobbers,
        )?;
        let code = optimize(expanded, &self.options, self.session)?;
        self.session.record_function_compiled(&body.name, code.len());
        Ok(code)
    }
}

/// Compile `program` with the standard runtime.
pub fn compile_program(
    program: &Program,
    options: &CompilerOptions,
    session: &CompilationSession<'_>,
) -> CompileResult<String> {
    Compiler::new(options.clone(), session).compile_program(program)
}
