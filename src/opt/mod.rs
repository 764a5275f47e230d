// This module drives the machine-level optimizer over one expanded body. Finalisation first
// lowers the remaining assembler shorthands (`neg` and the absolute-address accesses) to
// plain instructions so every later pass sees a single form. The main loop then runs a
// fixed number of rounds of peephole, stack-pointer coalescing, jump threading,
// vectorisation and left alignment, clearing `nop`s after each round; a fixed count keeps
// the loop bounded even when two rewrites undo each other. Branch threading runs once
// afterwards because coalescing still needs the structured branch labels, and load-use
// stall scheduling runs last on the final instruction order.

//! Machine optimizer.

pub mod jump;
pub mod peephole;
pub mod sp;
pub mod stall;
pub mod vector;

use crate::compiler::CompilerOptions;
use crate::core::error::CompileResult;
use crate::core::instr::{Instr, Opcode, Operand, Reg};
use crate::core::register_file::AsmReg;
use crate::core::session::CompilationSession;

/// Lower shorthands: `neg` to `sub` from zero, absolute accesses to `x0`-based ones.
pub fn finalize(instrs: Vec<Instr>) -> Vec<Instr> {
    let zero = || Reg::phys(AsmReg::ZERO);
    instrs
        .into_iter()
        .filter(|i| i.op != Opcode::Nop)
        .map(|instr| {
            let rewritten = match (instr.op, instr.reg(0), instr.operands.get(1)) {
                (Opcode::Neg, Some(rd), Some(Operand::Reg(rs))) => {
                    Some(Instr::rrr(Opcode::Sub, rd.clone(), zero(), rs.clone()))
                }
                (Opcode::Lwi | Opcode::Flwi, Some(rd), Some(Operand::Imm(addr))) => {
                    Some(Instr::load(rd.clone(), zero(), *addr))
                }
                (Opcode::Swi | Opcode::Fswi, Some(rs), Some(Operand::Imm(addr))) => {
                    Some(Instr::store(zero(), rs.clone(), *addr))
                }
                _ => None,
            };
            rewritten.unwrap_or(instr)
        })
        .collect()
}

pub fn delete_nops(mut instrs: Vec<Instr>) -> Vec<Instr> {
    instrs.retain(|i| i.op != Opcode::Nop);
    instrs
}

/// Run the optimizer loop and the closing passes.
pub fn optimize(
    instrs: Vec<Instr>,
    options: &CompilerOptions,
    session: &CompilationSession<'_>,
) -> CompileResult<Vec<Instr>> {
    let mut instrs = finalize(instrs);
    let before = instrs.len();
    let mut vector_ops = 0;
    for round in 0..options.opt_rounds {
        instrs = peephole::peephole(instrs);
        let (coalesced, merged) = sp::coalesce_sp(&instrs)?;
        instrs = coalesced;
        let threaded = jump::thread_jumps(&mut instrs);
        if options.vectorize {
            let (vectorized, formed) = vector::vectorize(instrs);
            instrs = vectorized;
            vector::left_align(&mut instrs);
            vector_ops += formed;
        }
        instrs = delete_nops(instrs);
        log::trace!(
            "optimizer round {round}: {merged} sp adjustments absorbed, {threaded} jumps threaded, {} instructions",
            instrs.len()
        );
    }
    let branches = jump::thread_branches(&mut instrs);
    let swaps = if options.schedule_loads {
        stall::schedule_loads(&mut instrs)
    } else {
        0
    };
    session.record_vector_ops(vector_ops);
    log::debug!(
        "optimized {before} -> {} instructions ({vector_ops} vector ops, {branches} branches threaded, {swaps} stall swaps)",
        instrs.len()
    );
    Ok(instrs)
}
