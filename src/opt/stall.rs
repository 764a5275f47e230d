//! Load-use stall scheduling.
//!
//! A load immediately followed by a consumer of its result stalls the pipeline. Where an
//! independent neighbour exists, either the load moves up past its predecessor or the
//! consumer moves down past its successor. Control flow, calls, stores and labels are
//! never crossed.

use crate::core::instr::{Instr, Opcode, Reg};
use crate::core::register_file::AsmReg;
use crate::regalloc::liveness::defs_uses;

fn is_barrier(instr: &Instr) -> bool {
    instr.op.is_branch()
        || matches!(
            instr.op,
            Opcode::J
                | Opcode::Jalr
                | Opcode::Call
                | Opcode::Ret
                | Opcode::Nop
                | Opcode::Label
                | Opcode::Comment
                | Opcode::Sw
                | Opcode::Fsw
                | Opcode::Swi
                | Opcode::Fswi
                | Opcode::Vsw
        )
        || instr.op.info().is_pseudo
}

fn defs_and_uses(instr: &Instr) -> (Vec<&Reg>, Vec<&Reg>) {
    let (defs, uses) = defs_uses(instr);
    let live = |r: &&Reg| !r.is(AsmReg::ZERO);
    (
        defs.into_iter().filter(live).collect(),
        uses.into_iter().filter(live).collect(),
    )
}

fn overlaps(a: &[&Reg], b: &[&Reg]) -> bool {
    a.iter().any(|x| b.iter().any(|y| x.name == y.name))
}

/// Whether `first; second` may be reordered to `second; first`.
fn independent(first: &Instr, second: &Instr) -> bool {
    let (first_defs, first_uses) = defs_and_uses(first);
    let (second_defs, second_uses) = defs_and_uses(second);
    !(overlaps(&first_defs, &second_defs)
        || overlaps(&first_uses, &second_defs)
        || overlaps(&first_defs, &second_uses))
}

fn stalls(load: &Instr, consumer: &Instr) -> bool {
    if !load.op.is_load() {
        return false;
    }
    let (defs, _) = defs_and_uses(load);
    let (_, uses) = defs_and_uses(consumer);
    overlaps(&defs, &uses)
}

/// Separate load/consumer pairs in place. Returns the number of swaps made.
pub fn schedule_loads(instrs: &mut [Instr]) -> usize {
    let mut swaps = 0;
    let mut i = 0;
    while i + 1 < instrs.len() {
        let (former, latter) = (&instrs[i], &instrs[i + 1]);
        if is_barrier(former) || is_barrier(latter) || !stalls(former, latter) {
            i += 1;
            continue;
        }
        if i > 0 && !is_barrier(&instrs[i - 1]) && independent(&instrs[i - 1], former) {
            instrs.swap(i - 1, i);
            swaps += 1;
        } else if i + 2 < instrs.len()
            && !is_barrier(&instrs[i + 2])
            && independent(latter, &instrs[i + 2])
        {
            instrs.swap(i + 1, i + 2);
            swaps += 1;
        }
        i += 1;
    }
    swaps
}
