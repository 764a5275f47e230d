//! Tail-call rewriting.
//!
//! A call is in tail position when control reaches a return of its result, or a unit
//! return, without executing anything else. Labels, `nop`s and unconditional jumps are
//! looked through; the jump target is followed to its label.

use hashbrown::HashMap;

use crate::core::instr::{Instr, Opcode, Var};
use crate::regalloc::liveness::label_positions;

/// Whether the call at `index` flows straight into a return of its value.
fn is_tail(instrs: &[Instr], index: usize, labels: &HashMap<Var, usize>) -> bool {
    let result = match instrs[index].op {
        Opcode::CallDirRet | Opcode::CallClsRet => instrs[index].reg(0),
        _ => None,
    };
    let mut i = index + 1;
    let mut jumps = 0;
    while i < instrs.len() {
        let instr = &instrs[i];
        match instr.op {
            Opcode::Label | Opcode::Nop | Opcode::Comment => i += 1,
            Opcode::J => {
                jumps += 1;
                let target = instr.label_operand().and_then(|l| labels.get(l));
                match target {
                    Some(&pos) if jumps <= instrs.len() => i = pos + 1,
                    _ => return false,
                }
            }
            Opcode::ReturnUnit => return true,
            Opcode::Return => return result.is_some() && instr.reg(0) == result,
            _ => return false,
        }
    }
    false
}

/// Turn calls in tail position into tail-call pseudo-ops. Returns the rewritten body and
/// the number of calls rewritten.
pub fn rewrite_tail_calls(instrs: Vec<Instr>) -> (Vec<Instr>, usize) {
    let labels = label_positions(&instrs);
    let tails: Vec<bool> = (0..instrs.len())
        .map(|i| instrs[i].op.is_call_pseudo() && is_tail(&instrs, i, &labels))
        .collect();

    let mut rewritten = 0;
    let out = instrs
        .into_iter()
        .zip(tails)
        .map(|(mut instr, tail)| {
            if !tail {
                return instr;
            }
            let op = match instr.op {
                Opcode::CallDirRet => {
                    instr.operands.remove(0);
                    Opcode::TailDir
                }
                Opcode::CallClsRet => {
                    instr.operands.remove(0);
                    Opcode::TailCls
                }
                Opcode::CallDir => Opcode::TailDir,
                Opcode::CallCls => Opcode::TailCls,
                _ => return instr,
            };
            rewritten += 1;
            Instr { op, ..instr }
        })
        .collect();
    log::debug!("rewrote {rewritten} tail call(s)");
    (out, rewritten)
}
