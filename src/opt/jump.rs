//! Jump and branch threading.

use hashbrown::{HashMap, HashSet};

use crate::core::instr::{Instr, Opcode, Var};
use crate::regalloc::liveness::label_positions;

/// Target of the jump that is the first real instruction after `label`, if any.
fn jump_after(instrs: &[Instr], labels: &HashMap<Var, usize>, label: &Var) -> Option<Var> {
    let pos = *labels.get(label)?;
    instrs[pos + 1..]
        .iter()
        .find(|i| !matches!(i.op, Opcode::Label | Opcode::Nop | Opcode::Comment))
        .filter(|i| i.op == Opcode::J)
        .and_then(|i| i.label_operand().cloned())
}

/// Follow a chain of jumps from `label` to its final destination. A cycle stops at the
/// label where it closes.
fn final_target(instrs: &[Instr], labels: &HashMap<Var, usize>, label: &Var) -> Var {
    let mut seen = HashSet::new();
    let mut current = label.clone();
    while seen.insert(current.clone()) {
        match jump_after(instrs, labels, &current) {
            Some(next) => current = next,
            None => break,
        }
    }
    current
}

fn thread(instrs: &mut [Instr], retarget: impl Fn(Opcode) -> bool) -> usize {
    let labels = label_positions(instrs);
    let targets: Vec<Option<Var>> = instrs
        .iter()
        .map(|i| {
            if !retarget(i.op) {
                return None;
            }
            let label = i.label_operand()?;
            let target = final_target(instrs, &labels, label);
            (target != *label).then_some(target)
        })
        .collect();
    let mut changed = 0;
    for (instr, target) in instrs.iter_mut().zip(targets) {
        if let Some(target) = target {
            instr.set_label_operand(target);
            changed += 1;
        }
    }
    changed
}

/// Retarget unconditional jumps past intermediate jumps.
pub fn thread_jumps(instrs: &mut [Instr]) -> usize {
    thread(instrs, |op| op == Opcode::J)
}

/// Retarget conditional branches past intermediate jumps. Branch labels delimit the arms
/// stack-pointer coalescing walks, so this runs once the optimizer loop is done.
pub fn thread_branches(instrs: &mut [Instr]) -> usize {
    thread(instrs, Opcode::is_branch)
}
