//! Peephole rewrites over adjacent instructions.
//!
//! Works on virtual and physical code alike: register identity is by name.

use crate::core::instr::{Instr, Opcode, Operand};
use crate::core::register_file::AsmReg;

fn is_move(op: Opcode) -> bool {
    matches!(op, Opcode::Mv | Opcode::Fmv)
}

fn same_reg(a: &Instr, i: usize, b: &Instr, j: usize) -> bool {
    matches!((a.reg(i), b.reg(j)), (Some(x), Some(y)) if x.name == y.name)
}

/// Base operand index of a plain load or store.
fn base_slot(op: Opcode) -> Option<usize> {
    match op {
        Opcode::Lw | Opcode::Flw => Some(1),
        Opcode::Sw | Opcode::Fsw => Some(0),
        _ => None,
    }
}

/// Fold `addi t, s, k` into the offset of a following access based on `t`.
fn fold_offset(addi: &Instr, access: &mut Instr) -> bool {
    let (Some(rd), Some(rs), Some(k)) = (addi.reg(0), addi.reg(1), addi.imm(2)) else {
        return false;
    };
    // sp adjustments belong to stack-pointer coalescing; rd == rs would read the new value
    if rd.is(AsmReg::SP) || rs.is(AsmReg::SP) || rd.name == rs.name {
        return false;
    }
    let Some(base) = base_slot(access.op) else {
        return false;
    };
    if access.reg(base).map(|b| &b.name) != Some(&rd.name) {
        return false;
    }
    let Some(offset) = access.imm(2) else {
        return false;
    };
    access.operands[base] = Operand::Reg(rs.clone());
    access.operands[2] = Operand::Imm(offset.wrapping_add(k));
    true
}

/// One peephole pass. Removed instructions become `nop`s, except `addi r, r, 0`, which is
/// dropped outright.
pub fn peephole(mut instrs: Vec<Instr>) -> Vec<Instr> {
    for j in 0..instrs.len() {
        let op = instrs[j].op;
        if is_move(op) {
            if same_reg(&instrs[j], 0, &instrs[j], 1) {
                instrs[j] = Instr::nop();
            } else if j + 1 < instrs.len()
                && instrs[j + 1].op == op
                && same_reg(&instrs[j], 0, &instrs[j + 1], 1)
                && same_reg(&instrs[j], 1, &instrs[j + 1], 0)
            {
                instrs[j + 1] = Instr::nop();
            }
        } else if op == Opcode::Addi && j + 1 < instrs.len() {
            let (head, tail) = instrs.split_at_mut(j + 1);
            fold_offset(&head[j], &mut tail[0]);
        }
    }

    instrs.retain(|i| {
        !(i.op == Opcode::Addi && same_reg(i, 0, i, 1) && i.imm(2) == Some(0))
    });
    instrs
}
