// Vectorisation merges runs of scalar word accesses into the target's 4-wide vector load
// and store. A run is two to four consecutive instructions of the same opcode (all `lw`, all
// `flw`, all `sw` or all `fsw`) on the same base register whose offsets step by one word,
// either upwards or downwards. Lane `k` of the vector op accesses `offset + 4k`; the lanes a
// run does not cover are padded with the zero register and cleared in the mask. A
// descending run is reversed so the lanes stay in address order, which leaves its padding
// in the low lanes; left alignment then slides such ops down so the real lanes start at
// lane 0, moving the base offset up by the same number of words.

//! 4-wide vector load/store formation.

use crate::core::instr::{Instr, Opcode, Operand, Reg};
use crate::core::register_file::{AsmReg, WORD_SIZE};

/// Lanes of a vector access.
pub const VECTOR_LENGTH: usize = 4;

/// Base, value and offset operand indices of a scalar access.
fn scalar_parts(instr: &Instr) -> Option<(&Reg, &Reg, i32)> {
    let (base, value) = match instr.op {
        Opcode::Lw | Opcode::Flw => (1, 0),
        Opcode::Sw | Opcode::Fsw => (0, 1),
        _ => return None,
    };
    Some((instr.reg(base)?, instr.reg(value)?, instr.imm(2)?))
}

/// Whether `next` extends a run ending in `last` in direction `step`.
fn extends(run: &[&Instr], next: &Instr, step: i32) -> bool {
    let Some(last) = run.last() else {
        return false;
    };
    let (Some((base, _, off)), Some((next_base, next_value, next_off))) =
        (scalar_parts(last), scalar_parts(next))
    else {
        return false;
    };
    if next.op != last.op || next_base.name != base.name || next_off != off + step {
        return false;
    }
    // a load may not overwrite the base, nor write a register twice
    if next_value.name == base.name {
        return false;
    }
    let is_load = matches!(next.op, Opcode::Lw | Opcode::Flw);
    !(is_load
        && run
            .iter()
            .any(|i| scalar_parts(i).is_some_and(|(_, v, _)| v.name == next_value.name)))
}

/// Longest run starting at `instrs[0]`, with its direction.
fn find_run(instrs: &[Instr]) -> Option<(Vec<&Instr>, i32)> {
    let first = instrs.first()?;
    let (base, value, _) = scalar_parts(first)?;
    if value.name == base.name {
        return None;
    }
    for step in [WORD_SIZE, -WORD_SIZE] {
        let mut run = vec![first];
        for next in &instrs[1..] {
            if run.len() == VECTOR_LENGTH || !extends(&run, next, step) {
                break;
            }
            run.push(next);
        }
        if run.len() >= 2 {
            return Some((run, step));
        }
    }
    None
}

fn vector_op(run: &[&Instr], step: i32) -> Option<Instr> {
    let first = *run.first()?;
    let is_load = matches!(first.op, Opcode::Lw | Opcode::Flw);
    let (base, _, first_off) = scalar_parts(first)?;
    let mut lanes: Vec<Reg> = run
        .iter()
        .filter_map(|i| scalar_parts(i).map(|(_, v, _)| v.clone()))
        .collect();
    let real = lanes.len();
    lanes.resize(VECTOR_LENGTH, Reg::phys(AsmReg::ZERO));
    let mut mask: u8 = (1u8 << real) - 1;
    let mut offset = first_off;
    if step < 0 {
        lanes.reverse();
        mask = mask.reverse_bits() >> (8 - VECTOR_LENGTH);
        offset = first_off - WORD_SIZE * (VECTOR_LENGTH as i32 - 1);
    }

    let mut operands: Vec<Operand> = vec![base.clone().into()];
    operands.extend(lanes.into_iter().map(Operand::from));
    operands.push(Operand::Imm(offset));
    operands.push(Operand::Mask(mask));
    Some(Instr::new(if is_load { Opcode::Vlw } else { Opcode::Vsw }, operands))
}

/// Merge scalar access runs. Returns the new body and the number of vector ops formed.
pub fn vectorize(instrs: Vec<Instr>) -> (Vec<Instr>, usize) {
    let mut out = Vec::with_capacity(instrs.len());
    let mut formed = 0;
    let mut i = 0;
    while i < instrs.len() {
        let merged = find_run(&instrs[i..])
            .and_then(|(run, step)| vector_op(&run, step).map(|op| (op, run.len())));
        match merged {
            Some((op, len)) => {
                out.push(op);
                formed += 1;
                i += len;
            }
            None => {
                out.push(instrs[i].clone());
                i += 1;
            }
        }
    }
    if formed > 0 {
        log::trace!("formed {formed} vector access(es)");
    }
    (out, formed)
}

/// Shift vector ops whose mask starts with empty lanes so the real lanes begin at lane 0.
pub fn left_align(instrs: &mut [Instr]) {
    for instr in instrs.iter_mut() {
        if !matches!(instr.op, Opcode::Vlw | Opcode::Vsw) || instr.operands.len() != 7 {
            continue;
        }
        let (Some(Operand::Mask(mask)), Some(offset)) = (instr.operands.get(6), instr.imm(5))
        else {
            continue;
        };
        let (mask, shift) = (*mask, mask.trailing_zeros() as usize);
        if mask == 0 || shift == 0 {
            continue;
        }
        instr.operands[1..1 + VECTOR_LENGTH].rotate_left(shift);
        for lane in VECTOR_LENGTH - shift..VECTOR_LENGTH {
            instr.operands[1 + lane] = Reg::phys(AsmReg::ZERO).into();
        }
        instr.operands[5] = Operand::Imm(offset + WORD_SIZE * shift as i32);
        instr.operands[6] = Operand::Mask(mask >> shift);
    }
}
