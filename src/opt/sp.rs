// Stack-pointer coalescing. `addi sp, sp, k` instructions are absorbed into a pending
// displacement and every later sp-relative access has the displacement added to its
// offset instead. The displacement is materialised as a single `addi` right before
// anything that observes the real stack pointer: a call, an indirect jump, a return or
// jump out, or a branch that is not one of the structured conditionals. The two arms of a
// conditional are coalesced separately from the state at the branch, and each arm settles
// its displacement before it reaches the endif label, so the join always starts from zero.

//! Lazy stack-pointer adjustment.

use hashbrown::HashMap;

use crate::core::error::{CompileError, CompileResult};
use crate::core::instr::{Instr, Opcode, Operand, Reg, Var};
use crate::core::register_file::AsmReg;
use crate::lower::endif_of;
use crate::regalloc::liveness::label_positions;

fn sp_adjust(delta: i32) -> Instr {
    Instr::rri(Opcode::Addi, Reg::phys(AsmReg::SP), Reg::phys(AsmReg::SP), delta)
}

/// Offset operand of an sp-relative access.
fn sp_offset_slot(instr: &Instr) -> Option<usize> {
    let (base, offset) = match instr.op {
        Opcode::Lw | Opcode::Flw => (1, 2),
        Opcode::Sw | Opcode::Fsw => (0, 2),
        Opcode::Vlw | Opcode::Vsw => (0, 5),
        _ => return None,
    };
    instr
        .reg(base)
        .filter(|r| r.is(AsmReg::SP))
        .map(|_| offset)
}

/// Whether control leaves the straight line here and needs the real stack pointer.
fn observes_sp(instr: &Instr) -> bool {
    matches!(instr.op, Opcode::Call | Opcode::Jalr | Opcode::Ret | Opcode::J)
}

struct Coalescer<'i> {
    instrs: &'i [Instr],
    labels: HashMap<Var, usize>,
    out: Vec<Instr>,
    merged: usize,
}

impl<'i> Coalescer<'i> {
    fn flush(&mut self, pending: &mut i32) {
        if *pending != 0 {
            self.out.push(sp_adjust(*pending));
            *pending = 0;
        }
    }

    fn range(&mut self, start: usize, end: usize, mut pending: i32) -> CompileResult<()> {
        let instrs = self.instrs;
        let mut i = start;
        while i < end {
            let instr = &instrs[i];
            if instr.op == Opcode::Addi
                && instr.reg(0).is_some_and(|r| r.is(AsmReg::SP))
                && instr.reg(1).is_some_and(|r| r.is(AsmReg::SP))
            {
                if let Some(k) = instr.imm(2) {
                    pending += k;
                    self.merged += 1;
                    i += 1;
                    continue;
                }
            }
            if let Some(slot) = sp_offset_slot(instr) {
                let mut access = instr.clone();
                if let Some(Operand::Imm(off)) = access.operands.get_mut(slot) {
                    *off += pending;
                }
                self.out.push(access);
                i += 1;
                continue;
            }
            if instr.op.is_branch() {
                let arms = instr
                    .label_operand()
                    .and_then(|then| endif_of(then).map(|endif| (then.clone(), endif)));
                let positions = arms.and_then(|(then, endif)| {
                    Some((*self.labels.get(&then)?, *self.labels.get(&endif)?))
                });
                match positions {
                    Some((then_pos, endif_pos)) if i < then_pos && then_pos < endif_pos => {
                        if endif_pos >= end {
                            return Err(CompileError::MissingLabel {
                                label: instr.to_string(),
                                stage: "stack-pointer coalescing",
                            });
                        }
                        self.out.push(instr.clone());
                        self.range(i + 1, then_pos, pending)?;
                        self.range(then_pos, endif_pos, pending)?;
                        pending = 0;
                        i = endif_pos;
                        continue;
                    }
                    _ => self.flush(&mut pending),
                }
            } else if observes_sp(instr) {
                self.flush(&mut pending);
            }
            self.out.push(instr.clone());
            i += 1;
        }
        self.flush(&mut pending);
        Ok(())
    }
}

/// Coalesce stack-pointer adjustments. Returns the new body and the number of adjustments
/// absorbed.
pub fn coalesce_sp(instrs: &[Instr]) -> CompileResult<(Vec<Instr>, usize)> {
    let mut coalescer = Coalescer {
        instrs,
        labels: label_positions(instrs),
        out: Vec::with_capacity(instrs.len()),
        merged: 0,
    };
    coalescer.range(0, instrs.len(), 0)?;
    Ok((coalescer.out, coalescer.merged))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(instrs: &[Instr]) -> Vec<String> {
        instrs.iter().map(|i| i.to_string().trim().to_string()).collect()
    }

    #[test]
    fn test_call_sequence_collapses() {
        let sp = Reg::int("sp");
        let body = vec![
            Instr::store(sp.clone(), Reg::int("a2"), -4),
            Instr::rri(Opcode::Addi, sp.clone(), sp.clone(), -4),
            Instr::store(sp.clone(), Reg::int("ra"), -4),
            Instr::rri(Opcode::Addi, sp.clone(), sp.clone(), -4),
            Instr::new(Opcode::Call, vec![Operand::label("g")]),
            Instr::rri(Opcode::Addi, sp.clone(), sp.clone(), 4),
            Instr::load(Reg::int("ra"), sp.clone(), -4),
            Instr::rri(Opcode::Addi, sp.clone(), sp.clone(), 4),
            Instr::load(Reg::int("a2"), sp.clone(), -4),
        ];
        let (out, merged) = coalesce_sp(&body).unwrap();
        assert_eq!(merged, 4);
        assert_eq!(
            render(&out),
            vec![
                "sw        a2, -4(sp)",
                "sw        ra, -8(sp)",
                "addi      sp, sp, -8",
                "call      g",
                "lw        ra, 0(sp)",
                "lw        a2, 4(sp)",
                "addi      sp, sp, 8",
            ]
        );
    }

    #[test]
    fn test_settles_before_trailing_jumps() {
        let sp = Reg::int("sp");
        let body = vec![
            Instr::rri(Opcode::Addi, sp.clone(), sp.clone(), 8),
            Instr::load(Reg::int("x8"), sp.clone(), -4),
            Instr::jump("f"),
            Instr::jump("endif1"),
        ];
        let (out, _) = coalesce_sp(&body).unwrap();
        assert_eq!(
            render(&out),
            vec!["lw        x8, 4(sp)", "addi      sp, sp, 8", "j         f", "j         endif1"]
        );
    }

    #[test]
    fn test_arms_start_from_branch_state() {
        let sp = Reg::int("sp");
        let body = vec![
            Instr::rri(Opcode::Addi, sp.clone(), sp.clone(), -4),
            Instr::branch(Opcode::Beq, Reg::int("a1"), Reg::int("x0"), "then1"),
            Instr::load(Reg::int("a2"), sp.clone(), 0),
            Instr::jump("endif1"),
            Instr::label("then1"),
            Instr::load(Reg::int("a3"), sp.clone(), 0),
            Instr::label("endif1"),
            Instr::new(Opcode::Ret, vec![]),
        ];
        let (out, _) = coalesce_sp(&body).unwrap();
        assert_eq!(
            render(&out),
            vec![
                "beq       a1, x0, then1",
                "lw        a2, -4(sp)",
                "addi      sp, sp, -4",
                "j         endif1",
                "then1:",
                "lw        a3, -4(sp)",
                "addi      sp, sp, -4",
                "endif1:",
                "ret",
            ]
        );
    }
}
