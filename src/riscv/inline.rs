//! Inlining of builtin intrinsics.
//!
//! Value-returning direct calls to a handful of one- or two-instruction builtins are
//! replaced by the instructions themselves. The comparisons against zero stage `0.0` in the
//! float scratch register.

use crate::core::instr::{Instr, Opcode, Operand, Reg};
use crate::core::register_file::{AsmReg, RegClass};

/// Single-instruction replacement for a call `dest = callee(args)`.
fn expand_intrinsic(callee: &str, dest: &Reg, args: &[Reg]) -> Option<Vec<Instr>> {
    let float_arg = |i: usize| args.get(i).filter(|r| r.class == RegClass::Float).cloned();
    let int_arg = |i: usize| args.get(i).filter(|r| r.class == RegClass::Int).cloned();
    let zero = || {
        Instr::rr(
            Opcode::FmvWX,
            Reg::phys(AsmReg::FSCRATCH),
            Reg::phys(AsmReg::ZERO),
        )
    };
    let f4 = Reg::phys(AsmReg::FSCRATCH);
    let d = dest.clone();

    let instrs = match (callee, args.len(), dest.class) {
        ("min_caml_float_of_int", 1, RegClass::Float) => {
            vec![Instr::rr(Opcode::FcvtSW, d, int_arg(0)?)]
        }
        ("min_caml_fneg", 1, RegClass::Float) => vec![Instr::rr(Opcode::Fneg, d, float_arg(0)?)],
        ("min_caml_fsqr", 1, RegClass::Float) => {
            let x = float_arg(0)?;
            vec![Instr::rrr(Opcode::Fmul, d, x.clone(), x)]
        }
        ("min_caml_fabs", 1, RegClass::Float) => vec![Instr::rr(Opcode::Fabs, d, float_arg(0)?)],
        ("min_caml_sqrt", 1, RegClass::Float) => vec![Instr::rr(Opcode::Fsqrt, d, float_arg(0)?)],
        ("min_caml_int_of_float", 1, RegClass::Int) => {
            vec![Instr::rr(Opcode::FcvtWS, d, float_arg(0)?)]
        }
        // The runtime body compares its second argument against its first.
        ("min_caml_fless", 2, RegClass::Int) => {
            vec![Instr::rrr(Opcode::Flt, d, float_arg(1)?, float_arg(0)?)]
        }
        ("min_caml_fisneg", 1, RegClass::Int) => {
            vec![zero(), Instr::rrr(Opcode::Flt, d, float_arg(0)?, f4)]
        }
        ("min_caml_fispos", 1, RegClass::Int) => {
            vec![zero(), Instr::rrr(Opcode::Flt, d, f4, float_arg(0)?)]
        }
        ("min_caml_fiszero", 1, RegClass::Int) => {
            vec![zero(), Instr::rrr(Opcode::Feq, d, f4, float_arg(0)?)]
        }
        _ => return None,
    };
    Some(instrs)
}

/// Replace intrinsic call sites. Returns the body and the callees inlined, one entry per
/// site.
pub fn inline_intrinsics(instrs: Vec<Instr>) -> (Vec<Instr>, Vec<String>) {
    let mut inlined = Vec::new();
    let mut out = Vec::with_capacity(instrs.len());
    for instr in instrs {
        if instr.op == Opcode::CallDirRet {
            if let (Some(dest), Some(Operand::Label(callee))) =
                (instr.reg(0), instr.operands.get(1))
            {
                let args: Vec<Reg> = instr.regs().skip(1).cloned().collect();
                if let Some(body) = expand_intrinsic(callee, dest, &args) {
                    log::trace!("inlined {callee}");
                    inlined.push(callee.to_string());
                    out.extend(body);
                    continue;
                }
            }
        }
        out.push(instr);
    }
    (out, inlined)
}
