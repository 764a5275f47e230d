// This module defines the virtual instruction model that flows through every stage after
// lowering. An Instr is an Opcode plus an ordered operand list; operands are registers
// (virtual variables before allocation, physical names after), integer and float
// immediates, labels, and the 4-bit lane mask of vector memory operations. The Opcode table
// records the mnemonic, the def/use shape the liveness analysis relies on, and whether the
// opcode is a branch or a pseudo-op that calling-convention expansion must remove. Display
// renders the final assembler text, including the `off(base)` addressing syntax of loads,
// stores and vector accesses.

//! Virtual instructions, operands and the opcode table.

use std::fmt;
use std::rc::Rc;

use super::register_file::{is_reserved, AsmReg, RegClass};

/// Name of a variable, register or label. Cheap to clone.
pub type Var = Rc<str>;

/// A register operand: a virtual variable or a physical register name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reg {
    pub name: Var,
    pub class: RegClass,
}

impl Reg {
    pub fn new(name: impl Into<Var>, class: RegClass) -> Self {
        Self {
            name: name.into(),
            class,
        }
    }

    pub fn int(name: impl Into<Var>) -> Self {
        Self::new(name, RegClass::Int)
    }

    pub fn float(name: impl Into<Var>) -> Self {
        Self::new(name, RegClass::Float)
    }

    pub fn phys(reg: AsmReg) -> Self {
        Self::new(reg.name(), reg.class())
    }

    /// Fixed-role register, invisible to liveness and allocation.
    pub fn is_reserved(&self) -> bool {
        is_reserved(&self.name)
    }

    pub fn is(&self, reg: AsmReg) -> bool {
        &*self.name == reg.name()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Reg(Reg),
    Imm(i32),
    FImm(f64),
    Label(Var),
    /// Lane mask of a vector access, bit `i` enables lane `i`.
    Mask(u8),
}

impl Operand {
    pub fn label(name: impl Into<Var>) -> Self {
        Operand::Label(name.into())
    }
}

impl From<Reg> for Operand {
    fn from(reg: Reg) -> Self {
        Operand::Reg(reg)
    }
}

impl From<i32> for Operand {
    fn from(imm: i32) -> Self {
        Operand::Imm(imm)
    }
}

/// How an opcode's register operands split into definitions and uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Defines operand 0, uses the remaining registers.
    DefFirst,
    /// Defines every register operand.
    DefAll,
    /// Uses every register operand.
    UseAll,
    /// Uses operand 0, defines the four lane registers.
    VectorLoad,
    /// `jalr rs` uses its target; `jalr rd, off(rs)` defines `rd` and uses `rs`.
    IndirectJump,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpInfo {
    pub name: &'static str,
    pub effect: Effect,
    pub is_branch: bool,
    pub is_pseudo: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Li,
    Fli,
    La,
    Mv,
    Fmv,
    FmvWX,
    Neg,
    Fneg,
    Fabs,
    Fsqrt,
    FcvtSW,
    FcvtWS,
    Addi,
    Slli,
    Srli,
    Add,
    Sub,
    Sll,
    Srl,
    Fadd,
    Fsub,
    Fmul,
    Fdiv,
    Feq,
    Fle,
    Flt,
    Fsgnj,
    Fsgnjn,
    Fsgnjx,
    Lw,
    Flw,
    Sw,
    Fsw,
    Lwi,
    Flwi,
    Swi,
    Fswi,
    Vlw,
    Vsw,
    Beq,
    Bge,
    Blt,
    Bfeq,
    Bfle,
    Bflt,
    J,
    Jalr,
    Call,
    Ret,
    Nop,
    Label,
    Comment,
    // Pseudo-ops removed by calling-convention expansion.
    Store,
    Restore,
    Param,
    FormalFv,
    UnusedParam,
    CallDir,
    CallDirRet,
    CallCls,
    CallClsRet,
    TailDir,
    TailCls,
    Return,
    ReturnUnit,
}

const fn op(name: &'static str, effect: Effect) -> OpInfo {
    OpInfo { name, effect, is_branch: false, is_pseudo: false }
}

const fn branch(name: &'static str) -> OpInfo {
    OpInfo { name, effect: Effect::UseAll, is_branch: true, is_pseudo: false }
}

const fn pseudo(name: &'static str, effect: Effect) -> OpInfo {
    OpInfo { name, effect, is_branch: false, is_pseudo: true }
}

impl Opcode {
    pub const fn info(self) -> OpInfo {
        use Effect::*;
        use Opcode::*;
        match self {
            Li => op("li", DefAll),
            Fli => op("fli", DefAll),
            La => op("la", DefAll),
            Mv => op("mv", DefFirst),
            Fmv => op("fmv", DefFirst),
            FmvWX => op("fmv.w.x", DefFirst),
            Neg => op("neg", DefFirst),
            Fneg => op("fneg", DefFirst),
            Fabs => op("fabs", DefFirst),
            Fsqrt => op("fsqrt", DefFirst),
            FcvtSW => op("fcvt.s.w", DefFirst),
            FcvtWS => op("fcvt.w.s", DefFirst),
            Addi => op("addi", DefFirst),
            Slli => op("slli", DefFirst),
            Srli => op("srli", DefFirst),
            Add => op("add", DefFirst),
            Sub => op("sub", DefFirst),
            Sll => op("sll", DefFirst),
            Srl => op("srl", DefFirst),
            Fadd => op("fadd", DefFirst),
            Fsub => op("fsub", DefFirst),
            Fmul => op("fmul", DefFirst),
            Fdiv => op("fdiv", DefFirst),
            Feq => op("feq", DefFirst),
            Fle => op("fle", DefFirst),
            Flt => op("flt", DefFirst),
            Fsgnj => op("fsgnj", DefFirst),
            Fsgnjn => op("fsgnjn", DefFirst),
            Fsgnjx => op("fsgnjx", DefFirst),
            Lw => op("lw", DefFirst),
            Flw => op("flw", DefFirst),
            Sw => op("sw", UseAll),
            Fsw => op("fsw", UseAll),
            Lwi => op("lwi", DefAll),
            Flwi => op("flwi", DefAll),
            Swi => op("swi", UseAll),
            Fswi => op("fswi", UseAll),
            Vlw => op("vlw", VectorLoad),
            Vsw => op("vsw", UseAll),
            Beq => branch("beq"),
            Bge => branch("bge"),
            Blt => branch("blt"),
            Bfeq => branch("bfeq"),
            Bfle => branch("bfle"),
            Bflt => branch("bflt"),
            J => op("j", None),
            Jalr => op("jalr", IndirectJump),
            Call => op("call", None),
            Ret => op("ret", None),
            Nop => op("nop", None),
            Label => op("<label>", None),
            Comment => op("#", None),
            Store => pseudo("store", UseAll),
            Restore => pseudo("restore", DefAll),
            Param => pseudo("* args", DefAll),
            FormalFv => pseudo("* formal_fv", DefAll),
            UnusedParam => pseudo("* not used args", UseAll),
            CallDir => pseudo("app_dir", UseAll),
            CallDirRet => pseudo("app_dir_ret", DefFirst),
            CallCls => pseudo("app_cls", UseAll),
            CallClsRet => pseudo("app_cls_ret", DefFirst),
            TailDir => pseudo("tail_dir", UseAll),
            TailCls => pseudo("tail_cls", UseAll),
            Return => pseudo("return", UseAll),
            ReturnUnit => pseudo("return_unit", None),
        }
    }

    pub fn mnemonic(self) -> &'static str {
        self.info().name
    }

    pub fn is_branch(self) -> bool {
        self.info().is_branch
    }

    /// Plain or vector load.
    pub fn is_load(self) -> bool {
        matches!(self, Opcode::Lw | Opcode::Flw | Opcode::Vlw)
    }

    /// Any call pseudo-op, tail or not.
    pub fn is_call_pseudo(self) -> bool {
        matches!(
            self,
            Opcode::CallDir
                | Opcode::CallDirRet
                | Opcode::CallCls
                | Opcode::CallClsRet
                | Opcode::TailDir
                | Opcode::TailCls
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instr {
    pub op: Opcode,
    pub operands: Vec<Operand>,
}

impl Instr {
    pub fn new(op: Opcode, operands: Vec<Operand>) -> Self {
        Self { op, operands }
    }

    pub fn label(name: impl Into<Var>) -> Self {
        Self::new(Opcode::Label, vec![Operand::label(name)])
    }

    pub fn nop() -> Self {
        Self::new(Opcode::Nop, Vec::new())
    }

    /// `op rd, rs`
    pub fn rr(op: Opcode, rd: Reg, rs: Reg) -> Self {
        Self::new(op, vec![rd.into(), rs.into()])
    }

    /// `op rd, rs1, rs2`
    pub fn rrr(op: Opcode, rd: Reg, rs1: Reg, rs2: Reg) -> Self {
        Self::new(op, vec![rd.into(), rs1.into(), rs2.into()])
    }

    /// `op rd, rs, imm`
    pub fn rri(op: Opcode, rd: Reg, rs: Reg, imm: i32) -> Self {
        Self::new(op, vec![rd.into(), rs.into(), imm.into()])
    }

    pub fn li(rd: Reg, imm: i32) -> Self {
        Self::new(Opcode::Li, vec![rd.into(), imm.into()])
    }

    pub fn la(rd: Reg, label: impl Into<Var>) -> Self {
        Self::new(Opcode::La, vec![rd.into(), Operand::label(label)])
    }

    /// `lw`/`flw rd, off(base)`, picked by the class of `rd`.
    pub fn load(rd: Reg, base: Reg, offset: i32) -> Self {
        let op = match rd.class {
            RegClass::Int => Opcode::Lw,
            RegClass::Float => Opcode::Flw,
        };
        Self::new(op, vec![rd.into(), base.into(), offset.into()])
    }

    /// `sw`/`fsw src, off(base)`, picked by the class of `src`.
    pub fn store(base: Reg, src: Reg, offset: i32) -> Self {
        let op = match src.class {
            RegClass::Int => Opcode::Sw,
            RegClass::Float => Opcode::Fsw,
        };
        Self::new(op, vec![base.into(), src.into(), offset.into()])
    }

    /// `mv`/`fmv rd, rs`, picked by the class of `rd`.
    pub fn mv(rd: Reg, rs: Reg) -> Self {
        let op = match rd.class {
            RegClass::Int => Opcode::Mv,
            RegClass::Float => Opcode::Fmv,
        };
        Self::rr(op, rd, rs)
    }

    pub fn branch(op: Opcode, rs1: Reg, rs2: Reg, target: impl Into<Var>) -> Self {
        Self::new(op, vec![rs1.into(), rs2.into(), Operand::label(target)])
    }

    pub fn jump(target: impl Into<Var>) -> Self {
        Self::new(Opcode::J, vec![Operand::label(target)])
    }

    pub fn is_label(&self) -> bool {
        self.op == Opcode::Label
    }

    pub fn reg(&self, index: usize) -> Option<&Reg> {
        match self.operands.get(index) {
            Some(Operand::Reg(r)) => Some(r),
            _ => None,
        }
    }

    pub fn imm(&self, index: usize) -> Option<i32> {
        match self.operands.get(index) {
            Some(Operand::Imm(v)) => Some(*v),
            _ => None,
        }
    }

    /// First label operand: branch/jump target, call target or the label's own name.
    pub fn label_operand(&self) -> Option<&Var> {
        self.operands.iter().find_map(|o| match o {
            Operand::Label(l) => Some(l),
            _ => None,
        })
    }

    pub fn set_label_operand(&mut self, target: Var) {
        if let Some(slot) = self
            .operands
            .iter_mut()
            .find(|o| matches!(o, Operand::Label(_)))
        {
            *slot = Operand::Label(target);
        }
    }

    pub fn regs(&self) -> impl Iterator<Item = &Reg> {
        self.operands.iter().filter_map(|o| match o {
            Operand::Reg(r) => Some(r),
            _ => None,
        })
    }

    pub fn regs_mut(&mut self) -> impl Iterator<Item = &mut Reg> {
        self.operands.iter_mut().filter_map(|o| match o {
            Operand::Reg(r) => Some(r),
            _ => None,
        })
    }
}

fn sanitize(name: &str) -> String {
    name.replace('.', "_")
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(r) => f.write_str(&sanitize(&r.name)),
            Operand::Imm(v) => write!(f, "{v}"),
            Operand::FImm(v) => write!(f, "{v:?}"),
            Operand::Label(l) => f.write_str(&sanitize(l)),
            Operand::Mask(m) => {
                for lane in 0..4 {
                    f.write_str(if m & (1 << lane) != 0 { "1" } else { "0" })?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ops = &self.operands;
        match self.op {
            Opcode::Label => {
                return match ops.first() {
                    Some(name) => write!(f, "{name}:"),
                    None => f.write_str("<label>:"),
                }
            }
            Opcode::Comment => {
                return match ops.first() {
                    Some(Operand::Label(text)) => write!(f, "# {text}"),
                    _ => f.write_str("#"),
                }
            }
            _ => {}
        }
        if ops.is_empty() {
            return write!(f, "\t{}", self.op.mnemonic());
        }
        write!(f, "\t{:<10}", self.op.mnemonic())?;
        match (self.op, ops.len()) {
            (Opcode::Sw | Opcode::Fsw, 3) => write!(f, "{}, {}({})", ops[1], ops[2], ops[0]),
            (Opcode::Lw | Opcode::Flw, 3) | (Opcode::Jalr, 3) => {
                write!(f, "{}, {}({})", ops[0], ops[2], ops[1])
            }
            (Opcode::Vlw | Opcode::Vsw, 7) => write!(
                f,
                "{}, {}, {}, {}, {}({}), {}",
                ops[1], ops[2], ops[3], ops[4], ops[5], ops[0], ops[6]
            ),
            _ => {
                for (i, operand) in ops.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{operand}")?;
                }
                Ok(())
            }
        }
    }
}
