// This module describes the calling convention of the target and the stack frame of one
// body. Arguments are assigned per class in reverse position: the last integer argument
// travels in a1 and the last float argument in fa0, with up to seven integer and eight float
// arguments. Results come back in a1 or fa0. A function saves the callee-saved registers its
// body touches below the incoming stack pointer and drops the stack pointer past them;
// spill slots live below that, one word per spilled variable, at a position fixed by the
// order in which the body first mentions the slot. The virtual stack records which slots
// hold a value on the current path; at a join only slots filled on both arms stay readable.

//! Calling convention, stack frame and spill-slot bookkeeping.

use bumpalo::{collections::Vec as BumpVec, Bump};
use hashbrown::{HashMap, HashSet};

use crate::core::error::{CompileError, CompileResult};
use crate::core::instr::{Instr, Opcode, Operand, Reg, Var};
use crate::core::register_file::{
    argument_count, callee_saved, caller_saved, AsmReg, RegBitSet, RegClass, WORD_SIZE,
};

/// Register sets of a calling convention.
#[derive(Debug, Clone)]
pub struct CCInfo {
    /// Registers a callee may overwrite without restoring.
    pub caller_saved_regs: RegBitSet,
    /// Registers a callee must preserve.
    pub callee_saved_regs: RegBitSet,
    /// Registers used for argument passing.
    pub arg_regs: RegBitSet,
}

/// Argument and result placement.
pub trait CCAssigner {
    fn get_ccinfo(&self) -> &CCInfo;

    /// Register of each argument of a call to `callee`, in argument order.
    fn assign_args(&self, callee: &str, args: &[Reg]) -> CompileResult<Vec<AsmReg>>;

    /// Register a result of `class` is returned in.
    fn assign_ret(&self, class: RegClass) -> AsmReg;
}

/// The convention of this target.
#[derive(Debug, Clone)]
pub struct RvAssigner {
    cc_info: CCInfo,
}

impl Default for RvAssigner {
    fn default() -> Self {
        let arg_regs = RegBitSet::from_regs(
            [RegClass::Int, RegClass::Float]
                .into_iter()
                .flat_map(|c| (0..argument_count(c)).filter_map(move |i| AsmReg::argument(c, i))),
        );
        Self {
            cc_info: CCInfo {
                caller_saved_regs: caller_saved(),
                callee_saved_regs: callee_saved(),
                arg_regs,
            },
        }
    }
}

impl RvAssigner {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CCAssigner for RvAssigner {
    fn get_ccinfo(&self) -> &CCInfo {
        &self.cc_info
    }

    fn assign_args(&self, callee: &str, args: &[Reg]) -> CompileResult<Vec<AsmReg>> {
        let mut out = Vec::with_capacity(args.len());
        for class in [RegClass::Int, RegClass::Float] {
            let n = args.iter().filter(|a| a.class == class).count();
            if n > argument_count(class) {
                return Err(CompileError::TooManyArguments {
                    callee: callee.to_string(),
                    class: class.name(),
                    count: n,
                    max: argument_count(class),
                });
            }
        }
        let mut seen = [0usize; 2];
        let totals = [RegClass::Int, RegClass::Float]
            .map(|c| args.iter().filter(|a| a.class == c).count());
        for arg in args {
            let bank = arg.class.bank() as usize;
            let index = totals[bank] - 1 - seen[bank];
            seen[bank] += 1;
            // Counts were checked above.
            if let Some(reg) = AsmReg::argument(arg.class, index) {
                out.push(reg);
            }
        }
        Ok(out)
    }

    fn assign_ret(&self, class: RegClass) -> AsmReg {
        match class {
            RegClass::Int => AsmReg::INT_RET,
            RegClass::Float => AsmReg::FLOAT_RET,
        }
    }
}

/// Callee-saved registers of one function and the code that preserves them.
#[derive(Debug)]
pub struct FunctionFrame<'a> {
    /// Saved registers, integers first; the `i`-th lives at `-(i+1)` words from entry `sp`.
    pub saved_registers: BumpVec<'a, AsmReg>,
}

impl<'a> FunctionFrame<'a> {
    pub fn new(arena: &'a Bump) -> Self {
        Self {
            saved_registers: BumpVec::new_in(arena),
        }
    }

    /// Frame saving every callee-saved register in `touched`.
    pub fn for_body(arena: &'a Bump, cc: &CCInfo, touched: &RegBitSet) -> Self {
        let mut frame = Self::new(arena);
        let mut saved = cc.callee_saved_regs;
        saved.intersect(touched);
        for reg in saved.iter() {
            frame.add_saved_register(reg);
        }
        frame
    }

    pub fn add_saved_register(&mut self, reg: AsmReg) {
        if !self.saved_registers.contains(&reg) {
            self.saved_registers.push(reg);
        }
    }

    /// Bytes below the entry stack pointer taken by saved registers.
    pub fn frame_size(&self) -> i32 {
        self.saved_registers.len() as i32 * WORD_SIZE
    }

    fn slot(index: usize) -> i32 {
        -(index as i32 + 1) * WORD_SIZE
    }

    /// Stores of the saved registers followed by one stack-pointer drop.
    pub fn prologue(&self) -> Vec<Instr> {
        let sp = Reg::phys(AsmReg::SP);
        let mut out: Vec<Instr> = self
            .saved_registers
            .iter()
            .enumerate()
            .map(|(i, &reg)| Instr::store(sp.clone(), Reg::phys(reg), Self::slot(i)))
            .collect();
        if self.frame_size() != 0 {
            out.push(Instr::rri(Opcode::Addi, sp.clone(), sp, -self.frame_size()));
        }
        out
    }

    /// Mirror image of the prologue, emitted before every return.
    pub fn epilogue(&self) -> Vec<Instr> {
        let sp = Reg::phys(AsmReg::SP);
        let mut out = Vec::with_capacity(self.saved_registers.len() + 1);
        if self.frame_size() != 0 {
            out.push(Instr::rri(Opcode::Addi, sp.clone(), sp.clone(), self.frame_size()));
        }
        for (i, &reg) in self.saved_registers.iter().enumerate().rev() {
            out.push(Instr::load(Reg::phys(reg), sp.clone(), Self::slot(i)));
        }
        out
    }
}

/// Slot position of every spilled variable of a body.
#[derive(Debug, Clone, Default)]
pub struct SpillLayout {
    slots: HashMap<Var, usize>,
}

impl SpillLayout {
    /// Positions in order of first mention by a `store` or `restore`.
    pub fn scan(instrs: &[Instr]) -> Self {
        let mut layout = Self::default();
        for instr in instrs {
            if let (Opcode::Store | Opcode::Restore, Some(Operand::Label(slot))) =
                (instr.op, instr.operands.get(1))
            {
                let next = layout.slots.len();
                layout.slots.entry(slot.clone()).or_insert(next);
            }
        }
        layout
    }

    pub fn position(&self, slot: &str) -> Option<usize> {
        self.slots.get(slot).copied()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Offset of a slot from the stack pointer of the body.
    pub fn offset(position: usize) -> i32 {
        -(position as i32 + 1) * WORD_SIZE
    }
}

/// Slots holding a value on the current path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VirtualStack {
    filled: HashSet<usize>,
}

impl VirtualStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&mut self, position: usize) {
        self.filled.insert(position);
    }

    pub fn is_filled(&self, position: usize) -> bool {
        self.filled.contains(&position)
    }

    /// State after a join: only slots filled on both paths.
    pub fn meet(&self, other: &VirtualStack) -> VirtualStack {
        VirtualStack {
            filled: self.filled.intersection(&other.filled).copied().collect(),
        }
    }

    /// Words a call must step over to keep every readable slot intact.
    pub fn height(&self) -> i32 {
        self.filled.iter().max().map_or(0, |&p| p as i32 + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(instrs: &[Instr]) -> Vec<String> {
        instrs.iter().map(|i| i.to_string().trim().to_string()).collect()
    }

    #[test]
    fn test_reverse_positional_assignment() {
        let cc = RvAssigner::new();
        let args = vec![
            Reg::int("x"),
            Reg::int("y"),
            Reg::int("z"),
            Reg::float("p"),
            Reg::float("q"),
        ];
        let regs: Vec<&str> = cc
            .assign_args("f", &args)
            .unwrap()
            .iter()
            .map(|r| r.name())
            .collect();
        assert_eq!(regs, vec!["a3", "a2", "a1", "fa1", "fa0"]);
        assert_eq!(cc.assign_ret(RegClass::Float), AsmReg::FLOAT_RET);
        assert!(cc.get_ccinfo().arg_regs.contains(AsmReg::INT_RET));
    }

    #[test]
    fn test_too_many_arguments() {
        let cc = RvAssigner::new();
        let args: Vec<Reg> = (0..8).map(|i| Reg::int(format!("v{i}"))).collect();
        assert!(matches!(
            cc.assign_args("g", &args),
            Err(CompileError::TooManyArguments { count: 8, .. })
        ));
    }

    #[test]
    fn test_frame_saves_touched_callee_saved() {
        let arena = Bump::new();
        let cc = RvAssigner::new();
        let touched = RegBitSet::from_regs(
            ["a1", "x8", "x18", "f9"].iter().filter_map(|n| AsmReg::from_name(n)),
        );
        let frame = FunctionFrame::for_body(&arena, cc.get_ccinfo(), &touched);
        assert_eq!(frame.frame_size(), 12);
        assert_eq!(
            render(&frame.prologue()),
            vec![
                "sw        x8, -4(sp)",
                "sw        x18, -8(sp)",
                "fsw       f9, -12(sp)",
                "addi      sp, sp, -12",
            ]
        );
        assert_eq!(
            render(&frame.epilogue()),
            vec![
                "addi      sp, sp, 12",
                "flw       f9, -12(sp)",
                "lw        x18, -8(sp)",
                "lw        x8, -4(sp)",
            ]
        );
    }

    #[test]
    fn test_empty_frame_emits_nothing() {
        let arena = Bump::new();
        let frame = FunctionFrame::new(&arena);
        assert!(frame.prologue().is_empty());
        assert!(frame.epilogue().is_empty());
    }

    #[test]
    fn test_spill_layout_and_meet() {
        let instrs = vec![
            Instr::new(Opcode::Store, vec![Reg::int("a1").into(), Operand::label("v")]),
            Instr::new(Opcode::Store, vec![Reg::float("fa0").into(), Operand::label("w")]),
            Instr::new(Opcode::Restore, vec![Reg::int("a2").into(), Operand::label("v")]),
        ];
        let layout = SpillLayout::scan(&instrs);
        assert_eq!(layout.len(), 2);
        assert_eq!(layout.position("w"), Some(1));
        assert_eq!(SpillLayout::offset(1), -8);

        let mut left = VirtualStack::new();
        left.store(0);
        left.store(1);
        let mut right = VirtualStack::new();
        right.store(1);
        let joined = left.meet(&right);
        assert!(!joined.is_filled(0));
        assert!(joined.is_filled(1));
        assert_eq!(joined.height(), 2);
        assert_eq!(VirtualStack::new().height(), 0);
    }
}
