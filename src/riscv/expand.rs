// This module replaces the pseudo-ops left by allocation with real instruction sequences.
// Spill stores and restores become stack accesses at the slot of the spilled variable, and
// a restore is only legal when every path reaching it filled the slot: both arms of a
// conditional are expanded from the state before the branch and their results meet at the
// endif label. Calls save the caller-saved registers that are live across them and that the
// callee may clobber, stepping the stack pointer over every readable spill slot first, then
// shuffle arguments into their registers through the stack so no source is overwritten
// before it is read. The return address is pushed around the transfer; results are relayed
// through the scratch registers because the caller-save reload may reuse the result
// register. Tail calls shuffle, run the epilogue and jump. Functions get their prologue
// right after the entry label and the epilogue before every return.

//! Calling-convention expansion.

use hashbrown::{HashMap, HashSet};

use crate::core::error::{CompileError, CompileResult};
use crate::core::instr::{Instr, Opcode, Operand, Reg, Var};
use crate::core::register_file::{caller_saved, AsmReg, RegBitSet, RegClass, WORD_SIZE};
use crate::lower::endif_of;
use crate::regalloc::liveness::{analyze, label_positions, LiveSet};
use crate::riscv::frame::{CCAssigner, FunctionFrame, SpillLayout, VirtualStack};
use crate::riscv::runtime::BuiltinTable;

/// Registers each known callee may overwrite.
#[derive(Debug, Clone, Default)]
pub struct ClobberTable {
    known: HashMap<Var, RegBitSet>,
    /// Compiled functions that call out and so have no exact set.
    opaque: HashSet<Var>,
}

impl ClobberTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table seeded with the runtime builtins.
    pub fn from_runtime(runtime: &BuiltinTable) -> Self {
        let mut table = Self::new();
        for builtin in runtime.iter() {
            table.known.insert(Var::from(builtin.name), builtin.clobbers());
        }
        table
    }

    /// Record the clobber set of a compiled function. Only leaf bodies get an exact set;
    /// anything that calls out is treated as clobbering every caller-saved register.
    pub fn publish(&mut self, name: &str, instrs: &[Instr]) -> bool {
        let calls_out = instrs.iter().any(|i| {
            i.op.is_call_pseudo() || matches!(i.op, Opcode::Call | Opcode::Jalr)
        });
        if calls_out {
            self.known.remove(name);
            self.opaque.insert(Var::from(name));
            return false;
        }
        self.opaque.remove(name);
        let mut set = RegBitSet::new();
        for instr in instrs {
            for reg in instr.regs() {
                if reg.is_reserved() {
                    continue;
                }
                if let Some(r) = AsmReg::from_name(&reg.name) {
                    set.set(r);
                }
            }
            if instr.op == Opcode::Return {
                if let Some(v) = instr.reg(0) {
                    set.set(match v.class {
                        RegClass::Int => AsmReg::INT_RET,
                        RegClass::Float => AsmReg::FLOAT_RET,
                    });
                }
            }
        }
        self.known.insert(Var::from(name), set);
        true
    }

    pub fn get(&self, name: &str) -> Option<&RegBitSet> {
        self.known.get(name)
    }

    /// Caller-saved registers a call to `callee` may destroy.
    pub fn clobbers(&self, callee: &str) -> RegBitSet {
        let mut set = caller_saved();
        match self.known.get(callee) {
            Some(known) => set.intersect(known),
            None if self.opaque.contains(callee) => {}
            None => log::warn!("no clobber information for `{callee}`, saving all live registers"),
        }
        set
    }
}

fn sp() -> Reg {
    Reg::phys(AsmReg::SP)
}

fn addi_sp(delta: i32) -> Instr {
    Instr::rri(Opcode::Addi, sp(), sp(), delta)
}

fn live_phys(live: &LiveSet) -> RegBitSet {
    RegBitSet::from_regs(live.regs().iter().filter_map(|r| AsmReg::from_name(&r.name)))
}

/// Parts of a call pseudo-op.
struct CallSite<'i> {
    dest: Option<&'i Reg>,
    /// Direct target, or the register holding the closure.
    target: CallTarget<'i>,
    args: Vec<Reg>,
}

enum CallTarget<'i> {
    Direct(&'i Var),
    Closure(&'i Reg),
}

impl<'i> CallSite<'i> {
    fn parse(instr: &'i Instr) -> CompileResult<Self> {
        let malformed = || CompileError::MalformedInstruction {
            instr: instr.to_string(),
            stage: "calling-convention expansion",
        };
        let (dest, rest) = match instr.op {
            Opcode::CallDirRet | Opcode::CallClsRet => {
                (Some(instr.reg(0).ok_or_else(malformed)?), &instr.operands[1..])
            }
            _ => (None, &instr.operands[..]),
        };
        let (target, args) = match rest.split_first() {
            Some((Operand::Label(l), args)) => (CallTarget::Direct(l), args),
            Some((Operand::Reg(r), args)) => (CallTarget::Closure(r), args),
            _ => return Err(malformed()),
        };
        let args = args
            .iter()
            .map(|o| match o {
                Operand::Reg(r) => Ok(r.clone()),
                _ => Err(malformed()),
            })
            .collect::<CompileResult<Vec<_>>>()?;
        Ok(Self { dest, target, args })
    }

    fn callee_name(&self) -> &str {
        match &self.target {
            CallTarget::Direct(l) => l,
            CallTarget::Closure(r) => &r.name,
        }
    }
}

/// Expansion state of one body.
pub struct Expander<'e, 'a> {
    instrs: &'e [Instr],
    live_out: &'e [LiveSet],
    labels: HashMap<Var, usize>,
    layout: SpillLayout,
    frame: Option<&'e FunctionFrame<'a>>,
    cc: &'e dyn CCAssigner,
    clobbers: &'e ClobberTable,
    out: Vec<Instr>,
}

impl<'e, 'a> Expander<'e, 'a> {
    pub fn new(
        instrs: &'e [Instr],
        live_out: &'e [LiveSet],
        frame: Option<&'e FunctionFrame<'a>>,
        cc: &'e dyn CCAssigner,
        clobbers: &'e ClobberTable,
    ) -> Self {
        Self {
            instrs,
            live_out,
            labels: label_positions(instrs),
            layout: SpillLayout::scan(instrs),
            frame,
            cc,
            clobbers,
            out: Vec::with_capacity(instrs.len() * 2),
        }
    }

    /// Expand the whole body from `stack`, returning the code and the final slot state.
    pub fn run(mut self, stack: VirtualStack) -> CompileResult<(Vec<Instr>, VirtualStack)> {
        let mut start = 0;
        if let Some(frame) = self.frame {
            if let Some(entry) = self.instrs.first().filter(|i| i.is_label()) {
                self.out.push(entry.clone());
                start = 1;
            }
            self.out.extend(frame.prologue());
        }
        let stack = self.expand_range(start, self.instrs.len(), stack)?;
        Ok((self.out, stack))
    }

    fn slot(&self, instr: &Instr) -> CompileResult<(Reg, usize)> {
        match (instr.reg(0), instr.operands.get(1)) {
            (Some(reg), Some(Operand::Label(slot))) => {
                let pos = self.layout.position(slot).ok_or_else(|| {
                    CompileError::SpillSlotUnavailable { var: slot.to_string() }
                })?;
                Ok((reg.clone(), pos))
            }
            _ => Err(CompileError::MalformedInstruction {
                instr: instr.to_string(),
                stage: "calling-convention expansion",
            }),
        }
    }

    fn expand_range(
        &mut self,
        start: usize,
        end: usize,
        mut stack: VirtualStack,
    ) -> CompileResult<VirtualStack> {
        let instrs = self.instrs;
        let mut i = start;
        while i < end {
            let instr = &instrs[i];
            match instr.op {
                Opcode::Store => {
                    let (reg, pos) = self.slot(instr)?;
                    self.out.push(Instr::store(sp(), reg, SpillLayout::offset(pos)));
                    stack.store(pos);
                }
                Opcode::Restore => {
                    let (reg, pos) = self.slot(instr)?;
                    if !stack.is_filled(pos) {
                        let var = instr.operands.get(1).map(|o| o.to_string()).unwrap_or_default();
                        return Err(CompileError::SpillSlotUnavailable { var });
                    }
                    self.out.push(Instr::load(reg, sp(), SpillLayout::offset(pos)));
                }
                Opcode::Param | Opcode::UnusedParam => {}
                Opcode::FormalFv => match (instr.reg(0), instr.imm(1)) {
                    (Some(reg), Some(offset)) => self.out.push(Instr::load(
                        reg.clone(),
                        Reg::phys(AsmReg::CLOSURE),
                        offset,
                    )),
                    _ => {
                        return Err(CompileError::MalformedInstruction {
                            instr: instr.to_string(),
                            stage: "calling-convention expansion",
                        })
                    }
                },
                Opcode::Return => {
                    if let Some(v) = instr.reg(0) {
                        let ret = self.cc.assign_ret(v.class);
                        self.out.push(Instr::mv(Reg::phys(ret), v.clone()));
                    }
                    self.emit_return();
                }
                Opcode::ReturnUnit => self.emit_return(),
                Opcode::CallDir | Opcode::CallDirRet | Opcode::CallCls | Opcode::CallClsRet => {
                    self.emit_call(i, &stack)?;
                }
                Opcode::TailDir | Opcode::TailCls => self.emit_tail_call(i)?,
                op if op.is_branch() => {
                    let arms = instr
                        .label_operand()
                        .and_then(|l| endif_of(l).map(|endif| (l.clone(), endif)));
                    if let Some((then_label, endif_label)) = arms {
                        let missing = |label: &Var| CompileError::MissingLabel {
                            label: label.to_string(),
                            stage: "calling-convention expansion",
                        };
                        let then_pos =
                            *self.labels.get(&then_label).ok_or_else(|| missing(&then_label))?;
                        let endif_pos =
                            *self.labels.get(&endif_label).ok_or_else(|| missing(&endif_label))?;
                        if !(i < then_pos && then_pos < endif_pos && endif_pos < end) {
                            return Err(missing(&endif_label));
                        }
                        self.out.push(instr.clone());
                        let fallthrough = self.expand_range(i + 1, then_pos, stack.clone())?;
                        let taken = self.expand_range(then_pos, endif_pos, stack.clone())?;
                        stack = fallthrough.meet(&taken);
                        i = endif_pos;
                        continue;
                    }
                    self.out.push(instr.clone());
                }
                _ => self.out.push(instr.clone()),
            }
            i += 1;
        }
        Ok(stack)
    }

    fn emit_return(&mut self) {
        if let Some(frame) = self.frame {
            self.out.extend(frame.epilogue());
        }
        self.out.push(Instr::new(Opcode::Ret, Vec::new()));
    }

    /// Move every argument into its register through stack temporaries below `sp`.
    fn shuffle_args(&mut self, site: &CallSite<'_>, targets: &[AsmReg]) {
        let moves: Vec<(Reg, AsmReg)> = site
            .args
            .iter()
            .cloned()
            .zip(targets.iter().copied())
            .rev()
            .filter(|(arg, target)| !arg.is(*target))
            .collect();
        for (k, (arg, _)) in moves.iter().enumerate() {
            self.out.push(Instr::store(sp(), arg.clone(), -(k as i32 + 1) * WORD_SIZE));
        }
        for (k, (_, target)) in moves.iter().enumerate() {
            self.out.push(Instr::load(Reg::phys(*target), sp(), -(k as i32 + 1) * WORD_SIZE));
        }
    }

    fn load_closure(&mut self, cls: &Reg) {
        self.out.push(Instr::load(Reg::phys(AsmReg::SCRATCH), cls.clone(), 0));
        self.out.push(Instr::mv(Reg::phys(AsmReg::CLOSURE), cls.clone()));
    }

    fn emit_call(&mut self, index: usize, stack: &VirtualStack) -> CompileResult<()> {
        let instrs = self.instrs;
        let site = CallSite::parse(&instrs[index])?;
        let height = stack.height() * WORD_SIZE;
        if height != 0 {
            self.out.push(addi_sp(-height));
        }

        let targets = self.cc.assign_args(site.callee_name(), &site.args)?;
        let mut saved = match site.target {
            CallTarget::Direct(label) => self.clobbers.clobbers(label),
            CallTarget::Closure(_) => caller_saved(),
        };
        // Argument setup writes its target registers even when the callee leaves them alone.
        saved.union(&RegBitSet::from_regs(targets.iter().copied()));
        saved.intersect(&live_phys(&self.live_out[index]));
        if let Some(dest) = site.dest.and_then(|d| AsmReg::from_name(&d.name)) {
            saved.clear(dest);
        }
        let saved: Vec<AsmReg> = saved.iter().collect();
        let save_size = saved.len() as i32 * WORD_SIZE;
        for (k, reg) in saved.iter().enumerate() {
            self.out.push(Instr::store(sp(), Reg::phys(*reg), -(k as i32 + 1) * WORD_SIZE));
        }
        if save_size != 0 {
            self.out.push(addi_sp(-save_size));
        }

        if let CallTarget::Closure(cls) = site.target {
            self.load_closure(cls);
        }
        self.shuffle_args(&site, &targets);

        let ra = Reg::phys(AsmReg::RA);
        self.out.push(Instr::store(sp(), ra.clone(), -WORD_SIZE));
        self.out.push(addi_sp(-WORD_SIZE));
        match site.target {
            CallTarget::Direct(label) => self
                .out
                .push(Instr::new(Opcode::Call, vec![Operand::Label(label.clone())])),
            CallTarget::Closure(_) => self
                .out
                .push(Instr::new(Opcode::Jalr, vec![Reg::phys(AsmReg::SCRATCH).into()])),
        }
        self.out.push(addi_sp(WORD_SIZE));
        self.out.push(Instr::load(ra, sp(), -WORD_SIZE));

        let relay = site.dest.map(|d| match d.class {
            RegClass::Int => (Reg::phys(AsmReg::SCRATCH), AsmReg::INT_RET),
            RegClass::Float => (Reg::phys(AsmReg::FSCRATCH), AsmReg::FLOAT_RET),
        });
        if let Some((scratch, ret)) = &relay {
            self.out.push(Instr::mv(scratch.clone(), Reg::phys(*ret)));
        }

        if save_size != 0 {
            self.out.push(addi_sp(save_size));
        }
        for (k, reg) in saved.iter().enumerate().rev() {
            self.out.push(Instr::load(Reg::phys(*reg), sp(), -(k as i32 + 1) * WORD_SIZE));
        }
        if height != 0 {
            self.out.push(addi_sp(height));
        }
        if let (Some(dest), Some((scratch, _))) = (site.dest, relay) {
            self.out.push(Instr::mv(dest.clone(), scratch));
        }
        Ok(())
    }

    fn emit_tail_call(&mut self, index: usize) -> CompileResult<()> {
        let instrs = self.instrs;
        let site = CallSite::parse(&instrs[index])?;
        let targets = self.cc.assign_args(site.callee_name(), &site.args)?;
        if let CallTarget::Closure(cls) = site.target {
            self.load_closure(cls);
        }
        self.shuffle_args(&site, &targets);
        if let Some(frame) = self.frame {
            self.out.extend(frame.epilogue());
        }
        match site.target {
            CallTarget::Direct(label) => self.out.push(Instr::jump(label.clone())),
            CallTarget::Closure(_) => self.out.push(Instr::new(
                Opcode::Jalr,
                vec![
                    Reg::phys(AsmReg::ZERO).into(),
                    Reg::phys(AsmReg::SCRATCH).into(),
                    0.into(),
                ],
            )),
        }
        Ok(())
    }
}

/// Expand `instrs` with liveness solved here. Functions pass their frame; the top-level
/// body passes `None`.
pub fn expand(
    instrs: &[Instr],
    stack: VirtualStack,
    frame: Option<&FunctionFrame<'_>>,
    cc: &dyn CCAssigner,
    clobbers: &ClobberTable,
) -> CompileResult<(Vec<Instr>, VirtualStack)> {
    let liveness = analyze(instrs)?;
    let (out, stack) = Expander::new(instrs, &liveness.live_out, frame, cc, clobbers).run(stack)?;
    log::debug!("expanded {} instructions into {}", instrs.len(), out.len());
    Ok((out, stack))
}

/// Callee-saved registers a body writes or reads, as physical registers.
pub fn touched_registers(instrs: &[Instr]) -> CompileResult<RegBitSet> {
    let touched = analyze(instrs)?.touched();
    Ok(live_phys(&touched))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::riscv::frame::RvAssigner;
    use bumpalo::Bump;

    fn render(instrs: &[Instr]) -> Vec<String> {
        instrs.iter().map(|i| i.to_string().trim().to_string()).collect()
    }

    fn run(instrs: &[Instr], clobbers: &ClobberTable) -> CompileResult<Vec<String>> {
        let cc = RvAssigner::new();
        expand(instrs, VirtualStack::new(), None, &cc, clobbers).map(|(out, _)| render(&out))
    }

    fn store(reg: Reg, slot: &str) -> Instr {
        Instr::new(Opcode::Store, vec![reg.into(), Operand::label(slot)])
    }

    fn restore(reg: Reg, slot: &str) -> Instr {
        Instr::new(Opcode::Restore, vec![reg.into(), Operand::label(slot)])
    }

    #[test]
    fn test_expanded_code_is_fixed_point() {
        let clobbers = ClobberTable::new();
        let body = vec![
            Instr::label("main"),
            Instr::li(Reg::int("x8"), 5),
            store(Reg::int("x8"), "v"),
            Instr::new(
                Opcode::CallDirRet,
                vec![Reg::int("a1").into(), Operand::label("g"), Reg::int("x8").into()],
            ),
            restore(Reg::int("a2"), "v"),
            Instr::rrr(Opcode::Add, Reg::int("a1"), Reg::int("a1"), Reg::int("a2")),
        ];
        let cc = RvAssigner::new();
        let (once, _) = expand(&body, VirtualStack::new(), None, &cc, &clobbers).unwrap();
        let (twice, _) = expand(&once, VirtualStack::new(), None, &cc, &clobbers).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_callee_prologue_and_return() {
        let arena = Bump::new();
        let cc = RvAssigner::new();
        let body = vec![
            Instr::label("f"),
            Instr::new(Opcode::Param, vec![Reg::int("a1").into()]),
            Instr::new(Opcode::FormalFv, vec![Reg::int("x8").into(), 4.into()]),
            Instr::rrr(Opcode::Add, Reg::int("a1"), Reg::int("a1"), Reg::int("x8")),
            Instr::new(Opcode::Return, vec![Reg::int("a1").into()]),
        ];
        let touched = touched_registers(&body).unwrap();
        let frame = FunctionFrame::for_body(&arena, cc.get_ccinfo(), &touched);
        let (out, _) =
            expand(&body, VirtualStack::new(), Some(&frame), &cc, &ClobberTable::new()).unwrap();
        assert_eq!(
            render(&out),
            vec![
                "f:",
                "sw        x8, -4(sp)",
                "addi      sp, sp, -4",
                "lw        x8, 4(a0)",
                "add       a1, a1, x8",
                "mv        a1, a1",
                "addi      sp, sp, 4",
                "lw        x8, -4(sp)",
                "ret",
            ]
        );
    }

    #[test]
    fn test_call_saves_live_clobbered_registers() {
        let mut clobbers = ClobberTable::new();
        clobbers.publish(
            "g",
            &[
                Instr::label("g"),
                Instr::rri(Opcode::Addi, Reg::int("a1"), Reg::int("a1"), 1),
                Instr::rri(Opcode::Addi, Reg::int("x5"), Reg::int("a1"), 1),
                Instr::new(Opcode::Return, vec![Reg::int("a1").into()]),
            ],
        );
        let body = vec![
            Instr::li(Reg::int("x5"), 1),
            Instr::li(Reg::int("x6"), 2),
            Instr::li(Reg::int("a2"), 3),
            Instr::new(
                Opcode::CallDirRet,
                vec![Reg::int("a3").into(), Operand::label("g"), Reg::int("a2").into()],
            ),
            Instr::rrr(Opcode::Add, Reg::int("a1"), Reg::int("a3"), Reg::int("x5")),
            Instr::rrr(Opcode::Add, Reg::int("a1"), Reg::int("a1"), Reg::int("x6")),
        ];
        let out = run(&body, &clobbers).unwrap();
        assert_eq!(
            &out[3..],
            &[
                "sw        x5, -4(sp)",
                "addi      sp, sp, -4",
                "sw        a2, -4(sp)",
                "lw        a1, -4(sp)",
                "sw        ra, -4(sp)",
                "addi      sp, sp, -4",
                "call      g",
                "addi      sp, sp, 4",
                "lw        ra, -4(sp)",
                "mv        x4, a1",
                "addi      sp, sp, 4",
                "lw        x5, -4(sp)",
                "mv        a3, x4",
                "add       a1, a3, x5",
                "add       a1, a1, x6",
            ]
        );
    }

    #[test]
    fn test_live_argument_register_survives_builtin_call() {
        // fsgnj only lists fa0, but argument setup overwrites fa1 as well.
        let clobbers = ClobberTable::from_runtime(&BuiltinTable::standard());
        let body = vec![
            Instr::new(
                Opcode::CallDirRet,
                vec![
                    Reg::float("fa2").into(),
                    Operand::label("min_caml_fsgnj"),
                    Reg::float("fa3").into(),
                    Reg::float("fa4").into(),
                ],
            ),
            Instr::rrr(Opcode::Fadd, Reg::float("fa0"), Reg::float("fa1"), Reg::float("fa2")),
        ];
        let out = run(&body, &clobbers).unwrap();
        let save = out.iter().position(|l| l == "fsw       fa1, -4(sp)").unwrap();
        let call = out.iter().position(|l| l == "call      min_caml_fsgnj").unwrap();
        let reload = out.iter().rposition(|l| l == "flw       fa1, -4(sp)").unwrap();
        assert!(save < call && call < reload);
        assert!(!out.iter().any(|l| l.starts_with("fsw       fa2")));
    }

    #[test]
    fn test_closure_tail_call() {
        let out = run(
            &[Instr::new(
                Opcode::TailCls,
                vec![Reg::int("x5").into(), Reg::float("fa1").into()],
            )],
            &ClobberTable::new(),
        )
        .unwrap();
        assert_eq!(
            out,
            vec![
                "lw        x4, 0(x5)",
                "mv        a0, x5",
                "fsw       fa1, -4(sp)",
                "flw       fa0, -4(sp)",
                "jalr      x0, 0(x4)",
            ]
        );
    }

    #[test]
    fn test_spill_slot_meets_at_endif() {
        let body = vec![
            Instr::li(Reg::int("a2"), 1),
            Instr::branch(Opcode::Beq, Reg::int("a1"), Reg::int("x0"), "then1"),
            store(Reg::int("a2"), "v"),
            Instr::jump("endif1"),
            Instr::label("then1"),
            store(Reg::int("a2"), "v"),
            Instr::label("endif1"),
            restore(Reg::int("a3"), "v"),
            Instr::new(Opcode::CallDir, vec![Operand::label("h"), Reg::int("a3").into()]),
        ];
        let out = run(&body, &ClobberTable::new()).unwrap();
        assert!(out.contains(&"lw        a3, -4(sp)".to_string()));
        assert_eq!(out.iter().filter(|l| *l == "addi      sp, sp, -4").count(), 2);
    }

    #[test]
    fn test_restore_of_one_armed_slot_fails() {
        let body = vec![
            Instr::li(Reg::int("a2"), 1),
            Instr::branch(Opcode::Beq, Reg::int("a1"), Reg::int("x0"), "then1"),
            store(Reg::int("a2"), "v"),
            Instr::jump("endif1"),
            Instr::label("then1"),
            Instr::label("endif1"),
            restore(Reg::int("a3"), "v"),
        ];
        assert!(matches!(
            run(&body, &ClobberTable::new()),
            Err(CompileError::SpillSlotUnavailable { .. })
        ));
    }

    #[test]
    fn test_branch_without_labels_is_rejected() {
        let body = vec![Instr::branch(
            Opcode::Beq,
            Reg::int("a1"),
            Reg::int("x0"),
            "then7",
        )];
        assert!(matches!(
            run(&body, &ClobberTable::new()),
            Err(CompileError::MissingLabel { .. })
        ));
    }

    #[test]
    fn test_clobber_publication() {
        let mut table = ClobberTable::from_runtime(&BuiltinTable::standard());
        assert!(table.get("min_caml_fless").is_some());
        let leaf = [Instr::label("leaf"), Instr::new(Opcode::ReturnUnit, vec![])];
        assert!(table.publish("leaf", &leaf));
        assert!(table.clobbers("leaf").is_empty());
        let caller = [Instr::new(Opcode::CallDir, vec![Operand::label("leaf")])];
        assert!(!table.publish("caller", &caller));
        assert_eq!(table.clobbers("caller"), caller_saved());
    }
}
