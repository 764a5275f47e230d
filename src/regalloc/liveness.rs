// This module computes per-instruction liveness over a flat virtual instruction list. Each
// instruction's register operands are classified into definitions and uses by the opcode's
// effect shape; fixed-role registers (zero, stack, heap, closure pointer, scratch relays and
// the constant registers) are left out, so only allocatable values are tracked. Successors
// are the next non-label instruction, plus the instruction after the target label for
// conditional branches; an unconditional jump has only its target. Live-out sets are solved
// backwards to a fixed point, separately for the integer and float classes.

//! Liveness analysis.

use hashbrown::{HashMap, HashSet};

use crate::core::error::{CompileError, CompileResult};
use crate::core::instr::{Effect, Instr, Opcode, Reg, Var};
use crate::core::register_file::RegClass;

/// Names of one register class.
pub type VarSet = HashSet<Var>;

/// Integer and float variable sets at one program point.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveSet {
    pub int: VarSet,
    pub float: VarSet,
}

impl LiveSet {
    pub fn of(&self, class: RegClass) -> &VarSet {
        match class {
            RegClass::Int => &self.int,
            RegClass::Float => &self.float,
        }
    }

    fn of_mut(&mut self, class: RegClass) -> &mut VarSet {
        match class {
            RegClass::Int => &mut self.int,
            RegClass::Float => &mut self.float,
        }
    }

    pub fn insert(&mut self, reg: &Reg) -> bool {
        self.of_mut(reg.class).insert(reg.name.clone())
    }

    pub fn contains(&self, reg: &Reg) -> bool {
        self.of(reg.class).contains(&reg.name)
    }

    pub fn extend(&mut self, other: &LiveSet) {
        self.int.extend(other.int.iter().cloned());
        self.float.extend(other.float.iter().cloned());
    }

    pub fn len(&self) -> usize {
        self.int.len() + self.float.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Members as registers, integers first, each class sorted by name.
    pub fn regs(&self) -> Vec<Reg> {
        let mut ints: Vec<_> = self.int.iter().cloned().collect();
        let mut floats: Vec<_> = self.float.iter().cloned().collect();
        ints.sort();
        floats.sort();
        ints.into_iter()
            .map(Reg::int)
            .chain(floats.into_iter().map(Reg::float))
            .collect()
    }
}

/// Register operands an instruction defines and uses, fixed-role registers included.
pub fn defs_uses(instr: &Instr) -> (Vec<&Reg>, Vec<&Reg>) {
    let regs: Vec<&Reg> = instr.regs().collect();
    match instr.op.info().effect {
        Effect::DefFirst => match regs.split_first() {
            Some((def, uses)) => (vec![*def], uses.to_vec()),
            None => (Vec::new(), Vec::new()),
        },
        Effect::DefAll => (regs, Vec::new()),
        Effect::UseAll => (Vec::new(), regs),
        Effect::VectorLoad => match regs.split_first() {
            Some((base, lanes)) => (lanes.to_vec(), vec![*base]),
            None => (Vec::new(), Vec::new()),
        },
        Effect::IndirectJump => {
            if instr.operands.len() == 3 {
                match regs.split_first() {
                    Some((def, uses)) => (vec![*def], uses.to_vec()),
                    None => (Vec::new(), Vec::new()),
                }
            } else {
                (Vec::new(), regs)
            }
        }
        Effect::None => (Vec::new(), Vec::new()),
    }
}

/// Definitions and uses of allocatable values only.
pub fn tracked_defs_uses(instr: &Instr) -> (LiveSet, LiveSet) {
    let (defs, uses) = defs_uses(instr);
    let mut def_set = LiveSet::default();
    let mut use_set = LiveSet::default();
    for reg in defs.into_iter().filter(|r| !r.is_reserved()) {
        def_set.insert(reg);
    }
    for reg in uses.into_iter().filter(|r| !r.is_reserved()) {
        use_set.insert(reg);
    }
    (def_set, use_set)
}

/// Index of every label in the list.
pub fn label_positions(instrs: &[Instr]) -> HashMap<Var, usize> {
    instrs
        .iter()
        .enumerate()
        .filter(|(_, instr)| instr.is_label())
        .filter_map(|(i, instr)| instr.label_operand().map(|l| (l.clone(), i)))
        .collect()
}

/// First instruction at or after `from` that is neither a label nor a comment.
pub fn next_real(instrs: &[Instr], from: usize) -> Option<usize> {
    (from..instrs.len())
        .find(|&i| !matches!(instrs[i].op, Opcode::Label | Opcode::Comment))
}

/// Control-flow successors of every instruction.
pub fn successors(instrs: &[Instr]) -> CompileResult<Vec<Vec<usize>>> {
    let labels = label_positions(instrs);
    let target_of = |instr: &Instr| -> CompileResult<Option<usize>> {
        let label = instr
            .label_operand()
            .ok_or_else(|| CompileError::MalformedInstruction {
                instr: instr.to_string(),
                stage: "liveness",
            })?;
        let pos = labels
            .get(label)
            .ok_or_else(|| CompileError::MissingLabel {
                label: label.to_string(),
                stage: "liveness",
            })?;
        Ok(next_real(instrs, pos + 1))
    };

    let mut succs = Vec::with_capacity(instrs.len());
    for (i, instr) in instrs.iter().enumerate() {
        let mut out = Vec::new();
        if instr.op == Opcode::J {
            // A jump to a label outside the list is a tail transfer out of the body.
            if instr.label_operand().is_some_and(|l| labels.contains_key(l)) {
                out.extend(target_of(instr)?);
            }
        } else {
            out.extend(next_real(instrs, i + 1));
            if instr.op.is_branch() {
                if let Some(target) = target_of(instr)? {
                    if !out.contains(&target) {
                        out.push(target);
                    }
                }
            }
        }
        succs.push(out);
    }
    Ok(succs)
}

/// Liveness of one instruction list.
#[derive(Debug, Clone, Default)]
pub struct Liveness {
    /// Values live after each instruction; empty for labels.
    pub live_out: Vec<LiveSet>,
    pub defs: Vec<LiveSet>,
    pub uses: Vec<LiveSet>,
}

impl Liveness {
    /// Values live before instruction `i`.
    pub fn live_in(&self, i: usize) -> LiveSet {
        let mut set = LiveSet::default();
        for class in [RegClass::Int, RegClass::Float] {
            let defs = self.defs[i].of(class);
            for name in self.live_out[i].of(class) {
                if !defs.contains(name) {
                    set.of_mut(class).insert(name.clone());
                }
            }
            set.of_mut(class)
                .extend(self.uses[i].of(class).iter().cloned());
        }
        set
    }

    /// Every value live after, defined by or used by any instruction.
    pub fn touched(&self) -> LiveSet {
        let mut set = LiveSet::default();
        for i in 0..self.live_out.len() {
            set.extend(&self.live_out[i]);
            set.extend(&self.defs[i]);
            set.extend(&self.uses[i]);
        }
        set
    }
}

/// Solve liveness for `instrs`.
pub fn analyze(instrs: &[Instr]) -> CompileResult<Liveness> {
    let succs = successors(instrs)?;
    let (defs, uses): (Vec<_>, Vec<_>) = instrs.iter().map(tracked_defs_uses).unzip();
    let mut liveness = Liveness {
        live_out: vec![LiveSet::default(); instrs.len()],
        defs,
        uses,
    };

    let mut passes = 0usize;
    loop {
        passes += 1;
        let mut changed = false;
        for i in (0..instrs.len()).rev() {
            if instrs[i].is_label() {
                continue;
            }
            for &s in &succs[i] {
                let incoming = liveness.live_in(s);
                let out = &mut liveness.live_out[i];
                for name in incoming.int {
                    changed |= out.int.insert(name);
                }
                for name in incoming.float {
                    changed |= out.float.insert(name);
                }
            }
        }
        if !changed {
            break;
        }
    }
    log::trace!("liveness converged after {passes} passes over {} instructions", instrs.len());
    Ok(liveness)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(set: &VarSet) -> Vec<String> {
        let mut v: Vec<_> = set.iter().map(|s| s.to_string()).collect();
        v.sort();
        v
    }

    #[test]
    fn test_straight_line() {
        let instrs = vec![
            Instr::li(Reg::int("a"), 1),
            Instr::li(Reg::int("b"), 2),
            Instr::rrr(Opcode::Add, Reg::int("c"), Reg::int("a"), Reg::int("b")),
            Instr::new(Opcode::Return, vec![Reg::int("c").into()]),
        ];
        let live = analyze(&instrs).unwrap();
        assert_eq!(names(&live.live_out[0].int), vec!["a"]);
        assert_eq!(names(&live.live_out[1].int), vec!["a", "b"]);
        assert_eq!(names(&live.live_out[2].int), vec!["c"]);
        assert!(live.live_out[3].is_empty());
    }

    #[test]
    fn test_reserved_registers_ignored() {
        let instrs = vec![
            Instr::rri(Opcode::Addi, Reg::int("hp"), Reg::int("hp"), 8),
            Instr::rrr(Opcode::Add, Reg::int("c"), Reg::int("x25"), Reg::int("a")),
            Instr::new(Opcode::Return, vec![Reg::int("c").into()]),
        ];
        let live = analyze(&instrs).unwrap();
        assert_eq!(names(&live.live_out[0].int), vec!["a"]);
        assert!(live.defs[0].is_empty());
    }

    #[test]
    fn test_branch_arms_merge() {
        // beq a, b, then1; li r, 1; j endif1; then1: mv r, x; endif1: return r
        let instrs = vec![
            Instr::branch(Opcode::Beq, Reg::int("a"), Reg::int("b"), "then1"),
            Instr::li(Reg::int("r"), 1),
            Instr::jump("endif1"),
            Instr::label("then1"),
            Instr::mv(Reg::int("r"), Reg::int("x")),
            Instr::label("endif1"),
            Instr::new(Opcode::Return, vec![Reg::int("r").into()]),
        ];
        let live = analyze(&instrs).unwrap();
        assert_eq!(names(&live.live_out[0].int), vec!["x"]);
        assert_eq!(names(&live.live_out[1].int), vec!["r"]);
        assert_eq!(names(&live.live_out[2].int), vec!["r"]);
        assert!(live.live_out[3].is_empty());
        assert_eq!(names(&live.live_in(0).int), vec!["a", "b", "x"]);
    }

    #[test]
    fn test_classes_are_separate() {
        let instrs = vec![
            Instr::rr(Opcode::FcvtSW, Reg::float("f"), Reg::int("i")),
            Instr::new(Opcode::Return, vec![Reg::float("f").into()]),
        ];
        let live = analyze(&instrs).unwrap();
        assert!(live.live_out[0].int.is_empty());
        assert_eq!(names(&live.live_out[0].float), vec!["f"]);
        assert_eq!(names(&live.live_in(0).int), vec!["i"]);
    }

    #[test]
    fn test_missing_label_is_fatal() {
        let instrs = vec![Instr::branch(
            Opcode::Beq,
            Reg::int("a1"),
            Reg::int("x0"),
            "nowhere",
        )];
        assert!(matches!(
            analyze(&instrs),
            Err(CompileError::MissingLabel { .. })
        ));
    }

    #[test]
    fn test_defs_uses_shapes() {
        let sw = Instr::store(Reg::int("base"), Reg::int("v"), 4);
        let (d, u) = defs_uses(&sw);
        assert!(d.is_empty());
        assert_eq!(u.len(), 2);

        let call = Instr::new(
            Opcode::CallDirRet,
            vec![
                Reg::float("r").into(),
                crate::core::instr::Operand::label("f"),
                Reg::int("x").into(),
            ],
        );
        let (d, u) = defs_uses(&call);
        assert_eq!(&*d[0].name, "r");
        assert_eq!(&*u[0].name, "x");

        let tail_jalr = Instr::new(
            Opcode::Jalr,
            vec![Reg::int("x0").into(), Reg::int("x4").into(), 0.into()],
        );
        let (d, u) = defs_uses(&tail_jalr);
        assert_eq!(&*d[0].name, "x0");
        assert_eq!(&*u[0].name, "x4");
    }
}
