//! Address constant folding for array accesses.
//!
//! Lowering emits every `Get`/`Put` as `slli t, i, 2; add a, b, t` followed by a load or
//! store at `0(a)`. Global arrays live at fixed addresses, so the base and often the
//! index are known integers; this pass folds the address arithmetic away when they are.

use hashbrown::{HashMap, HashSet};

use crate::core::instr::{Effect, Instr, Opcode, Reg, Var};
use crate::core::register_file::{AsmReg, WORD_SIZE};

/// Integer values known at each point of a straight-line scan.
struct KnownValues {
    values: HashMap<Var, i32>,
    /// Names with more than one definition; their value depends on the path taken.
    ambiguous: HashSet<Var>,
}

impl KnownValues {
    fn new(instrs: &[Instr]) -> Self {
        let mut defs: HashMap<Var, usize> = HashMap::new();
        for instr in instrs {
            if matches!(instr.op.info().effect, Effect::DefFirst | Effect::DefAll) {
                if let Some(rd) = instr.reg(0) {
                    *defs.entry(rd.name.clone()).or_insert(0) += 1;
                }
            }
        }
        let ambiguous = defs
            .into_iter()
            .filter(|(_, n)| *n > 1)
            .map(|(name, _)| name)
            .collect();
        Self {
            values: HashMap::new(),
            ambiguous,
        }
    }

    fn get(&self, reg: &Reg) -> Option<i32> {
        if reg.is(AsmReg::ZERO) {
            return Some(0);
        }
        if reg.is(AsmReg::ONE) {
            return Some(1);
        }
        if reg.is(AsmReg::TWO) {
            return Some(2);
        }
        if reg.is(AsmReg::THREE) {
            return Some(3);
        }
        self.values.get(&reg.name).copied()
    }

    fn record(&mut self, instr: &Instr) {
        let Some(rd) = instr.reg(0) else {
            return;
        };
        if rd.is_reserved() || self.ambiguous.contains(&rd.name) {
            return;
        }
        let value = match instr.op {
            Opcode::Li => instr.imm(1),
            Opcode::Neg => instr.reg(1).and_then(|rs| self.get(rs)).map(i32::wrapping_neg),
            Opcode::Mv => instr.reg(1).and_then(|rs| self.get(rs)),
            _ => None,
        };
        if let Some(value) = value {
            self.values.insert(rd.name.clone(), value);
        }
    }
}

/// The three instructions of one lowered array access.
struct ArrayAccess<'a> {
    index: &'a Reg,
    scaled: &'a Reg,
    base: &'a Reg,
    addr: &'a Reg,
    access: &'a Instr,
}

fn match_access(window: &[Instr]) -> Option<ArrayAccess<'_>> {
    let [slli, add, access, ..] = window else {
        return None;
    };
    if slli.op != Opcode::Slli || slli.imm(2) != Some(2) || add.op != Opcode::Add {
        return None;
    }
    let scaled = slli.reg(0)?;
    let addr = add.reg(0)?;
    if add.reg(2)? != scaled {
        return None;
    }
    let addr_slot = match access.op {
        Opcode::Lw | Opcode::Flw => 1,
        Opcode::Sw | Opcode::Fsw => 0,
        _ => return None,
    };
    if access.reg(addr_slot)? != addr || access.imm(2) != Some(0) {
        return None;
    }
    Some(ArrayAccess {
        index: slli.reg(1)?,
        scaled,
        base: add.reg(1)?,
        addr,
        access,
    })
}

/// Fold array address arithmetic whose operands are known constants.
pub fn fold_addresses(instrs: Vec<Instr>) -> Vec<Instr> {
    let mut known = KnownValues::new(&instrs);
    let mut out = Vec::with_capacity(instrs.len());
    let mut i = 0;
    while i < instrs.len() {
        if let Some(access) = match_access(&instrs[i..]) {
            if let Some(folded) = fold_access(&access, &known) {
                log::trace!("folded array access at {}", i);
                out.extend(folded);
                i += 3;
                continue;
            }
        }
        known.record(&instrs[i]);
        out.push(instrs[i].clone());
        i += 1;
    }
    out
}

fn fold_access(access: &ArrayAccess<'_>, known: &KnownValues) -> Option<Vec<Instr>> {
    let base = known.get(access.base);
    let index = known.get(access.index);
    let is_load = matches!(access.access.op, Opcode::Lw | Opcode::Flw);
    // value register of the access: destination of a load, source of a store
    let value = access.access.reg(if is_load { 0 } else { 1 })?.clone();

    match (base, index) {
        (Some(base), Some(index)) => {
            let address = base.wrapping_add(index.wrapping_mul(WORD_SIZE));
            let op = match access.access.op {
                Opcode::Lw => Opcode::Lwi,
                Opcode::Flw => Opcode::Flwi,
                Opcode::Sw => Opcode::Swi,
                _ => Opcode::Fswi,
            };
            Some(vec![Instr::new(op, vec![value.into(), address.into()])])
        }
        (Some(base), None) => {
            let slli = Instr::rri(Opcode::Slli, access.scaled.clone(), access.index.clone(), 2);
            let mem = if is_load {
                Instr::load(value, access.scaled.clone(), base)
            } else {
                Instr::store(access.scaled.clone(), value, base)
            };
            Some(vec![slli, mem])
        }
        (None, Some(index)) => {
            let addi = Instr::rri(
                Opcode::Addi,
                access.addr.clone(),
                access.base.clone(),
                index.wrapping_mul(WORD_SIZE),
            );
            let mem = if is_load {
                Instr::load(value, access.addr.clone(), 0)
            } else {
                Instr::store(access.addr.clone(), value, 0)
            };
            Some(vec![addi, mem])
        }
        (None, None) => None,
    }
}
