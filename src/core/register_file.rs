// This module describes the physical register file of the target: two banks of 32 registers
// (integer and float), their assembler names, the registers the back end reserves for fixed
// roles (zero, stack, heap, return address, closure pointer, scratch relays and the
// hard-wired small constants), and the allocation orders used by the colouring allocator.
// RegBitSet is a per-bank bit mask used for callee/caller-saved sets and function clobber
// sets. RegisterFile bundles an allocation order per class together with the caller/callee
// split; function bodies prefer caller-saved registers while the top-level body prefers
// callee-saved ones, since it never returns and has nothing to preserve for a caller.

//! Physical registers, register sets and allocation orders.

use std::fmt;

/// Maximum number of register banks (integer and float).
pub const MAX_REGISTER_BANKS: usize = 2;

/// Number of registers in each bank.
pub const REGISTERS_PER_BANK: usize = 32;

/// Type for register bank indices.
pub type RegBank = u8;

/// Type for register IDs within a bank.
pub type RegId = u8;

pub const INT_BANK: RegBank = 0;
pub const FLOAT_BANK: RegBank = 1;

/// Bytes per machine word.
pub const WORD_SIZE: i32 = 4;

/// Register class of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RegClass {
    Int,
    Float,
}

impl RegClass {
    pub fn bank(self) -> RegBank {
        match self {
            RegClass::Int => INT_BANK,
            RegClass::Float => FLOAT_BANK,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            RegClass::Int => "int",
            RegClass::Float => "float",
        }
    }
}

const INT_NAMES: [&str; REGISTERS_PER_BANK] = [
    "x0", "ra", "sp", "hp", "x4", "x5", "x6", "x7", "x8", "x9", "a0", "a1", "a2", "a3", "a4",
    "a5", "a6", "a7", "x18", "x19", "x20", "x21", "x22", "x23", "x24", "x25", "x26", "x27",
    "x28", "x29", "x30", "x31",
];

const FLOAT_NAMES: [&str; REGISTERS_PER_BANK] = [
    "f0", "f1", "f2", "f3", "f4", "f5", "f6", "f7", "f8", "f9", "fa0", "fa1", "fa2", "fa3",
    "fa4", "fa5", "fa6", "fa7", "f18", "f19", "f20", "f21", "f22", "f23", "f24", "f25", "f26",
    "f27", "f28", "f29", "f30", "f31",
];

/// Names never handed out by the allocator and never tracked by liveness.
const RESERVED_NAMES: [&str; 13] = [
    "x0", "ra", "sp", "hp", "a0", "x4", "x25", "x26", "x27", "f4", "f25", "f26", "f27",
];

/// Combined register identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AsmReg {
    pub bank: RegBank,
    pub id: RegId,
}

impl AsmReg {
    pub const fn new(bank: RegBank, id: RegId) -> Self {
        Self { bank, id }
    }

    pub const ZERO: AsmReg = AsmReg::new(INT_BANK, 0);
    pub const RA: AsmReg = AsmReg::new(INT_BANK, 1);
    pub const SP: AsmReg = AsmReg::new(INT_BANK, 2);
    pub const HP: AsmReg = AsmReg::new(INT_BANK, 3);
    /// Integer scratch: callee address of closure calls and result relay.
    pub const SCRATCH: AsmReg = AsmReg::new(INT_BANK, 4);
    /// Closure pointer of the current call.
    pub const CLOSURE: AsmReg = AsmReg::new(INT_BANK, 10);
    /// Integer result register.
    pub const INT_RET: AsmReg = AsmReg::new(INT_BANK, 11);
    pub const ONE: AsmReg = AsmReg::new(INT_BANK, 25);
    pub const TWO: AsmReg = AsmReg::new(INT_BANK, 26);
    pub const THREE: AsmReg = AsmReg::new(INT_BANK, 27);
    /// Float scratch: result relay and zero operand of inlined sign tests.
    pub const FSCRATCH: AsmReg = AsmReg::new(FLOAT_BANK, 4);
    /// Float result register.
    pub const FLOAT_RET: AsmReg = AsmReg::new(FLOAT_BANK, 10);
    pub const FZERO: AsmReg = AsmReg::new(FLOAT_BANK, 25);
    pub const FONE: AsmReg = AsmReg::new(FLOAT_BANK, 26);
    pub const FTWO: AsmReg = AsmReg::new(FLOAT_BANK, 27);

    /// Assembler name of the register.
    pub fn name(&self) -> &'static str {
        match self.bank {
            INT_BANK => INT_NAMES[self.id as usize],
            _ => FLOAT_NAMES[self.id as usize],
        }
    }

    /// Look a register up by its assembler name.
    pub fn from_name(name: &str) -> Option<AsmReg> {
        if let Some(id) = INT_NAMES.iter().position(|n| *n == name) {
            return Some(AsmReg::new(INT_BANK, id as RegId));
        }
        FLOAT_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|id| AsmReg::new(FLOAT_BANK, id as RegId))
    }

    pub fn class(&self) -> RegClass {
        if self.bank == INT_BANK {
            RegClass::Int
        } else {
            RegClass::Float
        }
    }

    /// The `index`-th argument register of a class (`a1..a7`, `fa0..fa7`).
    pub fn argument(class: RegClass, index: usize) -> Option<AsmReg> {
        match class {
            RegClass::Int if index < 7 => Some(AsmReg::new(INT_BANK, 11 + index as RegId)),
            RegClass::Float if index < 8 => Some(AsmReg::new(FLOAT_BANK, 10 + index as RegId)),
            _ => None,
        }
    }
}

impl fmt::Display for AsmReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether a register name has a fixed role and is invisible to liveness and allocation.
pub fn is_reserved(name: &str) -> bool {
    RESERVED_NAMES.contains(&name)
}

/// Number of argument registers available to a class.
pub fn argument_count(class: RegClass) -> usize {
    match class {
        RegClass::Int => 7,
        RegClass::Float => 8,
    }
}

/// Bit set for efficiently tracking register sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegBitSet {
    /// Bit mask for each register bank.
    banks: [u32; MAX_REGISTER_BANKS],
}

impl RegBitSet {
    /// Create empty register set.
    pub fn new() -> Self {
        Self {
            banks: [0; MAX_REGISTER_BANKS],
        }
    }

    /// Every register of both banks.
    pub fn full() -> Self {
        Self {
            banks: [u32::MAX; MAX_REGISTER_BANKS],
        }
    }

    pub fn from_regs(regs: impl IntoIterator<Item = AsmReg>) -> Self {
        let mut set = Self::new();
        for reg in regs {
            set.set(reg);
        }
        set
    }

    /// Check if register is set.
    pub fn contains(&self, reg: AsmReg) -> bool {
        (self.banks[reg.bank as usize] & (1u32 << reg.id)) != 0
    }

    /// Set a register.
    pub fn set(&mut self, reg: AsmReg) {
        self.banks[reg.bank as usize] |= 1u32 << reg.id;
    }

    /// Clear a register.
    pub fn clear(&mut self, reg: AsmReg) {
        self.banks[reg.bank as usize] &= !(1u32 << reg.id);
    }

    /// Set union with another set.
    pub fn union(&mut self, other: &RegBitSet) {
        for i in 0..MAX_REGISTER_BANKS {
            self.banks[i] |= other.banks[i];
        }
    }

    /// Set intersection with another set.
    pub fn intersect(&mut self, other: &RegBitSet) {
        for i in 0..MAX_REGISTER_BANKS {
            self.banks[i] &= other.banks[i];
        }
    }

    /// Count number of set registers in bank.
    pub fn count_in_bank(&self, bank: RegBank) -> u32 {
        self.banks[bank as usize].count_ones()
    }

    pub fn is_empty(&self) -> bool {
        self.banks.iter().all(|b| *b == 0)
    }

    /// Members in bank order, then id order.
    pub fn iter(&self) -> impl Iterator<Item = AsmReg> + '_ {
        (0..MAX_REGISTER_BANKS).flat_map(move |bank| {
            let mask = self.banks[bank];
            (0..REGISTERS_PER_BANK as RegId)
                .filter(move |id| mask & (1u32 << id) != 0)
                .map(move |id| AsmReg::new(bank as RegBank, id))
        })
    }
}

fn regs(names: &[&str]) -> Vec<AsmReg> {
    names.iter().filter_map(|n| AsmReg::from_name(n)).collect()
}

const INT_CALLER_SAVED: [&str; 14] = [
    "a1", "a2", "a3", "a4", "a5", "a6", "a7", "x5", "x6", "x7", "x28", "x29", "x30", "x31",
];
const INT_CALLEE_SAVED: [&str; 9] = ["x8", "x9", "x18", "x19", "x20", "x21", "x22", "x23", "x24"];
// f4 is the float result relay and stays out of the allocation order.
const FLOAT_CALLER_SAVED: [&str; 19] = [
    "fa0", "fa1", "fa2", "fa3", "fa4", "fa5", "fa6", "fa7", "f0", "f1", "f2", "f3", "f5", "f6",
    "f7", "f28", "f29", "f30", "f31",
];
const FLOAT_CALLEE_SAVED: [&str; 9] = ["f8", "f9", "f18", "f19", "f20", "f21", "f22", "f23", "f24"];

/// Registers a callee must preserve.
pub fn callee_saved() -> RegBitSet {
    RegBitSet::from_regs(regs(&INT_CALLEE_SAVED).into_iter().chain(regs(&FLOAT_CALLEE_SAVED)))
}

/// Allocatable registers a callee may freely overwrite.
pub fn caller_saved() -> RegBitSet {
    RegBitSet::from_regs(regs(&INT_CALLER_SAVED).into_iter().chain(regs(&FLOAT_CALLER_SAVED)))
}

/// Allocation orders of one compilation unit.
#[derive(Debug, Clone)]
pub struct RegisterFile {
    int_order: Vec<AsmReg>,
    float_order: Vec<AsmReg>,
}

impl RegisterFile {
    pub fn new(int_order: Vec<AsmReg>, float_order: Vec<AsmReg>) -> Self {
        Self {
            int_order,
            float_order,
        }
    }

    /// Order for function bodies: caller-saved registers first.
    pub fn for_function() -> Self {
        let mut int_order = regs(&INT_CALLER_SAVED);
        int_order.extend(regs(&INT_CALLEE_SAVED));
        let mut float_order = regs(&FLOAT_CALLER_SAVED);
        float_order.extend(regs(&FLOAT_CALLEE_SAVED));
        Self {
            int_order,
            float_order,
        }
    }

    /// Order for the top-level body: callee-saved first, argument registers last.
    pub fn for_main() -> Self {
        let mut int_order = regs(&INT_CALLEE_SAVED);
        int_order.extend(regs(&INT_CALLER_SAVED[7..]));
        int_order.extend(regs(&INT_CALLER_SAVED[..7]));
        let mut float_order = regs(&FLOAT_CALLEE_SAVED);
        float_order.extend(regs(&FLOAT_CALLER_SAVED[8..]));
        float_order.extend(regs(&FLOAT_CALLER_SAVED[..8]));
        Self {
            int_order,
            float_order,
        }
    }

    /// Colours available to a class, in preference order.
    pub fn order(&self, class: RegClass) -> &[AsmReg] {
        match class {
            RegClass::Int => &self.int_order,
            RegClass::Float => &self.float_order,
        }
    }
}
