//! Builtin runtime functions linked into every listing.
//!
//! Each builtin carries its return class, the registers its body overwrites and the body
//! itself. Calling-convention expansion reads the clobber sets to decide which caller-saved
//! registers must survive a call; the listing prepends the bodies.

use crate::core::register_file::{AsmReg, RegBitSet, RegClass};

/// One hand-written runtime routine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Builtin {
    pub name: &'static str,
    /// `None` for routines returning unit.
    pub ret: Option<RegClass>,
    pub int_clobbers: &'static [&'static str],
    pub float_clobbers: &'static [&'static str],
    /// Body lines after the entry label; lines ending in `:` are local labels.
    pub body: &'static [&'static str],
}

impl Builtin {
    /// Registers the routine may overwrite.
    pub fn clobbers(&self) -> RegBitSet {
        RegBitSet::from_regs(
            self.int_clobbers
                .iter()
                .chain(self.float_clobbers)
                .filter_map(|name| AsmReg::from_name(name)),
        )
    }

    /// Assembler text of the routine, entry label included.
    pub fn render(&self) -> String {
        let mut text = format!("{}:\n", self.name);
        for line in self.body {
            if line.ends_with(':') {
                text.push_str(line);
            } else {
                text.push('\t');
                text.push_str(line);
            }
            text.push('\n');
        }
        text
    }
}

/// The builtins available to a program.
#[derive(Debug, Clone, Default)]
pub struct BuiltinTable {
    entries: Vec<Builtin>,
}

impl BuiltinTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a builtin.
    pub fn insert(&mut self, builtin: Builtin) {
        match self.entries.iter_mut().find(|b| b.name == builtin.name) {
            Some(slot) => *slot = builtin,
            None => self.entries.push(builtin),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Builtin> {
        self.entries.iter().find(|b| b.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Builtin> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Concatenated bodies in table order.
    pub fn render(&self) -> String {
        self.entries.iter().map(Builtin::render).collect()
    }

    /// The standard runtime.
    pub fn standard() -> Self {
        let mut table = Self::new();
        for builtin in standard_builtins() {
            table.insert(builtin);
        }
        table
    }
}

const INT: Option<RegClass> = Some(RegClass::Int);
const FLOAT: Option<RegClass> = Some(RegClass::Float);

// Reads assemble a word from four bytes of the input port at address 0.
const READ_INT: [&str; 11] = [
    "lw a1, 0(x0)",
    "lw a2, 0(x0)",
    "slli a1, a1, 8",
    "or a1, a1, a2",
    "lw a2, 0(x0)",
    "slli a1, a1, 8",
    "or a1, a1, a2",
    "lw a2, 0(x0)",
    "slli a1, a1, 8",
    "or a1, a1, a2",
    "ret",
];
const READ_FLOAT: [&str; 12] = [
    "lw a1, 0(x0)",
    "lw a2, 0(x0)",
    "slli a1, a1, 8",
    "or a1, a1, a2",
    "lw a2, 0(x0)",
    "slli a1, a1, 8",
    "or a1, a1, a2",
    "lw a2, 0(x0)",
    "slli a1, a1, 8",
    "or a1, a1, a2",
    "fmv.w.x fa0, a1",
    "ret",
];

fn standard_builtins() -> Vec<Builtin> {
    vec![
        Builtin {
            name: "min_caml_create_array",
            ret: INT,
            int_clobbers: &["a1", "a2", "a3", "a4"],
            float_clobbers: &[],
            body: &[
                "mv a3, hp",
                "beq a1, x0, end_loop_min_caml_create_array",
                "slli a1, a1, 2",
                "add hp, hp, a1",
                "li a1, 0",
                "mv a4, a3",
                "loop_min_caml_create_array:",
                "sw a2, 0(a4)",
                "addi a1, a1, 4",
                "add a4, a1, a3",
                "bne hp, a4, loop_min_caml_create_array",
                "end_loop_min_caml_create_array:",
                "mv a1, a3",
                "ret",
            ],
        },
        Builtin {
            name: "min_caml_create_float_array",
            ret: INT,
            int_clobbers: &["a1", "a2", "a4"],
            float_clobbers: &["fa0"],
            body: &[
                "mv a2, hp",
                "beq a1, x0, end_loop_min_caml_create_float_array",
                "slli a1, a1, 2",
                "add hp, hp, a1",
                "li a1, 0",
                "mv a4, a2",
                "loop_min_caml_create_float_array:",
                "fsw fa0, 0(a4)",
                "addi a1, a1, 4",
                "add a4, a1, a2",
                "bne hp, a4, loop_min_caml_create_float_array",
                "end_loop_min_caml_create_float_array:",
                "mv a1, a2",
                "ret",
            ],
        },
        Builtin {
            name: "min_caml_float_of_int",
            ret: FLOAT,
            int_clobbers: &["a1"],
            float_clobbers: &["fa0"],
            body: &["fcvt.s.w fa0, a1", "ret"],
        },
        Builtin {
            name: "min_caml_int_of_float",
            ret: INT,
            int_clobbers: &["a1"],
            float_clobbers: &["fa0"],
            body: &["fcvt.w.s a1, fa0", "ret"],
        },
        Builtin {
            name: "min_caml_fless",
            ret: INT,
            int_clobbers: &["a1"],
            float_clobbers: &["fa0", "fa1"],
            body: &["flt a1, fa0, fa1", "ret"],
        },
        Builtin {
            name: "min_caml_fneg",
            ret: FLOAT,
            int_clobbers: &[],
            float_clobbers: &["fa0"],
            body: &["fsgnjn fa0, fa0, fa0", "ret"],
        },
        Builtin {
            name: "min_caml_fsqr",
            ret: FLOAT,
            int_clobbers: &[],
            float_clobbers: &["fa0"],
            body: &["fmul fa0, fa0, fa0", "ret"],
        },
        Builtin {
            name: "min_caml_fabs",
            ret: FLOAT,
            int_clobbers: &[],
            float_clobbers: &["fa0"],
            body: &["fsgnjx fa0, fa0, fa0", "ret"],
        },
        Builtin {
            name: "min_caml_fsgnj",
            ret: FLOAT,
            int_clobbers: &[],
            float_clobbers: &["fa0"],
            body: &["fsgnj fa0, fa0, fa0", "ret"],
        },
        Builtin {
            name: "min_caml_floor",
            ret: FLOAT,
            int_clobbers: &["a1"],
            float_clobbers: &["fa0", "fa1"],
            body: &[
                "fcvt.w.s a1, fa0",
                "fcvt.s.w fa1, a1",
                "fle a1, fa1, fa0",
                "beq a1, x0, min_caml_floor_else",
                "fmv fa0, fa1",
                "ret",
                "min_caml_floor_else:",
                "li a1, 1065353216",
                "fmv.w.x fa0, a1",
                "fsub fa0, fa1, fa0",
                "fcvt.w.s a1, fa0",
                "fcvt.s.w fa1, a1",
                "ret",
            ],
        },
        Builtin {
            name: "min_caml_fhalf",
            ret: FLOAT,
            int_clobbers: &["a1"],
            float_clobbers: &["fa0", "fa1"],
            body: &["li a1, 1056964608", "fmv.w.x fa1, a1", "fmul fa0, fa0, fa1", "ret"],
        },
        Builtin {
            name: "min_caml_sqrt",
            ret: FLOAT,
            int_clobbers: &[],
            float_clobbers: &["fa0"],
            body: &["fsqrt fa0, fa0", "ret"],
        },
        Builtin {
            name: "min_caml_fisneg",
            ret: INT,
            int_clobbers: &["a1"],
            float_clobbers: &["fa0", "fa1"],
            body: &["fmv.w.x fa1, x0", "flt a1, fa0, fa1", "ret"],
        },
        Builtin {
            name: "min_caml_fispos",
            ret: INT,
            int_clobbers: &["a1"],
            float_clobbers: &["fa0", "fa1"],
            body: &["fmv.w.x fa1, x0", "flt a1, fa1, fa0", "ret"],
        },
        Builtin {
            name: "min_caml_fiszero",
            ret: INT,
            int_clobbers: &["a1"],
            float_clobbers: &["fa0", "fa1"],
            body: &["fmv.w.x fa1, x0", "feq a1, fa0, fa1", "ret"],
        },
        Builtin {
            name: "min_caml_print_char",
            ret: None,
            int_clobbers: &["a1"],
            float_clobbers: &[],
            body: &["sw a1, 0(x0)", "ret"],
        },
        Builtin {
            name: "min_caml_print_int",
            ret: None,
            int_clobbers: &["a1", "a2", "a3", "a4"],
            float_clobbers: &[],
            body: &[
                "li a2, 0",
                "li a3, 0",
                "li a4, 100",
                "min_caml_print_int_hundreds:",
                "blt a1, a4, min_caml_print_int_tens_pre",
                "sub a1, a1, a4",
                "addi a2, a2, 1",
                "j min_caml_print_int_hundreds",
                "min_caml_print_int_tens_pre:",
                "li a4, 10",
                "min_caml_print_int_tens:",
                "blt a1, a4, min_caml_print_int_ones",
                "sub a1, a1, a4",
                "addi a3, a3, 1",
                "j min_caml_print_int_tens",
                "min_caml_print_int_ones:",
                "addi a2, a2, 48",
                "sw a2, 0(x0)",
                "addi a3, a3, 48",
                "sw a3, 0(x0)",
                "addi a1, a1, 48",
                "sw a1, 0(x0)",
                "ret",
            ],
        },
        Builtin {
            name: "min_caml_read_int",
            ret: INT,
            int_clobbers: &["a1", "a2"],
            float_clobbers: &[],
            body: &READ_INT,
        },
        Builtin {
            name: "min_caml_read_float",
            ret: FLOAT,
            int_clobbers: &["a1", "a2"],
            float_clobbers: &["fa0"],
            body: &READ_FLOAT,
        },
        Builtin {
            name: "min_caml_debug_int",
            ret: None,
            int_clobbers: &[],
            float_clobbers: &[],
            body: &["ret"],
        },
        Builtin {
            name: "min_caml_debug_float",
            ret: None,
            int_clobbers: &[],
            float_clobbers: &[],
            body: &["ret"],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_table() {
        let table = BuiltinTable::standard();
        assert_eq!(table.len(), 21);
        let fless = table.get("min_caml_fless").unwrap();
        assert_eq!(fless.ret, Some(RegClass::Int));
        let clobbers = fless.clobbers();
        assert!(clobbers.contains(AsmReg::INT_RET));
        assert!(clobbers.contains(AsmReg::FLOAT_RET));
        assert!(!clobbers.contains(AsmReg::from_name("a2").unwrap()));
    }

    #[test]
    fn test_render_indents_instructions_only() {
        let table = BuiltinTable::standard();
        let text = table.get("min_caml_floor").unwrap().render();
        assert!(text.starts_with("min_caml_floor:\n\tfcvt.w.s a1, fa0\n"));
        assert!(text.contains("\nmin_caml_floor_else:\n\tli a1, 1065353216\n"));
        assert!(text.ends_with("\tret\n"));
    }

    #[test]
    fn test_read_float_body() {
        let table = BuiltinTable::standard();
        let body = table.get("min_caml_read_float").unwrap().body;
        assert_eq!(body.len(), 12);
        assert_eq!(body[0], "lw a1, 0(x0)");
        assert_eq!(body[10], "fmv.w.x fa0, a1");
        assert_eq!(body[11], "ret");
    }

    #[test]
    fn test_insert_replaces() {
        let mut table = BuiltinTable::standard();
        let before = table.len();
        table.insert(Builtin {
            name: "min_caml_print_char",
            ret: None,
            int_clobbers: &[],
            float_clobbers: &[],
            body: &["ret"],
        });
        assert_eq!(table.len(), before);
        assert!(table.get("min_caml_print_char").unwrap().clobbers().is_empty());
    }
}
