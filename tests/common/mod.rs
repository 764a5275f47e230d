//! Test harness: compiles IR dumps and runs the listing on a small reference machine.

#![allow(dead_code)]

use std::collections::HashMap;

use bumpalo::Bump;
use rvback::compiler::{compile_program, CompilerOptions};
use rvback::core::{CompilationSession, SessionStats};
use rvback::ir::parse_program;

pub const STACK_TOP: i32 = 0x8000;
pub const HEAP_BASE: i32 = 0x1000;
const RETURN_SENTINEL: i32 = -1;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Compile a dump, returning the listing and the session statistics.
pub fn compile(dump: &str, options: &CompilerOptions) -> (String, SessionStats) {
    init_logging();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let program = parse_program(dump).expect("dump should parse");
    let listing = compile_program(&program, options, &session).expect("program should compile");
    (listing, session.stats())
}

/// The lines of one body, from its label up to the next top-level label.
pub fn body_of<'l>(listing: &'l str, label: &str) -> Vec<&'l str> {
    let header = format!("{label}:");
    listing
        .lines()
        .skip_while(|l| *l != header)
        .skip(1)
        .take_while(|l| l.is_empty() || l.starts_with('\t') || is_local_label(l, label))
        .filter(|l| !l.is_empty())
        .collect()
}

fn is_local_label(line: &str, function: &str) -> bool {
    line.ends_with(':')
        && (line.starts_with("then")
            || line.starts_with("endif")
            || line.starts_with(&format!("{function}_")))
}

#[derive(Debug, Clone)]
enum Line {
    Label(String),
    Op(String, Vec<String>),
}

fn parse_listing(listing: &str) -> (Vec<Line>, HashMap<String, usize>) {
    let mut lines = Vec::new();
    let mut labels = HashMap::new();
    for raw in listing.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('.') || line.starts_with('#') {
            continue;
        }
        if let Some(name) = line.strip_suffix(':') {
            labels.insert(name.to_string(), lines.len());
            lines.push(Line::Label(name.to_string()));
            continue;
        }
        let (mnemonic, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let operands = rest
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        lines.push(Line::Op(mnemonic.to_string(), operands));
    }
    (lines, labels)
}

/// Split `off(base)`.
fn memory_operand(text: &str) -> (i32, String) {
    let (off, base) = text.split_once('(').expect("memory operand");
    (
        off.parse().expect("offset"),
        base.trim_end_matches(')').to_string(),
    )
}

/// Register values are raw 32-bit patterns; floats are stored as their bits.
#[derive(Debug, Default)]
pub struct Machine {
    regs: HashMap<String, i32>,
    memory: HashMap<i32, i32>,
    input: Vec<i32>,
    pub output: Vec<i32>,
    pub steps: usize,
}

impl Machine {
    pub fn new(input: Vec<i32>) -> Self {
        let mut machine = Self {
            input,
            ..Self::default()
        };
        machine.write("sp", STACK_TOP);
        machine.write("hp", HEAP_BASE);
        machine.write("ra", RETURN_SENTINEL);
        machine
    }

    pub fn reg(&self, name: &str) -> i32 {
        if name == "x0" {
            return 0;
        }
        self.regs.get(name).copied().unwrap_or(0)
    }

    fn write(&mut self, name: &str, value: i32) {
        if name != "x0" {
            self.regs.insert(name.to_string(), value);
        }
    }

    fn freg(&self, name: &str) -> f32 {
        f32::from_bits(self.reg(name) as u32)
    }

    fn fwrite(&mut self, name: &str, value: f32) {
        self.write(name, value.to_bits() as i32);
    }

    fn load(&mut self, addr: i32) -> i32 {
        if addr == 0 {
            return if self.input.is_empty() {
                0
            } else {
                self.input.remove(0)
            };
        }
        assert_eq!(addr % 4, 0, "unaligned load at {addr}");
        self.memory.get(&addr).copied().unwrap_or(0)
    }

    fn store(&mut self, addr: i32, value: i32) {
        if addr == 0 {
            self.output.push(value);
            return;
        }
        assert_eq!(addr % 4, 0, "unaligned store at {addr}");
        self.memory.insert(addr, value);
    }

    /// Heap words between the heap base and the current `hp`, in address order.
    pub fn heap(&self) -> Vec<(i32, i32)> {
        let top = self.reg("hp");
        let mut cells: Vec<(i32, i32)> = self
            .memory
            .iter()
            .filter(|(addr, _)| (HEAP_BASE..top).contains(*addr))
            .map(|(&addr, &value)| (addr, value))
            .collect();
        cells.sort_unstable();
        cells
    }

    pub fn output_text(&self) -> String {
        self.output.iter().map(|&b| (b as u8) as char).collect()
    }
}

/// Run a listing from `main` until `ebreak`.
pub fn run(listing: &str, input: Vec<i32>, max_steps: usize) -> Machine {
    let (lines, labels) = parse_listing(listing);
    let target = |name: &str| -> usize {
        *labels
            .get(name)
            .unwrap_or_else(|| panic!("jump to unknown label {name}"))
    };
    let mut m = Machine::new(input);
    let mut pc = target("main");

    loop {
        assert!(m.steps < max_steps, "step limit exceeded");
        m.steps += 1;
        let Line::Op(op, ops) = &lines[pc] else {
            pc += 1;
            continue;
        };
        let r = |i: usize| ops[i].as_str();
        let imm = |i: usize| -> i32 { ops[i].parse().expect("immediate") };
        let mut next = pc + 1;
        match op.as_str() {
            "ebreak" => return m,
            "nop" => {}
            "li" => m.write(r(0), imm(1)),
            "la" => m.write(r(0), target(r(1)) as i32),
            "mv" | "fmv" | "fmv.w.x" => {
                let v = m.reg(r(1));
                m.write(r(0), v)
            }
            "add" => m.write(r(0), m.reg(r(1)).wrapping_add(m.reg(r(2)))),
            "sub" => m.write(r(0), m.reg(r(1)).wrapping_sub(m.reg(r(2)))),
            "or" => m.write(r(0), m.reg(r(1)) | m.reg(r(2))),
            "sll" => m.write(r(0), m.reg(r(1)).wrapping_shl(m.reg(r(2)) as u32)),
            "srl" => m.write(r(0), ((m.reg(r(1)) as u32) >> (m.reg(r(2)) as u32 & 31)) as i32),
            "addi" => m.write(r(0), m.reg(r(1)).wrapping_add(imm(2))),
            "slli" => m.write(r(0), m.reg(r(1)).wrapping_shl(imm(2) as u32)),
            "srli" => m.write(r(0), ((m.reg(r(1)) as u32) >> imm(2)) as i32),
            "fli" => {
                let v: f32 = ops[1].parse().expect("float immediate");
                m.fwrite(r(0), v)
            }
            "fadd" => m.fwrite(r(0), m.freg(r(1)) + m.freg(r(2))),
            "fsub" => m.fwrite(r(0), m.freg(r(1)) - m.freg(r(2))),
            "fmul" => m.fwrite(r(0), m.freg(r(1)) * m.freg(r(2))),
            "fdiv" => m.fwrite(r(0), m.freg(r(1)) / m.freg(r(2))),
            "fneg" => m.fwrite(r(0), -m.freg(r(1))),
            "fsgnj" => m.fwrite(r(0), m.freg(r(1)).copysign(m.freg(r(2)))),
            "fsgnjn" => m.fwrite(r(0), m.freg(r(1)).copysign(-m.freg(r(2)))),
            "fsgnjx" => {
                let sign = m.reg(r(2)) & i32::MIN;
                m.write(r(0), m.reg(r(1)) ^ sign)
            }
            "fcvt.s.w" => m.fwrite(r(0), m.reg(r(1)) as f32),
            "fcvt.w.s" => m.write(r(0), m.freg(r(1)).round() as i32),
            "flt" => m.write(r(0), (m.freg(r(1)) < m.freg(r(2))) as i32),
            "fle" => m.write(r(0), (m.freg(r(1)) <= m.freg(r(2))) as i32),
            "feq" => m.write(r(0), (m.freg(r(1)) == m.freg(r(2))) as i32),
            "lw" | "flw" => {
                let (off, base) = memory_operand(r(1));
                let v = m.load(m.reg(&base) + off);
                m.write(r(0), v)
            }
            "sw" | "fsw" => {
                let (off, base) = memory_operand(r(1));
                m.store(m.reg(&base) + off, m.reg(r(0)))
            }
            "vlw" | "vsw" => {
                let (off, base) = memory_operand(r(4));
                let addr = m.reg(&base) + off;
                let mask: Vec<bool> = ops[5].chars().map(|c| c == '1').collect();
                for lane in 0..4 {
                    if !mask[lane] {
                        continue;
                    }
                    let lane_addr = addr + 4 * lane as i32;
                    if op == "vlw" {
                        let v = m.load(lane_addr);
                        m.write(r(lane), v);
                    } else {
                        m.store(lane_addr, m.reg(r(lane)));
                    }
                }
            }
            "beq" | "bge" | "blt" => {
                let (a, b) = (m.reg(r(0)), m.reg(r(1)));
                let taken = match op.as_str() {
                    "beq" => a == b,
                    "bge" => a >= b,
                    _ => a < b,
                };
                if taken {
                    next = target(r(2));
                }
            }
            "bfeq" | "bfle" | "bflt" => {
                let (a, b) = (m.freg(r(0)), m.freg(r(1)));
                let taken = match op.as_str() {
                    "bfeq" => a == b,
                    "bfle" => a <= b,
                    _ => a < b,
                };
                if taken {
                    next = target(r(2));
                }
            }
            "j" => next = target(r(0)),
            "call" => {
                m.write("ra", next as i32);
                next = target(r(0));
            }
            "jalr" if ops.len() == 1 => {
                m.write("ra", next as i32);
                next = m.reg(r(0)) as usize;
            }
            "jalr" => {
                let (off, base) = memory_operand(r(1));
                let dest = (m.reg(&base) + off) as usize;
                m.write(r(0), next as i32);
                next = dest;
            }
            "ret" => {
                let ra = m.reg("ra");
                assert_ne!(ra, RETURN_SENTINEL, "return from main");
                next = ra as usize;
            }
            other => panic!("unsupported instruction `{other}` at line {pc}"),
        }
        pc = next;
    }
}
