// This module drives graph-colouring register allocation for one function body. Each round
// solves liveness, builds one interference graph per register class and colours both with
// the allocation order of the body. When a class reports a spill, every definition of the
// spilled variable is followed by an abstract `store` to a slot named after the variable and
// every use is preceded by a `restore` into a fresh temporary, and the round starts over with
// the spilled variable and its temporaries barred from further spilling. Once both classes
// colour, definitions nobody reads are deleted, virtual names are replaced by physical ones,
// and a function's parameter registers are permuted into the argument order its callers use.

//! Register allocation.

pub mod graph;
pub mod liveness;

use hashbrown::{HashMap, HashSet};

use crate::core::error::{CompileError, CompileResult};
use crate::core::instr::{Effect, Instr, Opcode, Operand, Reg, Var};
use crate::core::register_file::{argument_count, AsmReg, RegClass, RegisterFile};
use graph::{color, Coloring, InterferenceGraph};
use liveness::{analyze, tracked_defs_uses, LiveSet};

/// Result of allocating one body.
#[derive(Debug, Clone)]
pub struct Allocation {
    /// Instructions over physical registers, `store`/`restore` pseudo-ops included.
    pub instrs: Vec<Instr>,
    /// Build iterations, the successful one included.
    pub rounds: usize,
    pub spilled_int: usize,
    pub spilled_float: usize,
}

/// Operand indices of the registers an instruction reads.
fn use_slots(instr: &Instr) -> Vec<usize> {
    let regs: Vec<usize> = instr
        .operands
        .iter()
        .enumerate()
        .filter(|(_, o)| matches!(o, Operand::Reg(_)))
        .map(|(i, _)| i)
        .collect();
    match instr.op.info().effect {
        Effect::DefFirst => regs.into_iter().skip(1).collect(),
        Effect::UseAll => regs,
        Effect::VectorLoad => regs.into_iter().take(1).collect(),
        Effect::IndirectJump if instr.operands.len() == 3 => regs.into_iter().skip(1).collect(),
        Effect::IndirectJump => regs,
        Effect::DefAll | Effect::None => Vec::new(),
    }
}

/// Every variable any instruction reads.
fn used_anywhere(instrs: &[Instr]) -> LiveSet {
    let mut used = LiveSet::default();
    for instr in instrs {
        used.extend(&tracked_defs_uses(instr).1);
    }
    used
}

/// Insert an unused-parameter marker after the parameter markers for every parameter the
/// body never reads, so each parameter keeps a register of its own.
pub fn mark_unused_params(mut instrs: Vec<Instr>) -> Vec<Instr> {
    let Some(first) = instrs.iter().position(|i| i.op == Opcode::Param) else {
        return instrs;
    };
    let end = instrs[first..]
        .iter()
        .position(|i| i.op != Opcode::Param)
        .map_or(instrs.len(), |n| first + n);

    let used = used_anywhere(&instrs);
    let unused: Vec<Instr> = instrs[first..end]
        .iter()
        .filter_map(|i| i.reg(0))
        .filter(|r| !used.contains(r))
        .map(|r| Instr::new(Opcode::UnusedParam, vec![r.clone().into()]))
        .collect();
    if !unused.is_empty() {
        log::trace!("{} unused parameter(s)", unused.len());
        instrs.splice(end..end, unused);
    }
    instrs
}

/// Rewrites spilled variables into slot traffic.
#[derive(Debug, Default)]
struct SpillRewriter {
    reloads: usize,
    no_spill: [HashSet<Var>; 2],
}

impl SpillRewriter {
    fn no_spill(&self, class: RegClass) -> &HashSet<Var> {
        &self.no_spill[class.bank() as usize]
    }

    fn spill(&mut self, instrs: Vec<Instr>, var: &Reg) -> Vec<Instr> {
        let slot = Operand::Label(var.name.clone());
        let barred = &mut self.no_spill[var.class.bank() as usize];
        barred.insert(var.name.clone());

        let mut out = Vec::with_capacity(instrs.len() + 4);
        for mut instr in instrs {
            let reads: Vec<usize> = use_slots(&instr)
                .into_iter()
                .filter(|&i| matches!(&instr.operands[i], Operand::Reg(r) if r == var))
                .collect();
            if !reads.is_empty() {
                self.reloads += 1;
                let temp = Reg::new(format!("%reload.{}", self.reloads), var.class);
                barred.insert(temp.name.clone());
                out.push(Instr::new(
                    Opcode::Restore,
                    vec![temp.clone().into(), slot.clone()],
                ));
                for i in reads {
                    instr.operands[i] = temp.clone().into();
                }
            }
            let defines = tracked_defs_uses(&instr).0.contains(var);
            out.push(instr);
            if defines {
                out.push(Instr::new(
                    Opcode::Store,
                    vec![var.clone().into(), slot.clone()],
                ));
            }
        }
        out
    }
}

/// Whether deleting an instruction whose definitions are all dead changes nothing else.
fn is_pure(op: Opcode) -> bool {
    use Opcode::*;
    matches!(
        op,
        Li | Fli
            | La
            | Mv
            | Fmv
            | FmvWX
            | Neg
            | Fneg
            | Fabs
            | Fsqrt
            | FcvtSW
            | FcvtWS
            | Addi
            | Slli
            | Srli
            | Add
            | Sub
            | Sll
            | Srl
            | Fadd
            | Fsub
            | Fmul
            | Fdiv
            | Feq
            | Fle
            | Flt
            | Fsgnj
            | Fsgnjn
            | Fsgnjx
            | Lw
            | Flw
            | Lwi
            | Flwi
            | Restore
            | FormalFv
    )
}

/// Delete instructions whose defined variable nobody reads; value-returning calls with an
/// unread result become plain calls.
fn remove_dead_defs(mut instrs: Vec<Instr>) -> Vec<Instr> {
    loop {
        let used = used_anywhere(&instrs);
        let before = instrs.len();
        let mut changed = false;
        instrs.retain_mut(|instr| {
            let defs = tracked_defs_uses(instr).0;
            if defs.is_empty() || defs.regs().iter().any(|r| used.contains(r)) {
                return true;
            }
            match instr.op {
                Opcode::CallDirRet | Opcode::CallClsRet => {
                    instr.op = if instr.op == Opcode::CallDirRet {
                        Opcode::CallDir
                    } else {
                        Opcode::CallCls
                    };
                    instr.operands.remove(0);
                    changed = true;
                    true
                }
                op => !is_pure(op),
            }
        });
        if instrs.len() == before && !changed {
            return instrs;
        }
        log::trace!("removed {} dead definition(s)", before - instrs.len());
    }
}

/// Replace every allocatable name with its colour.
fn rename(instrs: &mut [Instr], colors: &[HashMap<Var, AsmReg>; 2]) -> CompileResult<()> {
    for instr in instrs.iter_mut() {
        for reg in instr.regs_mut() {
            if reg.is_reserved() {
                continue;
            }
            let phys = colors[reg.class.bank() as usize]
                .get(&reg.name)
                .ok_or_else(|| CompileError::UnassignedRegister {
                    var: reg.name.to_string(),
                })?;
            reg.name = Var::from(phys.name());
        }
    }
    Ok(())
}

/// Allocate physical registers for one body with the colour order of `file`.
pub fn allocate(instrs: Vec<Instr>, file: &RegisterFile) -> CompileResult<Allocation> {
    let mut instrs = mark_unused_params(instrs);
    let mut rewriter = SpillRewriter::default();
    let (mut spilled_int, mut spilled_float) = (0, 0);
    let mut rounds = 0;

    let colors = loop {
        rounds += 1;
        let liveness = analyze(&instrs)?;
        let mut colors: [HashMap<Var, AsmReg>; 2] = Default::default();
        let mut spills = Vec::new();
        let mut variables = 0;

        for class in [RegClass::Int, RegClass::Float] {
            let graph = InterferenceGraph::build(&liveness, class);
            variables += graph.len();
            match color(&graph, file.order(class), rewriter.no_spill(class))? {
                Coloring::Colored(map) => colors[class.bank() as usize] = map,
                Coloring::Spill(var) => spills.push(Reg::new(var, class)),
            }
        }
        if spills.is_empty() {
            break colors;
        }
        // Every round bars at least one new variable, and reload temporaries only add more.
        if rounds > variables + rewriter.reloads + 1 {
            return Err(CompileError::RegisterAllocation {
                reason: format!("no colouring after {rounds} rounds"),
            });
        }
        for var in spills {
            log::trace!("spilling {} ({})", var.name, var.class.name());
            match var.class {
                RegClass::Int => spilled_int += 1,
                RegClass::Float => spilled_float += 1,
            }
            instrs = rewriter.spill(instrs, &var);
        }
    };

    let mut instrs = remove_dead_defs(instrs);
    rename(&mut instrs, &colors)?;
    log::debug!(
        "allocated {} instructions in {rounds} round(s), spilled {spilled_int} int and {spilled_float} float",
        instrs.len()
    );
    Ok(Allocation {
        instrs,
        rounds,
        spilled_int,
        spilled_float,
    })
}

/// Permute registers of an allocated function so its `i`-th of `n` integer parameters sits
/// in `a{n-i}` and its `i`-th of `n` float parameters in `fa{n-1-i}`, the registers call
/// sites load. Registers displaced from those slots take the parameters' old registers, so
/// the renaming is a bijection and preserves the colouring.
pub fn assign_param_registers(instrs: &mut [Instr], function: &str) -> CompileResult<()> {
    let mut mapping: HashMap<Var, Var> = HashMap::new();
    for class in [RegClass::Int, RegClass::Float] {
        let params: Vec<Var> = instrs
            .iter()
            .filter(|i| i.op == Opcode::Param)
            .filter_map(|i| i.reg(0))
            .filter(|r| r.class == class)
            .map(|r| r.name.clone())
            .collect();
        let n = params.len();
        if n > argument_count(class) {
            return Err(CompileError::TooManyArguments {
                callee: function.to_string(),
                class: class.name(),
                count: n,
                max: argument_count(class),
            });
        }
        let targets: Vec<Var> = (0..n)
            .filter_map(|i| AsmReg::argument(class, n - 1 - i))
            .map(|r| Var::from(r.name()))
            .collect();

        let displaced = targets.iter().filter(|t| !params.contains(t));
        let vacated = params.iter().filter(|p| !targets.contains(p));
        for (from, to) in displaced.zip(vacated) {
            mapping.insert(from.clone(), to.clone());
        }
        for (from, to) in params.iter().zip(&targets) {
            mapping.insert(from.clone(), to.clone());
        }
    }

    if mapping.iter().all(|(from, to)| from == to) {
        return Ok(());
    }
    for instr in instrs.iter_mut() {
        for reg in instr.regs_mut() {
            if let Some(to) = mapping.get(&reg.name) {
                reg.name = to.clone();
            }
        }
    }
    Ok(())
}
