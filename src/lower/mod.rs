// This module lowers closure-converted expressions into virtual instructions using
// destination passing: every expression is lowered together with the register that should
// receive its value, or with no destination when the value is unused, so no placeholder
// register ever has to be patched afterwards. Control flow becomes a conditional branch,
// the else-arm, a jump over the then-arm, and the then/endif labels. Closures and tuples
// are bump-allocated from the heap pointer; array accesses compute `base + 4 * index`
// explicitly so address folding can later recognise them. Function bodies start with
// parameter and free-variable markers and end in a return pseudo-op; the top-level body
// starts by claiming the static heap area and initialising the constant registers.

//! Lowering from the closure IR to virtual instructions.

use hashbrown::HashMap;

use crate::core::error::{CompileError, CompileResult};
use crate::core::instr::{Instr, Opcode, Operand, Reg, Var};
use crate::core::register_file::{AsmReg, RegClass, WORD_SIZE};
use crate::ir::{reserved_class, BinaryOp, Comparison, Expr, FunDef, Type, UnaryOp};

pub mod const_fold;

/// Label of the top-level body.
pub const MAIN_LABEL: &str = "main";

/// Labels of the `n`-th conditional.
pub fn if_labels(n: usize) -> (Var, Var) {
    (format!("then{n}").into(), format!("endif{n}").into())
}

/// The `endif` label matching a `then` label.
pub fn endif_of(then_label: &str) -> Option<Var> {
    then_label
        .strip_prefix("then")
        .filter(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
        .map(|n| Var::from(format!("endif{n}")))
}

/// Variable types of the body being lowered.
#[derive(Debug, Default)]
struct TypeEnv {
    types: HashMap<Var, Type>,
}

impl TypeEnv {
    fn insert(&mut self, name: &Var, ty: &Type) {
        self.types.insert(name.clone(), ty.clone());
    }

    /// Register class of a variable; `None` for unit.
    fn class_of(&self, name: &Var, context: &str) -> CompileResult<Option<RegClass>> {
        if let Some(class) = reserved_class(name) {
            return Ok(Some(class));
        }
        self.types
            .get(name)
            .map(Type::class)
            .ok_or_else(|| CompileError::UndefinedVariable {
                name: name.to_string(),
                context: context.to_string(),
            })
    }

    fn reg(&self, name: &Var, context: &str) -> CompileResult<Option<Reg>> {
        Ok(self
            .class_of(name, context)?
            .map(|class| Reg::new(name.clone(), class)))
    }
}

/// Lowering context for one program. Label and temporary counters span all bodies so
/// every label in the listing is unique.
#[derive(Debug, Default)]
pub struct Lowering {
    counter: usize,
    env: TypeEnv,
    context: String,
}

impl Lowering {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> usize {
        self.counter += 1;
        self.counter
    }

    /// A lowering temporary; the `%` prefix keeps it apart from front-end names.
    fn temp(&mut self, prefix: &str, class: RegClass) -> Reg {
        let id = self.next_id();
        Reg::new(format!("%{prefix}.{id}"), class)
    }

    /// Operand registers split into integers then floats, unit values dropped.
    fn split_by_class(&self, vars: &[Var]) -> CompileResult<Vec<Reg>> {
        let mut ints = Vec::new();
        let mut floats = Vec::new();
        for var in vars {
            match self.env.reg(var, &self.context)? {
                Some(reg) if reg.class == RegClass::Float => floats.push(reg),
                Some(reg) => ints.push(reg),
                None => {}
            }
        }
        ints.extend(floats);
        Ok(ints)
    }

    fn split_bindings(bindings: &[(Var, Type)]) -> Vec<Reg> {
        let regs = bindings
            .iter()
            .filter_map(|(name, ty)| ty.class().map(|c| Reg::new(name.clone(), c)));
        let (ints, floats): (Vec<_>, Vec<_>) = regs.partition(|r| r.class == RegClass::Int);
        ints.into_iter().chain(floats).collect()
    }

    /// Lower one function definition.
    pub fn lower_fundef(&mut self, def: &FunDef) -> CompileResult<Vec<Instr>> {
        let (name, fun_ty) = &def.name;
        log::debug!("lowering function {name}");
        self.env = TypeEnv::default();
        self.context = name.to_string();
        self.env.insert(name, fun_ty);
        for (arg, ty) in def.args.iter().chain(&def.formal_fv) {
            self.env.insert(arg, ty);
        }

        let mut out = vec![Instr::label(name.clone())];
        for param in Self::split_bindings(&def.args) {
            out.push(Instr::new(Opcode::Param, vec![param.into()]));
        }
        for (index, fv) in Self::split_bindings(&def.formal_fv).into_iter().enumerate() {
            let offset = WORD_SIZE * (index as i32 + 1);
            out.push(Instr::new(Opcode::FormalFv, vec![fv.into(), offset.into()]));
        }
        out.push(Instr::mv(Reg::int(name.clone()), Reg::phys(AsmReg::CLOSURE)));

        match def.return_type().class() {
            Some(class) => {
                let ret = self.temp("ret", class);
                self.lower_into(&def.body, Some(&ret), &mut out)?;
                out.push(Instr::new(Opcode::Return, vec![ret.into()]));
            }
            None => {
                self.lower_into(&def.body, None, &mut out)?;
                out.push(Instr::new(Opcode::ReturnUnit, Vec::new()));
            }
        }
        Ok(out)
    }

    /// Lower the top-level expression, preceded by heap and constant-register setup.
    pub fn lower_main(&mut self, body: &Expr, first_hp: i32) -> CompileResult<Vec<Instr>> {
        log::debug!("lowering top-level body");
        self.env = TypeEnv::default();
        self.context = MAIN_LABEL.to_string();

        let hp = Reg::phys(AsmReg::HP);
        let zero = Reg::phys(AsmReg::ZERO);
        let three = Reg::phys(AsmReg::THREE);
        let mut out = vec![
            Instr::label(MAIN_LABEL),
            Instr::rri(Opcode::Addi, hp.clone(), hp, first_hp),
            Instr::rr(Opcode::FmvWX, Reg::phys(AsmReg::FZERO), zero),
            // 1.0f32 and 2.0f32 bit patterns, staged through x27
            Instr::li(three.clone(), 0x3f80_0000),
            Instr::rr(Opcode::FmvWX, Reg::phys(AsmReg::FONE), three.clone()),
            Instr::li(three.clone(), 0x4000_0000),
            Instr::rr(Opcode::FmvWX, Reg::phys(AsmReg::FTWO), three.clone()),
            Instr::li(Reg::phys(AsmReg::ONE), 1),
            Instr::li(Reg::phys(AsmReg::TWO), 2),
            Instr::li(three, 3),
        ];
        self.lower_into(body, None, &mut out)?;
        Ok(out)
    }

    /// Lower `expr` with its value delivered to `dest`.
    pub fn lower_expr(&mut self, expr: &Expr, dest: Option<&Reg>) -> CompileResult<Vec<Instr>> {
        let mut out = Vec::new();
        self.lower_into(expr, dest, &mut out)?;
        Ok(out)
    }

    fn operand(&self, var: &Var) -> CompileResult<Reg> {
        Ok(self
            .env
            .reg(var, &self.context)?
            .unwrap_or_else(|| Reg::int(var.clone())))
    }

    fn lower_into(
        &mut self,
        expr: &Expr,
        dest: Option<&Reg>,
        out: &mut Vec<Instr>,
    ) -> CompileResult<()> {
        match expr {
            Expr::Unit => {}
            Expr::Int(n) => {
                if let Some(d) = dest {
                    out.push(Instr::li(d.clone(), *n));
                }
            }
            Expr::Float(v) => {
                if let Some(d) = dest {
                    if *v == 0.0 {
                        out.push(Instr::rr(Opcode::FmvWX, d.clone(), Reg::phys(AsmReg::ZERO)));
                    } else {
                        out.push(Instr::new(
                            Opcode::Fli,
                            vec![d.clone().into(), Operand::FImm(*v)],
                        ));
                    }
                }
            }
            Expr::Unary(op, x) => {
                if let Some(d) = dest {
                    let (opcode, class) = match op {
                        UnaryOp::Neg => (Opcode::Neg, RegClass::Int),
                        UnaryOp::FNeg => (Opcode::Fneg, RegClass::Float),
                    };
                    out.push(Instr::rr(opcode, d.clone(), Reg::new(x.clone(), class)));
                }
            }
            Expr::Binary(op, x, y) => {
                if let Some(d) = dest {
                    let (opcode, class) = match op {
                        BinaryOp::Add => (Opcode::Add, RegClass::Int),
                        BinaryOp::Sub => (Opcode::Sub, RegClass::Int),
                        BinaryOp::Mul => (Opcode::Sll, RegClass::Int),
                        BinaryOp::Div => (Opcode::Srl, RegClass::Int),
                        BinaryOp::FAdd => (Opcode::Fadd, RegClass::Float),
                        BinaryOp::FSub => (Opcode::Fsub, RegClass::Float),
                        BinaryOp::FMul => (Opcode::Fmul, RegClass::Float),
                        BinaryOp::FDiv => (Opcode::Fdiv, RegClass::Float),
                    };
                    out.push(Instr::rrr(
                        opcode,
                        d.clone(),
                        Reg::new(x.clone(), class),
                        Reg::new(y.clone(), class),
                    ));
                }
            }
            Expr::If(cmp, x, y, then_e, else_e) => {
                self.lower_if(*cmp, x, y, then_e, else_e, dest, out)?;
            }
            Expr::Let((x, ty), e1, e2) => {
                let target = ty.class().map(|class| Reg::new(x.clone(), class));
                self.lower_into(e1, target.as_ref(), out)?;
                self.env.insert(x, ty);
                self.lower_into(e2, dest, out)?;
            }
            Expr::Var(x) => {
                if let Some(d) = dest {
                    out.push(Instr::mv(d.clone(), Reg::new(x.clone(), d.class)));
                }
            }
            Expr::MakeCls((x, ty), closure, body) => {
                self.env.insert(x, ty);
                let cls = Reg::int(x.clone());
                let hp = Reg::phys(AsmReg::HP);
                let fvs = self.split_by_class(&closure.actual_fv)?;
                let size = WORD_SIZE * (fvs.len() as i32 + 1);
                let code = self.temp("makecls", RegClass::Int);
                out.push(Instr::mv(cls.clone(), hp.clone()));
                out.push(Instr::rri(Opcode::Addi, hp.clone(), hp, size));
                out.push(Instr::la(code.clone(), closure.entry.clone()));
                out.push(Instr::store(cls.clone(), code, 0));
                for (index, fv) in fvs.into_iter().enumerate() {
                    out.push(Instr::store(cls.clone(), fv, WORD_SIZE * (index as i32 + 1)));
                }
                self.lower_into(body, dest, out)?;
            }
            Expr::AppCls(f, args) => {
                let mut operands: Vec<Operand> = Vec::new();
                let op = match dest {
                    Some(d) => {
                        operands.push(d.clone().into());
                        Opcode::CallClsRet
                    }
                    None => Opcode::CallCls,
                };
                operands.push(Reg::int(f.clone()).into());
                operands.extend(self.split_by_class(args)?.into_iter().map(Operand::from));
                out.push(Instr::new(op, operands));
            }
            Expr::AppDir(label, args) => {
                let mut operands: Vec<Operand> = Vec::new();
                let op = match dest {
                    Some(d) => {
                        operands.push(d.clone().into());
                        Opcode::CallDirRet
                    }
                    None => Opcode::CallDir,
                };
                operands.push(Operand::Label(label.clone()));
                operands.extend(self.split_by_class(args)?.into_iter().map(Operand::from));
                out.push(Instr::new(op, operands));
            }
            Expr::Tuple(items) => {
                if let Some(d) = dest {
                    let fields = self.split_by_class(items)?;
                    let tuple = self.temp("tuple", RegClass::Int);
                    let hp = Reg::phys(AsmReg::HP);
                    out.push(Instr::mv(tuple.clone(), hp.clone()));
                    out.push(Instr::rri(
                        Opcode::Addi,
                        hp.clone(),
                        hp,
                        WORD_SIZE * fields.len() as i32,
                    ));
                    for (index, field) in fields.into_iter().enumerate() {
                        out.push(Instr::store(tuple.clone(), field, WORD_SIZE * index as i32));
                    }
                    out.push(Instr::mv(d.clone(), tuple));
                }
            }
            Expr::LetTuple(bindings, tuple, body) => {
                for (name, ty) in bindings {
                    self.env.insert(name, ty);
                }
                let base = Reg::int(tuple.clone());
                for (index, field) in Self::split_bindings(bindings).into_iter().enumerate() {
                    out.push(Instr::load(field, base.clone(), WORD_SIZE * index as i32));
                }
                self.lower_into(body, dest, out)?;
            }
            Expr::Get(array, index) => {
                if let Some(d) = dest {
                    let scaled = self.temp("get", RegClass::Int);
                    let addr = self.temp("get", RegClass::Int);
                    out.push(Instr::rri(
                        Opcode::Slli,
                        scaled.clone(),
                        Reg::int(index.clone()),
                        2,
                    ));
                    out.push(Instr::rrr(
                        Opcode::Add,
                        addr.clone(),
                        Reg::int(array.clone()),
                        scaled,
                    ));
                    out.push(Instr::load(d.clone(), addr, 0));
                }
            }
            Expr::Put(array, index, value) => {
                let value = self.env.reg(value, &self.context)?;
                if let Some(value) = value {
                    let scaled = self.temp("put", RegClass::Int);
                    let addr = self.temp("put", RegClass::Int);
                    out.push(Instr::rri(
                        Opcode::Slli,
                        scaled.clone(),
                        Reg::int(index.clone()),
                        2,
                    ));
                    out.push(Instr::rrr(
                        Opcode::Add,
                        addr.clone(),
                        Reg::int(array.clone()),
                        scaled,
                    ));
                    out.push(Instr::store(addr, value, 0));
                }
            }
            Expr::ExtArray(label) => {
                if let Some(d) = dest {
                    out.push(Instr::la(d.clone(), label.clone()));
                }
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn lower_if(
        &mut self,
        cmp: Comparison,
        x: &Var,
        y: &Var,
        then_e: &Expr,
        else_e: &Expr,
        dest: Option<&Reg>,
        out: &mut Vec<Instr>,
    ) -> CompileResult<()> {
        let lhs = self.operand(x)?;
        let rhs = self.operand(y)?;
        let is_float = lhs.class == RegClass::Float;
        let pick = |int_op, float_op| if is_float { float_op } else { int_op };

        // (opcode, first, second, taken arm, fallthrough arm)
        let (op, a, b, taken, fallthrough) = match cmp {
            Comparison::Eq => (pick(Opcode::Beq, Opcode::Bfeq), lhs, rhs, then_e, else_e),
            Comparison::Ne => (pick(Opcode::Beq, Opcode::Bfeq), lhs, rhs, else_e, then_e),
            Comparison::Le if is_float => (Opcode::Bfle, lhs, rhs, then_e, else_e),
            Comparison::Le => (Opcode::Bge, rhs, lhs, then_e, else_e),
            Comparison::Lt => (pick(Opcode::Blt, Opcode::Bflt), lhs, rhs, then_e, else_e),
        };

        let (then_label, endif_label) = if_labels(self.next_id());
        out.push(Instr::branch(op, a, b, then_label.clone()));
        self.lower_into(fallthrough, dest, out)?;
        out.push(Instr::jump(endif_label.clone()));
        out.push(Instr::label(then_label));
        self.lower_into(taken, dest, out)?;
        out.push(Instr::label(endif_label));
        Ok(())
    }
}
