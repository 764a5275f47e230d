//! Closure-converted IR consumed by the back end.
//!
//! The front end hands over a [`Program`]: a list of closed function definitions and a
//! top-level expression, all in A-normal form (every operand is a variable name). Types
//! matter to the back end only through their register class, see [`Type::class`].
//!
//! # Dump format
//!
//! ```text
//! first_hp : 16
//! fundef list:
//! [{name:(f.1,Fun([int],int)),args:[(x.2,int),],formal_fv:[],body:Add(x.2,x.2)},]
//! t:
//! Let((r.3,int),Int(4),AppDir(f.1,[r.3,]))
//! ```

use std::fmt;

use crate::core::instr::Var;
use crate::core::register_file::{AsmReg, RegClass};

pub mod const_reg;
pub mod parser;

pub use parser::parse_program;

#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Unit,
    Bool,
    Int,
    Float,
    Fun(Vec<Type>, Box<Type>),
    Tuple(Vec<Type>),
    Array(Box<Type>),
    /// Any other front-end type; handled as a word-sized integer.
    Other(String),
}

impl Type {
    /// Register class of a value of this type; `None` for unit, which occupies no register.
    pub fn class(&self) -> Option<RegClass> {
        match self {
            Type::Unit => None,
            Type::Float => Some(RegClass::Float),
            _ => Some(RegClass::Int),
        }
    }

    /// Result type of a function type.
    pub fn return_type(&self) -> Option<&Type> {
        match self {
            Type::Fun(_, ret) => Some(ret),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list(f: &mut fmt::Formatter<'_>, items: &[Type]) -> fmt::Result {
            f.write_str("[")?;
            for (i, t) in items.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{t}")?;
            }
            f.write_str("]")
        }
        match self {
            Type::Unit => f.write_str("()"),
            Type::Bool => f.write_str("bool"),
            Type::Int => f.write_str("int"),
            Type::Float => f.write_str("float"),
            Type::Fun(args, ret) => {
                f.write_str("Fun(")?;
                list(f, args)?;
                write!(f, ",{ret})")
            }
            Type::Tuple(items) => {
                f.write_str("Tuple(")?;
                list(f, items)?;
                f.write_str(")")
            }
            Type::Array(elem) => write!(f, "Array({elem})"),
            Type::Other(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    FNeg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    /// Left shift; the front end emits it only for power-of-two scaling.
    Mul,
    /// Logical right shift, the counterpart of [`BinaryOp::Mul`].
    Div,
    FAdd,
    FSub,
    FMul,
    FDiv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Le,
    Lt,
}

/// A closure value: code label plus captured variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Closure {
    pub entry: Var,
    pub actual_fv: Vec<Var>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Unit,
    Int(i32),
    Float(f64),
    Unary(UnaryOp, Var),
    Binary(BinaryOp, Var, Var),
    /// `if x <cmp> y then e1 else e2`
    If(Comparison, Var, Var, Box<Expr>, Box<Expr>),
    Let((Var, Type), Box<Expr>, Box<Expr>),
    Var(Var),
    MakeCls((Var, Type), Closure, Box<Expr>),
    AppCls(Var, Vec<Var>),
    AppDir(Var, Vec<Var>),
    Tuple(Vec<Var>),
    LetTuple(Vec<(Var, Type)>, Var, Box<Expr>),
    Get(Var, Var),
    Put(Var, Var, Var),
    ExtArray(Var),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunDef {
    pub name: (Var, Type),
    pub args: Vec<(Var, Type)>,
    pub formal_fv: Vec<(Var, Type)>,
    pub body: Expr,
}

impl FunDef {
    pub fn return_type(&self) -> &Type {
        self.name.1.return_type().unwrap_or(&Type::Unit)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    /// Heap bytes already claimed by statically allocated data.
    pub first_hp: i32,
    pub fundefs: Vec<FunDef>,
    pub body: Expr,
}

/// Register class of a name that already denotes a fixed-role register.
pub fn reserved_class(name: &str) -> Option<RegClass> {
    let reg = AsmReg::from_name(name)?;
    crate::core::register_file::is_reserved(name).then(|| reg.class())
}
