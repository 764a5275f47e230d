//! Constant-register propagation.
//!
//! The target keeps 0, 1, 2 and 3 in `x0`, `x25`, `x26`, `x27` and 0.0, 1.0, 2.0 in `f25`,
//! `f26`, `f27`. A variable bound to one of those literals is replaced by the register name
//! in later operand positions, so the binding usually becomes dead and the allocator never
//! sees it.

use hashbrown::HashMap;

use super::{Expr, Var};

/// Hard-wired register holding an integer literal.
pub fn int_register(value: i32) -> Option<&'static str> {
    match value {
        0 => Some("x0"),
        1 => Some("x25"),
        2 => Some("x26"),
        3 => Some("x27"),
        _ => None,
    }
}

/// Hard-wired register holding a float literal.
pub fn float_register(value: f64) -> Option<&'static str> {
    if value == 0.0 {
        Some("f25")
    } else if value == 1.0 {
        Some("f26")
    } else if value == 2.0 {
        Some("f27")
    } else {
        None
    }
}

/// Rewrite `expr`, substituting constant registers for variables bound to their values.
///
/// Operands of array `Get`/`Put` are left alone unless `propagate_array_operands` is set:
/// address folding after lowering only recognises constants through their defining `li`.
pub fn propagate(expr: &Expr, propagate_array_operands: bool) -> Expr {
    let mut pass = ConstRegPass {
        env: HashMap::new(),
        propagate_array_operands,
    };
    pass.rewrite(expr)
}

struct ConstRegPass {
    env: HashMap<Var, Var>,
    propagate_array_operands: bool,
}

impl ConstRegPass {
    fn subst(&self, var: &Var) -> Var {
        self.env.get(var).cloned().unwrap_or_else(|| var.clone())
    }

    fn subst_array(&self, var: &Var) -> Var {
        if self.propagate_array_operands {
            self.subst(var)
        } else {
            var.clone()
        }
    }

    /// Rewrite `body` with `var` temporarily bound to `reg`.
    fn with_binding(&mut self, var: &Var, reg: Option<&'static str>, body: &Expr) -> Expr {
        let Some(reg) = reg else {
            // A shadowing binding hides any outer alias.
            let previous = self.env.remove(var);
            let out = self.rewrite(body);
            if let Some(previous) = previous {
                self.env.insert(var.clone(), previous);
            }
            return out;
        };
        let previous = self.env.insert(var.clone(), Var::from(reg));
        let out = self.rewrite(body);
        match previous {
            Some(previous) => self.env.insert(var.clone(), previous),
            None => self.env.remove(var),
        };
        out
    }

    fn rewrite(&mut self, expr: &Expr) -> Expr {
        match expr {
            Expr::Var(x) => Expr::Var(self.subst(x)),
            Expr::Unary(op, x) => Expr::Unary(*op, self.subst(x)),
            Expr::Binary(op, x, y) => Expr::Binary(*op, self.subst(x), self.subst(y)),
            Expr::If(cmp, x, y, e1, e2) => Expr::If(
                *cmp,
                self.subst(x),
                self.subst(y),
                Box::new(self.rewrite(e1)),
                Box::new(self.rewrite(e2)),
            ),
            Expr::Let((x, ty), e1, e2) => {
                let reg = match **e1 {
                    Expr::Int(n) => int_register(n),
                    Expr::Float(v) => float_register(v),
                    _ => None,
                };
                let e1 = self.rewrite(e1);
                let e2 = self.with_binding(x, reg, e2);
                Expr::Let((x.clone(), ty.clone()), Box::new(e1), Box::new(e2))
            }
            Expr::MakeCls(binding, closure, body) => {
                let body = self.with_binding(&binding.0, None, body);
                Expr::MakeCls(binding.clone(), closure.clone(), Box::new(body))
            }
            Expr::LetTuple(bindings, tuple, body) => {
                let tuple = tuple.clone();
                let mut hidden = Vec::new();
                for (name, _) in bindings {
                    if let Some(previous) = self.env.remove(name) {
                        hidden.push((name.clone(), previous));
                    }
                }
                let body = self.rewrite(body);
                self.env.extend(hidden);
                Expr::LetTuple(bindings.clone(), tuple, Box::new(body))
            }
            Expr::Tuple(items) => Expr::Tuple(items.iter().map(|v| self.subst(v)).collect()),
            Expr::Get(array, index) => Expr::Get(self.subst_array(array), self.subst_array(index)),
            Expr::Put(array, index, value) => Expr::Put(
                self.subst_array(array),
                self.subst_array(index),
                self.subst_array(value),
            ),
            Expr::Unit
            | Expr::Int(_)
            | Expr::Float(_)
            | Expr::AppCls(..)
            | Expr::AppDir(..)
            | Expr::ExtArray(_) => expr.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::parser::parse_expr;

    #[test]
    fn test_small_literals_become_registers() {
        let e = parse_expr("Let((x.1,int),Int(3),Let((y.2,int),Int(4),Add(x.1,y.2)))").unwrap();
        let out = propagate(&e, false);
        let expected =
            parse_expr("Let((x.1,int),Int(3),Let((y.2,int),Int(4),Add(x27,y.2)))").unwrap();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_float_literals_and_conditionals() {
        let e = parse_expr(
            "Let((z.1,float),Float(0.),IfLE(z.1,a.2,Var(z.1),FAdd(a.2,z.1)))",
        )
        .unwrap();
        let out = propagate(&e, false);
        let expected = parse_expr(
            "Let((z.1,float),Float(0.),IfLE(f25,a.2,Var(f25),FAdd(a.2,f25)))",
        )
        .unwrap();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_array_operands_follow_option() {
        let e = parse_expr("Let((i.1,int),Int(1),Get(arr.2,i.1))").unwrap();
        assert_eq!(propagate(&e, false), e);
        let on = propagate(&e, true);
        assert_eq!(
            on,
            parse_expr("Let((i.1,int),Int(1),Get(arr.2,x25))").unwrap()
        );
    }

    #[test]
    fn test_shadowing_hides_alias() {
        let e = parse_expr(
            "Let((x.1,int),Int(0),Let((x.1,int),Int(9),Var(x.1)))",
        )
        .unwrap();
        assert_eq!(propagate(&e, false), e);
    }

    #[test]
    fn test_call_arguments_untouched() {
        let e = parse_expr("Let((x.1,int),Int(2),AppDir(f.3,[x.1]))").unwrap();
        assert_eq!(propagate(&e, false), e);
    }
}
