//! Reader for the front end's textual IR dump.

use super::*;
use crate::core::error::{CompileError, CompileResult};

/// Parse a whole program dump.
pub fn parse_program(text: &str) -> CompileResult<Program> {
    let mut parser = Parser::new(text);
    let program = parser.parse_program()?;
    parser.skip_whitespace();
    if !parser.is_eof() {
        return Err(parser.error("trailing input after top-level expression"));
    }
    Ok(program)
}

/// Parse a single expression, as it appears after `t:`.
pub fn parse_expr(text: &str) -> CompileResult<Expr> {
    let mut parser = Parser::new(text);
    let expr = parser.parse_expr()?;
    parser.skip_whitespace();
    if !parser.is_eof() {
        return Err(parser.error("trailing input after expression"));
    }
    Ok(expr)
}

/// Parse a type string such as `Fun([int,float],())`.
pub fn parse_type(text: &str) -> CompileResult<Type> {
    Parser::new(text).parse_type()
}

struct Parser<'a> {
    text: &'a str,
    pos: usize,
}

const DELIMITERS: &[char] = &['(', ')', '[', ']', '{', '}', ',', ':'];

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn current_char(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.current_char() {
            self.pos += ch.len_utf8();
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char() {
            if !ch.is_whitespace() {
                break;
            }
            self.advance();
        }
    }

    fn error(&self, reason: impl Into<String>) -> CompileError {
        let consumed = &self.text[..self.pos.min(self.text.len())];
        let line = consumed.matches('\n').count() + 1;
        let column = consumed.len() - consumed.rfind('\n').map_or(0, |i| i + 1) + 1;
        CompileError::Parse {
            line,
            column,
            reason: reason.into(),
        }
    }

    fn try_read(&mut self, ch: char) -> bool {
        self.skip_whitespace();
        if self.current_char() == Some(ch) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, ch: char) -> CompileResult<()> {
        if self.try_read(ch) {
            Ok(())
        } else {
            let found = self
                .current_char()
                .map_or_else(|| "end of input".to_string(), |c| format!("`{c}`"));
            Err(self.error(format!("expected `{ch}`, found {found}")))
        }
    }

    fn peek(&mut self, ch: char) -> bool {
        self.skip_whitespace();
        self.current_char() == Some(ch)
    }

    /// A run of characters up to the next delimiter or whitespace.
    fn parse_token(&mut self) -> CompileResult<&'a str> {
        self.skip_whitespace();
        let start = self.pos;
        while let Some(ch) = self.current_char() {
            if ch.is_whitespace() || DELIMITERS.contains(&ch) {
                break;
            }
            self.advance();
        }
        if start == self.pos {
            return Err(self.error("expected a name"));
        }
        Ok(&self.text[start..self.pos])
    }

    fn expect_keyword(&mut self, keyword: &str) -> CompileResult<()> {
        let token = self.parse_token()?;
        if token == keyword {
            Ok(())
        } else {
            Err(self.error(format!("expected `{keyword}`, found `{token}`")))
        }
    }

    fn parse_var(&mut self) -> CompileResult<Var> {
        self.parse_token().map(Var::from)
    }

    /// `[item, item, ...]` with an optional trailing comma.
    fn parse_list<T>(
        &mut self,
        mut item: impl FnMut(&mut Self) -> CompileResult<T>,
    ) -> CompileResult<Vec<T>> {
        self.expect('[')?;
        let mut items = Vec::new();
        while !self.try_read(']') {
            items.push(item(self)?);
            if !self.try_read(',') {
                self.expect(']')?;
                break;
            }
        }
        Ok(items)
    }

    fn parse_program(&mut self) -> CompileResult<Program> {
        self.expect_keyword("first_hp")?;
        self.expect(':')?;
        let token = self.parse_token()?;
        let first_hp = token
            .parse()
            .map_err(|_| self.error(format!("invalid heap offset `{token}`")))?;

        self.expect_keyword("fundef")?;
        self.expect_keyword("list")?;
        self.expect(':')?;
        let fundefs = self.parse_list(Self::parse_fundef)?;

        self.expect_keyword("t")?;
        self.expect(':')?;
        let body = self.parse_expr()?;

        Ok(Program {
            first_hp,
            fundefs,
            body,
        })
    }

    fn parse_field(&mut self, name: &str) -> CompileResult<()> {
        self.expect_keyword(name)?;
        self.expect(':')
    }

    fn parse_fundef(&mut self) -> CompileResult<FunDef> {
        self.expect('{')?;
        self.parse_field("name")?;
        let name = self.parse_binding()?;
        self.expect(',')?;
        self.parse_field("args")?;
        let args = self.parse_list(Self::parse_binding)?;
        self.expect(',')?;
        self.parse_field("formal_fv")?;
        let formal_fv = self.parse_list(Self::parse_binding)?;
        self.expect(',')?;
        self.parse_field("body")?;
        let body = self.parse_expr()?;
        self.expect('}')?;
        Ok(FunDef {
            name,
            args,
            formal_fv,
            body,
        })
    }

    /// `(name,type)`
    fn parse_binding(&mut self) -> CompileResult<(Var, Type)> {
        self.expect('(')?;
        let name = self.parse_var()?;
        self.expect(',')?;
        let ty = self.parse_type()?;
        self.expect(')')?;
        Ok((name, ty))
    }

    fn parse_type(&mut self) -> CompileResult<Type> {
        if self.try_read('(') {
            self.expect(')')?;
            return Ok(Type::Unit);
        }
        let name = self.parse_token()?;
        let ty = match name {
            "unit" => Type::Unit,
            "bool" => Type::Bool,
            "int" => Type::Int,
            "float" => Type::Float,
            "Fun" => {
                self.expect('(')?;
                let args = self.parse_list(Self::parse_type)?;
                self.expect(',')?;
                let ret = self.parse_type()?;
                self.expect(')')?;
                Type::Fun(args, Box::new(ret))
            }
            "Tuple" => {
                self.expect('(')?;
                let items = self.parse_list(Self::parse_type)?;
                self.expect(')')?;
                Type::Tuple(items)
            }
            "Array" => {
                self.expect('(')?;
                let elem = self.parse_type()?;
                self.expect(')')?;
                Type::Array(Box::new(elem))
            }
            other => {
                if self.peek('(') {
                    self.skip_balanced()?;
                }
                Type::Other(other.to_string())
            }
        };
        Ok(ty)
    }

    /// Skip a parenthesised group of an unknown type constructor.
    fn skip_balanced(&mut self) -> CompileResult<()> {
        let mut depth = 0usize;
        while let Some(ch) = self.current_char() {
            self.advance();
            match ch {
                '(' | '[' => depth += 1,
                ')' | ']' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                _ => {}
            }
        }
        Err(self.error("unbalanced type arguments"))
    }

    fn parse_int(&mut self) -> CompileResult<i32> {
        let token = self.parse_token()?;
        token
            .parse()
            .map_err(|_| self.error(format!("invalid integer literal `{token}`")))
    }

    fn parse_float(&mut self) -> CompileResult<f64> {
        let token = self.parse_token()?;
        // OCaml prints integral floats as `3.`
        let normalized = if token.ends_with('.') {
            format!("{token}0")
        } else {
            token.to_string()
        };
        normalized
            .parse()
            .map_err(|_| self.error(format!("invalid float literal `{token}`")))
    }

    fn parse_two(&mut self) -> CompileResult<(Var, Var)> {
        let x = self.parse_var()?;
        self.expect(',')?;
        let y = self.parse_var()?;
        Ok((x, y))
    }

    fn parse_expr(&mut self) -> CompileResult<Expr> {
        let ctor = self.parse_token()?;
        if ctor == "Unit" {
            return Ok(Expr::Unit);
        }
        self.expect('(')?;
        let expr = match ctor {
            "Int" => Expr::Int(self.parse_int()?),
            "Float" => Expr::Float(self.parse_float()?),
            "Neg" => Expr::Unary(UnaryOp::Neg, self.parse_var()?),
            "FNeg" => Expr::Unary(UnaryOp::FNeg, self.parse_var()?),
            "Add" | "Sub" | "Mul" | "Div" | "FAdd" | "FSub" | "FMul" | "FDiv" => {
                let op = match ctor {
                    "Add" => BinaryOp::Add,
                    "Sub" => BinaryOp::Sub,
                    "Mul" => BinaryOp::Mul,
                    "Div" => BinaryOp::Div,
                    "FAdd" => BinaryOp::FAdd,
                    "FSub" => BinaryOp::FSub,
                    "FMul" => BinaryOp::FMul,
                    _ => BinaryOp::FDiv,
                };
                let (x, y) = self.parse_two()?;
                Expr::Binary(op, x, y)
            }
            "IfEq" | "IfNEq" | "IfLE" | "IfLT" => {
                let cmp = match ctor {
                    "IfEq" => Comparison::Eq,
                    "IfNEq" => Comparison::Ne,
                    "IfLE" => Comparison::Le,
                    _ => Comparison::Lt,
                };
                let (x, y) = self.parse_two()?;
                self.expect(',')?;
                let then_e = self.parse_expr()?;
                self.expect(',')?;
                let else_e = self.parse_expr()?;
                Expr::If(cmp, x, y, Box::new(then_e), Box::new(else_e))
            }
            "Let" => {
                let binding = self.parse_binding()?;
                self.expect(',')?;
                let e1 = self.parse_expr()?;
                self.expect(',')?;
                let e2 = self.parse_expr()?;
                Expr::Let(binding, Box::new(e1), Box::new(e2))
            }
            "Var" => Expr::Var(self.parse_var()?),
            "MakeCls" => {
                let binding = self.parse_binding()?;
                self.expect(',')?;
                let closure = self.parse_closure()?;
                self.expect(',')?;
                let body = self.parse_expr()?;
                Expr::MakeCls(binding, closure, Box::new(body))
            }
            "AppCls" | "AppDir" => {
                let callee = self.parse_var()?;
                self.expect(',')?;
                let args = self.parse_list(Self::parse_var)?;
                if ctor == "AppCls" {
                    Expr::AppCls(callee, args)
                } else {
                    Expr::AppDir(callee, args)
                }
            }
            "Tuple" => Expr::Tuple(self.parse_list(Self::parse_var)?),
            "LetTuple" => {
                let bindings = self.parse_list(Self::parse_binding)?;
                self.expect(',')?;
                let tuple = self.parse_var()?;
                self.expect(',')?;
                let body = self.parse_expr()?;
                Expr::LetTuple(bindings, tuple, Box::new(body))
            }
            "Get" => {
                let (array, index) = self.parse_two()?;
                Expr::Get(array, index)
            }
            "Put" => {
                let (array, index) = self.parse_two()?;
                self.expect(',')?;
                let value = self.parse_var()?;
                Expr::Put(array, index, value)
            }
            "ExtArray" => Expr::ExtArray(self.parse_var()?),
            other => return Err(self.error(format!("unknown expression `{other}`"))),
        };
        self.expect(')')?;
        Ok(expr)
    }

    /// `{entry:label,actual_fv:[..]}`
    fn parse_closure(&mut self) -> CompileResult<Closure> {
        self.expect('{')?;
        self.parse_field("entry")?;
        let entry = self.parse_var()?;
        self.expect(',')?;
        self.parse_field("actual_fv")?;
        let actual_fv = self.parse_list(Self::parse_var)?;
        self.expect('}')?;
        Ok(Closure { entry, actual_fv })
    }
}
