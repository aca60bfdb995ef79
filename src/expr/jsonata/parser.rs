//! Pratt parser producing the JSONata expression AST.

use super::lexer::{Token, tokenize};

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Expr {
    Number(f64),
    Str(String),
    Bool(bool),
    Null,
    /// `$` — the current evaluation context.
    Context,
    /// `$$` — the root evaluation context.
    Root,
    /// `$name` — a bound variable.
    Var(String),
    /// A bare field name, applied to the current context.
    Name(String),
    /// `lhs.rhs` — evaluate `rhs` with `lhs` as context, mapping over arrays.
    Map(Box<Expr>, Box<Expr>),
    /// `base[pred]` — positional index or filter predicate.
    Index(Box<Expr>, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    Array(Vec<Expr>),
    Object(Vec<(Expr, Expr)>),
    /// `$name(args…)` — function application.
    Call(String, Vec<Expr>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Neg,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    And,
    Or,
}

pub(crate) fn parse(src: &str) -> Result<Expr, String> {
    let tokens = tokenize(src)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expr(0)?;
    if parser.pos != parser.tokens.len() {
        return Err(format!(
            "unexpected token '{}' after expression",
            parser.tokens[parser.pos]
        ));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, expected: &Token) -> Result<(), String> {
        match self.next() {
            Some(t) if &t == expected => Ok(()),
            Some(t) => Err(format!("expected '{expected}', found '{t}'")),
            None => Err(format!("expected '{expected}', found end of expression")),
        }
    }

    fn parse_expr(&mut self, min_bp: u8) -> Result<Expr, String> {
        let mut lhs = self.parse_prefix()?;
        loop {
            let Some(op) = self.peek() else { break };
            let bp = binding_power(op);
            // `<=` keeps binary operators left-associative; the ternary
            // re-enters with a lower bound below to stay right-associative.
            if bp == 0 || bp <= min_bp {
                break;
            }
            let op = self.next().expect("peeked token");
            lhs = match op {
                Token::Dot => {
                    let rhs = self.parse_expr(80)?;
                    Expr::Map(Box::new(lhs), Box::new(rhs))
                }
                Token::LBracket => {
                    let pred = self.parse_expr(0)?;
                    self.expect(&Token::RBracket)?;
                    Expr::Index(Box::new(lhs), Box::new(pred))
                }
                Token::Question => {
                    let then = self.parse_expr(0)?;
                    self.expect(&Token::Colon)?;
                    let els = self.parse_expr(19)?;
                    Expr::Ternary(Box::new(lhs), Box::new(then), Box::new(els))
                }
                other => {
                    let rhs = self.parse_expr(bp)?;
                    Expr::Binary(binary_op(&other)?, Box::new(lhs), Box::new(rhs))
                }
            };
        }
        Ok(lhs)
    }

    fn parse_prefix(&mut self) -> Result<Expr, String> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Str(s)) => Ok(Expr::Str(s)),
            Some(Token::True) => Ok(Expr::Bool(true)),
            Some(Token::False) => Ok(Expr::Bool(false)),
            Some(Token::Null) => Ok(Expr::Null),
            Some(Token::Ident(name)) => Ok(Expr::Name(name)),
            Some(Token::Var(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.next();
                    let args = self.parse_call_args()?;
                    Ok(Expr::Call(name, args))
                } else if name.is_empty() {
                    Ok(Expr::Context)
                } else if name == "$" {
                    Ok(Expr::Root)
                } else {
                    Ok(Expr::Var(name))
                }
            }
            Some(Token::Minus) => {
                let operand = self.parse_expr(75)?;
                Ok(Expr::Unary(UnaryOp::Neg, Box::new(operand)))
            }
            Some(Token::LParen) => {
                let inner = self.parse_expr(0)?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::LBracket) => {
                let mut items = Vec::new();
                if self.peek() != Some(&Token::RBracket) {
                    loop {
                        items.push(self.parse_expr(0)?);
                        if self.peek() == Some(&Token::Comma) {
                            self.next();
                        } else {
                            break;
                        }
                    }
                }
                self.expect(&Token::RBracket)?;
                Ok(Expr::Array(items))
            }
            Some(Token::LBrace) => {
                let mut entries = Vec::new();
                if self.peek() != Some(&Token::RBrace) {
                    loop {
                        let key = self.parse_expr(0)?;
                        self.expect(&Token::Colon)?;
                        let value = self.parse_expr(0)?;
                        entries.push((key, value));
                        if self.peek() == Some(&Token::Comma) {
                            self.next();
                        } else {
                            break;
                        }
                    }
                }
                self.expect(&Token::RBrace)?;
                Ok(Expr::Object(entries))
            }
            Some(other) => Err(format!("unexpected token '{other}'")),
            None => Err("unexpected end of expression".into()),
        }
    }

    fn parse_call_args(&mut self) -> Result<Vec<Expr>, String> {
        let mut args = Vec::new();
        if self.peek() != Some(&Token::RParen) {
            loop {
                args.push(self.parse_expr(0)?);
                if self.peek() == Some(&Token::Comma) {
                    self.next();
                } else {
                    break;
                }
            }
        }
        self.expect(&Token::RParen)?;
        Ok(args)
    }
}

fn binding_power(token: &Token) -> u8 {
    match token {
        Token::Dot | Token::LBracket => 80,
        Token::Star | Token::Slash | Token::Percent => 70,
        Token::Plus | Token::Minus | Token::Amp => 60,
        Token::Eq | Token::Ne | Token::Lt | Token::Le | Token::Gt | Token::Ge | Token::In => 50,
        Token::And => 40,
        Token::Or => 30,
        Token::Question => 20,
        _ => 0,
    }
}

fn binary_op(token: &Token) -> Result<BinaryOp, String> {
    Ok(match token {
        Token::Plus => BinaryOp::Add,
        Token::Minus => BinaryOp::Sub,
        Token::Star => BinaryOp::Mul,
        Token::Slash => BinaryOp::Div,
        Token::Percent => BinaryOp::Rem,
        Token::Amp => BinaryOp::Concat,
        Token::Eq => BinaryOp::Eq,
        Token::Ne => BinaryOp::Ne,
        Token::Lt => BinaryOp::Lt,
        Token::Le => BinaryOp::Le,
        Token::Gt => BinaryOp::Gt,
        Token::Ge => BinaryOp::Ge,
        Token::In => BinaryOp::In,
        Token::And => BinaryOp::And,
        Token::Or => BinaryOp::Or,
        _ => return Err(format!("'{token}' is not a binary operator")),
    })
}
