//! Recursive-descent parser for the script dialect
//!
//! A small JavaScript subset: declarations, assignment, `if`/`else`, `while`,
//! `return`, `throw`, calls, member access and the usual operators.

use super::lexer::{tokenize, Spanned, Token};
use super::ScriptError;

/// Guards the native stack against pathological nesting
const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub(crate) body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Stmt {
    Let {
        name: String,
        init: Option<Expr>,
    },
    Assign {
        target: Target,
        append: bool,
        value: Expr,
    },
    If {
        cond: Expr,
        then: Vec<Stmt>,
        otherwise: Vec<Stmt>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    Return(Option<Expr>),
    Throw(Expr),
    Expr(Expr),
    Block(Vec<Stmt>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Target {
    Var(String),
    Member { object: Expr, property: String },
    Index { object: Expr, index: Expr },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Literal {
    Str(String),
    Num(f64),
    Bool(bool),
    Null,
    Undefined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    StrictEq,
    StrictNe,
    Lt,
    Gt,
    Le,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Not,
    Neg,
    Plus,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Literal(Literal),
    Ident(String),
    Member {
        object: Box<Expr>,
        property: String,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Ternary {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

/// Parse script source into a program
pub fn parse(source: &str) -> Result<Program, ScriptError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let mut body = Vec::new();
    while !parser.at_end() {
        body.push(parser.statement()?);
    }
    Ok(Program { body })
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(1, |s| s.line)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|s| s.token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token, what: &str) -> Result<(), ScriptError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    fn error(&self, message: impl Into<String>) -> ScriptError {
        let message = message.into();
        match self.peek() {
            Some(token) => ScriptError::parse(self.line(), format!("{message}, found {token:?}")),
            None => ScriptError::parse(self.line(), format!("{message}, found end of script")),
        }
    }

    fn enter(&mut self) -> Result<(), ScriptError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ScriptError::parse(self.line(), "script is nested too deeply"));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn statement(&mut self) -> Result<Stmt, ScriptError> {
        self.enter()?;
        let stmt = self.statement_inner();
        self.leave();
        stmt
    }

    fn statement_inner(&mut self) -> Result<Stmt, ScriptError> {
        match self.peek() {
            Some(Token::Semi) => {
                self.pos += 1;
                Ok(Stmt::Block(Vec::new()))
            }
            Some(Token::LBrace) => Ok(Stmt::Block(self.block()?)),
            Some(Token::Let) => {
                self.pos += 1;
                let name = match self.advance() {
                    Some(Token::Ident(name)) => name,
                    _ => return Err(ScriptError::parse(self.line(), "expected variable name")),
                };
                let init = if self.eat(&Token::Assign) {
                    Some(self.expression()?)
                } else {
                    None
                };
                self.end_statement()?;
                Ok(Stmt::Let { name, init })
            }
            Some(Token::If) => {
                self.pos += 1;
                self.expect(&Token::LParen, "'(' after if")?;
                let cond = self.expression()?;
                self.expect(&Token::RParen, "')'")?;
                let then = self.body()?;
                let otherwise = if self.eat(&Token::Else) {
                    self.body()?
                } else {
                    Vec::new()
                };
                Ok(Stmt::If {
                    cond,
                    then,
                    otherwise,
                })
            }
            Some(Token::While) => {
                self.pos += 1;
                self.expect(&Token::LParen, "'(' after while")?;
                let cond = self.expression()?;
                self.expect(&Token::RParen, "')'")?;
                let body = self.body()?;
                Ok(Stmt::While { cond, body })
            }
            Some(Token::Return) => {
                self.pos += 1;
                let value = match self.peek() {
                    None | Some(Token::Semi | Token::RBrace) => None,
                    Some(_) => Some(self.expression()?),
                };
                self.end_statement()?;
                Ok(Stmt::Return(value))
            }
            Some(Token::Throw) => {
                self.pos += 1;
                let value = self.expression()?;
                self.end_statement()?;
                Ok(Stmt::Throw(value))
            }
            Some(_) => {
                let expr = self.expression()?;
                let append = match self.peek() {
                    Some(Token::Assign) => false,
                    Some(Token::PlusAssign) => true,
                    _ => {
                        self.end_statement()?;
                        return Ok(Stmt::Expr(expr));
                    }
                };
                self.pos += 1;
                let target = into_target(expr)
                    .ok_or_else(|| ScriptError::parse(self.line(), "invalid assignment target"))?;
                let value = self.expression()?;
                self.end_statement()?;
                Ok(Stmt::Assign {
                    target,
                    append,
                    value,
                })
            }
            None => Err(self.error("expected statement")),
        }
    }

    /// `;` is optional before `}` and at end of input
    fn end_statement(&mut self) -> Result<(), ScriptError> {
        match self.peek() {
            Some(Token::Semi) => {
                self.pos += 1;
                Ok(())
            }
            None | Some(Token::RBrace) => Ok(()),
            Some(_) if self.tokens[self.pos].line > self.tokens[self.pos - 1].line => Ok(()),
            Some(_) => Err(self.error("expected ';'")),
        }
    }

    fn block(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        self.expect(&Token::LBrace, "'{'")?;
        let mut stmts = Vec::new();
        while !self.eat(&Token::RBrace) {
            if self.at_end() {
                return Err(self.error("expected '}'"));
            }
            stmts.push(self.statement()?);
        }
        Ok(stmts)
    }

    /// Braced block or a single statement
    fn body(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        if self.peek() == Some(&Token::LBrace) {
            self.block()
        } else {
            Ok(vec![self.statement()?])
        }
    }

    // ------------------------------------------------------------------
    // Expressions, lowest precedence first
    // ------------------------------------------------------------------

    fn expression(&mut self) -> Result<Expr, ScriptError> {
        self.enter()?;
        let expr = self.ternary();
        self.leave();
        expr
    }

    fn ternary(&mut self) -> Result<Expr, ScriptError> {
        let cond = self.or()?;
        if !self.eat(&Token::Question) {
            return Ok(cond);
        }
        let then = self.expression()?;
        self.expect(&Token::Colon, "':' in conditional expression")?;
        let otherwise = self.expression()?;
        Ok(Expr::Ternary {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn or(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.and()?;
        while self.eat(&Token::Or) {
            let right = self.and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.equality()?;
        while self.eat(&Token::And) {
            let right = self.equality()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.comparison()?;
        loop {
            let op = match self.peek() {
                Some(Token::Eq) => BinaryOp::Eq,
                Some(Token::Ne) => BinaryOp::Ne,
                Some(Token::StrictEq) => BinaryOp::StrictEq,
                Some(Token::StrictNe) => BinaryOp::StrictNe,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.comparison()?;
            left = binary(op, left, right);
        }
    }

    fn comparison(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::Le) => BinaryOp::Le,
                Some(Token::Ge) => BinaryOp::Ge,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.additive()?;
            left = binary(op, left, right);
        }
    }

    fn additive(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.multiplicative()?;
            left = binary(op, left, right);
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Rem,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.unary()?;
            left = binary(op, left, right);
        }
    }

    fn unary(&mut self) -> Result<Expr, ScriptError> {
        let op = match self.peek() {
            Some(Token::Not) => UnaryOp::Not,
            Some(Token::Minus) => UnaryOp::Neg,
            Some(Token::Plus) => UnaryOp::Plus,
            _ => return self.postfix(),
        };
        self.pos += 1;
        self.enter()?;
        let expr = self.unary();
        self.leave();
        Ok(Expr::Unary {
            op,
            expr: Box::new(expr?),
        })
    }

    fn postfix(&mut self) -> Result<Expr, ScriptError> {
        let mut expr = self.primary()?;
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.pos += 1;
                    let property = match self.advance() {
                        Some(Token::Ident(name)) => name,
                        _ => return Err(ScriptError::parse(self.line(), "expected property name")),
                    };
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property,
                    };
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let index = self.expression()?;
                    self.expect(&Token::RBracket, "']'")?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                Some(Token::LParen) => {
                    self.pos += 1;
                    let mut args = Vec::new();
                    if !self.eat(&Token::RParen) {
                        loop {
                            args.push(self.expression()?);
                            if self.eat(&Token::RParen) {
                                break;
                            }
                            self.expect(&Token::Comma, "',' or ')'")?;
                        }
                    }
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, ScriptError> {
        let line = self.line();
        match self.advance() {
            Some(Token::Num(n)) => Ok(Expr::Literal(Literal::Num(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Literal::Str(s))),
            Some(Token::True) => Ok(Expr::Literal(Literal::Bool(true))),
            Some(Token::False) => Ok(Expr::Literal(Literal::Bool(false))),
            Some(Token::Null) => Ok(Expr::Literal(Literal::Null)),
            Some(Token::Undefined) => Ok(Expr::Literal(Literal::Undefined)),
            Some(Token::Ident(name)) => Ok(Expr::Ident(name)),
            Some(Token::LParen) => {
                let expr = self.expression()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(expr)
            }
            Some(token) => Err(ScriptError::parse(line, format!("unexpected {token:?}"))),
            None => Err(ScriptError::parse(line, "unexpected end of script")),
        }
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn into_target(expr: Expr) -> Option<Target> {
    match expr {
        Expr::Ident(name) => Some(Target::Var(name)),
        Expr::Member { object, property } => Some(Target::Member {
            object: *object,
            property,
        }),
        Expr::Index { object, index } => Some(Target::Index {
            object: *object,
            index: *index,
        }),
        _ => None,
    }
}
