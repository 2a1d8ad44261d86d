//! Operator-precedence parser.
//!
//! Works over an operator stack and a value stack; every reduction pops its
//! operands from the value stack and pushes the built subtree back.

use crate::error::ParseError;
use crate::expr::token::{tokenize, Token};
use crate::expr::{BinaryOp, Expr, Function};

/// Binding strength of prefix minus and function application.
const UNARY_PRECEDENCE: u8 = 5;

#[derive(Clone, Copy, Debug)]
enum Pending {
    Binary(BinaryOp),
    Negate,
    Call(Function),
    Open,
}

/// Parses infix expression text into an AST.
pub fn parse(text: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(text)?;
    if tokens.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut ops: Vec<Pending> = Vec::new();
    let mut values: Vec<Expr> = Vec::new();
    let mut expect_operand = true;
    let mut iter = tokens.into_iter().peekable();

    while let Some(token) = iter.next() {
        match token {
            Token::Number(value) => {
                if !expect_operand {
                    return Err(ParseError::UnexpectedOperand(text.to_string()));
                }
                values.push(Expr::Number(value));
                expect_operand = false;
            }
            Token::Ident(name) => {
                if !expect_operand {
                    return Err(ParseError::UnexpectedOperand(text.to_string()));
                }
                if iter.peek() == Some(&Token::LParen) {
                    let func = Function::from_name(&name).ok_or_else(|| ParseError::UnknownFunction {
                        text: text.to_string(),
                        name: name.clone(),
                    })?;
                    ops.push(Pending::Call(func));
                } else {
                    values.push(Expr::Symbol(name));
                    expect_operand = false;
                }
            }
            Token::LParen => {
                if !expect_operand {
                    return Err(ParseError::UnexpectedOperand(text.to_string()));
                }
                ops.push(Pending::Open);
            }
            Token::RParen => {
                if expect_operand {
                    return Err(ParseError::MissingOperand(text.to_string()));
                }
                loop {
                    match ops.pop() {
                        Some(Pending::Open) => break,
                        Some(pending) => reduce(pending, &mut values, text)?,
                        None => return Err(ParseError::UnbalancedParens(text.to_string())),
                    }
                }
                if let Some(&Pending::Call(func)) = ops.last() {
                    ops.pop();
                    reduce(Pending::Call(func), &mut values, text)?;
                }
            }
            Token::Op(op) => {
                if expect_operand {
                    match op {
                        BinaryOp::Sub => ops.push(Pending::Negate),
                        BinaryOp::Add => {}
                        _ => return Err(ParseError::MissingOperand(text.to_string())),
                    }
                    continue;
                }
                while let Some(&top) = ops.last() {
                    let top_precedence = match top {
                        Pending::Binary(prev) => prev.precedence(),
                        Pending::Negate => UNARY_PRECEDENCE,
                        Pending::Call(_) | Pending::Open => break,
                    };
                    // Equal precedence reduces first: left associativity.
                    if top_precedence < op.precedence() {
                        break;
                    }
                    ops.pop();
                    reduce(top, &mut values, text)?;
                }
                ops.push(Pending::Binary(op));
                expect_operand = true;
            }
        }
    }

    if expect_operand {
        return Err(ParseError::MissingOperand(text.to_string()));
    }

    while let Some(pending) = ops.pop() {
        match pending {
            Pending::Open | Pending::Call(_) => {
                return Err(ParseError::UnbalancedParens(text.to_string()))
            }
            other => reduce(other, &mut values, text)?,
        }
    }

    match (values.pop(), values.is_empty()) {
        (Some(expr), true) => Ok(expr),
        (Some(_), false) => Err(ParseError::UnexpectedOperand(text.to_string())),
        (None, _) => Err(ParseError::Empty),
    }
}

fn reduce(pending: Pending, values: &mut Vec<Expr>, text: &str) -> Result<(), ParseError> {
    let missing = || ParseError::MissingOperand(text.to_string());
    let expr = match pending {
        Pending::Binary(op) => {
            let right = values.pop().ok_or_else(missing)?;
            let left = values.pop().ok_or_else(missing)?;
            Expr::Operator {
                op,
                left: Box::new(left),
                right: Box::new(right),
            }
        }
        Pending::Negate => {
            let operand = values.pop().ok_or_else(missing)?;
            Expr::Operator {
                op: BinaryOp::Sub,
                left: Box::new(Expr::Number(0.0)),
                right: Box::new(operand),
            }
        }
        Pending::Call(func) => {
            let arg = values.pop().ok_or_else(missing)?;
            Expr::Function {
                func,
                arg: Box::new(arg),
            }
        }
        Pending::Open => return Err(ParseError::UnbalancedParens(text.to_string())),
    };
    values.push(expr);
    Ok(())
}
