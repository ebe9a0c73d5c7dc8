//! Boolean expressions for `{% if %}`, parsed with a top down operator precedence parser.
//!
//! The parser is generic over what the tokens are and what literals become: `{% if %}`
//! feeds it the words of the tag and turns non operators into filter expressions, but
//! anything implementing [`IfToken`] works.
//!
//! Evaluation never fails because of an operator: if evaluating the operands of an
//! operator errors, the operator evaluates to `false`.
use std::cmp::Ordering;
use std::fmt;

use crate::errors::{Error, TesseraResult};
use crate::Value;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Operator {
    Or,
    And,
    Not,
    In,
    NotIn,
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

impl Operator {
    fn parse(s: &str) -> Option<Self> {
        let op = match s {
            "or" => Operator::Or,
            "and" => Operator::And,
            "not" => Operator::Not,
            "in" => Operator::In,
            "not in" => Operator::NotIn,
            "==" | "=" => Operator::Equal,
            "!=" => Operator::NotEqual,
            "<" => Operator::LessThan,
            "<=" => Operator::LessThanOrEqual,
            ">" => Operator::GreaterThan,
            ">=" => Operator::GreaterThanOrEqual,
            _ => return None,
        };
        Some(op)
    }

    pub fn binding_power(&self) -> u8 {
        match self {
            Operator::Or => 6,
            Operator::And => 7,
            Operator::Not => 8,
            Operator::In | Operator::NotIn => 9,
            Operator::Equal
            | Operator::NotEqual
            | Operator::LessThan
            | Operator::LessThanOrEqual
            | Operator::GreaterThan
            | Operator::GreaterThanOrEqual => 10,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Or => "or",
            Operator::And => "and",
            Operator::Not => "not",
            Operator::In => "in",
            Operator::NotIn => "not in",
            Operator::Equal => "==",
            Operator::NotEqual => "!=",
            Operator::LessThan => "<",
            Operator::LessThanOrEqual => "<=",
            Operator::GreaterThan => ">",
            Operator::GreaterThanOrEqual => ">=",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something the if parser can read.
pub trait IfToken {
    /// The text to check against the operator table, if this token could be one
    fn as_operator(&self) -> Option<&str>;

    /// How to show this token in error messages
    fn display(&self) -> String;
}

impl IfToken for &str {
    fn as_operator(&self) -> Option<&str> {
        Some(self)
    }

    fn display(&self) -> String {
        self.to_string()
    }
}

impl IfToken for String {
    fn as_operator(&self) -> Option<&str> {
        Some(self)
    }

    fn display(&self) -> String {
        self.clone()
    }
}

impl IfToken for Value {
    fn as_operator(&self) -> Option<&str> {
        self.as_str()
    }

    fn display(&self) -> String {
        match self {
            Value::String(s, _) => format!("'{s}'"),
            _ => self.to_string(),
        }
    }
}

/// A literal of the expression, evaluated against some context `C`.
pub trait Operand<C: ?Sized> {
    fn eval(&self, context: &mut C) -> TesseraResult<Value>;
}

impl<C: ?Sized> Operand<C> for Value {
    fn eval(&self, _: &mut C) -> TesseraResult<Value> {
        Ok(self.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr<L> {
    Literal(L),
    Prefix {
        op: Operator,
        operand: Box<Expr<L>>,
    },
    Infix {
        op: Operator,
        left: Box<Expr<L>>,
        right: Box<Expr<L>>,
    },
}

fn compare(op: Operator, left: &Value, right: &Value) -> TesseraResult<bool> {
    if left.is_none() || right.is_none() {
        return Err(Error::message(format!(
            "'{op}' not supported between '{}' and '{}'",
            left.name(),
            right.name()
        )));
    }
    let ordering = left.partial_cmp(right).ok_or_else(|| {
        Error::message(format!(
            "'{op}' not supported between '{}' and '{}'",
            left.name(),
            right.name()
        ))
    })?;
    Ok(match op {
        Operator::LessThan => ordering == Ordering::Less,
        Operator::LessThanOrEqual => ordering != Ordering::Greater,
        Operator::GreaterThan => ordering == Ordering::Greater,
        _ => ordering != Ordering::Less,
    })
}

impl<L> Expr<L> {
    /// Evaluates the expression. `or` and `and` return one of their operands,
    /// everything else returns a boolean.
    ///
    /// Only a lone literal can return an error.
    pub fn eval<C: ?Sized>(&self, context: &mut C) -> TesseraResult<Value>
    where
        L: Operand<C>,
    {
        match self {
            Expr::Literal(l) => l.eval(context),
            Expr::Prefix { operand, .. } => Ok(operand
                .eval(context)
                .map(|v| Value::Bool(!v.is_truthy()))
                .unwrap_or(Value::Bool(false))),
            Expr::Infix { op, left, right } => Ok(Self::eval_infix(*op, left, right, context)
                .unwrap_or(Value::Bool(false))),
        }
    }

    fn eval_infix<C: ?Sized>(
        op: Operator,
        left: &Expr<L>,
        right: &Expr<L>,
        context: &mut C,
    ) -> TesseraResult<Value>
    where
        L: Operand<C>,
    {
        let lhs = left.eval(context)?;
        match op {
            Operator::Or if lhs.is_truthy() => return Ok(lhs),
            Operator::And if !lhs.is_truthy() => return Ok(lhs),
            Operator::Or | Operator::And => return right.eval(context),
            _ => (),
        }

        let rhs = right.eval(context)?;
        let res = match op {
            Operator::In => rhs.contains(&lhs)?,
            Operator::NotIn => !rhs.contains(&lhs)?,
            Operator::Equal => lhs == rhs,
            Operator::NotEqual => lhs != rhs,
            _ => compare(op, &lhs, &rhs)?,
        };
        Ok(Value::Bool(res))
    }
}

enum Tok<L> {
    Op(Operator, String),
    Literal(L, String),
    End,
}

impl<L> Tok<L> {
    fn lbp(&self) -> u8 {
        match self {
            Tok::Op(op, _) => op.binding_power(),
            _ => 0,
        }
    }
}

pub struct IfParser<L> {
    tokens: std::vec::IntoIter<Tok<L>>,
    current: Tok<L>,
}

impl<L> IfParser<L> {
    /// Classifies the tokens, turning everything that isn't an operator into a literal
    /// with `make_literal`. `not` followed by `in` becomes a single `not in`.
    pub fn new<T: IfToken>(
        tokens: Vec<T>,
        mut make_literal: impl FnMut(T) -> TesseraResult<L>,
    ) -> TesseraResult<Self> {
        let mut mapped = Vec::with_capacity(tokens.len());
        let mut iter = tokens.into_iter().peekable();

        while let Some(token) = iter.next() {
            let op = match token.as_operator() {
                Some("not") if iter.peek().and_then(|t| t.as_operator()) == Some("in") => {
                    Some((Operator::NotIn, "not in".to_string()))
                }
                Some(text) => Operator::parse(text).map(|op| (op, text.to_string())),
                None => None,
            };
            match op {
                Some((Operator::NotIn, text)) => {
                    // `not` then `in`, as opposed to a single `not in` token
                    if token.as_operator() == Some("not") {
                        iter.next();
                    }
                    mapped.push(Tok::Op(Operator::NotIn, text));
                }
                Some((op, text)) => mapped.push(Tok::Op(op, text)),
                None => {
                    let display = token.display();
                    mapped.push(Tok::Literal(make_literal(token)?, display));
                }
            }
        }

        let mut tokens = mapped.into_iter();
        let current = tokens.next().unwrap_or(Tok::End);
        Ok(Self { tokens, current })
    }

    fn advance(&mut self) -> Tok<L> {
        let next = self.tokens.next().unwrap_or(Tok::End);
        std::mem::replace(&mut self.current, next)
    }

    pub fn parse(mut self) -> TesseraResult<Expr<L>> {
        let expr = self.expression(0)?;
        match self.current {
            Tok::End => Ok(expr),
            Tok::Op(_, ref text) | Tok::Literal(_, ref text) => Err(Error::syntax(format!(
                "Unused '{text}' at end of if expression."
            ))),
        }
    }

    fn expression(&mut self, rbp: u8) -> TesseraResult<Expr<L>> {
        let token = self.advance();
        let mut left = self.nud(token)?;
        while rbp < self.current.lbp() {
            let token = self.advance();
            left = self.led(token, left)?;
        }
        Ok(left)
    }

    fn nud(&mut self, token: Tok<L>) -> TesseraResult<Expr<L>> {
        match token {
            Tok::Literal(l, _) => Ok(Expr::Literal(l)),
            Tok::Op(Operator::Not, _) => {
                let operand = self.expression(Operator::Not.binding_power())?;
                Ok(Expr::Prefix {
                    op: Operator::Not,
                    operand: Box::new(operand),
                })
            }
            Tok::Op(_, text) => Err(Error::syntax(format!(
                "Not expecting '{text}' in this position in if tag."
            ))),
            Tok::End => Err(Error::syntax("Unexpected end of expression in if tag.")),
        }
    }

    fn led(&mut self, token: Tok<L>, left: Expr<L>) -> TesseraResult<Expr<L>> {
        match token {
            Tok::Op(op, _) if op != Operator::Not => {
                let right = self.expression(op.binding_power())?;
                Ok(Expr::Infix {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                })
            }
            Tok::Op(_, text) | Tok::Literal(_, text) => Err(Error::syntax(format!(
                "Not expecting '{text}' as infix operator in if tag."
            ))),
            Tok::End => Err(Error::syntax("Unexpected end of expression in if tag.")),
        }
    }
}
