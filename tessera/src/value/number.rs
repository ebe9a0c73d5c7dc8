use crate::errors::{Error, TesseraResult};
use crate::value::Value;
use std::fmt;
use std::fmt::Formatter;
use std::hash::{Hash, Hasher};

/// Simpler representation of numbers so operations are simpler to handle
/// Also can be used for custom filters when you want to ensure you get a number
#[derive(Debug, Copy, Clone)]
pub enum Number {
    Integer(i128),
    Float(f64),
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Number::Integer(v) => write!(f, "{v}"),
            Number::Float(v) => write!(f, "{v}"),
        }
    }
}

impl Hash for Number {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Number::Integer(v) => v.hash(state),
            Number::Float(v) => v.to_bits().hash(state),
        }
    }
}

impl From<Number> for Value {
    fn from(value: Number) -> Self {
        match value {
            Number::Integer(i) => Value::from(i),
            Number::Float(f) => Value::from(f),
        }
    }
}

impl Number {
    pub fn is_float(&self) -> bool {
        matches!(self, Number::Float(..))
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Number::Integer(..))
    }

    pub fn as_float(&self) -> f64 {
        match self {
            Number::Float(f) => *f,
            Number::Integer(f) => *f as f64,
        }
    }

    pub fn as_integer(&self) -> Option<i128> {
        match self {
            Number::Float(f) => {
                if f.fract() == 0.0 {
                    Some((*f) as i128)
                } else {
                    None
                }
            }
            Number::Integer(f) => Some(*f),
        }
    }

    /// Parses a number literal the way templates write them: an optional sign, digits
    /// and at most one decimal point or an exponent.
    pub(crate) fn parse_literal(input: &str) -> Option<Number> {
        let digits = input.strip_prefix(['-', '+']).unwrap_or(input);
        if digits.is_empty() || !digits.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
            return None;
        }
        if input.ends_with('.') {
            return None;
        }
        if !input.contains('.') && !input.to_ascii_lowercase().contains('e') {
            return input.parse::<i128>().ok().map(Number::Integer);
        }
        input
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(Number::Float)
    }
}

/// Adds two values the way the `add` filter does: numbers are summed and integers
/// stay integers unless a float is involved.
pub(crate) fn add(lhs: &Value, rhs: &Value) -> TesseraResult<Value> {
    match (lhs.as_number(), rhs.as_number()) {
        (Some(Number::Integer(a)), Some(Number::Integer(b))) => a
            .checked_add(b)
            .map(Value::from)
            .ok_or_else(|| Error::message(format!("Unable to perform {lhs} + {rhs}"))),
        (Some(a), Some(b)) => Ok(Value::from(a.as_float() + b.as_float())),
        _ => Err(Error::message(format!(
            "`add` cannot be used on `{}` and `{}`",
            lhs.name(),
            rhs.name()
        ))),
    }
}
