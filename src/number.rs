//! Numeric semantics shared by constant folding and execution.
//!
//! The optimizer folds literals through [`Number::apply`] and both execution
//! backends route their arithmetic through the same function, so a folded
//! constant always equals what the VM would have computed at run time.

use std::cmp::Ordering;
use std::fmt;

use thiserror::Error;

use crate::ast::{BinaryOperator, CompareOperator};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow")]
    Overflow,
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(value) => value as f64,
            Number::Float(value) => value,
        }
    }

    pub fn is_zero(self) -> bool {
        match self {
            Number::Int(value) => value == 0,
            Number::Float(value) => value == 0.0,
        }
    }

    pub fn is_truthy(self) -> bool {
        !self.is_zero()
    }

    /// Applies an arithmetic operator. Division is always true division.
    pub fn apply(self, op: BinaryOperator, rhs: Number) -> Result<Number, ArithmeticError> {
        if op == BinaryOperator::Div {
            if rhs.is_zero() {
                return Err(ArithmeticError::DivisionByZero);
            }
            return Ok(Number::Float(self.as_f64() / rhs.as_f64()));
        }
        match (self, rhs) {
            (Number::Int(lhs), Number::Int(rhs)) => {
                let result = match op {
                    BinaryOperator::Add => lhs.checked_add(rhs),
                    BinaryOperator::Sub => lhs.checked_sub(rhs),
                    _ => lhs.checked_mul(rhs),
                };
                result.map(Number::Int).ok_or(ArithmeticError::Overflow)
            }
            (lhs, rhs) => {
                let (lhs, rhs) = (lhs.as_f64(), rhs.as_f64());
                Ok(Number::Float(match op {
                    BinaryOperator::Add => lhs + rhs,
                    BinaryOperator::Sub => lhs - rhs,
                    _ => lhs * rhs,
                }))
            }
        }
    }

    pub fn compare(self, op: CompareOperator, rhs: Number) -> bool {
        let ordering = match (self, rhs) {
            (Number::Int(lhs), Number::Int(rhs)) => Some(lhs.cmp(&rhs)),
            (lhs, rhs) => lhs.as_f64().partial_cmp(&rhs.as_f64()),
        };
        // NaN compares unequal to everything, including itself.
        let Some(ordering) = ordering else {
            return op == CompareOperator::NotEq;
        };
        match op {
            CompareOperator::Eq => ordering == Ordering::Equal,
            CompareOperator::NotEq => ordering != Ordering::Equal,
            CompareOperator::Lt => ordering == Ordering::Less,
            CompareOperator::Gt => ordering == Ordering::Greater,
            CompareOperator::LtEq => ordering != Ordering::Greater,
            CompareOperator::GtEq => ordering != Ordering::Less,
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Number::Int(value) => write!(f, "{value}"),
            Number::Float(value) if value.is_nan() => write!(f, "nan"),
            Number::Float(value) if value.is_infinite() => {
                write!(f, "{}", if value > 0.0 { "inf" } else { "-inf" })
            }
            Number::Float(value) if value.fract() == 0.0 && value.abs() < 1e16 => {
                write!(f, "{value:.1}")
            }
            Number::Float(value) => write!(f, "{value}"),
        }
    }
}
