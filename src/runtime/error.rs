use thiserror::Error;

use crate::number::ArithmeticError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Integer overflow")]
    IntegerOverflow,
    #[error("Unsupported operand types for {operation}: {left} and {right}")]
    TypeMismatch {
        operation: String,
        left: String,
        right: String,
    },
    #[error("'{operation}' expects a list, got {found}")]
    ExpectedList { operation: String, found: String },
    #[error("List indices must be integers, got {found}")]
    ExpectedInteger { found: String },
    #[error("List index {index} out of range for length {len}")]
    IndexOutOfRange { index: i64, len: usize },
    #[error("Undefined function '{name}'")]
    UndefinedFunction { name: String },
    #[error("Unknown method '{method}' for type {type_name}")]
    UnknownMethod { method: String, type_name: String },
    #[error("Unknown attribute '{attribute}' for type {type_name}")]
    UnknownAttribute {
        attribute: String,
        type_name: String,
    },
    #[error("Function '{name}' expected {expected} arguments, got {found}")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("Undefined variable '{name}'")]
    UndefinedVariable { name: String },
    #[error("Return outside of function")]
    ReturnOutsideFunction,
    #[error("Stack underflow")]
    StackUnderflow,
    #[error("Jump target {target} outside block of length {len}")]
    InvalidJumpTarget { target: usize, len: usize },
    #[error("Step limit of {limit} exceeded")]
    StepLimitExceeded { limit: u64 },
    #[error("Maximum call depth of {limit} exceeded")]
    CallDepthExceeded { limit: usize },
}

impl From<ArithmeticError> for RuntimeError {
    fn from(error: ArithmeticError) -> Self {
        match error {
            ArithmeticError::DivisionByZero => RuntimeError::DivisionByZero,
            ArithmeticError::Overflow => RuntimeError::IntegerOverflow,
        }
    }
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// A runtime failure together with everything printed before it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Runtime error: {error}")]
pub struct ExecutionError {
    #[source]
    pub error: RuntimeError,
    pub output: String,
}
