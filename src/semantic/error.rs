use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SemanticError {
    #[error("Variable '{name}' not defined")]
    UndeclaredVariable { name: String },
    #[error("Function '{name}' already defined")]
    DuplicateFunction { name: String },
    #[error("Class '{name}' already defined")]
    DuplicateClass { name: String },
    #[error("Method '{method}' already defined in class '{class}'")]
    DuplicateMethod { class: String, method: String },
    #[error("Method '{method}' of class '{class}' must take 'self' as its first parameter")]
    MissingSelf { class: String, method: String },
    #[error("Function '{name}' not defined")]
    UndeclaredFunction { name: String },
    #[error("Function '{name}' expects {expected} arguments, got {found}")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("Return outside function")]
    ReturnOutsideFunction,
    #[error("Definition of '{name}' inside a function body is not supported")]
    NestedDefinition { name: String },
}

pub type SemanticResult<T> = Result<T, SemanticError>;
