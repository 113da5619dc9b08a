use std::fmt;

use serde::Deserialize;
use thiserror::Error;

use crate::ir_to_bytecode::ConvertError;
use crate::lexer::LexError;
use crate::parser::ParseError;
use crate::runtime::ExecutionError;
use crate::semantic::SemanticError;

/// Pipeline stage an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Lex,
    Parse,
    Semantic,
    Lowering,
    Runtime,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Lex => "lex",
            Stage::Parse => "parse",
            Stage::Semantic => "semantic",
            Stage::Lowering => "lowering",
            Stage::Runtime => "runtime",
        })
    }
}

/// The first error raised while turning source text into bytecode.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("Lex error: {0}")]
    Lex(#[from] LexError),
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("Semantic error: {0}")]
    Semantic(#[from] SemanticError),
    #[error("Lowering error: {0}")]
    Lowering(#[from] ConvertError),
}

impl CompileError {
    pub fn stage(&self) -> Stage {
        match self {
            CompileError::Lex(_) => Stage::Lex,
            CompileError::Parse(_) => Stage::Parse,
            CompileError::Semantic(_) => Stage::Semantic,
            CompileError::Lowering(_) => Stage::Lowering,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

impl Error {
    pub fn stage(&self) -> Stage {
        match self {
            Error::Compile(error) => error.stage(),
            Error::Execution(_) => Stage::Runtime,
        }
    }

    /// Output printed before a runtime failure; empty for compile errors.
    pub fn partial_output(&self) -> &str {
        match self {
            Error::Compile(_) => "",
            Error::Execution(error) => &error.output,
        }
    }
}
