use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Expected {expected}, found {found} at line {line}")]
    UnexpectedToken {
        expected: String,
        found: String,
        line: usize,
    },
    #[error("Unsupported {construct} at line {line}")]
    Unsupported { construct: String, line: usize },
}

impl ParseError {
    pub fn line(&self) -> usize {
        match self {
            ParseError::UnexpectedToken { line, .. } | ParseError::Unsupported { line, .. } => {
                *line
            }
        }
    }
}

pub type ParseResult<T> = Result<T, ParseError>;
