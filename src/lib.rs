pub mod ast;
pub mod backend;
pub mod builtins;
pub mod bytecode;
pub mod cli;
pub mod config;
pub mod error;
pub mod fixtures;
pub mod interpreter;
pub mod ir;
pub mod ir_to_bytecode;
pub mod lexer;
pub mod logging;
pub mod number;
pub mod optimizer;
pub mod parser;
pub mod pipeline;
pub mod runtime;
pub mod semantic;
pub mod token;
pub mod vm;

pub use config::Config;
pub use error::{CompileError, Error, Stage};
pub use pipeline::{compile, execute, run};
