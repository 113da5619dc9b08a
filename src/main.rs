use std::fs;
use std::io::{self, Read};

use anyhow::{Context, Result, anyhow};

use tinypy::backend::by_name;
use tinypy::cli::{self, Emit, USAGE};
use tinypy::config::Config;
use tinypy::logging::{self, LOG_ENV, LogLevel};
use tinypy::runtime::ExecutionError;
use tinypy::{ir, lexer, optimizer, pipeline};

fn read_source(input_path: Option<&str>) -> Result<String> {
    if let Some(path) = input_path {
        return fs::read_to_string(path).with_context(|| format!("Reading {path}"));
    }
    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("Reading stdin")?;
    Ok(buffer)
}

fn emit(target: Emit, source: &str, config: &Config) -> Result<()> {
    match target {
        Emit::Tokens => {
            for token in lexer::tokenize(source)? {
                println!("{}:{} {}", token.span.line, token.span.column, token.kind);
            }
        }
        Emit::Ast => {
            let mut program = pipeline::analyze(source)?;
            if config.compile.optimize {
                program = optimizer::optimize(program);
            }
            println!("{program:#?}");
        }
        Emit::Ir => {
            let mut program = pipeline::analyze(source)?;
            if config.compile.optimize {
                program = optimizer::optimize(program);
            }
            print!("{}", ir::lower(&program));
        }
        Emit::Bytecode => print!("{}", pipeline::compile(source, &config.compile)?),
    }
    Ok(())
}

fn print_output(output: &str) {
    if !output.is_empty() {
        println!("{output}");
    }
}

fn execute(backend: &str, source: &str, config: &Config) -> Result<()> {
    let backend =
        by_name(backend, *config).ok_or_else(|| anyhow!("Unknown backend '{backend}'"))?;
    let program = pipeline::analyze(source)?;
    match backend.run(&program) {
        Ok(output) => {
            print_output(&output);
            Ok(())
        }
        Err(error) => {
            if let Some(execution) = error.downcast_ref::<ExecutionError>() {
                print_output(&execution.output);
            }
            Err(error)
        }
    }
}

fn main() -> Result<()> {
    let config = Config::from_env()?;
    let options = cli::parse_args(std::env::args().skip(1), config)?;
    if options.help {
        println!("{USAGE}");
        return Ok(());
    }

    let level = match options.log_level {
        Some(level) => level,
        None => match std::env::var(LOG_ENV) {
            Ok(raw) => raw.parse()?,
            Err(_) => LogLevel::default(),
        },
    };
    logging::init(level).context("Installing logger")?;

    let source = read_source(options.input_path.as_deref())?;
    match options.emit {
        Some(target) => emit(target, &source, &options.config),
        None => execute(&options.backend, &source, &options.config),
    }
}
