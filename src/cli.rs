//! Command-line options for the `tinypy` binary.

use anyhow::{Context, Result, anyhow, bail};

use crate::config::{Config, Lowering};
use crate::logging::LogLevel;

pub const USAGE: &str = "usage: tinypy [--backend vm|interpreter] [--emit tokens|ast|ir|bytecode] \
[--no-optimize] [--direct] [--max-steps N] [--max-depth N] [--log-level LEVEL] [FILE]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emit {
    Tokens,
    Ast,
    Ir,
    Bytecode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub backend: String,
    pub emit: Option<Emit>,
    pub log_level: Option<LogLevel>,
    pub input_path: Option<String>,
    pub help: bool,
    pub config: Config,
}

/// Parses arguments (without the program name) on top of `config`.
pub fn parse_args(mut args: impl Iterator<Item = String>, mut config: Config) -> Result<Options> {
    let mut backend = "vm".to_string();
    let mut emit = None;
    let mut log_level = None;
    let mut input_path = None;
    let mut help = false;

    while let Some(arg) = args.next() {
        let mut value = || {
            args.next()
                .ok_or_else(|| anyhow!("Missing value after {arg}"))
        };
        match arg.as_str() {
            "--backend" | "-b" => backend = value()?,
            "--emit" => {
                emit = Some(match value()?.as_str() {
                    "tokens" => Emit::Tokens,
                    "ast" => Emit::Ast,
                    "ir" => Emit::Ir,
                    "bytecode" => Emit::Bytecode,
                    other => bail!("Unknown emit target '{other}'"),
                });
            }
            "--no-optimize" => config.compile.optimize = false,
            "--direct" => config.compile.lowering = Lowering::Direct,
            "--max-steps" => {
                let raw = value()?;
                config.vm.max_steps =
                    Some(raw.parse().with_context(|| format!("Invalid --max-steps '{raw}'"))?);
            }
            "--max-depth" => {
                let raw = value()?;
                config.vm.max_call_depth =
                    Some(raw.parse().with_context(|| format!("Invalid --max-depth '{raw}'"))?);
            }
            "--log-level" => log_level = Some(value()?.parse()?),
            "--help" | "-h" => help = true,
            flag if flag.starts_with('-') => bail!("Unknown option '{flag}'\n{USAGE}"),
            path => {
                if input_path.is_some() {
                    bail!("Only one input file is supported");
                }
                input_path = Some(path.to_string());
            }
        }
    }

    Ok(Options {
        backend,
        emit,
        log_level,
        input_path,
        help,
        config,
    })
}
