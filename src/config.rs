//! Compile and execution settings.
//!
//! Every field has a default, so fixture files and callers only spell out
//! what they change. The binary layers its flags over [`Config::from_env`].

use serde::Deserialize;
use thiserror::Error;

pub const NO_OPTIMIZE_ENV: &str = "TINYPY_NO_OPTIMIZE";
pub const LOWERING_ENV: &str = "TINYPY_LOWERING";
pub const MAX_STEPS_ENV: &str = "TINYPY_MAX_STEPS";
pub const MAX_DEPTH_ENV: &str = "TINYPY_MAX_DEPTH";

/// How the top-level program reaches bytecode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lowering {
    /// AST to three-address IR, then IR to bytecode.
    #[default]
    Ir,
    /// AST straight to bytecode.
    Direct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompileOptions {
    pub optimize: bool,
    pub lowering: Lowering,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            optimize: true,
            lowering: Lowering::Ir,
        }
    }
}

/// Execution budgets. `None` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VmConfig {
    pub max_steps: Option<u64>,
    pub max_call_depth: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub compile: CompileOptions,
    pub vm: VmConfig,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value '{value}' for {variable}")]
    InvalidValue {
        variable: &'static str,
        value: String,
    },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from `lookup`, which maps variable names to values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Config::default();
        if let Some(value) = lookup(NO_OPTIMIZE_ENV) {
            config.compile.optimize = !parse_flag(NO_OPTIMIZE_ENV, &value)?;
        }
        if let Some(value) = lookup(LOWERING_ENV) {
            config.compile.lowering = match value.trim().to_ascii_lowercase().as_str() {
                "ir" => Lowering::Ir,
                "direct" => Lowering::Direct,
                _ => return Err(invalid(LOWERING_ENV, &value)),
            };
        }
        if let Some(value) = lookup(MAX_STEPS_ENV) {
            config.vm.max_steps = Some(parse_number(MAX_STEPS_ENV, &value)?);
        }
        if let Some(value) = lookup(MAX_DEPTH_ENV) {
            config.vm.max_call_depth = Some(parse_number(MAX_DEPTH_ENV, &value)?);
        }
        Ok(config)
    }
}

fn invalid(variable: &'static str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        variable,
        value: value.to_string(),
    }
}

fn parse_flag(variable: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(variable, value)),
    }
}

fn parse_number<T: std::str::FromStr>(
    variable: &'static str,
    value: &str,
) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| invalid(variable, value))
}
