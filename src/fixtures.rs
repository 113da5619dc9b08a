//! Fixture cases under `tests/programs/<case>/`.
//!
//! Each case directory holds `program.py`, a `case.yaml` describing the
//! expected outcome, and the expected output files it names.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

use crate::config::Config;
use crate::error::Stage;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CaseClass {
    RuntimeSuccess,
    CompileError,
    RuntimeError,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct BenchConfig {
    pub enabled: bool,
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default, deny_unknown_fields)]
pub struct ExpectedOutcome {
    /// Full stdout; for runtime errors, the output printed before the failure.
    pub stdout_file: Option<String>,
    pub stage: Option<Stage>,
    pub error_contains: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct CaseSpec {
    pub class: CaseClass,
    #[serde(default)]
    pub description: Option<String>,
    /// Whether CPython is expected to print the same output.
    #[serde(default = "parity_by_default")]
    pub parity: bool,
    #[serde(default)]
    pub config: Config,
    #[serde(default)]
    pub unsupported_backends: Vec<String>,
    #[serde(default)]
    pub bench: BenchConfig,
    #[serde(default)]
    pub expected: ExpectedOutcome,
}

fn parity_by_default() -> bool {
    true
}

#[derive(Debug, Clone)]
pub struct Case {
    pub name: String,
    pub dir: PathBuf,
    pub program_path: PathBuf,
    pub spec: CaseSpec,
}

impl Case {
    pub fn read_text(&self, relative_path: &str) -> Result<String> {
        fs::read_to_string(self.dir.join(relative_path))
            .with_context(|| format!("Reading {} fixture file {}", self.name, relative_path))
    }

    pub fn source(&self) -> Result<String> {
        fs::read_to_string(&self.program_path)
            .with_context(|| format!("Reading {}", self.program_path.display()))
    }

    /// The expected stdout, or an empty string when the case names none.
    pub fn expected_stdout(&self) -> Result<String> {
        match self.spec.expected.stdout_file.as_deref() {
            Some(file) => Ok(normalize_output(&self.read_text(file)?)),
            None => Ok(String::new()),
        }
    }

    pub fn is_backend_unsupported(&self, backend: &str) -> bool {
        self.spec
            .unsupported_backends
            .iter()
            .any(|name| name == backend)
    }

    /// Checks that the case is internally consistent before it is run.
    pub fn validate(&self, known_backends: &[&str]) -> Result<()> {
        for backend in &self.spec.unsupported_backends {
            ensure!(
                known_backends.contains(&backend.as_str()),
                "Case {} lists unknown backend '{}'",
                self.name,
                backend
            );
        }
        let expected = &self.spec.expected;
        match self.spec.class {
            CaseClass::RuntimeSuccess => {
                ensure!(
                    expected.stdout_file.is_some(),
                    "Case {} is runtime_success but has no stdout_file",
                    self.name
                );
                ensure!(
                    expected.stage.is_none() && expected.error_contains.is_none(),
                    "Case {} is runtime_success but expects an error",
                    self.name
                );
            }
            CaseClass::CompileError => {
                ensure!(
                    matches!(
                        expected.stage,
                        Some(Stage::Lex | Stage::Parse | Stage::Semantic | Stage::Lowering)
                    ),
                    "Case {} is compile_error but names no compile stage",
                    self.name
                );
            }
            CaseClass::RuntimeError => {
                ensure!(
                    matches!(expected.stage, None | Some(Stage::Runtime)),
                    "Case {} is runtime_error but names a compile stage",
                    self.name
                );
            }
        }
        if self.spec.bench.enabled {
            ensure!(
                !self.spec.bench.tags.is_empty(),
                "Case {} has bench enabled but no tags",
                self.name
            );
        }
        Ok(())
    }
}

pub fn normalize_output(output: &str) -> String {
    output.replace("\r\n", "\n").trim_end().to_string()
}

pub fn load_cases(programs_dir: &Path) -> Result<Vec<Case>> {
    let mut cases = Vec::new();

    for entry in
        fs::read_dir(programs_dir).with_context(|| format!("Reading {}", programs_dir.display()))?
    {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }

        let case_path = path.join("case.yaml");
        if !case_path.exists() {
            continue;
        }

        let program_path = path.join("program.py");
        ensure!(
            program_path.exists(),
            "Missing program.py for case {}",
            path.display()
        );

        let name = path
            .file_name()
            .and_then(|value| value.to_str())
            .map(str::to_string)
            .with_context(|| format!("Invalid case directory name {}", path.display()))?;
        let raw = fs::read_to_string(&case_path)
            .with_context(|| format!("Reading {}", case_path.display()))?;
        let spec: CaseSpec = serde_yaml::from_str(&raw)
            .with_context(|| format!("Parsing {}", case_path.display()))?;

        cases.push(Case {
            name,
            dir: path,
            program_path,
            spec,
        });
    }

    ensure!(
        !cases.is_empty(),
        "No test cases found in {}",
        programs_dir.display()
    );
    cases.sort_by(|left, right| left.name.cmp(&right.name));
    Ok(cases)
}

/// Cases opted into benchmarking, optionally filtered to one tag.
pub fn bench_cases(programs_dir: &Path, tag: Option<&str>) -> Result<Vec<Case>> {
    Ok(load_cases(programs_dir)?
        .into_iter()
        .filter(|case| case.spec.bench.enabled)
        .filter(|case| tag.is_none_or(|tag| case.spec.bench.tags.iter().any(|t| t == tag)))
        .collect())
}
