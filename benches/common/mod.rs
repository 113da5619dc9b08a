#![allow(dead_code)]
use std::path::Path;

use tinypy::ast::Program;
use tinypy::fixtures::{self, Case};
use tinypy::pipeline;

pub struct Workload {
    pub label: String,
    pub source: String,
    pub program: Program,
}

/// Restricts benches to cases carrying this tag, e.g. `loops`.
const TAG_ENV: &str = "TINYPY_BENCH_TAG";

/// Fixture cases tagged for benchmarking, read and checked once up front.
pub fn workloads() -> Vec<Workload> {
    let tag = std::env::var(TAG_ENV).ok();
    fixtures::bench_cases(Path::new("tests/programs"), tag.as_deref())
        .unwrap_or_else(|err| panic!("load bench cases: {err:#}"))
        .iter()
        .map(load)
        .collect()
}

fn load(case: &Case) -> Workload {
    let source = case
        .source()
        .unwrap_or_else(|err| panic!("read {}: {err:#}", case.name));
    let program =
        pipeline::analyze(&source).unwrap_or_else(|err| panic!("analyze {}: {err}", case.name));
    Workload {
        label: case.name.clone(),
        source,
        program,
    }
}
