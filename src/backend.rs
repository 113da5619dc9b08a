use anyhow::Result;

use crate::ast::Program;
use crate::config::Config;

pub use crate::interpreter;
pub use crate::vm;

/// Executable artifact produced by a backend `prepare` step.
///
/// This keeps compilation and execution separated so benchmarks and tests can
/// measure prepare and run phases independently.
pub trait PreparedBackend {
    fn run(&self) -> Result<String>;
}

/// Common interface implemented by each execution backend.
///
/// `prepare` takes a semantically checked AST and builds backend-owned
/// executable state; `run` is the one-shot convenience path.
pub trait Backend {
    fn name(&self) -> &'static str;
    fn prepare(&self, program: &Program) -> Result<Box<dyn PreparedBackend>>;

    fn run(&self, program: &Program) -> Result<String> {
        self.prepare(program)?.run()
    }
}

pub fn backends() -> Vec<Box<dyn Backend>> {
    backends_with(Config::default())
}

/// Every backend, configured from `config`.
pub fn backends_with(config: Config) -> Vec<Box<dyn Backend>> {
    vec![
        Box::new(crate::interpreter::Interpreter::with_limits(config.vm)),
        Box::new(crate::vm::VM::with_config(config)),
    ]
}

/// Looks a backend up by the name it reports from [`Backend::name`].
pub fn by_name(name: &str, config: Config) -> Option<Box<dyn Backend>> {
    backends_with(config)
        .into_iter()
        .find(|backend| backend.name() == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline;
    use crate::runtime::ExecutionError;

    #[test]
    fn finds_backends_by_reported_name() {
        let names: Vec<_> = backends().iter().map(|backend| backend.name()).collect();
        assert_eq!(names, ["interpreter", "vm"]);
        for name in names {
            let backend = by_name(name, Config::default()).expect("known backend");
            assert_eq!(backend.name(), name);
        }
        assert!(by_name("jit", Config::default()).is_none());
    }

    #[test]
    fn runtime_failures_keep_partial_output() {
        let program = pipeline::analyze("print(1)\nprint(1 / 0)\n").expect("analyze");
        for backend in backends() {
            let error = backend.run(&program).expect_err("division by zero");
            let execution = error
                .downcast_ref::<ExecutionError>()
                .expect("execution error");
            assert_eq!(execution.output, "1", "{}", backend.name());
        }
    }
}
