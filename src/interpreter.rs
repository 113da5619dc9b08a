use anyhow::Result;
use rustc_hash::FxHashMap;

use crate::ast::{Program, Statement};
use crate::backend::{Backend, PreparedBackend};
use crate::config::VmConfig;
use crate::runtime::{ExecutionError, RuntimeError};

mod runtime;

use runtime::{Environment, ExecResult, InterpreterRuntime};

/// AST-walking backend that executes programs directly without compilation.
///
/// It shares the VM's value model and error types, so both backends agree on
/// output and on which runtime error a program stops with.
pub struct Interpreter {
    limits: VmConfig,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_limits(VmConfig::default())
    }

    pub fn with_limits(limits: VmConfig) -> Self {
        Self { limits }
    }

    /// Executes `program` and returns everything it printed.
    pub fn run_program(&self, program: &Program) -> Result<String, ExecutionError> {
        run_statements(&program.statements, self.limits)
    }
}

/// Prepared executable program for the tree-walking interpreter.
pub struct PreparedInterpreter {
    statements: Vec<Statement>,
    limits: VmConfig,
}

fn run_statements(statements: &[Statement], limits: VmConfig) -> Result<String, ExecutionError> {
    // run_statements -> exec_block -> exec_statement -> eval_expression
    // -> call -> exec_block (function body).
    let mut globals = FxHashMap::default();
    let mut environment = Environment::top_level(&mut globals);
    let mut runtime = InterpreterRuntime::new(limits);
    let result = match runtime.exec_block(statements, &mut environment) {
        Ok(ExecResult::Continue) => Ok(()),
        Ok(ExecResult::Return(_)) => Err(RuntimeError::ReturnOutsideFunction),
        Err(error) => Err(error),
    };
    let output = runtime.output.join("\n");
    match result {
        Ok(()) => Ok(output),
        Err(error) => Err(ExecutionError { error, output }),
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl PreparedBackend for PreparedInterpreter {
    fn run(&self) -> Result<String> {
        Ok(run_statements(&self.statements, self.limits)?)
    }
}

impl Backend for Interpreter {
    fn name(&self) -> &'static str {
        "interpreter"
    }

    fn prepare(&self, program: &Program) -> Result<Box<dyn PreparedBackend>> {
        Ok(Box::new(PreparedInterpreter {
            statements: program.statements.clone(),
            limits: self.limits,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::semantic;
    use indoc::indoc;

    fn run(source: &str) -> Result<String, ExecutionError> {
        let program = parse(source).expect("parse failed");
        semantic::check(&program).expect("semantic check failed");
        Interpreter::new().run_program(&program)
    }

    #[test]
    fn evaluates_assignment_and_print() {
        assert_eq!(run("n = 1 + 2\nprint(n)\n").expect("run failed"), "3");
    }

    #[test]
    fn executes_if_else_branches() {
        let source = indoc! {"
            x = 10
            if x > 5:
                print(1)
            else:
                print(0)
            if x < 5:
                print(2)
            else:
                print(3)
        "};
        assert_eq!(run(source).expect("run failed"), "1\n3");
    }

    #[test]
    fn range_bound_is_evaluated_once() {
        let source = indoc! {"
            n = 3
            for i in range(n):
                n = n + 1
                print(i)
            print(n)
        "};
        assert_eq!(run(source).expect("run failed"), "0\n1\n2\n6");
    }

    #[test]
    fn loop_variable_is_reset_each_iteration() {
        let source = indoc! {"
            for i in range(2):
                print(i)
                i = 100
        "};
        assert_eq!(run(source).expect("run failed"), "0\n1");
    }

    #[test]
    fn calls_recursive_functions() {
        let source = indoc! {"
            def fact(n):
                if n <= 1:
                    return 1
                return n * fact(n - 1)
            print(fact(10))
        "};
        assert_eq!(run(source).expect("run failed"), "3628800");
    }

    #[test]
    fn function_without_return_yields_none() {
        let source = indoc! {"
            def noop():
                pass
            print(noop())
        "};
        assert_eq!(run(source).expect("run failed"), "None");
    }

    #[test]
    fn constructors_return_the_instance() {
        let source = indoc! {"
            class Point:
                def __init__(self, x, y):
                    self.x = x
                    self.y = y
                    return 0
                def sum(self):
                    return self.x + self.y
            p = Point(3, 4)
            print(p.sum())
            class Empty:
                def hello(self):
                    print(7)
            e = Empty()
            e.hello()
        "};
        assert_eq!(run(source).expect("run failed"), "7\n7");
    }

    #[test]
    fn method_arity_counts_self() {
        let source = indoc! {"
            class A:
                def f(self, x):
                    return x
            a = A()
            a.f()
        "};
        let err = run(source).expect_err("expected arity error");
        assert_eq!(
            err.error,
            RuntimeError::ArityMismatch {
                name: "f".to_string(),
                expected: 2,
                found: 1,
            }
        );
    }

    #[test]
    fn runtime_error_keeps_partial_output() {
        let err = run("a = [1]\nprint(a[0])\nprint(a[3])\n").expect_err("expected error");
        assert_eq!(
            err.error,
            RuntimeError::IndexOutOfRange { index: 3, len: 1 }
        );
        assert_eq!(err.output, "1");
    }

    #[test]
    fn honours_step_and_depth_limits() {
        let program = parse("while True:\n    pass\n").expect("parse failed");
        let limited = Interpreter::with_limits(VmConfig {
            max_steps: Some(50),
            max_call_depth: None,
        });
        let err = limited.run_program(&program).expect_err("expected step error");
        assert_eq!(err.error, RuntimeError::StepLimitExceeded { limit: 50 });

        let program = parse("def f(n):\n    return f(n)\nf(1)\n").expect("parse failed");
        let limited = Interpreter::with_limits(VmConfig {
            max_steps: None,
            max_call_depth: Some(16),
        });
        let err = limited.run_program(&program).expect_err("expected depth error");
        assert_eq!(err.error, RuntimeError::CallDepthExceeded { limit: 16 });
    }

    #[test]
    fn backend_prepare_and_run() {
        let program = parse("print([1, 2] + [3])\n").expect("parse failed");
        let output = Interpreter::new().run(&program).expect("run failed");
        assert_eq!(output, "[1, 2, 3]");
    }
}
