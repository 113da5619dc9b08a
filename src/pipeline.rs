//! Entry points that chain the stages together.
//!
//! [`compile`] runs every front-end stage and stops at the first error;
//! [`execute`] runs the result on a fresh VM. [`run`] does both.

use tracing::{debug, info};

use crate::ast::Program;
use crate::bytecode::{BytecodeGenerator, CompiledProgram};
use crate::config::{CompileOptions, Config, Lowering, VmConfig};
use crate::error::{CompileError, Error};
use crate::runtime::ExecutionError;
use crate::vm::VM;
use crate::{ir, ir_to_bytecode, optimizer, parser, semantic};

/// Lexes, parses and checks `source`, returning the unoptimized AST.
pub fn analyze(source: &str) -> Result<Program, CompileError> {
    let program = parser::parse(source)?;
    semantic::check(&program)?;
    Ok(program)
}

pub fn compile(source: &str, options: &CompileOptions) -> Result<CompiledProgram, CompileError> {
    let program = analyze(source)?;
    compile_program(program, options)
}

/// Optimizes and lowers an already checked program.
pub fn compile_program(
    program: Program,
    options: &CompileOptions,
) -> Result<CompiledProgram, CompileError> {
    let program = if options.optimize {
        optimizer::optimize(program)
    } else {
        program
    };
    let compiled = match options.lowering {
        Lowering::Ir => {
            let ir = ir::lower(&program);
            ir_to_bytecode::convert_program(&ir)?
        }
        Lowering::Direct => BytecodeGenerator::new().generate_program(&program),
    };
    info!(
        lowering = ?options.lowering,
        optimize = options.optimize,
        main = compiled.main.len(),
        "compiled program"
    );
    Ok(compiled)
}

pub fn execute(program: &CompiledProgram, config: &VmConfig) -> Result<String, ExecutionError> {
    let config = Config {
        vm: *config,
        ..Config::default()
    };
    VM::with_config(config).run_compiled(program)
}

pub fn run(source: &str, config: &Config) -> Result<String, Error> {
    let compiled = compile(source, &config.compile)?;
    let output = execute(&compiled, &config.vm)?;
    debug!(bytes = output.len(), "program finished");
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Stage;
    use indoc::indoc;

    fn both_lowerings() -> [Config; 2] {
        let direct = Config {
            compile: CompileOptions {
                optimize: true,
                lowering: Lowering::Direct,
            },
            ..Config::default()
        };
        [Config::default(), direct]
    }

    #[test]
    fn runs_reference_scenarios() {
        let scenarios = [
            ("x = 2\ny = 3\nprint(x + y)\n", "5"),
            ("if 1 < 2:\n    print(10)\nelse:\n    print(20)\n", "10"),
            ("def add(a, b):\n    return a + b\nprint(add(4, 5))\n", "9"),
            (
                concat!(
                    "def f(n):\n    if n <= 1:\n        return 1\n",
                    "    return n * f(n - 1)\nprint(f(5))\n",
                ),
                "120",
            ),
            ("a = [1, 2, 3]\na[1] = 7\nprint(a[1])\n", "7"),
            ("print(2 * 3 + 4)\n", "10"),
        ];
        for config in both_lowerings() {
            for (source, expected) in scenarios {
                assert_eq!(run(source, &config).expect("run failed"), expected);
            }
        }
    }

    #[test]
    fn stops_at_first_failing_stage() {
        let cases = [
            ("x = 1 $ 2\n", Stage::Lex),
            ("x = (1 + 2\n", Stage::Parse),
            ("print(y)\n", Stage::Semantic),
            ("print(1)\nprint(1 / 0)\n", Stage::Runtime),
        ];
        for (source, stage) in cases {
            let err = run(source, &Config::default()).expect_err("expected failure");
            assert_eq!(err.stage(), stage, "{source:?}");
        }
    }

    #[test]
    fn runtime_failure_keeps_earlier_output() {
        let err = run("print(1)\nprint(1 / 0)\n", &Config::default()).expect_err("expected");
        assert_eq!(err.partial_output(), "1");
        assert_eq!(err.to_string(), "Runtime error: Division by zero");
    }

    #[test]
    fn optimizer_does_not_change_output() {
        let source = indoc! {"
            def f(x):
                return x * (2 + 3)
                print(99)
            if False:
                print(0)
            else:
                print(f(2) / 4)
        "};
        let mut unoptimized = Config::default();
        unoptimized.compile.optimize = false;
        assert_eq!(run(source, &Config::default()).expect("run"), "2.5");
        assert_eq!(run(source, &unoptimized).expect("run"), "2.5");
    }

    #[test]
    fn execute_is_repeatable() {
        let compiled = compile("a = [0]\na.append(1)\nprint(a)\n", &CompileOptions::default())
            .expect("compile");
        let first = execute(&compiled, &VmConfig::default()).expect("first run");
        let second = execute(&compiled, &VmConfig::default()).expect("second run");
        assert_eq!(first, "[0, 1]");
        assert_eq!(first, second);
    }
}
