use proptest::prelude::*;

use tinypy::config::{CompileOptions, Config, Lowering};
use tinypy::interpreter::Interpreter;
use tinypy::{Error, optimizer, pipeline};

fn expression() -> impl Strategy<Value = String> {
    let leaf = prop_oneof![
        (0i64..50).prop_map(|value| value.to_string()),
        Just("x".to_string()),
        Just("True".to_string()),
        Just("-3".to_string()),
    ];
    leaf.prop_recursive(4, 24, 2, |inner| {
        (
            inner.clone(),
            prop::sample::select(vec!["+", "-", "*", "/"]),
            inner,
        )
            .prop_map(|(left, op, right)| format!("({left} {op} {right})"))
    })
}

fn comparison() -> impl Strategy<Value = String> {
    (
        expression(),
        prop::sample::select(vec!["<", ">", "<=", ">=", "==", "!="]),
        expression(),
    )
        .prop_map(|(left, op, right)| format!("{left} {op} {right}"))
}

fn program() -> impl Strategy<Value = String> {
    (expression(), comparison(), expression()).prop_map(|(value, condition, other)| {
        format!(
            "x = 7\ny = {value}\nprint(y)\n\
             if {condition}:\n    print({other})\nelse:\n    print(0)\n"
        )
    })
}

/// Output on success, or the stage and message of the failure.
fn outcome(result: Result<String, Error>) -> Result<String, String> {
    result.map_err(|error| format!("{}: {error} after '{}'", error.stage(), error.partial_output()))
}

fn with_options(optimize: bool, lowering: Lowering) -> Config {
    Config {
        compile: CompileOptions { optimize, lowering },
        ..Config::default()
    }
}

proptest! {
    #[test]
    fn folding_preserves_behaviour(source in program()) {
        let folded = outcome(pipeline::run(&source, &with_options(true, Lowering::Ir)));
        let unfolded = outcome(pipeline::run(&source, &with_options(false, Lowering::Ir)));
        prop_assert_eq!(folded, unfolded);
    }

    #[test]
    fn lowerings_agree(source in program()) {
        let via_ir = outcome(pipeline::run(&source, &with_options(false, Lowering::Ir)));
        let direct = outcome(pipeline::run(&source, &with_options(false, Lowering::Direct)));
        prop_assert_eq!(via_ir, direct);
    }

    #[test]
    fn optimizer_is_idempotent(source in program()) {
        let program = pipeline::analyze(&source).expect("generated programs are valid");
        let once = optimizer::optimize(program);
        let twice = optimizer::optimize(once.clone());
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn vm_matches_interpreter(source in program()) {
        let program = pipeline::analyze(&source).expect("generated programs are valid");
        let vm = pipeline::run(&source, &Config::default())
            .map_err(|error| (error.to_string(), error.partial_output().to_string()));
        let interpreted = Interpreter::new()
            .run_program(&program)
            .map_err(|error| (error.to_string(), error.output));
        prop_assert_eq!(vm, interpreted);
    }
}
