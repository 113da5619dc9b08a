//! Scope-aware checks that run between parsing and optimization.
//!
//! Names become visible from their definition point onward. Every block (if
//! arm, else arm, loop body, function body) opens its own scope, so a name
//! assigned only inside a block is not visible after it.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::ast::{ClassDef, Expression, FunctionDef, Program, SELF_PARAM, Statement};
use crate::builtins::BuiltinFunction;

mod error;

pub use error::{SemanticError, SemanticResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Callable {
    Function(usize),
    Class(usize),
}

impl Callable {
    fn arity(self) -> usize {
        match self {
            Callable::Function(arity) | Callable::Class(arity) => arity,
        }
    }
}

pub struct SemanticAnalyzer {
    scopes: Vec<FxHashSet<String>>,
    callables: FxHashMap<String, Callable>,
    in_function: bool,
}

impl Default for SemanticAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SemanticAnalyzer {
    pub fn new() -> Self {
        let callables = BuiltinFunction::ALL
            .iter()
            .map(|builtin| (builtin.name().to_string(), Callable::Function(builtin.arity())))
            .collect();
        Self {
            scopes: vec![FxHashSet::default()],
            callables,
            in_function: false,
        }
    }

    pub fn check_program(mut self, program: &Program) -> SemanticResult<()> {
        self.check_statements(&program.statements)?;
        debug!(callables = self.callables.len(), "semantic check passed");
        Ok(())
    }

    fn check_statements(&mut self, statements: &[Statement]) -> SemanticResult<()> {
        statements
            .iter()
            .try_for_each(|statement| self.check_statement(statement))
    }

    fn check_statement(&mut self, statement: &Statement) -> SemanticResult<()> {
        match statement {
            Statement::Assign { name, value } => {
                self.check_expression(value)?;
                self.declare(name);
                Ok(())
            }
            Statement::IndexAssign { name, index, value } => {
                self.require_declared(name)?;
                self.check_expression(index)?;
                self.check_expression(value)
            }
            Statement::AttributeAssign { object, value, .. } => {
                self.require_declared(object)?;
                self.check_expression(value)
            }
            Statement::Print(value) | Statement::Expr(value) => self.check_expression(value),
            Statement::If {
                condition,
                body,
                else_body,
            } => {
                self.check_expression(condition)?;
                self.scoped(|this| this.check_statements(body))?;
                self.scoped(|this| this.check_statements(else_body))
            }
            Statement::While { condition, body } => {
                self.check_expression(condition)?;
                self.scoped(|this| this.check_statements(body))
            }
            Statement::For {
                variable,
                start,
                end,
                body,
            } => {
                self.check_expression(start)?;
                self.check_expression(end)?;
                self.scoped(|this| {
                    this.declare(variable);
                    this.check_statements(body)
                })
            }
            Statement::FunctionDef(function) => self.check_function_def(function),
            Statement::ClassDef(class) => self.check_class_def(class),
            Statement::Return(value) => {
                if !self.in_function {
                    return Err(SemanticError::ReturnOutsideFunction);
                }
                value
                    .as_ref()
                    .map_or(Ok(()), |value| self.check_expression(value))
            }
            Statement::Pass => Ok(()),
        }
    }

    fn check_function_def(&mut self, function: &FunctionDef) -> SemanticResult<()> {
        if self.in_function {
            return Err(SemanticError::NestedDefinition {
                name: function.name.clone(),
            });
        }
        if self.callables.contains_key(&function.name) {
            return Err(SemanticError::DuplicateFunction {
                name: function.name.clone(),
            });
        }
        // Registered before the body so recursion resolves.
        self.callables.insert(
            function.name.clone(),
            Callable::Function(function.params.len()),
        );
        self.check_body(function)
    }

    fn check_class_def(&mut self, class: &ClassDef) -> SemanticResult<()> {
        if self.in_function {
            return Err(SemanticError::NestedDefinition {
                name: class.name.clone(),
            });
        }
        if self.callables.contains_key(&class.name) {
            return Err(SemanticError::DuplicateClass {
                name: class.name.clone(),
            });
        }

        let mut seen = FxHashSet::default();
        for method in &class.methods {
            if !seen.insert(method.name.as_str()) {
                return Err(SemanticError::DuplicateMethod {
                    class: class.name.clone(),
                    method: method.name.clone(),
                });
            }
            if method.params.first().map(String::as_str) != Some(SELF_PARAM) {
                return Err(SemanticError::MissingSelf {
                    class: class.name.clone(),
                    method: method.name.clone(),
                });
            }
        }

        self.callables.insert(
            class.name.clone(),
            Callable::Class(class.constructor_arity()),
        );
        class
            .methods
            .iter()
            .try_for_each(|method| self.check_body(method))
    }

    fn check_body(&mut self, function: &FunctionDef) -> SemanticResult<()> {
        self.scoped(|this| {
            for param in &function.params {
                this.declare(param);
            }
            this.in_function = true;
            let result = this.check_statements(&function.body);
            this.in_function = false;
            result
        })
    }

    fn check_expression(&mut self, expression: &Expression) -> SemanticResult<()> {
        match expression {
            Expression::Number(_) | Expression::Boolean(_) => Ok(()),
            Expression::Variable(name) => self.require_declared(name),
            Expression::BinaryOp { left, right, .. } | Expression::Compare { left, right, .. } => {
                self.check_expression(left)?;
                self.check_expression(right)
            }
            Expression::Call { name, args } => {
                self.check_arguments(args)?;
                let callable = self
                    .callables
                    .get(name)
                    .ok_or_else(|| SemanticError::UndeclaredFunction { name: name.clone() })?;
                if callable.arity() != args.len() {
                    return Err(SemanticError::ArityMismatch {
                        name: name.clone(),
                        expected: callable.arity(),
                        found: args.len(),
                    });
                }
                Ok(())
            }
            Expression::List(elements) => self.check_arguments(elements),
            Expression::Index { name, index } => {
                self.require_declared(name)?;
                self.check_expression(index)
            }
            Expression::Attribute { object, .. } => self.require_declared(object),
            // Methods resolve against the receiver's class at run time.
            Expression::MethodCall { object, args, .. } => {
                self.require_declared(object)?;
                self.check_arguments(args)
            }
        }
    }

    fn check_arguments(&mut self, args: &[Expression]) -> SemanticResult<()> {
        args.iter().try_for_each(|arg| self.check_expression(arg))
    }

    fn scoped<T>(
        &mut self,
        check: impl FnOnce(&mut Self) -> SemanticResult<T>,
    ) -> SemanticResult<T> {
        self.scopes.push(FxHashSet::default());
        let result = check(self);
        self.scopes.pop();
        result
    }

    fn declare(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string());
        }
    }

    fn require_declared(&self, name: &str) -> SemanticResult<()> {
        if self.scopes.iter().rev().any(|scope| scope.contains(name)) {
            Ok(())
        } else {
            Err(SemanticError::UndeclaredVariable {
                name: name.to_string(),
            })
        }
    }
}

pub fn check(program: &Program) -> SemanticResult<()> {
    SemanticAnalyzer::new().check_program(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use indoc::indoc;

    fn check_source(source: &str) -> SemanticResult<()> {
        check(&parse(source).expect("parse failed"))
    }

    #[test]
    fn accepts_well_formed_program() {
        let source = indoc! {"
            def fact(n):
                if n <= 1:
                    return 1
                return n * fact(n - 1)
            total = 0
            for i in range(3):
                total = total + fact(i)
            print(total)
            print(len([1, 2]))
        "};
        assert_eq!(check_source(source), Ok(()));
    }

    #[test]
    fn name_assigned_in_if_arm_is_not_visible_after() {
        let source = indoc! {"
            if 1:
                x = 5
            print(x)
        "};
        assert_eq!(
            check_source(source),
            Err(SemanticError::UndeclaredVariable {
                name: "x".to_string()
            })
        );
    }

    #[test]
    fn names_are_visible_only_after_assignment() {
        assert_eq!(
            check_source("y = x\nx = 1\n"),
            Err(SemanticError::UndeclaredVariable {
                name: "x".to_string()
            })
        );
    }

    #[test]
    fn function_bodies_see_globals_defined_before_them() {
        let source = indoc! {"
            limit = 3
            def under(n):
                return n < limit
            print(under(2))
        "};
        assert_eq!(check_source(source), Ok(()));
    }

    #[test]
    fn rejects_duplicate_function() {
        let source = indoc! {"
            def f():
                return 1
            def f():
                return 2
        "};
        assert_eq!(
            check_source(source),
            Err(SemanticError::DuplicateFunction {
                name: "f".to_string()
            })
        );
    }

    #[test]
    fn rejects_duplicate_class() {
        let source = indoc! {"
            class A:
                pass
            class A:
                pass
        "};
        assert_eq!(
            check_source(source),
            Err(SemanticError::DuplicateClass {
                name: "A".to_string()
            })
        );
    }

    #[test]
    fn definitions_in_untaken_branches_are_accepted() {
        let source = indoc! {"
            flag = 0
            if flag > 1:
                def helper():
                    return 1
            print(helper())
        "};
        assert_eq!(check_source(source), Ok(()));
    }

    #[test]
    fn builtin_names_cannot_be_redefined() {
        let source = "def len(x):\n    return 0\n";
        assert!(matches!(
            check_source(source),
            Err(SemanticError::DuplicateFunction { .. })
        ));
    }

    #[test]
    fn checks_call_arity() {
        let source = "def add(a, b):\n    return a + b\nprint(add(1))\n";
        assert_eq!(
            check_source(source),
            Err(SemanticError::ArityMismatch {
                name: "add".to_string(),
                expected: 2,
                found: 1,
            })
        );
        assert!(matches!(
            check_source("print(len([1], [2]))\n"),
            Err(SemanticError::ArityMismatch { expected: 1, found: 2, .. })
        ));
    }

    #[test]
    fn rejects_calls_to_unknown_functions() {
        assert_eq!(
            check_source("print(missing(1))\n"),
            Err(SemanticError::UndeclaredFunction {
                name: "missing".to_string()
            })
        );
    }

    #[test]
    fn rejects_return_at_top_level() {
        assert_eq!(
            check_source("return 1\n"),
            Err(SemanticError::ReturnOutsideFunction)
        );
    }

    #[test]
    fn rejects_nested_definitions() {
        let source = indoc! {"
            def outer():
                def inner():
                    return 1
                return inner()
        "};
        assert_eq!(
            check_source(source),
            Err(SemanticError::NestedDefinition {
                name: "inner".to_string()
            })
        );
    }

    #[test]
    fn checks_classes() {
        let source = indoc! {"
            class Counter:
                def __init__(self, start):
                    self.value = start
                def bump(self):
                    self.value = self.value + 1
                    return self.value
            c = Counter(1)
            print(c.bump())
        "};
        assert_eq!(check_source(source), Ok(()));

        let source = "class A:\n    pass\na = A(1)\n";
        assert_eq!(
            check_source(source),
            Err(SemanticError::ArityMismatch {
                name: "A".to_string(),
                expected: 0,
                found: 1,
            })
        );
    }

    #[test]
    fn methods_need_self_and_unique_names() {
        let source = "class A:\n    def f(x):\n        return x\n";
        assert!(matches!(
            check_source(source),
            Err(SemanticError::MissingSelf { .. })
        ));

        let source = indoc! {"
            class A:
                def f(self):
                    pass
                def f(self):
                    pass
        "};
        assert_eq!(
            check_source(source),
            Err(SemanticError::DuplicateMethod {
                class: "A".to_string(),
                method: "f".to_string(),
            })
        );
    }

    #[test]
    fn index_assignment_requires_declared_target() {
        assert_eq!(
            check_source("l[0] = 1\n"),
            Err(SemanticError::UndeclaredVariable {
                name: "l".to_string()
            })
        );
    }
}
