//! AST-to-AST rewrites: constant folding, constant-condition `if` splicing,
//! and truncation after `return` inside function and method bodies.
//!
//! Loops are only optimized structurally. A `while` with a constant condition
//! is kept as written; removing or unrolling it could change whether the
//! program terminates.

use tracing::debug;

use crate::ast::{ClassDef, Expression, FunctionDef, Program, Statement};

#[derive(Debug, Default)]
pub struct Optimizer {
    folded: usize,
    spliced: usize,
}

impl Optimizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn optimize_program(mut self, program: Program) -> Program {
        let statements = self.optimize_block(program.statements, false);
        debug!(
            folded = self.folded,
            spliced = self.spliced,
            statements = statements.len(),
            "optimized program"
        );
        Program { statements }
    }

    fn optimize_block(&mut self, statements: Vec<Statement>, in_function: bool) -> Vec<Statement> {
        let mut optimized = Vec::with_capacity(statements.len());
        for statement in statements {
            self.optimize_statement(statement, in_function, &mut optimized);
            // Anything after a return in the same block is unreachable.
            if in_function && matches!(optimized.last(), Some(Statement::Return(_))) {
                break;
            }
        }
        optimized
    }

    fn optimize_statement(
        &mut self,
        statement: Statement,
        in_function: bool,
        out: &mut Vec<Statement>,
    ) {
        let statement = match statement {
            Statement::Assign { name, value } => Statement::Assign {
                name,
                value: self.fold(value),
            },
            Statement::IndexAssign { name, index, value } => Statement::IndexAssign {
                name,
                index: self.fold(index),
                value: self.fold(value),
            },
            Statement::AttributeAssign {
                object,
                name,
                value,
            } => Statement::AttributeAssign {
                object,
                name,
                value: self.fold(value),
            },
            Statement::Print(value) => Statement::Print(self.fold(value)),
            Statement::Expr(value) => Statement::Expr(self.fold(value)),
            Statement::Return(value) => Statement::Return(value.map(|value| self.fold(value))),
            Statement::If {
                condition,
                body,
                else_body,
            } => {
                let condition = self.fold(condition);
                let taken = match &condition {
                    Expression::Number(value) => Some(value.is_truthy()),
                    Expression::Boolean(value) => Some(*value),
                    _ => None,
                };
                if let Some(taken) = taken {
                    self.spliced += 1;
                    let branch = if taken { body } else { else_body };
                    out.extend(self.optimize_block(branch, in_function));
                    return;
                }
                Statement::If {
                    condition,
                    body: self.optimize_block(body, in_function),
                    else_body: self.optimize_block(else_body, in_function),
                }
            }
            Statement::While { condition, body } => Statement::While {
                condition: self.fold(condition),
                body: self.optimize_block(body, in_function),
            },
            Statement::For {
                variable,
                start,
                end,
                body,
            } => Statement::For {
                variable,
                start: self.fold(start),
                end: self.fold(end),
                body: self.optimize_block(body, in_function),
            },
            Statement::FunctionDef(function) => {
                Statement::FunctionDef(self.optimize_function(function))
            }
            Statement::ClassDef(class) => Statement::ClassDef(ClassDef {
                name: class.name,
                methods: class
                    .methods
                    .into_iter()
                    .map(|method| self.optimize_function(method))
                    .collect(),
            }),
            Statement::Pass => Statement::Pass,
        };
        out.push(statement);
    }

    fn optimize_function(&mut self, function: FunctionDef) -> FunctionDef {
        FunctionDef {
            name: function.name,
            params: function.params,
            body: self.optimize_block(function.body, true),
        }
    }

    fn fold(&mut self, expression: Expression) -> Expression {
        match expression {
            Expression::BinaryOp { left, op, right } => {
                let left = self.fold(*left);
                let right = self.fold(*right);
                // A fold that would fail is left for the VM to report at run time.
                if let (Expression::Number(lhs), Expression::Number(rhs)) = (&left, &right)
                    && let Ok(value) = lhs.apply(op, *rhs)
                {
                    self.folded += 1;
                    return Expression::Number(value);
                }
                Expression::BinaryOp {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                }
            }
            Expression::Compare { left, op, right } => Expression::Compare {
                left: Box::new(self.fold(*left)),
                op,
                right: Box::new(self.fold(*right)),
            },
            Expression::Call { name, args } => Expression::Call {
                name,
                args: self.fold_all(args),
            },
            Expression::List(elements) => Expression::List(self.fold_all(elements)),
            Expression::Index { name, index } => Expression::Index {
                name,
                index: Box::new(self.fold(*index)),
            },
            Expression::MethodCall {
                object,
                method,
                args,
            } => Expression::MethodCall {
                object,
                method,
                args: self.fold_all(args),
            },
            leaf @ (Expression::Number(_)
            | Expression::Boolean(_)
            | Expression::Variable(_)
            | Expression::Attribute { .. }) => leaf,
        }
    }

    fn fold_all(&mut self, expressions: Vec<Expression>) -> Vec<Expression> {
        expressions
            .into_iter()
            .map(|expression| self.fold(expression))
            .collect()
    }
}

pub fn optimize(program: Program) -> Program {
    Optimizer::new().optimize_program(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BinaryOperator;
    use crate::number::Number;
    use crate::parser::parse;
    use indoc::indoc;

    fn optimized(source: &str) -> Vec<Statement> {
        optimize(parse(source).expect("parse failed")).statements
    }

    fn print_of(value: Number) -> Statement {
        Statement::Print(Expression::Number(value))
    }

    #[test]
    fn folds_nested_arithmetic() {
        assert_eq!(
            optimized("print(2 * (3 + 4) - 1)\n"),
            vec![print_of(Number::Int(13))]
        );
    }

    #[test]
    fn folds_with_true_division() {
        assert_eq!(optimized("print(7 / 2)\n"), vec![print_of(Number::Float(3.5))]);
    }

    #[test]
    fn keeps_folds_that_would_fail() {
        assert_eq!(
            optimized("print(1 / 0)\n"),
            vec![Statement::Print(Expression::BinaryOp {
                left: Box::new(Expression::Number(Number::Int(1))),
                op: BinaryOperator::Div,
                right: Box::new(Expression::Number(Number::Int(0))),
            })]
        );
    }

    #[test]
    fn folds_partially_constant_expressions() {
        let statements = optimized("x = 1\nprint(x + 2 * 3)\n");
        assert_eq!(
            statements[1],
            Statement::Print(Expression::BinaryOp {
                left: Box::new(Expression::Variable("x".to_string())),
                op: BinaryOperator::Add,
                right: Box::new(Expression::Number(Number::Int(6))),
            })
        );
    }

    #[test]
    fn splices_taken_branch_of_constant_if() {
        let source = indoc! {"
            print(1)
            if 1 - 1:
                print(2)
            else:
                print(3)
                print(4)
            if True:
                print(5)
            print(6)
        "};
        let expected = [1, 3, 4, 5, 6]
            .into_iter()
            .map(|value| print_of(Number::Int(value)))
            .collect::<Vec<_>>();
        assert_eq!(optimized(source), expected);
    }

    #[test]
    fn keeps_if_with_dynamic_condition() {
        let statements = optimized("x = 1\nif x:\n    print(1 + 1)\n");
        assert_eq!(
            statements[1],
            Statement::If {
                condition: Expression::Variable("x".to_string()),
                body: vec![print_of(Number::Int(2))],
                else_body: vec![],
            }
        );
    }

    #[test]
    fn drops_statements_after_return_in_functions() {
        let source = indoc! {"
            def f(x):
                if x:
                    return 1
                    print(99)
                return 2
                print(100)
        "};
        let Statement::FunctionDef(function) = &optimized(source)[0] else {
            panic!("expected function definition");
        };
        assert_eq!(function.body.len(), 2);
        let Statement::If { body, .. } = &function.body[0] else {
            panic!("expected if statement");
        };
        assert_eq!(
            body,
            &vec![Statement::Return(Some(Expression::Number(Number::Int(1))))]
        );
    }

    #[test]
    fn spliced_return_truncates_enclosing_block() {
        let source = indoc! {"
            def f():
                if 1:
                    return 1
                return 2
        "};
        let Statement::FunctionDef(function) = &optimized(source)[0] else {
            panic!("expected function definition");
        };
        assert_eq!(
            function.body,
            vec![Statement::Return(Some(Expression::Number(Number::Int(1))))]
        );
    }

    #[test]
    fn keeps_constant_while_loops() {
        let statements = optimized("while 0:\n    print(1)\n");
        assert!(matches!(&statements[0], Statement::While { condition, .. }
            if *condition == Expression::Number(Number::Int(0))));
    }

    #[test]
    fn leaves_minimal_programs_unchanged() {
        let source = indoc! {"
            x = 3
            while x > 0:
                print(x)
                x = x - 1
        "};
        let program = parse(source).expect("parse failed");
        assert_eq!(optimize(program.clone()), program);
    }
}
