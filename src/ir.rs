//! Three-address intermediate representation of the top-level program.
//!
//! Every operation writes a fresh temporary (`%tN`); a variable reference is
//! used by name without a copy. Control flow is positional, through symbolic
//! labels (`LN`) that the converter later resolves to instruction indices.
//! Function and class definitions are recorded for direct bytecode
//! compilation; only their DEFINE markers appear in the instruction stream.

use std::fmt;

use tracing::debug;

use crate::ast::{
    BinaryOperator, ClassDef, CompareOperator, Expression, FunctionDef, Program, Statement,
};
use crate::bytecode::Constant;
use crate::number::Number;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Temp(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(pub usize);

/// A value read by an instruction: a temporary or a named variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Temp(Temp),
    Var(String),
}

impl Operand {
    /// The frame variable holding this operand.
    pub fn slot(&self) -> String {
        match self {
            Operand::Temp(temp) => temp.to_string(),
            Operand::Var(name) => name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IrInstruction {
    Const {
        value: Constant,
        result: Temp,
    },
    Assign {
        source: Operand,
        target: Operand,
    },
    Binary {
        op: BinaryOperator,
        left: Operand,
        right: Operand,
        result: Temp,
    },
    Compare {
        op: CompareOperator,
        left: Operand,
        right: Operand,
        result: Temp,
    },
    Print(Operand),
    Label(Label),
    Jump(Label),
    JumpIfFalse {
        condition: Operand,
        target: Label,
    },
    BuildList {
        elements: Vec<Operand>,
        result: Temp,
    },
    LoadIndex {
        list: String,
        index: Operand,
        result: Temp,
    },
    StoreIndex {
        list: String,
        index: Operand,
        value: Operand,
    },
    Call {
        name: String,
        args: Vec<Operand>,
        result: Temp,
    },
    CallMethod {
        object: String,
        method: String,
        args: Vec<Operand>,
        result: Temp,
    },
    LoadAttr {
        object: String,
        name: String,
        result: Temp,
    },
    StoreAttr {
        object: String,
        name: String,
        value: Operand,
    },
    DefineFunction(String),
    DefineClass(String),
    Return(Option<Operand>),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct IrProgram {
    pub instructions: Vec<IrInstruction>,
    pub functions: Vec<FunctionDef>,
    pub classes: Vec<ClassDef>,
}

#[derive(Debug, Default)]
pub struct IrGenerator {
    program: IrProgram,
    temp_count: usize,
    label_count: usize,
    loop_count: usize,
}

impl IrGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generate(mut self, program: &Program) -> IrProgram {
        for statement in &program.statements {
            self.lower_statement(statement);
        }
        debug!(
            instructions = self.program.instructions.len(),
            temporaries = self.temp_count,
            labels = self.label_count,
            "lowered program to IR"
        );
        self.program
    }

    fn new_temp(&mut self) -> Temp {
        self.temp_count += 1;
        Temp(self.temp_count)
    }

    fn new_label(&mut self) -> Label {
        self.label_count += 1;
        Label(self.label_count)
    }

    fn emit(&mut self, instruction: IrInstruction) {
        self.program.instructions.push(instruction);
    }

    fn lower_block(&mut self, statements: &[Statement]) {
        for statement in statements {
            self.lower_statement(statement);
        }
    }

    fn lower_statement(&mut self, statement: &Statement) {
        match statement {
            Statement::Assign { name, value } => {
                let source = self.lower_expression(value);
                self.emit(IrInstruction::Assign {
                    source,
                    target: Operand::Var(name.clone()),
                });
            }
            Statement::IndexAssign { name, index, value } => {
                let index = self.lower_expression(index);
                let value = self.lower_expression(value);
                self.emit(IrInstruction::StoreIndex {
                    list: name.clone(),
                    index,
                    value,
                });
            }
            Statement::AttributeAssign {
                object,
                name,
                value,
            } => {
                let value = self.lower_expression(value);
                self.emit(IrInstruction::StoreAttr {
                    object: object.clone(),
                    name: name.clone(),
                    value,
                });
            }
            Statement::Print(value) => {
                let value = self.lower_expression(value);
                self.emit(IrInstruction::Print(value));
            }
            Statement::Expr(value) => {
                self.lower_expression(value);
            }
            Statement::If {
                condition,
                body,
                else_body,
            } => {
                let condition = self.lower_expression(condition);
                let else_label = self.new_label();
                let end_label = self.new_label();
                self.emit(IrInstruction::JumpIfFalse {
                    condition,
                    target: else_label,
                });
                self.lower_block(body);
                self.emit(IrInstruction::Jump(end_label));
                self.emit(IrInstruction::Label(else_label));
                self.lower_block(else_body);
                self.emit(IrInstruction::Label(end_label));
            }
            Statement::While { condition, body } => {
                let start_label = self.new_label();
                let end_label = self.new_label();
                self.emit(IrInstruction::Label(start_label));
                let condition = self.lower_expression(condition);
                self.emit(IrInstruction::JumpIfFalse {
                    condition,
                    target: end_label,
                });
                self.lower_block(body);
                self.emit(IrInstruction::Jump(start_label));
                self.emit(IrInstruction::Label(end_label));
            }
            Statement::For {
                variable,
                start,
                end,
                body,
            } => self.lower_for(variable, start, end, body),
            Statement::FunctionDef(function) => {
                self.program.functions.push(function.clone());
                self.emit(IrInstruction::DefineFunction(function.name.clone()));
            }
            Statement::ClassDef(class) => {
                self.program.classes.push(class.clone());
                self.emit(IrInstruction::DefineClass(class.name.clone()));
            }
            Statement::Return(value) => {
                let value = value.as_ref().map(|value| self.lower_expression(value));
                self.emit(IrInstruction::Return(value));
            }
            Statement::Pass => {}
        }
    }

    /// `for variable in range(end)`: the bound is read once and a hidden
    /// counter drives the loop, so the body may reassign `variable` freely.
    fn lower_for(
        &mut self,
        variable: &str,
        start: &Expression,
        end: &Expression,
        body: &[Statement],
    ) {
        self.loop_count += 1;
        let counter = Operand::Var(format!("%for{}", self.loop_count));

        let start = self.lower_expression(start);
        self.emit(IrInstruction::Assign {
            source: start,
            target: counter.clone(),
        });
        let bound = match self.lower_expression(end) {
            Operand::Var(name) => {
                let snapshot = self.new_temp();
                self.emit(IrInstruction::Assign {
                    source: Operand::Var(name),
                    target: Operand::Temp(snapshot),
                });
                Operand::Temp(snapshot)
            }
            temp => temp,
        };

        let start_label = self.new_label();
        let end_label = self.new_label();
        self.emit(IrInstruction::Label(start_label));
        let condition = self.new_temp();
        self.emit(IrInstruction::Compare {
            op: CompareOperator::Lt,
            left: counter.clone(),
            right: bound,
            result: condition,
        });
        self.emit(IrInstruction::JumpIfFalse {
            condition: Operand::Temp(condition),
            target: end_label,
        });
        self.emit(IrInstruction::Assign {
            source: counter.clone(),
            target: Operand::Var(variable.to_string()),
        });
        self.lower_block(body);

        let one = self.new_temp();
        self.emit(IrInstruction::Const {
            value: Constant::Number(Number::Int(1)),
            result: one,
        });
        let next = self.new_temp();
        self.emit(IrInstruction::Binary {
            op: BinaryOperator::Add,
            left: counter.clone(),
            right: Operand::Temp(one),
            result: next,
        });
        self.emit(IrInstruction::Assign {
            source: Operand::Temp(next),
            target: counter,
        });
        self.emit(IrInstruction::Jump(start_label));
        self.emit(IrInstruction::Label(end_label));
    }

    fn lower_expression(&mut self, expression: &Expression) -> Operand {
        let result = match expression {
            Expression::Variable(name) => return Operand::Var(name.clone()),
            Expression::Number(value) => self.constant(Constant::Number(*value)),
            Expression::Boolean(value) => self.constant(Constant::Bool(*value)),
            Expression::BinaryOp { left, op, right } => {
                let left = self.lower_expression(left);
                let right = self.lower_expression(right);
                let result = self.new_temp();
                self.emit(IrInstruction::Binary {
                    op: *op,
                    left,
                    right,
                    result,
                });
                result
            }
            Expression::Compare { left, op, right } => {
                let left = self.lower_expression(left);
                let right = self.lower_expression(right);
                let result = self.new_temp();
                self.emit(IrInstruction::Compare {
                    op: *op,
                    left,
                    right,
                    result,
                });
                result
            }
            Expression::Call { name, args } => {
                let args = self.lower_all(args);
                let result = self.new_temp();
                self.emit(IrInstruction::Call {
                    name: name.clone(),
                    args,
                    result,
                });
                result
            }
            Expression::List(elements) => {
                let elements = self.lower_all(elements);
                let result = self.new_temp();
                self.emit(IrInstruction::BuildList { elements, result });
                result
            }
            Expression::Index { name, index } => {
                let index = self.lower_expression(index);
                let result = self.new_temp();
                self.emit(IrInstruction::LoadIndex {
                    list: name.clone(),
                    index,
                    result,
                });
                result
            }
            Expression::Attribute { object, name } => {
                let result = self.new_temp();
                self.emit(IrInstruction::LoadAttr {
                    object: object.clone(),
                    name: name.clone(),
                    result,
                });
                result
            }
            Expression::MethodCall {
                object,
                method,
                args,
            } => {
                let args = self.lower_all(args);
                let result = self.new_temp();
                self.emit(IrInstruction::CallMethod {
                    object: object.clone(),
                    method: method.clone(),
                    args,
                    result,
                });
                result
            }
        };
        Operand::Temp(result)
    }

    fn lower_all(&mut self, expressions: &[Expression]) -> Vec<Operand> {
        expressions
            .iter()
            .map(|expression| self.lower_expression(expression))
            .collect()
    }

    fn constant(&mut self, value: Constant) -> Temp {
        let result = self.new_temp();
        self.emit(IrInstruction::Const { value, result });
        result
    }
}

pub fn lower(program: &Program) -> IrProgram {
    IrGenerator::new().generate(program)
}

impl fmt::Display for Temp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%t{}", self.0)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Temp(temp) => write!(f, "{temp}"),
            Operand::Var(name) => f.write_str(name),
        }
    }
}

fn join(operands: &[Operand]) -> String {
    operands
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for IrInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrInstruction::Const { value, result } => write!(f, "{result} = {value}"),
            IrInstruction::Assign { source, target } => write!(f, "{target} = {source}"),
            IrInstruction::Binary {
                op,
                left,
                right,
                result,
            } => write!(f, "{result} = {left} {op} {right}"),
            IrInstruction::Compare {
                op,
                left,
                right,
                result,
            } => write!(f, "{result} = {left} {op} {right}"),
            IrInstruction::Print(value) => write!(f, "print {value}"),
            IrInstruction::Label(label) => write!(f, "{label}:"),
            IrInstruction::Jump(label) => write!(f, "jump {label}"),
            IrInstruction::JumpIfFalse { condition, target } => {
                write!(f, "jump_if_false {condition} {target}")
            }
            IrInstruction::BuildList { elements, result } => {
                write!(f, "{result} = [{}]", join(elements))
            }
            IrInstruction::LoadIndex {
                list,
                index,
                result,
            } => write!(f, "{result} = {list}[{index}]"),
            IrInstruction::StoreIndex { list, index, value } => {
                write!(f, "{list}[{index}] = {value}")
            }
            IrInstruction::Call { name, args, result } => {
                write!(f, "{result} = call {name}({})", join(args))
            }
            IrInstruction::CallMethod {
                object,
                method,
                args,
                result,
            } => write!(f, "{result} = call {object}.{method}({})", join(args)),
            IrInstruction::LoadAttr {
                object,
                name,
                result,
            } => write!(f, "{result} = {object}.{name}"),
            IrInstruction::StoreAttr {
                object,
                name,
                value,
            } => write!(f, "{object}.{name} = {value}"),
            IrInstruction::DefineFunction(name) => write!(f, "define function {name}"),
            IrInstruction::DefineClass(name) => write!(f, "define class {name}"),
            IrInstruction::Return(Some(value)) => write!(f, "return {value}"),
            IrInstruction::Return(None) => write!(f, "return"),
        }
    }
}

impl fmt::Display for IrProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for instruction in &self.instructions {
            match instruction {
                IrInstruction::Label(_) => writeln!(f, "{instruction}")?,
                _ => writeln!(f, "    {instruction}")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use indoc::indoc;

    fn lowered(source: &str) -> IrProgram {
        lower(&parse(source).expect("parse failed"))
    }

    fn listing(ir: &IrProgram) -> Vec<String> {
        ir.instructions.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn variables_are_used_by_name() {
        let ir = lowered("x = 2\ny = 3\nprint(x + y)\n");
        assert_eq!(
            listing(&ir),
            ["%t1 = 2", "x = %t1", "%t2 = 3", "y = %t2", "%t3 = x + y", "print %t3"]
        );
    }

    #[test]
    fn lowers_if_else_with_label_pair() {
        let source = indoc! {"
            x = 1
            if x < 2:
                print(x)
            else:
                print(0)
        "};
        assert_eq!(
            lowered(source).to_string(),
            indoc! {"
                    %t1 = 1
                    x = %t1
                    %t2 = 2
                    %t3 = x < %t2
                    jump_if_false %t3 L1
                    print x
                    jump L2
                L1:
                    %t4 = 0
                    print %t4
                L2:
            "}
        );
    }

    #[test]
    fn lowers_while_loop() {
        let source = indoc! {"
            i = 0
            while i < 3:
                i = i + 1
        "};
        assert_eq!(
            lowered(source).to_string(),
            indoc! {"
                    %t1 = 0
                    i = %t1
                L1:
                    %t2 = 3
                    %t3 = i < %t2
                    jump_if_false %t3 L2
                    %t4 = 1
                    %t5 = i + %t4
                    i = %t5
                    jump L1
                L2:
            "}
        );
    }

    #[test]
    fn for_loop_snapshots_bound_and_uses_hidden_counter() {
        let source = indoc! {"
            n = 2
            for i in range(n):
                print(i)
        "};
        assert_eq!(
            lowered(source).to_string(),
            indoc! {"
                    %t1 = 2
                    n = %t1
                    %t2 = 0
                    %for1 = %t2
                    %t3 = n
                L1:
                    %t4 = %for1 < %t3
                    jump_if_false %t4 L2
                    i = %for1
                    print i
                    %t5 = 1
                    %t6 = %for1 + %t5
                    %for1 = %t6
                    jump L1
                L2:
            "}
        );
    }

    #[test]
    fn records_definitions_for_direct_compilation() {
        let source = indoc! {"
            def f(a):
                return a
            class P:
                pass
            p = P()
            p.x = f(1)
        "};
        let ir = lowered(source);
        assert_eq!(ir.functions.len(), 1);
        assert_eq!(ir.classes.len(), 1);
        assert_eq!(
            listing(&ir),
            [
                "define function f",
                "define class P",
                "%t1 = call P()",
                "p = %t1",
                "%t2 = 1",
                "%t3 = call f(%t2)",
                "p.x = %t3",
            ]
        );
    }

    #[test]
    fn temporaries_are_assigned_once() {
        let source = indoc! {"
            l = [1, 2, 3]
            l[0] = l[1] * 2
            for i in range(3):
                if i == 1:
                    print(len(l))
        "};
        let ir = lowered(source);
        let mut seen = std::collections::HashSet::new();
        for instruction in &ir.instructions {
            let written = match instruction {
                IrInstruction::Const { result, .. }
                | IrInstruction::Binary { result, .. }
                | IrInstruction::Compare { result, .. }
                | IrInstruction::BuildList { result, .. }
                | IrInstruction::LoadIndex { result, .. }
                | IrInstruction::Call { result, .. }
                | IrInstruction::CallMethod { result, .. }
                | IrInstruction::LoadAttr { result, .. } => Some(*result),
                IrInstruction::Assign {
                    target: Operand::Temp(temp),
                    ..
                } => Some(*temp),
                _ => None,
            };
            if let Some(temp) = written {
                assert!(seen.insert(temp), "{temp} assigned twice");
            }
        }
    }
}
