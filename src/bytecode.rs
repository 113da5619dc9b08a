use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::ast::{
    BinaryOperator, ClassDef, CompareOperator, Expression, FunctionDef, Program, Statement,
};
use crate::number::Number;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Constant {
    Number(Number),
    Bool(bool),
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    LoadConst(Constant),
    LoadVar(String),
    StoreVar(String),
    Add,
    Sub,
    Mul,
    Div,
    Compare(CompareOperator),
    Print,
    /// Absolute index in the current block; the block length means "fall off the end".
    Jump(usize),
    JumpIfFalse(usize),
    BuildList(usize),
    LoadIndex,
    StoreIndex,
    DefineFunction(String),
    CallFunction { name: String, argc: usize },
    ReturnValue,
    DefineClass(String),
    LoadAttr(String),
    StoreAttr(String),
    CallMethod { name: String, argc: usize },
    Pop,
}

impl Instruction {
    pub fn arithmetic(op: BinaryOperator) -> Self {
        match op {
            BinaryOperator::Add => Instruction::Add,
            BinaryOperator::Sub => Instruction::Sub,
            BinaryOperator::Mul => Instruction::Mul,
            BinaryOperator::Div => Instruction::Div,
        }
    }
}

pub type CodeBlock = Rc<[Instruction]>;

#[derive(Debug, Clone)]
pub struct CompiledFunction {
    pub name: String,
    pub params: Vec<String>,
    pub code: CodeBlock,
}

#[derive(Debug, Clone)]
pub struct CompiledClass {
    pub name: String,
    pub methods: FxHashMap<String, Rc<CompiledFunction>>,
}

impl CompiledClass {
    pub fn method(&self, name: &str) -> Option<&Rc<CompiledFunction>> {
        self.methods.get(name)
    }
}

/// Executable unit: the main block plus every function and class body,
/// each compiled once.
#[derive(Debug, Clone)]
pub struct CompiledProgram {
    pub main: CodeBlock,
    pub functions: FxHashMap<String, Rc<CompiledFunction>>,
    pub classes: FxHashMap<String, Rc<CompiledClass>>,
}

/// True when every jump in `code` lands inside the block or exactly at its end.
pub fn jump_targets_in_bounds(code: &[Instruction]) -> bool {
    code.iter().all(|instruction| match instruction {
        Instruction::Jump(target) | Instruction::JumpIfFalse(target) => *target <= code.len(),
        _ => true,
    })
}

/// Direct AST-to-bytecode lowering.
///
/// Function and method bodies always go through here and are cached by name.
/// Whole programs can also be lowered directly with [`generate_program`],
/// bypassing the IR.
///
/// [`generate_program`]: BytecodeGenerator::generate_program
#[derive(Debug, Default)]
pub struct BytecodeGenerator {
    functions: FxHashMap<String, Rc<CompiledFunction>>,
    classes: FxHashMap<String, Rc<CompiledClass>>,
    loop_count: usize,
}

impl BytecodeGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compile_function(&mut self, function: &FunctionDef) -> Rc<CompiledFunction> {
        if let Some(compiled) = self.functions.get(&function.name) {
            return Rc::clone(compiled);
        }
        let compiled = Rc::new(self.compile_body(function));
        self.functions
            .insert(function.name.clone(), Rc::clone(&compiled));
        compiled
    }

    pub fn compile_class(&mut self, class: &ClassDef) -> Rc<CompiledClass> {
        if let Some(compiled) = self.classes.get(&class.name) {
            return Rc::clone(compiled);
        }
        let methods = class
            .methods
            .iter()
            .map(|method| (method.name.clone(), Rc::new(self.compile_body(method))))
            .collect();
        let compiled = Rc::new(CompiledClass {
            name: class.name.clone(),
            methods,
        });
        self.classes.insert(class.name.clone(), Rc::clone(&compiled));
        compiled
    }

    pub fn generate_program(mut self, program: &Program) -> CompiledProgram {
        let mut main = Vec::new();
        self.compile_block(&mut main, &program.statements);
        self.finish(main)
    }

    /// Packages `main` with every body compiled so far.
    pub fn finish(self, main: Vec<Instruction>) -> CompiledProgram {
        debug_assert!(jump_targets_in_bounds(&main));
        debug!(
            main = main.len(),
            functions = self.functions.len(),
            classes = self.classes.len(),
            "generated bytecode"
        );
        CompiledProgram {
            main: main.into(),
            functions: self.functions,
            classes: self.classes,
        }
    }

    fn compile_body(&mut self, function: &FunctionDef) -> CompiledFunction {
        let mut code = Vec::new();
        self.compile_block(&mut code, &function.body);
        code.push(Instruction::LoadConst(Constant::None));
        code.push(Instruction::ReturnValue);
        debug_assert!(jump_targets_in_bounds(&code));
        CompiledFunction {
            name: function.name.clone(),
            params: function.params.clone(),
            code: code.into(),
        }
    }

    fn compile_block(&mut self, code: &mut Vec<Instruction>, statements: &[Statement]) {
        for statement in statements {
            self.compile_statement(code, statement);
        }
    }

    fn compile_statement(&mut self, code: &mut Vec<Instruction>, statement: &Statement) {
        match statement {
            Statement::Assign { name, value } => {
                compile_expression(code, value);
                code.push(Instruction::StoreVar(name.clone()));
            }
            Statement::IndexAssign { name, index, value } => {
                code.push(Instruction::LoadVar(name.clone()));
                compile_expression(code, index);
                compile_expression(code, value);
                code.push(Instruction::StoreIndex);
            }
            Statement::AttributeAssign {
                object,
                name,
                value,
            } => {
                code.push(Instruction::LoadVar(object.clone()));
                compile_expression(code, value);
                code.push(Instruction::StoreAttr(name.clone()));
            }
            Statement::Print(value) => {
                compile_expression(code, value);
                code.push(Instruction::Print);
            }
            Statement::Expr(value) => {
                compile_expression(code, value);
                code.push(Instruction::Pop);
            }
            Statement::If {
                condition,
                body,
                else_body,
            } => {
                compile_expression(code, condition);
                let jump_to_else = emit_placeholder(code, Instruction::JumpIfFalse(0));
                self.compile_block(code, body);
                if else_body.is_empty() {
                    patch_jump(code, jump_to_else);
                } else {
                    let jump_to_end = emit_placeholder(code, Instruction::Jump(0));
                    patch_jump(code, jump_to_else);
                    self.compile_block(code, else_body);
                    patch_jump(code, jump_to_end);
                }
            }
            Statement::While { condition, body } => {
                let start = code.len();
                compile_expression(code, condition);
                let exit = emit_placeholder(code, Instruction::JumpIfFalse(0));
                self.compile_block(code, body);
                code.push(Instruction::Jump(start));
                patch_jump(code, exit);
            }
            Statement::For {
                variable,
                start,
                end,
                body,
            } => {
                self.loop_count += 1;
                let counter = format!("%for{}", self.loop_count);
                let bound = format!("%end{}", self.loop_count);

                compile_expression(code, start);
                code.push(Instruction::StoreVar(counter.clone()));
                compile_expression(code, end);
                code.push(Instruction::StoreVar(bound.clone()));

                let top = code.len();
                code.push(Instruction::LoadVar(counter.clone()));
                code.push(Instruction::LoadVar(bound));
                code.push(Instruction::Compare(CompareOperator::Lt));
                let exit = emit_placeholder(code, Instruction::JumpIfFalse(0));
                code.push(Instruction::LoadVar(counter.clone()));
                code.push(Instruction::StoreVar(variable.clone()));
                self.compile_block(code, body);
                code.push(Instruction::LoadVar(counter.clone()));
                code.push(Instruction::LoadConst(Constant::Number(Number::Int(1))));
                code.push(Instruction::Add);
                code.push(Instruction::StoreVar(counter));
                code.push(Instruction::Jump(top));
                patch_jump(code, exit);
            }
            Statement::FunctionDef(function) => {
                self.compile_function(function);
                code.push(Instruction::DefineFunction(function.name.clone()));
            }
            Statement::ClassDef(class) => {
                self.compile_class(class);
                code.push(Instruction::DefineClass(class.name.clone()));
            }
            Statement::Return(value) => {
                match value {
                    Some(value) => compile_expression(code, value),
                    None => code.push(Instruction::LoadConst(Constant::None)),
                }
                code.push(Instruction::ReturnValue);
            }
            Statement::Pass => {}
        }
    }
}

fn compile_expression(code: &mut Vec<Instruction>, expression: &Expression) {
    match expression {
        Expression::Number(value) => code.push(Instruction::LoadConst(Constant::Number(*value))),
        Expression::Boolean(value) => code.push(Instruction::LoadConst(Constant::Bool(*value))),
        Expression::Variable(name) => code.push(Instruction::LoadVar(name.clone())),
        Expression::BinaryOp { left, op, right } => {
            compile_expression(code, left);
            compile_expression(code, right);
            code.push(Instruction::arithmetic(*op));
        }
        Expression::Compare { left, op, right } => {
            compile_expression(code, left);
            compile_expression(code, right);
            code.push(Instruction::Compare(*op));
        }
        Expression::Call { name, args } => {
            for arg in args {
                compile_expression(code, arg);
            }
            code.push(Instruction::CallFunction {
                name: name.clone(),
                argc: args.len(),
            });
        }
        Expression::List(elements) => {
            for element in elements {
                compile_expression(code, element);
            }
            code.push(Instruction::BuildList(elements.len()));
        }
        Expression::Index { name, index } => {
            code.push(Instruction::LoadVar(name.clone()));
            compile_expression(code, index);
            code.push(Instruction::LoadIndex);
        }
        Expression::Attribute { object, name } => {
            code.push(Instruction::LoadVar(object.clone()));
            code.push(Instruction::LoadAttr(name.clone()));
        }
        Expression::MethodCall {
            object,
            method,
            args,
        } => {
            code.push(Instruction::LoadVar(object.clone()));
            for arg in args {
                compile_expression(code, arg);
            }
            code.push(Instruction::CallMethod {
                name: method.clone(),
                argc: args.len(),
            });
        }
    }
}

fn emit_placeholder(code: &mut Vec<Instruction>, jump: Instruction) -> usize {
    code.push(jump);
    code.len() - 1
}

/// Points the jump at `at` to the current end of `code`.
fn patch_jump(code: &mut [Instruction], at: usize) {
    let target = code.len();
    match &mut code[at] {
        Instruction::Jump(slot) | Instruction::JumpIfFalse(slot) => *slot = target,
        other => debug_assert!(false, "patched a non-jump instruction {other:?}"),
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Number(value) => write!(f, "{value}"),
            Constant::Bool(true) => f.write_str("True"),
            Constant::Bool(false) => f.write_str("False"),
            Constant::None => f.write_str("None"),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::LoadConst(value) => write!(f, "LOAD_CONST {value}"),
            Instruction::LoadVar(name) => write!(f, "LOAD_VAR {name}"),
            Instruction::StoreVar(name) => write!(f, "STORE_VAR {name}"),
            Instruction::Add => f.write_str("ADD"),
            Instruction::Sub => f.write_str("SUB"),
            Instruction::Mul => f.write_str("MUL"),
            Instruction::Div => f.write_str("DIV"),
            Instruction::Compare(op) => write!(f, "COMPARE {op}"),
            Instruction::Print => f.write_str("PRINT"),
            Instruction::Jump(target) => write!(f, "JUMP {target}"),
            Instruction::JumpIfFalse(target) => write!(f, "JUMP_IF_FALSE {target}"),
            Instruction::BuildList(count) => write!(f, "BUILD_LIST {count}"),
            Instruction::LoadIndex => f.write_str("LOAD_INDEX"),
            Instruction::StoreIndex => f.write_str("STORE_INDEX"),
            Instruction::DefineFunction(name) => write!(f, "DEFINE_FUNCTION {name}"),
            Instruction::CallFunction { name, argc } => write!(f, "CALL_FUNCTION {name} {argc}"),
            Instruction::ReturnValue => f.write_str("RETURN_VALUE"),
            Instruction::DefineClass(name) => write!(f, "DEFINE_CLASS {name}"),
            Instruction::LoadAttr(name) => write!(f, "LOAD_ATTR {name}"),
            Instruction::StoreAttr(name) => write!(f, "STORE_ATTR {name}"),
            Instruction::CallMethod { name, argc } => write!(f, "CALL_METHOD {name} {argc}"),
            Instruction::Pop => f.write_str("POP"),
        }
    }
}

fn write_block(f: &mut fmt::Formatter<'_>, code: &[Instruction], indent: &str) -> fmt::Result {
    for (index, instruction) in code.iter().enumerate() {
        writeln!(f, "{indent}{index:>4}  {instruction}")?;
    }
    Ok(())
}

impl fmt::Display for CompiledProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "main:")?;
        write_block(f, &self.main, "")?;

        let mut functions = self.functions.values().collect::<Vec<_>>();
        functions.sort_by(|a, b| a.name.cmp(&b.name));
        for function in functions {
            writeln!(f, "function {}({}):", function.name, function.params.join(", "))?;
            write_block(f, &function.code, "")?;
        }

        let mut classes = self.classes.values().collect::<Vec<_>>();
        classes.sort_by(|a, b| a.name.cmp(&b.name));
        for class in classes {
            writeln!(f, "class {}:", class.name)?;
            let mut methods = class.methods.values().collect::<Vec<_>>();
            methods.sort_by(|a, b| a.name.cmp(&b.name));
            for method in methods {
                writeln!(f, "  method {}({}):", method.name, method.params.join(", "))?;
                write_block(f, &method.code, "  ")?;
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

    fn generate(source: &str) -> CompiledProgram {
        BytecodeGenerator::new().generate_program(&parse(source).expect("parse failed"))
    }

    fn int(value: i64) -> Instruction {
        Instruction::LoadConst(Constant::Number(Number::Int(value)))
    }

    #[test]
    fn compiles_main_and_function_separately() {
        let source = indoc! {"
            def foo():
                return 7
            foo()
        "};
        let compiled = generate(source);
        assert_eq!(compiled.functions.len(), 1);

        let function = compiled
            .functions
            .get("foo")
            .expect("expected compiled function 'foo'");
        assert!(function.params.is_empty());
        assert_eq!(
            function.code.as_ref(),
            &[
                int(7),
                Instruction::ReturnValue,
                Instruction::LoadConst(Constant::None),
                Instruction::ReturnValue,
            ]
        );

        assert_eq!(
            compiled.main.as_ref(),
            &[
                Instruction::DefineFunction("foo".to_string()),
                Instruction::CallFunction {
                    name: "foo".to_string(),
                    argc: 0
                },
                Instruction::Pop,
            ]
        );
    }

    #[test]
    fn back_patches_if_else_jumps() {
        let source = indoc! {"
            x = 1
            if x:
                print(1)
            else:
                print(2)
            print(3)
        "};
        let main = generate(source).main;
        assert_eq!(main[3], Instruction::JumpIfFalse(7));
        assert_eq!(main[6], Instruction::Jump(9));
        assert_eq!(main[7], int(2));
        assert_eq!(main[9], int(3));
        assert!(jump_targets_in_bounds(&main));
    }

    #[test]
    fn while_loop_jumps_back_to_condition() {
        let source = "i = 0\nwhile i < 3:\n    i = i + 1\n";
        let main = generate(source).main;
        assert_eq!(main[2], Instruction::LoadVar("i".to_string()));
        assert_eq!(main[5], Instruction::JumpIfFalse(main.len()));
        assert_eq!(main[main.len() - 1], Instruction::Jump(2));
    }

    #[test]
    fn compiles_list_index_assignment_and_read() {
        let source = indoc! {"
            values = [1, 2]
            values[1] = 7
            print(values[0])
        "};
        let main = generate(source).main;
        assert_eq!(
            main.as_ref(),
            &[
                int(1),
                int(2),
                Instruction::BuildList(2),
                Instruction::StoreVar("values".to_string()),
                Instruction::LoadVar("values".to_string()),
                int(1),
                int(7),
                Instruction::StoreIndex,
                Instruction::LoadVar("values".to_string()),
                int(0),
                Instruction::LoadIndex,
                Instruction::Print,
            ]
        );
    }

    #[test]
    fn compiles_classes_to_method_tables() {
        let source = indoc! {"
            class Point:
                def __init__(self, x):
                    self.x = x
                def get(self):
                    return self.x
            p = Point(1)
            print(p.get())
        "};
        let compiled = generate(source);
        let class = compiled.classes.get("Point").expect("class Point");
        assert_eq!(class.methods.len(), 2);
        let get = class.method("get").expect("method get");
        assert_eq!(get.params, vec!["self".to_string()]);
        assert_eq!(
            get.code[..3],
            [
                Instruction::LoadVar("self".to_string()),
                Instruction::LoadAttr("x".to_string()),
                Instruction::ReturnValue,
            ]
        );
        assert!(compiled.main.contains(&Instruction::CallMethod {
            name: "get".to_string(),
            argc: 0
        }));
    }

    #[test]
    fn for_loop_uses_hidden_counter() {
        let main = generate("for i in range(2):\n    print(i)\n").main;
        assert!(main.contains(&Instruction::StoreVar("%for1".to_string())));
        assert!(main.contains(&Instruction::StoreVar("i".to_string())));
        assert!(jump_targets_in_bounds(&main));
    }
}
