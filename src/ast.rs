//! Syntax tree shared by every stage after the parser.
//!
//! The parser builds these nodes once. The semantic analyzer only reads them,
//! the optimizer rewrites them in place, and the IR generator, the bytecode
//! generator and the reference interpreter consume the result.

use std::fmt;

use crate::number::Number;

#[derive(Debug, PartialEq, Clone)]
pub enum Expression {
    Number(Number),
    Boolean(bool),
    Variable(String),
    BinaryOp {
        left: Box<Expression>,
        op: BinaryOperator,
        right: Box<Expression>,
    },
    Compare {
        left: Box<Expression>,
        op: CompareOperator,
        right: Box<Expression>,
    },
    Call {
        name: String,
        args: Vec<Expression>,
    },
    List(Vec<Expression>),
    /// `name[index]`. Access chains are a single hop, so the base is a name.
    Index {
        name: String,
        index: Box<Expression>,
    },
    Attribute {
        object: String,
        name: String,
    },
    MethodCall {
        object: String,
        method: String,
        args: Vec<Expression>,
    },
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum CompareOperator {
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Statement {
    Assign {
        name: String,
        value: Expression,
    },
    IndexAssign {
        name: String,
        index: Expression,
        value: Expression,
    },
    AttributeAssign {
        object: String,
        name: String,
        value: Expression,
    },
    Print(Expression),
    If {
        condition: Expression,
        body: Vec<Statement>,
        else_body: Vec<Statement>,
    },
    While {
        condition: Expression,
        body: Vec<Statement>,
    },
    /// `for variable in range(end)`; `start` is always the literal `0` today.
    For {
        variable: String,
        start: Expression,
        end: Expression,
        body: Vec<Statement>,
    },
    FunctionDef(FunctionDef),
    ClassDef(ClassDef),
    Return(Option<Expression>),
    Expr(Expression),
    Pass,
}

#[derive(Debug, PartialEq, Clone)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Statement>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct ClassDef {
    pub name: String,
    pub methods: Vec<FunctionDef>,
}

impl ClassDef {
    pub fn method(&self, name: &str) -> Option<&FunctionDef> {
        self.methods.iter().find(|method| method.name == name)
    }

    /// Number of arguments a constructor call must supply (`self` excluded).
    pub fn constructor_arity(&self) -> usize {
        self.method(CONSTRUCTOR)
            .map(|init| init.params.len().saturating_sub(1))
            .unwrap_or(0)
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Program {
    pub statements: Vec<Statement>,
}

pub const CONSTRUCTOR: &str = "__init__";
pub const SELF_PARAM: &str = "self";

impl BinaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
        }
    }
}

impl CompareOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOperator::Eq => "==",
            CompareOperator::NotEq => "!=",
            CompareOperator::Lt => "<",
            CompareOperator::Gt => ">",
            CompareOperator::LtEq => "<=",
            CompareOperator::GtEq => ">=",
        }
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl fmt::Display for CompareOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}
