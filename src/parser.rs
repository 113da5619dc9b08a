use tracing::debug;

use crate::ast::{
    BinaryOperator, ClassDef, CompareOperator, Expression, FunctionDef, Program, Statement,
};
use crate::error::CompileError;
use crate::lexer;
use crate::number::Number;
use crate::token::{Token, TokenKind};

mod error;

pub use error::{ParseError, ParseResult};

pub struct Parser<'a> {
    tokens: Vec<Token<'a>>,
    position: usize,
}

impl<'a> Parser<'a> {
    pub fn new(mut tokens: Vec<Token<'a>>) -> Self {
        if !matches!(tokens.last().map(Token::kind), Some(TokenKind::EOF)) {
            let span = tokens.last().map(Token::span).unwrap_or_default();
            tokens.push(Token::new(TokenKind::EOF, span));
        }
        Self {
            tokens,
            position: 0,
        }
    }

    pub fn parse_program(mut self) -> ParseResult<Program> {
        let mut statements = Vec::new();
        while !self.at(TokenKind::EOF) {
            if self.consume_newlines() {
                continue;
            }
            statements.push(self.parse_statement()?);
        }
        debug!(statements = statements.len(), "parsed program");
        Ok(Program { statements })
    }

    fn parse_statement(&mut self) -> ParseResult<Statement> {
        match self.current().kind {
            TokenKind::Print => self.parse_print(),
            TokenKind::Def => Ok(Statement::FunctionDef(self.parse_function_def()?)),
            TokenKind::Class => self.parse_class_def(),
            TokenKind::Return => self.parse_return(),
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Pass => {
                self.advance();
                self.expect_newline()?;
                Ok(Statement::Pass)
            }
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_print(&mut self) -> ParseResult<Statement> {
        self.expect(TokenKind::Print)?;
        self.expect(TokenKind::LParen)?;
        let value = self.parse_expression()?;
        self.expect(TokenKind::RParen)?;
        self.expect_newline()?;
        Ok(Statement::Print(value))
    }

    fn parse_function_def(&mut self) -> ParseResult<FunctionDef> {
        self.expect(TokenKind::Def)?;
        let name = self.expect_identifier()?;
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.at(TokenKind::RParen) {
            loop {
                params.push(self.expect_identifier()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::Colon)?;
        let body = self.parse_block()?;
        Ok(FunctionDef { name, params, body })
    }

    fn parse_class_def(&mut self) -> ParseResult<Statement> {
        self.expect(TokenKind::Class)?;
        let name = self.expect_identifier()?;
        self.expect(TokenKind::Colon)?;
        self.expect_newline()?;
        self.expect(TokenKind::Indent)?;

        let mut methods = Vec::new();
        while !self.at(TokenKind::Dedent) && !self.at(TokenKind::EOF) {
            if self.consume_newlines() {
                continue;
            }
            match self.current().kind {
                TokenKind::Def => methods.push(self.parse_function_def()?),
                TokenKind::Pass => {
                    self.advance();
                    self.expect_newline()?;
                }
                _ => return Err(self.error("method definition")),
            }
        }
        self.expect(TokenKind::Dedent)?;
        Ok(Statement::ClassDef(ClassDef { name, methods }))
    }

    fn parse_return(&mut self) -> ParseResult<Statement> {
        self.expect(TokenKind::Return)?;
        if self.eat_newline() {
            return Ok(Statement::Return(None));
        }
        let value = self.parse_expression()?;
        self.expect_newline()?;
        Ok(Statement::Return(Some(value)))
    }

    fn parse_if(&mut self) -> ParseResult<Statement> {
        self.expect(TokenKind::If)?;
        let condition = self.parse_expression()?;
        self.expect(TokenKind::Colon)?;
        let body = self.parse_block()?;
        let else_body = if self.eat(TokenKind::Else) {
            self.expect(TokenKind::Colon)?;
            self.parse_block()?
        } else {
            Vec::new()
        };
        Ok(Statement::If {
            condition,
            body,
            else_body,
        })
    }

    fn parse_while(&mut self) -> ParseResult<Statement> {
        self.expect(TokenKind::While)?;
        let condition = self.parse_expression()?;
        self.expect(TokenKind::Colon)?;
        let body = self.parse_block()?;
        Ok(Statement::While { condition, body })
    }

    fn parse_for(&mut self) -> ParseResult<Statement> {
        self.expect(TokenKind::For)?;
        let variable = self.expect_identifier()?;
        self.expect(TokenKind::In)?;
        let line = self.current().span.line;
        let callee = self.expect_identifier()?;
        if callee != "range" {
            return Err(ParseError::Unsupported {
                construct: format!("iteration over '{callee}'"),
                line,
            });
        }
        let mut args = self.parse_arguments()?;
        if args.len() != 1 {
            return Err(ParseError::Unsupported {
                construct: format!("range with {} arguments", args.len()),
                line,
            });
        }
        let end = args.remove(0);
        self.expect(TokenKind::Colon)?;
        let body = self.parse_block()?;
        Ok(Statement::For {
            variable,
            start: Expression::Number(Number::Int(0)),
            end,
            body,
        })
    }

    /// An expression on its own line, or the target of an assignment.
    fn parse_expression_statement(&mut self) -> ParseResult<Statement> {
        let line = self.current().span.line;
        let expr = self.parse_expression()?;
        if !self.eat(TokenKind::Assign) {
            self.expect_newline()?;
            return Ok(Statement::Expr(expr));
        }

        let value = self.parse_expression()?;
        self.expect_newline()?;
        match expr {
            Expression::Variable(name) => Ok(Statement::Assign { name, value }),
            Expression::Index { name, index } => Ok(Statement::IndexAssign {
                name,
                index: *index,
                value,
            }),
            Expression::Attribute { object, name } => Ok(Statement::AttributeAssign {
                object,
                name,
                value,
            }),
            _ => Err(ParseError::Unsupported {
                construct: "assignment target".to_string(),
                line,
            }),
        }
    }

    fn parse_block(&mut self) -> ParseResult<Vec<Statement>> {
        self.expect_newline()?;
        self.expect(TokenKind::Indent)?;
        let mut body = Vec::new();
        while !self.at(TokenKind::Dedent) && !self.at(TokenKind::EOF) {
            if self.consume_newlines() {
                continue;
            }
            body.push(self.parse_statement()?);
        }
        self.expect(TokenKind::Dedent)?;
        Ok(body)
    }

    fn parse_expression(&mut self) -> ParseResult<Expression> {
        let left = self.parse_additive()?;
        let Some(op) = self.compare_operator() else {
            return Ok(left);
        };
        self.advance();
        let right = self.parse_additive()?;
        if self.compare_operator().is_some() {
            return Err(ParseError::Unsupported {
                construct: "chained comparison".to_string(),
                line: self.current().span.line,
            });
        }
        Ok(Expression::Compare {
            left: Box::new(left),
            op,
            right: Box::new(right),
        })
    }

    fn parse_additive(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_multiplicative()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Plus => BinaryOperator::Add,
                TokenKind::Minus => BinaryOperator::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            expr = Expression::BinaryOp {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_primary()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Star => BinaryOperator::Mul,
                TokenKind::Slash => BinaryOperator::Div,
                _ => break,
            };
            self.advance();
            let right = self.parse_primary()?;
            expr = Expression::BinaryOp {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> ParseResult<Expression> {
        match self.current().kind {
            TokenKind::Number(value) => {
                self.advance();
                Ok(Expression::Number(Number::Int(value)))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expression::Boolean(true))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expression::Boolean(false))
            }
            TokenKind::Minus => {
                // `-x` is `0 - x`; the optimizer folds literal operands.
                self.advance();
                let operand = self.parse_primary()?;
                Ok(Expression::BinaryOp {
                    left: Box::new(Expression::Number(Number::Int(0))),
                    op: BinaryOperator::Sub,
                    right: Box::new(operand),
                })
            }
            TokenKind::Identifier(_) => self.parse_access(),
            TokenKind::LBracket => {
                self.advance();
                let mut elements = Vec::new();
                if !self.at(TokenKind::RBracket) {
                    loop {
                        elements.push(self.parse_expression()?);
                        if !self.eat(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RBracket)?;
                Ok(Expression::List(elements))
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            _ => Err(self.error("expression")),
        }
    }

    /// An identifier with at most one postfix: call, index, attribute or method call.
    fn parse_access(&mut self) -> ParseResult<Expression> {
        let name = self.expect_identifier()?;
        let expr = match self.current().kind {
            TokenKind::LParen => {
                let args = self.parse_arguments()?;
                Expression::Call { name, args }
            }
            TokenKind::LBracket => {
                self.advance();
                let index = self.parse_expression()?;
                self.expect(TokenKind::RBracket)?;
                Expression::Index {
                    name,
                    index: Box::new(index),
                }
            }
            TokenKind::Dot => {
                self.advance();
                let member = self.expect_identifier()?;
                if self.at(TokenKind::LParen) {
                    let args = self.parse_arguments()?;
                    Expression::MethodCall {
                        object: name,
                        method: member,
                        args,
                    }
                } else {
                    Expression::Attribute {
                        object: name,
                        name: member,
                    }
                }
            }
            _ => return Ok(Expression::Variable(name)),
        };

        if matches!(
            self.current().kind,
            TokenKind::LParen | TokenKind::LBracket | TokenKind::Dot
        ) {
            return Err(ParseError::Unsupported {
                construct: "access chain longer than one hop".to_string(),
                line: self.current().span.line,
            });
        }
        Ok(expr)
    }

    fn parse_arguments(&mut self) -> ParseResult<Vec<Expression>> {
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        if !self.at(TokenKind::RParen) {
            loop {
                args.push(self.parse_expression()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(args)
    }

    fn compare_operator(&self) -> Option<CompareOperator> {
        let op = match self.current().kind {
            TokenKind::EqualEqual => CompareOperator::Eq,
            TokenKind::NotEqual => CompareOperator::NotEq,
            TokenKind::Less => CompareOperator::Lt,
            TokenKind::Greater => CompareOperator::Gt,
            TokenKind::LessEqual => CompareOperator::LtEq,
            TokenKind::GreaterEqual => CompareOperator::GtEq,
            _ => return None,
        };
        Some(op)
    }

    fn consume_newlines(&mut self) -> bool {
        let mut consumed = false;
        while self.eat_newline() {
            consumed = true;
        }
        consumed
    }

    fn expect_identifier(&mut self) -> ParseResult<String> {
        if let TokenKind::Identifier(name) = self.current().kind {
            self.advance();
            Ok(name.to_string())
        } else {
            Err(self.error("identifier"))
        }
    }

    fn expect_newline(&mut self) -> ParseResult<()> {
        if self.eat_newline() {
            Ok(())
        } else {
            Err(self.error("newline"))
        }
    }

    fn eat_newline(&mut self) -> bool {
        self.eat(TokenKind::Newline)
    }

    fn expect(&mut self, kind: TokenKind<'static>) -> ParseResult<()> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.error(&kind.to_string()))
        }
    }

    fn eat(&mut self, kind: TokenKind<'static>) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn at(&self, kind: TokenKind<'static>) -> bool {
        self.current().kind == kind
    }

    fn current(&self) -> &Token<'a> {
        let last = self.tokens.len() - 1;
        &self.tokens[self.position.min(last)]
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() - 1 {
            self.position += 1;
        }
    }

    fn error(&self, expected: &str) -> ParseError {
        let token = self.current();
        ParseError::UnexpectedToken {
            expected: expected.to_string(),
            found: token.kind.to_string(),
            line: token.span.line,
        }
    }
}

pub fn parse_tokens(tokens: Vec<Token<'_>>) -> ParseResult<Program> {
    Parser::new(tokens).parse_program()
}

/// Lexes and parses `source` in one step.
pub fn parse(source: &str) -> Result<Program, CompileError> {
    let tokens = lexer::tokenize(source)?;
    Ok(parse_tokens(tokens)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn parse_ok(input: &str) -> Program {
        parse(input).expect("parse failed")
    }

    fn parse_err(input: &str) -> ParseError {
        match parse(input) {
            Err(CompileError::Parse(err)) => err,
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    fn var(name: &str) -> Expression {
        Expression::Variable(name.to_string())
    }

    fn int(value: i64) -> Expression {
        Expression::Number(Number::Int(value))
    }

    #[test]
    fn parses_function_definition_and_call() {
        let input = indoc! {"
            def add(a, b):
                return a + b
            print(add(2, 3))
        "};
        let expected = Program {
            statements: vec![
                Statement::FunctionDef(FunctionDef {
                    name: "add".to_string(),
                    params: vec!["a".to_string(), "b".to_string()],
                    body: vec![Statement::Return(Some(Expression::BinaryOp {
                        left: Box::new(var("a")),
                        op: BinaryOperator::Add,
                        right: Box::new(var("b")),
                    }))],
                }),
                Statement::Print(Expression::Call {
                    name: "add".to_string(),
                    args: vec![int(2), int(3)],
                }),
            ],
        };
        assert_eq!(parse_ok(input), expected);
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let program = parse_ok("x = 1 + 2 * 3 < 10\n");
        let expected = Statement::Assign {
            name: "x".to_string(),
            value: Expression::Compare {
                left: Box::new(Expression::BinaryOp {
                    left: Box::new(int(1)),
                    op: BinaryOperator::Add,
                    right: Box::new(Expression::BinaryOp {
                        left: Box::new(int(2)),
                        op: BinaryOperator::Mul,
                        right: Box::new(int(3)),
                    }),
                }),
                op: CompareOperator::Lt,
                right: Box::new(int(10)),
            },
        };
        assert_eq!(program.statements, vec![expected]);
    }

    #[test]
    fn disambiguates_assignment_targets() {
        let input = indoc! {"
            l = [1, 2]
            l[0] = 9
            p.x = l[1]
            l.append(3)
        "};
        let statements = parse_ok(input).statements;
        assert!(matches!(&statements[0], Statement::Assign { name, value: Expression::List(items) }
            if name == "l" && items.len() == 2));
        assert_eq!(
            statements[1],
            Statement::IndexAssign {
                name: "l".to_string(),
                index: int(0),
                value: int(9),
            }
        );
        assert_eq!(
            statements[2],
            Statement::AttributeAssign {
                object: "p".to_string(),
                name: "x".to_string(),
                value: Expression::Index {
                    name: "l".to_string(),
                    index: Box::new(int(1)),
                },
            }
        );
        assert_eq!(
            statements[3],
            Statement::Expr(Expression::MethodCall {
                object: "l".to_string(),
                method: "append".to_string(),
                args: vec![int(3)],
            })
        );
    }

    #[test]
    fn parses_control_flow() {
        let input = indoc! {"
            for i in range(3):
                if i == 1:
                    pass
                else:
                    print(i)
            while False:
                return
        "};
        let statements = parse_ok(input).statements;
        let Statement::For {
            variable,
            start,
            end,
            body,
        } = &statements[0]
        else {
            panic!("expected for loop, got {:?}", statements[0]);
        };
        assert_eq!(variable, "i");
        assert_eq!(*start, int(0));
        assert_eq!(*end, int(3));
        assert!(matches!(&body[0], Statement::If { body, else_body, .. }
            if body == &vec![Statement::Pass] && else_body.len() == 1));
        assert_eq!(
            statements[1],
            Statement::While {
                condition: Expression::Boolean(false),
                body: vec![Statement::Return(None)],
            }
        );
    }

    #[test]
    fn parses_class_with_methods() {
        let input = indoc! {"
            class Point:
                def __init__(self, x):
                    self.x = x

                def get(self):
                    return self.x
            p = Point(4)
            print(p.get())
        "};
        let statements = parse_ok(input).statements;
        let Statement::ClassDef(class) = &statements[0] else {
            panic!("expected class, got {:?}", statements[0]);
        };
        assert_eq!(class.name, "Point");
        assert_eq!(class.methods.len(), 2);
        assert_eq!(class.constructor_arity(), 1);
        assert_eq!(
            statements[2],
            Statement::Print(Expression::MethodCall {
                object: "p".to_string(),
                method: "get".to_string(),
                args: vec![],
            })
        );
    }

    #[test]
    fn rejects_chained_comparison() {
        let err = parse_err("x = 1 < 2 < 3\n");
        assert!(matches!(err, ParseError::Unsupported { ref construct, line: 1 }
            if construct == "chained comparison"));
    }

    #[test]
    fn rejects_second_access_hop() {
        let err = parse_err("x = a.b.c\n");
        assert!(matches!(err, ParseError::Unsupported { line: 1, .. }));
        let err = parse_err("x = f(1)(2)\n");
        assert!(matches!(err, ParseError::Unsupported { .. }));
    }

    #[test]
    fn rejects_range_with_start() {
        let err = parse_err("for i in range(1, 3):\n    print(i)\n");
        assert_eq!(
            err,
            ParseError::Unsupported {
                construct: "range with 2 arguments".to_string(),
                line: 1,
            }
        );
    }

    #[test]
    fn reports_expected_and_found_tokens() {
        let err = parse_err("if x\n    y = 1\n");
        assert_eq!(
            err,
            ParseError::UnexpectedToken {
                expected: "':'".to_string(),
                found: "newline".to_string(),
                line: 1,
            }
        );
        assert_eq!(err.to_string(), "Expected ':', found newline at line 1");
    }

    #[test]
    fn rejects_statements_in_class_body() {
        let err = parse_err("class A:\n    x = 1\n");
        assert!(matches!(err, ParseError::UnexpectedToken { ref expected, line: 2, .. }
            if expected == "method definition"));
    }

    #[test]
    fn unary_minus_binds_tighter_than_multiplication() {
        let program = parse_ok("print(-2 * 3)\n");
        let negative_two = Expression::BinaryOp {
            left: Box::new(Expression::Number(Number::Int(0))),
            op: BinaryOperator::Sub,
            right: Box::new(Expression::Number(Number::Int(2))),
        };
        assert_eq!(
            program.statements,
            vec![Statement::Print(Expression::BinaryOp {
                left: Box::new(negative_two),
                op: BinaryOperator::Mul,
                right: Box::new(Expression::Number(Number::Int(3))),
            })]
        );
    }

    #[test]
    fn surfaces_lex_errors() {
        assert!(matches!(parse("x = $\n"), Err(CompileError::Lex(_))));
    }
}
