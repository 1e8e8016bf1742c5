use std::mem;

use thiserror::Error;

use crate::{
    ast::{self, BinaryOperator, Expression, Identifier, Statement, Variable},
    lexer::{Token, TokenKind},
};

/// Integer arguments beyond the six register slots are not supported.
pub const MAX_ARGS: usize = 6;

#[derive(Error, Debug, Eq, PartialEq)]
pub enum ParserError {
    #[error("Unexpected Token, expected: \"{expected:?}\", actual: \"{actual:?}\"")]
    UnexpectedToken { expected: TokenKind, actual: Token },
    #[error("Expected an identifier, got \"{actual:?}\"")]
    ExpectedIdentifier { actual: Token },
    #[error("Expected an expression, got \"{actual:?}\"")]
    ExpectedExpression { actual: Token },
    #[error("A function takes at most six parameters")]
    TooManyParameters { offset: usize },
    #[error("A call takes at most six arguments")]
    TooManyArguments { offset: usize },
}

impl ParserError {
    /// Byte offset of the unmatched token in the source.
    pub fn offset(&self) -> usize {
        match self {
            ParserError::UnexpectedToken { actual, .. }
            | ParserError::ExpectedIdentifier { actual }
            | ParserError::ExpectedExpression { actual } => actual.offset,
            ParserError::TooManyParameters { offset }
            | ParserError::TooManyArguments { offset } => *offset,
        }
    }
}

/// Recursive-descent parser over an owned token vector.
///
/// The cursor only ever moves forward; the grammar needs no backtracking
/// because every production is resolved by its next token. `locals` is the
/// variable table of the function currently being parsed.
#[derive(Debug)]
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    locals: Vec<Variable>,
}

impl Parser {
    /// `tokens` must be terminated by an Eof token, as `Lexer::tokenize`
    /// guarantees.
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            locals: Vec::new(),
        }
    }

    pub fn parse_program(&mut self) -> Result<ast::Program, ParserError> {
        let mut functions = Vec::new();
        while self.current().kind != TokenKind::Eof {
            functions.push(self.parse_function()?);
        }
        Ok(ast::Program { functions })
    }

    fn parse_function(&mut self) -> Result<ast::FunctionDefinition, ParserError> {
        self.locals.clear();

        let (name, _) = self.expect_identifier()?;
        self.expect(TokenKind::OpenParen)?;

        // Parameters share the body's variable table and are seeded first,
        // so their slots come before any body-local slot.
        let mut params = Vec::new();
        if !self.consume(&TokenKind::CloseParen) {
            loop {
                let (param, offset) = self.expect_identifier()?;
                if params.len() == MAX_ARGS {
                    return Err(ParserError::TooManyParameters { offset });
                }
                params.push(self.find_or_insert_local(&param));
                if !self.consume(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::CloseParen)?;
        }

        self.expect(TokenKind::OpenBrace)?;
        let mut body = Vec::new();
        while !self.consume(&TokenKind::CloseBrace) {
            body.push(self.parse_statement()?);
        }

        let stack_size = 8 * self.locals.len() as i64;
        Ok(ast::FunctionDefinition {
            name,
            params,
            locals: mem::take(&mut self.locals),
            body,
            stack_size,
        })
    }

    fn parse_statement(&mut self) -> Result<Statement, ParserError> {
        if self.consume(&TokenKind::KWReturn) {
            let expr = self.parse_expression()?;
            self.expect(TokenKind::Semicolon)?;
            return Ok(Statement::Return(expr));
        }

        if self.consume(&TokenKind::OpenBrace) {
            let mut statements = Vec::new();
            while !self.consume(&TokenKind::CloseBrace) {
                statements.push(self.parse_statement()?);
            }
            return Ok(Statement::Compound(statements));
        }

        if self.consume(&TokenKind::KWIf) {
            self.expect(TokenKind::OpenParen)?;
            let condition = self.parse_expression()?;
            self.expect(TokenKind::CloseParen)?;
            let then = Box::new(self.parse_statement()?);
            let r#else = if self.consume(&TokenKind::KWElse) {
                Some(Box::new(self.parse_statement()?))
            } else {
                None
            };
            return Ok(Statement::If {
                condition,
                then,
                r#else,
            });
        }

        if self.consume(&TokenKind::KWWhile) {
            self.expect(TokenKind::OpenParen)?;
            let condition = self.parse_expression()?;
            self.expect(TokenKind::CloseParen)?;
            let body = Box::new(self.parse_statement()?);
            return Ok(Statement::While { condition, body });
        }

        if self.consume(&TokenKind::KWFor) {
            self.expect(TokenKind::OpenParen)?;
            let init = self.parse_optional_expression(TokenKind::Semicolon)?;
            let condition = self.parse_optional_expression(TokenKind::Semicolon)?;
            let post = self.parse_optional_expression(TokenKind::CloseParen)?;
            let body = Box::new(self.parse_statement()?);
            return Ok(Statement::For {
                init,
                condition,
                post,
                body,
            });
        }

        let expr = self.parse_expression()?;
        self.expect(TokenKind::Semicolon)?;
        Ok(Statement::Expression(expr))
    }

    /// An expression clause ended by `terminator`, or nothing but the
    /// terminator itself. Used for the three `for` clauses.
    fn parse_optional_expression(
        &mut self,
        terminator: TokenKind,
    ) -> Result<Option<Expression>, ParserError> {
        if self.consume(&terminator) {
            return Ok(None);
        }
        let expr = self.parse_expression()?;
        self.expect(terminator)?;
        Ok(Some(expr))
    }

    fn parse_expression(&mut self) -> Result<Expression, ParserError> {
        self.parse_assign()
    }

    fn parse_assign(&mut self) -> Result<Expression, ParserError> {
        let node = self.parse_equality()?;
        if self.consume(&TokenKind::Assign) {
            let rhs = self.parse_assign()?;
            return Ok(Expression::Assignment {
                lhs: Box::new(node),
                rhs: Box::new(rhs),
            });
        }
        Ok(node)
    }

    fn parse_equality(&mut self) -> Result<Expression, ParserError> {
        let mut node = self.parse_relational()?;
        loop {
            if self.consume(&TokenKind::Equal) {
                node = Expression::binary(BinaryOperator::Equal, node, self.parse_relational()?);
            } else if self.consume(&TokenKind::NotEqual) {
                node = Expression::binary(BinaryOperator::NotEqual, node, self.parse_relational()?);
            } else {
                return Ok(node);
            }
        }
    }

    fn parse_relational(&mut self) -> Result<Expression, ParserError> {
        let mut node = self.parse_add()?;
        loop {
            if self.consume(&TokenKind::LessThan) {
                node = Expression::binary(BinaryOperator::LessThan, node, self.parse_add()?);
            } else if self.consume(&TokenKind::LessOrEqual) {
                node = Expression::binary(BinaryOperator::LessOrEqual, node, self.parse_add()?);
            } else if self.consume(&TokenKind::GreaterThan) {
                // a > b is b < a; there is no greater-than node kind.
                node = Expression::binary(BinaryOperator::LessThan, self.parse_add()?, node);
            } else if self.consume(&TokenKind::GreaterOrEqual) {
                node = Expression::binary(BinaryOperator::LessOrEqual, self.parse_add()?, node);
            } else {
                return Ok(node);
            }
        }
    }

    fn parse_add(&mut self) -> Result<Expression, ParserError> {
        let mut node = self.parse_mul()?;
        loop {
            if self.consume(&TokenKind::Plus) {
                node = Expression::binary(BinaryOperator::Add, node, self.parse_mul()?);
            } else if self.consume(&TokenKind::Minus) {
                node = Expression::binary(BinaryOperator::Subtract, node, self.parse_mul()?);
            } else {
                return Ok(node);
            }
        }
    }

    fn parse_mul(&mut self) -> Result<Expression, ParserError> {
        let mut node = self.parse_unary()?;
        loop {
            if self.consume(&TokenKind::Asterisk) {
                node = Expression::binary(BinaryOperator::Multiply, node, self.parse_unary()?);
            } else if self.consume(&TokenKind::Slash) {
                node = Expression::binary(BinaryOperator::Divide, node, self.parse_unary()?);
            } else {
                return Ok(node);
            }
        }
    }

    fn parse_unary(&mut self) -> Result<Expression, ParserError> {
        if self.consume(&TokenKind::Plus) {
            return self.parse_unary();
        }
        if self.consume(&TokenKind::Minus) {
            // -x desugars to 0 - x.
            let operand = self.parse_unary()?;
            return Ok(Expression::binary(
                BinaryOperator::Subtract,
                Expression::Constant(0),
                operand,
            ));
        }
        if self.consume(&TokenKind::Ampersand) {
            return Ok(Expression::AddressOf(Box::new(self.parse_unary()?)));
        }
        if self.consume(&TokenKind::Asterisk) {
            return Ok(Expression::Deref(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expression, ParserError> {
        if self.consume(&TokenKind::OpenParen) {
            let node = self.parse_expression()?;
            self.expect(TokenKind::CloseParen)?;
            return Ok(node);
        }

        match self.current().kind.clone() {
            TokenKind::Constant(value) => {
                self.advance();
                Ok(Expression::Constant(value))
            }
            TokenKind::Identifier(name) => {
                self.advance();
                // A callee name never enters the variable table.
                if self.consume(&TokenKind::OpenParen) {
                    let args = self.parse_funcargs()?;
                    return Ok(Expression::FunctionCall { name, args });
                }
                Ok(Expression::Var(self.find_or_insert_local(&name)))
            }
            _ => Err(ParserError::ExpectedExpression {
                actual: self.current().clone(),
            }),
        }
    }

    fn parse_funcargs(&mut self) -> Result<Vec<Expression>, ParserError> {
        let mut args = Vec::new();
        if self.consume(&TokenKind::CloseParen) {
            return Ok(args);
        }
        loop {
            let offset = self.current().offset;
            if args.len() == MAX_ARGS {
                return Err(ParserError::TooManyArguments { offset });
            }
            args.push(self.parse_assign()?);
            if !self.consume(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::CloseParen)?;
        Ok(args)
    }

    /// Resolve a name against the current function's table; the first use of
    /// a name allocates the next 8-byte slot.
    fn find_or_insert_local(&mut self, name: &str) -> usize {
        if let Some(index) = self.locals.iter().position(|var| var.name == name) {
            return index;
        }
        let offset = 8 * (self.locals.len() as i64 + 1);
        self.locals.push(Variable {
            name: name.to_owned(),
            offset,
        });
        self.locals.len() - 1
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos]
    }

    /// The Eof terminal is sticky; the cursor never moves past it.
    fn advance(&mut self) {
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn consume(&mut self, kind: &TokenKind) -> bool {
        if mem::discriminant(&self.current().kind) == mem::discriminant(kind) {
            self.advance();
            return true;
        }
        false
    }

    fn expect(&mut self, expected: TokenKind) -> Result<(), ParserError> {
        if mem::discriminant(&self.current().kind) == mem::discriminant(&expected) {
            self.advance();
            return Ok(());
        }
        Err(ParserError::UnexpectedToken {
            expected,
            actual: self.current().clone(),
        })
    }

    fn expect_identifier(&mut self) -> Result<(Identifier, usize), ParserError> {
        let token = self.current().clone();
        if let TokenKind::Identifier(name) = token.kind {
            self.advance();
            return Ok((name, token.offset));
        }
        Err(ParserError::ExpectedIdentifier { actual: token })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse(input: &str) -> ast::Program {
        let tokens = Lexer::new(input).tokenize().expect("should tokenize");
        Parser::new(tokens)
            .parse_program()
            .expect("should successfully parse")
    }

    fn parse_err(input: &str) -> ParserError {
        let tokens = Lexer::new(input).tokenize().expect("should tokenize");
        Parser::new(tokens)
            .parse_program()
            .expect_err("should fail to parse")
    }

    fn single_function(program: ast::Program) -> ast::FunctionDefinition {
        let mut functions = program.functions;
        assert_eq!(functions.len(), 1);
        functions.remove(0)
    }

    #[test]
    fn test_precedence() {
        let function = single_function(parse("main(){return 1+2*3;}"));

        assert_eq!(
            function.body,
            vec![Statement::Return(Expression::binary(
                BinaryOperator::Add,
                Expression::Constant(1),
                Expression::binary(
                    BinaryOperator::Multiply,
                    Expression::Constant(2),
                    Expression::Constant(3)
                ),
            ))]
        );
    }

    #[test]
    fn test_grouping() {
        let function = single_function(parse("main(){return (1+2)*3;}"));

        assert_eq!(
            function.body,
            vec![Statement::Return(Expression::binary(
                BinaryOperator::Multiply,
                Expression::binary(
                    BinaryOperator::Add,
                    Expression::Constant(1),
                    Expression::Constant(2)
                ),
                Expression::Constant(3),
            ))]
        );
    }

    #[test]
    fn test_greater_than_swaps_operands() {
        let function = single_function(parse("main(){return 2>1;}"));

        assert_eq!(
            function.body,
            vec![Statement::Return(Expression::binary(
                BinaryOperator::LessThan,
                Expression::Constant(1),
                Expression::Constant(2),
            ))]
        );

        let function = single_function(parse("main(){return 2>=1;}"));

        assert_eq!(
            function.body,
            vec![Statement::Return(Expression::binary(
                BinaryOperator::LessOrEqual,
                Expression::Constant(1),
                Expression::Constant(2),
            ))]
        );
    }

    #[test]
    fn test_unary_minus_desugars() {
        let function = single_function(parse("main(){return -5;}"));

        assert_eq!(
            function.body,
            vec![Statement::Return(Expression::binary(
                BinaryOperator::Subtract,
                Expression::Constant(0),
                Expression::Constant(5),
            ))]
        );
    }

    #[test]
    fn test_unary_plus_is_transparent() {
        let function = single_function(parse("main(){return +5;}"));

        assert_eq!(function.body, vec![Statement::Return(Expression::Constant(5))]);
    }

    #[test]
    fn test_assignment_is_right_associative() {
        let function = single_function(parse("main(){a=b=1;}"));

        assert_eq!(
            function.body,
            vec![Statement::Expression(Expression::Assignment {
                lhs: Box::new(Expression::Var(0)),
                rhs: Box::new(Expression::Assignment {
                    lhs: Box::new(Expression::Var(1)),
                    rhs: Box::new(Expression::Constant(1)),
                }),
            })]
        );
    }

    #[test]
    fn test_variable_slots_assigned_at_first_use() {
        let function = single_function(parse("main(){a=1;b=2;a=3;return b;}"));

        assert_eq!(
            function.locals,
            vec![
                Variable {
                    name: "a".to_owned(),
                    offset: 8,
                },
                Variable {
                    name: "b".to_owned(),
                    offset: 16,
                },
            ]
        );
        assert_eq!(function.stack_size, 16);
        assert_eq!(
            function.body[3],
            Statement::Return(Expression::Var(1))
        );
    }

    #[test]
    fn test_parameters_seed_the_variable_table() {
        let function = single_function(parse("add(a,b){c=a+b;return c;}"));

        assert_eq!(function.params, vec![0, 1]);
        assert_eq!(
            function.locals,
            vec![
                Variable {
                    name: "a".to_owned(),
                    offset: 8,
                },
                Variable {
                    name: "b".to_owned(),
                    offset: 16,
                },
                Variable {
                    name: "c".to_owned(),
                    offset: 24,
                },
            ]
        );
        assert_eq!(function.stack_size, 24);
    }

    #[test]
    fn test_functions_do_not_share_variable_tables() {
        let program = parse("f(){x=1;return x;}g(){x=2;return x;}");

        assert_eq!(program.functions.len(), 2);
        for function in &program.functions {
            assert_eq!(function.locals.len(), 1);
            assert_eq!(function.locals[0].offset, 8);
        }
    }

    #[test]
    fn test_pointer_operators() {
        let function = single_function(parse("main(){x=3;y=&x;*y=10;return x;}"));

        assert_eq!(
            function.body[1],
            Statement::Expression(Expression::Assignment {
                lhs: Box::new(Expression::Var(1)),
                rhs: Box::new(Expression::AddressOf(Box::new(Expression::Var(0)))),
            })
        );
        assert_eq!(
            function.body[2],
            Statement::Expression(Expression::Assignment {
                lhs: Box::new(Expression::Deref(Box::new(Expression::Var(1)))),
                rhs: Box::new(Expression::Constant(10)),
            })
        );
        // The callee table holds x and y only; *y is not a new variable.
        assert_eq!(function.locals.len(), 2);
    }

    #[test]
    fn test_call_does_not_allocate_a_slot() {
        let function = single_function(parse("main(){return f(1,2);}"));

        assert!(function.locals.is_empty());
        assert_eq!(
            function.body,
            vec![Statement::Return(Expression::FunctionCall {
                name: "f".to_owned(),
                args: vec![Expression::Constant(1), Expression::Constant(2)],
            })]
        );
    }

    #[test]
    fn test_if_else_attaches_to_nearest_if() {
        let function = single_function(parse("main(){if(1)if(0)return 1;else return 2;return 3;}"));

        let Statement::If { r#else, then, .. } = &function.body[0] else {
            panic!("expected an if statement");
        };
        assert!(r#else.is_none());
        let Statement::If { r#else, .. } = then.as_ref() else {
            panic!("expected a nested if statement");
        };
        assert!(r#else.is_some());
    }

    #[test]
    fn test_for_clauses_are_optional() {
        let function = single_function(parse("main(){for(;;)return 1;}"));

        assert_eq!(
            function.body,
            vec![Statement::For {
                init: None,
                condition: None,
                post: None,
                body: Box::new(Statement::Return(Expression::Constant(1))),
            }]
        );
    }

    #[test]
    fn test_empty_block_statement() {
        let function = single_function(parse("main(){{}return 0;}"));

        assert_eq!(function.body[0], Statement::Compound(vec![]));
    }

    #[test]
    fn test_missing_semicolon() {
        let err = parse_err("main(){return 1}");

        assert_eq!(
            err,
            ParserError::UnexpectedToken {
                expected: TokenKind::Semicolon,
                actual: Token {
                    kind: TokenKind::CloseBrace,
                    offset: 15,
                },
            }
        );
        assert_eq!(err.offset(), 15);
    }

    #[test]
    fn test_missing_close_paren() {
        let err = parse_err("main(){return (1+2;}");

        assert_eq!(err.offset(), 18);
    }

    #[test]
    fn test_seventh_argument_is_rejected() {
        let err = parse_err("main(){return f(1,2,3,4,5,6,7);}");

        assert_eq!(err, ParserError::TooManyArguments { offset: 28 });
    }

    #[test]
    fn test_seventh_parameter_is_rejected() {
        let err = parse_err("f(a,b,c,d,e,g,h){return 0;}");

        assert_eq!(err, ParserError::TooManyParameters { offset: 14 });
    }

    #[test]
    fn test_unclosed_function_body() {
        let err = parse_err("main(){return 1;");

        assert_eq!(err.offset(), 16);
    }
}
