use std::cell::RefCell;

use crate::{
    ast::{
        Expression, Function, InfixOperator, Literal, Program, Statement, StatementKind,
        UnaryOperator,
    },
    tokenizer::{tokenize, Token, TokenType},
};

type ParseResult<'a, T> = Result<(T, &'a [Token]), ParseErrorWithContext>;

#[derive(Debug, Default)]
pub struct ParseErrors(Vec<ParseErrorWithContext>);

impl ParseErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn first(&self) -> Option<&ParseErrorWithContext> {
        self.0.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParseErrorWithContext> {
        self.0.iter()
    }
}

impl std::error::Error for ParseErrors {}

impl std::fmt::Display for ParseErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Found {} errors during parsing", self.0.len())?;
        for error in &self.0 {
            writeln!(f, "{}", error)?;
        }
        Ok(())
    }
}

impl From<ParseErrorWithContext> for ParseErrors {
    fn from(error: ParseErrorWithContext) -> Self {
        ParseErrors(vec![error])
    }
}

#[derive(Debug)]
pub struct ParseErrorWithContext {
    pub error: ParseError,
    context: Vec<&'static str>,
    pub token: Option<Token>,
}

impl ParseErrorWithContext {
    pub fn line(&self) -> Option<usize> {
        self.token.as_ref().map(Token::line)
    }

    /// The error and the offending token, without position or parse context.
    pub fn summary(&self) -> String {
        match &self.token {
            Some(token) => format!("{} but found \"{}\"", self.error, token.token_type),
            None => self.error.to_string(),
        }
    }
}

impl std::fmt::Display for ParseErrorWithContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "While parsing {}", self.context.join(" > "))?;
        write!(f, "{}", self.summary())?;
        if let Some(token) = &self.token {
            write!(f, " at {}", token.span)?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Expected \"{0}\"")]
    Expected(TokenType),
    #[error("Expected one of {0:?}")]
    ExpectedOneOf(Vec<TokenType>),
    #[error("Unexpected \"{0}\"")]
    Unexpected(TokenType),
    #[error("Expected identifier")]
    ExpectedIdentifier,
    #[error("Expected module name")]
    ExpectedModule,
    #[error("Invalid assignment target")]
    InvalidAssignmentTarget,
    #[error("\"{0}\" is reserved for classes, which are not supported")]
    Reserved(TokenType),
    #[error("Invalid template string \"{0}\"")]
    InvalidTemplate(String),
    #[error("Nesting is too deep")]
    TooDeep,
}

/// Deepest parse context stack allowed before the input is rejected.
const MAX_CONTEXT_DEPTH: usize = 512;

#[derive(Debug, Default)]
struct ParseContext {
    stack: RefCell<Vec<&'static str>>,
    errors: RefCell<Vec<ParseErrorWithContext>>,
}

impl ParseContext {
    fn push(&self, name: &'static str) -> ParseContextGuard {
        self.stack.borrow_mut().push(name);
        ParseContextGuard::new(self)
    }

    /// Like [`ParseContext::push`], for rules that recurse on nested input.
    fn nest(
        &self,
        name: &'static str,
        tokens: &[Token],
    ) -> Result<ParseContextGuard, ParseErrorWithContext> {
        let guard = self.push(name);
        if self.stack.borrow().len() > MAX_CONTEXT_DEPTH {
            return Err(self.error(ParseError::TooDeep, tokens));
        }
        Ok(guard)
    }

    fn pop(&self) {
        self.stack.borrow_mut().pop();
    }

    fn error(&self, error: ParseError, tokens: &[Token]) -> ParseErrorWithContext {
        ParseErrorWithContext {
            error,
            context: self.stack.borrow().clone(),
            token: tokens.first().cloned(),
        }
    }

    fn record(&self, error: ParseErrorWithContext) {
        log::warn!(
            "Dropping declaration after parse error at line {}: {}",
            error.line().unwrap_or(0),
            error.summary()
        );
        self.errors.borrow_mut().push(error);
    }
}

struct ParseContextGuard<'a> {
    context: &'a ParseContext,
}

impl<'a> ParseContextGuard<'a> {
    fn new(context: &'a ParseContext) -> Self {
        Self { context }
    }
}

impl<'a> Drop for ParseContextGuard<'a> {
    fn drop(&mut self) {
        self.context.pop();
    }
}

/// Everything the parser produced: the statements that parsed and the errors of those that did not.
#[derive(Debug)]
pub struct Parsed {
    pub program: Program,
    pub errors: ParseErrors,
}

impl Parsed {
    pub fn into_result(self) -> Result<Program, ParseErrors> {
        if self.errors.is_empty() {
            Ok(self.program)
        } else {
            Err(self.errors)
        }
    }
}

pub fn parse(tokens: &[Token]) -> Parsed {
    let context = ParseContext::default();
    let mut statements = Vec::new();
    let mut tokens = tokens;

    {
        let _guard = context.push("program");
        while !at_end(tokens) {
            match declaration(&context, tokens) {
                Ok((statement, rest)) => {
                    statements.push(statement);
                    tokens = rest;
                }
                Err(error) => {
                    let line = error.line().unwrap_or_else(|| line_of(tokens));
                    context.record(error);
                    tokens = synchronize(tokens, false, line);
                }
            }
        }
    }

    Parsed {
        program: Program(statements),
        errors: ParseErrors(context.errors.into_inner()),
    }
}

fn at_end(tokens: &[Token]) -> bool {
    matches!(
        tokens.first().map(Token::token_type),
        None | Some(TokenType::Eof)
    )
}

fn line_of(tokens: &[Token]) -> usize {
    tokens.first().map(Token::line).unwrap_or(0)
}

fn is_recovery_point(token_type: &TokenType) -> bool {
    matches!(
        token_type,
        TokenType::Eof
            | TokenType::Function
            | TokenType::Var
            | TokenType::If
            | TokenType::While
            | TokenType::Print
            | TokenType::Return
            | TokenType::Class
    )
}

/// Skips at least one token, then stops after a `;`, before a token that starts a declaration,
/// or before the first token on a line after `error_line`.
fn synchronize(tokens: &[Token], in_block: bool, error_line: usize) -> &[Token] {
    let mut skipped = tokens.first();
    let mut tokens = tokens.get(1..).unwrap_or(&[]);

    while let Some(token) = tokens.first() {
        if skipped.map(Token::token_type) == Some(&TokenType::Semicolon) {
            break;
        }
        if token.line() > error_line
            || is_recovery_point(token.token_type())
            || (in_block && token.token_type() == &TokenType::RightBrace)
        {
            break;
        }
        skipped = Some(token);
        tokens = &tokens[1..];
    }

    tokens
}

fn skip_semicolon(tokens: &[Token]) -> &[Token] {
    match tokens.first().map(Token::token_type) {
        Some(TokenType::Semicolon) => &tokens[1..],
        _ => tokens,
    }
}

fn declaration<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Statement> {
    let _guard = context.push("declaration");
    match tokens.first().map(Token::token_type) {
        Some(TokenType::Var) => var_declaration(context, tokens),
        Some(TokenType::Function) => function(context, tokens),
        _ => statement(context, tokens),
    }
}

fn var_declaration<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Statement> {
    let _guard = context.push("var_declaration");
    let line = line_of(tokens);
    let (name, tokens) = match_identifier(context, &tokens[1..])?;
    let (initializer, tokens) = match tokens.first().map(Token::token_type) {
        Some(TokenType::Equal) => {
            let (expr, rest) = expression(context, &tokens[1..])?;
            (Some(expr), rest)
        }
        _ => (None, tokens),
    };
    Ok((
        Statement::new(line, StatementKind::VarDeclaration(name, initializer)),
        skip_semicolon(tokens),
    ))
}

fn function<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Statement> {
    let _guard = context.push("function");
    let line = line_of(tokens);
    let (name, tokens) = match_identifier(context, &tokens[1..])?;
    let mut tokens = consume(context, tokens, TokenType::LeftParen)?;
    let mut params = vec![];
    loop {
        if let Ok(rest) = consume(context, tokens, TokenType::RightParen) {
            tokens = rest;
            break;
        }

        let (param, rest) = match_identifier(context, tokens)?;
        params.push(param);
        tokens = rest;

        match tokens.first().map(Token::token_type) {
            Some(TokenType::Comma) => tokens = &tokens[1..],
            Some(TokenType::RightParen) => {
                tokens = &tokens[1..];
                break;
            }
            _ => {
                return Err(context.error(
                    ParseError::ExpectedOneOf(vec![TokenType::Comma, TokenType::RightParen]),
                    tokens,
                ))
            }
        }
    }
    let (body, tokens) = block(context, tokens)?;
    Ok((
        Statement::new(
            line,
            StatementKind::FunctionDeclaration(Function { name, params, body }),
        ),
        tokens,
    ))
}

fn statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Statement> {
    let _guard = context.nest("statement", tokens)?;
    let line = line_of(tokens);
    match tokens.first().map(Token::token_type) {
        Some(TokenType::Print) => print_statement(context, tokens),
        Some(TokenType::LeftBrace) => {
            let (statements, rest) = block(context, tokens)?;
            Ok((Statement::new(line, StatementKind::Block(statements)), rest))
        }
        Some(TokenType::If) => if_statement(context, tokens),
        Some(TokenType::While) => while_statement(context, tokens),
        Some(TokenType::Return) => return_statement(context, tokens),
        Some(TokenType::Break) => Ok((
            Statement::new(line, StatementKind::Break),
            skip_semicolon(&tokens[1..]),
        )),
        Some(TokenType::Continue) => Ok((
            Statement::new(line, StatementKind::Continue),
            skip_semicolon(&tokens[1..]),
        )),
        Some(TokenType::Include) => include_statement(context, tokens),
        Some(TokenType::Try) => try_statement(context, tokens),
        _ => expression_statement(context, tokens),
    }
}

fn block<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Vec<Statement>> {
    let _guard = context.push("block");
    let mut tokens = consume(context, tokens, TokenType::LeftBrace)?;
    let mut statements = Vec::new();

    loop {
        match tokens.first().map(Token::token_type) {
            Some(TokenType::RightBrace) => return Ok((statements, &tokens[1..])),
            None | Some(TokenType::Eof) => {
                return Err(context.error(ParseError::Expected(TokenType::RightBrace), tokens))
            }
            _ => {}
        }

        match declaration(context, tokens) {
            Ok((statement, rest)) => {
                statements.push(statement);
                tokens = rest;
            }
            Err(error) => {
                let line = error.line().unwrap_or_else(|| line_of(tokens));
                context.record(error);
                tokens = synchronize(tokens, true, line);
            }
        }
    }
}

fn if_statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Statement> {
    let _guard = context.push("if_statement");
    let line = line_of(tokens);
    let (condition, tokens) = expression(context, &tokens[1..])?;
    let (then_branch, tokens) = statement(context, tokens)?;
    let (else_branch, tokens) = match tokens.first().map(Token::token_type) {
        Some(TokenType::Else) => {
            let (else_branch, rest) = statement(context, &tokens[1..])?;
            (Some(Box::new(else_branch)), rest)
        }
        _ => (None, tokens),
    };
    Ok((
        Statement::new(
            line,
            StatementKind::If(condition, Box::new(then_branch), else_branch),
        ),
        tokens,
    ))
}

fn while_statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Statement> {
    let _guard = context.push("while_statement");
    let line = line_of(tokens);
    let (condition, tokens) = expression(context, &tokens[1..])?;
    let (body, tokens) = statement(context, tokens)?;
    Ok((
        Statement::new(line, StatementKind::While(condition, Box::new(body))),
        tokens,
    ))
}

fn return_statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Statement> {
    let _guard = context.push("return_statement");
    let line = line_of(tokens);
    let tokens = &tokens[1..];
    let takes_value = tokens.first().is_some_and(|next| {
        next.line() == line
            && !matches!(
                next.token_type(),
                TokenType::Semicolon | TokenType::RightBrace | TokenType::Eof
            )
    });

    let (value, tokens) = if takes_value {
        let (expr, rest) = expression(context, tokens)?;
        (Some(expr), rest)
    } else {
        (None, tokens)
    };
    Ok((
        Statement::new(line, StatementKind::Return(value)),
        skip_semicolon(tokens),
    ))
}

fn include_statement<'a>(
    context: &ParseContext,
    tokens: &'a [Token],
) -> ParseResult<'a, Statement> {
    let _guard = context.push("include_statement");
    let line = line_of(tokens);
    let tokens = &tokens[1..];
    match tokens.first().map(Token::token_type) {
        Some(TokenType::Identifier(module)) | Some(TokenType::String(module)) => Ok((
            Statement::new(line, StatementKind::Include(module.clone())),
            skip_semicolon(&tokens[1..]),
        )),
        _ => Err(context.error(ParseError::ExpectedModule, tokens)),
    }
}

fn try_statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Statement> {
    let _guard = context.push("try_statement");
    let line = line_of(tokens);
    let (body, tokens) = statement(context, &tokens[1..])?;
    let tokens = consume(context, tokens, TokenType::Catch)?;
    let (error_name, tokens) = match tokens {
        [Token {
            token_type: TokenType::LeftParen,
            ..
        }, Token {
            token_type: TokenType::Identifier(name),
            ..
        }, Token {
            token_type: TokenType::RightParen,
            ..
        }, rest @ ..] => (Some(name.clone()), rest),
        _ => (None, tokens),
    };
    let (handler, tokens) = statement(context, tokens)?;
    Ok((
        Statement::new(
            line,
            StatementKind::TryCatch {
                body: Box::new(body),
                error_name,
                handler: Box::new(handler),
            },
        ),
        tokens,
    ))
}

fn print_statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Statement> {
    let _guard = context.push("print_statement");
    let line = line_of(tokens);
    let (expr, rest) = expression(context, &tokens[1..])?;
    Ok((
        Statement::new(line, StatementKind::Print(expr)),
        skip_semicolon(rest),
    ))
}

fn expression_statement<'a>(
    context: &ParseContext,
    tokens: &'a [Token],
) -> ParseResult<'a, Statement> {
    let _guard = context.push("expression_statement");
    let line = line_of(tokens);
    let (expr, rest) = expression(context, tokens)?;
    Ok((
        Statement::new(line, StatementKind::Expression(expr)),
        skip_semicolon(rest),
    ))
}

fn expression<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.nest("expression", tokens)?;
    assignment(context, tokens)
}

fn assignment<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("assignment");
    let (expr, rest) = logical_or(context, tokens)?;

    match rest.first().map(Token::token_type) {
        Some(TokenType::Equal) => match expr {
            Expression::Variable(name) => {
                let (value, rest) = assignment(context, &rest[1..])?;
                Ok((Expression::Assign(name, Box::new(value)), rest))
            }
            _ => Err(context.error(ParseError::InvalidAssignmentTarget, rest)),
        },
        _ => Ok((expr, rest)),
    }
}

fn binary<'a>(
    context: &ParseContext,
    precedence: impl Fn(&ParseContext, &'a [Token]) -> ParseResult<'a, Expression>,
    operator: impl Fn(&Token) -> Option<InfixOperator>,
    tokens: &'a [Token],
) -> ParseResult<'a, Expression> {
    let (mut expr, mut tokens) = precedence(context, tokens)?;

    while let Some(token) = tokens.first() {
        let op = match operator(token) {
            Some(op) => op,
            None => break,
        };
        tokens = &tokens[1..];
        let (right, rest) = precedence(context, tokens)?;
        expr = Expression::Binary(Box::new(expr), op, Box::new(right));
        tokens = rest;
    }

    Ok((expr, tokens))
}

fn logical_or<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("logical_or");
    binary(
        context,
        logical_and,
        |token| match token.token_type() {
            TokenType::Or => Some(InfixOperator::Or),
            _ => None,
        },
        tokens,
    )
}

fn logical_and<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("logical_and");
    binary(
        context,
        equality,
        |token| match token.token_type() {
            TokenType::And => Some(InfixOperator::And),
            _ => None,
        },
        tokens,
    )
}

fn equality<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("equality");
    binary(
        context,
        comparison,
        |token| match token.token_type() {
            TokenType::EqualEqual => Some(InfixOperator::Equal),
            TokenType::BangEqual => Some(InfixOperator::NotEqual),
            _ => None,
        },
        tokens,
    )
}

fn comparison<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("comparison");
    binary(
        context,
        term,
        |token| match token.token_type() {
            TokenType::Less => Some(InfixOperator::LessThan),
            TokenType::LessEqual => Some(InfixOperator::LessThanOrEqual),
            TokenType::Greater => Some(InfixOperator::GreaterThan),
            TokenType::GreaterEqual => Some(InfixOperator::GreaterThanOrEqual),
            _ => None,
        },
        tokens,
    )
}

fn term<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("term");
    binary(
        context,
        factor,
        |token| match token.token_type() {
            TokenType::Plus => Some(InfixOperator::Plus),
            TokenType::Minus => Some(InfixOperator::Minus),
            _ => None,
        },
        tokens,
    )
}

fn factor<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("factor");
    binary(
        context,
        unary,
        |token| match token.token_type() {
            TokenType::Star => Some(InfixOperator::Multiply),
            TokenType::Slash => Some(InfixOperator::Divide),
            TokenType::Percent => Some(InfixOperator::Modulo),
            _ => None,
        },
        tokens,
    )
}

fn unary<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.nest("unary", tokens)?;

    let operator = match tokens.first().map(Token::token_type) {
        Some(TokenType::Minus) => UnaryOperator::Negate,
        Some(TokenType::Bang) | Some(TokenType::Not) => UnaryOperator::Not,
        _ => return call(context, tokens),
    };

    let (right, rest) = unary(context, &tokens[1..])?;
    Ok((Expression::Unary(operator, Box::new(right)), rest))
}

fn call<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("call");
    let (mut expr, mut tokens) = primary(context, tokens)?;

    while let Some(TokenType::LeftParen) = tokens.first().map(Token::token_type) {
        let (args, rest) = arguments(context, &tokens[1..])?;
        expr = Expression::Call(Box::new(expr), args);
        tokens = rest;
    }

    Ok((expr, tokens))
}

fn arguments<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Vec<Expression>> {
    let mut args = Vec::new();
    let mut tokens = tokens;

    loop {
        if tokens.first().map(Token::token_type) == Some(&TokenType::RightParen) {
            return Ok((args, &tokens[1..]));
        }
        let (arg, rest) = expression(context, tokens)?;
        args.push(arg);
        tokens = rest;
        match tokens.first().map(Token::token_type) {
            Some(TokenType::Comma) => tokens = &tokens[1..],
            Some(TokenType::RightParen) => return Ok((args, &tokens[1..])),
            _ => {
                return Err(context.error(
                    ParseError::ExpectedOneOf(vec![TokenType::Comma, TokenType::RightParen]),
                    tokens,
                ))
            }
        }
    }
}

fn primary<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("primary");
    let Some(token) = tokens.first() else {
        return Err(context.error(ParseError::Unexpected(TokenType::Eof), tokens));
    };

    let literal = |literal| -> ParseResult<'a, Expression> {
        Ok((Expression::Literal(literal), &tokens[1..]))
    };
    match token.token_type() {
        TokenType::Integer(n) => literal(Literal::Integer(*n)),
        TokenType::Float(n) => literal(Literal::Float(*n)),
        TokenType::String(s) => literal(Literal::String(s.clone())),
        TokenType::True => literal(Literal::Boolean(true)),
        TokenType::False => literal(Literal::Boolean(false)),
        TokenType::Null => literal(Literal::Null),
        TokenType::TemplateString(raw) => Ok((template(context, raw, tokens)?, &tokens[1..])),
        TokenType::LeftParen => {
            let (expr, rest) = expression(context, &tokens[1..])?;
            let tokens = consume(context, rest, TokenType::RightParen)?;
            Ok((expr, tokens))
        }
        TokenType::Identifier(name) => Ok((Expression::Variable(name.clone()), &tokens[1..])),
        reserved @ (TokenType::Class | TokenType::This | TokenType::Super | TokenType::New) => {
            Err(context.error(ParseError::Reserved(reserved.clone()), tokens))
        }
        token_type => Err(context.error(ParseError::Unexpected(token_type.clone()), tokens)),
    }
}

/// Desugars `$"a{x}b"` into `"a" + metin(x) + "b"`.
fn template(
    context: &ParseContext,
    raw: &str,
    tokens: &[Token],
) -> Result<Expression, ParseErrorWithContext> {
    let _guard = context.push("template");
    let invalid = || context.error(ParseError::InvalidTemplate(raw.to_string()), tokens);

    let mut parts = Vec::new();
    let mut rest = raw;
    while let Some(open) = rest.find('{') {
        if open > 0 {
            parts.push(Expression::Literal(Literal::String(rest[..open].to_string())));
        }
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(invalid)?;
        let inner = tokenize(&after[..close]).map_err(|_| invalid())?;
        let (expr, remaining) = expression(context, &inner).map_err(|_| invalid())?;
        if !at_end(remaining) {
            return Err(invalid());
        }
        parts.push(Expression::Call(
            Box::new(Expression::Variable("metin".to_string())),
            vec![expr],
        ));
        rest = &after[close + 1..];
    }
    if !rest.is_empty() {
        parts.push(Expression::Literal(Literal::String(rest.to_string())));
    }

    let mut parts = parts.into_iter();
    let first = parts
        .next()
        .unwrap_or_else(|| Expression::Literal(Literal::String(String::new())));
    Ok(parts.fold(first, |acc, part| {
        Expression::Binary(Box::new(acc), InfixOperator::Plus, Box::new(part))
    }))
}

fn consume<'a>(
    context: &ParseContext,
    tokens: &'a [Token],
    token_type: TokenType,
) -> Result<&'a [Token], ParseErrorWithContext> {
    match tokens.first().map(Token::token_type) {
        Some(t) if t == &token_type => Ok(&tokens[1..]),
        _ => Err(context.error(ParseError::Expected(token_type), tokens)),
    }
}

fn match_identifier<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, String> {
    match tokens.first().map(Token::token_type) {
        Some(TokenType::Identifier(name)) => Ok((name.clone(), &tokens[1..])),
        _ => Err(context.error(ParseError::ExpectedIdentifier, tokens)),
    }
}
