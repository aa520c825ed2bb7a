use std::fmt::{Display, Write};

#[derive(Debug, Clone, PartialEq)]
pub struct Program(pub Vec<Statement>);

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub line: usize,
    pub kind: StatementKind,
}

impl Statement {
    pub fn new(line: usize, kind: StatementKind) -> Self {
        Self { line, kind }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    Expression(Expression),
    VarDeclaration(String, Option<Expression>),
    FunctionDeclaration(Function),
    Print(Expression),
    Block(Vec<Statement>),
    If(Expression, Box<Statement>, Option<Box<Statement>>),
    While(Expression, Box<Statement>),
    Return(Option<Expression>),
    Break,
    Continue,
    Include(String),
    TryCatch {
        body: Box<Statement>,
        error_name: Option<String>,
        handler: Box<Statement>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Literal),
    Variable(String),
    Binary(Box<Expression>, InfixOperator, Box<Expression>),
    Unary(UnaryOperator, Box<Expression>),
    Call(Box<Expression>, Vec<Expression>),
    Assign(String, Box<Expression>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Negate,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfixOperator {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    And,
    Or,
}

/// Formats a float the way the interpreter prints it: whole values keep one decimal.
pub fn format_float(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 {
        format!("{n:.1}")
    } else {
        format!("{n}")
    }
}

/// Whether `name` could be written as a bare module identifier in `dahil et`.
pub fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || "üğışçöÜĞİŞÇÖ".contains(c))
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || "üğışçöÜĞİŞÇÖ".contains(c))
}

impl Display for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for statement in &self.0 {
            writeln!(f, "{}", statement)?;
        }
        Ok(())
    }
}

impl Display for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut out = String::new();
        write_statement(&mut out, self, 0)?;
        f.write_str(&out)
    }
}

fn write_indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str("    ");
    }
}

fn write_body(out: &mut String, statements: &[Statement], depth: usize) -> std::fmt::Result {
    writeln!(out, "{{")?;
    for statement in statements {
        write_indent(out, depth + 1);
        write_statement(out, statement, depth + 1)?;
        writeln!(out)?;
    }
    write_indent(out, depth);
    write!(out, "}}")
}

fn write_statement(out: &mut String, statement: &Statement, depth: usize) -> std::fmt::Result {
    match &statement.kind {
        StatementKind::Expression(expr) => write!(out, "{expr}"),
        StatementKind::Print(expr) => write!(out, "yazdır({expr})"),
        StatementKind::VarDeclaration(name, Some(expr)) => write!(out, "değişken {name} = {expr}"),
        StatementKind::VarDeclaration(name, None) => write!(out, "değişken {name}"),
        StatementKind::FunctionDeclaration(function) => {
            write!(out, "fonksiyon {}({}) ", function.name, function.params.join(", "))?;
            write_body(out, &function.body, depth)
        }
        StatementKind::Block(statements) => write_body(out, statements, depth),
        StatementKind::If(condition, then_branch, else_branch) => {
            write!(out, "eğer ({condition}) ")?;
            write_statement(out, then_branch, depth)?;
            if let Some(else_branch) = else_branch {
                write!(out, " değilse ")?;
                write_statement(out, else_branch, depth)?;
            }
            Ok(())
        }
        StatementKind::While(condition, body) => {
            write!(out, "döngü ({condition}) ")?;
            write_statement(out, body, depth)
        }
        StatementKind::Return(Some(expr)) => write!(out, "dön {expr}"),
        StatementKind::Return(None) => write!(out, "dön"),
        StatementKind::Break => write!(out, "kır"),
        StatementKind::Continue => write!(out, "devam"),
        StatementKind::Include(module) if is_plain_identifier(module) => {
            write!(out, "dahil et {module}")
        }
        StatementKind::Include(module) => write!(out, "dahil_et \"{module}\""),
        StatementKind::TryCatch {
            body,
            error_name,
            handler,
        } => {
            write!(out, "dene ")?;
            write_statement(out, body, depth)?;
            match error_name {
                Some(name) => write!(out, " yakala ({name}) ")?,
                None => write!(out, " yakala ")?,
            }
            write_statement(out, handler, depth)
        }
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expression::Literal(literal) => write!(f, "{}", literal),
            Expression::Variable(name) => write!(f, "{}", name),
            Expression::Binary(left, op, right) => {
                write_operand(f, left)?;
                write!(f, " {} ", op)?;
                write_operand(f, right)
            }
            Expression::Unary(op, right) => {
                write!(f, "{}", op)?;
                write_operand(f, right)
            }
            Expression::Call(callee, args) => {
                write!(f, "{}(", callee)?;
                for (i, arg) in args.iter().enumerate() {
                    write!(f, "{}", arg)?;
                    if i != args.len() - 1 {
                        write!(f, ", ")?;
                    }
                }
                write!(f, ")")
            }
            Expression::Assign(name, value) => write!(f, "{} = {}", name, value),
        }
    }
}

fn write_operand(f: &mut std::fmt::Formatter<'_>, expr: &Expression) -> std::fmt::Result {
    match expr {
        Expression::Binary(..) | Expression::Assign(..) => write!(f, "({})", expr),
        _ => write!(f, "{}", expr),
    }
}

impl Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Integer(n) => write!(f, "{}", n),
            Literal::Float(n) => f.write_str(&format_float(*n)),
            Literal::String(s) => write!(f, "\"{}\"", s),
            Literal::Boolean(true) => write!(f, "doğru"),
            Literal::Boolean(false) => write!(f, "yanlış"),
            Literal::Null => write!(f, "yok"),
        }
    }
}

impl Display for InfixOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InfixOperator::Equal => write!(f, "=="),
            InfixOperator::NotEqual => write!(f, "!="),
            InfixOperator::LessThan => write!(f, "<"),
            InfixOperator::LessThanOrEqual => write!(f, "<="),
            InfixOperator::GreaterThan => write!(f, ">"),
            InfixOperator::GreaterThanOrEqual => write!(f, ">="),
            InfixOperator::Plus => write!(f, "+"),
            InfixOperator::Minus => write!(f, "-"),
            InfixOperator::Multiply => write!(f, "*"),
            InfixOperator::Divide => write!(f, "/"),
            InfixOperator::Modulo => write!(f, "%"),
            InfixOperator::And => write!(f, "ve"),
            InfixOperator::Or => write!(f, "veya"),
        }
    }
}

impl Display for UnaryOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnaryOperator::Negate => write!(f, "-"),
            UnaryOperator::Not => write!(f, "!"),
        }
    }
}
