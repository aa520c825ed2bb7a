mod builtins;
mod environment;
pub mod hooks;
mod value;

use std::{
    cell::RefCell,
    fmt::Debug,
    io::{BufRead, Write},
    path::{Path, PathBuf},
    rc::Rc,
};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    ast::{Expression, InfixOperator, Program, Statement, StatementKind, UnaryOperator},
    parser::parse,
    protocol::escape_output_line,
    tokenizer::tokenize,
};

pub use self::{
    builtins::Builtin,
    environment::{CallFrame, Environment, Scope, ScopeId},
    value::Value,
};
use self::hooks::{DebugServer, ExecutionHook, HookAction, MemoryHook, ProfileHook, TraceHook};

pub type Output = Rc<RefCell<dyn Write>>;
pub type Input = Rc<RefCell<dyn BufRead>>;

pub const EXIT_SYNTAX: i32 = 65;
pub const EXIT_RUNTIME: i32 = 70;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub trace: bool,
    pub debug: bool,
    pub dump_memory: bool,
    pub profile: bool,
    pub loop_limit: usize,
    pub max_depth: usize,
    /// Directory of the running script, searched first by `dahil et`.
    pub script_dir: Option<PathBuf>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            trace: false,
            debug: false,
            dump_memory: false,
            profile: false,
            loop_limit: 10_000,
            max_depth: 200,
            script_dir: None,
        }
    }
}

impl RunOptions {
    /// Whether stdout carries protocol frames besides program output.
    pub fn is_instrumented(&self) -> bool {
        self.trace || self.debug || self.dump_memory || self.profile
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

#[derive(Debug, thiserror::Error)]
#[error("{kind} (Satir: {line})")]
pub struct ExecutionError {
    pub kind: ExecutionErrorKind,
    pub line: usize,
}

impl ExecutionError {
    /// The single line printed for this error.
    pub fn report(&self) -> String {
        match &self.kind {
            ExecutionErrorKind::LoopLimitExceeded { .. } => format!(
                "Logic Error: Infinite loop detected at line {} ({})",
                self.line, self.kind
            ),
            ExecutionErrorKind::StackOverflow { .. } => format!(
                "Logic Error: Stack overflow at line {} ({})",
                self.line, self.kind
            ),
            _ => format!("Runtime Error: {} (Satir: {})", self.kind, self.line),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutionErrorKind {
    #[error("Girdi/çıktı hatası: {0}")]
    IO(#[from] std::io::Error),
    #[error("Tanımsız değişken: '{name}'{}", suggestion_hint(.suggestion))]
    UndefinedVariable {
        name: String,
        suggestion: Option<String>,
    },
    #[error("Tanımsız fonksiyon: '{name}'{}", suggestion_hint(.suggestion))]
    UndefinedFunction {
        name: String,
        suggestion: Option<String>,
    },
    #[error("'{0}' çağrılabilir değil")]
    NotCallable(String),
    #[error("'{name}' {expected} argüman bekliyor, {found} verildi")]
    ArgumentCount {
        name: String,
        expected: String,
        found: usize,
    },
    #[error("Geçersiz işlem: {left} {operator} {right}")]
    InvalidOperation {
        operator: InfixOperator,
        left: &'static str,
        right: &'static str,
    },
    #[error("Geçersiz işlem: {operator}{operand}")]
    InvalidUnary {
        operator: UnaryOperator,
        operand: &'static str,
    },
    #[error("Sıfıra bölme")]
    DivisionByZero,
    #[error("Tamsayı taşması")]
    IntegerOverflow,
    #[error("'{name}': {message}")]
    InvalidArgument { name: String, message: String },
    #[error("Modül bulunamadı: '{0}'")]
    ModuleNotFound(String),
    #[error("'{module}' modülü yüklenemedi: {message}")]
    ModuleError { module: String, message: String },
    #[error("Döngü {limit} yineleme sınırını aştı")]
    LoopLimitExceeded { limit: usize },
    #[error("Çağrı derinliği {depth} sınırını aştı")]
    StackOverflow { depth: usize },
    #[error("Yürütme durduruldu")]
    Stopped,
}

fn suggestion_hint(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(name) => format!(" ('{name}' mi demek istediniz?)"),
        None => String::new(),
    }
}

impl ExecutionErrorKind {
    /// Whether `dene/yakala` may handle this error.
    pub fn is_catchable(&self) -> bool {
        !matches!(
            self,
            ExecutionErrorKind::IO(_)
                | ExecutionErrorKind::LoopLimitExceeded { .. }
                | ExecutionErrorKind::StackOverflow { .. }
                | ExecutionErrorKind::Stopped
        )
    }

    pub fn is_logic(&self) -> bool {
        matches!(
            self,
            ExecutionErrorKind::LoopLimitExceeded { .. } | ExecutionErrorKind::StackOverflow { .. }
        )
    }
}

/// How a statement finished.
#[derive(Debug, Clone, PartialEq)]
enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

pub struct Interpreter {
    environment: Environment,
    frames: Vec<CallFrame>,
    builtins: FxHashMap<&'static str, Builtin>,
    hooks: Vec<Box<dyn ExecutionHook>>,
    loaded_modules: FxHashSet<PathBuf>,
    options: RunOptions,
    line: usize,
    stdout: Output,
    stdin: Input,
}

impl Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("environment", &self.environment)
            .field("frames", &self.frames)
            .field("line", &self.line)
            .finish()
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::with_io(
            Rc::new(RefCell::new(std::io::stdout())),
            Rc::new(RefCell::new(std::io::BufReader::new(std::io::stdin()))),
            RunOptions::default(),
        )
    }
}

impl Interpreter {
    pub fn new(stdout: Output) -> Self {
        Self::with_io(stdout, Rc::new(RefCell::new(std::io::empty())), RunOptions::default())
    }

    pub fn with_io(stdout: Output, stdin: Input, options: RunOptions) -> Self {
        Self {
            environment: Environment::new(),
            frames: vec![CallFrame {
                function: "<main>".to_string(),
                scope: ScopeId::GLOBAL,
                line: 0,
            }],
            builtins: builtins::registry(),
            hooks: Vec::new(),
            loaded_modules: FxHashSet::default(),
            options,
            line: 0,
            stdout,
            stdin,
        }
    }

    pub fn add_hook(&mut self, hook: Box<dyn ExecutionHook>) {
        self.hooks.push(hook);
    }

    /// Installs the hooks the run options ask for.
    pub fn instrument(&mut self) {
        if self.options.debug {
            let server = DebugServer::new(self.stdout.clone(), self.stdin.clone());
            self.add_hook(Box::new(server));
        } else if self.options.trace {
            self.add_hook(Box::new(TraceHook::new(self.stdout.clone())));
        }
        if self.options.dump_memory {
            self.add_hook(Box::new(MemoryHook::new(self.stdout.clone())));
        }
        if self.options.profile {
            self.add_hook(Box::new(ProfileHook::new(self.stdout.clone())));
        }
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn frames(&self) -> &[CallFrame] {
        &self.frames
    }

    pub fn interpret(&mut self, program: &Program) -> Result<(), ExecutionError> {
        self.hoist(ScopeId::GLOBAL, &program.0);

        for stmt in program.0.iter() {
            match self.execute(stmt) {
                Ok(Flow::Return(_)) => break,
                Ok(_) => {}
                Err(kind) => {
                    let line = self.line;
                    self.unwind(1);
                    return Err(ExecutionError { kind, line });
                }
            }
        }

        self.stdout
            .borrow_mut()
            .flush()
            .map_err(|e| ExecutionError {
                kind: e.into(),
                line: self.line,
            })
    }

    fn current_scope(&self) -> ScopeId {
        self.frames
            .last()
            .map(|frame| frame.scope)
            .unwrap_or(ScopeId::GLOBAL)
    }

    fn hoist(&mut self, scope: ScopeId, statements: &[Statement]) {
        for stmt in statements {
            if let StatementKind::FunctionDeclaration(function) = &stmt.kind {
                self.environment
                    .define(scope, &function.name, Value::Function(Rc::new(function.clone())));
            }
        }
    }

    fn execute(&mut self, stmt: &Statement) -> Result<Flow, ExecutionErrorKind> {
        if !matches!(stmt.kind, StatementKind::Block(_)) {
            self.line = stmt.line;
            if let Some(frame) = self.frames.last_mut() {
                frame.line = stmt.line;
            }
            for hook in self.hooks.iter_mut() {
                if hook.on_statement(stmt.line, &self.environment, &self.frames)? == HookAction::Stop {
                    return Err(ExecutionErrorKind::Stopped);
                }
            }
        }

        let flow = match &stmt.kind {
            StatementKind::Expression(expression) => {
                self.evaluate(expression)?;
                Flow::Normal
            }
            StatementKind::VarDeclaration(name, initializer) => {
                let value = match initializer {
                    Some(expression) => self.evaluate(expression)?,
                    None => Value::Null,
                };
                let scope = self.current_scope();
                self.environment.define(scope, name, value);
                Flow::Normal
            }
            StatementKind::FunctionDeclaration(function) => {
                let scope = self.current_scope();
                self.environment
                    .define(scope, &function.name, Value::Function(Rc::new(function.clone())));
                Flow::Normal
            }
            StatementKind::Print(expression) => {
                let value = self.evaluate(expression)?;
                self.print(&value.to_string())?;
                Flow::Normal
            }
            StatementKind::Block(statements) => self.execute_block(statements)?,
            StatementKind::If(condition, then_branch, else_branch) => {
                if self.evaluate(condition)?.is_truthy() {
                    self.execute(then_branch)?
                } else if let Some(else_branch) = else_branch {
                    self.execute(else_branch)?
                } else {
                    Flow::Normal
                }
            }
            StatementKind::While(condition, body) => {
                let mut iterations = 0;
                loop {
                    if !self.evaluate(condition)?.is_truthy() {
                        break Flow::Normal;
                    }
                    iterations += 1;
                    if iterations > self.options.loop_limit {
                        self.line = stmt.line;
                        return Err(ExecutionErrorKind::LoopLimitExceeded {
                            limit: self.options.loop_limit,
                        });
                    }
                    match self.execute(body)? {
                        Flow::Break => break Flow::Normal,
                        Flow::Return(value) => break Flow::Return(value),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            StatementKind::Return(expression) => {
                let value = match expression {
                    Some(expression) => self.evaluate(expression)?,
                    None => Value::Null,
                };
                Flow::Return(value)
            }
            StatementKind::Break => Flow::Break,
            StatementKind::Continue => Flow::Continue,
            StatementKind::Include(module) => {
                self.include(module)?;
                Flow::Normal
            }
            StatementKind::TryCatch {
                body,
                error_name,
                handler,
            } => {
                let depth = self.frames.len();
                match self.execute(body) {
                    Ok(flow) => flow,
                    Err(error) if error.is_catchable() => {
                        log::debug!("Caught error at line {}: {}", self.line, error);
                        self.unwind(depth);
                        if let Some(name) = error_name {
                            let scope = self.current_scope();
                            self.environment
                                .define(scope, name, Value::String(error.to_string()));
                        }
                        self.execute(handler)?
                    }
                    Err(error) => return Err(error),
                }
            }
        };

        Ok(flow)
    }

    fn execute_block(&mut self, statements: &[Statement]) -> Result<Flow, ExecutionErrorKind> {
        for stmt in statements {
            let flow = self.execute(stmt)?;
            if flow != Flow::Normal {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    /// Drops frames left behind by an error raised deeper than `depth`.
    fn unwind(&mut self, depth: usize) {
        let released = self
            .frames
            .iter()
            .skip(depth)
            .map(|frame| frame.scope)
            .find(|scope| *scope != ScopeId::GLOBAL);
        self.frames.truncate(depth);
        if let Some(scope) = released {
            self.environment.pop(scope);
        }
    }

    fn evaluate(&mut self, expression: &Expression) -> Result<Value, ExecutionErrorKind> {
        match expression {
            Expression::Literal(literal) => Ok(Value::from(literal)),
            Expression::Variable(name) => self.lookup(name).ok_or_else(|| {
                ExecutionErrorKind::UndefinedVariable {
                    name: name.clone(),
                    suggestion: self.suggest(name),
                }
            }),
            Expression::Binary(a, InfixOperator::And, b) => {
                if !self.evaluate(a)?.is_truthy() {
                    return Ok(Value::Boolean(false));
                }
                Ok(Value::Boolean(self.evaluate(b)?.is_truthy()))
            }
            Expression::Binary(a, InfixOperator::Or, b) => {
                if self.evaluate(a)?.is_truthy() {
                    return Ok(Value::Boolean(true));
                }
                Ok(Value::Boolean(self.evaluate(b)?.is_truthy()))
            }
            Expression::Binary(a, op, b) => {
                let a = self.evaluate(a)?;
                let b = self.evaluate(b)?;
                binary(*op, a, b)
            }
            Expression::Unary(op, x) => {
                let x = self.evaluate(x)?;
                match (op, x) {
                    (UnaryOperator::Negate, Value::Integer(n)) => n
                        .checked_neg()
                        .map(Value::Integer)
                        .ok_or(ExecutionErrorKind::IntegerOverflow),
                    (UnaryOperator::Negate, Value::Float(n)) => Ok(Value::Float(-n)),
                    (UnaryOperator::Negate, x) => Err(ExecutionErrorKind::InvalidUnary {
                        operator: *op,
                        operand: x.type_name(),
                    }),
                    (UnaryOperator::Not, x) => Ok(Value::Boolean(!x.is_truthy())),
                }
            }
            Expression::Assign(name, expression) => {
                let value = self.evaluate(expression)?;
                let scope = self.current_scope();
                if self.environment.assign(scope, name, value.clone()) {
                    Ok(value)
                } else {
                    Err(ExecutionErrorKind::UndefinedVariable {
                        name: name.clone(),
                        suggestion: self.suggest(name),
                    })
                }
            }
            Expression::Call(callee, args) => {
                let callee = match callee.as_ref() {
                    Expression::Variable(name) => self.lookup(name).ok_or_else(|| {
                        ExecutionErrorKind::UndefinedFunction {
                            name: name.clone(),
                            suggestion: self.suggest(name),
                        }
                    })?,
                    callee => self.evaluate(callee)?,
                };
                let args = args
                    .iter()
                    .map(|arg| self.evaluate(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call(callee, args)
            }
        }
    }

    fn lookup(&self, name: &str) -> Option<Value> {
        self.environment
            .get(self.current_scope(), name)
            .cloned()
            .or_else(|| self.builtins.get(name).map(|builtin| Value::Builtin(*builtin)))
    }

    /// The closest visible name within two edits of `name`.
    fn suggest(&self, name: &str) -> Option<String> {
        self.environment
            .names(self.current_scope())
            .chain(self.builtins.keys().copied())
            .map(|candidate| (levenshtein(name, candidate), candidate))
            .filter(|(distance, _)| *distance > 0 && *distance <= 2)
            .min()
            .map(|(_, candidate)| candidate.to_string())
    }

    pub fn call(&mut self, callee: Value, args: Vec<Value>) -> Result<Value, ExecutionErrorKind> {
        let function = match callee {
            Value::Function(function) => function,
            Value::Builtin(builtin) => return builtin.call(self, &args),
            other => return Err(ExecutionErrorKind::NotCallable(other.to_string())),
        };

        if args.len() != function.params.len() {
            return Err(ExecutionErrorKind::ArgumentCount {
                name: function.name.clone(),
                expected: function.params.len().to_string(),
                found: args.len(),
            });
        }
        if self.frames.len() > self.options.max_depth {
            return Err(ExecutionErrorKind::StackOverflow {
                depth: self.options.max_depth,
            });
        }

        let call_line = self.line;
        let scope = self.environment.push(&function.name, self.current_scope());
        for (param, arg) in function.params.iter().zip(args) {
            self.environment.define(scope, param, arg);
        }
        self.frames.push(CallFrame {
            function: function.name.clone(),
            scope,
            line: call_line,
        });

        let result = self.execute_block(&function.body);

        // Errors keep the frame so the reported line and stack point inside the callee.
        if result.is_ok() {
            self.frames.pop();
            self.environment.pop(scope);
            self.line = call_line;
        }

        match result? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::Null),
        }
    }

    fn include(&mut self, module: &str) -> Result<(), ExecutionErrorKind> {
        let path = self
            .resolve_module(module)
            .ok_or_else(|| ExecutionErrorKind::ModuleNotFound(module.to_string()))?;
        let key = path.canonicalize().unwrap_or_else(|_| path.clone());
        // A module that includes itself finds itself loaded.
        if !self.loaded_modules.insert(key.clone()) {
            log::debug!("Module {} already loaded", module);
            return Ok(());
        }

        log::debug!("Loading module {} from {}", module, path.display());
        let result = self.load_module(module, &path);
        if result.is_err() {
            self.loaded_modules.remove(&key);
        }
        result
    }

    fn load_module(&mut self, module: &str, path: &Path) -> Result<(), ExecutionErrorKind> {
        let source = std::fs::read_to_string(path)?;
        let source = source.strip_prefix('\u{feff}').unwrap_or(&source);
        let module_error = |message: String| ExecutionErrorKind::ModuleError {
            module: module.to_string(),
            message,
        };
        let tokens = tokenize(source).map_err(|e| module_error(format!("{} (Satir: {})", e, e.line())))?;
        let program = parse(&tokens).into_result().map_err(|errors| {
            module_error(
                errors
                    .first()
                    .map(|e| format!("{} (Satir: {})", e.summary(), e.line().unwrap_or(0)))
                    .unwrap_or_default(),
            )
        })?;

        let include_line = self.line;
        let depth = self.frames.len();
        self.frames.push(CallFrame {
            function: format!("dahil:{module}"),
            scope: ScopeId::GLOBAL,
            line: include_line,
        });
        self.hoist(ScopeId::GLOBAL, &program.0);
        let result = self.execute_block(&program.0);
        if result.is_ok() {
            self.frames.truncate(depth);
            self.line = include_line;
        }
        result.map(|_| ())
    }

    fn resolve_module(&self, module: &str) -> Option<PathBuf> {
        let mut dirs: Vec<PathBuf> = self.options.script_dir.iter().cloned().collect();
        dirs.extend([".", "lib", "std_lib"].map(PathBuf::from));

        dirs.iter().find_map(|dir| {
            [module.to_string(), format!("{module}.tr")]
                .iter()
                .map(|candidate| dir.join(candidate))
                .find(|path| path.is_file())
        })
    }

    fn print(&self, text: &str) -> std::io::Result<()> {
        let mut stdout = self.stdout.borrow_mut();
        for line in text.split('\n') {
            if self.options.is_instrumented() {
                writeln!(stdout, "{}", escape_output_line(line))?;
            } else {
                writeln!(stdout, "{}", line)?;
            }
        }
        Ok(())
    }

    /// Writes a protocol line as is.
    pub(crate) fn emit(&self, line: &str) -> Result<(), ExecutionErrorKind> {
        writeln!(self.stdout.borrow_mut(), "{}", line)?;
        Ok(())
    }

    pub(crate) fn prompt(&self, text: &str) -> Result<(), ExecutionErrorKind> {
        let mut stdout = self.stdout.borrow_mut();
        write!(stdout, "{}", text)?;
        stdout.flush()?;
        Ok(())
    }

    pub(crate) fn read_input(&self) -> Result<String, ExecutionErrorKind> {
        self.stdout.borrow_mut().flush()?;
        let mut line = String::new();
        self.stdin.borrow_mut().read_line(&mut line)?;
        Ok(line.trim_end_matches(['\n', '\r']).to_string())
    }
}

fn binary(op: InfixOperator, a: Value, b: Value) -> Result<Value, ExecutionErrorKind> {
    let invalid = |a: &Value, b: &Value| ExecutionErrorKind::InvalidOperation {
        operator: op,
        left: a.type_name(),
        right: b.type_name(),
    };

    match op {
        InfixOperator::Equal => Ok(Value::Boolean(a == b)),
        InfixOperator::NotEqual => Ok(Value::Boolean(a != b)),
        InfixOperator::LessThan
        | InfixOperator::LessThanOrEqual
        | InfixOperator::GreaterThan
        | InfixOperator::GreaterThanOrEqual => {
            let ordering = match (&a, &b) {
                (Value::Integer(x), Value::Integer(y)) => Some(x.cmp(y)),
                (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
                _ => match (a.as_f64(), b.as_f64()) {
                    (Some(x), Some(y)) => x.partial_cmp(&y),
                    _ => return Err(invalid(&a, &b)),
                },
            };
            let Some(ordering) = ordering else {
                return Ok(Value::Boolean(false));
            };
            Ok(Value::Boolean(match op {
                InfixOperator::LessThan => ordering.is_lt(),
                InfixOperator::LessThanOrEqual => ordering.is_le(),
                InfixOperator::GreaterThan => ordering.is_gt(),
                _ => ordering.is_ge(),
            }))
        }
        InfixOperator::Plus => match (a, b) {
            (Value::String(a), b) => Ok(Value::String(format!("{a}{b}"))),
            (a, Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
            (a, b) => numeric(&a, &b, i64::checked_add, |x, y| x + y).ok_or_else(|| invalid(&a, &b))?,
        },
        InfixOperator::Minus => {
            numeric(&a, &b, i64::checked_sub, |x, y| x - y).ok_or_else(|| invalid(&a, &b))?
        }
        InfixOperator::Multiply => {
            numeric(&a, &b, i64::checked_mul, |x, y| x * y).ok_or_else(|| invalid(&a, &b))?
        }
        InfixOperator::Divide => {
            if b.as_f64() == Some(0.0) && a.as_f64().is_some() {
                return Err(ExecutionErrorKind::DivisionByZero);
            }
            match (&a, &b) {
                (Value::Integer(x), Value::Integer(y)) => match x.checked_rem(*y) {
                    Some(0) => x
                        .checked_div(*y)
                        .map(Value::Integer)
                        .ok_or(ExecutionErrorKind::IntegerOverflow),
                    Some(_) => Ok(Value::Float(*x as f64 / *y as f64)),
                    None => Err(ExecutionErrorKind::IntegerOverflow),
                },
                _ => numeric(&a, &b, |_, _| None, |x, y| x / y).ok_or_else(|| invalid(&a, &b))?,
            }
        }
        InfixOperator::Modulo => {
            if b.as_f64() == Some(0.0) && a.as_f64().is_some() {
                return Err(ExecutionErrorKind::DivisionByZero);
            }
            numeric(
                &a,
                &b,
                |x, y| {
                    x.checked_rem(y)
                        .map(|r| if r != 0 && (r < 0) != (y < 0) { r + y } else { r })
                },
                |x, y| {
                    let r = x % y;
                    if r != 0.0 && (r < 0.0) != (y < 0.0) {
                        r + y
                    } else {
                        r
                    }
                },
            )
            .ok_or_else(|| invalid(&a, &b))?
        }
        InfixOperator::And => Ok(Value::Boolean(a.is_truthy() && b.is_truthy())),
        InfixOperator::Or => Ok(Value::Boolean(a.is_truthy() || b.is_truthy())),
    }
}

/// Applies an arithmetic operator to two numbers. `None` when either side is not a number.
///
/// Two integers stay integers unless `int` reports an overflow.
fn numeric(
    a: &Value,
    b: &Value,
    int: fn(i64, i64) -> Option<i64>,
    float: fn(f64, f64) -> f64,
) -> Option<Result<Value, ExecutionErrorKind>> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => {
            Some(int(*x, *y).map(Value::Integer).ok_or(ExecutionErrorKind::IntegerOverflow))
        }
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => Some(Ok(Value::Float(float(x, y)))),
            _ => None,
        },
    }
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut current = vec![i + 1; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != *cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        previous = current;
    }
    previous[b.len()]
}

/// Runs `source` with captured output and no input.
pub fn run(source: &str) -> RunOutput {
    let stdout = Rc::new(RefCell::new(Vec::new()));
    let exit_code = run_with(
        source,
        RunOptions::default(),
        stdout.clone(),
        Rc::new(RefCell::new(std::io::empty())),
    );
    let stdout = String::from_utf8_lossy(&stdout.borrow()).into_owned();
    RunOutput {
        stdout,
        stderr: String::new(),
        exit_code,
    }
}

/// Tokenizes, parses and executes `source`, reporting any error as one line per
/// error on `stdout`. Returns the process exit code.
pub fn run_with(source: &str, options: RunOptions, stdout: Output, stdin: Input) -> i32 {
    let report = |line: String| {
        let mut stdout = stdout.borrow_mut();
        if let Err(e) = writeln!(stdout, "{}", line).and_then(|_| stdout.flush()) {
            log::error!("Failed to report error: {}", e);
        }
    };

    let tokens = match tokenize(source) {
        Ok(tokens) => tokens,
        Err(error) => {
            report(format!("Syntax Error: {} at line {}", error, error.line()));
            return EXIT_SYNTAX;
        }
    };

    let program = match parse(&tokens).into_result() {
        Ok(program) => program,
        Err(errors) => {
            log::debug!("{}", errors);
            for error in errors.iter() {
                report(format!(
                    "Parse Error: {} (Satir: {})",
                    error.summary(),
                    error.line().unwrap_or(0)
                ));
            }
            return EXIT_SYNTAX;
        }
    };

    let mut interpreter = Interpreter::with_io(stdout.clone(), stdin, options);
    interpreter.instrument();

    match interpreter.interpret(&program) {
        Ok(()) => 0,
        Err(ExecutionError {
            kind: ExecutionErrorKind::Stopped,
            ..
        }) => {
            log::info!("Execution stopped by the debugger");
            0
        }
        Err(error) => {
            log::debug!("{:#?}", interpreter);
            report(error.report());
            EXIT_RUNTIME
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(source: &str) -> String {
        run(source).stdout
    }

    #[test]
    fn integer_division_is_exact_or_float() {
        assert_eq!(eval("yazdır(6 / 3)\nyazdır(7 / 2)"), "2\n3.5\n");
    }

    #[test]
    fn modulo_is_floored() {
        assert_eq!(eval("yazdır(-7 % 3)\nyazdır(7 % -3)"), "2\n-2\n");
    }

    #[test]
    fn plus_concatenates_with_strings() {
        assert_eq!(eval("yazdır(\"a\" + 1)\nyazdır(2 + \"b\")"), "a1\n2b\n");
    }

    #[test]
    fn division_by_zero_is_a_runtime_error() {
        let output = run("yazdır(1)\nyazdır(1 / 0)");
        assert_eq!(output.exit_code, EXIT_RUNTIME);
        assert_eq!(output.stdout, "1\nRuntime Error: Sıfıra bölme (Satir: 2)\n");
    }

    #[test]
    fn undefined_name_suggests_close_match() {
        let output = run("değişken sayac = 1\nyazdır(sayaç)");
        assert_eq!(output.exit_code, EXIT_RUNTIME);
        assert!(output.stdout.contains("'sayac' mi demek istediniz?"), "{}", output.stdout);
    }

    #[test]
    fn integer_overflow_is_reported() {
        let output = run("yazdır(9223372036854775807 + 1)");
        assert_eq!(output.exit_code, EXIT_RUNTIME);
        assert!(output.stdout.contains("Tamsayı taşması"));
    }

    #[test]
    fn levenshtein_distances() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("sayaç", "sayac"), 1);
        assert_eq!(levenshtein("", "abc"), 3);
    }

    #[test]
    fn errors_classify_as_logic() {
        assert!(ExecutionErrorKind::LoopLimitExceeded { limit: 1 }.is_logic());
        assert!(!ExecutionErrorKind::StackOverflow { depth: 1 }.is_catchable());
        assert!(ExecutionErrorKind::DivisionByZero.is_catchable());
    }
}
