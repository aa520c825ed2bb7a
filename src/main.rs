use std::{
    cell::RefCell,
    io::Write,
    path::{Path, PathBuf},
    process::exit,
    rc::Rc,
};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use gumus::{
    debugger::{DebugSession, DebugState, SessionEvent},
    diagnostics::{suggest_fix, translate},
    interpreter::{run_with, Interpreter, RunOptions, EXIT_SYNTAX},
    parser::parse,
    protocol::VariableSnapshot,
    runner::{is_viable, BackendCommand, BackendFlag, Runner},
    tokenizer::tokenize,
    tree::{program_to_tree, to_mermaid},
};

const INTERPRETER_STACK_SIZE: usize = 256 * 1024 * 1024;

#[derive(Debug, Parser)]
#[command(name = "gumus", version, about = "Gümüş dili yorumlayıcısı")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

impl Cli {
    pub fn command(&self) -> &Command {
        self.command.as_ref().unwrap_or(&Command::Repl)
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a program
    Run(RunArgs),
    /// Print the token stream of a program
    Tokens(FileArgs),
    /// Print the syntax tree of a program
    Ast(AstArgs),
    /// Print a program in canonical layout
    Fmt(FileArgs),
    /// Step through a program in the terminal
    Debug(DebugArgs),
    Repl,
}

#[derive(Debug, Args)]
struct RunArgs {
    file: PathBuf,
    /// Pause before every statement and take debugger commands on stdin
    #[arg(long, visible_alias = "hata-ayikla")]
    debug: bool,
    /// Report every executed line and the visible variables
    #[arg(long)]
    trace: bool,
    /// Dump the call stack and variables before every statement
    #[arg(long)]
    dump_memory: bool,
    /// Report CPU and memory usage every few statements
    #[arg(long)]
    profile: bool,
    #[arg(long, env = "GUMUS_LOOP_LIMIT", default_value_t = 10_000)]
    loop_limit: usize,
    #[arg(long, env = "GUMUS_MAX_DEPTH", default_value_t = 200)]
    max_depth: usize,
    /// Run on this native backend when it is viable
    #[arg(long)]
    native: Option<PathBuf>,
}

impl RunArgs {
    fn options(&self) -> RunOptions {
        RunOptions {
            trace: self.trace,
            debug: self.debug,
            dump_memory: self.dump_memory,
            profile: self.profile,
            loop_limit: self.loop_limit,
            max_depth: self.max_depth,
            script_dir: self.file.parent().map(Path::to_path_buf),
        }
    }

    fn flags(&self) -> Vec<BackendFlag> {
        [
            (self.debug, BackendFlag::Debug),
            (self.trace, BackendFlag::Trace),
            (self.dump_memory, BackendFlag::DumpMemory),
            (self.profile, BackendFlag::Profile),
        ]
        .into_iter()
        .filter_map(|(set, flag)| set.then_some(flag))
        .collect()
    }
}

#[derive(Debug, Args)]
struct FileArgs {
    file: PathBuf,
}

#[derive(Debug, Args)]
struct AstArgs {
    file: PathBuf,
    /// Emit a Mermaid diagram instead of JSON
    #[arg(long)]
    mermaid: bool,
}

#[derive(Debug, Args)]
struct DebugArgs {
    file: PathBuf,
    /// Native backend to debug on when it is viable
    #[arg(long, env = "GUMUS_NATIVE_BACKEND")]
    native: Option<PathBuf>,
    /// Lines to stop at when continuing
    #[arg(long = "break", short)]
    breakpoints: Vec<usize>,
}

fn main() {
    env_logger::init();
    let args = Cli::parse();

    let result = match args.command() {
        Command::Run(args) => run_command(args),
        Command::Tokens(args) => tokens_command(args),
        Command::Ast(args) => ast_command(args),
        Command::Fmt(args) => fmt_command(args),
        Command::Debug(args) => debug_command(args),
        Command::Repl => repl_command(),
    };

    match result {
        Ok(code) => exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            exit(1);
        }
    }
}

fn read_source(file: &Path) -> anyhow::Result<String> {
    let source = std::fs::read_to_string(file)
        .with_context(|| format!("Could not read {}", file.display()))?;
    Ok(match source.strip_prefix('\u{feff}') {
        Some(source) => source.to_string(),
        None => source,
    })
}

/// Runs `f` on a thread with a stack deep enough for the call depth limit.
fn on_interpreter_thread<F>(f: F) -> anyhow::Result<i32>
where
    F: FnOnce() -> anyhow::Result<i32> + Send + 'static,
{
    std::thread::Builder::new()
        .name("interpreter".to_string())
        .stack_size(INTERPRETER_STACK_SIZE)
        .spawn(f)
        .context("Could not start the interpreter thread")?
        .join()
        .map_err(|_| anyhow::anyhow!("The interpreter thread panicked"))?
}

fn run_command(args: &RunArgs) -> anyhow::Result<i32> {
    if let Some(native) = &args.native {
        if is_viable(native) {
            let mut runner = Runner::new(BackendCommand::Native(native.clone()));
            for flag in args.flags() {
                runner = runner.with_flag(flag);
            }
            let output = runner.run_file(&args.file)?;
            print!("{}", translate(&output.stdout));
            eprint!("{}", translate(&output.stderr));
            return Ok(output.exit_code);
        }
        log::info!("Native backend {} is not viable, interpreting", native.display());
    }

    let source = read_source(&args.file)?;
    let options = args.options();
    on_interpreter_thread(move || {
        let stdout = Rc::new(RefCell::new(std::io::stdout()));
        let stdin = Rc::new(RefCell::new(std::io::BufReader::new(std::io::stdin())));
        Ok(run_with(&source, options, stdout, stdin))
    })
}

fn tokens_command(args: &FileArgs) -> anyhow::Result<i32> {
    let source = read_source(&args.file)?;
    let tokens = match tokenize(&source) {
        Ok(tokens) => tokens,
        Err(e) => {
            println!("Syntax Error: {} at line {}", e, e.line());
            return Ok(EXIT_SYNTAX);
        }
    };

    let mut line = 0;
    for token in tokens.iter() {
        if token.line() != line {
            print!("{:4} ", token.line());
            line = token.line();
        } else {
            print!("   | ");
        }
        println!("{:<24} {}", format!("{:?}", token.token_type()), token.token_type());
    }

    Ok(0)
}

/// Tokenizes and parses `file`, printing every error found.
fn parse_file(file: &Path) -> anyhow::Result<Option<gumus::ast::Program>> {
    let source = read_source(file)?;
    let tokens = match tokenize(&source) {
        Ok(tokens) => tokens,
        Err(e) => {
            println!("Syntax Error: {} at line {}", e, e.line());
            return Ok(None);
        }
    };
    match parse(&tokens).into_result() {
        Ok(program) => Ok(Some(program)),
        Err(errors) => {
            for error in errors.iter() {
                println!("Parse Error: {} (Satir: {})", error.summary(), error.line().unwrap_or(0));
            }
            Ok(None)
        }
    }
}

fn ast_command(args: &AstArgs) -> anyhow::Result<i32> {
    let Some(program) = parse_file(&args.file)? else {
        return Ok(EXIT_SYNTAX);
    };

    let tree = program_to_tree(&program);
    if args.mermaid {
        print!("{}", to_mermaid(&tree));
    } else {
        println!("{}", serde_json::to_string_pretty(&tree)?);
    }
    Ok(0)
}

fn fmt_command(args: &FileArgs) -> anyhow::Result<i32> {
    let Some(program) = parse_file(&args.file)? else {
        return Ok(EXIT_SYNTAX);
    };
    print!("{}", program);
    Ok(0)
}

fn print_variables(variables: &VariableSnapshot) {
    for scope in &variables.scopes {
        println!("  [{}]", scope.name);
        for variable in &scope.variables {
            println!(
                "    {} = {} ({})",
                variable.name,
                variable.display_value(),
                variable.type_name
            );
        }
    }
}

fn debug_command(args: &DebugArgs) -> anyhow::Result<i32> {
    let backend = BackendCommand::detect(args.native.as_deref())?;
    let mut session = DebugSession::start(&args.file, &backend)?;
    for line in &args.breakpoints {
        session.add_breakpoint(*line);
    }

    println!("Komutlar: [a]dım, [g]ir, [ç]ık, [d]evam, [v]eriler, [b] <satır>, [q] dur");
    while let Ok(event) = session.events().recv() {
        match event {
            SessionEvent::Trace { line } => println!("-> satır {line}"),
            SessionEvent::Output(text) => println!("{text}"),
            SessionEvent::Stderr(text) => eprintln!("{text}"),
            SessionEvent::Diagnostic(record) => println!("{}", suggest_fix(&record)),
            SessionEvent::StateChanged(DebugState::Paused) => {
                if !debug_prompt(&mut session)? {
                    return Ok(0);
                }
            }
            SessionEvent::Finished { exit_code } => return Ok(exit_code.unwrap_or(1)),
            other => log::debug!("{:?}", other),
        }
    }
    Ok(0)
}

/// Reads commands until one resumes the program. `false` once the session is stopped.
fn debug_prompt(session: &mut DebugSession) -> anyhow::Result<bool> {
    loop {
        print!("(gumus) ");
        std::io::stdout().flush()?;
        let mut input = String::new();
        if std::io::stdin().read_line(&mut input)? == 0 {
            session.stop();
            return Ok(false);
        }

        let mut words = input.split_whitespace();
        match words.next().unwrap_or("a") {
            "a" | "adım" | "adim" => session.step_over(),
            "g" | "gir" => session.step_into(),
            "ç" | "c" | "çık" | "cik" => session.step_out(),
            "d" | "devam" => session.continue_execution(),
            "v" | "veriler" => {
                print_variables(&session.snapshot().variables);
                continue;
            }
            "b" => {
                match words.next().and_then(|line| line.parse().ok()) {
                    Some(line) => {
                        session.toggle_breakpoint(line);
                        println!("Durma noktaları: {:?}", session.breakpoints());
                    }
                    None => println!("Kullanım: b <satır>"),
                }
                continue;
            }
            "q" | "dur" => {
                session.stop();
                return Ok(false);
            }
            other => {
                println!("Bilinmeyen komut: {other}");
                continue;
            }
        }
        return Ok(true);
    }
}

fn repl_command() -> anyhow::Result<i32> {
    on_interpreter_thread(|| {
        println!("Gümüş REPL'e hoş geldiniz!");
        println!("Çıkmak için EOF (*nix'te Ctrl+D, Windows'ta Ctrl+Z).");

        let mut interpreter = Interpreter::default();
        let mut input = String::new();
        loop {
            input.clear();
            print!("> ");
            std::io::stdout().flush()?;
            if std::io::stdin().read_line(&mut input)? == 0 {
                break;
            }

            let tokens = match tokenize(input.trim()) {
                Ok(tokens) => tokens,
                Err(e) => {
                    println!("Syntax Error: {} at line {}", e, e.line());
                    continue;
                }
            };
            let program = match parse(&tokens).into_result() {
                Ok(program) => program,
                Err(errors) => {
                    for error in errors.iter() {
                        println!("Parse Error: {}", error.summary());
                    }
                    continue;
                }
            };
            if let Err(e) = interpreter.interpret(&program) {
                println!("{}", e.report());
            }
        }
        Ok(0)
    })
}
