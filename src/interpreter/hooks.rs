//! Statement hooks that put the interpreter on the wire: tracing, the line debugger,
//! memory dumps and profiling samples.

use std::{
    cell::RefCell,
    io::{self, BufRead, Write},
    rc::Rc,
    time::Instant,
};

use serde_json::json;

use crate::protocol::{Command, Frame, ScopeSnapshot, VariableInfo, VariableSnapshot};

use super::{CallFrame, Environment, ScopeId, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookAction {
    Continue,
    Stop,
}

/// Called before every executed statement, block wrappers excepted.
pub trait ExecutionHook {
    fn on_statement(
        &mut self,
        line: usize,
        environment: &Environment,
        frames: &[CallFrame],
    ) -> io::Result<HookAction>;
}

fn is_data(value: &Value) -> bool {
    !matches!(value, Value::Function(_) | Value::Builtin(_))
}

fn variable_info(name: &str, value: &Value) -> VariableInfo {
    VariableInfo {
        name: name.to_string(),
        value: value.to_json(),
        type_name: value.type_name().to_string(),
    }
}

/// The scope chain of the innermost frame, innermost scope first. Functions are left out.
pub fn snapshot(environment: &Environment, frames: &[CallFrame]) -> VariableSnapshot {
    let scope = frames
        .last()
        .map(|frame| frame.scope)
        .unwrap_or(ScopeId::GLOBAL);

    VariableSnapshot {
        scopes: environment
            .chain(scope)
            .map(|scope| ScopeSnapshot {
                name: scope.name().to_string(),
                variables: scope
                    .variables()
                    .into_iter()
                    .filter(|(_, value)| is_data(value))
                    .map(|(name, value)| variable_info(name, value))
                    .collect(),
            })
            .collect(),
    }
}

pub struct TraceHook {
    output: Rc<RefCell<dyn Write>>,
}

impl TraceHook {
    pub fn new(output: Rc<RefCell<dyn Write>>) -> Self {
        Self { output }
    }
}

impl ExecutionHook for TraceHook {
    fn on_statement(
        &mut self,
        line: usize,
        environment: &Environment,
        frames: &[CallFrame],
    ) -> io::Result<HookAction> {
        let mut output = self.output.borrow_mut();
        writeln!(output, "{}", Frame::Trace { line }.encode())?;

        let variables = snapshot(environment, frames);
        if !variables.is_empty() {
            writeln!(output, "{}", Frame::Vars(variables).encode())?;
        }
        Ok(HookAction::Continue)
    }
}

/// Pauses on every statement until the host answers with a resuming command.
pub struct DebugServer {
    output: Rc<RefCell<dyn Write>>,
    input: Rc<RefCell<dyn BufRead>>,
    attached: bool,
}

impl DebugServer {
    pub fn new(output: Rc<RefCell<dyn Write>>, input: Rc<RefCell<dyn BufRead>>) -> Self {
        Self {
            output,
            input,
            attached: true,
        }
    }

    fn read_command(&mut self) -> io::Result<Option<Command>> {
        let mut line = String::new();
        loop {
            line.clear();
            if self.input.borrow_mut().read_line(&mut line)? == 0 {
                return Ok(None);
            }
            match Command::parse(&line) {
                Some(command) => return Ok(Some(command)),
                None => log::warn!("Ignoring unknown debugger command {:?}", line.trim()),
            }
        }
    }
}

impl ExecutionHook for DebugServer {
    fn on_statement(
        &mut self,
        line: usize,
        environment: &Environment,
        frames: &[CallFrame],
    ) -> io::Result<HookAction> {
        {
            let mut output = self.output.borrow_mut();
            writeln!(output, "{}", Frame::Trace { line }.encode())?;
            output.flush()?;
        }

        while self.attached {
            match self.read_command()? {
                Some(Command::Vars) => {
                    let mut output = self.output.borrow_mut();
                    let data = Frame::DebugData(snapshot(environment, frames));
                    writeln!(output, "{}", data.encode())?;
                    output.flush()?;
                }
                Some(Command::StepOver) | Some(Command::Continue) => break,
                Some(Command::Stop) => {
                    log::debug!("Stop requested at line {}", line);
                    return Ok(HookAction::Stop);
                }
                None => {
                    log::debug!("Debugger input closed, detaching");
                    self.attached = false;
                }
            }
        }
        Ok(HookAction::Continue)
    }
}

pub struct MemoryHook {
    output: Rc<RefCell<dyn Write>>,
}

impl MemoryHook {
    pub fn new(output: Rc<RefCell<dyn Write>>) -> Self {
        Self { output }
    }
}

impl ExecutionHook for MemoryHook {
    fn on_statement(
        &mut self,
        line: usize,
        environment: &Environment,
        frames: &[CallFrame],
    ) -> io::Result<HookAction> {
        let stack: Vec<_> = frames
            .iter()
            .map(|frame| json!({ "function": frame.function, "line": frame.line }))
            .collect();
        let env = serde_json::to_value(snapshot(environment, frames))?;
        let dump = json!({ "line": line, "stack": stack, "env": env });

        let mut output = self.output.borrow_mut();
        writeln!(output, "{}", Frame::MemoryStart.encode())?;
        writeln!(output, "{}", dump)?;
        writeln!(output, "{}", Frame::MemoryEnd.encode())?;
        Ok(HookAction::Continue)
    }
}

const PROFILE_INTERVAL: usize = 10;
const CLOCK_TICKS_PER_SECOND: f64 = 100.0;
const PAGE_SIZE: f64 = 4096.0;

/// Samples process CPU and resident memory every few statements.
pub struct ProfileHook {
    output: Rc<RefCell<dyn Write>>,
    statements: usize,
    last_sample: Option<(u64, Instant)>,
}

impl ProfileHook {
    pub fn new(output: Rc<RefCell<dyn Write>>) -> Self {
        Self {
            output,
            statements: 0,
            last_sample: None,
        }
    }

    fn cpu_percent(&mut self) -> f64 {
        let Some(ticks) = cpu_ticks() else {
            return 0.0;
        };
        let now = Instant::now();
        let percent = match self.last_sample {
            Some((last_ticks, last_time)) => {
                let elapsed = now.duration_since(last_time).as_secs_f64();
                if elapsed > 0.0 {
                    (ticks.saturating_sub(last_ticks) as f64 / CLOCK_TICKS_PER_SECOND) / elapsed * 100.0
                } else {
                    0.0
                }
            }
            None => 0.0,
        };
        self.last_sample = Some((ticks, now));
        percent
    }
}

/// User plus system time of this process, in clock ticks.
fn cpu_ticks() -> Option<u64> {
    let stat = std::fs::read_to_string("/proc/self/stat").ok()?;
    let (_, fields) = stat.rsplit_once(')')?;
    let mut fields = fields.split_whitespace().skip(11);
    let user: u64 = fields.next()?.parse().ok()?;
    let system: u64 = fields.next()?.parse().ok()?;
    Some(user + system)
}

/// Resident memory of this process, in megabytes.
fn resident_megabytes() -> Option<f64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let pages: f64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(pages * PAGE_SIZE / (1024.0 * 1024.0))
}

fn round1(n: f64) -> f64 {
    (n * 10.0).round() / 10.0
}

impl ExecutionHook for ProfileHook {
    fn on_statement(
        &mut self,
        line: usize,
        _: &Environment,
        _: &[CallFrame],
    ) -> io::Result<HookAction> {
        self.statements += 1;
        if self.statements % PROFILE_INTERVAL == 0 {
            let sample = Frame::Profile {
                cpu: round1(self.cpu_percent()),
                mem: round1(resident_megabytes().unwrap_or(0.0)),
                line,
            };
            writeln!(self.output.borrow_mut(), "{}", sample.encode())?;
        }
        Ok(HookAction::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::interpreter::{run_with, RunOptions};

    fn run_instrumented(source: &str, options: RunOptions, input: &str) -> Vec<String> {
        let output = Rc::new(RefCell::new(Vec::new()));
        let input = Rc::new(RefCell::new(io::Cursor::new(input.as_bytes().to_vec())));
        let code = run_with(source, options, output.clone(), input);
        assert_eq!(code, 0);
        let output = String::from_utf8(output.borrow().clone()).unwrap();
        output.lines().map(str::to_string).collect()
    }

    #[test]
    fn trace_reports_lines_and_variables() {
        let options = RunOptions {
            trace: true,
            ..Default::default()
        };
        let lines = run_instrumented("değişken x = 5\nyazdır(x)", options, "");
        assert_eq!(
            lines,
            vec![
                "__TRACE__:1".to_string(),
                "__TRACE__:2".to_string(),
                "__VARS__:{\"x\":5}".to_string(),
                "5".to_string(),
            ]
        );
    }

    #[test]
    fn instrumented_output_is_framed_on_collision() {
        let options = RunOptions {
            trace: true,
            ..Default::default()
        };
        let lines = run_instrumented("yazdır(\"__TRACE__:9\")", options, "");
        assert_eq!(lines, vec!["__TRACE__:1", "__OUT__:__TRACE__:9"]);
        assert_eq!(
            Frame::decode(&lines[1]).unwrap(),
            Some(Frame::Output("__TRACE__:9".to_string()))
        );
    }

    #[test]
    fn debug_server_answers_vars_and_stops() {
        let options = RunOptions {
            debug: true,
            ..Default::default()
        };
        let lines = run_instrumented(
            "değişken x = 1\nx = 2\nyazdır(x)",
            options,
            "STEP_OVER\nVARS\nSTOP\n",
        );
        assert_eq!(lines[0], "__TRACE__:1");
        assert_eq!(lines[1], "__TRACE__:2");
        assert!(lines[2].starts_with("__DEBUG_DATA__:"), "{:?}", lines);
        match Frame::decode(&lines[2]).unwrap() {
            Some(Frame::DebugData(snapshot)) => {
                assert_eq!(snapshot.get("x").map(|v| v.display_value()), Some("1".to_string()));
            }
            other => panic!("unexpected frame {:?}", other),
        }
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn debug_server_detaches_on_closed_input() {
        let options = RunOptions {
            debug: true,
            ..Default::default()
        };
        let lines = run_instrumented("yazdır(1)\nyazdır(2)", options, "");
        assert_eq!(lines, vec!["__TRACE__:1", "1", "__TRACE__:2", "2"]);
    }

    #[test]
    fn memory_dump_is_bracketed_json() {
        let options = RunOptions {
            dump_memory: true,
            ..Default::default()
        };
        let lines = run_instrumented("değişken a = \"b\"", options, "");
        assert_eq!(lines[0], "__MEMORY_JSON_START__");
        let dump: serde_json::Value = serde_json::from_str(&lines[1]).unwrap();
        assert_eq!(dump["line"], 1);
        assert_eq!(dump["stack"][0]["function"], "<main>");
        assert_eq!(lines[2], "__MEMORY_JSON_END__");
    }

    #[test]
    fn profile_samples_every_ten_statements() {
        let options = RunOptions {
            profile: true,
            ..Default::default()
        };
        let source = "değişken i = 0\ndöngü i < 12 {\n    i = i + 1\n}";
        let lines = run_instrumented(source, options, "");
        let samples: Vec<_> = lines
            .iter()
            .filter(|line| line.starts_with("__PROFILE__:"))
            .collect();
        // 1 declaration + 1 loop + 12 assignments
        assert_eq!(samples.len(), 1);
        assert!(matches!(
            Frame::decode(samples[0]).unwrap(),
            Some(Frame::Profile { .. })
        ));
    }

    #[test]
    fn snapshot_leaves_out_functions() {
        let mut environment = Environment::new();
        environment.define(ScopeId::GLOBAL, "n", Value::Integer(3));
        let frames = [CallFrame {
            function: "<main>".to_string(),
            scope: ScopeId::GLOBAL,
            line: 1,
        }];
        let snapshot = snapshot(&environment, &frames);
        assert_eq!(snapshot.scopes.len(), 1);
        assert_eq!(snapshot.scopes[0].name, "global");
        assert_eq!(snapshot.scopes[0].variables[0].type_name, "tamsayı");
    }
}
