//! Host side of the line debugger.
//!
//! A session spawns a backend with the debug flag and drives it over its stdio. One
//! pump thread per child stream turns lines into [`Message`]s; a single driver thread
//! owns the session state and the child's stdin and is fed by those pumps and by the
//! command methods of [`DebugSession`], which only enqueue messages.

use std::{
    collections::BTreeSet,
    io::{self, BufRead, BufReader, Write},
    path::Path,
    process::Stdio,
    sync::{
        mpsc::{self, Receiver, RecvTimeoutError, Sender},
        Arc, Mutex, PoisonError,
    },
    thread::JoinHandle,
    time::Duration,
};

use crate::{
    diagnostics::{translate, ErrorHistory, ErrorRecord},
    protocol::{Command, Frame, VariableSnapshot, MEMORY_END},
    runner::{BackendCommand, BackendFlag, RunnerError},
};

const STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebugState {
    #[default]
    Idle,
    Running,
    Paused,
    Stepping,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepMode {
    Over,
    Into,
    Out,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub function: String,
    /// Only known for the innermost frame.
    pub line: Option<usize>,
}

/// Everything a consumer may want to show about a session, replaced whole on every change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub state: DebugState,
    pub line: Option<usize>,
    pub step_mode: Option<StepMode>,
    pub variables: VariableSnapshot,
    pub call_stack: Vec<StackFrame>,
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged(DebugState),
    Trace { line: usize },
    Variables(VariableSnapshot),
    Memory(serde_json::Value),
    Profile { cpu: f64, mem: f64, line: usize },
    Canvas { opcode: String, args: Vec<String> },
    Output(String),
    Stderr(String),
    Diagnostic(ErrorRecord),
    Finished { exit_code: Option<i32> },
}

#[derive(Debug, thiserror::Error)]
pub enum DebugError {
    #[error(transparent)]
    Runner(#[from] RunnerError),
    #[error("Could not start the backend: {0}")]
    Spawn(#[from] io::Error),
    #[error("The backend's {0} is not piped")]
    MissingPipe(&'static str),
}

/// The part of a child process the driver needs.
pub trait ChildProcess: Send {
    fn kill(&mut self) -> io::Result<()>;

    /// Waits for exit. `None` when the process was ended by a signal.
    fn wait(&mut self) -> io::Result<Option<i32>>;
}

impl ChildProcess for std::process::Child {
    fn kill(&mut self) -> io::Result<()> {
        std::process::Child::kill(self)
    }

    fn wait(&mut self) -> io::Result<Option<i32>> {
        std::process::Child::wait(self).map(|status| status.code())
    }
}

enum Control {
    Continue,
    Step(StepMode),
    Pause,
    Breakpoints(BTreeSet<usize>),
    Stop(Sender<()>),
}

enum Message {
    Stdout(String),
    Stderr(String),
    StdoutClosed,
    Control(Control),
}

#[derive(Debug, PartialEq, Eq)]
enum Next {
    Continue,
    Exit,
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Driver {
    snapshot: Snapshot,
    shared: Arc<Mutex<Snapshot>>,
    breakpoints: BTreeSet<usize>,
    stdin: Box<dyn Write + Send>,
    child: Box<dyn ChildProcess>,
    events: Sender<SessionEvent>,
    history: Arc<Mutex<ErrorHistory>>,
    /// Lines of a memory dump being collected.
    memory: Option<String>,
}

impl Driver {
    fn emit(&self, event: SessionEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }

    fn publish(&self) {
        *lock(&self.shared) = self.snapshot.clone();
    }

    fn set_state(&mut self, state: DebugState) {
        if self.snapshot.state != state {
            log::debug!("Debug session {:?} -> {:?}", self.snapshot.state, state);
            self.snapshot.state = state;
            self.publish();
            self.emit(SessionEvent::StateChanged(state));
        }
    }

    fn send(&mut self, command: Command) {
        log::trace!("-> {}", command);
        if let Err(e) = writeln!(self.stdin, "{}", command).and_then(|_| self.stdin.flush()) {
            log::warn!("Failed to send {} to the backend: {}", command, e);
        }
    }

    fn handle(&mut self, message: Message) -> Next {
        let next = match message {
            Message::Stdout(line) => {
                self.on_stdout(line);
                Next::Continue
            }
            Message::Stderr(line) => {
                self.diagnose(&line);
                self.emit(SessionEvent::Stderr(translate(&line)));
                Next::Continue
            }
            Message::StdoutClosed => {
                let exit_code = self.child.wait().unwrap_or_else(|e| {
                    log::warn!("Failed to wait for the backend: {}", e);
                    None
                });
                log::info!("Backend finished with {:?}", exit_code);
                self.snapshot.exit_code = exit_code;
                self.snapshot.step_mode = None;
                self.set_state(DebugState::Finished);
                self.emit(SessionEvent::Finished { exit_code });
                Next::Exit
            }
            Message::Control(control) => self.on_control(control),
        };
        self.publish();
        next
    }

    fn on_control(&mut self, control: Control) -> Next {
        match control {
            Control::Continue if self.snapshot.state == DebugState::Paused => {
                self.snapshot.step_mode = None;
                self.set_state(DebugState::Running);
                self.send(Command::Continue);
            }
            Control::Step(mode) if self.snapshot.state == DebugState::Paused => {
                self.snapshot.step_mode = Some(mode);
                self.set_state(DebugState::Stepping);
                self.send(Command::StepOver);
            }
            Control::Pause if self.snapshot.state == DebugState::Running => {
                self.set_state(DebugState::Paused);
            }
            Control::Breakpoints(breakpoints) => self.breakpoints = breakpoints,
            Control::Stop(ack) => {
                self.send(Command::Stop);
                if let Err(e) = self.child.kill() {
                    log::debug!("Backend already gone: {}", e);
                }
                let _ = self.child.wait();
                self.snapshot.line = None;
                self.snapshot.step_mode = None;
                self.snapshot.variables = VariableSnapshot::default();
                self.snapshot.call_stack.clear();
                self.set_state(DebugState::Idle);
                let _ = ack.send(());
                return Next::Exit;
            }
            _ => log::debug!("Ignoring command in state {:?}", self.snapshot.state),
        }
        Next::Continue
    }

    fn on_stdout(&mut self, line: String) {
        if let Some(dump) = self.memory.as_mut() {
            if line.trim_end() != MEMORY_END {
                dump.push_str(&line);
                dump.push('\n');
                return;
            }
        }

        let frame = match Frame::decode(&line) {
            Ok(Some(frame)) => frame,
            Ok(None) => return,
            Err(e) => {
                log::warn!("Skipping malformed backend line: {}", e);
                return;
            }
        };

        match frame {
            Frame::Trace { line } => self.on_trace(line),
            Frame::Vars(variables) | Frame::DebugData(variables) => {
                self.snapshot.call_stack = call_stack(&variables, self.snapshot.line);
                self.snapshot.variables = variables.clone();
                self.publish();
                self.emit(SessionEvent::Variables(variables));
            }
            Frame::MemoryStart => self.memory = Some(String::new()),
            Frame::MemoryEnd => {
                let dump = self.memory.take().unwrap_or_default();
                match serde_json::from_str(&dump) {
                    Ok(memory) => self.emit(SessionEvent::Memory(memory)),
                    Err(e) => log::warn!("Skipping malformed memory dump: {}", e),
                }
            }
            Frame::Profile { cpu, mem, line } => self.emit(SessionEvent::Profile { cpu, mem, line }),
            Frame::Canvas { opcode, args } => self.emit(SessionEvent::Canvas { opcode, args }),
            Frame::Output(text) => {
                self.diagnose(&text);
                self.emit(SessionEvent::Output(translate(&text)));
            }
        }
    }

    fn on_trace(&mut self, line: usize) {
        self.snapshot.line = Some(line);
        self.emit(SessionEvent::Trace { line });

        match self.snapshot.state {
            DebugState::Running if !self.breakpoints.is_empty() && !self.breakpoints.contains(&line) => {
                self.send(Command::Continue);
            }
            DebugState::Running | DebugState::Stepping => {
                self.snapshot.step_mode = None;
                self.set_state(DebugState::Paused);
                self.send(Command::Vars);
            }
            DebugState::Paused => self.send(Command::Vars),
            DebugState::Idle | DebugState::Finished => {}
        }
    }

    fn diagnose(&self, text: &str) {
        if let Some(record) = lock(&self.history).record(text) {
            self.emit(SessionEvent::Diagnostic(record));
        }
    }

    fn run(mut self, messages: Receiver<Message>) {
        while let Ok(message) = messages.recv() {
            if self.handle(message) == Next::Exit {
                break;
            }
        }
    }
}

/// Frames of the paused program, innermost first. Every call opens one scope.
fn call_stack(variables: &VariableSnapshot, line: Option<usize>) -> Vec<StackFrame> {
    variables
        .scopes
        .iter()
        .enumerate()
        .map(|(i, scope)| StackFrame {
            function: scope.name.clone(),
            line: if i == 0 { line } else { None },
        })
        .collect()
}

/// Forwards every line of `reader` to the driver.
fn pump(
    mut reader: Box<dyn BufRead + Send>,
    messages: Sender<Message>,
    wrap: fn(String) -> Message,
    closed: Option<Message>,
) {
    let mut buffer = Vec::new();
    loop {
        buffer.clear();
        match reader.read_until(b'\n', &mut buffer) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buffer);
                let line = line.trim_end_matches(['\n', '\r']).to_string();
                if messages.send(wrap(line)).is_err() {
                    return;
                }
            }
            Err(e) => {
                log::warn!("Failed to read from the backend: {}", e);
                break;
            }
        }
    }
    if let Some(closed) = closed {
        let _ = messages.send(closed);
    }
}

pub struct DebugSession {
    control: Sender<Message>,
    shared: Arc<Mutex<Snapshot>>,
    events: Receiver<SessionEvent>,
    history: Arc<Mutex<ErrorHistory>>,
    breakpoints: BTreeSet<usize>,
    driver: Option<JoinHandle<()>>,
}

impl DebugSession {
    pub fn start(file: &Path, backend: &BackendCommand) -> Result<Self, DebugError> {
        Self::start_with_history(file, backend, Arc::default())
    }

    pub fn start_with_history(
        file: &Path,
        backend: &BackendCommand,
        history: Arc<Mutex<ErrorHistory>>,
    ) -> Result<Self, DebugError> {
        if !file.is_file() {
            return Err(RunnerError::NotFound(file.to_path_buf()).into());
        }

        log::info!("Debugging {} on {:?}", file.display(), backend);
        let mut child = backend
            .command(file, &[BackendFlag::Debug])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdin = child.stdin.take().ok_or(DebugError::MissingPipe("stdin"))?;
        let stdout = child.stdout.take().ok_or(DebugError::MissingPipe("stdout"))?;
        let stderr = child.stderr.take().ok_or(DebugError::MissingPipe("stderr"))?;

        Ok(Self::attach(
            Box::new(child),
            Box::new(stdin),
            Box::new(BufReader::new(stdout)),
            Some(Box::new(BufReader::new(stderr))),
            history,
        ))
    }

    /// Drives an already running backend.
    pub fn attach(
        child: Box<dyn ChildProcess>,
        stdin: Box<dyn Write + Send>,
        stdout: Box<dyn BufRead + Send>,
        stderr: Option<Box<dyn BufRead + Send>>,
        history: Arc<Mutex<ErrorHistory>>,
    ) -> Self {
        let (control, messages) = mpsc::channel();
        let (event_sender, events) = mpsc::channel();
        let shared = Arc::new(Mutex::new(Snapshot::default()));

        let mut driver = Driver {
            snapshot: Snapshot::default(),
            shared: shared.clone(),
            breakpoints: BTreeSet::new(),
            stdin,
            child,
            events: event_sender,
            history: history.clone(),
            memory: None,
        };
        driver.set_state(DebugState::Running);
        driver.publish();

        let sender = control.clone();
        std::thread::spawn(move || pump(stdout, sender, Message::Stdout, Some(Message::StdoutClosed)));
        if let Some(stderr) = stderr {
            let sender = control.clone();
            std::thread::spawn(move || pump(stderr, sender, Message::Stderr, None));
        }
        let driver = std::thread::spawn(move || driver.run(messages));

        Self {
            control,
            shared,
            events,
            history,
            breakpoints: BTreeSet::new(),
            driver: Some(driver),
        }
    }

    pub fn events(&self) -> &Receiver<SessionEvent> {
        &self.events
    }

    pub fn snapshot(&self) -> Snapshot {
        lock(&self.shared).clone()
    }

    pub fn state(&self) -> DebugState {
        lock(&self.shared).state
    }

    pub fn history(&self) -> Arc<Mutex<ErrorHistory>> {
        self.history.clone()
    }

    fn control(&self, control: Control) {
        if self.control.send(Message::Control(control)).is_err() {
            log::debug!("Debug session is no longer running");
        }
    }

    pub fn continue_execution(&self) {
        self.control(Control::Continue);
    }

    pub fn step_over(&self) {
        self.control(Control::Step(StepMode::Over));
    }

    pub fn step_into(&self) {
        self.control(Control::Step(StepMode::Into));
    }

    pub fn step_out(&self) {
        self.control(Control::Step(StepMode::Out));
    }

    pub fn pause(&self) {
        self.control(Control::Pause);
    }

    pub fn breakpoints(&self) -> &BTreeSet<usize> {
        &self.breakpoints
    }

    pub fn add_breakpoint(&mut self, line: usize) {
        self.breakpoints.insert(line);
        self.control(Control::Breakpoints(self.breakpoints.clone()));
    }

    pub fn remove_breakpoint(&mut self, line: usize) {
        self.breakpoints.remove(&line);
        self.control(Control::Breakpoints(self.breakpoints.clone()));
    }

    pub fn toggle_breakpoint(&mut self, line: usize) {
        if !self.breakpoints.remove(&line) {
            self.breakpoints.insert(line);
        }
        self.control(Control::Breakpoints(self.breakpoints.clone()));
    }

    pub fn clear_breakpoints(&mut self) {
        self.breakpoints.clear();
        self.control(Control::Breakpoints(BTreeSet::new()));
    }

    /// Kills the backend and returns the session to `Idle`. Returns once that is done.
    pub fn stop(&mut self) {
        let (ack, acked) = mpsc::channel();
        if self.control.send(Message::Control(Control::Stop(ack))).is_ok() {
            match acked.recv_timeout(STOP_TIMEOUT) {
                Ok(()) => {}
                // The driver ended before it saw the request.
                Err(RecvTimeoutError::Disconnected) => {}
                Err(RecvTimeoutError::Timeout) => {
                    log::warn!("Debug session did not acknowledge stop, detaching");
                    self.driver = None;
                }
            }
        }
        if let Some(driver) = self.driver.take() {
            if driver.join().is_err() {
                log::warn!("Debug session driver panicked");
            }
        }

        let mut snapshot = lock(&self.shared);
        *snapshot = Snapshot {
            exit_code: snapshot.exit_code,
            ..Snapshot::default()
        };
    }
}

impl Drop for DebugSession {
    fn drop(&mut self) {
        if self.driver.is_some() {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            lock(&self.0).write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuffer {
        fn lines(&self) -> Vec<String> {
            String::from_utf8_lossy(&lock(&self.0))
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    struct FakeChild {
        killed: Arc<Mutex<bool>>,
    }

    impl ChildProcess for FakeChild {
        fn kill(&mut self) -> io::Result<()> {
            *lock(&self.killed) = true;
            Ok(())
        }

        fn wait(&mut self) -> io::Result<Option<i32>> {
            Ok(Some(0))
        }
    }

    fn driver() -> (Driver, SharedBuffer, Receiver<SessionEvent>, Arc<Mutex<bool>>) {
        let stdin = SharedBuffer::default();
        let killed = Arc::new(Mutex::new(false));
        let (events, receiver) = mpsc::channel();
        let driver = Driver {
            snapshot: Snapshot {
                state: DebugState::Running,
                ..Default::default()
            },
            shared: Arc::default(),
            breakpoints: BTreeSet::new(),
            stdin: Box::new(stdin.clone()),
            child: Box::new(FakeChild {
                killed: killed.clone(),
            }),
            events,
            history: Arc::default(),
            memory: None,
        };
        (driver, stdin, receiver, killed)
    }

    fn stdout(driver: &mut Driver, line: &str) -> Next {
        driver.handle(Message::Stdout(line.to_string()))
    }

    #[test]
    fn trace_pauses_and_requests_variables() {
        let (mut driver, stdin, events, _) = driver();
        stdout(&mut driver, "__TRACE__:3");
        assert_eq!(driver.snapshot.state, DebugState::Paused);
        assert_eq!(driver.snapshot.line, Some(3));
        assert_eq!(stdin.lines(), vec!["VARS"]);
        assert_eq!(events.try_recv().unwrap(), SessionEvent::Trace { line: 3 });
        assert_eq!(
            events.try_recv().unwrap(),
            SessionEvent::StateChanged(DebugState::Paused)
        );
        assert_eq!(lock(&driver.shared).state, DebugState::Paused);
    }

    #[test]
    fn native_debug_events_are_traces() {
        let (mut driver, stdin, _, _) = driver();
        stdout(&mut driver, "__DEBUG_EVENT__{\"type\": \"line\", \"line\": 5}");
        assert_eq!(driver.snapshot.line, Some(5));
        assert_eq!(stdin.lines(), vec!["VARS"]);
    }

    #[test]
    fn step_over_resumes_and_next_trace_pauses() {
        let (mut driver, stdin, _, _) = driver();
        stdout(&mut driver, "__TRACE__:1");
        driver.handle(Message::Control(Control::Step(StepMode::Into)));
        assert_eq!(driver.snapshot.state, DebugState::Stepping);
        assert_eq!(driver.snapshot.step_mode, Some(StepMode::Into));
        stdout(&mut driver, "__TRACE__:2");
        assert_eq!(driver.snapshot.state, DebugState::Paused);
        assert_eq!(driver.snapshot.step_mode, None);
        assert_eq!(stdin.lines(), vec!["VARS", "STEP_OVER", "VARS"]);
    }

    #[test]
    fn commands_outside_their_state_are_ignored() {
        let (mut driver, stdin, _, _) = driver();
        driver.handle(Message::Control(Control::Step(StepMode::Over)));
        driver.handle(Message::Control(Control::Continue));
        assert_eq!(driver.snapshot.state, DebugState::Running);
        assert!(stdin.lines().is_empty());
    }

    #[test]
    fn breakpoints_skip_other_lines_while_running() {
        let (mut driver, stdin, _, _) = driver();
        driver.handle(Message::Control(Control::Breakpoints([3].into())));
        stdout(&mut driver, "__TRACE__:1");
        stdout(&mut driver, "__TRACE__:2");
        assert_eq!(driver.snapshot.state, DebugState::Running);
        stdout(&mut driver, "__TRACE__:3");
        assert_eq!(driver.snapshot.state, DebugState::Paused);
        assert_eq!(stdin.lines(), vec!["CONTINUE", "CONTINUE", "VARS"]);
    }

    #[test]
    fn debug_data_updates_variables_and_stack() {
        let (mut driver, _, _, _) = driver();
        stdout(&mut driver, "__TRACE__:4");
        stdout(
            &mut driver,
            r#"__DEBUG_DATA__:{"name":"topla","variables":{"a":{"type":"tamsayı","value":2}},"parent":{"name":"global","variables":{},"parent":null}}"#,
        );
        let variables = &driver.snapshot.variables;
        assert_eq!(variables.get("a").map(|v| v.display_value()), Some("2".to_string()));
        assert_eq!(
            driver.snapshot.call_stack,
            vec![
                StackFrame {
                    function: "topla".to_string(),
                    line: Some(4)
                },
                StackFrame {
                    function: "global".to_string(),
                    line: None
                },
            ]
        );
    }

    #[test]
    fn malformed_payloads_are_skipped() {
        let (mut driver, _, events, _) = driver();
        stdout(&mut driver, "__DEBUG_DATA__:{broken");
        stdout(&mut driver, "__DEBUG_DATA__:null");
        assert!(events.try_recv().is_err());
        assert_eq!(driver.snapshot.variables, VariableSnapshot::default());
    }

    #[test]
    fn memory_dumps_are_collected_between_markers() {
        let (mut driver, _, events, _) = driver();
        stdout(&mut driver, "__MEMORY_JSON_START__");
        stdout(&mut driver, r#"{"line": 1, "stack": [], "env": {}}"#);
        stdout(&mut driver, "__MEMORY_JSON_END__");
        match events.try_recv().unwrap() {
            SessionEvent::Memory(dump) => assert_eq!(dump["line"], 1),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn output_is_translated_and_diagnosed() {
        let (mut driver, _, events, _) = driver();
        stdout(&mut driver, "Runtime Error: Sıfıra bölme (Satir: 2)");
        assert!(matches!(events.try_recv().unwrap(), SessionEvent::Diagnostic(record) if record.line == 2));
        assert!(matches!(events.try_recv().unwrap(), SessionEvent::Output(_)));
        assert_eq!(lock(&driver.history).records().len(), 1);
    }

    #[test]
    fn end_of_stream_finishes() {
        let (mut driver, _, events, _) = driver();
        assert_eq!(driver.handle(Message::StdoutClosed), Next::Exit);
        assert_eq!(driver.snapshot.state, DebugState::Finished);
        assert_eq!(driver.snapshot.exit_code, Some(0));
        assert_eq!(
            events.try_recv().unwrap(),
            SessionEvent::StateChanged(DebugState::Finished)
        );
        assert_eq!(events.try_recv().unwrap(), SessionEvent::Finished { exit_code: Some(0) });
    }

    #[test]
    fn stop_kills_and_clears() {
        let (mut driver, stdin, _, killed) = driver();
        stdout(&mut driver, "__TRACE__:2");
        let (ack, acked) = mpsc::channel();
        assert_eq!(driver.handle(Message::Control(Control::Stop(ack))), Next::Exit);
        assert!(acked.try_recv().is_ok());
        assert!(*lock(&killed));
        assert_eq!(driver.snapshot.state, DebugState::Idle);
        assert_eq!(driver.snapshot.line, None);
        assert_eq!(stdin.lines(), vec!["VARS", "STOP"]);
    }

    #[test]
    fn attached_session_runs_to_completion() {
        let killed = Arc::new(Mutex::new(false));
        let stdout: &'static [u8] = b"__TRACE__:1\nmerhaba\n";
        let mut session = DebugSession::attach(
            Box::new(FakeChild { killed }),
            Box::new(io::sink()),
            Box::new(stdout),
            None,
            Arc::default(),
        );
        let mut seen = Vec::new();
        while let Ok(event) = session.events().recv_timeout(Duration::from_secs(5)) {
            let finished = matches!(event, SessionEvent::Finished { .. });
            seen.push(event);
            if finished {
                break;
            }
        }
        assert!(seen.contains(&SessionEvent::Trace { line: 1 }));
        assert!(seen.contains(&SessionEvent::Output("merhaba".to_string())));
        assert_eq!(session.state(), DebugState::Finished);
        session.stop();
        assert_eq!(session.state(), DebugState::Idle);
    }
}
