use std::{
    path::{Path, PathBuf},
    process::{Command, Stdio},
    time::{Duration, Instant},
};

use crate::interpreter::RunOutput;

const VIABILITY_TIMEOUT: Duration = Duration::from_secs(2);
const VIABILITY_POLL: Duration = Duration::from_millis(20);

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("Could not locate the gumus executable: {0}")]
    CurrentExe(#[source] std::io::Error),
    #[error("Could not start {backend}: {source}")]
    Spawn {
        backend: String,
        source: std::io::Error,
    },
    #[error("Source file not found: {0}")]
    NotFound(PathBuf),
}

/// Instrumentation a backend is asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendFlag {
    Debug,
    Trace,
    DumpMemory,
    Profile,
}

impl BackendFlag {
    fn as_arg(self) -> &'static str {
        match self {
            BackendFlag::Debug => "--debug",
            BackendFlag::Trace => "--trace",
            BackendFlag::DumpMemory => "--dump-memory",
            BackendFlag::Profile => "--profile",
        }
    }
}

/// A program able to execute Gümüş files and speak the line protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCommand {
    /// An external interpreter, invoked as `<path> [flags] <file>`.
    Native(PathBuf),
    /// A gumus binary, invoked as `<path> run [flags] <file>`.
    Fallback(PathBuf),
}

impl BackendCommand {
    /// This very executable.
    pub fn fallback() -> Result<Self, RunnerError> {
        std::env::current_exe()
            .map(BackendCommand::Fallback)
            .map_err(RunnerError::CurrentExe)
    }

    /// Uses `native` when it passes the viability check, this executable otherwise.
    pub fn detect(native: Option<&Path>) -> Result<Self, RunnerError> {
        if let Some(native) = native {
            if is_viable(native) {
                log::info!("Using native backend {}", native.display());
                return Ok(BackendCommand::Native(native.to_path_buf()));
            }
            log::info!(
                "Native backend {} is not viable, falling back to the interpreter",
                native.display()
            );
        }
        Self::fallback()
    }

    pub fn program(&self) -> &Path {
        match self {
            BackendCommand::Native(path) | BackendCommand::Fallback(path) => path,
        }
    }

    pub fn command(&self, file: &Path, flags: &[BackendFlag]) -> Command {
        let mut command = Command::new(self.program());
        if let BackendCommand::Fallback(_) = self {
            command.arg("run");
        }
        command.args(flags.iter().map(|flag| flag.as_arg()));
        command.arg(file);
        command
    }
}

/// Whether `program --help` exits successfully within the viability timeout.
pub fn is_viable(program: &Path) -> bool {
    let child = Command::new(program)
        .arg("--help")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();
    let mut child = match child {
        Ok(child) => child,
        Err(e) => {
            log::debug!("Viability check of {} failed to start: {}", program.display(), e);
            return false;
        }
    };

    let started = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return status.success(),
            Ok(None) if started.elapsed() < VIABILITY_TIMEOUT => std::thread::sleep(VIABILITY_POLL),
            Ok(None) => {
                log::debug!("Viability check of {} timed out", program.display());
                if let Err(e) = child.kill() {
                    log::warn!("Failed to kill viability check of {}: {}", program.display(), e);
                }
                let _ = child.wait();
                return false;
            }
            Err(e) => {
                log::debug!("Viability check of {} failed: {}", program.display(), e);
                return false;
            }
        }
    }
}

/// Runs files to completion on a backend, collecting their output.
#[derive(Debug, Clone)]
pub struct Runner {
    backend: BackendCommand,
    flags: Vec<BackendFlag>,
}

impl Runner {
    pub fn new(backend: BackendCommand) -> Self {
        Self {
            backend,
            flags: Vec::new(),
        }
    }

    pub fn with_flag(mut self, flag: BackendFlag) -> Self {
        self.flags.push(flag);
        self
    }

    pub fn backend(&self) -> &BackendCommand {
        &self.backend
    }

    pub fn run_file(&self, file: &Path) -> Result<RunOutput, RunnerError> {
        if !file.is_file() {
            return Err(RunnerError::NotFound(file.to_path_buf()));
        }

        log::debug!("Running {} on {:?}", file.display(), self.backend);
        let output = self
            .backend
            .command(file, &self.flags)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| RunnerError::Spawn {
                backend: self.backend.program().display().to_string(),
                source,
            })?;

        Ok(RunOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}
