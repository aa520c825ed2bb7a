//! Line protocol spoken between an instrumented backend and a debugging host.
//!
//! Every frame is one UTF-8 line. Instrumentation lines start with a sentinel, anything else is
//! program output. Output lines that would be mistaken for a sentinel are framed with
//! [`OUTPUT`] by the backend.

use std::{borrow::Cow, collections::BTreeMap, fmt::Display};

use serde::{Deserialize, Serialize};

pub const TRACE: &str = "__TRACE__:";
pub const VARS: &str = "__VARS__:";
pub const DEBUG_EVENT: &str = "__DEBUG_EVENT__";
pub const DEBUG_DATA: &str = "__DEBUG_DATA__";
pub const MEMORY_START: &str = "__MEMORY_JSON_START__";
pub const MEMORY_END: &str = "__MEMORY_JSON_END__";
pub const PROFILE: &str = "__PROFILE__:";
pub const CANVAS: &str = "__CANVAS__:";
pub const OUTPUT: &str = "__OUT__:";

const SENTINELS: &[&str] = &[
    TRACE,
    VARS,
    DEBUG_EVENT,
    DEBUG_DATA,
    MEMORY_START,
    MEMORY_END,
    PROFILE,
    CANVAS,
    OUTPUT,
];

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Malformed {sentinel} payload: {source}")]
    Json {
        sentinel: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("Malformed {sentinel} payload: {payload:?}")]
    Payload {
        sentinel: &'static str,
        payload: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableInfo {
    pub name: String,
    pub value: serde_json::Value,
    pub type_name: String,
}

impl VariableInfo {
    /// The value as a Gümüş program would print it.
    pub fn display_value(&self) -> String {
        match &self.value {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Bool(true) => "doğru".to_string(),
            serde_json::Value::Bool(false) => "yanlış".to_string(),
            serde_json::Value::Null => "yok".to_string(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopeSnapshot {
    pub name: String,
    pub variables: Vec<VariableInfo>,
}

/// Scope chain of a paused program, innermost scope first.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct VariableSnapshot {
    pub scopes: Vec<ScopeSnapshot>,
}

impl VariableSnapshot {
    /// Looks a name up the chain, the way the program itself would resolve it.
    pub fn get(&self, name: &str) -> Option<&VariableInfo> {
        self.scopes
            .iter()
            .find_map(|scope| scope.variables.iter().find(|v| v.name == name))
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.iter().all(|scope| scope.variables.is_empty())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireVariable {
    #[serde(rename = "type", default)]
    type_name: String,
    #[serde(default)]
    value: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireScope {
    #[serde(default)]
    name: String,
    #[serde(default)]
    variables: BTreeMap<String, WireVariable>,
    #[serde(default)]
    parent: Option<Box<WireScope>>,
}

impl From<WireScope> for VariableSnapshot {
    fn from(wire: WireScope) -> Self {
        let mut scopes = Vec::new();
        let mut next = Some(wire);
        while let Some(scope) = next {
            scopes.push(ScopeSnapshot {
                name: scope.name,
                variables: scope
                    .variables
                    .into_iter()
                    .map(|(name, variable)| VariableInfo {
                        name,
                        value: variable.value,
                        type_name: variable.type_name,
                    })
                    .collect(),
            });
            next = scope.parent.map(|parent| *parent);
        }
        VariableSnapshot { scopes }
    }
}

fn to_wire(snapshot: &VariableSnapshot) -> Option<WireScope> {
    snapshot.scopes.iter().rev().fold(None, |parent, scope| {
        Some(WireScope {
            name: scope.name.clone(),
            variables: scope
                .variables
                .iter()
                .map(|v| {
                    (
                        v.name.clone(),
                        WireVariable {
                            type_name: v.type_name.clone(),
                            value: v.value.clone(),
                        },
                    )
                })
                .collect(),
            parent: parent.map(Box::new),
        })
    })
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Number(n) if n.is_i64() || n.is_u64() => "tamsayı",
        serde_json::Value::Number(_) => "ondalık",
        serde_json::Value::String(_) => "metin",
        serde_json::Value::Bool(_) => "mantıksal",
        serde_json::Value::Null => "yok",
        _ => "bilinmiyor",
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Trace { line: usize },
    Vars(VariableSnapshot),
    DebugData(VariableSnapshot),
    MemoryStart,
    MemoryEnd,
    Profile { cpu: f64, mem: f64, line: usize },
    Canvas { opcode: String, args: Vec<String> },
    Output(String),
}

#[derive(Debug, Deserialize)]
struct DebugEvent {
    line: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct ProfileSample {
    cpu: f64,
    mem: f64,
    line: usize,
}

fn json<'a, T: Deserialize<'a>>(sentinel: &'static str, payload: &'a str) -> Result<T, ProtocolError> {
    serde_json::from_str(payload).map_err(|source| ProtocolError::Json { sentinel, source })
}

impl Frame {
    /// Decodes one line. `Ok(None)` means the line carries nothing, like an empty variables dump.
    pub fn decode(line: &str) -> Result<Option<Frame>, ProtocolError> {
        let line = line.trim_end_matches(['\r', '\n']);

        if let Some(payload) = line.strip_prefix(OUTPUT) {
            return Ok(Some(Frame::Output(payload.to_string())));
        }
        if let Some(payload) = line.strip_prefix(TRACE) {
            let line = payload
                .trim()
                .parse()
                .map_err(|_| ProtocolError::Payload {
                    sentinel: TRACE,
                    payload: payload.to_string(),
                })?;
            return Ok(Some(Frame::Trace { line }));
        }
        if let Some(payload) = line.strip_prefix(DEBUG_EVENT) {
            let payload = payload.strip_prefix(':').unwrap_or(payload);
            let event: DebugEvent = json(DEBUG_EVENT, payload)?;
            return Ok(Some(Frame::Trace { line: event.line }));
        }
        if let Some(payload) = line.strip_prefix(DEBUG_DATA) {
            let payload = payload.strip_prefix(':').unwrap_or(payload).trim();
            if payload.is_empty() || payload == "null" {
                return Ok(None);
            }
            let scope: WireScope = json(DEBUG_DATA, payload)?;
            return Ok(Some(Frame::DebugData(scope.into())));
        }
        if let Some(payload) = line.strip_prefix(VARS) {
            let variables: BTreeMap<String, serde_json::Value> = json(VARS, payload)?;
            let variables = variables
                .into_iter()
                .map(|(name, value)| VariableInfo {
                    type_name: json_type_name(&value).to_string(),
                    name,
                    value,
                })
                .collect();
            return Ok(Some(Frame::Vars(VariableSnapshot {
                scopes: vec![ScopeSnapshot {
                    name: String::new(),
                    variables,
                }],
            })));
        }
        if line.trim() == MEMORY_START {
            return Ok(Some(Frame::MemoryStart));
        }
        if line.trim() == MEMORY_END {
            return Ok(Some(Frame::MemoryEnd));
        }
        if let Some(payload) = line.strip_prefix(PROFILE) {
            let sample: ProfileSample = json(PROFILE, payload)?;
            return Ok(Some(Frame::Profile {
                cpu: sample.cpu,
                mem: sample.mem,
                line: sample.line,
            }));
        }
        if let Some(payload) = line.strip_prefix(CANVAS) {
            let mut parts = payload.split_whitespace().map(str::to_string);
            let opcode = parts.next().ok_or_else(|| ProtocolError::Payload {
                sentinel: CANVAS,
                payload: payload.to_string(),
            })?;
            return Ok(Some(Frame::Canvas {
                opcode,
                args: parts.collect(),
            }));
        }

        Ok(Some(Frame::Output(line.to_string())))
    }

    pub fn encode(&self) -> String {
        match self {
            Frame::Trace { line } => format!("{TRACE}{line}"),
            Frame::Vars(snapshot) => {
                let mut flat = serde_json::Map::new();
                for scope in snapshot.scopes.iter().rev() {
                    for variable in &scope.variables {
                        flat.insert(variable.name.clone(), variable.value.clone());
                    }
                }
                format!("{VARS}{}", serde_json::Value::Object(flat))
            }
            Frame::DebugData(snapshot) => {
                let wire = to_wire(snapshot);
                // A map of plain strings and JSON values always serializes.
                let payload = serde_json::to_string(&wire).unwrap_or_else(|_| "null".to_string());
                format!("{DEBUG_DATA}:{payload}")
            }
            Frame::MemoryStart => MEMORY_START.to_string(),
            Frame::MemoryEnd => MEMORY_END.to_string(),
            Frame::Profile { cpu, mem, line } => {
                let sample = ProfileSample {
                    cpu: *cpu,
                    mem: *mem,
                    line: *line,
                };
                let payload = serde_json::to_string(&sample).unwrap_or_default();
                format!("{PROFILE}{payload}")
            }
            Frame::Canvas { opcode, args } if args.is_empty() => format!("{CANVAS}{opcode}"),
            Frame::Canvas { opcode, args } => format!("{CANVAS}{opcode} {}", args.join(" ")),
            Frame::Output(text) => escape_output_line(text).into_owned(),
        }
    }
}

/// Frames program output that would otherwise decode as a sentinel.
pub fn escape_output_line(line: &str) -> Cow<'_, str> {
    if SENTINELS.iter().any(|sentinel| line.trim_start().starts_with(sentinel)) {
        Cow::Owned(format!("{OUTPUT}{line}"))
    } else {
        Cow::Borrowed(line)
    }
}

/// Commands a host writes to the backend's stdin while it is paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Vars,
    StepOver,
    Continue,
    Stop,
}

impl Command {
    pub fn parse(line: &str) -> Option<Command> {
        match line.trim() {
            "VARS" => Some(Command::Vars),
            "STEP_OVER" => Some(Command::StepOver),
            "CONTINUE" => Some(Command::Continue),
            "STOP" => Some(Command::Stop),
            _ => None,
        }
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Vars => write!(f, "VARS"),
            Command::StepOver => write!(f, "STEP_OVER"),
            Command::Continue => write!(f, "CONTINUE"),
            Command::Stop => write!(f, "STOP"),
        }
    }
}
