//! The attach/run state machine.
//!
//! This module is pure: it performs no I/O. The session feeds it
//! [`MachineEvent`]s and consults [`DebuggerMachine::state`] to decide which
//! requests are valid.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    AwaitingAttach,
    Connecting,
    /// Connected and paused at the entry prompt.
    Connected,
    Running,
    Stopped,
    Disconnecting,
    Terminated,
}

impl SessionState {
    /// Whether a live remote connection is paused and ready for commands.
    pub fn is_paused(self) -> bool {
        matches!(self, SessionState::Connected | SessionState::Stopped)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineEvent {
    /// The IDE sent `initialize`.
    Initialize,
    /// The IDE sent `attach`.
    Attach,
    /// The socket is connected and the banner arrived.
    Ready,
    /// Connecting or waiting for the banner failed.
    ConnectFailed,
    /// A `continue`, `step` or `restart` command was written.
    Resume,
    /// The in-flight resume command completed.
    Paused,
    /// The socket closed or failed outside of a disconnect.
    ConnectionLost,
    /// The IDE sent `disconnect`.
    Disconnect,
    /// Teardown finished.
    Closed,
}

/// Returns the state reached by applying `event` in `state`, or `None` if the
/// event is not valid there.
pub fn transition(state: SessionState, event: MachineEvent) -> Option<SessionState> {
    use MachineEvent as E;
    use SessionState as S;

    let next = match (state, event) {
        (S::Uninitialized, E::Initialize) => S::AwaitingAttach,
        (S::AwaitingAttach, E::Attach) => S::Connecting,
        (S::Connecting, E::Ready) => S::Connected,
        (S::Connecting, E::ConnectFailed) => S::Terminated,
        (S::Connected | S::Stopped, E::Resume) => S::Running,
        (S::Running, E::Paused) => S::Stopped,
        (S::Connected | S::Running | S::Stopped, E::ConnectionLost) => S::Terminated,
        (S::Terminated, E::Disconnect) => return None,
        (_, E::Disconnect) => S::Disconnecting,
        (S::Disconnecting, E::Closed) => S::Terminated,
        _ => return None,
    };
    Some(next)
}

#[derive(Debug, thiserror::Error)]
#[error("{event:?} is not valid while {state:?}")]
pub struct InvalidTransition {
    pub state: SessionState,
    pub event: MachineEvent,
}

/// What a breakpoint is attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakpointTarget {
    Line { file: String, line: u32 },
    Function { name: String },
}

impl fmt::Display for BreakpointTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakpointTarget::Line { file, line } => write!(f, "{file}:{line}"),
            BreakpointTarget::Function { name } => f.write_str(name),
        }
    }
}

/// A breakpoint as the IDE submitted it, plus what the remote made of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointRecord {
    /// Adapter-assigned id reported to the IDE.
    pub id: i64,
    pub target: BreakpointTarget,
    pub verified: bool,
    /// Line the remote confirmed, if any.
    pub line: Option<u32>,
}

#[derive(Debug, Default)]
pub struct DebuggerMachineContext {
    breakpoints: Vec<BreakpointRecord>,
    initialized: bool,
    last_breakpoint_id: i64,
}

impl DebuggerMachineContext {
    /// Breakpoints in IDE submission order.
    pub fn breakpoints(&self) -> &[BreakpointRecord] {
        &self.breakpoints
    }

    /// Whether the remote has printed its banner.
    pub fn initialized(&self) -> bool {
        self.initialized
    }

    /// Replace every line breakpoint in `file` with fresh, unverified ones.
    pub fn replace_source_breakpoints(&mut self, file: &str, lines: &[u32]) -> Vec<BreakpointRecord> {
        self.breakpoints.retain(|bp| {
            !matches!(&bp.target, BreakpointTarget::Line { file: existing, .. } if existing == file)
        });
        let targets = lines.iter().map(|&line| BreakpointTarget::Line {
            file: file.to_string(),
            line,
        });
        self.append(targets)
    }

    /// Replace every function breakpoint with fresh, unverified ones.
    pub fn replace_function_breakpoints(&mut self, names: &[String]) -> Vec<BreakpointRecord> {
        self.breakpoints
            .retain(|bp| !matches!(bp.target, BreakpointTarget::Function { .. }));
        let targets = names
            .iter()
            .map(|name| BreakpointTarget::Function { name: name.clone() });
        self.append(targets)
    }

    /// Mark a breakpoint as confirmed by the remote.
    pub fn confirm(&mut self, id: i64, line: Option<u32>) -> Option<&BreakpointRecord> {
        let record = self.breakpoints.iter_mut().find(|bp| bp.id == id)?;
        record.verified = true;
        record.line = line.or(record.line);
        Some(record)
    }

    fn append(&mut self, targets: impl Iterator<Item = BreakpointTarget>) -> Vec<BreakpointRecord> {
        let start = self.breakpoints.len();
        for target in targets {
            self.last_breakpoint_id += 1;
            let line = match &target {
                BreakpointTarget::Line { line, .. } => Some(*line),
                BreakpointTarget::Function { .. } => None,
            };
            self.breakpoints.push(BreakpointRecord {
                id: self.last_breakpoint_id,
                target,
                verified: false,
                line,
            });
        }
        self.breakpoints[start..].to_vec()
    }
}

/// The session's single source of truth for its lifecycle.
#[derive(Debug)]
pub struct DebuggerMachine {
    state: SessionState,
    context: DebuggerMachineContext,
}

impl DebuggerMachine {
    pub fn new() -> Self {
        Self {
            state: SessionState::Uninitialized,
            context: DebuggerMachineContext::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn context(&self) -> &DebuggerMachineContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut DebuggerMachineContext {
        &mut self.context
    }

    /// Apply `event`, returning the new state.
    pub fn fire(&mut self, event: MachineEvent) -> Result<SessionState, InvalidTransition> {
        let next = transition(self.state, event).ok_or(InvalidTransition {
            state: self.state,
            event,
        })?;
        tracing::debug!(from = ?self.state, to = ?next, ?event, "state transition");
        if event == MachineEvent::Ready {
            self.context.initialized = true;
        }
        self.state = next;
        Ok(next)
    }
}

impl Default for DebuggerMachine {
    fn default() -> Self {
        Self::new()
    }
}
