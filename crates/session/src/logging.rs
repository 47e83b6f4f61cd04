//! Trace level requested by the IDE.
//!
//! The session does not own the process's logging setup. It reports the
//! level the `attach` request asked for to a [`TraceSink`], and the binary
//! decides what that means for its subscriber.

use serde::Deserialize;

/// Verbosity named by the `trace` attach argument.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trace {
    Verbose,
    Log,
    #[default]
    Error,
}

impl Trace {
    /// An `EnvFilter` directive for this level.
    pub fn filter_directive(self) -> &'static str {
        match self {
            Trace::Verbose => "trace",
            Trace::Log => "info",
            Trace::Error => "error",
        }
    }

    /// Whether a log file should be written at this level.
    pub fn writes_log_file(self) -> bool {
        !matches!(self, Trace::Error)
    }
}

/// Receives the trace level once a session has resolved its configuration.
pub trait TraceSink: Send + Sync {
    fn set_trace(&self, trace: Trace);
}

/// A sink that ignores trace changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTrace;

impl TraceSink for NoTrace {
    fn set_trace(&self, _trace: Trace) {}
}
