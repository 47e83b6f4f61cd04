//! Events the adapter sends to the IDE.

use serde::{Deserialize, Serialize};

use crate::types::{Breakpoint, ThreadId};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "body", rename_all = "camelCase")]
#[non_exhaustive]
pub enum EventBody {
    Initialized,
    Output(OutputEventBody),
    Stopped(StoppedEventBody),
    Breakpoint(BreakpointEventBody),
    Terminated,
}

impl EventBody {
    /// The DAP event name.
    pub fn name(&self) -> &'static str {
        match self {
            EventBody::Initialized => "initialized",
            EventBody::Output(_) => "output",
            EventBody::Stopped(_) => "stopped",
            EventBody::Breakpoint(_) => "breakpoint",
            EventBody::Terminated => "terminated",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StoppedReason {
    Step,
    Breakpoint,
    Entry,
    Pause,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoppedEventBody {
    pub reason: StoppedReason,
    pub thread_id: ThreadId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_threads_stopped: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutputCategory {
    Console,
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputEventBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<OutputCategory>,
    pub output: String,
}

impl OutputEventBody {
    pub fn console(output: impl Into<String>) -> Self {
        Self {
            category: Some(OutputCategory::Console),
            output: output.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BreakpointEventReason {
    Changed,
    New,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointEventBody {
    pub reason: BreakpointEventReason,
    pub breakpoint: Breakpoint,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn output_event_shape() {
        let event = EventBody::Output(OutputEventBody::console("Connected.\n"));
        assert_eq!(event.name(), "output");
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"event": "output", "body": {"category": "console", "output": "Connected.\n"}})
        );
    }

    #[test]
    fn breakpoint_event_shape() {
        let event = EventBody::Breakpoint(BreakpointEventBody {
            reason: BreakpointEventReason::Changed,
            breakpoint: Breakpoint {
                id: Some(1),
                verified: true,
                message: None,
                source: None,
                line: Some(42),
            },
        });
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "event": "breakpoint",
                "body": {"reason": "changed", "breakpoint": {"id": 1, "verified": true, "line": 42}},
            })
        );
    }
}
