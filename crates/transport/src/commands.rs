//! Typed commands understood by the remote debugger.
//!
//! Each command knows its wire text and how to decode the frame that answers
//! it.
//!
//! | Command | Wire text | Output |
//! |---|---|---|
//! | [`Continue`] | `continue` | response text |
//! | [`Step`] | `step` | response text |
//! | [`Restart`] | `restart` | response text |
//! | [`Backtrace`] | `backtrace` | [`Vec<Frame>`] |
//! | [`ListVariables`] | `var all` | [`Vec<VariableEntry>`] |
//! | [`SetBreakpoint`] | `break <file>:<line>` | [`Option<BreakpointConfirmation>`] |
//! | [`SetFunctionBreakpoint`] | `break <name>` | [`Option<BreakpointConfirmation>`] |

use std::sync::LazyLock;

use regex::Regex;

use crate::error::DecodeError;
use crate::framer::ResponseFrame;

/// A request with a wire representation and a response decoder.
pub trait RemoteCommand {
    type Output;

    /// Command text without the trailing newline.
    fn wire(&self) -> String;

    fn decode(&self, frame: &ResponseFrame) -> Result<Self::Output, DecodeError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Continue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Restart;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backtrace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListVariables;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetBreakpoint {
    pub file: String,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetFunctionBreakpoint {
    pub name: String,
}

/// One entry of a backtrace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub position: u32,
    pub call: String,
    pub file: String,
    pub line: u32,
}

/// One `key = value` pair from a variable listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableEntry {
    pub key: String,
    pub value: String,
}

/// The remote accepted a breakpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakpointConfirmation {
    pub id: Option<u32>,
    pub line: Option<u32>,
}

static BACKTRACE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^#(\d+)\s+(.+)\s+at\s+(.+):(\d+)$").expect("must compile")
});

static VARIABLE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\S+) = (.*)$").expect("must compile"));

static BREAKPOINT_CREATED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)created breakpoint(?:\s+with id)?\s+(\d+)(?:\s+at\s+(.+):(\d+))?")
        .expect("must compile")
});

/// Markers byebug prints in front of backtrace entries.
const FRAME_MARKERS: [&str; 2] = ["-->", "ͱ--"];

fn raw_text(frame: &ResponseFrame) -> String {
    frame.body().into_owned()
}

impl RemoteCommand for Continue {
    type Output = String;

    fn wire(&self) -> String {
        "continue".to_string()
    }

    fn decode(&self, frame: &ResponseFrame) -> Result<Self::Output, DecodeError> {
        Ok(raw_text(frame))
    }
}

impl RemoteCommand for Step {
    type Output = String;

    fn wire(&self) -> String {
        "step".to_string()
    }

    fn decode(&self, frame: &ResponseFrame) -> Result<Self::Output, DecodeError> {
        Ok(raw_text(frame))
    }
}

impl RemoteCommand for Restart {
    type Output = String;

    fn wire(&self) -> String {
        "restart".to_string()
    }

    fn decode(&self, frame: &ResponseFrame) -> Result<Self::Output, DecodeError> {
        Ok(raw_text(frame))
    }
}

impl RemoteCommand for Backtrace {
    type Output = Vec<Frame>;

    fn wire(&self) -> String {
        "backtrace".to_string()
    }

    /// Lines that look like a frame entry must match
    /// `#<n> <signature> at <file>:<line>`; every other line is noise.
    fn decode(&self, frame: &ResponseFrame) -> Result<Self::Output, DecodeError> {
        let body = frame.body();
        let mut frames = Vec::new();

        for raw_line in body.lines() {
            let line = strip_frame_marker(raw_line.trim());
            if !is_frame_entry(line) {
                continue;
            }

            let error = |reason: &str| DecodeError {
                command: "backtrace",
                line: raw_line.to_string(),
                reason: reason.to_string(),
            };

            let captures = BACKTRACE_LINE
                .captures(line)
                .ok_or_else(|| error("expected `#<n> <signature> at <file>:<line>`"))?;
            let position = captures[1]
                .parse()
                .map_err(|_| error("frame position out of range"))?;
            let line_number = captures[4]
                .parse()
                .map_err(|_| error("line number out of range"))?;

            frames.push(Frame {
                position,
                call: captures[2].trim().to_string(),
                file: captures[3].to_string(),
                line: line_number,
            });
        }

        Ok(frames)
    }
}

fn strip_frame_marker(line: &str) -> &str {
    FRAME_MARKERS
        .iter()
        .find_map(|marker| line.strip_prefix(marker))
        .map(str::trim_start)
        .unwrap_or(line)
}

fn is_frame_entry(line: &str) -> bool {
    let mut chars = line.chars();
    chars.next() == Some('#') && chars.next().is_some_and(|c| c.is_ascii_digit())
}

impl RemoteCommand for ListVariables {
    type Output = Vec<VariableEntry>;

    fn wire(&self) -> String {
        "var all".to_string()
    }

    fn decode(&self, frame: &ResponseFrame) -> Result<Self::Output, DecodeError> {
        let body = frame.body();
        let entries = body
            .lines()
            .filter_map(|line| VARIABLE_LINE.captures(line.trim()))
            .map(|captures| VariableEntry {
                key: captures[1].to_string(),
                value: captures[2].to_string(),
            })
            .collect();
        Ok(entries)
    }
}

impl RemoteCommand for SetBreakpoint {
    type Output = Option<BreakpointConfirmation>;

    fn wire(&self) -> String {
        format!("break {}:{}", self.file, self.line)
    }

    fn decode(&self, frame: &ResponseFrame) -> Result<Self::Output, DecodeError> {
        let confirmation = decode_confirmation(frame)?;
        Ok(confirmation.map(|c| BreakpointConfirmation {
            line: c.line.or(Some(self.line)),
            ..c
        }))
    }
}

impl RemoteCommand for SetFunctionBreakpoint {
    type Output = Option<BreakpointConfirmation>;

    fn wire(&self) -> String {
        format!("break {}", self.name)
    }

    fn decode(&self, frame: &ResponseFrame) -> Result<Self::Output, DecodeError> {
        decode_confirmation(frame)
    }
}

/// `None` when the remote rejected the breakpoint.
fn decode_confirmation(frame: &ResponseFrame) -> Result<Option<BreakpointConfirmation>, DecodeError> {
    let body = frame.body();
    for line in body.lines() {
        let Some(captures) = BREAKPOINT_CREATED.captures(line) else {
            continue;
        };

        let error = |reason: &str| DecodeError {
            command: "break",
            line: line.to_string(),
            reason: reason.to_string(),
        };

        let id = captures[1]
            .parse()
            .map_err(|_| error("breakpoint id out of range"))?;
        let line_number = captures
            .get(3)
            .map(|m| m.as_str().parse::<u32>())
            .transpose()
            .map_err(|_| error("line number out of range"))?;

        return Ok(Some(BreakpointConfirmation {
            id: Some(id),
            line: line_number,
        }));
    }

    tracing::debug!(response = %body.trim_end(), "breakpoint was not confirmed");
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(text: &str) -> ResponseFrame {
        ResponseFrame::new(text.to_string(), false)
    }

    #[test]
    fn wire_text() {
        assert_eq!(Continue.wire(), "continue");
        assert_eq!(Step.wire(), "step");
        assert_eq!(Restart.wire(), "restart");
        assert_eq!(Backtrace.wire(), "backtrace");
        assert_eq!(ListVariables.wire(), "var all");
        let breakpoint = SetBreakpoint {
            file: "foo.rb".to_string(),
            line: 42,
        };
        assert_eq!(breakpoint.wire(), "break foo.rb:42");
        let function = SetFunctionBreakpoint {
            name: "Foo#bar".to_string(),
        };
        assert_eq!(function.wire(), "break Foo#bar");
    }

    #[test]
    fn backtrace_single_frame() {
        let frames = Backtrace
            .decode(&frame("#0 Object#run at app.rb:10\nPROMPT"))
            .unwrap();
        assert_eq!(
            frames,
            vec![Frame {
                position: 0,
                call: "Object#run".to_string(),
                file: "app.rb".to_string(),
                line: 10,
            }]
        );
    }

    #[test]
    fn backtrace_with_markers_and_noise() {
        let text = "--> #0  Foo#bar(baz#String) at /srv/app/foo.rb:12\n    \
                    ͱ-- #1  block in <main> at /srv/app/main.rb:3\n\
                    Warning: some frames hidden\n\
                    PROMPT (byebug) ";
        let frames = Backtrace.decode(&frame(text)).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].call, "Foo#bar(baz#String)");
        assert_eq!(frames[0].file, "/srv/app/foo.rb");
        assert_eq!(frames[1].position, 1);
        assert_eq!(frames[1].call, "block in <main>");
        assert_eq!(frames[1].line, 3);
    }

    #[test]
    fn backtrace_windows_path_keeps_drive_letter() {
        let frames = Backtrace
            .decode(&frame("#0 main at C:/app/main.rb:7\nPROMPT"))
            .unwrap();
        assert_eq!(frames[0].file, "C:/app/main.rb");
        assert_eq!(frames[0].line, 7);
    }

    #[test]
    fn malformed_frame_entry_is_a_decode_error() {
        let err = Backtrace
            .decode(&frame("#0 something without location\nPROMPT"))
            .unwrap_err();
        assert_eq!(err.command, "backtrace");
        assert!(err.line.contains("something without location"));
    }

    #[test]
    fn variables_are_listed_in_order() {
        let text = "a = 1\n@name = \"bar\"\nnot a variable\nself = main\nPROMPT (byebug) ";
        let entries = ListVariables.decode(&frame(text)).unwrap();
        let keys: Vec<_> = entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, ["a", "@name", "self"]);
        assert_eq!(entries[1].value, "\"bar\"");
    }

    #[test]
    fn breakpoint_confirmation_with_location() {
        let command = SetBreakpoint {
            file: "foo.rb".to_string(),
            line: 42,
        };
        let confirmation = command
            .decode(&frame("Created breakpoint 1 at foo.rb:42\nPROMPT"))
            .unwrap()
            .unwrap();
        assert_eq!(confirmation.id, Some(1));
        assert_eq!(confirmation.line, Some(42));
    }

    #[test]
    fn breakpoint_confirmation_without_location_uses_requested_line() {
        let command = SetBreakpoint {
            file: "foo.rb".to_string(),
            line: 42,
        };
        let confirmation = command
            .decode(&frame("Successfully created breakpoint with id 3\nPROMPT"))
            .unwrap()
            .unwrap();
        assert_eq!(confirmation.id, Some(3));
        assert_eq!(confirmation.line, Some(42));
    }

    #[test]
    fn rejected_breakpoint_is_not_confirmed() {
        let command = SetBreakpoint {
            file: "foo.rb".to_string(),
            line: 9000,
        };
        let response = "*** Line 9000 is not a valid breakpoint in file foo.rb\nPROMPT";
        assert_eq!(command.decode(&frame(response)).unwrap(), None);
    }

    #[test]
    fn function_breakpoint_confirmation() {
        let command = SetFunctionBreakpoint {
            name: "Foo#bar".to_string(),
        };
        let confirmation = command
            .decode(&frame("Successfully created breakpoint with id 2\nPROMPT"))
            .unwrap()
            .unwrap();
        assert_eq!(confirmation.line, None);
    }
}
