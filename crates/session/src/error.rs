//! Errors a session reports back to the IDE.

use dap_codec::responses::ErrorMessage;
use transport::{CommandError, TransportError};

use crate::machine::InvalidTransition;

/// Failure of one IDE request.
///
/// None of these end the session on their own; each becomes an error
/// response for the request that caused it.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The request is not valid in the current state, or not supported at all.
    #[error("{0}")]
    Protocol(String),

    #[error("invalid arguments for `{command}`: {source}")]
    InvalidArguments {
        command: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl SessionError {
    pub fn protocol(message: impl Into<String>) -> Self {
        SessionError::Protocol(message.into())
    }

    /// Stable identifier carried in the error response body.
    pub fn id(&self) -> i64 {
        match self {
            SessionError::Protocol(_) => 1001,
            SessionError::InvalidArguments { .. } => 1002,
            SessionError::Command(CommandError::Decode(_)) => 1003,
            SessionError::Command(CommandError::Transport(_)) | SessionError::Transport(_) => 1004,
        }
    }

    pub fn to_error_message(&self) -> ErrorMessage {
        ErrorMessage::new(self.id(), self.to_string())
    }
}

impl From<InvalidTransition> for SessionError {
    fn from(e: InvalidTransition) -> Self {
        SessionError::Protocol(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use transport::DecodeError;

    #[test]
    fn decode_errors_are_reported_with_their_line() {
        let error = SessionError::from(CommandError::from(DecodeError {
            command: "backtrace",
            line: "#0 ???".to_string(),
            reason: "expected a location".to_string(),
        }));
        let message = error.to_error_message();
        assert_eq!(message.id, 1003);
        assert!(message.format.contains("#0 ???"));
    }

    #[test]
    fn protocol_errors_keep_their_text() {
        let message = SessionError::protocol("launch is not supported").to_error_message();
        assert_eq!(message.id, 1001);
        assert_eq!(message.format, "launch is not supported");
    }
}
