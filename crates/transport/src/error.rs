//! Error types for the transport layer.

use std::io;

use crate::connection::Address;

/// Errors raised by a [`crate::Connection`] or its [`crate::Commander`].
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The socket could not be connected (refused, DNS failure, timeout).
    #[error("could not connect to {address}")]
    Connection {
        address: Address,
        #[source]
        source: io::Error,
    },

    /// A command could not be written because the socket is not connected.
    #[error("could not write to the remote debugger")]
    Write(#[source] io::Error),

    /// The socket closed or failed while a command was waiting for its response.
    #[error("connection lost while waiting for a response")]
    ConnectionLost,

    /// A command was sent while another one was still waiting for its response.
    #[error("another command is still waiting for its response")]
    Busy,
}

/// A response frame did not have the shape its command expects.
#[derive(Debug, thiserror::Error)]
#[error("could not decode `{command}` response line {line:?}: {reason}")]
pub struct DecodeError {
    /// Wire name of the command whose response failed to decode.
    pub command: &'static str,
    /// The offending line.
    pub line: String,
    pub reason: String,
}

/// Failure of one typed command.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}
