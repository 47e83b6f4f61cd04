use tokio::sync::mpsc;

use crate::connection::{Address, ConnectionId};
use crate::framer::ResponseFrame;

/// Lifecycle notifications published by a [`crate::Connection`].
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// The connection object exists and is about to connect.
    Created { id: ConnectionId, address: Address },
    /// The socket is connected and writable.
    Connected { id: ConnectionId },
    /// A complete response frame arrived. The banner frame has
    /// [`ResponseFrame::is_initial`] set.
    Received(ResponseFrame),
    /// The socket failed. A `Closed` event always follows.
    Error { message: String },
    /// The socket is closed. No further events are published.
    Closed { had_error: bool },
}

/// Receiving end of a connection's lifecycle stream.
///
/// Each connection has exactly one consumer.
#[derive(Debug)]
pub struct EventSource {
    rx: mpsc::UnboundedReceiver<ConnectionEvent>,
}

impl EventSource {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<ConnectionEvent>) -> Self {
        Self { rx }
    }

    /// Receive the next event, or `None` once the connection task has gone away.
    pub async fn recv(&mut self) -> Option<ConnectionEvent> {
        self.rx.recv().await
    }
}
