use tokio::sync::{mpsc, oneshot};

use crate::commands::RemoteCommand;
use crate::connection::{ConnectionId, not_connected};
use crate::error::{CommandError, TransportError};
use crate::framer::ResponseFrame;

/// Messages handled by the connection's background task.
#[derive(Debug)]
pub(crate) enum ActorMessage {
    /// Write a command line and resolve `response_tx` with the next frame.
    Send {
        command: String,
        response_tx: oneshot::Sender<Result<ResponseFrame, TransportError>>,
    },

    /// Shut down the write half; `done` fires once the socket has closed.
    Close { done: oneshot::Sender<()> },
}

/// Writes commands and awaits their responses.
///
/// At most one command may be waiting for its frame at a time. A second
/// [`Commander::send`] issued before the first resolves fails with
/// [`TransportError::Busy`]; nothing is queued.
#[derive(Debug, Clone)]
pub struct Commander {
    id: ConnectionId,
    sender: mpsc::Sender<ActorMessage>,
}

impl Commander {
    pub(crate) fn new(id: ConnectionId, sender: mpsc::Sender<ActorMessage>) -> Self {
        Self { id, sender }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Send one command line and wait for the next non-initial frame.
    #[tracing::instrument(skip(self), fields(connection = %self.id))]
    pub async fn send(&self, command: &str) -> Result<ResponseFrame, TransportError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.sender
            .send(ActorMessage::Send {
                command: command.to_string(),
                response_tx,
            })
            .await
            .map_err(|_| not_connected())?;

        response_rx
            .await
            .map_err(|_| TransportError::ConnectionLost)?
    }

    /// Send a typed command and decode its response.
    pub async fn execute<C: RemoteCommand>(&self, command: &C) -> Result<C::Output, CommandError> {
        let frame = self.send(&command.wire()).await?;
        Ok(command.decode(&frame)?)
    }

    /// Shut down the write half and wait for the socket to close.
    pub(crate) async fn close(&self) {
        let (done, closed) = oneshot::channel();
        if self.sender.send(ActorMessage::Close { done }).await.is_err() {
            return;
        }
        let _ = closed.await;
    }
}
