//! Socket ownership and the per-connection background task.

use std::fmt;
use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::codec::{BytesCodec, FramedRead};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::commander::{ActorMessage, Commander};
use crate::error::TransportError;
use crate::events::{ConnectionEvent, EventSource};
use crate::framer::{Framer, ResponseFrame};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide monotonic connection identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where the remote debugger listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub host: String,
    pub port: u16,
}

impl Address {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Created,
    Connecting,
    Connected,
    Closed,
    Failed,
}

/// A byte stream that can be split into independent read and write halves.
///
/// This abstracts over TCP sockets and the in-memory transports used in tests.
pub trait Transport: Send + 'static {
    /// The read half type.
    type Read: AsyncRead + Unpin + Send + 'static;
    /// The write half type.
    type Write: AsyncWrite + Unpin + Send + 'static;

    /// Split the transport into separate read and write halves.
    fn into_split(self) -> (Self::Read, Self::Write);
}

impl Transport for TcpStream {
    type Read = OwnedReadHalf;
    type Write = OwnedWriteHalf;

    fn into_split(self) -> (Self::Read, Self::Write) {
        TcpStream::into_split(self)
    }
}

/// Something that can open connections to a remote debugger.
pub trait Connector: Send + Sync {
    fn connect(
        &self,
        address: Address,
        timeout: Duration,
    ) -> impl Future<Output = Result<(Connection, EventSource), TransportError>> + Send;
}

/// Opens real TCP connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    async fn connect(
        &self,
        address: Address,
        timeout: Duration,
    ) -> Result<(Connection, EventSource), TransportError> {
        Connection::connect(address, timeout).await
    }
}

/// One connection to a remote debugger.
///
/// Dropping the connection cancels its background task, which destroys the
/// socket and fails any pending command with [`TransportError::ConnectionLost`].
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    address: Address,
    state: watch::Receiver<ConnectionState>,
    commander: Commander,
    cancel: CancellationToken,
}

impl Connection {
    /// Connect over TCP.
    ///
    /// Fails with [`TransportError::Connection`] if the connection is refused,
    /// the host cannot be resolved, or `timeout` elapses first.
    pub async fn connect(
        address: Address,
        timeout: Duration,
    ) -> Result<(Self, EventSource), TransportError> {
        let setup = Setup::new(address);
        tracing::debug!(id = %setup.id, address = %setup.address, "connecting to remote debugger");

        let attempt = TcpStream::connect((setup.address.host.as_str(), setup.address.port));
        let connected = tokio::time::timeout(timeout, attempt).await;
        let stream = match connected {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(setup.fail(source)),
            Err(_) => {
                let source = io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("no connection after {timeout:?}"),
                );
                return Err(setup.fail(source));
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            tracing::warn!(error = %e, "could not disable nagle");
        }

        Ok(setup.spawn(stream))
    }

    /// Wrap an already connected transport.
    pub fn from_transport<T: Transport>(transport: T, address: Address) -> (Self, EventSource) {
        Setup::new(address).spawn(transport)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Handle for sending commands over this connection.
    pub fn commander(&self) -> &Commander {
        &self.commander
    }

    /// Gracefully close the connection.
    ///
    /// Shuts down the write half and waits until the remote closes its side.
    /// This does not return if the remote never closes; callers bound it with
    /// a timeout.
    pub async fn close(&self) {
        self.commander.close().await;
    }

    /// Destroy the socket immediately.
    pub fn abort(&self) {
        self.cancel.cancel();
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Channels created before the socket exists, so `Created` is observable.
struct Setup {
    id: ConnectionId,
    address: Address,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    event_rx: mpsc::UnboundedReceiver<ConnectionEvent>,
    state: watch::Sender<ConnectionState>,
}

impl Setup {
    fn new(address: Address) -> Self {
        let id = ConnectionId::next();
        let (events, event_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ConnectionState::Created);

        let _ = events.send(ConnectionEvent::Created {
            id,
            address: address.clone(),
        });
        state.send_replace(ConnectionState::Connecting);

        Self {
            id,
            address,
            events,
            event_rx,
            state,
        }
    }

    fn fail(self, source: io::Error) -> TransportError {
        tracing::debug!(id = %self.id, error = %source, "connection failed");
        self.state.send_replace(ConnectionState::Failed);
        TransportError::Connection {
            address: self.address,
            source,
        }
    }

    fn spawn<T: Transport>(self, transport: T) -> (Connection, EventSource) {
        let Setup {
            id,
            address,
            events,
            event_rx,
            state,
        } = self;

        state.send_replace(ConnectionState::Connected);
        let _ = events.send(ConnectionEvent::Connected { id });
        tracing::debug!(%id, %address, "connected to remote debugger");

        let (command_tx, command_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let state_rx = state.subscribe();

        let (read, write) = transport.into_split();
        let actor = ConnectionActor {
            chunks: FramedRead::new(read, BytesCodec::new()),
            writer: write,
            framer: Framer::new(),
            pending: None,
            events,
            state,
        };
        let span = tracing::debug_span!("connection", %id);
        tokio::spawn(actor.run(command_rx, cancel.clone()).instrument(span));

        let connection = Connection {
            id,
            address,
            state: state_rx,
            commander: Commander::new(id, command_tx),
            cancel,
        };
        (connection, EventSource::new(event_rx))
    }
}

/// The command whose response frame is awaited.
struct PendingCommand {
    command: String,
    response_tx: oneshot::Sender<Result<ResponseFrame, TransportError>>,
}

/// Owns every piece of mutable connection state.
struct ConnectionActor<R, W> {
    chunks: FramedRead<R, BytesCodec>,
    writer: W,
    framer: Framer,
    pending: Option<PendingCommand>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    state: watch::Sender<ConnectionState>,
}

impl<R, W> ConnectionActor<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    async fn run(mut self, mut commands: mpsc::Receiver<ActorMessage>, cancel: CancellationToken) {
        let mut had_error = false;
        let mut close_waiters = Vec::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("connection cancelled");
                    break;
                }
                message = commands.recv() => {
                    match message {
                        Some(ActorMessage::Send { command, response_tx }) => {
                            self.write_command(command, response_tx).await;
                        }
                        Some(ActorMessage::Close { done }) => {
                            tracing::debug!("closing write half");
                            if let Err(e) = self.writer.shutdown().await {
                                tracing::debug!(error = %e, "shutting down write half");
                            }
                            close_waiters.push(done);
                        }
                        None => {
                            tracing::debug!("all command handles dropped");
                            break;
                        }
                    }
                }
                chunk = self.chunks.next() => {
                    match chunk {
                        Some(Ok(chunk)) => self.handle_chunk(&chunk),
                        Some(Err(e)) => {
                            tracing::error!(error = %e, "socket error");
                            let _ = self.events.send(ConnectionEvent::Error {
                                message: e.to_string(),
                            });
                            had_error = true;
                            break;
                        }
                        None => {
                            tracing::debug!("remote closed the connection");
                            break;
                        }
                    }
                }
            }
        }

        if let Some(pending) = self.pending.take() {
            tracing::debug!(command = %pending.command, "failing pending command");
            let _ = pending.response_tx.send(Err(TransportError::ConnectionLost));
        }

        let final_state = if had_error {
            ConnectionState::Failed
        } else {
            ConnectionState::Closed
        };
        self.state.send_replace(final_state);
        let _ = self.events.send(ConnectionEvent::Closed { had_error });

        commands.close();
        while let Ok(message) = commands.try_recv() {
            match message {
                ActorMessage::Send { response_tx, .. } => {
                    let _ = response_tx.send(Err(not_connected()));
                }
                ActorMessage::Close { done } => close_waiters.push(done),
            }
        }
        for done in close_waiters {
            let _ = done.send(());
        }
    }

    async fn write_command(
        &mut self,
        command: String,
        response_tx: oneshot::Sender<Result<ResponseFrame, TransportError>>,
    ) {
        if let Some(pending) = &self.pending {
            tracing::warn!(%command, pending = %pending.command, "command refused, another is in flight");
            let _ = response_tx.send(Err(TransportError::Busy));
            return;
        }

        tracing::debug!(%command, "sending command");
        let line = format!("{command}\n");
        let written = match self.writer.write_all(line.as_bytes()).await {
            Ok(()) => self.writer.flush().await,
            Err(e) => Err(e),
        };

        match written {
            Ok(()) => {
                self.pending = Some(PendingCommand {
                    command,
                    response_tx,
                });
            }
            Err(e) => {
                tracing::warn!(%command, error = %e, "writing command");
                let _ = response_tx.send(Err(TransportError::Write(e)));
            }
        }
    }

    fn handle_chunk(&mut self, chunk: &[u8]) {
        tracing::trace!(len = chunk.len(), "received chunk");
        let Some(frame) = self.framer.push(chunk) else {
            return;
        };

        if frame.is_initial() {
            tracing::debug!("received initial frame");
        } else {
            match self.pending.take() {
                Some(pending) => {
                    tracing::debug!(command = %pending.command, "command completed");
                    let _ = pending.response_tx.send(Ok(frame.clone()));
                }
                None => tracing::warn!("received a frame with no command in flight"),
            }
        }

        let _ = self.events.send(ConnectionEvent::Received(frame));
    }
}

pub(crate) fn not_connected() -> TransportError {
    TransportError::Write(io::Error::new(
        io::ErrorKind::NotConnected,
        "connection is closed",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_ids_are_monotonic() {
        let first = ConnectionId::next();
        let second = ConnectionId::next();
        assert!(second > first);
    }

    #[test]
    fn address_display() {
        assert_eq!(Address::new("127.0.0.1", 4711).to_string(), "127.0.0.1:4711");
        assert_eq!(Address::new("::1", 4711).to_string(), "[::1]:4711");
    }

    #[tokio::test]
    async fn connect_to_closed_port_is_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = Connection::connect(Address::new("127.0.0.1", port), Duration::from_secs(5)).await;
        assert!(matches!(result, Err(TransportError::Connection { .. })));
    }
}
