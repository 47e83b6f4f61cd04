//! In-memory transport for testing.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, BufReader, DuplexStream, Lines, duplex};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::io::StreamReader;

use super::response_chunks;
use crate::connection::{Address, Connection, Connector, Transport};
use crate::error::TransportError;
use crate::events::EventSource;

type ChunkReader = StreamReader<UnboundedReceiverStream<io::Result<Bytes>>, Bytes>;

/// The adapter's side of an in-memory connection.
///
/// Reads yield one chunk at a time, as sent by the paired [`RemoteEnd`].
/// Writes go to a pipe the remote end reads line by line.
pub struct MemoryTransport {
    read: ChunkReader,
    write: DuplexStream,
}

impl MemoryTransport {
    /// Create a transport together with the remote end that drives it.
    pub fn pair() -> (Self, RemoteEnd) {
        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
        let (local, remote) = duplex(64 * 1024);

        let transport = MemoryTransport {
            read: StreamReader::new(UnboundedReceiverStream::new(chunk_rx)),
            write: local,
        };
        let remote = RemoteEnd {
            chunks: Some(chunk_tx),
            commands: BufReader::new(remote).lines(),
        };
        (transport, remote)
    }
}

impl Transport for MemoryTransport {
    type Read = ChunkReader;
    type Write = DuplexStream;

    fn into_split(self) -> (Self::Read, Self::Write) {
        (self.read, self.write)
    }
}

/// A scripted stand-in for the remote debugger.
pub struct RemoteEnd {
    chunks: Option<mpsc::UnboundedSender<io::Result<Bytes>>>,
    commands: Lines<BufReader<DuplexStream>>,
}

impl RemoteEnd {
    /// Deliver one chunk. Returns false once the connection has gone away.
    pub fn send_chunk(&self, chunk: impl Into<Bytes>) -> bool {
        match &self.chunks {
            Some(chunks) => chunks.send(Ok(chunk.into())).is_ok(),
            None => false,
        }
    }

    /// Deliver a response body followed by a prompt chunk.
    pub fn respond(&self, body: &str) -> bool {
        response_chunks(body)
            .into_iter()
            .all(|chunk| self.send_chunk(chunk))
    }

    /// Deliver the banner the remote prints right after accepting.
    pub fn greet(&self) -> bool {
        self.respond("")
    }

    /// The next command line written by the adapter, or `None` once the
    /// adapter has shut down its write half.
    pub async fn next_command(&mut self) -> Option<String> {
        self.commands.next_line().await.ok().flatten()
    }

    /// Like [`RemoteEnd::next_command`], but gives up after `limit`.
    pub async fn next_command_within(&mut self, limit: Duration) -> Option<String> {
        tokio::time::timeout(limit, self.next_command())
            .await
            .ok()
            .flatten()
    }

    /// Read one command and answer it with `body`.
    ///
    /// Returns the command that was answered.
    pub async fn answer(&mut self, body: &str) -> Option<String> {
        let command = self.next_command().await?;
        self.respond(body);
        Some(command)
    }

    /// Close the remote side cleanly.
    pub fn close(&mut self) {
        self.chunks = None;
    }

    /// Fail the socket with `kind`, then close it.
    pub fn fail(&mut self, kind: io::ErrorKind) {
        if let Some(chunks) = self.chunks.take() {
            let _ = chunks.send(Err(io::Error::new(kind, "simulated socket failure")));
        }
    }
}

#[derive(Default)]
struct ConnectorState {
    transports: VecDeque<MemoryTransport>,
    requested: Vec<Address>,
}

/// A [`Connector`] that hands out queued in-memory transports.
///
/// Connecting with an empty queue fails as if the connection were refused.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    state: Arc<Mutex<ConnectorState>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a fresh transport and return its remote end.
    pub fn accept_next(&self) -> RemoteEnd {
        let (transport, remote) = MemoryTransport::pair();
        self.lock().transports.push_back(transport);
        remote
    }

    /// Every address a connection was requested for, in order.
    pub fn requested(&self) -> Vec<Address> {
        self.lock().requested.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ConnectorState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Connector for MemoryConnector {
    async fn connect(
        &self,
        address: Address,
        _timeout: Duration,
    ) -> Result<(Connection, EventSource), TransportError> {
        let transport = {
            let mut state = self.lock();
            state.requested.push(address.clone());
            state.transports.pop_front()
        };

        match transport {
            Some(transport) => Ok(Connection::from_transport(transport, address)),
            None => Err(TransportError::Connection {
                address,
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"),
            }),
        }
    }
}
