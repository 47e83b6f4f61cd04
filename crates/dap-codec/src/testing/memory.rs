//! In-memory IDE connection for testing.

use tokio::io::{DuplexStream, duplex};

use transport::Transport;

/// One end of an in-memory, bidirectional byte pipe.
///
/// Serve the adapter on one end and drive it from the other with a
/// [`crate::DapReader`] / [`crate::DapWriter`] pair, playing the IDE.
pub struct MemoryTransport {
    read: DuplexStream,
    write: DuplexStream,
}

impl MemoryTransport {
    /// Create a connected pair of in-memory transports.
    pub fn pair() -> (Self, Self) {
        let (a_to_b_write, a_to_b_read) = duplex(64 * 1024);
        let (b_to_a_write, b_to_a_read) = duplex(64 * 1024);

        let a = MemoryTransport {
            read: b_to_a_read,
            write: a_to_b_write,
        };
        let b = MemoryTransport {
            read: a_to_b_read,
            write: b_to_a_write,
        };
        (a, b)
    }
}

impl Transport for MemoryTransport {
    type Read = DuplexStream;
    type Write = DuplexStream;

    fn into_split(self) -> (Self::Read, Self::Write) {
        (self.read, self.write)
    }
}
