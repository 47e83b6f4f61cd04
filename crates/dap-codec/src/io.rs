//! Byte streams the adapter can serve DAP over.
//!
//! Any [`Transport`] works; TCP sockets come with the `transport` crate.

use tokio::io::{Stdin, Stdout};
use transport::Transport;

use crate::reader::DapReader;
use crate::writer::DapWriter;

/// The process's standard input and output, as used when the IDE spawns the
/// adapter.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stdio;

impl Transport for Stdio {
    type Read = Stdin;
    type Write = Stdout;

    fn into_split(self) -> (Self::Read, Self::Write) {
        (tokio::io::stdin(), tokio::io::stdout())
    }
}

/// Split a transport into a DAP reader and writer pair.
pub fn split<T: Transport>(transport: T) -> (DapReader<T::Read>, DapWriter<T::Write>) {
    let (read, write) = transport.into_split();
    (DapReader::new(read), DapWriter::new(write))
}
