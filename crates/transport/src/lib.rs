//! Transport layer for remote byebug servers.
//!
//! A remote byebug server speaks plain text over TCP. It has no message
//! framing beyond the prompt it prints whenever it is idle, so this crate turns
//! the raw byte stream into discrete, correlated responses.
//!
//! # Architecture
//!
//! - [`Connection`] owns one socket. All socket state (the read half, the
//!   write half, the [`Framer`] and the single pending command) lives in one
//!   background task, which the rest of the program talks to over channels.
//! - [`Commander`] writes a command and awaits exactly one response frame.
//! - [`EventSource`] delivers lifecycle notifications ([`ConnectionEvent`]).
//! - [`commands`] maps typed requests to wire text and decodes their frames.
//!
//! # Usage
//!
//! ```ignore
//! use transport::{Address, Connection, commands::Backtrace};
//!
//! let (connection, mut events) =
//!     Connection::connect(Address::new("127.0.0.1", 12345), timeout).await?;
//!
//! // the banner arrives as the initial frame
//! while let Some(event) = events.recv().await {
//!     if let transport::ConnectionEvent::Received(frame) = event {
//!         assert!(frame.is_initial());
//!         break;
//!     }
//! }
//!
//! let frames = connection.commander().execute(&Backtrace).await?;
//! ```
//!
//! # Scope
//!
//! The wire format carries no request identifiers, so correctness depends on
//! strict request/response alternation. The [`Commander`] refuses a second
//! command while one is still waiting for its frame instead of queueing it.

mod commander;
pub mod commands;
mod connection;
mod error;
mod events;
mod framer;

pub mod testing;

pub use commander::Commander;
pub use connection::{
    Address, Connection, ConnectionId, ConnectionState, Connector, TcpConnector, Transport,
};
pub use error::{CommandError, DecodeError, TransportError};
pub use events::{ConnectionEvent, EventSource};
pub use framer::{Framer, PROMPT, ResponseFrame};
