//! Server-side Debug Adapter Protocol transport.
//!
//! The debug adapter sits on the *server* end of DAP: it reads requests
//! from the IDE and writes responses and events back.
//!
//! # Architecture
//!
//! - [`DapCodec`] decodes incoming [`Message`]s and encodes [`OutgoingMessage`]s
//!   using the `Content-Length` header protocol
//! - [`DapReader`] wraps an `AsyncRead` to produce a `Stream` of [`Message`]s
//! - [`DapWriter`] wraps an `AsyncWrite` to provide a `Sink` for outgoing messages
//! - [`requests`], [`responses`], [`events`] and [`types`] hold the typed
//!   bodies this adapter understands
//!
//! # Usage
//!
//! ```ignore
//! use futures::StreamExt;
//! use dap_codec::{Message, Stdio};
//!
//! let (mut reader, mut writer) = dap_codec::split(Stdio);
//!
//! while let Some(msg) = reader.next().await {
//!     if let Message::Request(request) = msg? {
//!         // dispatch, then `writer.send(...)` the response
//!     }
//! }
//! ```

mod codec;
mod error;
pub mod events;
mod message;
mod io;
mod reader;
pub mod requests;
pub mod responses;
pub mod types;
mod writer;

pub mod testing;

pub use codec::DapCodec;
pub use error::CodecError;
pub use message::{
    Event, Message, OutgoingEvent, OutgoingMessage, OutgoingResponse, Request, Response, Seq,
};
pub use reader::DapReader;
pub use io::{Stdio, split};
pub use writer::DapWriter;
