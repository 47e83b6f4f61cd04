//! Debug Adapter Protocol session for remote byebug servers.
//!
//! A [`DebugSession`] serves one IDE client. It answers DAP requests,
//! drives the attach/run state machine in [`machine`], and talks to the
//! remote debugger through the `transport` crate.
//!
//! ```ignore
//! let (outbox_tx, outbox_rx) = tokio::sync::mpsc::unbounded_channel();
//! let session = session::DebugSession::new(outbox_tx);
//! tokio::spawn(write_to_ide(outbox_rx));
//! session.run(requests).await;
//! ```

pub mod config;
mod error;
mod logging;
pub mod machine;
mod session;

pub use config::{AttachArguments, SessionConfig};
pub use error::SessionError;
pub use logging::{NoTrace, Trace, TraceSink};
pub use machine::SessionState;
pub use session::{DISCONNECT_TIMEOUT, DebugSession, THREAD_ID};
