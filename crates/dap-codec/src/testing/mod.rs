//! Testing utilities for the IDE side of the adapter.

mod memory;

pub use memory::MemoryTransport;

use serde::Serialize;

/// Construct a valid DAP message frame from a JSON-serializable message.
///
/// # Example
///
/// ```
/// use dap_codec::testing::frame_message;
/// use serde_json::json;
///
/// let bytes = frame_message(&json!({
///     "seq": 1,
///     "type": "request",
///     "command": "initialize"
/// }));
///
/// assert!(bytes.starts_with(b"Content-Length: "));
/// ```
pub fn frame_message(msg: &impl Serialize) -> Vec<u8> {
    let json = serde_json::to_string(msg).expect("failed to serialize message");
    format!("Content-Length: {}\r\n\r\n{}", json.len(), json).into_bytes()
}

/// Construct multiple DAP message frames concatenated together.
pub fn frame_messages<T: Serialize>(msgs: &[T]) -> Vec<u8> {
    msgs.iter().flat_map(|m| frame_message(m)).collect()
}
