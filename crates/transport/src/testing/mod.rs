//! Testing utilities for the transport layer.
//!
//! The remote debugger's framing depends on chunk boundaries, so the
//! in-memory transport here delivers every chunk to the reader exactly as it
//! was sent instead of going through a byte pipe that could coalesce them.

mod memory;

pub use memory::{MemoryConnector, MemoryTransport, RemoteEnd};

/// The prompt chunk byebug prints when it is ready for input.
pub const PROMPT_CHUNK: &str = "PROMPT (byebug) ";

/// Split a response into the chunks the remote debugger would emit: the
/// output (if any) followed by the prompt.
///
/// # Example
///
/// ```
/// use transport::testing::response_chunks;
///
/// let chunks = response_chunks("Created breakpoint 1 at foo.rb:42\n");
/// assert_eq!(chunks.len(), 2);
/// assert!(chunks[1].starts_with("PROMPT"));
/// ```
pub fn response_chunks(body: &str) -> Vec<String> {
    let mut chunks = Vec::with_capacity(2);
    if !body.is_empty() {
        chunks.push(body.to_string());
    }
    chunks.push(PROMPT_CHUNK.to_string());
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_is_only_a_prompt() {
        assert_eq!(response_chunks(""), vec![PROMPT_CHUNK.to_string()]);
    }
}
