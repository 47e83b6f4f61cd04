//! Response framing.
//!
//! The remote debugger marks the end of every response by printing its prompt,
//! and it always prints the prompt as its own chunk. A frame is therefore
//! complete as soon as a chunk *starts* with [`PROMPT`]; the accumulated
//! buffer is never searched, so payload that merely contains the sentinel text
//! cannot end a frame early.

use std::borrow::Cow;

use bytes::{Bytes, BytesMut};

/// Sentinel the remote debugger emits when it is idle and ready for input.
pub const PROMPT: &[u8] = b"PROMPT";

/// One complete response: every chunk received since the previous frame,
/// including the chunk carrying the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    content: Bytes,
    prompt_start: usize,
    is_initial: bool,
}

impl ResponseFrame {
    /// Build a frame from its raw content.
    ///
    /// The prompt is taken to start at the last line beginning with
    /// [`PROMPT`], or at the end of `content` if there is none.
    pub fn new(content: impl Into<Bytes>, is_initial: bool) -> Self {
        let content = content.into();
        let prompt_start = find_trailing_prompt(&content).unwrap_or(content.len());
        Self {
            content,
            prompt_start,
            is_initial,
        }
    }

    /// The raw bytes of the frame, prompt included.
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Whether this is the banner sent right after connecting.
    pub fn is_initial(&self) -> bool {
        self.is_initial
    }

    /// The whole frame as text.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.content)
    }

    /// The response text without the trailing prompt.
    pub fn body(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.content[..self.prompt_start])
    }

    /// The prompt chunk that completed the frame.
    #[cfg(test)]
    fn prompt(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.content[self.prompt_start..])
    }
}

fn find_trailing_prompt(content: &[u8]) -> Option<usize> {
    content
        .windows(PROMPT.len() + 1)
        .rposition(|w| w[0] == b'\n' && &w[1..] == PROMPT)
        .map(|pos| pos + 1)
        .or_else(|| content.starts_with(PROMPT).then_some(0))
}

/// Accumulates chunks until one starts with the prompt.
#[derive(Debug)]
pub struct Framer {
    buffer: BytesMut,
    initial: bool,
}

impl Framer {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
            initial: true,
        }
    }

    /// Feed one chunk exactly as it was read from the socket.
    ///
    /// Returns a frame when `chunk` starts with [`PROMPT`]; the accumulator is
    /// cleared afterwards. The first frame produced is flagged as initial.
    pub fn push(&mut self, chunk: &[u8]) -> Option<ResponseFrame> {
        let prompt_start = self.buffer.len();
        self.buffer.extend_from_slice(chunk);

        if !chunk.starts_with(PROMPT) {
            return None;
        }

        let content = self.buffer.split().freeze();
        let is_initial = std::mem::replace(&mut self.initial, false);
        Some(ResponseFrame {
            content,
            prompt_start,
            is_initial,
        })
    }

    /// Number of bytes buffered towards the next frame.
    #[cfg(test)]
    fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for Framer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_is_concatenation_of_chunks_up_to_prompt() {
        let mut framer = Framer::new();
        assert!(framer.push(b"#0 Object#run ").is_none());
        assert!(framer.push(b"at app.rb:10\n").is_none());

        let frame = framer.push(b"PROMPT (byebug) ").unwrap();
        assert_eq!(frame.content(), b"#0 Object#run at app.rb:10\nPROMPT (byebug) ");
        assert_eq!(frame.body(), "#0 Object#run at app.rb:10\n");
        assert_eq!(frame.prompt(), "PROMPT (byebug) ");
        assert_eq!(framer.buffered(), 0);
    }

    #[test]
    fn accumulator_resets_after_each_frame() {
        let mut framer = Framer::new();
        framer.push(b"first\n");
        framer.push(b"PROMPT").unwrap();

        framer.push(b"second\n");
        let frame = framer.push(b"PROMPT").unwrap();
        assert_eq!(frame.content(), b"second\nPROMPT");
    }

    #[test]
    fn only_the_first_frame_is_initial() {
        let mut framer = Framer::new();
        let banner = framer.push(b"PROMPT (byebug) ").unwrap();
        assert!(banner.is_initial());

        for _ in 0..3 {
            framer.push(b"output\n");
            let frame = framer.push(b"PROMPT (byebug) ").unwrap();
            assert!(!frame.is_initial());
        }
    }

    #[test]
    fn sentinel_inside_a_chunk_does_not_complete_a_frame() {
        let mut framer = Framer::new();
        assert!(framer.push(b"puts 'PROMPT'\n").is_none());
        assert!(framer.push(b"output then PROMPT").is_none());
        assert_eq!(framer.buffered(), 32);

        let frame = framer.push(b"PROMPT").unwrap();
        assert_eq!(frame.body(), "puts 'PROMPT'\noutput then PROMPT");
    }

    #[test]
    fn empty_chunks_are_harmless() {
        let mut framer = Framer::new();
        assert!(framer.push(b"").is_none());
        assert!(framer.push(b"PROMPT").is_some());
    }

    #[test]
    fn frame_from_raw_content_splits_body_and_prompt() {
        let frame = ResponseFrame::new(&b"#0 Object#run at app.rb:10\nPROMPT"[..], false);
        assert_eq!(frame.body(), "#0 Object#run at app.rb:10\n");
        assert_eq!(frame.prompt(), "PROMPT");

        let bare = ResponseFrame::new(&b"no prompt here"[..], false);
        assert_eq!(bare.body(), "no prompt here");
        assert_eq!(bare.prompt(), "");
    }
}
