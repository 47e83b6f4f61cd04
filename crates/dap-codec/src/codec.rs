//! `Content-Length` framing for DAP messages.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::CodecError;
use crate::message::{Message, OutgoingMessage};

/// Default maximum message size (16 MB).
const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

const HEADER_SEPARATOR: &[u8] = b"\r\n\r\n";

/// Decodes IDE requests and encodes adapter responses and events.
///
/// ```text
/// Content-Length: <length>\r\n
/// \r\n
/// <JSON body>
/// ```
#[derive(Debug, Clone)]
pub struct DapCodec {
    max_message_size: usize,
}

impl DapCodec {
    pub fn new() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    /// Messages larger than this are rejected with [`CodecError::MessageTooLarge`].
    pub fn with_max_size(max_message_size: usize) -> Self {
        Self { max_message_size }
    }
}

impl Default for DapCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for DapCodec {
    type Item = Message;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(header_end) = find_header_end(src) else {
            return Ok(None);
        };

        let content_length = parse_content_length(&src[..header_end])?;
        if content_length > self.max_message_size {
            return Err(CodecError::MessageTooLarge {
                size: content_length,
                max: self.max_message_size,
            });
        }

        let body_start = header_end + HEADER_SEPARATOR.len();
        let total_length = body_start + content_length;
        if src.len() < total_length {
            src.reserve(total_length - src.len());
            return Ok(None);
        }

        // consume the frame before parsing so a bad body is not re-read
        let frame = src.split_to(total_length);
        let message: Message = serde_json::from_slice(&frame[body_start..])
            .map_err(CodecError::JsonDeserialize)?;

        tracing::trace!(?message, "decoded message");
        Ok(Some(message))
    }
}

impl Encoder<OutgoingMessage> for DapCodec {
    type Error = CodecError;

    fn encode(&mut self, item: OutgoingMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json = serde_json::to_vec(&item).map_err(CodecError::JsonSerialize)?;

        dst.reserve(32 + json.len());
        dst.put_slice(b"Content-Length: ");
        dst.put_slice(json.len().to_string().as_bytes());
        dst.put_slice(HEADER_SEPARATOR);
        dst.put_slice(&json);

        Ok(())
    }
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_SEPARATOR.len())
        .position(|w| w == HEADER_SEPARATOR)
}

/// Header names are matched case-insensitively; other headers are ignored.
fn parse_content_length(header: &[u8]) -> Result<usize, CodecError> {
    let header_str = std::str::from_utf8(header).map_err(|_| CodecError::InvalidUtf8)?;

    for line in header_str.split("\r\n") {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if name.trim().eq_ignore_ascii_case("content-length") {
            return value
                .trim()
                .parse()
                .map_err(|_| CodecError::MalformedContentLength);
        }
    }

    Err(CodecError::MissingContentLength)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventBody, StoppedEventBody, StoppedReason};
    use crate::message::OutgoingEvent;

    fn make_frame(json: &str) -> BytesMut {
        BytesMut::from(format!("Content-Length: {}\r\n\r\n{}", json.len(), json).as_str())
    }

    #[test]
    fn decode_request() {
        let mut codec = DapCodec::new();
        let mut buf = make_frame(
            r#"{"seq":1,"type":"request","command":"initialize","arguments":{"adapterID":"byebug"}}"#,
        );

        let message = codec.decode(&mut buf).unwrap().unwrap();
        assert!(matches!(message, Message::Request(r) if r.command == "initialize"));
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_waits_for_header_and_body() {
        let mut codec = DapCodec::new();
        let mut buf = BytesMut::from("Content-Length: 10");
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert!(!buf.is_empty());

        let mut buf = BytesMut::from("Content-Length: 100\r\n\r\n{\"partial\":");
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn decode_back_to_back_requests() {
        let mut codec = DapCodec::new();
        let mut buf = make_frame(r#"{"seq":1,"type":"request","command":"threads"}"#);
        buf.put_slice(&make_frame(r#"{"seq":2,"type":"request","command":"scopes","arguments":{"frameId":0}}"#));

        let first = codec.decode(&mut buf).unwrap().unwrap();
        assert!(matches!(first, Message::Request(r) if r.seq == 1));
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert!(matches!(second, Message::Request(r) if r.seq == 2));
        assert!(buf.is_empty());
    }

    #[test]
    fn header_name_is_case_insensitive() {
        let mut codec = DapCodec::new();
        let json = r#"{"seq":1,"type":"request","command":"threads"}"#;
        let mut buf = BytesMut::from(
            format!("content-length: {}\r\nContent-Type: application/json\r\n\r\n{json}", json.len())
                .as_str(),
        );
        assert!(codec.decode(&mut buf).unwrap().is_some());
    }

    #[test]
    fn missing_content_length() {
        let mut codec = DapCodec::new();
        let mut buf = BytesMut::from("Content-Type: json\r\n\r\n{}");
        assert!(matches!(
            codec.decode(&mut buf),
            Err(CodecError::MissingContentLength)
        ));
    }

    #[test]
    fn decode_message_too_large() {
        let mut codec = DapCodec::with_max_size(10);
        let mut buf = BytesMut::from("Content-Length: 100\r\n\r\n");
        assert!(matches!(
            codec.decode(&mut buf),
            Err(CodecError::MessageTooLarge { size: 100, max: 10 })
        ));
    }

    #[test]
    fn malformed_body_is_consumed() {
        let mut codec = DapCodec::new();
        let mut buf = make_frame("{not json}");
        assert!(matches!(
            codec.decode(&mut buf),
            Err(CodecError::JsonDeserialize(_))
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn encode_event() {
        let mut codec = DapCodec::new();
        let message = OutgoingMessage::Event(OutgoingEvent {
            seq: 7,
            body: EventBody::Stopped(StoppedEventBody {
                reason: StoppedReason::Entry,
                thread_id: 1,
                all_threads_stopped: Some(true),
            }),
        });

        let mut buf = BytesMut::new();
        codec.encode(message, &mut buf).unwrap();

        let s = std::str::from_utf8(&buf).unwrap();
        let (header, body) = s.split_once("\r\n\r\n").unwrap();
        assert_eq!(header, format!("Content-Length: {}", body.len()));

        let value: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(value["type"], "event");
        assert_eq!(value["event"], "stopped");
        assert_eq!(value["body"]["reason"], "entry");
        assert_eq!(value["body"]["threadId"], 1);
    }
}
