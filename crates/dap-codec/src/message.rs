//! DAP message envelopes.
//!
//! Incoming messages come from the IDE and are kept loosely typed: the
//! arguments of a [`Request`] are decoded by whoever handles its command.
//! Outgoing messages carry the typed bodies from [`crate::responses`] and
//! [`crate::events`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::events::EventBody;
use crate::responses::{ErrorMessage, ErrorResponseBody, ResponseBody};

/// Sequence number type for message ordering and request-response correlation.
pub type Seq = i64;

/// An incoming DAP message from the IDE.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    Request(Request),
    /// A response to a reverse request. The adapter never sends any, so
    /// these are only logged.
    Response(Response),
    Event(Event),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub seq: Seq,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<serde_json::Value>,
}

impl Request {
    /// Decode the request arguments.
    ///
    /// Missing arguments decode as an empty object, so argument types whose
    /// fields are all optional accept an argument-less request.
    pub fn arguments<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        let arguments = self
            .arguments
            .clone()
            .unwrap_or_else(|| serde_json::Value::Object(Default::default()));
        serde_json::from_value(arguments)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub seq: Seq,
    #[serde(rename = "request_seq")]
    pub request_seq: Seq,
    pub success: bool,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub seq: Seq,
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

/// A response from the adapter to an IDE request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingResponse {
    pub seq: Seq,
    #[serde(rename = "request_seq")]
    pub request_seq: Seq,
    pub success: bool,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<ResponseBody>,
}

impl OutgoingResponse {
    pub fn success(seq: Seq, request: &Request, body: Option<ResponseBody>) -> Self {
        Self {
            seq,
            request_seq: request.seq,
            success: true,
            command: request.command.clone(),
            message: None,
            body,
        }
    }

    /// A failed response. The error's format string doubles as the short
    /// `message` the IDE shows.
    pub fn error(seq: Seq, request: &Request, error: ErrorMessage) -> Self {
        Self {
            seq,
            request_seq: request.seq,
            success: false,
            command: request.command.clone(),
            message: Some(error.format.clone()),
            body: Some(ResponseBody::Error(ErrorResponseBody { error })),
        }
    }
}

/// An event from the adapter.
#[derive(Debug, Clone, Serialize)]
pub struct OutgoingEvent {
    pub seq: Seq,
    #[serde(flatten)]
    pub body: EventBody,
}

/// Everything the adapter writes to the IDE.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutgoingMessage {
    Response(OutgoingResponse),
    Event(OutgoingEvent),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requests::SetBreakpointsArguments;
    use crate::responses::Capabilities;
    use serde_json::json;

    #[test]
    fn deserialize_request_without_arguments() {
        let msg: Message =
            serde_json::from_str(r#"{"seq": 3, "type": "request", "command": "threads"}"#).unwrap();
        let Message::Request(request) = msg else {
            panic!("expected a request");
        };
        assert_eq!(request.command, "threads");
        assert!(request.arguments.is_none());
    }

    #[test]
    fn typed_arguments() {
        let request = Request {
            seq: 4,
            command: "setBreakpoints".to_string(),
            arguments: Some(json!({
                "source": {"path": "/srv/app/foo.rb", "name": "foo.rb"},
                "breakpoints": [{"line": 42}],
            })),
        };
        let arguments: SetBreakpointsArguments = request.arguments().unwrap();
        assert_eq!(arguments.source.path.as_deref(), Some("/srv/app/foo.rb"));
        assert_eq!(arguments.breakpoints.unwrap()[0].line, 42);
    }

    #[test]
    fn invalid_arguments_are_an_error() {
        let request = Request {
            seq: 4,
            command: "setBreakpoints".to_string(),
            arguments: Some(json!({"source": 12})),
        };
        assert!(request.arguments::<SetBreakpointsArguments>().is_err());
    }

    #[test]
    fn serialize_success_response() {
        let request = Request {
            seq: 1,
            command: "initialize".to_string(),
            arguments: None,
        };
        let capabilities = Capabilities {
            supports_configuration_done_request: Some(true),
            ..Default::default()
        };
        let msg = OutgoingMessage::Response(OutgoingResponse::success(
            1,
            &request,
            Some(ResponseBody::Initialize(capabilities)),
        ));

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({
                "seq": 1,
                "type": "response",
                "request_seq": 1,
                "success": true,
                "command": "initialize",
                "body": {"supportsConfigurationDoneRequest": true},
            })
        );
    }

    #[test]
    fn serialize_error_response() {
        let request = Request {
            seq: 9,
            command: "launch".to_string(),
            arguments: None,
        };
        let error = ErrorMessage::new(1001, "launch is not supported");
        let msg = OutgoingMessage::Response(OutgoingResponse::error(2, &request, error));

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["message"], "launch is not supported");
        assert_eq!(value["body"]["error"]["id"], 1001);
        assert_eq!(value["body"]["error"]["format"], "launch is not supported");
    }

    #[test]
    fn serialize_bodyless_event() {
        let msg = OutgoingMessage::Event(OutgoingEvent {
            seq: 5,
            body: EventBody::Initialized,
        });
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value, json!({"seq": 5, "type": "event", "event": "initialized"}));
    }
}
