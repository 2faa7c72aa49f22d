//! Typed events of the conversation stream.
//!
//! A frame's data is JSON `{"type": <kind>, "data": {...}}`. Servers that put
//! the kind in the SSE `event:` field instead send the payload as the whole
//! JSON body; both forms decode to the same `StreamEvent`. A tagged frame
//! without a `data` key carries its payload fields next to `type`.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::decoder::SseFrame;
use crate::error::ChatError;
use crate::types::{ConversationId, LiteratureResult, QueryResult};

/// Data sentinel some servers send as the last frame.
pub const DONE_SENTINEL: &str = "[DONE]";

/// One event of the conversation stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    ConversationStarted { conversation_id: ConversationId },
    Token { text: String },
    QueryingStarted,
    QueryResult(QueryResult),
    LiteratureSearching,
    LiteratureResult(LiteratureResult),
    RoundComplete,
}

impl StreamEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::ConversationStarted { .. } => "conversation_started",
            StreamEvent::Token { .. } => "token",
            StreamEvent::QueryingStarted => "querying_started",
            StreamEvent::QueryResult(_) => "query_result",
            StreamEvent::LiteratureSearching => "literature_searching",
            StreamEvent::LiteratureResult(_) => "literature_result",
            StreamEvent::RoundComplete => "round_complete",
        }
    }

    /// Build an event from its kind and payload.
    pub fn from_parts(kind: &str, data: Value) -> Result<Self, ChatError> {
        let event = match kind {
            "conversation_started" => {
                let payload: ConversationStartedData = payload(kind, data)?;
                StreamEvent::ConversationStarted {
                    conversation_id: payload.conversation_id,
                }
            }
            "token" => {
                let payload: TokenData = payload(kind, data)?;
                StreamEvent::Token { text: payload.text }
            }
            "querying_started" => StreamEvent::QueryingStarted,
            "query_result" => StreamEvent::QueryResult(payload(kind, data)?),
            "literature_searching" => StreamEvent::LiteratureSearching,
            "literature_result" => StreamEvent::LiteratureResult(payload(kind, data)?),
            "round_complete" => StreamEvent::RoundComplete,
            other => {
                return Err(ChatError::Protocol(format!("unknown event type '{}'", other)));
            }
        };
        Ok(event)
    }
}

/// What a single SSE frame decoded to.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Event(StreamEvent),
    /// End-of-stream sentinel.
    Done,
}

#[derive(Deserialize)]
struct ConversationStartedData {
    conversation_id: ConversationId,
}

#[derive(Deserialize)]
struct TokenData {
    text: String,
}

fn payload<T: DeserializeOwned>(kind: &str, data: Value) -> Result<T, ChatError> {
    serde_json::from_value(data)
        .map_err(|e| ChatError::Protocol(format!("malformed '{}' payload: {}", kind, e)))
}

/// Decode one SSE frame into a stream event.
///
/// Errors are protocol violations; callers skip the frame and keep reading.
pub fn decode_frame(frame: &SseFrame) -> Result<Decoded, ChatError> {
    let data = frame.data.trim();
    if data == DONE_SENTINEL {
        return Ok(Decoded::Done);
    }

    let mut json: Value = serde_json::from_str(data)
        .map_err(|e| ChatError::Protocol(format!("frame is not valid JSON: {}", e)))?;

    let tagged = json
        .as_object_mut()
        .and_then(|obj| match obj.remove("type") {
            Some(Value::String(kind)) => {
                let data = obj
                    .remove("data")
                    .unwrap_or_else(|| Value::Object(std::mem::take(obj)));
                Some((kind, data))
            }
            _ => None,
        });

    let (kind, payload) = match (tagged, frame.event.as_deref()) {
        (Some(tagged), _) => tagged,
        (None, Some(name)) => (name.to_string(), json),
        (None, None) => {
            return Err(ChatError::Protocol("frame has no event type".to_string()));
        }
    };
    StreamEvent::from_parts(&kind, payload).map(Decoded::Event)
}
