//! Streaming conversation client for Varlens.
//!
//! Decodes the assistant's server-sent event stream (text tokens, database
//! query and literature search tool phases, round boundaries) and applies it
//! in arrival order to a conversation transcript.

pub mod decoder;
pub mod engine;
pub mod error;
pub mod events;
pub mod session;
pub mod transcript;
pub mod transport;
pub mod types;

pub use decoder::{SseDecoder, SseFrame};
pub use engine::{ConversationEngine, EngineState, NoopObserver, StreamObserver, StreamOutcome};
pub use error::{ChatError, TranscriptError};
pub use events::{Decoded, StreamEvent};
pub use session::{BufferedReply, ChatSession};
pub use transcript::{Conversation, MessageHandle};
pub use transport::{decode_event_stream, ChatTransport, EventStream, HttpChatTransport};
pub use types::{
    ChatMessage, ChatRequest, ConversationId, LiteratureResult, Message, Metadata, QueryResult,
    ToolPhase, ToolResult,
};
