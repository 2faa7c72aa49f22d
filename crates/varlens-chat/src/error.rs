//! Error types for the conversation client.

use varlens_core::error::VarlensError;

/// Errors surfaced by the conversation client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("a response is still streaming")]
    StreamInProgress,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("stream aborted")]
    Aborted,
}

impl From<ChatError> for VarlensError {
    fn from(err: ChatError) -> Self {
        VarlensError::Transport(err.to_string())
    }
}

/// Contract violations against the transcript model.
///
/// A correct server never triggers these; the engine logs and skips the
/// offending event instead of propagating them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranscriptError {
    #[error("an assistant message is already streaming")]
    AlreadyStreaming,
    #[error("message handle does not refer to a streaming assistant message")]
    NotStreaming,
    #[error("conversation id already established as {existing}, got {received}")]
    ConflictingConversationId { existing: String, received: String },
}
