//! Conversation transcript.
//!
//! An ordered list of messages where at most one assistant message is
//! streaming at a time. Streaming text is only reachable through the
//! `MessageHandle` returned when the message was opened; finalizing consumes
//! the handle, so a finalized message can never be appended to again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use varlens_core::types::SessionId;

use crate::error::TranscriptError;
use crate::types::{ChatMessage, ConversationId, Message, ToolResult};

/// Exclusive handle to the assistant message currently streaming.
#[derive(Debug, PartialEq, Eq)]
pub struct MessageHandle {
    index: usize,
    id: Uuid,
}

/// A conversation's transcript and identity.
///
/// `id` stays `None` until the service announces one; a conversation without
/// an id is provisional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Option<ConversationId>,
    pub session_id: Option<SessionId>,
    messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(session_id: Option<SessionId>) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            session_id,
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Resume a conversation the service already knows.
    pub fn resume(id: ConversationId, session_id: Option<SessionId>) -> Self {
        Self {
            id: Some(id),
            ..Self::new(session_id)
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn is_provisional(&self) -> bool {
        self.id.is_none()
    }

    /// The assistant message still receiving tokens, if any.
    pub fn streaming_message(&self) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.message.is_streaming())
    }

    /// Record the server-assigned id.
    ///
    /// Returns `true` when the id was newly established and `false` when the
    /// same id was already set. A different id is rejected.
    pub fn establish_id(&mut self, id: ConversationId) -> Result<bool, TranscriptError> {
        match &self.id {
            None => {
                self.id = Some(id);
                self.touch();
                Ok(true)
            }
            Some(existing) if *existing == id => Ok(false),
            Some(existing) => Err(TranscriptError::ConflictingConversationId {
                existing: existing.to_string(),
                received: id.to_string(),
            }),
        }
    }

    pub fn append_user_message(&mut self, content: impl Into<String>) -> Uuid {
        self.push(Message::User {
            content: content.into(),
        })
    }

    /// Open an empty streaming assistant message.
    pub fn begin_assistant_message(&mut self) -> Result<MessageHandle, TranscriptError> {
        if self.streaming_message().is_some() {
            return Err(TranscriptError::AlreadyStreaming);
        }
        let index = self.messages.len();
        let id = self.push(Message::Assistant {
            content: String::new(),
            is_streaming: true,
        });
        Ok(MessageHandle { index, id })
    }

    /// Append text to the message `handle` refers to.
    pub fn append_token(
        &mut self,
        handle: &MessageHandle,
        text: &str,
    ) -> Result<(), TranscriptError> {
        match self.resolve(handle)? {
            Message::Assistant { content, .. } => content.push_str(text),
            _ => return Err(TranscriptError::NotStreaming),
        }
        self.touch();
        Ok(())
    }

    /// Mark the message complete. Its content is kept exactly as streamed.
    pub fn finalize_assistant_message(
        &mut self,
        handle: MessageHandle,
    ) -> Result<(), TranscriptError> {
        match self.resolve(&handle)? {
            Message::Assistant { is_streaming, .. } => *is_streaming = false,
            _ => return Err(TranscriptError::NotStreaming),
        }
        self.touch();
        Ok(())
    }

    /// Append a completed tool result. No assistant message may be streaming.
    pub fn append_tool_result(&mut self, result: ToolResult) -> Result<Uuid, TranscriptError> {
        if self.streaming_message().is_some() {
            return Err(TranscriptError::AlreadyStreaming);
        }
        Ok(self.push(result.into()))
    }

    fn resolve(&mut self, handle: &MessageHandle) -> Result<&mut Message, TranscriptError> {
        match self.messages.get_mut(handle.index) {
            Some(entry) if entry.id == handle.id && entry.message.is_streaming() => {
                Ok(&mut entry.message)
            }
            _ => Err(TranscriptError::NotStreaming),
        }
    }

    fn push(&mut self, message: Message) -> Uuid {
        let entry = ChatMessage::new(message);
        let id = entry.id;
        self.messages.push(entry);
        self.touch();
        id
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
