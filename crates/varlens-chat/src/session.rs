//! Chat session: one conversation, its engine and a transport.

use tracing::{info, warn};

use varlens_core::types::SessionId;

use crate::engine::{
    ConversationEngine, EngineState, NoopObserver, StreamObserver, StreamOutcome,
};
use crate::error::ChatError;
use crate::transcript::Conversation;
use crate::transport::ChatTransport;
use crate::types::{ChatMessage, ChatRequest, ConversationId, Metadata};

/// Result of a non-streaming submission.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferedReply {
    pub outcome: StreamOutcome,
    /// Messages the reply added, excluding the user message.
    pub messages: Vec<ChatMessage>,
}

/// Conversation state scoped to one analysis session.
pub struct ChatSession<T: ChatTransport> {
    transport: T,
    conversation: Conversation,
    engine: ConversationEngine,
    max_message_length: usize,
}

impl<T: ChatTransport> ChatSession<T> {
    pub fn new(transport: T, session_id: Option<SessionId>, max_message_length: usize) -> Self {
        Self {
            transport,
            conversation: Conversation::new(session_id),
            engine: ConversationEngine::new(),
            max_message_length,
        }
    }

    /// Continue a conversation the service already knows.
    pub fn resume(mut self, conversation_id: ConversationId) -> Self {
        let session_id = self.conversation.session_id.take();
        self.conversation = Conversation::resume(conversation_id, session_id);
        self
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn state(&self) -> &EngineState {
        self.engine.state()
    }

    /// Submit a message and stream the reply into the transcript.
    ///
    /// Validation failures and a stream already in progress are returned as
    /// errors before anything is appended. Transport failures are reported
    /// through the observer and a `Failed` outcome.
    pub async fn send<O>(
        &mut self,
        message: &str,
        metadata: Option<Metadata>,
        observer: &mut O,
    ) -> Result<StreamOutcome, ChatError>
    where
        O: StreamObserver + ?Sized,
    {
        let message = self.validate(message)?;
        self.engine.start(&self.conversation)?;
        self.conversation.append_user_message(message.clone());

        let request = ChatRequest {
            message,
            conversation_id: self.conversation.id.clone(),
            session_id: self.conversation.session_id.clone(),
            metadata: metadata.filter(|m| !m.is_empty()),
        };
        info!(
            conversation_id = request.conversation_id.as_ref().map(|id| id.as_str()),
            session_id = request.session_id.as_ref().map(|id| id.as_str()),
            "Submitting chat message"
        );

        match self.transport.open_stream(&request).await {
            Ok(events) => Ok(self.engine.consume(&mut self.conversation, events, observer).await),
            Err(err) => Ok(self.engine.fail(&mut self.conversation, err, observer)),
        }
    }

    /// Submit a message and return the whole reply once the stream ends.
    pub async fn send_buffered(
        &mut self,
        message: &str,
        metadata: Option<Metadata>,
    ) -> Result<BufferedReply, ChatError> {
        let before = self.conversation.len();
        let outcome = self.send(message, metadata, &mut NoopObserver).await?;
        // skip the user message appended by send
        let messages = self
            .conversation
            .messages()
            .iter()
            .skip(before + 1)
            .cloned()
            .collect();
        Ok(BufferedReply { outcome, messages })
    }

    /// Abandon a stream whose `send` future was dropped.
    pub fn abort(&mut self) -> Option<StreamOutcome> {
        self.engine.abort(&mut self.conversation)
    }

    /// Start a fresh provisional conversation for `session_id`.
    pub fn reset_for_session(&mut self, session_id: Option<SessionId>) {
        if self.abort().is_some() {
            warn!("Stream aborted by session change");
        }
        info!(
            session_id = session_id.as_ref().map(|id| id.as_str()),
            "Conversation reset for session"
        );
        self.conversation = Conversation::new(session_id);
        self.engine = ConversationEngine::new();
    }

    fn validate(&self, message: &str) -> Result<String, ChatError> {
        let trimmed = message.trim();
        if trimmed.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if trimmed.chars().count() > self.max_message_length {
            return Err(ChatError::MessageTooLong(self.max_message_length));
        }
        Ok(trimmed.to_string())
    }
}
