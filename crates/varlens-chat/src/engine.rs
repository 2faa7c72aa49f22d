//! Streaming conversation engine.
//!
//! Applies stream events to a transcript strictly in arrival order. The
//! engine owns the handle of the assistant message currently receiving
//! tokens and guarantees that no message is left streaming once a stream
//! ends, fails or is aborted.

use std::fmt;

use futures::{Stream, StreamExt};
use tracing::{debug, error, info, warn};

use crate::error::ChatError;
use crate::events::StreamEvent;
use crate::transcript::{Conversation, MessageHandle};
use crate::types::{ConversationId, LiteratureResult, QueryResult, ToolPhase, ToolResult};

/// Lifecycle of one submission.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EngineState {
    #[default]
    Idle,
    Streaming,
    Completed,
    Failed(ChatError),
}

impl EngineState {
    pub fn is_streaming(&self) -> bool {
        matches!(self, EngineState::Streaming)
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Idle => write!(f, "idle"),
            EngineState::Streaming => write!(f, "streaming"),
            EngineState::Completed => write!(f, "completed"),
            EngineState::Failed(_) => write!(f, "failed"),
        }
    }
}

/// How a stream ended.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamOutcome {
    Completed {
        rounds: usize,
        messages_added: usize,
    },
    /// Any partial assistant text was finalized and kept in the transcript.
    Failed {
        error: ChatError,
        partial_preserved: bool,
    },
}

impl StreamOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, StreamOutcome::Completed { .. })
    }
}

/// Receives stream progress as it is applied. All methods default to no-ops.
pub trait StreamObserver {
    fn on_conversation_started(&mut self, _id: &ConversationId) {}
    fn on_token(&mut self, _text: &str) {}
    fn on_tool_phase(&mut self, _phase: ToolPhase) {}
    fn on_query_result(&mut self, _result: &QueryResult) {}
    fn on_literature_result(&mut self, _result: &LiteratureResult) {}
    fn on_round_complete(&mut self, _round: usize) {}
    fn on_complete(&mut self) {}
    fn on_error(&mut self, _error: &ChatError) {}
}

/// Observer that ignores everything; used for buffered replies.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl StreamObserver for NoopObserver {}

#[derive(Debug, Default)]
pub struct ConversationEngine {
    state: EngineState,
    open: Option<MessageHandle>,
    pending_tool: Option<ToolPhase>,
    rounds: usize,
    round_active: bool,
    start_len: usize,
    partial: bool,
}

impl ConversationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    /// Enter `Streaming` for a new submission.
    ///
    /// Rejected while a previous stream is still being consumed.
    pub fn start(&mut self, conversation: &Conversation) -> Result<(), ChatError> {
        if self.state.is_streaming() {
            return Err(ChatError::StreamInProgress);
        }
        self.state = EngineState::Streaming;
        self.open = None;
        self.pending_tool = None;
        self.rounds = 0;
        self.round_active = false;
        self.start_len = conversation.len();
        self.partial = false;
        Ok(())
    }

    /// Start and consume `events` to the end.
    pub async fn run_stream<S, O>(
        &mut self,
        conversation: &mut Conversation,
        events: S,
        observer: &mut O,
    ) -> Result<StreamOutcome, ChatError>
    where
        S: Stream<Item = Result<StreamEvent, ChatError>> + Unpin,
        O: StreamObserver + ?Sized,
    {
        self.start(conversation)?;
        Ok(self.consume(conversation, events, observer).await)
    }

    /// Consume `events` after `start`.
    ///
    /// Protocol errors are logged and skipped. Any other error ends the
    /// stream as `Failed`.
    pub async fn consume<S, O>(
        &mut self,
        conversation: &mut Conversation,
        mut events: S,
        observer: &mut O,
    ) -> StreamOutcome
    where
        S: Stream<Item = Result<StreamEvent, ChatError>> + Unpin,
        O: StreamObserver + ?Sized,
    {
        while let Some(item) = events.next().await {
            match item {
                Ok(event) => self.apply(conversation, event, observer),
                Err(ChatError::Protocol(msg)) => {
                    warn!(error = %msg, "Skipping undecodable stream frame");
                }
                Err(err) => return self.fail(conversation, err, observer),
            }
        }
        self.finish(conversation, observer)
    }

    /// Apply one event. Events that violate the protocol are logged and
    /// ignored.
    pub fn apply<O>(
        &mut self,
        conversation: &mut Conversation,
        event: StreamEvent,
        observer: &mut O,
    ) where
        O: StreamObserver + ?Sized,
    {
        if !self.state.is_streaming() {
            warn!(
                event = event.kind(),
                state = %self.state,
                "Event outside an active stream ignored"
            );
            return;
        }

        match event {
            StreamEvent::ConversationStarted { conversation_id } => {
                match conversation.establish_id(conversation_id.clone()) {
                    Ok(true) => {
                        info!(conversation_id = %conversation_id, "Conversation established");
                        observer.on_conversation_started(&conversation_id);
                    }
                    Ok(false) => {
                        debug!(conversation_id = %conversation_id, "Conversation id repeated")
                    }
                    Err(err) => warn!(error = %err, "Ignoring conflicting conversation id"),
                }
            }
            StreamEvent::Token { text } => self.append_token(conversation, &text, observer),
            StreamEvent::QueryingStarted => {
                self.enter_tool_phase(conversation, ToolPhase::DatabaseQuery, observer)
            }
            StreamEvent::LiteratureSearching => {
                self.enter_tool_phase(conversation, ToolPhase::LiteratureSearch, observer)
            }
            StreamEvent::QueryResult(result) => {
                if self.append_tool_result(conversation, ToolResult::Query(result.clone())) {
                    observer.on_query_result(&result);
                }
            }
            StreamEvent::LiteratureResult(result) => {
                if self.append_tool_result(conversation, ToolResult::Literature(result.clone())) {
                    observer.on_literature_result(&result);
                }
            }
            StreamEvent::RoundComplete => {
                self.finalize_open(conversation);
                if let Some(phase) = self.pending_tool.take() {
                    warn!(phase = %phase, "Round completed with a tool phase still pending");
                }
                self.rounds += 1;
                self.round_active = false;
                debug!(round = self.rounds, "Round complete");
                observer.on_round_complete(self.rounds);
            }
        }
    }

    /// Close the stream normally, finalizing anything still open.
    pub fn finish<O>(&mut self, conversation: &mut Conversation, observer: &mut O) -> StreamOutcome
    where
        O: StreamObserver + ?Sized,
    {
        self.close_round(conversation);
        self.state = EngineState::Completed;
        let messages_added = conversation.len().saturating_sub(self.start_len);
        info!(rounds = self.rounds, messages_added, "Stream completed");
        observer.on_complete();
        StreamOutcome::Completed {
            rounds: self.rounds,
            messages_added,
        }
    }

    /// End the stream as failed. Partial assistant text is kept.
    pub fn fail<O>(
        &mut self,
        conversation: &mut Conversation,
        err: ChatError,
        observer: &mut O,
    ) -> StreamOutcome
    where
        O: StreamObserver + ?Sized,
    {
        self.close_round(conversation);
        self.state = EngineState::Failed(err.clone());
        error!(error = %err, partial_preserved = self.partial, "Stream failed");
        observer.on_error(&err);
        StreamOutcome::Failed {
            error: err,
            partial_preserved: self.partial,
        }
    }

    /// Abandon an in-flight stream whose transport the caller has dropped.
    ///
    /// Returns `None` when nothing was streaming.
    pub fn abort(&mut self, conversation: &mut Conversation) -> Option<StreamOutcome> {
        if !self.state.is_streaming() {
            return None;
        }
        info!("Aborting in-flight stream");
        Some(self.fail(conversation, ChatError::Aborted, &mut NoopObserver))
    }

    fn append_token<O>(&mut self, conversation: &mut Conversation, text: &str, observer: &mut O)
    where
        O: StreamObserver + ?Sized,
    {
        if let Some(phase) = self.pending_tool {
            warn!(phase = %phase, "Token received during tool phase ignored");
            return;
        }

        let handle = match self.open.take() {
            Some(handle) => handle,
            None => match conversation.begin_assistant_message() {
                Ok(handle) => handle,
                Err(err) => {
                    warn!(error = %err, "Cannot open assistant message");
                    return;
                }
            },
        };
        match conversation.append_token(&handle, text) {
            Ok(()) => {
                self.round_active = true;
                if !text.is_empty() {
                    self.partial = true;
                }
                observer.on_token(text);
            }
            Err(err) => warn!(error = %err, "Token could not be applied"),
        }
        self.open = Some(handle);
    }

    fn enter_tool_phase<O>(
        &mut self,
        conversation: &mut Conversation,
        phase: ToolPhase,
        observer: &mut O,
    ) where
        O: StreamObserver + ?Sized,
    {
        self.finalize_open(conversation);
        if let Some(previous) = self.pending_tool.replace(phase) {
            warn!(
                previous = %previous,
                phase = %phase,
                "Tool phase started before the previous one produced a result"
            );
        }
        self.round_active = true;
        debug!(phase = %phase, "Tool phase started");
        observer.on_tool_phase(phase);
    }

    /// Returns whether the result landed in the transcript.
    fn append_tool_result(&mut self, conversation: &mut Conversation, result: ToolResult) -> bool {
        let phase = result.phase();
        match self.pending_tool.take() {
            Some(pending) if pending == phase => {}
            Some(pending) => {
                warn!(
                    pending = %pending,
                    received = %phase,
                    "Tool result does not match pending phase"
                );
            }
            None => warn!(received = %phase, "Tool result without a preceding start"),
        }
        self.finalize_open(conversation);
        self.round_active = true;
        match conversation.append_tool_result(result) {
            Ok(_) => true,
            Err(err) => {
                warn!(error = %err, "Tool result could not be applied");
                false
            }
        }
    }

    fn finalize_open(&mut self, conversation: &mut Conversation) {
        if let Some(handle) = self.open.take() {
            if let Err(err) = conversation.finalize_assistant_message(handle) {
                warn!(error = %err, "Failed to finalize assistant message");
            }
        }
    }

    /// Defensive close at stream end: an unterminated round still counts.
    fn close_round(&mut self, conversation: &mut Conversation) {
        self.finalize_open(conversation);
        if let Some(phase) = self.pending_tool.take() {
            warn!(phase = %phase, "Stream ended during a tool phase");
        }
        if self.round_active {
            self.rounds += 1;
            self.round_active = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    use crate::types::Message;

    /// Observer that records every callback as a line.
    #[derive(Default)]
    struct Recorder {
        log: Vec<String>,
    }

    impl StreamObserver for Recorder {
        fn on_conversation_started(&mut self, id: &ConversationId) {
            self.log.push(format!("started:{}", id));
        }
        fn on_token(&mut self, text: &str) {
            self.log.push(format!("token:{}", text));
        }
        fn on_tool_phase(&mut self, phase: ToolPhase) {
            self.log.push(format!("phase:{:?}", phase));
        }
        fn on_query_result(&mut self, result: &QueryResult) {
            self.log.push(format!("query:{}", result.sql));
        }
        fn on_literature_result(&mut self, result: &LiteratureResult) {
            self.log.push(format!("literature:{}", result.articles.len()));
        }
        fn on_round_complete(&mut self, round: usize) {
            self.log.push(format!("round:{}", round));
        }
        fn on_complete(&mut self) {
            self.log.push("complete".into());
        }
        fn on_error(&mut self, error: &ChatError) {
            self.log.push(format!("error:{}", error));
        }
    }

    fn token(text: &str) -> Result<StreamEvent, ChatError> {
        Ok(StreamEvent::Token { text: text.into() })
    }

    fn query(sql: &str) -> Result<StreamEvent, ChatError> {
        Ok(StreamEvent::QueryResult(QueryResult {
            sql: sql.into(),
            ..Default::default()
        }))
    }

    async fn run(
        events: Vec<Result<StreamEvent, ChatError>>,
    ) -> (Conversation, ConversationEngine, StreamOutcome, Recorder) {
        let mut conv = Conversation::new(None);
        conv.append_user_message("question");
        let mut engine = ConversationEngine::new();
        let mut recorder = Recorder::default();
        let outcome = engine
            .run_stream(&mut conv, stream::iter(events), &mut recorder)
            .await
            .unwrap();
        (conv, engine, outcome, recorder)
    }

    fn roles(conv: &Conversation) -> Vec<&'static str> {
        conv.messages().iter().map(|m| m.message.role()).collect()
    }

    fn text(conv: &Conversation, index: usize) -> &str {
        conv.messages()[index].message.text().unwrap_or_default()
    }

    // ---- Token ordering ----

    #[tokio::test]
    async fn test_tokens_build_one_message() {
        let (conv, engine, outcome, recorder) = run(vec![
            Ok(StreamEvent::ConversationStarted {
                conversation_id: ConversationId::new("c1"),
            }),
            token("Hel"),
            token("lo"),
            Ok(StreamEvent::RoundComplete),
        ])
        .await;

        assert_eq!(roles(&conv), vec!["user", "assistant"]);
        assert_eq!(text(&conv, 1), "Hello");
        assert!(conv.streaming_message().is_none());
        assert_eq!(conv.id, Some(ConversationId::new("c1")));
        assert_eq!(*engine.state(), EngineState::Completed);
        assert_eq!(
            outcome,
            StreamOutcome::Completed {
                rounds: 1,
                messages_added: 1
            }
        );
        assert_eq!(
            recorder.log,
            vec!["started:c1", "token:Hel", "token:lo", "round:1", "complete"]
        );
    }

    // ---- Tool phases ----

    #[tokio::test]
    async fn test_tool_round_leaves_no_empty_assistant_message() {
        let (conv, _, outcome, recorder) = run(vec![
            Ok(StreamEvent::QueryingStarted),
            query("SELECT 1"),
            Ok(StreamEvent::RoundComplete),
            token("Done"),
            Ok(StreamEvent::RoundComplete),
        ])
        .await;

        assert_eq!(roles(&conv), vec!["user", "query_result", "assistant"]);
        assert_eq!(text(&conv, 2), "Done");
        assert_eq!(
            outcome,
            StreamOutcome::Completed {
                rounds: 2,
                messages_added: 2
            }
        );
        assert_eq!(
            recorder.log,
            vec![
                "phase:DatabaseQuery",
                "query:SELECT 1",
                "round:1",
                "token:Done",
                "round:2",
                "complete"
            ]
        );
    }

    #[tokio::test]
    async fn test_tool_phase_finalizes_open_text() {
        let (conv, _, _, _) = run(vec![
            token("Let me check."),
            Ok(StreamEvent::LiteratureSearching),
            Ok(StreamEvent::LiteratureResult(LiteratureResult::default())),
            token("Found none."),
        ])
        .await;

        assert_eq!(
            roles(&conv),
            vec!["user", "assistant", "literature_result", "assistant"]
        );
        assert_eq!(text(&conv, 1), "Let me check.");
        assert_eq!(text(&conv, 3), "Found none.");
        assert!(conv.messages().iter().all(|m| !m.message.is_streaming()));
    }

    #[tokio::test]
    async fn test_token_during_tool_phase_is_ignored() {
        let (conv, _, _, recorder) = run(vec![
            Ok(StreamEvent::QueryingStarted),
            token("stray"),
            query("SELECT 2"),
        ])
        .await;

        assert_eq!(roles(&conv), vec!["user", "query_result"]);
        assert!(!recorder.log.iter().any(|l| l == "token:stray"));
    }

    #[tokio::test]
    async fn test_result_without_start_is_still_appended() {
        let (conv, _, _, _) = run(vec![query("SELECT 3")]).await;
        assert_eq!(roles(&conv), vec!["user", "query_result"]);
    }

    // ---- Defensive finalize ----

    #[tokio::test]
    async fn test_stream_end_without_round_complete_finalizes() {
        let (conv, engine, outcome, _) = run(vec![token("abc")]).await;

        let last = conv.messages().last().unwrap();
        assert_eq!(
            last.message,
            Message::Assistant {
                content: "abc".into(),
                is_streaming: false
            }
        );
        assert_eq!(*engine.state(), EngineState::Completed);
        assert_eq!(
            outcome,
            StreamOutcome::Completed {
                rounds: 1,
                messages_added: 1
            }
        );
    }

    #[tokio::test]
    async fn test_empty_stream_completes_with_no_rounds() {
        let (conv, _, outcome, _) = run(vec![]).await;
        assert_eq!(roles(&conv), vec!["user"]);
        assert_eq!(
            outcome,
            StreamOutcome::Completed {
                rounds: 0,
                messages_added: 0
            }
        );
    }

    // ---- Failures ----

    #[tokio::test]
    async fn test_transport_error_preserves_partial_text() {
        let (conv, engine, outcome, recorder) = run(vec![
            token("partial ans"),
            Err(ChatError::Transport("connection reset".into())),
            token("never applied"),
        ])
        .await;

        assert_eq!(roles(&conv), vec!["user", "assistant"]);
        assert_eq!(text(&conv, 1), "partial ans");
        assert!(conv.streaming_message().is_none());
        assert!(matches!(engine.state(), EngineState::Failed(ChatError::Transport(_))));
        assert_eq!(
            outcome,
            StreamOutcome::Failed {
                error: ChatError::Transport("connection reset".into()),
                partial_preserved: true
            }
        );
        assert_eq!(
            recorder.log.last().map(String::as_str),
            Some("error:transport error: connection reset")
        );
    }

    #[tokio::test]
    async fn test_error_before_any_token_has_no_partial() {
        let (conv, _, outcome, _) =
            run(vec![Err(ChatError::Transport("refused".into()))]).await;
        assert_eq!(roles(&conv), vec!["user"]);
        assert!(matches!(
            outcome,
            StreamOutcome::Failed {
                partial_preserved: false,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_protocol_errors_are_skipped() {
        let (conv, _, outcome, _) = run(vec![
            token("a"),
            Err(ChatError::Protocol("unknown event type 'ping'".into())),
            token("b"),
        ])
        .await;

        assert_eq!(text(&conv, 1), "ab");
        assert!(outcome.is_completed());
    }

    #[tokio::test]
    async fn test_conflicting_conversation_id_is_ignored() {
        let (conv, _, _, recorder) = run(vec![
            Ok(StreamEvent::ConversationStarted {
                conversation_id: ConversationId::new("c1"),
            }),
            Ok(StreamEvent::ConversationStarted {
                conversation_id: ConversationId::new("c2"),
            }),
        ])
        .await;

        assert_eq!(conv.id, Some(ConversationId::new("c1")));
        assert_eq!(recorder.log, vec!["started:c1", "complete"]);
    }

    // ---- Lifecycle ----

    #[tokio::test]
    async fn test_start_rejected_while_streaming() {
        let mut conv = Conversation::new(None);
        let mut engine = ConversationEngine::new();
        engine.start(&conv).unwrap();
        assert_eq!(engine.start(&conv), Err(ChatError::StreamInProgress));

        let result = engine
            .run_stream(&mut conv, stream::iter(vec![token("x")]), &mut NoopObserver)
            .await;
        assert_eq!(result, Err(ChatError::StreamInProgress));
        assert!(conv.is_empty());
    }

    #[test]
    fn test_abort_finalizes_open_message() {
        let mut conv = Conversation::new(None);
        let mut engine = ConversationEngine::new();
        engine.start(&conv).unwrap();
        engine.apply(
            &mut conv,
            StreamEvent::Token { text: "half".into() },
            &mut NoopObserver,
        );
        assert!(conv.streaming_message().is_some());

        let outcome = engine.abort(&mut conv).unwrap();
        assert_eq!(
            outcome,
            StreamOutcome::Failed {
                error: ChatError::Aborted,
                partial_preserved: true
            }
        );
        assert!(conv.streaming_message().is_none());
        assert_eq!(*engine.state(), EngineState::Failed(ChatError::Aborted));
        assert_eq!(engine.abort(&mut conv), None);
    }

    #[tokio::test]
    async fn test_engine_restarts_after_completion() {
        let mut conv = Conversation::new(None);
        let mut engine = ConversationEngine::new();
        engine
            .run_stream(&mut conv, stream::iter(vec![token("one")]), &mut NoopObserver)
            .await
            .unwrap();
        let outcome = engine
            .run_stream(&mut conv, stream::iter(vec![token("two")]), &mut NoopObserver)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            StreamOutcome::Completed {
                rounds: 1,
                messages_added: 1
            }
        );
        assert_eq!(conv.len(), 2);
    }

    #[test]
    fn test_event_outside_stream_is_ignored() {
        let mut conv = Conversation::new(None);
        let mut engine = ConversationEngine::new();
        engine.apply(
            &mut conv,
            StreamEvent::Token { text: "late".into() },
            &mut NoopObserver,
        );
        assert!(conv.is_empty());
    }
}
