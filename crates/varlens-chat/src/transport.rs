//! Transport for the conversation stream.
//!
//! `ChatTransport` opens one stream per submission. The HTTP implementation
//! posts the request and turns the server-sent event body into typed events.

use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use reqwest::header::ACCEPT;
use tracing::{debug, instrument};

use varlens_core::config::{BackendConfig, ChatConfig};

use crate::decoder::{SseDecoder, SseFrame};
use crate::error::ChatError;
use crate::events::{decode_frame, Decoded, StreamEvent};
use crate::types::ChatRequest;

/// Typed stream of conversation events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, ChatError>> + Send>>;

#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn open_stream(&self, request: &ChatRequest) -> Result<EventStream, ChatError>;
}

/// `ChatTransport` over `POST {base_url}{stream_path}`.
#[derive(Debug, Clone)]
pub struct HttpChatTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpChatTransport {
    /// The request timeout only bounds connecting; a stream may run longer.
    pub fn new(backend: &BackendConfig, chat: &ChatConfig) -> Result<Self, ChatError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(backend.request_timeout_secs))
            .build()
            .map_err(|e| ChatError::Transport(e.to_string()))?;
        Ok(Self::with_client(client, backend, chat))
    }

    pub fn with_client(
        client: reqwest::Client,
        backend: &BackendConfig,
        chat: &ChatConfig,
    ) -> Self {
        let base = backend.base_url.trim().trim_end_matches('/');
        let path = chat.stream_path.trim();
        let url = if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        };
        Self { client, url }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ChatTransport for HttpChatTransport {
    #[instrument(level = "debug", skip_all, fields(url = %self.url))]
    async fn open_stream(&self, request: &ChatRequest) -> Result<EventStream, ChatError> {
        let response = self
            .client
            .post(&self.url)
            .header(ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Status {
                status: status.as_u16(),
                body,
            });
        }
        debug!(status = status.as_u16(), "Conversation stream opened");
        Ok(decode_event_stream(response.bytes_stream()))
    }
}

/// Decode a raw byte stream of server-sent events into typed events.
///
/// A read error is yielded once and ends the stream. A `[DONE]` frame ends
/// the stream without reading further. Undecodable frames surface as
/// `ChatError::Protocol` items the consumer may skip.
pub fn decode_event_stream<S, B, E>(bytes: S) -> EventStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let state = DecodeState {
        bytes: Box::pin(bytes),
        decoder: SseDecoder::new(),
        queue: VecDeque::new(),
        done: false,
    };
    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.queue.pop_front() {
                return Some((item, state));
            }
            if state.done {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let frames = state.decoder.push(chunk.as_ref());
                    state.enqueue(frames);
                }
                Some(Err(err)) => {
                    state.queue.push_back(Err(ChatError::Transport(err.to_string())));
                    state.done = true;
                }
                None => {
                    let frames = state.decoder.finish().into_iter().collect();
                    state.enqueue(frames);
                    state.done = true;
                }
            }
        }
    }))
}

struct DecodeState<S> {
    bytes: Pin<Box<S>>,
    decoder: SseDecoder,
    queue: VecDeque<Result<StreamEvent, ChatError>>,
    done: bool,
}

impl<S> DecodeState<S> {
    fn enqueue(&mut self, frames: Vec<SseFrame>) {
        for frame in frames {
            if self.done {
                break;
            }
            match decode_frame(&frame) {
                Ok(Decoded::Event(event)) => self.queue.push_back(Ok(event)),
                Ok(Decoded::Done) => {
                    debug!("End-of-stream sentinel received");
                    self.done = true;
                }
                Err(err) => self.queue.push_back(Err(err)),
            }
        }
    }
}
