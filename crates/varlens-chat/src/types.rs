use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use varlens_core::types::{LiteratureArticle, SessionId};

/// Free-form request metadata forwarded to the conversation service.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

// =============================================================================
// Identifiers
// =============================================================================

/// Server-assigned identifier of a conversation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Tool results
// =============================================================================

/// Result of a database query the assistant ran mid-reply.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    #[serde(default)]
    pub sql: String,
    /// Result rows as returned by the service.
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub rows_returned: u64,
    #[serde(default)]
    pub execution_time_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Chart specification, passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visualization: Option<serde_json::Value>,
}

/// Result of a literature search the assistant ran mid-reply.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LiteratureResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default)]
    pub articles: Vec<LiteratureArticle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// A completed tool result ready to be appended to a transcript.
#[derive(Clone, Debug, PartialEq)]
pub enum ToolResult {
    Query(QueryResult),
    Literature(LiteratureResult),
}

impl ToolResult {
    pub fn phase(&self) -> ToolPhase {
        match self {
            ToolResult::Query(_) => ToolPhase::DatabaseQuery,
            ToolResult::Literature(_) => ToolPhase::LiteratureSearch,
        }
    }
}

/// Tool the assistant is running between text rounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolPhase {
    DatabaseQuery,
    LiteratureSearch,
}

impl fmt::Display for ToolPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolPhase::DatabaseQuery => write!(f, "querying database"),
            ToolPhase::LiteratureSearch => write!(f, "searching literature"),
        }
    }
}

// =============================================================================
// Messages
// =============================================================================

/// Content of one transcript entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    User {
        content: String,
    },
    Assistant {
        content: String,
        is_streaming: bool,
    },
    QueryResult(QueryResult),
    LiteratureResult(LiteratureResult),
}

impl Message {
    pub fn role(&self) -> &'static str {
        match self {
            Message::User { .. } => "user",
            Message::Assistant { .. } => "assistant",
            Message::QueryResult(_) => "query_result",
            Message::LiteratureResult(_) => "literature_result",
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(
            self,
            Message::Assistant {
                is_streaming: true,
                ..
            }
        )
    }

    /// Text of a user or assistant message.
    pub fn text(&self) -> Option<&str> {
        match self {
            Message::User { content } | Message::Assistant { content, .. } => Some(content),
            _ => None,
        }
    }
}

impl From<ToolResult> for Message {
    fn from(result: ToolResult) -> Self {
        match result {
            ToolResult::Query(r) => Message::QueryResult(r),
            ToolResult::Literature(r) => Message::LiteratureResult(r),
        }
    }
}

/// A transcript entry with its identity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub message: Message,
}

impl ChatMessage {
    pub fn new(message: Message) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            message,
        }
    }
}

// =============================================================================
// Requests
// =============================================================================

/// Body of a streaming chat request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}
