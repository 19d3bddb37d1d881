//! Wire types for the Genie backend.
//!
//! Field names follow the backend's JSON. Everything is optional or defaulted
//! so that partially populated records still deserialize.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Messages
// ============================================================================

/// Handle for a submitted question that has not finished yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMessage {
    pub conversation_id: String,
    pub message_id: String,
}

/// Message status values reported by the backend.
pub mod status {
    pub const COMPLETED: &str = "COMPLETED";
    pub const FAILED: &str = "FAILED";
    pub const CANCELLED: &str = "CANCELLED";
    pub const QUERY_RESULT_EXPIRED: &str = "QUERY_RESULT_EXPIRED";
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GenieMessage {
    /// Legacy identifier; newer responses also carry `message_id`.
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub conversation_id: String,
    pub space_id: String,
    /// The user's question text.
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub attachments: Vec<GenieAttachment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<MessageError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_timestamp: Option<i64>,
}

impl GenieMessage {
    /// Preferred identifier, falling back to the legacy one.
    pub fn message_id(&self) -> &str {
        self.message_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .unwrap_or(&self.id)
    }

    pub fn status(&self) -> &str {
        self.status.as_deref().unwrap_or_default()
    }

    pub fn error_text(&self) -> Option<&str> {
        self.error
            .as_ref()
            .and_then(|e| e.error.as_deref())
            .filter(|e| !e.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

// ============================================================================
// Attachments
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GenieAttachment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<QueryAttachment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<TextAttachment>,
}

impl GenieAttachment {
    /// Non-empty text content, if this is a text attachment.
    pub fn text_content(&self) -> Option<&str> {
        self.text
            .as_ref()
            .and_then(|t| t.content.as_deref())
            .filter(|c| !c.is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryAttachment {
    /// Generated SQL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statement_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TextAttachment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

// ============================================================================
// Statement Results
// ============================================================================

/// Response of the attachment query-result and execute-query calls.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryResultDescriptor {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statement_response: Option<StatementResponse>,
}

impl QueryResultDescriptor {
    pub fn statement_id(&self) -> Option<&str> {
        self.statement_response
            .as_ref()
            .and_then(StatementResponse::statement_id)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StatementResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statement_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest: Option<ResultManifest>,
    /// Row data. Kept loose: either `data_array` or `data_typed_array`.
    #[serde(skip_serializing_if = "Value::is_null")]
    pub result: Value,
    /// SQL text, when the backend echoes it back.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statement: Option<String>,
}

impl StatementResponse {
    pub fn statement_id(&self) -> Option<&str> {
        self.statement_id.as_deref().filter(|id| !id.is_empty())
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        self.manifest
            .as_ref()
            .and_then(|m| m.schema.as_ref())
            .map(|s| s.columns.as_slice())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultManifest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<ResultSchema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_row_count: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultSchema {
    pub columns: Vec<ColumnInfo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
}

// ============================================================================
// Spaces & Conversations
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenieSpace {
    pub space_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GenieConversation {
    pub conversation_id: String,
    /// Legacy identifier.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Milliseconds since the Unix epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_timestamp: Option<i64>,
}

impl GenieConversation {
    pub fn conversation_id(&self) -> &str {
        if self.conversation_id.is_empty() {
            &self.id
        } else {
            &self.conversation_id
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct SpacesPage {
    pub spaces: Vec<GenieSpace>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ConversationsPage {
    pub conversations: Vec<GenieConversation>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct MessagesPage {
    pub messages: Vec<GenieMessage>,
    pub next_page_token: Option<String>,
}
