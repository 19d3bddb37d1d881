//! The backend contract consumed by the orchestrator.

use std::time::Duration;

use async_trait::async_trait;

use super::error::GenieError;
use super::types::{
    GenieConversation, GenieMessage, GenieSpace, PendingMessage, QueryResultDescriptor,
    StatementResponse,
};

// ============================================================================
// GenieApi Trait
// ============================================================================

/// Operations offered by the Genie backend.
///
/// Implementations make a single attempt per call; retries and timeouts are
/// applied by the caller.
#[async_trait]
pub trait GenieApi: Send + Sync {
    /// Open a new conversation with its first question.
    async fn start_conversation(
        &self,
        space_id: &str,
        question: &str,
    ) -> Result<PendingMessage, GenieError>;

    /// Post a follow-up question to an existing conversation.
    async fn create_message(
        &self,
        space_id: &str,
        conversation_id: &str,
        question: &str,
    ) -> Result<PendingMessage, GenieError>;

    /// Block until the pending message resolves.
    ///
    /// Returns `OperationFailed` if the backend reports failure and `Timeout`
    /// once `timeout` has passed.
    async fn wait_for_message(
        &self,
        space_id: &str,
        pending: &PendingMessage,
        timeout: Duration,
    ) -> Result<GenieMessage, GenieError>;

    async fn get_message(
        &self,
        space_id: &str,
        conversation_id: &str,
        message_id: &str,
    ) -> Result<GenieMessage, GenieError>;

    async fn get_statement(&self, statement_id: &str) -> Result<StatementResponse, GenieError>;

    async fn get_attachment_query_result(
        &self,
        space_id: &str,
        conversation_id: &str,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<QueryResultDescriptor, GenieError>;

    /// Run the attachment's SQL again, producing a fresh statement.
    async fn execute_attachment_query(
        &self,
        space_id: &str,
        conversation_id: &str,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<QueryResultDescriptor, GenieError>;

    async fn list_spaces(&self) -> Result<Vec<GenieSpace>, GenieError>;

    async fn get_space(&self, space_id: &str) -> Result<GenieSpace, GenieError>;

    async fn list_conversations(&self, space_id: &str)
    -> Result<Vec<GenieConversation>, GenieError>;

    async fn list_conversation_messages(
        &self,
        space_id: &str,
        conversation_id: &str,
    ) -> Result<Vec<GenieMessage>, GenieError>;
}
