//! Question resolution against the Genie backend.
//!
//! `Submitted → AwaitingCompletion → {Failed | TimedOut | Completed}`, then
//! `Completed → FetchingMessage → {Text | ResolvingStatement}` and finally
//! `ResolvingStatement → {Table | Error}`. Every path ends in exactly one
//! [`GenieAnswer`]; errors from the backend never escape this module.

mod answer;
mod resolve;

pub use answer::{Column, GenieAnswer, PayloadError, TableAnswer, extract_rows};

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::genie::{GenieApi, GenieAttachment, GenieError, GenieMessage, PendingMessage, QueryAttachment};
use crate::retry::RetryExecutor;
use resolve::{StatementResolver, StatementTarget};

// ============================================================================
// Constants
// ============================================================================

/// Floor for the completion wait.
const MIN_WAIT: Duration = Duration::from_secs(5);

/// Slack between the backend wait and the outer wall-clock guard.
const WAIT_GRACE: Duration = Duration::from_secs(5);

pub const NO_DATA_TEXT: &str = "_No data available._";

const TIMEOUT_TEXT: &str = "Genie timed out before completing the request. Try increasing your \
     `timeout` or `query_timeout` limits (for example `timeout=120 query_timeout=300`).";

const ACCESS_HINT: &str = " Please verify that the service principal has access to the Genie \
     space and underlying data.";

const RECOVERY_HINT: &str = "- Try fewer columns/rows: `cols=10 rows=50`\n\
     - Increase timeouts: `timeout=120 query_timeout=300`\n\
     - Ask a more specific question";

// ============================================================================
// Request / Resolution
// ============================================================================

/// One question, with everything the orchestrator needs passed by value.
#[derive(Debug, Clone, Copy)]
pub struct QueryRequest<'a> {
    pub question: &'a str,
    pub space_id: &'a str,
    /// Continue this conversation, or start a new one when `None`.
    pub conversation_id: Option<&'a str>,
    /// Budget for submission, message calls and the completion wait.
    pub text_timeout: Duration,
    /// Budget for statement-result calls.
    pub query_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub answer: GenieAnswer,
    /// The conversation the backend confirmed, if submission succeeded.
    pub conversation_id: Option<String>,
}

/// Short identifier tying a user-facing error to its log line.
pub fn new_error_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

// ============================================================================
// QueryOrchestrator
// ============================================================================

/// Stateless resolver; safe to share across tasks.
#[derive(Clone)]
pub struct QueryOrchestrator {
    api: Arc<dyn GenieApi>,
    retry: RetryExecutor,
    access_hint: bool,
}

enum Selection<'m> {
    Query {
        attachment: &'m GenieAttachment,
        query: &'m QueryAttachment,
    },
    Text(&'m str),
    Content,
}

impl QueryOrchestrator {
    /// `access_hint` appends a service-principal access reminder to
    /// backend failure messages.
    pub fn new(api: Arc<dyn GenieApi>, retry: RetryExecutor, access_hint: bool) -> Self {
        Self {
            api,
            retry,
            access_hint,
        }
    }

    pub fn api(&self) -> &Arc<dyn GenieApi> {
        &self.api
    }

    pub fn retry(&self) -> &RetryExecutor {
        &self.retry
    }

    /// Resolve a question into an answer. Never fails.
    pub async fn resolve(&self, request: QueryRequest<'_>) -> Resolution {
        let space_id = request.space_id;

        // Submit
        let pending = match self.submit(&request).await {
            Ok(pending) => pending,
            Err(e) => {
                let error_id = new_error_id();
                error!(
                    error_id = %error_id,
                    space_id = %space_id,
                    conversation_id = ?request.conversation_id,
                    error = %e,
                    "Genie submission failed"
                );
                return Resolution {
                    answer: unexpected_failure(&error_id),
                    conversation_id: None,
                };
            }
        };
        debug!(
            space_id = %space_id,
            conversation_id = %pending.conversation_id,
            message_id = %pending.message_id,
            "Genie message submitted"
        );

        // Await completion
        let message = match self.await_completion(&request, &pending).await {
            Ok(message) => message,
            Err(answer) => {
                return Resolution {
                    answer,
                    conversation_id: Some(pending.conversation_id),
                };
            }
        };

        let conversation_id = if message.conversation_id.is_empty() {
            pending.conversation_id.clone()
        } else {
            message.conversation_id.clone()
        };
        let message_id = match message.message_id() {
            "" => pending.message_id.clone(),
            id => id.to_string(),
        };

        // Fetch the full message
        let api = &self.api;
        let fetched = self
            .retry
            .execute("get_message", request.text_timeout, || {
                api.get_message(space_id, &conversation_id, &message_id)
            })
            .await;
        let message = match fetched {
            Ok(message) => message,
            Err(e) => {
                let error_id = new_error_id();
                error!(
                    error_id = %error_id,
                    space_id = %space_id,
                    conversation_id = %conversation_id,
                    message_id = %message_id,
                    error = %e,
                    "Genie message fetch failed"
                );
                return Resolution {
                    answer: unexpected_failure(&error_id),
                    conversation_id: Some(conversation_id),
                };
            }
        };

        let answer = match select_attachment(&message) {
            Selection::Text(text) => GenieAnswer::text(text),
            Selection::Content => GenieAnswer::text(message.content.clone()),
            Selection::Query { attachment, query } => {
                let target = StatementTarget {
                    space_id,
                    conversation_id: &conversation_id,
                    message_id: &message_id,
                    attachment_id: attachment.attachment_id.as_deref().filter(|a| !a.is_empty()),
                    statement_id: query.statement_id.as_deref().filter(|s| !s.is_empty()),
                    timeout: request.query_timeout,
                };
                self.resolve_table(target, query).await
            }
        };

        info!(
            space_id = %space_id,
            conversation_id = %conversation_id,
            message_id = %message_id,
            outcome = answer_kind(&answer),
            "Genie question resolved"
        );

        Resolution {
            answer,
            conversation_id: Some(conversation_id),
        }
    }

    async fn submit(&self, request: &QueryRequest<'_>) -> Result<PendingMessage, GenieError> {
        let api = &self.api;
        match request.conversation_id {
            None => {
                self.retry
                    .execute("start_conversation", request.text_timeout, || {
                        api.start_conversation(request.space_id, request.question)
                    })
                    .await
            }
            Some(conversation_id) => {
                self.retry
                    .execute("create_message", request.text_timeout, || {
                        api.create_message(request.space_id, conversation_id, request.question)
                    })
                    .await
            }
        }
    }

    /// Wait for the message to resolve, mapping every failure to an answer.
    async fn await_completion(
        &self,
        request: &QueryRequest<'_>,
        pending: &PendingMessage,
    ) -> Result<GenieMessage, GenieAnswer> {
        let wait = request.text_timeout.max(MIN_WAIT);
        let outcome = tokio::time::timeout(
            wait + WAIT_GRACE,
            self.api.wait_for_message(request.space_id, pending, wait),
        )
        .await;

        let err = match outcome {
            Ok(Ok(message)) => return Ok(message),
            Ok(Err(e)) => e,
            Err(_) => GenieError::Timeout(wait),
        };

        let space_id = request.space_id;
        match err {
            GenieError::OperationFailed(detail) => {
                let detail = self.failure_detail(request, pending, detail).await;
                let error_id = new_error_id();
                error!(
                    error_id = %error_id,
                    space_id = %space_id,
                    conversation_id = %pending.conversation_id,
                    message_id = %pending.message_id,
                    error = %detail,
                    "Genie conversation failed"
                );
                Err(GenieAnswer::error(with_error_id(self.failure_text(&detail), &error_id)))
            }
            e if e.is_timeout() => {
                let error_id = new_error_id();
                error!(
                    error_id = %error_id,
                    space_id = %space_id,
                    conversation_id = %pending.conversation_id,
                    message_id = %pending.message_id,
                    timeout_secs = wait.as_secs(),
                    "Genie conversation timed out"
                );
                Err(GenieAnswer::error(with_error_id(TIMEOUT_TEXT, &error_id)))
            }
            e => {
                let raw = e.to_string();
                let detail = self.failure_detail(request, pending, raw.clone()).await;
                let error_id = new_error_id();
                error!(
                    error_id = %error_id,
                    space_id = %space_id,
                    conversation_id = %pending.conversation_id,
                    message_id = %pending.message_id,
                    error = %raw,
                    "Genie conversation wait failed"
                );
                Err(GenieAnswer::error(with_error_id(self.failure_text(&detail), &error_id)))
            }
        }
    }

    /// The failed message's own error text, or `fallback`.
    async fn failure_detail(
        &self,
        request: &QueryRequest<'_>,
        pending: &PendingMessage,
        fallback: String,
    ) -> String {
        let api = &self.api;
        let lookup = self
            .retry
            .execute("get_message", request.text_timeout, || {
                api.get_message(
                    request.space_id,
                    &pending.conversation_id,
                    &pending.message_id,
                )
            })
            .await;
        match lookup {
            Ok(message) => message
                .error_text()
                .map(str::to_string)
                .unwrap_or(fallback),
            Err(e) => {
                warn!(
                    space_id = %request.space_id,
                    conversation_id = %pending.conversation_id,
                    message_id = %pending.message_id,
                    error = %e,
                    "Failure detail lookup failed"
                );
                fallback
            }
        }
    }

    fn failure_text(&self, detail: &str) -> String {
        let mut text = format!("Genie couldn't complete the request: {detail}");
        if self.access_hint {
            text.push_str(ACCESS_HINT);
        }
        text
    }

    async fn resolve_table(&self, target: StatementTarget<'_>, query: &QueryAttachment) -> GenieAnswer {
        let resolver = StatementResolver::new(self.api.as_ref(), &self.retry, target);
        let statement = match resolver.resolve().await {
            Ok(statement) => statement,
            Err(unavailable) => {
                let error_id = new_error_id();
                error!(
                    error_id = %error_id,
                    space_id = %target.space_id,
                    conversation_id = %target.conversation_id,
                    attachment_id = ?target.attachment_id,
                    details = ?unavailable.details,
                    "Query result unavailable"
                );
                return GenieAnswer::error(with_error_id(unavailable.user_message(), &error_id));
            }
        };

        match TableAnswer::from_statement(&statement, query.query.clone(), query.description.clone()) {
            Ok(table) => GenieAnswer::Table(table),
            Err(e) => {
                warn!(
                    space_id = %target.space_id,
                    statement_id = ?statement.statement_id,
                    error = %e,
                    "Malformed statement result"
                );
                GenieAnswer::text(NO_DATA_TEXT)
            }
        }
    }
}

/// Prefer the first query attachment; otherwise the first non-empty text one.
fn select_attachment(message: &GenieMessage) -> Selection<'_> {
    if let Some((attachment, query)) = message
        .attachments
        .iter()
        .find_map(|a| a.query.as_ref().map(|q| (a, q)))
    {
        return Selection::Query { attachment, query };
    }
    match message.attachments.iter().find_map(GenieAttachment::text_content) {
        Some(text) => Selection::Text(text),
        None => Selection::Content,
    }
}

fn unexpected_failure(error_id: &str) -> GenieAnswer {
    GenieAnswer::error(format!(
        "Sorry, I couldn't process that (error `{error_id}`).\n{RECOVERY_HINT}"
    ))
}

/// Append the id that ties a user-facing error to its log line.
fn with_error_id(text: impl Into<String>, error_id: &str) -> String {
    let mut text = text.into();
    text.push_str(&format!("\n_Error id: `{error_id}`_"));
    text
}

fn answer_kind(answer: &GenieAnswer) -> &'static str {
    match answer {
        GenieAnswer::Text { .. } => "text",
        GenieAnswer::Table(_) => "table",
        GenieAnswer::Error { .. } => "error",
    }
}
