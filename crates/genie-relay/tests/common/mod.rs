//! Common test utilities.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use genie_relay::config::Config;
use genie_relay::genie::{
    ColumnInfo, GenieApi, GenieAttachment, GenieConversation, GenieError, GenieMessage,
    GenieSpace, PendingMessage, QueryAttachment, QueryResultDescriptor, ResultManifest,
    ResultSchema, StatementResponse, TextAttachment,
};
use genie_relay::orchestrator::QueryOrchestrator;
use genie_relay::retry::{RetryExecutor, RetryPolicy};
use genie_relay::service::GenieService;

// ============================================================================
// Script
// ============================================================================

/// Queued responses for one backend operation.
///
/// Queued entries are consumed in order; once empty, the fallback (if any) is
/// returned on every call, otherwise a 404 `ApiError`.
pub struct Script<T> {
    queue: Mutex<VecDeque<Result<T, GenieError>>>,
    fallback: Mutex<Option<T>>,
    calls: Mutex<usize>,
}

impl<T> Default for Script<T> {
    fn default() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(None),
            calls: Mutex::new(0),
        }
    }
}

impl<T: Clone> Script<T> {
    pub fn push_ok(&self, value: T) -> &Self {
        self.queue.lock().unwrap().push_back(Ok(value));
        self
    }

    pub fn push_err(&self, err: GenieError) -> &Self {
        self.queue.lock().unwrap().push_back(Err(err));
        self
    }

    pub fn always(&self, value: T) -> &Self {
        *self.fallback.lock().unwrap() = Some(value);
        self
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }

    fn next(&self, operation: &str) -> Result<T, GenieError> {
        *self.calls.lock().unwrap() += 1;
        if let Some(queued) = self.queue.lock().unwrap().pop_front() {
            return queued;
        }
        match self.fallback.lock().unwrap().clone() {
            Some(value) => Ok(value),
            None => Err(GenieError::from_status(404, format!("{operation} not scripted"))),
        }
    }
}

// ============================================================================
// FakeGenie
// ============================================================================

/// Scripted in-memory backend.
#[derive(Default)]
pub struct FakeGenie {
    pub start_conversation: Script<PendingMessage>,
    pub create_message: Script<PendingMessage>,
    pub wait: Script<GenieMessage>,
    pub message: Script<GenieMessage>,
    pub statement: Script<StatementResponse>,
    pub query_result: Script<QueryResultDescriptor>,
    pub execute_query: Script<QueryResultDescriptor>,
    pub spaces: Script<Vec<GenieSpace>>,
    pub conversations: Script<Vec<GenieConversation>>,
    pub messages: Script<Vec<GenieMessage>>,
    /// Sleep this long inside `wait_for_message` before answering.
    pub wait_delay: Mutex<Option<Duration>>,
    /// Questions in submission order.
    pub questions: Mutex<Vec<String>>,
    /// Conversation ids passed to `create_message`.
    pub followups: Mutex<Vec<String>>,
}

impl FakeGenie {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A backend that answers every question in `conv-1` with `message`.
    pub fn answering(message: GenieMessage) -> Arc<Self> {
        let fake = Self::default();
        let pending = pending("conv-1", "msg-1");
        fake.start_conversation.always(pending.clone());
        fake.create_message.always(pending);
        fake.wait.always(message.clone());
        fake.message.always(message);
        Arc::new(fake)
    }

    pub fn questions(&self) -> Vec<String> {
        self.questions.lock().unwrap().clone()
    }

    pub fn followups(&self) -> Vec<String> {
        self.followups.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenieApi for FakeGenie {
    async fn start_conversation(
        &self,
        _space_id: &str,
        question: &str,
    ) -> Result<PendingMessage, GenieError> {
        self.questions.lock().unwrap().push(question.to_string());
        self.start_conversation.next("start_conversation")
    }

    async fn create_message(
        &self,
        _space_id: &str,
        conversation_id: &str,
        question: &str,
    ) -> Result<PendingMessage, GenieError> {
        self.questions.lock().unwrap().push(question.to_string());
        self.followups.lock().unwrap().push(conversation_id.to_string());
        self.create_message.next("create_message")
    }

    async fn wait_for_message(
        &self,
        _space_id: &str,
        _pending: &PendingMessage,
        _timeout: Duration,
    ) -> Result<GenieMessage, GenieError> {
        let delay = *self.wait_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.wait.next("wait_for_message")
    }

    async fn get_message(
        &self,
        _space_id: &str,
        _conversation_id: &str,
        _message_id: &str,
    ) -> Result<GenieMessage, GenieError> {
        self.message.next("get_message")
    }

    async fn get_statement(&self, _statement_id: &str) -> Result<StatementResponse, GenieError> {
        self.statement.next("get_statement")
    }

    async fn get_attachment_query_result(
        &self,
        _space_id: &str,
        _conversation_id: &str,
        _message_id: &str,
        _attachment_id: &str,
    ) -> Result<QueryResultDescriptor, GenieError> {
        self.query_result.next("get_attachment_query_result")
    }

    async fn execute_attachment_query(
        &self,
        _space_id: &str,
        _conversation_id: &str,
        _message_id: &str,
        _attachment_id: &str,
    ) -> Result<QueryResultDescriptor, GenieError> {
        self.execute_query.next("execute_attachment_query")
    }

    async fn list_spaces(&self) -> Result<Vec<GenieSpace>, GenieError> {
        self.spaces.next("list_spaces")
    }

    async fn get_space(&self, space_id: &str) -> Result<GenieSpace, GenieError> {
        let spaces = self.spaces.next("get_space")?;
        spaces
            .into_iter()
            .find(|s| s.space_id == space_id)
            .ok_or_else(|| GenieError::from_status(404, format!("space {space_id} not found")))
    }

    async fn list_conversations(
        &self,
        _space_id: &str,
    ) -> Result<Vec<GenieConversation>, GenieError> {
        self.conversations.next("list_conversations")
    }

    async fn list_conversation_messages(
        &self,
        _space_id: &str,
        _conversation_id: &str,
    ) -> Result<Vec<GenieMessage>, GenieError> {
        self.messages.next("list_conversation_messages")
    }
}

// ============================================================================
// Builders
// ============================================================================

pub fn pending(conversation_id: &str, message_id: &str) -> PendingMessage {
    PendingMessage {
        conversation_id: conversation_id.to_string(),
        message_id: message_id.to_string(),
    }
}

pub fn text_message(text: &str) -> GenieMessage {
    GenieMessage {
        id: "msg-1".into(),
        conversation_id: "conv-1".into(),
        status: Some("COMPLETED".into()),
        attachments: vec![GenieAttachment {
            attachment_id: Some("att-text".into()),
            text: Some(TextAttachment {
                content: Some(text.to_string()),
            }),
            query: None,
        }],
        ..GenieMessage::default()
    }
}

pub fn query_message(statement_id: Option<&str>) -> GenieMessage {
    GenieMessage {
        id: "msg-1".into(),
        conversation_id: "conv-1".into(),
        status: Some("COMPLETED".into()),
        attachments: vec![GenieAttachment {
            attachment_id: Some("att-q".into()),
            query: Some(QueryAttachment {
                query: Some("SELECT region, total FROM sales".into()),
                description: Some("Sales by region".into()),
                statement_id: statement_id.map(str::to_string),
                ..QueryAttachment::default()
            }),
            text: None,
        }],
        ..GenieMessage::default()
    }
}

pub fn statement(statement_id: &str, columns: &[(&str, &str)], result: Value) -> StatementResponse {
    StatementResponse {
        statement_id: Some(statement_id.to_string()),
        manifest: Some(ResultManifest {
            schema: Some(ResultSchema {
                columns: columns
                    .iter()
                    .enumerate()
                    .map(|(i, (name, type_name))| ColumnInfo {
                        name: name.to_string(),
                        type_name: Some(type_name.to_string()),
                        position: Some(i as u32),
                    })
                    .collect(),
            }),
            total_row_count: None,
        }),
        result,
        statement: None,
    }
}

pub fn sales_statement(statement_id: &str) -> StatementResponse {
    statement(
        statement_id,
        &[("region", "STRING"), ("total", "DECIMAL")],
        json!({"data_array": [["EMEA", "1234.5"], ["APAC", "99"]]}),
    )
}

pub fn descriptor(statement_id: Option<&str>) -> QueryResultDescriptor {
    QueryResultDescriptor {
        statement_response: Some(StatementResponse {
            statement_id: statement_id.map(str::to_string),
            ..StatementResponse::default()
        }),
    }
}

pub fn space(space_id: &str, title: &str) -> GenieSpace {
    GenieSpace {
        space_id: space_id.to_string(),
        title: title.to_string(),
        description: None,
    }
}

// ============================================================================
// Wiring
// ============================================================================

/// Fast retries so paused-time tests stay short.
pub fn test_retry() -> RetryExecutor {
    RetryExecutor::new(
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
        },
        8,
    )
}

pub fn orchestrator(api: Arc<FakeGenie>) -> QueryOrchestrator {
    QueryOrchestrator::new(api, test_retry(), false)
}

pub fn test_config() -> Config {
    Config::parse(
        r#"
genie:
  space_id: space-1
retry:
  max_attempts: 3
  base_delay_seconds: 0.01
admission:
  min_interval_seconds: 2
  dedup_window_seconds: 8
"#,
    )
    .unwrap()
}

pub fn service(api: Arc<FakeGenie>) -> GenieService {
    GenieService::new(api, &test_config())
}
