//! REST adapter for the Genie backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use super::client::GenieApi;
use super::error::GenieError;
use super::types::{
    ConversationsPage, GenieConversation, GenieMessage, GenieSpace, MessagesPage, PendingMessage,
    QueryResultDescriptor, SpacesPage, StatementResponse, status,
};
use crate::config::{GenieAuth, GenieConfig};
use crate::retry::RetryClass;

// ============================================================================
// Constants
// ============================================================================

const GENIE_API: &str = "/api/2.0/genie/spaces";
const STATEMENTS_API: &str = "/api/2.0/sql/statements";
const TOKEN_PATH: &str = "/oidc/v1/token";
const TOKEN_SCOPE: &str = "all-apis";

/// Refresh OAuth tokens this long before they expire.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Assumed lifetime when the token endpoint omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

// ============================================================================
// HttpGenieClient
// ============================================================================

struct CachedToken {
    access_token: String,
    refresh_at: Instant,
}

/// [`GenieApi`] over the workspace REST API.
pub struct HttpGenieClient {
    client: Client,
    host: String,
    auth: GenieAuth,
    poll_interval: Duration,
    token: Mutex<Option<CachedToken>>,
}

impl HttpGenieClient {
    #[must_use]
    pub fn new(client: Client, host: impl Into<String>, auth: GenieAuth, poll_interval: Duration) -> Self {
        Self {
            client,
            host: host.into().trim_end_matches('/').to_string(),
            auth,
            poll_interval,
            token: Mutex::new(None),
        }
    }

    /// Build a client from configuration. `None` when host or credentials are missing.
    pub fn from_config(client: Client, config: &GenieConfig) -> Option<Self> {
        let host = config.host()?;
        let auth = config.auth()?;
        Some(Self::new(client, host, auth, config.poll_interval()))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.host, path)
    }

    // ------------------------------------------------------------------------
    // Auth
    // ------------------------------------------------------------------------

    async fn bearer(&self) -> Result<String, GenieError> {
        let (client_id, client_secret) = match &self.auth {
            GenieAuth::Token(token) => return Ok(token.clone()),
            GenieAuth::ServicePrincipal {
                client_id,
                client_secret,
            } => (client_id, client_secret),
        };

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref()
            && Instant::now() < token.refresh_at
        {
            return Ok(token.access_token.clone());
        }

        let response = self
            .client
            .post(self.url(TOKEN_PATH))
            .basic_auth(client_id, Some(client_secret))
            .form(&[("grant_type", "client_credentials"), ("scope", TOKEN_SCOPE)])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(GenieError::from_status(status, message));
        }

        let body: TokenResponse = decode(&response.text().await?)?;
        let lifetime = body
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TOKEN_LIFETIME);
        debug!(expires_in_secs = lifetime.as_secs(), "Obtained OAuth access token");

        *cached = Some(CachedToken {
            access_token: body.access_token.clone(),
            refresh_at: Instant::now() + lifetime.saturating_sub(TOKEN_REFRESH_MARGIN),
        });
        Ok(body.access_token)
    }

    // ------------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------------

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, GenieError> {
        let token = self.bearer().await?;
        let response = request
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(GenieError::from_status(status, message));
        }

        decode(&response.text().await?)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, GenieError> {
        self.send(self.client.get(self.url(path)).query(query)).await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, GenieError> {
        self.send(self.client.post(self.url(path)).json(&body)).await
    }

    /// Follow `next_page_token` until exhausted.
    async fn get_all<P, T>(
        &self,
        path: &str,
        split: impl Fn(P) -> (Vec<T>, Option<String>),
    ) -> Result<Vec<T>, GenieError>
    where
        P: DeserializeOwned,
    {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let query: Vec<(&str, &str)> = page_token
                .as_deref()
                .map(|t| vec![("page_token", t)])
                .unwrap_or_default();
            let page: P = self.get(path, &query).await?;
            let (batch, next) = split(page);
            items.extend(batch);
            match next.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => return Ok(items),
            }
        }
    }
}

// ============================================================================
// GenieApi Implementation
// ============================================================================

#[async_trait]
impl GenieApi for HttpGenieClient {
    async fn start_conversation(
        &self,
        space_id: &str,
        question: &str,
    ) -> Result<PendingMessage, GenieError> {
        let response: StartConversationResponse = self
            .post(
                &start_conversation_path(space_id),
                serde_json::json!({ "content": question }),
            )
            .await?;
        response.into_pending()
    }

    async fn create_message(
        &self,
        space_id: &str,
        conversation_id: &str,
        question: &str,
    ) -> Result<PendingMessage, GenieError> {
        let message: GenieMessage = self
            .post(
                &messages_path(space_id, conversation_id),
                serde_json::json!({ "content": question }),
            )
            .await?;
        let message_id = message.message_id();
        if message_id.is_empty() {
            return Err(GenieError::Decode("create-message response has no message id".into()));
        }
        let conversation_id = if message.conversation_id.is_empty() {
            conversation_id.to_string()
        } else {
            message.conversation_id.clone()
        };
        Ok(PendingMessage {
            conversation_id,
            message_id: message_id.to_string(),
        })
    }

    async fn wait_for_message(
        &self,
        space_id: &str,
        pending: &PendingMessage,
        timeout: Duration,
    ) -> Result<GenieMessage, GenieError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self
                .get_message(space_id, &pending.conversation_id, &pending.message_id)
                .await
            {
                Ok(message) => match message.status() {
                    status::COMPLETED => return Ok(message),
                    s @ (status::FAILED | status::CANCELLED | status::QUERY_RESULT_EXPIRED) => {
                        let detail = message
                            .error_text()
                            .map(str::to_string)
                            .unwrap_or_else(|| format!("message {}", s.to_lowercase()));
                        return Err(GenieError::OperationFailed(detail));
                    }
                    other => debug!(
                        message_id = %pending.message_id,
                        status = other,
                        "Waiting for Genie message"
                    ),
                },
                Err(e) if e.is_retryable() => debug!(
                    message_id = %pending.message_id,
                    error = %e,
                    "Transient error while polling message"
                ),
                Err(e) => return Err(e),
            }

            if Instant::now() + self.poll_interval >= deadline {
                return Err(GenieError::Timeout(timeout));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn get_message(
        &self,
        space_id: &str,
        conversation_id: &str,
        message_id: &str,
    ) -> Result<GenieMessage, GenieError> {
        self.get(&message_path(space_id, conversation_id, message_id), &[])
            .await
    }

    async fn get_statement(&self, statement_id: &str) -> Result<StatementResponse, GenieError> {
        self.get(&format!("{}/{}", STATEMENTS_API, statement_id), &[])
            .await
    }

    async fn get_attachment_query_result(
        &self,
        space_id: &str,
        conversation_id: &str,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<QueryResultDescriptor, GenieError> {
        let path = format!(
            "{}/query-result",
            attachment_path(space_id, conversation_id, message_id, attachment_id)
        );
        self.get(&path, &[]).await
    }

    async fn execute_attachment_query(
        &self,
        space_id: &str,
        conversation_id: &str,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<QueryResultDescriptor, GenieError> {
        let path = format!(
            "{}/execute-query",
            attachment_path(space_id, conversation_id, message_id, attachment_id)
        );
        self.post(&path, serde_json::json!({})).await
    }

    async fn list_spaces(&self) -> Result<Vec<GenieSpace>, GenieError> {
        self.get_all(GENIE_API, |page: SpacesPage| (page.spaces, page.next_page_token))
            .await
    }

    async fn get_space(&self, space_id: &str) -> Result<GenieSpace, GenieError> {
        self.get(&space_path(space_id), &[]).await
    }

    async fn list_conversations(
        &self,
        space_id: &str,
    ) -> Result<Vec<GenieConversation>, GenieError> {
        let path = format!("{}/conversations", space_path(space_id));
        self.get_all(&path, |page: ConversationsPage| {
            (page.conversations, page.next_page_token)
        })
        .await
    }

    async fn list_conversation_messages(
        &self,
        space_id: &str,
        conversation_id: &str,
    ) -> Result<Vec<GenieMessage>, GenieError> {
        self.get_all(&messages_path(space_id, conversation_id), |page: MessagesPage| {
            (page.messages, page.next_page_token)
        })
        .await
    }
}

// ============================================================================
// Response Types & Helpers
// ============================================================================

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct StartConversationResponse {
    conversation_id: Option<String>,
    message_id: Option<String>,
    message: Option<GenieMessage>,
}

impl StartConversationResponse {
    fn into_pending(self) -> Result<PendingMessage, GenieError> {
        let message = self.message.unwrap_or_default();
        let conversation_id = self
            .conversation_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| message.conversation_id.clone());
        let message_id = self
            .message_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| message.message_id().to_string());

        if conversation_id.is_empty() || message_id.is_empty() {
            return Err(GenieError::Decode(
                "start-conversation response is missing conversation or message id".into(),
            ));
        }
        Ok(PendingMessage {
            conversation_id,
            message_id,
        })
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, GenieError> {
    serde_json::from_str(body).map_err(|e| GenieError::Decode(e.to_string()))
}

fn space_path(space_id: &str) -> String {
    format!("{}/{}", GENIE_API, space_id)
}

fn start_conversation_path(space_id: &str) -> String {
    format!("{}/start-conversation", space_path(space_id))
}

fn messages_path(space_id: &str, conversation_id: &str) -> String {
    format!(
        "{}/conversations/{}/messages",
        space_path(space_id),
        conversation_id
    )
}

fn message_path(space_id: &str, conversation_id: &str, message_id: &str) -> String {
    format!("{}/{}", messages_path(space_id, conversation_id), message_id)
}

fn attachment_path(
    space_id: &str,
    conversation_id: &str,
    message_id: &str,
    attachment_id: &str,
) -> String {
    format!(
        "{}/attachments/{}",
        message_path(space_id, conversation_id, message_id),
        attachment_id
    )
}
