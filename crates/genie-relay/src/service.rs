//! The question-handling pipeline exposed to front ends.
//!
//! admission → per-user lock → orchestrator → renderer → dedup cache → pages.

use std::sync::Arc;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{Config, SessionsConfig};
use crate::genie::GenieApi;
use crate::orchestrator::{GenieAnswer, QueryOrchestrator, QueryRequest};
use crate::render::{RenderOptions, paginate, render};
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::session::{Admission, SessionStore, fingerprint};

pub const EMPTY_MESSAGE_TEXT: &str = "Send a message to get started. 🙂";
pub const NO_SPACE_TEXT: &str =
    "⚠️ No Genie space is selected. Pick one from the space list first.";
pub const NO_PROMPT_TEXT: &str = "No prompt provided.";

// ============================================================================
// GenieService
// ============================================================================

/// Explicitly constructed service object; clones share all state.
#[derive(Clone)]
pub struct GenieService {
    pub(crate) store: SessionStore,
    pub(crate) admission: Admission,
    pub(crate) orchestrator: QueryOrchestrator,
}

impl GenieService {
    pub fn new(api: Arc<dyn GenieApi>, config: &Config) -> Self {
        let store = SessionStore::new(
            config.limits.defaults,
            config.limits.hard_max,
            config.genie.space_id().map(str::to_string),
        );
        let admission = Admission::from_config(store.clone(), &config.admission);
        let retry = RetryExecutor::new(
            RetryPolicy::from_config(&config.retry),
            config.genie.max_concurrent_calls,
        );
        let orchestrator =
            QueryOrchestrator::new(api, retry, config.genie.uses_service_principal());
        Self {
            store,
            admission,
            orchestrator,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn admission(&self) -> &Admission {
        &self.admission
    }

    pub fn orchestrator(&self) -> &QueryOrchestrator {
        &self.orchestrator
    }

    /// Start periodic idle-session eviction if configured. Returns whether it started.
    pub fn start_session_cleanup(&self, sessions: &SessionsConfig) -> bool {
        let Some(max_idle) = sessions.max_idle() else {
            return false;
        };
        info!(
            max_idle_secs = max_idle.as_secs(),
            interval_secs = sessions.cleanup_interval().as_secs(),
            "Session cleanup enabled"
        );
        self.store
            .clone()
            .spawn_cleanup_task(sessions.cleanup_interval(), max_idle);
        true
    }

    /// Run one question through the whole pipeline.
    ///
    /// Returns the outbound messages in order; each is within the user's
    /// `chars` limit.
    pub async fn handle_question(&self, user_id: &str, text: &str) -> Vec<String> {
        let text = text.trim();
        if text.is_empty() {
            return vec![EMPTY_MESSAGE_TEXT.to_string()];
        }
        let text_hash = fingerprint(text);
        info!(user_id = %user_id, text_hash = %text_hash, "Question received");

        if let Some(remaining) = self.admission.check_rate_limit(user_id) {
            debug!(user_id = %user_id, remaining_ms = remaining.as_millis() as u64, "Rate limited");
            return vec![format!(
                "⏱️ You're sending too fast. Try again in ~{:.1}s.",
                remaining.as_secs_f64()
            )];
        }

        if let Some(cached) = self.admission.check_duplicate(user_id, text) {
            debug!(user_id = %user_id, text_hash = %text_hash, "Duplicate question");
            let settings = self.store.settings(user_id);
            let markdown = format!(
                "↩️ Reusing previous response (duplicate message within {}s):\n\n{cached}",
                self.admission.dedup_window().as_secs()
            );
            return paginate(&markdown, settings.chars as usize);
        }

        let lock = self.store.turn_lock(user_id);
        let _turn = lock.lock().await;
        self.admission.note_request_started(user_id);

        let settings = self.store.settings(user_id);
        let Some(space_id) = self.store.space_id(user_id) else {
            warn!(user_id = %user_id, "No space configured for user");
            return vec![NO_SPACE_TEXT.to_string()];
        };
        let conversation_id = self.store.conversation_id(user_id);

        let started = Instant::now();
        let resolution = self
            .orchestrator
            .resolve(QueryRequest {
                question: text,
                space_id: &space_id,
                conversation_id: conversation_id.as_deref(),
                text_timeout: settings.timeout(),
                query_timeout: settings.query_timeout(),
            })
            .await;

        if let Some(confirmed) = &resolution.conversation_id {
            self.store.set_conversation_id(user_id, confirmed.as_str());
        }

        let markdown = render(&resolution.answer, &RenderOptions::from(&settings));
        self.admission.store_duplicate(user_id, text, &markdown);

        info!(
            user_id = %user_id,
            space_id = %space_id,
            conversation_id = ?resolution.conversation_id,
            duration_ms = started.elapsed().as_millis() as u64,
            is_error = resolution.answer.is_error(),
            "Question answered"
        );

        paginate(&markdown, settings.chars as usize)
    }

    /// Resolve a one-off prompt in a fresh conversation.
    ///
    /// Skips admission checks and leaves the user's session untouched.
    pub async fn run_prompt(&self, user_id: &str, prompt: &str) -> PromptOutcome {
        let trace_id = uuid::Uuid::new_v4().to_string();
        let started = Instant::now();
        let elapsed_ms = || started.elapsed().as_millis() as u64;

        let prompt = prompt.trim();
        if prompt.is_empty() {
            return PromptOutcome::failed(trace_id, elapsed_ms(), String::new(), NO_PROMPT_TEXT);
        }
        let Some(space_id) = self.store.space_id(user_id) else {
            return PromptOutcome::failed(trace_id, elapsed_ms(), String::new(), NO_SPACE_TEXT);
        };

        let defaults = self.store.defaults();
        let resolution = self
            .orchestrator
            .resolve(QueryRequest {
                question: prompt,
                space_id: &space_id,
                conversation_id: None,
                text_timeout: defaults.timeout(),
                query_timeout: defaults.query_timeout(),
            })
            .await;

        let response = match serde_json::to_string(&resolution.answer) {
            Ok(json) => json,
            Err(e) => {
                warn!(trace_id = %trace_id, error = %e, "Failed to serialize answer");
                return PromptOutcome::failed(trace_id, elapsed_ms(), String::new(), e.to_string());
            }
        };

        let outcome = match &resolution.answer {
            GenieAnswer::Error { message } => {
                PromptOutcome::failed(trace_id, elapsed_ms(), response, message.clone())
            }
            _ => PromptOutcome {
                response,
                trace_id,
                elapsed_ms: elapsed_ms(),
                status: PromptStatus::Ok,
                error: String::new(),
            },
        };
        info!(
            user_id = %user_id,
            trace_id = %outcome.trace_id,
            elapsed_ms = outcome.elapsed_ms,
            status = ?outcome.status,
            "Prompt resolved"
        );
        outcome
    }
}

// ============================================================================
// PromptOutcome
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptStatus {
    Ok,
    Error,
}

/// Result of [`GenieService::run_prompt`]. Every field is always serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptOutcome {
    /// JSON of the resolved answer.
    pub response: String,
    pub trace_id: String,
    pub elapsed_ms: u64,
    pub status: PromptStatus,
    /// Empty on success.
    pub error: String,
}

impl PromptOutcome {
    fn failed(
        trace_id: String,
        elapsed_ms: u64,
        response: String,
        error: impl Into<String>,
    ) -> Self {
        Self {
            response,
            trace_id,
            elapsed_ms,
            status: PromptStatus::Error,
            error: error.into(),
        }
    }
}
