//! Space, conversation and message listings.
//!
//! Listings never fail the caller: backend errors render as a one-line
//! warning naming the error kind.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::warn;

use crate::genie::{GenieError, GenieMessage, GenieSpace};
use crate::render::truncate_chars;
use crate::service::GenieService;
use crate::session::{NO_SPACE_TITLE, SettingsOverrides, UserSettings};

pub const UNKNOWN_SPACE_TITLE: &str = "(unknown space)";

const DEFAULT_MESSAGE_LIMIT: usize = 3;
const MAX_MESSAGE_LIMIT: usize = 20;
const USER_TEXT_CHARS: usize = 1000;
const REPLY_SNIPPET_CHARS: usize = 1200;

#[derive(Debug, Error)]
pub enum BrowseError {
    #[error("no space matches '{0}'")]
    SpaceNotFound(String),

    #[error("couldn't list spaces: {0}")]
    Backend(#[from] GenieError),
}

impl GenieService {
    // ------------------------------------------------------------------------
    // Spaces
    // ------------------------------------------------------------------------

    /// Display title for a space, looked up once and cached.
    pub async fn space_title(&self, space_id: &str) -> String {
        if let Some(title) = self.store.cached_space_title(space_id) {
            return title;
        }
        let timeout = self.store.defaults().timeout();
        let api = self.orchestrator.api();
        let title = match self
            .orchestrator
            .retry()
            .execute("get_space", timeout, || api.get_space(space_id))
            .await
        {
            Ok(space) if !space.title.trim().is_empty() => space.title,
            Ok(_) => UNKNOWN_SPACE_TITLE.to_string(),
            Err(e) => {
                warn!(space_id = %space_id, error = %e, "Space title lookup failed");
                UNKNOWN_SPACE_TITLE.to_string()
            }
        };
        self.store.cache_space_title(space_id, title.as_str());
        title
    }

    async fn fetch_spaces(&self) -> Result<Vec<GenieSpace>, GenieError> {
        let timeout = self.store.defaults().timeout();
        let api = self.orchestrator.api();
        let spaces = self
            .orchestrator
            .retry()
            .execute("list_spaces", timeout, || api.list_spaces())
            .await?;
        for space in &spaces {
            if !space.title.is_empty() {
                self.store.cache_space_title(&space.space_id, space.title.as_str());
            }
        }
        Ok(spaces)
    }

    pub async fn list_spaces_markdown(&self) -> String {
        match self.fetch_spaces().await {
            Ok(spaces) if spaces.is_empty() => "_No spaces found._".to_string(),
            Ok(spaces) => {
                let mut lines = vec!["**Available Genie Spaces:**".to_string(), String::new()];
                lines.extend(
                    spaces
                        .iter()
                        .map(|s| format!("- **{}**  (`{}`)", display_title(s), s.space_id)),
                );
                lines.join("\n")
            }
            Err(e) => {
                warn!(error = %e, "Listing spaces failed");
                format!("⚠️ Couldn't list spaces: {}", e.kind())
            }
        }
    }

    /// Switch the user to the space whose id, or else title
    /// (case-insensitive), equals `wanted`. Starts a fresh conversation.
    pub async fn switch_space(&self, user_id: &str, wanted: &str) -> Result<GenieSpace, BrowseError> {
        let wanted = wanted.trim();
        let spaces = self.fetch_spaces().await?;
        let wanted_lower = wanted.to_lowercase();
        let chosen = spaces
            .iter()
            .find(|s| s.space_id == wanted)
            .or_else(|| spaces.iter().find(|s| s.title.to_lowercase() == wanted_lower))
            .cloned()
            .ok_or_else(|| BrowseError::SpaceNotFound(wanted.to_string()))?;

        self.store.set_space(user_id, chosen.space_id.as_str());
        Ok(chosen)
    }

    // ------------------------------------------------------------------------
    // Conversations & Messages
    // ------------------------------------------------------------------------

    pub async fn list_conversations_markdown(&self, user_id: &str) -> String {
        let Some(space_id) = self.store.space_id(user_id) else {
            return "_No space selected._".to_string();
        };
        let timeout = self.store.settings(user_id).timeout();
        let api = self.orchestrator.api();
        let result = self
            .orchestrator
            .retry()
            .execute("list_conversations", timeout, || api.list_conversations(&space_id))
            .await;

        match result {
            Ok(conversations) if conversations.is_empty() => {
                "_No conversations found in this space._".to_string()
            }
            Ok(conversations) => {
                let mut lines = vec!["**Conversations in this space:**".to_string(), String::new()];
                for c in &conversations {
                    let title = c
                        .title
                        .as_deref()
                        .filter(|t| !t.trim().is_empty())
                        .unwrap_or("(no title)");
                    lines.push(format!(
                        "- **{}**  (`{}`) • created: {}",
                        title,
                        c.conversation_id(),
                        format_epoch_ms(c.created_timestamp)
                    ));
                }
                lines.join("\n")
            }
            Err(e) => {
                warn!(space_id = %space_id, error = %e, "Listing conversations failed");
                format!("⚠️ Couldn't list conversations: {}", e.kind())
            }
        }
    }

    /// The last `limit` messages of a conversation as user → assistant pairs.
    pub async fn list_messages_markdown(
        &self,
        user_id: &str,
        conversation_id: &str,
        limit: Option<usize>,
    ) -> String {
        let Some(space_id) = self.store.space_id(user_id) else {
            return "_No space selected._".to_string();
        };
        let limit = limit
            .unwrap_or(DEFAULT_MESSAGE_LIMIT)
            .clamp(1, MAX_MESSAGE_LIMIT);
        let timeout = self.store.settings(user_id).timeout();
        let api = self.orchestrator.api();
        let result = self
            .orchestrator
            .retry()
            .execute("list_conversation_messages", timeout, || {
                api.list_conversation_messages(&space_id, conversation_id)
            })
            .await;

        match result {
            Ok(messages) if messages.is_empty() => {
                "_No messages found in this conversation._".to_string()
            }
            Ok(messages) => {
                let recent = &messages[messages.len().saturating_sub(limit)..];
                format_messages(recent)
            }
            Err(e) => {
                warn!(
                    space_id = %space_id,
                    conversation_id = %conversation_id,
                    error = %e,
                    "Listing messages failed"
                );
                format!("⚠️ Couldn't list messages: {}", e.kind())
            }
        }
    }

    // ------------------------------------------------------------------------
    // Settings & Conversation State
    // ------------------------------------------------------------------------

    pub async fn settings_summary(&self, user_id: &str) -> String {
        let settings = self.store.settings(user_id);
        self.summarize(user_id, &settings).await
    }

    /// Apply `key=value` overrides and return the new summary.
    pub async fn update_settings(&self, user_id: &str, overrides: &SettingsOverrides) -> String {
        let settings = self.store.apply_overrides(user_id, overrides);
        self.summarize(user_id, &settings).await
    }

    pub async fn restore_default_settings(&self, user_id: &str) -> String {
        let settings = self.store.reset_to_defaults(user_id);
        self.summarize(user_id, &settings).await
    }

    /// Forget the active conversation; the next question starts a new one.
    pub fn reset_conversation(&self, user_id: &str) {
        self.store.clear_conversation(user_id);
    }

    async fn summarize(&self, user_id: &str, settings: &UserSettings) -> String {
        let space_id = self.store.space_id(user_id).unwrap_or_default();
        let title = if space_id.is_empty() {
            NO_SPACE_TITLE.to_string()
        } else {
            self.space_title(&space_id).await
        };
        settings.summary(&title, &space_id)
    }
}

fn format_messages(messages: &[GenieMessage]) -> String {
    let mut lines = vec![format!("**Last {} message(s):**", messages.len())];
    for message in messages {
        let user_text = message.content.trim();
        lines.push(format!("- **user** · `{}`:", message.message_id()));
        if user_text.is_empty() {
            lines.push("> (empty)".to_string());
        } else {
            lines.push(quote(&truncate_chars(user_text, USER_TEXT_CHARS)));
        }

        let replies: Vec<String> = message
            .attachments
            .iter()
            .filter_map(|att| {
                if let Some(text) = att.text_content() {
                    return Some(text.trim().to_string());
                }
                let query = att.query.as_ref()?;
                let description = query
                    .description
                    .as_deref()
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .unwrap_or("Query");
                Some(match query.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
                    Some(sql) => format!("{description} • SQL: `{sql}`"),
                    None => description.to_string(),
                })
            })
            .collect();

        if !replies.is_empty() {
            lines.push("- **assistant**".to_string());
            for (i, reply) in replies.iter().enumerate() {
                lines.push(format!("  - reply {}:", i + 1));
                lines.push(quote(&truncate_chars(reply, REPLY_SNIPPET_CHARS)));
            }
        }
    }
    lines.join("\n")
}

fn display_title(space: &GenieSpace) -> String {
    match space.title.trim() {
        "" => format!("Space {}", space.space_id),
        title => title.to_string(),
    }
}

/// Prefix every line with `> ` so multi-line text stays inside the quote.
fn quote(text: &str) -> String {
    text.lines()
        .map(|line| format!("> {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Epoch milliseconds → `YYYY-MM-DD HH:MM UTC`.
fn format_epoch_ms(ms: Option<i64>) -> String {
    match ms.and_then(DateTime::<Utc>::from_timestamp_millis) {
        Some(ts) => ts.format("%Y-%m-%d %H:%M UTC").to_string(),
        None => "unknown".to_string(),
    }
}
