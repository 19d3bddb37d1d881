//! Per-user session state.
//!
//! One `SessionEntry` per user identifier, created on first reference. Values
//! leave the store by copy or clone; nothing hands out a reference into the map.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use super::settings::{HardLimits, SettingsOverrides, UserSettings};

/// Title used when a space id is empty.
pub const NO_SPACE_TITLE: &str = "(no space)";

// ============================================================================
// Session Entry
// ============================================================================

/// Last rendered answer for duplicate suppression.
#[derive(Debug, Clone)]
pub(crate) struct DedupEntry {
    pub(crate) fingerprint: String,
    pub(crate) stored_at: Instant,
    pub(crate) markdown: String,
}

pub(crate) struct SessionEntry {
    settings: UserSettings,
    conversation_id: Option<String>,
    space_id: Option<String>,
    /// Serializes the resolve-and-render sequence for this user.
    turn_lock: Arc<Mutex<()>>,
    pub(crate) next_allowed: Option<Instant>,
    pub(crate) dedup: Option<DedupEntry>,
    last_active: Instant,
}

impl SessionEntry {
    fn new(settings: UserSettings) -> Self {
        Self {
            settings,
            conversation_id: None,
            space_id: None,
            turn_lock: Arc::new(Mutex::new(())),
            next_allowed: None,
            dedup: None,
            last_active: Instant::now(),
        }
    }
}

// ============================================================================
// SessionStore
// ============================================================================

/// Concurrent map of user sessions plus the process-wide space-title cache.
///
/// Cheap to clone; clones share the same maps.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<DashMap<String, SessionEntry>>,
    space_titles: Arc<DashMap<String, String>>,
    defaults: UserSettings,
    limits: HardLimits,
    default_space_id: Option<String>,
}

impl SessionStore {
    /// Create an empty store. `defaults` are clamped before use.
    pub fn new(
        defaults: UserSettings,
        limits: HardLimits,
        default_space_id: Option<String>,
    ) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            space_titles: Arc::new(DashMap::new()),
            defaults: defaults.clamped(&limits),
            limits,
            default_space_id: default_space_id.filter(|s| !s.is_empty()),
        }
    }

    /// Run `f` against the user's entry, creating it if needed.
    ///
    /// The shard lock is held only for the duration of `f`; never await inside.
    pub(crate) fn with_entry<R>(&self, user_id: &str, f: impl FnOnce(&mut SessionEntry) -> R) -> R {
        let defaults = self.defaults;
        let mut entry = self
            .sessions
            .entry(user_id.to_string())
            .or_insert_with(|| SessionEntry::new(defaults));
        entry.last_active = Instant::now();
        f(&mut entry)
    }

    pub fn limits(&self) -> &HardLimits {
        &self.limits
    }

    pub fn defaults(&self) -> UserSettings {
        self.defaults
    }

    // ------------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------------

    /// Current settings, always clamped.
    pub fn settings(&self, user_id: &str) -> UserSettings {
        let limits = self.limits;
        self.with_entry(user_id, |e| e.settings.clamped(&limits))
    }

    /// Merge `overrides` into the current settings, clamp, store and return.
    pub fn apply_overrides(&self, user_id: &str, overrides: &SettingsOverrides) -> UserSettings {
        let limits = self.limits;
        self.with_entry(user_id, |e| {
            let updated = e.settings.merged(overrides).clamped(&limits);
            e.settings = updated;
            updated
        })
    }

    pub fn reset_to_defaults(&self, user_id: &str) -> UserSettings {
        let defaults = self.defaults;
        self.with_entry(user_id, |e| {
            e.settings = defaults;
            defaults
        })
    }

    // ------------------------------------------------------------------------
    // Lock
    // ------------------------------------------------------------------------

    /// The user's turn lock; the same instance for the lifetime of the session.
    pub fn turn_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.with_entry(user_id, |e| Arc::clone(&e.turn_lock))
    }

    // ------------------------------------------------------------------------
    // Conversation
    // ------------------------------------------------------------------------

    pub fn conversation_id(&self, user_id: &str) -> Option<String> {
        self.with_entry(user_id, |e| e.conversation_id.clone())
    }

    pub fn set_conversation_id(&self, user_id: &str, conversation_id: impl Into<String>) {
        let conversation_id = conversation_id.into();
        self.with_entry(user_id, |e| e.conversation_id = Some(conversation_id));
    }

    /// Forget the active conversation. Cached duplicate answers belonged to
    /// that context, so they go too.
    pub fn clear_conversation(&self, user_id: &str) {
        self.with_entry(user_id, |e| {
            e.conversation_id = None;
            e.dedup = None;
        });
    }

    // ------------------------------------------------------------------------
    // Space
    // ------------------------------------------------------------------------

    /// The user's space, falling back to the process-wide default.
    pub fn space_id(&self, user_id: &str) -> Option<String> {
        self.with_entry(user_id, |e| e.space_id.clone())
            .or_else(|| self.default_space_id.clone())
    }

    /// Switch space. Always starts a fresh conversation.
    pub fn set_space(&self, user_id: &str, space_id: impl Into<String>) {
        let space_id = space_id.into();
        self.with_entry(user_id, |e| {
            e.space_id = Some(space_id);
            e.conversation_id = None;
            e.dedup = None;
        });
    }

    pub fn cached_space_title(&self, space_id: &str) -> Option<String> {
        if space_id.is_empty() {
            return Some(NO_SPACE_TITLE.to_string());
        }
        self.space_titles.get(space_id).map(|t| t.value().clone())
    }

    pub fn cache_space_title(&self, space_id: &str, title: impl Into<String>) {
        self.space_titles.insert(space_id.to_string(), title.into());
    }

    // ------------------------------------------------------------------------
    // Eviction
    // ------------------------------------------------------------------------

    /// Remove sessions idle for longer than `max_idle` whose turn lock nobody
    /// holds or waits on. Returns the number removed.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.sessions.retain(|_, entry| {
            let stale = Arc::strong_count(&entry.turn_lock) == 1
                && now.duration_since(entry.last_active) > max_idle;
            if stale {
                removed += 1;
            }
            !stale
        });
        removed
    }

    /// Periodically evict idle sessions on the current runtime.
    pub fn spawn_cleanup_task(self, interval: Duration, max_idle: Duration) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let removed = self.evict_idle(max_idle);
                if removed > 0 {
                    debug!(
                        removed = removed,
                        remaining = self.len(),
                        "Evicted idle sessions"
                    );
                }
            }
        });
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
