//! Admission control in front of the orchestrator.
//!
//! Two cheap map lookups run before the per-user lock is taken: a minimum
//! spacing between requests, and suppression of an identical question asked
//! again within a short window.

use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::time::Instant;

use super::store::{DedupEntry, SessionStore};
use crate::config::AdmissionConfig;

/// Collapse runs of whitespace and trim.
pub fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// SHA-256 hex digest of the normalized text.
pub fn fingerprint(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize(text).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Rate limiter and single-entry duplicate cache backed by the session store.
#[derive(Clone)]
pub struct Admission {
    store: SessionStore,
    min_interval: Duration,
    dedup_window: Duration,
}

impl Admission {
    pub fn new(store: SessionStore, min_interval: Duration, dedup_window: Duration) -> Self {
        Self {
            store,
            min_interval,
            dedup_window,
        }
    }

    pub fn from_config(store: SessionStore, config: &AdmissionConfig) -> Self {
        Self::new(store, config.min_interval(), config.dedup_window())
    }

    pub fn dedup_window(&self) -> Duration {
        self.dedup_window
    }

    /// Remaining wait if the user is still inside the minimum interval.
    pub fn check_rate_limit(&self, user_id: &str) -> Option<Duration> {
        let now = Instant::now();
        self.store.with_entry(user_id, |e| {
            e.next_allowed
                .filter(|next| now < *next)
                .map(|next| next - now)
        })
    }

    pub fn note_request_started(&self, user_id: &str) {
        let next = Instant::now() + self.min_interval;
        self.store.with_entry(user_id, |e| e.next_allowed = Some(next));
    }

    /// Previously rendered markdown if `text` repeats the last question
    /// within the dedup window.
    pub fn check_duplicate(&self, user_id: &str, text: &str) -> Option<String> {
        let fingerprint = fingerprint(text);
        let now = Instant::now();
        let window = self.dedup_window;
        self.store.with_entry(user_id, |e| {
            e.dedup
                .as_ref()
                .filter(|d| d.fingerprint == fingerprint && now.duration_since(d.stored_at) <= window)
                .map(|d| d.markdown.clone())
        })
    }

    /// Replace the user's cached answer.
    pub fn store_duplicate(&self, user_id: &str, text: &str, markdown: &str) {
        let entry = DedupEntry {
            fingerprint: fingerprint(text),
            stored_at: Instant::now(),
            markdown: markdown.to_string(),
        };
        self.store.with_entry(user_id, |e| e.dedup = Some(entry));
    }
}
