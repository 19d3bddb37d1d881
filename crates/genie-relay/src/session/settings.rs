//! Per-user display and timeout limits.
//!
//! Every value handed out or stored is clamped into the hard range first, so
//! callers never observe (and the store never holds) an out-of-range setting.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

pub const DEFAULT_ROWS: u32 = 50;
pub const DEFAULT_COLS: u32 = 8;
pub const DEFAULT_CHARS: u32 = 12_000;
pub const DEFAULT_CELL_CHARS: u32 = 200;
pub const DEFAULT_TIMEOUT_SECS: u32 = 60;
pub const DEFAULT_QUERY_TIMEOUT_SECS: u32 = 120;

/// Lower bounds are fixed; only the upper bounds are configurable.
pub const MIN_ROWS: u32 = 1;
pub const MIN_COLS: u32 = 1;
pub const MIN_CHARS: u32 = 1_000;
pub const MIN_CELL_CHARS: u32 = 20;
pub const MIN_TIMEOUT_SECS: u32 = 5;
pub const MIN_QUERY_TIMEOUT_SECS: u32 = 30;

// ============================================================================
// HardLimits
// ============================================================================

/// Upper bounds applied to every user setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HardLimits {
    pub rows: u32,
    pub cols: u32,
    pub chars: u32,
    pub cell_chars: u32,
    pub timeout: u32,
    pub query_timeout: u32,
}

impl Default for HardLimits {
    fn default() -> Self {
        Self {
            rows: 500,
            cols: 50,
            chars: 24_000,
            cell_chars: 2_000,
            timeout: 600,
            query_timeout: 1_200,
        }
    }
}

fn clamp(value: u32, lo: u32, hi: u32) -> u32 {
    value.clamp(lo, hi.max(lo))
}

// ============================================================================
// UserSettings
// ============================================================================

/// Immutable snapshot of one user's limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    pub rows: u32,
    pub cols: u32,
    /// Maximum characters per outbound message.
    pub chars: u32,
    pub cell_chars: u32,
    /// Seconds allowed for text-level calls and the completion wait.
    #[serde(rename = "timeout")]
    pub timeout_secs: u32,
    /// Seconds allowed for statement-result calls.
    #[serde(rename = "query_timeout")]
    pub query_timeout_secs: u32,
    /// Include the generated SQL in the Notes block.
    #[serde(rename = "sql_notes")]
    pub include_sql: bool,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            rows: DEFAULT_ROWS,
            cols: DEFAULT_COLS,
            chars: DEFAULT_CHARS,
            cell_chars: DEFAULT_CELL_CHARS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            query_timeout_secs: DEFAULT_QUERY_TIMEOUT_SECS,
            include_sql: true,
        }
    }
}

impl UserSettings {
    /// Clamp every field into its hard range.
    #[must_use]
    pub fn clamped(self, limits: &HardLimits) -> Self {
        Self {
            rows: clamp(self.rows, MIN_ROWS, limits.rows),
            cols: clamp(self.cols, MIN_COLS, limits.cols),
            chars: clamp(self.chars, MIN_CHARS, limits.chars),
            cell_chars: clamp(self.cell_chars, MIN_CELL_CHARS, limits.cell_chars),
            timeout_secs: clamp(self.timeout_secs, MIN_TIMEOUT_SECS, limits.timeout),
            query_timeout_secs: clamp(
                self.query_timeout_secs,
                MIN_QUERY_TIMEOUT_SECS,
                limits.query_timeout,
            ),
            include_sql: self.include_sql,
        }
    }

    /// Apply a partial override on top of these settings (unclamped).
    #[must_use]
    pub fn merged(self, overrides: &SettingsOverrides) -> Self {
        Self {
            rows: overrides.rows.unwrap_or(self.rows),
            cols: overrides.cols.unwrap_or(self.cols),
            chars: overrides.chars.unwrap_or(self.chars),
            cell_chars: overrides.cell_chars.unwrap_or(self.cell_chars),
            timeout_secs: overrides.timeout_secs.unwrap_or(self.timeout_secs),
            query_timeout_secs: overrides
                .query_timeout_secs
                .unwrap_or(self.query_timeout_secs),
            include_sql: overrides.include_sql.unwrap_or(self.include_sql),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.timeout_secs))
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.query_timeout_secs))
    }

    /// Human-readable summary shown to the user.
    pub fn summary(&self, space_title: &str, space_id: &str) -> String {
        format!(
            "**Current Genie Space:** {space_title} (`{space_id}`)\n\
             Your current limits → rows={}, cols={}, chars/message={}, cell chars={}, \
             timeout={}s, query_timeout={}s\n\
             Extras → sql_notes={}",
            self.rows,
            self.cols,
            self.chars,
            self.cell_chars,
            self.timeout_secs,
            self.query_timeout_secs,
            if self.include_sql { "on" } else { "off" },
        )
    }
}

// ============================================================================
// SettingsOverrides
// ============================================================================

/// Partial settings update; `None` keeps the current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct SettingsOverrides {
    pub rows: Option<u32>,
    pub cols: Option<u32>,
    pub chars: Option<u32>,
    pub cell_chars: Option<u32>,
    pub timeout_secs: Option<u32>,
    pub query_timeout_secs: Option<u32>,
    pub include_sql: Option<bool>,
}

impl SettingsOverrides {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Parse `key=value` (or `key:value`) pairs such as `rows=100 qt=300 sql=off`.
    ///
    /// Unknown keys and unparsable values are skipped.
    pub fn parse_pairs(text: &str) -> Self {
        let mut out = Self::default();
        for token in text.split_whitespace() {
            let Some((key, value)) = token.split_once(['=', ':']) else {
                continue;
            };
            let key = key.to_ascii_lowercase();
            if matches!(key.as_str(), "sql" | "sql_notes") {
                if let Some(flag) = parse_flag(value) {
                    out.include_sql = Some(flag);
                }
                continue;
            }
            let Ok(number) = value.parse::<u32>() else {
                continue;
            };
            let number = number.max(1);
            match key.as_str() {
                "rows" => out.rows = Some(number),
                "cols" | "columns" => out.cols = Some(number),
                "chars" => out.chars = Some(number),
                "cell" | "cell_chars" => out.cell_chars = Some(number),
                "timeout" => out.timeout_secs = Some(number),
                "query_timeout" | "qt" => out.query_timeout_secs = Some(number),
                _ => {}
            }
        }
        out
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" | "y" | "enable" | "enabled" => Some(true),
        "0" | "false" | "off" | "no" | "n" | "disable" | "disabled" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROBES: [u32; 9] = [0, 1, 5, 19, 20, 999, 1_000, 30_000, u32::MAX];

    fn probe_settings() -> impl Iterator<Item = UserSettings> {
        PROBES.iter().flat_map(|&a| {
            PROBES.iter().map(move |&b| UserSettings {
                rows: a,
                cols: b,
                chars: a,
                cell_chars: b,
                timeout_secs: a,
                query_timeout_secs: b,
                include_sql: a % 2 == 0,
            })
        })
    }

    #[test]
    fn defaults_are_within_default_limits() {
        let limits = HardLimits::default();
        let settings = UserSettings::default();
        assert_eq!(settings.clamped(&limits), settings);
    }

    #[test]
    fn clamping_is_idempotent() {
        let limits = HardLimits::default();
        for settings in probe_settings() {
            let once = settings.clamped(&limits);
            assert_eq!(once.clamped(&limits), once);
        }
    }

    #[test]
    fn clamped_fields_lie_within_hard_range() {
        let limits = HardLimits::default();
        for settings in probe_settings() {
            let s = settings.clamped(&limits);
            assert!((MIN_ROWS..=limits.rows).contains(&s.rows));
            assert!((MIN_COLS..=limits.cols).contains(&s.cols));
            assert!((MIN_CHARS..=limits.chars).contains(&s.chars));
            assert!((MIN_CELL_CHARS..=limits.cell_chars).contains(&s.cell_chars));
            assert!((MIN_TIMEOUT_SECS..=limits.timeout).contains(&s.timeout_secs));
            assert!(
                (MIN_QUERY_TIMEOUT_SECS..=limits.query_timeout).contains(&s.query_timeout_secs)
            );
        }
    }

    #[test]
    fn hard_max_below_floor_is_raised_to_floor() {
        let limits = HardLimits {
            chars: 10,
            ..HardLimits::default()
        };
        let s = UserSettings::default().clamped(&limits);
        assert_eq!(s.chars, MIN_CHARS);
    }

    #[test]
    fn merged_only_touches_overridden_fields() {
        let base = UserSettings::default();
        let overrides = SettingsOverrides {
            rows: Some(100),
            include_sql: Some(false),
            ..SettingsOverrides::default()
        };
        let merged = base.merged(&overrides);
        assert_eq!(merged.rows, 100);
        assert!(!merged.include_sql);
        assert_eq!(merged.cols, base.cols);
        assert_eq!(merged.timeout_secs, base.timeout_secs);
    }

    #[test]
    fn empty_overrides() {
        assert!(SettingsOverrides::default().is_empty());
        assert!(
            !SettingsOverrides {
                cols: Some(3),
                ..SettingsOverrides::default()
            }
            .is_empty()
        );
    }

    #[test]
    fn parses_key_value_pairs() {
        let overrides = SettingsOverrides::parse_pairs("rows=100 Columns:20 qt=300 sql=off bogus=3");
        assert_eq!(overrides.rows, Some(100));
        assert_eq!(overrides.cols, Some(20));
        assert_eq!(overrides.query_timeout_secs, Some(300));
        assert_eq!(overrides.include_sql, Some(false));
        assert!(overrides.chars.is_none());
    }

    #[test]
    fn parse_skips_garbage_and_floors_zero() {
        let overrides = SettingsOverrides::parse_pairs("rows=abc cell=0 sql=maybe hello");
        assert!(overrides.rows.is_none());
        assert_eq!(overrides.cell_chars, Some(1));
        assert!(overrides.include_sql.is_none());
        assert!(SettingsOverrides::parse_pairs("just a question").is_empty());
    }

    #[test]
    fn summary_mentions_space_and_limits() {
        let text = UserSettings::default().summary("Sales", "space-1");
        assert!(text.contains("Sales (`space-1`)"));
        assert!(text.contains("rows=50"));
        assert!(text.contains("sql_notes=on"));
    }

    #[test]
    fn deserializes_with_yaml_field_names() {
        let s: UserSettings =
            serde_json::from_str(r#"{"rows": 10, "timeout": 90, "sql_notes": false}"#).unwrap();
        assert_eq!(s.rows, 10);
        assert_eq!(s.timeout_secs, 90);
        assert!(!s.include_sql);
        assert_eq!(s.cols, DEFAULT_COLS);
    }
}
