use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use tokio::fs;

use serde::Deserialize;
use thiserror::Error;

use crate::session::{HardLimits, UserSettings};

// ============================================================================
// Config (root)
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub genie: GenieConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub admission: AdmissionConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_saphyr::Error),

    #[error("environment variable '{0}' is not set")]
    MissingEnvVar(String),

    #[error("unclosed variable reference '${{' (missing '}}')")]
    UnclosedVarReference,
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        Self::parse(&contents)
    }

    /// Parse YAML text after expanding environment variable references.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;
        Ok(serde_saphyr::from_str(&expanded)?)
    }
}

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "genie-relay.yaml";

// ============================================================================
// Private Helpers (Serde Defaults)
// ============================================================================

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_max_concurrent_calls() -> usize {
    16
}

fn default_min_interval_seconds() -> f64 {
    2.0
}

fn default_dedup_window_seconds() -> f64 {
    8.0
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_seconds() -> f64 {
    0.8
}

fn default_cleanup_interval_seconds() -> u64 {
    3600
}

/// Seconds to a `Duration`, treating negative, NaN and overflowing values as zero.
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or_default()
}

/// Treat empty strings (from `${VAR:-}`) as absent.
fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in a string.
///
/// Supports the following syntax (shell-compatible):
/// - `${VAR}` - Required variable, errors if not set
/// - `${VAR:-default}` - Optional variable with default value
/// - `${VAR:-}` - Optional variable, empty string if not set
/// - `$$` - Escaped `$` (only needed before `{` to prevent expansion)
///
/// No nested expansion: `${VAR:-${DEFAULT}}` is not supported.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }
        match chars.peek() {
            Some('$') => {
                chars.next();
                result.push('$');
            }
            Some('{') => {
                chars.next();
                let expanded = parse_var_reference(&mut chars)?;
                result.push_str(&expanded);
            }
            _ => result.push('$'),
        }
    }

    Ok(result)
}

/// Parse a variable reference after seeing `${`.
fn parse_var_reference(
    chars: &mut std::iter::Peekable<std::str::Chars>,
) -> Result<String, ConfigError> {
    let mut var_name = String::new();
    let mut default_value: Option<String> = None;
    let mut found_closing_brace = false;

    while let Some(c) = chars.next() {
        match (c, default_value.as_mut()) {
            ('}', _) => {
                found_closing_brace = true;
                break;
            }
            (':', None) if chars.peek() == Some(&'-') => {
                chars.next();
                default_value = Some(String::new());
            }
            (c, Some(default)) => default.push(c),
            (c, None) => var_name.push(c),
        }
    }

    if !found_closing_brace {
        return Err(ConfigError::UnclosedVarReference);
    }

    match std::env::var(&var_name) {
        Ok(value) => Ok(value),
        Err(_) => default_value.ok_or(ConfigError::MissingEnvVar(var_name)),
    }
}

// ============================================================================
// GenieConfig
// ============================================================================

/// Backend connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct GenieConfig {
    /// Workspace base URL, e.g. `https://adb-123.azuredatabricks.net`.
    #[serde(default)]
    pub host: Option<String>,
    /// Personal access token.
    #[serde(default)]
    pub token: Option<String>,
    /// Service principal client id (OAuth machine-to-machine).
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Process-wide default space.
    #[serde(default)]
    pub space_id: Option<String>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Upper bound on backend calls in flight across all users.
    #[serde(default = "default_max_concurrent_calls")]
    pub max_concurrent_calls: usize,
}

impl Default for GenieConfig {
    fn default() -> Self {
        Self {
            host: None,
            token: None,
            client_id: None,
            client_secret: None,
            space_id: None,
            poll_interval_ms: default_poll_interval_ms(),
            max_concurrent_calls: default_max_concurrent_calls(),
        }
    }
}

/// How the relay authenticates against the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenieAuth {
    Token(String),
    ServicePrincipal {
        client_id: String,
        client_secret: String,
    },
}

impl GenieConfig {
    pub fn host(&self) -> Option<&str> {
        non_empty(&self.host).map(|h| h.trim_end_matches('/'))
    }

    pub fn space_id(&self) -> Option<&str> {
        non_empty(&self.space_id)
    }

    /// A token wins over client credentials.
    pub fn auth(&self) -> Option<GenieAuth> {
        if let Some(token) = non_empty(&self.token) {
            return Some(GenieAuth::Token(token.to_string()));
        }
        match (non_empty(&self.client_id), non_empty(&self.client_secret)) {
            (Some(id), Some(secret)) => Some(GenieAuth::ServicePrincipal {
                client_id: id.to_string(),
                client_secret: secret.to_string(),
            }),
            _ => None,
        }
    }

    pub fn uses_service_principal(&self) -> bool {
        matches!(self.auth(), Some(GenieAuth::ServicePrincipal { .. }))
    }

    /// Host, default space and credentials are all present.
    pub fn is_enabled(&self) -> bool {
        self.host().is_some() && self.space_id().is_some() && self.auth().is_some()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(50))
    }
}

// ============================================================================
// LimitsConfig
// ============================================================================

/// Default per-user settings and their hard upper bounds.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct LimitsConfig {
    #[serde(default)]
    pub defaults: UserSettings,
    #[serde(default)]
    pub hard_max: HardLimits,
}

// ============================================================================
// AdmissionConfig
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct AdmissionConfig {
    #[serde(default = "default_min_interval_seconds")]
    pub min_interval_seconds: f64,
    #[serde(default = "default_dedup_window_seconds")]
    pub dedup_window_seconds: f64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            min_interval_seconds: default_min_interval_seconds(),
            dedup_window_seconds: default_dedup_window_seconds(),
        }
    }
}

impl AdmissionConfig {
    pub fn min_interval(&self) -> Duration {
        seconds(self.min_interval_seconds)
    }

    pub fn dedup_window(&self) -> Duration {
        seconds(self.dedup_window_seconds)
    }
}

// ============================================================================
// RetryConfig
// ============================================================================

/// Retry policy for every backend call.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_seconds")]
    pub base_delay_seconds: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_seconds: default_base_delay_seconds(),
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        seconds(self.base_delay_seconds)
    }
}

// ============================================================================
// SessionsConfig
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct SessionsConfig {
    /// Evict sessions idle for this long. Unset keeps them for the process lifetime.
    #[serde(default)]
    pub max_idle_seconds: Option<u64>,
    #[serde(default = "default_cleanup_interval_seconds")]
    pub cleanup_interval_seconds: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            max_idle_seconds: None,
            cleanup_interval_seconds: default_cleanup_interval_seconds(),
        }
    }
}

impl SessionsConfig {
    pub fn max_idle(&self) -> Option<Duration> {
        self.max_idle_seconds.map(Duration::from_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_seconds.max(1))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    // ========================================================================
    // Config Tests
    // ========================================================================

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.genie.host.is_none());
        assert!(!config.genie.is_enabled());
        assert_eq!(config.genie.max_concurrent_calls, 16);
        assert_eq!(config.limits.defaults, UserSettings::default());
        assert_eq!(config.limits.hard_max, HardLimits::default());
        assert_eq!(config.admission.min_interval(), Duration::from_secs(2));
        assert_eq!(config.admission.dedup_window(), Duration::from_secs(8));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay(), Duration::from_millis(800));
        assert!(config.sessions.max_idle().is_none());
    }

    #[tokio::test]
    async fn test_load_missing_file_returns_defaults() {
        let tmp_dir = TempDir::new().unwrap();
        let missing_path = tmp_dir.path().join("missing-config.yaml");
        let config = Config::load(&missing_path).await.unwrap();
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.genie.space_id.is_none());
    }

    #[tokio::test]
    async fn test_load_valid_yaml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
genie:
  host: "https://example.cloud.databricks.com/"
  token: "dapi-123"
  space_id: "space-1"
  poll_interval_ms: 500
limits:
  defaults:
    rows: 20
    sql_notes: false
  hard_max:
    rows: 100
admission:
  min_interval_seconds: 1.5
retry:
  max_attempts: 5
  base_delay_seconds: 0.1
sessions:
  max_idle_seconds: 7200
"#
        )
        .unwrap();

        let config = Config::load(file.path()).await.unwrap();
        assert_eq!(config.genie.host(), Some("https://example.cloud.databricks.com"));
        assert_eq!(config.genie.space_id(), Some("space-1"));
        assert_eq!(config.genie.auth(), Some(GenieAuth::Token("dapi-123".into())));
        assert!(config.genie.is_enabled());
        assert_eq!(config.genie.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.limits.defaults.rows, 20);
        assert!(!config.limits.defaults.include_sql);
        assert_eq!(config.limits.defaults.cols, 8); // default
        assert_eq!(config.limits.hard_max.rows, 100);
        assert_eq!(config.limits.hard_max.cols, 50); // default
        assert_eq!(config.admission.min_interval(), Duration::from_millis(1500));
        assert_eq!(config.admission.dedup_window(), Duration::from_secs(8)); // default
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.sessions.max_idle(), Some(Duration::from_secs(7200)));
    }

    #[tokio::test]
    async fn test_load_invalid_yaml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "invalid: yaml: content: [").unwrap();

        let result = Config::load(file.path()).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_config_error_display() {
        let io_error = ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "test",
        ));
        assert!(io_error.to_string().contains("failed to read config file"));
    }

    // ========================================================================
    // GenieConfig Tests
    // ========================================================================

    #[test]
    fn test_service_principal_auth() {
        let genie = GenieConfig {
            host: Some("https://h".into()),
            client_id: Some("id".into()),
            client_secret: Some("secret".into()),
            space_id: Some("s".into()),
            ..GenieConfig::default()
        };
        assert!(genie.uses_service_principal());
        assert!(genie.is_enabled());
    }

    #[test]
    fn test_token_wins_over_client_credentials() {
        let genie = GenieConfig {
            token: Some("t".into()),
            client_id: Some("id".into()),
            client_secret: Some("secret".into()),
            ..GenieConfig::default()
        };
        assert_eq!(genie.auth(), Some(GenieAuth::Token("t".into())));
        assert!(!genie.uses_service_principal());
    }

    #[test]
    fn test_empty_strings_count_as_absent() {
        let genie = GenieConfig {
            host: Some("https://h".into()),
            token: Some(String::new()),
            client_id: Some("id".into()),
            client_secret: Some("  ".into()),
            space_id: Some(String::new()),
            ..GenieConfig::default()
        };
        assert!(genie.auth().is_none());
        assert!(genie.space_id().is_none());
        assert!(!genie.is_enabled());
    }

    #[test]
    fn test_negative_durations_become_zero() {
        let admission = AdmissionConfig {
            min_interval_seconds: -3.0,
            dedup_window_seconds: f64::NAN,
        };
        assert_eq!(admission.min_interval(), Duration::ZERO);
        assert_eq!(admission.dedup_window(), Duration::ZERO);
    }

    // ========================================================================
    // Environment Variable Expansion Tests
    // ========================================================================

    #[test]
    fn test_expand_env_vars_no_vars() {
        let input = "plain string without variables";
        let result = expand_env_vars(input).unwrap();
        assert_eq!(result, input);
    }

    #[test]
    fn test_expand_env_vars_unclosed_brace() {
        let result = expand_env_vars("value: ${UNCLOSED_VAR");
        assert!(matches!(result, Err(ConfigError::UnclosedVarReference)));
    }

    #[test]
    fn test_expand_env_vars_unclosed_brace_with_default() {
        let result = expand_env_vars("value: ${VAR:-default");
        assert!(matches!(result, Err(ConfigError::UnclosedVarReference)));
    }

    #[test]
    fn test_expand_env_vars_required_var() {
        // SAFETY: Single-threaded test
        unsafe { std::env::set_var("GENIE_TEST_VAR_REQUIRED", "test_value") };
        let result = expand_env_vars("prefix ${GENIE_TEST_VAR_REQUIRED} suffix").unwrap();
        assert_eq!(result, "prefix test_value suffix");
        unsafe { std::env::remove_var("GENIE_TEST_VAR_REQUIRED") };
    }

    #[test]
    fn test_expand_env_vars_missing_required_var() {
        // SAFETY: Single-threaded test
        unsafe { std::env::remove_var("GENIE_MISSING_VAR_12345") };
        let result = expand_env_vars("value: ${GENIE_MISSING_VAR_12345}");
        match result {
            Err(ConfigError::MissingEnvVar(name)) => assert_eq!(name, "GENIE_MISSING_VAR_12345"),
            _ => panic!("expected MissingEnvVar error"),
        }
    }

    #[test]
    fn test_expand_env_vars_with_default() {
        // SAFETY: Single-threaded test
        unsafe { std::env::remove_var("GENIE_UNSET_WITH_DEFAULT") };
        let result = expand_env_vars("value: ${GENIE_UNSET_WITH_DEFAULT:-50}").unwrap();
        assert_eq!(result, "value: 50");
    }

    #[test]
    fn test_expand_env_vars_with_empty_default() {
        // SAFETY: Single-threaded test
        unsafe { std::env::remove_var("GENIE_UNSET_EMPTY_DEFAULT") };
        let result = expand_env_vars("value: ${GENIE_UNSET_EMPTY_DEFAULT:-}").unwrap();
        assert_eq!(result, "value: ");
    }

    #[test]
    fn test_expand_env_vars_escaped_dollar() {
        let result = expand_env_vars("price: $$100 and ${GENIE_TEST_ESCAPE:-value}").unwrap();
        assert_eq!(result, "price: $100 and value");
    }

    #[test]
    fn test_expand_env_vars_literal_dollar_without_brace() {
        assert_eq!(expand_env_vars("cost is $50").unwrap(), "cost is $50");
    }

    #[tokio::test]
    async fn test_config_load_with_env_var() {
        // SAFETY: Single-threaded test
        unsafe { std::env::set_var("GENIE_TEST_SPACE", "space-from-env") };

        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
genie:
  space_id: ${{GENIE_TEST_SPACE}}
  token: ${{GENIE_TEST_TOKEN_UNSET:-}}
"#
        )
        .unwrap();

        let config = Config::load(file.path()).await.unwrap();
        assert_eq!(config.genie.space_id(), Some("space-from-env"));
        assert!(config.genie.auth().is_none());

        unsafe { std::env::remove_var("GENIE_TEST_SPACE") };
    }

    #[tokio::test]
    async fn test_config_load_missing_env_var_errors() {
        // SAFETY: Single-threaded test
        unsafe { std::env::remove_var("GENIE_DEFINITELY_MISSING_XYZ") };

        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
genie:
  host: ${{GENIE_DEFINITELY_MISSING_XYZ}}
"#
        )
        .unwrap();

        let err = Config::load(file.path()).await.unwrap_err();
        assert!(err.to_string().contains("GENIE_DEFINITELY_MISSING_XYZ"));
    }
}
