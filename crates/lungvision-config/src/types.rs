//! Configuration types mapping to the TOML schema.
//!
//! ```toml
//! [api]
//! base_url = "http://localhost:8000/api"
//! timeout_ms = 10000
//! upload_timeout_secs = 600
//!
//! [storage]
//! access_token_key = "access_token"
//! refresh_token_key = "refresh_token"
//! token_file = "/path/to/tokens.json"
//!
//! [session]
//! user_stale_secs = 300
//! query_retries = 2
//! query_max_delay_secs = 30
//! mutation_retries = 1
//! mutation_max_delay_secs = 10
//! ```
//!
//! Every field is optional so partial layers (project-local overrides,
//! environment) merge field by field; accessors supply the defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";
/// Default request timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
/// Default archive upload timeout in seconds.
pub const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 600;
/// Default storage key for the access token.
pub const DEFAULT_ACCESS_TOKEN_KEY: &str = "access_token";
/// Default storage key for the refresh token.
pub const DEFAULT_REFRESH_TOKEN_KEY: &str = "refresh_token";
/// Token file name inside the config directory.
pub const TOKEN_FILE_NAME: &str = "tokens.json";

/// Environment override for the API base URL.
pub const ENV_BASE_URL: &str = "LUNGVISION_API_BASE_URL";
/// Environment override for the request timeout (milliseconds).
pub const ENV_TIMEOUT: &str = "LUNGVISION_API_TIMEOUT";
/// Environment override for the access token storage key.
pub const ENV_ACCESS_TOKEN_KEY: &str = "LUNGVISION_ACCESS_TOKEN_KEY";
/// Environment override for the refresh token storage key.
pub const ENV_REFRESH_TOKEN_KEY: &str = "LUNGVISION_REFRESH_TOKEN_KEY";

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LungVisionConfig {
    pub api: ApiConfig,
    pub storage: StorageConfig,
    pub session: SessionSettings,
}

impl LungVisionConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    pub fn merge(&mut self, other: LungVisionConfig) {
        self.api.merge(other.api);
        self.storage.merge(other.storage);
        self.session.merge(other.session);
    }

    /// Apply `LUNGVISION_*` environment overrides.
    pub fn apply_env(&mut self, warnings: &mut Vec<String>) {
        self.apply_env_with(|name| std::env::var(name).ok(), warnings);
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// Empty values are ignored. Malformed numbers are reported as warnings
    /// and leave the current value in place.
    pub fn apply_env_with(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
        warnings: &mut Vec<String>,
    ) {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(url) = get(ENV_BASE_URL) {
            self.api.base_url = Some(url);
        }
        if let Some(raw) = get(ENV_TIMEOUT) {
            match raw.trim().parse::<u64>() {
                Ok(ms) => self.api.timeout_ms = Some(ms),
                Err(_) => warnings.push(format!(
                    "Ignoring {}={:?}: expected a timeout in milliseconds",
                    ENV_TIMEOUT, raw
                )),
            }
        }
        if let Some(key) = get(ENV_ACCESS_TOKEN_KEY) {
            self.storage.access_token_key = Some(key);
        }
        if let Some(key) = get(ENV_REFRESH_TOKEN_KEY) {
            self.storage.refresh_token_key = Some(key);
        }
    }

    /// Reject values no client could run with.
    pub fn validate(&self) -> Result<()> {
        let url = self.api.base_url();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(invalid("api.base_url", "must start with http:// or https://"));
        }
        if self.api.timeout_ms == Some(0) {
            return Err(invalid("api.timeout_ms", "must be greater than zero"));
        }
        if self.api.upload_timeout_secs == Some(0) {
            return Err(invalid("api.upload_timeout_secs", "must be greater than zero"));
        }
        if self.storage.access_token_key() == self.storage.refresh_token_key() {
            return Err(invalid(
                "storage.refresh_token_key",
                "must differ from storage.access_token_key",
            ));
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn overlay<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// [api]
// ─────────────────────────────────────────────────────────────────────────────

/// Remote API settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL, e.g. `https://lungvision.example.org/api`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Per-request timeout in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Timeout for study archive uploads in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_timeout_secs: Option<u64>,
}

impl ApiConfig {
    fn merge(&mut self, other: ApiConfig) {
        overlay(&mut self.base_url, other.base_url);
        overlay(&mut self.timeout_ms, other.timeout_ms);
        overlay(&mut self.upload_timeout_secs, other.upload_timeout_secs);
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS))
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(
            self.upload_timeout_secs
                .unwrap_or(DEFAULT_UPLOAD_TIMEOUT_SECS),
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// [storage]
// ─────────────────────────────────────────────────────────────────────────────

/// Where and under which names the token pair is persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token_key: Option<String>,

    /// Token file path. Default: `<config dir>/tokens.json`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_file: Option<PathBuf>,
}

impl StorageConfig {
    fn merge(&mut self, other: StorageConfig) {
        overlay(&mut self.access_token_key, other.access_token_key);
        overlay(&mut self.refresh_token_key, other.refresh_token_key);
        overlay(&mut self.token_file, other.token_file);
    }

    pub fn access_token_key(&self) -> &str {
        self.access_token_key
            .as_deref()
            .unwrap_or(DEFAULT_ACCESS_TOKEN_KEY)
    }

    pub fn refresh_token_key(&self) -> &str {
        self.refresh_token_key
            .as_deref()
            .unwrap_or(DEFAULT_REFRESH_TOKEN_KEY)
    }

    /// Configured token file, or `tokens.json` inside `config_dir`.
    pub fn effective_token_file(&self, config_dir: &Path) -> PathBuf {
        self.token_file
            .clone()
            .unwrap_or_else(|| config_dir.join(TOKEN_FILE_NAME))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// [session]
// ─────────────────────────────────────────────────────────────────────────────

/// Session cache freshness and retry tuning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Seconds a fetched user stays fresh. Default: 300.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_stale_secs: Option<u64>,

    /// Retries for reads. Default: 2.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_retries: Option<u32>,

    /// Backoff cap for reads in seconds. Default: 30.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_max_delay_secs: Option<u64>,

    /// Retries for writes. Default: 1.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mutation_retries: Option<u32>,

    /// Backoff cap for writes in seconds. Default: 10.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mutation_max_delay_secs: Option<u64>,
}

impl SessionSettings {
    fn merge(&mut self, other: SessionSettings) {
        overlay(&mut self.user_stale_secs, other.user_stale_secs);
        overlay(&mut self.query_retries, other.query_retries);
        overlay(&mut self.query_max_delay_secs, other.query_max_delay_secs);
        overlay(&mut self.mutation_retries, other.mutation_retries);
        overlay(&mut self.mutation_max_delay_secs, other.mutation_max_delay_secs);
    }

    pub fn user_stale_after(&self) -> Duration {
        Duration::from_secs(self.user_stale_secs.unwrap_or(300))
    }

    pub fn query_retries(&self) -> u32 {
        self.query_retries.unwrap_or(2)
    }

    pub fn query_max_delay(&self) -> Duration {
        Duration::from_secs(self.query_max_delay_secs.unwrap_or(30))
    }

    pub fn mutation_retries(&self) -> u32 {
        self.mutation_retries.unwrap_or(1)
    }

    pub fn mutation_max_delay(&self) -> Duration {
        Duration::from_secs(self.mutation_max_delay_secs.unwrap_or(10))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = LungVisionConfig::new();
        assert_eq!(config.api.base_url(), "http://localhost:8000/api");
        assert_eq!(config.api.timeout(), Duration::from_secs(10));
        assert_eq!(config.api.upload_timeout(), Duration::from_secs(600));
        assert_eq!(config.storage.access_token_key(), "access_token");
        assert_eq!(config.storage.refresh_token_key(), "refresh_token");
        assert_eq!(config.session.user_stale_after(), Duration::from_secs(300));
        assert_eq!(config.session.query_retries(), 2);
        assert_eq!(config.session.mutation_retries(), 1);
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_partial() {
        let config = LungVisionConfig::from_toml(
            r#"
[api]
base_url = "https://lv.example.org/api"

[session]
query_retries = 0
"#,
        )
        .unwrap();
        assert_eq!(config.api.base_url(), "https://lv.example.org/api");
        assert_eq!(config.api.timeout(), Duration::from_secs(10));
        assert_eq!(config.session.query_retries(), 0);
    }

    #[test]
    fn test_unknown_section_is_ignored() {
        let config = LungVisionConfig::from_toml("[ui]\ntheme = \"dark\"\n").unwrap();
        assert_eq!(config, LungVisionConfig::default());
    }

    #[test]
    fn test_merge_is_field_level() {
        let mut base = LungVisionConfig::from_toml(
            r#"
[api]
base_url = "https://user.example.org/api"
timeout_ms = 5000
"#,
        )
        .unwrap();
        let project = LungVisionConfig::from_toml(
            r#"
[api]
base_url = "https://project.example.org/api"
"#,
        )
        .unwrap();

        base.merge(project);
        assert_eq!(base.api.base_url(), "https://project.example.org/api");
        assert_eq!(base.api.timeout_ms, Some(5000));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_BASE_URL, "https://env.example.org/api"),
            (ENV_TIMEOUT, "2500"),
            (ENV_ACCESS_TOKEN_KEY, "lv_access"),
            (ENV_REFRESH_TOKEN_KEY, ""),
        ]);
        let mut config = LungVisionConfig::new();
        let mut warnings = Vec::new();
        config.apply_env_with(|name| env.get(name).map(|v| v.to_string()), &mut warnings);

        assert!(warnings.is_empty());
        assert_eq!(config.api.base_url(), "https://env.example.org/api");
        assert_eq!(config.api.timeout(), Duration::from_millis(2500));
        assert_eq!(config.storage.access_token_key(), "lv_access");
        assert_eq!(config.storage.refresh_token_key(), "refresh_token");
    }

    #[test]
    fn test_bad_env_timeout_warns() {
        let mut config = LungVisionConfig::new();
        config.api.timeout_ms = Some(4000);
        let mut warnings = Vec::new();
        config.apply_env_with(
            |name| (name == ENV_TIMEOUT).then(|| "soon".to_string()),
            &mut warnings,
        );
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains(ENV_TIMEOUT));
        assert_eq!(config.api.timeout_ms, Some(4000));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = LungVisionConfig::new();
        config.api.base_url = Some("localhost:8000".into());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { ref field, .. }) if field == "api.base_url"
        ));

        let mut config = LungVisionConfig::new();
        config.storage.refresh_token_key = Some("access_token".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_token_file_default() {
        let storage = StorageConfig::default();
        assert_eq!(
            storage.effective_token_file(Path::new("/cfg")),
            PathBuf::from("/cfg/tokens.json")
        );
    }

    #[test]
    fn test_round_trip_skips_unset() {
        let mut config = LungVisionConfig::new();
        config.api.base_url = Some("https://lv.example.org/api".into());
        let text = config.to_toml().unwrap();
        assert!(text.contains("base_url"));
        assert!(!text.contains("timeout_ms"));
        assert_eq!(LungVisionConfig::from_toml(&text).unwrap(), config);
    }
}
