//! CLI command handlers.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use console::Style;
use serde::Serialize;

use lungvision_client::{
    AuthError, FileTokenStorage, LungVisionClient, RetryPolicy, SessionConfig, SessionContext,
    StorageKeys,
};
use lungvision_config::{LoadedConfig, SessionSettings};

pub mod auth;
pub mod config;
pub mod predict;

/// Environment variable read instead of prompting for a password.
pub const PASSWORD_ENV: &str = "LUNGVISION_PASSWORD";

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Merged configuration (files, environment, CLI flags).
    pub loaded: LoadedConfig,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Build a session backed by the configured token file.
    pub fn session(&self) -> Result<SessionContext> {
        let config = &self.loaded.config;
        config.validate()?;

        let keys = StorageKeys {
            access: config.storage.access_token_key().to_string(),
            refresh: config.storage.refresh_token_key().to_string(),
        };
        let token_file = self.loaded.token_file();
        tracing::debug!(path = %token_file.display(), "Using token file");

        let client = LungVisionClient::builder()
            .base_url(config.api.base_url())
            .timeout(config.api.timeout())
            .upload_timeout(config.api.upload_timeout())
            .token_storage(Arc::new(FileTokenStorage::new(token_file, keys)))
            .build()
            .context("Failed to create API client")?;

        Ok(SessionContext::with_config(
            client,
            session_config(&config.session),
        ))
    }

    /// Print a value as pretty JSON.
    pub fn print_json<T: Serialize>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    /// Report a normalized failure and turn it into the command's error.
    pub fn fail(&self, error: AuthError) -> anyhow::Error {
        if self.json_output {
            let output = serde_json::json!({
                "error": error.message,
                "kind": format!("{:?}", error.kind),
                "status": error.status,
                "fields": error.field_errors().into_iter().collect::<std::collections::BTreeMap<_, _>>(),
            });
            if let Ok(text) = serde_json::to_string_pretty(&output) {
                println!("{}", text);
            }
        } else if self.verbose {
            let dim = Style::new().dim();
            for (field, message) in error.field_errors() {
                eprintln!("  {} {}", dim.apply_to(format!("{}:", field)), message);
            }
        }
        error.into()
    }
}

/// Map `[session]` settings onto the client's retry and freshness tuning.
pub fn session_config(settings: &SessionSettings) -> SessionConfig {
    SessionConfig {
        user_stale_after: settings.user_stale_after(),
        query_retry: RetryPolicy::query()
            .with_max_retries(settings.query_retries())
            .with_max_delay(settings.query_max_delay()),
        mutation_retry: RetryPolicy::mutation()
            .with_max_retries(settings.mutation_retries())
            .with_max_delay(settings.mutation_max_delay()),
    }
}

/// Read a secret from `env_var`, or prompt without echo.
pub fn read_secret(prompt: &str, env_var: &str) -> Result<String> {
    if let Ok(value) = std::env::var(env_var)
        && !value.is_empty()
    {
        return Ok(value);
    }
    rpassword::prompt_password(format!("{}: ", prompt)).context("Failed to read password")
}
