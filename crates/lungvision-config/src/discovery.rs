//! Config file discovery and layered merging.
//!
//! Resolution order (later overrides earlier):
//! 1. `~/.config/lungvision/config.toml` (user config)
//! 2. `./lungvision.toml` (project-local)
//! 3. `LUNGVISION_*` environment variables
//! 4. CLI arguments (handled externally)

use std::path::{Path, PathBuf};

use crate::{ConfigError, LungVisionConfig, Result};

/// Default config filename for project-local config.
const PROJECT_CONFIG_FILE: &str = "lungvision.toml";

/// Default config filename within the user config directory.
const USER_CONFIG_FILE: &str = "config.toml";

/// Application name for config directory resolution.
const APP_NAME: &str = "lungvision";

/// Environment variable to override the config directory.
pub const CONFIG_DIR_ENV: &str = "LUNGVISION_CONFIG_DIR";

/// Tracks where each config layer was loaded from.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    /// Path to the config file.
    pub path: PathBuf,
    /// Whether the file was found and loaded.
    pub loaded: bool,
}

/// Result of config discovery and loading.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The merged configuration.
    pub config: LungVisionConfig,
    /// Sources that were checked, in order of precedence (lowest first).
    pub sources: Vec<ConfigSource>,
    /// Directory holding the user config (and, by default, the token file).
    pub config_dir: Option<PathBuf>,
    /// Warnings generated during loading (unreadable layers, bad env values).
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    /// Get paths of sources that were actually loaded.
    pub fn loaded_from(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .filter(|s| s.loaded)
            .map(|s| s.path.as_path())
            .collect()
    }

    /// Where the token pair is persisted.
    ///
    /// Falls back to `./tokens.json` when no config directory could be
    /// determined.
    pub fn token_file(&self) -> PathBuf {
        let dir = self
            .config_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        self.config.storage.effective_token_file(&dir)
    }

    /// Path of the user config file, for `save_config`.
    pub fn user_config_path(&self) -> Option<PathBuf> {
        self.config_dir.as_ref().map(|d| d.join(USER_CONFIG_FILE))
    }
}

/// Load configuration by discovering and merging all config layers.
pub fn load_config(project_dir: Option<&Path>) -> Result<LoadedConfig> {
    load_config_with_options(project_dir, None)
}

/// Load configuration with explicit control over the user config directory.
///
/// `config_dir` overrides both `LUNGVISION_CONFIG_DIR` and the platform
/// default.
pub fn load_config_with_options(
    project_dir: Option<&Path>,
    config_dir: Option<&Path>,
) -> Result<LoadedConfig> {
    let mut config = LungVisionConfig::new();
    let mut sources = Vec::new();
    let mut warnings = Vec::new();

    // 1. User config: explicit override, then env var, then platform default
    let config_dir = match config_dir {
        Some(dir) => Some(dir.to_path_buf()),
        None => user_config_dir(),
    };
    if let Some(dir) = &config_dir {
        sources.push(load_layer(&mut config, &dir.join(USER_CONFIG_FILE), &mut warnings));
    }

    // 2. Project-local config
    let project_path = project_dir
        .map(|d| d.join(PROJECT_CONFIG_FILE))
        .unwrap_or_else(|| PathBuf::from(PROJECT_CONFIG_FILE));
    sources.push(load_layer(&mut config, &project_path, &mut warnings));

    // 3. Environment
    config.apply_env(&mut warnings);

    Ok(LoadedConfig {
        config,
        sources,
        config_dir,
        warnings,
    })
}

/// Load config from a specific file path (no discovery).
pub fn load_config_file(path: &Path) -> Result<LungVisionConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    LungVisionConfig::from_toml(&contents)
}

/// Save configuration to a file.
///
/// Creates parent directories if they don't exist.
pub fn save_config(config: &LungVisionConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteFile {
            path: parent.display().to_string(),
            source: e,
        })?;
    }

    let contents = config.to_toml()?;
    std::fs::write(path, contents).map_err(|e| ConfigError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(())
}

/// Get the user config directory for lungvision.
///
/// Checks `LUNGVISION_CONFIG_DIR` first, then falls back to the platform
/// default (`~/.config/lungvision` on Linux).
pub fn user_config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Try to load a config file and merge it into the existing config.
fn load_layer(config: &mut LungVisionConfig, path: &Path, warnings: &mut Vec<String>) -> ConfigSource {
    if !path.is_file() {
        return ConfigSource {
            path: path.to_path_buf(),
            loaded: false,
        };
    }

    let loaded = match load_config_file(path) {
        Ok(layer) => {
            config.merge(layer);
            true
        }
        Err(e) => {
            warnings.push(format!("Failed to load {}: {}", path.display(), e));
            false
        }
    };
    ConfigSource {
        path: path.to_path_buf(),
        loaded,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[api]
base_url = "https://lv.example.org/api"
timeout_ms = 3000
"#,
        )
        .unwrap();

        let config = load_config_file(&path).unwrap();
        assert_eq!(config.api.base_url(), "https://lv.example.org/api");
        assert_eq!(config.api.timeout_ms, Some(3000));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let err = load_config_file(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "this is not valid toml {{{{").unwrap();

        let err = load_config_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_config_no_files() {
        let project = TempDir::new().unwrap();
        let empty_config_dir = TempDir::new().unwrap();
        let loaded =
            load_config_with_options(Some(project.path()), Some(empty_config_dir.path())).unwrap();
        assert!(loaded.loaded_from().is_empty());
        assert_eq!(
            loaded.token_file(),
            empty_config_dir.path().join("tokens.json")
        );
    }

    #[test]
    fn test_load_config_layered_merge() {
        let user_dir = TempDir::new().unwrap();
        let project_dir = TempDir::new().unwrap();

        fs::write(
            user_dir.path().join("config.toml"),
            r#"
[api]
base_url = "https://user.example.org/api"
timeout_ms = 4000

[storage]
access_token_key = "lv_access"
"#,
        )
        .unwrap();
        fs::write(
            project_dir.path().join("lungvision.toml"),
            r#"
[api]
base_url = "https://project.example.org/api"
"#,
        )
        .unwrap();

        let loaded =
            load_config_with_options(Some(project_dir.path()), Some(user_dir.path())).unwrap();
        let config = &loaded.config;

        // Project-local overrides user config, field by field
        assert_eq!(config.api.base_url(), "https://project.example.org/api");
        assert_eq!(config.api.timeout_ms, Some(4000));
        assert_eq!(config.storage.access_token_key(), "lv_access");
        assert_eq!(loaded.loaded_from().len(), 2);
    }

    #[test]
    fn test_malformed_config_warns_but_continues() {
        let project_dir = TempDir::new().unwrap();
        let user_dir = TempDir::new().unwrap();
        fs::write(project_dir.path().join("lungvision.toml"), "not valid toml {{{{").unwrap();

        let loaded =
            load_config_with_options(Some(project_dir.path()), Some(user_dir.path())).unwrap();
        assert!(!loaded.warnings.is_empty());
        assert!(loaded.warnings[0].contains("Failed to load"));
        assert!(loaded.loaded_from().is_empty());
    }

    #[test]
    fn test_configured_token_file_wins() {
        let project_dir = TempDir::new().unwrap();
        let user_dir = TempDir::new().unwrap();
        fs::write(
            project_dir.path().join("lungvision.toml"),
            "[storage]\ntoken_file = \"/var/lib/lv/tokens.json\"\n",
        )
        .unwrap();

        let loaded =
            load_config_with_options(Some(project_dir.path()), Some(user_dir.path())).unwrap();
        assert_eq!(loaded.token_file(), PathBuf::from("/var/lib/lv/tokens.json"));
    }

    #[test]
    fn test_save_config_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = LungVisionConfig::new();
        config.api.base_url = Some("https://saved.example.org/api".into());
        save_config(&config, &path).unwrap();

        assert_eq!(load_config_file(&path).unwrap(), config);
    }
}
