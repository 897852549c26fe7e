//! Configuration for Lung Vision clients.
//!
//! Provides TOML-based configuration with:
//! - API location and timeouts (`[api]`)
//! - Token persistence keys and file (`[storage]`)
//! - Session cache and retry tuning (`[session]`)
//! - Config file layering (user config + project-local overrides)
//! - `LUNGVISION_*` environment overrides

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    CONFIG_DIR_ENV, ConfigSource, LoadedConfig, load_config, load_config_file,
    load_config_with_options, save_config, user_config_dir,
};
pub use error::{ConfigError, Result};
pub use types::*;
