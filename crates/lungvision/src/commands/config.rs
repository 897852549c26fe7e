//! Config command - configuration management.

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Args, Subcommand};
use serde::Serialize;

use lungvision_config::{LungVisionConfig, save_config};

use super::Context;

/// Project-local config file created by `config init --local`.
const LOCAL_CONFIG_FILE: &str = "lungvision.toml";

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the resolved configuration and where it came from
    Show,

    /// Show configuration file paths
    Path,

    /// Initialize a config file with defaults
    Init {
        /// Create project-local config (./lungvision.toml) instead of user config
        #[arg(long)]
        local: bool,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Resolved values for JSON output.
#[derive(Debug, Serialize)]
struct ShowOutput {
    sources: Vec<String>,
    warnings: Vec<String>,
    base_url: String,
    timeout_ms: u128,
    upload_timeout_secs: u64,
    access_token_key: String,
    refresh_token_key: String,
    token_file: String,
    user_stale_secs: u64,
    query_retries: u32,
    mutation_retries: u32,
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Path => cmd_path(ctx),
        ConfigCommand::Init { local, force } => cmd_init(ctx, local, force),
    }
}

fn cmd_show(ctx: &Context) -> Result<()> {
    let loaded = &ctx.loaded;
    let config = &loaded.config;

    let output = ShowOutput {
        sources: loaded
            .loaded_from()
            .iter()
            .map(|p| p.display().to_string())
            .collect(),
        warnings: loaded.warnings.clone(),
        base_url: config.api.base_url().to_string(),
        timeout_ms: config.api.timeout().as_millis(),
        upload_timeout_secs: config.api.upload_timeout().as_secs(),
        access_token_key: config.storage.access_token_key().to_string(),
        refresh_token_key: config.storage.refresh_token_key().to_string(),
        token_file: loaded.token_file().display().to_string(),
        user_stale_secs: config.session.user_stale_after().as_secs(),
        query_retries: config.session.query_retries(),
        mutation_retries: config.session.mutation_retries(),
    };

    if ctx.json_output {
        return ctx.print_json(&output);
    }

    println!("# Lung Vision Configuration\n");

    if output.sources.is_empty() {
        println!("No config files loaded (using defaults)\n");
    } else {
        println!("Config files:");
        for source in &output.sources {
            println!("  {}", source);
        }
        println!();
    }

    println!("[api]");
    println!("  base_url            = {}", output.base_url);
    println!("  timeout_ms          = {}", output.timeout_ms);
    println!("  upload_timeout_secs = {}", output.upload_timeout_secs);
    println!();
    println!("[storage]");
    println!("  access_token_key    = {}", output.access_token_key);
    println!("  refresh_token_key   = {}", output.refresh_token_key);
    println!("  token_file          = {}", output.token_file);
    println!();
    println!("[session]");
    println!("  user_stale_secs     = {}", output.user_stale_secs);
    println!("  query_retries       = {}", output.query_retries);
    println!("  mutation_retries    = {}", output.mutation_retries);

    if !output.warnings.is_empty() {
        println!();
        println!("Warnings:");
        for warning in &output.warnings {
            println!("  {}", warning);
        }
    }

    if let Err(e) = config.validate() {
        println!();
        println!("Invalid configuration: {}", e);
    }

    Ok(())
}

fn cmd_path(ctx: &Context) -> Result<()> {
    let user = ctx.loaded.user_config_path();

    if ctx.json_output {
        return ctx.print_json(&serde_json::json!({
            "user_config": user.as_ref().map(|p| p.display().to_string()),
            "project_config": LOCAL_CONFIG_FILE,
            "token_file": ctx.loaded.token_file().display().to_string(),
        }));
    }

    match &user {
        Some(path) => println!("User config:    {}", path.display()),
        None => println!("User config:    (could not determine config directory)"),
    }
    println!("Project config: ./{}", LOCAL_CONFIG_FILE);
    println!("Token file:     {}", ctx.loaded.token_file().display());
    Ok(())
}

fn cmd_init(ctx: &Context, local: bool, force: bool) -> Result<()> {
    let path = if local {
        PathBuf::from(LOCAL_CONFIG_FILE)
    } else {
        match ctx.loaded.user_config_path() {
            Some(path) => path,
            None => bail!("Could not determine config directory"),
        }
    };

    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    save_config(&starter_config(), &path)?;

    if ctx.json_output {
        return ctx.print_json(&serde_json::json!({ "created": path.display().to_string() }));
    }
    println!("Created {}", path.display());
    Ok(())
}

/// A config with the API section spelled out, ready for editing.
fn starter_config() -> LungVisionConfig {
    let mut config = LungVisionConfig::new();
    config.api.base_url = Some(lungvision_config::DEFAULT_BASE_URL.to_string());
    config.api.timeout_ms = Some(lungvision_config::DEFAULT_TIMEOUT_MS);
    config.api.upload_timeout_secs = Some(lungvision_config::DEFAULT_UPLOAD_TIMEOUT_SECS);
    config
}
