//! Lung Vision - command-line client for the Lung Vision diagnosis service
//!
//! Main entry point for the `lungvision` CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{auth, config, predict};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Lung Vision - sign in and submit CT studies for lung cancer classification
#[derive(Parser)]
#[command(name = "lungvision")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// API base URL (default: http://localhost:8000/api)
    #[arg(long, global = true, env = "LUNGVISION_API_BASE_URL")]
    pub server: Option<String>,

    /// Directory holding config.toml, tokens.json and logs
    #[arg(long, global = true, env = "LUNGVISION_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in, register and manage the stored session
    Auth(auth::AuthArgs),

    /// Upload a zipped CT study for prediction
    Predict(predict::PredictArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_dir = cli
        .config_dir
        .clone()
        .or_else(lungvision_config::user_config_dir);

    // Console (stderr, human-readable) + rotating JSON file
    let filter = if cli.verbose {
        "lungvision=debug,lungvision_client=debug,lungvision_config=debug,info"
    } else {
        "lungvision=warn,lungvision_client=warn,lungvision_config=warn,warn"
    };

    let log_dir = config_dir
        .as_ref()
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "lungvision.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "lungvision=trace,lungvision_client=trace,lungvision_config=trace,info",
                )),
        )
        .init();

    let mut loaded = lungvision_config::load_config_with_options(None, config_dir.as_deref())?;
    for warning in &loaded.warnings {
        tracing::warn!("{}", warning);
    }
    if let Some(server) = cli.server {
        loaded.config.api.base_url = Some(server);
    }

    let ctx = commands::Context {
        loaded,
        json_output: cli.json,
        verbose: cli.verbose,
    };

    // Dispatch to command handlers
    match cli.command {
        Commands::Auth(args) => auth::run(args, &ctx).await,
        Commands::Predict(args) => predict::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    }
}
