//! CLI entry point for Streamline.
//!
//! This binary provides the `streamline` command with subcommands for
//! streaming a chat completion, replaying a captured response body, and
//! inspecting the effective configuration.

mod cli;
mod commands;
mod helpers;

use anyhow::Result;
use clap::Parser;

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    helpers::init_tracing(&cli.log_level);

    // A missing .env file is normal.
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "loaded .env");
    }

    let source = helpers::resolve_config_path(cli.config.as_deref());
    let config = helpers::load_config(source.as_deref())?;

    match cli.command {
        Commands::Chat(args) => commands::cmd_chat(&config, args).await,
        Commands::Replay(args) => commands::cmd_replay(&config, args).await,
        Commands::Config { path } => commands::cmd_config(&config, source.as_deref(), path),
    }
}
