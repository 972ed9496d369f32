//! CLI argument definitions for Streamline.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Streamline -- stream chat completions to the terminal.
#[derive(Parser)]
#[command(
    name = "streamline",
    version,
    about = "Streamline -- stream chat completions to the terminal",
    long_about = "Streams completions from any OpenAI-compatible endpoint, reassembling \
                  SSE records as they arrive.  Ctrl-C cancels a stream in flight."
)]
pub struct Cli {
    /// Path to a TOML configuration file (default: ./streamline.toml if present).
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "warn", value_name = "LEVEL")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Send a prompt and stream the reply to stdout.
    Chat(ChatArgs),

    /// Feed a captured response body through a session.
    Replay(ReplayArgs),

    /// Print the effective configuration.
    Config {
        /// Print only the path of the configuration file in use.
        #[arg(long)]
        path: bool,
    },
}

#[derive(Args, Debug)]
pub struct ChatArgs {
    /// The user prompt.
    pub prompt: String,

    /// Optional system prompt.
    #[arg(long, short)]
    pub system: Option<String>,

    /// Model to use instead of the configured one.
    #[arg(long, short)]
    pub model: Option<String>,

    /// Request the whole reply at once instead of a stream.
    #[arg(long)]
    pub no_stream: bool,

    /// Abort the stream after this many seconds.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Print every stream event to stderr as a JSON line.
    #[arg(long)]
    pub events: bool,
}

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// File holding a raw SSE or plain-text response body.
    pub file: PathBuf,

    /// Size of the fragments the file is split into.
    #[arg(long, default_value_t = 64, value_name = "N")]
    pub chunk_size: usize,

    /// Treat every line as plain text instead of SSE records.
    #[arg(long)]
    pub plain: bool,
}
