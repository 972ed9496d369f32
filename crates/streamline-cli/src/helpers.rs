//! Shared helpers for the Streamline CLI.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use streamline_core::{StreamEvent, StreamlineConfig};
use tracing_subscriber::EnvFilter;

/// Configuration file picked up from the working directory when `--config`
/// is not given.
pub const DEFAULT_CONFIG_FILE: &str = "streamline.toml";

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `default_level`.  Output goes to stderr
/// so that streamed text on stdout stays clean.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// The configuration file to load: the explicit path, else
/// [`DEFAULT_CONFIG_FILE`] if it exists in the working directory.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => {
            let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
            fallback.is_file().then_some(fallback)
        }
    }
}

/// Load, override from the environment, and validate the configuration.
pub fn load_config(path: Option<&Path>) -> Result<StreamlineConfig> {
    let mut config = match path {
        Some(path) => StreamlineConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => {
            tracing::debug!("no configuration file; using defaults");
            StreamlineConfig::default()
        }
    };

    config.apply_env();
    config.validate().context("invalid configuration")?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Render an event as a single JSON line.
pub fn event_line(event: &StreamEvent) -> Result<String> {
    serde_json::to_string(event).context("failed to serialize stream event")
}
