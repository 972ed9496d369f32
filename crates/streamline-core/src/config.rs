//! Configuration.
//!
//! [`StreamlineConfig`] is loaded from TOML and may be overridden by
//! environment variables.  Every section has defaults, so an empty file (or
//! no file) yields a working configuration for the public OpenAI endpoint.
//!
//! ```toml
//! [client]
//! base_url = "http://localhost:11434/v1"
//! model = "llama3.1"
//! request_timeout_secs = 60
//!
//! [retry]
//! max_retries = 3
//! initial_delay_ms = 250
//!
//! [stream]
//! decoder = "plain"
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::api::RetryPolicy;
use crate::decoder::{ChatCompletionsDecoder, PlainTextDecoder, RecordDecoder};
use crate::error::{Result, StreamError};

/// Overrides [`ClientConfig::base_url`].
pub const ENV_BASE_URL: &str = "STREAMLINE_BASE_URL";
/// Overrides [`ClientConfig::model`].
pub const ENV_MODEL: &str = "STREAMLINE_MODEL";
/// Overrides [`ClientConfig::api_key`].
pub const ENV_API_KEY: &str = "STREAMLINE_API_KEY";

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const REDACTED: &str = "********";

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamlineConfig {
    /// Upstream API endpoint.
    pub client: ClientConfig,
    /// Retry policy for the HTTP client.
    pub retry: RetryConfig,
    /// Session and bus settings.
    pub stream: StreamConfig,
}

/// `[client]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of an OpenAI-compatible API, without `/chat/completions`.
    pub base_url: String,
    /// Model used when a request does not name one.
    pub model: String,
    /// Bearer token.  Empty means no `Authorization` header is sent.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub api_key: String,
    /// Default completion token limit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Whole-request timeout, including reading a streamed body.
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            model: DEFAULT_MODEL.to_owned(),
            api_key: String::new(),
            max_tokens: None,
            request_timeout_secs: 120,
        }
    }
}

impl ClientConfig {
    /// Request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// `[retry]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 = no retries).
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay_ms: u64,
    /// Multiplier applied to the delay after each retry.
    pub backoff_factor: f64,
    /// Upper bound for the delay.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay_ms: 500,
            backoff_factor: 2.0,
            max_delay_ms: 10_000,
        }
    }
}

/// `[stream]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Capacity of the event bus channel.
    pub bus_capacity: usize,
    /// Which record decoder sessions use.
    pub decoder: DecoderKind,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            bus_capacity: 256,
            decoder: DecoderKind::ChatCompletions,
        }
    }
}

/// Selects a [`RecordDecoder`] implementation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecoderKind {
    /// [`ChatCompletionsDecoder`].
    #[default]
    ChatCompletions,
    /// [`PlainTextDecoder`].
    Plain,
}

impl DecoderKind {
    /// Instantiate the decoder.
    pub fn build(self) -> Arc<dyn RecordDecoder> {
        match self {
            Self::ChatCompletions => Arc::new(ChatCompletionsDecoder),
            Self::Plain => Arc::new(PlainTextDecoder),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl StreamlineConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        tracing::info!(path = %path.display(), "configuration loaded from file");
        Ok(config)
    }

    /// Apply `STREAMLINE_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    /// Apply `STREAMLINE_*` overrides read through `lookup`.
    ///
    /// Empty values are ignored.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(base_url) = read(ENV_BASE_URL) {
            tracing::debug!(var = ENV_BASE_URL, "base_url overridden from environment");
            self.client.base_url = base_url;
        }
        if let Some(model) = read(ENV_MODEL) {
            tracing::debug!(var = ENV_MODEL, "model overridden from environment");
            self.client.model = model;
        }
        if let Some(api_key) = read(ENV_API_KEY) {
            tracing::debug!(var = ENV_API_KEY, "api_key overridden from environment");
            self.client.api_key = api_key;
        }
    }

    /// Check values that would only fail later at request time.
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.client.base_url).map_err(|e| StreamError::Config {
            reason: format!("invalid client.base_url `{}`: {e}", self.client.base_url),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(StreamError::Config {
                reason: format!("client.base_url must be http or https, got `{}`", url.scheme()),
            });
        }
        if self.client.model.trim().is_empty() {
            return Err(StreamError::Config {
                reason: "client.model must not be empty".into(),
            });
        }
        if !(self.retry.backoff_factor.is_finite() && self.retry.backoff_factor > 0.0) {
            return Err(StreamError::Config {
                reason: format!(
                    "retry.backoff_factor must be positive, got {}",
                    self.retry.backoff_factor
                ),
            });
        }
        if self.stream.bus_capacity == 0 {
            return Err(StreamError::Config {
                reason: "stream.bus_capacity must be at least 1".into(),
            });
        }
        Ok(())
    }

    // -- Derived values ------------------------------------------------------

    /// Retry policy built from the `[retry]` section.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from(&self.retry)
    }

    /// A copy with the API key masked, for display.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if !config.client.api_key.is_empty() {
            config.client.api_key = REDACTED.to_owned();
        }
        config
    }

    /// Serialize as pretty TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| StreamError::Config {
            reason: format!("failed to serialize configuration: {e}"),
        })
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            backoff_factor: config.backoff_factor,
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = StreamlineConfig::from_toml_str("").unwrap();
        assert_eq!(config, StreamlineConfig::default());
        assert_eq!(config.client.base_url, "https://api.openai.com/v1");
        assert_eq!(config.stream.decoder, DecoderKind::ChatCompletions);
        config.validate().unwrap();
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = StreamlineConfig::from_toml_str(
            r#"
            [client]
            model = "llama3.1"
            max_tokens = 512

            [retry]
            max_retries = 5

            [stream]
            decoder = "plain"
            "#,
        )
        .unwrap();

        assert_eq!(config.client.model, "llama3.1");
        assert_eq!(config.client.max_tokens, Some(512));
        assert_eq!(config.client.request_timeout_secs, 120);
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.initial_delay_ms, 500);
        assert_eq!(config.stream.decoder, DecoderKind::Plain);
        assert_eq!(config.stream.bus_capacity, 256);
    }

    #[test]
    fn unknown_decoder_is_rejected() {
        let err = StreamlineConfig::from_toml_str("[stream]\ndecoder = \"xml\"\n").unwrap_err();
        assert!(matches!(err, StreamError::Toml(_)));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[client]\nbase_url = \"http://127.0.0.1:8080/v1\"").unwrap();

        let config = StreamlineConfig::load(file.path()).unwrap();
        assert_eq!(config.client.base_url, "http://127.0.0.1:8080/v1");
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = StreamlineConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, StreamError::Io(_)));
    }

    #[test]
    fn env_overrides_ignore_empty_values() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_BASE_URL, "http://localhost:11434/v1"),
            (ENV_MODEL, ""),
            (ENV_API_KEY, "sk-env"),
        ]);

        let mut config = StreamlineConfig::default();
        config.apply_env_from(|name| vars.get(name).map(|v| (*v).to_owned()));

        assert_eq!(config.client.base_url, "http://localhost:11434/v1");
        assert_eq!(config.client.model, "gpt-4o-mini");
        assert_eq!(config.client.api_key, "sk-env");
    }

    #[test]
    fn validation_failures() {
        let mut config = StreamlineConfig::default();
        config.client.base_url = "not a url".into();
        assert!(matches!(config.validate(), Err(StreamError::Config { .. })));

        let mut config = StreamlineConfig::default();
        config.client.base_url = "ftp://example.com".into();
        assert!(config.validate().is_err());

        let mut config = StreamlineConfig::default();
        config.retry.backoff_factor = 0.0;
        assert!(config.validate().is_err());

        let mut config = StreamlineConfig::default();
        config.stream.bus_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn redacted_toml_hides_api_key() {
        let mut config = StreamlineConfig::default();
        config.client.api_key = "sk-secret".into();

        let rendered = config.redacted().to_toml_string().unwrap();
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("api_key = \"********\""));

        // Round-trips through the parser.
        let parsed = StreamlineConfig::from_toml_str(&rendered).unwrap();
        assert_eq!(parsed.client.model, config.client.model);
    }

    #[test]
    fn retry_policy_from_section() {
        let policy = StreamlineConfig::default().retry_policy();
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.initial_delay, Duration::from_millis(500));
        assert_eq!(policy.max_delay, Duration::from_secs(10));
    }
}
