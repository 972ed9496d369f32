//! Streaming error types.
//!
//! Every public API in this crate surfaces failures through [`StreamError`].
//! Producer and read failures are reported to callers unchanged; malformed
//! record payloads never become errors (see [`crate::decoder`]).

/// Unified error type for the streaming core.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    // -- Producer errors -----------------------------------------------------
    /// The request that should have produced a response failed before any
    /// fragment arrived.
    #[error("request failed: {reason}")]
    RequestFailed { reason: String },

    /// The upstream API answered with a non-success HTTP status.
    #[error("http status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    // -- Read errors ---------------------------------------------------------
    /// A read on an already-established response body failed mid-stream.
    #[error("stream read failed: {reason}")]
    ReadFailed { reason: String },

    // -- Outcomes ------------------------------------------------------------
    /// The stream was cancelled through its session handle.
    ///
    /// Sessions never report this through `on_error`; it only appears when
    /// an aborted outcome is converted into a `Result`.
    #[error("stream aborted after {} bytes of text", partial_text.len())]
    Aborted { partial_text: String },

    // -- Listener errors -----------------------------------------------------
    /// A stream listener rejected an event.
    #[error("listener error: {reason}")]
    Listener { reason: String },

    // -- Configuration errors ------------------------------------------------
    /// Configuration loading or validation failed.
    #[error("config error: {reason}")]
    Config { reason: String },

    /// Reading a configuration file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A configuration file is not valid TOML for the expected schema.
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    // -- Serialization -------------------------------------------------------
    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    // -- Generic -------------------------------------------------------------
    /// Catch-all for unexpected internal errors.  Prefer a typed variant
    /// whenever possible.
    #[error("internal stream error: {0}")]
    Internal(String),
}

impl StreamError {
    /// Whether a request that failed with this error may succeed if sent
    /// again.
    ///
    /// Rate limiting (429), server-side failures (5xx) and transport-level
    /// request failures are transient.  Everything else is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RequestFailed { .. } => true,
            Self::HttpStatus { status, .. } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }
}

/// Convenience alias used throughout the streaming crate.
pub type Result<T> = std::result::Result<T, StreamError>;

impl From<reqwest::Error> for StreamError {
    fn from(err: reqwest::Error) -> Self {
        Self::RequestFailed {
            reason: err.to_string(),
        }
    }
}
