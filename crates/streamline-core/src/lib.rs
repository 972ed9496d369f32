//! Streaming response handling for Streamline.
//!
//! This crate consumes incremental, chunk-delivered network responses (plain
//! text or SSE `data: ` framing), reassembles them into logical records
//! regardless of where byte-chunk boundaries fall, and reports progress
//! through per-call callbacks and lifecycle events.  Sessions can be
//! cancelled mid-stream.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐   ┌───────────────┐   ┌────────────┐   ┌───────────────┐
//! │ ApiStreamAdapter │──>│ StreamSession │──>│ LineFramer │──>│ RecordDecoder │
//! │ (ApiClient)      │   │ (read loop)   │   │ (UTF-8)    │   │ (SSE / plain) │
//! └──────────────────┘   └───────┬───────┘   └────────────┘   └───────────────┘
//!                                │
//!                      ┌─────────┴─────────┐
//!                      │ callbacks         │
//!                      │ EventNotifier ──> StreamBus
//!                      └───────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`framer`] -- Newline framing of raw fragments.
//! - [`decoder`] -- Line to record decoding.
//! - [`transport`] -- Response body shapes handed to sessions.
//! - [`session`] -- The per-call read loop, status and cancellation.
//! - [`notifier`] -- Lifecycle events and listener delivery.
//! - [`bus`] -- Broadcast listener for fan-out to many subscribers.
//! - [`adapter`] -- Normalized results on top of an [`ApiClient`].
//! - [`api`] -- HTTP client for OpenAI-compatible endpoints.
//! - [`config`] -- TOML configuration with environment overrides.
//! - [`error`] -- Error types.

pub mod adapter;
pub mod api;
pub mod bus;
pub mod config;
pub mod decoder;
pub mod error;
pub mod framer;
pub mod notifier;
pub mod session;
pub mod transport;

// Re-export the most commonly used types at the crate root.
pub use adapter::{ApiClient, ApiResult, ApiStreamAdapter};
pub use api::{ChatRequest, HttpApiClient, Message, RetryPolicy, Role};
pub use bus::StreamBus;
pub use config::{DecoderKind, StreamlineConfig};
pub use decoder::{ChatCompletionsDecoder, PlainTextDecoder, Record, RecordDecoder};
pub use error::{Result, StreamError};
pub use framer::LineFramer;
pub use notifier::{EventNotifier, StreamEvent, StreamListener};
pub use session::{
    SessionHandle, SessionPhase, StreamCallbacks, StreamOutcome, StreamSession, StreamStatus,
};
pub use transport::{ByteStreamBody, ChunkedBody, StreamResponse, TextBody};
