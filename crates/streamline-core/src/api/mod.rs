//! HTTP API layer.
//!
//! - [`types`] -- Chat Completions wire types.
//! - [`retry`] -- Capped exponential backoff.
//! - [`client`] -- [`HttpApiClient`], the [`ApiClient`](crate::ApiClient) for
//!   OpenAI-compatible endpoints.

pub mod client;
pub mod retry;
pub mod types;

pub use client::HttpApiClient;
pub use retry::RetryPolicy;
pub use types::{ChatRequest, Message, Role};
