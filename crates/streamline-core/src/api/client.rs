//! HTTP client for OpenAI-compatible Chat Completions endpoints.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::{Value, json};

use crate::adapter::ApiClient;
use crate::api::retry::RetryPolicy;
use crate::api::types::ChatRequest;
use crate::config::{ClientConfig, StreamlineConfig};
use crate::error::{Result, StreamError};
use crate::transport::{StreamResponse, TextBody};

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// [`ApiClient`] that posts [`ChatRequest`]s to `{base_url}/chat/completions`.
///
/// Transient failures (transport errors, HTTP 429 and 5xx) are retried
/// according to the configured [`RetryPolicy`].  Retrying stops once a
/// successful status line has been received; mid-body failures surface as
/// read errors in the session.
#[derive(Clone)]
pub struct HttpApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    default_model: String,
    max_tokens: Option<u32>,
    retry: RetryPolicy,
}

impl HttpApiClient {
    /// Create a client for the endpoint described by `config`.
    pub fn new(config: &ClientConfig, retry: RetryPolicy) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| StreamError::Config {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            api_key: config.api_key.clone(),
            default_model: config.model.clone(),
            max_tokens: config.max_tokens,
            retry,
        })
    }

    /// Create a client from a full configuration.
    pub fn from_config(config: &StreamlineConfig) -> Result<Self> {
        Self::new(&config.client, config.retry_policy())
    }

    /// The model used when a request leaves `model` empty.
    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// The Chat Completions URL requests are posted to.
    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    // -- Request building ----------------------------------------------------

    /// Build the JSON request body.
    pub fn build_request_body(&self, request: &ChatRequest) -> Value {
        let model = if request.model.is_empty() {
            self.default_model.as_str()
        } else {
            request.model.as_str()
        };

        let mut body = json!({
            "model": model,
            "messages": request.messages,
        });

        if let Some(max_tokens) = request.max_tokens.or(self.max_tokens) {
            body["max_tokens"] = json!(max_tokens);
        }

        if let Some(temp) = request.temperature {
            body["temperature"] = json!(temp);
        }

        if request.stream {
            body["stream"] = json!(true);
        }

        body
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if !self.api_key.is_empty() {
            let auth_value = format!("Bearer {}", self.api_key);
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&auth_value).map_err(|e| StreamError::Config {
                    reason: format!("invalid authorization header: {e}"),
                })?,
            );
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    // -- Sending -------------------------------------------------------------

    /// Send one attempt and check its status.
    async fn send_once(&self, url: &str, headers: &HeaderMap, body: &Value) -> Result<reqwest::Response> {
        tracing::debug!(url = %url, model = %body["model"], "sending chat completion request");

        let response = self
            .http
            .post(url)
            .headers(headers.clone())
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(StreamError::HttpStatus {
            status: status.as_u16(),
            body,
        })
    }
}

impl std::fmt::Debug for HttpApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpApiClient")
            .field("base_url", &self.base_url)
            .field("default_model", &self.default_model)
            .field("has_api_key", &!self.api_key.is_empty())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ApiClient for HttpApiClient {
    type Request = ChatRequest;

    async fn request_with_retry(&self, request: &ChatRequest) -> Result<StreamResponse> {
        let url = self.endpoint();
        let headers = self.headers()?;
        let body = self.build_request_body(request);

        let response = self
            .retry
            .run("chat completion", |_| self.send_once(&url, &headers, &body))
            .await?;

        if request.stream {
            Ok(StreamResponse::from_byte_stream(response.bytes_stream()))
        } else {
            Ok(StreamResponse::from_text(CompletionBody(response)))
        }
    }
}

// ---------------------------------------------------------------------------
// Non-streaming body
// ---------------------------------------------------------------------------

/// Whole-body response whose text is `choices[0].message.content`.
///
/// Bodies that are not a Chat Completions object are returned unchanged.
struct CompletionBody(reqwest::Response);

#[async_trait]
impl TextBody for CompletionBody {
    async fn text(self: Box<Self>) -> Result<String> {
        let raw = self.0.text().await.map_err(|e| StreamError::ReadFailed {
            reason: format!("body read error: {e}"),
        })?;
        Ok(completion_text(raw))
    }
}

fn completion_text(raw: String) -> String {
    match serde_json::from_str::<Value>(&raw) {
        Ok(v) => match v["choices"][0]["message"]["content"].as_str() {
            Some(content) => content.to_owned(),
            None => raw,
        },
        Err(_) => raw,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
