//! Adapter from a request-issuing client to a normalized result.
//!
//! [`ApiStreamAdapter`] wraps any [`ApiClient`] (typically one that retries
//! its own requests, such as [`HttpApiClient`](crate::api::HttpApiClient)),
//! runs the response through a fresh [`StreamSession`], and resolves to a
//! single [`ApiResult`] instead of raw callbacks.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::decoder::{ChatCompletionsDecoder, RecordDecoder};
use crate::error::Result;
use crate::notifier::EventNotifier;
use crate::session::{StreamCallbacks, StreamSession};
use crate::transport::StreamResponse;

// ---------------------------------------------------------------------------
// Client seam
// ---------------------------------------------------------------------------

/// A collaborator that issues a request and yields a streamable response.
///
/// Retrying is the client's responsibility; the adapter calls
/// [`request_with_retry`](Self::request_with_retry) exactly once per call.
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// The request arguments forwarded by the adapter.
    type Request: Send + Sync;

    /// Issue `request`, retrying transient failures, and return the response.
    async fn request_with_retry(&self, request: &Self::Request) -> Result<StreamResponse>;
}

#[async_trait]
impl<C: ApiClient + ?Sized> ApiClient for Arc<C> {
    type Request = C::Request;

    async fn request_with_retry(&self, request: &Self::Request) -> Result<StreamResponse> {
        (**self).request_with_retry(request).await
    }
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// Normalized result of a streamed call.
///
/// Serializes as `{"type": "text", "content": "...", "streamed": true}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ApiResult {
    /// Full text output of the call.
    Text { content: String, streamed: bool },
}

impl ApiResult {
    /// The text content.
    pub fn content(&self) -> &str {
        match self {
            Self::Text { content, .. } => content,
        }
    }

    /// Consume the result and return its text content.
    pub fn into_content(self) -> String {
        match self {
            Self::Text { content, .. } => content,
        }
    }
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// Runs [`ApiClient`] responses through stream sessions.
pub struct ApiStreamAdapter<C> {
    client: C,
    notifier: EventNotifier,
    decoder: Arc<dyn RecordDecoder>,
}

impl<C: ApiClient> ApiStreamAdapter<C> {
    /// Wrap `client` with no listener and the Chat Completions decoder.
    pub fn wrap(client: C) -> Self {
        Self {
            client,
            notifier: EventNotifier::silent(),
            decoder: Arc::new(ChatCompletionsDecoder),
        }
    }

    /// Attach a notifier shared by every session this adapter creates.
    pub fn with_notifier(mut self, notifier: EventNotifier) -> Self {
        self.notifier = notifier;
        self
    }

    /// Replace the record decoder.
    pub fn with_decoder(mut self, decoder: Arc<dyn RecordDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    /// The wrapped client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Create an idle session configured like the ones this adapter uses.
    ///
    /// Keep its [`handle`](StreamSession::handle) before passing it to
    /// [`stream_call_in`](Self::stream_call_in) to query status or abort.
    pub fn session(&self) -> StreamSession {
        StreamSession::new(self.notifier.clone(), Arc::clone(&self.decoder))
    }

    /// Issue `request` and stream the response to completion.
    ///
    /// Resolves to [`ApiResult::Text`] or to the underlying request or read
    /// error.
    pub async fn stream_call(&self, request: &C::Request) -> Result<ApiResult> {
        self.stream_call_in(self.session(), request).await
    }

    /// Like [`stream_call`](Self::stream_call), on a caller-created session.
    ///
    /// An aborted session resolves to
    /// [`StreamError::Aborted`](crate::StreamError::Aborted).
    pub async fn stream_call_in(
        &self,
        session: StreamSession,
        request: &C::Request,
    ) -> Result<ApiResult> {
        self.stream_call_with(session, request, StreamCallbacks::new())
            .await
    }

    /// Like [`stream_call_in`](Self::stream_call_in), also invoking
    /// `callbacks` as the stream progresses.
    pub async fn stream_call_with(
        &self,
        session: StreamSession,
        request: &C::Request,
        callbacks: StreamCallbacks<'_>,
    ) -> Result<ApiResult> {
        let outcome = session
            .stream_response(|| self.client.request_with_retry(request), callbacks)
            .await;

        let content = outcome.into_result()?;
        Ok(ApiResult::Text {
            content,
            streamed: true,
        })
    }
}

impl<C> std::fmt::Debug for ApiStreamAdapter<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiStreamAdapter")
            .field("notifier", &self.notifier)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use bytes::Bytes;

    use super::*;
    use crate::bus::StreamBus;
    use crate::decoder::PlainTextDecoder;
    use crate::error::StreamError;
    use crate::notifier::StreamEvent;

    /// Client that replays canned responses and records each request.
    #[derive(Default)]
    struct MockClient {
        responses: Mutex<VecDeque<Result<StreamResponse>>>,
        requests: Mutex<Vec<String>>,
    }

    impl MockClient {
        fn with(response: Result<StreamResponse>) -> Self {
            let client = Self::default();
            client.responses.lock().unwrap().push_back(response);
            client
        }
    }

    #[async_trait]
    impl ApiClient for MockClient {
        type Request = String;

        async fn request_with_retry(&self, request: &String) -> Result<StreamResponse> {
            self.requests.lock().unwrap().push(request.clone());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(StreamError::Internal("no canned response".into())))
        }
    }

    fn sse(parts: &[&str]) -> StreamResponse {
        let items: Vec<std::result::Result<Bytes, String>> = parts
            .iter()
            .map(|p| Ok(Bytes::copy_from_slice(p.as_bytes())))
            .collect();
        StreamResponse::from_byte_stream(futures::stream::iter(items))
    }

    #[tokio::test]
    async fn resolves_to_text_result() {
        let adapter = ApiStreamAdapter::wrap(MockClient::with(Ok(sse(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" there\"}}]}\ndata: [DONE]\n",
        ]))));

        let result = adapter.stream_call(&"prompt".to_owned()).await.unwrap();
        assert_eq!(
            result,
            ApiResult::Text {
                content: "Hi there".into(),
                streamed: true
            }
        );
        assert_eq!(*adapter.client().requests.lock().unwrap(), vec!["prompt"]);
    }

    #[tokio::test]
    async fn rejects_with_underlying_request_error() {
        let adapter = ApiStreamAdapter::wrap(MockClient::with(Err(StreamError::HttpStatus {
            status: 401,
            body: "invalid api key".into(),
        })));

        let err = adapter.stream_call(&"prompt".to_owned()).await.unwrap_err();
        match err {
            StreamError::HttpStatus { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "invalid api key");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejects_with_underlying_read_error() {
        let items: Vec<std::result::Result<Bytes, String>> = vec![
            Ok(Bytes::from_static(b"partial\n")),
            Err("connection reset".into()),
        ];
        let adapter = ApiStreamAdapter::wrap(MockClient::with(Ok(
            StreamResponse::from_byte_stream(futures::stream::iter(items)),
        )));

        let err = adapter.stream_call(&"prompt".to_owned()).await.unwrap_err();
        assert!(matches!(err, StreamError::ReadFailed { .. }));
    }

    #[tokio::test]
    async fn aborted_call_resolves_to_aborted_error() {
        let adapter = ApiStreamAdapter::wrap(MockClient::with(Ok(sse(&["never\n"]))));
        let session = adapter.session();
        session.handle().abort();

        let err = adapter
            .stream_call_in(session, &"prompt".to_owned())
            .await
            .unwrap_err();
        assert!(matches!(err, StreamError::Aborted { ref partial_text } if partial_text.is_empty()));
        // The request is never issued once the session was aborted up front.
        assert!(adapter.client().requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn notifier_and_decoder_are_applied() {
        let bus = StreamBus::new(16);
        let mut rx = bus.subscribe();
        let adapter = ApiStreamAdapter::wrap(MockClient::with(Ok(sse(&["data: [DONE]\n"]))))
            .with_notifier(EventNotifier::new(Arc::new(bus.clone())))
            .with_decoder(Arc::new(PlainTextDecoder));

        let result = adapter.stream_call(&"prompt".to_owned()).await.unwrap();
        assert_eq!(result.content(), "data: [DONE]");

        assert_eq!(rx.recv().await.unwrap().kind(), "stream:chunk");
        assert_eq!(
            *rx.recv().await.unwrap(),
            StreamEvent::Complete {
                text: "data: [DONE]".into()
            }
        );
    }

    #[tokio::test]
    async fn callbacks_see_chunks() {
        let adapter = ApiStreamAdapter::wrap(MockClient::with(Ok(sse(&["a\nb\n"]))));
        let mut seen = Vec::new();
        let result = adapter
            .stream_call_with(
                adapter.session(),
                &"prompt".to_owned(),
                StreamCallbacks::new().on_chunk(|t| seen.push(t.to_owned())),
            )
            .await
            .unwrap();

        assert_eq!(seen, vec!["a", "b"]);
        assert_eq!(result.into_content(), "ab");
    }

    #[tokio::test]
    async fn shared_client_behind_arc() {
        let client = Arc::new(MockClient::with(Ok(StreamResponse::from_text(
            String::from("whole"),
        ))));
        let adapter = ApiStreamAdapter::wrap(Arc::clone(&client));

        let result = adapter.stream_call(&"prompt".to_owned()).await.unwrap();
        assert_eq!(result.content(), "whole");
        assert_eq!(client.requests.lock().unwrap().len(), 1);
    }

    #[test]
    fn result_serialization_shape() {
        let json = serde_json::to_value(ApiResult::Text {
            content: "done".into(),
            streamed: true,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "text", "content": "done", "streamed": true})
        );
    }
}
