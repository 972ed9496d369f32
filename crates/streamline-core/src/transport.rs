//! Response shapes a producer can hand to a stream session.
//!
//! A producer yields a [`StreamResponse`] that is either incremental
//! ([`ChunkedBody`], read one fragment at a time) or terminal
//! ([`TextBody`], read once as a whole).  [`ByteStreamBody`] adapts any
//! `futures` byte stream, such as `reqwest::Response::bytes_stream()`, to the
//! incremental shape; a plain `String` is the simplest terminal body.

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};

use crate::error::{Result, StreamError};

// ---------------------------------------------------------------------------
// Body traits
// ---------------------------------------------------------------------------

/// A response body that is consumed incrementally.
///
/// Reads are always issued sequentially by a single session.
#[async_trait]
pub trait ChunkedBody: Send {
    /// Read the next fragment.  `Ok(None)` signals transport end-of-stream.
    async fn read(&mut self) -> Result<Option<Bytes>>;

    /// Release the underlying transport early.  The default does nothing.
    async fn cancel(&mut self) {}
}

/// A response body that is only available as a whole.
#[async_trait]
pub trait TextBody: Send {
    /// Consume the body and return its full text.
    async fn text(self: Box<Self>) -> Result<String>;
}

/// What a producer returns: an incremental body or a terminal text accessor.
pub enum StreamResponse {
    /// Body exposing a sequential incremental-read primitive.
    Chunked(Box<dyn ChunkedBody>),
    /// Body exposing only a whole-text accessor.
    Text(Box<dyn TextBody>),
}

impl StreamResponse {
    /// Wrap a byte stream as an incremental response.
    pub fn from_byte_stream<S, E>(stream: S) -> Self
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        Self::Chunked(Box::new(ByteStreamBody::new(stream)))
    }

    /// Wrap a whole-text body.
    pub fn from_text(body: impl TextBody + 'static) -> Self {
        Self::Text(Box::new(body))
    }

    /// Returns `true` for incremental responses.
    pub fn is_chunked(&self) -> bool {
        matches!(self, Self::Chunked(_))
    }
}

impl fmt::Debug for StreamResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chunked(_) => f.write_str("StreamResponse::Chunked(..)"),
            Self::Text(_) => f.write_str("StreamResponse::Text(..)"),
        }
    }
}

// ---------------------------------------------------------------------------
// Byte stream adapter
// ---------------------------------------------------------------------------

/// Adapts a `Stream` of byte chunks into a [`ChunkedBody`].
///
/// Cancelling drops the stream, which for HTTP bodies closes the connection.
pub struct ByteStreamBody<S> {
    stream: Option<Pin<Box<S>>>,
}

impl<S> ByteStreamBody<S> {
    /// Wrap a byte stream.
    pub fn new(stream: S) -> Self {
        Self {
            stream: Some(Box::pin(stream)),
        }
    }

    /// Returns `true` once the stream has ended or been cancelled.
    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }
}

#[async_trait]
impl<S, E> ChunkedBody for ByteStreamBody<S>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send,
    E: fmt::Display + Send,
{
    async fn read(&mut self) -> Result<Option<Bytes>> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };

        match stream.next().await {
            Some(Ok(bytes)) => Ok(Some(bytes)),
            Some(Err(e)) => Err(StreamError::ReadFailed {
                reason: format!("stream read error: {e}"),
            }),
            None => {
                self.stream = None;
                Ok(None)
            }
        }
    }

    async fn cancel(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!("byte stream cancelled");
        }
    }
}

// ---------------------------------------------------------------------------
// Text bodies
// ---------------------------------------------------------------------------

#[async_trait]
impl TextBody for String {
    async fn text(self: Box<Self>) -> Result<String> {
        Ok(*self)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
