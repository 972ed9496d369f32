//! Stream sessions.
//!
//! A [`StreamSession`] drives one streaming exchange from start to
//! settlement: it invokes the producer, reads fragments one at a time, frames
//! them into lines, decodes each line into a [`Record`], delivers text
//! payloads to the caller, and finally settles exactly once.
//!
//! ```text
//!  producer ──> ChunkedBody::read ──> LineFramer ──> RecordDecoder
//!                                                        │
//!                       on_chunk / EventNotifier <───────┘
//! ```
//!
//! Settlement is one of:
//!
//! - **completed**: `on_complete(full_text)` and `stream:complete`;
//! - **failed**: `on_error(&err)` and `stream:error`;
//! - **aborted**: neither callback; only `stream:aborted`.
//!
//! Sessions are consumed by [`StreamSession::stream_response`], so one
//! instance can never serve two calls.  Status queries and cancellation go
//! through a cloneable [`SessionHandle`] that may be used from any task.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use uuid::Uuid;

use crate::decoder::{ChatCompletionsDecoder, Record, RecordDecoder};
use crate::error::{Result, StreamError};
use crate::framer::LineFramer;
use crate::notifier::{EventNotifier, StreamEvent};
use crate::transport::{ChunkedBody, StreamResponse, TextBody};

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    /// Created; streaming has not begun.
    Idle,
    /// The producer or the read loop is running.
    Active,
    /// Settled through `on_complete`.
    Completed,
    /// Settled through `on_error`.
    Errored,
    /// Settled by cancellation.
    Aborted,
}

impl SessionPhase {
    /// Returns `true` once the session has settled.
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Completed | Self::Errored | Self::Aborted)
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Active => 1,
            Self::Completed => 2,
            Self::Errored => 3,
            Self::Aborted => 4,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Active,
            2 => Self::Completed,
            3 => Self::Errored,
            4 => Self::Aborted,
            _ => Self::Idle,
        }
    }
}

/// Snapshot of a session, computed at query time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStatus {
    /// Whether the session is currently streaming.
    pub active: bool,
    /// Number of payloads delivered through `on_chunk` so far.
    pub chunks: usize,
    /// Concatenation of every payload delivered so far.
    pub partial_text: String,
}

/// How a session settled.
#[derive(Debug)]
pub enum StreamOutcome {
    /// Transport end-of-stream was reached; `text` is the full output.
    Completed { text: String },
    /// The producer or a read failed.
    Failed(StreamError),
    /// The session was cancelled; `partial_text` is what had accumulated.
    Aborted { partial_text: String },
}

impl StreamOutcome {
    /// The terminal phase this outcome corresponds to.
    pub fn phase(&self) -> SessionPhase {
        match self {
            Self::Completed { .. } => SessionPhase::Completed,
            Self::Failed(_) => SessionPhase::Errored,
            Self::Aborted { .. } => SessionPhase::Aborted,
        }
    }

    /// Returns `true` for [`StreamOutcome::Completed`].
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// Returns `true` for [`StreamOutcome::Aborted`].
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }

    /// Convert into a `Result`, mapping an abort to [`StreamError::Aborted`].
    pub fn into_result(self) -> Result<String> {
        match self {
            Self::Completed { text } => Ok(text),
            Self::Failed(err) => Err(err),
            Self::Aborted { partial_text } => Err(StreamError::Aborted { partial_text }),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared state and handle
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Accumulated {
    text: String,
    chunks: usize,
}

#[derive(Debug)]
struct SessionState {
    phase: AtomicU8,
    abort_requested: AtomicBool,
    accumulated: Mutex<Accumulated>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            phase: AtomicU8::new(SessionPhase::Idle.as_u8()),
            abort_requested: AtomicBool::new(false),
            accumulated: Mutex::new(Accumulated::default()),
        }
    }

    fn phase(&self) -> SessionPhase {
        SessionPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    fn set_phase(&self, phase: SessionPhase) {
        self.phase.store(phase.as_u8(), Ordering::Release);
    }

    fn abort_requested(&self) -> bool {
        self.abort_requested.load(Ordering::Acquire)
    }

    fn accumulated(&self) -> MutexGuard<'_, Accumulated> {
        self.accumulated
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cloneable handle for observing and cancelling a session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: Uuid,
    state: Arc<SessionState>,
}

impl SessionHandle {
    /// The session identifier used in log records.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> SessionPhase {
        self.state.phase()
    }

    /// Snapshot of the session's progress.
    ///
    /// Valid at any time; before streaming starts it returns the idle
    /// defaults.
    pub fn status(&self) -> StreamStatus {
        let active = self.state.phase() == SessionPhase::Active;
        let accumulated = self.state.accumulated();
        StreamStatus {
            active,
            chunks: accumulated.chunks,
            partial_text: accumulated.text.clone(),
        }
    }

    /// Request cancellation.
    ///
    /// Takes effect at the next read boundary: a fragment that is already
    /// being decoded is still delivered.  Calling this after the session has
    /// settled, or more than once, does nothing.
    pub fn abort(&self) {
        if self.state.phase().is_settled() {
            tracing::trace!(session_id = %self.id, "abort ignored; session already settled");
            return;
        }
        if !self.state.abort_requested.swap(true, Ordering::AcqRel) {
            tracing::info!(session_id = %self.id, "stream abort requested");
        }
    }

    /// Returns `true` if [`abort`](Self::abort) took effect.
    pub fn is_abort_requested(&self) -> bool {
        self.state.abort_requested()
    }
}

// ---------------------------------------------------------------------------
// Callbacks
// ---------------------------------------------------------------------------

type ChunkFn<'a> = Box<dyn FnMut(&str) + Send + 'a>;
type CompleteFn<'a> = Box<dyn FnOnce(&str) + Send + 'a>;
type ErrorFn<'a> = Box<dyn FnOnce(&StreamError) + Send + 'a>;

/// Per-call callbacks.
///
/// `on_complete` and `on_error` are `FnOnce`: at most one of them ever runs.
/// Unset callbacks default to no-ops.
pub struct StreamCallbacks<'a> {
    on_chunk: ChunkFn<'a>,
    on_complete: CompleteFn<'a>,
    on_error: ErrorFn<'a>,
}

impl<'a> StreamCallbacks<'a> {
    /// Callbacks that do nothing.
    pub fn new() -> Self {
        Self {
            on_chunk: Box::new(|_| {}),
            on_complete: Box::new(|_| {}),
            on_error: Box::new(|_| {}),
        }
    }

    /// Called once per non-empty decoded payload, in order.
    pub fn on_chunk(mut self, f: impl FnMut(&str) + Send + 'a) -> Self {
        self.on_chunk = Box::new(f);
        self
    }

    /// Called once with the full text on normal completion.
    pub fn on_complete(mut self, f: impl FnOnce(&str) + Send + 'a) -> Self {
        self.on_complete = Box::new(f);
        self
    }

    /// Called once if the producer or a read fails.
    pub fn on_error(mut self, f: impl FnOnce(&StreamError) + Send + 'a) -> Self {
        self.on_error = Box::new(f);
        self
    }
}

impl Default for StreamCallbacks<'_> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One streaming exchange.
pub struct StreamSession {
    handle: SessionHandle,
    notifier: EventNotifier,
    decoder: Arc<dyn RecordDecoder>,
}

impl StreamSession {
    /// Create an idle session that reports to `notifier` and decodes lines
    /// with `decoder`.
    pub fn new(notifier: EventNotifier, decoder: Arc<dyn RecordDecoder>) -> Self {
        Self {
            handle: SessionHandle {
                id: Uuid::now_v7(),
                state: Arc::new(SessionState::new()),
            },
            notifier,
            decoder,
        }
    }

    /// A handle for status queries and cancellation.
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Shorthand for `self.handle().status()`.
    pub fn status(&self) -> StreamStatus {
        self.handle.status()
    }

    /// Run the exchange to settlement.
    ///
    /// `producer` is invoked once to obtain the response.  The returned
    /// outcome mirrors whichever callback (if any) was invoked; this method
    /// itself never fails.
    pub async fn stream_response<P, Fut>(
        self,
        producer: P,
        mut callbacks: StreamCallbacks<'_>,
    ) -> StreamOutcome
    where
        P: FnOnce() -> Fut,
        Fut: Future<Output = Result<StreamResponse>>,
    {
        let state = &self.handle.state;
        let session_id = self.handle.id;

        if state.abort_requested() {
            tracing::info!(%session_id, "stream aborted before start");
            return self.settle_aborted();
        }

        state.set_phase(SessionPhase::Active);
        tracing::info!(%session_id, "stream started");

        let response = match producer().await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(%session_id, error = %err, "stream producer failed");
                return self.settle_failed(err, callbacks);
            }
        };

        let result = match response {
            StreamResponse::Text(body) => self.consume_text(body, &mut callbacks).await,
            StreamResponse::Chunked(body) => self.consume_chunked(body, &mut callbacks).await,
        };

        match result {
            Ok(Flow::Finished) => self.settle_completed(callbacks),
            Ok(Flow::Aborted) => self.settle_aborted(),
            Err(err) => {
                tracing::warn!(%session_id, error = %err, "stream read failed");
                self.settle_failed(err, callbacks)
            }
        }
    }

    // -- Read paths ----------------------------------------------------------

    /// Non-incremental path: the whole body is one text record.
    async fn consume_text(
        &self,
        body: Box<dyn TextBody>,
        callbacks: &mut StreamCallbacks<'_>,
    ) -> Result<Flow> {
        if self.handle.state.abort_requested() {
            return Ok(Flow::Aborted);
        }

        let text = body.text().await?;
        tracing::debug!(session_id = %self.handle.id, bytes = text.len(), "whole-text body received");
        if let Some(payload) = Record::Text(text).payload() {
            self.deliver(payload, callbacks);
        }
        Ok(Flow::Finished)
    }

    /// Incremental path: read, frame, decode, deliver until end-of-stream.
    async fn consume_chunked(
        &self,
        mut body: Box<dyn ChunkedBody>,
        callbacks: &mut StreamCallbacks<'_>,
    ) -> Result<Flow> {
        let mut framer = LineFramer::new();
        let mut fragments = 0usize;

        loop {
            // Single cancellation checkpoint per iteration.
            if self.handle.state.abort_requested() {
                body.cancel().await;
                tracing::debug!(session_id = %self.handle.id, fragments, "read loop stopped by abort");
                return Ok(Flow::Aborted);
            }

            let Some(fragment) = body.read().await? else {
                break;
            };
            fragments += 1;
            tracing::debug!(
                session_id = %self.handle.id,
                fragment = fragments,
                bytes = fragment.len(),
                "fragment received"
            );

            for line in framer.push(&fragment) {
                self.dispatch_line(&line, callbacks);
            }
        }

        let tail = framer.flush();
        if !tail.is_empty() {
            tracing::debug!(session_id = %self.handle.id, bytes = tail.len(), "flushing unterminated tail");
            self.dispatch_line(&tail, callbacks);
        }

        Ok(Flow::Finished)
    }

    fn dispatch_line(&self, line: &str, callbacks: &mut StreamCallbacks<'_>) {
        match self.decoder.decode(line) {
            Record::EndOfStream => {
                tracing::debug!(session_id = %self.handle.id, "end-of-stream sentinel received");
            }
            record => {
                if let Some(payload) = record.payload() {
                    self.deliver(payload, callbacks);
                }
            }
        }
    }

    fn deliver(&self, text: &str, callbacks: &mut StreamCallbacks<'_>) {
        {
            let mut accumulated = self.handle.state.accumulated();
            accumulated.text.push_str(text);
            accumulated.chunks += 1;
        }
        (callbacks.on_chunk)(text);
        self.notifier.emit(&StreamEvent::Chunk {
            text: text.to_owned(),
        });
    }

    // -- Settlement ----------------------------------------------------------

    fn settle_completed(self, callbacks: StreamCallbacks<'_>) -> StreamOutcome {
        let state = &self.handle.state;
        let (text, chunks) = {
            let accumulated = state.accumulated();
            (accumulated.text.clone(), accumulated.chunks)
        };
        state.set_phase(SessionPhase::Completed);
        tracing::info!(session_id = %self.handle.id, chunks, bytes = text.len(), "stream completed");

        (callbacks.on_complete)(&text);
        self.notifier
            .emit(&StreamEvent::Complete { text: text.clone() });
        StreamOutcome::Completed { text }
    }

    fn settle_failed(self, err: StreamError, callbacks: StreamCallbacks<'_>) -> StreamOutcome {
        self.handle.state.set_phase(SessionPhase::Errored);

        (callbacks.on_error)(&err);
        self.notifier.emit(&StreamEvent::Error {
            error: err.to_string(),
        });
        StreamOutcome::Failed(err)
    }

    fn settle_aborted(self) -> StreamOutcome {
        let state = &self.handle.state;
        let partial_text = state.accumulated().text.clone();
        state.set_phase(SessionPhase::Aborted);
        tracing::info!(session_id = %self.handle.id, bytes = partial_text.len(), "stream aborted");

        self.notifier.emit(&StreamEvent::Aborted {
            partial_text: partial_text.clone(),
        });
        StreamOutcome::Aborted { partial_text }
    }
}

impl Default for StreamSession {
    /// A session with no listener and the Chat Completions decoder.
    fn default() -> Self {
        Self::new(EventNotifier::silent(), Arc::new(ChatCompletionsDecoder))
    }
}

impl std::fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("id", &self.handle.id)
            .field("phase", &self.handle.phase())
            .field("notifier", &self.notifier)
            .finish()
    }
}

/// How a read path ended, short of an error.
enum Flow {
    Finished,
    Aborted,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
