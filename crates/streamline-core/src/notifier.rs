//! Stream lifecycle events and their delivery to listeners.
//!
//! A session produces one [`StreamEvent`] per transition.  The same value is
//! dispatched to the per-call callbacks and, through an [`EventNotifier`], to
//! an optional injected [`StreamListener`].  Listener failures are logged and
//! swallowed: a misbehaving subscriber can never abort a stream.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// A lifecycle notification emitted by a stream session.
///
/// Serializes as `{"kind": "stream:chunk", "payload": {"text": "..."}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload")]
pub enum StreamEvent {
    /// One decoded, non-empty text payload.
    #[serde(rename = "stream:chunk")]
    Chunk { text: String },

    /// The stream completed normally; `text` is the full concatenation.
    #[serde(rename = "stream:complete")]
    Complete { text: String },

    /// The producer or a read failed.
    #[serde(rename = "stream:error")]
    Error { error: String },

    /// The stream was cancelled; `partial_text` is what had accumulated.
    #[serde(rename = "stream:aborted")]
    Aborted {
        #[serde(rename = "partialText")]
        partial_text: String,
    },
}

impl StreamEvent {
    /// The bus kind of this event (e.g. `"stream:chunk"`).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Chunk { .. } => "stream:chunk",
            Self::Complete { .. } => "stream:complete",
            Self::Error { .. } => "stream:error",
            Self::Aborted { .. } => "stream:aborted",
        }
    }

    /// Returns `true` for the three settling events.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Chunk { .. })
    }
}

// ---------------------------------------------------------------------------
// Listener
// ---------------------------------------------------------------------------

/// Receives stream events.
///
/// Implementations must tolerate concurrent calls from unrelated sessions.
pub trait StreamListener: Send + Sync {
    /// Handle one event.  Errors are logged by the notifier and otherwise
    /// ignored.
    fn on_event(&self, event: &StreamEvent) -> Result<()>;
}

impl<F> StreamListener for F
where
    F: Fn(&StreamEvent) + Send + Sync,
{
    fn on_event(&self, event: &StreamEvent) -> Result<()> {
        self(event);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

/// Fire-and-forget publisher of [`StreamEvent`]s.
///
/// Cheap to clone; a notifier without a listener only traces events.
#[derive(Clone, Default)]
pub struct EventNotifier {
    listener: Option<Arc<dyn StreamListener>>,
}

impl EventNotifier {
    /// A notifier that delivers to `listener`.
    pub fn new(listener: Arc<dyn StreamListener>) -> Self {
        Self {
            listener: Some(listener),
        }
    }

    /// A notifier with no listener.
    pub fn silent() -> Self {
        Self::default()
    }

    /// Returns `true` if a listener is attached.
    pub fn has_listener(&self) -> bool {
        self.listener.is_some()
    }

    /// Publish `event`.  Never fails and never panics.
    pub fn emit(&self, event: &StreamEvent) {
        tracing::trace!(kind = event.kind(), "stream event");

        let Some(listener) = &self.listener else {
            return;
        };

        match catch_unwind(AssertUnwindSafe(|| listener.on_event(event))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(kind = event.kind(), error = %e, "stream listener failed");
            }
            Err(_) => {
                tracing::warn!(kind = event.kind(), "stream listener panicked");
            }
        }
    }
}

impl std::fmt::Debug for EventNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventNotifier")
            .field("has_listener", &self.has_listener())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
