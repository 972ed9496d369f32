//! Broadcast bus for stream events.
//!
//! [`StreamBus`] turns session events into a channel: plug it into an
//! [`EventNotifier`](crate::EventNotifier) and every chunk and settlement of
//! every session sharing that notifier shows up on each subscriber's
//! receiver, in the order that session emitted them.
//!
//! # Usage
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use streamline_core::{EventNotifier, StreamBus};
//! # async fn example() {
//! let bus = StreamBus::new(256);
//! let mut rx = bus.subscribe();
//! let notifier = EventNotifier::new(Arc::new(bus.clone()));
//! // ... hand `notifier` to a StreamSession ...
//! let event = rx.recv().await.unwrap();
//! println!("{}", event.kind());
//! # }
//! ```

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::error::Result;
use crate::notifier::{StreamEvent, StreamListener};

/// Fan-out of [`StreamEvent`]s to any number of receivers.
///
/// Clones share one channel.
#[derive(Clone)]
pub struct StreamBus {
    sender: broadcast::Sender<Arc<StreamEvent>>,
}

impl StreamBus {
    /// A bus that buffers up to `capacity` events per subscriber.
    ///
    /// Slower subscribers get [`broadcast::error::RecvError::Lagged`] and
    /// resume from the oldest event still buffered.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Send `event` to every subscriber; returns how many there were.
    pub fn publish(&self, event: StreamEvent) -> usize {
        let kind = event.kind();
        match self.sender.send(Arc::new(event)) {
            Ok(n) => {
                tracing::trace!(kind, receivers = n, "stream event published");
                n
            }
            Err(_) => {
                tracing::trace!(kind, "stream event dropped; nobody subscribed");
                0
            }
        }
    }

    /// A receiver for events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<StreamEvent>> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl StreamListener for StreamBus {
    fn on_event(&self, event: &StreamEvent) -> Result<()> {
        self.publish(event.clone());
        Ok(())
    }
}

impl std::fmt::Debug for StreamBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
