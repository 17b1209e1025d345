//! In-process publish/subscribe channel for a single named topic
//!
//! Events are fanned out to the subscribers that exist at publish time.
//! Nothing is persisted or replayed: publishing with no subscriber drops the
//! event, and a subscriber only sees events published after it subscribed.
//! Dropping a subscription stream releases its slot.

use std::sync::Arc;

use futures::Stream;
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{debug, warn};

/// Notification channel configuration
#[derive(Debug, Clone)]
pub struct NotificationChannelConfig {
    /// Topic name, used for logging
    pub topic: String,
    /// Events buffered per subscriber before it starts lagging
    pub channel_capacity: usize,
}

impl Default for NotificationChannelConfig {
    fn default() -> Self {
        Self {
            topic: "POST_CREATED".to_string(),
            channel_capacity: 64,
        }
    }
}

/// Broadcast topic carrying events of type `E`. Cloning shares the topic.
pub struct NotificationChannel<E> {
    topic: Arc<str>,
    event_tx: broadcast::Sender<E>,
}

impl<E> Clone for NotificationChannel<E> {
    fn clone(&self) -> Self {
        Self {
            topic: self.topic.clone(),
            event_tx: self.event_tx.clone(),
        }
    }
}

impl<E: Clone + Send + 'static> NotificationChannel<E> {
    pub fn new(config: NotificationChannelConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            topic: config.topic.into(),
            event_tx,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Deliver `event` to every active subscriber.
    /// Returns how many subscribers it was queued for; 0 means it was dropped.
    pub fn publish(&self, event: E) -> usize {
        match self.event_tx.send(event) {
            Ok(delivered) => {
                debug!(topic = %self.topic, subscribers = delivered, "Event published");
                delivered
            }
            Err(_) => {
                debug!(topic = %self.topic, "No subscribers, event dropped");
                0
            }
        }
    }

    /// Open-ended stream of events published from now on.
    /// A subscriber that falls behind skips the events it missed.
    pub fn subscribe(&self) -> impl Stream<Item = E> + Send + 'static {
        let topic = self.topic.clone();
        debug!(topic = %topic, "Subscriber attached");

        BroadcastStream::new(self.event_tx.subscribe()).filter_map(move |result| match result {
            Ok(event) => Some(event),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(topic = %topic, skipped, "Subscriber lagged, events skipped");
                None
            }
        })
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.event_tx.receiver_count()
    }
}
