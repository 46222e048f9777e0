//! In-process fan-out of cutover lifecycle events.
//!
//! Events are published after the change they describe has committed, so a
//! subscriber never sees a transition that could still be rolled back.
//! Slow subscribers lose the oldest events rather than block publishers.

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

use crate::models::CutoverEventMessage;

/// Events buffered per subscriber before the oldest are dropped.
const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

#[derive(Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<CutoverEventMessage>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Every event published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<CutoverEventMessage> {
        self.sender.subscribe()
    }

    /// Events concerning one table, published after this call.
    pub fn subscribe_table(&self, table: &str) -> TableSubscription {
        TableSubscription {
            table: table.to_string(),
            receiver: self.sender.subscribe(),
        }
    }

    /// Returns how many subscribers received the event; zero is fine.
    pub fn send(&self, event: CutoverEventMessage) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver filtered to a single table. Window events match when the
/// window covers the table.
pub struct TableSubscription {
    table: String,
    receiver: broadcast::Receiver<CutoverEventMessage>,
}

impl TableSubscription {
    /// Next matching event, or `None` once the broadcaster is gone.
    /// Lagging skips the lost events with a warning.
    pub async fn next(&mut self) -> Option<CutoverEventMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(message) if message.concerns(&self.table) => return Some(message),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(table = %self.table, skipped, "Event subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
