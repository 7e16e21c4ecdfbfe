//! Move event fan-out to volume-binding consumers
//!
//! Every `subscribe()` call registers an independent receiver. `publish()` sends
//! to all of them concurrently, so a stalled subscriber never delays another.
//!
//! ## Backpressure
//! In `PublishMode::Blocking` (the default) `publish()` returns only once every
//! subscriber has accepted the event. The controller loop awaits `publish()`,
//! so one subscriber that stops reading stalls line ingestion for everyone
//! behind it. `PublishMode::Bounded` caps the wait per subscriber and drops the
//! event for subscribers that miss the deadline.

use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::slider::SliderMoveEvent;

/// Capacity of every subscriber channel (tokio has no zero-capacity channel)
pub const SUBSCRIBER_CAPACITY: usize = 1;

/// How long `publish()` may wait on a single subscriber
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PublishMode {
    #[default]
    Blocking,
    Bounded(Duration),
}

enum Delivery {
    Delivered,
    Closed,
    TimedOut,
}

/// Append-only registry of move event subscribers
#[derive(Default)]
pub struct EventDispatcher {
    subscribers: RwLock<Vec<mpsc::Sender<SliderMoveEvent>>>,
    mode: PublishMode,
}

impl EventDispatcher {
    pub fn new(mode: PublishMode) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            mode,
        }
    }

    /// Register a new receiver. Events published earlier are not replayed.
    pub fn subscribe(&self) -> mpsc::Receiver<SliderMoveEvent> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        self.subscribers.write().push(tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Send `event` to every registered subscriber.
    ///
    /// Returns the number of subscribers that received it.
    pub async fn publish(&self, event: SliderMoveEvent) -> usize {
        let subscribers = self.subscribers.read().clone();
        let mode = self.mode;

        let mut sends = JoinSet::new();
        for tx in subscribers {
            sends.spawn(async move {
                match mode {
                    PublishMode::Blocking => match tx.send(event).await {
                        Ok(()) => Delivery::Delivered,
                        Err(_) => Delivery::Closed,
                    },
                    PublishMode::Bounded(limit) => {
                        match tokio::time::timeout(limit, tx.send(event)).await {
                            Ok(Ok(())) => Delivery::Delivered,
                            Ok(Err(_)) => Delivery::Closed,
                            Err(_) => Delivery::TimedOut,
                        }
                    }
                }
            });
        }

        let mut delivered = 0;
        while let Some(result) = sends.join_next().await {
            match result {
                Ok(Delivery::Delivered) => delivered += 1,
                Ok(Delivery::Closed) => debug!(
                    "Subscriber gone, slider {} event not delivered",
                    event.slider_index
                ),
                Ok(Delivery::TimedOut) => warn!(
                    "Subscriber too slow, dropping slider {} event",
                    event.slider_index
                ),
                Err(e) => warn!("Publish task failed: {}", e),
            }
        }
        delivered
    }
}
