//! Fan-out of feed messages to connected subscribers.
//!
//! Every subscriber owns a bounded [`mpsc`] channel. Delivery never waits on
//! a slow subscriber: a full buffer drops the message for that subscriber
//! only, and a closed channel removes the subscriber on the next delivery.

use crate::server::telemetry::{adjust_subscribers_active, increment_dropped_messages};
use changefeed_tonic_core::proto::SubscribeResponse;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tonic::Status;

pub type FeedItem = Result<SubscribeResponse, Status>;

/// Result of one [`SubscriberRegistry::broadcast`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub dropped: usize,
    pub removed: usize,
}

pub struct SubscriberRegistry {
    subscribers: Mutex<Vec<mpsc::Sender<FeedItem>>>,
    buffer: usize,
}

impl SubscriberRegistry {
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            buffer,
        }
    }

    /// Adds a subscriber and returns the receiving end of its channel.
    pub fn subscribe(&self) -> mpsc::Receiver<FeedItem> {
        let (tx, rx) = mpsc::channel(self.buffer);
        self.subscribers.lock().push(tx);
        adjust_subscribers_active(1);
        rx
    }

    pub fn len(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Offers `message` to every subscriber.
    pub fn broadcast(&self, message: &SubscribeResponse) -> Delivery {
        let mut delivery = Delivery::default();
        let mut subscribers = self.subscribers.lock();

        subscribers.retain(|tx| match tx.try_send(Ok(message.clone())) {
            Ok(()) => {
                delivery.delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                delivery.dropped += 1;
                true
            }
            Err(TrySendError::Closed(_)) => {
                delivery.removed += 1;
                false
            }
        });
        drop(subscribers);

        if delivery.dropped > 0 {
            increment_dropped_messages(delivery.dropped as u64);
            #[cfg(feature = "tracing")]
            tracing::warn!(dropped = delivery.dropped, "subscriber buffers full");
        }
        if delivery.removed > 0 {
            adjust_subscribers_active(-(delivery.removed as i64));
            #[cfg(feature = "tracing")]
            tracing::debug!(removed = delivery.removed, "subscribers disconnected");
        }
        delivery
    }

    /// Ends every stream with `status`. Used on shutdown.
    pub fn close_all(&self, status: Status) {
        let subscribers = core::mem::take(&mut *self.subscribers.lock());
        adjust_subscribers_active(-(subscribers.len() as i64));
        for tx in subscribers {
            let _ = tx.try_send(Err(status.clone()));
        }
    }
}
