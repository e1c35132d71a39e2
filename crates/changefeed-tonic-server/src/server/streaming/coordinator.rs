//! Background tasks feeding the subscriber registry.
//!
//! - [`poll_loop`] follows the change stream and broadcasts the current state
//!   of every changed record.
//! - [`ping_loop`] keeps idle subscriber streams alive.
//! - [`retention_loop`] drops change records older than the stream's
//!   retention window.
//! - [`ingest_loop`] optionally drives synthetic writes through the ingest
//!   function so a standalone process has something to stream.
//!
//! Each loop ticks on a [`tokio::time::interval`] and exits when its
//! [`CancellationToken`] is cancelled.

use super::registry::{Delivery, SubscriberRegistry};
use crate::server::telemetry::{increment_broadcasts, increment_poll_errors, record_poll_duration};
use changefeed_tonic_core::{
    Result,
    changefeed::{
        ingest::{IngestFunction, WriteRequest},
        stream::ChangeStream,
        worker::Worker,
    },
    message,
};
use core::time::Duration;
use std::sync::Arc;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

/// Reads every new change record once and broadcasts one message per record.
/// Returns the number of records published.
pub fn publish_changes(worker: &mut Worker, registry: &SubscriberRegistry) -> Result<usize> {
    let snapshots = worker.poll()?;
    for snapshot in &snapshots {
        let _delivery: Delivery = registry.broadcast(&message::broadcast(snapshot)?);
        increment_broadcasts();

        #[cfg(feature = "tracing")]
        tracing::debug!(
            id = %snapshot.id,
            delivered = _delivery.delivered,
            "broadcast"
        );
    }
    Ok(snapshots.len())
}

pub async fn poll_loop(
    mut worker: Worker,
    registry: Arc<SubscriberRegistry>,
    period: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let start = std::time::Instant::now();
                if let Err(_e) = publish_changes(&mut worker, &registry) {
                    increment_poll_errors();
                    #[cfg(feature = "tracing")]
                    tracing::error!("Poll failed: {}", _e);
                }
                record_poll_duration(start.elapsed().as_millis() as f64);
            }
        }
    }

    #[cfg(feature = "tracing")]
    tracing::info!("Poller stopped");
}

pub async fn ping_loop(
    registry: Arc<SubscriberRegistry>,
    period: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                registry.broadcast(&message::ping());
            }
        }
    }
}

pub async fn retention_loop(
    stream: Arc<ChangeStream>,
    period: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let _dropped = stream.trim();
                #[cfg(feature = "tracing")]
                if _dropped > 0 {
                    tracing::debug!(dropped = _dropped, retained = stream.retained(), "Trimmed change stream");
                }
            }
        }
    }
}

pub async fn ingest_loop(ingest: IngestFunction, period: Duration, shutdown: CancellationToken) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(_e) = ingest.handle(WriteRequest::random()) {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Synthetic write failed: {}", _e);
                }
            }
        }
    }
}
