//! gRPC service implementation of the change feed.
//!
//! [`FeedService`] implements the [`ChangeFeed`] service. Every `Subscribe`
//! call registers a bounded channel with the shared [`SubscriberRegistry`];
//! the background poller and pinger write into it and the client reads it as
//! a server stream. The stream ends when the client disconnects or the
//! service shuts down.

use crate::server::{
    streaming::registry::{FeedItem, SubscriberRegistry},
    telemetry::increment_subscriptions,
};
use changefeed_tonic_core::{
    Error,
    proto::{SubscribeRequest, change_feed_server::ChangeFeed},
};
use core::pin::Pin;
use std::sync::Arc;
use tokio_stream::{Stream, wrappers::ReceiverStream};
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};

#[derive(Clone)]
pub struct FeedService {
    registry: Arc<SubscriberRegistry>,
    shutdown: CancellationToken,
}

impl FeedService {
    pub fn new(registry: Arc<SubscriberRegistry>, shutdown: CancellationToken) -> Self {
        Self { registry, shutdown }
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    /// Stops accepting subscribers, stops the background tasks and ends every
    /// open stream.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.registry.close_all(Error::ServiceShutdown.into());
    }
}

#[tonic::async_trait]
impl ChangeFeed for FeedService {
    type SubscribeStream = Pin<Box<dyn Stream<Item = FeedItem> + Send>>;

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn subscribe(
        &self,
        _req: Request<SubscribeRequest>,
    ) -> Result<Response<Self::SubscribeStream>, Status> {
        if self.shutdown.is_cancelled() {
            return Err(Error::ServiceShutdown.into());
        }

        increment_subscriptions();
        let rx = self.registry.subscribe();

        #[cfg(feature = "tracing")]
        tracing::info!(subscribers = self.registry.len(), "New subscriber");

        Ok(Response::new(Box::pin(ReceiverStream::new(rx))))
    }
}
