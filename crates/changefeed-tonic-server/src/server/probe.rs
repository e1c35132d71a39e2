//! `grpc.health.v1` probe for the local frontend health checker.
//!
//! A probe that gets an answer reports the gRPC code: `SERVING` maps to
//! `OK`, any other serving status to `UNAVAILABLE`, and an error status is
//! passed through. Connection failures are transport errors.

use changefeed_tonic_core::changefeed::{
    frontend::{HealthProbe, TargetId},
    health::ProbeOutcome,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use tonic::{Code, transport::Endpoint};
use tonic_health::pb::{
    HealthCheckRequest, health_check_response::ServingStatus, health_client::HealthClient,
};

pub struct GrpcHealthProbe {
    service: String,
    endpoints: RwLock<HashMap<TargetId, String>>,
}

impl GrpcHealthProbe {
    /// Probes report on `service`; an empty name asks for the server's
    /// overall status.
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            endpoints: RwLock::new(HashMap::new()),
        }
    }

    /// Where `target` is reached, e.g. `http://127.0.0.1:50051`.
    pub fn insert(&self, target: TargetId, uri: impl Into<String>) {
        self.endpoints.write().insert(target, uri.into());
    }

    async fn check(&self, uri: String) -> ProbeOutcome {
        let Ok(endpoint) = Endpoint::from_shared(uri) else {
            return ProbeOutcome::TransportError;
        };
        let channel = match endpoint.connect().await {
            Ok(channel) => channel,
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Health probe connect failed: {}", _e);
                return ProbeOutcome::TransportError;
            }
        };

        let request = HealthCheckRequest {
            service: self.service.clone(),
        };
        match HealthClient::new(channel).check(request).await {
            Ok(response) => match response.get_ref().status() {
                ServingStatus::Serving => ProbeOutcome::Status(Code::Ok),
                _ => ProbeOutcome::Status(Code::Unavailable),
            },
            Err(status) => ProbeOutcome::Status(status.code()),
        }
    }
}

impl HealthProbe for GrpcHealthProbe {
    async fn probe(&self, target: &TargetId) -> ProbeOutcome {
        let uri = self.endpoints.read().get(target).cloned();
        match uri {
            Some(uri) => self.check(uri).await,
            None => ProbeOutcome::TransportError,
        }
    }
}
