//! Protocol-aware frontend runtime.
//!
//! An [`RpcFrontend`] owns a [`TargetGroup`] and routes each call to one
//! healthy member. Health is judged on gRPC status codes: an HTTP/2 response
//! carrying `grpc-status: 14` is a failure even though its HTTP status is
//! 200. Members move in and out of rotation through active probes
//! ([`HealthChecker`]) and through the outcome of routed calls
//! ([`RpcFrontend::dispatch`]).
//!
//! The frontend never touches the record store or the change stream.

mod checker;
mod target_group;

pub use checker::{HealthChecker, HealthProbe};
pub use target_group::{TargetGroup, TargetId};

use crate::{Result, health::ProbeOutcome, topology::ListenerSpec};
use core::future::Future;
use std::sync::Arc;
use tonic::{Code, Status};

/// A routed call and the member that answered it.
#[derive(Debug)]
pub struct Dispatched<T> {
    pub target: TargetId,
    pub response: core::result::Result<T, Status>,
}

pub struct RpcFrontend {
    listener: ListenerSpec,
    target_group: Arc<TargetGroup>,
}

impl RpcFrontend {
    pub fn new(listener: ListenerSpec, target_group: Arc<TargetGroup>) -> Self {
        Self {
            listener,
            target_group,
        }
    }

    pub fn listener(&self) -> &ListenerSpec {
        &self.listener
    }

    pub fn target_group(&self) -> &Arc<TargetGroup> {
        &self.target_group
    }

    /// Routes one call to a healthy member and records its outcome.
    ///
    /// Fails with [`crate::Error::NoHealthyTargets`] when nothing is in
    /// rotation; the call is then never made. A member answering outside
    /// the healthy set is ejected before this returns.
    pub async fn dispatch<T, F, Fut>(&self, call: F) -> Result<Dispatched<T>>
    where
        F: FnOnce(TargetId) -> Fut,
        Fut: Future<Output = core::result::Result<T, Status>>,
    {
        let target = self.target_group.route()?;
        let response = call(target.clone()).await;

        let code = match &response {
            Ok(_) => Code::Ok,
            Err(status) => status.code(),
        };
        // The member may have been deregistered while the call ran.
        let _ = self
            .target_group
            .observe_call(&target, ProbeOutcome::Status(code));

        Ok(Dispatched { target, response })
    }
}
