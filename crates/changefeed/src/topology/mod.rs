//! Topology description and assembly.
//!
//! A [`Topology`] is the closed set of resources of one deployment plus the
//! wiring edges that say which principal touches which resource in which
//! role. It is produced once by [`TopologyAssembler::assemble`] and never
//! mutated afterwards; a changed deployment is a new assembly.
//!
//! ## Submodules
//!
//! - [`assembler`] - Precondition checks and construction order.
//! - [`certificate`] - Certificate reference validation.
//! - [`grpc_service`] - Worker pool + frontend builder.
//! - [`provisioner`] - Resource creation seam.
//! - [`spec`] - Per-resource descriptions.

mod assembler;
mod certificate;
mod grpc_service;
mod provisioner;
mod spec;

#[cfg(test)]
mod tests;

pub use assembler::{Assembly, AssemblyParams, TopologyAssembler};
pub use certificate::{CERT_ARN_ENV, CertificateRef};
pub use grpc_service::{GrpcService, GrpcServiceProps, grpc_service};
pub use provisioner::{ProvisionedResource, Provisioner, RecordingProvisioner};
pub use spec::*;

use crate::{
    grants::Role,
    resource::{Principal, ResourceId, ResourceKind},
};
use serde::Serialize;

/// Ingest function variable naming the record store.
pub const INGEST_STORE_ENV: &str = "TABLE";
/// Worker variable naming the record store.
pub const WORKER_STORE_ENV: &str = "DYNAMODB_TABLE";
/// Worker variable naming the change stream.
pub const WORKER_STREAM_ENV: &str = "KINESIS_STREAM";

/// Declares that `principal` uses `resource` in `role`. Grants are derived
/// from these edges only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessEdge {
    pub principal: Principal,
    pub role: Role,
    pub resource: ResourceId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Topology {
    stack: String,
    change_stream: ChangeStreamSpec,
    record_store: RecordStoreSpec,
    ingest: IngestFunctionSpec,
    network: NetworkSpec,
    certificate: CertificateSpec,
    cluster: ClusterSpec,
    service: GrpcService,
    edges: Vec<AccessEdge>,
}

impl Topology {
    pub fn stack(&self) -> &str {
        &self.stack
    }

    pub fn change_stream(&self) -> &ChangeStreamSpec {
        &self.change_stream
    }

    pub fn record_store(&self) -> &RecordStoreSpec {
        &self.record_store
    }

    pub fn ingest(&self) -> &IngestFunctionSpec {
        &self.ingest
    }

    pub fn network(&self) -> &NetworkSpec {
        &self.network
    }

    pub fn certificate(&self) -> &CertificateSpec {
        &self.certificate
    }

    pub fn cluster(&self) -> &ClusterSpec {
        &self.cluster
    }

    pub fn service(&self) -> &GrpcService {
        &self.service
    }

    pub fn edges(&self) -> &[AccessEdge] {
        &self.edges
    }

    /// Every resource in construction order.
    pub fn resources(&self) -> Vec<Resource<'_>> {
        let service = &self.service;
        vec![
            Resource::ChangeStream(&self.change_stream),
            Resource::RecordStore(&self.record_store),
            Resource::IngestFunction(&self.ingest),
            Resource::Network(&self.network),
            Resource::Certificate(&self.certificate),
            Resource::Cluster(&self.cluster),
            Resource::ImageAsset(&service.image),
            Resource::TaskDefinition(&service.task_definition),
            Resource::WorkerPool(&service.worker_pool),
            Resource::LoadBalancer(&service.load_balancer),
            Resource::TargetGroup(&service.target_group),
            Resource::Listener(&service.listener),
        ]
    }

    pub fn kind_of(&self, id: &ResourceId) -> Option<ResourceKind> {
        self.resources()
            .into_iter()
            .find(|resource| resource.id() == id)
            .map(|resource| resource.kind())
    }

    #[cfg(test)]
    pub(crate) fn with_edge(mut self, edge: AccessEdge) -> Self {
        self.edges.push(edge);
        self
    }
}
