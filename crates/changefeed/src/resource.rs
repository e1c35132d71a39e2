//! Identities shared by every layer: resource ids, resource kinds and the
//! principals processes execute as.

use core::fmt;
use serde::{Deserialize, Serialize};

/// Logical identifier of a managed resource within one topology.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derives the id of a resource owned by this one, e.g.
    /// `GrpcServer` -> `GrpcServer_TargetGroup`.
    pub fn scoped(&self, suffix: &str) -> Self {
        Self(format!("{}_{}", self.0, suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// The closed set of resource kinds the pipeline is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    ChangeStream,
    RecordStore,
    IngestFunction,
    Network,
    Certificate,
    Cluster,
    ImageAsset,
    TaskDefinition,
    WorkerPool,
    LoadBalancer,
    TargetGroup,
    Listener,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::ChangeStream => "change-stream",
            ResourceKind::RecordStore => "record-store",
            ResourceKind::IngestFunction => "ingest-function",
            ResourceKind::Network => "network",
            ResourceKind::Certificate => "certificate",
            ResourceKind::Cluster => "cluster",
            ResourceKind::ImageAsset => "image-asset",
            ResourceKind::TaskDefinition => "task-definition",
            ResourceKind::WorkerPool => "worker-pool",
            ResourceKind::LoadBalancer => "load-balancer",
            ResourceKind::TargetGroup => "target-group",
            ResourceKind::Listener => "listener",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An identity a process executes under. Grants are attached to principals,
/// never to the processes themselves.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The execution role of a compute resource.
    pub fn role_of(resource: &ResourceId) -> Self {
        Self(format!("{resource}/ServiceRole"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
