//! Declarative descriptions of every resource in the pipeline.
//!
//! These are plain data: they describe what the platform should create and
//! carry no behavior beyond lookups. The in-process runtime in
//! [`crate::pipeline`] is built from them.

use super::certificate::CertificateRef;
use crate::{
    health::HealthCheckPolicy,
    resource::{Principal, ResourceId, ResourceKind},
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::PathBuf};

/// Environment variables injected into a process at construct time.
pub type Environment = BTreeMap<String, String>;

/// Port the workers listen on and the frontend exposes.
pub const GRPC_PORT: u16 = 50051;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AttributeType {
    #[serde(rename = "S")]
    String,
    #[serde(rename = "N")]
    Number,
}

/// Single partition key schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySchema {
    pub partition_key: String,
    pub key_type: AttributeType,
}

impl Default for KeySchema {
    fn default() -> Self {
        Self {
            partition_key: "id".to_string(),
            key_type: AttributeType::String,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeStreamSpec {
    pub id: ResourceId,
    pub shard_count: u32,
    pub retention_hours: u32,
}

impl ChangeStreamSpec {
    pub fn new(id: impl Into<ResourceId>) -> Self {
        Self {
            id: id.into(),
            shard_count: 1,
            retention_hours: 24,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordStoreSpec {
    pub id: ResourceId,
    pub key_schema: KeySchema,
    /// Stream every mutation is captured into.
    pub change_stream: Option<ResourceId>,
}

/// Source location of a function's code, relative to the deployment root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCode {
    pub directory: PathBuf,
    pub index: String,
    pub handler: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestFunctionSpec {
    pub id: ResourceId,
    pub principal: Principal,
    pub runtime: String,
    pub code: FunctionCode,
    pub environment: Environment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub id: ResourceId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateSpec {
    pub id: ResourceId,
    pub certificate: CertificateRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSpec {
    pub id: ResourceId,
    pub network: ResourceId,
}

/// Container build input: a directory and the Dockerfile inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAssetSpec {
    pub id: ResourceId,
    pub directory: PathBuf,
    pub dockerfile: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    pub image: ResourceId,
    pub environment: Environment,
    pub port: u16,
    pub log_stream_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDefinitionSpec {
    pub id: ResourceId,
    /// Identity every replica of the task runs as.
    pub principal: Principal,
    pub container: ContainerSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerPoolSpec {
    pub id: ResourceId,
    pub cluster: ResourceId,
    pub task_definition: ResourceId,
    /// `None` leaves the count to the platform default of one replica.
    pub desired_count: Option<u32>,
}

impl WorkerPoolSpec {
    pub fn replicas(&self) -> u32 {
        self.desired_count.unwrap_or(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ApplicationProtocol {
    Http,
    Https,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProtocolVersion {
    Http1,
    Http2,
    Grpc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Ip,
    Instance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancerSpec {
    pub id: ResourceId,
    pub network: ResourceId,
    pub internet_facing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetGroupSpec {
    pub id: ResourceId,
    pub network: ResourceId,
    pub port: u16,
    pub protocol: ApplicationProtocol,
    pub protocol_version: ProtocolVersion,
    pub target_type: TargetType,
    pub health_check: HealthCheckPolicy,
    /// Pool whose replicas register as targets.
    pub members_from: ResourceId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerSpec {
    pub id: ResourceId,
    pub load_balancer: ResourceId,
    pub port: u16,
    pub protocol: ApplicationProtocol,
    /// Reachable from any address.
    pub open: bool,
    pub certificates: Vec<ResourceId>,
    pub default_target_groups: Vec<ResourceId>,
}

/// A resource handed to the platform, borrowed from the topology under
/// construction.
#[derive(Debug, Clone, Copy)]
pub enum Resource<'a> {
    ChangeStream(&'a ChangeStreamSpec),
    RecordStore(&'a RecordStoreSpec),
    IngestFunction(&'a IngestFunctionSpec),
    Network(&'a NetworkSpec),
    Certificate(&'a CertificateSpec),
    Cluster(&'a ClusterSpec),
    ImageAsset(&'a ImageAssetSpec),
    TaskDefinition(&'a TaskDefinitionSpec),
    WorkerPool(&'a WorkerPoolSpec),
    LoadBalancer(&'a LoadBalancerSpec),
    TargetGroup(&'a TargetGroupSpec),
    Listener(&'a ListenerSpec),
}

impl Resource<'_> {
    pub fn id(&self) -> &ResourceId {
        match self {
            Resource::ChangeStream(spec) => &spec.id,
            Resource::RecordStore(spec) => &spec.id,
            Resource::IngestFunction(spec) => &spec.id,
            Resource::Network(spec) => &spec.id,
            Resource::Certificate(spec) => &spec.id,
            Resource::Cluster(spec) => &spec.id,
            Resource::ImageAsset(spec) => &spec.id,
            Resource::TaskDefinition(spec) => &spec.id,
            Resource::WorkerPool(spec) => &spec.id,
            Resource::LoadBalancer(spec) => &spec.id,
            Resource::TargetGroup(spec) => &spec.id,
            Resource::Listener(spec) => &spec.id,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::ChangeStream(_) => ResourceKind::ChangeStream,
            Resource::RecordStore(_) => ResourceKind::RecordStore,
            Resource::IngestFunction(_) => ResourceKind::IngestFunction,
            Resource::Network(_) => ResourceKind::Network,
            Resource::Certificate(_) => ResourceKind::Certificate,
            Resource::Cluster(_) => ResourceKind::Cluster,
            Resource::ImageAsset(_) => ResourceKind::ImageAsset,
            Resource::TaskDefinition(_) => ResourceKind::TaskDefinition,
            Resource::WorkerPool(_) => ResourceKind::WorkerPool,
            Resource::LoadBalancer(_) => ResourceKind::LoadBalancer,
            Resource::TargetGroup(_) => ResourceKind::TargetGroup,
            Resource::Listener(_) => ResourceKind::Listener,
        }
    }
}
