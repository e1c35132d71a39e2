use super::{
    AccessEdge, INGEST_STORE_ENV, Topology, WORKER_STORE_ENV, WORKER_STREAM_ENV,
    certificate::{CERT_ARN_ENV, CertificateRef},
    grpc_service::{GrpcServiceProps, grpc_service},
    provisioner::{Provisioner, RecordingProvisioner},
    spec::{
        CertificateSpec, ChangeStreamSpec, ClusterSpec, Environment, FunctionCode,
        IngestFunctionSpec, KeySchema, NetworkSpec, RecordStoreSpec, Resource,
    },
};
use crate::{
    Result,
    grants::{AccessGrantResolver, GrantSet, Role},
    health::HealthCheckPolicy,
    resource::{Principal, ResourceId},
};
use serde::Serialize;
use std::path::PathBuf;

/// Inputs of one assembly.
#[derive(Debug, Clone)]
pub struct AssemblyParams {
    pub stack_name: String,
    /// Raw certificate reference, validated before anything is built.
    pub certificate_arn: Option<String>,
    /// Root that code and container build paths are resolved against.
    pub deployment_root: PathBuf,
    pub worker_replicas: Option<u32>,
    pub stream_shards: u32,
    pub health_check: HealthCheckPolicy,
}

impl AssemblyParams {
    pub fn new(certificate_arn: Option<String>) -> Self {
        Self {
            stack_name: "ChangefeedStack".to_string(),
            certificate_arn,
            deployment_root: PathBuf::from("."),
            worker_replicas: None,
            stream_shards: 1,
            health_check: HealthCheckPolicy::default(),
        }
    }

    /// Reads the certificate reference from `CERT_ARN`. Absence is reported
    /// by [`TopologyAssembler::assemble`], not here.
    pub fn from_env() -> Self {
        Self::new(std::env::var(CERT_ARN_ENV).ok())
    }
}

/// A complete topology and its derived grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assembly {
    pub topology: Topology,
    pub grants: GrantSet,
}

/// Builds a [`Topology`] in dependency order through a [`Provisioner`].
pub struct TopologyAssembler<P = RecordingProvisioner> {
    provisioner: P,
    resolver: AccessGrantResolver,
}

impl TopologyAssembler<RecordingProvisioner> {
    pub fn new() -> Self {
        Self::with_provisioner(RecordingProvisioner::default())
    }
}

impl Default for TopologyAssembler<RecordingProvisioner> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Provisioner> TopologyAssembler<P> {
    pub fn with_provisioner(provisioner: P) -> Self {
        Self {
            provisioner,
            resolver: AccessGrantResolver::default(),
        }
    }

    pub fn with_resolver(mut self, resolver: AccessGrantResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn provisioner(&self) -> &P {
        &self.provisioner
    }

    pub fn into_provisioner(self) -> P {
        self.provisioner
    }

    /// Assembles the pipeline.
    ///
    /// The certificate is resolved first; if it is missing or malformed no
    /// resource is handed to the provisioner. Provisioning failures abort
    /// the assembly as they are. Grants are resolved last, over the
    /// complete graph.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(stack = %params.stack_name)))]
    pub fn assemble(&mut self, params: &AssemblyParams) -> Result<Assembly> {
        self.provisioner.reset();
        let certificate = CertificateRef::resolve(params.certificate_arn.as_deref())?;
        let root = &params.deployment_root;
        let mut edges = Vec::new();

        let change_stream = ChangeStreamSpec {
            shard_count: params.stream_shards.max(1),
            ..ChangeStreamSpec::new("Stream")
        };
        self.provisioner
            .provision(Resource::ChangeStream(&change_stream))?;

        let record_store = RecordStoreSpec {
            id: ResourceId::new("Table"),
            key_schema: KeySchema::default(),
            change_stream: Some(change_stream.id.clone()),
        };
        self.provisioner
            .provision(Resource::RecordStore(&record_store))?;

        let ingest_id = ResourceId::new("PutItem");
        let ingest = IngestFunctionSpec {
            principal: Principal::role_of(&ingest_id),
            id: ingest_id,
            runtime: "python3.9".to_string(),
            code: FunctionCode {
                directory: root.join("lambda"),
                index: "put_item.py".to_string(),
                handler: "handler".to_string(),
            },
            environment: Environment::from([(
                INGEST_STORE_ENV.to_string(),
                record_store.id.to_string(),
            )]),
        };
        self.provisioner
            .provision(Resource::IngestFunction(&ingest))?;
        edges.push(AccessEdge {
            principal: ingest.principal.clone(),
            role: Role::Ingest,
            resource: record_store.id.clone(),
        });

        #[cfg(feature = "tracing")]
        tracing::info!(store = %record_store.id, stream = %change_stream.id, "capture wired");

        let network = NetworkSpec {
            id: ResourceId::new("GrpcVpc"),
        };
        self.provisioner.provision(Resource::Network(&network))?;

        let certificate = CertificateSpec {
            id: ResourceId::new("Certificate"),
            certificate,
        };
        self.provisioner
            .provision(Resource::Certificate(&certificate))?;

        let cluster = ClusterSpec {
            id: ResourceId::new("GrpcCluster"),
            network: network.id.clone(),
        };
        self.provisioner.provision(Resource::Cluster(&cluster))?;

        let service = grpc_service(
            &mut self.provisioner,
            GrpcServiceProps {
                id: ResourceId::new("GrpcServer"),
                network: network.id.clone(),
                certificate: Some(certificate.clone()),
                cluster: cluster.id.clone(),
                container_directory: root.clone(),
                dockerfile: "Dockerfile".to_string(),
                environment: Environment::from([
                    (WORKER_STORE_ENV.to_string(), record_store.id.to_string()),
                    (WORKER_STREAM_ENV.to_string(), change_stream.id.to_string()),
                    ("RUST_BACKTRACE".to_string(), "1".to_string()),
                ]),
                desired_count: params.worker_replicas,
                health_check: params.health_check.clone(),
            },
        )?;
        edges.push(AccessEdge {
            principal: service.principal().clone(),
            role: Role::Worker,
            resource: change_stream.id.clone(),
        });
        edges.push(AccessEdge {
            principal: service.principal().clone(),
            role: Role::Worker,
            resource: record_store.id.clone(),
        });

        #[cfg(feature = "tracing")]
        tracing::info!(
            pool = %service.worker_pool.id,
            replicas = service.worker_pool.replicas(),
            "grpc service wired"
        );

        let topology = Topology {
            stack: params.stack_name.clone(),
            change_stream,
            record_store,
            ingest,
            network,
            certificate,
            cluster,
            service,
            edges,
        };
        let grants = self.resolver.resolve(&topology)?;

        #[cfg(feature = "tracing")]
        tracing::info!(grants = grants.len(), "topology assembled");

        Ok(Assembly { topology, grants })
    }
}
