//! Load-balanced gRPC service: a worker pool behind a TLS-terminating,
//! protocol-aware frontend.
//!
//! The pairing is a parameter record passed to one builder function rather
//! than a type hierarchy. Callers choose the image and environment; the
//! builder fixes the port, protocol and health-check wiring.

use super::{
    provisioner::Provisioner,
    spec::{
        ApplicationProtocol, CertificateSpec, ContainerSpec, Environment, GRPC_PORT,
        ImageAssetSpec, ListenerSpec, LoadBalancerSpec, ProtocolVersion, Resource, TargetGroupSpec,
        TargetType, TaskDefinitionSpec, WorkerPoolSpec,
    },
};
use crate::{
    Error, Result,
    health::HealthCheckPolicy,
    resource::{Principal, ResourceId},
};
use serde::Serialize;
use std::path::PathBuf;

/// Inputs of [`grpc_service`].
#[derive(Debug, Clone)]
pub struct GrpcServiceProps {
    pub id: ResourceId,
    pub network: ResourceId,
    /// TLS certificate the listener terminates with. Required.
    pub certificate: Option<CertificateSpec>,
    pub cluster: ResourceId,
    /// Build context directory, relative to the deployment root.
    pub container_directory: PathBuf,
    pub dockerfile: String,
    pub environment: Environment,
    pub desired_count: Option<u32>,
    pub health_check: HealthCheckPolicy,
}

/// Handles to everything [`grpc_service`] created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GrpcService {
    pub image: ImageAssetSpec,
    pub task_definition: TaskDefinitionSpec,
    pub worker_pool: WorkerPoolSpec,
    pub load_balancer: LoadBalancerSpec,
    pub target_group: TargetGroupSpec,
    pub listener: ListenerSpec,
}

impl GrpcService {
    /// Identity every worker replica runs as.
    pub fn principal(&self) -> &Principal {
        &self.task_definition.principal
    }
}

/// Builds the worker pool and its frontend.
///
/// Fails with [`Error::Configuration`] before creating anything when no
/// certificate is supplied.
pub fn grpc_service<P: Provisioner + ?Sized>(
    provisioner: &mut P,
    props: GrpcServiceProps,
) -> Result<GrpcService> {
    let Some(certificate) = props.certificate else {
        return Err(Error::configuration(
            format!("gRPC service `{}` requires a TLS certificate", props.id),
            "Import a certificate and pass it as `certificate`.",
        ));
    };
    let id = props.id;

    let image = ImageAssetSpec {
        id: id.scoped("GrpcServerImage"),
        directory: props.container_directory,
        dockerfile: props.dockerfile,
    };
    provisioner.provision(Resource::ImageAsset(&image))?;

    let task_definition_id = id.scoped("TaskDefinition");
    let task_definition = TaskDefinitionSpec {
        principal: Principal::new(format!("{task_definition_id}/TaskRole")),
        container: ContainerSpec {
            name: format!("{id}_GrpcServer"),
            image: image.id.clone(),
            environment: props.environment,
            port: GRPC_PORT,
            log_stream_prefix: format!("{id}_GrpcServerLog"),
        },
        id: task_definition_id,
    };
    provisioner.provision(Resource::TaskDefinition(&task_definition))?;

    let worker_pool = WorkerPoolSpec {
        id: id.scoped("GrpcService"),
        cluster: props.cluster,
        task_definition: task_definition.id.clone(),
        desired_count: props.desired_count,
    };
    provisioner.provision(Resource::WorkerPool(&worker_pool))?;

    let load_balancer = LoadBalancerSpec {
        id: id.scoped("GrpcAlb"),
        network: props.network.clone(),
        internet_facing: true,
    };
    provisioner.provision(Resource::LoadBalancer(&load_balancer))?;

    // TLS ends at the listener; targets speak plain HTTP/2 with gRPC framing.
    let target_group = TargetGroupSpec {
        id: id.scoped("TargetGroup"),
        network: props.network,
        port: GRPC_PORT,
        protocol: ApplicationProtocol::Http,
        protocol_version: ProtocolVersion::Grpc,
        target_type: TargetType::Ip,
        health_check: props.health_check,
        members_from: worker_pool.id.clone(),
    };
    provisioner.provision(Resource::TargetGroup(&target_group))?;

    let listener = ListenerSpec {
        id: id.scoped("GrpcListener"),
        load_balancer: load_balancer.id.clone(),
        port: GRPC_PORT,
        protocol: ApplicationProtocol::Https,
        open: true,
        certificates: vec![certificate.id],
        default_target_groups: vec![target_group.id.clone()],
    };
    provisioner.provision(Resource::Listener(&listener))?;

    Ok(GrpcService {
        image,
        task_definition,
        worker_pool,
        load_balancer,
        target_group,
        listener,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        resource::ResourceKind,
        topology::{CertificateRef, RecordingProvisioner},
    };

    fn props(certificate: Option<CertificateSpec>) -> GrpcServiceProps {
        GrpcServiceProps {
            id: ResourceId::new("GrpcServer"),
            network: ResourceId::new("GrpcVpc"),
            certificate,
            cluster: ResourceId::new("GrpcCluster"),
            container_directory: PathBuf::from("."),
            dockerfile: "Dockerfile".to_string(),
            environment: Environment::new(),
            desired_count: None,
            health_check: HealthCheckPolicy::default(),
        }
    }

    fn certificate() -> CertificateSpec {
        CertificateSpec {
            id: ResourceId::new("Certificate"),
            certificate: CertificateRef::resolve(Some(
                "arn:aws:acm:us-east-1:123456789012:certificate/abc",
            ))
            .unwrap(),
        }
    }

    #[test]
    fn missing_certificate_creates_nothing() {
        let mut provisioner = RecordingProvisioner::default();
        let err = grpc_service(&mut provisioner, props(None)).unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert!(provisioner.log().is_empty());
    }

    #[test]
    fn pool_is_created_before_its_frontend() {
        let mut provisioner = RecordingProvisioner::default();
        grpc_service(&mut provisioner, props(Some(certificate()))).unwrap();
        let kinds: Vec<_> = provisioner.log().iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ResourceKind::ImageAsset,
                ResourceKind::TaskDefinition,
                ResourceKind::WorkerPool,
                ResourceKind::LoadBalancer,
                ResourceKind::TargetGroup,
                ResourceKind::Listener,
            ]
        );
    }

    #[test]
    fn frontend_speaks_grpc_on_fixed_port() {
        let mut provisioner = RecordingProvisioner::default();
        let service = grpc_service(&mut provisioner, props(Some(certificate()))).unwrap();
        assert_eq!(service.listener.port, GRPC_PORT);
        assert_eq!(service.listener.protocol, ApplicationProtocol::Https);
        assert!(service.listener.open);
        assert_eq!(service.listener.certificates, vec![ResourceId::new("Certificate")]);
        assert_eq!(service.target_group.protocol_version, ProtocolVersion::Grpc);
        assert_eq!(service.target_group.members_from, service.worker_pool.id);
        assert_eq!(service.task_definition.container.port, GRPC_PORT);
        assert!(service.load_balancer.internet_facing);
    }
}
