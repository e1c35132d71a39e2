use super::spec::Resource;
use crate::{
    Result,
    resource::{ResourceId, ResourceKind},
};
use serde::Serialize;

/// Creates resources on the managed platform.
///
/// Called once per resource, in construction order. A returned error aborts
/// assembly and is surfaced unchanged; implementations must not retry.
pub trait Provisioner {
    /// Called at the start of every assembly.
    fn reset(&mut self) {}

    fn provision(&mut self, resource: Resource<'_>) -> Result<()>;
}

impl<P: Provisioner + ?Sized> Provisioner for &mut P {
    fn reset(&mut self) {
        (**self).reset();
    }

    fn provision(&mut self, resource: Resource<'_>) -> Result<()> {
        (**self).provision(resource)
    }
}

/// One entry of a [`RecordingProvisioner`]'s creation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionedResource {
    pub kind: ResourceKind,
    pub id: ResourceId,
}

/// Records the ordered creation log instead of calling a platform. This is
/// the plan the synth binary prints. The log holds the latest assembly only.
#[derive(Debug, Clone, Default)]
pub struct RecordingProvisioner {
    log: Vec<ProvisionedResource>,
}

impl RecordingProvisioner {
    pub fn log(&self) -> &[ProvisionedResource] {
        &self.log
    }
}

impl Provisioner for RecordingProvisioner {
    fn reset(&mut self) {
        self.log.clear();
    }

    fn provision(&mut self, resource: Resource<'_>) -> Result<()> {
        #[cfg(feature = "tracing")]
        tracing::debug!(kind = %resource.kind(), id = %resource.id(), "provisioning");

        self.log.push(ProvisionedResource {
            kind: resource.kind(),
            id: resource.id().clone(),
        });
        Ok(())
    }
}
