use super::{action::Action, rules::RuleTable};
use crate::{
    Error, Result,
    resource::{Principal, ResourceId},
    topology::Topology,
};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// A (principal, resource, actions) triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Grant {
    pub principal: Principal,
    pub resource: ResourceId,
    pub actions: BTreeSet<Action>,
}

/// Every grant of a topology, keyed by principal and resource.
///
/// Ordered maps keep iteration and serialization deterministic, so resolving
/// the same topology twice yields equal sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(into = "Vec<Grant>")]
pub struct GrantSet {
    grants: BTreeMap<(Principal, ResourceId), BTreeSet<Action>>,
}

impl GrantSet {
    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    pub fn actions(&self, principal: &Principal, resource: &ResourceId) -> Option<&BTreeSet<Action>> {
        self.grants.get(&(principal.clone(), resource.clone()))
    }

    pub fn allows(&self, principal: &Principal, resource: &ResourceId, action: Action) -> bool {
        self.actions(principal, resource)
            .is_some_and(|actions| actions.contains(&action))
    }

    /// Like [`GrantSet::allows`] but yields [`Error::AccessDenied`].
    pub fn check(&self, principal: &Principal, resource: &ResourceId, action: Action) -> Result<()> {
        if self.allows(principal, resource, action) {
            Ok(())
        } else {
            #[cfg(feature = "tracing")]
            tracing::warn!(%principal, %resource, %action, "access denied");
            Err(Error::AccessDenied {
                principal: principal.to_string(),
                action: action.to_string(),
                resource: resource.to_string(),
            })
        }
    }

    /// Resources the principal holds any grant on.
    pub fn resources_of<'a>(&'a self, principal: &'a Principal) -> impl Iterator<Item = &'a ResourceId> {
        self.grants
            .keys()
            .filter(move |(p, _)| p == principal)
            .map(|(_, r)| r)
    }

    pub fn iter(&self) -> impl Iterator<Item = Grant> + '_ {
        self.grants.iter().map(|((principal, resource), actions)| Grant {
            principal: principal.clone(),
            resource: resource.clone(),
            actions: actions.clone(),
        })
    }

    pub(crate) fn insert(&mut self, principal: &Principal, resource: &ResourceId, actions: &[Action]) {
        self.grants
            .entry((principal.clone(), resource.clone()))
            .or_default()
            .extend(actions.iter().copied());
    }
}

impl From<GrantSet> for Vec<Grant> {
    fn from(value: GrantSet) -> Self {
        value.iter().collect()
    }
}

/// Derives the minimal grant set of a topology from its wiring edges.
///
/// Resolution is a pure function of the topology: it reads the edges and the
/// rule table and nothing else.
#[derive(Debug, Clone, Default)]
pub struct AccessGrantResolver {
    rules: RuleTable,
}

impl AccessGrantResolver {
    pub fn new(rules: RuleTable) -> Self {
        Self { rules }
    }

    pub fn resolve(&self, topology: &Topology) -> Result<GrantSet> {
        let mut grants = GrantSet::default();

        for edge in topology.edges() {
            let kind = topology.kind_of(&edge.resource);
            let actions = kind.and_then(|kind| self.rules.actions(edge.role, kind));

            let Some(actions) = actions else {
                return Err(Error::GrantComputation {
                    principal: edge.principal.to_string(),
                    role: edge.role.to_string(),
                    resource: edge.resource.to_string(),
                    kind: kind.map_or("unknown resource", |k| k.as_str()).to_string(),
                });
            };

            #[cfg(feature = "tracing")]
            tracing::debug!(
                principal = %edge.principal,
                resource = %edge.resource,
                actions = actions.len(),
                "granting"
            );
            grants.insert(&edge.principal, &edge.resource, actions);
        }

        Ok(grants)
    }
}
