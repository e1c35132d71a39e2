use super::action::Action;
use crate::resource::ResourceKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Declared role of a principal with respect to a resource it is wired to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Applies discrete write requests to the record store.
    Ingest,
    /// Serves RPC calls from the change stream and record store.
    Worker,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Ingest => "ingest",
            Role::Worker => "worker",
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const STORE_WRITE: &[Action] = &[
    Action::StorePutItem,
    Action::StoreUpdateItem,
    Action::StoreDeleteItem,
    Action::StoreBatchWriteItem,
];

pub const STORE_READ: &[Action] = &[
    Action::StoreGetItem,
    Action::StoreBatchGetItem,
    Action::StoreQuery,
    Action::StoreScan,
    Action::StoreDescribe,
];

pub const STREAM_READ: &[Action] = &[
    Action::StreamDescribe,
    Action::StreamListShards,
    Action::StreamGetShardIterator,
    Action::StreamGetRecords,
    Action::StreamSubscribeToShard,
];

/// Maps `(role, resource kind)` to the minimal action set for that pairing.
///
/// Pairings without an entry are not anticipated by the pipeline shape and
/// make grant resolution fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleTable {
    rules: BTreeMap<(Role, ResourceKind), &'static [Action]>,
}

impl RuleTable {
    pub fn empty() -> Self {
        Self {
            rules: BTreeMap::new(),
        }
    }

    pub fn with_rule(mut self, role: Role, kind: ResourceKind, actions: &'static [Action]) -> Self {
        self.rules.insert((role, kind), actions);
        self
    }

    pub fn actions(&self, role: Role, kind: ResourceKind) -> Option<&'static [Action]> {
        self.rules.get(&(role, kind)).copied()
    }
}

impl Default for RuleTable {
    /// Ingest writes the store and never touches the stream. Workers read
    /// both.
    fn default() -> Self {
        Self::empty()
            .with_rule(Role::Ingest, ResourceKind::RecordStore, STORE_WRITE)
            .with_rule(Role::Worker, ResourceKind::RecordStore, STORE_READ)
            .with_rule(Role::Worker, ResourceKind::ChangeStream, STREAM_READ)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grants::AccessLevel;

    #[test]
    fn default_table_has_no_ingest_stream_rule() {
        let table = RuleTable::default();
        assert!(table.actions(Role::Ingest, ResourceKind::ChangeStream).is_none());
    }

    #[test]
    fn rule_sets_match_their_access_level() {
        assert!(STORE_WRITE.iter().all(|a| a.level() == AccessLevel::Write));
        assert!(STORE_READ.iter().all(|a| a.level() == AccessLevel::Read));
        assert!(STREAM_READ.iter().all(|a| a.level() == AccessLevel::Read));
    }

    #[test]
    fn rule_sets_target_their_resource_kind() {
        let table = RuleTable::default();
        for ((_, kind), actions) in &table.rules {
            assert!(actions.iter().all(|a| a.resource_kind() == *kind));
        }
    }
}
