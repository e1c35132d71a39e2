use crate::resource::ResourceKind;
use serde::{Deserialize, Serialize};

/// Whether an action observes or mutates a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    Read,
    Write,
}

/// A single operation on a record store or change stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "&'static str", try_from = "String")]
pub enum Action {
    StorePutItem,
    StoreUpdateItem,
    StoreDeleteItem,
    StoreBatchWriteItem,
    StoreGetItem,
    StoreBatchGetItem,
    StoreQuery,
    StoreScan,
    StoreDescribe,
    StreamDescribe,
    StreamListShards,
    StreamGetShardIterator,
    StreamGetRecords,
    StreamSubscribeToShard,
}

impl Action {
    pub const ALL: [Action; 14] = [
        Action::StorePutItem,
        Action::StoreUpdateItem,
        Action::StoreDeleteItem,
        Action::StoreBatchWriteItem,
        Action::StoreGetItem,
        Action::StoreBatchGetItem,
        Action::StoreQuery,
        Action::StoreScan,
        Action::StoreDescribe,
        Action::StreamDescribe,
        Action::StreamListShards,
        Action::StreamGetShardIterator,
        Action::StreamGetRecords,
        Action::StreamSubscribeToShard,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::StorePutItem => "store:PutItem",
            Action::StoreUpdateItem => "store:UpdateItem",
            Action::StoreDeleteItem => "store:DeleteItem",
            Action::StoreBatchWriteItem => "store:BatchWriteItem",
            Action::StoreGetItem => "store:GetItem",
            Action::StoreBatchGetItem => "store:BatchGetItem",
            Action::StoreQuery => "store:Query",
            Action::StoreScan => "store:Scan",
            Action::StoreDescribe => "store:DescribeTable",
            Action::StreamDescribe => "stream:DescribeStream",
            Action::StreamListShards => "stream:ListShards",
            Action::StreamGetShardIterator => "stream:GetShardIterator",
            Action::StreamGetRecords => "stream:GetRecords",
            Action::StreamSubscribeToShard => "stream:SubscribeToShard",
        }
    }

    pub fn level(self) -> AccessLevel {
        match self {
            Action::StorePutItem
            | Action::StoreUpdateItem
            | Action::StoreDeleteItem
            | Action::StoreBatchWriteItem => AccessLevel::Write,
            _ => AccessLevel::Read,
        }
    }

    /// Kind of resource the action applies to.
    pub fn resource_kind(self) -> ResourceKind {
        if self.as_str().starts_with("store:") {
            ResourceKind::RecordStore
        } else {
            ResourceKind::ChangeStream
        }
    }
}

impl core::fmt::Display for Action {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for Action {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|action| action.as_str() == value)
            .ok_or_else(|| format!("unknown action `{value}`"))
    }
}

impl From<Action> for &'static str {
    fn from(value: Action) -> Self {
        value.as_str()
    }
}

impl TryFrom<String> for Action {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
