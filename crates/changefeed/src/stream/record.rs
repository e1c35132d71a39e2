use crate::{Error, Result, store::Item};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Kind of mutation a [`ChangeRecord`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventName {
    Insert,
    Modify,
    Remove,
}

/// Key and images of a captured mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamImage {
    #[serde(rename = "Keys")]
    pub keys: Item,
    #[serde(rename = "NewImage", default, skip_serializing_if = "Option::is_none")]
    pub new_image: Option<Item>,
    #[serde(rename = "OldImage", default, skip_serializing_if = "Option::is_none")]
    pub old_image: Option<Item>,
    /// Seconds since the Unix epoch.
    #[serde(rename = "ApproximateCreationDateTime")]
    pub approximate_creation: u64,
}

/// One captured mutation of a record store, as published on the change
/// stream. The partition key is found at `dynamodb.Keys.<key>.S`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    #[serde(rename = "eventID")]
    pub event_id: String,
    #[serde(rename = "eventName")]
    pub event_name: EventName,
    #[serde(rename = "tableName")]
    pub table_name: String,
    pub dynamodb: StreamImage,
}

impl ChangeRecord {
    pub fn key(&self, partition_key: &str) -> Option<&str> {
        self.dynamodb.keys.get_str(partition_key)
    }
}

/// A record as stored in a shard: the serialized [`ChangeRecord`] plus its
/// position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRecord {
    pub shard: String,
    pub sequence_number: u64,
    pub partition_key: String,
    pub data: Vec<u8>,
    pub arrival: SystemTime,
}

impl StreamRecord {
    pub fn change(&self) -> Result<ChangeRecord> {
        serde_json::from_slice(&self.data).map_err(|e| Error::MalformedRecord {
            shard: self.shard.clone(),
            sequence: self.sequence_number,
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::AttributeValue;

    #[test]
    fn key_is_reachable_at_the_documented_path() {
        let record = ChangeRecord {
            event_id: "1".to_string(),
            event_name: EventName::Insert,
            table_name: "Table".to_string(),
            dynamodb: StreamImage {
                keys: Item::new().with("id", AttributeValue::string("rec-1")),
                new_image: Some(
                    Item::new()
                        .with("id", AttributeValue::string("rec-1"))
                        .with("payload", AttributeValue::string("x")),
                ),
                old_image: None,
                approximate_creation: 0,
            },
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["dynamodb"]["Keys"]["id"]["S"], "rec-1");
        assert_eq!(json["eventName"], "INSERT");
        assert!(json["dynamodb"].get("OldImage").is_none());
        assert_eq!(record.key("id"), Some("rec-1"));
    }

    #[test]
    fn garbage_payload_is_malformed() {
        let record = StreamRecord {
            shard: "shardId-000000000000".to_string(),
            sequence_number: 3,
            partition_key: "k".to_string(),
            data: b"not json".to_vec(),
            arrival: SystemTime::UNIX_EPOCH,
        };
        assert!(matches!(
            record.change(),
            Err(Error::MalformedRecord { sequence: 3, .. })
        ));
    }
}
