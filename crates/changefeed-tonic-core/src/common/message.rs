use crate::{Result, proto::SubscribeResponse};
use changefeed::worker::Snapshot;

/// `type` of a record update.
pub const BROADCAST: &str = "broadcast";
/// `type` of a keep-alive.
pub const PING: &str = "ping";

/// A record update; `data` is the snapshot as JSON.
pub fn broadcast(snapshot: &Snapshot) -> Result<SubscribeResponse> {
    Ok(SubscribeResponse {
        r#type: BROADCAST.to_string(),
        data: serde_json::to_string(snapshot)?,
    })
}

pub fn ping() -> SubscribeResponse {
    SubscribeResponse {
        r#type: PING.to_string(),
        data: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_carries_snapshot_json() {
        let message = broadcast(&Snapshot {
            id: "rec-1".to_string(),
            value: Some(42.0),
        })
        .unwrap();
        assert_eq!(message.r#type, "broadcast");
        let data: serde_json::Value = serde_json::from_str(&message.data).unwrap();
        assert_eq!(data["id"], "rec-1");
        assert_eq!(data["value"], 42.0);
    }

    #[test]
    fn removed_record_has_null_value() {
        let message = broadcast(&Snapshot {
            id: "rec-1".to_string(),
            value: None,
        })
        .unwrap();
        assert_eq!(message.data, r#"{"id":"rec-1","value":null}"#);
    }

    #[test]
    fn ping_has_empty_body() {
        let message = ping();
        assert_eq!(message.r#type, "ping");
        assert!(message.data.is_empty());
    }
}
