//! Ingest function runtime: applies discrete write requests to the record
//! store. It never reads the change stream.

use crate::{
    Error, Result,
    grants::GrantSet,
    resource::Principal,
    store::{AttributeValue, Item, RecordStore, StoreHandle},
    topology::{Environment, INGEST_STORE_ENV},
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// A single keyed write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteRequest {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl WriteRequest {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            payload: None,
            value: None,
        }
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    /// A request with a random v4 id and an integer value in `0..=100`.
    pub fn random() -> Self {
        let value = rand::rng().random_range(0..=100_u8);
        Self::new(Uuid::new_v4().to_string()).with_value(f64::from(value))
    }

    fn into_item(self, partition_key: &str) -> Item {
        let mut item = Item::new().with(partition_key, AttributeValue::string(self.id));
        if let Some(payload) = self.payload {
            item.insert("payload", AttributeValue::string(payload));
        }
        if let Some(value) = self.value {
            item.insert("value", AttributeValue::number(value));
        }
        item
    }
}

pub struct IngestFunction {
    store: StoreHandle,
}

impl IngestFunction {
    /// Binds to the store named by `TABLE` in `environment`.
    ///
    /// `lookup` resolves a store identifier the way the platform would.
    pub fn from_env(
        environment: &Environment,
        principal: Principal,
        grants: Arc<GrantSet>,
        lookup: impl FnOnce(&str) -> Option<Arc<RecordStore>>,
    ) -> Result<Self> {
        let store_id = environment.get(INGEST_STORE_ENV).ok_or_else(|| {
            Error::configuration(
                format!("Environment variable {INGEST_STORE_ENV} is not set!"),
                "Wire the function to a record store before invoking it.",
            )
        })?;
        let store = lookup(store_id).ok_or_else(|| {
            Error::configuration(
                format!("{INGEST_STORE_ENV} names unknown record store `{store_id}`"),
                "Point the variable at a store of this deployment.",
            )
        })?;

        Ok(Self {
            store: store.handle(principal, grants),
        })
    }

    pub fn principal(&self) -> &Principal {
        self.store.principal()
    }

    /// Writes the request as one item keyed by its id.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(id = %request.id)))]
    pub fn handle(&self, request: WriteRequest) -> Result<()> {
        let item = request.into_item(&self.store.key_schema().partition_key);
        self.store.put_item(item)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(store = %self.store.store_id(), "item written");

        Ok(())
    }
}
