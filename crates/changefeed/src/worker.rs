//! Worker replica logic: follow the change stream and look up the current
//! state of every changed record.

use crate::{
    Error, Result,
    grants::GrantSet,
    pipeline::Resources,
    resource::Principal,
    store::StoreHandle,
    stream::{IteratorPosition, StreamConsumer},
    topology::{Environment, WORKER_STORE_ENV, WORKER_STREAM_ENV},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Current state of a changed record. `value` is `None` once the record is
/// gone or when it carries no numeric value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub value: Option<f64>,
}

pub struct Worker {
    store: StoreHandle,
    consumer: StreamConsumer,
}

fn required<'a>(environment: &'a Environment, name: &str) -> Result<&'a str> {
    environment.get(name).map(String::as_str).ok_or_else(|| {
        Error::configuration(
            format!("Environment variable {name} is not set!"),
            format!("Inject `{name}` into the worker container."),
        )
    })
}

impl Worker {
    /// Binds to the store and stream named by `DYNAMODB_TABLE` and
    /// `KINESIS_STREAM`. Reading starts at the newest record of each shard.
    pub fn from_env(
        environment: &Environment,
        principal: Principal,
        grants: Arc<GrantSet>,
        resources: &Resources,
    ) -> Result<Self> {
        let store_id = required(environment, WORKER_STORE_ENV)?;
        let stream_id = required(environment, WORKER_STREAM_ENV)?;
        let unknown = |name: &str, id: &str| {
            Error::configuration(
                format!("{name} names unknown resource `{id}`"),
                "Point the variable at a resource of this deployment.",
            )
        };

        let store = resources
            .store(store_id)
            .ok_or_else(|| unknown(WORKER_STORE_ENV, store_id))?;
        let stream = resources
            .stream(stream_id)
            .ok_or_else(|| unknown(WORKER_STREAM_ENV, stream_id))?;

        let consumer = StreamConsumer::new(
            stream.reader(principal.clone(), Arc::clone(&grants)),
            IteratorPosition::Latest,
        )?;

        Ok(Self {
            store: store.handle(principal, grants),
            consumer,
        })
    }

    pub fn principal(&self) -> &Principal {
        self.store.principal()
    }

    /// Reads every new change record and resolves each to the record's
    /// current state. Records without a readable key are skipped.
    ///
    /// When a lookup fails, that shard is moved back to the failed record
    /// and its later records wait for the next poll; other shards proceed.
    pub fn poll(&mut self) -> Result<Vec<Snapshot>> {
        let partition_key = self.store.key_schema().partition_key.clone();
        let mut snapshots = Vec::new();
        let mut stalled: Vec<String> = Vec::new();

        for record in self.consumer.poll()? {
            if stalled.contains(&record.shard) {
                continue;
            }
            let change = match record.change() {
                Ok(change) => change,
                Err(_e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Skipping record: {_e}");
                    continue;
                }
            };
            let Some(id) = change.key(&partition_key) else {
                #[cfg(feature = "tracing")]
                tracing::warn!(event = %change.event_id, "change record without key");
                continue;
            };

            match self.store.query(id) {
                Ok(items) => snapshots.push(Snapshot {
                    id: id.to_string(),
                    value: items.first().and_then(|item| item.get_f64("value")),
                }),
                Err(_e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        shard = %record.shard,
                        sequence = record.sequence_number,
                        "lookup failed, retrying next poll: {_e}"
                    );
                    self.consumer.seek(
                        &record.shard,
                        IteratorPosition::AtSequence(record.sequence_number),
                    )?;
                    stalled.push(record.shard);
                }
            }
        }
        Ok(snapshots)
    }

    /// Next sequence number per shard.
    pub fn positions(&self) -> Vec<(String, u64)> {
        self.consumer
            .positions()
            .map(|(shard, sequence)| (shard.to_string(), sequence))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Pipeline,
        grants::STREAM_READ,
        ingest::WriteRequest,
        topology::{AssemblyParams, TopologyAssembler},
    };

    const ARN: &str = "arn:aws:acm:eu-west-1:123456789012:certificate/0a1b2c3d";

    fn pipeline() -> Pipeline {
        let assembly = TopologyAssembler::new()
            .assemble(&AssemblyParams::new(Some(ARN.to_string())))
            .unwrap();
        Pipeline::launch(assembly).unwrap()
    }

    #[test]
    fn failed_lookups_are_retried_not_lost() {
        let pipeline = pipeline();
        let task = &pipeline.assembly().topology.service().task_definition;
        let principal = task.principal.clone();

        // Stream access only: every store lookup is denied.
        let mut grants = GrantSet::default();
        grants.insert(&principal, pipeline.stream().id(), STREAM_READ);
        let mut worker = Worker::from_env(
            &task.container.environment,
            principal,
            Arc::new(grants),
            pipeline.resources(),
        )
        .unwrap();
        let start = worker.positions();

        let ingest = pipeline.ingest().unwrap();
        ingest
            .handle(WriteRequest::new("rec-1").with_value(1.0))
            .unwrap();
        ingest
            .handle(WriteRequest::new("rec-2").with_value(2.0))
            .unwrap();

        assert!(worker.poll().unwrap().is_empty());
        assert_eq!(worker.positions(), start);
        assert!(worker.poll().unwrap().is_empty());
        assert_eq!(worker.positions(), start);
    }

    #[test]
    fn successful_lookups_advance() {
        let pipeline = pipeline();
        let mut worker = pipeline.worker().unwrap();
        let start = worker.positions();

        pipeline
            .ingest()
            .unwrap()
            .handle(WriteRequest::new("rec-1").with_value(1.0))
            .unwrap();

        assert_eq!(
            worker.poll().unwrap(),
            vec![Snapshot {
                id: "rec-1".to_string(),
                value: Some(1.0),
            }]
        );
        assert_eq!(worker.positions()[0].1, start[0].1 + 1);
    }
}
