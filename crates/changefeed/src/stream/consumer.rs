use super::{
    memory::{IteratorPosition, ShardIterator, StreamReader},
    record::StreamRecord,
};
use crate::{Error, Result};

/// Independent reader of every shard of a change stream.
///
/// Each consumer owns its read positions; consumers never observe each
/// other. A position that falls behind retention is moved to the trim
/// horizon and reading continues from there.
pub struct StreamConsumer {
    reader: StreamReader,
    positions: Vec<(String, ShardIterator)>,
    batch_size: usize,
}

impl StreamConsumer {
    pub const DEFAULT_BATCH_SIZE: usize = 100;

    pub fn new(reader: StreamReader, start: IteratorPosition) -> Result<Self> {
        let positions = reader
            .list_shards()?
            .into_iter()
            .map(|shard| {
                let iterator = reader.shard_iterator(&shard, start)?;
                Ok((shard, iterator))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            reader,
            positions,
            batch_size: Self::DEFAULT_BATCH_SIZE,
        })
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Reads the next batch of every shard, in shard order, and advances.
    pub fn poll(&mut self) -> Result<Vec<StreamRecord>> {
        let mut records = Vec::new();
        for (shard, iterator) in &mut self.positions {
            let output = match self.reader.get_records(iterator, self.batch_size) {
                Err(Error::ExpiredIterator { .. }) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        shard = %shard,
                        from = iterator.next_sequence(),
                        "position expired, resuming at trim horizon"
                    );
                    *iterator = self
                        .reader
                        .shard_iterator(shard, IteratorPosition::TrimHorizon)?;
                    self.reader.get_records(iterator, self.batch_size)?
                }
                other => other?,
            };
            *iterator = output.next_iterator;
            records.extend(output.records);
        }
        Ok(records)
    }

    /// Moves every shard back to `position`.
    pub fn rewind(&mut self, position: IteratorPosition) -> Result<()> {
        for (shard, iterator) in &mut self.positions {
            *iterator = self.reader.shard_iterator(shard, position)?;
        }
        Ok(())
    }

    /// Moves one shard to `position`, leaving the others where they are.
    pub fn seek(&mut self, shard: &str, position: IteratorPosition) -> Result<()> {
        let (_, iterator) = self
            .positions
            .iter_mut()
            .find(|(id, _)| id == shard)
            .ok_or_else(|| Error::UnknownShard {
                shard: shard.to_string(),
            })?;
        *iterator = self.reader.shard_iterator(shard, position)?;
        Ok(())
    }

    /// Next sequence number per shard.
    pub fn positions(&self) -> impl Iterator<Item = (&str, u64)> {
        self.positions
            .iter()
            .map(|(shard, iterator)| (shard.as_str(), iterator.next_sequence()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        grants::{GrantSet, STREAM_READ},
        resource::Principal,
        store::{AttributeValue, Item},
        stream::{ChangeRecord, ChangeStream, EventName, StreamImage},
        topology::ChangeStreamSpec,
    };
    use core::time::Duration;
    use std::{sync::Arc, time::SystemTime};

    fn stream() -> (Arc<ChangeStream>, StreamReader) {
        let stream = Arc::new(ChangeStream::new(&ChangeStreamSpec {
            shard_count: 2,
            ..ChangeStreamSpec::new("Stream")
        }));
        let principal = Principal::new("Worker/TaskRole");
        let mut grants = GrantSet::default();
        grants.insert(&principal, stream.id(), STREAM_READ);
        let reader = stream.reader(principal, Arc::new(grants));
        (stream, reader)
    }

    fn put(stream: &ChangeStream, key: &str) {
        let change = ChangeRecord {
            event_id: key.to_string(),
            event_name: EventName::Insert,
            table_name: "Table".to_string(),
            dynamodb: StreamImage {
                keys: Item::new().with("id", AttributeValue::string(key)),
                new_image: None,
                old_image: None,
                approximate_creation: 0,
            },
        };
        stream.capture(&change, key).unwrap();
    }

    #[test]
    fn consumers_track_positions_independently() {
        let (stream, reader) = stream();
        let mut first = StreamConsumer::new(reader.clone(), IteratorPosition::TrimHorizon).unwrap();
        let mut second = StreamConsumer::new(reader, IteratorPosition::TrimHorizon).unwrap();

        put(&stream, "a");
        put(&stream, "b");
        assert_eq!(first.poll().unwrap().len(), 2);
        assert!(first.poll().unwrap().is_empty());

        put(&stream, "c");
        assert_eq!(first.poll().unwrap().len(), 1);
        assert_eq!(second.poll().unwrap().len(), 3);
    }

    #[test]
    fn rewind_replays() {
        let (stream, reader) = stream();
        let mut consumer = StreamConsumer::new(reader, IteratorPosition::Latest).unwrap();
        put(&stream, "a");
        assert_eq!(consumer.poll().unwrap().len(), 1);
        consumer.rewind(IteratorPosition::TrimHorizon).unwrap();
        assert_eq!(consumer.poll().unwrap().len(), 1);
    }

    #[test]
    fn seek_moves_only_one_shard() {
        let (stream, reader) = stream();
        let mut consumer = StreamConsumer::new(reader, IteratorPosition::TrimHorizon).unwrap();
        for key in ["a", "b", "c", "d"] {
            put(&stream, key);
        }
        let records = consumer.poll().unwrap();
        let first = &records[0];

        consumer
            .seek(&first.shard, IteratorPosition::AtSequence(first.sequence_number))
            .unwrap();
        let replayed = consumer.poll().unwrap();
        assert!(!replayed.is_empty());
        assert!(replayed.iter().all(|record| record.shard == first.shard));
        assert_eq!(replayed[0].partition_key, first.partition_key);

        assert!(matches!(
            consumer.seek("missing", IteratorPosition::TrimHorizon),
            Err(Error::UnknownShard { .. })
        ));
    }

    #[test]
    fn batch_size_bounds_each_poll() {
        let (stream, reader) = stream();
        let mut consumer = StreamConsumer::new(reader, IteratorPosition::TrimHorizon)
            .unwrap()
            .with_batch_size(1);
        for key in ["a", "a", "a"] {
            put(&stream, key);
        }
        assert_eq!(consumer.poll().unwrap().len(), 1);
        assert_eq!(consumer.poll().unwrap().len(), 1);
        assert_eq!(consumer.poll().unwrap().len(), 1);
        assert!(consumer.poll().unwrap().is_empty());
    }

    #[test]
    fn expired_position_resumes_at_horizon() {
        let (stream, reader) = stream();
        let mut consumer = StreamConsumer::new(reader, IteratorPosition::TrimHorizon).unwrap();
        put(&stream, "a");
        stream.trim_expired(SystemTime::now() + stream.retention() + Duration::from_secs(1));
        put(&stream, "b");

        let records = consumer.poll().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].partition_key, "b");
    }
}
