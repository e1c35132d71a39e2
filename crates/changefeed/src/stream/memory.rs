use super::{
    clock::{ArrivalClock, SystemClock},
    record::{ChangeRecord, StreamRecord},
};
use crate::{
    Error, Result,
    grants::{Action, GrantSet},
    resource::{Principal, ResourceId},
    topology::ChangeStreamSpec,
};
use core::{
    hash::{Hash, Hasher},
    time::Duration,
};
use parking_lot::RwLock;
use serde::Serialize;
use std::{
    collections::{VecDeque, hash_map::DefaultHasher},
    sync::Arc,
    time::SystemTime,
};

/// Where a new [`ShardIterator`] starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IteratorPosition {
    /// Just after the newest record; only later records are returned.
    Latest,
    /// The oldest record still retained.
    TrimHorizon,
    AtSequence(u64),
    AfterSequence(u64),
}

/// A read position within one shard. Iterators are plain values; every
/// consumer holds its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardIterator {
    shard: usize,
    next_sequence: u64,
}

impl ShardIterator {
    /// Sequence number the next read starts at.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }
}

/// Result of [`StreamReader::get_records`].
#[derive(Debug, Clone)]
pub struct GetRecordsOutput {
    pub records: Vec<StreamRecord>,
    pub next_iterator: ShardIterator,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamDescription {
    pub id: ResourceId,
    pub shards: Vec<String>,
    pub retention_hours: u32,
}

struct Shard {
    id: String,
    records: VecDeque<StreamRecord>,
    /// Sequence number the next appended record receives.
    next_sequence: u64,
    /// Oldest sequence number still retained.
    trim_horizon: u64,
}

impl Shard {
    fn new(index: usize) -> Self {
        Self {
            id: format!("shardId-{index:012}"),
            records: VecDeque::new(),
            next_sequence: 0,
            trim_horizon: 0,
        }
    }
}

/// An ordered, partitioned change log with bounded retention.
///
/// Records are routed to a shard by hashing their partition key, so all
/// changes to one key stay ordered. Nothing is ordered across shards.
pub struct ChangeStream {
    id: ResourceId,
    retention_hours: u32,
    shards: Vec<RwLock<Shard>>,
    clock: Arc<dyn ArrivalClock>,
}

impl ChangeStream {
    pub fn new(spec: &ChangeStreamSpec) -> Self {
        Self::with_clock(spec, Arc::new(SystemClock))
    }

    /// Stamps arrivals and measures retention with `clock`.
    pub fn with_clock(spec: &ChangeStreamSpec, clock: Arc<dyn ArrivalClock>) -> Self {
        Self {
            id: spec.id.clone(),
            retention_hours: spec.retention_hours,
            shards: (0..spec.shard_count.max(1) as usize)
                .map(|index| RwLock::new(Shard::new(index)))
                .collect(),
            clock,
        }
    }

    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(u64::from(self.retention_hours) * 3600)
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Reads through `principal`'s grants.
    pub fn reader(self: &Arc<Self>, principal: Principal, grants: Arc<GrantSet>) -> StreamReader {
        StreamReader {
            stream: Arc::clone(self),
            principal,
            grants,
        }
    }

    fn shard_for(&self, partition_key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        partition_key.hash(&mut hasher);
        (hasher.finish() % self.shards.len() as u64) as usize
    }

    /// Appends a captured mutation. Only the record store publishes, so this
    /// bypasses grant checks.
    pub(crate) fn capture(&self, change: &ChangeRecord, partition_key: &str) -> Result<u64> {
        let index = self.shard_for(partition_key);
        let mut shard = self.shards[index].write();
        let sequence = shard.next_sequence;
        let data = serde_json::to_vec(change).map_err(|e| Error::MalformedRecord {
            shard: shard.id.clone(),
            sequence,
            reason: e.to_string(),
        })?;

        let record = StreamRecord {
            shard: shard.id.clone(),
            sequence_number: sequence,
            partition_key: partition_key.to_string(),
            data,
            arrival: self.clock.now(),
        };
        shard.records.push_back(record);
        shard.next_sequence += 1;

        #[cfg(feature = "tracing")]
        tracing::trace!(stream = %self.id, shard = %shard.id, sequence, "captured");

        Ok(sequence)
    }

    /// Drops records that arrived before `now - retention`. Returns how many
    /// were dropped.
    pub fn trim_expired(&self, now: SystemTime) -> usize {
        let Some(cutoff) = now.checked_sub(self.retention()) else {
            return 0;
        };
        let mut dropped = 0;
        for shard in &self.shards {
            let mut shard = shard.write();
            while shard.records.front().is_some_and(|r| r.arrival < cutoff) {
                shard.records.pop_front();
                dropped += 1;
            }
            shard.trim_horizon = shard
                .records
                .front()
                .map_or(shard.next_sequence, |r| r.sequence_number);
        }

        #[cfg(feature = "tracing")]
        if dropped > 0 {
            tracing::debug!(stream = %self.id, dropped, "trimmed expired records");
        }

        dropped
    }

    /// Drops records older than the retention window on the stream's clock.
    pub fn trim(&self) -> usize {
        self.trim_expired(self.clock.now())
    }

    /// Records currently retained across all shards.
    pub fn retained(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().records.len()).sum()
    }

    fn shard_index(&self, shard_id: &str) -> Result<usize> {
        self.shards
            .iter()
            .position(|shard| shard.read().id == shard_id)
            .ok_or_else(|| Error::UnknownShard {
                shard: shard_id.to_string(),
            })
    }
}

/// Grant-checked read access to a [`ChangeStream`] on behalf of one
/// principal.
#[derive(Clone)]
pub struct StreamReader {
    stream: Arc<ChangeStream>,
    principal: Principal,
    grants: Arc<GrantSet>,
}

impl StreamReader {
    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    fn authorize(&self, action: Action) -> Result<()> {
        self.grants.check(&self.principal, &self.stream.id, action)
    }

    pub fn describe(&self) -> Result<StreamDescription> {
        self.authorize(Action::StreamDescribe)?;
        Ok(StreamDescription {
            id: self.stream.id.clone(),
            shards: self.shard_ids(),
            retention_hours: self.stream.retention_hours,
        })
    }

    pub fn list_shards(&self) -> Result<Vec<String>> {
        self.authorize(Action::StreamListShards)?;
        Ok(self.shard_ids())
    }

    fn shard_ids(&self) -> Vec<String> {
        self.stream
            .shards
            .iter()
            .map(|shard| shard.read().id.clone())
            .collect()
    }

    pub fn shard_iterator(&self, shard_id: &str, position: IteratorPosition) -> Result<ShardIterator> {
        self.authorize(Action::StreamGetShardIterator)?;
        let index = self.stream.shard_index(shard_id)?;
        let shard = self.stream.shards[index].read();

        let next_sequence = match position {
            IteratorPosition::Latest => shard.next_sequence,
            IteratorPosition::TrimHorizon => shard.trim_horizon,
            IteratorPosition::AtSequence(sequence) => sequence,
            IteratorPosition::AfterSequence(sequence) => sequence.saturating_add(1),
        };
        if next_sequence < shard.trim_horizon {
            return Err(Error::ExpiredIterator {
                shard: shard.id.clone(),
                sequence: next_sequence,
            });
        }

        Ok(ShardIterator {
            shard: index,
            next_sequence,
        })
    }

    /// Returns up to `limit` records starting at the iterator, and the
    /// iterator to continue from.
    pub fn get_records(&self, iterator: &ShardIterator, limit: usize) -> Result<GetRecordsOutput> {
        self.authorize(Action::StreamGetRecords)?;
        let shard = self
            .stream
            .shards
            .get(iterator.shard)
            .ok_or_else(|| Error::UnknownShard {
                shard: iterator.shard.to_string(),
            })?
            .read();

        if iterator.next_sequence < shard.trim_horizon {
            return Err(Error::ExpiredIterator {
                shard: shard.id.clone(),
                sequence: iterator.next_sequence,
            });
        }

        let skip = (iterator.next_sequence - shard.trim_horizon) as usize;
        let records: Vec<StreamRecord> = shard.records.iter().skip(skip).take(limit).cloned().collect();
        let next_sequence = records
            .last()
            .map_or(iterator.next_sequence, |r| r.sequence_number + 1);

        Ok(GetRecordsOutput {
            records,
            next_iterator: ShardIterator {
                shard: iterator.shard,
                next_sequence,
            },
        })
    }
}
