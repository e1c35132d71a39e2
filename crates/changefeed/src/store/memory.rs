use super::item::{AttributeValue, Item};
use crate::{
    Error, Result,
    grants::{Action, GrantSet},
    resource::{Principal, ResourceId},
    stream::{ChangeRecord, ChangeStream, EventName, StreamImage},
    topology::{AttributeType, KeySchema, RecordStoreSpec},
};
use parking_lot::RwLock;
use serde::Serialize;
use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{SystemTime, UNIX_EPOCH},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreDescription {
    pub id: ResourceId,
    pub key_schema: KeySchema,
    pub item_count: usize,
    pub change_stream: Option<ResourceId>,
}

#[derive(Default)]
struct Inner {
    items: BTreeMap<String, Item>,
    capture: Option<Arc<ChangeStream>>,
}

/// Keyed item store with optional change capture.
///
/// While a stream is attached, every mutation appends exactly one record to
/// it. The append happens under the store's write lock after the item is
/// in place, so a consumer never sees an event for a write that has not
/// completed.
pub struct RecordStore {
    id: ResourceId,
    key_schema: KeySchema,
    inner: RwLock<Inner>,
    next_event: AtomicU64,
}

impl RecordStore {
    pub fn new(spec: &RecordStoreSpec) -> Self {
        Self {
            id: spec.id.clone(),
            key_schema: spec.key_schema.clone(),
            inner: RwLock::new(Inner::default()),
            next_event: AtomicU64::new(1),
        }
    }

    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    pub fn key_schema(&self) -> &KeySchema {
        &self.key_schema
    }

    /// Starts capturing mutations into `stream`. A store captures into at
    /// most one stream.
    pub fn attach(&self, stream: Arc<ChangeStream>) -> Result<()> {
        let mut inner = self.inner.write();
        if let Some(existing) = &inner.capture {
            return Err(Error::StreamAlreadyAttached {
                store: self.id.to_string(),
                stream: existing.id().to_string(),
            });
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(store = %self.id, stream = %stream.id(), "capture attached");

        inner.capture = Some(stream);
        Ok(())
    }

    /// Stops capturing. Later mutations produce no records.
    pub fn detach(&self) -> Option<Arc<ChangeStream>> {
        self.inner.write().capture.take()
    }

    pub fn captures_into(&self) -> Option<ResourceId> {
        self.inner.read().capture.as_ref().map(|s| s.id().clone())
    }

    /// Accesses the store through `principal`'s grants.
    pub fn handle(self: &Arc<Self>, principal: Principal, grants: Arc<GrantSet>) -> StoreHandle {
        StoreHandle {
            store: Arc::clone(self),
            principal,
            grants,
        }
    }

    fn key_of(&self, item: &Item) -> Result<String> {
        let name = &self.key_schema.partition_key;
        let key = match (item.get(name), self.key_schema.key_type) {
            (Some(AttributeValue::S(key)), AttributeType::String) => key,
            (Some(AttributeValue::N(key)), AttributeType::Number) => key,
            (Some(_), _) => {
                return Err(Error::InvalidItem {
                    reason: format!("key attribute `{name}` has the wrong type"),
                });
            }
            (None, _) => {
                return Err(Error::InvalidItem {
                    reason: format!("missing key attribute `{name}`"),
                });
            }
        };
        if key.is_empty() {
            return Err(Error::InvalidItem {
                reason: format!("key attribute `{name}` is empty"),
            });
        }
        Ok(key.clone())
    }

    fn change(&self, name: EventName, keys: Item, new: Option<Item>, old: Option<Item>) -> ChangeRecord {
        ChangeRecord {
            event_id: self.next_event.fetch_add(1, Ordering::Relaxed).to_string(),
            event_name: name,
            table_name: self.id.to_string(),
            dynamodb: StreamImage {
                keys,
                new_image: new,
                old_image: old,
                approximate_creation: SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map_or(0, |d| d.as_secs()),
            },
        }
    }

    fn put(&self, item: Item) -> Result<Option<Item>> {
        let key = self.key_of(&item)?;
        let mut inner = self.inner.write();
        let old = inner.items.insert(key.clone(), item.clone());

        if let Some(stream) = inner.capture.clone() {
            let name = if old.is_some() {
                EventName::Modify
            } else {
                EventName::Insert
            };
            let keys = item.project(&self.key_schema.partition_key);
            let change = self.change(name, keys, Some(item), old.clone());
            if let Err(e) = stream.capture(&change, &key) {
                match &old {
                    Some(previous) => inner.items.insert(key, previous.clone()),
                    None => inner.items.remove(&key),
                };
                return Err(e);
            }
        }
        Ok(old)
    }

    fn delete(&self, key: &str) -> Result<Item> {
        let mut inner = self.inner.write();
        let old = inner.items.remove(key).ok_or_else(|| Error::ItemNotFound {
            key: key.to_string(),
        })?;

        if let Some(stream) = inner.capture.clone() {
            let keys = old.project(&self.key_schema.partition_key);
            let change = self.change(EventName::Remove, keys, None, Some(old.clone()));
            if let Err(e) = stream.capture(&change, key) {
                inner.items.insert(key.to_string(), old);
                return Err(e);
            }
        }
        Ok(old)
    }

    fn get(&self, key: &str) -> Option<Item> {
        self.inner.read().items.get(key).cloned()
    }
}

/// Grant-checked access to a [`RecordStore`] on behalf of one principal.
#[derive(Clone)]
pub struct StoreHandle {
    store: Arc<RecordStore>,
    principal: Principal,
    grants: Arc<GrantSet>,
}

impl StoreHandle {
    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn store_id(&self) -> &ResourceId {
        &self.store.id
    }

    /// Schema as declared in the topology. Reading it needs no grant.
    pub fn key_schema(&self) -> &KeySchema {
        &self.store.key_schema
    }

    fn authorize(&self, action: Action) -> Result<()> {
        self.grants.check(&self.principal, &self.store.id, action)
    }

    /// Writes `item`, replacing any item under the same key. Returns the
    /// replaced item.
    pub fn put_item(&self, item: Item) -> Result<Option<Item>> {
        self.authorize(Action::StorePutItem)?;
        self.store.put(item)
    }

    pub fn delete_item(&self, key: &str) -> Result<Item> {
        self.authorize(Action::StoreDeleteItem)?;
        self.store.delete(key)
    }

    pub fn get_item(&self, key: &str) -> Result<Item> {
        self.authorize(Action::StoreGetItem)?;
        self.store.get(key).ok_or_else(|| Error::ItemNotFound {
            key: key.to_string(),
        })
    }

    /// Items whose partition key equals `key`.
    pub fn query(&self, key: &str) -> Result<Vec<Item>> {
        self.authorize(Action::StoreQuery)?;
        Ok(self.store.get(key).into_iter().collect())
    }

    pub fn describe(&self) -> Result<StoreDescription> {
        self.authorize(Action::StoreDescribe)?;
        let inner = self.store.inner.read();
        Ok(StoreDescription {
            id: self.store.id.clone(),
            key_schema: self.store.key_schema.clone(),
            item_count: inner.items.len(),
            change_stream: inner.capture.as_ref().map(|s| s.id().clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        grants::{STORE_READ, STORE_WRITE, STREAM_READ},
        stream::{IteratorPosition, StreamConsumer},
        topology::ChangeStreamSpec,
    };

    struct Fixture {
        store: Arc<RecordStore>,
        stream: Arc<ChangeStream>,
        writer: StoreHandle,
        reader: StoreHandle,
        consumer: StreamConsumer,
    }

    fn fixture() -> Fixture {
        let stream = Arc::new(ChangeStream::new(&ChangeStreamSpec::new("Stream")));
        let store = Arc::new(RecordStore::new(&RecordStoreSpec {
            id: ResourceId::new("Table"),
            key_schema: KeySchema::default(),
            change_stream: Some(stream.id().clone()),
        }));
        store.attach(Arc::clone(&stream)).unwrap();

        let ingest = Principal::new("PutItem/ServiceRole");
        let worker = Principal::new("Worker/TaskRole");
        let mut grants = GrantSet::default();
        grants.insert(&ingest, store.id(), STORE_WRITE);
        grants.insert(&worker, store.id(), STORE_READ);
        grants.insert(&worker, stream.id(), STREAM_READ);
        let grants = Arc::new(grants);

        let consumer = StreamConsumer::new(
            stream.reader(worker.clone(), Arc::clone(&grants)),
            IteratorPosition::TrimHorizon,
        )
        .unwrap();

        Fixture {
            writer: store.handle(ingest, Arc::clone(&grants)),
            reader: store.handle(worker, grants),
            store,
            stream,
            consumer,
        }
    }

    fn item(id: &str, payload: &str) -> Item {
        Item::new()
            .with("id", AttributeValue::string(id))
            .with("payload", AttributeValue::string(payload))
    }

    #[test]
    fn every_mutation_is_captured_once() {
        let mut f = fixture();
        f.writer.put_item(item("k", "1")).unwrap();
        f.writer.put_item(item("k", "2")).unwrap();
        f.writer.delete_item("k").unwrap();

        let changes: Vec<_> = f
            .consumer
            .poll()
            .unwrap()
            .iter()
            .map(|r| r.change().unwrap())
            .collect();
        let names: Vec<_> = changes.iter().map(|c| c.event_name).collect();
        assert_eq!(
            names,
            vec![EventName::Insert, EventName::Modify, EventName::Remove]
        );
        assert_eq!(changes[1].dynamodb.old_image, Some(item("k", "1")));
        assert_eq!(changes[1].dynamodb.new_image, Some(item("k", "2")));
        assert_eq!(changes[2].dynamodb.new_image, None);
        assert!(changes.iter().all(|c| c.key("id") == Some("k")));
        assert!(changes.iter().all(|c| c.table_name == "Table"));
    }

    #[test]
    fn detached_store_stops_capturing() {
        let mut f = fixture();
        assert_eq!(f.store.detach().map(|s| s.id().clone()), Some(f.stream.id().clone()));
        f.writer.put_item(item("k", "1")).unwrap();
        assert!(f.consumer.poll().unwrap().is_empty());
        assert_eq!(f.reader.get_item("k").unwrap(), item("k", "1"));
    }

    #[test]
    fn at_most_one_stream() {
        let f = fixture();
        let other = Arc::new(ChangeStream::new(&ChangeStreamSpec::new("Other")));
        assert!(matches!(
            f.store.attach(other),
            Err(Error::StreamAlreadyAttached { .. })
        ));
        assert_eq!(f.store.captures_into(), Some(ResourceId::new("Stream")));
    }

    #[test]
    fn writer_cannot_read_and_reader_cannot_write() {
        let f = fixture();
        f.writer.put_item(item("k", "1")).unwrap();
        assert!(matches!(f.writer.get_item("k"), Err(Error::AccessDenied { .. })));
        assert!(matches!(f.writer.query("k"), Err(Error::AccessDenied { .. })));
        assert!(matches!(
            f.reader.put_item(item("j", "1")),
            Err(Error::AccessDenied { .. })
        ));
        assert!(matches!(f.reader.delete_item("k"), Err(Error::AccessDenied { .. })));
        assert_eq!(f.reader.query("k").unwrap().len(), 1);
        assert!(f.reader.query("missing").unwrap().is_empty());
    }

    #[test]
    fn rejected_items_leave_no_trace() {
        let mut f = fixture();
        let no_key = Item::new().with("payload", AttributeValue::string("x"));
        let numeric_key = Item::new().with("id", AttributeValue::number(1.0));
        let empty_key = Item::new().with("id", AttributeValue::string(""));
        for bad in [no_key, numeric_key, empty_key] {
            assert!(matches!(f.writer.put_item(bad), Err(Error::InvalidItem { .. })));
        }
        assert!(matches!(f.writer.delete_item("nope"), Err(Error::ItemNotFound { .. })));
        assert!(f.consumer.poll().unwrap().is_empty());
        assert_eq!(f.reader.describe().unwrap().item_count, 0);
    }
}
