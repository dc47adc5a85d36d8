use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use dynent_types::PrimaryKey;

use crate::document::DocValue;
use crate::error::BoxError;
use crate::schema::DocPath;
use crate::traits::StoreDriver;

/// Error returned by [`InMemoryStoreDriver`] while switched offline.
#[derive(Debug, thiserror::Error)]
#[error("in-memory store is offline")]
pub struct StoreOffline;

type Record = BTreeMap<DocPath, DocValue>;

/// In-memory, HashMap-based store driver.
///
/// Intended for tests and embedding. Records are keyed by document schema
/// name and primary key. Every `read` is counted, so callers can assert how
/// often the backing store was hit.
pub struct InMemoryStoreDriver {
    records: RwLock<HashMap<(String, PrimaryKey), Record>>,
    reads: AtomicUsize,
    offline: AtomicBool,
}

impl InMemoryStoreDriver {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            reads: AtomicUsize::new(0),
            offline: AtomicBool::new(false),
        }
    }

    /// Store one field of a record, creating the record if needed.
    pub fn insert(&self, schema: &str, key: PrimaryKey, path: DocPath, value: DocValue) {
        self.records
            .write()
            .expect("lock poisoned")
            .entry((schema.to_string(), key))
            .or_default()
            .insert(path, value);
    }

    /// Replace a whole record.
    pub fn insert_record(&self, schema: &str, key: PrimaryKey, fields: impl IntoIterator<Item = (DocPath, DocValue)>) {
        self.records
            .write()
            .expect("lock poisoned")
            .insert((schema.to_string(), key), fields.into_iter().collect());
    }

    /// Remove a record. Returns `true` if it existed.
    pub fn delete(&self, schema: &str, key: &PrimaryKey) -> bool {
        self.records
            .write()
            .expect("lock poisoned")
            .remove(&(schema.to_string(), key.clone()))
            .is_some()
    }

    /// Number of `read` calls served so far, including failed ones.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn reset_reads(&self) {
        self.reads.store(0, Ordering::SeqCst);
    }

    /// While offline, every `read` fails with [`StoreOffline`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.records.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().expect("lock poisoned").is_empty()
    }

    pub fn clear(&self) {
        self.records.write().expect("lock poisoned").clear();
    }
}

impl Default for InMemoryStoreDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreDriver for InMemoryStoreDriver {
    fn read(&self, schema: &str, key: &PrimaryKey, path: &DocPath) -> Result<Option<DocValue>, BoxError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(Box::new(StoreOffline));
        }
        let records = self.records.read().expect("lock poisoned");
        Ok(records
            .get(&(schema.to_string(), key.clone()))
            .and_then(|record| record.get(path))
            .cloned())
    }
}

impl std::fmt::Debug for InMemoryStoreDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStoreDriver")
            .field("record_count", &self.len())
            .field("reads", &self.reads())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dynent_types::Scalar;

    fn name() -> DocPath {
        DocPath::parse("profile/name")
    }

    #[test]
    fn read_counts_every_call() {
        let driver = InMemoryStoreDriver::new();
        driver.insert("p", PrimaryKey::from(1), name(), DocValue::Scalar(Scalar::from("A")));
        assert_eq!(driver.len(), 1);

        let hit = driver.read("p", &PrimaryKey::from(1), &name()).unwrap();
        assert_eq!(hit, Some(DocValue::Scalar(Scalar::from("A"))));
        let miss = driver.read("p", &PrimaryKey::from(2), &name()).unwrap();
        assert_eq!(miss, None);
        assert_eq!(driver.reads(), 2);

        driver.reset_reads();
        assert_eq!(driver.reads(), 0);
    }

    #[test]
    fn records_replace_and_delete() {
        let driver = InMemoryStoreDriver::new();
        let key = PrimaryKey::from("eu");
        driver.insert_record("d", key.clone(), [(name(), DocValue::Scalar(Scalar::Int(1)))]);
        driver.insert_record("d", key.clone(), []);
        assert_eq!(driver.read("d", &key, &name()).unwrap(), None);
        assert!(driver.delete("d", &key));
        assert!(!driver.delete("d", &key));
        assert!(driver.is_empty());
    }

    #[test]
    fn offline_reads_fail() {
        let driver = InMemoryStoreDriver::new();
        driver.set_offline(true);
        let err = driver.read("p", &PrimaryKey::from(1), &name()).unwrap_err();
        assert!(err.downcast_ref::<StoreOffline>().is_some());
        assert_eq!(driver.reads(), 1);
    }
}
