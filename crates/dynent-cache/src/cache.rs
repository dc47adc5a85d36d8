use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use dynent_entity::{DynamicEntity, EntityIdentity, EntityRef};
use dynent_types::PrimaryKey;
use tracing::debug;

use crate::error::{CacheError, CacheResult};

type CacheKey = (String, PrimaryKey);

/// Outcome of [`IdentityCache::lookup`].
#[derive(Clone, Debug)]
pub enum CacheLookup {
    /// A valid instance.
    Hit(EntityRef),
    /// The cached instance was invalidated and must be reloaded before use.
    Stale(EntityRef),
    Miss,
}

impl CacheLookup {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheLookup::Hit(_))
    }

    /// The cached instance, valid or not.
    pub fn instance(&self) -> Option<&EntityRef> {
        match self {
            CacheLookup::Hit(e) | CacheLookup::Stale(e) => Some(e),
            CacheLookup::Miss => None,
        }
    }
}

/// Lookup counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub stale_hits: u64,
    pub misses: u64,
    pub entries: usize,
}

struct Entry {
    instance: EntityRef,
    valid: bool,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<CacheKey, Entry>,
    by_identity: HashMap<EntityIdentity, CacheKey>,
    stats: CacheStats,
}

impl CacheInner {
    fn remove(&mut self, key: &CacheKey) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        self.by_identity.remove(&DynamicEntity::identity(&entry.instance));
        Some(entry)
    }
}

/// Shared map from `(type, key)` to the canonical instance of that key.
///
/// Every transition happens under one mutex. The cache never reads from a
/// backing store: callers materialize first and install afterwards.
#[derive(Default)]
pub struct IdentityCache {
    inner: Mutex<CacheInner>,
}

impl IdentityCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(type_name: &str, key: &PrimaryKey) -> CacheKey {
        (type_name.to_string(), key.clone())
    }

    pub fn lookup(&self, type_name: &str, key: &PrimaryKey) -> CacheLookup {
        let mut inner = self.inner.lock().expect("lock poisoned");
        let found = inner
            .entries
            .get(&Self::key(type_name, key))
            .map(|entry| (Arc::clone(&entry.instance), entry.valid));
        match found {
            Some((instance, true)) => {
                inner.stats.hits += 1;
                CacheLookup::Hit(instance)
            }
            Some((instance, false)) => {
                inner.stats.stale_hits += 1;
                CacheLookup::Stale(instance)
            }
            None => {
                inner.stats.misses += 1;
                CacheLookup::Miss
            }
        }
    }

    /// Install `instance` as the valid instance of `key`, replacing any
    /// previous instance.
    pub fn put(&self, type_name: &str, key: PrimaryKey, instance: EntityRef) {
        let cache_key = (type_name.to_string(), key);
        let mut inner = self.inner.lock().expect("lock poisoned");
        inner.remove(&cache_key);
        // The same instance may have been cached under another key.
        if let Some(previous) = inner.by_identity.get(&DynamicEntity::identity(&instance)).cloned() {
            inner.remove(&previous);
        }
        inner
            .by_identity
            .insert(DynamicEntity::identity(&instance), cache_key.clone());
        debug!(entity_type = type_name, key = %cache_key.1, "cached instance");
        inner.entries.insert(
            cache_key,
            Entry {
                instance,
                valid: true,
            },
        );
    }

    /// Install an instance under its own type and primary key.
    ///
    /// Reading the key may materialize lazy key attributes; that happens
    /// before the cache lock is taken.
    pub fn put_entity(&self, instance: &EntityRef) -> CacheResult<PrimaryKey> {
        let key = instance.primary_key()?.ok_or_else(|| CacheError::MissingKey {
            type_name: instance.type_name().to_string(),
        })?;
        self.put(instance.type_name(), key.clone(), Arc::clone(instance));
        Ok(key)
    }

    /// Mark an entry stale. Returns `true` if the key was cached.
    ///
    /// Entities referencing the stale instance are not touched.
    pub fn invalidate(&self, type_name: &str, key: &PrimaryKey) -> bool {
        let mut inner = self.inner.lock().expect("lock poisoned");
        match inner.entries.get_mut(&Self::key(type_name, key)) {
            Some(entry) => {
                entry.valid = false;
                debug!(entity_type = type_name, %key, "invalidated instance");
                true
            }
            None => false,
        }
    }

    /// Mark every entry of a type stale. Returns the number of entries marked.
    pub fn invalidate_type(&self, type_name: &str) -> usize {
        let mut inner = self.inner.lock().expect("lock poisoned");
        let mut marked = 0;
        for ((entry_type, _), entry) in inner.entries.iter_mut() {
            if entry_type == type_name {
                entry.valid = false;
                marked += 1;
            }
        }
        marked
    }

    pub fn invalidate_all(&self) -> usize {
        let mut inner = self.inner.lock().expect("lock poisoned");
        for entry in inner.entries.values_mut() {
            entry.valid = false;
        }
        inner.entries.len()
    }

    /// Whether `instance` is the valid cached instance of its key.
    ///
    /// Untracked instances are never valid.
    pub fn is_valid(&self, instance: &EntityRef) -> bool {
        let inner = self.inner.lock().expect("lock poisoned");
        inner
            .by_identity
            .get(&DynamicEntity::identity(instance))
            .and_then(|key| inner.entries.get(key))
            .is_some_and(|entry| entry.valid && Arc::ptr_eq(&entry.instance, instance))
    }

    /// Whether `instance` is cached under its key but marked stale.
    pub fn is_stale(&self, instance: &EntityRef) -> bool {
        let inner = self.inner.lock().expect("lock poisoned");
        inner
            .by_identity
            .get(&DynamicEntity::identity(instance))
            .and_then(|key| inner.entries.get(key))
            .is_some_and(|entry| !entry.valid && Arc::ptr_eq(&entry.instance, instance))
    }

    /// Mark a tracked instance valid again after it was reloaded.
    /// Returns `false` for untracked instances.
    pub fn revalidate(&self, instance: &EntityRef) -> bool {
        let mut inner = self.inner.lock().expect("lock poisoned");
        let Some(key) = inner.by_identity.get(&DynamicEntity::identity(instance)).cloned() else {
            return false;
        };
        match inner.entries.get_mut(&key) {
            Some(entry) if Arc::ptr_eq(&entry.instance, instance) => {
                entry.valid = true;
                true
            }
            _ => false,
        }
    }

    /// Remove an entry, returning its instance.
    pub fn evict(&self, type_name: &str, key: &PrimaryKey) -> Option<EntityRef> {
        let mut inner = self.inner.lock().expect("lock poisoned");
        inner
            .remove(&Self::key(type_name, key))
            .map(|entry| entry.instance)
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("lock poisoned");
        inner.entries.clear();
        inner.by_identity.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("lock poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().expect("lock poisoned");
        CacheStats {
            entries: inner.entries.len(),
            ..inner.stats
        }
    }
}

impl std::fmt::Debug for IdentityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityCache")
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dynent_schema::{EntityType, SchemaDescriptor, TypeRegistry};
    use dynent_types::ValueKind;
    use proptest::prelude::*;

    fn person_type() -> Arc<EntityType> {
        let registry = TypeRegistry::new();
        registry
            .get_or_create_type(
                SchemaDescriptor::builder("Person")
                    .key("id", ValueKind::Int)
                    .reference("manager", "Person")
                    .build(),
            )
            .unwrap()
    }

    fn person(ty: &Arc<EntityType>, id: i64) -> EntityRef {
        let p = DynamicEntity::new(ty);
        p.set("id", id).unwrap();
        p
    }

    // -----------------------------------------------------------------------
    // Lookup / put
    // -----------------------------------------------------------------------

    #[test]
    fn miss_then_hit() {
        let ty = person_type();
        let cache = IdentityCache::new();
        assert!(matches!(cache.lookup("Person", &PrimaryKey::from(1)), CacheLookup::Miss));

        let p = person(&ty, 1);
        cache.put("Person", PrimaryKey::from(1), Arc::clone(&p));
        match cache.lookup("Person", &PrimaryKey::from(1)) {
            CacheLookup::Hit(found) => assert!(Arc::ptr_eq(&found, &p)),
            other => panic!("expected hit, got {other:?}"),
        }
        assert!(cache.is_valid(&p));
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                stale_hits: 0,
                misses: 1,
                entries: 1
            }
        );
    }

    #[test]
    fn put_replaces_previous_instance() {
        let ty = person_type();
        let cache = IdentityCache::new();
        let old = person(&ty, 1);
        let new = person(&ty, 1);
        cache.put("Person", PrimaryKey::from(1), Arc::clone(&old));
        cache.put("Person", PrimaryKey::from(1), Arc::clone(&new));
        assert!(!cache.is_valid(&old));
        assert!(cache.is_valid(&new));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn put_entity_derives_key() {
        let ty = person_type();
        let cache = IdentityCache::new();
        let p = person(&ty, 7);
        assert_eq!(cache.put_entity(&p).unwrap(), PrimaryKey::from(7));
        assert!(cache.lookup("Person", &PrimaryKey::from(7)).is_hit());

        let keyless = DynamicEntity::new(&ty);
        assert!(matches!(cache.put_entity(&keyless), Err(CacheError::MissingKey { .. })));
    }

    // -----------------------------------------------------------------------
    // Validity
    // -----------------------------------------------------------------------

    #[test]
    fn invalidation_does_not_cascade() {
        let ty = person_type();
        let cache = IdentityCache::new();
        let e = person(&ty, 1);
        let r = person(&ty, 2);
        e.set("manager", &r).unwrap();
        cache.put_entity(&e).unwrap();
        cache.put_entity(&r).unwrap();

        assert!(cache.invalidate("Person", &PrimaryKey::from(2)));
        assert!(cache.is_valid(&e));
        assert!(!cache.is_valid(&r));
        assert!(cache.is_stale(&r));
        assert!(!cache.is_stale(&e));
        match cache.lookup("Person", &PrimaryKey::from(2)) {
            CacheLookup::Stale(found) => assert!(Arc::ptr_eq(&found, &r)),
            other => panic!("expected stale, got {other:?}"),
        }

        assert!(cache.revalidate(&r));
        assert!(cache.is_valid(&r));
    }

    #[test]
    fn untracked_instances_are_not_valid() {
        let ty = person_type();
        let cache = IdentityCache::new();
        let p = person(&ty, 1);
        assert!(!cache.is_valid(&p));
        assert!(!cache.revalidate(&p));
        assert!(!cache.invalidate("Person", &PrimaryKey::from(1)));
    }

    #[test]
    fn bulk_invalidation_and_eviction() {
        let ty = person_type();
        let cache = IdentityCache::new();
        let a = person(&ty, 1);
        let b = person(&ty, 2);
        cache.put_entity(&a).unwrap();
        cache.put_entity(&b).unwrap();

        assert_eq!(cache.invalidate_type("Person"), 2);
        assert_eq!(cache.invalidate_type("Dept"), 0);
        assert!(!cache.is_valid(&a));
        cache.revalidate(&a);
        assert_eq!(cache.invalidate_all(), 2);

        let evicted = cache.evict("Person", &PrimaryKey::from(1)).unwrap();
        assert!(Arc::ptr_eq(&evicted, &a));
        assert!(!cache.revalidate(&a));
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }

    proptest! {
        #[test]
        fn one_instance_per_key(ids in proptest::collection::vec(0i64..8, 1..40)) {
            let ty = person_type();
            let cache = IdentityCache::new();
            let mut latest = HashMap::new();
            for id in &ids {
                let p = person(&ty, *id);
                cache.put_entity(&p).unwrap();
                latest.insert(*id, p);
            }
            prop_assert_eq!(cache.len(), latest.len());
            for (id, p) in &latest {
                prop_assert!(cache.is_valid(p));
                let found = cache.lookup("Person", &PrimaryKey::from(*id));
                prop_assert!(Arc::ptr_eq(found.instance().unwrap(), p));
            }
        }
    }
}
