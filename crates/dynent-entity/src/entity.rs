//! The attribute store: per-instance storage keyed by slot index.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, RwLock};

use dynent_schema::{AttributeDescriptor, EntityType};
use dynent_types::{PrimaryKey, Scalar};
use tracing::debug;

use crate::collection::{Collection, ElementSpec};
use crate::error::{EntityError, EntityResult};
use crate::lazy::Slot;
use crate::listener::{ChangeEvent, ChangeListener, ChangeOrigin, ListenerId};
use crate::traits::{AttributeKey, ChangeTracking, EntityBacking, FetchGroupTracking, LazyLoading};
use crate::value::{check_element, Value};

/// Shared handle to an entity. Identity is pointer identity.
pub type EntityRef = Arc<DynamicEntity>;

/// Identity of an entity handle, usable as a map key.
///
/// Only meaningful while the entity is alive; maps keyed by identity keep the
/// `EntityRef` alongside.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EntityIdentity(usize);

/// Generic, schema-driven storage for one entity instance.
///
/// Not designed for concurrent mutation: one graph of entities belongs to one
/// unit of work at a time. Interior locks only keep individual operations
/// memory-safe when handles are shared.
pub struct DynamicEntity {
    entity_type: Arc<EntityType>,
    slots: RwLock<Vec<Slot>>,
    listeners: RwLock<Vec<(ListenerId, Arc<dyn ChangeListener>)>>,
    next_listener: AtomicU64,
    backing: OnceLock<Arc<dyn EntityBacking>>,
    /// Slots carried by a partial instance; `None` for complete instances.
    fetch_group: RwLock<Option<BTreeSet<usize>>>,
}

impl DynamicEntity {
    /// Create a new instance of `entity_type`.
    ///
    /// Scalars and references start unset; collections start as empty
    /// collections of their declared container kind.
    pub fn new(entity_type: &Arc<EntityType>) -> EntityRef {
        let slots = entity_type.attributes().map(|a| initial_slot(entity_type, a)).collect();
        Arc::new(Self::build(entity_type, slots))
    }

    /// Create an instance that writes through to `backing`, starting from `slots`.
    ///
    /// # Panics
    ///
    /// `slots` must hold exactly one slot per attribute.
    pub fn with_backing(
        entity_type: &Arc<EntityType>,
        backing: Arc<dyn EntityBacking>,
        slots: Vec<Slot>,
    ) -> EntityRef {
        assert_eq!(
            slots.len(),
            entity_type.len(),
            "slot count mismatch for {}",
            entity_type.name()
        );
        let entity = Self::build(entity_type, slots);
        // Freshly built, so the cell is empty.
        let _ = entity.backing.set(backing);
        Arc::new(entity)
    }

    fn build(entity_type: &Arc<EntityType>, slots: Vec<Slot>) -> Self {
        Self {
            entity_type: Arc::clone(entity_type),
            slots: RwLock::new(slots),
            listeners: RwLock::new(Vec::new()),
            next_listener: AtomicU64::new(0),
            backing: OnceLock::new(),
            fetch_group: RwLock::new(None),
        }
    }

    pub fn entity_type(&self) -> &Arc<EntityType> {
        &self.entity_type
    }

    pub fn type_name(&self) -> &str {
        self.entity_type.name()
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.entity_type.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entity_type.is_empty()
    }

    pub fn backing(&self) -> Option<&Arc<dyn EntityBacking>> {
        self.backing.get()
    }

    pub fn is_backed(&self) -> bool {
        self.backing.get().is_some()
    }

    pub fn identity(entity: &EntityRef) -> EntityIdentity {
        EntityIdentity(Arc::as_ptr(entity) as *const () as usize)
    }

    fn descriptor(&self, slot: usize) -> &AttributeDescriptor {
        self.entity_type
            .attribute(slot)
            .expect("resolved slot has a descriptor")
    }

    // -----------------------------------------------------------------------
    // Generic access
    // -----------------------------------------------------------------------

    /// Current content of an attribute, materializing a lazy slot first.
    pub fn get(&self, attribute: impl AttributeKey) -> EntityResult<Option<Value>> {
        let slot = attribute.resolve(&self.entity_type)?;
        self.load_slot(slot)
    }

    fn load_slot(&self, slot: usize) -> EntityResult<Option<Value>> {
        let lazy = {
            let slots = self.slots.read().expect("lock poisoned");
            match &slots[slot] {
                Slot::Unset => return Ok(None),
                Slot::Value(v) => return Ok(Some(v.clone())),
                Slot::Lazy(lazy) => lazy.clone(),
            }
        };

        // Materialize outside the lock: loaders may call back into the backing.
        let loaded = lazy.load()?;
        debug!(
            entity_type = self.type_name(),
            attribute = %self.descriptor(slot).name,
            present = loaded.is_some(),
            "materialized lazy attribute"
        );

        let mut slots = self.slots.write().expect("lock poisoned");
        if let Slot::Lazy(current) = &slots[slot] {
            if current.same(&lazy) {
                slots[slot] = Slot::from(loaded.clone());
            }
        }
        Ok(loaded)
    }

    /// Content of a slot without materializing it.
    pub fn peek(&self, attribute: impl AttributeKey) -> EntityResult<Slot> {
        let slot = attribute.resolve(&self.entity_type)?;
        Ok(self.slots.read().expect("lock poisoned")[slot].clone())
    }

    /// Assign an attribute.
    ///
    /// Fails with [`EntityError::TypeMismatch`] when the value's kind differs
    /// from the declared kind, and with [`EntityError::InvalidReferenceType`]
    /// when a referenced entity's type is not exactly the declared type.
    pub fn set(&self, attribute: impl AttributeKey, value: impl Into<Value>) -> EntityResult<()> {
        let slot = attribute.resolve(&self.entity_type)?;
        let value = value.into();
        let descriptor = self.descriptor(slot);
        self.check_value(descriptor, &value)?;

        let stored = match self.backing.get() {
            Some(backing) => backing
                .write_through(descriptor, Some(&value))?
                .unwrap_or(value),
            None => value,
        };

        let old = self.replace_slot(slot, Slot::Value(stored.clone()));
        self.notify(slot, old, Some(stored), ChangeOrigin::Local);
        Ok(())
    }

    /// Clear an attribute.
    ///
    /// Scalars and references become absent; collections become a fresh empty
    /// collection of the declared container kind.
    pub fn unset(&self, attribute: impl AttributeKey) -> EntityResult<()> {
        let slot = attribute.resolve(&self.entity_type)?;
        let descriptor = self.descriptor(slot);

        let replacement = match self.backing.get() {
            Some(backing) => backing.write_through(descriptor, None)?,
            None => None,
        };
        let fresh = match replacement {
            Some(value) => Slot::Value(value),
            None => initial_slot(&self.entity_type, descriptor),
        };

        let new = fresh.value().cloned();
        let old = self.replace_slot(slot, fresh);
        self.notify(slot, old, new, ChangeOrigin::Local);
        Ok(())
    }

    /// Whether an attribute holds a value.
    ///
    /// Collections count as set only when non-empty. Lazy slots are
    /// materialized to answer.
    pub fn is_set(&self, attribute: impl AttributeKey) -> EntityResult<bool> {
        let slot = attribute.resolve(&self.entity_type)?;
        match self.load_slot(slot)? {
            None => Ok(false),
            Some(Value::Collection(c)) => Ok(!c.is_empty()?),
            Some(_) => Ok(true),
        }
    }

    fn check_value(&self, descriptor: &AttributeDescriptor, value: &Value) -> EntityResult<()> {
        let type_name = self.type_name();
        match (descriptor.collection, value) {
            (None, _) => check_element(
                type_name,
                &descriptor.name,
                descriptor.kind,
                descriptor.referenced_type.as_deref(),
                value,
            ),
            (Some(container), Value::Collection(c)) if c.container() == container => {
                for element in c.to_vec()? {
                    check_element(
                        type_name,
                        &descriptor.name,
                        descriptor.kind,
                        descriptor.referenced_type.as_deref(),
                        &element,
                    )?;
                }
                Ok(())
            }
            (Some(container), _) => Err(EntityError::TypeMismatch {
                type_name: type_name.to_string(),
                attribute: descriptor.name.clone(),
                expected: format!("{container} of {}", descriptor.kind),
                found: value.describe(),
            }),
        }
    }

    fn replace_slot(&self, slot: usize, content: Slot) -> Option<Value> {
        let mut slots = self.slots.write().expect("lock poisoned");
        std::mem::replace(&mut slots[slot], content).into_value()
    }

    fn notify(&self, slot: usize, old: Option<Value>, new: Option<Value>, origin: ChangeOrigin) {
        let listeners: Vec<Arc<dyn ChangeListener>> = self
            .listeners
            .read()
            .expect("lock poisoned")
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        if listeners.is_empty() {
            return;
        }

        let event = ChangeEvent {
            attribute: self.descriptor(slot).name.clone(),
            slot,
            old,
            new,
            origin,
        };
        for listener in listeners {
            listener.attribute_changed(self, &event);
        }
    }

    // -----------------------------------------------------------------------
    // Hooks for backings
    // -----------------------------------------------------------------------

    /// Install content observed on the backing representation and notify
    /// listeners, without writing back.
    pub fn sync_slot(&self, slot: usize, content: Slot) {
        let new = content.value().cloned();
        let old = self.replace_slot(slot, content);
        self.notify(slot, old, new, ChangeOrigin::Backing);
    }

    /// Replace a slot silently, e.g. when a reload resets it to a lazy holder.
    pub fn install_slot(&self, slot: usize, content: Slot) {
        self.replace_slot(slot, content);
    }

    // -----------------------------------------------------------------------
    // Keys and completeness
    // -----------------------------------------------------------------------

    /// Values of the key attributes, or `None` if any is unset or the type
    /// declares no key.
    pub fn primary_key(&self) -> EntityResult<Option<PrimaryKey>> {
        let mut values: Vec<Scalar> = Vec::with_capacity(self.entity_type.key_slots().len());
        for &slot in self.entity_type.key_slots() {
            match self.load_slot(slot)? {
                Some(Value::Scalar(s)) => values.push(s),
                _ => return Ok(None),
            }
        }
        Ok(PrimaryKey::new(values).ok())
    }

    /// Fails with [`EntityError::MissingRequired`] naming every unset required attribute.
    pub fn check_required(&self) -> EntityResult<()> {
        let mut missing = Vec::new();
        for attr in self.entity_type.attributes().filter(|a| a.required) {
            if !self.is_set(attr.slot)? {
                missing.push(attr.name.clone());
            }
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(EntityError::MissingRequired {
                type_name: self.type_name().to_string(),
                attributes: missing,
            })
        }
    }

    // -----------------------------------------------------------------------
    // Capabilities
    // -----------------------------------------------------------------------

    /// Mark this instance as partial, carrying only `slots`.
    pub fn track_fetch_group(&self, slots: impl IntoIterator<Item = usize>) {
        *self.fetch_group.write().expect("lock poisoned") = Some(slots.into_iter().collect());
    }

    /// Lazy-loading capability; available on backed entities.
    pub fn as_lazy_loading(&self) -> Option<&dyn LazyLoading> {
        if self.is_backed() {
            Some(self)
        } else {
            None
        }
    }

    /// Fetch-group capability; available on partial instances.
    pub fn as_fetch_group_tracking(&self) -> Option<&dyn FetchGroupTracking> {
        if self.fetch_group.read().expect("lock poisoned").is_some() {
            Some(self)
        } else {
            None
        }
    }
}

fn initial_slot(entity_type: &EntityType, attribute: &AttributeDescriptor) -> Slot {
    match attribute.collection {
        Some(container) => Slot::Value(Value::Collection(Collection::new(
            container,
            ElementSpec::of(entity_type, attribute),
        ))),
        None => Slot::Unset,
    }
}

impl ChangeTracking for DynamicEntity {
    fn add_listener(&self, listener: Arc<dyn ChangeListener>) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .expect("lock poisoned")
            .push((id, listener));
        id
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().expect("lock poisoned");
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    fn has_listeners(&self) -> bool {
        !self.listeners.read().expect("lock poisoned").is_empty()
    }
}

impl LazyLoading for DynamicEntity {
    fn is_loaded(&self, attribute: &str) -> EntityResult<bool> {
        Ok(!self.peek(attribute)?.is_lazy())
    }

    fn pending_attributes(&self) -> Vec<String> {
        let slots = self.slots.read().expect("lock poisoned");
        slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_lazy())
            .map(|(slot, _)| self.descriptor(slot).name.clone())
            .collect()
    }
}

impl FetchGroupTracking for DynamicEntity {
    fn is_attribute_fetched(&self, attribute: &str) -> bool {
        let Some(slot) = self.entity_type.slot_of(attribute) else {
            return false;
        };
        match &*self.fetch_group.read().expect("lock poisoned") {
            Some(group) => group.contains(&slot),
            None => true,
        }
    }

    fn fetched_attributes(&self) -> Vec<String> {
        match &*self.fetch_group.read().expect("lock poisoned") {
            Some(group) => group
                .iter()
                .map(|&slot| self.descriptor(slot).name.clone())
                .collect(),
            None => self.entity_type.attributes().map(|a| a.name.clone()).collect(),
        }
    }
}

impl fmt::Debug for DynamicEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never recurse into referenced entities: graphs may be cyclic.
        f.debug_struct("DynamicEntity")
            .field("type", &self.type_name())
            .field("at", &(self as *const Self))
            .field("backed", &self.is_backed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lazy::LazyValue;
    use dynent_schema::{SchemaDescriptor, TypeRegistry};
    use dynent_types::{ContainerKind, ValueKind};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    fn registry() -> TypeRegistry {
        let registry = TypeRegistry::new();
        registry
            .get_or_create_type(
                SchemaDescriptor::builder("Person")
                    .key("id", ValueKind::Int)
                    .attribute("name", ValueKind::Text)
                    .reference("manager", "Person")
                    .collection("nicknames", ValueKind::Text, ContainerKind::Set)
                    .references("reports", "Person", ContainerKind::List)
                    .build(),
            )
            .unwrap();
        registry
            .get_or_create_type(
                SchemaDescriptor::builder("Dept")
                    .key("code", ValueKind::Text)
                    .required("title", ValueKind::Text)
                    .build(),
            )
            .unwrap();
        registry
    }

    fn person(registry: &TypeRegistry, id: i64) -> EntityRef {
        let p = DynamicEntity::new(&registry.get_type("Person").unwrap());
        p.set("id", id).unwrap();
        p
    }

    // -----------------------------------------------------------------------
    // get / set / is_set / unset
    // -----------------------------------------------------------------------

    #[test]
    fn person_manager_scenario() {
        let registry = registry();
        let p1 = person(&registry, 1);
        p1.set("name", "A").unwrap();
        let p2 = person(&registry, 2);

        p1.set("manager", &p2).unwrap();
        assert_eq!(p1.get("manager").unwrap(), Some(Value::Entity(Arc::clone(&p2))));
        assert!(p1.is_set("manager").unwrap());

        p1.unset("manager").unwrap();
        assert!(!p1.is_set("manager").unwrap());
        assert_eq!(p1.get("manager").unwrap(), None);
    }

    #[test]
    fn access_by_slot_index() {
        let registry = registry();
        let p = person(&registry, 7);
        p.set(1usize, "Ada").unwrap();
        assert_eq!(p.get("name").unwrap().unwrap().as_text(), Some("Ada"));
        assert_eq!(p.get(0usize).unwrap().unwrap().as_int(), Some(7));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn out_of_range_slot_panics() {
        let registry = registry();
        let p = person(&registry, 1);
        let _ = p.get(99usize);
    }

    #[test]
    fn unknown_name_is_an_error() {
        let registry = registry();
        let p = person(&registry, 1);
        let err = p.get("salary").unwrap_err();
        assert!(matches!(err, EntityError::UnknownAttribute { .. }));
    }

    #[test]
    fn scalar_kind_mismatch() {
        let registry = registry();
        let p = person(&registry, 1);
        let err = p.set("name", 42i64).unwrap_err();
        assert!(matches!(err, EntityError::TypeMismatch { .. }));
        let err = p.set("manager", "boss").unwrap_err();
        assert!(matches!(err, EntityError::TypeMismatch { .. }));
    }

    #[test]
    fn reference_type_must_match_exactly() {
        let registry = registry();
        let p = person(&registry, 1);
        let dept = DynamicEntity::new(&registry.get_type("Dept").unwrap());
        let err = p.set("manager", &dept).unwrap_err();
        match err {
            EntityError::InvalidReferenceType { expected, found, .. } => {
                assert_eq!(expected, "Person");
                assert_eq!(found, "Dept");
            }
            other => panic!("expected InvalidReferenceType, got {other}"),
        }
    }

    // -----------------------------------------------------------------------
    // Collections
    // -----------------------------------------------------------------------

    #[test]
    fn collections_start_empty_not_unset() {
        let registry = registry();
        let p = person(&registry, 1);
        let nicknames = p.get("nicknames").unwrap().expect("collection exists");
        assert!(nicknames.as_collection().unwrap().is_empty().unwrap());
        assert!(!p.is_set("nicknames").unwrap());

        nicknames.as_collection().unwrap().push("Al").unwrap();
        assert!(p.is_set("nicknames").unwrap());
    }

    #[test]
    fn unset_collection_gives_fresh_empty_one() {
        let registry = registry();
        let p = person(&registry, 1);
        let before = p.get("reports").unwrap().unwrap();
        before.as_collection().unwrap().push(person(&registry, 2)).unwrap();

        p.unset("reports").unwrap();
        let after = p.get("reports").unwrap().unwrap();
        let after = after.as_collection().unwrap();
        assert!(after.is_empty().unwrap());
        assert_eq!(after.container(), ContainerKind::List);
        assert!(!after.same_storage(before.as_collection().unwrap()));
    }

    #[test]
    fn setting_collection_checks_container_and_elements() {
        let registry = registry();
        let ty = registry.get_type("Person").unwrap();
        let p = person(&registry, 1);
        let spec = ElementSpec::of(&ty, ty.attribute_named("nicknames").unwrap());

        let list = Collection::new(ContainerKind::List, spec.clone());
        assert!(matches!(
            p.set("nicknames", list),
            Err(EntityError::TypeMismatch { .. })
        ));

        let set = Collection::from_values(ContainerKind::Set, spec, vec![Value::from("x")]).unwrap();
        p.set("nicknames", set).unwrap();
        assert!(p.is_set("nicknames").unwrap());

        assert!(matches!(
            p.set("nicknames", "x"),
            Err(EntityError::TypeMismatch { .. })
        ));
    }

    // -----------------------------------------------------------------------
    // Lazy slots
    // -----------------------------------------------------------------------

    #[test]
    fn lazy_slot_materializes_once() {
        let registry = registry();
        let ty = registry.get_type("Person").unwrap();
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        let lazy = LazyValue::new(move || -> EntityResult<Option<Value>> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Some(Value::from("Grace")))
        });

        let p = DynamicEntity::new(&ty);
        p.install_slot(1, Slot::Lazy(lazy));
        assert!(p.peek("name").unwrap().is_lazy());

        let first = p.get("name").unwrap();
        let second = p.get("name").unwrap();
        assert_eq!(first, second);
        assert_eq!(first.unwrap().as_text(), Some("Grace"));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(!p.peek("name").unwrap().is_lazy());
    }

    #[test]
    fn lazy_failure_leaves_slot_lazy() {
        let registry = registry();
        let ty = registry.get_type("Person").unwrap();
        let p = DynamicEntity::new(&ty);
        p.install_slot(
            1,
            Slot::Lazy(LazyValue::new(|| -> EntityResult<Option<Value>> {
                Err(EntityError::backing("store offline"))
            })),
        );
        assert!(matches!(p.get("name"), Err(EntityError::BackingStore(_))));
        assert!(p.peek("name").unwrap().is_lazy());
    }

    // -----------------------------------------------------------------------
    // Change tracking
    // -----------------------------------------------------------------------

    #[test]
    fn listeners_see_old_and_new_values() {
        let registry = registry();
        let p = person(&registry, 1);
        let seen: Arc<Mutex<Vec<ChangeEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = p.add_listener(Arc::new(move |_: &DynamicEntity, e: &ChangeEvent| {
            sink.lock().unwrap().push(e.clone());
        }));
        assert!(p.has_listeners());

        p.set("name", "A").unwrap();
        p.set("name", "B").unwrap();
        p.unset("name").unwrap();

        let events = seen.lock().unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].old, None);
        assert_eq!(events[0].new, Some(Value::from("A")));
        assert_eq!(events[1].old, Some(Value::from("A")));
        assert_eq!(events[2].new, None);
        assert!(events.iter().all(|e| e.attribute == "name" && e.origin == ChangeOrigin::Local));
        drop(events);

        assert!(p.remove_listener(id));
        assert!(!p.remove_listener(id));
        p.set("name", "C").unwrap();
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[test]
    fn failed_set_emits_nothing() {
        let registry = registry();
        let p = person(&registry, 1);
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        p.add_listener(Arc::new(move |_: &DynamicEntity, _: &ChangeEvent| {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(p.set("name", 1i64).is_err());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    // -----------------------------------------------------------------------
    // Keys, required attributes, capabilities
    // -----------------------------------------------------------------------

    #[test]
    fn primary_key_requires_all_components() {
        let registry = registry();
        let p = DynamicEntity::new(&registry.get_type("Person").unwrap());
        assert_eq!(p.primary_key().unwrap(), None);
        p.set("id", 9i64).unwrap();
        assert_eq!(p.primary_key().unwrap(), Some(PrimaryKey::from(9)));
    }

    #[test]
    fn required_attributes_are_reported() {
        let registry = registry();
        let d = DynamicEntity::new(&registry.get_type("Dept").unwrap());
        match d.check_required().unwrap_err() {
            EntityError::MissingRequired { attributes, .. } => {
                assert_eq!(attributes, vec!["code".to_string(), "title".to_string()]);
            }
            other => panic!("unexpected {other}"),
        }
        d.set("code", "R&D").unwrap();
        d.set("title", "Research").unwrap();
        d.check_required().unwrap();
    }

    #[test]
    fn capabilities_are_probed_not_assumed() {
        let registry = registry();
        let p = person(&registry, 1);
        assert!(p.as_lazy_loading().is_none());
        assert!(p.as_fetch_group_tracking().is_none());

        p.track_fetch_group([0, 1]);
        let tracking = p.as_fetch_group_tracking().expect("partial instance");
        assert!(tracking.is_attribute_fetched("name"));
        assert!(!tracking.is_attribute_fetched("manager"));
        assert!(!tracking.is_attribute_fetched("bogus"));
        assert_eq!(tracking.fetched_attributes(), vec!["id", "name"]);
    }

    #[test]
    fn identity_is_per_handle() {
        let registry = registry();
        let a = person(&registry, 1);
        let b = person(&registry, 1);
        assert_eq!(DynamicEntity::identity(&a), DynamicEntity::identity(&Arc::clone(&a)));
        assert_ne!(DynamicEntity::identity(&a), DynamicEntity::identity(&b));
        assert_ne!(Value::from(&a), Value::from(&b));
    }

    #[test]
    fn debug_does_not_follow_cycles() {
        let registry = registry();
        let a = person(&registry, 1);
        a.set("manager", &a).unwrap();
        let debug = format!("{a:?}");
        assert!(debug.contains("Person"));
    }
}
