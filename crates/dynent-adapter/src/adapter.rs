//! The value store adapter.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, OnceLock, RwLock, Weak};

use dynent_document::{
    DocPath, DocSchema, DocValue, Document, DocumentError, DocumentId, DocumentSource, StoreDriver,
};
use dynent_entity::{
    Collection, DynamicEntity, ElementSpec, EntityRef, EntityResult, LazyValue, Reload, Slot, Value,
};
use dynent_schema::{AttributeDescriptor, EntityType, TypeRegistry};
use dynent_types::PrimaryKey;
use tracing::{debug, warn};

use crate::backing::{BridgeObserver, DocumentBacking};
use crate::binding::TypeBinding;
use crate::error::{AdapterError, AdapterResult};
use crate::proxy::DocumentList;

/// Bridges dynamic entities to documents.
///
/// Created with [`ValueStoreAdapter::new`], which returns an `Arc`: entities
/// built by the adapter hold a weak handle back to it for lazy loading and
/// write propagation.
///
/// The instance cache only holds weak handles, but materialized references
/// between wrapped entities are strong. A wrapper that reaches itself through
/// its references (`p.manager = p`, or a longer cycle) stays alive, and stays
/// cached, until the cycle is broken by unsetting one of the references.
pub struct ValueStoreAdapter {
    this: Weak<ValueStoreAdapter>,
    registry: Arc<TypeRegistry>,
    schemas: RwLock<HashMap<String, Arc<DocSchema>>>,
    bindings: RwLock<HashMap<String, Arc<TypeBinding>>>,
    /// Document schema name to entity type name.
    schema_types: RwLock<HashMap<String, String>>,
    instances: Mutex<InstanceCache>,
}

/// Map size at which dead wrappers are first swept.
const MIN_SWEEP: usize = 64;

/// Weak wrappers by document. Dead entries are swept once the map reaches
/// `sweep_at`, which then doubles past the live count.
struct InstanceCache {
    live: HashMap<DocumentId, Weak<DynamicEntity>>,
    sweep_at: usize,
}

impl InstanceCache {
    fn new() -> Self {
        Self {
            live: HashMap::new(),
            sweep_at: MIN_SWEEP,
        }
    }

    fn get(&self, id: &DocumentId) -> Option<EntityRef> {
        self.live.get(id).and_then(Weak::upgrade)
    }

    fn insert(&mut self, id: DocumentId, entity: &EntityRef) {
        if self.live.len() >= self.sweep_at {
            self.live.retain(|_, wrapper| wrapper.strong_count() > 0);
            self.sweep_at = (self.live.len() * 2).max(MIN_SWEEP);
        }
        self.live.insert(id, Arc::downgrade(entity));
    }

    fn live_count(&self) -> usize {
        self.live
            .values()
            .filter(|wrapper| wrapper.strong_count() > 0)
            .count()
    }
}

impl ValueStoreAdapter {
    pub fn new(registry: Arc<TypeRegistry>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            registry,
            schemas: RwLock::new(HashMap::new()),
            bindings: RwLock::new(HashMap::new()),
            schema_types: RwLock::new(HashMap::new()),
            instances: Mutex::new(InstanceCache::new()),
        })
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    // -----------------------------------------------------------------------
    // Schemas and bindings
    // -----------------------------------------------------------------------

    /// Register a document schema. Registering a name twice returns the
    /// schema registered first.
    pub fn register_schema(&self, schema: DocSchema) -> AdapterResult<Arc<DocSchema>> {
        if let Some(existing) = self.schemas.read().expect("lock poisoned").get(&schema.name) {
            return Ok(Arc::clone(existing));
        }
        schema.validate()?;
        let mut schemas = self.schemas.write().expect("lock poisoned");
        let entry = schemas
            .entry(schema.name.clone())
            .or_insert_with(|| Arc::new(schema));
        Ok(Arc::clone(entry))
    }

    pub fn schema(&self, name: &str) -> AdapterResult<Arc<DocSchema>> {
        self.schemas
            .read()
            .expect("lock poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| AdapterError::UnknownSchema(name.to_string()))
    }

    /// The binding of an entity type, resolved on first use and cached.
    pub fn binding(&self, type_name: &str) -> AdapterResult<Arc<TypeBinding>> {
        if let Some(binding) = self.bindings.read().expect("lock poisoned").get(type_name) {
            return Ok(Arc::clone(binding));
        }

        let entity_type = self.registry.get_type(type_name)?;
        let schema_name = entity_type
            .backing_schema()
            .ok_or_else(|| AdapterError::NoBackingSchema(type_name.to_string()))?
            .to_string();
        let schema = self.schema(&schema_name)?;
        let registry = &self.registry;
        let resolved = Arc::new(TypeBinding::resolve(entity_type, schema, |referenced| {
            registry
                .get_type(referenced)
                .ok()
                .and_then(|t| t.backing_schema().map(str::to_string))
        }));

        self.schema_types
            .write()
            .expect("lock poisoned")
            .entry(schema_name)
            .or_insert_with(|| type_name.to_string());
        let mut bindings = self.bindings.write().expect("lock poisoned");
        Ok(Arc::clone(
            bindings.entry(type_name.to_string()).or_insert(resolved),
        ))
    }

    /// The entity type backed by a document schema.
    fn type_for_schema(&self, schema_name: &str) -> AdapterResult<Arc<EntityType>> {
        let known = self
            .schema_types
            .read()
            .expect("lock poisoned")
            .get(schema_name)
            .cloned();
        if let Some(type_name) = known {
            return Ok(self.registry.get_type(&type_name)?);
        }

        let found = self
            .registry
            .type_names()
            .into_iter()
            .filter_map(|name| self.registry.get_type(&name).ok())
            .find(|t| t.backing_schema() == Some(schema_name))
            .ok_or_else(|| AdapterError::UnknownType(schema_name.to_string()))?;
        self.schema_types
            .write()
            .expect("lock poisoned")
            .insert(schema_name.to_string(), found.name().to_string());
        Ok(found)
    }

    // -----------------------------------------------------------------------
    // Wrapping
    // -----------------------------------------------------------------------

    /// The entity view of `document`.
    ///
    /// While a wrapper is alive, wrapping the same document returns it again.
    pub fn wrap(&self, document: &Document) -> AdapterResult<EntityRef> {
        let mut instances = self.instances.lock().expect("lock poisoned");
        if let Some(live) = instances.get(&document.id()) {
            debug!(document = %document.id(), "wrap cache hit");
            return Ok(live);
        }

        let entity_type = self.type_for_schema(&document.schema().name)?;
        let binding = self.binding(entity_type.name())?;
        let entity = self.build_entity(document, &binding);

        instances.insert(document.id(), &entity);
        debug!(
            document = %document.id(),
            entity_type = entity_type.name(),
            "wrapped document"
        );
        Ok(entity)
    }

    /// The document behind a wrapped entity.
    pub fn unwrap(&self, entity: &DynamicEntity) -> AdapterResult<Document> {
        entity
            .backing()
            .and_then(|b| b.as_any().downcast_ref::<DocumentBacking>())
            .map(|b| b.document.clone())
            .ok_or_else(|| AdapterError::NotBacked {
                type_name: entity.type_name().to_string(),
            })
    }

    /// A new, empty document of the type's backing schema, wrapped.
    pub fn create(&self, type_name: &str) -> AdapterResult<EntityRef> {
        let binding = self.binding(type_name)?;
        let document = Document::new(Arc::clone(binding.schema()));
        self.wrap(&document)
    }

    /// Wrap the record `key` of the type's backing schema, read lazily from
    /// `driver`. Key attributes are filled in from `key`; every other field
    /// is read on first access.
    pub fn load(
        &self,
        type_name: &str,
        key: PrimaryKey,
        driver: Arc<dyn StoreDriver>,
    ) -> AdapterResult<EntityRef> {
        let binding = self.binding(type_name)?;
        let entity_type = binding.entity_type();
        if key.len() != entity_type.key_slots().len() {
            return Err(AdapterError::KeyMismatch {
                type_name: type_name.to_string(),
                expected: entity_type.key_slots().len(),
                found: key.len(),
            });
        }

        let document = Document::with_source(
            Arc::clone(binding.schema()),
            DocumentSource {
                driver,
                key: key.clone(),
            },
        );
        document.refresh()?;
        for (&slot, value) in entity_type.key_slots().iter().zip(key.values()) {
            if let Some(path) = binding.path(slot) {
                document.set(path, DocValue::Scalar(value.clone()))?;
            }
        }
        debug!(entity_type = type_name, %key, "loading entity from store");
        self.wrap(&document)
    }

    /// Re-read every non-key attribute of a wrapped entity from its
    /// document's source on next access. Documents without a source, such
    /// as those made by [`create`](Self::create), hold nothing to re-read.
    pub fn refresh(&self, entity: &EntityRef) -> AdapterResult<()> {
        let document = self.unwrap(entity)?;
        if document.source().is_none() {
            debug!(entity_type = entity.type_name(), document = %document.id(), "no source to refresh from");
            return Ok(());
        }
        let binding = self.binding(entity.type_name())?;
        let key_slots = binding.entity_type().key_slots();

        for attribute in binding.entity_type().attributes() {
            if key_slots.contains(&attribute.slot) {
                continue;
            }
            if let Some(path) = binding.path(attribute.slot) {
                document.defer(path)?;
                entity.install_slot(attribute.slot, self.initial_slot(&document, &binding, attribute));
            }
        }
        debug!(entity_type = entity.type_name(), document = %document.id(), "refreshed entity");
        Ok(())
    }

    /// Number of live wrappers in the instance cache.
    pub fn cached_instances(&self) -> usize {
        self.instances.lock().expect("lock poisoned").live_count()
    }

    // -----------------------------------------------------------------------
    // Entity construction
    // -----------------------------------------------------------------------

    fn build_entity(&self, document: &Document, binding: &Arc<TypeBinding>) -> EntityRef {
        let writing = Arc::new(AtomicBool::new(false));
        let backing = Arc::new(DocumentBacking {
            adapter: self.this.clone(),
            document: document.clone(),
            binding: Arc::clone(binding),
            writing: Arc::clone(&writing),
            observer: OnceLock::new(),
        });

        let slots = binding
            .entity_type()
            .attributes()
            .map(|attribute| self.initial_slot(document, binding, attribute))
            .collect();
        let entity = DynamicEntity::with_backing(binding.entity_type(), backing.clone(), slots);

        let id = document.subscribe(Arc::new(BridgeObserver {
            adapter: self.this.clone(),
            entity: Arc::downgrade(&entity),
            binding: Arc::clone(binding),
            writing,
        }));
        let _ = backing.observer.set(id);
        entity
    }

    /// Slot content of a freshly wrapped or refreshed entity.
    ///
    /// References and collections are always lazy; scalars are lazy only
    /// while their document field is deferred.
    fn initial_slot(
        &self,
        document: &Document,
        binding: &Arc<TypeBinding>,
        attribute: &AttributeDescriptor,
    ) -> Slot {
        let Some(path) = binding.path(attribute.slot) else {
            return match attribute.collection {
                Some(container) => Slot::Value(Value::Collection(Collection::new(
                    container,
                    ElementSpec::of(binding.entity_type(), attribute),
                ))),
                None => Slot::Unset,
            };
        };
        if attribute.is_relationship() || attribute.is_collection() {
            return self.lazy_slot(document, binding, attribute.slot);
        }
        match document.get(path) {
            Ok(Some(DocValue::Scalar(s))) => Slot::Value(Value::Scalar(s)),
            Ok(None) => Slot::Unset,
            // Deferred, or unreadable: the loader reports it on first access.
            _ => self.lazy_slot(document, binding, attribute.slot),
        }
    }

    fn lazy_slot(&self, document: &Document, binding: &Arc<TypeBinding>, slot: usize) -> Slot {
        let adapter = self.this.clone();
        let document = document.clone();
        let binding = Arc::clone(binding);
        Slot::Lazy(LazyValue::new(move || -> EntityResult<Option<Value>> {
            let adapter = adapter.upgrade().ok_or(AdapterError::Detached)?;
            Ok(adapter.materialize(&document, &binding, slot)?)
        }))
    }

    /// Read one attribute from the document, resolving a deferred field.
    fn materialize(
        &self,
        document: &Document,
        binding: &TypeBinding,
        slot: usize,
    ) -> AdapterResult<Option<Value>> {
        let attribute = attribute_at(binding, slot)?;
        let path = binding.path_of(&attribute.name)?;
        let resolved = document.resolve(path)?;
        if let Some(collection) = self.proxy(document, binding, attribute) {
            return Ok(Some(Value::Collection(collection)));
        }
        resolved.map(|value| self.to_value(path, value)).transpose()
    }

    /// Slot content for a change observed on the document.
    pub(crate) fn observed_slot(
        &self,
        document: &Document,
        binding: &Arc<TypeBinding>,
        slot: usize,
        new: Option<DocValue>,
    ) -> Slot {
        let Ok(attribute) = attribute_at(binding, slot) else {
            return Slot::Unset;
        };
        if let Some(collection) = self.proxy(document, binding, attribute) {
            return Slot::Value(Value::Collection(collection));
        }
        let Some(path) = binding.path(slot) else {
            return Slot::Unset;
        };
        match new {
            None => Slot::Unset,
            Some(DocValue::Deferred) => self.lazy_slot(document, binding, slot),
            Some(value) => match self.to_value(path, value) {
                Ok(value) => Slot::Value(value),
                Err(err) => {
                    warn!(attribute = %attribute.name, error = %err, "deferring observed change");
                    self.lazy_slot(document, binding, slot)
                }
            },
        }
    }

    /// A collection proxy over the document list bound to `attribute`, or
    /// `None` if the attribute is not a mapped collection.
    pub(crate) fn proxy(
        &self,
        document: &Document,
        binding: &TypeBinding,
        attribute: &AttributeDescriptor,
    ) -> Option<Collection> {
        let container = attribute.collection?;
        let path = binding.path(attribute.slot)?;
        Some(Collection::with_storage(
            container,
            ElementSpec::of(binding.entity_type(), attribute),
            Arc::new(DocumentList {
                adapter: self.this.clone(),
                document: document.clone(),
                path: path.clone(),
            }),
        ))
    }

    // -----------------------------------------------------------------------
    // Value conversion
    // -----------------------------------------------------------------------

    /// Entity value of a single document element.
    pub(crate) fn to_value(&self, path: &DocPath, value: DocValue) -> AdapterResult<Value> {
        match value {
            DocValue::Scalar(s) => Ok(Value::Scalar(s)),
            DocValue::Node(document) => Ok(Value::Entity(self.wrap(&document)?)),
            other => Err(AdapterError::Document(DocumentError::ShapeMismatch {
                path: path.clone(),
                expected: "a scalar or document".to_string(),
                found: other.describe(),
            })),
        }
    }

    /// Document value of an entity value; entities are unwrapped.
    pub(crate) fn to_doc_value(&self, value: &Value) -> AdapterResult<DocValue> {
        match value {
            Value::Scalar(s) => Ok(DocValue::Scalar(s.clone())),
            Value::Entity(entity) => Ok(DocValue::Node(self.unwrap(entity)?)),
            Value::Collection(collection) => Ok(DocValue::List(
                collection
                    .to_vec()?
                    .iter()
                    .map(|element| self.to_doc_value(element))
                    .collect::<AdapterResult<_>>()?,
            )),
        }
    }
}

fn attribute_at(binding: &TypeBinding, slot: usize) -> AdapterResult<&AttributeDescriptor> {
    binding
        .entity_type()
        .attribute(slot)
        .ok_or_else(|| AdapterError::UnmappedAttribute {
            type_name: binding.entity_type().name().to_string(),
            attribute: format!("#{slot}"),
        })
}

impl Reload for ValueStoreAdapter {
    fn reload(&self, entity: &EntityRef) -> EntityResult<()> {
        Ok(self.refresh(entity)?)
    }
}

impl std::fmt::Debug for ValueStoreAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueStoreAdapter")
            .field("schemas", &self.schemas.read().expect("lock poisoned").len())
            .field("bindings", &self.bindings.read().expect("lock poisoned").len())
            .field("cached_instances", &self.cached_instances())
            .finish()
    }
}
