use std::sync::Arc;

use dynent_adapter::{AdapterError, AdapterResult, TypeBinding, ValueStoreAdapter};
use dynent_cache::{CacheLookup, IdentityCache};
use dynent_document::{DocSchema, StoreDriver};
use dynent_entity::{DynamicEntity, EntityRef, EntityResult, Reload, Value};
use dynent_fetch::{FetchContext, FetchPlan, FetchReport};
use dynent_schema::{EntityType, SchemaDescriptor, TypeRegistry};
use dynent_types::PrimaryKey;
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::SdkResult;
use crate::model::Model;
use crate::unit::UnitOfWork;

/// The dynamic entity engine: one type registry, one document adapter, one
/// identity cache and, optionally, a store driver to load records from.
pub struct Engine {
    config: EngineConfig,
    registry: Arc<TypeRegistry>,
    adapter: Arc<ValueStoreAdapter>,
    cache: IdentityCache,
    driver: Option<Arc<dyn StoreDriver>>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let registry = Arc::new(TypeRegistry::new());
        let adapter = ValueStoreAdapter::new(Arc::clone(&registry));
        Self {
            config,
            registry,
            adapter,
            cache: IdentityCache::new(),
            driver: None,
        }
    }

    /// Load records through `driver` on cache misses.
    pub fn with_driver(mut self, driver: Arc<dyn StoreDriver>) -> Self {
        self.driver = Some(driver);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn adapter(&self) -> &Arc<ValueStoreAdapter> {
        &self.adapter
    }

    pub fn cache(&self) -> &IdentityCache {
        &self.cache
    }

    // ---- Definitions ----

    pub fn register_type(&self, descriptor: SchemaDescriptor) -> SdkResult<Arc<EntityType>> {
        Ok(self.registry.get_or_create_type(descriptor)?)
    }

    pub fn register_schema(&self, schema: DocSchema) -> SdkResult<Arc<DocSchema>> {
        Ok(self.adapter.register_schema(schema)?)
    }

    /// Register every type and schema of `model`, then resolve the bindings
    /// of the backed types. Bindings may be partial.
    pub fn load_model(&self, model: &Model) -> SdkResult<Vec<Arc<TypeBinding>>> {
        for descriptor in &model.types {
            self.register_type(descriptor.clone())?;
        }
        for schema in &model.schemas {
            self.register_schema(schema.clone())?;
        }
        let mut bindings = Vec::new();
        for descriptor in &model.types {
            if descriptor.backing_schema.is_some() {
                bindings.push(self.adapter.binding(&descriptor.type_name)?);
            }
        }
        debug!(
            types = model.types.len(),
            schemas = model.schemas.len(),
            "loaded model"
        );
        Ok(bindings)
    }

    // ---- Instances ----

    /// A new instance: document-backed when the type names a backing
    /// schema, plain otherwise.
    pub fn create(&self, type_name: &str) -> SdkResult<EntityRef> {
        let entity_type = self.registry.get_type(type_name)?;
        Ok(self.instantiate(&entity_type)?)
    }

    pub(crate) fn instantiate(&self, entity_type: &Arc<EntityType>) -> AdapterResult<EntityRef> {
        match entity_type.backing_schema() {
            Some(_) => self.adapter.create(entity_type.name()),
            None => Ok(DynamicEntity::new(entity_type)),
        }
    }

    /// Install `entity` as the canonical instance of its key.
    pub fn attach(&self, entity: &EntityRef) -> SdkResult<PrimaryKey> {
        Ok(self.cache.put_entity(entity)?)
    }

    /// The canonical instance of `key`.
    ///
    /// A cached stale instance is reloaded and revalidated first. On a miss
    /// the record is loaded lazily through the driver, if there is one.
    pub fn find(&self, type_name: &str, key: PrimaryKey) -> SdkResult<Option<EntityRef>> {
        Ok(self.lookup(type_name, &key)?)
    }

    pub(crate) fn lookup(
        &self,
        type_name: &str,
        key: &PrimaryKey,
    ) -> AdapterResult<Option<EntityRef>> {
        if self.config.cache.enabled {
            match self.cache.lookup(type_name, key) {
                CacheLookup::Hit(entity) => return Ok(Some(entity)),
                CacheLookup::Stale(entity) => {
                    self.refresh(&entity)?;
                    self.cache.revalidate(&entity);
                    return Ok(Some(entity));
                }
                CacheLookup::Miss => {}
            }
        }
        let Some(driver) = &self.driver else {
            return Ok(None);
        };
        let entity = self
            .adapter
            .load(type_name, key.clone(), Arc::clone(driver))?;
        if self.config.cache.enabled {
            self.cache.put(type_name, key.clone(), Arc::clone(&entity));
        }
        Ok(Some(entity))
    }

    /// Mark the cached instance of `key` stale. Referencing instances are
    /// not touched.
    pub fn invalidate(&self, type_name: &str, key: &PrimaryKey) -> bool {
        self.cache.invalidate(type_name, key)
    }

    pub fn is_valid(&self, entity: &EntityRef) -> bool {
        self.cache.is_valid(entity)
    }

    fn refresh(&self, entity: &EntityRef) -> AdapterResult<()> {
        match self.adapter.refresh(entity) {
            // Plain instances have nothing to re-read.
            Err(AdapterError::NotBacked { .. }) => Ok(()),
            other => other,
        }
    }

    // ---- Fetch plans ----

    /// A plan over `type_name` holding `attributes`, bound and ready to use.
    pub fn plan(&self, type_name: &str, attributes: &[&str]) -> SdkResult<FetchPlan> {
        let mut plan = if self.config.fetch.auto_add_keys {
            FetchPlan::new()
        } else {
            FetchPlan::without_auto_keys()
        };
        for attribute in attributes {
            plan.add_attribute(attribute);
        }
        plan.initialize(&self.registry, type_name)?;
        Ok(plan)
    }

    fn fetch_context(&self) -> FetchContext<'_> {
        let context = FetchContext::new().with_reload(self);
        if self.config.cache.enabled {
            context.with_cache(&self.cache)
        } else {
            context
        }
    }

    /// Materialize the planned part of `entity`, reloading stale instances
    /// on the way.
    pub fn fetch(&self, plan: &FetchPlan, entity: &EntityRef) -> SdkResult<FetchReport> {
        Ok(plan.fetch(entity, &self.fetch_context())?)
    }

    pub fn fetch_all(&self, plan: &FetchPlan, entities: &[EntityRef]) -> SdkResult<FetchReport> {
        Ok(plan.fetch_all(entities, &self.fetch_context())?)
    }

    pub fn fetch_rows(&self, plan: &FetchPlan, rows: &[Vec<Value>]) -> SdkResult<FetchReport> {
        Ok(plan.fetch_rows(rows, &self.fetch_context())?)
    }

    /// Detached copy of the planned part of `entity`.
    pub fn copy(&self, plan: &FetchPlan, entity: &EntityRef) -> SdkResult<EntityRef> {
        Ok(plan.copy(entity)?)
    }

    pub fn unit_of_work(&self) -> UnitOfWork<'_> {
        UnitOfWork::new(self)
    }

    /// Merge the planned part of `entity` into a fresh unit of work and
    /// return the managed counterpart.
    pub fn merge(&self, plan: &FetchPlan, entity: &EntityRef) -> SdkResult<EntityRef> {
        self.unit_of_work().merge(plan, entity)
    }
}

impl Reload for Engine {
    fn reload(&self, entity: &EntityRef) -> EntityResult<()> {
        Ok(self.refresh(entity)?)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("types", &self.registry.len())
            .field("cache", &self.cache)
            .field("driver", &self.driver.is_some())
            .finish()
    }
}
