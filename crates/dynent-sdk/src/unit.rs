//! Units of work: the managed instances a merge lands in.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use dynent_entity::{EntityError, EntityRef};
use dynent_fetch::{FetchPlan, FetchResult, MergeContext};
use dynent_schema::EntityType;
use dynent_types::PrimaryKey;
use tracing::debug;

use crate::engine::Engine;
use crate::error::SdkResult;

/// Instances managed by one logical unit of work.
///
/// Lookups go to the unit's own instances first, then to the engine (its
/// identity cache and store driver). Instances the unit creates are
/// document-backed when their type is, and are installed in the engine's
/// cache when caching is enabled.
pub struct UnitOfWork<'e> {
    engine: &'e Engine,
    managed: Mutex<HashMap<(String, PrimaryKey), EntityRef>>,
}

impl<'e> UnitOfWork<'e> {
    pub(crate) fn new(engine: &'e Engine) -> Self {
        Self {
            engine,
            managed: Mutex::new(HashMap::new()),
        }
    }

    /// Merge the planned part of `entity` into this unit, using the
    /// engine's configured depth limit.
    pub fn merge(&self, plan: &FetchPlan, entity: &EntityRef) -> SdkResult<EntityRef> {
        let depth = self.engine.config().fetch.max_merge_depth;
        Ok(plan.merge_with_depth(entity, self, depth)?)
    }

    pub fn merge_all(&self, plan: &FetchPlan, entities: &[EntityRef]) -> SdkResult<Vec<EntityRef>> {
        let depth = self.engine.config().fetch.max_merge_depth;
        Ok(plan.merge_all(entities, self, depth)?)
    }

    /// The managed instance of `key`, if this unit holds one.
    pub fn get(&self, type_name: &str, key: &PrimaryKey) -> Option<EntityRef> {
        self.managed
            .lock()
            .expect("lock poisoned")
            .get(&(type_name.to_string(), key.clone()))
            .cloned()
    }

    pub fn managed(&self) -> Vec<EntityRef> {
        self.managed
            .lock()
            .expect("lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.managed.lock().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check required attributes of every managed instance.
    pub fn validate(&self) -> SdkResult<()> {
        for entity in self.managed() {
            entity.check_required()?;
        }
        Ok(())
    }
}

impl MergeContext for UnitOfWork<'_> {
    fn find(&self, type_name: &str, key: &PrimaryKey) -> FetchResult<Option<EntityRef>> {
        if let Some(entity) = self.get(type_name, key) {
            return Ok(Some(entity));
        }
        // Driver access happens outside the unit's lock.
        let found = self
            .engine
            .lookup(type_name, key)
            .map_err(EntityError::from)?;
        if let Some(entity) = &found {
            self.managed
                .lock()
                .expect("lock poisoned")
                .insert((type_name.to_string(), key.clone()), Arc::clone(entity));
        }
        Ok(found)
    }

    fn instantiate(&self, entity_type: &Arc<EntityType>) -> FetchResult<EntityRef> {
        Ok(self
            .engine
            .instantiate(entity_type)
            .map_err(EntityError::from)?)
    }

    fn register(&self, entity: &EntityRef, key: &PrimaryKey) -> FetchResult<()> {
        debug!(entity_type = entity.type_name(), %key, "managing new instance");
        self.managed
            .lock()
            .expect("lock poisoned")
            .insert((entity.type_name().to_string(), key.clone()), Arc::clone(entity));
        if self.engine.config().cache.enabled {
            self.engine
                .cache()
                .put(entity.type_name(), key.clone(), Arc::clone(entity));
        }
        Ok(())
    }
}

impl std::fmt::Debug for UnitOfWork<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("managed", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dynent_entity::DynamicEntity;
    use dynent_fetch::FetchError;
    use dynent_schema::SchemaDescriptor;
    use dynent_types::ValueKind;

    fn engine() -> Engine {
        let engine = Engine::new();
        engine
            .register_type(
                SchemaDescriptor::builder("Person")
                    .key("id", ValueKind::Int)
                    .required("name", ValueKind::Text)
                    .reference("manager", "Person")
                    .build(),
            )
            .unwrap();
        engine
    }

    fn person(engine: &Engine, id: i64, name: Option<&str>) -> EntityRef {
        let p = DynamicEntity::new(&engine.registry().get_type("Person").unwrap());
        p.set("id", id).unwrap();
        if let Some(name) = name {
            p.set("name", name).unwrap();
        }
        p
    }

    #[test]
    fn merge_registers_new_instances_with_unit_and_cache() {
        let engine = engine();
        let unit = engine.unit_of_work();
        let boss = person(&engine, 1, Some("Boss"));
        let a = person(&engine, 2, Some("A"));
        a.set("manager", &boss).unwrap();

        let plan = engine.plan("Person", &["name", "manager.name"]).unwrap();
        let managed = unit.merge(&plan, &a).unwrap();

        assert_eq!(unit.len(), 2);
        assert_eq!(engine.cache().len(), 2);
        let manager = managed.get("manager").unwrap().unwrap();
        assert!(Arc::ptr_eq(
            manager.as_entity().unwrap(),
            &unit.get("Person", &PrimaryKey::from(1)).unwrap()
        ));
    }

    #[test]
    fn merge_finds_cached_instances() {
        let engine = engine();
        let cached = person(&engine, 1, Some("Old"));
        engine.attach(&cached).unwrap();

        let plan = engine.plan("Person", &["name"]).unwrap();
        let managed = engine.merge(&plan, &person(&engine, 1, Some("New"))).unwrap();
        assert!(Arc::ptr_eq(&managed, &cached));
        assert_eq!(cached.get("name").unwrap().unwrap().as_text(), Some("New"));
    }

    #[test]
    fn validate_reports_missing_required() {
        let engine = engine();
        let unit = engine.unit_of_work();
        let plan = engine.plan("Person", &["name"]).unwrap();
        unit.merge(&plan, &person(&engine, 1, None)).unwrap();
        assert!(unit.validate().is_err());
    }

    #[test]
    fn merge_errors_surface_as_fetch_errors() {
        let engine = engine();
        let plan = engine.plan("Person", &["name"]).unwrap();
        let anonymous = DynamicEntity::new(&engine.registry().get_type("Person").unwrap());
        let err = engine.merge(&plan, &anonymous).unwrap_err();
        assert!(matches!(
            err,
            crate::SdkError::Fetch(FetchError::MissingKey { .. })
        ));
    }
}
