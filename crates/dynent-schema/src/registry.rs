//! The type registry: one canonical [`EntityType`] per type name.
//!
//! [`TypeRegistry`] stores types in a `HashMap` behind a `RwLock`. It is an
//! explicit object owned by the application and passed to whichever
//! component needs it; there is no process-wide registry.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::descriptor::SchemaDescriptor;
use crate::entity_type::EntityType;
use crate::error::{SchemaError, SchemaResult};

/// Creates and looks up runtime entity types.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: RwLock<HashMap<String, Arc<EntityType>>>,
}

impl TypeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the type named by `descriptor`, creating it on first use.
    ///
    /// Creation is idempotent: if a type with the same name is already
    /// registered, that type is returned and `descriptor` is not validated
    /// again. Descriptors must not be mutated after registration.
    pub fn get_or_create_type(&self, descriptor: SchemaDescriptor) -> SchemaResult<Arc<EntityType>> {
        if let Some(existing) = self
            .types
            .read()
            .expect("lock poisoned")
            .get(&descriptor.type_name)
        {
            return Ok(Arc::clone(existing));
        }

        // Validate outside the write lock; a racing creator wins below.
        let created = Arc::new(EntityType::new(descriptor)?);

        let mut types = self.types.write().expect("lock poisoned");
        let entry = types
            .entry(created.name().to_string())
            .or_insert_with(|| {
                debug!(
                    entity_type = created.name(),
                    attributes = created.len(),
                    "registered entity type"
                );
                Arc::clone(&created)
            });
        Ok(Arc::clone(entry))
    }

    /// Look up a registered type by name.
    pub fn get_type(&self, type_name: &str) -> SchemaResult<Arc<EntityType>> {
        self.types
            .read()
            .expect("lock poisoned")
            .get(type_name)
            .cloned()
            .ok_or_else(|| SchemaError::TypeNotFound(type_name.to_string()))
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.types
            .read()
            .expect("lock poisoned")
            .contains_key(type_name)
    }

    /// Unregister a type. Existing instances keep their `Arc<EntityType>`.
    pub fn remove_type(&self, type_name: &str) -> bool {
        self.types
            .write()
            .expect("lock poisoned")
            .remove(type_name)
            .is_some()
    }

    /// Sorted names of all registered types.
    pub fn type_names(&self) -> Vec<String> {
        let types = self.types.read().expect("lock poisoned");
        let mut names: Vec<String> = types.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.types.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.read().expect("lock poisoned").is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dynent_types::ValueKind;

    fn person() -> SchemaDescriptor {
        SchemaDescriptor::builder("Person")
            .key("id", ValueKind::Int)
            .attribute("name", ValueKind::Text)
            .reference("manager", "Person")
            .build()
    }

    #[test]
    fn create_and_get() {
        let registry = TypeRegistry::new();
        let created = registry.get_or_create_type(person()).unwrap();
        let found = registry.get_type("Person").unwrap();
        assert!(Arc::ptr_eq(&created, &found));
        assert!(registry.contains("Person"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn creation_is_idempotent() {
        let registry = TypeRegistry::new();
        let a = registry.get_or_create_type(person()).unwrap();
        let b = registry.get_or_create_type(person()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn second_registration_is_not_revalidated() {
        let registry = TypeRegistry::new();
        let a = registry.get_or_create_type(person()).unwrap();

        // Same name, malformed body: the existing type comes back untouched.
        let mut broken = person();
        broken.attributes[1].slot = 40;
        let b = registry.get_or_create_type(broken).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.attribute(1).unwrap().name, "name");
    }

    #[test]
    fn malformed_descriptor_is_not_registered() {
        let registry = TypeRegistry::new();
        let mut broken = person();
        broken.attributes[2].referenced_type = None;
        assert!(registry.get_or_create_type(broken).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn missing_type_is_not_found() {
        let registry = TypeRegistry::new();
        let err = registry.get_type("Ghost").unwrap_err();
        assert_eq!(err, SchemaError::TypeNotFound("Ghost".into()));
    }

    #[test]
    fn type_names_are_sorted() {
        let registry = TypeRegistry::new();
        for name in ["Zeta", "Alpha", "Mid"] {
            registry
                .get_or_create_type(SchemaDescriptor::builder(name).build())
                .unwrap();
        }
        assert_eq!(registry.type_names(), vec!["Alpha", "Mid", "Zeta"]);
    }

    #[test]
    fn remove_type_keeps_existing_handles_alive() {
        let registry = TypeRegistry::new();
        let ty = registry.get_or_create_type(person()).unwrap();
        assert!(registry.remove_type("Person"));
        assert!(!registry.remove_type("Person"));
        assert_eq!(ty.name(), "Person");
        assert!(registry.get_type("Person").is_err());
    }

    #[test]
    fn concurrent_creation_yields_one_type() {
        use std::thread;

        let registry = Arc::new(TypeRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || registry.get_or_create_type(person()).unwrap())
            })
            .collect();

        let types: Vec<Arc<EntityType>> = handles
            .into_iter()
            .map(|h| h.join().expect("thread should not panic"))
            .collect();
        for ty in &types {
            assert!(Arc::ptr_eq(ty, &types[0]));
        }
        assert_eq!(registry.len(), 1);
    }
}
