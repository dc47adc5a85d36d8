//! Capability traits and the seams a backing representation plugs into.

use std::any::Any;
use std::sync::Arc;

use dynent_schema::{AttributeDescriptor, EntityType};

use crate::entity::EntityRef;
use crate::error::{EntityError, EntityResult};
use crate::listener::{ChangeListener, ListenerId};
use crate::value::Value;

/// Something that identifies an attribute: its name or its slot index.
pub trait AttributeKey {
    /// Resolve to a slot index of `entity_type`.
    ///
    /// # Panics
    ///
    /// Slot indices must be in range; an out-of-range index is a programming
    /// error and panics. Unknown names are reported as
    /// [`EntityError::UnknownAttribute`].
    fn resolve(&self, entity_type: &EntityType) -> EntityResult<usize>;
}

impl AttributeKey for usize {
    fn resolve(&self, entity_type: &EntityType) -> EntityResult<usize> {
        assert!(
            *self < entity_type.len(),
            "slot {} out of range for {} ({} slots)",
            self,
            entity_type.name(),
            entity_type.len()
        );
        Ok(*self)
    }
}

impl AttributeKey for &str {
    fn resolve(&self, entity_type: &EntityType) -> EntityResult<usize> {
        entity_type
            .slot_of(self)
            .ok_or_else(|| EntityError::UnknownAttribute {
                type_name: entity_type.name().to_string(),
                attribute: (*self).to_string(),
            })
    }
}

impl AttributeKey for String {
    fn resolve(&self, entity_type: &EntityType) -> EntityResult<usize> {
        self.as_str().resolve(entity_type)
    }
}

impl AttributeKey for &String {
    fn resolve(&self, entity_type: &EntityType) -> EntityResult<usize> {
        self.as_str().resolve(entity_type)
    }
}

/// Entities that notify listeners of attribute changes.
pub trait ChangeTracking {
    fn add_listener(&self, listener: Arc<dyn ChangeListener>) -> ListenerId;

    /// Returns `true` if the listener was registered.
    fn remove_listener(&self, id: ListenerId) -> bool;

    fn has_listeners(&self) -> bool;
}

/// Entities whose slots may hold not-yet-materialized values.
pub trait LazyLoading {
    /// Returns `false` while the attribute's slot still holds a lazy holder.
    fn is_loaded(&self, attribute: &str) -> EntityResult<bool>;

    /// Names of attributes still waiting to be materialized.
    fn pending_attributes(&self) -> Vec<String>;
}

/// Partial instances that record which attributes they actually carry.
pub trait FetchGroupTracking {
    fn is_attribute_fetched(&self, attribute: &str) -> bool;

    fn fetched_attributes(&self) -> Vec<String>;
}

/// A second representation an entity writes through to.
///
/// Installed once when the entity is created by a backing adapter.
pub trait EntityBacking: Send + Sync {
    /// Propagate a `set` (`Some`) or `unset` (`None`) of `attribute`.
    ///
    /// Returning `Some(value)` asks the entity to store that value instead of
    /// the one it was given, e.g. a collection proxy over the backing list.
    fn write_through(
        &self,
        attribute: &AttributeDescriptor,
        value: Option<&Value>,
    ) -> EntityResult<Option<Value>>;

    fn as_any(&self) -> &dyn Any;
}

/// Re-reads an entity's state from wherever it came from.
pub trait Reload: Send + Sync {
    fn reload(&self, entity: &EntityRef) -> EntityResult<()>;
}
