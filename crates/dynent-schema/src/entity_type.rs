use std::collections::HashMap;
use std::fmt;

use crate::descriptor::{AttributeDescriptor, SchemaDescriptor};
use crate::error::SchemaResult;

/// The validated runtime form of a [`SchemaDescriptor`].
///
/// An `EntityType` owns its descriptor, a name → slot lookup table, and the
/// precomputed key and version slots. It is immutable and shared as
/// `Arc<EntityType>`; instances are created by the entity crate's factory.
pub struct EntityType {
    descriptor: SchemaDescriptor,
    /// Attributes indexed by slot.
    by_slot: Vec<usize>,
    by_name: HashMap<String, usize>,
    key_slots: Vec<usize>,
    version_slot: Option<usize>,
}

impl EntityType {
    /// Validate `descriptor` and build the lookup tables.
    pub fn new(descriptor: SchemaDescriptor) -> SchemaResult<Self> {
        descriptor.validate()?;

        let mut by_slot = vec![0usize; descriptor.attributes.len()];
        let mut by_name = HashMap::with_capacity(descriptor.attributes.len());
        for (position, attr) in descriptor.attributes.iter().enumerate() {
            by_slot[attr.slot] = position;
            by_name.insert(attr.name.clone(), attr.slot);
        }

        // Key order follows slot order.
        let mut key_slots: Vec<usize> = descriptor
            .attributes
            .iter()
            .filter(|a| a.key)
            .map(|a| a.slot)
            .collect();
        key_slots.sort_unstable();

        let version_slot = descriptor
            .attributes
            .iter()
            .find(|a| a.version)
            .map(|a| a.slot);

        Ok(Self {
            descriptor,
            by_slot,
            by_name,
            key_slots,
            version_slot,
        })
    }

    pub fn name(&self) -> &str {
        &self.descriptor.type_name
    }

    pub fn descriptor(&self) -> &SchemaDescriptor {
        &self.descriptor
    }

    /// Number of attributes (and slots).
    pub fn len(&self) -> usize {
        self.by_slot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_slot.is_empty()
    }

    /// The attribute stored in `slot`, if the slot exists.
    pub fn attribute(&self, slot: usize) -> Option<&AttributeDescriptor> {
        self.by_slot
            .get(slot)
            .map(|&position| &self.descriptor.attributes[position])
    }

    pub fn attribute_named(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.slot_of(name).and_then(|slot| self.attribute(slot))
    }

    pub fn slot_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Attributes in slot order.
    pub fn attributes(&self) -> impl Iterator<Item = &AttributeDescriptor> {
        self.by_slot
            .iter()
            .map(move |&position| &self.descriptor.attributes[position])
    }

    /// Primary-key attributes in slot order.
    pub fn key_attributes(&self) -> Vec<&AttributeDescriptor> {
        self.key_slots
            .iter()
            .filter_map(|&slot| self.attribute(slot))
            .collect()
    }

    pub fn key_slots(&self) -> &[usize] {
        &self.key_slots
    }

    pub fn has_key(&self) -> bool {
        !self.key_slots.is_empty()
    }

    pub fn has_composite_key(&self) -> bool {
        self.key_slots.len() > 1
    }

    pub fn version_attribute(&self) -> Option<&AttributeDescriptor> {
        self.version_slot.and_then(|slot| self.attribute(slot))
    }

    /// Name of the document schema this type binds to.
    pub fn backing_schema(&self) -> Option<&str> {
        self.descriptor.backing_schema.as_deref()
    }
}

impl fmt::Debug for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityType")
            .field("name", &self.name())
            .field("attributes", &self.len())
            .field("key_slots", &self.key_slots)
            .finish()
    }
}
