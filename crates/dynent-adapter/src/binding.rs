//! Attribute-to-path bindings, resolved once per entity type.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dynent_document::{DocPath, DocSchema, NodeKind};
use dynent_schema::{AttributeDescriptor, EntityType};
use dynent_types::AttributeShape;
use tracing::{debug, warn};

use crate::error::{AdapterError, AdapterResult};

/// Where each attribute of an entity type lives in its document schema.
///
/// The mapping is structural, so it is computed once per type and shared by
/// every instance. A binding may be partial: attributes with no matching
/// leaf are recorded as unmapped and fail only when written.
pub struct TypeBinding {
    entity_type: Arc<EntityType>,
    schema: Arc<DocSchema>,
    paths: Vec<Option<DocPath>>,
    slots_by_path: HashMap<DocPath, usize>,
    unmapped: Vec<String>,
}

impl TypeBinding {
    /// Match every attribute to the leaf whose binding name equals the
    /// attribute name and whose shape agrees with the attribute's shape.
    ///
    /// `backing_schema_of` maps a referenced entity type name to the
    /// document schema it is backed by.
    pub(crate) fn resolve(
        entity_type: Arc<EntityType>,
        schema: Arc<DocSchema>,
        backing_schema_of: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let mut paths = Vec::with_capacity(entity_type.len());
        let mut slots_by_path = HashMap::new();
        let mut unmapped = Vec::new();

        for attribute in entity_type.attributes() {
            let target = attribute
                .referenced_type
                .as_deref()
                .and_then(&backing_schema_of);
            match schema.find_binding(&attribute.name) {
                Some((path, node)) if shape_agrees(attribute, &node.kind, target.as_deref()) => {
                    slots_by_path.insert(path.clone(), attribute.slot);
                    paths.push(Some(path));
                }
                _ => {
                    unmapped.push(attribute.name.clone());
                    paths.push(None);
                }
            }
        }

        if unmapped.is_empty() {
            debug!(
                entity_type = entity_type.name(),
                schema = %schema.name,
                "resolved type binding"
            );
        } else {
            warn!(
                entity_type = entity_type.name(),
                schema = %schema.name,
                unmapped = ?unmapped,
                "partial type binding"
            );
        }

        Self {
            entity_type,
            schema,
            paths,
            slots_by_path,
            unmapped,
        }
    }

    pub fn entity_type(&self) -> &Arc<EntityType> {
        &self.entity_type
    }

    pub fn schema(&self) -> &Arc<DocSchema> {
        &self.schema
    }

    /// Document path of the attribute in `slot`, if mapped.
    pub fn path(&self, slot: usize) -> Option<&DocPath> {
        self.paths.get(slot).and_then(Option::as_ref)
    }

    /// Document path of the named attribute.
    pub fn path_of(&self, attribute: &str) -> AdapterResult<&DocPath> {
        self.entity_type
            .slot_of(attribute)
            .and_then(|slot| self.path(slot))
            .ok_or_else(|| AdapterError::UnmappedAttribute {
                type_name: self.entity_type.name().to_string(),
                attribute: attribute.to_string(),
            })
    }

    /// Slot bound to a document path.
    pub fn slot_for(&self, path: &DocPath) -> Option<usize> {
        self.slots_by_path.get(path).copied()
    }

    /// Names of attributes with no document counterpart.
    pub fn unmapped(&self) -> &[String] {
        &self.unmapped
    }

    pub fn is_complete(&self) -> bool {
        self.unmapped.is_empty()
    }
}

fn shape_agrees(attribute: &AttributeDescriptor, node: &NodeKind, target: Option<&str>) -> bool {
    match (attribute.shape(), node) {
        (AttributeShape::Scalar, NodeKind::Value { kind })
        | (AttributeShape::ScalarCollection, NodeKind::Values { kind }) => *kind == attribute.kind,
        (AttributeShape::Reference, NodeKind::Element { target: node_target })
        | (AttributeShape::ReferenceCollection, NodeKind::Elements { target: node_target }) => {
            target == Some(node_target.as_str())
        }
        _ => false,
    }
}

impl fmt::Debug for TypeBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeBinding")
            .field("entity_type", &self.entity_type.name())
            .field("schema", &self.schema.name)
            .field("unmapped", &self.unmapped)
            .finish()
    }
}
