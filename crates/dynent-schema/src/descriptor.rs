//! Schema descriptors: the immutable description of one entity type.

use std::collections::HashSet;

use dynent_types::{AttributeShape, ContainerKind, ValueKind};
use serde::{Deserialize, Serialize};

use crate::error::{SchemaError, SchemaResult};
use crate::names::{validate_attribute_name, validate_type_name};

/// Metadata for one attribute of an entity type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDescriptor {
    /// Attribute name, unique within the type.
    pub name: String,
    /// Storage slot; slots of a type are exactly `0..len`.
    pub slot: usize,
    /// Kind of the value, or of each element for collections.
    pub kind: ValueKind,
    /// Container for collection attributes.
    #[serde(default)]
    pub collection: Option<ContainerKind>,
    /// Type name referenced by reference attributes.
    #[serde(default)]
    pub referenced_type: Option<String>,
    /// Part of the primary key.
    #[serde(default)]
    pub key: bool,
    /// Optimistic-lock version attribute.
    #[serde(default)]
    pub version: bool,
    /// Must be set before the instance is considered complete.
    #[serde(default)]
    pub required: bool,
}

impl AttributeDescriptor {
    /// A plain optional scalar attribute.
    pub fn scalar(name: impl Into<String>, slot: usize, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            slot,
            kind,
            collection: None,
            referenced_type: None,
            key: false,
            version: false,
            required: false,
        }
    }

    /// A to-one reference to `target`.
    pub fn reference(name: impl Into<String>, slot: usize, target: impl Into<String>) -> Self {
        Self {
            referenced_type: Some(target.into()),
            ..Self::scalar(name, slot, ValueKind::Reference)
        }
    }

    pub fn shape(&self) -> AttributeShape {
        AttributeShape::of(self.kind, self.collection)
    }

    pub fn is_collection(&self) -> bool {
        self.collection.is_some()
    }

    /// Returns `true` for references and reference collections.
    pub fn is_relationship(&self) -> bool {
        self.shape().is_relationship()
    }

    /// Exact-match check used when assigning a referenced entity.
    pub fn accepts_reference_to(&self, type_name: &str) -> bool {
        self.referenced_type.as_deref() == Some(type_name)
    }
}

/// Immutable description of one entity type.
///
/// Built once by configuration code, either through [`SchemaDescriptor::builder`]
/// or by deserializing, then handed to the
/// [`TypeRegistry`](crate::TypeRegistry). Callers must not mutate a descriptor
/// after registration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    pub type_name: String,
    pub attributes: Vec<AttributeDescriptor>,
    /// Name of the document schema this type binds to, if any.
    #[serde(default)]
    pub backing_schema: Option<String>,
}

impl SchemaDescriptor {
    /// Start building a descriptor; slots are assigned in call order.
    pub fn builder(type_name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            descriptor: SchemaDescriptor {
                type_name: type_name.into(),
                attributes: Vec::new(),
                backing_schema: None,
            },
        }
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Check the structural invariants of the descriptor.
    pub fn validate(&self) -> SchemaResult<()> {
        let type_name = &self.type_name;
        validate_type_name(type_name)?;

        let mut names = HashSet::new();
        let mut slots: Vec<usize> = Vec::with_capacity(self.attributes.len());
        let mut versions = 0usize;

        for attr in &self.attributes {
            validate_attribute_name(type_name, &attr.name)?;
            if !names.insert(attr.name.as_str()) {
                return Err(SchemaError::DuplicateAttribute {
                    type_name: type_name.clone(),
                    name: attr.name.clone(),
                });
            }
            slots.push(attr.slot);

            match (attr.kind, &attr.referenced_type) {
                (ValueKind::Reference, None) => {
                    return Err(SchemaError::MissingReferencedType {
                        type_name: type_name.clone(),
                        attribute: attr.name.clone(),
                    });
                }
                (kind, Some(_)) if kind.is_scalar() => {
                    return Err(SchemaError::UnexpectedReferencedType {
                        type_name: type_name.clone(),
                        attribute: attr.name.clone(),
                    });
                }
                _ => {}
            }

            if attr.key && attr.shape() != AttributeShape::Scalar {
                return Err(SchemaError::InvalidKeyAttribute {
                    type_name: type_name.clone(),
                    attribute: attr.name.clone(),
                    reason: "keys must be single scalar values".into(),
                });
            }

            if attr.version {
                versions += 1;
                if attr.kind != ValueKind::Int || attr.is_collection() {
                    return Err(SchemaError::InvalidVersionAttribute {
                        type_name: type_name.clone(),
                        attribute: attr.name.clone(),
                        reason: "versions must be single int values".into(),
                    });
                }
            }
        }

        if versions > 1 {
            return Err(SchemaError::MultipleVersionAttributes {
                type_name: type_name.clone(),
            });
        }

        slots.sort_unstable();
        for (expected, found) in slots.into_iter().enumerate() {
            if expected != found {
                return Err(SchemaError::NonDenseSlots {
                    type_name: type_name.clone(),
                    expected,
                    found,
                });
            }
        }

        Ok(())
    }
}

/// Fluent builder for [`SchemaDescriptor`].
///
/// The builder never fails; validation happens on registration.
#[derive(Clone, Debug)]
pub struct SchemaBuilder {
    descriptor: SchemaDescriptor,
}

impl SchemaBuilder {
    fn next_slot(&self) -> usize {
        self.descriptor.attributes.len()
    }

    fn push(mut self, attr: AttributeDescriptor) -> Self {
        self.descriptor.attributes.push(attr);
        self
    }

    /// Add a primary-key attribute.
    pub fn key(self, name: &str, kind: ValueKind) -> Self {
        let attr = AttributeDescriptor {
            key: true,
            required: true,
            ..AttributeDescriptor::scalar(name, self.next_slot(), kind)
        };
        self.push(attr)
    }

    /// Add an optional scalar attribute.
    pub fn attribute(self, name: &str, kind: ValueKind) -> Self {
        let attr = AttributeDescriptor::scalar(name, self.next_slot(), kind);
        self.push(attr)
    }

    /// Add a required scalar attribute.
    pub fn required(self, name: &str, kind: ValueKind) -> Self {
        let attr = AttributeDescriptor {
            required: true,
            ..AttributeDescriptor::scalar(name, self.next_slot(), kind)
        };
        self.push(attr)
    }

    /// Add the optimistic-lock version attribute.
    pub fn version(self, name: &str) -> Self {
        let attr = AttributeDescriptor {
            version: true,
            ..AttributeDescriptor::scalar(name, self.next_slot(), ValueKind::Int)
        };
        self.push(attr)
    }

    /// Add a to-one reference.
    pub fn reference(self, name: &str, target: &str) -> Self {
        let attr = AttributeDescriptor::reference(name, self.next_slot(), target);
        self.push(attr)
    }

    /// Add a collection of scalars.
    pub fn collection(self, name: &str, kind: ValueKind, container: ContainerKind) -> Self {
        let attr = AttributeDescriptor {
            collection: Some(container),
            ..AttributeDescriptor::scalar(name, self.next_slot(), kind)
        };
        self.push(attr)
    }

    /// Add a to-many reference.
    pub fn references(self, name: &str, target: &str, container: ContainerKind) -> Self {
        let attr = AttributeDescriptor {
            collection: Some(container),
            ..AttributeDescriptor::reference(name, self.next_slot(), target)
        };
        self.push(attr)
    }

    /// Name the document schema this type binds to.
    pub fn backed_by(mut self, schema: &str) -> Self {
        self.descriptor.backing_schema = Some(schema.to_string());
        self
    }

    pub fn build(self) -> SchemaDescriptor {
        self.descriptor
    }
}
