use std::fmt;
use std::sync::Arc;

use dynent_types::{Scalar, ValueKind};

use crate::collection::Collection;
use crate::entity::EntityRef;
use crate::error::{EntityError, EntityResult};

/// The content of a set attribute.
///
/// Entities and collections are shared handles: cloning a `Value` never
/// copies the referenced entity or the collection's elements.
#[derive(Clone)]
pub enum Value {
    Scalar(Scalar),
    Entity(EntityRef),
    Collection(Collection),
}

impl Value {
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Value::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<&EntityRef> {
        match self {
            Value::Entity(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&Collection> {
        match self {
            Value::Collection(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        self.as_scalar().and_then(Scalar::as_int)
    }

    pub fn as_text(&self) -> Option<&str> {
        self.as_scalar().and_then(Scalar::as_text)
    }

    /// Short description used in mismatch errors, e.g. `int` or `entity Person`.
    pub fn describe(&self) -> String {
        match self {
            Value::Scalar(s) => s.kind().to_string(),
            Value::Entity(e) => format!("entity {}", e.type_name()),
            Value::Collection(c) => format!("{} of {}", c.container(), c.element().kind),
        }
    }
}

/// Check that `value` can be stored as one element of kind `kind`.
///
/// `referenced` is the declared target type for reference kinds; matching
/// is by exact type name.
pub(crate) fn check_element(
    type_name: &str,
    attribute: &str,
    kind: ValueKind,
    referenced: Option<&str>,
    value: &Value,
) -> EntityResult<()> {
    let mismatch = || EntityError::TypeMismatch {
        type_name: type_name.to_string(),
        attribute: attribute.to_string(),
        expected: kind.to_string(),
        found: value.describe(),
    };

    match value {
        Value::Scalar(s) if s.kind() == kind => Ok(()),
        Value::Entity(e) if kind == ValueKind::Reference => {
            if Some(e.type_name()) == referenced {
                Ok(())
            } else {
                Err(EntityError::InvalidReferenceType {
                    type_name: type_name.to_string(),
                    attribute: attribute.to_string(),
                    expected: referenced.unwrap_or_default().to_string(),
                    found: e.type_name().to_string(),
                })
            }
        }
        _ => Err(mismatch()),
    }
}

impl PartialEq for Value {
    /// Scalars compare by value; entities and collections by identity.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Scalar(a), Value::Scalar(b)) => a == b,
            (Value::Entity(a), Value::Entity(b)) => Arc::ptr_eq(a, b),
            (Value::Collection(a), Value::Collection(b)) => a.same_storage(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Scalar(s) => write!(f, "Scalar({s})"),
            Value::Entity(e) => write!(f, "Entity({e:?})"),
            Value::Collection(c) => write!(f, "{c:?}"),
        }
    }
}

impl From<Scalar> for Value {
    fn from(v: Scalar) -> Self {
        Value::Scalar(v)
    }
}

impl From<EntityRef> for Value {
    fn from(v: EntityRef) -> Self {
        Value::Entity(v)
    }
}

impl From<&EntityRef> for Value {
    fn from(v: &EntityRef) -> Self {
        Value::Entity(Arc::clone(v))
    }
}

impl From<Collection> for Value {
    fn from(v: Collection) -> Self {
        Value::Collection(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Scalar(Scalar::Int(v))
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Scalar(Scalar::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Scalar(Scalar::Float(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Scalar(Scalar::Bool(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Scalar(Scalar::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Scalar(Scalar::Text(v))
    }
}
