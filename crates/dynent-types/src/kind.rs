use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// The declared kind of the values an attribute holds.
///
/// For collection attributes this is the element kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    Text,
    Bytes,
    /// A reference to another entity.
    Reference,
}

impl ValueKind {
    /// Returns `true` for every kind except [`ValueKind::Reference`].
    pub fn is_scalar(self) -> bool {
        !matches!(self, ValueKind::Reference)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Text => "text",
            ValueKind::Bytes => "bytes",
            ValueKind::Reference => "reference",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueKind {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bool" => Ok(ValueKind::Bool),
            "int" => Ok(ValueKind::Int),
            "float" => Ok(ValueKind::Float),
            "text" | "string" => Ok(ValueKind::Text),
            "bytes" => Ok(ValueKind::Bytes),
            "reference" | "ref" => Ok(ValueKind::Reference),
            other => Err(TypeError::UnknownKind(other.to_string())),
        }
    }
}

/// The container used by a collection attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerKind {
    /// Ordered, duplicates allowed.
    List,
    /// Insertion-ordered, duplicates rejected.
    Set,
}

impl ContainerKind {
    /// Whether this container refuses a second copy of an equal element.
    pub fn rejects_duplicates(self) -> bool {
        matches!(self, ContainerKind::Set)
    }
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerKind::List => f.write_str("list"),
            ContainerKind::Set => f.write_str("set"),
        }
    }
}

impl FromStr for ContainerKind {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "list" => Ok(ContainerKind::List),
            "set" => Ok(ContainerKind::Set),
            other => Err(TypeError::UnknownContainer(other.to_string())),
        }
    }
}

/// The four attribute shapes an entity type can declare.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttributeShape {
    Scalar,
    Reference,
    ScalarCollection,
    ReferenceCollection,
}

impl AttributeShape {
    /// Derive the shape from a value kind and an optional container.
    pub fn of(kind: ValueKind, container: Option<ContainerKind>) -> Self {
        match (kind.is_scalar(), container.is_some()) {
            (true, false) => AttributeShape::Scalar,
            (false, false) => AttributeShape::Reference,
            (true, true) => AttributeShape::ScalarCollection,
            (false, true) => AttributeShape::ReferenceCollection,
        }
    }

    /// Returns `true` for references and reference collections.
    pub fn is_relationship(self) -> bool {
        matches!(
            self,
            AttributeShape::Reference | AttributeShape::ReferenceCollection
        )
    }

    pub fn is_collection(self) -> bool {
        matches!(
            self,
            AttributeShape::ScalarCollection | AttributeShape::ReferenceCollection
        )
    }
}
