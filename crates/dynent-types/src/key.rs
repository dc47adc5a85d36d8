use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::scalar::Scalar;

/// The ordered values of an instance's key attributes.
///
/// A key is one or more named attributes whose concatenated values uniquely
/// identify an instance within its type. Order follows the declaration order
/// of the key attributes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrimaryKey(Vec<Scalar>);

impl PrimaryKey {
    /// Build a key from its component values.
    pub fn new(values: Vec<Scalar>) -> Result<Self, TypeError> {
        if values.is_empty() {
            return Err(TypeError::EmptyKey);
        }
        Ok(Self(values))
    }

    /// A single-attribute key.
    pub fn single(value: impl Into<Scalar>) -> Self {
        Self(vec![value.into()])
    }

    pub fn values(&self) -> &[Scalar] {
        &self.0
    }

    /// Number of key components.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` when the key is made of more than one attribute.
    pub fn is_composite(&self) -> bool {
        self.0.len() > 1
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{v}")?;
        }
        f.write_str("]")
    }
}

impl From<i64> for PrimaryKey {
    fn from(v: i64) -> Self {
        Self::single(v)
    }
}

impl From<&str> for PrimaryKey {
    fn from(v: &str) -> Self {
        Self::single(v)
    }
}
