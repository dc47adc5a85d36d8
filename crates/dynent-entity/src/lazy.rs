use std::fmt;
use std::sync::Arc;

use crate::error::EntityResult;
use crate::value::Value;

/// Materialization procedure behind a [`LazyValue`].
///
/// `load` runs synchronously on the calling thread and may block on the
/// backing store. `Ok(None)` means the attribute is genuinely absent.
pub trait LazyLoad: Send + Sync {
    fn load(&self) -> EntityResult<Option<Value>>;
}

impl<F> LazyLoad for F
where
    F: Fn() -> EntityResult<Option<Value>> + Send + Sync,
{
    fn load(&self) -> EntityResult<Option<Value>> {
        self()
    }
}

/// Placeholder for a not-yet-loaded attribute value.
///
/// Stored directly in a [`Slot`] and replaced by the loaded value on the
/// first `get`.
#[derive(Clone)]
pub struct LazyValue(Arc<dyn LazyLoad>);

impl LazyValue {
    pub fn new(loader: impl LazyLoad + 'static) -> Self {
        Self(Arc::new(loader))
    }

    pub fn from_arc(loader: Arc<dyn LazyLoad>) -> Self {
        Self(loader)
    }

    pub fn load(&self) -> EntityResult<Option<Value>> {
        self.0.load()
    }

    /// Returns `true` if both holders share the same loader.
    pub fn same(&self, other: &LazyValue) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for LazyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LazyValue")
    }
}

/// Storage position of one attribute within an entity.
#[derive(Clone, Debug, Default)]
pub enum Slot {
    #[default]
    Unset,
    Value(Value),
    Lazy(LazyValue),
}

impl Slot {
    pub fn is_lazy(&self) -> bool {
        matches!(self, Slot::Lazy(_))
    }

    /// The stored value, if loaded and present.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Slot::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Slot::Value(v) => Some(v),
            _ => None,
        }
    }
}

impl From<Option<Value>> for Slot {
    fn from(value: Option<Value>) -> Self {
        match value {
            Some(v) => Slot::Value(v),
            None => Slot::Unset,
        }
    }
}
