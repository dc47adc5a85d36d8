use crate::entity::DynamicEntity;
use crate::value::Value;

/// Where a change came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// A `set`/`unset` on the entity itself.
    Local,
    /// A change observed on the backing representation.
    Backing,
}

/// A single attribute change.
///
/// `old` and `new` are `None` when the attribute was absent or not yet
/// loaded.
#[derive(Clone, Debug)]
pub struct ChangeEvent {
    pub attribute: String,
    pub slot: usize,
    pub old: Option<Value>,
    pub new: Option<Value>,
    pub origin: ChangeOrigin,
}

/// Receives change notifications synchronously, before `set`/`unset` returns.
pub trait ChangeListener: Send + Sync {
    fn attribute_changed(&self, entity: &DynamicEntity, event: &ChangeEvent);
}

impl<F> ChangeListener for F
where
    F: Fn(&DynamicEntity, &ChangeEvent) + Send + Sync,
{
    fn attribute_changed(&self, entity: &DynamicEntity, event: &ChangeEvent) {
        self(entity, event);
    }
}

/// Handle returned when registering a listener, used to remove it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);
