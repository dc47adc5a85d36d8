//! Collection handles for collection attributes.
//!
//! A [`Collection`] is a cheap, shared handle over a [`CollectionStorage`].
//! Plain entities own a `Vec`-backed storage; a backing representation can
//! supply a proxy storage that passes every operation through to its own
//! collection, element by element.

use std::fmt;
use std::sync::{Arc, RwLock};

use dynent_schema::{AttributeDescriptor, EntityType};
use dynent_types::{ContainerKind, ValueKind};

use crate::error::{EntityError, EntityResult};
use crate::value::{check_element, Value};

/// Storage behind a [`Collection`] handle.
///
/// Implementations receive already-validated elements.
pub trait CollectionStorage: Send + Sync {
    fn len(&self) -> EntityResult<usize>;

    fn get(&self, index: usize) -> EntityResult<Option<Value>>;

    /// Snapshot of all elements.
    fn to_vec(&self) -> EntityResult<Vec<Value>>;

    fn push(&self, value: Value) -> EntityResult<()>;

    fn remove_at(&self, index: usize) -> EntityResult<Value>;

    fn clear(&self) -> EntityResult<()>;

    /// Returns `true` when the storage proxies another representation.
    fn is_proxy(&self) -> bool {
        false
    }
}

/// In-memory storage used by plain entities and detached copies.
#[derive(Default)]
struct VecStorage {
    items: RwLock<Vec<Value>>,
}

impl CollectionStorage for VecStorage {
    fn len(&self) -> EntityResult<usize> {
        Ok(self.items.read().expect("lock poisoned").len())
    }

    fn get(&self, index: usize) -> EntityResult<Option<Value>> {
        Ok(self.items.read().expect("lock poisoned").get(index).cloned())
    }

    fn to_vec(&self) -> EntityResult<Vec<Value>> {
        Ok(self.items.read().expect("lock poisoned").clone())
    }

    fn push(&self, value: Value) -> EntityResult<()> {
        self.items.write().expect("lock poisoned").push(value);
        Ok(())
    }

    fn remove_at(&self, index: usize) -> EntityResult<Value> {
        let mut items = self.items.write().expect("lock poisoned");
        if index >= items.len() {
            return Err(EntityError::IndexOutOfRange {
                index,
                len: items.len(),
            });
        }
        Ok(items.remove(index))
    }

    fn clear(&self) -> EntityResult<()> {
        self.items.write().expect("lock poisoned").clear();
        Ok(())
    }
}

/// What a collection may hold, and whose attribute it belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElementSpec {
    pub owner_type: String,
    pub attribute: String,
    pub kind: ValueKind,
    pub referenced_type: Option<String>,
}

impl ElementSpec {
    /// The element spec of a collection attribute.
    pub fn of(owner: &EntityType, attribute: &AttributeDescriptor) -> Self {
        Self {
            owner_type: owner.name().to_string(),
            attribute: attribute.name.clone(),
            kind: attribute.kind,
            referenced_type: attribute.referenced_type.clone(),
        }
    }

    /// Validate one element against this spec.
    pub fn check(&self, value: &Value) -> EntityResult<()> {
        check_element(
            &self.owner_type,
            &self.attribute,
            self.kind,
            self.referenced_type.as_deref(),
            value,
        )
    }
}

/// Shared handle to the elements of a collection attribute.
#[derive(Clone)]
pub struct Collection {
    container: ContainerKind,
    element: Arc<ElementSpec>,
    storage: Arc<dyn CollectionStorage>,
}

impl Collection {
    /// A new empty, in-memory collection.
    pub fn new(container: ContainerKind, element: ElementSpec) -> Self {
        Self {
            container,
            element: Arc::new(element),
            storage: Arc::new(VecStorage::default()),
        }
    }

    /// A new in-memory collection holding `values`, validated element by element.
    pub fn from_values(
        container: ContainerKind,
        element: ElementSpec,
        values: impl IntoIterator<Item = Value>,
    ) -> EntityResult<Self> {
        let collection = Self::new(container, element);
        for value in values {
            collection.push(value)?;
        }
        Ok(collection)
    }

    /// A collection over caller-supplied storage.
    pub fn with_storage(
        container: ContainerKind,
        element: ElementSpec,
        storage: Arc<dyn CollectionStorage>,
    ) -> Self {
        Self {
            container,
            element: Arc::new(element),
            storage,
        }
    }

    pub fn container(&self) -> ContainerKind {
        self.container
    }

    pub fn element(&self) -> &ElementSpec {
        &self.element
    }

    pub fn is_proxy(&self) -> bool {
        self.storage.is_proxy()
    }

    pub fn len(&self) -> EntityResult<usize> {
        self.storage.len()
    }

    pub fn is_empty(&self) -> EntityResult<bool> {
        Ok(self.storage.len()? == 0)
    }

    pub fn get(&self, index: usize) -> EntityResult<Option<Value>> {
        self.storage.get(index)
    }

    pub fn to_vec(&self) -> EntityResult<Vec<Value>> {
        self.storage.to_vec()
    }

    /// Entities held by a reference collection; other elements are skipped.
    pub fn entities(&self) -> EntityResult<Vec<crate::EntityRef>> {
        Ok(self
            .to_vec()?
            .into_iter()
            .filter_map(|v| match v {
                Value::Entity(e) => Some(e),
                _ => None,
            })
            .collect())
    }

    pub fn contains(&self, value: &Value) -> EntityResult<bool> {
        Ok(self.storage.to_vec()?.iter().any(|v| v == value))
    }

    /// Append an element; sets reject an element equal to one already held.
    pub fn push(&self, value: impl Into<Value>) -> EntityResult<()> {
        let value = value.into();
        self.element.check(&value)?;
        if self.container.rejects_duplicates() && self.contains(&value)? {
            return Err(EntityError::DuplicateElement {
                type_name: self.element.owner_type.clone(),
                attribute: self.element.attribute.clone(),
            });
        }
        self.storage.push(value)
    }

    /// Remove the first element equal to `value`. Returns `true` if one was removed.
    pub fn remove(&self, value: &Value) -> EntityResult<bool> {
        let position = self.storage.to_vec()?.iter().position(|v| v == value);
        match position {
            Some(index) => {
                self.storage.remove_at(index)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn remove_at(&self, index: usize) -> EntityResult<Value> {
        self.storage.remove_at(index)
    }

    pub fn clear(&self) -> EntityResult<()> {
        self.storage.clear()
    }

    /// Returns `true` when both handles share the same storage.
    pub fn same_storage(&self, other: &Collection) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("container", &self.container)
            .field("element", &self.element.kind)
            .field("len", &self.storage.len().ok())
            .field("proxy", &self.storage.is_proxy())
            .finish()
    }
}
