//! Write-through backing and the document-to-entity change bridge.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use dynent_document::{DocChange, Document, DocumentObserver, ObserverId};
use dynent_entity::{DynamicEntity, EntityBacking, EntityError, EntityResult, Value};
use dynent_schema::AttributeDescriptor;

use crate::adapter::ValueStoreAdapter;
use crate::binding::TypeBinding;
use crate::error::AdapterError;

/// Set while an entity writes through, so the bridge does not echo the
/// entity's own change back to it.
struct Quiet<'a>(&'a AtomicBool);

impl<'a> Quiet<'a> {
    fn new(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for Quiet<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// The document behind a wrapped entity.
pub(crate) struct DocumentBacking {
    pub(crate) adapter: Weak<ValueStoreAdapter>,
    pub(crate) document: Document,
    pub(crate) binding: Arc<TypeBinding>,
    pub(crate) writing: Arc<AtomicBool>,
    pub(crate) observer: OnceLock<ObserverId>,
}

impl EntityBacking for DocumentBacking {
    fn write_through(
        &self,
        attribute: &AttributeDescriptor,
        value: Option<&Value>,
    ) -> EntityResult<Option<Value>> {
        let path = self
            .binding
            .path(attribute.slot)
            .ok_or_else(|| EntityError::UnmappedAttribute {
                type_name: self.binding.entity_type().name().to_string(),
                attribute: attribute.name.clone(),
            })?;
        let adapter = self.adapter.upgrade().ok_or(AdapterError::Detached)?;

        // Convert first: a failed unwrap must leave the document untouched.
        let converted = value.map(|v| adapter.to_doc_value(v)).transpose()?;

        let _quiet = Quiet::new(&self.writing);
        let written = match converted {
            Some(doc_value) => self.document.set(path, doc_value),
            None => self.document.remove(path),
        };
        written.map_err(AdapterError::from)?;

        Ok(adapter
            .proxy(&self.document, &self.binding, attribute)
            .map(Value::Collection))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for DocumentBacking {
    fn drop(&mut self) {
        if let Some(id) = self.observer.get() {
            self.document.unsubscribe(*id);
        }
    }
}

/// Re-emits document changes as entity change events.
pub(crate) struct BridgeObserver {
    pub(crate) adapter: Weak<ValueStoreAdapter>,
    pub(crate) entity: Weak<DynamicEntity>,
    pub(crate) binding: Arc<TypeBinding>,
    pub(crate) writing: Arc<AtomicBool>,
}

impl DocumentObserver for BridgeObserver {
    fn field_changed(&self, document: &Document, change: &DocChange) {
        if self.writing.load(Ordering::SeqCst) {
            return;
        }
        let Some(slot) = self.binding.slot_for(&change.path) else {
            return;
        };
        let (Some(entity), Some(adapter)) = (self.entity.upgrade(), self.adapter.upgrade()) else {
            return;
        };
        let content = adapter.observed_slot(document, &self.binding, slot, change.new.clone());
        entity.sync_slot(slot, content);
    }
}
