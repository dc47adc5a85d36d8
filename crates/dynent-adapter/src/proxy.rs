use std::sync::Weak;

use dynent_document::{DocPath, Document, DocumentResult};
use dynent_entity::{CollectionStorage, EntityError, EntityResult, Value};

use crate::adapter::ValueStoreAdapter;
use crate::error::AdapterError;

/// Collection storage that passes every operation through to a document
/// list, wrapping nested documents on the way out and unwrapping entities
/// on the way in.
pub(crate) struct DocumentList {
    pub(crate) adapter: Weak<ValueStoreAdapter>,
    pub(crate) document: Document,
    pub(crate) path: DocPath,
}

fn doc<T>(result: DocumentResult<T>) -> EntityResult<T> {
    result.map_err(|err| AdapterError::from(err).into())
}

impl DocumentList {
    fn adapter(&self) -> Result<std::sync::Arc<ValueStoreAdapter>, AdapterError> {
        self.adapter.upgrade().ok_or(AdapterError::Detached)
    }
}

impl CollectionStorage for DocumentList {
    fn len(&self) -> EntityResult<usize> {
        doc(self.document.list_len(&self.path))
    }

    fn get(&self, index: usize) -> EntityResult<Option<Value>> {
        match doc(self.document.list_get(&self.path, index))? {
            Some(element) => Ok(Some(self.adapter()?.to_value(&self.path, element)?)),
            None => Ok(None),
        }
    }

    fn to_vec(&self) -> EntityResult<Vec<Value>> {
        let adapter = self.adapter()?;
        doc(self.document.list(&self.path))?
            .into_iter()
            .map(|element| adapter.to_value(&self.path, element).map_err(EntityError::from))
            .collect()
    }

    fn push(&self, value: Value) -> EntityResult<()> {
        let element = self.adapter()?.to_doc_value(&value)?;
        doc(self.document.list_push(&self.path, element))
    }

    fn remove_at(&self, index: usize) -> EntityResult<Value> {
        let removed = doc(self.document.list_remove(&self.path, index))?;
        Ok(self.adapter()?.to_value(&self.path, removed)?)
    }

    fn clear(&self) -> EntityResult<()> {
        doc(self.document.list_clear(&self.path))
    }

    fn is_proxy(&self) -> bool {
        true
    }
}
