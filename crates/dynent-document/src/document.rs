//! Documents: field values stored by path, with observers and deferred fields.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use dynent_types::{PrimaryKey, Scalar};
use tracing::debug;

use crate::error::{DocumentError, DocumentResult};
use crate::schema::{DocPath, DocSchema, NodeKind, SchemaNode};
use crate::traits::StoreDriver;

static NEXT_DOCUMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a document, never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentId(u64);

impl DocumentId {
    fn next() -> Self {
        Self(NEXT_DOCUMENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "doc#{}", self.0)
    }
}

/// Content of one document field.
#[derive(Clone, Debug, PartialEq)]
pub enum DocValue {
    Scalar(Scalar),
    /// A nested document, shared by handle.
    Node(Document),
    List(Vec<DocValue>),
    /// Not yet read from the document's source.
    Deferred,
}

impl DocValue {
    pub fn as_node(&self) -> Option<&Document> {
        match self {
            DocValue::Node(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            DocValue::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, DocValue::Deferred)
    }

    /// Short description used in shape errors.
    pub fn describe(&self) -> String {
        match self {
            DocValue::Scalar(s) => s.kind().to_string(),
            DocValue::Node(d) => format!("document {}", d.schema().name),
            DocValue::List(items) => format!("list of {} items", items.len()),
            DocValue::Deferred => "deferred".to_string(),
        }
    }
}

impl From<Scalar> for DocValue {
    fn from(s: Scalar) -> Self {
        DocValue::Scalar(s)
    }
}

impl From<Document> for DocValue {
    fn from(d: Document) -> Self {
        DocValue::Node(d)
    }
}

/// Where a document's deferred fields are read from.
#[derive(Clone)]
pub struct DocumentSource {
    pub driver: Arc<dyn StoreDriver>,
    pub key: PrimaryKey,
}

impl fmt::Debug for DocumentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentSource").field("key", &self.key).finish()
    }
}

/// A field change reported to observers.
#[derive(Clone, Debug)]
pub struct DocChange {
    pub path: DocPath,
    pub old: Option<DocValue>,
    pub new: Option<DocValue>,
}

/// Receives document changes synchronously, after the change is applied.
pub trait DocumentObserver: Send + Sync {
    fn field_changed(&self, document: &Document, change: &DocChange);
}

impl<F> DocumentObserver for F
where
    F: Fn(&Document, &DocChange) + Send + Sync,
{
    fn field_changed(&self, document: &Document, change: &DocChange) {
        self(document, change);
    }
}

/// Handle returned by [`Document::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

struct DocumentInner {
    id: DocumentId,
    schema: Arc<DocSchema>,
    fields: RwLock<BTreeMap<DocPath, DocValue>>,
    observers: RwLock<Vec<(ObserverId, Arc<dyn DocumentObserver>)>>,
    next_observer: AtomicU64,
    source: Option<DocumentSource>,
}

/// A tree-structured document. Cloning shares the document.
#[derive(Clone)]
pub struct Document(Arc<DocumentInner>);

impl Document {
    /// A new, empty document with no backing source.
    pub fn new(schema: Arc<DocSchema>) -> Self {
        Self::build(schema, None)
    }

    /// A new document whose deferred fields are read from `source`.
    pub fn with_source(schema: Arc<DocSchema>, source: DocumentSource) -> Self {
        Self::build(schema, Some(source))
    }

    fn build(schema: Arc<DocSchema>, source: Option<DocumentSource>) -> Self {
        Self(Arc::new(DocumentInner {
            id: DocumentId::next(),
            schema,
            fields: RwLock::new(BTreeMap::new()),
            observers: RwLock::new(Vec::new()),
            next_observer: AtomicU64::new(0),
            source,
        }))
    }

    pub fn id(&self) -> DocumentId {
        self.0.id
    }

    pub fn schema(&self) -> &Arc<DocSchema> {
        &self.0.schema
    }

    pub fn source(&self) -> Option<&DocumentSource> {
        self.0.source.as_ref()
    }

    /// Returns `true` if both handles refer to the same document.
    pub fn same(&self, other: &Document) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn leaf(&self, path: &DocPath) -> DocumentResult<&SchemaNode> {
        match self.0.schema.node(path) {
            Some(node) if node.kind.is_leaf() => Ok(node),
            _ => Err(DocumentError::UnknownPath {
                schema: self.0.schema.name.clone(),
                path: path.clone(),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Field access
    // -----------------------------------------------------------------------

    /// Raw field content; deferred fields are returned as [`DocValue::Deferred`].
    pub fn get(&self, path: &DocPath) -> DocumentResult<Option<DocValue>> {
        self.leaf(path)?;
        Ok(self.0.fields.read().expect("lock poisoned").get(path).cloned())
    }

    /// Field content, reading a deferred field from the source first.
    ///
    /// The value read replaces the deferred marker, so later calls do not
    /// touch the driver. Observers are not notified.
    pub fn resolve(&self, path: &DocPath) -> DocumentResult<Option<DocValue>> {
        match self.get(path)? {
            Some(DocValue::Deferred) => {}
            other => return Ok(other),
        }

        let source = self.0.source.as_ref().ok_or_else(|| DocumentError::NoSource {
            schema: self.0.schema.name.clone(),
        })?;
        // Driver I/O happens without holding the field lock.
        let loaded = source
            .driver
            .read(&self.0.schema.name, &source.key, path)
            .map_err(DocumentError::Driver)?;
        debug!(document = %self.id(), %path, present = loaded.is_some(), "resolved deferred field");

        let mut fields = self.0.fields.write().expect("lock poisoned");
        if !matches!(fields.get(path), Some(DocValue::Deferred)) {
            // Written concurrently while we were reading; keep the newer value.
            return Ok(fields.get(path).cloned());
        }
        match &loaded {
            Some(value) => fields.insert(path.clone(), value.clone()),
            None => fields.remove(path),
        };
        Ok(loaded)
    }

    /// Whether the field holds anything other than a deferred marker.
    pub fn is_materialized(&self, path: &DocPath) -> bool {
        !matches!(
            self.0.fields.read().expect("lock poisoned").get(path),
            Some(DocValue::Deferred)
        )
    }

    /// Write a field and notify observers. Returns the previous content.
    pub fn set(&self, path: &DocPath, value: DocValue) -> DocumentResult<Option<DocValue>> {
        let node = self.leaf(path)?;
        check_field(path, &node.kind, &value)?;
        let old = self
            .0
            .fields
            .write()
            .expect("lock poisoned")
            .insert(path.clone(), value.clone());
        self.notify(path, old.clone(), Some(value));
        Ok(old)
    }

    /// Clear a field and notify observers. Returns the previous content.
    pub fn remove(&self, path: &DocPath) -> DocumentResult<Option<DocValue>> {
        self.leaf(path)?;
        let old = self.0.fields.write().expect("lock poisoned").remove(path);
        if old.is_some() {
            self.notify(path, old.clone(), None);
        }
        Ok(old)
    }

    /// Paths of all fields currently holding content.
    pub fn paths(&self) -> Vec<DocPath> {
        self.0.fields.read().expect("lock poisoned").keys().cloned().collect()
    }

    // -----------------------------------------------------------------------
    // List fields
    // -----------------------------------------------------------------------

    fn list_node(&self, path: &DocPath) -> DocumentResult<&SchemaNode> {
        let node = self.leaf(path)?;
        if node.kind.is_list() {
            Ok(node)
        } else {
            Err(DocumentError::NotAList { path: path.clone() })
        }
    }

    /// Elements of a list field; an absent list is empty.
    pub fn list(&self, path: &DocPath) -> DocumentResult<Vec<DocValue>> {
        self.list_node(path)?;
        match self.resolve(path)? {
            None => Ok(Vec::new()),
            Some(DocValue::List(items)) => Ok(items),
            Some(_) => Err(DocumentError::NotAList { path: path.clone() }),
        }
    }

    pub fn list_len(&self, path: &DocPath) -> DocumentResult<usize> {
        Ok(self.list(path)?.len())
    }

    pub fn list_get(&self, path: &DocPath, index: usize) -> DocumentResult<Option<DocValue>> {
        Ok(self.list(path)?.get(index).cloned())
    }

    pub fn list_push(&self, path: &DocPath, element: DocValue) -> DocumentResult<()> {
        let node = self.list_node(path)?;
        check_element(path, &node.kind, &element)?;
        self.edit_list(path, |items| {
            items.push(element);
            Ok(())
        })
    }

    pub fn list_remove(&self, path: &DocPath, index: usize) -> DocumentResult<DocValue> {
        let mut removed = None;
        self.edit_list(path, |items| {
            if index >= items.len() {
                return Err(DocumentError::IndexOutOfRange {
                    index,
                    len: items.len(),
                });
            }
            removed = Some(items.remove(index));
            Ok(())
        })?;
        removed.ok_or(DocumentError::IndexOutOfRange { index, len: 0 })
    }

    pub fn list_clear(&self, path: &DocPath) -> DocumentResult<()> {
        self.edit_list(path, |items| {
            items.clear();
            Ok(())
        })
    }

    fn edit_list(
        &self,
        path: &DocPath,
        edit: impl FnOnce(&mut Vec<DocValue>) -> DocumentResult<()>,
    ) -> DocumentResult<()> {
        let before = self.list(path)?;
        let mut after = before.clone();
        edit(&mut after)?;
        self.0
            .fields
            .write()
            .expect("lock poisoned")
            .insert(path.clone(), DocValue::List(after.clone()));
        self.notify(
            path,
            Some(DocValue::List(before)),
            Some(DocValue::List(after)),
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Deferral
    // -----------------------------------------------------------------------

    /// Mark a field as deferred so the next [`resolve`](Self::resolve) reads
    /// it from the source. Observers are not notified.
    pub fn defer(&self, path: &DocPath) -> DocumentResult<()> {
        self.leaf(path)?;
        if self.0.source.is_none() {
            return Err(DocumentError::NoSource {
                schema: self.0.schema.name.clone(),
            });
        }
        self.0
            .fields
            .write()
            .expect("lock poisoned")
            .insert(path.clone(), DocValue::Deferred);
        Ok(())
    }

    /// Defer every leaf of the schema.
    pub fn refresh(&self) -> DocumentResult<()> {
        for (path, _) in self.0.schema.leaves() {
            self.defer(&path)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Observers
    // -----------------------------------------------------------------------

    pub fn subscribe(&self, observer: Arc<dyn DocumentObserver>) -> ObserverId {
        let id = ObserverId(self.0.next_observer.fetch_add(1, Ordering::Relaxed));
        self.0
            .observers
            .write()
            .expect("lock poisoned")
            .push((id, observer));
        id
    }

    /// Returns `true` if the observer was registered.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut observers = self.0.observers.write().expect("lock poisoned");
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    pub fn observer_count(&self) -> usize {
        self.0.observers.read().expect("lock poisoned").len()
    }

    fn notify(&self, path: &DocPath, old: Option<DocValue>, new: Option<DocValue>) {
        let observers: Vec<Arc<dyn DocumentObserver>> = self
            .0
            .observers
            .read()
            .expect("lock poisoned")
            .iter()
            .map(|(_, o)| Arc::clone(o))
            .collect();
        if observers.is_empty() {
            return;
        }
        let change = DocChange {
            path: path.clone(),
            old,
            new,
        };
        for observer in observers {
            observer.field_changed(self, &change);
        }
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("id", &self.0.id)
            .field("schema", &self.0.schema.name)
            .finish()
    }
}

fn mismatch(path: &DocPath, expected: &NodeKind, value: &DocValue) -> DocumentError {
    DocumentError::ShapeMismatch {
        path: path.clone(),
        expected: expected.to_string(),
        found: value.describe(),
    }
}

fn check_field(path: &DocPath, kind: &NodeKind, value: &DocValue) -> DocumentResult<()> {
    match (kind, value) {
        (NodeKind::Value { kind: k }, DocValue::Scalar(s)) if s.kind() == *k => Ok(()),
        (NodeKind::Element { target }, DocValue::Node(d)) if &d.schema().name == target => Ok(()),
        (NodeKind::Values { .. } | NodeKind::Elements { .. }, DocValue::List(items)) => {
            items.iter().try_for_each(|item| check_element(path, kind, item))
        }
        _ => Err(mismatch(path, kind, value)),
    }
}

fn check_element(path: &DocPath, kind: &NodeKind, element: &DocValue) -> DocumentResult<()> {
    match (kind, element) {
        (NodeKind::Values { kind: k }, DocValue::Scalar(s)) if s.kind() == *k => Ok(()),
        (NodeKind::Elements { target }, DocValue::Node(d)) if &d.schema().name == target => Ok(()),
        _ => Err(mismatch(path, kind, element)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStoreDriver;
    use dynent_types::ValueKind;
    use std::sync::Mutex;

    fn schema() -> Arc<DocSchema> {
        Arc::new(DocSchema::new(
            "person-doc",
            vec![
                SchemaNode::value("id", ValueKind::Int),
                SchemaNode::group(
                    "profile",
                    vec![SchemaNode::value("name", ValueKind::Text)],
                ),
                SchemaNode::element("boss", "person-doc"),
                SchemaNode::values("tags", ValueKind::Text),
            ],
        ))
    }

    fn name() -> DocPath {
        DocPath::parse("profile/name")
    }

    // -----------------------------------------------------------------------
    // Identity
    // -----------------------------------------------------------------------

    #[test]
    fn ids_are_unique_and_clones_share() {
        let a = Document::new(schema());
        let b = Document::new(schema());
        assert_ne!(a.id(), b.id());
        assert_ne!(a, b);
        let alias = a.clone();
        assert_eq!(alias, a);
        alias.set(&name(), DocValue::Scalar("x".into())).unwrap();
        assert!(a.get(&name()).unwrap().is_some());
    }

    // -----------------------------------------------------------------------
    // Fields
    // -----------------------------------------------------------------------

    #[test]
    fn set_get_remove() {
        let doc = Document::new(schema());
        assert_eq!(doc.get(&name()).unwrap(), None);
        let old = doc.set(&name(), DocValue::Scalar("Ada".into())).unwrap();
        assert_eq!(old, None);
        assert_eq!(doc.get(&name()).unwrap(), Some(DocValue::Scalar("Ada".into())));
        let removed = doc.remove(&name()).unwrap();
        assert_eq!(removed, Some(DocValue::Scalar("Ada".into())));
        assert_eq!(doc.get(&name()).unwrap(), None);
    }

    #[test]
    fn unknown_paths_and_groups_rejected() {
        let doc = Document::new(schema());
        assert!(matches!(
            doc.get(&DocPath::parse("nope")),
            Err(DocumentError::UnknownPath { .. })
        ));
        assert!(matches!(
            doc.get(&DocPath::parse("profile")),
            Err(DocumentError::UnknownPath { .. })
        ));
    }

    #[test]
    fn shapes_are_checked() {
        let doc = Document::new(schema());
        let err = doc.set(&name(), DocValue::Scalar(Scalar::Int(3))).unwrap_err();
        assert!(matches!(err, DocumentError::ShapeMismatch { .. }));

        let other = Arc::new(DocSchema::new("dept-doc", vec![SchemaNode::value("code", ValueKind::Text)]));
        let dept = Document::new(other);
        assert!(doc.set(&DocPath::parse("boss"), DocValue::Node(dept)).is_err());
        let boss = Document::new(schema());
        doc.set(&DocPath::parse("boss"), DocValue::Node(boss)).unwrap();
    }

    // -----------------------------------------------------------------------
    // Lists
    // -----------------------------------------------------------------------

    #[test]
    fn list_operations() {
        let doc = Document::new(schema());
        let tags = DocPath::parse("tags");
        assert_eq!(doc.list_len(&tags).unwrap(), 0);
        doc.list_push(&tags, DocValue::Scalar("a".into())).unwrap();
        doc.list_push(&tags, DocValue::Scalar("b".into())).unwrap();
        assert_eq!(doc.list_len(&tags).unwrap(), 2);
        assert_eq!(doc.list_get(&tags, 1).unwrap(), Some(DocValue::Scalar("b".into())));
        assert_eq!(doc.list_remove(&tags, 0).unwrap(), DocValue::Scalar("a".into()));
        assert!(matches!(
            doc.list_remove(&tags, 5),
            Err(DocumentError::IndexOutOfRange { index: 5, len: 1 })
        ));
        doc.list_clear(&tags).unwrap();
        assert_eq!(doc.list_len(&tags).unwrap(), 0);
    }

    #[test]
    fn list_ops_on_scalar_field_fail() {
        let doc = Document::new(schema());
        assert!(matches!(doc.list_len(&name()), Err(DocumentError::NotAList { .. })));
        assert!(doc.list_push(&DocPath::parse("tags"), DocValue::Scalar(Scalar::Int(1))).is_err());
    }

    // -----------------------------------------------------------------------
    // Observers
    // -----------------------------------------------------------------------

    #[test]
    fn observers_see_changes() {
        let doc = Document::new(schema());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = doc.subscribe(Arc::new(move |_: &Document, c: &DocChange| {
            sink.lock().unwrap().push(c.path.to_string());
        }));
        doc.set(&name(), DocValue::Scalar("a".into())).unwrap();
        doc.list_push(&DocPath::parse("tags"), DocValue::Scalar("t".into())).unwrap();
        doc.remove(&name()).unwrap();
        // Removing an absent field is silent.
        doc.remove(&name()).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["/profile/name", "/tags", "/profile/name"]);

        assert!(doc.unsubscribe(id));
        assert_eq!(doc.observer_count(), 0);
        doc.set(&name(), DocValue::Scalar("b".into())).unwrap();
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    // -----------------------------------------------------------------------
    // Deferred fields
    // -----------------------------------------------------------------------

    #[test]
    fn deferred_field_reads_once() {
        let driver = Arc::new(InMemoryStoreDriver::new());
        let key = PrimaryKey::from(1);
        driver.insert("person-doc", key.clone(), name(), DocValue::Scalar("Grace".into()));

        let doc = Document::with_source(
            schema(),
            DocumentSource {
                driver: driver.clone(),
                key,
            },
        );
        doc.defer(&name()).unwrap();
        assert!(!doc.is_materialized(&name()));
        assert_eq!(doc.get(&name()).unwrap(), Some(DocValue::Deferred));

        let first = doc.resolve(&name()).unwrap();
        let second = doc.resolve(&name()).unwrap();
        assert_eq!(first, Some(DocValue::Scalar("Grace".into())));
        assert_eq!(first, second);
        assert_eq!(driver.reads(), 1);
        assert!(doc.is_materialized(&name()));
    }

    #[test]
    fn missing_record_field_resolves_absent() {
        let driver = Arc::new(InMemoryStoreDriver::new());
        let doc = Document::with_source(
            schema(),
            DocumentSource {
                driver,
                key: PrimaryKey::from(9),
            },
        );
        doc.refresh().unwrap();
        assert_eq!(doc.resolve(&name()).unwrap(), None);
        assert_eq!(doc.get(&name()).unwrap(), None);
    }

    #[test]
    fn defer_without_source_fails() {
        let doc = Document::new(schema());
        assert!(matches!(doc.defer(&name()), Err(DocumentError::NoSource { .. })));
        assert!(matches!(doc.refresh(), Err(DocumentError::NoSource { .. })));
    }

    #[test]
    fn driver_errors_pass_through() {
        let driver = Arc::new(InMemoryStoreDriver::new());
        let doc = Document::with_source(
            schema(),
            DocumentSource {
                driver: driver.clone(),
                key: PrimaryKey::from(1),
            },
        );
        doc.defer(&name()).unwrap();
        driver.set_offline(true);
        assert!(matches!(doc.resolve(&name()), Err(DocumentError::Driver(_))));
        assert!(!doc.is_materialized(&name()));
        driver.set_offline(false);
        doc.resolve(&name()).unwrap();
        assert!(doc.is_materialized(&name()));
    }
}
