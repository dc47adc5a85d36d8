//! Fetch plan structure and type binding.

use std::collections::BTreeMap;
use std::sync::Arc;

use dynent_schema::{EntityType, SchemaError, TypeRegistry};
use tracing::debug;

use crate::error::{FetchError, FetchResult};

/// One attribute of a plan, optionally with a plan for the entities it
/// references.
#[derive(Clone, Debug)]
pub struct FetchItem {
    name: String,
    slot: Option<usize>,
    nested: Option<FetchPlan>,
    auto_added: bool,
}

impl FetchItem {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            slot: None,
            nested: None,
            auto_added: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Slot of the attribute in the bound type; `None` until initialized.
    pub fn slot(&self) -> Option<usize> {
        self.slot
    }

    pub fn nested(&self) -> Option<&FetchPlan> {
        self.nested.as_ref()
    }

    /// Whether the item was added by initialization rather than by the caller.
    pub fn is_auto_added(&self) -> bool {
        self.auto_added
    }
}

/// A reusable description of which attributes of a type, and transitively
/// of the types it references, a traversal must visit.
///
/// Items are named by attribute; dotted names (`"manager.name"`) build nested
/// plans implicitly. Names are only checked by [`FetchPlan::initialize`],
/// which binds the plan to an entity type. Any later edit unbinds it again.
#[derive(Clone, Debug)]
pub struct FetchPlan {
    items: BTreeMap<String, FetchItem>,
    auto_add_keys: bool,
    entity_type: Option<Arc<EntityType>>,
}

impl Default for FetchPlan {
    fn default() -> Self {
        Self::new()
    }
}

impl FetchPlan {
    /// An empty plan that adds key and version attributes on initialize.
    pub fn new() -> Self {
        Self {
            items: BTreeMap::new(),
            auto_add_keys: true,
            entity_type: None,
        }
    }

    /// An empty plan that only ever holds the attributes added to it.
    pub fn without_auto_keys() -> Self {
        Self {
            auto_add_keys: false,
            ..Self::new()
        }
    }

    pub(crate) fn with_auto_keys(auto_add_keys: bool) -> Self {
        Self {
            auto_add_keys,
            ..Self::new()
        }
    }

    /// A bound plan holding every attribute of `entity_type`, without nesting.
    pub fn full(entity_type: &Arc<EntityType>) -> Self {
        let mut plan = Self::new();
        for attribute in entity_type.attributes() {
            let mut item = FetchItem::new(&attribute.name);
            item.slot = Some(attribute.slot);
            plan.items.insert(attribute.name.clone(), item);
        }
        plan.entity_type = Some(Arc::clone(entity_type));
        plan
    }

    /// A bound plan holding only the key and version attributes.
    pub fn key_only(entity_type: &Arc<EntityType>) -> Self {
        let mut plan = Self::new();
        plan.add_identifying(entity_type);
        plan.entity_type = Some(Arc::clone(entity_type));
        plan
    }

    /// A bound plan holding only the key attributes. Merging through it
    /// matches or registers the managed instance and writes nothing else.
    pub(crate) fn association(entity_type: &Arc<EntityType>) -> Self {
        let mut plan = Self::without_auto_keys();
        for attribute in entity_type.key_attributes() {
            plan.items.insert(
                attribute.name.clone(),
                FetchItem {
                    slot: Some(attribute.slot),
                    auto_added: true,
                    ..FetchItem::new(&attribute.name)
                },
            );
        }
        plan.entity_type = Some(Arc::clone(entity_type));
        plan
    }

    pub fn auto_adds_keys(&self) -> bool {
        self.auto_add_keys
    }

    /// Add an attribute, or a dotted path of them. Returns `self` for chaining.
    pub fn add_attribute(&mut self, path: &str) -> &mut Self {
        self.entity_type = None;
        let (head, rest) = split(path);
        let auto_add_keys = self.auto_add_keys;
        let item = self
            .items
            .entry(head.to_string())
            .or_insert_with(|| FetchItem::new(head));
        item.auto_added = false;
        if let Some(rest) = rest {
            item.nested
                .get_or_insert_with(|| Self::with_auto_keys(auto_add_keys))
                .add_attribute(rest);
        }
        self
    }

    /// Attach `plan` to the entities reached through `name`, replacing any
    /// nested plan already there.
    pub fn add_nested(&mut self, name: &str, plan: FetchPlan) -> &mut Self {
        self.entity_type = None;
        let item = self
            .items
            .entry(name.to_string())
            .or_insert_with(|| FetchItem::new(name));
        item.auto_added = false;
        item.nested = Some(plan);
        self
    }

    /// Remove an attribute or a dotted path. Returns `true` if it was present.
    pub fn remove_attribute(&mut self, path: &str) -> bool {
        let (head, rest) = split(path);
        let removed = match rest {
            None => self.items.remove(head).is_some(),
            Some(rest) => self
                .items
                .get_mut(head)
                .and_then(|item| item.nested.as_mut())
                .is_some_and(|nested| nested.remove_attribute(rest)),
        };
        if removed {
            self.entity_type = None;
        }
        removed
    }

    /// Whether the plan holds an attribute or a dotted path, including
    /// attributes added by initialization.
    pub fn contains_attribute(&self, path: &str) -> bool {
        let (head, rest) = split(path);
        match (self.items.get(head), rest) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(item), Some(rest)) => item
                .nested
                .as_ref()
                .is_some_and(|nested| nested.contains_attribute(rest)),
        }
    }

    pub fn item(&self, name: &str) -> Option<&FetchItem> {
        self.items.get(name)
    }

    /// Items in name order.
    pub fn items(&self) -> impl Iterator<Item = &FetchItem> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_initialized(&self) -> bool {
        self.entity_type.is_some()
    }

    /// The type the plan is bound to.
    pub fn entity_type(&self) -> Option<&Arc<EntityType>> {
        self.entity_type.as_ref()
    }

    /// Bind the plan to `type_name`, resolving every item and initializing
    /// nested plans against the referenced types.
    ///
    /// On failure the plan is left exactly as it was.
    pub fn initialize(&mut self, registry: &TypeRegistry, type_name: &str) -> FetchResult<()> {
        let entity_type = registry.get_type(type_name).map_err(|err| match err {
            SchemaError::TypeNotFound(name) => FetchError::UnknownType(name),
            other => other.into(),
        })?;

        let mut bound = Self {
            items: self.items.clone(),
            auto_add_keys: self.auto_add_keys,
            entity_type: None,
        };
        // Identifying attributes of a previous binding may not exist here.
        bound.items.retain(|_, item| !item.auto_added);

        for item in bound.items.values_mut() {
            let attribute = entity_type.attribute_named(&item.name).ok_or_else(|| {
                FetchError::UnmappedAttribute {
                    type_name: type_name.to_string(),
                    attribute: item.name.clone(),
                }
            })?;
            item.slot = Some(attribute.slot);
            if let Some(nested) = item.nested.as_mut() {
                let target = match (&attribute.referenced_type, attribute.is_relationship()) {
                    (Some(target), true) => target,
                    _ => {
                        return Err(FetchError::NotARelationship {
                            type_name: type_name.to_string(),
                            attribute: item.name.clone(),
                        })
                    }
                };
                nested.initialize(registry, target)?;
            }
        }
        if bound.auto_add_keys {
            bound.add_identifying(&entity_type);
        }

        debug!(
            entity_type = type_name,
            items = bound.items.len(),
            "initialized fetch plan"
        );
        bound.entity_type = Some(entity_type);
        *self = bound;
        Ok(())
    }

    fn add_identifying(&mut self, entity_type: &EntityType) {
        let identifying = entity_type
            .key_attributes()
            .into_iter()
            .chain(entity_type.version_attribute());
        for attribute in identifying {
            self.items
                .entry(attribute.name.clone())
                .or_insert_with(|| FetchItem {
                    slot: Some(attribute.slot),
                    auto_added: true,
                    ..FetchItem::new(&attribute.name)
                });
        }
    }

    /// Slots of every item, in name order. Only meaningful once bound.
    pub(crate) fn slots(&self) -> Vec<usize> {
        self.items.values().filter_map(|item| item.slot).collect()
    }

    /// The bound type, or `NotInitialized`.
    pub(crate) fn bound_type(&self) -> FetchResult<&Arc<EntityType>> {
        self.entity_type.as_ref().ok_or(FetchError::NotInitialized)
    }
}

fn split(path: &str) -> (&str, Option<&str>) {
    match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    }
}
