//! Merging a planned subgraph into managed instances.

use std::collections::HashMap;
use std::sync::Arc;

use dynent_cache::IdentityCache;
use dynent_entity::{DynamicEntity, EntityIdentity, EntityRef, Value};
use dynent_schema::EntityType;
use dynent_types::PrimaryKey;
use tracing::debug;

use crate::error::{FetchError, FetchResult};
use crate::plan::{FetchItem, FetchPlan};
use crate::traversal::{Traversal, TraversalState};

/// Deepest relationship level at which composite-key types are merged.
pub const DEFAULT_MAX_MERGE_DEPTH: usize = 2;

/// Where merged values land: the set of managed instances, addressed by key.
pub trait MergeContext {
    /// The managed instance of `key`, if there is one.
    fn find(&self, type_name: &str, key: &PrimaryKey) -> FetchResult<Option<EntityRef>>;

    /// A new managed instance, before its key is set.
    fn instantiate(&self, entity_type: &Arc<EntityType>) -> FetchResult<EntityRef> {
        Ok(DynamicEntity::new(entity_type))
    }

    /// Start managing `entity` under `key`.
    fn register(&self, entity: &EntityRef, key: &PrimaryKey) -> FetchResult<()>;
}

impl MergeContext for IdentityCache {
    fn find(&self, type_name: &str, key: &PrimaryKey) -> FetchResult<Option<EntityRef>> {
        Ok(self.lookup(type_name, key).instance().cloned())
    }

    fn register(&self, entity: &EntityRef, key: &PrimaryKey) -> FetchResult<()> {
        self.put(entity.type_name(), key.clone(), Arc::clone(entity));
        Ok(())
    }
}

struct Merger<'c> {
    context: &'c dyn MergeContext,
    max_depth: usize,
    // Source handles are held so their identities stay unique.
    merged: HashMap<EntityIdentity, (EntityRef, EntityRef)>,
    association_plans: HashMap<String, Arc<FetchPlan>>,
}

impl<'c> Merger<'c> {
    fn new(context: &'c dyn MergeContext, max_depth: usize) -> Self {
        Self {
            context,
            max_depth,
            merged: HashMap::new(),
            association_plans: HashMap::new(),
        }
    }

    fn merge(&mut self, plan: &FetchPlan, source: &EntityRef, depth: usize) -> FetchResult<EntityRef> {
        let identity = DynamicEntity::identity(source);
        if let Some((_, target)) = self.merged.get(&identity) {
            return Ok(Arc::clone(target));
        }
        let entity_type = plan.bound_type()?;
        if entity_type.name() != source.type_name() {
            return Err(FetchError::WrongType {
                expected: entity_type.name().to_string(),
                found: source.type_name().to_string(),
            });
        }
        if !entity_type.has_key() {
            return Err(FetchError::UnsupportedOperation(format!(
                "cannot merge {}: the type has no primary key",
                entity_type.name()
            )));
        }
        if entity_type.has_composite_key() && depth > self.max_depth {
            return Err(FetchError::UnsupportedOperation(format!(
                "cannot merge {} at relationship depth {depth}: composite-key \
                 relationships are merged at most {} levels deep",
                entity_type.name(),
                self.max_depth
            )));
        }
        let key = source
            .primary_key()?
            .ok_or_else(|| FetchError::MissingKey {
                type_name: entity_type.name().to_string(),
            })?;

        let target = match self.context.find(entity_type.name(), &key)? {
            Some(existing) => existing,
            None => {
                let created = self.context.instantiate(entity_type)?;
                for &slot in entity_type.key_slots() {
                    if let Some(value) = source.get(slot)? {
                        created.set(slot, value)?;
                    }
                }
                self.context.register(&created, &key)?;
                debug!(entity_type = entity_type.name(), %key, "registered merge target");
                created
            }
        };
        self.merged
            .insert(identity, (Arc::clone(source), Arc::clone(&target)));
        if Arc::ptr_eq(source, &target) {
            return Ok(target);
        }

        let fetch_group = source.as_fetch_group_tracking();
        for item in plan.items() {
            let Some(slot) = item.slot() else {
                continue;
            };
            if entity_type.key_slots().contains(&slot) {
                continue;
            }
            if fetch_group.is_some_and(|group| !group.is_attribute_fetched(item.name())) {
                continue;
            }
            match source.get(slot)? {
                None => target.unset(slot)?,
                Some(Value::Scalar(scalar)) => target.set(slot, scalar)?,
                Some(Value::Entity(related)) => {
                    let associated = self.associate(item, &related, depth + 1)?;
                    target.set(slot, associated)?;
                }
                Some(Value::Collection(elements)) => {
                    let mut mapped = Vec::new();
                    for element in elements.to_vec()? {
                        mapped.push(match element {
                            Value::Entity(related) => {
                                Value::Entity(self.associate(item, &related, depth + 1)?)
                            }
                            other => other,
                        });
                    }
                    let Some(Value::Collection(destination)) = target.get(slot)? else {
                        continue;
                    };
                    destination.clear()?;
                    for value in mapped {
                        if !destination.contains(&value)? {
                            destination.push(value)?;
                        }
                    }
                }
            }
        }
        Ok(target)
    }

    /// Resolve a related instance to its managed counterpart: merged with the
    /// item's nested plan, or matched by key alone without writing any
    /// attribute of the counterpart.
    fn associate(
        &mut self,
        item: &FetchItem,
        related: &EntityRef,
        depth: usize,
    ) -> FetchResult<EntityRef> {
        match item.nested() {
            Some(nested) => self.merge(nested, related, depth),
            None => {
                let plan = self.association_plan(related.entity_type());
                self.merge(&plan, related, depth)
            }
        }
    }

    fn association_plan(&mut self, entity_type: &Arc<EntityType>) -> Arc<FetchPlan> {
        Arc::clone(
            self.association_plans
                .entry(entity_type.name().to_string())
                .or_insert_with(|| Arc::new(FetchPlan::association(entity_type))),
        )
    }
}

impl FetchPlan {
    /// Apply the planned part of `source` onto its managed counterpart in
    /// `context`, returning the counterpart.
    pub fn merge(&self, source: &EntityRef, context: &dyn MergeContext) -> FetchResult<EntityRef> {
        self.merge_with_depth(source, context, DEFAULT_MAX_MERGE_DEPTH)
    }

    /// [`merge`](Self::merge) with an explicit composite-key depth limit.
    pub fn merge_with_depth(
        &self,
        source: &EntityRef,
        context: &dyn MergeContext,
        max_depth: usize,
    ) -> FetchResult<EntityRef> {
        let traversal = Traversal::begin(self, TraversalState::Merging)?;
        let mut merger = Merger::new(context, max_depth);
        let target = merger.merge(self, source, 0)?;
        traversal.finish(merger.merged.len(), 0)?;
        Ok(target)
    }

    /// Merge several sources with one shared identity map.
    pub fn merge_all(
        &self,
        sources: &[EntityRef],
        context: &dyn MergeContext,
        max_depth: usize,
    ) -> FetchResult<Vec<EntityRef>> {
        let traversal = Traversal::begin(self, TraversalState::Merging)?;
        let mut merger = Merger::new(context, max_depth);
        let targets = sources
            .iter()
            .map(|source| merger.merge(self, source, 0))
            .collect::<FetchResult<Vec<_>>>()?;
        traversal.finish(merger.merged.len(), 0)?;
        Ok(targets)
    }
}
