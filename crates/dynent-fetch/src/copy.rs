//! Copying a planned subgraph into detached instances.

use std::collections::HashMap;
use std::sync::Arc;

use dynent_entity::{DynamicEntity, EntityIdentity, EntityRef, Value};
use dynent_schema::EntityType;

use crate::error::{FetchError, FetchResult};
use crate::plan::{FetchItem, FetchPlan};
use crate::traversal::{Traversal, TraversalState};

/// Identity map of one copy traversal.
#[derive(Default)]
struct Copier {
    // Source handles are held so their identities stay unique.
    copies: HashMap<EntityIdentity, (EntityRef, EntityRef)>,
    full_plans: HashMap<String, Arc<FetchPlan>>,
}

impl Copier {
    fn copy(&mut self, plan: &FetchPlan, source: &EntityRef) -> FetchResult<EntityRef> {
        let identity = DynamicEntity::identity(source);
        if let Some((_, copy)) = self.copies.get(&identity) {
            return Ok(Arc::clone(copy));
        }
        let entity_type = plan.bound_type()?;
        if entity_type.name() != source.type_name() {
            return Err(FetchError::WrongType {
                expected: entity_type.name().to_string(),
                found: source.type_name().to_string(),
            });
        }

        let copy = DynamicEntity::new(source.entity_type());
        self.copies
            .insert(identity, (Arc::clone(source), Arc::clone(&copy)));

        for item in plan.items() {
            let Some(slot) = item.slot() else {
                continue;
            };
            match source.get(slot)? {
                None => {}
                Some(Value::Scalar(scalar)) => copy.set(slot, scalar)?,
                Some(Value::Entity(target)) => {
                    let copied = self.copy_reference(item, &target)?;
                    copy.set(slot, copied)?;
                }
                Some(Value::Collection(elements)) => {
                    let Some(Value::Collection(destination)) = copy.get(slot)? else {
                        continue;
                    };
                    for element in elements.to_vec()? {
                        match element {
                            Value::Entity(target) => {
                                destination.push(self.copy_reference(item, &target)?)?
                            }
                            other => destination.push(other)?,
                        }
                    }
                }
            }
        }
        copy.track_fetch_group(plan.slots());
        Ok(copy)
    }

    /// Copy an entity reached through `item`: with its nested plan, or
    /// whole when the item has none.
    fn copy_reference(&mut self, item: &FetchItem, target: &EntityRef) -> FetchResult<EntityRef> {
        match item.nested() {
            Some(nested) => self.copy(nested, target),
            None => {
                let plan = self.full_plan(target.entity_type());
                self.copy(&plan, target)
            }
        }
    }

    fn full_plan(&mut self, entity_type: &Arc<EntityType>) -> Arc<FetchPlan> {
        Arc::clone(
            self.full_plans
                .entry(entity_type.name().to_string())
                .or_insert_with(|| Arc::new(FetchPlan::full(entity_type))),
        )
    }
}

impl FetchPlan {
    /// Copy the planned part of `source` into detached instances.
    ///
    /// Every source instance reached is copied exactly once, so shared and
    /// cyclic references in the source graph are shared and cyclic in the
    /// copy. Copies record the attributes they carry as their fetch group.
    pub fn copy(&self, source: &EntityRef) -> FetchResult<EntityRef> {
        let traversal = Traversal::begin(self, TraversalState::Copying)?;
        let mut copier = Copier::default();
        let copy = copier.copy(self, source)?;
        traversal.finish(copier.copies.len(), 0)?;
        Ok(copy)
    }

    /// Copy several sources with one shared identity map.
    pub fn copy_all(&self, sources: &[EntityRef]) -> FetchResult<Vec<EntityRef>> {
        let traversal = Traversal::begin(self, TraversalState::Copying)?;
        let mut copier = Copier::default();
        let copies = sources
            .iter()
            .map(|source| copier.copy(self, source))
            .collect::<FetchResult<Vec<_>>>()?;
        traversal.finish(copier.copies.len(), 0)?;
        Ok(copies)
    }
}
