//! Traversal state, context and the fetch operation.
//!
//! A fetch walks the plan breadth-first with a visited set keyed by
//! `(instance, plan node)`, so cycles in the entity graph terminate and an
//! instance reached twice through the same nested plan is only visited once.

use std::collections::{HashSet, VecDeque};
use std::fmt;

use dynent_cache::IdentityCache;
use dynent_entity::{DynamicEntity, EntityIdentity, EntityRef, Reload, Value};
use tracing::debug;

use crate::error::{FetchError, FetchResult};
use crate::plan::{FetchItem, FetchPlan};

/// Lifecycle of one traversal. Plans themselves are reusable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TraversalState {
    Uninitialized,
    Initialized,
    Fetching,
    Copying,
    Merging,
    Done,
}

impl TraversalState {
    /// Whether a traversal in this state may move to `next`.
    pub fn can_advance_to(self, next: TraversalState) -> bool {
        use TraversalState::*;
        matches!(
            (self, next),
            (Uninitialized, Initialized)
                | (Initialized, Fetching | Copying | Merging)
                | (Fetching | Copying | Merging, Done)
        )
    }

    /// `Fetching`, `Copying` or `Merging`.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            TraversalState::Fetching | TraversalState::Copying | TraversalState::Merging
        )
    }
}

impl fmt::Display for TraversalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TraversalState::Uninitialized => "uninitialized",
            TraversalState::Initialized => "initialized",
            TraversalState::Fetching => "fetching",
            TraversalState::Copying => "copying",
            TraversalState::Merging => "merging",
            TraversalState::Done => "done",
        };
        f.write_str(name)
    }
}

pub(crate) struct Traversal<'p> {
    plan: &'p FetchPlan,
    state: TraversalState,
}

impl<'p> Traversal<'p> {
    /// Move a bound plan into `phase`; an unbound plan cannot start.
    pub(crate) fn begin(plan: &'p FetchPlan, phase: TraversalState) -> FetchResult<Self> {
        let mut traversal = Self {
            plan,
            state: TraversalState::Uninitialized,
        };
        let entity_type = plan.bound_type()?;
        traversal.advance(TraversalState::Initialized)?;
        traversal.advance(phase)?;
        debug!(entity_type = entity_type.name(), %phase, "traversal started");
        Ok(traversal)
    }

    pub(crate) fn state(&self) -> TraversalState {
        self.state
    }

    fn advance(&mut self, next: TraversalState) -> FetchResult<()> {
        if !self.state.can_advance_to(next) {
            return Err(FetchError::UnsupportedOperation(format!(
                "traversal cannot move from {} to {next}",
                self.state
            )));
        }
        self.state = next;
        Ok(())
    }

    pub(crate) fn finish(mut self, visited: usize, repaired: usize) -> FetchResult<FetchReport> {
        let phase = self.state();
        self.advance(TraversalState::Done)?;
        debug!(
            entity_type = self.plan.entity_type().map(|t| t.name()),
            %phase,
            visited,
            repaired,
            "traversal done"
        );
        Ok(FetchReport {
            state: self.state,
            visited,
            repaired,
        })
    }
}

/// Summary of a finished traversal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FetchReport {
    pub state: TraversalState,
    /// Distinct `(instance, plan node)` pairs visited.
    pub visited: usize,
    /// Stale instances reloaded and revalidated on the way.
    pub repaired: usize,
}

/// Collaborators a fetch consults: an identity cache to detect stale
/// instances and a reloader to repair them.
#[derive(Clone, Copy, Default)]
pub struct FetchContext<'a> {
    cache: Option<&'a IdentityCache>,
    reload: Option<&'a dyn Reload>,
}

impl<'a> FetchContext<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache(mut self, cache: &'a IdentityCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_reload(mut self, reload: &'a dyn Reload) -> Self {
        self.reload = Some(reload);
        self
    }

    pub fn cache(&self) -> Option<&'a IdentityCache> {
        self.cache
    }

    /// Reload and revalidate `entity` if the cache holds it as stale.
    /// Returns `true` if a reload happened.
    pub(crate) fn repair(&self, entity: &EntityRef) -> FetchResult<bool> {
        let Some(cache) = self.cache else {
            return Ok(false);
        };
        if !cache.is_stale(entity) {
            return Ok(false);
        }
        let Some(reload) = self.reload else {
            debug!(entity_type = entity.type_name(), "stale instance reached without a reloader");
            return Ok(false);
        };
        reload.reload(entity)?;
        cache.revalidate(entity);
        debug!(entity_type = entity.type_name(), "reloaded stale instance");
        Ok(true)
    }
}

impl fmt::Debug for FetchContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchContext")
            .field("cache", &self.cache.is_some())
            .field("reload", &self.reload.is_some())
            .finish()
    }
}

struct Fetcher<'p, 'c> {
    context: FetchContext<'c>,
    queue: VecDeque<(&'p FetchPlan, EntityRef)>,
    visited: HashSet<(EntityIdentity, *const FetchPlan)>,
    // Keeps visited instances alive so their identities stay unique.
    seen: Vec<EntityRef>,
    repaired: usize,
}

impl<'p, 'c> Fetcher<'p, 'c> {
    fn new(context: FetchContext<'c>) -> Self {
        Self {
            context,
            queue: VecDeque::new(),
            visited: HashSet::new(),
            seen: Vec::new(),
            repaired: 0,
        }
    }

    fn enqueue(&mut self, plan: &'p FetchPlan, entity: &EntityRef) {
        let key = (DynamicEntity::identity(entity), plan as *const FetchPlan);
        if self.visited.insert(key) {
            self.seen.push(EntityRef::clone(entity));
            self.queue.push_back((plan, EntityRef::clone(entity)));
        }
    }

    fn run(&mut self) -> FetchResult<()> {
        while let Some((plan, entity)) = self.queue.pop_front() {
            if self.context.repair(&entity)? {
                self.repaired += 1;
            }
            for item in plan.items() {
                let Some(slot) = item.slot() else {
                    continue;
                };
                match entity.get(slot)? {
                    Some(Value::Entity(target)) => self.reached(item, &target)?,
                    Some(Value::Collection(elements)) => {
                        for target in elements.entities()? {
                            self.reached(item, &target)?;
                        }
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn reached(&mut self, item: &'p FetchItem, target: &EntityRef) -> FetchResult<()> {
        match item.nested() {
            Some(nested) => self.enqueue(nested, target),
            None => {
                if self.context.repair(target)? {
                    self.repaired += 1;
                }
            }
        }
        Ok(())
    }
}

impl FetchPlan {
    /// Materialize every plan item on `entity`, following nested plans.
    pub fn fetch(&self, entity: &EntityRef, context: &FetchContext<'_>) -> FetchResult<FetchReport> {
        self.fetch_all(std::slice::from_ref(entity), context)
    }

    /// Fetch each entity, sharing one visited set.
    pub fn fetch_all(
        &self,
        entities: &[EntityRef],
        context: &FetchContext<'_>,
    ) -> FetchResult<FetchReport> {
        let traversal = Traversal::begin(self, TraversalState::Fetching)?;
        let expected = self.bound_type()?.name();
        let mut fetcher = Fetcher::new(*context);
        for entity in entities {
            if entity.type_name() != expected {
                return Err(FetchError::WrongType {
                    expected: expected.to_string(),
                    found: entity.type_name().to_string(),
                });
            }
            fetcher.enqueue(self, entity);
        }
        fetcher.run()?;
        traversal.finish(fetcher.seen.len(), fetcher.repaired)
    }

    /// Fetch mixed result rows.
    ///
    /// Only positions holding an entity whose type is exactly the plan's type
    /// are fetched; scalars and entities of other types pass through
    /// untouched, whatever their position in the row.
    pub fn fetch_rows(
        &self,
        rows: &[Vec<Value>],
        context: &FetchContext<'_>,
    ) -> FetchResult<FetchReport> {
        let traversal = Traversal::begin(self, TraversalState::Fetching)?;
        let expected = self.bound_type()?.name();
        let mut fetcher = Fetcher::new(*context);
        for value in rows.iter().flatten() {
            if let Value::Entity(entity) = value {
                if entity.type_name() == expected {
                    fetcher.enqueue(self, entity);
                }
            }
        }
        fetcher.run()?;
        traversal.finish(fetcher.seen.len(), fetcher.repaired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use dynent_entity::{EntityResult, LazyLoading, LazyValue, Slot};
    use dynent_schema::{SchemaDescriptor, TypeRegistry};
    use dynent_types::{ContainerKind, PrimaryKey, ValueKind};

    fn registry() -> TypeRegistry {
        let registry = TypeRegistry::new();
        registry
            .get_or_create_type(
                SchemaDescriptor::builder("Person")
                    .key("id", ValueKind::Int)
                    .attribute("name", ValueKind::Text)
                    .reference("manager", "Person")
                    .references("reports", "Person", ContainerKind::List)
                    .build(),
            )
            .unwrap();
        registry
            .get_or_create_type(
                SchemaDescriptor::builder("Team")
                    .key("code", ValueKind::Text)
                    .build(),
            )
            .unwrap();
        registry
    }

    fn person(registry: &TypeRegistry, id: i64, name: &str) -> EntityRef {
        let entity = DynamicEntity::new(&registry.get_type("Person").unwrap());
        entity.set("id", id).unwrap();
        entity.set("name", name).unwrap();
        entity
    }

    fn plan(registry: &TypeRegistry, paths: &[&str]) -> FetchPlan {
        let mut plan = FetchPlan::new();
        for path in paths {
            plan.add_attribute(path);
        }
        plan.initialize(registry, "Person").unwrap();
        plan
    }

    /// Install a lazy `name` that counts how often it is loaded.
    fn lazy_name(entity: &EntityRef, loads: &Arc<AtomicUsize>) {
        let loads = Arc::clone(loads);
        let slot = entity.entity_type().slot_of("name").unwrap();
        entity.install_slot(
            slot,
            Slot::Lazy(LazyValue::new(move || -> EntityResult<Option<Value>> {
                loads.fetch_add(1, Ordering::SeqCst);
                Ok(Some(Value::from("loaded")))
            })),
        );
    }

    struct CountingReload(AtomicUsize);

    impl Reload for CountingReload {
        fn reload(&self, _entity: &EntityRef) -> EntityResult<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    // -----------------------------------------------------------------------
    // State machine
    // -----------------------------------------------------------------------

    #[test]
    fn unbound_plan_cannot_fetch() {
        let registry = registry();
        let mut plan = FetchPlan::new();
        plan.add_attribute("name");
        let p = person(&registry, 1, "A");

        let err = plan.fetch(&p, &FetchContext::new()).unwrap_err();
        assert!(matches!(err, FetchError::NotInitialized));
    }

    #[test]
    fn finished_traversal_reports_done() {
        let registry = registry();
        let plan = plan(&registry, &["name"]);
        let p = person(&registry, 1, "A");

        let report = plan.fetch(&p, &FetchContext::new()).unwrap();
        assert_eq!(report.state, TraversalState::Done);
        assert_eq!(report.visited, 1);
        // Plans are reusable.
        assert!(plan.fetch(&p, &FetchContext::new()).is_ok());
    }

    #[test]
    fn traversal_states_only_move_forward() {
        use TraversalState::*;
        assert!(Uninitialized.can_advance_to(Initialized));
        for phase in [Fetching, Copying, Merging] {
            assert!(phase.is_active());
            assert!(Initialized.can_advance_to(phase));
            assert!(phase.can_advance_to(Done));
            assert!(!Uninitialized.can_advance_to(phase));
            assert!(!phase.can_advance_to(Initialized));
        }
        assert!(!Initialized.can_advance_to(Done));
        assert!(!Done.can_advance_to(Fetching));
        assert!(!Fetching.can_advance_to(Merging));
    }

    #[test]
    fn traversal_must_start_in_an_active_phase() {
        let registry = registry();
        let plan = plan(&registry, &["name"]);
        for phase in [TraversalState::Initialized, TraversalState::Done] {
            let err = Traversal::begin(&plan, phase).err().unwrap();
            assert!(matches!(err, FetchError::UnsupportedOperation(_)));
        }
        let traversal = Traversal::begin(&plan, TraversalState::Copying).unwrap();
        assert_eq!(traversal.state(), TraversalState::Copying);
        assert_eq!(traversal.finish(0, 0).unwrap().state, TraversalState::Done);
    }

    #[test]
    fn wrong_type_is_rejected() {
        let registry = registry();
        let plan = plan(&registry, &["name"]);
        let team = DynamicEntity::new(&registry.get_type("Team").unwrap());

        let err = plan.fetch(&team, &FetchContext::new()).unwrap_err();
        assert!(matches!(err, FetchError::WrongType { .. }));
    }

    // -----------------------------------------------------------------------
    // Fetch
    // -----------------------------------------------------------------------

    #[test]
    fn fetch_materializes_plan_items_only() {
        let registry = registry();
        let p = person(&registry, 1, "A");
        let loads = Arc::new(AtomicUsize::new(0));
        lazy_name(&p, &loads);

        plan(&registry, &["manager"])
            .fetch(&p, &FetchContext::new())
            .unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 0);

        plan(&registry, &["name"])
            .fetch(&p, &FetchContext::new())
            .unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(p.is_loaded("name").unwrap());
    }

    #[test]
    fn nested_plans_follow_references_and_collections() {
        let registry = registry();
        let boss = person(&registry, 1, "Boss");
        let a = person(&registry, 2, "A");
        let b = person(&registry, 3, "B");
        a.set("manager", &boss).unwrap();
        let reports = boss.get("reports").unwrap().unwrap();
        let reports = reports.as_collection().unwrap();
        reports.push(&a).unwrap();
        reports.push(&b).unwrap();

        let loads = Arc::new(AtomicUsize::new(0));
        lazy_name(&a, &loads);
        lazy_name(&b, &loads);

        let report = plan(&registry, &["reports.name"])
            .fetch(&boss, &FetchContext::new())
            .unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 2);
        assert_eq!(report.visited, 3);
    }

    #[test]
    fn cycles_terminate() {
        let registry = registry();
        let a = person(&registry, 1, "A");
        let b = person(&registry, 2, "B");
        a.set("manager", &b).unwrap();
        b.set("manager", &a).unwrap();

        let mut recursive = FetchPlan::new();
        recursive.add_attribute("manager.manager.manager.manager");
        recursive.initialize(&registry, "Person").unwrap();
        let report = recursive.fetch(&a, &FetchContext::new()).unwrap();
        // One visit per distinct (instance, plan node).
        assert_eq!(report.visited, 4);
    }

    #[test]
    fn rows_dispatch_only_matching_positions() {
        let registry = registry();
        let p = person(&registry, 1, "A");
        let q = person(&registry, 2, "B");
        let team = DynamicEntity::new(&registry.get_type("Team").unwrap());
        let loads = Arc::new(AtomicUsize::new(0));
        lazy_name(&p, &loads);
        lazy_name(&q, &loads);

        let rows = vec![
            vec![Value::from(&p), Value::from(42), Value::from(&team)],
            vec![Value::from("label"), Value::from(&q)],
        ];
        let report = plan(&registry, &["name"])
            .fetch_rows(&rows, &FetchContext::new())
            .unwrap();
        assert_eq!(report.visited, 2);
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    // -----------------------------------------------------------------------
    // Stale repair
    // -----------------------------------------------------------------------

    #[test]
    fn stale_reference_is_repaired_through_relationship() {
        let registry = registry();
        let e = person(&registry, 1, "E");
        let r = person(&registry, 2, "R");
        e.set("manager", &r).unwrap();

        let cache = IdentityCache::new();
        cache.put_entity(&e).unwrap();
        cache.put_entity(&r).unwrap();
        cache.invalidate("Person", &PrimaryKey::from(2));
        assert!(cache.is_valid(&e));
        assert!(!cache.is_valid(&r));

        let reload = CountingReload(AtomicUsize::new(0));
        let context = FetchContext::new().with_cache(&cache).with_reload(&reload);
        let report = plan(&registry, &["manager"]).fetch(&e, &context).unwrap();

        assert_eq!(report.repaired, 1);
        assert_eq!(reload.0.load(Ordering::SeqCst), 1);
        assert!(cache.is_valid(&r));
    }

    #[test]
    fn stale_instance_without_reloader_stays_stale() {
        let registry = registry();
        let r = person(&registry, 2, "R");
        let cache = IdentityCache::new();
        cache.put_entity(&r).unwrap();
        cache.invalidate("Person", &PrimaryKey::from(2));

        let context = FetchContext::new().with_cache(&cache);
        let report = plan(&registry, &["name"]).fetch(&r, &context).unwrap();
        assert_eq!(report.repaired, 0);
        assert!(!cache.is_valid(&r));
    }
}
