/*!

`Storage` owns one context's entity table and is the source of truth for
[`EntityRef`] validity. It exposes no direct mutation methods: the five request kinds in
[`commands`](crate::entity::commands) are registered on the owning context's bus by
[`Storage::install`], and every mutation flows through them.

The table lives behind a three-mode lock. Readers (find, resolve, validity checks) take
the shared mode; check-then-conditionally-write handlers (create, delete) take the
upgradable mode and escalate in place, so readers are never blocked during the check;
delete-all takes the exclusive mode outright. Notifications are emitted only after the
guards are dropped, so an observer can never see an event before the mutation it reports
is visible to other threads.

*/

use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use log::{debug, trace};
use parking_lot::{RwLock, RwLockUpgradableReadGuard};

use crate::context::{Context, ContextId, ContextKey};
use crate::entity::events::{EntityCreatedEvent, EntityDeletedEvent, EntityDeletingEvent};
use crate::entity::finder::{filter_entities, Aspect, Filter, MatchAll};
use crate::entity::{
    CreateEntity, DeleteAllEntities, DeleteEntity, EntityId, EntityRef, FindEntities,
    ResolveEntity,
};
use crate::error::HolonError;
use crate::hashing::FxBuildHasher;

/// A table entry: the canonical ref for the id, plus the in-flight deletion mark.
struct Slot {
    entity: EntityRef,
    /// Set while the deleting pre-notification runs, so a nested delete of the same id
    /// observes a delete already in progress and no-ops instead of firing twice.
    deleting: bool,
}

/// Insertion-ordered so that find results and delete-all fan-out are deterministic.
type EntityTable = IndexMap<EntityId, Slot, FxBuildHasher>;

/// Attribute key under which a context's `Storage` lives. Teardown of the context clears
/// the table through this key's hook.
pub(crate) struct StorageKey;

impl ContextKey for StorageKey {
    type Value = Storage;

    fn on_dispose(storage: &Storage, context: &Context) {
        storage.clear_on_dispose(context);
    }
}

/// The entity table of one context. See the module docs for the locking discipline.
pub struct Storage {
    context: Weak<Context>,
    context_id: ContextId,
    table: RwLock<EntityTable>,
}

impl Storage {
    /// Installs the storage for `context` and registers its command handlers on the
    /// bus. Idempotent: a second call returns the already-installed instance.
    pub fn install(context: &Arc<Context>) -> Result<Arc<Storage>, HolonError> {
        let mut created = false;
        let storage = context.get_or_create::<StorageKey>(|| {
            created = true;
            Storage {
                context: Arc::downgrade(context),
                context_id: context.id(),
                table: RwLock::new(EntityTable::default()),
            }
        })?;
        if created {
            Storage::register_handlers(context, &storage)?;
            debug!("installed entity storage in context {}", context.id());
        }
        Ok(storage)
    }

    fn register_handlers(context: &Arc<Context>, storage: &Arc<Storage>) -> Result<(), HolonError> {
        let s = Arc::clone(storage);
        context.register_handler(move |context: &Context, request: CreateEntity| {
            s.create(context, request.id)
        })?;
        let s = Arc::clone(storage);
        context.register_handler(move |context: &Context, request: DeleteEntity| {
            s.delete(context, request.id)
        })?;
        let s = Arc::clone(storage);
        context.register_handler(move |context: &Context, _request: DeleteAllEntities| {
            s.delete_all(context)
        })?;
        let s = Arc::clone(storage);
        context.register_handler(move |context: &Context, request: FindEntities| {
            s.find(context, request.aspect, &request.filters)
        })?;
        let s = Arc::clone(storage);
        context.register_handler(move |context: &Context, request: ResolveEntity| {
            s.resolve(context, request.id)
        })?;
        Ok(())
    }

    /// The storage installed in `context`, if any. `None` once the context is disposed.
    pub(crate) fn of(context: &Context) -> Option<Arc<Storage>> {
        context.get::<StorageKey>().ok().flatten()
    }

    /// Whether `id` is currently in the table.
    pub(crate) fn contains(&self, id: EntityId) -> bool {
        self.table.read().contains_key(&id)
    }

    /// The number of entities currently in the table.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.table.read().len()
    }

    fn create(&self, context: &Context, id: Option<EntityId>) -> Result<EntityRef, HolonError> {
        context.ensure_active()?;
        let id = id.unwrap_or_else(EntityId::random);

        let table = self.table.upgradable_read();
        if let Some(slot) = table.get(&id) {
            trace!("create of existing entity {id} returns the existing ref");
            return Ok(slot.entity.clone());
        }
        let mut table = RwLockUpgradableReadGuard::upgrade(table);
        let entity = EntityRef::new(self.context.clone(), self.context_id, id);
        table.insert(
            id,
            Slot {
                entity: entity.clone(),
                deleting: false,
            },
        );
        drop(table);

        // Observers may only learn of the entity once the insert is visible.
        context.post(&EntityCreatedEvent::new(entity.clone(), id));
        trace!("created entity {id}");
        Ok(entity)
    }

    fn delete(&self, context: &Context, id: EntityId) -> Result<(), HolonError> {
        context.ensure_active()?;

        let entity = {
            let table = self.table.upgradable_read();
            let Some(slot) = table.get(&id) else {
                debug!("delete of unknown entity {id} is a no-op");
                return Ok(());
            };
            if slot.deleting {
                trace!("delete of entity {id} already in progress");
                return Ok(());
            }
            let entity = slot.entity.clone();
            let mut table = RwLockUpgradableReadGuard::upgrade(table);
            if let Some(slot) = table.get_mut(&id) {
                slot.deleting = true;
            }
            entity
        };

        // Last-chance access: the entity is still in the table and no lock is held, so
        // observers run to completion reading its final state and may issue nested
        // commands (cascading child deletion included).
        context.send(&EntityDeletingEvent::new(entity.clone(), id));

        let removed = self.table.write().shift_remove(&id).is_some();
        if removed {
            context.post(&EntityDeletedEvent::new(entity, id));
            trace!("deleted entity {id}");
        }
        Ok(())
    }

    fn delete_all(&self, context: &Context) -> Result<Vec<EntityRef>, HolonError> {
        context.ensure_active()?;

        let removed: Vec<EntityRef> = {
            let mut table = self.table.write();
            std::mem::take(&mut *table)
                .into_iter()
                .map(|(_, slot)| slot.entity)
                .collect()
        };
        if !removed.is_empty() {
            debug!("deleted all {} entities", removed.len());
        }
        for entity in &removed {
            context.post(&EntityDeletedEvent::new(entity.clone(), entity.id()));
        }
        Ok(removed)
    }

    fn find(
        &self,
        context: &Context,
        aspect: Option<Arc<dyn Aspect>>,
        filters: &[Arc<dyn Filter>],
    ) -> Result<Vec<EntityRef>, HolonError> {
        context.ensure_active()?;

        let snapshot: Vec<EntityRef> = {
            let table = self.table.read();
            table.values().map(|slot| slot.entity.clone()).collect()
        };
        // Predicates may re-enter the storage, so they run with the lock released.
        match aspect {
            Some(aspect) => filter_entities(context, snapshot, aspect.as_ref(), filters),
            None => filter_entities(context, snapshot, &MatchAll, filters),
        }
    }

    fn resolve(&self, context: &Context, id: EntityId) -> Result<EntityRef, HolonError> {
        context.ensure_active()?;

        let table = self.table.read();
        match table.get(&id) {
            Some(slot) => Ok(slot.entity.clone()),
            // A handle only: nothing is inserted, and the ref stays invalid until the
            // id is created.
            None => Ok(EntityRef::new(self.context.clone(), self.context_id, id)),
        }
    }

    fn clear_on_dispose(&self, context: &Context) {
        let count = {
            let mut table = self.table.write();
            let count = table.len();
            table.clear();
            count
        };
        if count > 0 {
            debug!("context {} teardown dropped {count} entities", context.id());
        }
    }
}
