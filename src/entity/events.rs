/*!

Lifecycle notifications emitted by [`Storage`](crate::entity::Storage). These should not
be emitted outside the entity module; client code subscribes to them through the owning
context:

```rust,ignore
context.subscribe(|_context, event: &EntityCreatedEvent| {
    println!("created {}", event.id);
});
```

The before/after split around deletion is load-bearing: [`EntityDeletingEvent`] is sent
synchronously while the entity is still in the table, so observers get last-chance
access to its final state (and may issue nested commands, e.g. cascading child
deletion). [`EntityDeletedEvent`] is posted only after the removal is visible and is for
bookkeeping only.

*/

use crate::entity::{EntityId, EntityRef};

/// Posted after a new entity has been inserted into the table.
#[derive(Debug, Clone)]
pub struct EntityCreatedEvent {
    pub entity: EntityRef,
    pub id: EntityId,
}

impl EntityCreatedEvent {
    pub(crate) fn new(entity: EntityRef, id: EntityId) -> Self {
        EntityCreatedEvent { entity, id }
    }
}

/// Sent synchronously before an entity is removed from the table. Observers run to
/// completion while the entity is still present.
#[derive(Debug, Clone)]
pub struct EntityDeletingEvent {
    pub entity: EntityRef,
    pub id: EntityId,
}

impl EntityDeletingEvent {
    pub(crate) fn new(entity: EntityRef, id: EntityId) -> Self {
        EntityDeletingEvent { entity, id }
    }
}

/// Posted after an entity's removal from the table is visible. The carried ref is
/// already invalid.
#[derive(Debug, Clone)]
pub struct EntityDeletedEvent {
    pub entity: EntityRef,
    pub id: EntityId,
}

impl EntityDeletedEvent {
    pub(crate) fn new(entity: EntityRef, id: EntityId) -> Self {
        EntityDeletedEvent { entity, id }
    }
}
