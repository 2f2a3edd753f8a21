/*!

An *entity* is an opaque identity: it exists iff its [`EntityId`] is currently a key of
its context's entity table. There is no entity object — clients hold [`EntityRef`]
handles, whose validity is recomputed against the live table on every check.

The table itself is owned by [`Storage`], which exposes no direct mutation methods.
Clients dispatch the command and query types in [`commands`] through the owning
context's event bus, and observe lifecycle changes through the notification events in
[`events`]:

```rust,ignore
let context = Context::new();
Storage::install(&context)?;

let entity = context.query(CreateEntity::new())?;
assert!(entity.is_valid());

context.send_request(DeleteEntity::new(entity.id()))?;
assert!(entity.is_invalid());
```

Queries over the table go through [`FindEntities`], which evaluates an [`Aspect`]
(a cheap predicate over component composition) before an ordered, short-circuiting
[`Filter`] chain.

*/

pub mod commands;
pub mod entity_ref;
pub mod events;
pub mod finder;
pub mod storage;

// Flatten the module hierarchy.
pub use commands::{CreateEntity, DeleteAllEntities, DeleteEntity, FindEntities, ResolveEntity};
pub use entity_ref::{EntityId, EntityRef};
pub use events::{EntityCreatedEvent, EntityDeletedEvent, EntityDeletingEvent};
pub use finder::{Aspect, Filter, MatchAll};
pub use storage::Storage;
