/*!

The command and query kinds [`Storage`](crate::entity::Storage) handles. Clients
dispatch these through the owning context — `query` when the result matters,
`send_request` when only the side effect does:

```rust,ignore
let entity = context.query(CreateEntity::new())?;
let everyone = context.query(FindEntities::all())?;
context.send_request(DeleteEntity::from(&entity))?;
```

*/

use std::sync::Arc;

use crate::entity::finder::{Aspect, Filter};
use crate::entity::{EntityId, EntityRef};
use crate::event::Request;

/// Creates an entity. Idempotent for an explicit id: if the id already exists, the
/// existing ref is returned and no event fires.
#[derive(Default)]
pub struct CreateEntity {
    pub id: Option<EntityId>,
}

impl CreateEntity {
    /// Create with a freshly generated id.
    #[must_use]
    pub fn new() -> Self {
        CreateEntity { id: None }
    }

    /// Create with an explicit id.
    #[must_use]
    pub fn with_id(id: EntityId) -> Self {
        CreateEntity { id: Some(id) }
    }
}

impl Request for CreateEntity {
    type Response = EntityRef;
}

/// Deletes an entity. Deleting an id that is not in the table is a logged no-op, not an
/// error.
pub struct DeleteEntity {
    pub id: EntityId,
}

impl DeleteEntity {
    #[must_use]
    pub fn new(id: EntityId) -> Self {
        DeleteEntity { id }
    }
}

impl From<&EntityRef> for DeleteEntity {
    fn from(entity: &EntityRef) -> Self {
        DeleteEntity { id: entity.id() }
    }
}

impl Request for DeleteEntity {
    type Response = ();
}

/// Atomically deletes every entity; responds with the removed refs.
#[derive(Default)]
pub struct DeleteAllEntities;

impl DeleteAllEntities {
    #[must_use]
    pub fn new() -> Self {
        DeleteAllEntities
    }
}

impl Request for DeleteAllEntities {
    type Response = Vec<EntityRef>;
}

/// Queries the table: aspect first (defaults to match-everything), then the filters in
/// list order. Responds with the matching refs in table order, possibly empty.
#[derive(Default)]
pub struct FindEntities {
    pub aspect: Option<Arc<dyn Aspect>>,
    pub filters: Vec<Arc<dyn Filter>>,
}

impl FindEntities {
    /// Matches every entity.
    #[must_use]
    pub fn all() -> Self {
        FindEntities::default()
    }

    #[must_use]
    pub fn with_aspect(mut self, aspect: impl Aspect + 'static) -> Self {
        self.aspect = Some(Arc::new(aspect));
        self
    }

    /// Appends a filter to the chain; filters run in the order they were added.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Filter + 'static) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }
}

impl Request for FindEntities {
    type Response = Vec<EntityRef>;
}

/// Produces a handle for an id without creating anything: the ref for an existing id,
/// or a handle that stays invalid until the id is created.
pub struct ResolveEntity {
    pub id: EntityId,
}

impl ResolveEntity {
    #[must_use]
    pub fn new(id: EntityId) -> Self {
        ResolveEntity { id }
    }
}

impl Request for ResolveEntity {
    type Response = EntityRef;
}
