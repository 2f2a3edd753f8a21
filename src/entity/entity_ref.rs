use std::fmt::{self, Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use uuid::Uuid;

use crate::context::{Context, ContextId};
use crate::entity::storage::Storage;

/// Identity of an entity within one context: a 128-bit id, either generated fresh or
/// supplied explicitly by the client.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct EntityId(Uuid);

impl EntityId {
    #[must_use]
    pub fn random() -> Self {
        EntityId(Uuid::new_v4())
    }

    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for EntityId {
    fn from(id: Uuid) -> Self {
        EntityId(id)
    }
}

impl Display for EntityId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A lightweight, context-bound handle to an entity id.
///
/// A ref does not own entity data and holds the table only weakly: validity is
/// recomputed against the live table on every [`EntityRef::is_valid`] call, never
/// cached. A ref can therefore flip from valid to invalid at any time due to actions on
/// another thread — validity is a point-in-time snapshot, and call sites that need a
/// consistent view must re-check before each use.
///
/// Refs are immutable after construction and freely shareable across threads. Two refs
/// are equal iff their entity ids are equal and they belong to the same context.
#[derive(Clone)]
pub struct EntityRef {
    context: Weak<Context>,
    context_id: ContextId,
    id: EntityId,
}

impl EntityRef {
    pub(crate) fn new(context: Weak<Context>, context_id: ContextId, id: EntityId) -> Self {
        EntityRef {
            context,
            context_id,
            id,
        }
    }

    #[must_use]
    pub fn id(&self) -> EntityId {
        self.id
    }

    #[must_use]
    pub fn context_id(&self) -> ContextId {
        self.context_id
    }

    /// The owning context, or `None` if it has been dropped.
    #[must_use]
    pub fn context(&self) -> Option<Arc<Context>> {
        self.context.upgrade()
    }

    /// True iff the owning context is alive and not disposed, and this id is currently
    /// present in its entity table.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        let Some(context) = self.context.upgrade() else {
            return false;
        };
        match Storage::of(&context) {
            Some(storage) => storage.contains(self.id),
            // No storage installed, or the context is disposed.
            None => false,
        }
    }

    #[must_use]
    pub fn is_invalid(&self) -> bool {
        !self.is_valid()
    }
}

impl PartialEq for EntityRef {
    fn eq(&self, other: &Self) -> bool {
        self.context_id == other.context_id && self.id == other.id
    }
}

impl Eq for EntityRef {}

impl Hash for EntityRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.context_id.hash(state);
        self.id.hash(state);
    }
}

impl Debug for EntityRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityRef")
            .field("context", &self.context_id)
            .field("id", &self.id)
            .finish()
    }
}

impl Display for EntityRef {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.context_id)
    }
}
