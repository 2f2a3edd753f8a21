//! An embeddable, in-process entity store
//!
//! Holon manages a typed, schema-less graph of *entities*: opaque identities that exist
//! iff they are present in the entity table of a [`Context`]. Clients mutate and query
//! the table exclusively through a typed command/query protocol on the context's event
//! bus, so decoupled observers — reactive bindings, interest subscriptions — can react
//! to lifecycle changes without the mutating code knowing about them.
//!
//! The central object is the [`Context`]: a disposable, thread-safe scope that owns
//! * a typed attribute table for module-specific data, keyed by [`ContextKey`] types,
//! * service resolution through an injected [`ServiceLocator`],
//! * the [`EventBus`] through which all commands, queries, and notifications flow, and
//! * at most one entity table ([`Storage`]), installed as an attribute like any other
//!   module's data.
//!
//! A typical embedding installs the storage and then speaks only to the bus:
//!
//! ```rust
//! use holon::{Context, CreateEntity, DeleteEntity, EntityCreatedEvent, FindEntities, Storage};
//!
//! # fn main() -> Result<(), holon::HolonError> {
//! let context = Context::new();
//! Storage::install(&context)?;
//!
//! context.subscribe(|_context, event: &EntityCreatedEvent| {
//!     println!("created {}", event.id);
//! });
//!
//! let entity = context.query(CreateEntity::new())?;
//! assert!(entity.is_valid());
//!
//! let everyone = context.query(FindEntities::all())?;
//! assert_eq!(everyone, vec![entity.clone()]);
//!
//! context.send_request(DeleteEntity::from(&entity))?;
//! assert!(entity.is_invalid());
//! # Ok(())
//! # }
//! ```
//!
//! Entities addressed hierarchically rather than by id use the [`EntityPath`] algebra;
//! the storage core itself is path-agnostic.

pub mod context;
pub mod entity;
pub mod error;
pub mod event;
pub mod hashing;
pub mod log;
pub mod path;

pub use context::{Context, ContextId, ContextKey, ServiceLocator};
pub use entity::{
    Aspect, CreateEntity, DeleteAllEntities, DeleteEntity, EntityCreatedEvent, EntityDeletedEvent,
    EntityDeletingEvent, EntityId, EntityRef, Filter, FindEntities, MatchAll, ResolveEntity,
    Storage,
};
pub use error::HolonError;
pub use event::{EventBus, Request, SubscriptionId};
pub use hashing::{HashMap, HashSet};
pub use path::EntityPath;

// Re-export the logging macros so embedders can `use holon::info;` etc.
pub use crate::log::{debug, error, info, trace, warn};
