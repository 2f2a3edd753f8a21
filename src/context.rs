/*!

A [`Context`] is a disposable scope: it owns a typed attribute table, resolves services
through an injected [`ServiceLocator`], and carries the [`EventBus`] every entity command
and notification flows through. One context owns at most one entity table (see
[`crate::entity::Storage`]); nothing is ever shared between two contexts.

Attributes are keyed by *types*, not strings. A key is any type implementing
[`ContextKey`], which names the value type it stores and may override [`ContextKey::on_dispose`]
to participate in teardown:

```rust
use holon::context::{Context, ContextKey};
use holon::define_context_key;

define_context_key!(FrameBudget, u64);

let context = Context::new();
context.put::<FrameBudget>(16).unwrap();
assert_eq!(*context.get::<FrameBudget>().unwrap().unwrap(), 16);
```

The lifecycle is `Active → Disposing → Disposed`, one-shot and irreversible. Once
disposal has begun, every operation except [`Context::is_disposed`] fails with a state
error. Disposal notifies each stored value's `on_dispose` hook exactly once with the
attribute lock released, so hooks re-entering the context fail cleanly instead of
deadlocking.

*/

use std::any::{type_name, Any, TypeId};
use std::fmt::{self, Display, Formatter};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use log::{debug, trace, warn};
use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use uuid::Uuid;

use crate::error::HolonError;
use crate::event::{EventBus, Request, SubscriptionId};
use crate::hashing::HashMap;

/// Process-unique identity of a [`Context`], generated at construction and immutable for
/// the context's life.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ContextId(Uuid);

impl ContextId {
    fn random() -> Self {
        ContextId(Uuid::new_v4())
    }
}

impl Display for ContextId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A typed attribute key. The key type itself is the map key; `Value` is what it stores.
///
/// `on_dispose` is the disposal capability: it runs exactly once for the stored value
/// during context teardown. The default is a no-op.
pub trait ContextKey: 'static {
    type Value: Send + Sync + 'static;

    fn on_dispose(_value: &Self::Value, _context: &Context) {}
}

/// Declares a [`ContextKey`] with a no-op disposal hook.
#[macro_export]
macro_rules! define_context_key {
    ($key:ident, $value:ty) => {
        struct $key;

        impl $crate::context::ContextKey for $key {
            type Value = $value;
        }
    };
}
pub use define_context_key;

/// Resolves service instances for [`Context::get_service`] /
/// [`Context::find_service`] cache misses.
pub trait ServiceLocator: Send + Sync {
    /// Returns the instance for the requested type, or `None` if unavailable.
    fn find(&self, service: TypeId) -> Option<Arc<dyn Any + Send + Sync>>;
}

// Lifecycle tags, held in an atomic so every thread observes either the pre- or
// post-transition view, never a partial one.
const ACTIVE: u8 = 0;
const DISPOSING: u8 = 1;
const DISPOSED: u8 = 2;

type DisposeFn = fn(&(dyn Any + Send + Sync), &Context);

struct AttributeEntry {
    value: Arc<dyn Any + Send + Sync>,
    dispose: DisposeFn,
}

/// Monomorphized teardown shim stored alongside each attribute value.
fn dispose_value<K: ContextKey>(value: &(dyn Any + Send + Sync), context: &Context) {
    if let Some(value) = value.downcast_ref::<K::Value>() {
        K::on_dispose(value, context);
    }
}

pub struct Context {
    id: ContextId,
    state: AtomicU8,
    attributes: RwLock<HashMap<TypeId, AttributeEntry>>,
    services: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
    locator: Option<Box<dyn ServiceLocator>>,
    events: EventBus,
}

impl Context {
    #[must_use]
    pub fn new() -> Arc<Context> {
        Context::construct(None)
    }

    #[must_use]
    pub fn with_locator(locator: impl ServiceLocator + 'static) -> Arc<Context> {
        Context::construct(Some(Box::new(locator)))
    }

    fn construct(locator: Option<Box<dyn ServiceLocator>>) -> Arc<Context> {
        let context = Arc::new(Context {
            id: ContextId::random(),
            state: AtomicU8::new(ACTIVE),
            attributes: RwLock::new(HashMap::default()),
            services: RwLock::new(HashMap::default()),
            locator,
            events: EventBus::new(),
        });
        trace!("created context {}", context.id);
        context
    }

    #[must_use]
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// True once disposal has begun or completed. The only operation that never fails.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.state.load(Ordering::Acquire) != ACTIVE
    }

    /// The state check behind every operation. Attribute operations call this while
    /// holding the attribute lock, so the answer is consistent with what the lock
    /// protects; entity command handlers call it once at entry.
    pub(crate) fn ensure_active(&self) -> Result<(), HolonError> {
        if self.is_disposed() {
            return Err(HolonError::ContextDisposed);
        }
        Ok(())
    }

    /// Stores `value` under `K`, returning the value it replaced, if any.
    pub fn put<K: ContextKey>(&self, value: K::Value) -> Result<Option<Arc<K::Value>>, HolonError> {
        let mut attributes = self.attributes.write();
        self.ensure_active()?;
        let previous = attributes.insert(
            TypeId::of::<K>(),
            AttributeEntry {
                value: Arc::new(value),
                dispose: dispose_value::<K>,
            },
        );
        Ok(previous.map(|entry| downcast_entry::<K>(entry.value)))
    }

    /// Stores `value` under `K` unless a value is already present; returns the resident
    /// value either way.
    pub fn put_if_absent<K: ContextKey>(&self, value: K::Value) -> Result<Arc<K::Value>, HolonError> {
        self.get_or_create::<K>(|| value)
    }

    /// Returns the value under `K`, materializing it from `provider` if absent.
    ///
    /// The provider runs **at most once** per key even under concurrent callers racing
    /// on the same absent key: the check holds the upgradable lock and escalates to
    /// exclusive without releasing, so a losing racer observes the winner's value.
    pub fn get_or_create<K: ContextKey>(
        &self,
        provider: impl FnOnce() -> K::Value,
    ) -> Result<Arc<K::Value>, HolonError> {
        let attributes = self.attributes.upgradable_read();
        self.ensure_active()?;
        if let Some(entry) = attributes.get(&TypeId::of::<K>()) {
            return Ok(downcast_entry::<K>(entry.value.clone()));
        }
        let mut attributes = RwLockUpgradableReadGuard::upgrade(attributes);
        let value = Arc::new(provider());
        attributes.insert(
            TypeId::of::<K>(),
            AttributeEntry {
                value: value.clone(),
                dispose: dispose_value::<K>,
            },
        );
        Ok(value)
    }

    pub fn get<K: ContextKey>(&self) -> Result<Option<Arc<K::Value>>, HolonError> {
        let attributes = self.attributes.read();
        self.ensure_active()?;
        Ok(attributes
            .get(&TypeId::of::<K>())
            .map(|entry| downcast_entry::<K>(entry.value.clone())))
    }

    /// Like [`Context::get`], but falls back to `default` (without storing it) when `K`
    /// is absent.
    pub fn get_or<K: ContextKey>(&self, default: K::Value) -> Result<Arc<K::Value>, HolonError> {
        Ok(self.get::<K>()?.unwrap_or_else(|| Arc::new(default)))
    }

    pub fn contains<K: ContextKey>(&self) -> Result<bool, HolonError> {
        let attributes = self.attributes.read();
        self.ensure_active()?;
        Ok(attributes.contains_key(&TypeId::of::<K>()))
    }

    /// Removes and returns the value under `K`. The disposal hook does not run; hooks
    /// belong to teardown only.
    pub fn remove<K: ContextKey>(&self) -> Result<Option<Arc<K::Value>>, HolonError> {
        let mut attributes = self.attributes.write();
        self.ensure_active()?;
        Ok(attributes
            .remove(&TypeId::of::<K>())
            .map(|entry| downcast_entry::<K>(entry.value)))
    }

    /// Resolves the service of type `S`, failing with `ServiceUnavailable` if the
    /// locator cannot supply one.
    pub fn get_service<S: Any + Send + Sync>(&self) -> Result<Arc<S>, HolonError> {
        match self.find_service::<S>()? {
            Some(service) => Ok(service),
            None => Err(HolonError::ServiceUnavailable(type_name::<S>())),
        }
    }

    /// Resolves the service of type `S`, or `None` if the locator cannot supply one.
    /// Resolution hits the locator once per type; the instance is cached under the
    /// type's identity.
    pub fn find_service<S: Any + Send + Sync>(&self) -> Result<Option<Arc<S>>, HolonError> {
        let services = self.services.upgradable_read();
        self.ensure_active()?;
        if let Some(cached) = services.get(&TypeId::of::<S>()) {
            let cached = cached
                .clone()
                .downcast::<S>()
                .expect("cached service does not match its type key");
            return Ok(Some(cached));
        }
        let Some(locator) = &self.locator else {
            return Ok(None);
        };
        let Some(resolved) = locator.find(TypeId::of::<S>()) else {
            return Ok(None);
        };
        match resolved.clone().downcast::<S>() {
            Ok(service) => {
                let mut services = RwLockUpgradableReadGuard::upgrade(services);
                services.insert(TypeId::of::<S>(), resolved);
                Ok(Some(service))
            }
            Err(_) => {
                warn!(
                    "service locator returned a value of the wrong type for {}",
                    type_name::<S>()
                );
                Ok(None)
            }
        }
    }

    /// Tears the context down: `Active → Disposing → Disposed`, one-shot.
    ///
    /// Every stored value's disposal hook runs exactly once with the lock released, so
    /// hooks may re-enter the context — they fail with a state error rather than
    /// deadlocking. Concurrent disposers lose the transition race and get
    /// `ContextDisposed`.
    pub fn dispose(&self) -> Result<(), HolonError> {
        if self
            .state
            .compare_exchange(ACTIVE, DISPOSING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(HolonError::ContextDisposed);
        }
        trace!("disposing context {}", self.id);

        // The exclusive acquisition fences out every in-flight reader and writer; once
        // it is granted, no operation that saw the Active state still holds the lock.
        let entries: Vec<(Arc<dyn Any + Send + Sync>, DisposeFn)> = {
            let attributes = self.attributes.write();
            attributes
                .values()
                .map(|entry| (entry.value.clone(), entry.dispose))
                .collect()
        };
        for (value, dispose) in &entries {
            dispose(value.as_ref(), self);
        }
        self.attributes.write().clear();
        self.services.write().clear();
        self.state.store(DISPOSED, Ordering::Release);
        debug!("context {} disposed", self.id);
        Ok(())
    }

    // Bus access. The bus is part of the context so that every dispatch carries the
    // owning context as its implicit root parameter.

    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe<E: Any + Send + Sync>(
        &self,
        handler: impl Fn(&Context, &E) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.events.subscribe(handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    pub fn post<E: Any + Send + Sync>(&self, event: &E) {
        self.events.post(self, event);
    }

    pub fn send<E: Any + Send + Sync>(&self, event: &E) {
        self.events.send(self, event);
    }

    pub fn register_handler<R: Request>(
        &self,
        handler: impl Fn(&Context, R) -> Result<R::Response, HolonError> + Send + Sync + 'static,
    ) -> Result<(), HolonError> {
        self.events.register_handler(handler)
    }

    pub fn query<R: Request>(&self, request: R) -> Result<R::Response, HolonError> {
        self.events.query(self, request)
    }

    pub fn send_request<R: Request>(&self, request: R) -> Result<(), HolonError> {
        self.events.send_request(self, request)
    }
}

/// Attribute entries are only ever written through their own `K`, so the stored value
/// always matches `K::Value`.
fn downcast_entry<K: ContextKey>(value: Arc<dyn Any + Send + Sync>) -> Arc<K::Value> {
    value
        .downcast::<K::Value>()
        .expect("attribute entry does not match its ContextKey value type")
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;

    use super::*;

    define_context_key!(Budget, u64);
    define_context_key!(Label, String);

    #[test]
    fn put_and_get_round_trip() {
        let context = Context::new();
        assert!(context.put::<Budget>(16).unwrap().is_none());
        assert_eq!(*context.get::<Budget>().unwrap().unwrap(), 16);
        assert!(context.contains::<Budget>().unwrap());
        assert!(!context.contains::<Label>().unwrap());
    }

    #[test]
    fn put_returns_the_replaced_value() {
        let context = Context::new();
        context.put::<Budget>(16).unwrap();
        let previous = context.put::<Budget>(33).unwrap().unwrap();
        assert_eq!(*previous, 16);
        assert_eq!(*context.get::<Budget>().unwrap().unwrap(), 33);
    }

    #[test]
    fn remove_returns_the_value() {
        let context = Context::new();
        context.put::<Label>("scene".to_string()).unwrap();
        let removed = context.remove::<Label>().unwrap().unwrap();
        assert_eq!(*removed, "scene");
        assert!(context.get::<Label>().unwrap().is_none());
        assert!(context.remove::<Label>().unwrap().is_none());
    }

    #[test]
    fn get_or_falls_back_without_storing() {
        let context = Context::new();
        assert_eq!(*context.get_or::<Budget>(8).unwrap(), 8);
        assert!(!context.contains::<Budget>().unwrap());
    }

    #[test]
    fn put_if_absent_keeps_the_resident_value() {
        let context = Context::new();
        assert_eq!(*context.put_if_absent::<Budget>(16).unwrap(), 16);
        assert_eq!(*context.put_if_absent::<Budget>(33).unwrap(), 16);
    }

    #[test]
    fn get_or_create_materializes_once() {
        let context = Context::new();
        let calls = AtomicUsize::new(0);
        let first = context
            .get_or_create::<Budget>(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                16
            })
            .unwrap();
        let second = context
            .get_or_create::<Budget>(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                33
            })
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    // N threads racing on the same absent key: the provider runs exactly once and all
    // racers observe the winner's value.
    #[test]
    fn concurrent_get_or_create_is_linearized() {
        const NUM_THREADS: usize = 32;

        let context = Context::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(NUM_THREADS));

        let handles: Vec<_> = (0..NUM_THREADS)
            .map(|index| {
                let context = context.clone();
                let calls = calls.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    context
                        .get_or_create::<Budget>(|| {
                            calls.fetch_add(1, Ordering::SeqCst);
                            index as u64
                        })
                        .unwrap()
                })
            })
            .collect();

        let results: Vec<Arc<u64>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let winner = &results[0];
        assert!(results.iter().all(|value| Arc::ptr_eq(value, winner)));
    }

    #[test]
    fn disposal_fences_every_operation() {
        let context = Context::new();
        context.put::<Budget>(16).unwrap();
        context.dispose().unwrap();

        assert!(context.is_disposed());
        assert!(matches!(
            context.put::<Budget>(1),
            Err(HolonError::ContextDisposed)
        ));
        assert!(matches!(
            context.get::<Budget>(),
            Err(HolonError::ContextDisposed)
        ));
        assert!(matches!(
            context.remove::<Budget>(),
            Err(HolonError::ContextDisposed)
        ));
        assert!(matches!(
            context.contains::<Budget>(),
            Err(HolonError::ContextDisposed)
        ));
        assert!(matches!(
            context.get_or_create::<Budget>(|| 1),
            Err(HolonError::ContextDisposed)
        ));
        assert!(matches!(
            context.find_service::<u32>(),
            Err(HolonError::ContextDisposed)
        ));
    }

    #[test]
    fn disposal_is_one_shot() {
        let context = Context::new();
        context.dispose().unwrap();
        assert!(matches!(
            context.dispose(),
            Err(HolonError::ContextDisposed)
        ));
    }

    struct Teardown;
    struct TeardownValue {
        drops: Arc<AtomicUsize>,
    }
    impl ContextKey for Teardown {
        type Value = TeardownValue;

        fn on_dispose(value: &TeardownValue, _context: &Context) {
            value.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn disposal_runs_each_hook_exactly_once() {
        let context = Context::new();
        let drops = Arc::new(AtomicUsize::new(0));
        context
            .put::<Teardown>(TeardownValue {
                drops: drops.clone(),
            })
            .unwrap();

        context.dispose().unwrap();
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn removed_values_get_no_hook() {
        let context = Context::new();
        let drops = Arc::new(AtomicUsize::new(0));
        context
            .put::<Teardown>(TeardownValue {
                drops: drops.clone(),
            })
            .unwrap();
        context.remove::<Teardown>().unwrap();

        context.dispose().unwrap();
        assert_eq!(drops.load(Ordering::SeqCst), 0);
    }

    struct Reentrant;
    struct ReentrantValue {
        saw_state_error: Arc<AtomicBool>,
    }
    impl ContextKey for Reentrant {
        type Value = ReentrantValue;

        fn on_dispose(value: &ReentrantValue, context: &Context) {
            // Hooks run with the lock released; re-entry fails instead of deadlocking.
            let result = context.contains::<Reentrant>();
            value.saw_state_error.store(
                matches!(result, Err(HolonError::ContextDisposed)),
                Ordering::SeqCst,
            );
        }
    }

    #[test]
    fn hooks_reentering_the_context_get_a_state_error() {
        let context = Context::new();
        let saw_state_error = Arc::new(AtomicBool::new(false));
        context
            .put::<Reentrant>(ReentrantValue {
                saw_state_error: saw_state_error.clone(),
            })
            .unwrap();

        context.dispose().unwrap();
        assert!(saw_state_error.load(Ordering::SeqCst));
    }

    struct Clock {
        name: &'static str,
    }

    struct TestLocator {
        hits: AtomicUsize,
    }
    impl ServiceLocator for TestLocator {
        fn find(&self, service: TypeId) -> Option<Arc<dyn Any + Send + Sync>> {
            if service == TypeId::of::<Clock>() {
                self.hits.fetch_add(1, Ordering::SeqCst);
                Some(Arc::new(Clock { name: "wall" }))
            } else {
                None
            }
        }
    }

    #[test]
    fn services_resolve_once_and_cache() {
        let context = Context::with_locator(TestLocator {
            hits: AtomicUsize::new(0),
        });

        let first = context.get_service::<Clock>().unwrap();
        let second = context.get_service::<Clock>().unwrap();
        assert_eq!(first.name, "wall");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn unresolvable_services_distinguish_get_from_find() {
        struct Missing;
        let context = Context::with_locator(TestLocator {
            hits: AtomicUsize::new(0),
        });

        assert!(context.find_service::<Missing>().unwrap().is_none());
        assert!(matches!(
            context.get_service::<Missing>(),
            Err(HolonError::ServiceUnavailable(_))
        ));
    }

    #[test]
    fn contexts_without_a_locator_find_nothing() {
        let context = Context::new();
        assert!(context.find_service::<Clock>().unwrap().is_none());
    }

    #[test]
    fn context_ids_are_unique() {
        assert_ne!(Context::new().id(), Context::new().id());
    }
}
