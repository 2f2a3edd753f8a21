/*!

The event bus carries everything that happens to a store. Clients never call the entity
table directly; they dispatch typed *requests* (commands and queries) that the table's
registered handlers service, and they *subscribe* to the notification events the table
emits around lifecycle changes.

Two planes, both typed by `TypeId` with no runtime introspection:

- **Notifications**: any `'static + Send + Sync` type can be an event. Handlers are added
  with [`EventBus::subscribe`] and removed with [`EventBus::unsubscribe`]. Emission is
  either `post` (fire-and-forget; emitters call it only after the triggering mutation is
  visible) or `send` (synchronous; every handler has run to completion when it returns).
- **Requests**: a [`Request`] names its `Response` type. Exactly one handler may be
  registered per request kind — the capability table — and dispatch is `query` (returns
  the response) or `send_request` (discards it).

Handlers always receive the owning [`Context`] as their first parameter.

*/

use std::any::{type_name, Any, TypeId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::context::Context;
use crate::error::HolonError;
use crate::hashing::HashMap;

/// A command or query dispatched through the bus. `Response` is what a `query` returns;
/// request kinds without a meaningful result use `()`.
pub trait Request: Any + Send + Sync {
    type Response: Send + Sync + 'static;
}

/// Identifies one subscription for [`EventBus::unsubscribe`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type ErasedEventHandler = Arc<dyn Fn(&Context, &dyn Any) + Send + Sync>;
type ErasedRequestHandler =
    Arc<dyn Fn(&Context, Box<dyn Any>) -> Result<Box<dyn Any>, HolonError> + Send + Sync>;

struct Subscriber {
    id: SubscriptionId,
    handler: ErasedEventHandler,
}

pub struct EventBus {
    subscribers: RwLock<HashMap<TypeId, Vec<Subscriber>>>,
    /// The capability table: one handler per request kind.
    handlers: RwLock<HashMap<TypeId, ErasedRequestHandler>>,
    next_subscription: AtomicU64,
}

impl EventBus {
    pub(crate) fn new() -> Self {
        EventBus {
            subscribers: RwLock::new(HashMap::default()),
            handlers: RwLock::new(HashMap::default()),
            next_subscription: AtomicU64::new(0),
        }
    }

    /// Subscribes `handler` to every emission of events of type `E`, in subscription
    /// order relative to other handlers for `E`.
    pub fn subscribe<E: Any + Send + Sync>(
        &self,
        handler: impl Fn(&Context, &E) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        let erased: ErasedEventHandler = Arc::new(move |context, event| {
            if let Some(event) = event.downcast_ref::<E>() {
                handler(context, event);
            }
        });
        self.subscribers
            .write()
            .entry(TypeId::of::<E>())
            .or_default()
            .push(Subscriber { id, handler: erased });
        id
    }

    /// Removes a subscription. Returns whether it was still registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        for list in subscribers.values_mut() {
            if let Some(position) = list.iter().position(|subscriber| subscriber.id == id) {
                list.remove(position);
                return true;
            }
        }
        false
    }

    /// Fire-and-forget emission. Callers emit only after the mutation the event reports
    /// is visible to other threads; the bus itself delivers on the calling thread and
    /// makes no guarantee about when delivery completes relative to the caller's
    /// subsequent work.
    pub fn post<E: Any + Send + Sync>(&self, context: &Context, event: &E) {
        self.dispatch(context, event);
    }

    /// Synchronous emission: every matching handler has run to completion when this
    /// returns. Used for notifications observers must see *before* a mutation proceeds.
    pub fn send<E: Any + Send + Sync>(&self, context: &Context, event: &E) {
        self.dispatch(context, event);
    }

    fn dispatch<E: Any>(&self, context: &Context, event: &E) {
        // Handlers run with the subscriber table unlocked so they may themselves
        // subscribe, unsubscribe, or emit without deadlocking.
        let matching: Vec<ErasedEventHandler> = {
            let subscribers = self.subscribers.read();
            match subscribers.get(&TypeId::of::<E>()) {
                Some(list) => list
                    .iter()
                    .map(|subscriber| Arc::clone(&subscriber.handler))
                    .collect(),
                None => return,
            }
        };
        for handler in matching {
            handler(context, event);
        }
    }

    /// Registers the handler for request kind `R`. Fails with `DuplicateHandler` if one
    /// is already registered.
    pub fn register_handler<R: Request>(
        &self,
        handler: impl Fn(&Context, R) -> Result<R::Response, HolonError> + Send + Sync + 'static,
    ) -> Result<(), HolonError> {
        let erased: ErasedRequestHandler = Arc::new(move |context, request| {
            let request = request
                .downcast::<R>()
                .map_err(|_| HolonError::from(format!("request payload is not a {}", type_name::<R>())))?;
            let response = handler(context, *request)?;
            Ok(Box::new(response) as Box<dyn Any>)
        });
        let mut handlers = self.handlers.write();
        if handlers.contains_key(&TypeId::of::<R>()) {
            return Err(HolonError::DuplicateHandler(type_name::<R>()));
        }
        handlers.insert(TypeId::of::<R>(), erased);
        Ok(())
    }

    /// Dispatches `request` synchronously and returns the handler's response.
    pub fn query<R: Request>(&self, context: &Context, request: R) -> Result<R::Response, HolonError> {
        let handler = {
            let handlers = self.handlers.read();
            match handlers.get(&TypeId::of::<R>()) {
                Some(handler) => Arc::clone(handler),
                None => return Err(HolonError::NoHandler(type_name::<R>())),
            }
        };
        let response = handler(context, Box::new(request))?;
        match response.downcast::<R::Response>() {
            Ok(response) => Ok(*response),
            Err(_) => Err(HolonError::from(format!(
                "response payload does not match {}",
                type_name::<R>()
            ))),
        }
    }

    /// Dispatches `request` synchronously as a command, discarding the response.
    pub fn send_request<R: Request>(&self, context: &Context, request: R) -> Result<(), HolonError> {
        self.query(context, request).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::context::Context;

    struct Ping(u32);
    impl Request for Ping {
        type Response = u32;
    }

    struct Fired(&'static str);

    #[test]
    fn subscribers_receive_posted_events() {
        let context = Context::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        context.subscribe(move |_context, _event: &Fired| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        context.post(&Fired("a"));
        context.post(&Fired("b"));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn handlers_run_in_subscription_order() {
        let context = Context::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order_clone = order.clone();
            context.subscribe(move |_context, _event: &Fired| {
                order_clone.lock().push(tag);
            });
        }

        context.send(&Fired("x"));
        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn events_are_routed_by_type() {
        struct Other;
        let context = Context::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        context.subscribe(move |_context, _event: &Fired| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        context.post(&Other);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let context = Context::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let subscription = context.subscribe(move |_context, _event: &Fired| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        context.post(&Fired("a"));
        assert!(context.unsubscribe(subscription));
        context.post(&Fired("b"));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        // A second unsubscribe finds nothing.
        assert!(!context.unsubscribe(subscription));
    }

    #[test]
    fn handlers_receive_the_owning_context() {
        let context = Context::new();
        let expected = context.id();
        let seen = Arc::new(Mutex::new(None));
        let seen_clone = seen.clone();
        context.subscribe(move |context: &Context, _event: &Fired| {
            *seen_clone.lock() = Some(context.id());
        });

        context.send(&Fired("x"));
        assert_eq!(*seen.lock(), Some(expected));
    }

    #[test]
    fn query_round_trip() {
        let context = Context::new();
        context
            .register_handler(|_context: &Context, request: Ping| Ok(request.0 + 1))
            .unwrap();

        assert_eq!(context.query(Ping(41)).unwrap(), 42);
        context.send_request(Ping(0)).unwrap();
    }

    #[test]
    fn missing_handler_is_an_error() {
        let context = Context::new();
        let error = context.query(Ping(0)).unwrap_err();
        assert!(matches!(error, HolonError::NoHandler(_)));
    }

    #[test]
    fn duplicate_handler_registration_is_an_error() {
        let context = Context::new();
        context
            .register_handler(|_context: &Context, request: Ping| Ok(request.0))
            .unwrap();
        let error = context
            .register_handler(|_context: &Context, request: Ping| Ok(request.0))
            .unwrap_err();
        assert!(matches!(error, HolonError::DuplicateHandler(_)));
    }

    #[test]
    fn handlers_may_emit_from_within_a_dispatch() {
        struct Inner;
        let context = Context::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        context.subscribe(move |_context, _event: &Inner| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        context.subscribe(move |context: &Context, _event: &Fired| {
            context.post(&Inner);
        });

        context.post(&Fired("x"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
