//! Pub/sub event dispatcher.
//!
//! Two namespaces: `Sdk` events come from the exchange connectivity layer
//! (book updates, fills, order-status pushes); `Domain` events are raised by
//! the strategy itself (`position_opened`, `position_closed`,
//! `guard_rejected`, ...). Grounded on the teacher's `core/service/events.rs`
//! pub/sub bus, generalized to two namespaces and snapshot-based dispatch so
//! a handler that subscribes/unsubscribes from within a callback cannot
//! deadlock or skip siblings.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::warn;

/// Which bus an event was raised on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventNamespace {
    Sdk,
    Domain,
}

/// An opaque token returned by [`EventDispatcher::subscribe`]; pass it to
/// [`EventDispatcher::unsubscribe`] to remove the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(u64);

/// Matches every event name on the namespace it is registered against.
pub const WILDCARD_EVENT: &str = "*";

type Handler = Box<dyn Fn(&str, &Value) + Send + Sync>;
type ErrorHandler = Box<dyn Fn(&str, &str) + Send + Sync>;

struct Subscription {
    token: SubscriptionToken,
    event_name: String,
    handler: Handler,
}

struct ErrorSubscription {
    token: SubscriptionToken,
    handler: ErrorHandler,
}

/// A pub/sub dispatcher. Handlers that panic or are otherwise unable to
/// complete do not prevent later handlers for the same event from running;
/// dispatch iterates over a snapshot taken at publish time, so a handler
/// that subscribes or unsubscribes during dispatch affects only the next
/// publish. A handler's panic is also routed to every registered error
/// sink (see [`on_handler_error`](Self::on_handler_error)) in addition to
/// being logged.
pub struct EventDispatcher {
    next_token: AtomicU64,
    subs: Mutex<HashMap<EventNamespace, Vec<Arc<Subscription>>>>,
    error_handlers: Mutex<Vec<Arc<ErrorSubscription>>>,
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_token: AtomicU64::new(1),
            subs: Mutex::new(HashMap::new()),
            error_handlers: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe `handler` to `event_name` on `namespace`, or to every event
    /// on that namespace when `event_name` is [`WILDCARD_EVENT`] (`"*"`).
    /// Returns a token usable with [`unsubscribe`](Self::unsubscribe).
    pub fn subscribe(
        &self,
        namespace: EventNamespace,
        event_name: impl Into<String>,
        handler: impl Fn(&str, &Value) + Send + Sync + 'static,
    ) -> SubscriptionToken {
        let token = SubscriptionToken(self.next_token.fetch_add(1, Ordering::SeqCst));
        let mut subs = self.subs.lock();
        subs.entry(namespace).or_default().push(Arc::new(Subscription {
            token,
            event_name: event_name.into(),
            handler: Box::new(handler),
        }));
        token
    }

    /// Remove a previously registered subscription. No-op if already gone.
    pub fn unsubscribe(&self, namespace: EventNamespace, token: SubscriptionToken) {
        let mut subs = self.subs.lock();
        if let Some(list) = subs.get_mut(&namespace) {
            list.retain(|s| s.token != token);
        }
    }

    /// Register a handler invoked whenever a subscriber panics during
    /// dispatch, with the event name and a description of the panic
    /// payload. Returns a token usable with
    /// [`remove_error_handler`](Self::remove_error_handler).
    pub fn on_handler_error(
        &self,
        handler: impl Fn(&str, &str) + Send + Sync + 'static,
    ) -> SubscriptionToken {
        let token = SubscriptionToken(self.next_token.fetch_add(1, Ordering::SeqCst));
        self.error_handlers.lock().push(Arc::new(ErrorSubscription { token, handler: Box::new(handler) }));
        token
    }

    /// Remove a previously registered error handler. No-op if already gone.
    pub fn remove_error_handler(&self, token: SubscriptionToken) {
        self.error_handlers.lock().retain(|s| s.token != token);
    }

    /// Drop every subscription and error handler, returning the dispatcher
    /// to a freshly constructed state.
    pub fn clear(&self) {
        self.subs.lock().clear();
        self.error_handlers.lock().clear();
    }

    /// Publish `event_name` with `payload` to every matching subscriber on
    /// `namespace`, including subscribers registered against
    /// [`WILDCARD_EVENT`]. Dispatch iterates a snapshot of handlers
    /// registered at call time; each handler is invoked best-effort and a
    /// handler that panics is caught, logged, and routed to every
    /// registered error sink rather than aborting the publish.
    pub fn publish(&self, namespace: EventNamespace, event_name: &str, payload: &Value) {
        let snapshot: Vec<Arc<Subscription>> = {
            let subs = self.subs.lock();
            match subs.get(&namespace) {
                Some(list) => list
                    .iter()
                    .filter(|s| s.event_name == event_name || s.event_name == WILDCARD_EVENT)
                    .cloned()
                    .collect(),
                None => return,
            }
        };

        for sub in &snapshot {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                (sub.handler)(event_name, payload);
            }));
            if let Err(panic_payload) = result {
                let message = panic_message(&panic_payload);
                warn!(event = event_name, message = %message, "event handler panicked");
                self.notify_error_handlers(event_name, &message);
            }
        }
    }

    fn notify_error_handlers(&self, event_name: &str, message: &str) {
        let handlers: Vec<Arc<ErrorSubscription>> = self.error_handlers.lock().clone();
        for handler in &handlers {
            (handler.handler)(event_name, message);
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
