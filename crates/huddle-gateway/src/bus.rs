use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::mpsc;
use tracing::trace;
use uuid::Uuid;

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Subscriber<T> {
    id: Uuid,
    active: Arc<AtomicBool>,
    handler: Handler<T>,
}

/// In-process publish/subscribe channel.
///
/// Delivery is synchronous: `publish` runs every current handler, in
/// subscription order, before it returns. Nothing is buffered, so a handler
/// only sees events published after it subscribed.
pub struct EventBus<T> {
    inner: Arc<BusInner<T>>,
}

struct BusInner<T> {
    name: &'static str,
    subscribers: Mutex<Vec<Subscriber<T>>>,
}

impl<T> Clone for EventBus<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> EventBus<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            inner: Arc::new(BusInner {
                name,
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Register a handler. It runs once per published event until the
    /// returned [`Subscription`] is cancelled or dropped.
    #[must_use = "dropping a Subscription unsubscribes it"]
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = Uuid::new_v4();
        let active = Arc::new(AtomicBool::new(true));

        self.inner.lock().push(Subscriber {
            id,
            active: active.clone(),
            handler: Arc::new(handler),
        });
        trace!(bus = self.inner.name, %id, "subscribed");

        let bus: Weak<dyn Detach> = Arc::downgrade(&self.inner) as Weak<dyn Detach>;
        Subscription { id, active, bus }
    }

    /// Deliver `event` to every active subscriber. Returns how many ran.
    ///
    /// The subscriber list is not locked while handlers run, so a handler may
    /// subscribe, unsubscribe or publish again without deadlocking.
    pub fn publish(&self, event: T) -> usize {
        let snapshot: Vec<(Arc<AtomicBool>, Handler<T>)> = self
            .inner
            .lock()
            .iter()
            .map(|s| (s.active.clone(), s.handler.clone()))
            .collect();

        let mut delivered = 0;
        for (active, handler) in snapshot {
            // Cancelled after the snapshot was taken
            if !active.load(Ordering::Acquire) {
                continue;
            }
            handler(&event);
            delivered += 1;
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().len()
    }
}

impl<T: Clone + Send + 'static> EventBus<T> {
    /// Subscribe by forwarding every event into a channel, for consumers that
    /// process events on their own task. Dropping the subscription stops the
    /// forwarding; events already forwarded stay in the receiver.
    #[must_use = "dropping a Subscription unsubscribes it"]
    pub fn subscribe_channel(&self) -> (Subscription, mpsc::UnboundedReceiver<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe(move |event: &T| {
            let _ = tx.send(event.clone());
        });
        (subscription, rx)
    }
}

impl<T> BusInner<T> {
    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Subscriber<T>>> {
        self.subscribers.lock().expect("subscriber lock poisoned")
    }
}

trait Detach: Send + Sync {
    fn detach(&self, id: Uuid);
}

impl<T> Detach for BusInner<T> {
    fn detach(&self, id: Uuid) {
        self.lock().retain(|s| s.id != id);
        trace!(bus = self.name, %id, "unsubscribed");
    }
}

/// Handle to an active bus subscription.
///
/// Cancelling is idempotent and takes effect immediately: once `unsubscribe`
/// returns the handler never runs again, even for a publish already in flight.
pub struct Subscription {
    id: Uuid,
    active: Arc<AtomicBool>,
    bus: Weak<dyn Detach>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(bus) = self.bus.upgrade() {
            bus.detach(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
