//! Typed publish/subscribe bus connecting helpers and provider engines.
//!
//! Two delivery modes:
//! - **Synchronous**: [`EventBus::subscribe`] registers a handler that runs
//!   on the posting thread before [`EventBus::post`] returns. Used for
//!   lifecycle and activity-result events, where ordering relative to the
//!   emitting call matters, and for responses delivered to helpers.
//! - **Deferred**: [`EventBus::subscribe_stream`] hands back an
//!   [`EventStream`] that a background task drains. Used for requests so a
//!   slow provider never blocks the poster.
//!
//! Unsubscribing is safe at any time. A post that already snapshotted the
//! subscriber list, or events already queued on a stream, are skipped once
//! the subscription is gone.

use iabhub_types::{BillingEvent, EventKind};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// A synchronous bus subscriber.
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &BillingEvent);
}

impl<F> EventHandler for F
where
    F: Fn(&BillingEvent) + Send + Sync,
{
    fn on_event(&self, event: &BillingEvent) {
        self(event)
    }
}

/// Identifies one subscription on a bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Handle returned by the subscribe calls. Pass it back to
/// [`EventBus::unsubscribe`] to stop delivery.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    active: Arc<AtomicBool>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Whether the bus still delivers to this subscription.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

/// Receiving end of a deferred subscription.
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<BillingEvent>,
    active: Arc<AtomicBool>,
}

impl EventStream {
    /// Waits for the next event. Returns `None` once the subscription has
    /// been removed; events still queued at that point are discarded.
    pub async fn recv(&mut self) -> Option<BillingEvent> {
        loop {
            if !self.active.load(Ordering::Acquire) {
                return None;
            }
            let event = self.rx.recv().await?;
            if self.active.load(Ordering::Acquire) {
                return Some(event);
            }
        }
    }

    /// Returns the next queued event without waiting.
    pub fn try_recv(&mut self) -> Option<BillingEvent> {
        if !self.active.load(Ordering::Acquire) {
            return None;
        }
        self.rx.try_recv().ok()
    }
}

enum Sink {
    Handler(Arc<dyn EventHandler>),
    Stream(mpsc::UnboundedSender<BillingEvent>),
}

struct Entry {
    id: SubscriptionId,
    kinds: Vec<EventKind>,
    sink: Sink,
    active: Arc<AtomicBool>,
}

impl Entry {
    fn accepts(&self, kind: EventKind) -> bool {
        self.kinds.contains(&kind)
    }

    fn deliver(&self, event: &BillingEvent) -> bool {
        if !self.active.load(Ordering::Acquire) {
            trace!("skipping delivery to torn-down subscriber {}", self.id);
            return false;
        }
        match &self.sink {
            Sink::Handler(handler) => {
                handler.on_event(event);
                true
            }
            Sink::Stream(tx) => tx.send(event.clone()).is_ok(),
        }
    }
}

struct BusInner {
    entries: RwLock<Vec<Arc<Entry>>>,
    next_id: AtomicU64,
}

/// The billing bus. Cloning yields another handle to the same bus.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                entries: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Registers a handler that runs on the posting thread for every event
    /// of the given kinds.
    pub fn subscribe(&self, kinds: &[EventKind], handler: Arc<dyn EventHandler>) -> Subscription {
        self.register(kinds, Sink::Handler(handler))
    }

    /// Registers a deferred subscriber. Events of the given kinds are queued
    /// on the returned stream.
    pub fn subscribe_stream(&self, kinds: &[EventKind]) -> (Subscription, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.register(kinds, Sink::Stream(tx));
        let stream = EventStream {
            rx,
            active: subscription.active.clone(),
        };
        (subscription, stream)
    }

    fn register(&self, kinds: &[EventKind], sink: Sink) -> Subscription {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let active = Arc::new(AtomicBool::new(true));
        let entry = Arc::new(Entry {
            id,
            kinds: kinds.to_vec(),
            sink,
            active: active.clone(),
        });
        self.inner
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
        debug!("subscribed {} to {:?}", id, kinds);
        Subscription { id, active }
    }

    /// Removes a subscription. Returns false if it was already removed.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        subscription.active.store(false, Ordering::Release);
        let mut entries = self
            .inner
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|e| e.id != subscription.id);
        let removed = entries.len() != before;
        if removed {
            debug!("unsubscribed {}", subscription.id);
        }
        removed
    }

    /// Publishes an event. Returns how many subscribers it reached.
    ///
    /// The subscriber list is snapshotted before delivery, so handlers may
    /// post, subscribe or unsubscribe re-entrantly.
    pub fn post(&self, event: impl Into<BillingEvent>) -> usize {
        let event = event.into();
        let kind = event.kind();
        let targets: Vec<Arc<Entry>> = self
            .inner
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.accepts(kind))
            .cloned()
            .collect();

        let delivered = targets.iter().filter(|e| e.deliver(&event)).count();
        trace!("posted {:?} event to {} subscriber(s)", kind, delivered);
        delivered
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the subscription is still registered on this bus.
    pub fn is_subscribed(&self, subscription: &Subscription) -> bool {
        self.inner
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|e| e.id == subscription.id)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
