//! Layer-owned event bus and the coalesced "tiles changed" signal.
//!
//! Every component that publishes or observes tile events receives an
//! [`EventBus`] handle from the layer that owns it. Subscriptions are explicit:
//! subscribe on attach, unsubscribe on detach.

use crate::prelude::{Arc, HashMap, Mutex};
use crate::tiles::position::TilePosition;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Events published by a tile layer and its collaborators
#[derive(Debug, Clone, PartialEq)]
pub enum TileEvent {
    /// One or more tiles finished loading since the last frame; repaint.
    ContentChanged { generation: u64 },
    /// The zoom level tiles are fetched for changed
    ZoomChanged { from: u8, to: u8 },
    /// Outstanding fetch jobs were cancelled
    JobsCancelled { count: usize },
    /// A tile failed to load
    TileFailed { position: TilePosition, message: String },
    /// The memory reservation for the tile cache could not be made
    MemoryUnavailable { requested: usize },
    /// The layer released its resources
    Detached,
}

/// Event listener callback type
pub type EventCallback = Arc<dyn Fn(&TileEvent) + Send + Sync>;

/// Handle returned by `subscribe`, used to unsubscribe again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

enum Subscriber {
    Callback(EventCallback),
    Channel(Sender<TileEvent>),
}

#[derive(Default)]
struct BusInner {
    subscribers: Mutex<HashMap<u64, Subscriber>>,
    next_id: AtomicU64,
}

/// Cloneable, thread-safe publish/subscribe hub
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback, invoked synchronously on the publishing thread
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&TileEvent) + Send + Sync + 'static,
    {
        self.insert(Subscriber::Callback(Arc::new(callback)))
    }

    /// Register a channel subscriber; events are queued for the receiver
    pub fn subscribe_channel(&self) -> (SubscriptionId, Receiver<TileEvent>) {
        let (tx, rx) = unbounded();
        (self.insert(Subscriber::Channel(tx)), rx)
    }

    /// Remove a subscription; returns false if it was not registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        match self.inner.subscribers.lock() {
            Ok(mut subscribers) => subscribers.remove(&id.0).is_some(),
            Err(_) => false,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .lock()
            .map(|subscribers| subscribers.len())
            .unwrap_or(0)
    }

    /// Deliver an event to every subscriber.
    ///
    /// Callbacks run outside the registry lock so they may subscribe or
    /// unsubscribe themselves.
    pub fn publish(&self, event: TileEvent) {
        let mut callbacks = Vec::new();
        let mut closed = Vec::new();

        if let Ok(subscribers) = self.inner.subscribers.lock() {
            for (id, subscriber) in subscribers.iter() {
                match subscriber {
                    Subscriber::Callback(callback) => callbacks.push(Arc::clone(callback)),
                    Subscriber::Channel(tx) => {
                        if tx.send(event.clone()).is_err() {
                            closed.push(*id);
                        }
                    }
                }
            }
        }

        if !closed.is_empty() {
            if let Ok(mut subscribers) = self.inner.subscribers.lock() {
                for id in closed {
                    subscribers.remove(&id);
                }
            }
        }

        for callback in callbacks {
            callback(&event);
        }
    }

    fn insert(&self, subscriber: Subscriber) -> SubscriptionId {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut subscribers) = self.inner.subscribers.lock() {
            subscribers.insert(id, subscriber);
        }
        SubscriptionId(id)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Coalesces tile completions into at most one pending
/// [`TileEvent::ContentChanged`] until the render thread acknowledges it.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    generation: AtomicU64,
    pending: AtomicBool,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a change; publishes only when no notification is pending
    pub fn mark_changed(&self, bus: &EventBus) {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        if !self.pending.swap(true, Ordering::AcqRel) {
            bus.publish(TileEvent::ContentChanged { generation });
        }
    }

    /// Clear the pending flag; returns whether anything changed since the
    /// previous acknowledgement
    pub fn acknowledge(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        let id = bus.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(TileEvent::Detached);
        assert!(bus.unsubscribe(id));
        bus.publish(TileEvent::Detached);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_separate_buses_do_not_leak() {
        let first = EventBus::new();
        let second = EventBus::new();
        let (_, rx) = first.subscribe_channel();

        second.publish(TileEvent::JobsCancelled { count: 3 });
        first.publish(TileEvent::JobsCancelled { count: 1 });

        assert_eq!(rx.try_recv(), Ok(TileEvent::JobsCancelled { count: 1 }));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dropped_channel_is_pruned() {
        let bus = EventBus::new();
        let (_, rx) = bus.subscribe_channel();
        drop(rx);

        bus.publish(TileEvent::Detached);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_change_tracker_coalesces() {
        let bus = EventBus::new();
        let (_, rx) = bus.subscribe_channel();
        let tracker = ChangeTracker::new();

        tracker.mark_changed(&bus);
        tracker.mark_changed(&bus);
        tracker.mark_changed(&bus);

        assert_eq!(rx.try_iter().count(), 1);
        assert_eq!(tracker.generation(), 3);
        assert!(tracker.acknowledge());
        assert!(!tracker.acknowledge());

        tracker.mark_changed(&bus);
        assert_eq!(rx.try_iter().count(), 1);
    }
}
