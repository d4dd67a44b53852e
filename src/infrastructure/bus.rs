//! Event fan-out bus
//!
//! Publishes lifecycle and telemetry events to subscribers without ever
//! blocking the producer. Each subscriber owns a bounded channel; a full
//! channel drops the event for that subscriber only, so one slow consumer
//! never affects the others or the publishing loop.

use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use crate::core::{EventFilter, NetworkEvent};

struct SubscriberEntry {
    id: u64,
    filter: EventFilter,
    tx: Sender<NetworkEvent>,
}

/// Bounded stream of events for one subscriber
pub struct EventStream {
    rx: Receiver<NetworkEvent>,
}

impl EventStream {
    /// Non-blocking read
    pub fn try_next(&self) -> Option<NetworkEvent> {
        self.rx.try_recv().ok()
    }

    /// Blocking read with a timeout, for tests and cold-path consumers
    pub fn next_timeout(&self, timeout: Duration) -> Option<NetworkEvent> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Events currently queued
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Fan-out bus with per-subscriber bounded channels
pub struct EventBus {
    subscribers: RwLock<Vec<SubscriberEntry>>,
    subscriber_count: AtomicUsize,
    next_id: AtomicU64,
    dropped: AtomicU64,
    depth: usize,
}

impl EventBus {
    /// Create a bus; every subscriber stream holds at most `depth` events
    pub fn new(depth: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            subscriber_count: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
            dropped: AtomicU64::new(0),
            depth,
        }
    }

    /// Register a subscriber for a kind, or for everything
    pub fn subscribe(&self, filter: EventFilter) -> EventStream {
        let (tx, rx) = bounded(self.depth);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .write()
            .push(SubscriberEntry { id, filter, tx });
        self.subscriber_count.fetch_add(1, Ordering::Release);
        EventStream { rx }
    }

    /// True when at least one subscriber is registered
    ///
    /// Lets the packet loops skip event construction entirely when nobody
    /// is listening.
    #[inline]
    pub fn has_subscribers(&self) -> bool {
        self.subscriber_count.load(Ordering::Acquire) > 0
    }

    /// Deliver an event to every matching subscriber, never blocking
    ///
    /// A full subscriber channel drops the event for that subscriber only.
    /// Dropped-receiver subscriptions are garbage collected on the way.
    pub fn publish(&self, event: NetworkEvent) {
        let mut dead: Vec<u64> = Vec::new();
        {
            let subscribers = self.subscribers.read();
            for entry in subscribers.iter() {
                if !entry.filter.matches(event.kind) {
                    continue;
                }
                match entry.tx.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(TrySendError::Disconnected(_)) => dead.push(entry.id),
                }
            }
        }
        if !dead.is_empty() {
            let mut subscribers = self.subscribers.write();
            subscribers.retain(|entry| !dead.contains(&entry.id));
            self.subscriber_count
                .store(subscribers.len(), Ordering::Release);
        }
    }

    /// Events dropped on full subscriber channels since startup
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn subscriber_len(&self) -> usize {
        self.subscriber_count.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ConnectionId, EventKind};

    fn event(kind: EventKind, ts: u64) -> NetworkEvent {
        NetworkEvent::new(kind, ts)
    }

    #[test]
    fn test_filtered_delivery() {
        let bus = EventBus::new(8);
        let opens = bus.subscribe(EventFilter::Kind(EventKind::ConnectionOpened));
        let all = bus.subscribe(EventFilter::All);

        bus.publish(event(EventKind::ConnectionOpened, 1));
        bus.publish(event(EventKind::PacketSent, 2));

        assert_eq!(opens.len(), 1);
        assert_eq!(all.len(), 2);
        assert_eq!(opens.try_next().unwrap().kind, EventKind::ConnectionOpened);
    }

    #[test]
    fn test_slow_subscriber_isolation() {
        // A saturated subscriber misses events; an unsaturated subscriber
        // to the same kind still receives all of them.
        let bus = EventBus::new(2);
        let slow = bus.subscribe(EventFilter::Kind(EventKind::LatencyAlert));
        let healthy = bus.subscribe(EventFilter::Kind(EventKind::LatencyAlert));

        for i in 0..5 {
            bus.publish(event(EventKind::LatencyAlert, i));
            // The healthy subscriber keeps draining
            assert!(healthy.try_next().is_some());
        }

        // The slow one kept only its channel depth
        assert_eq!(slow.len(), 2);
        assert_eq!(bus.dropped(), 3);
    }

    #[test]
    fn test_publish_never_blocks_on_full() {
        let bus = EventBus::new(1);
        let _stream = bus.subscribe(EventFilter::All);
        // Far more events than the channel holds; publish must return
        for i in 0..100 {
            bus.publish(event(EventKind::PacketSent, i));
        }
        assert_eq!(bus.dropped(), 99);
    }

    #[test]
    fn test_dead_subscriber_cleanup() {
        let bus = EventBus::new(4);
        let stream = bus.subscribe(EventFilter::All);
        assert_eq!(bus.subscriber_len(), 1);
        assert!(bus.has_subscribers());

        drop(stream);
        // First publish after the drop hits the disconnected channel
        bus.publish(event(EventKind::PacketSent, 1));
        assert_eq!(bus.subscriber_len(), 0);
        assert!(!bus.has_subscribers());
    }

    #[test]
    fn test_event_payload_travels() {
        let bus = EventBus::new(4);
        let stream = bus.subscribe(EventFilter::Kind(EventKind::ConnectionClosed));
        bus.publish(
            event(EventKind::ConnectionClosed, 9)
                .with_connection(ConnectionId(3))
                .with_detail("idle timeout"),
        );

        let received = stream.try_next().unwrap();
        assert_eq!(received.connection, Some(ConnectionId(3)));
        assert_eq!(received.detail.as_deref(), Some("idle timeout"));
    }
}
