//! Lifecycle and telemetry events
//!
//! Events are immutable records published by the processing loops and the
//! latency monitor, consumed once per subscriber through the fan-out bus.

use uuid::Uuid;

use super::ConnectionId;

/// Event classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventKind {
    PacketSent = 1,
    PacketReceived = 2,
    PacketDropped = 3,
    ConnectionOpened = 4,
    ConnectionClosed = 5,
    LatencyAlert = 6,
    TransportError = 7,
}

/// Subscription filter: a single event kind, or everything
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
    Kind(EventKind),
    All,
}

impl EventFilter {
    /// Returns true if an event of `kind` passes this filter
    #[inline(always)]
    pub const fn matches(&self, kind: EventKind) -> bool {
        match self {
            Self::All => true,
            Self::Kind(wanted) => *wanted as u8 == kind as u8,
        }
    }
}

/// Immutable event record
#[derive(Debug, Clone)]
pub struct NetworkEvent {
    /// Unique event id
    pub id: Uuid,
    /// Event classification
    pub kind: EventKind,
    /// Monotonic timestamp, nanoseconds since transport start
    pub timestamp_ns: u64,
    /// Connection the event concerns, if any
    pub connection: Option<ConnectionId>,
    /// Observed latency for latency-related events
    pub latency_ns: Option<u64>,
    /// Human-readable context, cold path only
    pub detail: Option<String>,
}

impl NetworkEvent {
    /// Create an event record
    pub fn new(kind: EventKind, timestamp_ns: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            timestamp_ns,
            connection: None,
            latency_ns: None,
            detail: None,
        }
    }

    #[must_use]
    pub fn with_connection(mut self, id: ConnectionId) -> Self {
        self.connection = Some(id);
        self
    }

    #[must_use]
    pub fn with_latency(mut self, latency_ns: u64) -> Self {
        self.latency_ns = Some(latency_ns);
        self
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_matches() {
        let specific = EventFilter::Kind(EventKind::LatencyAlert);
        assert!(specific.matches(EventKind::LatencyAlert));
        assert!(!specific.matches(EventKind::PacketSent));

        let all = EventFilter::All;
        assert!(all.matches(EventKind::PacketSent));
        assert!(all.matches(EventKind::ConnectionClosed));
    }

    #[test]
    fn test_event_builder() {
        let event = NetworkEvent::new(EventKind::LatencyAlert, 123)
            .with_connection(ConnectionId(4))
            .with_latency(90_000)
            .with_detail("target exceeded");

        assert_eq!(event.kind, EventKind::LatencyAlert);
        assert_eq!(event.timestamp_ns, 123);
        assert_eq!(event.connection, Some(ConnectionId(4)));
        assert_eq!(event.latency_ns, Some(90_000));
        assert_eq!(event.detail.as_deref(), Some("target exceeded"));
    }
}
