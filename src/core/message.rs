//! Application message types
//!
//! A Message exists only to be serialized into a pooled buffer on send, or
//! materialized from one on receipt. It has no persisted identity.

use bytes::Bytes;
use std::time::Duration;
use uuid::Uuid;

use super::ConnectionId;

/// Message classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    MarketData = 1,
    OrderUpdate = 2,
    Trade = 3,
    Heartbeat = 4,
    Control = 5,
}

impl MessageKind {
    /// Decode from the numeric tag, if valid
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::MarketData),
            2 => Some(Self::OrderUpdate),
            3 => Some(Self::Trade),
            4 => Some(Self::Heartbeat),
            5 => Some(Self::Control),
            _ => None,
        }
    }
}

/// Delivery priority. High and Critical traffic rides the priority lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Priority {
    Low = 0,
    Normal = 1,
    High = 2,
    Critical = 3,
}

impl Priority {
    /// Returns true if this priority is routed through the priority lane
    #[inline(always)]
    pub const fn is_express(&self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }

    /// Decode from the numeric tag, if valid
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Low),
            1 => Some(Self::Normal),
            2 => Some(Self::High),
            3 => Some(Self::Critical),
            _ => None,
        }
    }
}

/// Transient application message
///
/// `destination` must name an open connection for `send`; `source` is filled
/// in by the transport on receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Unique message id
    pub id: Uuid,
    /// Message classification
    pub kind: MessageKind,
    /// Encoded payload bytes (codec-owned format)
    pub payload: Bytes,
    /// Connection the message arrived on (set by the transport)
    pub source: Option<ConnectionId>,
    /// Connection the message should leave on
    pub destination: Option<ConnectionId>,
    /// Delivery priority
    pub priority: Priority,
    /// Drop the message if it is still queued after this long
    pub ttl: Option<Duration>,
}

impl Message {
    /// Create an outbound message with Normal priority and no TTL
    pub fn new(kind: MessageKind, destination: ConnectionId, payload: Bytes) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            payload,
            source: None,
            destination: Some(destination),
            priority: Priority::Normal,
            ttl: None,
        }
    }

    /// Set the delivery priority
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the time-to-live
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}
