//! Core transport types
//!
//! This module contains the fundamental types used throughout the system:
//! - Message: transient application message moving through the transport
//! - Connection: pooled logical connection with lifecycle state
//! - NetworkEvent: immutable lifecycle/telemetry record

pub mod connection;
pub mod event;
pub mod message;

pub use connection::{
    Connection, ConnectionHandle, ConnectionId, ConnectionState, ConnectionStats, TransportKind,
};
pub use event::{EventFilter, EventKind, NetworkEvent};
pub use message::{Message, MessageKind, Priority};
