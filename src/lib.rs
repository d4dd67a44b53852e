//! Ultra-low latency network transport core
//!
//! Moves market-data and order messages with microsecond-class latency
//! targets. The crate makes explicit, testable guarantees about ordering,
//! back-pressure, latency accounting, and resource reuse under concurrent
//! access; socket bindings and wire formats stay behind the driver and
//! codec seams.
//!
//! # Architecture
//! - **core**: plain data types (Message, Connection, NetworkEvent)
//! - **hot_path**: latency-critical machinery (buffer pool, lanes, clock)
//! - **conn**: connection pool and lifecycle management
//! - **driver**: transport driver seam plus the in-memory loopback
//! - **codec**: message codec seam
//! - **engine**: the TransportCore facade and its processing loops
//! - **infrastructure**: cold path (config, logging, metrics, affinity, bus)

pub mod codec;
pub mod conn;
pub mod core;
pub mod driver;
pub mod engine;
pub mod hot_path;
pub mod infrastructure;

#[cfg(test)]
pub mod test_utils;

// Re-export commonly used types
pub use codec::{CodecError, MessageCodec};
pub use conn::ConnectionError;
pub use crate::core::{
    ConnectionHandle, ConnectionId, ConnectionState, EventFilter, EventKind, Message,
    MessageKind, NetworkEvent, Priority, TransportKind,
};
pub use driver::{DriverError, DriverHandle, LoopbackDriver, RecvMeta, TransportDriver};
pub use engine::{RecvError, SendError, TransportCore};
pub use hot_path::{Lane, QueueError};
pub use infrastructure::{Config, ConfigError, MetricsSnapshot};

use thiserror::Error;

/// Main error type for the transport core
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("queue error: {0}")]
    Queue(#[from] hot_path::QueueError),

    #[error("send error: {0}")]
    Send(#[from] engine::SendError),

    #[error("receive error: {0}")]
    Recv(#[from] engine::RecvError),

    #[error("connection error: {0}")]
    Connection(#[from] conn::ConnectionError),

    #[error("driver error: {0}")]
    Driver(#[from] driver::DriverError),

    #[error("codec error: {0}")]
    Codec(#[from] codec::CodecError),

    #[error("configuration error: {0}")]
    Config(#[from] infrastructure::ConfigError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, TransportError>;
