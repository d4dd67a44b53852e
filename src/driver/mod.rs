//! Transport driver seam
//!
//! The transport core never touches sockets itself. A driver resolves
//! addresses, owns socket-like handles, and moves bytes. A conforming
//! driver may be a plain OS socket layer or a specialized low-latency
//! stack; the core assumes nothing beyond this contract.

pub mod loopback;

pub use loopback::LoopbackDriver;

use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

use crate::core::TransportKind;

/// Opaque token for a driver-owned socket-like handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DriverHandle(pub u64);

/// Metadata for one received datagram
#[derive(Debug, Clone, Copy)]
pub struct RecvMeta {
    /// Handle the bytes arrived on
    pub handle: DriverHandle,
    /// Number of valid bytes written into the caller's buffer
    pub len: usize,
    /// Sender address
    pub addr: SocketAddr,
}

/// Driver-side failures
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("address resolution failed: {0}")]
    Resolution(String),

    #[error("driver rejected the operation: {0}")]
    Rejected(String),

    #[error("unknown driver handle {0}")]
    UnknownHandle(u64),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Contract required of a transport driver
///
/// All methods are called concurrently from the packet loops and caller
/// threads; implementations must be internally synchronized. `poll_recv`
/// must return within roughly `deadline` whether or not data arrived.
pub trait TransportDriver: Send + Sync {
    /// Resolve a remote address string for a connection kind
    fn resolve(&self, kind: TransportKind, address: &str) -> Result<SocketAddr, DriverError>;

    /// Open a socket-like handle to a resolved remote
    fn open(&self, kind: TransportKind, remote: SocketAddr) -> Result<DriverHandle, DriverError>;

    /// Close a handle. Closing an unknown handle is not an error.
    fn close(&self, handle: DriverHandle) -> Result<(), DriverError>;

    /// Non-blocking timed read across all open handles
    ///
    /// Copies at most `buf.len()` bytes and returns the metadata, or None
    /// if nothing arrived within the deadline.
    fn poll_recv(&self, buf: &mut [u8], deadline: Duration)
        -> Result<Option<RecvMeta>, DriverError>;

    /// Best-effort write of a byte range on a handle
    fn send(&self, handle: DriverHandle, payload: &[u8]) -> Result<usize, DriverError>;
}
