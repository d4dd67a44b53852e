//! Logical connection objects
//!
//! Connections are owned by the connection pool and recycled on close. The
//! lifecycle state lives in an atomic so processing loops and the health
//! monitor can observe it without locking; the remaining fields are only
//! written while the object is uniquely owned (creation and recycling).

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use crate::driver::DriverHandle;

/// Connection identifier. Zero is reserved for "unassigned".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Transport flavor of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TransportKind {
    Udp = 1,
    Tcp = 2,
    Multicast = 3,
    Raw = 4,
}

/// Connection lifecycle state
///
/// Legal transitions: Connecting -> Connected -> Closing -> Closed, with
/// Error reachable from Connecting and Connected. No skips, no reversals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Connecting = 0,
    Connected = 1,
    Closing = 2,
    Closed = 3,
    Error = 4,
}

impl ConnectionState {
    #[inline]
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Connected,
            2 => Self::Closing,
            3 => Self::Closed,
            _ => Self::Error,
        }
    }

    /// Returns true while the connection can carry traffic
    #[inline(always)]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns true if `next` is a legal successor of `self`
    #[inline]
    pub const fn can_transition_to(&self, next: ConnectionState) -> bool {
        matches!(
            (self, next),
            (Self::Connecting, Self::Connected)
                | (Self::Connecting, Self::Error)
                | (Self::Connected, Self::Closing)
                | (Self::Connected, Self::Error)
                | (Self::Closing, Self::Closed)
        )
    }
}

/// Rolling per-connection statistics, updated from the packet loops
#[derive(Debug, Default)]
pub struct ConnectionStats {
    packets_in: AtomicU64,
    packets_out: AtomicU64,
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
    last_activity_ns: AtomicU64,
}

impl ConnectionStats {
    /// Record a received packet
    #[inline]
    pub fn record_in(&self, bytes: usize, now_ns: u64) {
        self.packets_in.fetch_add(1, Ordering::Relaxed);
        self.bytes_in.fetch_add(bytes as u64, Ordering::Relaxed);
        self.last_activity_ns.store(now_ns, Ordering::Relaxed);
    }

    /// Record a transmitted packet
    #[inline]
    pub fn record_out(&self, bytes: usize, now_ns: u64) {
        self.packets_out.fetch_add(1, Ordering::Relaxed);
        self.bytes_out.fetch_add(bytes as u64, Ordering::Relaxed);
        self.last_activity_ns.store(now_ns, Ordering::Relaxed);
    }

    /// Mark activity without counting a packet (open, keep-alive)
    #[inline]
    pub fn touch(&self, now_ns: u64) {
        self.last_activity_ns.store(now_ns, Ordering::Relaxed);
    }

    #[inline]
    pub fn packets_in(&self) -> u64 {
        self.packets_in.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn packets_out(&self) -> u64 {
        self.packets_out.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn bytes_in(&self) -> u64 {
        self.bytes_in.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn bytes_out(&self) -> u64 {
        self.bytes_out.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn last_activity_ns(&self) -> u64 {
        self.last_activity_ns.load(Ordering::Relaxed)
    }

    fn reset(&mut self) {
        *self.packets_in.get_mut() = 0;
        *self.packets_out.get_mut() = 0;
        *self.bytes_in.get_mut() = 0;
        *self.bytes_out.get_mut() = 0;
        *self.last_activity_ns.get_mut() = 0;
    }
}

/// Pooled logical connection
pub struct Connection {
    id: ConnectionId,
    kind: TransportKind,
    remote: Option<SocketAddr>,
    driver_handle: Option<DriverHandle>,
    core_label: Option<usize>,
    state: AtomicU8,
    stats: ConnectionStats,
}

impl Connection {
    /// Create a vacant connection for the recycling pool
    pub fn vacant() -> Self {
        Self {
            id: ConnectionId(0),
            kind: TransportKind::Raw,
            remote: None,
            driver_handle: None,
            core_label: None,
            state: AtomicU8::new(ConnectionState::Closed as u8),
            stats: ConnectionStats::default(),
        }
    }

    /// Initialize for a new lifecycle. Requires unique ownership, i.e. the
    /// object is out of the pool and not yet registered.
    pub fn begin(
        &mut self,
        id: ConnectionId,
        kind: TransportKind,
        remote: SocketAddr,
        core_label: Option<usize>,
    ) {
        self.id = id;
        self.kind = kind;
        self.remote = Some(remote);
        self.driver_handle = None;
        self.core_label = core_label;
        *self.state.get_mut() = ConnectionState::Connecting as u8;
        self.stats.reset();
    }

    /// Attach the opened driver handle. Unique ownership required.
    pub fn attach(&mut self, handle: DriverHandle) {
        self.driver_handle = Some(handle);
    }

    /// Strip identity before the object goes back to the pool
    pub fn retire(&mut self) {
        self.id = ConnectionId(0);
        self.remote = None;
        self.driver_handle = None;
        self.core_label = None;
        *self.state.get_mut() = ConnectionState::Closed as u8;
        self.stats.reset();
    }

    /// Current lifecycle state
    #[inline]
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Attempt a legal state transition. Returns false if the connection is
    /// not in `from` or the step is not part of the lifecycle.
    pub fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        if !from.can_transition_to(to) {
            return false;
        }
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    #[inline]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    #[inline]
    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    #[inline]
    pub fn remote(&self) -> Option<SocketAddr> {
        self.remote
    }

    #[inline]
    pub fn driver_handle(&self) -> Option<DriverHandle> {
        self.driver_handle
    }

    /// CPU core the owning loop should prefer - a scheduling hint only
    #[inline]
    pub fn core_label(&self) -> Option<usize> {
        self.core_label
    }

    #[inline]
    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    /// Nanoseconds since the last recorded activity
    #[inline]
    pub fn idle_for(&self, now_ns: u64) -> u64 {
        now_ns.saturating_sub(self.stats.last_activity_ns())
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("remote", &self.remote)
            .field("state", &self.state())
            .field("core_label", &self.core_label)
            .finish()
    }
}

/// Lightweight handle returned to callers. Holds no ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub kind: TransportKind,
    pub remote: SocketAddr,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    #[test]
    fn test_lifecycle_walk() {
        let mut conn = Connection::vacant();
        conn.begin(ConnectionId(1), TransportKind::Udp, addr(), Some(2));
        assert_eq!(conn.state(), ConnectionState::Connecting);

        assert!(conn.transition(ConnectionState::Connecting, ConnectionState::Connected));
        assert!(conn.transition(ConnectionState::Connected, ConnectionState::Closing));
        assert!(conn.transition(ConnectionState::Closing, ConnectionState::Closed));
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_no_skips_or_reversals() {
        let mut conn = Connection::vacant();
        conn.begin(ConnectionId(1), TransportKind::Tcp, addr(), None);

        // Connecting cannot jump straight to Closing or Closed
        assert!(!conn.transition(ConnectionState::Connecting, ConnectionState::Closing));
        assert!(!conn.transition(ConnectionState::Connecting, ConnectionState::Closed));

        assert!(conn.transition(ConnectionState::Connecting, ConnectionState::Connected));
        // No going back
        assert!(!conn.transition(ConnectionState::Connected, ConnectionState::Connecting));
        // Transition from a state we are not in fails
        assert!(!conn.transition(ConnectionState::Closing, ConnectionState::Closed));
    }

    #[test]
    fn test_retire_clears_identity() {
        let mut conn = Connection::vacant();
        conn.begin(ConnectionId(9), TransportKind::Multicast, addr(), Some(1));
        conn.stats().record_in(100, 42);

        conn.retire();
        assert_eq!(conn.id(), ConnectionId(0));
        assert!(conn.remote().is_none());
        assert!(conn.driver_handle().is_none());
        assert_eq!(conn.stats().packets_in(), 0);
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_idle_accounting() {
        let mut conn = Connection::vacant();
        conn.begin(ConnectionId(3), TransportKind::Udp, addr(), None);
        conn.stats().touch(1_000);
        assert_eq!(conn.idle_for(5_000), 4_000);
        conn.stats().record_out(64, 4_000);
        assert_eq!(conn.idle_for(5_000), 1_000);
    }
}
