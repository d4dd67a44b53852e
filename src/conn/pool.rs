//! Connection pool management
//!
//! Recycles Connection objects through a lock-free free list and tracks the
//! live ones in a registry. The registry lock guards structural membership
//! only; the packet loops read connections through generation-tagged
//! snapshots so the per-packet path never takes it. The idle scan is the
//! single path allowed to close a connection without an explicit caller
//! request.

use crossbeam_queue::ArrayQueue;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

use crate::core::{
    Connection, ConnectionHandle, ConnectionId, ConnectionState, EventKind, NetworkEvent,
    TransportKind,
};
use crate::driver::{DriverError, TransportDriver};
use crate::hot_path::TimestampEngine;
use crate::infrastructure::affinity::CoreAllocator;
use crate::infrastructure::bus::EventBus;

/// Connection lifecycle errors
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("address resolution failed: {0}")]
    AddressResolution(String),

    #[error("connection pool exhausted")]
    PoolExhausted,

    #[error("transport driver error: {0}")]
    Transport(#[from] DriverError),
}

/// Connection pool and lifecycle manager
pub struct ConnectionManager {
    free: ArrayQueue<Connection>,
    active: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
    /// Bumped on every membership change; the loops use it to refresh
    /// their lock-free snapshots.
    generation: AtomicU64,
    next_id: AtomicU64,
    driver: Arc<dyn TransportDriver>,
    bus: Arc<EventBus>,
    clock: Arc<TimestampEngine>,
    cores: CoreAllocator,
}

impl ConnectionManager {
    /// Create a manager with `pool_size` recyclable connection objects
    pub fn new(
        pool_size: usize,
        driver: Arc<dyn TransportDriver>,
        bus: Arc<EventBus>,
        clock: Arc<TimestampEngine>,
        cores: CoreAllocator,
    ) -> Self {
        let free = ArrayQueue::new(pool_size);
        for _ in 0..pool_size {
            // Queue was sized for exactly this many objects
            let _ = free.push(Connection::vacant());
        }
        Self {
            free,
            active: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
            next_id: AtomicU64::new(1),
            driver,
            bus,
            clock,
            cores,
        }
    }

    /// Open a connection: resolve, open the driver handle, walk
    /// Connecting -> Connected, register, emit ConnectionOpened.
    pub fn create(
        &self,
        kind: TransportKind,
        remote: &str,
    ) -> Result<ConnectionHandle, ConnectionError> {
        let addr = self.driver.resolve(kind, remote).map_err(|e| match e {
            DriverError::Resolution(message) => ConnectionError::AddressResolution(message),
            other => ConnectionError::Transport(other),
        })?;

        let mut conn = self.free.pop().ok_or(ConnectionError::PoolExhausted)?;
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        conn.begin(id, kind, addr, self.cores.next_label());

        let handle = match self.driver.open(kind, addr) {
            Ok(handle) => handle,
            Err(e) => {
                // The object never became visible; recycle it directly
                conn.retire();
                let _ = self.free.push(conn);
                return Err(ConnectionError::Transport(e));
            }
        };
        conn.attach(handle);
        let connected = conn.transition(ConnectionState::Connecting, ConnectionState::Connected);
        debug_assert!(connected, "fresh connection must reach Connected");

        let now = self.clock.now_ns();
        conn.stats().touch(now);

        self.active.write().insert(id, Arc::new(conn));
        self.generation.fetch_add(1, Ordering::Release);

        if self.bus.has_subscribers() {
            self.bus.publish(
                NetworkEvent::new(EventKind::ConnectionOpened, now).with_connection(id),
            );
        }
        tracing::debug!(target: "conn", "opened {} ({:?} -> {})", id, kind, addr);

        Ok(ConnectionHandle {
            id,
            kind,
            remote: addr,
        })
    }

    /// Close a connection by id. Closing an unknown or already-closed
    /// connection is an ordinary Ok, not a fault.
    pub fn close(&self, id: ConnectionId) -> Result<(), ConnectionError> {
        let Some(conn) = self.active.write().remove(&id) else {
            return Ok(());
        };
        self.generation.fetch_add(1, Ordering::Release);
        self.finish_close(conn, None);
        Ok(())
    }

    /// Force-close every connection whose last activity is older than
    /// `idle_timeout_ns`. Returns how many were closed.
    pub fn scan_idle(&self, idle_timeout_ns: u64) -> usize {
        let now = self.clock.now_ns();
        let stale: Vec<ConnectionId> = {
            let active = self.active.read();
            active
                .iter()
                .filter(|(_, conn)| conn.idle_for(now) > idle_timeout_ns)
                .map(|(id, _)| *id)
                .collect()
        };

        let mut closed = 0;
        for id in stale {
            if let Some(conn) = self.active.write().remove(&id) {
                self.generation.fetch_add(1, Ordering::Release);
                tracing::warn!(target: "conn", "{} idle past timeout, force-closing", id);
                self.finish_close(conn, Some("idle timeout"));
                closed += 1;
            }
        }
        closed
    }

    /// Close everything that is still open. Called on shutdown.
    pub fn close_all(&self) {
        let drained: Vec<Arc<Connection>> = {
            let mut active = self.active.write();
            let drained = active.drain().map(|(_, conn)| conn).collect();
            drained
        };
        if !drained.is_empty() {
            self.generation.fetch_add(1, Ordering::Release);
        }
        for conn in drained {
            self.finish_close(conn, Some("shutdown"));
        }
    }

    fn finish_close(&self, conn: Arc<Connection>, reason: Option<&str>) {
        let id = conn.id();
        // Connected -> Closing; a connection already in Error skips this
        let _ = conn.transition(ConnectionState::Connected, ConnectionState::Closing);
        if let Some(handle) = conn.driver_handle() {
            if let Err(e) = self.driver.close(handle) {
                tracing::warn!(target: "conn", "driver close failed for {}: {}", id, e);
            }
        }
        let _ = conn.transition(ConnectionState::Closing, ConnectionState::Closed);

        let now = self.clock.now_ns();
        if self.bus.has_subscribers() {
            let mut event =
                NetworkEvent::new(EventKind::ConnectionClosed, now).with_connection(id);
            if let Some(reason) = reason {
                event = event.with_detail(reason);
            }
            self.bus.publish(event);
        }
        tracing::debug!(target: "conn", "closed {}", id);

        // Recycle when no outside handle remains; otherwise the object is
        // simply dropped when the last Arc goes away.
        if let Ok(mut conn) = Arc::try_unwrap(conn) {
            conn.retire();
            let _ = self.free.push(conn);
        }
    }

    /// Look up a live connection
    pub fn lookup(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.active.read().get(&id).cloned()
    }

    /// Membership generation for snapshot invalidation
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Snapshot keyed by driver handle, for the inbound loop
    pub fn snapshot_by_handle(&self) -> HashMap<u64, Arc<Connection>> {
        self.active
            .read()
            .values()
            .filter_map(|conn| {
                conn.driver_handle()
                    .map(|handle| (handle.0, Arc::clone(conn)))
            })
            .collect()
    }

    /// Snapshot keyed by connection id, for the outbound loop
    pub fn snapshot_by_id(&self) -> HashMap<ConnectionId, Arc<Connection>> {
        self.active
            .read()
            .iter()
            .map(|(id, conn)| (*id, Arc::clone(conn)))
            .collect()
    }

    /// Number of live connections
    pub fn active_len(&self) -> usize {
        self.active.read().len()
    }

    /// Number of recyclable objects currently in the pool
    pub fn available(&self) -> usize {
        self.free.len()
    }
}
