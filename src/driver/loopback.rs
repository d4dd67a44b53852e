//! In-memory loopback driver
//!
//! Echoes every write back as a received datagram on the same handle.
//! Used by the integration tests and the demo binary; it exercises the
//! full transport path without touching the network.

use bytes::Bytes;
use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::{DriverError, DriverHandle, RecvMeta, TransportDriver};
use crate::core::TransportKind;

struct Datagram {
    handle: DriverHandle,
    addr: SocketAddr,
    payload: Bytes,
}

/// Loopback transport driver
pub struct LoopbackDriver {
    inbox_tx: Sender<Datagram>,
    inbox_rx: Receiver<Datagram>,
    peers: RwLock<HashMap<u64, SocketAddr>>,
    next_handle: AtomicU64,
}

impl LoopbackDriver {
    /// Create a driver whose pending-datagram queue holds `depth` entries
    pub fn new(depth: usize) -> Self {
        let (inbox_tx, inbox_rx) = bounded(depth);
        Self {
            inbox_tx,
            inbox_rx,
            peers: RwLock::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Open handles
    pub fn open_handles(&self) -> usize {
        self.peers.read().len()
    }
}

impl Default for LoopbackDriver {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl TransportDriver for LoopbackDriver {
    fn resolve(&self, kind: TransportKind, address: &str) -> Result<SocketAddr, DriverError> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|_| DriverError::Resolution(format!("unparseable address '{}'", address)))?;
        if kind == TransportKind::Multicast && !addr.ip().is_multicast() {
            return Err(DriverError::Resolution(format!(
                "'{}' is not a multicast group",
                address
            )));
        }
        Ok(addr)
    }

    fn open(&self, _kind: TransportKind, remote: SocketAddr) -> Result<DriverHandle, DriverError> {
        let handle = DriverHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.peers.write().insert(handle.0, remote);
        Ok(handle)
    }

    fn close(&self, handle: DriverHandle) -> Result<(), DriverError> {
        self.peers.write().remove(&handle.0);
        Ok(())
    }

    fn poll_recv(
        &self,
        buf: &mut [u8],
        deadline: Duration,
    ) -> Result<Option<RecvMeta>, DriverError> {
        match self.inbox_rx.recv_timeout(deadline) {
            Ok(datagram) => {
                let len = datagram.payload.len().min(buf.len());
                buf[..len].copy_from_slice(&datagram.payload[..len]);
                Ok(Some(RecvMeta {
                    handle: datagram.handle,
                    len,
                    addr: datagram.addr,
                }))
            }
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Ok(None),
        }
    }

    fn send(&self, handle: DriverHandle, payload: &[u8]) -> Result<usize, DriverError> {
        let addr = self
            .peers
            .read()
            .get(&handle.0)
            .copied()
            .ok_or(DriverError::UnknownHandle(handle.0))?;

        let datagram = Datagram {
            handle,
            addr,
            payload: Bytes::copy_from_slice(payload),
        };
        match self.inbox_tx.try_send(datagram) {
            Ok(()) => Ok(payload.len()),
            Err(TrySendError::Full(_)) => {
                Err(DriverError::Rejected("loopback inbox full".to_string()))
            }
            Err(TrySendError::Disconnected(_)) => {
                Err(DriverError::Rejected("loopback inbox closed".to_string()))
            }
        }
    }
}
