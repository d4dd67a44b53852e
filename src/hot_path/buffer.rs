//! Pooled packet buffers for the zero-allocation hot path
//!
//! Pre-allocated byte regions recycled through a lock-free free list.
//! Every buffer is exclusively owned by whoever currently holds it: the
//! pool, a producer, a lane slot, or a consumer. Ownership moves, it is
//! never shared, so the type is deliberately not Clone.

use crossbeam_queue::ArrayQueue;
#[cfg(debug_assertions)]
use std::sync::atomic::{AtomicBool, Ordering};

use crate::core::ConnectionId;

/// Fixed-capacity byte buffer with a length cursor and a reserved header
/// (timestamp, TTL deadline, owning connection) used by the transport.
#[derive(Debug)]
pub struct PacketBuffer {
    data: Box<[u8]>,
    len: usize,
    stamp_ns: u64,
    deadline_ns: u64,
    conn: ConnectionId,
    slot: usize,
}

impl PacketBuffer {
    pub(crate) fn new(capacity: usize, slot: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
            stamp_ns: 0,
            deadline_ns: 0,
            conn: ConnectionId(0),
            slot,
        }
    }

    /// Total byte capacity
    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Valid payload length
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Valid payload bytes
    #[inline(always)]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Full writable region; pair with `set_len` after writing
    #[inline(always)]
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Set the payload length cursor
    ///
    /// # Panics
    /// Panics if `len` exceeds capacity - that is a codec/driver bug.
    #[inline]
    pub fn set_len(&mut self, len: usize) {
        assert!(len <= self.data.len(), "length {} exceeds capacity {}", len, self.data.len());
        self.len = len;
    }

    /// Timestamp header, nanoseconds
    #[inline(always)]
    pub fn stamp_ns(&self) -> u64 {
        self.stamp_ns
    }

    #[inline(always)]
    pub fn set_stamp_ns(&mut self, ns: u64) {
        self.stamp_ns = ns;
    }

    /// TTL deadline header, nanoseconds; zero means no deadline
    #[inline(always)]
    pub fn deadline_ns(&self) -> u64 {
        self.deadline_ns
    }

    #[inline(always)]
    pub fn set_deadline_ns(&mut self, ns: u64) {
        self.deadline_ns = ns;
    }

    /// Returns true if a deadline is set and has passed
    #[inline(always)]
    pub fn is_expired(&self, now_ns: u64) -> bool {
        self.deadline_ns != 0 && now_ns > self.deadline_ns
    }

    /// Routing header: destination (outbound) or source (inbound) connection
    #[inline(always)]
    pub fn conn(&self) -> ConnectionId {
        self.conn
    }

    #[inline(always)]
    pub fn set_conn(&mut self, conn: ConnectionId) {
        self.conn = conn;
    }

    /// Pool slot index, stable for the buffer's lifetime
    #[inline(always)]
    pub fn slot(&self) -> usize {
        self.slot
    }

    fn reset(&mut self) {
        self.len = 0;
        self.stamp_ns = 0;
        self.deadline_ns = 0;
        self.conn = ConnectionId(0);
    }

    fn zero(&mut self) {
        self.data.fill(0);
    }
}

/// Lock-free pool of pre-allocated packet buffers
///
/// `acquire` returning None is back-pressure, not a failure: the caller
/// slows down or drops. The pool never allocates after construction, so
/// free + queued + held always equals `capacity`.
pub struct BufferPool {
    free: ArrayQueue<PacketBuffer>,
    capacity: usize,
    buffer_size: usize,
    zero_on_release: bool,
    /// Debug-build residency map: true while the slot's buffer is in the
    /// free list. Catches buffers returned to a pool that already holds
    /// their slot (a cross-pool or duplicated return).
    #[cfg(debug_assertions)]
    resident: Box<[AtomicBool]>,
}

impl BufferPool {
    /// Create a pool of `capacity` buffers of `buffer_size` bytes each
    pub fn new(capacity: usize, buffer_size: usize, zero_on_release: bool) -> Self {
        let free = ArrayQueue::new(capacity);
        for slot in 0..capacity {
            // Queue was sized for exactly this many buffers
            let _ = free.push(PacketBuffer::new(buffer_size, slot));
        }
        Self {
            free,
            capacity,
            buffer_size,
            zero_on_release,
            #[cfg(debug_assertions)]
            resident: (0..capacity).map(|_| AtomicBool::new(true)).collect(),
        }
    }

    /// Take a buffer from the free list
    ///
    /// Returns None when the pool is exhausted. O(1), lock-free.
    #[inline(always)]
    pub fn acquire(&self) -> Option<PacketBuffer> {
        let buf = self.free.pop()?;
        #[cfg(debug_assertions)]
        self.resident[buf.slot()].store(false, Ordering::Release);
        Some(buf)
    }

    /// Return a buffer to the free list
    ///
    /// Resets the cursor and header; zeroes the region if the pool was
    /// configured to. O(1), lock-free.
    #[inline]
    pub fn release(&self, mut buf: PacketBuffer) {
        buf.reset();
        if self.zero_on_release {
            buf.zero();
        }
        #[cfg(debug_assertions)]
        {
            let was_free = self.resident[buf.slot()].swap(true, Ordering::AcqRel);
            debug_assert!(!was_free, "buffer slot {} returned twice", buf.slot());
        }
        if self.free.push(buf).is_err() {
            debug_assert!(false, "released more buffers than the pool owns");
        }
    }

    /// Number of buffers currently free
    #[inline]
    pub fn available(&self) -> usize {
        self.free.len()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_prepopulated() {
        let pool = BufferPool::new(8, 512, false);
        assert_eq!(pool.available(), 8);
        assert_eq!(pool.capacity(), 8);
        assert_eq!(pool.buffer_size(), 512);
    }

    #[test]
    fn test_exhaustion_then_recovery() {
        // Scenario: capacity 4 - four acquires succeed, the fifth reports
        // exhaustion, releasing one makes the next acquire succeed.
        let pool = BufferPool::new(4, 64, false);
        let mut held = Vec::new();
        for _ in 0..4 {
            held.push(pool.acquire().expect("pool should have a free buffer"));
        }
        assert!(pool.acquire().is_none());

        pool.release(held.pop().unwrap());
        assert!(pool.acquire().is_some());
    }

    #[test]
    fn test_conservation_after_balanced_pairs() {
        let pool = BufferPool::new(4, 64, false);
        for _ in 0..10 {
            let a = pool.acquire().unwrap();
            let b = pool.acquire().unwrap();
            pool.release(b);
            pool.release(a);
        }
        assert_eq!(pool.available(), 4);
    }

    #[test]
    fn test_release_resets_header() {
        let pool = BufferPool::new(1, 64, false);
        let mut buf = pool.acquire().unwrap();
        buf.payload_mut()[..4].copy_from_slice(b"tick");
        buf.set_len(4);
        buf.set_stamp_ns(99);
        buf.set_deadline_ns(100);
        buf.set_conn(ConnectionId(5));
        pool.release(buf);

        let buf = pool.acquire().unwrap();
        assert_eq!(buf.len(), 0);
        assert_eq!(buf.stamp_ns(), 0);
        assert_eq!(buf.deadline_ns(), 0);
        assert_eq!(buf.conn(), ConnectionId(0));
    }

    #[test]
    fn test_zero_on_release() {
        let pool = BufferPool::new(1, 16, true);
        let mut buf = pool.acquire().unwrap();
        buf.payload_mut().fill(0xFF);
        buf.set_len(16);
        pool.release(buf);

        let buf = pool.acquire().unwrap();
        assert!(buf.data.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_expiry() {
        let pool = BufferPool::new(1, 16, false);
        let mut buf = pool.acquire().unwrap();
        assert!(!buf.is_expired(u64::MAX), "no deadline means never expired");
        buf.set_deadline_ns(100);
        assert!(!buf.is_expired(100));
        assert!(buf.is_expired(101));
        pool.release(buf);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "returned twice")]
    fn test_foreign_release_detected() {
        let donor = BufferPool::new(1, 16, false);
        let full = BufferPool::new(1, 16, false);
        let buf = donor.acquire().unwrap();
        // `full` already holds its only buffer; a foreign return must trip
        // the debug check rather than silently grow the pool.
        full.release(buf);
    }

    #[test]
    fn test_concurrent_acquire_release() {
        use std::sync::Arc;
        use std::thread;

        let pool = Arc::new(BufferPool::new(64, 128, false));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    for _ in 0..1_000 {
                        if let Some(mut buf) = pool.acquire() {
                            buf.payload_mut()[0] = 1;
                            buf.set_len(1);
                            pool.release(buf);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(pool.available(), 64);
    }

    #[test]
    fn test_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<BufferPool>();
    }
}

// Hot Path Checklist verified:
// ✓ Lock-free operations (crossbeam-queue ArrayQueue)
// ✓ No allocation in acquire/release
// ✓ Bounded capacity (no growth)
// ✓ Single-owner buffers (moved, never aliased)
// ✓ O(1) operations
