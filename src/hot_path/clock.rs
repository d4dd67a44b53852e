//! Timestamp engine
//!
//! Monotonic nanosecond clock anchored at construction. Timestamps feed
//! latency accounting only - they are never an ordering key. Hardware
//! (NIC-sourced) stamping can be requested via configuration; it requires a
//! driver that stamps at the interface, so the built-in engine records the
//! request and keeps the monotonic source as the portable fallback.

use std::time::{Duration, Instant};

use super::buffer::PacketBuffer;

/// Monotonic timestamp source for the transport boundary
pub struct TimestampEngine {
    base: Instant,
    hardware: bool,
}

impl TimestampEngine {
    /// Create an engine; `hardware_requested` comes from configuration
    pub fn new(hardware_requested: bool) -> Self {
        let hardware = hardware_requested && Self::hardware_available();
        if hardware_requested && !hardware {
            tracing::warn!(
                "hardware timestamps requested but no NIC clock source is available, \
                 falling back to the monotonic clock"
            );
        }
        Self {
            base: Instant::now(),
            hardware,
        }
    }

    /// NIC clock access is the transport driver's concern; the built-in
    /// drivers do not provide one.
    fn hardware_available() -> bool {
        false
    }

    /// Nanoseconds since the engine was created
    #[inline(always)]
    pub fn now_ns(&self) -> u64 {
        self.base.elapsed().as_nanos() as u64
    }

    /// Write the current timestamp into the buffer header
    #[inline(always)]
    pub fn stamp(&self, buf: &mut PacketBuffer) {
        buf.set_stamp_ns(self.now_ns());
    }

    /// Absolute deadline for a TTL starting now
    #[inline]
    pub fn deadline_after(&self, ttl: Duration) -> u64 {
        self.now_ns().saturating_add(ttl.as_nanos() as u64)
    }

    /// True when a hardware clock source is in use
    #[inline]
    pub fn hardware_active(&self) -> bool {
        self.hardware
    }
}
