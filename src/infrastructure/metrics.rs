//! Latency and throughput monitor
//!
//! Lock-free metrics counters using atomic operations.
//! Updated from the packet loops in the hot path, aggregated into
//! read-only snapshots in the cold path. Min/max use explicit CAS update
//! loops; the running average is a saturating sum plus count, O(1) and
//! overflow-safe. Everything is an instance field so independent transport
//! instances can coexist in one process.

use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::hot_path::LaneDepths;

/// Sentinel for "no observation yet" in `last_latency_ns`
const NO_OBSERVATION: u64 = u64::MAX;

/// Transport metrics collector
///
/// Thread-safe counters updated from the hot path.
/// Snapshots taken for export.
pub struct TransportMetrics {
    packets_in: CachePadded<AtomicU64>,
    packets_out: CachePadded<AtomicU64>,
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,

    /// Inbound packets dropped because the inbound lane was full
    dropped_inbound: AtomicU64,
    /// Outbound buffers dropped because their TTL deadline passed
    dropped_expired: AtomicU64,
    /// Inbound frames the codec rejected
    dropped_malformed: AtomicU64,
    /// Outbound buffers with no live destination connection
    dropped_unrouted: AtomicU64,
    /// send() rejections because a lane was full
    enqueue_failures: AtomicU64,
    /// Inbound polls skipped because the buffer pool was empty
    pool_starved: AtomicU64,
    /// Driver write failures
    driver_errors: AtomicU64,

    latency_min_ns: AtomicU64,
    latency_max_ns: AtomicU64,
    latency_sum_ns: AtomicU64,
    latency_count: AtomicU64,
    last_latency_ns: AtomicU64,
    jitter_spikes: AtomicU64,

    // Per-interval rates, written by the reporter loop
    rate_in_pps: AtomicU64,
    rate_out_pps: AtomicU64,
    rate_in_bps: AtomicU64,
    rate_out_bps: AtomicU64,

    latency_target_ns: u64,
    jitter_threshold_ns: u64,
    start_time: Instant,
}

/// Metrics snapshot for export
///
/// Derived and recomputed on demand - never authoritative.
#[derive(Debug, Clone, Copy)]
pub struct MetricsSnapshot {
    pub packets_in: u64,
    pub packets_out: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub dropped_inbound: u64,
    pub dropped_expired: u64,
    pub dropped_malformed: u64,
    pub dropped_unrouted: u64,
    pub enqueue_failures: u64,
    pub pool_starved: u64,
    pub driver_errors: u64,
    /// None until the first latency observation
    pub latency_min_ns: Option<u64>,
    pub latency_max_ns: u64,
    pub latency_avg_ns: u64,
    pub jitter_spikes: u64,
    pub rate_in_pps: u64,
    pub rate_out_pps: u64,
    pub rate_in_bps: u64,
    pub rate_out_bps: u64,
    pub inbound_depth: usize,
    pub outbound_depth: usize,
    pub priority_depth: usize,
    pub active_connections: usize,
    pub free_buffers: usize,
    pub uptime_seconds: u64,
}

impl TransportMetrics {
    /// Create a collector with the configured alert thresholds
    pub fn new(latency_target_ns: u64, jitter_threshold_ns: u64) -> Self {
        Self {
            packets_in: CachePadded::new(AtomicU64::new(0)),
            packets_out: CachePadded::new(AtomicU64::new(0)),
            bytes_in: AtomicU64::new(0),
            bytes_out: AtomicU64::new(0),
            dropped_inbound: AtomicU64::new(0),
            dropped_expired: AtomicU64::new(0),
            dropped_malformed: AtomicU64::new(0),
            dropped_unrouted: AtomicU64::new(0),
            enqueue_failures: AtomicU64::new(0),
            pool_starved: AtomicU64::new(0),
            driver_errors: AtomicU64::new(0),
            latency_min_ns: AtomicU64::new(u64::MAX),
            latency_max_ns: AtomicU64::new(0),
            latency_sum_ns: AtomicU64::new(0),
            latency_count: AtomicU64::new(0),
            last_latency_ns: AtomicU64::new(NO_OBSERVATION),
            jitter_spikes: AtomicU64::new(0),
            rate_in_pps: AtomicU64::new(0),
            rate_out_pps: AtomicU64::new(0),
            rate_in_bps: AtomicU64::new(0),
            rate_out_bps: AtomicU64::new(0),
            latency_target_ns,
            jitter_threshold_ns,
            start_time: Instant::now(),
        }
    }

    /// Record a packet handed to the inbound lane
    #[inline]
    pub fn record_receive(&self, bytes: usize) {
        self.packets_in.fetch_add(1, Ordering::Relaxed);
        self.bytes_in.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Record a packet handed to the transport driver
    #[inline]
    pub fn record_send(&self, bytes: usize) {
        self.packets_out.fetch_add(1, Ordering::Relaxed);
        self.bytes_out.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_inbound_drop(&self) {
        self.dropped_inbound.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_expired(&self) {
        self.dropped_expired.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_malformed(&self) {
        self.dropped_malformed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_unrouted(&self) {
        self.dropped_unrouted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_enqueue_failure(&self) {
        self.enqueue_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_pool_starved(&self) {
        self.pool_starved.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_driver_error(&self) {
        self.driver_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a latency observation in nanoseconds
    ///
    /// Returns true when the observation exceeds the configured target, so
    /// the caller can raise a LatencyAlert without the monitor holding a
    /// bus handle.
    #[inline]
    pub fn record_latency(&self, ns: u64) -> bool {
        // CAS loop: only move the minimum down
        let mut current = self.latency_min_ns.load(Ordering::Relaxed);
        while ns < current {
            match self.latency_min_ns.compare_exchange_weak(
                current,
                ns,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }

        // CAS loop: only move the maximum up
        let mut current = self.latency_max_ns.load(Ordering::Relaxed);
        while ns > current {
            match self.latency_max_ns.compare_exchange_weak(
                current,
                ns,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }

        // Saturating sum keeps the average overflow-safe
        let _ = self
            .latency_sum_ns
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |sum| {
                Some(sum.saturating_add(ns))
            });
        self.latency_count.fetch_add(1, Ordering::Relaxed);

        let previous = self.last_latency_ns.swap(ns, Ordering::Relaxed);
        if previous != NO_OBSERVATION && ns.abs_diff(previous) > self.jitter_threshold_ns {
            self.jitter_spikes.fetch_add(1, Ordering::Relaxed);
        }

        ns > self.latency_target_ns
    }

    /// Totals needed by the reporter loop for delta computation
    pub fn totals(&self) -> (u64, u64, u64, u64) {
        (
            self.packets_in.load(Ordering::Relaxed),
            self.packets_out.load(Ordering::Relaxed),
            self.bytes_in.load(Ordering::Relaxed),
            self.bytes_out.load(Ordering::Relaxed),
        )
    }

    /// Store per-interval rates computed by the reporter loop
    pub fn store_rates(&self, in_pps: u64, out_pps: u64, in_bps: u64, out_bps: u64) {
        self.rate_in_pps.store(in_pps, Ordering::Relaxed);
        self.rate_out_pps.store(out_pps, Ordering::Relaxed);
        self.rate_in_bps.store(in_bps, Ordering::Relaxed);
        self.rate_out_bps.store(out_bps, Ordering::Relaxed);
    }

    /// Assemble a snapshot; lane depths and connection/buffer counts are
    /// supplied by the engine since they live outside the collector.
    pub fn snapshot(
        &self,
        depths: LaneDepths,
        active_connections: usize,
        free_buffers: usize,
    ) -> MetricsSnapshot {
        let count = self.latency_count.load(Ordering::Relaxed);
        let sum = self.latency_sum_ns.load(Ordering::Relaxed);
        let min = self.latency_min_ns.load(Ordering::Relaxed);

        MetricsSnapshot {
            packets_in: self.packets_in.load(Ordering::Relaxed),
            packets_out: self.packets_out.load(Ordering::Relaxed),
            bytes_in: self.bytes_in.load(Ordering::Relaxed),
            bytes_out: self.bytes_out.load(Ordering::Relaxed),
            dropped_inbound: self.dropped_inbound.load(Ordering::Relaxed),
            dropped_expired: self.dropped_expired.load(Ordering::Relaxed),
            dropped_malformed: self.dropped_malformed.load(Ordering::Relaxed),
            dropped_unrouted: self.dropped_unrouted.load(Ordering::Relaxed),
            enqueue_failures: self.enqueue_failures.load(Ordering::Relaxed),
            pool_starved: self.pool_starved.load(Ordering::Relaxed),
            driver_errors: self.driver_errors.load(Ordering::Relaxed),
            latency_min_ns: if min == u64::MAX { None } else { Some(min) },
            latency_max_ns: self.latency_max_ns.load(Ordering::Relaxed),
            latency_avg_ns: if count > 0 { sum / count } else { 0 },
            jitter_spikes: self.jitter_spikes.load(Ordering::Relaxed),
            rate_in_pps: self.rate_in_pps.load(Ordering::Relaxed),
            rate_out_pps: self.rate_out_pps.load(Ordering::Relaxed),
            rate_in_bps: self.rate_in_bps.load(Ordering::Relaxed),
            rate_out_bps: self.rate_out_bps.load(Ordering::Relaxed),
            inbound_depth: depths.inbound,
            outbound_depth: depths.outbound,
            priority_depth: depths.priority,
            active_connections,
            free_buffers,
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }
}
