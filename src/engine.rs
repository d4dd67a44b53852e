//! Transport core engine
//!
//! Owns every component and runs the four background loops: inbound
//! ingestion, outbound drain, connection health scan, and the metrics
//! reporter. The packet loops are dedicated OS threads (pinned when
//! affinity is configured) so the data plane never shares a scheduler
//! with the cold path. All cross-thread traffic goes through the lanes;
//! the loops observe the stop flag within one polling interval and always
//! finish the batch in hand before exiting.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

use crate::codec::{CodecError, MessageCodec};
use crate::conn::{ConnectionError, ConnectionManager};
use crate::core::{
    Connection, ConnectionHandle, ConnectionId, EventFilter, EventKind, Message, NetworkEvent,
    TransportKind,
};
use crate::driver::TransportDriver;
use crate::hot_path::{BufferPool, Lane, LaneSet, PacketBuffer, TimestampEngine};
use crate::infrastructure::affinity::{pin_or_warn, CoreAllocator};
use crate::infrastructure::bus::{EventBus, EventStream};
use crate::infrastructure::config::Config;
use crate::infrastructure::metrics::{MetricsSnapshot, TransportMetrics};

/// Send-path failures. Capacity variants are back-pressure, not faults.
#[derive(Error, Debug)]
pub enum SendError {
    #[error("message has no destination connection")]
    NoDestination,

    #[error("unknown destination connection {0}")]
    UnknownConnection(ConnectionId),

    #[error("buffer pool exhausted")]
    PoolExhausted,

    #[error("{lane} lane full")]
    LaneFull { lane: Lane },

    #[error("encode failed: {0}")]
    Encode(#[from] CodecError),
}

/// Receive-path result when nothing is queued
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RecvError {
    #[error("no message available")]
    Empty,
}

/// Shared state between the engine facade and the loops
struct Shared {
    config: Config,
    pool: BufferPool,
    lanes: LaneSet,
    conns: ConnectionManager,
    metrics: TransportMetrics,
    bus: Arc<EventBus>,
    clock: Arc<TimestampEngine>,
    driver: Arc<dyn TransportDriver>,
    codec: Arc<dyn MessageCodec>,
    stop: AtomicBool,
    running: AtomicBool,
}

/// Ultra-low-latency transport core
///
/// One instance owns its buffers, lanes, connections, metrics, and loops;
/// independent instances coexist freely in a single process.
pub struct TransportCore {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl TransportCore {
    /// Build a core from configuration and the two collaborator seams
    pub fn new(
        config: Config,
        driver: Arc<dyn TransportDriver>,
        codec: Arc<dyn MessageCodec>,
    ) -> crate::Result<Self> {
        let config = config.validated()?;

        let bus = Arc::new(EventBus::new(config.events.subscriber_depth));
        let clock = Arc::new(TimestampEngine::new(
            config.transport.enable_hardware_timestamps,
        ));
        if config.transport.enable_kernel_bypass {
            tracing::warn!(
                target: "engine",
                "kernel bypass requested; the configured driver decides whether it is honored"
            );
        }

        let pool = BufferPool::new(
            config.buffers.pool_size,
            config.buffers.buffer_size,
            config.buffers.zero_on_release,
        );
        let lanes = LaneSet::new(config.queues.depth)?;
        let conns = ConnectionManager::new(
            config.connections.pool_size,
            Arc::clone(&driver),
            Arc::clone(&bus),
            Arc::clone(&clock),
            CoreAllocator::new(config.runtime.core_affinity.clone()),
        );
        let metrics = TransportMetrics::new(
            config.latency.target_ns,
            config.latency.jitter_threshold_ns,
        );

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                pool,
                lanes,
                conns,
                metrics,
                bus,
                clock,
                driver,
                codec,
                stop: AtomicBool::new(false),
                running: AtomicBool::new(false),
            }),
            workers: Mutex::new(Vec::new()),
        })
    }

    /// Start the background loops. Starting a running core is a no-op.
    pub fn start(&self) -> crate::Result<()> {
        if self.shared.running.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.shared.stop.store(false, Ordering::Release);

        let cores = CoreAllocator::new(self.shared.config.runtime.core_affinity.clone());
        let mut workers = self.workers.lock();

        let shared = Arc::clone(&self.shared);
        let core = cores.loop_core(0);
        workers.push(
            thread::Builder::new()
                .name("pw-inbound".into())
                .spawn(move || {
                    pin_or_warn("inbound", core);
                    inbound_loop(&shared);
                })?,
        );

        let shared = Arc::clone(&self.shared);
        let core = cores.loop_core(1);
        workers.push(
            thread::Builder::new()
                .name("pw-outbound".into())
                .spawn(move || {
                    pin_or_warn("outbound", core);
                    outbound_loop(&shared);
                })?,
        );

        let shared = Arc::clone(&self.shared);
        workers.push(
            thread::Builder::new()
                .name("pw-health".into())
                .spawn(move || health_loop(&shared))?,
        );

        let shared = Arc::clone(&self.shared);
        workers.push(
            thread::Builder::new()
                .name("pw-metrics".into())
                .spawn(move || metrics_loop(&shared))?,
        );

        drop(workers);

        // Configured multicast groups are joined on every start; failure to
        // join one is a degradation, not a startup failure.
        for group in &self.shared.config.transport.multicast_groups {
            match self.shared.conns.create(TransportKind::Multicast, group) {
                Ok(handle) => {
                    tracing::info!(target: "engine", "joined multicast group {}", handle.remote)
                }
                Err(e) => {
                    tracing::warn!(target: "engine", "could not join multicast group {}: {}", group, e)
                }
            }
        }

        tracing::info!(target: "engine", "transport core started");
        Ok(())
    }

    /// Stop the loops, join them, and force-close in-flight connections.
    /// Stopping a stopped core is a no-op.
    pub fn stop(&self) {
        if !self.shared.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.shared.stop.store(true, Ordering::Release);

        let workers: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        for worker in workers {
            let _ = worker.join();
        }
        self.shared.conns.close_all();
        tracing::info!(target: "engine", "transport core stopped");
    }

    /// Encode, stamp, and enqueue a message for transmission
    ///
    /// High and Critical priority rides the priority lane; everything else
    /// rides outbound. Capacity failures are back-pressure: the message is
    /// not queued and the caller decides whether to retry, drop, or slow.
    pub fn send(&self, message: &Message) -> Result<(), SendError> {
        let shared = &self.shared;
        let destination = message.destination.ok_or(SendError::NoDestination)?;
        let conn = shared
            .conns
            .lookup(destination)
            .ok_or(SendError::UnknownConnection(destination))?;
        if !conn.state().is_active() {
            return Err(SendError::UnknownConnection(destination));
        }

        let mut buf = shared.pool.acquire().ok_or(SendError::PoolExhausted)?;
        let len = match shared.codec.encode(message, buf.payload_mut()) {
            Ok(len) => len,
            Err(e) => {
                shared.pool.release(buf);
                return Err(SendError::Encode(e));
            }
        };
        buf.set_len(len);
        buf.set_conn(destination);
        if let Some(ttl) = message.ttl {
            buf.set_deadline_ns(shared.clock.deadline_after(ttl));
        }
        shared.clock.stamp(&mut buf);

        let lane = if message.priority.is_express() {
            Lane::Priority
        } else {
            Lane::Outbound
        };
        match shared.lanes.enqueue(lane, buf) {
            Ok(()) => Ok(()),
            Err(buf) => {
                shared.pool.release(buf);
                shared.metrics.record_enqueue_failure();
                Err(SendError::LaneFull { lane })
            }
        }
    }

    /// Non-blocking receive from the inbound lane
    ///
    /// Malformed frames are dropped, counted, and skipped; the call keeps
    /// draining until it finds a decodable message or the lane is empty.
    pub fn receive(&self) -> Result<Message, RecvError> {
        let shared = &self.shared;
        loop {
            let Some(buf) = shared.lanes.dequeue(Lane::Inbound) else {
                return Err(RecvError::Empty);
            };
            match shared.codec.decode(buf.as_slice()) {
                Ok(mut message) => {
                    message.source = Some(buf.conn());
                    // Receipt-to-consumption latency, from the stamp the
                    // inbound loop wrote at the transport boundary
                    let latency = shared.clock.now_ns().saturating_sub(buf.stamp_ns());
                    if shared.metrics.record_latency(latency) && shared.bus.has_subscribers() {
                        shared.bus.publish(
                            NetworkEvent::new(EventKind::LatencyAlert, shared.clock.now_ns())
                                .with_connection(buf.conn())
                                .with_latency(latency),
                        );
                    }
                    shared.pool.release(buf);
                    return Ok(message);
                }
                Err(e) => {
                    shared.metrics.record_malformed();
                    if shared.bus.has_subscribers() {
                        shared.bus.publish(
                            NetworkEvent::new(EventKind::PacketDropped, shared.clock.now_ns())
                                .with_connection(buf.conn())
                                .with_detail(format!("malformed frame: {}", e)),
                        );
                    }
                    shared.pool.release(buf);
                }
            }
        }
    }

    /// Open a connection through the driver
    pub fn create_connection(
        &self,
        kind: TransportKind,
        remote: &str,
    ) -> Result<ConnectionHandle, ConnectionError> {
        self.shared.conns.create(kind, remote)
    }

    /// Close a connection. Redundant closes are ordinary Oks.
    pub fn close_connection(&self, id: ConnectionId) -> Result<(), ConnectionError> {
        self.shared.conns.close(id)
    }

    /// Subscribe to lifecycle/telemetry events
    pub fn subscribe(&self, filter: EventFilter) -> EventStream {
        self.shared.bus.subscribe(filter)
    }

    /// Assemble a point-in-time metrics snapshot
    pub fn metrics(&self) -> MetricsSnapshot {
        let shared = &self.shared;
        shared.metrics.snapshot(
            shared.lanes.depths(),
            shared.conns.active_len(),
            shared.pool.available(),
        )
    }

    /// True while the loops are running
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }
}

impl Drop for TransportCore {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Generation-tagged snapshot of live connections
///
/// Refreshing takes the registry lock; per-packet lookups do not.
struct ConnCache<K> {
    map: HashMap<K, Arc<Connection>>,
    seen_generation: u64,
}

impl<K> ConnCache<K> {
    fn new() -> Self {
        Self {
            map: HashMap::new(),
            seen_generation: u64::MAX,
        }
    }
}

impl ConnCache<u64> {
    #[inline]
    fn refresh(&mut self, conns: &ConnectionManager) {
        let generation = conns.generation();
        if generation != self.seen_generation {
            self.map = conns.snapshot_by_handle();
            self.seen_generation = generation;
        }
    }
}

impl ConnCache<ConnectionId> {
    #[inline]
    fn refresh(&mut self, conns: &ConnectionManager) {
        let generation = conns.generation();
        if generation != self.seen_generation {
            self.map = conns.snapshot_by_id();
            self.seen_generation = generation;
        }
    }
}

/// Inbound ingestion loop: driver -> pooled buffer -> inbound lane
fn inbound_loop(shared: &Shared) {
    let poll = Duration::from_micros(shared.config.runtime.polling_interval_us);
    let deadline = Duration::from_micros(shared.config.runtime.read_deadline_us);
    let mut cache = ConnCache::<u64>::new();

    while !shared.stop.load(Ordering::Acquire) {
        let Some(mut buf) = shared.pool.acquire() else {
            // Back-pressure: no free buffer, skip this poll
            shared.metrics.record_pool_starved();
            thread::sleep(poll);
            continue;
        };

        match shared.driver.poll_recv(buf.payload_mut(), deadline) {
            Ok(Some(meta)) => {
                buf.set_len(meta.len);
                shared.clock.stamp(&mut buf);

                cache.refresh(&shared.conns);
                if let Some(conn) = cache.map.get(&meta.handle.0) {
                    buf.set_conn(conn.id());
                    conn.stats().record_in(meta.len, buf.stamp_ns());
                }

                let len = buf.len();
                match shared.lanes.enqueue(Lane::Inbound, buf) {
                    Ok(()) => {
                        shared.metrics.record_receive(len);
                        if shared.bus.has_subscribers() {
                            shared.bus.publish(NetworkEvent::new(
                                EventKind::PacketReceived,
                                shared.clock.now_ns(),
                            ));
                        }
                    }
                    Err(rejected) => {
                        // Inbound lane full: drop, count, warn. No retry on
                        // the hot path.
                        let conn = rejected.conn();
                        shared.pool.release(rejected);
                        shared.metrics.record_inbound_drop();
                        if shared.bus.has_subscribers() {
                            shared.bus.publish(
                                NetworkEvent::new(
                                    EventKind::PacketDropped,
                                    shared.clock.now_ns(),
                                )
                                .with_connection(conn)
                                .with_detail("inbound lane full"),
                            );
                        }
                    }
                }
            }
            Ok(None) => {
                shared.pool.release(buf);
                thread::sleep(poll);
            }
            Err(e) => {
                shared.pool.release(buf);
                shared.metrics.record_driver_error();
                if shared.bus.has_subscribers() {
                    shared.bus.publish(
                        NetworkEvent::new(EventKind::TransportError, shared.clock.now_ns())
                            .with_detail(format!("poll_recv: {}", e)),
                    );
                }
                thread::sleep(poll);
            }
        }
    }
}

/// Outbound drain loop: priority lane, then outbound lane -> driver
fn outbound_loop(shared: &Shared) {
    let batch_size = shared.config.queues.batch_size;
    let idle = Duration::from_micros(shared.config.runtime.idle_wait_us);
    let mut batch: Vec<PacketBuffer> = Vec::with_capacity(batch_size * 2);
    let mut cache = ConnCache::<ConnectionId>::new();

    while !shared.stop.load(Ordering::Acquire) {
        batch.clear();
        if shared.lanes.drain_egress(batch_size, &mut batch) == 0 {
            // Bounded idle wait, not a spin
            thread::sleep(idle);
            continue;
        }

        cache.refresh(&shared.conns);
        for buf in batch.drain(..) {
            transmit(shared, &cache.map, buf);
        }
    }
}

/// Hand one buffer to the driver and account for it
fn transmit(shared: &Shared, conns: &HashMap<ConnectionId, Arc<Connection>>, buf: PacketBuffer) {
    let now = shared.clock.now_ns();
    if buf.is_expired(now) {
        shared.metrics.record_expired();
        shared.pool.release(buf);
        return;
    }

    let Some(conn) = conns.get(&buf.conn()) else {
        // Destination closed while the buffer was queued
        shared.metrics.record_unrouted();
        shared.pool.release(buf);
        return;
    };
    let Some(handle) = conn.driver_handle() else {
        shared.metrics.record_unrouted();
        shared.pool.release(buf);
        return;
    };

    match shared.driver.send(handle, buf.as_slice()) {
        Ok(sent) => {
            let latency = now.saturating_sub(buf.stamp_ns());
            shared.metrics.record_send(sent);
            conn.stats().record_out(sent, now);
            if shared.metrics.record_latency(latency) && shared.bus.has_subscribers() {
                // Best-effort alert; a full subscriber just misses it
                shared.bus.publish(
                    NetworkEvent::new(EventKind::LatencyAlert, now)
                        .with_connection(conn.id())
                        .with_latency(latency),
                );
            }
            if shared.bus.has_subscribers() {
                shared
                    .bus
                    .publish(NetworkEvent::new(EventKind::PacketSent, now));
            }
        }
        Err(e) => {
            shared.metrics.record_driver_error();
            if shared.bus.has_subscribers() {
                shared.bus.publish(
                    NetworkEvent::new(EventKind::TransportError, now)
                        .with_connection(conn.id())
                        .with_detail(format!("send: {}", e)),
                );
            }
        }
    }
    shared.pool.release(buf);
}

/// Sleep `total` in `step` increments, returning early when stop is set
fn sleep_observing(stop: &AtomicBool, total: Duration, step: Duration) -> bool {
    let mut slept = Duration::ZERO;
    while slept < total {
        if stop.load(Ordering::Acquire) {
            return true;
        }
        let chunk = step.min(total - slept);
        thread::sleep(chunk);
        slept += chunk;
    }
    stop.load(Ordering::Acquire)
}

/// Periodic idle scan over the connection registry
fn health_loop(shared: &Shared) {
    let interval = Duration::from_secs(shared.config.connections.keep_alive_secs);
    let step = Duration::from_micros(shared.config.runtime.polling_interval_us.max(1_000));
    let idle_timeout_ns = shared.config.connections.idle_timeout_secs * 1_000_000_000;

    while !sleep_observing(&shared.stop, interval, step) {
        let closed = shared.conns.scan_idle(idle_timeout_ns);
        if closed > 0 {
            tracing::info!(target: "engine", "health scan closed {} idle connections", closed);
        }
    }
}

/// Periodic rate computation from counter deltas
fn metrics_loop(shared: &Shared) {
    let interval = Duration::from_secs(shared.config.metrics.report_interval_secs.max(1));
    let step = Duration::from_micros(shared.config.runtime.polling_interval_us.max(1_000));
    let interval_secs = interval.as_secs();

    let (mut prev_pin, mut prev_pout, mut prev_bin, mut prev_bout) = shared.metrics.totals();
    while !sleep_observing(&shared.stop, interval, step) {
        let (pin, pout, bin, bout) = shared.metrics.totals();
        shared.metrics.store_rates(
            (pin - prev_pin) / interval_secs,
            (pout - prev_pout) / interval_secs,
            (bin - prev_bin) / interval_secs,
            (bout - prev_bout) / interval_secs,
        );
        (prev_pin, prev_pout, prev_bin, prev_bout) = (pin, pout, bin, bout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::LoopbackDriver;
    use crate::test_utils::{small_config, TagCodec};
    use crate::core::{MessageKind, Priority};
    use bytes::Bytes;

    fn core_with(config: Config) -> TransportCore {
        TransportCore::new(
            config,
            Arc::new(LoopbackDriver::default()),
            Arc::new(TagCodec),
        )
        .unwrap()
    }

    #[test]
    fn test_start_stop_idempotent() {
        let core = core_with(small_config());
        assert!(!core.is_running());
        core.start().unwrap();
        assert!(core.is_running());
        // Redundant lifecycle calls are ordinary results
        core.start().unwrap();
        core.stop();
        assert!(!core.is_running());
        core.stop();
    }

    #[test]
    fn test_start_joins_configured_multicast_groups() {
        let mut config = small_config();
        config.transport.multicast_groups =
            vec!["239.10.0.1:6000".into(), "not an address".into()];
        let core = core_with(config);
        core.start().unwrap();
        // One valid group joined; the bad one degrades to a warning
        assert_eq!(core.metrics().active_connections, 1);
        core.stop();
        assert_eq!(core.metrics().active_connections, 0);
    }

    #[test]
    fn test_send_requires_destination() {
        let core = core_with(small_config());
        let mut message = Message::new(
            MessageKind::Heartbeat,
            ConnectionId(1),
            Bytes::from_static(b"hb"),
        );
        message.destination = None;
        assert!(matches!(
            core.send(&message),
            Err(SendError::NoDestination)
        ));
    }

    #[test]
    fn test_send_to_unknown_connection() {
        let core = core_with(small_config());
        let message = Message::new(
            MessageKind::Heartbeat,
            ConnectionId(42),
            Bytes::from_static(b"hb"),
        );
        assert!(matches!(
            core.send(&message),
            Err(SendError::UnknownConnection(ConnectionId(42)))
        ));
    }

    #[test]
    fn test_send_routes_express_to_priority_lane() {
        // Loops not started: buffers stay queued where send put them.
        let core = core_with(small_config());
        let handle = core
            .create_connection(TransportKind::Udp, "127.0.0.1:9000")
            .unwrap();

        let normal = Message::new(MessageKind::MarketData, handle.id, Bytes::from_static(b"n"));
        let express = Message::new(MessageKind::OrderUpdate, handle.id, Bytes::from_static(b"x"))
            .with_priority(Priority::Critical);
        core.send(&normal).unwrap();
        core.send(&express).unwrap();

        let snap = core.metrics();
        assert_eq!(snap.outbound_depth, 1);
        assert_eq!(snap.priority_depth, 1);
    }

    #[test]
    fn test_send_lane_full_backpressure() {
        let mut config = small_config();
        config.queues.depth = 2;
        let core = core_with(config);
        let handle = core
            .create_connection(TransportKind::Udp, "127.0.0.1:9000")
            .unwrap();

        let message = Message::new(MessageKind::Trade, handle.id, Bytes::from_static(b"t"));
        core.send(&message).unwrap();
        core.send(&message).unwrap();
        let err = core.send(&message).unwrap_err();
        assert!(matches!(err, SendError::LaneFull { lane: Lane::Outbound }));
        // The rejected buffer went back to the pool
        assert_eq!(core.metrics().free_buffers, small_config().buffers.pool_size - 2);
    }

    #[test]
    fn test_receive_empty() {
        let core = core_with(small_config());
        assert_eq!(core.receive().unwrap_err(), RecvError::Empty);
    }

    #[test]
    fn test_metrics_snapshot_counts_resources() {
        let config = small_config();
        let pool_size = config.buffers.pool_size;
        let core = core_with(config);
        let snap = core.metrics();
        assert_eq!(snap.free_buffers, pool_size);
        assert_eq!(snap.active_connections, 0);
        assert_eq!(snap.inbound_depth, 0);
    }
}
