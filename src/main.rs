//! Transport core demo over the loopback driver
//!
//! Wires a TransportCore to the in-memory loopback driver and a minimal
//! demo codec, pushes a burst of traffic through the full path, and prints
//! a metrics snapshot. Useful as a smoke test and as a reference for
//! embedding the core behind a real driver and codec.

use bytes::Bytes;
use std::sync::Arc;
use std::time::{Duration, Instant};

use pulsewire::codec::{CodecError, MessageCodec};
use pulsewire::infrastructure::logging::init_logging;
use pulsewire::{
    Config, ConnectionId, LoopbackDriver, Message, MessageKind, Priority, TransportCore,
    TransportKind,
};

/// Demo framing: kind, priority, then payload bytes. Stands in for a real
/// codec, which is a collaborator's responsibility.
struct DemoCodec;

impl MessageCodec for DemoCodec {
    fn encode(&self, message: &Message, buf: &mut [u8]) -> Result<usize, CodecError> {
        let needed = 2 + message.payload.len();
        if needed > buf.len() {
            return Err(CodecError::PayloadTooLarge {
                payload: needed,
                capacity: buf.len(),
            });
        }
        buf[0] = message.kind as u8;
        buf[1] = message.priority as u8;
        buf[2..needed].copy_from_slice(&message.payload);
        Ok(needed)
    }

    fn decode(&self, frame: &[u8]) -> Result<Message, CodecError> {
        if frame.len() < 2 {
            return Err(CodecError::Malformed("frame shorter than header".into()));
        }
        let kind = pulsewire::MessageKind::from_u8(frame[0])
            .ok_or_else(|| CodecError::Malformed(format!("bad kind tag {}", frame[0])))?;
        let mut message = Message::new(kind, ConnectionId(0), Bytes::copy_from_slice(&frame[2..]));
        message.destination = None;
        Ok(message)
    }
}

fn main() -> pulsewire::Result<()> {
    let _guards = init_logging();

    let config = Config::load()?;
    let core = TransportCore::new(config, Arc::new(LoopbackDriver::default()), Arc::new(DemoCodec))?;
    core.start()?;

    let conn = core.create_connection(TransportKind::Udp, "127.0.0.1:9310")?;
    tracing::info!("loopback connection open: {:?}", conn);

    // Push a burst of market data with an occasional critical order update
    for i in 0u32..1_000 {
        let message = if i % 100 == 0 {
            Message::new(
                MessageKind::OrderUpdate,
                conn.id,
                Bytes::copy_from_slice(&i.to_be_bytes()),
            )
            .with_priority(Priority::Critical)
        } else {
            Message::new(
                MessageKind::MarketData,
                conn.id,
                Bytes::copy_from_slice(&i.to_be_bytes()),
            )
        };
        // Lane-full is back-pressure; yield and let the drain catch up
        while core.send(&message).is_err() {
            std::thread::yield_now();
        }
    }

    // Drain the echoes as they come back around
    let mut received = 0u32;
    let deadline = Instant::now() + Duration::from_secs(5);
    while received < 1_000 && Instant::now() < deadline {
        match core.receive() {
            Ok(_) => received += 1,
            Err(_) => std::thread::sleep(Duration::from_millis(1)),
        }
    }

    let snapshot = core.metrics();
    tracing::info!(
        "demo done: received {} of 1000, sent {} packets, min/avg/max latency {:?}/{}/{} ns",
        received,
        snapshot.packets_out,
        snapshot.latency_min_ns,
        snapshot.latency_avg_ns,
        snapshot.latency_max_ns,
    );

    core.close_connection(conn.id)?;
    core.stop();
    Ok(())
}
