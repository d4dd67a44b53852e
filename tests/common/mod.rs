//! Shared fixtures for the integration suite
//!
//! The frame codec mirrors the demo binary's framing: kind, priority, then
//! payload bytes. Test tooling only - wire formats are a collaborator's
//! concern.

use bytes::Bytes;
use std::sync::Arc;

use pulsewire::codec::{CodecError, MessageCodec};
use pulsewire::{
    Config, ConnectionId, LoopbackDriver, Message, MessageKind, Priority, TransportCore,
};

pub struct FrameCodec;

impl MessageCodec for FrameCodec {
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
        let kind = MessageKind::from_u8(frame[0])
            .ok_or_else(|| CodecError::Malformed(format!("bad kind tag {}", frame[0])))?;
        let priority = Priority::from_u8(frame[1])
            .ok_or_else(|| CodecError::Malformed(format!("bad priority tag {}", frame[1])))?;
        let mut message = Message::new(kind, ConnectionId(0), Bytes::copy_from_slice(&frame[2..]));
        message.destination = None;
        message.priority = priority;
        Ok(message)
    }
}

/// Configuration scaled down so the loops react within milliseconds
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.buffers.pool_size = 64;
    config.buffers.buffer_size = 512;
    config.queues.depth = 64;
    config.queues.batch_size = 8;
    config.runtime.polling_interval_us = 200;
    config.runtime.read_deadline_us = 100;
    config.runtime.idle_wait_us = 100;
    config.connections.pool_size = 8;
    config.connections.keep_alive_secs = 1;
    config.connections.idle_timeout_secs = 600;
    config.events.subscriber_depth = 1024;
    config.metrics.report_interval_secs = 1;
    config
}

/// Core over a fresh loopback driver
pub fn loopback_core(config: Config) -> TransportCore {
    TransportCore::new(
        config,
        Arc::new(LoopbackDriver::default()),
        Arc::new(FrameCodec),
    )
    .expect("core construction")
}
