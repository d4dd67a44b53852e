//! Shared helpers for unit tests
//!
//! A tiny tag codec and a scaled-down configuration so engine tests run in
//! milliseconds. The codec frames messages as kind, priority, then raw
//! payload bytes - test tooling only, not a protocol.

use bytes::Bytes;

use crate::codec::{CodecError, MessageCodec};
use crate::core::{ConnectionId, Message, MessageKind, Priority};
use crate::infrastructure::Config;

/// Minimal frame codec for tests: [kind, priority, payload...]
pub struct TagCodec;

impl MessageCodec for TagCodec {
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
        let mut message = Message::new(
            kind,
            ConnectionId(0),
            Bytes::copy_from_slice(&frame[2..]),
        );
        message.destination = None;
        message.priority = priority;
        Ok(message)
    }
}

/// Small, fast configuration for tests
pub fn small_config() -> Config {
    let mut config = Config::default();
    config.buffers.pool_size = 16;
    config.buffers.buffer_size = 256;
    config.queues.depth = 16;
    config.queues.batch_size = 4;
    config.runtime.polling_interval_us = 200;
    config.runtime.read_deadline_us = 100;
    config.runtime.idle_wait_us = 100;
    config.connections.pool_size = 4;
    config.connections.keep_alive_secs = 1;
    config.connections.idle_timeout_secs = 30;
    config.events.subscriber_depth = 64;
    config
}
