//! Hot path - zero allocation, zero panic, no locks
//!
//! This module contains the latency-critical machinery:
//! - Pooled packet buffers (zero-copy foundation)
//! - Lock-free MPMC lane queues
//! - Monotonic timestamp engine

pub mod buffer;
pub mod clock;
pub mod lanes;
pub mod queue;

pub use buffer::{BufferPool, PacketBuffer};
pub use clock::TimestampEngine;
pub use lanes::{Lane, LaneDepths, LaneSet};
pub use queue::{LaneQueue, QueueError};
