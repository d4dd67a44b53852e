//! Infrastructure - cold path only
//!
//! This module contains non-latency-critical code:
//! - Configuration management
//! - Logging
//! - Metrics aggregation and the latency monitor
//! - CPU affinity helpers
//! - Event fan-out bus

pub mod affinity;
pub mod bus;
pub mod config;
pub mod logging;
pub mod metrics;

pub use affinity::{pin_current_thread, AffinityError, CoreAllocator};
pub use bus::{EventBus, EventStream};
pub use config::{Config, ConfigError};
pub use metrics::{MetricsSnapshot, TransportMetrics};
