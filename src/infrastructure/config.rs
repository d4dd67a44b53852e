//! Configuration management for the transport core
//!
//! Loads configuration from pulsewire.toml at startup.
//! All values are configurable to avoid hardcoded constants.

use serde::{Deserialize, Serialize};

/// Transport configuration
///
/// Loaded from pulsewire.toml at startup. Contains all tunable parameters
/// to avoid hardcoded values throughout the codebase.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub buffers: BufferConfig,

    #[serde(default)]
    pub queues: QueueConfig,

    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub latency: LatencyConfig,

    #[serde(default)]
    pub connections: ConnectionsConfig,

    #[serde(default)]
    pub events: EventsConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Socket-facing options handed to the transport driver
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
    /// UDP port for unicast market data
    #[serde(default = "default_udp_port")]
    pub udp_port: u16,

    /// TCP port for order flow
    #[serde(default = "default_tcp_port")]
    pub tcp_port: u16,

    /// Multicast groups to join, "address:port" form
    #[serde(default)]
    pub multicast_groups: Vec<String>,

    /// Interface name to bind, empty for the OS default
    #[serde(default)]
    pub interface: String,

    /// Ask the driver for a kernel-bypass data path if it has one
    #[serde(default)]
    pub enable_kernel_bypass: bool,

    /// Hand pooled buffers to the driver without an intermediate copy
    #[serde(default = "default_true")]
    pub enable_zero_copy: bool,

    /// Ask for NIC-sourced timestamps; monotonic fallback otherwise
    #[serde(default)]
    pub enable_hardware_timestamps: bool,
}

/// Buffer pool sizing
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BufferConfig {
    /// Bytes per pooled buffer
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Number of pre-allocated buffers
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Zero each buffer when it returns to the pool
    #[serde(default)]
    pub zero_on_release: bool,
}

/// Lane queue sizing
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    /// Slots per lane; rounded up to a power of two by `validated`
    #[serde(default = "default_queue_depth")]
    pub depth: usize,

    /// Buffers drained per lane per egress cycle
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

/// Processing loop behavior
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuntimeConfig {
    /// Cores for the packet loops and connection labels, in preference
    /// order. Empty disables pinning.
    #[serde(default)]
    pub core_affinity: Vec<usize>,

    /// Inbound loop polling interval, microseconds
    #[serde(default = "default_polling_interval_us")]
    pub polling_interval_us: u64,

    /// Driver read deadline per poll, microseconds
    #[serde(default = "default_read_deadline_us")]
    pub read_deadline_us: u64,

    /// Outbound loop idle wait when both lanes are empty, microseconds
    #[serde(default = "default_idle_wait_us")]
    pub idle_wait_us: u64,
}

/// Latency monitor thresholds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LatencyConfig {
    /// Latency target; observations above it raise a LatencyAlert
    #[serde(default = "default_latency_target_ns")]
    pub target_ns: u64,

    /// Jitter threshold between consecutive observations
    #[serde(default = "default_jitter_threshold_ns")]
    pub jitter_threshold_ns: u64,
}

/// Connection pool sizing and health policy
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionsConfig {
    /// Number of recyclable connection objects
    #[serde(default = "default_connection_pool_size")]
    pub pool_size: usize,

    /// Health scan interval, seconds
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,

    /// Idle time after which the health scan force-closes, seconds
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

/// Event fan-out sizing
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventsConfig {
    /// Bounded depth of each subscriber stream
    #[serde(default = "default_subscriber_depth")]
    pub subscriber_depth: usize,
}

/// Metrics reporting
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    /// Rate computation interval, seconds
    #[serde(default = "default_report_interval_secs")]
    pub report_interval_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            udp_port: default_udp_port(),
            tcp_port: default_tcp_port(),
            multicast_groups: Vec::new(),
            interface: String::new(),
            enable_kernel_bypass: false,
            enable_zero_copy: default_true(),
            enable_hardware_timestamps: false,
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            pool_size: default_pool_size(),
            zero_on_release: false,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            depth: default_queue_depth(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            core_affinity: Vec::new(),
            polling_interval_us: default_polling_interval_us(),
            read_deadline_us: default_read_deadline_us(),
            idle_wait_us: default_idle_wait_us(),
        }
    }
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            target_ns: default_latency_target_ns(),
            jitter_threshold_ns: default_jitter_threshold_ns(),
        }
    }
}

impl Default for ConnectionsConfig {
    fn default() -> Self {
        Self {
            pool_size: default_connection_pool_size(),
            keep_alive_secs: default_keep_alive_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            subscriber_depth: default_subscriber_depth(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: default_report_interval_secs(),
        }
    }
}

fn default_udp_port() -> u16 {
    9310
}

fn default_tcp_port() -> u16 {
    9311
}

fn default_true() -> bool {
    true
}

fn default_buffer_size() -> usize {
    2048
}

fn default_pool_size() -> usize {
    1024
}

fn default_queue_depth() -> usize {
    1024
}

fn default_batch_size() -> usize {
    64
}

fn default_polling_interval_us() -> u64 {
    50
}

fn default_read_deadline_us() -> u64 {
    20
}

fn default_idle_wait_us() -> u64 {
    100
}

fn default_latency_target_ns() -> u64 {
    50_000 // 50us
}

fn default_jitter_threshold_ns() -> u64 {
    10_000
}

fn default_connection_pool_size() -> usize {
    64
}

fn default_keep_alive_secs() -> u64 {
    5
}

fn default_idle_timeout_secs() -> u64 {
    30
}

fn default_subscriber_depth() -> usize {
    256
}

fn default_report_interval_secs() -> u64 {
    1
}

impl Config {
    /// Load configuration from the pulsewire.toml file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// # Errors
    /// Returns error if file exists but cannot be parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "pulsewire.toml".to_string());

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => {
                let config: Config = toml::from_str(&contents)
                    .map_err(|e| ConfigError::ParseError(e.to_string()))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File not found - use defaults
                Ok(Config::default())
            }
            Err(e) => Err(ConfigError::IoError(e)),
        }
    }

    /// Validate and normalize the configuration
    ///
    /// Rejects zero-sized resources and rounds the queue depth up to the
    /// next power of two so lane construction cannot fail at runtime.
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        if self.buffers.buffer_size == 0 {
            return Err(ConfigError::Invalid("buffers.buffer_size must be non-zero"));
        }
        if self.buffers.pool_size == 0 {
            return Err(ConfigError::Invalid("buffers.pool_size must be non-zero"));
        }
        if self.queues.depth == 0 {
            return Err(ConfigError::Invalid("queues.depth must be non-zero"));
        }
        if self.queues.batch_size == 0 {
            return Err(ConfigError::Invalid("queues.batch_size must be non-zero"));
        }
        if self.connections.pool_size == 0 {
            return Err(ConfigError::Invalid(
                "connections.pool_size must be non-zero",
            ));
        }
        if self.events.subscriber_depth == 0 {
            return Err(ConfigError::Invalid(
                "events.subscriber_depth must be non-zero",
            ));
        }
        self.queues.depth = self.queues.depth.next_power_of_two().max(2);
        Ok(self)
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading file
    IoError(std::io::Error),
    /// Parse error (invalid TOML)
    ParseError(String),
    /// Semantic validation failure
    Invalid(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::ParseError(e) => write!(f, "Failed to parse config: {}", e),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::IoError(e) => Some(e),
            ConfigError::ParseError(_) | ConfigError::Invalid(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.buffers.buffer_size, 2048);
        assert_eq!(config.buffers.pool_size, 1024);
        assert_eq!(config.queues.depth, 1024);
        assert_eq!(config.queues.batch_size, 64);
        assert_eq!(config.latency.target_ns, 50_000);
        assert_eq!(config.connections.pool_size, 64);
        assert!(config.transport.enable_zero_copy);
        assert!(!config.transport.enable_kernel_bypass);
        assert!(config.runtime.core_affinity.is_empty());
    }

    #[test]
    fn test_validated_rounds_queue_depth() {
        let mut config = Config::default();
        config.queues.depth = 1000;
        let config = config.validated().unwrap();
        assert_eq!(config.queues.depth, 1024);

        let mut config = Config::default();
        config.queues.depth = 1;
        let config = config.validated().unwrap();
        assert_eq!(config.queues.depth, 2);
    }

    #[test]
    fn test_validated_rejects_zero_sizes() {
        let mut config = Config::default();
        config.buffers.pool_size = 0;
        assert!(config.validated().is_err());

        let mut config = Config::default();
        config.queues.batch_size = 0;
        assert!(config.validated().is_err());
    }

    #[test]
    fn test_parse_partial_toml() {
        let toml_str = r#"
            [queues]
            depth = 512

            [latency]
            target_ns = 25000

            [transport]
            multicast_groups = ["239.1.1.1:5000"]
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.queues.depth, 512);
        // Unspecified fields fall back to section defaults
        assert_eq!(config.queues.batch_size, 64);
        assert_eq!(config.latency.target_ns, 25_000);
        assert_eq!(config.transport.multicast_groups, vec!["239.1.1.1:5000"]);
        assert_eq!(config.transport.udp_port, 9310);
    }
}
