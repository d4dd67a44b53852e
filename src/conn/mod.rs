//! Connection pool and lifecycle management

pub mod pool;

pub use pool::{ConnectionError, ConnectionManager};
