//! Message codec seam
//!
//! Wire-format encoding is a collaborator's responsibility; this crate
//! defines only the boundary. `encode` serializes directly into a pooled
//! buffer (the zero-copy write path); `decode` materializes a Message from
//! the received bytes. No codec implementation ships with the library.

use thiserror::Error;

use crate::core::Message;

/// Codec failures
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("payload of {payload} bytes exceeds buffer capacity {capacity}")]
    PayloadTooLarge { payload: usize, capacity: usize },

    #[error("malformed frame: {0}")]
    Malformed(String),
}

/// Contract required of a message codec
///
/// Implementations are called concurrently from caller threads and the
/// consumer side of `receive`; they must be stateless or internally
/// synchronized.
pub trait MessageCodec: Send + Sync {
    /// Serialize `message` into `buf`, returning the encoded length
    fn encode(&self, message: &Message, buf: &mut [u8]) -> Result<usize, CodecError>;

    /// Materialize a message from a received frame
    fn decode(&self, frame: &[u8]) -> Result<Message, CodecError>;
}
