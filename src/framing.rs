//! Splitting serialized envelopes into size-bounded WebSocket frames.

use crate::error::{MtsError, MtsResult};
use serde::Serialize;

/// Largest payload carried by a single frame.
pub const MAX_CHUNK_SIZE: usize = 32_000;
/// Largest logical message; anything bigger is rejected before it reaches a socket.
pub const MAX_MESSAGE_SIZE: usize = 4 * MAX_CHUNK_SIZE;

/// One fragment of a logical text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub payload: Vec<u8>,
    /// Set only on the last fragment of a message.
    pub is_final: bool,
}

/// Serialize `value` to UTF-8 JSON and split it into frames.
pub fn encode_frames<T: Serialize>(value: &T) -> MtsResult<Vec<Frame>> {
    let bytes = serde_json::to_vec(value)?;
    split_into_frames(&bytes)
}

/// Split raw bytes into ordered chunks of at most [`MAX_CHUNK_SIZE`].
pub fn split_into_frames(bytes: &[u8]) -> MtsResult<Vec<Frame>> {
    if bytes.len() > MAX_MESSAGE_SIZE {
        return Err(MtsError::MessageTooBig {
            size: bytes.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }

    let count = bytes.len().div_ceil(MAX_CHUNK_SIZE);
    Ok(bytes
        .chunks(MAX_CHUNK_SIZE)
        .enumerate()
        .map(|(i, chunk)| Frame {
            payload: chunk.to_vec(),
            is_final: i + 1 == count,
        })
        .collect())
}

/// Concatenate frame payloads back into the original message bytes.
pub fn reassemble(frames: &[Frame]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(frames.iter().map(|f| f.payload.len()).sum());
    for frame in frames {
        bytes.extend_from_slice(&frame.payload);
    }
    bytes
}
