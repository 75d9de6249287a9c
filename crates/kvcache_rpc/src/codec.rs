//! Wire encoding.
//!
//! Every message travels as one frame: a 4-byte big-endian length followed
//! by a CBOR body.
//!
//! ```text
//! [u32 BE: body_len][body_len bytes: CBOR]
//! ```

use crate::error::{RpcError, RpcResult};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::codec::LengthDelimitedCodec;

/// Default largest frame body accepted (16 MiB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Returns a frame codec accepting bodies up to `max_frame_size` bytes.
#[must_use]
pub fn frame_codec(max_frame_size: usize) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .max_frame_length(max_frame_size)
        .new_codec()
}

/// Encodes `message` as a CBOR frame body.
///
/// # Errors
///
/// [`RpcError::Codec`] if serialization fails.
pub fn encode<T: Serialize>(message: &T) -> RpcResult<Bytes> {
    let mut body = Vec::new();
    ciborium::ser::into_writer(message, &mut body).map_err(|e| RpcError::Codec(e.to_string()))?;
    Ok(Bytes::from(body))
}

/// Decodes a CBOR frame body.
///
/// # Errors
///
/// [`RpcError::Codec`] if the body is not a valid message.
pub fn decode<T: DeserializeOwned>(body: &[u8]) -> RpcResult<T> {
    ciborium::de::from_reader(body).map_err(|e| RpcError::Codec(e.to_string()))
}
