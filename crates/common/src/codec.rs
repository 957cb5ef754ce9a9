//! Binary encoding for persisted records
//!
//! Every record that lands in a blob or a cell (trees, refs, cell contents,
//! commits) goes through [`BlockEncoded`]. bincode gives a deterministic byte
//! layout, which matters because signatures are computed over these bytes.

use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("encode error: {0}")]
    Encode(String),
    #[error("decode error: {0}")]
    Decode(String),
}

pub trait BlockEncoded: Serialize + DeserializeOwned + Sized {
    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        bincode::serialize(self).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(data: &[u8]) -> Result<Self, CodecError> {
        bincode::deserialize(data).map_err(|e| CodecError::Decode(e.to_string()))
    }

    /// Size of the encoded form, without allocating it
    fn encoded_len(&self) -> Result<usize, CodecError> {
        bincode::serialized_size(self)
            .map(|n| n as usize)
            .map_err(|e| CodecError::Encode(e.to_string()))
    }
}
