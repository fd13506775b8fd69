//! Record codec shared by every layer.
//!
//! Layers store opaque bytes. The orchestrator wraps each value in a
//! [`Record`] carrying the negative-cache flag and serializes it as
//! MessagePack, so a negative marker survives any tier unchanged.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::layer::Payload;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("record encoding failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("record payload is corrupt: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// Logical cache entry: either a value or a negative marker.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct Record {
    #[serde(rename = "v", default)]
    pub value: Option<Vec<u8>>,
    #[serde(rename = "n", default)]
    pub negative: bool,
}

impl Record {
    /// Value carried by a positive record (empty for a bare positive record).
    pub fn into_value(self) -> Vec<u8> {
        self.value.unwrap_or_default()
    }
}

#[derive(Serialize)]
struct RecordRef<'a> {
    #[serde(rename = "v")]
    value: Option<&'a [u8]>,
    #[serde(rename = "n")]
    negative: bool,
}

/// Encode a positive record holding `value`.
pub fn encode(value: &[u8]) -> Result<Payload, CodecError> {
    encode_record(Some(value), false)
}

/// Encode a negative record. Negative records never carry a value.
pub fn encode_negative() -> Result<Payload, CodecError> {
    encode_record(None, true)
}

fn encode_record(value: Option<&[u8]>, negative: bool) -> Result<Payload, CodecError> {
    let bytes = rmp_serde::to_vec(&RecordRef { value, negative })?;
    Ok(Arc::new(bytes))
}

/// Decode a payload written by [`encode`] or [`encode_negative`].
pub fn decode(payload: &[u8]) -> Result<Record, CodecError> {
    let mut record: Record = rmp_serde::from_slice(payload)?;
    if record.negative {
        record.value = None;
    }
    Ok(record)
}
