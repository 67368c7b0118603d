//! Receiving account state (persisted in the seeded receiving account).

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("malformed receiving account data ({len} bytes): {reason}")]
    Malformed { len: usize, reason: String },
    #[error("failed to encode receiving account: {0}")]
    Encode(String),
}

/// The single record stored in the receiving account: the last note sent
/// along with a transfer.
///
/// Layout: `u32` little-endian byte length, followed by the UTF-8 bytes.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct ReceiverState {
    pub note: String,
}

impl ReceiverState {
    pub fn new(note: impl Into<String>) -> Self {
        Self { note: note.into() }
    }

    pub fn encode(&self) -> Result<Vec<u8>, RecordError> {
        borsh::to_vec(self).map_err(|e| RecordError::Encode(e.to_string()))
    }

    /// Decode account data. Trailing bytes are rejected.
    pub fn decode(data: &[u8]) -> Result<Self, RecordError> {
        borsh::from_slice(data).map_err(|e| RecordError::Malformed {
            len: data.len(),
            reason: e.to_string(),
        })
    }

    /// Encoded length of this record.
    pub fn encoded_len(&self) -> usize {
        size_of::<u32>() + self.note.len()
    }

    /// Space to allocate for a new receiving account: the encoded length of
    /// the default record.
    pub fn sized_empty() -> usize {
        Self::default().encoded_len()
    }
}
