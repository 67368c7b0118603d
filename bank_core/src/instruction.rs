//! Instructions that the bank program understands, and their wire format.
//!
//! `[tag (1 byte) || amount (8 bytes LE) || note (UTF-8, rest of payload)]`

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEPOSIT_TAG: u8 = 0;
pub const WITHDRAW_TAG: u8 = 1;

const AMOUNT_LEN: usize = 8;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InstructionError {
    #[error("instruction data is empty")]
    Empty,
    #[error("unknown instruction tag {0}")]
    UnknownTag(u8),
    #[error("instruction data too short for an amount: {0} bytes after the tag")]
    Truncated(usize),
    #[error("note is not valid UTF-8")]
    InvalidNote,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BankInstruction {
    /// Move `amount` from the payer's wrapped account into the bank and
    /// record `note` in the receiving account.
    ///
    /// **Accounts (in order):**
    /// 0. `receiving`: seeded account owned by the bank (writable)
    /// 1. `source`: wrapped-value token account (writable)
    /// 2. `payer`: fee payer and token account owner (signer)
    /// 3. `token_program`
    /// 4. `rent` sysvar
    Deposit { amount: u64, note: String },

    /// Move `amount` out of a wrapped account, authorized by the bank's PDA.
    ///
    /// **Accounts (in order):**
    /// 0. `destination`: wrapped-value token account (writable)
    /// 1. `source`: wrapped-value token account (writable)
    /// 2. `authority`: program-derived address
    /// 3. `token_program`
    /// 4. `rent` sysvar
    Withdraw { amount: u64, note: String },
}

impl BankInstruction {
    pub fn tag(&self) -> u8 {
        match self {
            Self::Deposit { .. } => DEPOSIT_TAG,
            Self::Withdraw { .. } => WITHDRAW_TAG,
        }
    }

    pub fn amount(&self) -> u64 {
        match self {
            Self::Deposit { amount, .. } | Self::Withdraw { amount, .. } => *amount,
        }
    }

    pub fn note(&self) -> &str {
        match self {
            Self::Deposit { note, .. } | Self::Withdraw { note, .. } => note,
        }
    }

    pub fn pack(&self) -> Vec<u8> {
        let note = self.note().as_bytes();
        let mut data = Vec::with_capacity(1 + AMOUNT_LEN + note.len());
        data.push(self.tag());
        data.extend_from_slice(&self.amount().to_le_bytes());
        data.extend_from_slice(note);
        data
    }

    pub fn unpack(input: &[u8]) -> Result<Self, InstructionError> {
        let (&tag, rest) = input.split_first().ok_or(InstructionError::Empty)?;
        if tag != DEPOSIT_TAG && tag != WITHDRAW_TAG {
            return Err(InstructionError::UnknownTag(tag));
        }

        let (amount, note) = rest
            .split_first_chunk::<AMOUNT_LEN>()
            .ok_or(InstructionError::Truncated(rest.len()))?;
        let amount = u64::from_le_bytes(*amount);
        let note = std::str::from_utf8(note)
            .map_err(|_| InstructionError::InvalidNote)?
            .to_string();

        Ok(match tag {
            DEPOSIT_TAG => Self::Deposit { amount, note },
            _ => Self::Withdraw { amount, note },
        })
    }
}
