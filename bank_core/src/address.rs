//! Account addresses and the two deterministic derivations the bank protocol uses:
//! seeded addresses (base + text seed + owner) and program-derived addresses.

use std::fmt;
use std::str::FromStr;

use base58::{FromBase58, ToBase58};
use borsh::{BorshDeserialize, BorshSerialize};
use curve25519_dalek::edwards::CompressedEdwardsY;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Maximum length in bytes of a single derivation seed.
pub const MAX_SEED_LEN: usize = 32;
/// Maximum number of seeds accepted by `create_program_address`.
pub const MAX_SEEDS: usize = 16;

const PDA_MARKER: &[u8; 21] = b"ProgramDerivedAddress";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("seed is {len} bytes, the maximum is {}", MAX_SEED_LEN)]
    InvalidSeed { len: usize },
    #[error("{count} seeds provided, the maximum is {}", MAX_SEEDS)]
    TooManySeeds { count: usize },
    #[error("owner program id may not end with the program-derived marker")]
    IllegalOwner,
    #[error("no bump seed in 255..=1 produced an off-curve address")]
    NoValidAddress,
    #[error("seeds resolve to an address on the ed25519 curve")]
    OnCurve,
    #[error("invalid base58 address '{0}'")]
    Parse(String),
}

/// A 32-byte account address.
#[derive(
    Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize,
)]
pub struct Address([u8; 32]);

impl Address {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn to_bytes(self) -> [u8; 32] {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Whether these bytes decompress to an ed25519 point, i.e. whether a
    /// private key could exist for this address.
    pub fn is_on_curve(&self) -> bool {
        CompressedEdwardsY(self.0).decompress().is_some()
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for Address {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_base58())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s
            .from_base58()
            .map_err(|_| AddressError::Parse(s.to_string()))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| AddressError::Parse(s.to_string()))?;
        Ok(Self(bytes))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <String as Deserialize>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Derivation
// ---------------------------------------------------------------------------

/// Derive an address from a base address, a UTF-8 seed and an owning program.
///
/// `address = sha256(base || seed || owner)`
pub fn derive_seeded(base: &Address, seed: &str, owner: &Address) -> Result<Address, AddressError> {
    if seed.len() > MAX_SEED_LEN {
        return Err(AddressError::InvalidSeed { len: seed.len() });
    }
    if owner.0.ends_with(PDA_MARKER) {
        return Err(AddressError::IllegalOwner);
    }

    let mut hasher = Sha256::new();
    hasher.update(base.0);
    hasher.update(seed.as_bytes());
    hasher.update(owner.0);
    Ok(Address(hasher.finalize().into()))
}

/// Hash seeds with the program id; rejects results that land on the curve.
///
/// `address = sha256(seeds.. || program_id || "ProgramDerivedAddress")`
pub fn create_program_address(
    seeds: &[&[u8]],
    program_id: &Address,
) -> Result<Address, AddressError> {
    if seeds.len() > MAX_SEEDS {
        return Err(AddressError::TooManySeeds { count: seeds.len() });
    }
    if let Some(seed) = seeds.iter().find(|seed| seed.len() > MAX_SEED_LEN) {
        return Err(AddressError::InvalidSeed { len: seed.len() });
    }

    let mut hasher = Sha256::new();
    for seed in seeds {
        hasher.update(seed);
    }
    hasher.update(program_id.0);
    hasher.update(PDA_MARKER);
    let address = Address(hasher.finalize().into());

    if address.is_on_curve() {
        return Err(AddressError::OnCurve);
    }
    Ok(address)
}

/// Search bump seeds from 255 down to 1 for the first off-curve program address.
pub fn derive_program_address(
    seeds: &[&[u8]],
    program_id: &Address,
) -> Result<(Address, u8), AddressError> {
    // One slot is reserved for the bump.
    if seeds.len() >= MAX_SEEDS {
        return Err(AddressError::TooManySeeds { count: seeds.len() + 1 });
    }

    for bump in (1..=u8::MAX).rev() {
        let bump_seed = [bump];
        let mut seeds_with_bump: Vec<&[u8]> = seeds.to_vec();
        seeds_with_bump.push(&bump_seed);
        match create_program_address(&seeds_with_bump, program_id) {
            Ok(address) => return Ok((address, bump)),
            Err(AddressError::OnCurve) => {}
            Err(e) => return Err(e),
        }
    }
    Err(AddressError::NoValidAddress)
}
