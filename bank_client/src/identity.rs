use std::path::Path;

use solana_sdk::signature::{Keypair, read_keypair_file};

use crate::error::BankError;

/// Load a signing keypair from a JSON keypair file.
pub fn load_keypair(path: &Path) -> Result<Keypair, BankError> {
    read_keypair_file(path).map_err(|e| BankError::IdentityLoad {
        path: path.to_path_buf(),
        reason: e.to_string(),
        hint: None,
    })
}
