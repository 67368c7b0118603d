use std::fmt;
use std::path::PathBuf;

use bank_core::{AddressError, RecordError};
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

use crate::network::NetworkError;

#[derive(Debug, Error)]
pub enum BankError {
    #[error("failed to connect to {endpoint}: {source}")]
    Connection {
        endpoint: String,
        #[source]
        source: NetworkError,
    },

    #[error("failed to fund {address} with {lamports} lamports: {reason}")]
    Funding {
        address: Pubkey,
        lamports: u64,
        reason: String,
    },

    #[error(
        "failed to load keypair at '{}': {reason}{}",
        .path.display(),
        .hint.as_deref().unwrap_or("")
    )]
    IdentityLoad {
        path: PathBuf,
        reason: String,
        hint: Option<String>,
    },

    #[error("program {program} is not deployed: {}", deploy_hint(.artifact_present, .artifact))]
    ProgramNotDeployed {
        program: Pubkey,
        artifact: PathBuf,
        artifact_present: bool,
    },

    #[error("program {program} is not executable")]
    ProgramNotExecutable { program: Pubkey },

    #[error(transparent)]
    Address(#[from] AddressError),

    #[error("receiving account {address}: {source}")]
    MalformedRecord {
        address: Pubkey,
        #[source]
        source: RecordError,
    },

    #[error("{step} failed: {reason}")]
    Submission { step: &'static str, reason: String },

    #[error("account {0} not found")]
    AccountNotFound(Pubkey),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("journal '{}': {reason}", .path.display())]
    Journal { path: PathBuf, reason: String },
}

fn deploy_hint(artifact_present: &bool, artifact: &std::path::Path) -> String {
    if *artifact_present {
        format!(
            "program needs to be deployed with `solana program deploy {}`",
            artifact.display()
        )
    } else {
        format!(
            "program needs to be built and deployed (no build artifact at {})",
            artifact.display()
        )
    }
}

/// Post-hoc balance check that did not hold. Logged, never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationWarning {
    pub step: &'static str,
    pub account: Pubkey,
    pub reason: String,
}

impl fmt::Display for VerificationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} verification for {}: {}", self.step, self.account, self.reason)
    }
}
