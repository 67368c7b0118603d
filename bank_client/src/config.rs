//! Resolve endpoint, keypair and program locations from CLI overrides,
//! the CLI config file, and built-in defaults, in that order.

use std::path::PathBuf;
use std::str::FromStr;

use bank_core::{PROGRAM_KEYPAIR_NAME, PROGRAM_SO_NAME};
use log::debug;
use solana_cli_config::Config;
use solana_sdk::commitment_config::CommitmentConfig;

pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8899";
pub const DEFAULT_PROGRAM_DIR: &str = "dist/program";
pub const DEFAULT_JOURNAL: &str = "bank-journal.json";

/// Values supplied on the command line or through the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub config_file: Option<PathBuf>,
    pub rpc_url: Option<String>,
    pub deposit_keypair: Option<PathBuf>,
    pub withdraw_keypair: Option<PathBuf>,
    pub program_dir: Option<PathBuf>,
    pub journal: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub rpc_url: String,
    pub commitment: CommitmentConfig,
    pub deposit_keypair: PathBuf,
    pub withdraw_keypair: PathBuf,
    pub program_dir: PathBuf,
    pub journal: PathBuf,
}

impl Settings {
    pub fn resolve(overrides: Overrides) -> Self {
        let config = load_cli_config(overrides.config_file.as_ref());
        Self::from_parts(overrides, config)
    }

    fn from_parts(overrides: Overrides, config: Option<Config>) -> Self {
        let default_keypair = config
            .as_ref()
            .map(|c| PathBuf::from(&c.keypair_path))
            .unwrap_or_else(|| PathBuf::from(Config::default().keypair_path));

        let rpc_url = overrides
            .rpc_url
            .or_else(|| config.as_ref().map(|c| c.json_rpc_url.clone()))
            .unwrap_or_else(|| DEFAULT_RPC_URL.to_string());

        // An unparsable commitment in the config file falls back to `confirmed`.
        let commitment = config
            .as_ref()
            .and_then(|c| CommitmentConfig::from_str(&c.commitment).ok())
            .unwrap_or_else(CommitmentConfig::confirmed);

        Self {
            rpc_url,
            commitment,
            deposit_keypair: overrides
                .deposit_keypair
                .unwrap_or_else(|| default_keypair.clone()),
            withdraw_keypair: overrides.withdraw_keypair.unwrap_or(default_keypair),
            program_dir: overrides
                .program_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PROGRAM_DIR)),
            journal: overrides
                .journal
                .unwrap_or_else(|| PathBuf::from(DEFAULT_JOURNAL)),
        }
    }

    /// Build artifact produced by compiling the bank program.
    pub fn program_so_path(&self) -> PathBuf {
        self.program_dir.join(PROGRAM_SO_NAME)
    }

    /// Keypair file whose public key is the deployed program id.
    pub fn program_keypair_path(&self) -> PathBuf {
        self.program_dir.join(PROGRAM_KEYPAIR_NAME)
    }
}

fn load_cli_config(explicit: Option<&PathBuf>) -> Option<Config> {
    let path = match explicit {
        Some(path) => path.to_string_lossy().into_owned(),
        None => solana_cli_config::CONFIG_FILE.as_ref()?.clone(),
    };
    match Config::load(&path) {
        Ok(config) => Some(config),
        Err(e) => {
            debug!("no usable CLI config at {path}: {e}");
            None
        }
    }
}
