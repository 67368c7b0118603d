//! Program deployment checks and the receiving account.

use std::path::Path;

use bank_core::address::derive_seeded;
use bank_core::{
    Address, RECEIVING_SEED, ReceiverState, compute_authority_pda, compute_receiving_address,
};
use log::{debug, info};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer, read_keypair_file};
use solana_sdk::system_instruction;

use crate::error::BankError;
use crate::network::Network;
use crate::submit::{read_account, submit};

/// Addresses the deposit and withdraw flows need, all derived from the program id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BankAccounts {
    pub program_id: Pubkey,
    pub receiving: Pubkey,
    pub authority: Pubkey,
    pub authority_bump: u8,
}

impl BankAccounts {
    pub fn derive(payer: &Pubkey, program_id: &Pubkey) -> Result<Self, BankError> {
        let receiving = receiving_address(payer, program_id)?;
        let (authority, authority_bump) = authority_address(program_id)?;
        debug!("receiving account {receiving}, authority {authority} (bump {authority_bump})");
        Ok(Self {
            program_id: *program_id,
            receiving,
            authority,
            authority_bump,
        })
    }
}

pub fn to_address(pubkey: &Pubkey) -> Address {
    Address::new(pubkey.to_bytes())
}

pub fn to_pubkey(address: &Address) -> Pubkey {
    Pubkey::new_from_array(address.to_bytes())
}

/// Seeded receiving address for `payer` under the bank program.
pub fn receiving_address(payer: &Pubkey, program_id: &Pubkey) -> Result<Pubkey, BankError> {
    let address = compute_receiving_address(&to_address(payer), &to_address(program_id))?;
    Ok(to_pubkey(&address))
}

/// Program-derived withdraw authority and its bump.
pub fn authority_address(program_id: &Pubkey) -> Result<(Pubkey, u8), BankError> {
    let (address, bump) = compute_authority_pda(&to_address(program_id))?;
    Ok((to_pubkey(&address), bump))
}

/// Read the program id from its keypair file and confirm it is deployed and
/// executable.
pub async fn verify_program<N: Network>(
    network: &N,
    program_keypair: &Path,
    program_so: &Path,
) -> Result<Pubkey, BankError> {
    let program_id = read_keypair_file(program_keypair)
        .map_err(|e| BankError::IdentityLoad {
            path: program_keypair.to_path_buf(),
            reason: e.to_string(),
            hint: Some(format!(
                ". Program may need to be deployed with `solana program deploy {}`",
                program_so.display()
            )),
        })?
        .pubkey();

    match read_account(network, &program_id).await? {
        None => Err(BankError::ProgramNotDeployed {
            program: program_id,
            artifact: program_so.to_path_buf(),
            artifact_present: program_so.exists(),
        }),
        Some(account) if !account.executable => {
            Err(BankError::ProgramNotExecutable { program: program_id })
        }
        Some(_) => {
            info!("Using program {program_id}");
            Ok(program_id)
        }
    }
}

/// Create the seeded receiving account if it does not exist yet. An existing
/// account is left untouched, so this is safe to call on every run.
pub async fn ensure_receiving_account<N: Network>(
    network: &N,
    payer: &Keypair,
    program_id: &Pubkey,
) -> Result<Pubkey, BankError> {
    ensure_seeded_account(
        network,
        payer,
        RECEIVING_SEED,
        ReceiverState::sized_empty(),
        program_id,
    )
    .await
}

/// Create a rent-exempt account at `derive_seeded(payer, seed, owner)` unless
/// one is already there. The address is derived before any network call.
pub async fn ensure_seeded_account<N: Network>(
    network: &N,
    payer: &Keypair,
    seed: &str,
    space: usize,
    owner: &Pubkey,
) -> Result<Pubkey, BankError> {
    let address = to_pubkey(&derive_seeded(
        &to_address(&payer.pubkey()),
        seed,
        &to_address(owner),
    )?);
    if read_account(network, &address).await?.is_some() {
        debug!("account {address} already exists");
        return Ok(address);
    }

    info!("Creating account {address} to receive money and note");
    let lamports = network.minimum_balance_for_rent_exemption(space).await?;
    let instruction = system_instruction::create_account_with_seed(
        &payer.pubkey(),
        &address,
        &payer.pubkey(),
        seed,
        lamports,
        space as u64,
        owner,
    );
    submit(network, "create receiving account", &[instruction], payer, &[payer]).await?;
    Ok(address)
}
