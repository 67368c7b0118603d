//! Signing, submission and read-back of account state.

use log::{info, warn};
use solana_sdk::account::Account;
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use solana_sdk::transaction::Transaction;
use spl_token::solana_program::program_pack::Pack;
use spl_token::state::Account as TokenAccount;

use crate::error::{BankError, VerificationWarning};
use crate::network::Network;

/// Sign `instructions` with a fresh blockhash and submit them as one
/// transaction, waiting for confirmation. `signers` must include `payer`.
///
/// There is no retry: any rejection is returned to the caller.
pub async fn submit<N: Network>(
    network: &N,
    step: &'static str,
    instructions: &[Instruction],
    payer: &Keypair,
    signers: &[&Keypair],
) -> Result<Signature, BankError> {
    let submission_error = |reason: String| BankError::Submission { step, reason };

    let blockhash = network
        .latest_blockhash()
        .await
        .map_err(|e| submission_error(e.message))?;

    let mut transaction = Transaction::new_with_payer(instructions, Some(&payer.pubkey()));
    transaction
        .try_sign(signers, blockhash)
        .map_err(|e| submission_error(e.to_string()))?;

    let signature = network
        .send_and_confirm(&transaction)
        .await
        .map_err(|e| submission_error(e.message))?;
    info!("{step}: confirmed {signature}");
    Ok(signature)
}

/// Fetch an account, `None` if it does not exist.
pub async fn read_account<N: Network>(
    network: &N,
    address: &Pubkey,
) -> Result<Option<Account>, BankError> {
    Ok(network.account(address).await?)
}

/// Token amount held by a wrapped-value account.
pub async fn read_token_amount<N: Network>(network: &N, address: &Pubkey) -> Result<u64, String> {
    let account = network
        .account(address)
        .await
        .map_err(|e| e.message)?
        .ok_or_else(|| "account not found".to_string())?;
    let token = TokenAccount::unpack(&account.data).map_err(|e| e.to_string())?;
    Ok(token.amount)
}

/// Read a token balance for logging, turning any failure into a warning.
pub async fn observe_token_amount<N: Network>(
    network: &N,
    step: &'static str,
    label: &str,
    address: &Pubkey,
    warnings: &mut Vec<VerificationWarning>,
) -> Option<u64> {
    match read_token_amount(network, address).await {
        Ok(amount) => {
            info!("{label}: {amount}");
            Some(amount)
        }
        Err(reason) => {
            let warning = VerificationWarning {
                step,
                account: *address,
                reason: format!("could not read {label}: {reason}"),
            };
            warn!("{warning}");
            warnings.push(warning);
            None
        }
    }
}

/// Compare an observed balance change with the expected one.
pub fn check_delta(
    step: &'static str,
    account: &Pubkey,
    before: Option<u64>,
    after: Option<u64>,
    expected: i128,
    warnings: &mut Vec<VerificationWarning>,
) {
    let (Some(before), Some(after)) = (before, after) else {
        return;
    };
    let actual = i128::from(after) - i128::from(before);
    if actual != expected {
        let warning = VerificationWarning {
            step,
            account: *account,
            reason: format!("expected balance change {expected}, observed {actual}"),
        };
        warn!("{warning}");
        warnings.push(warning);
    }
}
