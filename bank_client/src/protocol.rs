//! Deposit and withdraw: the two-transaction sequences sent to the bank program.
//!
//! Each operation is
//! 1. create + initialize a wrapped-value token account (one transaction), then
//! 2. the bank instruction itself (a second transaction).
//!
//! Step 2 is only built once step 1 is confirmed. If step 2 fails, the account
//! from step 1 stays on chain; the [`Journal`] remembers it so the next run
//! reuses it.

use std::path::Path;

use bank_core::{BankInstruction, ReceiverState};
use log::{info, warn};
use solana_sdk::account::Account;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use solana_sdk::{system_instruction, sysvar};
use spl_token::solana_program::program_pack::Pack;
use spl_token::state::Account as TokenAccount;

use crate::error::{BankError, VerificationWarning};
use crate::journal::{Journal, JournalEntry, Operation, Step};
use crate::network::Network;
use crate::readiness::{BankAccounts, receiving_address, to_address, to_pubkey, verify_program};
use crate::session::Session;
use crate::submit::{check_delta, observe_token_amount, read_account, submit};

const CREATE_DEPOSIT_ACCOUNT: &str = "create deposit account";
const DEPOSIT_TRANSFER: &str = "deposit transfer";
const CREATE_WITHDRAW_ACCOUNT: &str = "create withdraw account";
const WITHDRAW_TRANSFER: &str = "withdraw transfer";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub amount: u64,
    pub note: String,
}

impl TransferRequest {
    pub fn new(amount: u64, note: impl Into<String>) -> Self {
        Self {
            amount,
            note: note.into(),
        }
    }
}

#[derive(Debug)]
pub struct DepositOutcome {
    pub aux_account: Pubkey,
    /// `None` when an account left by an earlier run was reused.
    pub setup_signature: Option<Signature>,
    pub transfer_signature: Signature,
    pub balance_before: Option<u64>,
    pub balance_after: Option<u64>,
    pub warnings: Vec<VerificationWarning>,
}

#[derive(Debug)]
pub struct WithdrawOutcome {
    pub destination: Pubkey,
    pub source: Pubkey,
    pub setup_signature: Option<Signature>,
    pub transfer_signature: Signature,
    pub destination_before: Option<u64>,
    pub destination_after: Option<u64>,
    pub source_before: Option<u64>,
    pub source_after: Option<u64>,
    pub warnings: Vec<VerificationWarning>,
}

// ---------------------------------------------------------------------------
// Instruction builders
// ---------------------------------------------------------------------------

/// Create a token account at `account` holding `lamports` and bind it to the
/// native mint with `owner` as its owner.
pub fn wrapped_account_instructions(
    payer: &Pubkey,
    account: &Pubkey,
    owner: &Pubkey,
    lamports: u64,
    step: &'static str,
) -> Result<Vec<Instruction>, BankError> {
    let create = system_instruction::create_account(
        payer,
        account,
        lamports,
        TokenAccount::LEN as u64,
        &spl_token::id(),
    );
    let initialize = spl_token::instruction::initialize_account(
        &spl_token::id(),
        account,
        &spl_token::native_mint::id(),
        owner,
    )
    .map_err(|e| BankError::Submission {
        step,
        reason: e.to_string(),
    })?;
    Ok(vec![create, initialize])
}

/// `Deposit` accounts: receiving (w), source (w), payer (s), token program, rent.
pub fn deposit_instruction(
    bank: &BankAccounts,
    source: &Pubkey,
    payer: &Pubkey,
    request: &TransferRequest,
) -> Instruction {
    let data = BankInstruction::Deposit {
        amount: request.amount,
        note: request.note.clone(),
    }
    .pack();
    Instruction::new_with_bytes(
        bank.program_id,
        &data,
        vec![
            AccountMeta::new(bank.receiving, false),
            AccountMeta::new(*source, false),
            AccountMeta::new_readonly(*payer, true),
            AccountMeta::new_readonly(spl_token::id(), false),
            AccountMeta::new_readonly(sysvar::rent::id(), false),
        ],
    )
}

/// `Withdraw` accounts: destination (w), source (w), PDA authority, token program, rent.
pub fn withdraw_instruction(
    bank: &BankAccounts,
    destination: &Pubkey,
    source: &Pubkey,
    request: &TransferRequest,
) -> Instruction {
    let data = BankInstruction::Withdraw {
        amount: request.amount,
        note: request.note.clone(),
    }
    .pack();
    Instruction::new_with_bytes(
        bank.program_id,
        &data,
        vec![
            AccountMeta::new(*destination, false),
            AccountMeta::new(*source, false),
            AccountMeta::new_readonly(bank.authority, false),
            AccountMeta::new_readonly(spl_token::id(), false),
            AccountMeta::new_readonly(sysvar::rent::id(), false),
        ],
    )
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Auxiliary account left by an interrupted run that can be reused.
///
/// Only entries written by `owner` against `endpoint` are considered. A
/// pending deposit account is pre-funded with its amount, so it is only
/// reused for the same amount. The newest such entry whose account is still
/// a token account owned by `owner` wins; entries whose account vanished or
/// changed hands are dropped.
async fn resumable<N: Network>(
    network: &N,
    journal: &mut Journal,
    operation: Operation,
    owner: &Pubkey,
    endpoint: &str,
    amount: Option<u64>,
) -> Result<Option<Pubkey>, BankError> {
    let owner_address = to_address(owner);
    loop {
        let Some(entry) = journal
            .find_pending(operation, |e| {
                e.belongs_to(&owner_address, endpoint)
                    && amount.is_none_or(|amount| amount == e.amount)
            })
            .cloned()
        else {
            return Ok(None);
        };
        let account = to_pubkey(&entry.aux_account);
        match read_account(network, &account).await? {
            Some(found) if is_token_account_of(&found, owner) => return Ok(Some(account)),
            Some(_) => warn!(
                "{operation:?} account {account} is no longer a token account of {owner}"
            ),
            None => warn!("{operation:?} account {account} from an earlier run no longer exists"),
        }
        journal.discard(operation, &entry.aux_account)?;
    }
}

fn is_token_account_of(account: &Account, owner: &Pubkey) -> bool {
    account.owner == spl_token::id()
        && TokenAccount::unpack(&account.data).is_ok_and(|token| token.owner == *owner)
}

fn journal_entry(
    operation: Operation,
    aux_account: &Pubkey,
    owner: &Pubkey,
    endpoint: &str,
    amount: u64,
    step: Step,
    signature: &Signature,
) -> JournalEntry {
    JournalEntry {
        operation,
        aux_account: to_address(aux_account),
        owner: to_address(owner),
        endpoint: endpoint.to_string(),
        amount,
        step,
        signature: signature.to_string(),
    }
}

/// Deposit `request.amount` from a fresh wrapped account into the bank.
pub async fn deposit<N: Network>(
    session: &Session<N>,
    bank: &BankAccounts,
    request: &TransferRequest,
    journal: &mut Journal,
) -> Result<DepositOutcome, BankError> {
    let network = session.network();
    let endpoint = session.connection.endpoint.as_str();
    let payer = &session.deposit_payer;
    let mut warnings = Vec::new();

    let resumed = resumable(
        network,
        journal,
        Operation::Deposit,
        &payer.pubkey(),
        endpoint,
        Some(request.amount),
    )
    .await?;
    let (aux_account, setup_signature) = match resumed {
        Some(account) => {
            info!("Resuming deposit with existing account {account}");
            (account, None)
        }
        None => {
            let aux = Keypair::new();
            let rent = network
                .minimum_balance_for_rent_exemption(TokenAccount::LEN)
                .await?;
            let instructions = wrapped_account_instructions(
                &payer.pubkey(),
                &aux.pubkey(),
                &payer.pubkey(),
                rent.saturating_add(request.amount),
                CREATE_DEPOSIT_ACCOUNT,
            )?;
            let signature = submit(
                network,
                CREATE_DEPOSIT_ACCOUNT,
                &instructions,
                payer,
                &[payer, &aux],
            )
            .await?;
            journal.record(journal_entry(
                Operation::Deposit,
                &aux.pubkey(),
                &payer.pubkey(),
                endpoint,
                request.amount,
                Step::AuxCreated,
                &signature,
            ))?;
            (aux.pubkey(), Some(signature))
        }
    };

    let balance_before = observe_token_amount(
        network,
        DEPOSIT_TRANSFER,
        "deposit account balance before",
        &aux_account,
        &mut warnings,
    )
    .await;

    let instruction = deposit_instruction(bank, &aux_account, &payer.pubkey(), request);
    let transfer_signature =
        submit(network, DEPOSIT_TRANSFER, &[instruction], payer, &[payer]).await?;
    journal.record(journal_entry(
        Operation::Deposit,
        &aux_account,
        &payer.pubkey(),
        endpoint,
        request.amount,
        Step::Transferred,
        &transfer_signature,
    ))?;

    let balance_after = observe_token_amount(
        network,
        DEPOSIT_TRANSFER,
        "deposit account balance after",
        &aux_account,
        &mut warnings,
    )
    .await;

    Ok(DepositOutcome {
        aux_account,
        setup_signature,
        transfer_signature,
        balance_before,
        balance_after,
        warnings,
    })
}

/// Withdraw `request.amount` from `source` into a fresh wrapped account,
/// authorized by the bank's program-derived address.
pub async fn withdraw<N: Network>(
    session: &Session<N>,
    bank: &BankAccounts,
    source: &Pubkey,
    request: &TransferRequest,
    journal: &mut Journal,
) -> Result<WithdrawOutcome, BankError> {
    let network = session.network();
    let endpoint = session.connection.endpoint.as_str();
    // The deposit payer funds and owns the destination account; the withdraw
    // payer only pays for and signs the transfer.
    let funder = &session.deposit_payer;
    let payer = &session.withdraw_payer;
    let mut warnings = Vec::new();

    let resumed = resumable(
        network,
        journal,
        Operation::Withdraw,
        &funder.pubkey(),
        endpoint,
        None,
    )
    .await?;
    let (destination, setup_signature) = match resumed {
        Some(account) => {
            info!("Resuming withdraw with existing account {account}");
            (account, None)
        }
        None => {
            let aux = Keypair::new();
            let rent = network
                .minimum_balance_for_rent_exemption(TokenAccount::LEN)
                .await?;
            let instructions = wrapped_account_instructions(
                &funder.pubkey(),
                &aux.pubkey(),
                &funder.pubkey(),
                rent,
                CREATE_WITHDRAW_ACCOUNT,
            )?;
            let signature = submit(
                network,
                CREATE_WITHDRAW_ACCOUNT,
                &instructions,
                funder,
                &[funder, &aux],
            )
            .await?;
            journal.record(journal_entry(
                Operation::Withdraw,
                &aux.pubkey(),
                &funder.pubkey(),
                endpoint,
                request.amount,
                Step::AuxCreated,
                &signature,
            ))?;
            (aux.pubkey(), Some(signature))
        }
    };

    let source_before = observe_token_amount(
        network,
        WITHDRAW_TRANSFER,
        "source account balance before",
        source,
        &mut warnings,
    )
    .await;
    let destination_before = observe_token_amount(
        network,
        WITHDRAW_TRANSFER,
        "withdraw account balance before",
        &destination,
        &mut warnings,
    )
    .await;

    let instruction = withdraw_instruction(bank, &destination, source, request);
    let transfer_signature =
        submit(network, WITHDRAW_TRANSFER, &[instruction], payer, &[payer]).await?;
    journal.record(journal_entry(
        Operation::Withdraw,
        &destination,
        &funder.pubkey(),
        endpoint,
        request.amount,
        Step::Transferred,
        &transfer_signature,
    ))?;

    let source_after = observe_token_amount(
        network,
        WITHDRAW_TRANSFER,
        "source account balance after",
        source,
        &mut warnings,
    )
    .await;
    let destination_after = observe_token_amount(
        network,
        WITHDRAW_TRANSFER,
        "withdraw account balance after",
        &destination,
        &mut warnings,
    )
    .await;

    let amount = i128::from(request.amount);
    check_delta(
        WITHDRAW_TRANSFER,
        &destination,
        destination_before,
        destination_after,
        amount,
        &mut warnings,
    );
    check_delta(
        WITHDRAW_TRANSFER,
        source,
        source_before,
        source_after,
        -amount,
        &mut warnings,
    );

    Ok(WithdrawOutcome {
        destination,
        source: *source,
        setup_signature,
        transfer_signature,
        destination_before,
        destination_after,
        source_before,
        source_after,
        warnings,
    })
}

/// Report the note stored for `payer` without funding or creating anything.
/// Returns the receiving address alongside the record.
pub async fn lookup_note<N: Network>(
    network: &N,
    payer: &Pubkey,
    program_keypair: &Path,
    program_so: &Path,
) -> Result<(Pubkey, ReceiverState), BankError> {
    let program_id = verify_program(network, program_keypair, program_so).await?;
    let receiving = receiving_address(payer, &program_id)?;
    let state = received_note(network, &receiving).await?;
    Ok((receiving, state))
}

/// Decode the note currently stored in the receiving account.
pub async fn received_note<N: Network>(
    network: &N,
    receiving: &Pubkey,
) -> Result<ReceiverState, BankError> {
    let account = read_account(network, receiving)
        .await?
        .ok_or(BankError::AccountNotFound(*receiving))?;
    ReceiverState::decode(&account.data).map_err(|source| BankError::MalformedRecord {
        address: *receiving,
        source,
    })
}
