//! In-memory cluster for integration tests.
//!
//! Executes the system, token and bank instructions the client sends, checks
//! signatures and blockhashes like a real cluster would, and records every
//! call so tests can assert on ordering.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use bank_client::session::Connection;
use bank_client::{Network, NetworkError, Session};
use bank_core::{AUTHORITY_SEED, BankInstruction, ReceiverState};
use solana_sdk::account::Account;
use solana_sdk::hash::Hash;
use solana_sdk::message::Message;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::rent::Rent;
use solana_sdk::signature::{Keypair, Signature, Signer};
use solana_sdk::system_instruction::SystemInstruction;
use solana_sdk::transaction::Transaction;
use solana_sdk::{bpf_loader_upgradeable, system_program, sysvar};
use spl_token::instruction::TokenInstruction;
use spl_token::solana_program::program_option::COption;
use spl_token::solana_program::program_pack::Pack;
use spl_token::state::{Account as TokenAccount, AccountState};

pub const FEE_PER_SIGNATURE: u64 = 5_000;
pub const ENDPOINT: &str = "http://simulated:8899";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Version,
    Balance(Pubkey),
    Account(Pubkey),
    RentExemption(usize),
    Blockhash,
    FeePerSignature,
    Airdrop(Pubkey, u64),
    Confirm(Signature),
    /// A submitted transaction: the programs it invokes and whether it landed.
    Send { programs: Vec<Pubkey>, confirmed: bool },
}

#[derive(Default)]
struct State {
    accounts: HashMap<Pubkey, Account>,
    blockhash: Hash,
    processed: HashSet<Signature>,
    calls: Vec<Call>,
    unreachable: bool,
    airdrop_error: Option<String>,
    reject_program: Option<Pubkey>,
    failing_reads: HashSet<Pubkey>,
}

pub struct SimulatedNetwork {
    state: Mutex<State>,
}

impl Default for SimulatedNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedNetwork {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                blockhash: Hash::new_unique(),
                ..State::default()
            }),
        }
    }

    pub fn unreachable() -> Self {
        let network = Self::new();
        network.state.lock().unwrap().unreachable = true;
        network
    }

    pub fn fail_airdrops(&self, reason: &str) {
        self.state.lock().unwrap().airdrop_error = Some(reason.to_string());
    }

    /// Reject every transaction that invokes `program` until cleared.
    pub fn reject_program(&self, program: Option<Pubkey>) {
        self.state.lock().unwrap().reject_program = program;
    }

    /// Make every account read of `address` fail; transactions touching it
    /// still execute.
    pub fn fail_reads_of(&self, address: &Pubkey) {
        self.state.lock().unwrap().failing_reads.insert(*address);
    }

    pub fn deploy_program(&self, program_id: &Pubkey, executable: bool) {
        self.set_account(
            program_id,
            Account {
                lamports: 1_000_000_000,
                data: vec![],
                owner: bpf_loader_upgradeable::id(),
                executable,
                rent_epoch: 0,
            },
        );
    }

    pub fn fund(&self, address: &Pubkey, lamports: u64) {
        let mut state = self.state.lock().unwrap();
        let account = state
            .accounts
            .entry(*address)
            .or_insert_with(|| Account::new(0, 0, &system_program::id()));
        account.lamports += lamports;
    }

    pub fn set_account(&self, address: &Pubkey, account: Account) {
        self.state.lock().unwrap().accounts.insert(*address, account);
    }

    pub fn get(&self, address: &Pubkey) -> Option<Account> {
        self.state.lock().unwrap().accounts.get(address).cloned()
    }

    pub fn token_amount(&self, address: &Pubkey) -> Option<u64> {
        let account = self.get(address)?;
        TokenAccount::unpack(&account.data).ok().map(|t| t.amount)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Submitted transactions, in order.
    pub fn sends(&self) -> Vec<(Vec<Pubkey>, bool)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Send { programs, confirmed } => Some((programs, confirmed)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) -> Result<(), NetworkError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        if state.unreachable {
            return Err(NetworkError::new("connection refused"));
        }
        Ok(())
    }
}

impl Network for SimulatedNetwork {
    async fn version(&self) -> Result<String, NetworkError> {
        self.record(Call::Version)?;
        Ok("2.1.0".to_string())
    }

    async fn balance(&self, address: &Pubkey) -> Result<u64, NetworkError> {
        self.record(Call::Balance(*address))?;
        Ok(self.get(address).map(|a| a.lamports).unwrap_or(0))
    }

    async fn account(&self, address: &Pubkey) -> Result<Option<Account>, NetworkError> {
        self.record(Call::Account(*address))?;
        if self.state.lock().unwrap().failing_reads.contains(address) {
            return Err(NetworkError::new("request timed out"));
        }
        Ok(self.get(address))
    }

    async fn minimum_balance_for_rent_exemption(
        &self,
        data_len: usize,
    ) -> Result<u64, NetworkError> {
        self.record(Call::RentExemption(data_len))?;
        Ok(Rent::default().minimum_balance(data_len))
    }

    async fn latest_blockhash(&self) -> Result<Hash, NetworkError> {
        self.record(Call::Blockhash)?;
        Ok(self.state.lock().unwrap().blockhash)
    }

    async fn fee_per_signature(&self) -> Result<u64, NetworkError> {
        self.record(Call::FeePerSignature)?;
        Ok(FEE_PER_SIGNATURE)
    }

    async fn request_airdrop(&self, to: &Pubkey, lamports: u64) -> Result<Signature, NetworkError> {
        self.record(Call::Airdrop(*to, lamports))?;
        if let Some(reason) = self.state.lock().unwrap().airdrop_error.clone() {
            return Err(NetworkError::new(reason));
        }
        self.fund(to, lamports);
        Ok(Signature::new_unique())
    }

    async fn confirm_signature(&self, signature: &Signature) -> Result<(), NetworkError> {
        self.record(Call::Confirm(*signature))
    }

    async fn send_and_confirm(&self, transaction: &Transaction) -> Result<Signature, NetworkError> {
        let programs: Vec<Pubkey> = transaction
            .message
            .instructions
            .iter()
            .map(|ix| transaction.message.account_keys[ix.program_id_index as usize])
            .collect();
        let mut state = self.state.lock().unwrap();
        let result = process_transaction(&mut state, transaction);
        state.calls.push(Call::Send {
            programs,
            confirmed: result.is_ok(),
        });
        result.map_err(NetworkError::new)
    }
}

// ---------------------------------------------------------------------------
// Transaction processing
// ---------------------------------------------------------------------------

fn process_transaction(state: &mut State, tx: &Transaction) -> Result<Signature, String> {
    if state.unreachable {
        return Err("connection refused".into());
    }
    if tx.message.recent_blockhash != state.blockhash {
        return Err("Blockhash not found".into());
    }
    if tx.verify().is_err() {
        return Err("Transaction did not pass signature verification".into());
    }
    let signature = tx.signatures[0];
    if state.processed.contains(&signature) {
        return Err("This transaction has already been processed".into());
    }

    // Work on a copy so a failing instruction leaves no trace.
    let mut accounts = state.accounts.clone();
    let message = &tx.message;
    let payer = message.account_keys[0];
    let fee = FEE_PER_SIGNATURE * u64::from(message.header.num_required_signatures);
    debit(&mut accounts, &payer, fee).map_err(|_| "insufficient funds for fee".to_string())?;

    for ix in &message.instructions {
        let program_id = message.account_keys[ix.program_id_index as usize];
        if state.reject_program == Some(program_id) {
            return Err(format!("program {program_id} failed: custom program error: 0x0"));
        }
        let metas: Vec<Meta> = ix
            .accounts
            .iter()
            .map(|&i| {
                let i = i as usize;
                Meta {
                    key: message.account_keys[i],
                    signer: message.is_signer(i),
                    writable: is_writable(message, i),
                }
            })
            .collect();
        if program_id == system_program::id() {
            execute_system(&mut accounts, &metas, &ix.data)?;
        } else if program_id == spl_token::id() {
            execute_token(&mut accounts, &metas, &ix.data)?;
        } else {
            execute_bank(&mut accounts, &program_id, &metas, &ix.data)?;
        }
    }

    state.accounts = accounts;
    state.processed.insert(signature);
    state.blockhash = Hash::new_unique();
    Ok(signature)
}

struct Meta {
    key: Pubkey,
    signer: bool,
    writable: bool,
}

fn is_writable(message: &Message, index: usize) -> bool {
    let header = &message.header;
    let signed = usize::from(header.num_required_signatures);
    if index < signed {
        index < signed - usize::from(header.num_readonly_signed_accounts)
    } else {
        index < message.account_keys.len() - usize::from(header.num_readonly_unsigned_accounts)
    }
}

fn debit(
    accounts: &mut HashMap<Pubkey, Account>,
    address: &Pubkey,
    lamports: u64,
) -> Result<(), String> {
    let account = accounts
        .get_mut(address)
        .ok_or_else(|| format!("account {address} not found"))?;
    account.lamports = account
        .lamports
        .checked_sub(lamports)
        .ok_or_else(|| format!("insufficient lamports in {address}"))?;
    Ok(())
}

fn create(
    accounts: &mut HashMap<Pubkey, Account>,
    from: &Meta,
    to: &Pubkey,
    lamports: u64,
    space: u64,
    owner: &Pubkey,
) -> Result<(), String> {
    if !from.signer || !from.writable {
        return Err("funding account must be a writable signer".into());
    }
    if accounts.get(to).is_some_and(|a| a.lamports > 0) {
        return Err(format!("account {to} already in use"));
    }
    debit(accounts, &from.key, lamports)?;
    accounts.insert(
        *to,
        Account {
            lamports,
            data: vec![0; space as usize],
            owner: *owner,
            executable: false,
            rent_epoch: 0,
        },
    );
    Ok(())
}

fn execute_system(
    accounts: &mut HashMap<Pubkey, Account>,
    metas: &[Meta],
    data: &[u8],
) -> Result<(), String> {
    let instruction: SystemInstruction =
        bincode::deserialize(data).map_err(|e| format!("invalid system instruction: {e}"))?;
    match instruction {
        SystemInstruction::CreateAccount { lamports, space, owner } => {
            if !metas[1].signer {
                return Err("new account must sign".into());
            }
            create(accounts, &metas[0], &metas[1].key, lamports, space, &owner)
        }
        SystemInstruction::CreateAccountWithSeed {
            base,
            seed,
            lamports,
            space,
            owner,
        } => {
            let expected =
                Pubkey::create_with_seed(&base, &seed, &owner).map_err(|e| e.to_string())?;
            if expected != metas[1].key {
                return Err("seeded address does not match".into());
            }
            if !metas.iter().any(|m| m.key == base && m.signer) {
                return Err("base must sign".into());
            }
            create(accounts, &metas[0], &metas[1].key, lamports, space, &owner)
        }
        other => Err(format!("unsupported system instruction {other:?}")),
    }
}

fn execute_token(
    accounts: &mut HashMap<Pubkey, Account>,
    metas: &[Meta],
    data: &[u8],
) -> Result<(), String> {
    match TokenInstruction::unpack(data) {
        Ok(TokenInstruction::InitializeAccount) => {}
        _ => return Err("unsupported token instruction".into()),
    }
    if metas[1].key != spl_token::native_mint::id() {
        return Err("only the native mint is supported".into());
    }
    let account = accounts
        .get_mut(&metas[0].key)
        .ok_or("token account does not exist")?;
    if account.owner != spl_token::id() || account.data.len() != TokenAccount::LEN {
        return Err("token account has the wrong owner or size".into());
    }
    if TokenAccount::unpack(&account.data).is_ok() {
        return Err("token account already initialized".into());
    }
    let rent = Rent::default().minimum_balance(TokenAccount::LEN);
    let amount = account
        .lamports
        .checked_sub(rent)
        .ok_or("token account is not rent exempt")?;
    let token = TokenAccount {
        mint: metas[1].key,
        owner: metas[2].key,
        amount,
        delegate: COption::None,
        state: AccountState::Initialized,
        is_native: COption::Some(rent),
        delegated_amount: 0,
        close_authority: COption::None,
    };
    TokenAccount::pack(token, &mut account.data).map_err(|e| e.to_string())
}

fn execute_bank(
    accounts: &mut HashMap<Pubkey, Account>,
    program_id: &Pubkey,
    metas: &[Meta],
    data: &[u8],
) -> Result<(), String> {
    if !accounts.get(program_id).is_some_and(|a| a.executable) {
        return Err(format!("program {program_id} is not executable"));
    }
    if metas.len() != 5 {
        return Err(format!("expected 5 accounts, got {}", metas.len()));
    }
    if metas[3].key != spl_token::id() || metas[4].key != sysvar::rent::id() {
        return Err("token program and rent sysvar expected at positions 3 and 4".into());
    }
    if !metas[0].writable || !metas[1].writable {
        return Err("accounts 0 and 1 must be writable".into());
    }

    match BankInstruction::unpack(data).map_err(|e| e.to_string())? {
        BankInstruction::Deposit { note, .. } => {
            if !metas[2].signer {
                return Err("depositor must sign".into());
            }
            token_state(accounts, &metas[1].key)?;
            let receiving = accounts
                .get_mut(&metas[0].key)
                .ok_or("receiving account does not exist")?;
            if receiving.owner != *program_id {
                return Err("receiving account is not owned by the program".into());
            }
            receiving.data = ReceiverState::new(note).encode().map_err(|e| e.to_string())?;
            Ok(())
        }
        BankInstruction::Withdraw { amount, .. } => {
            let (authority, _) = Pubkey::find_program_address(&[AUTHORITY_SEED], program_id);
            if metas[2].key != authority || metas[2].signer {
                return Err("withdraw must be authorized by the program-derived address".into());
            }
            let mut source = token_state(accounts, &metas[1].key)?;
            let mut destination = token_state(accounts, &metas[0].key)?;
            source.amount = source
                .amount
                .checked_sub(amount)
                .ok_or("insufficient funds")?;
            destination.amount += amount;
            store_token(accounts, &metas[1].key, source, -(amount as i128))?;
            store_token(accounts, &metas[0].key, destination, amount as i128)
        }
    }
}

fn token_state(
    accounts: &HashMap<Pubkey, Account>,
    address: &Pubkey,
) -> Result<TokenAccount, String> {
    let account = accounts
        .get(address)
        .ok_or_else(|| format!("token account {address} does not exist"))?;
    TokenAccount::unpack(&account.data).map_err(|_| format!("{address} is not a token account"))
}

fn store_token(
    accounts: &mut HashMap<Pubkey, Account>,
    address: &Pubkey,
    token: TokenAccount,
    lamport_delta: i128,
) -> Result<(), String> {
    let account = accounts.get_mut(address).ok_or("missing token account")?;
    account.lamports = (i128::from(account.lamports) + lamport_delta) as u64;
    TokenAccount::pack(token, &mut account.data).map_err(|e| e.to_string())
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub struct Fixture {
    pub session: Session<SimulatedNetwork>,
    pub program_id: Pubkey,
}

/// A session on a fresh simulated cluster with a deployed bank program and
/// two distinct, airdrop-funded payers.
pub async fn fixture() -> Fixture {
    let network = SimulatedNetwork::new();
    let program_id = Pubkey::new_unique();
    network.deploy_program(&program_id, true);
    let connection = Connection::establish(network, ENDPOINT).await.unwrap();
    let session = Session::establish(connection, Keypair::new(), Keypair::new())
        .await
        .unwrap();
    // Enough to pay for several wrapped accounts and their fees.
    session.network().fund(&session.deposit_payer.pubkey(), 100_000_000);
    session.network().clear_calls();
    Fixture { session, program_id }
}
