use std::path::PathBuf;

use anyhow::{Context, Result};
use bank_client::config::{Overrides, Settings};
use bank_client::identity::load_keypair;
use bank_client::journal::{Journal, Operation};
use bank_client::protocol::{self, TransferRequest};
use bank_client::readiness::{self, BankAccounts, to_pubkey};
use bank_client::{Connection, RpcNetwork, Session};
use clap::{Parser, Subcommand};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signer;

/// Bank CLI: deposit into and withdraw from the bank program
#[derive(Parser)]
#[command(name = "bank", version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// CLI config file to read defaults from
    #[arg(long, short = 'C', env = "BANK_CONFIG")]
    config: Option<PathBuf>,

    /// JSON-RPC endpoint
    #[arg(long, short = 'u', env = "BANK_RPC_URL")]
    url: Option<String>,

    /// Keypair paying for deposits
    #[arg(long, env = "BANK_DEPOSIT_KEYPAIR")]
    deposit_keypair: Option<PathBuf>,

    /// Keypair paying for withdrawals
    #[arg(long, env = "BANK_WITHDRAW_KEYPAIR")]
    withdraw_keypair: Option<PathBuf>,

    /// Directory holding the program build artifact and keypair
    #[arg(long, env = "BANK_PROGRAM_DIR")]
    program_dir: Option<PathBuf>,

    /// Step journal used to resume interrupted operations
    #[arg(long, env = "BANK_JOURNAL")]
    journal: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fund payers, check the program, deposit then withdraw
    Run {
        #[arg(long, default_value_t = 12)]
        deposit_amount: u64,
        #[arg(long, default_value = "deposit note")]
        deposit_note: String,
        #[arg(long, default_value_t = 11)]
        withdraw_amount: u64,
        #[arg(long, default_value = "withdraw note")]
        withdraw_note: String,
    },

    /// Deposit into the bank from a fresh wrapped account
    Deposit {
        #[arg(long, default_value_t = 12)]
        amount: u64,
        #[arg(long, default_value = "deposit note")]
        note: String,
    },

    /// Withdraw from a wrapped account into a fresh one
    Withdraw {
        #[arg(long, default_value_t = 11)]
        amount: u64,
        #[arg(long, default_value = "withdraw note")]
        note: String,
        /// Source account (defaults to the last completed deposit's account)
        #[arg(long)]
        source: Option<Pubkey>,
    },

    /// Print the note stored in the receiving account
    Note,

    /// Print the program id and derived addresses
    Addresses,
}

fn print_banner(text: &str) {
    let rule = "=".repeat(55);
    println!("{rule}");
    println!("{text:=^55}");
    println!("{rule}");
}

async fn open_session(settings: &Settings) -> Result<Session<RpcNetwork>> {
    let network = RpcNetwork::new(settings.rpc_url.clone(), settings.commitment);
    let connection = Connection::establish(network, settings.rpc_url.clone()).await?;
    let deposit_payer = load_keypair(&settings.deposit_keypair)?;
    let withdraw_payer = load_keypair(&settings.withdraw_keypair)?;
    Ok(Session::establish(connection, deposit_payer, withdraw_payer).await?)
}

async fn prepare_bank(settings: &Settings, session: &Session<RpcNetwork>) -> Result<BankAccounts> {
    let program_id = readiness::verify_program(
        session.network(),
        &settings.program_keypair_path(),
        &settings.program_so_path(),
    )
    .await?;
    readiness::ensure_receiving_account(session.network(), &session.deposit_payer, &program_id)
        .await?;
    Ok(BankAccounts::derive(&session.deposit_payer.pubkey(), &program_id)?)
}

async fn run_deposit(
    session: &Session<RpcNetwork>,
    bank: &BankAccounts,
    request: &TransferRequest,
    journal: &mut Journal,
) -> Result<Pubkey> {
    let outcome = protocol::deposit(session, bank, request, journal).await?;
    println!("📤 Deposited {} from {}", request.amount, outcome.aux_account);
    println!("   tx: {}", outcome.transfer_signature);
    print_balance("   balance before", outcome.balance_before);
    print_balance("   balance after ", outcome.balance_after);
    Ok(outcome.aux_account)
}

async fn run_withdraw(
    session: &Session<RpcNetwork>,
    bank: &BankAccounts,
    source: &Pubkey,
    request: &TransferRequest,
    journal: &mut Journal,
) -> Result<()> {
    let outcome = protocol::withdraw(session, bank, source, request, journal).await?;
    println!("📥 Withdrew {} into {}", request.amount, outcome.destination);
    println!("   tx: {}", outcome.transfer_signature);
    print_balance("   source before     ", outcome.source_before);
    print_balance("   source after      ", outcome.source_after);
    print_balance("   destination before", outcome.destination_before);
    print_balance("   destination after ", outcome.destination_after);
    Ok(())
}

fn print_balance(label: &str, amount: Option<u64>) {
    match amount {
        Some(amount) => println!("{label}: {amount}"),
        None => println!("{label}: unavailable"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    solana_logger::setup_with_default("info");
    let cli = Cli::parse();

    let settings = Settings::resolve(Overrides {
        config_file: cli.config,
        rpc_url: cli.url,
        deposit_keypair: cli.deposit_keypair,
        withdraw_keypair: cli.withdraw_keypair,
        program_dir: cli.program_dir,
        journal: cli.journal,
    });

    match cli.command {
        Commands::Addresses => {
            let program_id = load_keypair(&settings.program_keypair_path())?.pubkey();
            let payer = load_keypair(&settings.deposit_keypair)?.pubkey();
            let bank = BankAccounts::derive(&payer, &program_id)?;
            println!("Program:            {}", bank.program_id);
            println!("Receiving account:  {}", bank.receiving);
            println!("Withdraw authority: {} (bump {})", bank.authority, bank.authority_bump);
        }

        Commands::Note => {
            // Read-only: no airdrop, no account creation.
            let network = RpcNetwork::new(settings.rpc_url.clone(), settings.commitment);
            let connection = Connection::establish(network, settings.rpc_url.clone()).await?;
            let payer = load_keypair(&settings.deposit_keypair)?.pubkey();
            let (receiving, state) = protocol::lookup_note(
                &connection.network,
                &payer,
                &settings.program_keypair_path(),
                &settings.program_so_path(),
            )
            .await?;
            println!("Account '{receiving}' received note: {}", state.note);
        }

        Commands::Deposit { amount, note } => {
            let mut journal = Journal::open(&settings.journal)?;
            let session = open_session(&settings).await?;
            let bank = prepare_bank(&settings, &session).await?;
            run_deposit(&session, &bank, &TransferRequest::new(amount, note), &mut journal).await?;
        }

        Commands::Withdraw { amount, note, source } => {
            let mut journal = Journal::open(&settings.journal)?;
            let source = match source {
                Some(source) => source,
                None => journal
                    .last_completed(Operation::Deposit)
                    .map(|entry| to_pubkey(&entry.aux_account))
                    .context("no completed deposit in the journal; pass --source")?,
            };
            let session = open_session(&settings).await?;
            let bank = prepare_bank(&settings, &session).await?;
            let request = TransferRequest::new(amount, note);
            run_withdraw(&session, &bank, &source, &request, &mut journal).await?;
        }

        Commands::Run {
            deposit_amount,
            deposit_note,
            withdraw_amount,
            withdraw_note,
        } => {
            println!("Bank program deposit and withdraw");
            let mut journal = Journal::open(&settings.journal)?;
            let session = open_session(&settings).await?;
            let bank = prepare_bank(&settings, &session).await?;

            let source = run_deposit(
                &session,
                &bank,
                &TransferRequest::new(deposit_amount, deposit_note),
                &mut journal,
            )
            .await?;
            print_banner("finish  deposit");

            run_withdraw(
                &session,
                &bank,
                &source,
                &TransferRequest::new(withdraw_amount, withdraw_note),
                &mut journal,
            )
            .await?;
            print_banner("finish withdraw");

            println!("SUCCESS");
        }
    }

    Ok(())
}
