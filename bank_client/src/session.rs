//! Connection bootstrap and payer funding.

use bank_core::ReceiverState;
use log::info;
use solana_sdk::native_token::lamports_to_sol;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};

use crate::error::BankError;
use crate::network::Network;

/// How many signatures' worth of fees a payer must be able to cover.
pub const FEE_SIGNATURE_BUDGET: u64 = 100;

/// An open, validated connection to a cluster.
pub struct Connection<N> {
    pub network: N,
    pub endpoint: String,
    pub version: String,
}

impl<N: Network> Connection<N> {
    /// Ask the endpoint for its version; any failure means we are not connected.
    pub async fn establish(network: N, endpoint: impl Into<String>) -> Result<Self, BankError> {
        let endpoint = endpoint.into();
        let version = network
            .version()
            .await
            .map_err(|source| BankError::Connection {
                endpoint: endpoint.clone(),
                source,
            })?;
        info!("Connection to cluster established: {endpoint} (version {version})");
        Ok(Self {
            network,
            endpoint,
            version,
        })
    }

    /// Rent exemption for the receiving account plus a fixed fee budget.
    ///
    /// `min_balance = rent(sized_empty) + fee_per_signature * FEE_SIGNATURE_BUDGET`
    pub async fn minimum_payer_balance(&self) -> Result<u64, BankError> {
        let rent = self
            .network
            .minimum_balance_for_rent_exemption(ReceiverState::sized_empty())
            .await?;
        let fee = self.network.fee_per_signature().await?;
        Ok(rent.saturating_add(fee.saturating_mul(FEE_SIGNATURE_BUDGET)))
    }

    /// Top `address` up to `min_balance` through the faucet if it holds less.
    /// Returns the balance afterwards.
    pub async fn ensure_funded(
        &self,
        address: &Pubkey,
        min_balance: u64,
    ) -> Result<u64, BankError> {
        let balance = self.network.balance(address).await?;
        if balance >= min_balance {
            return Ok(balance);
        }

        let shortfall = min_balance - balance;
        let funding_error = |reason: String| BankError::Funding {
            address: *address,
            lamports: shortfall,
            reason,
        };
        info!("Requesting airdrop of {shortfall} lamports to {address}");
        let signature = self
            .network
            .request_airdrop(address, shortfall)
            .await
            .map_err(|e| funding_error(e.message))?;
        self.network
            .confirm_signature(&signature)
            .await
            .map_err(|e| funding_error(e.message))?;

        Ok(self.network.balance(address).await?)
    }
}

/// A connection together with the two funded payers.
pub struct Session<N> {
    pub connection: Connection<N>,
    pub deposit_payer: Keypair,
    pub withdraw_payer: Keypair,
}

impl<N: Network> Session<N> {
    /// Fund both payers (concurrently; they share no accounts) and bundle them
    /// with the connection.
    pub async fn establish(
        connection: Connection<N>,
        deposit_payer: Keypair,
        withdraw_payer: Keypair,
    ) -> Result<Self, BankError> {
        let min_balance = connection.minimum_payer_balance().await?;

        let deposit_address = deposit_payer.pubkey();
        let withdraw_address = withdraw_payer.pubkey();
        let (deposit_balance, withdraw_balance) = if deposit_address == withdraw_address {
            let balance = connection.ensure_funded(&deposit_address, min_balance).await?;
            (balance, balance)
        } else {
            let (deposit, withdraw) = tokio::join!(
                connection.ensure_funded(&deposit_address, min_balance),
                connection.ensure_funded(&withdraw_address, min_balance),
            );
            (deposit?, withdraw?)
        };

        info!(
            "Using account {deposit_address} containing {} SOL to pay for depositing fees",
            lamports_to_sol(deposit_balance)
        );
        info!(
            "Using account {withdraw_address} containing {} SOL to pay for withdrawing fees",
            lamports_to_sol(withdraw_balance)
        );

        Ok(Self {
            connection,
            deposit_payer,
            withdraw_payer,
        })
    }

    pub fn network(&self) -> &N {
        &self.connection.network
    }
}
