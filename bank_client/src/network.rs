//! The RPC collaborator: every network call the client makes goes through [`Network`].

use solana_client::client_error::ClientError;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::account::Account;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::message::Message;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct NetworkError {
    pub message: String,
}

impl NetworkError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl From<ClientError> for NetworkError {
    fn from(e: ClientError) -> Self {
        Self::new(e.to_string())
    }
}

/// Request/response calls against the cluster. Every call blocks (awaits)
/// until the cluster answers; nothing is retried here.
#[allow(async_fn_in_trait)]
pub trait Network {
    async fn version(&self) -> Result<String, NetworkError>;

    async fn balance(&self, address: &Pubkey) -> Result<u64, NetworkError>;

    /// `Ok(None)` when no account exists at `address`.
    async fn account(&self, address: &Pubkey) -> Result<Option<Account>, NetworkError>;

    async fn minimum_balance_for_rent_exemption(&self, data_len: usize)
    -> Result<u64, NetworkError>;

    async fn latest_blockhash(&self) -> Result<Hash, NetworkError>;

    async fn fee_per_signature(&self) -> Result<u64, NetworkError>;

    async fn request_airdrop(&self, to: &Pubkey, lamports: u64) -> Result<Signature, NetworkError>;

    /// Wait until `signature` reaches the configured commitment.
    async fn confirm_signature(&self, signature: &Signature) -> Result<(), NetworkError>;

    /// Submit a signed transaction and wait for confirmation.
    async fn send_and_confirm(&self, transaction: &Transaction) -> Result<Signature, NetworkError>;
}

/// [`Network`] backed by the JSON-RPC endpoint of a cluster.
pub struct RpcNetwork {
    client: RpcClient,
}

impl RpcNetwork {
    pub fn new(url: String, commitment: CommitmentConfig) -> Self {
        Self {
            client: RpcClient::new_with_commitment(url, commitment),
        }
    }

    pub fn url(&self) -> String {
        self.client.url()
    }
}

impl Network for RpcNetwork {
    async fn version(&self) -> Result<String, NetworkError> {
        let version = self.client.get_version().await?;
        Ok(version.solana_core)
    }

    async fn balance(&self, address: &Pubkey) -> Result<u64, NetworkError> {
        Ok(self.client.get_balance(address).await?)
    }

    async fn account(&self, address: &Pubkey) -> Result<Option<Account>, NetworkError> {
        let response = self
            .client
            .get_account_with_commitment(address, self.client.commitment())
            .await?;
        Ok(response.value)
    }

    async fn minimum_balance_for_rent_exemption(
        &self,
        data_len: usize,
    ) -> Result<u64, NetworkError> {
        Ok(self
            .client
            .get_minimum_balance_for_rent_exemption(data_len)
            .await?)
    }

    async fn latest_blockhash(&self) -> Result<Hash, NetworkError> {
        Ok(self.client.get_latest_blockhash().await?)
    }

    async fn fee_per_signature(&self) -> Result<u64, NetworkError> {
        // Fee of a message carrying exactly one signature and no instructions.
        let blockhash = self.client.get_latest_blockhash().await?;
        let message = Message::new_with_blockhash(&[], Some(&Pubkey::new_unique()), &blockhash);
        Ok(self.client.get_fee_for_message(&message).await?)
    }

    async fn request_airdrop(&self, to: &Pubkey, lamports: u64) -> Result<Signature, NetworkError> {
        Ok(self.client.request_airdrop(to, lamports).await?)
    }

    async fn confirm_signature(&self, signature: &Signature) -> Result<(), NetworkError> {
        Ok(self
            .client
            .poll_for_signature_with_commitment(signature, self.client.commitment())
            .await?)
    }

    async fn send_and_confirm(&self, transaction: &Transaction) -> Result<Signature, NetworkError> {
        Ok(self.client.send_and_confirm_transaction(transaction).await?)
    }
}
