//! Client for the bank program: funds payers, checks the deployment, derives
//! the bank's accounts and drives the deposit and withdraw sequences.

pub mod config;
pub mod error;
pub mod identity;
pub mod journal;
pub mod network;
pub mod protocol;
pub mod readiness;
pub mod session;
pub mod submit;

pub use error::{BankError, VerificationWarning};
pub use network::{Network, NetworkError, RpcNetwork};
pub use protocol::{DepositOutcome, TransferRequest, WithdrawOutcome};
pub use readiness::BankAccounts;
pub use session::{Connection, Session};
