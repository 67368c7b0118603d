//! Step journal for multi-transaction operations.
//!
//! A deposit or withdraw is two transactions with no atomicity between them.
//! The journal records the auxiliary account of each operation and the last
//! confirmed step, so a later run can pick up an account that was created and
//! funded but never used instead of orphaning it.

use std::fs;
use std::path::{Path, PathBuf};

use bank_core::Address;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::BankError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Deposit,
    Withdraw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Create-and-initialize transaction confirmed.
    AuxCreated,
    /// Transfer transaction confirmed; the operation is complete.
    Transferred,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub operation: Operation,
    pub aux_account: Address,
    /// Payer that funded the auxiliary account and owns its tokens.
    #[serde(default)]
    pub owner: Address,
    /// Endpoint of the cluster the account lives on.
    #[serde(default)]
    pub endpoint: String,
    pub amount: u64,
    pub step: Step,
    pub signature: String,
}

impl JournalEntry {
    /// Whether this entry was written by `owner` against `endpoint`.
    pub fn belongs_to(&self, owner: &Address, endpoint: &str) -> bool {
        self.owner == *owner && self.endpoint == endpoint
    }
}

#[derive(Debug, Default)]
pub struct Journal {
    path: Option<PathBuf>,
    entries: Vec<JournalEntry>,
}

impl Journal {
    /// A journal that is never written to disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the journal at `path`; a missing file is an empty journal.
    pub fn open(path: &Path) -> Result<Self, BankError> {
        let journal_error = |reason: String| BankError::Journal {
            path: path.to_path_buf(),
            reason,
        };
        let entries = match fs::read(path) {
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| journal_error(e.to_string()))?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(journal_error(e.to_string())),
        };
        Ok(Self {
            path: Some(path.to_path_buf()),
            entries,
        })
    }

    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    /// Record that `entry.step` of an operation was confirmed.
    ///
    /// The entry replaces any earlier one for the same account. Only the
    /// newest completed entry per operation is kept. Nothing changes in
    /// memory unless the write to disk succeeded.
    pub fn record(&mut self, entry: JournalEntry) -> Result<(), BankError> {
        debug!(
            "journal: {:?} {} -> {:?}",
            entry.operation, entry.aux_account, entry.step
        );
        let completed = entry.step == Step::Transferred;
        let mut entries = self.entries.clone();
        entries.retain(|e| {
            e.operation != entry.operation
                || (e.aux_account != entry.aux_account
                    && !(completed && e.step == Step::Transferred))
        });
        entries.push(entry);
        self.commit(entries)
    }

    /// Most recent operation whose account was created but whose transfer
    /// was never confirmed.
    pub fn pending(&self, operation: Operation) -> Option<&JournalEntry> {
        self.find_pending(operation, |_| true)
    }

    /// Most recent pending entry of `operation` accepted by `predicate`.
    pub fn find_pending(
        &self,
        operation: Operation,
        predicate: impl Fn(&JournalEntry) -> bool,
    ) -> Option<&JournalEntry> {
        self.entries
            .iter()
            .rev()
            .filter(|e| e.operation == operation && e.step == Step::AuxCreated)
            .find(|e| predicate(e))
    }

    /// Most recent fully completed operation.
    pub fn last_completed(&self, operation: Operation) -> Option<&JournalEntry> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.operation == operation && e.step == Step::Transferred)
    }

    /// Forget an entry, e.g. a pending account that no longer exists on chain.
    pub fn discard(
        &mut self,
        operation: Operation,
        aux_account: &Address,
    ) -> Result<(), BankError> {
        let mut entries = self.entries.clone();
        entries.retain(|e| !(e.operation == operation && e.aux_account == *aux_account));
        self.commit(entries)
    }

    fn commit(&mut self, entries: Vec<JournalEntry>) -> Result<(), BankError> {
        self.persist(&entries)?;
        self.entries = entries;
        Ok(())
    }

    fn persist(&self, entries: &[JournalEntry]) -> Result<(), BankError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let journal_error = |reason: String| BankError::Journal {
            path: path.clone(),
            reason,
        };
        let bytes =
            serde_json::to_vec_pretty(entries).map_err(|e| journal_error(e.to_string()))?;
        fs::write(path, bytes).map_err(|e| journal_error(e.to_string()))
    }
}
