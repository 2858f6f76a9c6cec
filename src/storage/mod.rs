//! Persistence for captured transactions.
//!
//! The capture pipeline only talks to storage through [`PersistenceGateway`],
//! so the backend is picked once at construction time:
//!
//! - [`MemoryStore`]: bounded ring buffer, nothing survives the process
//! - [`JournalStore`]: JSONL journal on disk, appended on insert and update
//!
//! The retention watermark lives in a separate key-value [`ConfigStore`].
//!
//! # Example
//!
//! ```no_run
//! use http_capture::storage::{JournalStore, PersistenceGateway};
//! use std::sync::Arc;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let gateway: Arc<dyn PersistenceGateway> = Arc::new(JournalStore::open("capture.jsonl")?);
//! println!("{} transactions stored", gateway.count()?);
//! # Ok(())
//! # }
//! ```

pub mod config_store;
pub mod journal;
pub mod memory;

pub use config_store::{ConfigStore, FileConfigStore, MemoryConfigStore};
pub use journal::JournalStore;
pub use memory::MemoryStore;

use crate::models::{Outcome, Transaction, TransactionId, TransactionState};
use chrono::{DateTime, Utc};
use std::fmt;

/// Storage contract used by the capture adapter and the retention manager.
///
/// Implementations serialize their own writes; callers never lock around them.
pub trait PersistenceGateway: Send + Sync {
    /// Stores a new transaction and returns the identifier issued for it.
    fn insert(&self, transaction: &Transaction) -> Result<TransactionId, StorageError>;

    /// Replaces the outcome of an existing transaction.
    ///
    /// The request facet of a stored transaction is never rewritten.
    fn update(&self, id: TransactionId, outcome: &Outcome) -> Result<(), StorageError>;

    /// Looks up a single transaction.
    fn get(&self, id: TransactionId) -> Result<Option<Transaction>, StorageError>;

    /// Deletes one transaction. Returns `false` when it did not exist.
    fn delete(&self, id: TransactionId) -> Result<bool, StorageError>;

    /// Deletes every transaction requested strictly before `cutoff`.
    fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError>;

    /// Deletes every transaction.
    fn delete_all(&self) -> Result<(), StorageError>;

    /// Lists transactions, newest first.
    fn query(&self, query: &TransactionQuery) -> Result<Vec<Transaction>, StorageError>;

    /// Number of stored transactions.
    fn count(&self) -> Result<usize, StorageError>;
}

/// Filter and paging options for [`PersistenceGateway::query`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionQuery {
    /// Only transactions whose method matches, ignoring case.
    pub method: Option<String>,
    /// Only transactions whose host contains this text, ignoring case.
    pub host_contains: Option<String>,
    /// Only transactions in this state.
    pub state: Option<TransactionState>,
    /// Number of matching transactions to skip.
    pub offset: usize,
    /// Maximum number of transactions to return. `None` means all.
    pub limit: Option<usize>,
}

impl TransactionQuery {
    pub fn page(offset: usize, limit: usize) -> Self {
        Self {
            offset,
            limit: Some(limit),
            ..Default::default()
        }
    }

    pub fn matches(&self, transaction: &Transaction) -> bool {
        if let Some(ref method) = self.method {
            if !transaction.request.method.eq_ignore_ascii_case(method) {
                return false;
            }
        }
        if let Some(ref needle) = self.host_contains {
            if !transaction
                .request
                .host
                .to_ascii_lowercase()
                .contains(&needle.to_ascii_lowercase())
            {
                return false;
            }
        }
        if let Some(state) = self.state {
            if transaction.state() != state {
                return false;
            }
        }
        true
    }

    /// Applies filters, newest-first ordering and paging to `transactions`.
    pub fn apply<I>(&self, transactions: I) -> Vec<Transaction>
    where
        I: IntoIterator<Item = Transaction>,
    {
        let mut matched: Vec<Transaction> = transactions
            .into_iter()
            .filter(|tx| self.matches(tx))
            .collect();
        matched.sort_by(|a, b| b.id.cmp(&a.id));

        let page = matched.into_iter().skip(self.offset);
        match self.limit {
            Some(limit) => page.take(limit).collect(),
            None => page.collect(),
        }
    }
}

/// Errors raised by storage backends.
#[derive(Debug)]
pub enum StorageError {
    /// File I/O failed.
    Io(std::io::Error),

    /// A record could not be serialized or deserialized.
    Serialization(serde_json::Error),

    /// An update or lookup referenced a transaction that is not stored.
    NotFound(TransactionId),

    /// An internal lock was poisoned by a panicking writer.
    Poisoned,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Io(err) => write!(f, "Storage I/O error: {}", err),
            StorageError::Serialization(err) => write!(f, "Storage serialization error: {}", err),
            StorageError::NotFound(id) => write!(f, "Transaction {} not found", id),
            StorageError::Poisoned => write!(f, "Storage lock poisoned"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Io(err) => Some(err),
            StorageError::Serialization(err) => Some(err),
            StorageError::NotFound(_) | StorageError::Poisoned => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err)
    }
}

impl<T> From<std::sync::PoisonError<T>> for StorageError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        StorageError::Poisoned
    }
}
