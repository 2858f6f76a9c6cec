//! In-memory ring buffer backend.

use super::{PersistenceGateway, StorageError, TransactionQuery};
use crate::models::{Outcome, Transaction, TransactionId};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Default number of transactions kept by [`MemoryStore::default`].
pub const DEFAULT_CAPACITY: usize = 500;

#[derive(Debug)]
struct Ring {
    entries: VecDeque<Transaction>,
    next_id: u64,
}

/// Keeps the most recent transactions in memory.
///
/// When the buffer is full, inserting evicts the oldest transaction.
#[derive(Debug)]
pub struct MemoryStore {
    ring: Mutex<Ring>,
    capacity: usize,
}

impl MemoryStore {
    /// Creates a store holding at most `capacity` transactions (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ring: Mutex::new(Ring {
                entries: VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY)),
                next_id: 1,
            }),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl PersistenceGateway for MemoryStore {
    fn insert(&self, transaction: &Transaction) -> Result<TransactionId, StorageError> {
        let mut ring = self.ring.lock()?;
        let id = TransactionId(ring.next_id);
        ring.next_id += 1;

        while ring.entries.len() >= self.capacity {
            ring.entries.pop_front();
        }

        let mut stored = transaction.clone();
        stored.id = Some(id);
        ring.entries.push_back(stored);
        Ok(id)
    }

    fn update(&self, id: TransactionId, outcome: &Outcome) -> Result<(), StorageError> {
        let mut ring = self.ring.lock()?;
        let entry = ring
            .entries
            .iter_mut()
            .find(|tx| tx.id == Some(id))
            .ok_or(StorageError::NotFound(id))?;
        entry.outcome = outcome.clone();
        Ok(())
    }

    fn get(&self, id: TransactionId) -> Result<Option<Transaction>, StorageError> {
        let ring = self.ring.lock()?;
        Ok(ring.entries.iter().find(|tx| tx.id == Some(id)).cloned())
    }

    fn delete(&self, id: TransactionId) -> Result<bool, StorageError> {
        let mut ring = self.ring.lock()?;
        let before = ring.entries.len();
        ring.entries.retain(|tx| tx.id != Some(id));
        Ok(ring.entries.len() != before)
    }

    fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError> {
        let mut ring = self.ring.lock()?;
        let before = ring.entries.len();
        ring.entries.retain(|tx| tx.requested_at() >= cutoff);
        Ok(before - ring.entries.len())
    }

    fn delete_all(&self) -> Result<(), StorageError> {
        self.ring.lock()?.entries.clear();
        Ok(())
    }

    fn query(&self, query: &TransactionQuery) -> Result<Vec<Transaction>, StorageError> {
        let ring = self.ring.lock()?;
        Ok(query.apply(ring.entries.iter().cloned()))
    }

    fn count(&self) -> Result<usize, StorageError> {
        Ok(self.ring.lock()?.entries.len())
    }
}
