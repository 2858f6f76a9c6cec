//! Durable transaction table backed by a JSONL journal.
//!
//! Every insert and update is appended as one JSON line, so the hot path only
//! ever appends. The journal is replayed once on open into an in-memory table
//! that serves all reads. Deletions compact the journal: surviving
//! transactions are written to a temporary file which then atomically
//! replaces the journal.
//!
//! Compaction starts the new journal with a `next_id` record so identifiers
//! of deleted transactions are never issued again after a restart.
//!
//! Lines that fail to parse are skipped with a warning so a torn write at the
//! end of the file never makes the whole history unreadable. A torn last line
//! is terminated on open so the next append starts on a fresh line.

use super::{PersistenceGateway, StorageError, TransactionQuery};
use crate::models::{Outcome, Transaction, TransactionId};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum JournalRecord {
    Insert { transaction: Transaction },
    Update { id: TransactionId, outcome: Outcome },
    NextId { next_id: u64 },
}

#[derive(Debug)]
struct JournalState {
    next_id: u64,
    table: BTreeMap<u64, Transaction>,
}

/// File-backed [`PersistenceGateway`].
#[derive(Debug)]
pub struct JournalStore {
    path: PathBuf,
    state: Mutex<JournalState>,
}

impl JournalStore {
    /// Opens the journal at `path`, creating parent directories if needed.
    ///
    /// An existing journal is replayed once into memory. The next identifier
    /// is the highest one ever issued plus one, including identifiers whose
    /// transactions have since been deleted.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        terminate_torn_tail(&path)?;
        let state = replay(&path)?;
        debug!(
            "Opened transaction journal {} ({} records, next id {})",
            path.display(),
            state.table.len(),
            state.next_id
        );

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, record: &JournalRecord) -> Result<(), StorageError> {
        let line = serde_json::to_string(record)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)?;
        file.flush()?;
        Ok(())
    }

    /// Rewrites the journal with the high-water identifier followed by the
    /// given transactions.
    fn compact(
        &self,
        next_id: u64,
        table: &BTreeMap<u64, Transaction>,
    ) -> Result<(), StorageError> {
        let temp_path = self.path.with_extension("jsonl.tmp");
        let mut temp_file = File::create(&temp_path)?;

        writeln!(
            temp_file,
            "{}",
            serde_json::to_string(&JournalRecord::NextId { next_id })?
        )?;
        for transaction in table.values() {
            let record = JournalRecord::Insert {
                transaction: transaction.clone(),
            };
            writeln!(temp_file, "{}", serde_json::to_string(&record)?)?;
        }

        temp_file.flush()?;
        drop(temp_file);

        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    fn delete_where<F>(&self, mut remove: F) -> Result<usize, StorageError>
    where
        F: FnMut(&Transaction) -> bool,
    {
        let mut state = self.state.lock()?;
        let mut table = state.table.clone();
        table.retain(|_, tx| !remove(tx));
        let removed = state.table.len() - table.len();

        if removed > 0 {
            self.compact(state.next_id, &table)?;
            state.table = table;
        }
        Ok(removed)
    }
}

/// Appends a newline when the journal does not end with one, so a line torn
/// by a crash is never joined with the next record.
fn terminate_torn_tail(path: &Path) -> Result<(), StorageError> {
    let mut file = match OpenOptions::new().read(true).append(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    if file.metadata()?.len() == 0 {
        return Ok(());
    }

    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    if last[0] != b'\n' {
        warn!(
            "Journal {} ends with a torn line; terminating it",
            path.display()
        );
        file.write_all(b"\n")?;
        file.flush()?;
    }
    Ok(())
}

/// Replays the journal into a table keyed by identifier, tracking the
/// highest identifier ever issued.
fn replay(path: &Path) -> Result<JournalState, StorageError> {
    let mut state = JournalState {
        next_id: 1,
        table: BTreeMap::new(),
    };
    if !path.exists() {
        return Ok(state);
    }

    let reader = BufReader::new(File::open(path)?);
    let mut corrupted_lines = 0;

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = match line_result {
            Ok(line) => line,
            Err(e) => {
                corrupted_lines += 1;
                warn!("Error reading journal line {}: {}", line_num + 1, e);
                continue;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<JournalRecord>(&line) {
            Ok(JournalRecord::Insert { transaction }) => match transaction.id {
                Some(id) => {
                    state.next_id = state.next_id.max(id.0 + 1);
                    state.table.insert(id.0, transaction);
                }
                None => corrupted_lines += 1,
            },
            Ok(JournalRecord::Update { id, outcome }) => {
                if let Some(tx) = state.table.get_mut(&id.0) {
                    tx.outcome = outcome;
                }
            }
            Ok(JournalRecord::NextId { next_id }) => {
                state.next_id = state.next_id.max(next_id);
            }
            Err(e) => {
                corrupted_lines += 1;
                warn!(
                    "Skipping corrupted journal entry at line {}: {}",
                    line_num + 1,
                    e
                );
            }
        }
    }

    if corrupted_lines > 0 && corrupted_lines > state.table.len() {
        warn!(
            "Journal {} has significant corruption ({} corrupted lines, {} valid records)",
            path.display(),
            corrupted_lines,
            state.table.len()
        );
    }

    Ok(state)
}

impl PersistenceGateway for JournalStore {
    fn insert(&self, transaction: &Transaction) -> Result<TransactionId, StorageError> {
        let mut state = self.state.lock()?;
        let id = TransactionId(state.next_id);

        let mut stored = transaction.clone();
        stored.id = Some(id);
        self.append(&JournalRecord::Insert {
            transaction: stored.clone(),
        })?;

        state.next_id += 1;
        state.table.insert(id.0, stored);
        Ok(id)
    }

    fn update(&self, id: TransactionId, outcome: &Outcome) -> Result<(), StorageError> {
        let mut state = self.state.lock()?;
        let Some(stored) = state.table.get_mut(&id.0) else {
            return Err(StorageError::NotFound(id));
        };
        self.append(&JournalRecord::Update {
            id,
            outcome: outcome.clone(),
        })?;
        stored.outcome = outcome.clone();
        Ok(())
    }

    fn get(&self, id: TransactionId) -> Result<Option<Transaction>, StorageError> {
        let state = self.state.lock()?;
        Ok(state.table.get(&id.0).cloned())
    }

    fn delete(&self, id: TransactionId) -> Result<bool, StorageError> {
        Ok(self.delete_where(|tx| tx.id == Some(id))? > 0)
    }

    fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError> {
        self.delete_where(|tx| tx.requested_at() < cutoff)
    }

    fn delete_all(&self) -> Result<(), StorageError> {
        let mut state = self.state.lock()?;
        self.compact(state.next_id, &BTreeMap::new())?;
        state.table.clear();
        Ok(())
    }

    fn query(&self, query: &TransactionQuery) -> Result<Vec<Transaction>, StorageError> {
        let state = self.state.lock()?;
        Ok(query.apply(
            state
                .table
                .values()
                .filter(|tx| query.matches(tx))
                .cloned(),
        ))
    }

    fn count(&self) -> Result<usize, StorageError> {
        Ok(self.state.lock()?.table.len())
    }
}
