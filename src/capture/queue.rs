//! Background persistence worker.
//!
//! All storage I/O issued by the capture adapter goes through a
//! [`PersistenceQueue`]: callers push commands onto an unbounded channel and
//! return immediately, and a single tokio task applies them in order. Each
//! gateway call runs under `spawn_blocking` so file I/O never stalls the
//! runtime's worker threads.
//!
//! Because one worker drains the channel in FIFO order, the insert for a
//! transaction is always applied before its update. The update carries the
//! receiving half of the oneshot the insert replies on; if the insert failed
//! the sender is dropped and the update becomes a no-op.

use super::error::CaptureError;
use crate::models::{Transaction, TransactionId};
use crate::retention::{RetentionManager, RetentionPeriod, SweepOutcome};
use crate::storage::PersistenceGateway;
use chrono::{DateTime, Utc};
use log::{debug, error, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Receives transactions after they have been stored or updated.
///
/// Used to drive an external notification surface; only consulted when
/// notifications are enabled in the capture configuration.
pub trait CaptureNotifier: Send + Sync {
    fn on_transaction(&self, transaction: &Transaction);
}

enum Command {
    Insert {
        transaction: Transaction,
        reply: oneshot::Sender<TransactionId>,
    },
    Update {
        id: oneshot::Receiver<TransactionId>,
        transaction: Transaction,
    },
    Maintain {
        period: RetentionPeriod,
        now: DateTime<Utc>,
    },
    Flush(oneshot::Sender<()>),
    Shutdown,
}

/// Shared collaborators of the worker task.
struct Worker {
    gateway: Arc<dyn PersistenceGateway>,
    retention: Arc<RetentionManager>,
    notifier: Option<Arc<dyn CaptureNotifier>>,
}

/// Fire-and-forget queue in front of a [`PersistenceGateway`].
pub struct PersistenceQueue {
    sender: mpsc::UnboundedSender<Command>,
    closed: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl PersistenceQueue {
    /// Spawns the worker on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::NoRuntime`] when called outside a runtime.
    pub fn start(
        gateway: Arc<dyn PersistenceGateway>,
        retention: Arc<RetentionManager>,
        notifier: Option<Arc<dyn CaptureNotifier>>,
    ) -> Result<Self, CaptureError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| CaptureError::NoRuntime)?;
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = Worker {
            gateway,
            retention,
            notifier,
        };
        let handle = runtime.spawn(worker.run(receiver));

        Ok(Self {
            sender,
            closed: AtomicBool::new(false),
            worker: Mutex::new(Some(handle)),
        })
    }

    fn submit(&self, command: Command) -> Result<(), CaptureError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CaptureError::QueueClosed);
        }
        self.sender
            .send(command)
            .map_err(|_| CaptureError::QueueClosed)
    }

    /// Queues an insert. The returned receiver yields the issued identifier,
    /// or an error if the insert was dropped.
    pub fn insert(
        &self,
        transaction: Transaction,
    ) -> Result<oneshot::Receiver<TransactionId>, CaptureError> {
        let (reply, id) = oneshot::channel();
        self.submit(Command::Insert { transaction, reply })?;
        Ok(id)
    }

    /// Queues the update that resolves a previously inserted transaction.
    pub fn update(
        &self,
        id: oneshot::Receiver<TransactionId>,
        transaction: Transaction,
    ) -> Result<(), CaptureError> {
        self.submit(Command::Update { id, transaction })
    }

    /// Queues an opportunistic retention check.
    pub fn maintain(&self, period: RetentionPeriod, now: DateTime<Utc>) -> Result<(), CaptureError> {
        self.submit(Command::Maintain { period, now })
    }

    /// Waits until everything queued before this call has been applied.
    pub async fn flush(&self) -> Result<(), CaptureError> {
        let (done, wait) = oneshot::channel();
        self.submit(Command::Flush(done))?;
        wait.await.map_err(|_| CaptureError::QueueClosed)
    }

    /// Stops accepting new work, then waits for already queued work to drain.
    pub async fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let _ = self.sender.send(Command::Shutdown);
        }
        let handle = self.worker.lock().ok().and_then(|mut worker| worker.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Capture worker terminated abnormally: {}", e);
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Worker {
    async fn run(self, mut receiver: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = receiver.recv().await {
            match command {
                Command::Insert { transaction, reply } => self.insert(transaction, reply).await,
                Command::Update { id, transaction } => self.update(id, transaction).await,
                Command::Maintain { period, now } => self.maintain(period, now).await,
                Command::Flush(done) => {
                    let _ = done.send(());
                }
                Command::Shutdown => break,
            }
        }
        debug!("Capture worker stopped");
    }

    async fn insert(&self, mut transaction: Transaction, reply: oneshot::Sender<TransactionId>) {
        let gateway = self.gateway.clone();
        let stored = transaction.clone();
        match run_blocking(move || gateway.insert(&stored)).await {
            Ok(id) => {
                transaction.id = Some(id);
                self.notify(&transaction);
                // The handle may already be gone; the row stays pending.
                let _ = reply.send(id);
            }
            Err(e) => warn!(
                "Not recording {} {}: insert failed: {}",
                transaction.request.method, transaction.request.url, e
            ),
        }
    }

    async fn update(&self, id: oneshot::Receiver<TransactionId>, mut transaction: Transaction) {
        let Ok(id) = id.await else {
            debug!(
                "Skipping update for {} {}: transaction was never stored",
                transaction.request.method, transaction.request.url
            );
            return;
        };

        let gateway = self.gateway.clone();
        let outcome = transaction.outcome.clone();
        match run_blocking(move || gateway.update(id, &outcome)).await {
            Ok(()) => {
                transaction.id = Some(id);
                self.notify(&transaction);
            }
            Err(e) => warn!("Failed to update transaction {}: {}", id, e),
        }
    }

    async fn maintain(&self, period: RetentionPeriod, now: DateTime<Utc>) {
        let retention = self.retention.clone();
        match run_blocking(move || retention.maintain(period, now)).await {
            Ok(SweepOutcome::Swept(removed)) => {
                debug!("Retention removed {} transaction(s)", removed)
            }
            Ok(SweepOutcome::Skipped) => {}
            Err(e) => warn!("Retention sweep failed, will retry: {}", e),
        }
    }

    fn notify(&self, transaction: &Transaction) {
        if let Some(ref notifier) = self.notifier {
            notifier.on_transaction(transaction);
        }
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, CaptureError>
where
    F: FnOnce() -> Result<T, crate::storage::StorageError> + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await??)
}
