//! Time-based eviction of old transactions.
//!
//! [`RetentionManager::maintain`] is cheap to call on every request. It only
//! sweeps the transaction table when a full retention period has passed since
//! the last successful sweep, recorded as a watermark in a [`ConfigStore`].
//!
//! The read-check-write of the watermark runs under a mutex, so concurrent
//! callers sharing one manager perform at most one sweep per period.

use crate::storage::{ConfigStore, PersistenceGateway, StorageError};
use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};

/// Config store key holding the last sweep time in epoch milliseconds.
pub const LAST_CLEANUP_KEY: &str = "last_cleanup_at";

/// How long captured transactions are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RetentionPeriod {
    OneHour,
    OneDay,
    #[default]
    OneWeek,
    /// Never sweep; transactions are only removed by explicit deletion.
    Forever,
}

impl RetentionPeriod {
    /// Length of the period, or `None` for [`RetentionPeriod::Forever`].
    pub fn duration(&self) -> Option<Duration> {
        match self {
            RetentionPeriod::OneHour => Some(Duration::hours(1)),
            RetentionPeriod::OneDay => Some(Duration::days(1)),
            RetentionPeriod::OneWeek => Some(Duration::weeks(1)),
            RetentionPeriod::Forever => None,
        }
    }
}

impl fmt::Display for RetentionPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RetentionPeriod::OneHour => "ONE_HOUR",
            RetentionPeriod::OneDay => "ONE_DAY",
            RetentionPeriod::OneWeek => "ONE_WEEK",
            RetentionPeriod::Forever => "FOREVER",
        };
        write!(f, "{}", s)
    }
}

/// Result of a call to [`RetentionManager::maintain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    /// The period has not elapsed since the last sweep, or it is `Forever`.
    Skipped,
    /// A sweep ran and removed this many transactions.
    Swept(usize),
}

/// Debounced eviction scheduler.
pub struct RetentionManager {
    gateway: Arc<dyn PersistenceGateway>,
    config_store: Arc<dyn ConfigStore>,
    critical: Mutex<()>,
}

impl RetentionManager {
    pub fn new(gateway: Arc<dyn PersistenceGateway>, config_store: Arc<dyn ConfigStore>) -> Self {
        Self {
            gateway,
            config_store,
            critical: Mutex::new(()),
        }
    }

    /// Sweeps transactions older than `period` if a full period has passed
    /// since the watermark.
    ///
    /// A missing watermark reads as the epoch, so the first call always
    /// sweeps and establishes one. The watermark only advances after a
    /// successful delete; a storage error leaves it in place so the next call
    /// retries.
    pub fn maintain(
        &self,
        period: RetentionPeriod,
        now: DateTime<Utc>,
    ) -> Result<SweepOutcome, StorageError> {
        let Some(window) = period.duration() else {
            return Ok(SweepOutcome::Skipped);
        };

        // A poisoned lock only means another sweep panicked; the watermark
        // check below is still valid.
        let _guard = self
            .critical
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let last_cleanup_ms = self.config_store.get_long(LAST_CLEANUP_KEY, 0);
        let now_ms = now.timestamp_millis();
        if now_ms.saturating_sub(last_cleanup_ms) < window.num_milliseconds() {
            debug!(
                "Retention sweep skipped for {} (last run {} ms ago)",
                period,
                now_ms.saturating_sub(last_cleanup_ms)
            );
            return Ok(SweepOutcome::Skipped);
        }

        let cutoff = now - window;
        let removed = self.gateway.delete_older_than(cutoff)?;
        // Only reached when now_ms is a full window past the old value, so
        // the watermark never moves backwards.
        self.config_store.put_long(LAST_CLEANUP_KEY, now_ms)?;

        info!(
            "Retention sweep for {} removed {} transaction(s) older than {}",
            period, removed, cutoff
        );
        Ok(SweepOutcome::Swept(removed))
    }

    /// Current watermark, if one has been written.
    pub fn last_cleanup_at(&self) -> Option<DateTime<Utc>> {
        match self.config_store.get_long(LAST_CLEANUP_KEY, 0) {
            0 => None,
            ms => DateTime::from_timestamp_millis(ms),
        }
    }
}

impl fmt::Debug for RetentionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetentionManager")
            .field("last_cleanup_at", &self.last_cleanup_at())
            .finish()
    }
}
