//! HTTP transaction capture and retention.
//!
//! This crate records outbound HTTP calls as transactions without getting in
//! the way of the calls themselves. It redacts sensitive headers, decides
//! which bodies can be kept for display, persists everything from a
//! background worker and evicts old records on a debounced schedule.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - **models**: The transaction record and its pending/complete/failed lifecycle
//! - **policy**: Header redaction and the content-encoding gate
//! - **capture**: The capture adapter, body tee, background queue and the
//!   `reqwest` client wrapper
//! - **storage**: The persistence gateway trait with in-memory and JSONL
//!   backends, plus the key-value config store
//! - **retention**: Retention periods and the watermark-based sweep
//! - **config**: Integrator-facing settings and their loader
//!
//! # Gzip
//!
//! This crate enables reqwest's `gzip` feature. Cargo unifies features across
//! a build, so every `reqwest::Client` in the same binary starts sending
//! `Accept-Encoding: gzip` and decompressing responses transparently, not
//! only the clients wrapped by [`CapturingClient`]. See [`capture::client`]
//! for how clients that opt out with `.no_gzip()` are recorded.
//!
//! # Usage
//!
//! ```no_run
//! use http_capture::capture::{CaptureAdapter, CapturingClient};
//! use http_capture::config::load_config;
//! use http_capture::storage::{FileConfigStore, JournalStore};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config(None);
//! let adapter = CaptureAdapter::new(
//!     config,
//!     Arc::new(JournalStore::open("capture/transactions.jsonl")?),
//!     Arc::new(FileConfigStore::open("capture/settings.json")?),
//! )?;
//! let client = CapturingClient::new(reqwest::Client::new(), Arc::new(adapter));
//!
//! let response = client
//!     .send(client.inner().post("https://api.example.com/users").body("{}"))
//!     .await?;
//! let status = response.status();
//! let body = response.text().await?;
//! println!("{} {}", status, body);
//!
//! client.adapter().shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod config;
pub mod models;
pub mod policy;
pub mod retention;
pub mod storage;

pub use capture::{CaptureAdapter, CaptureError, CaptureHandle, CapturingClient};
pub use config::{load_config, CaptureConfig};
pub use models::{Transaction, TransactionId, TransactionState};
pub use retention::{RetentionManager, RetentionPeriod};
pub use storage::{PersistenceGateway, StorageError};
