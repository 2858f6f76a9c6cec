//! Transaction capture around outbound HTTP calls.
//!
//! The [`CaptureAdapter`] has two entry points matching the halves of a call.
//! [`CaptureAdapter::on_request_start`] builds a pending transaction from the
//! outgoing request and queues its insert. Afterwards either
//! [`CaptureAdapter::on_response_complete`] or [`CaptureAdapter::on_failure`]
//! resolves it and queues the update.
//!
//! Nothing here can fail the HTTP call. Storage errors surface only in the
//! log, and a transaction whose insert failed is simply not recorded.
//!
//! [`CapturingClient`] wires the adapter into a `reqwest::Client`.
//!
//! # Example
//!
//! ```no_run
//! use http_capture::capture::{CaptureAdapter, CapturingClient};
//! use http_capture::config::CaptureConfig;
//! use http_capture::storage::{MemoryConfigStore, MemoryStore};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let adapter = CaptureAdapter::new(
//!     CaptureConfig::default(),
//!     Arc::new(MemoryStore::default()),
//!     Arc::new(MemoryConfigStore::new()),
//! )?;
//! let client = CapturingClient::new(reqwest::Client::new(), Arc::new(adapter));
//!
//! let response = client.send(client.inner().get("https://example.com/")).await?;
//! println!("{}", response.text().await?);
//! # Ok(())
//! # }
//! ```

pub mod body;
pub mod client;
pub mod error;
pub mod queue;

pub use body::BodyCapture;
pub use client::{CapturedResponse, CapturingClient};
pub use error::{describe_transport_error, CaptureError};
pub use queue::{CaptureNotifier, PersistenceQueue};

use crate::config::CaptureConfig;
use crate::models::{Header, RequestFacet, ResponseFacet, Transaction, TransactionId};
use crate::policy::{has_supported_encoding, header_value, redact_headers, RedactionSet};
use crate::retention::RetentionManager;
use crate::storage::{ConfigStore, PersistenceGateway};
use chrono::Utc;
use log::{debug, warn};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use url::Url;

/// The outgoing request as seen by the adapter.
#[derive(Debug, Clone, Copy)]
pub struct RequestParts<'a> {
    pub method: &'a str,
    pub url: &'a Url,
    /// Headers as sent, before redaction.
    pub headers: &'a [Header],
    /// Body bytes when they are available up front.
    pub body: Option<&'a [u8]>,
}

/// The received response as seen by the adapter.
#[derive(Debug)]
pub struct ResponseParts {
    pub status_code: u16,
    pub status_message: String,
    pub protocol: String,
    pub tls_version: Option<String>,
    /// Headers as received, before redaction.
    pub headers: Vec<Header>,
    /// What was observed of the body, if it was read.
    pub body: Option<BodyCapture>,
}

/// Correlates one call with its stored transaction.
///
/// Consumed by whichever completion entry point runs, so a transaction can be
/// resolved only once.
#[derive(Debug)]
pub struct CaptureHandle {
    pending: Option<PendingCapture>,
}

#[derive(Debug)]
struct PendingCapture {
    transaction: Transaction,
    id: oneshot::Receiver<TransactionId>,
}

impl CaptureHandle {
    /// A handle that records nothing when resolved.
    pub fn untracked() -> Self {
        Self { pending: None }
    }

    pub fn is_tracked(&self) -> bool {
        self.pending.is_some()
    }
}

/// Records outbound HTTP calls as transactions.
pub struct CaptureAdapter {
    config: CaptureConfig,
    redacted: RedactionSet,
    queue: PersistenceQueue,
}

impl CaptureAdapter {
    /// Creates an adapter and starts its persistence worker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        config: CaptureConfig,
        gateway: Arc<dyn PersistenceGateway>,
        config_store: Arc<dyn ConfigStore>,
    ) -> Result<Self, CaptureError> {
        Self::build(config, gateway, config_store, None)
    }

    /// Like [`CaptureAdapter::new`], additionally reporting stored
    /// transactions to `notifier` when `show_notification` is enabled.
    pub fn with_notifier(
        config: CaptureConfig,
        gateway: Arc<dyn PersistenceGateway>,
        config_store: Arc<dyn ConfigStore>,
        notifier: Arc<dyn CaptureNotifier>,
    ) -> Result<Self, CaptureError> {
        Self::build(config, gateway, config_store, Some(notifier))
    }

    fn build(
        config: CaptureConfig,
        gateway: Arc<dyn PersistenceGateway>,
        config_store: Arc<dyn ConfigStore>,
        notifier: Option<Arc<dyn CaptureNotifier>>,
    ) -> Result<Self, CaptureError> {
        let retention = Arc::new(RetentionManager::new(gateway.clone(), config_store));
        let notifier = notifier.filter(|_| config.show_notification);
        let queue = PersistenceQueue::start(gateway, retention, notifier)?;

        Ok(Self {
            redacted: config.redaction_set(),
            config,
            queue,
        })
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Starts recording a call.
    ///
    /// Builds the pending transaction, queues its insert and queues one
    /// retention check. Returns without waiting for storage.
    pub fn on_request_start(&self, parts: RequestParts<'_>) -> CaptureHandle {
        let now = Utc::now();
        if let Err(e) = self.queue.maintain(self.config.retention_period, now) {
            debug!("Retention check not scheduled: {}", e);
        }

        let host = parts.url.host_str().unwrap_or_default().to_string();
        if self.config.skips_host(&host) {
            debug!("Not recording call to skipped host {}", host);
            return CaptureHandle::untracked();
        }

        let body = parts.body.and_then(|bytes| {
            let mut capture = self.body_capture(parts.headers);
            capture.observe(bytes);
            capture.finish()
        });

        let request = RequestFacet {
            method: parts.method.to_string(),
            url: parts.url.to_string(),
            host,
            path: request_path(parts.url),
            scheme: parts.url.scheme().to_string(),
            is_ssl: parts.url.scheme().eq_ignore_ascii_case("https"),
            headers: redact_headers(parts.headers, &self.redacted),
            body,
            requested_at: now,
        };
        let transaction = Transaction::begin(request);

        match self.queue.insert(transaction.clone()) {
            Ok(id) => CaptureHandle {
                pending: Some(PendingCapture { transaction, id }),
            },
            Err(e) => {
                warn!(
                    "Not recording {} {}: {}",
                    transaction.request.method, transaction.request.url, e
                );
                CaptureHandle::untracked()
            }
        }
    }

    /// Returns a body tee for a message with these headers.
    ///
    /// Bodies with an unsupported `Content-Encoding` are counted but their
    /// bytes are not kept.
    pub fn body_capture(&self, headers: &[Header]) -> BodyCapture {
        if has_supported_encoding(headers) {
            BodyCapture::new(self.config.max_content_length)
        } else {
            BodyCapture::counting_only()
        }
    }

    /// Resolves a call that produced a response.
    ///
    /// `elapsed` is the time the transport reported for the exchange.
    pub fn on_response_complete(
        &self,
        handle: CaptureHandle,
        parts: ResponseParts,
        elapsed: Duration,
    ) {
        let Some(pending) = handle.pending else {
            return;
        };

        let response = ResponseFacet {
            status_code: parts.status_code,
            status_message: parts.status_message,
            content_type: header_value(&parts.headers, "Content-Type").map(str::to_string),
            headers: redact_headers(&parts.headers, &self.redacted),
            body: parts.body.and_then(BodyCapture::finish),
            protocol: parts.protocol,
            tls_version: parts.tls_version,
            responded_at: Utc::now(),
            took_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        };
        let resolved = pending.transaction.complete(response);
        self.persist(pending.id, resolved);
    }

    /// Resolves a call that failed before a response arrived.
    pub fn on_failure(&self, handle: CaptureHandle, error: impl fmt::Display) {
        let Some(pending) = handle.pending else {
            return;
        };
        let resolved = pending.transaction.fail(error.to_string());
        self.persist(pending.id, resolved);
    }

    fn persist(&self, id: oneshot::Receiver<TransactionId>, transaction: Transaction) {
        let (method, url) = (
            transaction.request.method.clone(),
            transaction.request.url.clone(),
        );
        if let Err(e) = self.queue.update(id, transaction) {
            warn!("Dropping result of {} {}: {}", method, url, e);
        }
    }

    /// Waits until all queued storage work has been applied.
    pub async fn flush(&self) -> Result<(), CaptureError> {
        self.queue.flush().await
    }

    /// Stops recording and drains queued storage work.
    pub async fn shutdown(&self) {
        self.queue.shutdown().await
    }
}

impl fmt::Debug for CaptureAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureAdapter")
            .field("config", &self.config)
            .field("closed", &self.queue.is_closed())
            .finish()
    }
}

fn request_path(url: &Url) -> String {
    match url.path() {
        "" => "/".to_string(),
        path => path.to_string(),
    }
}
