//! Captured HTTP transaction records.
//!
//! A [`Transaction`] is created in the pending state when a call starts
//! ([`Transaction::begin`]) and resolved exactly once, either by
//! [`Transaction::complete`] when a response arrived or by
//! [`Transaction::fail`] when the call failed before one did.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier issued by the persistence layer when a transaction is inserted.
///
/// Identifiers are handed out in increasing order by every backend and are
/// never reused while the record exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub u64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single header as it appeared on the wire.
///
/// Headers are kept in a `Vec` rather than a map: order is preserved and a
/// name may appear more than once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// What was kept of a request or response body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodySnapshot {
    /// Captured bytes decoded as text, or `None` when nothing was kept
    /// (binary payload, unsupported encoding or an empty body).
    pub content: Option<String>,

    /// Number of bytes copied into the capture buffer.
    pub captured_size: u64,

    /// Number of bytes that actually went over the wire.
    pub total_size: u64,
}

impl BodySnapshot {
    /// Returns `true` when fewer bytes were kept than were transferred.
    pub fn is_truncated(&self) -> bool {
        self.total_size > self.captured_size
    }

    /// Size of the body that was not kept, if any was dropped.
    pub fn uncaptured_total_size(&self) -> Option<u64> {
        self.is_truncated().then_some(self.total_size)
    }
}

/// Request half of a transaction. Immutable once the transaction is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFacet {
    pub method: String,
    pub url: String,
    pub host: String,
    pub path: String,
    pub scheme: String,
    pub is_ssl: bool,
    /// Headers after redaction.
    pub headers: Vec<Header>,
    pub body: Option<BodySnapshot>,
    pub requested_at: DateTime<Utc>,
}

impl RequestFacet {
    pub fn body_size(&self) -> u64 {
        self.body.as_ref().map_or(0, |b| b.total_size)
    }
}

/// Response half of a successful transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseFacet {
    pub status_code: u16,
    pub status_message: String,
    /// Headers after redaction.
    pub headers: Vec<Header>,
    pub body: Option<BodySnapshot>,
    pub content_type: Option<String>,
    pub protocol: String,
    pub tls_version: Option<String>,
    pub responded_at: DateTime<Utc>,
    pub took_ms: u64,
}

impl ResponseFacet {
    pub fn body_size(&self) -> u64 {
        self.body.as_ref().map_or(0, |b| b.total_size)
    }
}

/// Resolution of a transaction.
///
/// The error description and the response facet can never be present at the
/// same time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Outcome {
    Pending,
    Complete(ResponseFacet),
    Failed { error: String },
}

/// Lifecycle state derived from the [`Outcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionState {
    Pending,
    Complete,
    Failed,
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionState::Pending => "PENDING",
            TransactionState::Complete => "COMPLETE",
            TransactionState::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}

/// One captured HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Assigned by the persistence layer on insert; `None` before that.
    pub id: Option<TransactionId>,
    pub request: RequestFacet,
    pub outcome: Outcome,
}

impl Transaction {
    /// Creates a pending transaction with no response data.
    pub fn begin(request: RequestFacet) -> Self {
        Self {
            id: None,
            request,
            outcome: Outcome::Pending,
        }
    }

    /// Resolves the transaction with the response that was received.
    pub fn complete(self, response: ResponseFacet) -> Self {
        Self {
            outcome: Outcome::Complete(response),
            ..self
        }
    }

    /// Resolves the transaction with the failure that prevented a response.
    pub fn fail(self, error: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Failed {
                error: error.into(),
            },
            ..self
        }
    }

    pub fn state(&self) -> TransactionState {
        match self.outcome {
            Outcome::Pending => TransactionState::Pending,
            Outcome::Complete(_) => TransactionState::Complete,
            Outcome::Failed { .. } => TransactionState::Failed,
        }
    }

    pub fn response(&self) -> Option<&ResponseFacet> {
        match &self.outcome {
            Outcome::Complete(response) => Some(response),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Failed { error } => Some(error),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error().is_some()
    }

    /// Request body size plus response body size, in bytes.
    pub fn total_size(&self) -> u64 {
        self.request.body_size() + self.response().map_or(0, ResponseFacet::body_size)
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.response().map(|r| r.took_ms)
    }

    pub fn requested_at(&self) -> DateTime<Utc> {
        self.request.requested_at
    }
}
