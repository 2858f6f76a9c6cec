//! Capture-layer error types.
//!
//! None of these ever reach the caller of an HTTP request: the adapter logs
//! them and carries on. They exist so the background worker and the setup
//! code can report what went wrong.

use crate::storage::StorageError;
use std::fmt;

/// Errors that can occur while recording a transaction.
#[derive(Debug)]
pub enum CaptureError {
    /// The persistence gateway rejected an operation.
    Storage(StorageError),

    /// The background queue has been shut down and accepts no more work.
    QueueClosed,

    /// A blocking storage task panicked or was cancelled.
    TaskFailed(String),

    /// The adapter was created outside of a tokio runtime.
    NoRuntime,
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::Storage(err) => write!(f, "Capture storage error: {}", err),
            CaptureError::QueueClosed => write!(f, "Capture queue is closed"),
            CaptureError::TaskFailed(msg) => write!(f, "Capture task failed: {}", msg),
            CaptureError::NoRuntime => {
                write!(f, "Capture adapter requires a running tokio runtime")
            }
        }
    }
}

impl std::error::Error for CaptureError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CaptureError::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StorageError> for CaptureError {
    fn from(err: StorageError) -> Self {
        CaptureError::Storage(err)
    }
}

impl From<tokio::task::JoinError> for CaptureError {
    fn from(err: tokio::task::JoinError) -> Self {
        CaptureError::TaskFailed(err.to_string())
    }
}

/// Describes a transport failure for the stored transaction.
///
/// Classification follows what reqwest reports about the error so the stored
/// text says whether the call timed out, could not connect, or failed later.
pub fn describe_transport_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("Request timed out: {}", err)
    } else if err.is_connect() {
        format!("Connection failed: {}", err)
    } else if err.is_builder() {
        format!("Request build error: {}", err)
    } else if err.is_redirect() {
        format!("Redirect error: {}", err)
    } else if err.is_body() || err.is_decode() {
        format!("Body error: {}", err)
    } else {
        format!("Network error: {}", err)
    }
}
