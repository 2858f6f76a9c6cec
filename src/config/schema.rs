//! Configuration schema for HTTP capture.
//!
//! This module defines the settings integrators pass to the capture adapter
//! and the validation applied to them.

use crate::policy::RedactionSet;
use crate::retention::RetentionPeriod;
use serde::{Deserialize, Serialize};

/// Upper bound accepted for `maxContentLength`; each in-flight body may hold
/// this many bytes in memory.
pub const MAX_CONTENT_LENGTH_CEILING: usize = 100 * 1024 * 1024;

/// Capture adapter configuration.
///
/// Read from JSON settings under the `"http-capture"` key. Missing fields take
/// their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureConfig {
    /// Maximum number of bytes of each body kept for display.
    ///
    /// Bodies larger than this are still forwarded and counted in full; only
    /// the stored copy is truncated. Zero keeps sizes but no content.
    /// Defaults to 250000.
    #[serde(default = "default_max_content_length")]
    pub max_content_length: usize,

    /// Header names whose values are masked before storage.
    ///
    /// Compared case-insensitively. Names that never occur simply have no
    /// effect. Defaults to the usual credential-bearing headers.
    #[serde(default = "default_redacted_header_names")]
    pub redacted_header_names: Vec<String>,

    /// How long transactions are kept before the retention sweep removes them.
    /// Defaults to one week.
    #[serde(default)]
    pub retention_period: RetentionPeriod,

    /// Whether stored transactions are forwarded to a notification collaborator.
    /// Defaults to true.
    #[serde(default = "default_show_notification")]
    pub show_notification: bool,

    /// Hosts whose traffic is never recorded. The calls themselves are not
    /// affected. Defaults to empty.
    #[serde(default)]
    pub skip_hosts: Vec<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_content_length: default_max_content_length(),
            redacted_header_names: default_redacted_header_names(),
            retention_period: RetentionPeriod::default(),
            show_notification: default_show_notification(),
            skip_hosts: Vec::new(),
        }
    }
}

impl CaptureConfig {
    /// Validates the configuration and returns a descriptive message for the
    /// first invalid setting.
    pub fn validate(&self) -> Result<(), String> {
        validate_max_content_length(self.max_content_length)?;
        validate_skip_hosts(&self.skip_hosts)
    }

    /// Returns a copy with every field present in `overlay` replacing the
    /// value from `self`.
    pub fn merge(&self, overlay: &ConfigOverlay) -> Self {
        Self {
            max_content_length: overlay
                .max_content_length
                .unwrap_or(self.max_content_length),
            redacted_header_names: overlay
                .redacted_header_names
                .clone()
                .unwrap_or_else(|| self.redacted_header_names.clone()),
            retention_period: overlay.retention_period.unwrap_or(self.retention_period),
            show_notification: overlay.show_notification.unwrap_or(self.show_notification),
            skip_hosts: overlay
                .skip_hosts
                .clone()
                .unwrap_or_else(|| self.skip_hosts.clone()),
        }
    }

    /// Normalized set of header names to redact.
    pub fn redaction_set(&self) -> RedactionSet {
        RedactionSet::new(&self.redacted_header_names)
    }

    /// Returns `true` when calls to `host` must not be recorded.
    pub fn skips_host(&self, host: &str) -> bool {
        self.skip_hosts
            .iter()
            .any(|skipped| skipped.trim().eq_ignore_ascii_case(host))
    }
}

/// Partial configuration, one optional value per [`CaptureConfig`] field.
///
/// Built from user settings one key at a time, so a malformed value only
/// leaves its own field unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverlay {
    pub max_content_length: Option<usize>,
    pub redacted_header_names: Option<Vec<String>>,
    pub retention_period: Option<RetentionPeriod>,
    pub show_notification: Option<bool>,
    pub skip_hosts: Option<Vec<String>>,
}

pub(crate) fn validate_max_content_length(limit: usize) -> Result<(), String> {
    if limit > MAX_CONTENT_LENGTH_CEILING {
        return Err(format!(
            "maxContentLength must not exceed {} bytes",
            MAX_CONTENT_LENGTH_CEILING
        ));
    }
    Ok(())
}

pub(crate) fn validate_skip_hosts(hosts: &[String]) -> Result<(), String> {
    if hosts.iter().any(|h| h.trim().is_empty()) {
        return Err("skipHosts must not contain empty host names".to_string());
    }
    Ok(())
}

// Default value functions for serde

fn default_max_content_length() -> usize {
    250_000
}

fn default_redacted_header_names() -> Vec<String> {
    ["Authorization", "Cookie", "Set-Cookie", "Proxy-Authorization"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_show_notification() -> bool {
    true
}
