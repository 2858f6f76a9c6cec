//! Header redaction.
//!
//! Sensitive header values are replaced with a fixed-width mask before a
//! header list is stored anywhere. The mask has the same length no matter how
//! long (or empty) the original value was, so nothing about the secret leaks.

use crate::models::Header;
use std::collections::HashSet;

/// Value stored in place of a redacted header.
pub const REDACTION_MASK: &str = "\u{2588}\u{2588}\u{2588}\u{2588}\u{2588}\u{2588}\u{2588}\u{2588}";

/// Set of header names to redact, compared case-insensitively.
///
/// Names are normalized once at construction; blank names are dropped since
/// they can never match a real header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedactionSet {
    names: HashSet<String>,
}

impl RedactionSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names = names
            .into_iter()
            .map(|n| n.as_ref().trim().to_ascii_lowercase())
            .filter(|n| !n.is_empty())
            .collect();
        Self { names }
    }

    pub fn contains(&self, header_name: &str) -> bool {
        !self.names.is_empty() && self.names.contains(&header_name.to_ascii_lowercase())
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }
}

impl<S: AsRef<str>> FromIterator<S> for RedactionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// Returns `headers` with every value whose name is in `redacted` replaced by
/// [`REDACTION_MASK`].
///
/// Count and order are preserved and unmatched headers are returned as-is.
/// Applying it twice gives the same result as applying it once.
pub fn redact_headers(headers: &[Header], redacted: &RedactionSet) -> Vec<Header> {
    headers
        .iter()
        .map(|header| {
            if redacted.contains(&header.name) {
                Header::new(header.name.clone(), REDACTION_MASK)
            } else {
                header.clone()
            }
        })
        .collect()
}
