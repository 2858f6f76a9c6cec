//! Content-encoding gate for body capture.

use crate::models::Header;

/// Content-Encoding values whose bodies can be stored as delivered.
///
/// `gzip` is in the set because the transport decodes it before the body
/// reaches the capture tee.
pub const SUPPORTED_ENCODINGS: &[&str] = &["identity", "gzip"];

/// Finds the first header named `name`, ignoring ASCII case.
pub fn header_value<'a>(headers: &'a [Header], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}

/// Returns `true` when a body with these headers can be captured.
///
/// An absent `Content-Encoding` header counts as supported. Values are
/// matched exactly against [`SUPPORTED_ENCODINGS`].
pub fn has_supported_encoding(headers: &[Header]) -> bool {
    match header_value(headers, "Content-Encoding") {
        None => true,
        Some(encoding) => SUPPORTED_ENCODINGS.contains(&encoding),
    }
}
