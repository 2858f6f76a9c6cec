//! Pure policies applied to captured data: header redaction and the
//! content-encoding gate that decides whether a body is captured at all.

pub mod encoding;
pub mod redaction;

pub use encoding::{has_supported_encoding, header_value, SUPPORTED_ENCODINGS};
pub use redaction::{redact_headers, RedactionSet, REDACTION_MASK};
