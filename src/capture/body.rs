//! Bounded body capture.
//!
//! A [`BodyCapture`] sees every chunk of a body on its way to the real
//! consumer. It copies bytes into its buffer until the limit is reached and
//! keeps counting after that, so the stored snapshot records both how much
//! was kept and how much was actually transferred. It never holds chunks
//! back: callers forward each chunk unchanged after observing it.

use crate::models::BodySnapshot;

/// Counting tee over a body stream.
#[derive(Debug, Clone)]
pub struct BodyCapture {
    buffer: Vec<u8>,
    limit: usize,
    total: u64,
    keep_content: bool,
}

impl BodyCapture {
    /// Captures up to `limit` bytes.
    pub fn new(limit: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(limit.min(8 * 1024)),
            limit,
            total: 0,
            keep_content: true,
        }
    }

    /// Counts bytes without keeping any, for bodies whose encoding cannot be
    /// decoded for display.
    pub fn counting_only() -> Self {
        Self {
            buffer: Vec::new(),
            limit: 0,
            total: 0,
            keep_content: false,
        }
    }

    /// Records a chunk that is being forwarded downstream.
    pub fn observe(&mut self, chunk: &[u8]) {
        self.total += chunk.len() as u64;
        let room = self.limit.saturating_sub(self.buffer.len());
        if room > 0 {
            let take = chunk.len().min(room);
            self.buffer.extend_from_slice(&chunk[..take]);
        }
    }

    pub fn total_size(&self) -> u64 {
        self.total
    }

    pub fn captured_size(&self) -> u64 {
        self.buffer.len() as u64
    }

    pub fn is_truncated(&self) -> bool {
        self.total > self.captured_size()
    }

    /// Turns the capture into a snapshot, or `None` if no bytes were seen.
    pub fn finish(self) -> Option<BodySnapshot> {
        if self.total == 0 {
            return None;
        }
        let truncated = self.is_truncated();
        let content = if self.keep_content {
            decode_text(&self.buffer, truncated)
        } else {
            None
        };
        Some(BodySnapshot {
            content,
            captured_size: self.buffer.len() as u64,
            total_size: self.total,
        })
    }
}

/// Decodes captured bytes as UTF-8 text.
///
/// A truncated capture may end in the middle of a code point; that partial
/// sequence is dropped. Anything else that is not valid UTF-8 is treated as
/// binary and yields `None`.
fn decode_text(bytes: &[u8], truncated: bool) -> Option<String> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Some(text.to_owned()),
        Err(e) if truncated && e.error_len().is_none() => {
            let valid = &bytes[..e.valid_up_to()];
            std::str::from_utf8(valid).ok().map(str::to_owned)
        }
        Err(_) => None,
    }
}
