use std::time::Instant;

/// A `(bytes, timestamp, valid_hint)` triple as delivered by the transport,
/// possibly filtered by the stability monitor.
#[derive(Debug, Clone)]
pub struct Frame {
    pub bytes: Vec<u8>,
    /// Monotonic reception time, used for interval-time analysis.
    pub timestamp: Instant,
    pub valid_hint: bool,
}

impl Frame {
    pub fn new(bytes: Vec<u8>, valid_hint: bool) -> Self {
        Self {
            bytes,
            timestamp: Instant::now(),
            valid_hint,
        }
    }

    pub fn as_str_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }
}
