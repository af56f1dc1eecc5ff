//! Bounded capture of the external process's stderr.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// Maximum number of stderr bytes retained. Older bytes are evicted first.
pub const DIAGNOSTIC_CAPACITY: usize = 4096;

/// Most-recent-N byte ring shared between the drain thread and readers.
///
/// Cloning yields another handle to the same buffer.
#[derive(Debug, Clone)]
pub struct DiagnosticBuffer {
    inner: Arc<Mutex<VecDeque<u8>>>,
    capacity: usize,
}

impl DiagnosticBuffer {
    pub fn new() -> Self {
        Self::with_capacity(DIAGNOSTIC_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<u8>> {
        // A panicking writer cannot leave the ring in a state worse than "some bytes appended".
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append bytes, trimming from the front so the ceiling is never exceeded.
    pub fn append(&self, bytes: &[u8]) {
        let tail = if bytes.len() > self.capacity {
            &bytes[bytes.len() - self.capacity..]
        } else {
            bytes
        };

        let mut ring = self.lock();
        let overflow = (ring.len() + tail.len()).saturating_sub(self.capacity);
        ring.drain(..overflow);
        ring.extend(tail.iter().copied());
    }

    /// Copy of the retained bytes, oldest first.
    pub fn snapshot(&self) -> Vec<u8> {
        let ring = self.lock();
        ring.iter().copied().collect()
    }

    /// Retained bytes decoded as UTF-8, replacing invalid sequences.
    pub fn snapshot_string(&self) -> String {
        String::from_utf8_lossy(&self.snapshot()).into_owned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for DiagnosticBuffer {
    fn default() -> Self {
        Self::new()
    }
}
