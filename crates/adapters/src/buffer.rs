// SPDX-License-Identifier: MIT

//! Bounded ring buffers capturing the tail of a process's stdout/stderr.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Default capacity: the last ~4 KiB of a stream.
pub const DEFAULT_CAPACITY: usize = 4 * 1024;

/// A byte ring buffer that keeps only the most recent `capacity` bytes.
#[derive(Clone)]
pub struct RingBuffer {
    inner: Arc<Mutex<VecDeque<u8>>>,
    capacity: usize,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Append bytes, dropping the oldest bytes once over capacity.
    pub fn push(&self, bytes: &[u8]) {
        let mut buf = self.inner.lock();
        for &b in bytes {
            if buf.len() == self.capacity {
                buf.pop_front();
            }
            buf.push_back(b);
        }
    }

    /// Snapshot the buffered bytes as a lossy UTF-8 string.
    pub fn snapshot(&self) -> String {
        let buf = self.inner.lock();
        String::from_utf8_lossy(&buf.iter().copied().collect::<Vec<u8>>()).into_owned()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

/// Captures the last ~4 KiB of a process's stdout.
#[derive(Clone)]
pub struct StdoutBuffer(RingBuffer);

impl StdoutBuffer {
    pub fn new() -> Self {
        Self(RingBuffer::new(DEFAULT_CAPACITY))
    }

    pub fn push(&self, bytes: &[u8]) {
        self.0.push(bytes);
    }

    pub fn snapshot(&self) -> String {
        self.0.snapshot()
    }
}

impl Default for StdoutBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Captures the last ~4 KiB of a process's stderr.
#[derive(Clone)]
pub struct StderrBuffer(RingBuffer);

impl StderrBuffer {
    pub fn new() -> Self {
        Self(RingBuffer::new(DEFAULT_CAPACITY))
    }

    pub fn push(&self, bytes: &[u8]) {
        self.0.push(bytes);
    }

    pub fn snapshot(&self) -> String {
        self.0.snapshot()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for StderrBuffer {
    fn default() -> Self {
        Self::new()
    }
}
