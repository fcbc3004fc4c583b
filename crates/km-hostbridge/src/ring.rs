//! A bounded byte ring buffer shared between a reader/writer thread
//! and the thread driving `RomPort` transactions — `spec.md` §5's
//! "two shared byte ring buffers between [the reader/writer threads]
//! and the serial device."

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

pub struct SyncRingBuffer {
    capacity: usize,
    state: Mutex<VecDeque<u8>>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl SyncRingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(VecDeque::with_capacity(capacity)),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    /// Blocks until there is room for the byte.
    pub fn push(&self, byte: u8) {
        let mut buf = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        while buf.len() >= self.capacity {
            buf = self.not_full.wait(buf).unwrap_or_else(std::sync::PoisonError::into_inner);
        }
        buf.push_back(byte);
        self.not_empty.notify_one();
    }

    pub fn push_slice(&self, bytes: &[u8]) {
        for &b in bytes {
            self.push(b);
        }
    }

    /// Blocks up to `timeout` for a byte; `None` on timeout.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<u8> {
        let mut buf = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        loop {
            if let Some(byte) = buf.pop_front() {
                self.not_full.notify_one();
                return Some(byte);
            }
            let (guard, result) = self
                .not_empty
                .wait_timeout(buf, timeout)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            buf = guard;
            if result.timed_out() {
                return None;
            }
        }
    }

    /// Non-blocking pop, used by the writer thread to coalesce
    /// whatever is already queued into one write.
    pub fn try_pop(&self) -> Option<u8> {
        let mut buf = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let byte = buf.pop_front();
        if byte.is_some() {
            self.not_full.notify_one();
        }
        byte
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_then_pop_is_fifo() {
        let ring = SyncRingBuffer::new(4);
        ring.push_slice(&[1, 2, 3]);
        assert_eq!(ring.pop_timeout(Duration::from_millis(10)), Some(1));
        assert_eq!(ring.pop_timeout(Duration::from_millis(10)), Some(2));
        assert_eq!(ring.try_pop(), Some(3));
        assert_eq!(ring.try_pop(), None);
    }

    #[test]
    fn pop_timeout_on_empty_buffer_times_out() {
        let ring = SyncRingBuffer::new(4);
        assert_eq!(ring.pop_timeout(Duration::from_millis(5)), None);
    }

    #[test]
    fn len_tracks_pending_bytes() {
        let ring = SyncRingBuffer::new(8);
        ring.push_slice(&[9, 9, 9]);
        assert_eq!(ring.len(), 3);
        ring.try_pop();
        assert_eq!(ring.len(), 2);
    }
}
