use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Mutex-guarded buffer of formatted lines awaiting delivery.
///
/// Appends happen on whichever thread emitted the log record; the network
/// task takes the whole buffer in one atomic swap. The lock is a
/// `std::sync::Mutex` so emitters need no async context, and it is never
/// held across I/O.
///
/// The buffer is bounded: once full, the oldest line is evicted so a
/// stalled or absent consumer still tails the newest output.
pub struct MessageQueue {
    lines: Mutex<VecDeque<String>>,
    capacity: usize,
    dropped: AtomicU64,
}

impl MessageQueue {
    /// `capacity` is clamped to at least one line.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    /// Append one line, evicting the oldest when at capacity.
    pub fn push(&self, line: String) {
        let mut lines = self.lock();
        if lines.len() == self.capacity {
            lines.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        lines.push_back(line);
    }

    /// Take every queued line at once, leaving the queue empty.
    pub fn drain(&self) -> Vec<String> {
        let mut lines = self.lock();
        lines.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Lines evicted by the capacity bound since construction.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    // A panicked emitter poisons the mutex but leaves the deque intact;
    // diagnostics must keep flowing for everyone else.
    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<String>> {
        self.lines.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
