//! Deduplicating reporter for per-record warnings.
//!
//! Large inputs tend to repeat the same problem thousands of times (a
//! malformed value in one annotation field, say). The reporter logs each
//! distinct message once, remembering the last few it has seen.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

/// Number of distinct recent messages remembered.
pub const DEFAULT_CAPACITY: usize = 10;

const REPEAT_SUFFIX: &str = ">> this error/warning may occur many times. reporting once here...";

#[derive(Debug)]
pub struct ErrorReporter {
    recent: RwLock<VecDeque<String>>,
    capacity: usize,
    logged: AtomicUsize,
    suppressed: AtomicUsize,
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ErrorReporter {
    pub fn new(capacity: usize) -> Self {
        Self {
            recent: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
            logged: AtomicUsize::new(0),
            suppressed: AtomicUsize::new(0),
        }
    }

    /// Log `message` unless it was reported recently.
    ///
    /// Returns true if the message was logged.
    pub fn report(&self, message: &str) -> bool {
        {
            let recent = self.recent.read().unwrap_or_else(PoisonError::into_inner);
            if recent.iter().any(|m| m == message) {
                self.suppressed.fetch_add(1, Ordering::Relaxed);
                return false;
            }
        }

        let mut recent = self.recent.write().unwrap_or_else(PoisonError::into_inner);
        // another thread may have logged it between the two locks
        if recent.iter().any(|m| m == message) {
            self.suppressed.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        if recent.len() == self.capacity {
            recent.pop_front();
        }
        recent.push_back(message.to_string());
        drop(recent);

        log::warn!("{} {}", message, REPEAT_SUFFIX);
        self.logged.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Messages logged so far.
    pub fn logged(&self) -> usize {
        self.logged.load(Ordering::Relaxed)
    }

    /// Messages swallowed as repeats.
    pub fn suppressed(&self) -> usize {
        self.suppressed.load(Ordering::Relaxed)
    }
}
