//! Latest-wins versioning for debounced estimator calls.
//!
//! The admin UI re-estimates on every accept-limit keystroke; only the most
//! recently issued request may apply its result. Superseded responses are
//! discarded silently, they are not errors.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct LatestWins {
    issued: AtomicU64,
    applied: AtomicU64,
}

impl LatestWins {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a new request token. Tokens are strictly increasing.
    pub fn begin(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Try to apply the response for `token`. Returns false when a newer
    /// response has already been applied (the caller drops the result).
    pub fn commit(&self, token: u64) -> bool {
        let mut current = self.applied.load(Ordering::Acquire);
        loop {
            if token <= current {
                return false;
            }
            match self.applied.compare_exchange_weak(
                current,
                token,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }
}
