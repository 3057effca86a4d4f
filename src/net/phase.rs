//! The collective phase counter.
//!
//! A process-wide monotonically increasing `u64`, never zero. Every
//! collective claims the current value as its message tag; the bump is
//! gated by an all-ranks barrier so stale traffic from a finished collective
//! can never match the tag of a live one.

use std::sync::atomic::{AtomicU64, Ordering};

pub struct PhaseCounter(AtomicU64);

impl PhaseCounter {
    pub fn new() -> Self {
        Self(AtomicU64::new(1))
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    /// Bump after the barrier; returns the new phase.
    pub fn bump(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl Default for PhaseCounter {
    fn default() -> Self {
        Self::new()
    }
}
