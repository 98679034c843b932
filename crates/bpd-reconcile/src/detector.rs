//! Change Detector.
//!
//! # Invariants
//!
//! - **Seeded, not inherited**: a detector is created from a fresh read of the
//!   counter node after every successful connect.
//! - **Reset policy**: `current < last` means the device reset; the diff is
//!   `current` itself. The history lost in between is not recoverable.
//! - **Always advances**: after `observe`, `last_reject_count() == current`
//!   whatever the diff was.
//! - **Non-negative diff**: `diff >= 0` for every observation.

// ---------------------------------------------------------------------------
// Observation
// ---------------------------------------------------------------------------

/// Outcome of one counter notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Observation {
    /// Counter value before this notification.
    pub previous: i64,
    /// Counter value carried by this notification; now the stored value.
    pub current: i64,
    pub diff: i64,
    /// `true` when the counter went backwards.
    pub reset: bool,
}

impl Observation {
    /// Whether the notification should trigger a reconciliation.
    pub fn has_diff(&self) -> bool {
        self.diff > 0
    }
}

// ---------------------------------------------------------------------------
// ChangeDetector
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeDetector {
    last_reject_count: i64,
}

impl ChangeDetector {
    /// Seed from the device's current counter. Negative seeds become 0.
    pub fn seeded(initial: i64) -> Self {
        Self {
            last_reject_count: initial.max(0),
        }
    }

    pub fn last_reject_count(&self) -> i64 {
        self.last_reject_count
    }

    /// Apply one notification.
    ///
    /// `current` must already be a valid counter value (`>= 0`); the session
    /// layer filters anything else out before it reaches here.
    pub fn observe(&mut self, current: i64) -> Observation {
        let current = current.max(0);
        let previous = self.last_reject_count;
        let reset = current < previous;
        let diff = if reset { current } else { current - previous };
        self.last_reject_count = current;
        Observation {
            previous,
            current,
            diff,
            reset,
        }
    }
}
