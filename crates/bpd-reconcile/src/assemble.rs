//! Record assembly for one diff batch.
//!
//! # Invariants
//!
//! - `front[i]` pairs with `rear[i]`; `delta[i] == |front[i] - rear[i]|`.
//! - Counter labels form a strictly increasing run ending at the counter value
//!   after the notification: `counter[i] = counter_after - diff + i + 1`.
//! - One `epoch_millis` for the whole batch.
//! - All-or-nothing: any malformed input yields an error and no records.

use bpd_schemas::ReconciledRecord;

use crate::Window;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AssembleError {
    #[error("expected {expected} value(s), got {got}")]
    ValueCount { expected: usize, got: usize },
    #[error("front/rear length mismatch: front={front} rear={rear}")]
    LengthMismatch { front: usize, rear: usize },
    #[error("non-finite measurement at index {index}")]
    NonFinite { index: usize },
    #[error("counter {counter_after} cannot carry a diff of {diff}")]
    CounterUnderflow { counter_after: i64, diff: i64 },
}

/// Build records from values read for `window`: the first `taken` values are
/// front measurements, the next `taken` are rear measurements.
pub fn assemble_batch(
    window: &Window,
    values: &[f64],
    counter_after: i64,
    epoch_millis: i64,
) -> Result<Vec<ReconciledRecord>, AssembleError> {
    let expected = window.taken * 2;
    if values.len() != expected {
        return Err(AssembleError::ValueCount {
            expected,
            got: values.len(),
        });
    }
    let (front, rear) = values.split_at(window.taken);
    assemble_records(front, rear, window.diff, counter_after, epoch_millis)
}

/// Pair `front` with `rear` and label each pair with its reject counter.
pub fn assemble_records(
    front: &[f64],
    rear: &[f64],
    diff: i64,
    counter_after: i64,
    epoch_millis: i64,
) -> Result<Vec<ReconciledRecord>, AssembleError> {
    if front.len() != rear.len() {
        return Err(AssembleError::LengthMismatch {
            front: front.len(),
            rear: rear.len(),
        });
    }
    if counter_after - diff < 0 {
        return Err(AssembleError::CounterUnderflow {
            counter_after,
            diff,
        });
    }

    let first = counter_after - diff + 1;
    front
        .iter()
        .zip(rear)
        .enumerate()
        .map(|(i, (&f, &r))| {
            if !f.is_finite() || !r.is_finite() {
                return Err(AssembleError::NonFinite { index: i });
            }
            Ok(ReconciledRecord {
                epoch_millis,
                counter: first + i as i64,
                front: f,
                rear: r,
                delta: (f - r).abs(),
            })
        })
        .collect()
}
