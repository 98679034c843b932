//! bpd-reconcile
//!
//! Counter-change reconciliation, pure half.
//!
//! - [`ChangeDetector`] turns reject-counter notifications into diffs,
//!   treating any decrease as a device reset.
//! - [`ReadPlan`] selects the most recent `min(diff, L)` front/rear nodes.
//! - [`assemble_batch`] pairs the values read for a plan into
//!   [`ReconciledRecord`](bpd_schemas::ReconciledRecord)s.
//!
//! Deterministic, no IO. The caller performs the device read and supplies the
//! batch timestamp.

mod assemble;
mod detector;
mod window;

pub use assemble::{assemble_batch, assemble_records, AssembleError};
pub use detector::{ChangeDetector, Observation};
pub use window::{ReadPlan, Window};
