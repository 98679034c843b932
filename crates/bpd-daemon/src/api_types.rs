//! Response types for the status API. No business logic lives here.

use bpd_runtime::{ControllerState, ControllerStatus};
use bpd_schemas::MachineId;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
    pub version: String,
}

// ---------------------------------------------------------------------------
// /v1/machines
// ---------------------------------------------------------------------------

/// Public projection of a controller's status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineStatusResponse {
    pub machine: MachineId,
    pub state: ControllerState,
    pub last_reject_count: Option<i64>,
    pub batches_committed: u64,
    pub batches_failed: u64,
    pub records_committed: u64,
    pub last_commit_epoch_ms: Option<i64>,
}

impl From<ControllerStatus> for MachineStatusResponse {
    fn from(s: ControllerStatus) -> Self {
        Self {
            machine: s.machine,
            state: s.state,
            last_reject_count: s.last_reject_count,
            batches_committed: s.batches_committed,
            batches_failed: s.batches_failed,
            records_committed: s.records_committed,
            last_commit_epoch_ms: s.last_commit_epoch_ms,
        }
    }
}
