//! Controller status snapshots, published over a `watch` channel.

use bpd_schemas::MachineId;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    Idle,
    Starting,
    Monitoring,
    Stopped,
}

impl ControllerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControllerState::Idle => "idle",
            ControllerState::Starting => "starting",
            ControllerState::Monitoring => "monitoring",
            ControllerState::Stopped => "stopped",
        }
    }
}

/// Point-in-time view of one Device Controller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ControllerStatus {
    pub machine: MachineId,
    pub state: ControllerState,
    /// `None` until the counter has been seeded from the device.
    pub last_reject_count: Option<i64>,
    pub batches_committed: u64,
    pub batches_failed: u64,
    /// Diffs whose inspection read failed.
    pub batches_discarded: u64,
    pub records_committed: u64,
    pub last_commit_epoch_ms: Option<i64>,
    /// Lifecycle restarts after connection or monitoring failures.
    pub restarts: u64,
    pub last_error: Option<String>,
}

impl ControllerStatus {
    pub fn idle(machine: MachineId) -> Self {
        Self {
            machine,
            state: ControllerState::Idle,
            last_reject_count: None,
            batches_committed: 0,
            batches_failed: 0,
            batches_discarded: 0,
            records_committed: 0,
            last_commit_epoch_ms: None,
            restarts: 0,
            last_error: None,
        }
    }
}

/// Read-only view over every launched controller's status.
#[derive(Clone, Debug, Default)]
pub struct StatusBoard {
    receivers: Vec<watch::Receiver<ControllerStatus>>,
}

impl StatusBoard {
    pub fn new(receivers: Vec<watch::Receiver<ControllerStatus>>) -> Self {
        Self { receivers }
    }

    pub fn snapshot(&self) -> Vec<ControllerStatus> {
        self.receivers.iter().map(|rx| rx.borrow().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.receivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receivers.is_empty()
    }
}
