//! bpd-testkit
//!
//! Fakes for driving Device Controllers without a PLC or a database:
//! - [`ScriptedDevice`]: values, faults and pushed notifications;
//! - [`MemoryEventStore`]: all-or-nothing commits with failure injection;
//! - [`RecordingHook`]: captures what would be dumped to the console.
//!
//! Cross-crate scenarios live under `tests/`.

mod device;
mod store;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bpd_config::{
    MachineProfile, MonitorParams, NodeIds, NodeRef, PersistTarget, RetryPolicy,
    SubscriptionParams,
};
use bpd_runtime::{ControllerStatus, RecordHook};
use bpd_schemas::{FrontRearRow, MachineId};
use tokio::sync::watch;

pub use device::{ScriptedDevice, ScriptedTransport};
pub use store::MemoryEventStore;

/// Profile with a `window_len`-deep front/rear window and a 5 s retry delay.
pub fn profile(name: &str, window_len: usize) -> MachineProfile {
    let name = MachineId::new(name);
    let node = |kind: &str, i: usize| NodeRef::new(format!("ns=2;s={name}.{kind}[{i}]"));
    MachineProfile {
        persist: PersistTarget::defaults_for(&name),
        endpoint: format!("opc.tcp://{name}.plant.local:4840"),
        node_ids: NodeIds {
            front: (0..window_len).map(|i| node("Front", i)).collect(),
            rear: (0..window_len).map(|i| node("Rear", i)).collect(),
            reject: NodeRef::new(format!("ns=2;s={name}.RejectCount")),
        },
        subscription: SubscriptionParams::default(),
        monitor: MonitorParams::default(),
        connection_retry: RetryPolicy::default(),
        name,
    }
}

/// Wait until `pred` holds for the published status.
///
/// Gives up after ten minutes of (possibly paused) Tokio time.
pub async fn wait_for_status<F>(
    rx: &mut watch::Receiver<ControllerStatus>,
    mut pred: F,
) -> anyhow::Result<ControllerStatus>
where
    F: FnMut(&ControllerStatus) -> bool,
{
    let wait = async {
        loop {
            {
                let current = rx.borrow_and_update();
                if pred(&*current) {
                    return Ok((*current).clone());
                }
            }
            if rx.changed().await.is_err() {
                anyhow::bail!("controller status channel closed");
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(600), wait)
        .await
        .map_err(|_| anyhow::anyhow!("timed out waiting for controller status"))?
}

/// Captures every committed batch.
#[derive(Default)]
pub struct RecordingHook {
    batches: Mutex<Vec<(MachineId, Vec<FrontRearRow>)>>,
}

impl RecordingHook {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn batches(&self) -> Vec<(MachineId, Vec<FrontRearRow>)> {
        self.batches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl RecordHook for RecordingHook {
    fn on_committed(&self, machine: &MachineId, rows: &[FrontRearRow]) {
        self.batches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((machine.clone(), rows.to_vec()));
    }
}
