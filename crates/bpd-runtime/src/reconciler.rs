//! Diff Reconciler, IO half: one batched read per diff.
//!
//! Any failure discards the whole batch. Nothing is retried and nothing is
//! backfilled from later notifications.

use std::sync::Arc;

use bpd_config::NodeIds;
use bpd_opcua::SessionManager;
use bpd_reconcile::{assemble_batch, ReadPlan};
use bpd_schemas::{MachineId, ReconciledRecord};
use tracing::{error, warn};

use crate::ControllerError;

/// Wall-clock source in epoch milliseconds.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(|| chrono::Utc::now().timestamp_millis())
}

pub struct DiffReconciler {
    machine: MachineId,
    node_ids: NodeIds,
    clock: Clock,
}

impl DiffReconciler {
    pub fn new(machine: MachineId, node_ids: NodeIds) -> Self {
        Self {
            machine,
            node_ids,
            clock: system_clock(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Records for `diff` new rejects, or an empty batch on any failure.
    pub async fn reconcile(
        &self,
        session: &SessionManager,
        diff: i64,
        counter_after: i64,
    ) -> Vec<ReconciledRecord> {
        match self.try_reconcile(session, diff, counter_after).await {
            Ok(records) => records,
            Err(e) => {
                error!(machine = %self.machine, diff, error = %e, "error reading front/rear nodes; batch discarded");
                Vec::new()
            }
        }
    }

    pub async fn try_reconcile(
        &self,
        session: &SessionManager,
        diff: i64,
        counter_after: i64,
    ) -> Result<Vec<ReconciledRecord>, ControllerError> {
        let plan = ReadPlan::for_diff(diff, &self.node_ids);
        if plan.window.is_clamped() {
            warn!(
                machine = %self.machine,
                diff,
                window = plan.window.window_len,
                dropped = plan.window.dropped(),
                "diff exceeds measurement window; clamping"
            );
        }
        if plan.is_empty() {
            return Ok(Vec::new());
        }

        let values = session
            .read(&plan.nodes)
            .await
            .map_err(|e| ControllerError::Read(e.to_string()))?;
        if values.len() != plan.expected_values() {
            return Err(ControllerError::Read(format!(
                "expected {} value(s), got {}",
                plan.expected_values(),
                values.len()
            )));
        }

        let numbers = values
            .iter()
            .zip(&plan.nodes)
            .map(|(v, node)| {
                v.as_f64()
                    .ok_or_else(|| ControllerError::Read(format!("non-numeric {v:?} at {node}")))
            })
            .collect::<Result<Vec<f64>, _>>()?;

        let epoch_millis = (self.clock)();
        assemble_batch(&plan.window, &numbers, counter_after, epoch_millis)
            .map_err(|e| ControllerError::Read(e.to_string()))
    }
}
