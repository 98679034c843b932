//! Persistence Gateway: the controller's single entry point to the event
//! store. One commit per batch, never retried.

use std::sync::Arc;

use bpd_db::EventStore;
use bpd_schemas::{FrontRearRow, MachineId, ReconciledRecord};
use tracing::{error, info};

use crate::ControllerError;

#[derive(Clone)]
pub struct PersistenceGateway {
    store: Arc<dyn EventStore>,
}

impl PersistenceGateway {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    pub fn accepts(&self, machine: &MachineId) -> bool {
        self.store.accepts(machine)
    }

    /// `true` when the whole batch is durable.
    pub async fn commit(&self, records: &[ReconciledRecord], machine: &MachineId) -> bool {
        self.commit_rows(records, machine).await.is_ok()
    }

    /// Commit and hand back the rows as written.
    pub async fn commit_rows(
        &self,
        records: &[ReconciledRecord],
        machine: &MachineId,
    ) -> Result<Vec<FrontRearRow>, ControllerError> {
        match self.store.commit_batch(machine, records).await {
            Ok(rows) => {
                info!(machine = %machine, rows = rows.len(), "data saved successfully");
                Ok(rows)
            }
            Err(e) => {
                error!(machine = %machine, records = records.len(), error = %format!("{e:#}"), "error saving reject data; batch rolled back");
                Err(ControllerError::Persistence(format!("{e:#}")))
            }
        }
    }
}
