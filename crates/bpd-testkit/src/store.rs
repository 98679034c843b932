use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use bpd_db::EventStore;
use bpd_schemas::{FrontRearRow, MachineId, ProductionIdentity, ReconciledRecord};

#[derive(Default)]
struct StoreState {
    identity: Option<ProductionIdentity>,
    rows: HashMap<MachineId, Vec<FrontRearRow>>,
    fail_next: usize,
    attempts: usize,
}

/// In-memory [`EventStore`] with the same all-or-nothing contract as the
/// Postgres one, plus failure injection.
pub struct MemoryEventStore {
    machines: HashSet<MachineId>,
    state: Mutex<StoreState>,
}

impl MemoryEventStore {
    pub fn new<I, M>(machines: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<MachineId>,
    {
        Self {
            machines: machines.into_iter().map(Into::into).collect(),
            state: Mutex::new(StoreState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_identity(&self, identity: Option<ProductionIdentity>) {
        self.lock().identity = identity;
    }

    /// Make the next `n` commits fail.
    pub fn fail_next_commits(&self, n: usize) {
        self.lock().fail_next = n;
    }

    pub fn rows(&self, machine: &MachineId) -> Vec<FrontRearRow> {
        self.lock().rows.get(machine).cloned().unwrap_or_default()
    }

    pub fn counters(&self, machine: &MachineId) -> Vec<i64> {
        self.rows(machine).iter().map(|r| r.counter).collect()
    }

    /// Commits attempted, successful or not.
    pub fn attempts(&self) -> usize {
        self.lock().attempts
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    fn accepts(&self, machine: &MachineId) -> bool {
        self.machines.contains(machine)
    }

    async fn commit_batch(
        &self,
        machine: &MachineId,
        records: &[ReconciledRecord],
    ) -> anyhow::Result<Vec<FrontRearRow>> {
        if !self.accepts(machine) {
            anyhow::bail!("no persistence target for machine {machine}");
        }
        let mut st = self.lock();
        st.attempts += 1;
        if st.fail_next > 0 {
            st.fail_next -= 1;
            anyhow::bail!("scripted commit failure; transaction rolled back");
        }
        let rows: Vec<FrontRearRow> = records
            .iter()
            .map(|r| FrontRearRow::from_record(r, st.identity.as_ref()))
            .collect();
        st.rows
            .entry(machine.clone())
            .or_default()
            .extend(rows.iter().cloned());
        Ok(rows)
    }
}
