use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bpd_config::{MachineProfile, PersistTarget};
use bpd_schemas::{FrontRearRow, MachineId, ProductionIdentity, ReconciledRecord};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;

use crate::checked_table;

// ---------------------------------------------------------------------------
// EventStore
// ---------------------------------------------------------------------------

/// Durable sink for reconciled batches.
///
/// `commit_batch` is all-or-nothing: either every record of the batch is
/// written, or none is and an error comes back. It is never retried by the
/// caller.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Whether this store has a target for `machine`.
    fn accepts(&self, machine: &MachineId) -> bool;

    /// Enrich `records` with the active production identity and insert them.
    /// Returns the rows as written.
    async fn commit_batch(
        &self,
        machine: &MachineId,
        records: &[ReconciledRecord],
    ) -> Result<Vec<FrontRearRow>>;
}

// ---------------------------------------------------------------------------
// Postgres
// ---------------------------------------------------------------------------

pub struct PgEventStore {
    pool: PgPool,
    targets: HashMap<MachineId, PersistTarget>,
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            targets: HashMap::new(),
        }
    }

    /// Register every profile's target. Unsafe identifiers are refused.
    pub fn from_profiles(pool: PgPool, profiles: &[MachineProfile]) -> Result<Self> {
        let mut store = Self::new(pool);
        for p in profiles {
            store.add_target(p.name.clone(), p.persist.clone())?;
        }
        Ok(store)
    }

    pub fn add_target(&mut self, machine: MachineId, target: PersistTarget) -> Result<()> {
        checked_table(&target.events_table)?;
        checked_table(&target.identity_table)?;
        self.targets.insert(machine, target);
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    fn accepts(&self, machine: &MachineId) -> bool {
        self.targets.contains_key(machine)
    }

    async fn commit_batch(
        &self,
        machine: &MachineId,
        records: &[ReconciledRecord],
    ) -> Result<Vec<FrontRearRow>> {
        let target = self
            .targets
            .get(machine)
            .ok_or_else(|| anyhow!("no persistence target for machine {machine}"))?;
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let events_table = checked_table(&target.events_table)?;
        let identity_table = checked_table(&target.identity_table)?;

        // Dropping `tx` on any early return rolls the batch back.
        let mut tx = self.pool.begin().await.context("begin failed")?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL READ COMMITTED")
            .execute(&mut *tx)
            .await
            .context("set isolation level failed")?;

        let identity = sqlx::query_as::<_, (Option<String>, Option<String>)>(&format!(
            r#"SELECT lotno, prod_order FROM {identity_table} WHERE "isActive" = 'ACTIVE' ORDER BY id DESC LIMIT 1"#
        ))
        .fetch_optional(&mut *tx)
        .await
        .with_context(|| format!("active identity lookup failed on {identity_table}"))?
        .map(|(lot_number, production_order)| ProductionIdentity {
            lot_number,
            production_order,
        });

        let rows: Vec<FrontRearRow> = records
            .iter()
            .map(|r| FrontRearRow::from_record(r, identity.as_ref()))
            .collect();

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "INSERT INTO {events_table} (epochtime, lotno, pro, counter, front, rear, delta) "
        ));
        qb.push_values(rows.iter(), |mut b, row| {
            b.push_bind(row.epochtime)
                .push_bind(row.lotno.clone())
                .push_bind(row.pro.clone())
                .push_bind(row.counter)
                .push_bind(row.front)
                .push_bind(row.rear)
                .push_bind(row.delta);
        });
        let inserted = qb
            .build()
            .execute(&mut *tx)
            .await
            .with_context(|| format!("bulk insert into {events_table} failed"))?
            .rows_affected();

        if inserted != rows.len() as u64 {
            return Err(anyhow!(
                "bulk insert into {events_table} wrote {inserted} of {} rows",
                rows.len()
            ));
        }

        tx.commit().await.context("commit failed")?;
        debug!(machine = %machine, rows = rows.len(), "batch committed");
        Ok(rows)
    }
}
