//! Value types shared by every bpd crate.
//!
//! Nothing here performs IO. Records flow
//! `ReconciledRecord` (produced per diff batch) -> `FrontRearRow`
//! (enriched with the active production identity at write time).

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// MachineId
// ---------------------------------------------------------------------------

/// Lower-case machine discriminator (e.g. `"oci1"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MachineId(String);

impl MachineId {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MachineId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// ---------------------------------------------------------------------------
// ReconciledRecord
// ---------------------------------------------------------------------------

/// One reject paired with its front/rear measurements.
///
/// Every record of a batch shares the same `epoch_millis`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciledRecord {
    pub epoch_millis: i64,
    /// Reject-counter label, `>= 1`.
    pub counter: i64,
    pub front: f64,
    pub rear: f64,
    /// `|front - rear|`.
    pub delta: f64,
}

// ---------------------------------------------------------------------------
// ProductionIdentity
// ---------------------------------------------------------------------------

/// Currently active lot / production order, owned by an external table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProductionIdentity {
    pub lot_number: Option<String>,
    pub production_order: Option<String>,
}

// ---------------------------------------------------------------------------
// FrontRearRow
// ---------------------------------------------------------------------------

/// Durable row layout of a per-machine front/rear table.
///
/// Field names follow the table columns. `id`, `created_at` and
/// `updated_at` are managed by the table itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontRearRow {
    pub epochtime: i64,
    pub lotno: Option<String>,
    pub pro: Option<String>,
    pub counter: i64,
    pub front: f64,
    pub rear: f64,
    pub delta: f64,
}

impl FrontRearRow {
    pub fn from_record(record: &ReconciledRecord, identity: Option<&ProductionIdentity>) -> Self {
        Self {
            epochtime: record.epoch_millis,
            lotno: identity.and_then(|i| i.lot_number.clone()),
            pro: identity.and_then(|i| i.production_order.clone()),
            counter: record.counter,
            front: record.front,
            rear: record.rear,
            delta: record.delta,
        }
    }
}
