//! Machine profile and its tuning parameters.
//!
//! A profile is immutable once loaded; the owning Device Controller keeps it
//! for its whole lifetime.

use std::fmt;
use std::time::Duration;

use bpd_schemas::MachineId;
use serde::{Deserialize, Serialize};

use crate::ConfigError;

// ---------------------------------------------------------------------------
// NodeRef
// ---------------------------------------------------------------------------

/// Addressable data point on a device, in the server's textual node-id
/// syntax (e.g. `ns=2;s=Line1.Reject`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeRef(String);

impl NodeRef {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeRef {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// The three node groups a machine exposes.
///
/// `front[i]` and `rear[i]` describe the same inspected unit; index 0 is the
/// most recent measurement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeIds {
    pub front: Vec<NodeRef>,
    pub rear: Vec<NodeRef>,
    pub reject: NodeRef,
}

impl NodeIds {
    /// Number of front/rear pairs the device exposes.
    pub fn window_len(&self) -> usize {
        self.front.len().min(self.rear.len())
    }
}

// ---------------------------------------------------------------------------
// Tuning
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionParams {
    pub publishing_interval_ms: u64,
    pub lifetime_count: u32,
    pub max_keep_alive_count: u32,
    pub publishing_enabled: bool,
}

impl Default for SubscriptionParams {
    fn default() -> Self {
        Self {
            publishing_interval_ms: 1000,
            lifetime_count: 100,
            max_keep_alive_count: 10,
            publishing_enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorParams {
    pub sampling_interval_ms: u64,
    pub queue_size: u32,
    pub discard_oldest: bool,
}

impl Default for MonitorParams {
    fn default() -> Self {
        Self {
            sampling_interval_ms: 1000,
            queue_size: 10,
            discard_oldest: true,
        }
    }
}

/// Fixed-delay restart policy for the controller's start loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub initial_delay_ms: u64,
}

impl RetryPolicy {
    pub const DEFAULT_DELAY_MS: u64 = 5000;

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: Self::DEFAULT_DELAY_MS,
        }
    }
}

/// Where a machine's reconciled events land.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistTarget {
    /// Per-machine front/rear table, e.g. `front_rear_bpd_oci1`.
    pub events_table: String,
    /// Externally owned production-identity table.
    pub identity_table: String,
}

impl PersistTarget {
    pub fn defaults_for(machine: &MachineId) -> Self {
        Self {
            events_table: format!("front_rear_bpd_{machine}"),
            identity_table: format!("aio_iot_{machine}.mst_prodidentity"),
        }
    }
}

// ---------------------------------------------------------------------------
// MachineProfile
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineProfile {
    pub name: MachineId,
    pub endpoint: String,
    pub node_ids: NodeIds,
    pub subscription: SubscriptionParams,
    pub monitor: MonitorParams,
    pub connection_retry: RetryPolicy,
    pub persist: PersistTarget,
}

impl MachineProfile {
    /// Structural checks shared by every configuration source.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let machine = self.name.to_string();
        if self.name.as_str().is_empty() {
            return Err(ConfigError::EmptyMachineName);
        }
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::MissingValue {
                machine,
                what: "endpoint".to_string(),
            });
        }
        if self.node_ids.reject.as_str().trim().is_empty() {
            return Err(ConfigError::MissingValue {
                machine,
                what: "reject node id".to_string(),
            });
        }
        if self.node_ids.front.is_empty() {
            return Err(ConfigError::EmptyNodeList {
                machine,
                side: "front",
            });
        }
        if self.node_ids.rear.is_empty() {
            return Err(ConfigError::EmptyNodeList {
                machine,
                side: "rear",
            });
        }
        if self.node_ids.front.len() != self.node_ids.rear.len() {
            return Err(ConfigError::WindowMismatch {
                machine,
                front: self.node_ids.front.len(),
                rear: self.node_ids.rear.len(),
            });
        }
        if self.connection_retry.initial_delay_ms == 0 {
            return Err(ConfigError::ZeroRetryDelay { machine });
        }
        for table in [&self.persist.events_table, &self.persist.identity_table] {
            if !is_valid_table_identifier(table) {
                return Err(ConfigError::InvalidTable {
                    machine,
                    table: table.clone(),
                });
            }
        }
        Ok(())
    }
}

/// `name` or `schema.name`, each part `[A-Za-z_][A-Za-z0-9_]*`.
///
/// Table names are interpolated into SQL, so anything else is refused.
pub fn is_valid_table_identifier(raw: &str) -> bool {
    let parts: Vec<&str> = raw.split('.').collect();
    if parts.is_empty() || parts.len() > 2 {
        return false;
    }
    parts.iter().all(|p| {
        let mut chars = p.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
            _ => return false,
        }
        chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}
