//! bpd-config
//!
//! Machine profile discovery. Two sources are supported:
//! - environment variables (`<ID>_OPCUA_ENDPOINT` and friends), the way the
//!   plant deployments have always been configured;
//! - a YAML document listing full profiles.
//!
//! A machine whose settings are incomplete or invalid is reported in
//! [`Discovery::rejected`] and never prevents the other machines from loading.

mod discover;
mod profile;

use std::fs;

use bpd_schemas::MachineId;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub use discover::{discover_from_env, discover_from_vars, ENV_RETRY_DELAY};
pub use profile::{
    is_valid_table_identifier, MachineProfile, MonitorParams, NodeIds, NodeRef, PersistTarget,
    RetryPolicy, SubscriptionParams,
};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("machine name is empty")]
    EmptyMachineName,
    #[error("[{machine}] missing {what}")]
    MissingValue { machine: String, what: String },
    #[error("[{machine}] {side} node list is empty")]
    EmptyNodeList { machine: String, side: &'static str },
    #[error("[{machine}] front/rear windows differ: front={front} rear={rear}")]
    WindowMismatch {
        machine: String,
        front: usize,
        rear: usize,
    },
    #[error("[{machine}] connection retry delay must be greater than zero")]
    ZeroRetryDelay { machine: String },
    #[error("[{machine}] invalid table identifier: {table:?}")]
    InvalidTable { machine: String, table: String },
    #[error("[{machine}] configured more than once")]
    Duplicate { machine: String },
    #[error("config file error: {0}")]
    File(String),
}

// ---------------------------------------------------------------------------
// Discovery result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RejectedMachine {
    pub machine: String,
    pub error: ConfigError,
}

/// Outcome of loading machine profiles from any source.
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    /// Valid profiles, sorted by machine name.
    pub profiles: Vec<MachineProfile>,
    pub rejected: Vec<RejectedMachine>,
}

impl Discovery {
    pub(crate) fn push(&mut self, machine: &str, outcome: Result<MachineProfile, ConfigError>) {
        match outcome {
            Ok(p) => self.profiles.push(p),
            Err(error) => self.rejected.push(RejectedMachine {
                machine: machine.to_string(),
                error,
            }),
        }
    }

    pub(crate) fn finish(mut self) -> Self {
        self.profiles.sort_by(|a, b| a.name.cmp(&b.name));
        self
    }

    pub fn machine_names(&self) -> Vec<String> {
        self.profiles.iter().map(|p| p.name.to_string()).collect()
    }

    /// Stable hash of the accepted profiles.
    pub fn config_hash(&self) -> String {
        config_hash(&self.profiles)
    }
}

/// SHA-256 hex of the canonical JSON of `profiles` (sorted by name).
pub fn config_hash(profiles: &[MachineProfile]) -> String {
    let mut sorted: Vec<&MachineProfile> = profiles.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));
    // Serialising plain structs cannot fail.
    let canonical = serde_json::to_string(&sorted).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

// ---------------------------------------------------------------------------
// YAML source
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Serialize)]
struct ProfilesDoc {
    #[serde(default)]
    machines: Vec<ProfileDoc>,
}

#[derive(Debug, Deserialize, Serialize)]
struct ProfileDoc {
    name: String,
    endpoint: String,
    node_ids: NodeIds,
    #[serde(default)]
    subscription: SubscriptionParams,
    #[serde(default)]
    monitor: MonitorParams,
    #[serde(default)]
    connection_retry: RetryPolicy,
    #[serde(default)]
    persist: Option<PersistTarget>,
}

impl ProfileDoc {
    fn into_profile(self) -> MachineProfile {
        let name = MachineId::new(&self.name);
        MachineProfile {
            persist: self
                .persist
                .unwrap_or_else(|| PersistTarget::defaults_for(&name)),
            name,
            endpoint: self.endpoint,
            node_ids: self.node_ids,
            subscription: self.subscription,
            monitor: self.monitor,
            connection_retry: self.connection_retry,
        }
    }
}

pub fn load_profiles_yaml(path: &str) -> Result<Discovery, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| ConfigError::File(format!("failed to read {path}: {e}")))?;
    load_profiles_from_yaml_str(&raw)
}

pub fn load_profiles_from_yaml_str(raw: &str) -> Result<Discovery, ConfigError> {
    let doc: ProfilesDoc =
        serde_yaml::from_str(raw).map_err(|e| ConfigError::File(format!("invalid yaml: {e}")))?;

    let mut out = Discovery::default();
    let mut seen = std::collections::BTreeSet::new();
    for entry in doc.machines {
        let profile = entry.into_profile();
        let machine = profile.name.to_string();
        if !seen.insert(machine.clone()) {
            out.push(&machine, Err(ConfigError::Duplicate { machine: machine.clone() }));
            continue;
        }
        let outcome = profile.validate().map(|_| profile);
        out.push(&machine, outcome);
    }
    Ok(out.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
machines:
  - name: OCI2
    endpoint: opc.tcp://10.1.1.2:4840
    node_ids:
      front: ["ns=2;s=F0", "ns=2;s=F1"]
      rear: ["ns=2;s=R0", "ns=2;s=R1"]
      reject: "ns=2;s=Reject"
    connection_retry:
      initial_delay_ms: 2000
  - name: oci1
    endpoint: opc.tcp://10.1.1.1:4840
    node_ids:
      front: ["ns=2;s=F0"]
      rear: ["ns=2;s=R0"]
      reject: "ns=2;s=Reject"
    persist:
      events_table: line1.front_rear
      identity_table: line1.identity
"#;

    #[test]
    fn yaml_profiles_load_sorted_with_defaults() {
        let d = load_profiles_from_yaml_str(YAML).unwrap();
        assert!(d.rejected.is_empty());
        assert_eq!(d.machine_names(), vec!["oci1", "oci2"]);

        let oci2 = &d.profiles[1];
        assert_eq!(oci2.connection_retry.initial_delay_ms, 2000);
        assert_eq!(oci2.subscription, SubscriptionParams::default());
        assert_eq!(oci2.persist.events_table, "front_rear_bpd_oci2");

        let oci1 = &d.profiles[0];
        assert_eq!(oci1.persist.events_table, "line1.front_rear");
    }

    #[test]
    fn yaml_duplicate_machine_is_rejected_once() {
        let doc = format!("{YAML}\n  - name: oci1\n    endpoint: x\n    node_ids: {{front: [a], rear: [b], reject: c}}\n");
        let d = load_profiles_from_yaml_str(&doc).unwrap();
        assert_eq!(d.profiles.len(), 2);
        assert_eq!(d.rejected.len(), 1);
        assert!(matches!(d.rejected[0].error, ConfigError::Duplicate { .. }));
    }

    #[test]
    fn yaml_zero_retry_delay_is_rejected() {
        let doc = YAML.replace("initial_delay_ms: 2000", "initial_delay_ms: 0");
        let d = load_profiles_from_yaml_str(&doc).unwrap();
        assert_eq!(d.machine_names(), vec!["oci1"]);
        assert_eq!(d.rejected.len(), 1);
        assert_eq!(d.rejected[0].machine, "oci2");
        assert!(matches!(d.rejected[0].error, ConfigError::ZeroRetryDelay { .. }));
    }

    #[test]
    fn invalid_yaml_is_a_file_error() {
        let err = load_profiles_from_yaml_str("machines: [").unwrap_err();
        assert!(matches!(err, ConfigError::File(_)));
    }

    #[test]
    fn config_hash_is_order_independent_and_sensitive() {
        let d = load_profiles_from_yaml_str(YAML).unwrap();
        let mut reversed = d.profiles.clone();
        reversed.reverse();
        assert_eq!(config_hash(&d.profiles), config_hash(&reversed));
        assert_eq!(d.config_hash().len(), 64);

        let mut changed = d.profiles.clone();
        changed[0].connection_retry.initial_delay_ms += 1;
        assert_ne!(config_hash(&d.profiles), config_hash(&changed));
    }
}
