//! Environment-variable discovery.
//!
//! Every `<PREFIX>_OPCUA_ENDPOINT` variable announces a machine whose id is
//! the text before the first `_`, lower-cased. Per machine (`<ID>` upper-case):
//!
//! | Variable                     | Meaning                                   |
//! |------------------------------|-------------------------------------------|
//! | `<ID>_OPCUA_ENDPOINT`        | server endpoint URL                       |
//! | `<ID>_OPCUA_NODEIDS_FRONT`   | comma separated front measurement nodes   |
//! | `<ID>_OPCUA_NODEIDS_REAR`    | comma separated rear measurement nodes    |
//! | `<ID>_OPCUA_NODEID_REJECT`   | reject counter node                       |
//! | `<ID>_DB_TABLE`              | optional events table override            |
//! | `<ID>_DB_IDENTITY_TABLE`     | optional identity table override          |
//!
//! `OPCUA_RETRY_DELAY` (ms) is shared by every machine.

use std::collections::{BTreeSet, HashMap};

use bpd_schemas::MachineId;

use crate::{
    ConfigError, Discovery, MachineProfile, MonitorParams, NodeIds, NodeRef, PersistTarget,
    RetryPolicy, SubscriptionParams,
};

pub const ENV_RETRY_DELAY: &str = "OPCUA_RETRY_DELAY";

const ENDPOINT_SUFFIX: &str = "_OPCUA_ENDPOINT";

/// Discover machines from the process environment.
pub fn discover_from_env() -> Discovery {
    discover_from_vars(std::env::vars())
}

/// Discover machines from an explicit variable set.
pub fn discover_from_vars<I, K, V>(vars: I) -> Discovery
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let vars: HashMap<String, String> = vars
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect();

    let retry = RetryPolicy {
        initial_delay_ms: vars
            .get(ENV_RETRY_DELAY)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .unwrap_or(RetryPolicy::DEFAULT_DELAY_MS),
    };

    let machines: BTreeSet<String> = vars
        .keys()
        .filter(|k| k.ends_with(ENDPOINT_SUFFIX))
        .filter_map(|k| k.split('_').next())
        .filter(|id| !id.is_empty())
        .map(|id| id.to_ascii_lowercase())
        .collect();

    let mut out = Discovery::default();
    for machine in machines {
        let outcome = profile_from_vars(&machine, &vars, &retry);
        out.push(&machine, outcome);
    }
    out.finish()
}

fn profile_from_vars(
    machine: &str,
    vars: &HashMap<String, String>,
    retry: &RetryPolicy,
) -> Result<MachineProfile, ConfigError> {
    let upper = machine.to_ascii_uppercase();
    let required = |suffix: &str| -> Result<String, ConfigError> {
        let key = format!("{upper}_{suffix}");
        match vars.get(&key) {
            Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
            _ => Err(ConfigError::MissingValue {
                machine: machine.to_string(),
                what: key,
            }),
        }
    };

    let name = MachineId::new(machine);
    let mut persist = PersistTarget::defaults_for(&name);
    if let Some(t) = vars.get(&format!("{upper}_DB_TABLE")) {
        persist.events_table = t.trim().to_string();
    }
    if let Some(t) = vars.get(&format!("{upper}_DB_IDENTITY_TABLE")) {
        persist.identity_table = t.trim().to_string();
    }

    let profile = MachineProfile {
        endpoint: required("OPCUA_ENDPOINT")?,
        node_ids: NodeIds {
            front: split_node_list(&required("OPCUA_NODEIDS_FRONT")?),
            rear: split_node_list(&required("OPCUA_NODEIDS_REAR")?),
            reject: NodeRef::new(required("OPCUA_NODEID_REJECT")?),
        },
        subscription: SubscriptionParams::default(),
        monitor: MonitorParams::default(),
        connection_retry: retry.clone(),
        persist,
        name,
    };
    profile.validate()?;
    Ok(profile)
}

fn split_node_list(raw: &str) -> Vec<NodeRef> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(NodeRef::new)
        .collect()
}
