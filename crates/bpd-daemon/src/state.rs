//! Shared state for the status API handlers.

use bpd_runtime::StatusBoard;
use serde::{Deserialize, Serialize};

/// Static build metadata included in health responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

impl Default for BuildInfo {
    fn default() -> Self {
        Self {
            service: "bpd-daemon",
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// Handlers receive `State<Arc<AppState>>`. Controller status is read
/// through watch receivers, so nothing here needs a lock.
#[derive(Clone, Debug, Default)]
pub struct AppState {
    pub build: BuildInfo,
    pub machines: StatusBoard,
}

impl AppState {
    pub fn new(machines: StatusBoard) -> Self {
        Self {
            build: BuildInfo::default(),
            machines,
        }
    }
}
