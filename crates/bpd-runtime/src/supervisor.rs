//! Supervisor: launches one controller per configured machine.
//!
//! A machine whose controller cannot be constructed is logged and skipped.
//! Only an empty active set is fatal, and only at launch: controllers that
//! are retrying their connection still count as active.

use bpd_config::MachineProfile;
use bpd_schemas::MachineId;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::{
    ControllerError, ControllerHandle, ControllerStatus, DeviceController, StartupError,
    StatusBoard,
};

/// A machine that was configured but not launched.
#[derive(Debug)]
pub struct SkippedMachine {
    pub machine: MachineId,
    pub error: ControllerError,
}

pub struct Supervisor {
    handles: Vec<ControllerHandle>,
    skipped: Vec<SkippedMachine>,
}

impl Supervisor {
    /// Build and start a controller for every profile via `factory`.
    ///
    /// Must be called from inside a Tokio runtime.
    pub fn launch<F>(profiles: &[MachineProfile], mut factory: F) -> Result<Self, StartupError>
    where
        F: FnMut(&MachineProfile) -> Result<DeviceController, ControllerError>,
    {
        if profiles.is_empty() {
            warn!("no machines configured; check the environment");
            return Err(StartupError::NoMachinesConfigured);
        }

        let names: Vec<&str> = profiles.iter().map(|p| p.name.as_str()).collect();
        info!(count = profiles.len(), machines = ?names, "found machine(s) to monitor");

        let mut handles = Vec::with_capacity(profiles.len());
        let mut skipped = Vec::new();
        for profile in profiles {
            match factory(profile) {
                Ok(controller) => {
                    handles.push(controller.start());
                    info!(machine = %profile.name, "launched controller");
                }
                Err(e) => {
                    error!(machine = %profile.name, error = %e, "failed to launch controller; skipping");
                    skipped.push(SkippedMachine {
                        machine: profile.name.clone(),
                        error: e,
                    });
                }
            }
        }

        if handles.is_empty() {
            error!("no controllers were started successfully; check configurations");
            return Err(StartupError::NoActiveMachines {
                skipped: skipped.len(),
            });
        }
        info!(running = handles.len(), skipped = skipped.len(), "total controllers running");
        Ok(Self { handles, skipped })
    }

    pub fn active_machines(&self) -> Vec<MachineId> {
        self.handles.iter().map(|h| h.machine().clone()).collect()
    }

    pub fn skipped(&self) -> &[SkippedMachine] {
        &self.skipped
    }

    pub fn status_of(&self, machine: &MachineId) -> Option<watch::Receiver<ControllerStatus>> {
        self.handles
            .iter()
            .find(|h| h.machine() == machine)
            .map(ControllerHandle::status)
    }

    pub fn status_board(&self) -> StatusBoard {
        StatusBoard::new(self.handles.iter().map(ControllerHandle::status).collect())
    }

    /// Stop every controller and wait for all of them.
    pub async fn stop(&mut self) {
        for handle in &mut self.handles {
            handle.stop().await;
        }
        info!(controllers = self.handles.len(), "all controllers stopped");
    }
}
