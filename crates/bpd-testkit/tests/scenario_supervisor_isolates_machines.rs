//! Scenario: Supervisor launch and controller shutdown.
//!
//! # Invariants under test
//! - A machine that cannot be constructed (no persistence target, invalid
//!   profile) is skipped and does not block the others.
//! - No launchable machine at all is a startup error; so is an empty set.
//! - A machine failing its first connect still counts as active and heals
//!   on its own.
//! - Machines do not share state: an increment on one never writes rows for
//!   another.
//! - `stop` is idempotent, safe while still connecting, closes the session,
//!   and a stopped controller can be started again.

use std::collections::HashMap;
use std::sync::Arc;

use bpd_config::MachineProfile;
use bpd_runtime::{
    ControllerError, ControllerState, DeviceController, PersistenceGateway, StartupError,
    Supervisor,
};
use bpd_schemas::MachineId;
use bpd_testkit::{profile, wait_for_status, MemoryEventStore, ScriptedDevice};

struct Plant {
    devices: HashMap<MachineId, ScriptedDevice>,
    store: Arc<MemoryEventStore>,
}

impl Plant {
    fn new(profiles: &[MachineProfile], persisted: &[&str]) -> Self {
        let devices = profiles
            .iter()
            .map(|p| {
                let d = ScriptedDevice::new();
                d.set_counter(&p.node_ids, 100);
                d.set_window(&p.node_ids, &[2.0; 4], &[1.0; 4]);
                (p.name.clone(), d)
            })
            .collect();
        Self {
            devices,
            store: Arc::new(MemoryEventStore::new(persisted.iter().copied())),
        }
    }

    fn device(&self, name: &str) -> &ScriptedDevice {
        &self.devices[&MachineId::new(name)]
    }

    fn launch(&self, profiles: &[MachineProfile]) -> Result<Supervisor, StartupError> {
        Supervisor::launch(profiles, |p| {
            let device = self.devices.get(&p.name).ok_or_else(|| ControllerError::Configuration {
                machine: p.name.to_string(),
                reason: "no device".into(),
            })?;
            DeviceController::new(
                p.clone(),
                device.transport(),
                PersistenceGateway::new(self.store.clone()),
            )
        })
    }
}

#[tokio::test]
async fn scenario_unknown_machine_does_not_block_others() -> anyhow::Result<()> {
    let profiles = vec![profile("oci1", 4), profile("oci9", 4)];
    let plant = Plant::new(&profiles, &["oci1"]);

    let mut sup = plant.launch(&profiles)?;
    assert_eq!(sup.active_machines(), vec![MachineId::new("oci1")]);
    assert_eq!(sup.skipped().len(), 1);
    assert_eq!(sup.skipped()[0].machine, MachineId::new("oci9"));
    assert!(matches!(
        sup.skipped()[0].error,
        ControllerError::Configuration { .. }
    ));

    let mut rx = sup.status_of(&MachineId::new("oci1")).expect("oci1 launched");
    wait_for_status(&mut rx, |s| s.state == ControllerState::Monitoring).await?;
    assert_eq!(plant.device("oci9").opens(), 0);
    assert_eq!(sup.status_board().len(), 1);

    sup.stop().await;
    Ok(())
}

#[tokio::test]
async fn scenario_invalid_profile_is_skipped() -> anyhow::Result<()> {
    let mut broken = profile("oci2", 4);
    broken.node_ids.rear.pop();
    let profiles = vec![profile("oci1", 4), broken];
    let plant = Plant::new(&profiles, &["oci1", "oci2"]);

    let mut sup = plant.launch(&profiles)?;
    assert_eq!(sup.active_machines(), vec![MachineId::new("oci1")]);
    assert!(sup.skipped()[0].error.to_string().contains("front/rear windows differ"));

    sup.stop().await;
    Ok(())
}

#[tokio::test]
async fn scenario_no_launchable_machine_is_fatal() {
    let profiles = vec![profile("oci8", 2), profile("oci9", 2)];
    let plant = Plant::new(&profiles, &[]);
    assert_eq!(
        plant.launch(&profiles).err(),
        Some(StartupError::NoActiveMachines { skipped: 2 })
    );
    assert_eq!(
        plant.launch(&[]).err(),
        Some(StartupError::NoMachinesConfigured)
    );
}

#[tokio::test(start_paused = true)]
async fn scenario_failing_machine_heals_while_sibling_runs() -> anyhow::Result<()> {
    let profiles = vec![profile("oci1", 4), profile("oci2", 4)];
    let plant = Plant::new(&profiles, &["oci1", "oci2"]);
    plant.device("oci2").refuse_connects(3);

    let mut sup = plant.launch(&profiles)?;
    assert_eq!(sup.active_machines().len(), 2);

    let mut oci1 = sup.status_of(&MachineId::new("oci1")).expect("oci1");
    let mut oci2 = sup.status_of(&MachineId::new("oci2")).expect("oci2");
    wait_for_status(&mut oci1, |s| s.state == ControllerState::Monitoring).await?;

    let ids1 = &profiles[0].node_ids;
    plant.device("oci1").publish_counter(ids1, 102);
    wait_for_status(&mut oci1, |s| s.batches_committed == 1).await?;

    let s = wait_for_status(&mut oci2, |s| s.state == ControllerState::Monitoring).await?;
    assert_eq!(s.restarts, 3);
    assert_eq!(plant.store.counters(&MachineId::new("oci1")), vec![101, 102]);
    assert!(plant.store.rows(&MachineId::new("oci2")).is_empty());

    sup.stop().await;
    for s in sup.status_board().snapshot() {
        assert_eq!(s.state, ControllerState::Stopped);
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn scenario_stop_is_idempotent_in_every_state() -> anyhow::Result<()> {
    let p = profile("oci1", 2);
    let device = ScriptedDevice::new();
    device.set_counter(&p.node_ids, 5);
    device.refuse_connects(usize::MAX);
    let store = Arc::new(MemoryEventStore::new(["oci1"]));

    // Never connected.
    let mut handle =
        DeviceController::new(p.clone(), device.transport(), PersistenceGateway::new(store.clone()))?
            .start();
    let mut status = handle.status();
    wait_for_status(&mut status, |s| s.restarts >= 1).await?;
    handle.stop().await;
    handle.stop().await;
    assert_eq!(handle.state(), ControllerState::Stopped);
    assert_eq!(device.closes(), 0);

    // Monitoring, then stopped twice, then started again.
    device.refuse_connects(0);
    let controller = handle.into_stopped().await.expect("controller comes back");
    let mut handle = controller.start();
    let mut status = handle.status();
    wait_for_status(&mut status, |s| s.state == ControllerState::Monitoring).await?;
    let opens = device.opens();

    handle.stop().await;
    handle.stop().await;
    assert_eq!(handle.state(), ControllerState::Stopped);
    assert_eq!(device.closes(), 1);
    assert_eq!(device.live_subscriptions(), 0);

    let controller = handle.into_stopped().await.expect("controller comes back");
    let mut handle = controller.start();
    let mut status = handle.status();
    let s = wait_for_status(&mut status, |s| s.state == ControllerState::Monitoring).await?;
    assert_eq!(device.opens(), opens + 1);
    assert_eq!(s.last_reject_count, Some(5));

    handle.stop().await;
    Ok(())
}
