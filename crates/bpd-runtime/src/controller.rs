//! Device Controller: one supervised task per machine.
//!
//! ```text
//!  Idle ──start──► Starting ──connect, seed, subscribe ok──► Monitoring
//!                    ▲   │                                      │
//!                    │   └─ failure: disconnect, sleep(delay) ──┤ stream closed
//!                    └──────────────────────────────────────────┘
//!  any state ──stop──► Stopped
//! ```
//!
//! # Invariants
//!
//! - Connect and subscribe failures are retried forever with the profile's
//!   fixed delay. They never leave the task.
//! - Notifications are handled one at a time, in arrival order. A batch is
//!   read and committed before the next notification is looked at.
//! - The counter is re-seeded from the device on every (re)connect.
//! - Read and persistence failures drop the batch; the counter has already
//!   advanced and monitoring continues.
//! - `stop` is safe in every state and idempotent.

use std::slice;
use std::sync::Arc;

use bpd_config::MachineProfile;
use bpd_opcua::{
    CounterNotification, DeviceTransport, SessionError, SessionManager, SessionObserver,
    Subscription,
};
use bpd_reconcile::{ChangeDetector, Observation};
use bpd_schemas::MachineId;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    Clock, ControllerError, ControllerState, ControllerStatus, DiffReconciler, NoopHook,
    PersistenceGateway, RecordHook,
};

enum MonitorExit {
    Cancelled,
    Lost(ControllerError),
}

pub struct DeviceController {
    profile: MachineProfile,
    session: SessionManager,
    reconciler: DiffReconciler,
    gateway: PersistenceGateway,
    hook: Arc<dyn RecordHook>,
    detector: Option<ChangeDetector>,
    status: watch::Sender<ControllerStatus>,
}

impl DeviceController {
    /// Fails with `Configuration` when the profile is invalid or the gateway
    /// has no target for this machine.
    pub fn new(
        profile: MachineProfile,
        transport: Arc<dyn DeviceTransport>,
        gateway: PersistenceGateway,
    ) -> Result<Self, ControllerError> {
        let machine = profile.name.clone();
        profile
            .validate()
            .map_err(|e| ControllerError::Configuration {
                machine: machine.to_string(),
                reason: e.to_string(),
            })?;
        if !gateway.accepts(&machine) {
            return Err(ControllerError::Configuration {
                machine: machine.to_string(),
                reason: "no persistence target for this machine".to_string(),
            });
        }

        let session = SessionManager::new(machine.clone(), profile.endpoint.clone(), transport);
        let reconciler = DiffReconciler::new(machine.clone(), profile.node_ids.clone());
        let (status, _) = watch::channel(ControllerStatus::idle(machine));

        Ok(Self {
            profile,
            session,
            reconciler,
            gateway,
            hook: Arc::new(NoopHook),
            detector: None,
            status,
        })
    }

    pub fn with_hook(mut self, hook: Arc<dyn RecordHook>) -> Self {
        self.hook = hook;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.reconciler = self.reconciler.with_clock(clock);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.session = self.session.with_observer(observer);
        self
    }

    pub fn machine(&self) -> &MachineId {
        &self.profile.name
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ControllerStatus> {
        self.status.subscribe()
    }

    /// Spawn the lifecycle task. Works from `Idle` and from `Stopped`.
    pub fn start(self) -> ControllerHandle {
        let machine = self.profile.name.clone();
        let cancel = CancellationToken::new();
        let status = self.status.subscribe();
        let token = cancel.clone();
        let join = tokio::spawn(self.run(token));
        ControllerHandle {
            machine,
            cancel,
            join: Some(join),
            status,
            stopped: None,
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    async fn run(mut self, cancel: CancellationToken) -> Self {
        let machine = self.profile.name.clone();
        let delay = self.profile.connection_retry.initial_delay();

        loop {
            self.set_state(ControllerState::Starting);
            info!(machine = %machine, "controller starting");

            let started = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                r = self.start_monitoring() => r,
            };

            let failure = match started {
                Ok(subscription) => {
                    self.set_state(ControllerState::Monitoring);
                    info!(machine = %machine, subscription = subscription.id, "monitoring reject count node");
                    match self.monitor(subscription, &cancel).await {
                        MonitorExit::Cancelled => break,
                        MonitorExit::Lost(e) => e,
                    }
                }
                Err(e) => e,
            };

            error!(
                machine = %machine,
                error = %failure,
                retry_in = ?delay,
                "controller failed to start; retrying"
            );
            self.status.send_modify(|s| {
                s.state = ControllerState::Starting;
                s.restarts += 1;
                s.last_error = Some(failure.to_string());
            });
            self.session.disconnect().await;
            self.detector = None;

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!(machine = %machine, "stopping controller");
        self.session.disconnect().await;
        self.detector = None;
        self.set_state(ControllerState::Stopped);
        self
    }

    /// Connect, seed the counter, subscribe.
    async fn start_monitoring(&mut self) -> Result<Subscription, ControllerError> {
        self.session
            .connect()
            .await
            .map_err(ControllerError::Connection)?;

        let reject = &self.profile.node_ids.reject;
        let seed = self
            .session
            .read(slice::from_ref(reject))
            .await
            .map_err(ControllerError::Subscribe)?;
        let initial = match seed.first() {
            None => 0,
            Some(v) if v.is_empty() => 0,
            Some(v) => v.as_counter().ok_or_else(|| {
                ControllerError::Subscribe(SessionError::BadValue {
                    node: reject.clone(),
                    reason: format!("not a counter: {v:?}"),
                })
            })?,
        };
        self.detector = Some(ChangeDetector::seeded(initial));
        self.status
            .send_modify(|s| s.last_reject_count = Some(initial));
        info!(machine = %self.profile.name, initial, "initial reject count");

        self.session
            .subscribe(reject, &self.profile.subscription, &self.profile.monitor)
            .await
            .map_err(ControllerError::Subscribe)
    }

    async fn monitor(
        &mut self,
        mut subscription: Subscription,
        cancel: &CancellationToken,
    ) -> MonitorExit {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return MonitorExit::Cancelled,
                next = subscription.notifications.recv() => match next {
                    Some(n) => self.on_notification(n).await,
                    None => {
                        return MonitorExit::Lost(ControllerError::Connection(
                            SessionError::Connection("notification stream closed".to_string()),
                        ))
                    }
                },
            }
        }
    }

    // -----------------------------------------------------------------------
    // Notifications
    // -----------------------------------------------------------------------

    async fn on_notification(&mut self, n: CounterNotification) {
        let machine = self.profile.name.clone();
        if let Some(status) = &n.bad_status {
            warn!(machine = %machine, status = %status, "ignoring reject counter sample with bad status");
            return;
        }
        let Some(current) = n.value.as_counter() else {
            warn!(machine = %machine, value = ?n.value, "ignoring non-counter reject value");
            return;
        };
        let Some(detector) = self.detector.as_mut() else {
            return;
        };

        let obs = detector.observe(current);
        self.status
            .send_modify(|s| s.last_reject_count = Some(obs.current));

        if obs.reset {
            warn!(machine = %machine, from = obs.previous, to = obs.current, "counter reset detected");
        }
        if !obs.has_diff() {
            debug!(machine = %machine, current, "no new rejects");
            return;
        }
        self.on_diff(obs).await;
    }

    async fn on_diff(&mut self, obs: Observation) {
        let machine = self.profile.name.clone();
        info!(machine = %machine, diff = obs.diff, "detected new reject(s); fetching inspection data");

        let records = self
            .reconciler
            .reconcile(&self.session, obs.diff, obs.current)
            .await;
        if records.is_empty() {
            self.status.send_modify(|s| s.batches_discarded += 1);
            return;
        }

        info!(machine = %machine, records = records.len(), "processing data records");
        match self.gateway.commit_rows(&records, &machine).await {
            Ok(rows) => {
                let epoch = records.first().map(|r| r.epoch_millis);
                self.status.send_modify(|s| {
                    s.batches_committed += 1;
                    s.records_committed += rows.len() as u64;
                    s.last_commit_epoch_ms = epoch;
                });
                self.hook.on_committed(&machine, &rows);
            }
            Err(e) => {
                self.status.send_modify(|s| {
                    s.batches_failed += 1;
                    s.last_error = Some(e.to_string());
                });
            }
        }
    }

    fn set_state(&self, state: ControllerState) {
        self.status.send_modify(|s| s.state = state);
        debug!(machine = %self.profile.name, state = state.as_str(), "controller state");
    }
}

// ---------------------------------------------------------------------------
// ControllerHandle
// ---------------------------------------------------------------------------

/// Owner-side handle of a running controller.
pub struct ControllerHandle {
    machine: MachineId,
    cancel: CancellationToken,
    join: Option<JoinHandle<DeviceController>>,
    status: watch::Receiver<ControllerStatus>,
    stopped: Option<DeviceController>,
}

impl ControllerHandle {
    pub fn machine(&self) -> &MachineId {
        &self.machine
    }

    pub fn status(&self) -> watch::Receiver<ControllerStatus> {
        self.status.clone()
    }

    pub fn state(&self) -> ControllerState {
        self.status.borrow().state
    }

    /// Cancel the task and wait for it to close its session.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(join) = self.join.take() {
            match join.await {
                Ok(controller) => self.stopped = Some(controller),
                Err(e) => error!(machine = %self.machine, error = %e, "controller task ended abnormally"),
            }
        }
    }

    /// Stop and take the controller back so it can be started again.
    pub async fn into_stopped(mut self) -> Option<DeviceController> {
        self.stop().await;
        self.stopped.take()
    }
}
