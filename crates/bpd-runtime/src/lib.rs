//! bpd-runtime
//!
//! Device Controller, Supervisor and the IO half of the Diff Reconciler.
//!
//! Control flow per machine:
//! Supervisor -> DeviceController -> SessionManager.connect -> subscribe ->
//! (notification) ChangeDetector -> DiffReconciler -> PersistenceGateway ->
//! RecordHook.
//!
//! Failures below the controller are recovered locally. Only construction
//! failures and an empty active set reach the Supervisor.

mod controller;
mod error;
mod gateway;
mod hook;
mod reconciler;
mod status;
mod supervisor;

pub use controller::{ControllerHandle, DeviceController};
pub use error::{ControllerError, StartupError};
pub use gateway::PersistenceGateway;
pub use hook::{ConsoleDump, NoopHook, RecordHook};
pub use reconciler::{system_clock, Clock, DiffReconciler};
pub use status::{ControllerState, ControllerStatus, StatusBoard};
pub use supervisor::{SkippedMachine, Supervisor};
