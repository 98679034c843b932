//! Transport / session seams.
//!
//! Implementations must be object-safe and `Send + Sync` so a controller can
//! hold `Arc<dyn DeviceTransport>` across task boundaries.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bpd_config::{MonitorParams, NodeRef, SubscriptionParams};
use bpd_schemas::MachineId;
use tokio::sync::mpsc;
use tracing::info;

use crate::{NodeValue, SessionError};

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// One data-change notification for the subscribed counter node.
#[derive(Debug, Clone, PartialEq)]
pub struct CounterNotification {
    pub value: NodeValue,
    /// Set when the server flagged the sample with a bad status.
    pub bad_status: Option<String>,
}

impl CounterNotification {
    pub fn good(value: NodeValue) -> Self {
        Self {
            value,
            bad_status: None,
        }
    }
}

/// A live subscription on one counter node.
///
/// Notifications arrive in the order the transport emitted them. The channel
/// closes when the session is gone for good.
#[derive(Debug)]
pub struct Subscription {
    pub id: u32,
    pub notifications: mpsc::UnboundedReceiver<CounterNotification>,
}

// ---------------------------------------------------------------------------
// Backoff observer
// ---------------------------------------------------------------------------

/// Informational event emitted while the transport retries a lost link.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffEvent {
    pub attempt: u32,
    pub next_delay: Option<Duration>,
    pub reason: String,
}

/// Receives low-level reconnection progress. Never changes session state.
pub trait SessionObserver: Send + Sync {
    fn on_backoff(&self, event: &BackoffEvent);

    fn on_reconnected(&self) {}
}

/// Default observer: structured log lines tagged with the machine.
#[derive(Debug, Clone)]
pub struct LogObserver {
    machine: MachineId,
}

impl LogObserver {
    pub fn new(machine: MachineId) -> Self {
        Self { machine }
    }
}

impl SessionObserver for LogObserver {
    fn on_backoff(&self, event: &BackoffEvent) {
        let next_try_secs = event.next_delay.map(|d| d.as_secs_f64());
        info!(
            machine = %self.machine,
            attempt = event.attempt,
            next_try_secs,
            reason = %event.reason,
            "reconnecting"
        );
    }

    fn on_reconnected(&self) {
        info!(machine = %self.machine, "transport reconnected");
    }
}

// ---------------------------------------------------------------------------
// Transport traits
// ---------------------------------------------------------------------------

/// Opens sessions against a device endpoint.
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    async fn open(
        &self,
        endpoint: &str,
        observer: Arc<dyn SessionObserver>,
    ) -> Result<Box<dyn DeviceSession>, SessionError>;
}

/// A connected session.
#[async_trait]
pub trait DeviceSession: Send + Sync {
    /// Batched read; values come back in request order.
    async fn read(&self, nodes: &[NodeRef]) -> Result<Vec<NodeValue>, SessionError>;

    async fn subscribe(
        &self,
        node: &NodeRef,
        subscription: &SubscriptionParams,
        monitor: &MonitorParams,
    ) -> Result<Subscription, SessionError>;

    async fn close(&self) -> Result<(), SessionError>;
}
