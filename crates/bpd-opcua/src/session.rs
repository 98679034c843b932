//! Session Manager: owns at most one live session for one endpoint.
//!
//! # Invariants
//!
//! - `read` / `subscribe` without a live session fail with
//!   [`SessionError::NotConnected`].
//! - `disconnect` is idempotent and never fails; close errors are logged and
//!   swallowed so shutdown always completes.
//! - Backoff events from the transport are forwarded to the observer only;
//!   they never move [`SessionState`].

use std::sync::Arc;

use bpd_config::{MonitorParams, NodeRef, SubscriptionParams};
use bpd_schemas::MachineId;
use tracing::{error, info};

use crate::{
    DeviceSession, DeviceTransport, LogObserver, NodeValue, SessionError, SessionObserver,
    Subscription,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

pub struct SessionManager {
    machine: MachineId,
    endpoint: String,
    transport: Arc<dyn DeviceTransport>,
    observer: Arc<dyn SessionObserver>,
    state: SessionState,
    session: Option<Box<dyn DeviceSession>>,
}

impl SessionManager {
    pub fn new(
        machine: MachineId,
        endpoint: impl Into<String>,
        transport: Arc<dyn DeviceTransport>,
    ) -> Self {
        let observer: Arc<dyn SessionObserver> = Arc::new(LogObserver::new(machine.clone()));
        Self {
            machine,
            endpoint: endpoint.into(),
            transport,
            observer,
            state: SessionState::Disconnected,
            session: None,
        }
    }

    /// Replace the default logging observer.
    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Establish a fresh session. An existing session is closed first.
    pub async fn connect(&mut self) -> Result<(), SessionError> {
        if self.session.is_some() {
            self.disconnect().await;
        }

        self.state = SessionState::Connecting;
        match self
            .transport
            .open(&self.endpoint, Arc::clone(&self.observer))
            .await
        {
            Ok(session) => {
                self.session = Some(session);
                self.state = SessionState::Connected;
                info!(
                    machine = %self.machine,
                    endpoint = %self.endpoint,
                    "connection and session created"
                );
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Disconnected;
                error!(machine = %self.machine, endpoint = %self.endpoint, error = %e, "connection failed");
                Err(e)
            }
        }
    }

    /// Batched read. The result has exactly one value per requested node.
    pub async fn read(&self, nodes: &[NodeRef]) -> Result<Vec<NodeValue>, SessionError> {
        let session = self.session.as_ref().ok_or(SessionError::NotConnected)?;
        if nodes.is_empty() {
            return Ok(Vec::new());
        }
        let values = session.read(nodes).await?;
        if values.len() != nodes.len() {
            return Err(SessionError::Read(format!(
                "requested {} node(s), server returned {}",
                nodes.len(),
                values.len()
            )));
        }
        Ok(values)
    }

    pub async fn subscribe(
        &self,
        node: &NodeRef,
        subscription: &SubscriptionParams,
        monitor: &MonitorParams,
    ) -> Result<Subscription, SessionError> {
        let session = self.session.as_ref().ok_or(SessionError::NotConnected)?;
        session.subscribe(node, subscription, monitor).await
    }

    /// Close the session if there is one. Safe to call in any state.
    pub async fn disconnect(&mut self) {
        let Some(session) = self.session.take() else {
            self.state = SessionState::Disconnected;
            return;
        };
        match session.close().await {
            Ok(()) => info!(machine = %self.machine, "disconnected"),
            Err(e) => error!(machine = %self.machine, error = %e, "error during disconnection"),
        }
        self.state = SessionState::Disconnected;
    }
}
