//! Scripted OPC UA device.
//!
//! A [`ScriptedDevice`] is a cloneable handle on shared device state; hand a
//! [`ScriptedTransport`] built from it to the controller and drive the device
//! from the test.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bpd_config::NodeIds;
use bpd_opcua::{
    BackoffEvent, CounterNotification, DeviceSession, DeviceTransport, MonitorParams, NodeRef,
    NodeValue, SessionError, SessionObserver, Subscription, SubscriptionParams,
};
use tokio::sync::mpsc;

#[derive(Default)]
struct DeviceState {
    values: HashMap<String, NodeValue>,
    refuse_connects: usize,
    fail_subscribes: usize,
    fail_reads: bool,
    opens: usize,
    closes: usize,
    reads: Vec<Vec<NodeRef>>,
    subscribed: Vec<NodeRef>,
    subscribers: Vec<mpsc::UnboundedSender<CounterNotification>>,
    observer: Option<Arc<dyn SessionObserver>>,
    next_subscription: u32,
}

#[derive(Clone, Default)]
pub struct ScriptedDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl ScriptedDevice {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        // A panicking test poisons the lock; keep serving the rest of it.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn transport(&self) -> Arc<dyn DeviceTransport> {
        Arc::new(ScriptedTransport {
            device: self.clone(),
        })
    }

    // -- values -------------------------------------------------------------

    pub fn set_value(&self, node: &NodeRef, value: NodeValue) {
        self.lock().values.insert(node.as_str().to_string(), value);
    }

    pub fn set_counter(&self, node_ids: &NodeIds, value: i64) {
        self.set_value(&node_ids.reject, NodeValue::Int(value));
    }

    /// Fill the front/rear windows, newest first.
    pub fn set_window(&self, node_ids: &NodeIds, front: &[f64], rear: &[f64]) {
        let mut st = self.lock();
        for (node, v) in node_ids.front.iter().zip(front) {
            st.values
                .insert(node.as_str().to_string(), NodeValue::Float(*v));
        }
        for (node, v) in node_ids.rear.iter().zip(rear) {
            st.values
                .insert(node.as_str().to_string(), NodeValue::Float(*v));
        }
    }

    // -- faults -------------------------------------------------------------

    pub fn refuse_connects(&self, n: usize) {
        self.lock().refuse_connects = n;
    }

    pub fn fail_subscribes(&self, n: usize) {
        self.lock().fail_subscribes = n;
    }

    pub fn fail_reads(&self, on: bool) {
        self.lock().fail_reads = on;
    }

    /// Close every notification stream, as if the link were lost for good.
    pub fn drop_link(&self) {
        self.lock().subscribers.clear();
    }

    pub fn emit_backoff(&self, attempt: u32) {
        let observer = self.lock().observer.clone();
        if let Some(obs) = observer {
            obs.on_backoff(&BackoffEvent {
                attempt,
                next_delay: Some(Duration::from_secs(2)),
                reason: "scripted link drop".to_string(),
            });
        }
    }

    // -- notifications ------------------------------------------------------

    /// Publish a counter sample to every live subscription. Also updates the
    /// node value so a reconnect seeds from it. Returns the number of
    /// subscriptions reached.
    pub fn publish_counter(&self, node_ids: &NodeIds, value: i64) -> usize {
        self.publish(&node_ids.reject, CounterNotification::good(NodeValue::Int(value)))
    }

    pub fn publish(&self, node: &NodeRef, notification: CounterNotification) -> usize {
        let mut st = self.lock();
        if notification.bad_status.is_none() {
            st.values
                .insert(node.as_str().to_string(), notification.value.clone());
        }
        st.subscribers.retain(|tx| !tx.is_closed());
        st.subscribers
            .iter()
            .filter(|tx| tx.send(notification.clone()).is_ok())
            .count()
    }

    // -- inspection ---------------------------------------------------------

    pub fn opens(&self) -> usize {
        self.lock().opens
    }

    pub fn closes(&self) -> usize {
        self.lock().closes
    }

    /// Every batched read, in order, including the counter seed reads.
    pub fn reads(&self) -> Vec<Vec<NodeRef>> {
        self.lock().reads.clone()
    }

    pub fn subscribed_nodes(&self) -> Vec<NodeRef> {
        self.lock().subscribed.clone()
    }

    pub fn live_subscriptions(&self) -> usize {
        let mut st = self.lock();
        st.subscribers.retain(|tx| !tx.is_closed());
        st.subscribers.len()
    }

    /// Wait until at least `n` subscriptions are live. Works with paused time.
    pub async fn wait_for_subscriptions(&self, n: usize) -> anyhow::Result<()> {
        let wait = async {
            while self.live_subscriptions() < n {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(600), wait)
            .await
            .map_err(|_| anyhow::anyhow!("timed out waiting for {n} subscription(s)"))
    }
}

// ---------------------------------------------------------------------------
// Transport / session
// ---------------------------------------------------------------------------

pub struct ScriptedTransport {
    device: ScriptedDevice,
}

#[async_trait]
impl DeviceTransport for ScriptedTransport {
    async fn open(
        &self,
        endpoint: &str,
        observer: Arc<dyn SessionObserver>,
    ) -> Result<Box<dyn DeviceSession>, SessionError> {
        let mut st = self.device.lock();
        st.opens += 1;
        st.observer = Some(observer);
        if st.refuse_connects > 0 {
            st.refuse_connects -= 1;
            return Err(SessionError::Connection(format!(
                "scripted refusal for {endpoint}"
            )));
        }
        Ok(Box::new(ScriptedSession {
            device: self.device.clone(),
        }))
    }
}

struct ScriptedSession {
    device: ScriptedDevice,
}

#[async_trait]
impl DeviceSession for ScriptedSession {
    async fn read(&self, nodes: &[NodeRef]) -> Result<Vec<NodeValue>, SessionError> {
        let mut st = self.device.lock();
        st.reads.push(nodes.to_vec());
        if st.fail_reads {
            return Err(SessionError::Read("scripted read failure".to_string()));
        }
        Ok(nodes
            .iter()
            .map(|n| st.values.get(n.as_str()).cloned().unwrap_or(NodeValue::Empty))
            .collect())
    }

    async fn subscribe(
        &self,
        node: &NodeRef,
        _subscription: &SubscriptionParams,
        _monitor: &MonitorParams,
    ) -> Result<Subscription, SessionError> {
        let mut st = self.device.lock();
        if st.fail_subscribes > 0 {
            st.fail_subscribes -= 1;
            return Err(SessionError::Subscribe("scripted subscribe failure".to_string()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        st.subscribers.push(tx);
        st.subscribed.push(node.clone());
        st.next_subscription += 1;
        Ok(Subscription {
            id: st.next_subscription,
            notifications: rx,
        })
    }

    async fn close(&self) -> Result<(), SessionError> {
        let mut st = self.device.lock();
        st.closes += 1;
        st.subscribers.clear();
        Ok(())
    }
}
