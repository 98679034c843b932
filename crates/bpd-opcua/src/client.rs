//! OPC UA transport backed by the `opcua` client stack.
//!
//! Sessions are anonymous with security mode `None`, matching the plant PLCs.
//! The client's own session retry handles short link drops; each failed
//! attempt is reported to the [`SessionObserver`] as a backoff event. When the
//! event loop gives up, every subscription channel of that session is closed
//! so the owning controller restarts its lifecycle.

use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bpd_config::{MonitorParams, NodeRef, SubscriptionParams};
use futures_util::StreamExt;
use opcua::client::{
    ClientBuilder, DataChangeCallback, IdentityToken, MonitoredItem, Session, SessionPollResult,
};
use opcua::crypto::SecurityPolicy;
use opcua::types::{
    DataValue, ExtensionObject, MessageSecurityMode, MonitoredItemCreateRequest, MonitoringMode,
    MonitoringParameters, NodeId, ReadValueId, TimestampsToReturn, UserTokenPolicy, Variant,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{
    BackoffEvent, CounterNotification, DeviceSession, DeviceTransport, NodeValue, SessionError,
    SessionObserver, Subscription,
};

type NotificationSlot = Arc<Mutex<Option<mpsc::UnboundedSender<CounterNotification>>>>;

/// Opens OPC UA sessions.
#[derive(Debug, Clone)]
pub struct OpcUaTransport {
    application_name: String,
    session_retry_limit: i32,
}

impl OpcUaTransport {
    pub fn new(application_name: impl Into<String>) -> Self {
        Self {
            application_name: application_name.into(),
            session_retry_limit: -1,
        }
    }

    /// Retries the client performs on its own before the session is declared
    /// lost. `-1` retries forever.
    pub fn with_session_retry_limit(mut self, limit: i32) -> Self {
        self.session_retry_limit = limit;
        self
    }
}

impl Default for OpcUaTransport {
    fn default() -> Self {
        Self::new("bpd-front-rear")
    }
}

#[async_trait]
impl DeviceTransport for OpcUaTransport {
    async fn open(
        &self,
        endpoint: &str,
        observer: Arc<dyn SessionObserver>,
    ) -> Result<Box<dyn DeviceSession>, SessionError> {
        let mut client = ClientBuilder::new()
            .application_name(self.application_name.as_str())
            .application_uri(format!("urn:{}", self.application_name))
            .product_uri(format!("urn:{}", self.application_name))
            .trust_server_certs(true)
            .create_sample_keypair(true)
            .session_retry_limit(self.session_retry_limit)
            .client()
            .map_err(|e| SessionError::Connection(format!("client setup: {e:?}")))?;

        let (session, event_loop) = client
            .connect_to_matching_endpoint(
                (
                    endpoint,
                    SecurityPolicy::None.to_str(),
                    MessageSecurityMode::None,
                    UserTokenPolicy::anonymous(),
                ),
                IdentityToken::Anonymous,
            )
            .await
            .map_err(|status| SessionError::Connection(format!("{status:?}")))?;

        let slots: Arc<Mutex<Vec<NotificationSlot>>> = Arc::new(Mutex::new(Vec::new()));
        let poll_slots = Arc::clone(&slots);
        let poll = tokio::spawn(async move {
            let stream = event_loop.enter();
            futures_util::pin_mut!(stream);
            let mut attempt: u32 = 0;
            while let Some(res) = stream.next().await {
                match res {
                    Ok(SessionPollResult::ReconnectFailed(status)) => {
                        attempt = attempt.saturating_add(1);
                        observer.on_backoff(&BackoffEvent {
                            attempt,
                            next_delay: None,
                            reason: format!("{status:?}"),
                        });
                    }
                    Ok(SessionPollResult::Reconnected(_)) => {
                        attempt = 0;
                        observer.on_reconnected();
                    }
                    Ok(other) => debug!(event = ?other, "session poll"),
                    Err(status) => {
                        warn!(status = ?status, "session event loop ended");
                        break;
                    }
                }
            }
            close_slots(&poll_slots);
        });

        if !session.wait_for_connection().await {
            poll.abort();
            return Err(SessionError::Connection(format!(
                "session to {endpoint} never became active"
            )));
        }

        Ok(Box::new(OpcUaSession {
            session,
            slots,
            poll,
        }))
    }
}

fn close_slots(slots: &Mutex<Vec<NotificationSlot>>) {
    if let Ok(mut all) = slots.lock() {
        for slot in all.drain(..) {
            if let Ok(mut s) = slot.lock() {
                s.take();
            }
        }
    }
}

struct OpcUaSession {
    session: Arc<Session>,
    slots: Arc<Mutex<Vec<NotificationSlot>>>,
    poll: JoinHandle<()>,
}

fn parse_node(node: &NodeRef) -> Result<NodeId, SessionError> {
    NodeId::from_str(node.as_str()).map_err(|_| SessionError::InvalidNode(node.clone()))
}

fn from_variant(v: Option<&Variant>) -> NodeValue {
    match v {
        None | Some(Variant::Empty) => NodeValue::Empty,
        Some(Variant::Boolean(b)) => NodeValue::Bool(*b),
        Some(Variant::SByte(x)) => NodeValue::Int(i64::from(*x)),
        Some(Variant::Byte(x)) => NodeValue::UInt(u64::from(*x)),
        Some(Variant::Int16(x)) => NodeValue::Int(i64::from(*x)),
        Some(Variant::UInt16(x)) => NodeValue::UInt(u64::from(*x)),
        Some(Variant::Int32(x)) => NodeValue::Int(i64::from(*x)),
        Some(Variant::UInt32(x)) => NodeValue::UInt(u64::from(*x)),
        Some(Variant::Int64(x)) => NodeValue::Int(*x),
        Some(Variant::UInt64(x)) => NodeValue::UInt(*x),
        Some(Variant::Float(x)) => NodeValue::Float(f64::from(*x)),
        Some(Variant::Double(x)) => NodeValue::Float(*x),
        Some(other) => NodeValue::Other(format!("{other:?}")),
    }
}

fn bad_status(dv: &DataValue) -> Option<String> {
    dv.status
        .as_ref()
        .filter(|s| s.is_bad())
        .map(|s| format!("{s:?}"))
}

#[async_trait]
impl DeviceSession for OpcUaSession {
    async fn read(&self, nodes: &[NodeRef]) -> Result<Vec<NodeValue>, SessionError> {
        let ids = nodes
            .iter()
            .map(|n| parse_node(n).map(ReadValueId::new_value))
            .collect::<Result<Vec<_>, _>>()?;

        let values = self
            .session
            .read(&ids, TimestampsToReturn::Both, 0.0)
            .await
            .map_err(|status| SessionError::Read(format!("{status:?}")))?;

        nodes
            .iter()
            .zip(values.iter())
            .map(|(node, dv)| match bad_status(dv) {
                Some(reason) => Err(SessionError::BadValue {
                    node: node.clone(),
                    reason,
                }),
                None => Ok(from_variant(dv.value.as_ref())),
            })
            .collect()
    }

    async fn subscribe(
        &self,
        node: &NodeRef,
        subscription: &SubscriptionParams,
        monitor: &MonitorParams,
    ) -> Result<Subscription, SessionError> {
        let node_id = parse_node(node)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let slot: NotificationSlot = Arc::new(Mutex::new(Some(tx)));
        if let Ok(mut all) = self.slots.lock() {
            all.push(Arc::clone(&slot));
        }

        let callback_slot = Arc::clone(&slot);
        let subscription_id = self
            .session
            .create_subscription(
                Duration::from_millis(subscription.publishing_interval_ms),
                subscription.lifetime_count,
                subscription.max_keep_alive_count,
                0,
                0,
                subscription.publishing_enabled,
                DataChangeCallback::new(move |dv: DataValue, _item: &MonitoredItem| {
                    let notification = CounterNotification {
                        value: from_variant(dv.value.as_ref()),
                        bad_status: bad_status(&dv),
                    };
                    if let Ok(guard) = callback_slot.lock() {
                        if let Some(tx) = guard.as_ref() {
                            let _ = tx.send(notification);
                        }
                    }
                }),
            )
            .await
            .map_err(|status| SessionError::Subscribe(format!("create subscription: {status:?}")))?;

        let request = MonitoredItemCreateRequest {
            item_to_monitor: ReadValueId::new_value(node_id),
            monitoring_mode: MonitoringMode::Reporting,
            requested_parameters: MonitoringParameters {
                client_handle: 0,
                sampling_interval: monitor.sampling_interval_ms as f64,
                filter: ExtensionObject::null(),
                queue_size: monitor.queue_size,
                discard_oldest: monitor.discard_oldest,
            },
        };

        // The seed read already proved the node readable; only the service
        // call itself can fail here.
        self.session
            .create_monitored_items(subscription_id, TimestampsToReturn::Both, vec![request])
            .await
            .map_err(|status| SessionError::Subscribe(format!("monitor {node}: {status:?}")))?;

        Ok(Subscription {
            id: subscription_id,
            notifications: rx,
        })
    }

    async fn close(&self) -> Result<(), SessionError> {
        let res = self
            .session
            .disconnect()
            .await
            .map_err(|status| SessionError::Connection(format!("disconnect: {status:?}")));
        self.poll.abort();
        close_slots(&self.slots);
        res
    }
}
