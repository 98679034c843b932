//! bpd-opcua
//!
//! Session Manager for one device endpoint.
//!
//! ```text
//! SessionManager      Disconnected -> Connecting -> Connected -> Disconnected
//!       │
//!       ▼
//! DeviceTransport     opens sessions; reports backoff to a SessionObserver
//!       │
//!       ▼
//! DeviceSession       read / subscribe / close
//! ```
//!
//! The real OPC UA transport lives behind the `opcua-client` feature; tests and
//! the testkit drive the same traits with scripted devices.

mod error;
mod session;
mod transport;
mod value;

#[cfg(feature = "opcua-client")]
mod client;

pub use bpd_config::{MonitorParams, NodeRef, SubscriptionParams};
pub use error::SessionError;
pub use session::{SessionManager, SessionState};
pub use transport::{
    BackoffEvent, CounterNotification, DeviceSession, DeviceTransport, LogObserver,
    SessionObserver, Subscription,
};
pub use value::NodeValue;

#[cfg(feature = "opcua-client")]
pub use client::OpcUaTransport;
