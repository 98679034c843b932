use bpd_config::NodeRef;

/// Failures surfaced by the session layer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    /// Read or subscribe issued without a live session.
    #[error("not connected")]
    NotConnected,
    /// Endpoint unreachable or session rejected.
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("read failed: {0}")]
    Read(String),
    #[error("subscribe failed: {0}")]
    Subscribe(String),
    #[error("invalid node id: {0}")]
    InvalidNode(NodeRef),
    /// The server answered but the value is unusable (bad status, wrong type).
    #[error("bad value for {node}: {reason}")]
    BadValue { node: NodeRef, reason: String },
}
