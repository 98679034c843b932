use bpd_opcua::SessionError;

/// Failures inside one Device Controller.
///
/// `Connection` and `Subscribe` restart the controller's lifecycle after the
/// fixed retry delay. `Read` and `Persistence` cost one batch and nothing
/// else. `Configuration` is raised at construction and stops that machine
/// from launching.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("connection failed: {0}")]
    Connection(#[source] SessionError),
    #[error("monitoring setup failed: {0}")]
    Subscribe(#[source] SessionError),
    #[error("inspection read failed: {0}")]
    Read(String),
    #[error("persistence failed: {0}")]
    Persistence(String),
    #[error("[{machine}] configuration error: {reason}")]
    Configuration { machine: String, reason: String },
}

/// Process-level startup failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StartupError {
    #[error("no machines configured")]
    NoMachinesConfigured,
    #[error("no controllers were started successfully ({skipped} machine(s) skipped)")]
    NoActiveMachines { skipped: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_error_names_the_machine() {
        let e = ControllerError::Configuration {
            machine: "oci9".into(),
            reason: "no persistence target".into(),
        };
        assert_eq!(e.to_string(), "[oci9] configuration error: no persistence target");
    }
}
