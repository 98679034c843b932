//! Scenario: profiles loaded from a YAML file on disk.
//!
//! # Invariants under test
//! - A file with one valid and one invalid machine yields exactly the valid
//!   profile; the invalid one is reported, not fatal.
//! - A missing file is a `ConfigError::File`.

use std::io::Write;

use bpd_config::{load_profiles_yaml, ConfigError};

#[test]
fn invalid_machine_in_file_does_not_block_valid_one() {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        f,
        r#"
machines:
  - name: oci1
    endpoint: opc.tcp://10.0.0.1:4840
    node_ids:
      front: ["ns=2;s=F0", "ns=2;s=F1"]
      rear: ["ns=2;s=R0", "ns=2;s=R1"]
      reject: "ns=2;s=Reject"
  - name: oci2
    endpoint: opc.tcp://10.0.0.2:4840
    node_ids:
      front: ["ns=2;s=F0", "ns=2;s=F1"]
      rear: ["ns=2;s=R0"]
      reject: "ns=2;s=Reject"
"#
    )
    .unwrap();

    let path = f.path().to_str().unwrap().to_string();
    let d = load_profiles_yaml(&path).unwrap();

    assert_eq!(d.machine_names(), vec!["oci1"]);
    assert_eq!(d.rejected.len(), 1);
    assert_eq!(d.rejected[0].machine, "oci2");
    assert!(matches!(
        d.rejected[0].error,
        ConfigError::WindowMismatch { front: 2, rear: 1, .. }
    ));
}

#[test]
fn missing_file_is_reported() {
    let err = load_profiles_yaml("/definitely/not/here/profiles.yaml").unwrap_err();
    assert!(matches!(err, ConfigError::File(_)));
}
