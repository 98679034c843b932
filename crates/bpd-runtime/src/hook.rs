//! Per-machine hooks run after a batch is committed.

use bpd_schemas::{FrontRearRow, MachineId};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

pub trait RecordHook: Send + Sync {
    fn on_committed(&self, machine: &MachineId, rows: &[FrontRearRow]);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHook;

impl RecordHook for NoopHook {
    fn on_committed(&self, _machine: &MachineId, _rows: &[FrontRearRow]) {}
}

/// Human-facing dump of every committed record to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleDump;

#[derive(Serialize)]
struct DumpEntry<'a> {
    machine: &'a MachineId,
    timestamp: String,
    #[serde(flatten)]
    row: &'a FrontRearRow,
}

impl ConsoleDump {
    /// Banner-framed pretty JSON, one block per row.
    pub fn render(machine: &MachineId, rows: &[FrontRearRow], now: DateTime<Utc>) -> String {
        let title = format!(" {} ", machine.as_str().to_ascii_uppercase());
        let banner = format!("{title:=^39}");
        let closing = "=".repeat(banner.chars().count());
        let timestamp = now.to_rfc3339_opts(SecondsFormat::Millis, true);

        let mut out = String::new();
        for row in rows {
            let entry = DumpEntry {
                machine,
                timestamp: timestamp.clone(),
                row,
            };
            let body = serde_json::to_string_pretty(&entry).unwrap_or_else(|e| format!("{e}"));
            out.push_str(&banner);
            out.push('\n');
            out.push_str(&body);
            out.push('\n');
            out.push_str(&closing);
            out.push('\n');
        }
        out
    }
}

impl RecordHook for ConsoleDump {
    fn on_committed(&self, machine: &MachineId, rows: &[FrontRearRow]) {
        print!("{}", Self::render(machine, rows, Utc::now()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(counter: i64) -> FrontRearRow {
        FrontRearRow {
            epochtime: 1_700_000_000_000,
            lotno: Some("LOT-7".into()),
            pro: None,
            counter,
            front: 10.0,
            rear: 9.5,
            delta: 0.5,
        }
    }

    #[test]
    fn dump_frames_each_row() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();
        let out = ConsoleDump::render(&MachineId::new("oci1"), &[row(41), row(42)], now);

        let banners = out.lines().filter(|l| l.contains(" OCI1 ")).count();
        assert_eq!(banners, 2);
        assert!(out.contains("\"machine\": \"oci1\""));
        assert!(out.contains("\"counter\": 42"));
        assert!(out.contains("\"timestamp\": \"2024-05-01T08:30:00.000Z\""));
        assert!(out.contains("\"pro\": null"));
    }

    #[test]
    fn empty_batch_renders_nothing() {
        assert!(ConsoleDump::render(&MachineId::new("oci1"), &[], Utc::now()).is_empty());
    }
}
