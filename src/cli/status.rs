//! Handler for the `status` command.
//!
//! `run` periodically writes a [`StatusSnapshot`] to disk; this command
//! reads it back. Grounded on the teacher's `cli/status.rs` status-file
//! pattern, shrunk to this crate's single-process, no-systemd shape.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tabled::settings::Style as TableStyle;
use tabled::{Table, Tabled};

use crate::error::Result;

pub const DEFAULT_STATUS_PATH: &str = "tickforge-status.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub pid: u32,
    pub updated_at: DateTime<Utc>,
    pub lifecycle_state: String,
    pub open_position_count: usize,
    pub trade_count: u64,
    pub win_rate: f64,
    pub realized_pnl_total: String,
}

impl StatusSnapshot {
    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// Print the most recently written status snapshot, or a "not running"
/// notice if no status file exists at `path`.
pub fn execute(path: &Path) {
    match read_status(path) {
        Some(status) => display(&status),
        None => {
            println!();
            println!("tickforge v{}", env!("CARGO_PKG_VERSION"));
            println!("Status:      no running instance found at {}", path.display());
            println!();
        }
    }
}

fn read_status(path: &Path) -> Option<StatusSnapshot> {
    let content = fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}

/// One printable row of the status table; a flattened, display-formatted
/// view over [`StatusSnapshot`].
#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "Field")]
    field: String,
    #[tabled(rename = "Value")]
    value: String,
}

fn display(status: &StatusSnapshot) {
    let rows = vec![
        StatusRow { field: "Status".to_string(), value: format!("{} (pid {})", status.lifecycle_state, status.pid) },
        StatusRow { field: "Updated".to_string(), value: status.updated_at.to_string() },
        StatusRow { field: "Positions".to_string(), value: format!("{} open", status.open_position_count) },
        StatusRow {
            field: "Trades".to_string(),
            value: format!("{} ({:.1}% win rate)", status.trade_count, status.win_rate * 100.0),
        },
        StatusRow { field: "Realized PnL".to_string(), value: status.realized_pnl_total.clone() },
    ];

    println!();
    println!("tickforge v{}", env!("CARGO_PKG_VERSION"));
    println!("{}", Table::new(rows).with(TableStyle::rounded()));
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_status_file_does_not_panic() {
        execute(Path::new("/tmp/does-not-exist-tickforge-status.json"));
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");
        let snapshot = StatusSnapshot {
            pid: 1234,
            updated_at: Utc::now(),
            lifecycle_state: "Active".to_string(),
            open_position_count: 2,
            trade_count: 5,
            win_rate: 0.6,
            realized_pnl_total: "12.50".to_string(),
        };
        snapshot.write(&path).unwrap();
        let read_back = read_status(&path).unwrap();
        assert_eq!(read_back.pid, 1234);
        assert_eq!(read_back.trade_count, 5);
    }
}
