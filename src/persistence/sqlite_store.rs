//! SQLite implementation of the AlertStore trait.

use super::{AlertStore, StoreError};
use crate::models::{Alert, DetectionType, NewAlert};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::Mutex;

/// SQLite-backed alert store.
///
/// Both polling loops open their own instance against the same database
/// file; every trait method is a single autocommit statement, so the
/// loops coordinate through SQLite's row-level atomicity alone.
pub struct SqliteAlertStore {
    conn: Mutex<Connection>,
}

impl SqliteAlertStore {
    /// Open (or create) the alert database at the given path.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path)?;
        let store = SqliteAlertStore {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// In-memory database, used by tests.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = SqliteAlertStore {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(())
    }

    fn row_to_alert(row: &Row) -> rusqlite::Result<(Alert, String)> {
        let detection_tag: String = row.get(4)?;
        let alert = Alert {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            ip_address: row.get(2)?,
            username: row.get(3)?,
            // Placeholder; fixed up from the tag by the caller.
            detection_type: DetectionType::RuleBased,
            reason: row.get(5)?,
            severity: row.get(6)?,
            is_handled: row.get(7)?,
        };
        Ok((alert, detection_tag))
    }

    fn resolve_detection(
        (mut alert, tag): (Alert, String),
    ) -> Result<Alert, StoreError> {
        alert.detection_type = DetectionType::from_tag(&tag)
            .ok_or_else(|| StoreError::InvalidData(format!("unknown detection type: {}", tag)))?;
        Ok(alert)
    }
}

const SELECT_COLUMNS: &str =
    "id, timestamp, ip_address, username, detection_type, reason, severity, is_handled";

impl AlertStore for SqliteAlertStore {
    fn insert_alert(&self, alert: &NewAlert) -> Result<i64, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO alerts (timestamp, ip_address, username, detection_type, reason, severity, is_handled)
             VALUES (?, ?, ?, ?, ?, ?, NULL)",
            params![
                alert.timestamp,
                alert.ip_address,
                alert.username,
                alert.detection_type.as_str(),
                alert.reason,
                alert.severity,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn count_recent_failures(&self, ip: &str, window_start: i64) -> Result<u32, StoreError> {
        let conn = self.conn.lock().unwrap();
        let count: u32 = conn.query_row(
            "SELECT COUNT(*) FROM alerts
             WHERE ip_address = ?
               AND detection_type = 'RULE-BASED'
               AND severity IN (3, 9)
               AND timestamp >= ?",
            params![ip, window_start],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn fetch_unhandled(&self, severity_threshold: u8) -> Result<Vec<Alert>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM alerts
             WHERE (severity >= ? OR detection_type = 'AI') AND is_handled IS NULL
             ORDER BY id",
            SELECT_COLUMNS
        ))?;

        let rows = stmt
            .query_map(params![severity_threshold], Self::row_to_alert)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(Self::resolve_detection).collect()
    }

    fn update_status(&self, id: i64, tag: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE alerts SET is_handled = ? WHERE id = ?",
            params![tag, id],
        )?;
        Ok(())
    }

    fn recent_alerts(&self, limit: usize) -> Result<Vec<Alert>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM alerts ORDER BY timestamp DESC LIMIT ?",
            SELECT_COLUMNS
        ))?;

        let rows = stmt
            .query_map(params![limit], Self::row_to_alert)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(Self::resolve_detection).collect()
    }
}
