//! Durable alert storage.
//!
//! The ingestion pipeline and the response engine are independent polling
//! actors whose only coordination point is this store. Every operation is
//! its own short-lived transaction; no connection is held across poll
//! cycles, so neither loop can starve the other.

pub mod sqlite_store;

pub use sqlite_store::SqliteAlertStore;

use crate::models::{Alert, NewAlert};
use thiserror::Error;

/// Errors from the alert store. These propagate to the caller: a failing
/// store aborts the current poll cycle, which retries on the next tick.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("invalid data in database: {0}")]
    InvalidData(String),
}

/// Interface to the durable alert record.
pub trait AlertStore: Send + Sync {
    /// Insert an alert and return its assigned id. New alerts are always
    /// unhandled (`is_handled` NULL).
    fn insert_alert(&self, alert: &NewAlert) -> Result<i64, StoreError>;

    /// Count failed-login rule alerts for an IP at or after `window_start`
    /// (epoch seconds). This is the brute-force history: severity 3 and 9
    /// rule-based alerts are the persisted trace of FAILED events.
    fn count_recent_failures(&self, ip: &str, window_start: i64) -> Result<u32, StoreError>;

    /// Alerts awaiting automated response: severity at or above the
    /// threshold, or any AI detection, and not yet handled.
    fn fetch_unhandled(&self, severity_threshold: u8) -> Result<Vec<Alert>, StoreError>;

    /// Record a handling outcome. Once non-null the alert is terminal and
    /// never returned by `fetch_unhandled` again.
    fn update_status(&self, id: i64, tag: &str) -> Result<(), StoreError>;

    /// Most recent alerts, timestamp descending. Read-only consumers
    /// (dashboards) use this; the detection path does not.
    fn recent_alerts(&self, limit: usize) -> Result<Vec<Alert>, StoreError>;
}
