use chrono::{DateTime, Local};
use std::net::IpAddr;

/// Outcome of an SSH password authentication attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStatus {
    Success,
    Failed,
}

impl LoginStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoginStatus::Success => "SUCCESS",
            LoginStatus::Failed => "FAILED",
        }
    }
}

/// A structured authentication event extracted from one log line.
///
/// Transient: events flow through the rule engine and anomaly scorer
/// but are never persisted directly; only the alerts they produce are.
#[derive(Debug, Clone)]
pub struct AuthEvent {
    pub timestamp: DateTime<Local>,
    pub username: String,
    pub ip: IpAddr,
    pub status: LoginStatus,
}

impl AuthEvent {
    /// Event time as epoch seconds, the representation stored alongside alerts.
    pub fn epoch(&self) -> i64 {
        self.timestamp.timestamp()
    }
}
