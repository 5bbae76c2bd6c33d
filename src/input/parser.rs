use crate::models::{AuthEvent, LoginStatus};
use chrono::{DateTime, Datelike, Local, NaiveDateTime, TimeZone};
use regex::Regex;
use std::net::IpAddr;
use std::str::FromStr;

/// Grammar for sshd password-authentication lines, e.g.
/// `Oct  5 03:22:11 bastion sshd[4321]: Failed password for invalid user admin from 203.0.113.7 port 51122 ssh2`.
/// Only the leading fields through the IP are required to match.
const SSH_PATTERN: &str = r"(?P<timestamp>\w{3}\s+\d{1,2}\s+\d{2}:\d{2}:\d{2})\s+(?P<hostname>\S+)\s+sshd\[\d+\]:\s+(?P<status>Accepted|Failed)\s+password\s+for\s+(?:invalid user\s+)?(?P<username>\w+)\s+from\s+(?P<ip>\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})\s+port\s+";

/// Extracts structured authentication events from raw log lines.
pub struct EventParser {
    pattern: Regex,
}

impl EventParser {
    pub fn new() -> Self {
        EventParser {
            // The pattern is a compile-time constant; it cannot fail to build.
            pattern: Regex::new(SSH_PATTERN).expect("invalid SSH log pattern"),
        }
    }

    /// Parse one log line. Non-matching lines return `None`; that is the
    /// expected outcome for the bulk of log content (session open/close,
    /// key exchange, etc.), not an error.
    pub fn parse(&self, line: &str) -> Option<AuthEvent> {
        let captures = self.pattern.captures(line)?;

        let ip = match IpAddr::from_str(&captures["ip"]) {
            Ok(ip) => ip,
            Err(_) => {
                log::debug!("skipping line with unparsable IP: {}", &captures["ip"]);
                return None;
            }
        };

        let status = match &captures["status"] {
            "Accepted" => LoginStatus::Success,
            _ => LoginStatus::Failed,
        };

        let timestamp = parse_syslog_timestamp(&captures["timestamp"]).unwrap_or_else(|| {
            log::debug!("unparsable timestamp, falling back to now");
            Local::now()
        });

        Some(AuthEvent {
            timestamp,
            username: captures["username"].to_string(),
            ip,
            status,
        })
    }
}

impl Default for EventParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Syslog timestamps carry no year; assume the current local year.
fn parse_syslog_timestamp(raw: &str) -> Option<DateTime<Local>> {
    let mut parts = raw.split_whitespace();
    let month = parts.next()?;
    let day = parts.next()?;
    let time = parts.next()?;

    let with_year = format!("{} {} {} {}", Local::now().year(), month, day, time);
    let naive = NaiveDateTime::parse_from_str(&with_year, "%Y %b %d %H:%M:%S").ok()?;
    Local.from_local_datetime(&naive).earliest()
}
