use serde::{Deserialize, Serialize};

/// Which detector produced an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectionType {
    RuleBased,
    Ai,
}

impl DetectionType {
    /// Tag stored in the alerts table.
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionType::RuleBased => "RULE-BASED",
            DetectionType::Ai => "AI",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "RULE-BASED" => Some(DetectionType::RuleBased),
            "AI" => Some(DetectionType::Ai),
            _ => None,
        }
    }
}

/// An alert ready for insertion; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewAlert {
    /// Event time as epoch seconds.
    pub timestamp: i64,
    pub ip_address: String,
    /// `Some("N/A")` for critical brute-force alerts, which identify an IP
    /// rather than a user.
    pub username: Option<String>,
    pub detection_type: DetectionType,
    /// Free-text explanation, including geo enrichment.
    pub reason: String,
    pub severity: u8,
}

/// A persisted alert row.
///
/// `is_handled` is the response engine's state tag: `None` means pending,
/// any non-null value is terminal and the alert is never revisited.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub id: i64,
    pub timestamp: i64,
    pub ip_address: String,
    pub username: Option<String>,
    pub detection_type: DetectionType,
    pub reason: String,
    pub severity: u8,
    pub is_handled: Option<String>,
}
