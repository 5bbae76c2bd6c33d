pub mod anomaly;
pub mod config;
pub mod detection;
pub mod geolocation;
pub mod input;
pub mod models;
pub mod persistence;
pub mod pipeline;
pub mod response;

// Re-export commonly used types
pub use anomaly::{AnomalyLabel, AnomalyScorer, ArtifactScorer};
pub use config::Config;
pub use detection::RuleEngine;
pub use geolocation::GeoEnricher;
pub use input::{EventParser, LogWatcher};
pub use models::{Alert, AuthEvent, DetectionType, LoginStatus, NewAlert};
pub use persistence::{AlertStore, SqliteAlertStore};
pub use pipeline::IngestPipeline;
pub use response::{PrivilegedCommandExecutor, ResponseEngine, SystemExecutor};
