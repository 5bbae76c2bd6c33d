//! Anomaly scoring against a pretrained, offline-fitted model artifact.
//!
//! The model and its categorical encoders are fit entirely by the offline
//! retraining job from full historical data; this module only loads the
//! resulting artifact and scores events with it. The artifact is a
//! versioned JSON file replaced atomically by the retrainer, so the
//! scorer is deterministic and stateless between retraining cycles.

use crate::models::{AuthEvent, LoginStatus};
use chrono::{Datelike, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;

/// Artifact format version this build understands.
pub const ARTIFACT_VERSION: u32 = 1;

/// Stable id for categorical tokens unseen during training.
pub const UNKNOWN_CODE: i64 = -1;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("failed to read model artifact: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed model artifact: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unsupported artifact version {0} (expected {ARTIFACT_VERSION})")]
    UnsupportedVersion(u32),
}

/// Classification outcome for a single event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnomalyLabel {
    Normal,
    Anomalous,
}

/// The ordered feature-vector contract shared with the retraining job:
/// encoded IP, encoded username, hour of day, day of week (Monday = 0),
/// and success flag (1/0).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector {
    pub ip_id: i64,
    pub user_id: i64,
    pub hour: u32,
    pub weekday: u32,
    pub success: u8,
}

impl FeatureVector {
    pub fn to_array(self) -> [f64; 5] {
        [
            self.ip_id as f64,
            self.user_id as f64,
            self.hour as f64,
            self.weekday as f64,
            self.success as f64,
        ]
    }
}

/// Categorical encoders exported by the retrainer. Tokens it never saw
/// map to the reserved unknown bucket instead of failing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Encoders {
    pub ip_codes: HashMap<String, i64>,
    pub user_codes: HashMap<String, i64>,
}

impl Encoders {
    pub fn encode_ip(&self, ip: &str) -> i64 {
        self.ip_codes.get(ip).copied().unwrap_or(UNKNOWN_CODE)
    }

    pub fn encode_user(&self, user: &str) -> i64 {
        self.user_codes.get(user).copied().unwrap_or(UNKNOWN_CODE)
    }
}

/// The exported decision function: per-feature training distribution and
/// an outlier threshold on the largest absolute z-score. Any equivalent
/// model-serving mechanism can produce these numbers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlierModel {
    pub feature_means: [f64; 5],
    pub feature_stds: [f64; 5],
    pub threshold: f64,
}

impl OutlierModel {
    pub fn score(&self, features: FeatureVector) -> f64 {
        features
            .to_array()
            .iter()
            .zip(self.feature_means.iter().zip(self.feature_stds.iter()))
            .map(|(x, (mean, std))| ((x - mean) / std.max(1e-9)).abs())
            .fold(0.0, f64::max)
    }
}

/// Versioned, serialized model artifact. Read-only here; the retraining
/// job replaces the file atomically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub version: u32,
    pub trained_at: String,
    pub encoders: Encoders,
    pub model: OutlierModel,
}

impl ModelArtifact {
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let artifact: ModelArtifact = serde_json::from_str(json)?;
        if artifact.version != ARTIFACT_VERSION {
            return Err(ModelError::UnsupportedVersion(artifact.version));
        }
        Ok(artifact)
    }
}

/// Classifies authentication events as normal or anomalous.
pub trait AnomalyScorer: Send {
    fn classify(&self, event: &AuthEvent) -> AnomalyLabel;

    /// Pick up an atomically replaced artifact, if the implementation
    /// is backed by one. Returns whether a reload happened.
    fn reload_if_changed(&mut self) -> Result<bool, ModelError> {
        Ok(false)
    }
}

/// Scorer backed by the JSON model artifact on disk.
pub struct ArtifactScorer {
    path: PathBuf,
    artifact: ModelArtifact,
    loaded_mtime: Option<SystemTime>,
}

impl ArtifactScorer {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ModelError> {
        let path = path.as_ref().to_path_buf();
        let contents = std::fs::read_to_string(&path)?;
        let artifact = ModelArtifact::from_json(&contents)?;
        let loaded_mtime = std::fs::metadata(&path).and_then(|m| m.modified()).ok();
        log::info!(
            "loaded model artifact from {:?} (trained at {})",
            path,
            artifact.trained_at
        );
        Ok(ArtifactScorer {
            path,
            artifact,
            loaded_mtime,
        })
    }

    pub fn features(&self, event: &AuthEvent) -> FeatureVector {
        FeatureVector {
            ip_id: self.artifact.encoders.encode_ip(&event.ip.to_string()),
            user_id: self.artifact.encoders.encode_user(&event.username),
            hour: event.timestamp.hour(),
            weekday: event.timestamp.weekday().num_days_from_monday(),
            success: match event.status {
                LoginStatus::Success => 1,
                LoginStatus::Failed => 0,
            },
        }
    }
}

impl AnomalyScorer for ArtifactScorer {
    fn classify(&self, event: &AuthEvent) -> AnomalyLabel {
        let features = self.features(event);
        if self.artifact.model.score(features) > self.artifact.model.threshold {
            AnomalyLabel::Anomalous
        } else {
            AnomalyLabel::Normal
        }
    }

    fn reload_if_changed(&mut self) -> Result<bool, ModelError> {
        let mtime = match std::fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(mtime) => mtime,
            // Mid-replacement or transient stat failure: keep the loaded model.
            Err(_) => return Ok(false),
        };

        if self.loaded_mtime == Some(mtime) {
            return Ok(false);
        }

        let contents = std::fs::read_to_string(&self.path)?;
        self.artifact = ModelArtifact::from_json(&contents)?;
        self.loaded_mtime = Some(mtime);
        log::info!(
            "reloaded model artifact (trained at {})",
            self.artifact.trained_at
        );
        Ok(true)
    }
}
