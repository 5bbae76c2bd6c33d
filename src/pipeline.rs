//! Ingestion pipeline: log watcher → parser → {rule engine, anomaly
//! scorer} → alert store.
//!
//! One `process_cycle` call per poll tick. The pipeline shares no
//! in-memory state with the response engine; the alert store is the only
//! coordination point, so either loop can crash and restart on its own.

use crate::anomaly::{AnomalyLabel, AnomalyScorer};
use crate::config::Config;
use crate::detection::RuleEngine;
use crate::geolocation::GeoEnricher;
use crate::input::{EventParser, LogWatcher, WatchError};
use crate::models::{AuthEvent, DetectionType, NewAlert};
use crate::persistence::{AlertStore, StoreError};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What one poll cycle did, for logging and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct CycleStats {
    pub lines_read: usize,
    pub events_parsed: usize,
    pub alerts_inserted: usize,
}

pub struct IngestPipeline {
    watcher: LogWatcher,
    parser: EventParser,
    enricher: GeoEnricher,
    rules: RuleEngine,
    scorer: Option<Box<dyn AnomalyScorer>>,
    store: Arc<dyn AlertStore>,
    history_path: Option<PathBuf>,
}

impl IngestPipeline {
    pub fn new(
        config: &Config,
        store: Arc<dyn AlertStore>,
        scorer: Option<Box<dyn AnomalyScorer>>,
    ) -> Self {
        Self::with_enricher(config, store, scorer, GeoEnricher::new())
    }

    /// Constructor with an explicit enricher, used by tests to point the
    /// geo lookup at a stub endpoint.
    pub fn with_enricher(
        config: &Config,
        store: Arc<dyn AlertStore>,
        scorer: Option<Box<dyn AnomalyScorer>>,
        enricher: GeoEnricher,
    ) -> Self {
        IngestPipeline {
            watcher: LogWatcher::new(
                config.watcher.log_path.clone(),
                config.watcher.offset_path.clone(),
            ),
            parser: EventParser::new(),
            enricher,
            rules: RuleEngine::new(config),
            scorer,
            store,
            history_path: config.anomaly.history_path.clone(),
        }
    }

    /// One deterministic ingestion cycle. A store error aborts the cycle
    /// (already-persisted offset means the skipped lines are lost, per the
    /// at-most-once contract); the caller retries on the next tick.
    pub fn process_cycle(&mut self) -> Result<CycleStats, PipelineError> {
        if let Some(scorer) = self.scorer.as_mut() {
            if let Err(e) = scorer.reload_if_changed() {
                log::warn!("model artifact reload failed, keeping current model: {}", e);
            }
        }

        let lines = self.watcher.read_new_lines()?;
        let mut stats = CycleStats {
            lines_read: lines.len(),
            ..CycleStats::default()
        };

        for line in &lines {
            let Some(event) = self.parser.parse(line) else {
                continue;
            };
            stats.events_parsed += 1;

            // Whitelist wins over everything, the scorer included.
            if self.rules.is_whitelisted(&event) {
                continue;
            }

            self.append_history(&event);
            let country = self.enricher.lookup_country(&event.ip);

            if let Some(alert) = self.rules.evaluate(&event, &country, self.store.as_ref())? {
                log::warn!(
                    "ALERT [{} sev {}] {}",
                    alert.detection_type.as_str(),
                    alert.severity,
                    alert.reason
                );
                self.store.insert_alert(&alert)?;
                stats.alerts_inserted += 1;
            }

            if let Some(scorer) = &self.scorer {
                if scorer.classify(&event) == AnomalyLabel::Anomalous {
                    let alert = NewAlert {
                        timestamp: event.epoch(),
                        ip_address: event.ip.to_string(),
                        username: Some(event.username.clone()),
                        detection_type: DetectionType::Ai,
                        reason: format!(
                            "AI: anomalous authentication pattern for user: {} from Country: {}",
                            event.username, country
                        ),
                        severity: 8,
                    };
                    log::warn!("ALERT [AI sev 8] {}", alert.reason);
                    self.store.insert_alert(&alert)?;
                    stats.alerts_inserted += 1;
                }
            }
        }

        Ok(stats)
    }

    /// Poll on a fixed interval until the cancellation token clears.
    pub fn run(&mut self, running: &AtomicBool, interval: Duration) {
        log::info!("ingestion pipeline started");
        while running.load(Ordering::SeqCst) {
            match self.process_cycle() {
                Ok(stats) if stats.alerts_inserted > 0 => {
                    log::info!(
                        "cycle: {} lines, {} events, {} alerts",
                        stats.lines_read,
                        stats.events_parsed,
                        stats.alerts_inserted
                    );
                }
                Ok(_) => {}
                Err(e) => log::error!("ingestion cycle aborted, retrying next tick: {}", e),
            }
            std::thread::sleep(interval);
        }
        log::info!("ingestion pipeline stopped");
    }

    /// Append the event to the history file consumed by the offline
    /// retraining job. Best-effort: a failure never stalls detection.
    fn append_history(&self, event: &AuthEvent) {
        let Some(path) = &self.history_path else {
            return;
        };

        let write = || -> std::io::Result<()> {
            let new_file = !path.exists();
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            if new_file {
                writeln!(file, "Timestamp,IP_Address,Username,Status")?;
            }
            writeln!(
                file,
                "{},{},{},{}",
                event.epoch(),
                event.ip,
                event.username,
                event.status.as_str()
            )
        };

        if let Err(e) = write() {
            log::warn!("failed to append retraining history: {}", e);
        }
    }
}
