//! End-to-end scenarios: log file in, remediation status out.

use chrono::NaiveTime;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use heimdall::anomaly::{AnomalyLabel, AnomalyScorer};
use heimdall::config::{
    AnomalyConfig, BruteForceThreshold, Config, IngestConfig, ResponseConfig, StoreConfig,
    TimeWindow, WatcherConfig,
};
use heimdall::geolocation::GeoEnricher;
use heimdall::models::{AuthEvent, DetectionType};
use heimdall::persistence::{AlertStore, SqliteAlertStore};
use heimdall::pipeline::IngestPipeline;
use heimdall::response::{
    CommandOutput, ExecError, PrivilegedCommandExecutor, ResponseEngine,
};

/// Executor that records every argv and always exits cleanly.
struct RecordingExecutor {
    calls: Arc<Mutex<Vec<Vec<String>>>>,
}

impl PrivilegedCommandExecutor for RecordingExecutor {
    fn run(&self, argv: &[&str]) -> Result<CommandOutput, ExecError> {
        self.calls
            .lock()
            .unwrap()
            .push(argv.iter().map(|s| s.to_string()).collect());
        Ok(CommandOutput {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
        })
    }
}

/// Scorer flagging every event, standing in for a loaded model artifact.
struct AlwaysAnomalous;

impl AnomalyScorer for AlwaysAnomalous {
    fn classify(&self, _event: &AuthEvent) -> AnomalyLabel {
        AnomalyLabel::Anomalous
    }
}

fn test_config(dir: &TempDir) -> Config {
    Config {
        ip_whitelist: HashSet::new(),
        user_whitelist: HashSet::new(),
        time_window: TimeWindow {
            start: NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(23, 59, 0).unwrap(),
        },
        brute_force_threshold: BruteForceThreshold {
            attempts: 5,
            time_span_minutes: 5,
        },
        watcher: WatcherConfig {
            log_path: dir.path().join("secure"),
            offset_path: dir.path().join("secure_offset.txt"),
        },
        store: StoreConfig {
            db_path: dir.path().join("alerts.db"),
        },
        anomaly: AnomalyConfig::default(),
        ingest: IngestConfig::default(),
        response: ResponseConfig::default(),
    }
}

/// Enricher pointed at a closed port: fails fast, degrades to UNKNOWN.
fn offline_enricher() -> GeoEnricher {
    GeoEnricher::with_endpoint("http://127.0.0.1:1")
}

fn write_log(dir: &TempDir, lines: &[&str]) {
    let content = lines.join("\n") + "\n";
    std::fs::write(dir.path().join("secure"), content).unwrap();
}

fn response_engine(store: Arc<SqliteAlertStore>) -> (ResponseEngine, Arc<Mutex<Vec<Vec<String>>>>) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let executor = RecordingExecutor {
        calls: Arc::clone(&calls),
    };
    let engine = ResponseEngine::new(store as Arc<dyn AlertStore>, Box::new(executor));
    (engine, calls)
}

#[test]
fn brute_force_is_detected_and_blocked() {
    // Scenario A: 5 consecutive failures from one IP inside 2 minutes,
    // threshold {attempts: 5, time_span_minutes: 5}.
    let dir = TempDir::new().unwrap();
    write_log(
        &dir,
        &[
            "Aug 12 10:00:01 bastion sshd[100]: Failed password for invalid user admin from 1.2.3.4 port 40001 ssh2",
            "Aug 12 10:00:20 bastion sshd[101]: Failed password for invalid user admin from 1.2.3.4 port 40002 ssh2",
            "Aug 12 10:00:44 bastion sshd[102]: Failed password for root from 1.2.3.4 port 40003 ssh2",
            "Aug 12 10:01:10 bastion sshd[103]: Failed password for root from 1.2.3.4 port 40004 ssh2",
            "Aug 12 10:01:55 bastion sshd[104]: Failed password for root from 1.2.3.4 port 40005 ssh2",
        ],
    );

    let config = test_config(&dir);
    let store = Arc::new(SqliteAlertStore::in_memory().unwrap());
    let mut pipeline = IngestPipeline::with_enricher(
        &config,
        Arc::clone(&store) as Arc<dyn AlertStore>,
        None,
        offline_enricher(),
    );

    let stats = pipeline.process_cycle().unwrap();
    assert_eq!(stats.lines_read, 5);
    assert_eq!(stats.events_parsed, 5);
    assert_eq!(stats.alerts_inserted, 5);

    let alerts = store.recent_alerts(10).unwrap();
    let critical: Vec<_> = alerts.iter().filter(|a| a.severity == 9).collect();
    assert_eq!(critical.len(), 1, "exactly the 5th line goes critical");
    assert_eq!(critical[0].username.as_deref(), Some("N/A"));
    assert!(critical[0].reason.contains("Brute force (5 attempts)"));
    assert_eq!(alerts.iter().filter(|a| a.severity == 3).count(), 4);

    // Response engine blocks the IP and records the terminal status.
    let (engine, calls) = response_engine(Arc::clone(&store));
    assert_eq!(engine.poll_once().unwrap(), 1);

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0][0], "iptables");
    assert!(calls[0].contains(&"1.2.3.4".to_string()));

    let blocked = store
        .recent_alerts(10)
        .unwrap()
        .into_iter()
        .find(|a| a.severity == 9)
        .unwrap();
    assert_eq!(blocked.is_handled.as_deref(), Some("BLOCKED"));

    // Second cycle: no file growth, nothing re-read.
    let stats = pipeline.process_cycle().unwrap();
    assert_eq!(stats.lines_read, 0);
}

#[test]
fn anomalous_root_login_is_ignored_not_locked() {
    // Scenario B: anomaly-positive failure for root yields a severity-8
    // AI alert, which the responder refuses to act on with a lock.
    let dir = TempDir::new().unwrap();
    write_log(
        &dir,
        &["Aug 12 03:13:37 bastion sshd[200]: Failed password for root from 203.0.113.50 port 55555 ssh2"],
    );

    let config = test_config(&dir);
    let store = Arc::new(SqliteAlertStore::in_memory().unwrap());
    let scorer = Box::new(AlwaysAnomalous);
    let mut pipeline = IngestPipeline::with_enricher(
        &config,
        Arc::clone(&store) as Arc<dyn AlertStore>,
        Some(scorer),
        offline_enricher(),
    );

    pipeline.process_cycle().unwrap();

    let alerts = store.recent_alerts(10).unwrap();
    let ai: Vec<_> = alerts
        .iter()
        .filter(|a| a.detection_type == DetectionType::Ai)
        .collect();
    assert_eq!(ai.len(), 1);
    assert_eq!(ai[0].severity, 8);
    assert_eq!(ai[0].username.as_deref(), Some("root"));

    let (engine, calls) = response_engine(Arc::clone(&store));
    engine.poll_once().unwrap();

    assert!(calls.lock().unwrap().is_empty(), "no lock command may run");
    let handled = store
        .recent_alerts(10)
        .unwrap()
        .into_iter()
        .find(|a| a.detection_type == DetectionType::Ai)
        .unwrap();
    assert_eq!(handled.is_handled.as_deref(), Some("IGNORED_LOCK"));
}

#[test]
fn corrupt_offset_file_triggers_full_reread() {
    // Scenario C: non-numeric offset content is treated as offset 0.
    let dir = TempDir::new().unwrap();
    write_log(
        &dir,
        &[
            "Aug 12 10:00:01 bastion sshd[100]: Failed password for bob from 198.51.100.7 port 40001 ssh2",
            "Aug 12 10:00:02 bastion sshd[100]: Failed password for bob from 198.51.100.7 port 40002 ssh2",
        ],
    );
    std::fs::write(dir.path().join("secure_offset.txt"), "definitely not a number").unwrap();

    let config = test_config(&dir);
    let store = Arc::new(SqliteAlertStore::in_memory().unwrap());
    let mut pipeline = IngestPipeline::with_enricher(
        &config,
        Arc::clone(&store) as Arc<dyn AlertStore>,
        None,
        offline_enricher(),
    );

    let stats = pipeline.process_cycle().unwrap();
    assert_eq!(stats.lines_read, 2, "whole file re-read from offset 0");
    assert_eq!(stats.alerts_inserted, 2);

    // Offset file now holds the real end-of-file position.
    let offset: u64 = std::fs::read_to_string(dir.path().join("secure_offset.txt"))
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    let log_len = std::fs::metadata(dir.path().join("secure")).unwrap().len();
    assert_eq!(offset, log_len);
}

#[test]
fn whitelisted_ip_produces_no_alerts_at_all() {
    let dir = TempDir::new().unwrap();
    write_log(
        &dir,
        &["Aug 12 10:00:01 bastion sshd[100]: Failed password for root from 10.0.0.5 port 40001 ssh2"],
    );

    let mut config = test_config(&dir);
    config.ip_whitelist.insert("10.0.0.5".to_string());

    let store = Arc::new(SqliteAlertStore::in_memory().unwrap());
    let scorer = Box::new(AlwaysAnomalous);
    let mut pipeline = IngestPipeline::with_enricher(
        &config,
        Arc::clone(&store) as Arc<dyn AlertStore>,
        Some(scorer),
        offline_enricher(),
    );

    let stats = pipeline.process_cycle().unwrap();
    assert_eq!(stats.events_parsed, 1);
    assert_eq!(stats.alerts_inserted, 0, "whitelist suppresses the scorer too");
    assert!(store.recent_alerts(10).unwrap().is_empty());
}

#[test]
fn history_file_feeds_the_retraining_job() {
    let dir = TempDir::new().unwrap();
    write_log(
        &dir,
        &[
            "Aug 12 10:00:01 bastion sshd[100]: Failed password for bob from 198.51.100.7 port 40001 ssh2",
            "Aug 12 10:00:02 bastion sshd[100]: Accepted password for alice from 192.0.2.10 port 40002 ssh2",
        ],
    );

    let mut config = test_config(&dir);
    let history_path = dir.path().join("history.csv");
    config.anomaly.history_path = Some(history_path.clone());

    let store = Arc::new(SqliteAlertStore::in_memory().unwrap());
    let mut pipeline = IngestPipeline::with_enricher(
        &config,
        Arc::clone(&store) as Arc<dyn AlertStore>,
        None,
        offline_enricher(),
    );
    pipeline.process_cycle().unwrap();

    let history = std::fs::read_to_string(&history_path).unwrap();
    let lines: Vec<&str> = history.lines().collect();
    assert_eq!(lines[0], "Timestamp,IP_Address,Username,Status");
    assert_eq!(lines.len(), 3);
    assert!(lines[1].ends_with("198.51.100.7,bob,FAILED"));
    assert!(lines[2].ends_with("192.0.2.10,alice,SUCCESS"));
}
