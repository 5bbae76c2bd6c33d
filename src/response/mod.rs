//! Automated response engine.
//!
//! Polls the alert store for unhandled qualifying alerts and executes
//! privileged remediation, recording the outcome as the alert's terminal
//! `is_handled` tag. The central contract is the asymmetry between the
//! two failure kinds: a command that ran and reported a non-zero exit
//! code is terminal (recorded, never retried), while an invocation or
//! environment failure leaves the alert pending so the next poll retries
//! it. The first means "we tried and the system told us no"; the second
//! means "we don't yet know what happened".

pub mod executor;

pub use executor::{CommandOutput, ExecError, PrivilegedCommandExecutor, SystemExecutor};

use crate::models::{Alert, DetectionType};
use crate::persistence::{AlertStore, StoreError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Alerts at or above this severity get their source IP blocked.
pub const CRITICAL_SEVERITY_THRESHOLD: u8 = 9;

/// AI detections at exactly this severity get the account locked.
pub const AI_LOCK_SEVERITY: u8 = 8;

/// usermod's documented exit code for a nonexistent user.
const USERMOD_NO_SUCH_USER: i32 = 6;

pub struct ResponseEngine {
    store: Arc<dyn AlertStore>,
    executor: Box<dyn PrivilegedCommandExecutor>,
    critical_threshold: u8,
}

impl ResponseEngine {
    pub fn new(store: Arc<dyn AlertStore>, executor: Box<dyn PrivilegedCommandExecutor>) -> Self {
        Self::with_threshold(store, executor, CRITICAL_SEVERITY_THRESHOLD)
    }

    pub fn with_threshold(
        store: Arc<dyn AlertStore>,
        executor: Box<dyn PrivilegedCommandExecutor>,
        critical_threshold: u8,
    ) -> Self {
        ResponseEngine {
            store,
            executor,
            critical_threshold,
        }
    }

    /// One deterministic poll cycle: fetch unhandled qualifying alerts and
    /// dispatch each by severity. Returns the number of alerts acted on.
    /// A store error aborts the cycle; the caller retries next tick.
    pub fn poll_once(&self) -> Result<usize, StoreError> {
        let alerts = self.store.fetch_unhandled(self.critical_threshold)?;
        if alerts.is_empty() {
            return Ok(0);
        }

        log::info!("found {} alert(s) to handle", alerts.len());
        let mut dispatched = 0;
        for alert in &alerts {
            if alert.severity >= self.critical_threshold {
                self.block_ip(alert)?;
                dispatched += 1;
            } else if alert.severity == AI_LOCK_SEVERITY
                && alert.detection_type == DetectionType::Ai
            {
                if let Some(username) = alert.username.clone() {
                    self.lock_account(alert, &username)?;
                    dispatched += 1;
                }
            } else {
                log::debug!("alert {} matches no automated action", alert.id);
            }
        }
        Ok(dispatched)
    }

    /// Poll on a fixed interval until the cancellation token clears.
    pub fn run(&self, running: &AtomicBool, interval: Duration) {
        log::info!("response engine started");
        while running.load(Ordering::SeqCst) {
            match self.poll_once() {
                Ok(0) => {}
                Ok(n) => log::info!("dispatched {} alert(s)", n),
                Err(e) => log::error!("poll cycle aborted, retrying next tick: {}", e),
            }
            std::thread::sleep(interval);
        }
        log::info!("response engine stopped");
    }

    /// Insert a drop rule at the head of the inbound chain for the
    /// alert's source IP.
    fn block_ip(&self, alert: &Alert) -> Result<(), StoreError> {
        log::info!("blocking IP {} (alert {})", alert.ip_address, alert.id);

        let argv = [
            "iptables",
            "-I",
            "INPUT",
            "1",
            "-s",
            &alert.ip_address,
            "-j",
            "DROP",
        ];
        match self.executor.run(&argv) {
            Ok(output) if output.exit_code == 0 => {
                self.store.update_status(alert.id, "BLOCKED")?;
                log::info!("blocked {}", alert.ip_address);
            }
            Ok(output) => {
                log::error!(
                    "block command failed with exit code {}: {}",
                    output.exit_code,
                    output.stderr.trim()
                );
                self.store
                    .update_status(alert.id, &format!("BLOCK_FAILED_{}", output.exit_code))?;
            }
            Err(e) => {
                // Outcome unknown: leave the alert pending for retry.
                log::error!("could not invoke block command: {}", e);
            }
        }
        Ok(())
    }

    /// Lock the offending account, refusing to touch the superuser or
    /// the "N/A" sentinel.
    fn lock_account(&self, alert: &Alert, username: &str) -> Result<(), StoreError> {
        if username == "N/A" || username == "root" {
            self.store.update_status(alert.id, "IGNORED_LOCK")?;
            log::info!("refusing to lock '{}' (alert {})", username, alert.id);
            return Ok(());
        }

        log::info!("locking account {} (alert {})", username, alert.id);
        match self.executor.run(&["usermod", "-L", username]) {
            Ok(output) if output.exit_code == 0 => {
                self.store.update_status(alert.id, "LOCKED_USER")?;
                log::info!("locked account {}", username);
            }
            Ok(output) if output.exit_code == USERMOD_NO_SUCH_USER => {
                self.store.update_status(alert.id, "USER_NON_EXISTENT")?;
                log::info!("account '{}' does not exist, nothing to lock", username);
            }
            Ok(output) => {
                log::error!(
                    "lock command failed with exit code {}: {}",
                    output.exit_code,
                    output.stderr.trim()
                );
                self.store
                    .update_status(alert.id, &format!("LOCK_FAIL_{}", output.exit_code))?;
            }
            Err(e) => {
                log::error!("could not invoke lock command: {}", e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewAlert;
    use crate::persistence::SqliteAlertStore;
    use std::sync::Mutex;

    /// Scripted executor recording every invocation.
    pub struct FakeExecutor {
        outcome: FakeOutcome,
        calls: Arc<Mutex<Vec<Vec<String>>>>,
    }

    #[derive(Clone, Copy)]
    pub enum FakeOutcome {
        Exit(i32),
        EnvFailure,
    }

    impl FakeExecutor {
        fn new(outcome: FakeOutcome) -> (Self, Arc<Mutex<Vec<Vec<String>>>>) {
            let calls = Arc::new(Mutex::new(Vec::new()));
            (
                FakeExecutor {
                    outcome,
                    calls: Arc::clone(&calls),
                },
                calls,
            )
        }
    }

    impl PrivilegedCommandExecutor for FakeExecutor {
        fn run(&self, argv: &[&str]) -> Result<CommandOutput, ExecError> {
            self.calls
                .lock()
                .unwrap()
                .push(argv.iter().map(|s| s.to_string()).collect());
            match self.outcome {
                FakeOutcome::Exit(code) => Ok(CommandOutput {
                    exit_code: code,
                    stdout: String::new(),
                    stderr: String::new(),
                }),
                FakeOutcome::EnvFailure => Err(ExecError::Invocation {
                    command: argv[0].to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "no sudo"),
                }),
            }
        }
    }

    fn critical_alert(store: &SqliteAlertStore, ip: &str) -> i64 {
        store
            .insert_alert(&NewAlert {
                timestamp: 1700000000,
                ip_address: ip.to_string(),
                username: Some("N/A".to_string()),
                detection_type: DetectionType::RuleBased,
                reason: "brute force".to_string(),
                severity: 9,
            })
            .unwrap()
    }

    fn ai_alert(store: &SqliteAlertStore, username: Option<&str>) -> i64 {
        store
            .insert_alert(&NewAlert {
                timestamp: 1700000000,
                ip_address: "203.0.113.7".to_string(),
                username: username.map(|u| u.to_string()),
                detection_type: DetectionType::Ai,
                reason: "anomalous pattern".to_string(),
                severity: 8,
            })
            .unwrap()
    }

    fn engine_with(
        outcome: FakeOutcome,
    ) -> (
        ResponseEngine,
        Arc<SqliteAlertStore>,
        Arc<Mutex<Vec<Vec<String>>>>,
    ) {
        let store = Arc::new(SqliteAlertStore::in_memory().unwrap());
        let (executor, calls) = FakeExecutor::new(outcome);
        let engine = ResponseEngine::new(
            Arc::clone(&store) as Arc<dyn AlertStore>,
            Box::new(executor),
        );
        (engine, store, calls)
    }

    fn status_of(store: &SqliteAlertStore, id: i64) -> Option<String> {
        store
            .recent_alerts(100)
            .unwrap()
            .into_iter()
            .find(|a| a.id == id)
            .and_then(|a| a.is_handled)
    }

    #[test]
    fn critical_alert_blocks_ip_on_clean_exit() {
        let (engine, store, calls) = engine_with(FakeOutcome::Exit(0));
        let id = critical_alert(&store, "1.2.3.4");

        assert_eq!(engine.poll_once().unwrap(), 1);

        assert_eq!(status_of(&store, id).as_deref(), Some("BLOCKED"));
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0],
            vec!["iptables", "-I", "INPUT", "1", "-s", "1.2.3.4", "-j", "DROP"]
        );
    }

    #[test]
    fn block_command_failure_is_terminal() {
        let (engine, store, calls) = engine_with(FakeOutcome::Exit(4));
        let id = critical_alert(&store, "1.2.3.4");

        engine.poll_once().unwrap();
        assert_eq!(status_of(&store, id).as_deref(), Some("BLOCK_FAILED_4"));

        // Terminal: the next cycle must not retry.
        assert_eq!(engine.poll_once().unwrap(), 0);
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn environment_failure_leaves_alert_pending_for_retry() {
        let (engine, store, calls) = engine_with(FakeOutcome::EnvFailure);
        let id = critical_alert(&store, "1.2.3.4");

        engine.poll_once().unwrap();
        assert_eq!(status_of(&store, id), None);

        // Still pending: retried on the next poll.
        assert_eq!(engine.poll_once().unwrap(), 1);
        assert_eq!(calls.lock().unwrap().len(), 2);
    }

    #[test]
    fn root_account_is_never_locked() {
        let (engine, store, calls) = engine_with(FakeOutcome::Exit(0));
        let id = ai_alert(&store, Some("root"));

        engine.poll_once().unwrap();

        assert_eq!(status_of(&store, id).as_deref(), Some("IGNORED_LOCK"));
        assert!(calls.lock().unwrap().is_empty(), "no command may run");
    }

    #[test]
    fn sentinel_username_is_never_locked() {
        let (engine, store, calls) = engine_with(FakeOutcome::Exit(0));
        let id = ai_alert(&store, Some("N/A"));

        engine.poll_once().unwrap();

        assert_eq!(status_of(&store, id).as_deref(), Some("IGNORED_LOCK"));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn lock_succeeds_on_clean_exit() {
        let (engine, store, calls) = engine_with(FakeOutcome::Exit(0));
        let id = ai_alert(&store, Some("mallory"));

        engine.poll_once().unwrap();

        assert_eq!(status_of(&store, id).as_deref(), Some("LOCKED_USER"));
        assert_eq!(calls.lock().unwrap()[0], vec!["usermod", "-L", "mallory"]);
    }

    #[test]
    fn exit_code_6_maps_to_user_non_existent() {
        let (engine, store, _calls) = engine_with(FakeOutcome::Exit(6));
        let id = ai_alert(&store, Some("ghost"));

        engine.poll_once().unwrap();

        // Never the generic LOCK_FAIL_6.
        assert_eq!(status_of(&store, id).as_deref(), Some("USER_NON_EXISTENT"));
    }

    #[test]
    fn other_lock_failures_record_the_exit_code() {
        let (engine, store, _calls) = engine_with(FakeOutcome::Exit(3));
        let id = ai_alert(&store, Some("mallory"));

        engine.poll_once().unwrap();

        assert_eq!(status_of(&store, id).as_deref(), Some("LOCK_FAIL_3"));
    }

    #[test]
    fn lock_environment_failure_is_retryable() {
        let (engine, store, calls) = engine_with(FakeOutcome::EnvFailure);
        let id = ai_alert(&store, Some("mallory"));

        engine.poll_once().unwrap();
        assert_eq!(status_of(&store, id), None);

        engine.poll_once().unwrap();
        assert_eq!(calls.lock().unwrap().len(), 2);
    }

    #[test]
    fn ai_alert_without_username_is_left_alone() {
        let (engine, store, calls) = engine_with(FakeOutcome::Exit(0));
        let id = ai_alert(&store, None);

        assert_eq!(engine.poll_once().unwrap(), 0);

        assert_eq!(status_of(&store, id), None);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn handled_alerts_are_never_revisited() {
        let (engine, store, calls) = engine_with(FakeOutcome::Exit(0));
        critical_alert(&store, "1.2.3.4");

        assert_eq!(engine.poll_once().unwrap(), 1);
        assert_eq!(engine.poll_once().unwrap(), 0);
        assert_eq!(calls.lock().unwrap().len(), 1);
    }
}
