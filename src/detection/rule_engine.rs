//! Whitelist, time-window and brute-force rules.
//!
//! Rules are evaluated in strict order with short-circuit: whitelist
//! always wins, the time-window rule only sees successes, the brute-force
//! rule only sees failures. At most one alert is produced per event, and
//! an in-window successful login produces none.

use crate::config::{BruteForceThreshold, Config, TimeWindow};
use crate::models::{AuthEvent, DetectionType, LoginStatus, NewAlert};
use crate::persistence::{AlertStore, StoreError};
use std::collections::HashSet;

/// Rule-based detector over single authentication events plus the
/// store-backed brute-force history.
pub struct RuleEngine {
    ip_whitelist: HashSet<String>,
    user_whitelist: HashSet<String>,
    window: TimeWindow,
    threshold: BruteForceThreshold,
}

impl RuleEngine {
    pub fn new(config: &Config) -> Self {
        RuleEngine {
            ip_whitelist: config.ip_whitelist.clone(),
            user_whitelist: config.user_whitelist.clone(),
            window: config.time_window.clone(),
            threshold: config.brute_force_threshold.clone(),
        }
    }

    /// Whitelisted events are suppressed entirely, regardless of status;
    /// the pipeline also skips the anomaly scorer for them.
    pub fn is_whitelisted(&self, event: &AuthEvent) -> bool {
        self.ip_whitelist.contains(&event.ip.to_string())
            || self.user_whitelist.contains(&event.username)
    }

    /// Evaluate one event, producing zero or one alert.
    ///
    /// `country` is advisory enrichment text embedded in the reason; it
    /// never affects severity or which rule fires.
    pub fn evaluate(
        &self,
        event: &AuthEvent,
        country: &str,
        store: &dyn AlertStore,
    ) -> Result<Option<NewAlert>, StoreError> {
        if self.is_whitelisted(event) {
            return Ok(None);
        }

        let clock = event.timestamp.time();
        if event.status == LoginStatus::Success
            && (clock < self.window.start || clock > self.window.end)
        {
            return Ok(Some(NewAlert {
                timestamp: event.epoch(),
                ip_address: event.ip.to_string(),
                username: Some(event.username.clone()),
                detection_type: DetectionType::RuleBased,
                reason: format!(
                    "Successful login outside working hours from Country: {}",
                    country
                ),
                severity: 7,
            }));
        }

        if event.status == LoginStatus::Failed {
            let minutes = self.threshold.time_span_minutes;
            let window_start = event.epoch() - minutes * 60;
            let prior = store.count_recent_failures(&event.ip.to_string(), window_start)?;

            // `prior` counts earlier attempts only; the current one makes
            // it prior + 1, hence the threshold-minus-one comparison.
            if prior >= self.threshold.attempts - 1 {
                return Ok(Some(NewAlert {
                    timestamp: event.epoch(),
                    ip_address: event.ip.to_string(),
                    username: Some("N/A".to_string()),
                    detection_type: DetectionType::RuleBased,
                    reason: format!(
                        "CRITICAL: Brute force ({} attempts) detected in last {} min from Country: {}. Triggering BLOCK.",
                        prior + 1,
                        minutes,
                        country
                    ),
                    severity: 9,
                }));
            }

            return Ok(Some(NewAlert {
                timestamp: event.epoch(),
                ip_address: event.ip.to_string(),
                username: Some(event.username.clone()),
                detection_type: DetectionType::RuleBased,
                reason: format!(
                    "Failed login attempt for user: {} from Country: {}.",
                    event.username, country
                ),
                severity: 3,
            }));
        }

        Ok(None)
    }
}
