//! Best-effort country enrichment for alert reasons.
//!
//! The lookup is advisory text only: it never raises, never affects
//! severity or control flow, and degrades to `"UNKNOWN"` on any failure
//! (fail-open). Loopback and unspecified addresses short-circuit to
//! `"LOCAL"` without a network call.

use reqwest::blocking::Client;
use std::net::IpAddr;
use std::time::Duration;

const DEFAULT_ENDPOINT: &str = "http://ipinfo.io";
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(1);

pub const COUNTRY_LOCAL: &str = "LOCAL";
pub const COUNTRY_UNKNOWN: &str = "UNKNOWN";

/// Fail-open country-code lookup against an ipinfo-style endpoint.
pub struct GeoEnricher {
    client: Client,
    endpoint: String,
}

impl GeoEnricher {
    pub fn new() -> Self {
        Self::with_endpoint(DEFAULT_ENDPOINT)
    }

    /// Endpoint override, used by tests to point at a local stub.
    pub fn with_endpoint(endpoint: &str) -> Self {
        let client = Client::builder()
            .timeout(LOOKUP_TIMEOUT)
            .build()
            .unwrap_or_default();
        GeoEnricher {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }

    /// Country code for an IP, `"LOCAL"` for loopback/unspecified,
    /// `"UNKNOWN"` on any lookup failure.
    pub fn lookup_country(&self, ip: &IpAddr) -> String {
        if is_local(ip) {
            return COUNTRY_LOCAL.to_string();
        }

        let url = format!("{}/{}/country", self.endpoint, ip);
        match self.client.get(&url).send() {
            Ok(response) if response.status().is_success() => match response.text() {
                Ok(body) => {
                    let code = body.trim();
                    if code.is_empty() {
                        COUNTRY_UNKNOWN.to_string()
                    } else {
                        code.to_string()
                    }
                }
                Err(e) => {
                    log::debug!("geo lookup for {} returned unreadable body: {}", ip, e);
                    COUNTRY_UNKNOWN.to_string()
                }
            },
            Ok(response) => {
                log::debug!("geo lookup for {} returned status {}", ip, response.status());
                COUNTRY_UNKNOWN.to_string()
            }
            Err(e) => {
                log::debug!("geo lookup for {} failed: {}", ip, e);
                COUNTRY_UNKNOWN.to_string()
            }
        }
    }
}

impl Default for GeoEnricher {
    fn default() -> Self {
        Self::new()
    }
}

fn is_local(ip: &IpAddr) -> bool {
    ip.is_loopback() || ip.is_unspecified()
}
