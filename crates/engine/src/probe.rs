//! HTTP reachability probe.
//!
//! One probe call issues a single GET with an enforced timeout and
//! classifies the outcome. Retry policy lives one layer up: the scheduler
//! simply re-probes on its next tick.

use std::time::{Duration, Instant};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::store::HealthStatus;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(30);

const PROBE_USER_AGENT: &str = "AgentOps-HealthCheck/1.0";

const DEGRADED_THRESHOLD_MS: i64 = 5000;
const SLOW_THRESHOLD_MS: i64 = 1000;

/// Classified result of a single probe execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub status: HealthStatus,
    pub status_code: Option<i32>,
    pub response_time_ms: i64,
    pub tls_valid: Option<bool>,
    pub error_message: Option<String>,
}

#[derive(Clone)]
pub struct HealthProber {
    client: Client,
}

impl HealthProber {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    /// Probe a URL once. Timeouts and network failures are not errors; they
    /// are the modeled `down` outcome.
    pub async fn check(&self, url: &str, timeout: Duration) -> ProbeOutcome {
        debug!("Probing {}", url);

        let https = url.starts_with("https://");
        let start = Instant::now();

        match self
            .client
            .get(url)
            .timeout(timeout)
            .header(reqwest::header::USER_AGENT, PROBE_USER_AGENT)
            .send()
            .await
        {
            Ok(response) => {
                let response_time_ms = start.elapsed().as_millis() as i64;
                let code = response.status().as_u16();
                let status = classify(code, response_time_ms);

                ProbeOutcome {
                    status,
                    status_code: Some(code as i32),
                    response_time_ms,
                    // The handshake already succeeded if a response came
                    // back at all. Certificate chain and expiry inspection
                    // is a known limitation, not performed here.
                    tls_valid: if https { Some(true) } else { None },
                    error_message: if code >= 400 {
                        Some(format!("HTTP {}", code))
                    } else {
                        None
                    },
                }
            }
            Err(e) => {
                let response_time_ms = start.elapsed().as_millis() as i64;

                ProbeOutcome {
                    status: HealthStatus::Down,
                    status_code: None,
                    response_time_ms,
                    tls_valid: None,
                    error_message: Some(e.to_string()),
                }
            }
        }
    }
}

impl Default for HealthProber {
    fn default() -> Self {
        Self::new()
    }
}

/// Classification policy, checked in order: server errors beat client
/// errors beat latency tiers.
pub fn classify(status_code: u16, response_time_ms: i64) -> HealthStatus {
    if status_code >= 500 {
        HealthStatus::Down
    } else if status_code >= 400 {
        HealthStatus::Error
    } else if response_time_ms > DEGRADED_THRESHOLD_MS {
        HealthStatus::Degraded
    } else if response_time_ms > SLOW_THRESHOLD_MS {
        HealthStatus::Slow
    } else {
        HealthStatus::Up
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_classify_as_down() {
        assert_eq!(classify(500, 80), HealthStatus::Down);
        assert_eq!(classify(503, 200), HealthStatus::Down);
        assert_eq!(classify(599, 10_000), HealthStatus::Down);
    }

    #[test]
    fn client_errors_classify_as_error() {
        assert_eq!(classify(400, 80), HealthStatus::Error);
        assert_eq!(classify(404, 80), HealthStatus::Error);
        // a slow client error is still an error
        assert_eq!(classify(499, 6000), HealthStatus::Error);
    }

    #[test]
    fn latency_tiers() {
        assert_eq!(classify(200, 5001), HealthStatus::Degraded);
        assert_eq!(classify(200, 5000), HealthStatus::Slow);
        assert_eq!(classify(200, 1001), HealthStatus::Slow);
        assert_eq!(classify(200, 1000), HealthStatus::Up);
        assert_eq!(classify(200, 80), HealthStatus::Up);
        assert_eq!(classify(304, 80), HealthStatus::Up);
    }
}
