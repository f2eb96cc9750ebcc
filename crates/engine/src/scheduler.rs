//! Periodic health-check sweep.
//!
//! Every tick probes all verified, non-paused websites, persists the
//! observations, and drives the health_check incident lifecycle: open on
//! down, resolve on recovery. Per-website failures are counted, not fatal
//! to the sweep, and an errored sweep waits for the next tick rather than
//! retrying.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use serde_json::json;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    metrics,
    probe::{HealthProber, ProbeOutcome},
    store::{
        sources, HealthCheck, HealthStatus, Incident, IncidentSeverity, IncidentStatus, Store,
        Website,
    },
    Result,
};

pub struct HealthCheckScheduler {
    store: Arc<dyn Store>,
    prober: HealthProber,
    check_interval: Duration,
    probe_timeout: Duration,
}

#[derive(Debug, Default, Serialize)]
pub struct SweepSummary {
    pub checked: usize,
    pub incidents_opened: usize,
    pub incidents_resolved: u64,
    pub failures: usize,
}

impl HealthCheckScheduler {
    pub fn new(store: Arc<dyn Store>, check_interval: Duration, probe_timeout: Duration) -> Self {
        Self {
            store,
            prober: HealthProber::new(),
            check_interval,
            probe_timeout,
        }
    }

    pub fn start(self: Arc<Self>) {
        info!(
            "Starting health check scheduler (every {}s)",
            self.check_interval.as_secs()
        );

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.check_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                match self.sweep().await {
                    Ok(summary) => info!(
                        "Health sweep done: checked={}, opened={}, resolved={}, failures={}",
                        summary.checked,
                        summary.incidents_opened,
                        summary.incidents_resolved,
                        summary.failures
                    ),
                    Err(e) => error!("Health sweep failed: {}", e),
                }
            }
        });
    }

    /// One full pass over every monitored website. Probes run concurrently;
    /// bookkeeping is sequential per website.
    pub async fn sweep(&self) -> Result<SweepSummary> {
        let websites = self.store.list_monitored_websites().await?;
        info!("Running health checks for {} website(s)", websites.len());

        let outcomes = join_all(
            websites
                .iter()
                .map(|w| self.prober.check(&w.url, self.probe_timeout)),
        )
        .await;

        let mut summary = SweepSummary::default();
        for (website, outcome) in websites.iter().zip(outcomes) {
            summary.checked += 1;
            if let Err(e) = self.record(website, &outcome, &mut summary).await {
                summary.failures += 1;
                error!("Health check bookkeeping failed for {}: {}", website.domain, e);
            }
        }

        Ok(summary)
    }

    async fn record(
        &self,
        website: &Website,
        outcome: &ProbeOutcome,
        summary: &mut SweepSummary,
    ) -> Result<()> {
        self.store
            .save_health_check(HealthCheck {
                id: Uuid::new_v4(),
                website_id: website.id,
                checked_at: Utc::now(),
                status: outcome.status,
                status_code: outcome.status_code,
                response_time_ms: Some(outcome.response_time_ms),
                tls_valid: outcome.tls_valid,
                error_message: outcome.error_message.clone(),
            })
            .await?;
        self.store
            .update_website_health(website.id, outcome.status, Some(outcome.response_time_ms))
            .await?;
        metrics::HEALTH_CHECKS_TOTAL.inc();

        let correlation = Incident::website_correlation(sources::HEALTH_CHECK, website.id);

        if outcome.status == HealthStatus::Down {
            let now = Utc::now();
            let result = self
                .store
                .open_or_reuse_incident(Incident {
                    id: Uuid::new_v4(),
                    tenant_id: website.tenant_id.clone(),
                    title: format!("{} is down", website.name),
                    description: format!(
                        "Health check failed: {}",
                        outcome
                            .error_message
                            .as_deref()
                            .unwrap_or("No response from server")
                    ),
                    severity: IncidentSeverity::Critical,
                    status: IncidentStatus::Open,
                    source: sources::HEALTH_CHECK.to_string(),
                    correlation_key: Some(correlation),
                    metadata: json!({
                        "websiteId": website.id,
                        "websiteUrl": website.url,
                        "statusCode": outcome.status_code,
                        "error": outcome.error_message,
                    }),
                    root_cause: None,
                    resolved_at: None,
                    created_at: now,
                    updated_at: now,
                })
                .await?;
            if result.was_opened() {
                summary.incidents_opened += 1;
                metrics::INCIDENTS_OPENED_TOTAL.inc();
            }
        } else if outcome.status == HealthStatus::Up {
            let resolved = self
                .store
                .resolve_open_incidents(&website.tenant_id, sources::HEALTH_CHECK, &correlation)
                .await?;
            if resolved > 0 {
                summary.incidents_resolved += resolved;
                metrics::INCIDENTS_RESOLVED_TOTAL.inc_by(resolved);
            }
        }

        Ok(())
    }
}
