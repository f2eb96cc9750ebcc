//! The agent pipelines.
//!
//! Each pipeline is a fixed, ordered sequence of steps with a step-log
//! record at every boundary. Any step error aborts the remainder and is
//! caught by the engine, which records it on the task. Incident mutations
//! go through open-or-reuse / resolve-by-key so concurrent runs against the
//! same website or incident cannot duplicate or corrupt state.

use chrono::Utc;
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

use crate::{
    llm::{self, prompts, ChatMessage, CompletionOptions},
    metrics,
    store::{
        sources, AgentKind, AgentTask, HealthCheck, HealthStatus, Incident, IncidentEvent,
        IncidentPatch, IncidentSeverity, IncidentStatus, Remediation, RemediationStatus,
    },
    Error, Result,
};

use super::AgentEngine;

const RCA_EVENT_TYPE: &str = "rca_completed";
const REMEDIATION_EVENT_TYPE: &str = "remediation_suggested";

impl AgentEngine {
    /// Probe the website, persist the observation, and manage the
    /// health_check incident for it: open (with AI analysis when available)
    /// on down, resolve when the condition has cleared.
    pub(super) async fn run_monitoring(&self, task: &AgentTask) -> Result<JsonValue> {
        let website_id = task
            .website_id
            .ok_or_else(|| Error::Validation("monitoring task requires a website id".into()))?;

        self.log_step(task.id, "fetch-website", "Loading website and recent history").await;
        let website = self
            .store
            .get_website(website_id, &task.tenant_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Website {} not found", website_id)))?;
        let history = self.store.recent_health_checks(website.id, 10).await?;

        self.log_step(task.id, "perform-health-check", &format!("Probing {}", website.url)).await;
        let outcome = self.prober.check(&website.url, self.probe_timeout).await;

        self.log_step(
            task.id,
            "save-health-check",
            &format!("Probe finished with status {}", outcome.status),
        )
        .await;
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
            let probe_error = outcome
                .error_message
                .clone()
                .unwrap_or_else(|| "No response from server".to_string());
            let mut description = format!("Health check failed: {}", probe_error);

            // The AI analysis is a best-effort enrichment: a missing
            // provider skips it, but a vendor failure is task-fatal.
            if let Some(config) = llm::resolve_config(self.store.as_ref(), &task.user_id).await? {
                self.log_step(task.id, "ai-analysis", "Requesting incident analysis").await;
                let recent: Vec<_> = history.iter().take(5).collect();
                let messages = vec![
                    ChatMessage::system(prompts::INCIDENT),
                    ChatMessage::user(format!(
                        "Website: {} ({})\nStatus: {}\nError: {}\nResponse Time: {}ms\nRecent Health History: {}",
                        website.name,
                        website.url,
                        outcome.status,
                        probe_error,
                        outcome.response_time_ms,
                        serde_json::to_string(&recent)?,
                    )),
                ];
                let completion =
                    llm::complete(&config, &messages, &CompletionOptions::default()).await?;
                description = completion.content;
            } else {
                self.log_step(task.id, "ai-analysis", "No AI provider configured; skipping analysis")
                    .await;
            }

            self.log_step(task.id, "create-incident", "Opening incident for down website").await;
            let now = Utc::now();
            let result = self
                .store
                .open_or_reuse_incident(Incident {
                    id: Uuid::new_v4(),
                    tenant_id: task.tenant_id.clone(),
                    title: format!("Website Down: {}", website.name),
                    description,
                    severity: IncidentSeverity::Critical,
                    status: IncidentStatus::Open,
                    source: sources::HEALTH_CHECK.to_string(),
                    correlation_key: Some(correlation.clone()),
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
                metrics::INCIDENTS_OPENED_TOTAL.inc();
            }
        } else {
            let resolved = self
                .store
                .resolve_open_incidents(&task.tenant_id, sources::HEALTH_CHECK, &correlation)
                .await?;
            if resolved > 0 {
                self.log_step(
                    task.id,
                    "auto-resolve",
                    &format!("Website reachable again; resolved {} incident(s)", resolved),
                )
                .await;
                metrics::INCIDENTS_RESOLVED_TOTAL.inc_by(resolved);
            }
        }

        Ok(json!({
            "websiteId": website.id,
            "status": outcome.status,
            "responseTimeMs": outcome.response_time_ms,
        }))
    }

    /// Root cause analysis. There is no non-AI fallback here: a missing
    /// provider fails the task.
    pub(super) async fn run_rca(&self, task: &AgentTask) -> Result<JsonValue> {
        let incident_id = task
            .incident_id
            .ok_or_else(|| Error::Validation("rca task requires an incident id".into()))?;

        self.log_step(task.id, "fetch-incident", "Loading incident and recent events").await;
        let incident = self
            .store
            .get_incident(incident_id, &task.tenant_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Incident {} not found", incident_id)))?;
        let events = self.store.list_incident_events(incident.id, 20).await?;

        let config = llm::resolve_config(self.store.as_ref(), &task.user_id)
            .await?
            .ok_or_else(|| Error::Llm("No AI provider configured".into()))?;

        self.log_step(task.id, "perform-rca", "Requesting root cause analysis").await;
        let messages = vec![
            ChatMessage::system(prompts::system_prompt(AgentKind::Rca)),
            ChatMessage::user(format!(
                "Incident Title: {}\nDescription: {}\nSeverity: {}\nStatus: {}\nEvents: {}",
                incident.title,
                incident.description,
                incident.severity,
                incident.status,
                serde_json::to_string(&events)?,
            )),
        ];
        let completion = llm::complete(&config, &messages, &CompletionOptions::default()).await?;

        self.log_step(task.id, "save-rca", "Recording analysis on the incident").await;
        self.store
            .append_incident_event(IncidentEvent {
                id: Uuid::new_v4(),
                incident_id: incident.id,
                event_type: RCA_EVENT_TYPE.to_string(),
                message: "AI root cause analysis completed".to_string(),
                data: json!({ "analysis": completion.content }),
                created_at: Utc::now(),
            })
            .await?;
        self.store
            .update_incident(
                incident.id,
                &task.tenant_id,
                IncidentPatch {
                    status: Some(IncidentStatus::Investigating),
                    ..Default::default()
                },
            )
            .await?;

        Ok(json!({
            "incidentId": incident.id,
            "analysisText": completion.content,
        }))
    }

    /// Fixed security posture battery, optionally enriched with an AI
    /// summary, opening an incident when any check fails.
    pub(super) async fn run_security(&self, task: &AgentTask) -> Result<JsonValue> {
        let website_id = task
            .website_id
            .ok_or_else(|| Error::Validation("security task requires a website id".into()))?;

        self.log_step(task.id, "fetch-website", "Loading website").await;
        let website = self
            .store
            .get_website(website_id, &task.tenant_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Website {} not found", website_id)))?;

        self.log_step(task.id, "security-checks", &format!("Scanning {}", website.url)).await;
        let checks = self.scanner.scan(&website.url, self.probe_timeout).await;
        let failed_count = checks.iter().filter(|c| !c.passed).count();

        let mut analysis = String::new();
        if let Some(config) = llm::resolve_config(self.store.as_ref(), &task.user_id).await? {
            self.log_step(task.id, "ai-analysis", "Requesting security analysis").await;
            let messages = vec![
                ChatMessage::system(prompts::system_prompt(AgentKind::Security)),
                ChatMessage::user(format!(
                    "Website: {} ({})\nSecurity Checks Results: {}",
                    website.name,
                    website.url,
                    serde_json::to_string_pretty(&checks)?,
                )),
            ];
            analysis = llm::complete(&config, &messages, &CompletionOptions::default())
                .await?
                .content;
        }

        if failed_count > 0 {
            self.log_step(
                task.id,
                "create-security-incident",
                &format!("{} check(s) failed", failed_count),
            )
            .await;
            let severity = if failed_count >= 3 {
                IncidentSeverity::High
            } else {
                IncidentSeverity::Medium
            };
            let now = Utc::now();
            let result = self
                .store
                .open_or_reuse_incident(Incident {
                    id: Uuid::new_v4(),
                    tenant_id: task.tenant_id.clone(),
                    title: format!("Security Issues: {}", website.name),
                    description: format!("{} security issues found.\n\n{}", failed_count, analysis),
                    severity,
                    status: IncidentStatus::Open,
                    source: sources::SECURITY_AGENT.to_string(),
                    correlation_key: Some(Incident::website_correlation(
                        sources::SECURITY_AGENT,
                        website.id,
                    )),
                    metadata: json!({
                        "websiteId": website.id,
                        "websiteUrl": website.url,
                        "checks": checks,
                    }),
                    root_cause: None,
                    resolved_at: None,
                    created_at: now,
                    updated_at: now,
                })
                .await?;
            if result.was_opened() {
                metrics::INCIDENTS_OPENED_TOTAL.inc();
            }
        }

        Ok(json!({
            "websiteId": website.id,
            "checks": checks,
            "analysisText": analysis,
        }))
    }

    /// Suggest a fix from the incident plus the latest recorded root cause.
    /// A missing RCA event is tolerated; a missing provider is not.
    pub(super) async fn run_remediation(&self, task: &AgentTask) -> Result<JsonValue> {
        let incident_id = task
            .incident_id
            .ok_or_else(|| Error::Validation("remediation task requires an incident id".into()))?;

        self.log_step(task.id, "fetch-incident", "Loading incident and events").await;
        let incident = self
            .store
            .get_incident(incident_id, &task.tenant_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Incident {} not found", incident_id)))?;
        let events = self.store.list_incident_events(incident.id, 50).await?;

        let config = llm::resolve_config(self.store.as_ref(), &task.user_id)
            .await?
            .ok_or_else(|| Error::Llm("No AI provider configured".into()))?;

        // events come back newest-first, so this is the latest analysis
        let root_cause = events
            .iter()
            .find(|e| e.event_type == RCA_EVENT_TYPE)
            .and_then(|e| e.data.get("analysis"))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        self.log_step(task.id, "generate-remediation", "Requesting remediation plan").await;
        let messages = vec![
            ChatMessage::system(prompts::system_prompt(AgentKind::Remediation)),
            ChatMessage::user(format!(
                "Incident: {}\nDescription: {}\nSeverity: {}\nRoot Cause Analysis: {}",
                incident.title, incident.description, incident.severity, root_cause,
            )),
        ];
        let completion = llm::complete(&config, &messages, &CompletionOptions::default()).await?;

        self.log_step(task.id, "save-remediation", "Recording suggested remediation").await;
        let now = Utc::now();
        self.store
            .create_remediation(Remediation {
                id: Uuid::new_v4(),
                incident_id: incident.id,
                action: completion.content.clone(),
                status: RemediationStatus::Pending,
                created_at: now,
                updated_at: now,
            })
            .await?;
        self.store
            .append_incident_event(IncidentEvent {
                id: Uuid::new_v4(),
                incident_id: incident.id,
                event_type: REMEDIATION_EVENT_TYPE.to_string(),
                message: "AI suggested remediation actions".to_string(),
                data: json!({ "remediation": completion.content }),
                created_at: Utc::now(),
            })
            .await?;

        Ok(json!({
            "incidentId": incident.id,
            "remediationText": completion.content,
        }))
    }
}
