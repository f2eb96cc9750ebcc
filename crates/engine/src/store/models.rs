use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::llm::ProviderKind;

// Monitored target. Health fields are only ever written by probe results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Website {
    pub id: Uuid,
    pub tenant_id: String,
    pub name: String,
    pub url: String,
    pub domain: String,
    pub verified: bool,
    pub verification_token: Option<String>,
    pub status: WebsiteStatus,
    pub health_status: HealthStatus,
    pub avg_response_time_ms: Option<i64>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WebsiteStatus {
    Active,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Up,
    Slow,
    Degraded,
    Down,
    Error,
    Unknown,
    Checking,
}

// Immutable probe observation, one row per probe execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    pub id: Uuid,
    pub website_id: Uuid,
    pub checked_at: DateTime<Utc>,
    pub status: HealthStatus,
    pub status_code: Option<i32>,
    pub response_time_ms: Option<i64>,
    pub tls_valid: Option<bool>,
    pub error_message: Option<String>,
}

// Tracked problem record, distinct from the raw observations that trigger it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: Uuid,
    pub tenant_id: String,
    pub title: String,
    pub description: String,
    pub severity: IncidentSeverity,
    pub status: IncidentStatus,
    pub source: String,
    pub correlation_key: Option<String>,
    pub metadata: JsonValue,
    pub root_cause: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IncidentSeverity {
    Critical,
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IncidentStatus {
    Open,
    Investigating,
    Resolved,
    Closed,
}

// Fields a caller may change on an existing incident. Everything else is
// append-only via events.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IncidentPatch {
    pub status: Option<IncidentStatus>,
    pub severity: Option<IncidentSeverity>,
    pub description: Option<String>,
    pub root_cause: Option<String>,
}

// Append-only annotation on an incident; the hand-off mechanism between
// workflow stages (RCA writes one, remediation reads the latest matching).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentEvent {
    pub id: Uuid,
    pub incident_id: Uuid,
    pub event_type: String,
    pub message: String,
    pub data: JsonValue,
    pub created_at: DateTime<Utc>,
}

// One execution record of an agent workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTask {
    pub id: Uuid,
    pub tenant_id: String,
    pub user_id: String,
    pub kind: AgentKind,
    pub name: String,
    pub trigger: TaskTrigger,
    pub status: TaskStatus,
    pub input: JsonValue,
    pub output: Option<JsonValue>,
    pub error_message: Option<String>,
    pub website_id: Option<Uuid>,
    pub incident_id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AgentKind {
    Monitoring,
    Incident,
    Rca,
    Remediation,
    Security,
    Deployment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskTrigger {
    Manual,
    Auto,
    Schedule,
    Setup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

// Step-level progress record; observability only, never control flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTaskLog {
    pub id: Uuid,
    pub task_id: Uuid,
    pub step: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

// Proposed or executed fix tied to an incident. Status is advanced by an
// external approval action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Remediation {
    pub id: Uuid,
    pub incident_id: Uuid,
    pub action: String,
    pub status: RemediationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemediationStatus {
    Pending,
    Approved,
    Executed,
    Failed,
}

// Per-user LLM provider keys, re-read at the start of every workflow
// invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    pub user_id: String,
    pub tenant_id: String,
    pub default_provider: Option<ProviderKind>,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Well-known incident sources. Free-form strings are still accepted for
/// manually created incidents.
pub mod sources {
    pub const HEALTH_CHECK: &str = "health_check";
    pub const MONITORING_AGENT: &str = "monitoring_agent";
    pub const SECURITY_AGENT: &str = "security_agent";
    pub const MANUAL: &str = "manual";
}

impl Incident {
    /// Exact-match key for incident deduplication: a digest of the source
    /// plus the sorted structured key parts, so repeated probes of the same
    /// outage land on the same key.
    pub fn correlation_fingerprint(source: &str, parts: &[(&str, &str)]) -> String {
        use std::collections::BTreeMap;

        let sorted: BTreeMap<_, _> = parts.iter().cloned().collect();
        let parts_str = serde_json::to_string(&sorted).unwrap_or_default();

        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        hasher.update(b"-");
        hasher.update(parts_str.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Correlation key for incidents tied to a single website.
    pub fn website_correlation(source: &str, website_id: Uuid) -> String {
        Self::correlation_fingerprint(source, &[("website_id", &website_id.to_string())])
    }
}
