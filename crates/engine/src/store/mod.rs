mod config;
mod models;
mod sqlite;
mod postgres;
mod factory;

pub use config::{DatabaseConfig, DatabaseType};
pub use models::*;
pub use sqlite::SqliteStore;
pub use postgres::PostgresStore;
pub use factory::create_store;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[async_trait]
pub trait Store: Send + Sync {
    // Initialize database schema
    async fn init(&self) -> crate::Result<()>;

    // Website operations
    async fn create_website(&self, website: Website) -> crate::Result<()>;
    async fn get_website(&self, id: Uuid, tenant_id: &str) -> crate::Result<Option<Website>>;
    async fn find_website_by_domain(&self, tenant_id: &str, domain: &str) -> crate::Result<Option<Website>>;
    async fn list_websites(&self, tenant_id: &str) -> crate::Result<Vec<Website>>;
    async fn list_monitored_websites(&self) -> crate::Result<Vec<Website>>;
    async fn update_website_health(&self, id: Uuid, status: HealthStatus, response_time_ms: Option<i64>) -> crate::Result<()>;
    async fn delete_website(&self, id: Uuid, tenant_id: &str) -> crate::Result<bool>;

    // Health check observations
    async fn save_health_check(&self, check: HealthCheck) -> crate::Result<()>;
    async fn recent_health_checks(&self, website_id: Uuid, limit: i64) -> crate::Result<Vec<HealthCheck>>;

    // Incident lifecycle
    async fn create_incident(&self, incident: Incident) -> crate::Result<()>;
    async fn get_incident(&self, id: Uuid, tenant_id: &str) -> crate::Result<Option<Incident>>;
    async fn find_open_incident(&self, tenant_id: &str, source: &str, correlation_key: &str) -> crate::Result<Option<Incident>>;
    async fn open_or_reuse_incident(&self, incident: Incident) -> crate::Result<OpenOrReuse>;
    async fn resolve_open_incidents(&self, tenant_id: &str, source: &str, correlation_key: &str) -> crate::Result<u64>;
    async fn update_incident(&self, id: Uuid, tenant_id: &str, patch: IncidentPatch) -> crate::Result<Option<Incident>>;
    async fn list_incidents(&self, tenant_id: &str, status: Option<IncidentStatus>, severity: Option<IncidentSeverity>, limit: i64) -> crate::Result<Vec<Incident>>;
    async fn append_incident_event(&self, event: IncidentEvent) -> crate::Result<()>;
    async fn list_incident_events(&self, incident_id: Uuid, limit: i64) -> crate::Result<Vec<IncidentEvent>>;

    // Remediations
    async fn create_remediation(&self, remediation: Remediation) -> crate::Result<()>;
    async fn list_remediations(&self, incident_id: Uuid) -> crate::Result<Vec<Remediation>>;

    // Agent task operations
    async fn create_task(&self, task: AgentTask) -> crate::Result<()>;
    async fn get_task(&self, id: Uuid, tenant_id: &str) -> crate::Result<Option<AgentTask>>;
    async fn mark_task_running(&self, id: Uuid) -> crate::Result<bool>;
    async fn complete_task(&self, id: Uuid, status: TaskStatus, output: Option<JsonValue>, error: Option<String>) -> crate::Result<bool>;
    async fn list_tasks(&self, tenant_id: &str, status: Option<TaskStatus>, kind: Option<AgentKind>, limit: i64) -> crate::Result<Vec<AgentTask>>;
    async fn append_task_log(&self, log: AgentTaskLog) -> crate::Result<()>;
    async fn list_task_logs(&self, task_id: Uuid) -> crate::Result<Vec<AgentTaskLog>>;

    // Per-user LLM settings
    async fn upsert_llm_settings(&self, settings: LlmSettings) -> crate::Result<()>;
    async fn get_llm_settings(&self, user_id: &str) -> crate::Result<Option<LlmSettings>>;
}

#[derive(Debug)]
pub enum OpenOrReuse {
    Opened(Incident),
    Reused(Incident),
}

impl OpenOrReuse {
    pub fn incident(&self) -> &Incident {
        match self {
            OpenOrReuse::Opened(i) | OpenOrReuse::Reused(i) => i,
        }
    }

    pub fn was_opened(&self) -> bool {
        matches!(self, OpenOrReuse::Opened(_))
    }
}
