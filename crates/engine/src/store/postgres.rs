use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::{postgres::PgPool, Pool, Postgres};
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    store::{
        AgentKind, AgentTask, AgentTaskLog, HealthCheck, HealthStatus, Incident, IncidentEvent,
        IncidentPatch, IncidentSeverity, IncidentStatus, LlmSettings, OpenOrReuse, Remediation,
        Store, TaskStatus, Website,
    },
    Error, Result,
};

pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    pub async fn new(connection_string: &str) -> Result<Self> {
        info!("Connecting to PostgreSQL database");

        let pool = PgPool::connect(connection_string)
            .await
            .map_err(|e| {
                error!("Failed to connect to PostgreSQL: {}", e);
                Error::Sqlx(e)
            })?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn init(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to run migrations: {}", e);
                Error::Migrate(e)
            })?;

        Ok(())
    }

    // TODO: port the SQLite query set to PostgreSQL placeholders ($1 vs ?1)

    async fn create_website(&self, _website: Website) -> Result<()> {
        todo!("Implement create_website for PostgreSQL")
    }

    async fn get_website(&self, _id: Uuid, _tenant_id: &str) -> Result<Option<Website>> {
        todo!("Implement get_website for PostgreSQL")
    }

    async fn find_website_by_domain(&self, _tenant_id: &str, _domain: &str) -> Result<Option<Website>> {
        todo!("Implement find_website_by_domain for PostgreSQL")
    }

    async fn list_websites(&self, _tenant_id: &str) -> Result<Vec<Website>> {
        todo!("Implement list_websites for PostgreSQL")
    }

    async fn list_monitored_websites(&self) -> Result<Vec<Website>> {
        todo!("Implement list_monitored_websites for PostgreSQL")
    }

    async fn update_website_health(&self, _id: Uuid, _status: HealthStatus, _response_time_ms: Option<i64>) -> Result<()> {
        todo!("Implement update_website_health for PostgreSQL")
    }

    async fn delete_website(&self, _id: Uuid, _tenant_id: &str) -> Result<bool> {
        todo!("Implement delete_website for PostgreSQL")
    }

    async fn save_health_check(&self, _check: HealthCheck) -> Result<()> {
        todo!("Implement save_health_check for PostgreSQL")
    }

    async fn recent_health_checks(&self, _website_id: Uuid, _limit: i64) -> Result<Vec<HealthCheck>> {
        todo!("Implement recent_health_checks for PostgreSQL")
    }

    async fn create_incident(&self, _incident: Incident) -> Result<()> {
        todo!("Implement create_incident for PostgreSQL")
    }

    async fn get_incident(&self, _id: Uuid, _tenant_id: &str) -> Result<Option<Incident>> {
        todo!("Implement get_incident for PostgreSQL")
    }

    async fn find_open_incident(&self, _tenant_id: &str, _source: &str, _correlation_key: &str) -> Result<Option<Incident>> {
        todo!("Implement find_open_incident for PostgreSQL")
    }

    async fn open_or_reuse_incident(&self, _incident: Incident) -> Result<OpenOrReuse> {
        todo!("Implement open_or_reuse_incident for PostgreSQL")
    }

    async fn resolve_open_incidents(&self, _tenant_id: &str, _source: &str, _correlation_key: &str) -> Result<u64> {
        todo!("Implement resolve_open_incidents for PostgreSQL")
    }

    async fn update_incident(&self, _id: Uuid, _tenant_id: &str, _patch: IncidentPatch) -> Result<Option<Incident>> {
        todo!("Implement update_incident for PostgreSQL")
    }

    async fn list_incidents(&self, _tenant_id: &str, _status: Option<IncidentStatus>, _severity: Option<IncidentSeverity>, _limit: i64) -> Result<Vec<Incident>> {
        todo!("Implement list_incidents for PostgreSQL")
    }

    async fn append_incident_event(&self, _event: IncidentEvent) -> Result<()> {
        todo!("Implement append_incident_event for PostgreSQL")
    }

    async fn list_incident_events(&self, _incident_id: Uuid, _limit: i64) -> Result<Vec<IncidentEvent>> {
        todo!("Implement list_incident_events for PostgreSQL")
    }

    async fn create_remediation(&self, _remediation: Remediation) -> Result<()> {
        todo!("Implement create_remediation for PostgreSQL")
    }

    async fn list_remediations(&self, _incident_id: Uuid) -> Result<Vec<Remediation>> {
        todo!("Implement list_remediations for PostgreSQL")
    }

    async fn create_task(&self, _task: AgentTask) -> Result<()> {
        todo!("Implement create_task for PostgreSQL")
    }

    async fn get_task(&self, _id: Uuid, _tenant_id: &str) -> Result<Option<AgentTask>> {
        todo!("Implement get_task for PostgreSQL")
    }

    async fn mark_task_running(&self, _id: Uuid) -> Result<bool> {
        todo!("Implement mark_task_running for PostgreSQL")
    }

    async fn complete_task(&self, _id: Uuid, _status: TaskStatus, _output: Option<JsonValue>, _error: Option<String>) -> Result<bool> {
        todo!("Implement complete_task for PostgreSQL")
    }

    async fn list_tasks(&self, _tenant_id: &str, _status: Option<TaskStatus>, _kind: Option<AgentKind>, _limit: i64) -> Result<Vec<AgentTask>> {
        todo!("Implement list_tasks for PostgreSQL")
    }

    async fn append_task_log(&self, _log: AgentTaskLog) -> Result<()> {
        todo!("Implement append_task_log for PostgreSQL")
    }

    async fn list_task_logs(&self, _task_id: Uuid) -> Result<Vec<AgentTaskLog>> {
        todo!("Implement list_task_logs for PostgreSQL")
    }

    async fn upsert_llm_settings(&self, _settings: LlmSettings) -> Result<()> {
        todo!("Implement upsert_llm_settings for PostgreSQL")
    }

    async fn get_llm_settings(&self, _user_id: &str) -> Result<Option<LlmSettings>> {
        todo!("Implement get_llm_settings for PostgreSQL")
    }
}
