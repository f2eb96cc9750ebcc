use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::{
    store::{
        AgentKind, AgentTask, AgentTaskLog, HealthCheck, HealthStatus, Incident, IncidentEvent,
        IncidentPatch, IncidentSeverity, IncidentStatus, LlmSettings, OpenOrReuse, Remediation,
        RemediationStatus, Store, TaskStatus, TaskTrigger, Website, WebsiteStatus,
    },
    Error, Result,
};

pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        info!("Connecting to SQLite database: {}", database_url);

        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(Error::Sqlx)?
            .create_if_missing(true)
            .foreign_keys(true);

        // An in-memory database only exists on the connection that created
        // it, so the pool must not open a second one.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| {
                error!("Failed to connect to SQLite: {}", e);
                Error::Sqlx(e)
            })?;

        Ok(Self { pool })
    }

    async fn load_website(&self, id: &str) -> Result<Option<Website>> {
        let row = sqlx::query(
            r#"
            SELECT id, tenant_id, name, url, domain, verified, verification_token,
                   status, health_status, avg_response_time_ms, last_checked_at,
                   created_at, updated_at
            FROM websites
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(Website {
                id: r.get::<String, _>("id").parse()?,
                tenant_id: r.get("tenant_id"),
                name: r.get("name"),
                url: r.get("url"),
                domain: r.get("domain"),
                verified: r.get("verified"),
                verification_token: r.get("verification_token"),
                status: r.get::<String, _>("status").parse()?,
                health_status: r.get::<String, _>("health_status").parse()?,
                avg_response_time_ms: r.get("avg_response_time_ms"),
                last_checked_at: r.get("last_checked_at"),
                created_at: r.get("created_at"),
                updated_at: r.get("updated_at"),
            })),
            None => Ok(None),
        }
    }

    async fn load_incident(&self, id: &str) -> Result<Option<Incident>> {
        let row = sqlx::query(
            r#"
            SELECT id, tenant_id, title, description, severity, status, source,
                   correlation_key, metadata, root_cause, resolved_at,
                   created_at, updated_at
            FROM incidents
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => {
                let metadata: JsonValue = serde_json::from_str(r.get("metadata"))?;

                Ok(Some(Incident {
                    id: r.get::<String, _>("id").parse()?,
                    tenant_id: r.get("tenant_id"),
                    title: r.get("title"),
                    description: r.get("description"),
                    severity: r.get::<String, _>("severity").parse()?,
                    status: r.get::<String, _>("status").parse()?,
                    source: r.get("source"),
                    correlation_key: r.get("correlation_key"),
                    metadata,
                    root_cause: r.get("root_cause"),
                    resolved_at: r.get("resolved_at"),
                    created_at: r.get("created_at"),
                    updated_at: r.get("updated_at"),
                }))
            }
            None => Ok(None),
        }
    }

    async fn load_task(&self, id: &str) -> Result<Option<AgentTask>> {
        let row = sqlx::query(
            r#"
            SELECT id, tenant_id, user_id, kind, name, trigger_kind, status, input,
                   output, error_message, website_id, incident_id, started_at,
                   completed_at, created_at
            FROM agent_tasks
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => {
                let input: JsonValue = serde_json::from_str(r.get("input"))?;
                let output: Option<JsonValue> = r
                    .get::<Option<String>, _>("output")
                    .map(|s| serde_json::from_str(&s))
                    .transpose()?;

                Ok(Some(AgentTask {
                    id: r.get::<String, _>("id").parse()?,
                    tenant_id: r.get("tenant_id"),
                    user_id: r.get("user_id"),
                    kind: r.get::<String, _>("kind").parse()?,
                    name: r.get("name"),
                    trigger: r.get::<String, _>("trigger_kind").parse()?,
                    status: r.get::<String, _>("status").parse()?,
                    input,
                    output,
                    error_message: r.get("error_message"),
                    website_id: r.get::<Option<String>, _>("website_id").map(|s| s.parse()).transpose()?,
                    incident_id: r.get::<Option<String>, _>("incident_id").map(|s| s.parse()).transpose()?,
                    started_at: r.get("started_at"),
                    completed_at: r.get("completed_at"),
                    created_at: r.get("created_at"),
                }))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl Store for SqliteStore {
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

    // Website operations
    async fn create_website(&self, website: Website) -> Result<()> {
        debug!("Saving website: {}", website.id);

        sqlx::query(
            r#"
            INSERT INTO websites (
                id, tenant_id, name, url, domain, verified, verification_token,
                status, health_status, avg_response_time_ms, last_checked_at,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(website.id.to_string())
        .bind(&website.tenant_id)
        .bind(&website.name)
        .bind(&website.url)
        .bind(&website.domain)
        .bind(website.verified)
        .bind(&website.verification_token)
        .bind(website.status.to_string())
        .bind(website.health_status.to_string())
        .bind(website.avg_response_time_ms)
        .bind(website.last_checked_at)
        .bind(website.created_at)
        .bind(website.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_website(&self, id: Uuid, tenant_id: &str) -> Result<Option<Website>> {
        debug!("Getting website: {}", id);

        Ok(self
            .load_website(&id.to_string())
            .await?
            .filter(|w| w.tenant_id == tenant_id))
    }

    async fn find_website_by_domain(&self, tenant_id: &str, domain: &str) -> Result<Option<Website>> {
        debug!("Finding website by domain: {} for tenant {}", domain, tenant_id);

        let row = sqlx::query(
            "SELECT id FROM websites WHERE tenant_id = ?1 AND domain = ?2 LIMIT 1",
        )
        .bind(tenant_id)
        .bind(domain)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => self.load_website(r.get("id")).await,
            None => Ok(None),
        }
    }

    async fn list_websites(&self, tenant_id: &str) -> Result<Vec<Website>> {
        debug!("Listing websites for tenant: {}", tenant_id);

        let mut websites = Vec::new();
        let rows = sqlx::query(
            "SELECT id FROM websites WHERE tenant_id = ?1 ORDER BY created_at DESC",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        for row in rows {
            if let Some(website) = self.load_website(row.get("id")).await? {
                websites.push(website);
            }
        }

        Ok(websites)
    }

    async fn list_monitored_websites(&self) -> Result<Vec<Website>> {
        debug!("Listing monitored websites");

        let mut websites = Vec::new();
        let rows = sqlx::query(
            "SELECT id FROM websites WHERE verified = 1 AND status != 'PAUSED' ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?;

        for row in rows {
            if let Some(website) = self.load_website(row.get("id")).await? {
                websites.push(website);
            }
        }

        Ok(websites)
    }

    async fn update_website_health(&self, id: Uuid, status: HealthStatus, response_time_ms: Option<i64>) -> Result<()> {
        debug!("Updating website health: {} -> {:?}", id, status);

        sqlx::query(
            r#"
            UPDATE websites
            SET health_status = ?1, avg_response_time_ms = ?2,
                last_checked_at = ?3, updated_at = ?3
            WHERE id = ?4
            "#,
        )
        .bind(status.to_string())
        .bind(response_time_ms)
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_website(&self, id: Uuid, tenant_id: &str) -> Result<bool> {
        debug!("Deleting website: {}", id);

        let result = sqlx::query(
            "DELETE FROM websites WHERE id = ?1 AND tenant_id = ?2",
        )
        .bind(id.to_string())
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    // Health check observations
    async fn save_health_check(&self, check: HealthCheck) -> Result<()> {
        debug!("Saving health check: {}", check.id);

        sqlx::query(
            r#"
            INSERT INTO health_checks (
                id, website_id, checked_at, status, status_code,
                response_time_ms, tls_valid, error_message
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(check.id.to_string())
        .bind(check.website_id.to_string())
        .bind(check.checked_at)
        .bind(check.status.to_string())
        .bind(check.status_code)
        .bind(check.response_time_ms)
        .bind(check.tls_valid)
        .bind(&check.error_message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent_health_checks(&self, website_id: Uuid, limit: i64) -> Result<Vec<HealthCheck>> {
        debug!("Listing health checks for website: {}, limit={}", website_id, limit);

        let rows = sqlx::query(
            r#"
            SELECT id, website_id, checked_at, status, status_code,
                   response_time_ms, tls_valid, error_message
            FROM health_checks
            WHERE website_id = ?1
            ORDER BY checked_at DESC
            LIMIT ?2
            "#,
        )
        .bind(website_id.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut checks = Vec::new();
        for r in rows {
            checks.push(HealthCheck {
                id: r.get::<String, _>("id").parse()?,
                website_id: r.get::<String, _>("website_id").parse()?,
                checked_at: r.get("checked_at"),
                status: r.get::<String, _>("status").parse()?,
                status_code: r.get("status_code"),
                response_time_ms: r.get("response_time_ms"),
                tls_valid: r.get("tls_valid"),
                error_message: r.get("error_message"),
            });
        }

        Ok(checks)
    }

    // Incident lifecycle
    async fn create_incident(&self, incident: Incident) -> Result<()> {
        debug!("Saving incident: {}", incident.id);

        let metadata_json = serde_json::to_string(&incident.metadata)?;

        sqlx::query(
            r#"
            INSERT INTO incidents (
                id, tenant_id, title, description, severity, status, source,
                correlation_key, metadata, root_cause, resolved_at,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(incident.id.to_string())
        .bind(&incident.tenant_id)
        .bind(&incident.title)
        .bind(&incident.description)
        .bind(incident.severity.to_string())
        .bind(incident.status.to_string())
        .bind(&incident.source)
        .bind(&incident.correlation_key)
        .bind(metadata_json)
        .bind(&incident.root_cause)
        .bind(incident.resolved_at)
        .bind(incident.created_at)
        .bind(incident.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_incident(&self, id: Uuid, tenant_id: &str) -> Result<Option<Incident>> {
        debug!("Getting incident: {}", id);

        Ok(self
            .load_incident(&id.to_string())
            .await?
            .filter(|i| i.tenant_id == tenant_id))
    }

    async fn find_open_incident(&self, tenant_id: &str, source: &str, correlation_key: &str) -> Result<Option<Incident>> {
        debug!("Finding open incident for key: {}", correlation_key);

        let row = sqlx::query(
            r#"
            SELECT id FROM incidents
            WHERE tenant_id = ?1 AND source = ?2 AND correlation_key = ?3
              AND status IN ('OPEN', 'INVESTIGATING')
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(tenant_id)
        .bind(source)
        .bind(correlation_key)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => self.load_incident(r.get("id")).await,
            None => Ok(None),
        }
    }

    async fn open_or_reuse_incident(&self, incident: Incident) -> Result<OpenOrReuse> {
        let key = incident.correlation_key.clone().ok_or_else(|| {
            Error::Validation("correlation key is required to open-or-reuse an incident".into())
        })?;

        if let Some(existing) = self
            .find_open_incident(&incident.tenant_id, &incident.source, &key)
            .await?
        {
            debug!("Reusing open incident {} for key {}", existing.id, key);
            return Ok(OpenOrReuse::Reused(existing));
        }

        match self.create_incident(incident.clone()).await {
            Ok(()) => Ok(OpenOrReuse::Opened(incident)),
            // Lost the race: a concurrent probe opened the incident between
            // the lookup and the insert. The partial unique index on open
            // incidents turns that into a unique violation we can recover.
            Err(Error::Sqlx(e))
                if e.as_database_error()
                    .map(|d| d.is_unique_violation())
                    .unwrap_or(false) =>
            {
                let existing = self
                    .find_open_incident(&incident.tenant_id, &incident.source, &key)
                    .await?
                    .ok_or_else(|| {
                        Error::Internal(format!("open incident vanished for key {}", key))
                    })?;
                Ok(OpenOrReuse::Reused(existing))
            }
            Err(e) => Err(e),
        }
    }

    async fn resolve_open_incidents(&self, tenant_id: &str, source: &str, correlation_key: &str) -> Result<u64> {
        debug!("Resolving open incidents for key: {}", correlation_key);

        let result = sqlx::query(
            r#"
            UPDATE incidents
            SET status = 'RESOLVED', resolved_at = ?1, updated_at = ?1
            WHERE tenant_id = ?2 AND source = ?3 AND correlation_key = ?4
              AND status IN ('OPEN', 'INVESTIGATING')
            "#,
        )
        .bind(Utc::now())
        .bind(tenant_id)
        .bind(source)
        .bind(correlation_key)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn update_incident(&self, id: Uuid, tenant_id: &str, patch: IncidentPatch) -> Result<Option<Incident>> {
        debug!("Updating incident: {}", id);

        let existing = match self.get_incident(id, tenant_id).await? {
            Some(incident) => incident,
            None => return Ok(None),
        };

        let status = patch.status.unwrap_or(existing.status);
        let severity = patch.severity.unwrap_or(existing.severity);
        let description = patch.description.unwrap_or(existing.description);
        let root_cause = patch.root_cause.or(existing.root_cause);

        // resolved_at is stamped exactly once, on the first transition into
        // RESOLVED.
        let resolved_at = match (existing.resolved_at, status) {
            (None, IncidentStatus::Resolved) => Some(Utc::now()),
            (existing_ts, _) => existing_ts,
        };

        sqlx::query(
            r#"
            UPDATE incidents
            SET status = ?1, severity = ?2, description = ?3, root_cause = ?4,
                resolved_at = ?5, updated_at = ?6
            WHERE id = ?7 AND tenant_id = ?8
            "#,
        )
        .bind(status.to_string())
        .bind(severity.to_string())
        .bind(&description)
        .bind(&root_cause)
        .bind(resolved_at)
        .bind(Utc::now())
        .bind(id.to_string())
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;

        self.get_incident(id, tenant_id).await
    }

    async fn list_incidents(&self, tenant_id: &str, status: Option<IncidentStatus>, severity: Option<IncidentSeverity>, limit: i64) -> Result<Vec<Incident>> {
        debug!("Listing incidents for tenant: {}, limit={}", tenant_id, limit);

        let mut incidents = Vec::new();
        let rows = sqlx::query(
            r#"
            SELECT id FROM incidents
            WHERE tenant_id = ?1
              AND (?2 IS NULL OR status = ?2)
              AND (?3 IS NULL OR severity = ?3)
            ORDER BY created_at DESC
            LIMIT ?4
            "#,
        )
        .bind(tenant_id)
        .bind(status.map(|s| s.to_string()))
        .bind(severity.map(|s| s.to_string()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        for row in rows {
            if let Some(incident) = self.load_incident(row.get("id")).await? {
                incidents.push(incident);
            }
        }

        Ok(incidents)
    }

    async fn append_incident_event(&self, event: IncidentEvent) -> Result<()> {
        debug!("Appending incident event: {} ({})", event.id, event.event_type);

        let data_json = serde_json::to_string(&event.data)?;

        sqlx::query(
            r#"
            INSERT INTO incident_events (
                id, incident_id, event_type, message, data, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(event.id.to_string())
        .bind(event.incident_id.to_string())
        .bind(&event.event_type)
        .bind(&event.message)
        .bind(data_json)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_incident_events(&self, incident_id: Uuid, limit: i64) -> Result<Vec<IncidentEvent>> {
        debug!("Listing events for incident: {}", incident_id);

        let rows = sqlx::query(
            r#"
            SELECT id, incident_id, event_type, message, data, created_at
            FROM incident_events
            WHERE incident_id = ?1
            ORDER BY created_at DESC
            LIMIT ?2
            "#,
        )
        .bind(incident_id.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut events = Vec::new();
        for r in rows {
            let data: JsonValue = serde_json::from_str(r.get("data"))?;
            events.push(IncidentEvent {
                id: r.get::<String, _>("id").parse()?,
                incident_id: r.get::<String, _>("incident_id").parse()?,
                event_type: r.get("event_type"),
                message: r.get("message"),
                data,
                created_at: r.get("created_at"),
            });
        }

        Ok(events)
    }

    // Remediations
    async fn create_remediation(&self, remediation: Remediation) -> Result<()> {
        debug!("Saving remediation: {}", remediation.id);

        sqlx::query(
            r#"
            INSERT INTO remediations (
                id, incident_id, action, status, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(remediation.id.to_string())
        .bind(remediation.incident_id.to_string())
        .bind(&remediation.action)
        .bind(remediation.status.to_string())
        .bind(remediation.created_at)
        .bind(remediation.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_remediations(&self, incident_id: Uuid) -> Result<Vec<Remediation>> {
        debug!("Listing remediations for incident: {}", incident_id);

        let rows = sqlx::query(
            r#"
            SELECT id, incident_id, action, status, created_at, updated_at
            FROM remediations
            WHERE incident_id = ?1
            ORDER BY created_at DESC
            "#,
        )
        .bind(incident_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut remediations = Vec::new();
        for r in rows {
            remediations.push(Remediation {
                id: r.get::<String, _>("id").parse()?,
                incident_id: r.get::<String, _>("incident_id").parse()?,
                action: r.get("action"),
                status: r.get::<String, _>("status").parse()?,
                created_at: r.get("created_at"),
                updated_at: r.get("updated_at"),
            });
        }

        Ok(remediations)
    }

    // Agent task operations
    async fn create_task(&self, task: AgentTask) -> Result<()> {
        debug!("Saving agent task: {}", task.id);

        let input_json = serde_json::to_string(&task.input)?;
        let output_json = task.output.as_ref()
            .map(|o| serde_json::to_string(o))
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO agent_tasks (
                id, tenant_id, user_id, kind, name, trigger_kind, status, input,
                output, error_message, website_id, incident_id, started_at,
                completed_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
        )
        .bind(task.id.to_string())
        .bind(&task.tenant_id)
        .bind(&task.user_id)
        .bind(task.kind.to_string())
        .bind(&task.name)
        .bind(task.trigger.to_string())
        .bind(task.status.to_string())
        .bind(input_json)
        .bind(output_json)
        .bind(&task.error_message)
        .bind(task.website_id.map(|id| id.to_string()))
        .bind(task.incident_id.map(|id| id.to_string()))
        .bind(task.started_at)
        .bind(task.completed_at)
        .bind(task.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_task(&self, id: Uuid, tenant_id: &str) -> Result<Option<AgentTask>> {
        debug!("Getting agent task: {}", id);

        Ok(self
            .load_task(&id.to_string())
            .await?
            .filter(|t| t.tenant_id == tenant_id))
    }

    async fn mark_task_running(&self, id: Uuid) -> Result<bool> {
        debug!("Marking agent task running: {}", id);

        let result = sqlx::query(
            "UPDATE agent_tasks SET status = 'RUNNING', started_at = ?1 WHERE id = ?2 AND status = 'PENDING'",
        )
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn complete_task(&self, id: Uuid, status: TaskStatus, output: Option<JsonValue>, error: Option<String>) -> Result<bool> {
        debug!("Completing agent task: {} with status {:?}", id, status);

        if !status.is_terminal() {
            return Err(Error::Validation(format!(
                "complete_task requires a terminal status, got {}",
                status
            )));
        }

        let output_json = output.as_ref()
            .map(|o| serde_json::to_string(o))
            .transpose()?;

        // Terminal states are final: the guard keeps completed_at stamped
        // exactly once and refuses to overwrite an already-terminal task.
        let result = sqlx::query(
            r#"
            UPDATE agent_tasks
            SET status = ?1, output = ?2, error_message = ?3, completed_at = ?4
            WHERE id = ?5 AND status IN ('PENDING', 'RUNNING')
            "#,
        )
        .bind(status.to_string())
        .bind(output_json)
        .bind(error)
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_tasks(&self, tenant_id: &str, status: Option<TaskStatus>, kind: Option<AgentKind>, limit: i64) -> Result<Vec<AgentTask>> {
        debug!("Listing agent tasks for tenant: {}, limit={}", tenant_id, limit);

        let mut tasks = Vec::new();
        let rows = sqlx::query(
            r#"
            SELECT id FROM agent_tasks
            WHERE tenant_id = ?1
              AND (?2 IS NULL OR status = ?2)
              AND (?3 IS NULL OR kind = ?3)
            ORDER BY created_at DESC
            LIMIT ?4
            "#,
        )
        .bind(tenant_id)
        .bind(status.map(|s| s.to_string()))
        .bind(kind.map(|k| k.to_string()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        for row in rows {
            if let Some(task) = self.load_task(row.get("id")).await? {
                tasks.push(task);
            }
        }

        Ok(tasks)
    }

    async fn append_task_log(&self, log: AgentTaskLog) -> Result<()> {
        debug!("Appending task log: {} [{}]", log.task_id, log.step);

        sqlx::query(
            r#"
            INSERT INTO agent_task_logs (
                id, task_id, step, message, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(log.id.to_string())
        .bind(log.task_id.to_string())
        .bind(&log.step)
        .bind(&log.message)
        .bind(log.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_task_logs(&self, task_id: Uuid) -> Result<Vec<AgentTaskLog>> {
        debug!("Listing logs for task: {}", task_id);

        let rows = sqlx::query(
            r#"
            SELECT id, task_id, step, message, created_at
            FROM agent_task_logs
            WHERE task_id = ?1
            ORDER BY created_at
            "#,
        )
        .bind(task_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut logs = Vec::new();
        for r in rows {
            logs.push(AgentTaskLog {
                id: r.get::<String, _>("id").parse()?,
                task_id: r.get::<String, _>("task_id").parse()?,
                step: r.get("step"),
                message: r.get("message"),
                created_at: r.get("created_at"),
            });
        }

        Ok(logs)
    }

    // Per-user LLM settings
    async fn upsert_llm_settings(&self, settings: LlmSettings) -> Result<()> {
        debug!("Upserting LLM settings for user: {}", settings.user_id);

        sqlx::query(
            r#"
            INSERT INTO llm_settings (
                user_id, tenant_id, default_provider, openai_api_key,
                anthropic_api_key, gemini_api_key, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(user_id) DO UPDATE SET
                tenant_id = excluded.tenant_id,
                default_provider = excluded.default_provider,
                openai_api_key = excluded.openai_api_key,
                anthropic_api_key = excluded.anthropic_api_key,
                gemini_api_key = excluded.gemini_api_key,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&settings.user_id)
        .bind(&settings.tenant_id)
        .bind(settings.default_provider.map(|p| p.to_string()))
        .bind(&settings.openai_api_key)
        .bind(&settings.anthropic_api_key)
        .bind(&settings.gemini_api_key)
        .bind(settings.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_llm_settings(&self, user_id: &str) -> Result<Option<LlmSettings>> {
        debug!("Getting LLM settings for user: {}", user_id);

        let row = sqlx::query(
            r#"
            SELECT user_id, tenant_id, default_provider, openai_api_key,
                   anthropic_api_key, gemini_api_key, updated_at
            FROM llm_settings
            WHERE user_id = ?1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(LlmSettings {
                user_id: r.get("user_id"),
                tenant_id: r.get("tenant_id"),
                default_provider: r
                    .get::<Option<String>, _>("default_provider")
                    .map(|s| s.parse())
                    .transpose()?,
                openai_api_key: r.get("openai_api_key"),
                anthropic_api_key: r.get("anthropic_api_key"),
                gemini_api_key: r.get("gemini_api_key"),
                updated_at: r.get("updated_at"),
            })),
            None => Ok(None),
        }
    }
}

// Helper implementations for parsing strings to enums
impl std::str::FromStr for WebsiteStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(WebsiteStatus::Active),
            "PAUSED" => Ok(WebsiteStatus::Paused),
            _ => Err(Error::Validation(format!("Invalid website status: {}", s))),
        }
    }
}

impl std::fmt::Display for WebsiteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WebsiteStatus::Active => write!(f, "ACTIVE"),
            WebsiteStatus::Paused => write!(f, "PAUSED"),
        }
    }
}

impl std::str::FromStr for HealthStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "up" => Ok(HealthStatus::Up),
            "slow" => Ok(HealthStatus::Slow),
            "degraded" => Ok(HealthStatus::Degraded),
            "down" => Ok(HealthStatus::Down),
            "error" => Ok(HealthStatus::Error),
            "unknown" => Ok(HealthStatus::Unknown),
            "checking" => Ok(HealthStatus::Checking),
            _ => Err(Error::Validation(format!("Invalid health status: {}", s))),
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Up => write!(f, "up"),
            HealthStatus::Slow => write!(f, "slow"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Down => write!(f, "down"),
            HealthStatus::Error => write!(f, "error"),
            HealthStatus::Unknown => write!(f, "unknown"),
            HealthStatus::Checking => write!(f, "checking"),
        }
    }
}

impl std::str::FromStr for IncidentSeverity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "CRITICAL" => Ok(IncidentSeverity::Critical),
            "HIGH" => Ok(IncidentSeverity::High),
            "MEDIUM" => Ok(IncidentSeverity::Medium),
            "LOW" => Ok(IncidentSeverity::Low),
            _ => Err(Error::Validation(format!("Invalid incident severity: {}", s))),
        }
    }
}

impl std::fmt::Display for IncidentSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IncidentSeverity::Critical => write!(f, "CRITICAL"),
            IncidentSeverity::High => write!(f, "HIGH"),
            IncidentSeverity::Medium => write!(f, "MEDIUM"),
            IncidentSeverity::Low => write!(f, "LOW"),
        }
    }
}

impl std::str::FromStr for IncidentStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "OPEN" => Ok(IncidentStatus::Open),
            "INVESTIGATING" => Ok(IncidentStatus::Investigating),
            "RESOLVED" => Ok(IncidentStatus::Resolved),
            "CLOSED" => Ok(IncidentStatus::Closed),
            _ => Err(Error::Validation(format!("Invalid incident status: {}", s))),
        }
    }
}

impl std::fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IncidentStatus::Open => write!(f, "OPEN"),
            IncidentStatus::Investigating => write!(f, "INVESTIGATING"),
            IncidentStatus::Resolved => write!(f, "RESOLVED"),
            IncidentStatus::Closed => write!(f, "CLOSED"),
        }
    }
}

impl std::str::FromStr for AgentKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "MONITORING" => Ok(AgentKind::Monitoring),
            "INCIDENT" => Ok(AgentKind::Incident),
            "RCA" => Ok(AgentKind::Rca),
            "REMEDIATION" => Ok(AgentKind::Remediation),
            "SECURITY" => Ok(AgentKind::Security),
            "DEPLOYMENT" => Ok(AgentKind::Deployment),
            _ => Err(Error::Validation(format!("Unknown agent type: {}", s))),
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentKind::Monitoring => write!(f, "MONITORING"),
            AgentKind::Incident => write!(f, "INCIDENT"),
            AgentKind::Rca => write!(f, "RCA"),
            AgentKind::Remediation => write!(f, "REMEDIATION"),
            AgentKind::Security => write!(f, "SECURITY"),
            AgentKind::Deployment => write!(f, "DEPLOYMENT"),
        }
    }
}

impl std::str::FromStr for TaskTrigger {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "manual" => Ok(TaskTrigger::Manual),
            "auto" => Ok(TaskTrigger::Auto),
            "schedule" => Ok(TaskTrigger::Schedule),
            "setup" => Ok(TaskTrigger::Setup),
            _ => Err(Error::Validation(format!("Invalid task trigger: {}", s))),
        }
    }
}

impl std::fmt::Display for TaskTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskTrigger::Manual => write!(f, "manual"),
            TaskTrigger::Auto => write!(f, "auto"),
            TaskTrigger::Schedule => write!(f, "schedule"),
            TaskTrigger::Setup => write!(f, "setup"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(TaskStatus::Pending),
            "RUNNING" => Ok(TaskStatus::Running),
            "COMPLETED" => Ok(TaskStatus::Completed),
            "FAILED" => Ok(TaskStatus::Failed),
            _ => Err(Error::Validation(format!("Invalid task status: {}", s))),
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "PENDING"),
            TaskStatus::Running => write!(f, "RUNNING"),
            TaskStatus::Completed => write!(f, "COMPLETED"),
            TaskStatus::Failed => write!(f, "FAILED"),
        }
    }
}

impl std::str::FromStr for RemediationStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(RemediationStatus::Pending),
            "approved" => Ok(RemediationStatus::Approved),
            "executed" => Ok(RemediationStatus::Executed),
            "failed" => Ok(RemediationStatus::Failed),
            _ => Err(Error::Validation(format!("Invalid remediation status: {}", s))),
        }
    }
}

impl std::fmt::Display for RemediationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemediationStatus::Pending => write!(f, "pending"),
            RemediationStatus::Approved => write!(f, "approved"),
            RemediationStatus::Executed => write!(f, "executed"),
            RemediationStatus::Failed => write!(f, "failed"),
        }
    }
}
