//! Dispatch entry point for agent tasks.
//!
//! Validates the request, creates the task row, and hands off to the
//! engine. The caller gets the task back immediately; pipeline execution
//! happens out of band.

use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    metrics,
    store::{AgentKind, AgentTask, Store, TaskStatus, TaskTrigger},
    Error, Result,
};

use super::AgentEngine;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRequest {
    pub agent_type: AgentKind,
    pub name: String,
    #[serde(default)]
    pub trigger: Option<TaskTrigger>,
    #[serde(default)]
    pub website_id: Option<Uuid>,
    #[serde(default)]
    pub incident_id: Option<Uuid>,
    #[serde(default)]
    pub input: Option<JsonValue>,
}

pub async fn dispatch(
    store: &dyn Store,
    engine: &AgentEngine,
    request: DispatchRequest,
    tenant_id: &str,
    user_id: &str,
) -> Result<AgentTask> {
    // Prerequisite correlating ids are a validation error before any row
    // exists, never a silently empty task.
    match request.agent_type {
        AgentKind::Monitoring | AgentKind::Security if request.website_id.is_none() => {
            return Err(Error::Validation(format!(
                "{} tasks require a websiteId",
                request.agent_type
            )));
        }
        AgentKind::Rca | AgentKind::Remediation if request.incident_id.is_none() => {
            return Err(Error::Validation(format!(
                "{} tasks require an incidentId",
                request.agent_type
            )));
        }
        _ => {}
    }

    let task = AgentTask {
        id: Uuid::new_v4(),
        tenant_id: tenant_id.to_string(),
        user_id: user_id.to_string(),
        kind: request.agent_type,
        name: request.name,
        trigger: request.trigger.unwrap_or(TaskTrigger::Manual),
        status: TaskStatus::Pending,
        input: request.input.unwrap_or_else(|| json!({})),
        output: None,
        error_message: None,
        website_id: request.website_id,
        incident_id: request.incident_id,
        started_at: None,
        completed_at: None,
        created_at: Utc::now(),
    };

    store.create_task(task.clone()).await?;
    metrics::TASKS_DISPATCHED_TOTAL.inc();
    info!("Dispatched agent task {} ({})", task.id, task.kind);

    match request.agent_type {
        AgentKind::Monitoring
        | AgentKind::Rca
        | AgentKind::Security
        | AgentKind::Remediation => {
            if let Err(e) = engine.enqueue(task.clone()).await {
                // The task must never be left non-terminal when the
                // hand-off itself is unavailable.
                error!("Failed to hand task {} to the engine: {}", task.id, e);
                store
                    .complete_task(
                        task.id,
                        TaskStatus::Failed,
                        None,
                        Some(format!("task executor unavailable: {}", e)),
                    )
                    .await?;
            }
        }
        // Intentionally unimplemented stubs complete with a neutral output.
        AgentKind::Incident | AgentKind::Deployment => {
            store
                .complete_task(
                    task.id,
                    TaskStatus::Completed,
                    Some(json!({ "message": "no pipeline defined for this agent type" })),
                    None,
                )
                .await?;
        }
    }

    store
        .get_task(task.id, tenant_id)
        .await?
        .ok_or_else(|| Error::Internal(format!("task {} vanished after dispatch", task.id)))
}
