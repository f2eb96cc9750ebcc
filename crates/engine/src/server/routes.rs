use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use http::{HeaderMap, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use url::Url;
use uuid::Uuid;

use crate::{
    llm::ProviderKind,
    metrics as crate_metrics,
    store::{
        sources, HealthCheck, HealthStatus, Incident, IncidentPatch, IncidentSeverity,
        IncidentStatus, LlmSettings, Website, WebsiteStatus,
    },
    workflow::{dispatch, DispatchRequest},
    Error, Result,
};

use super::Server;

const DEFAULT_LIST_LIMIT: i64 = 50;

// Tenant and user identity arrive as opaque ids from the auth layer in
// front of this service.
fn tenant_id(headers: &HeaderMap) -> String {
    headers
        .get("x-tenant-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("default")
        .to_string()
}

fn user_id(headers: &HeaderMap) -> String {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("default")
        .to_string()
}

pub async fn health() -> Json<JsonValue> {
    Json(json!({ "status": "healthy" }))
}

pub async fn metrics() -> String {
    crate_metrics::gather_metrics()
}

// Websites

#[derive(Debug, Deserialize)]
pub struct CreateWebsiteRequest {
    pub name: String,
    pub url: String,
}

pub async fn create_website(
    State(server): State<Arc<Server>>,
    headers: HeaderMap,
    Json(request): Json<CreateWebsiteRequest>,
) -> Result<(StatusCode, Json<JsonValue>)> {
    let tenant = tenant_id(&headers);

    let domain = Url::parse(&request.url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .ok_or_else(|| Error::Validation("Invalid URL format".into()))?;

    if server
        .store
        .find_website_by_domain(&tenant, &domain)
        .await?
        .is_some()
    {
        return Err(Error::Validation("This domain is already connected".into()));
    }

    let verification_token = {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(Uuid::new_v4().as_bytes());
        hasher.update(domain.as_bytes());
        format!("{:x}", hasher.finalize())
    };

    let now = Utc::now();
    let website = Website {
        id: Uuid::new_v4(),
        tenant_id: tenant,
        name: request.name,
        url: request.url,
        domain,
        verified: false,
        verification_token: Some(verification_token),
        status: WebsiteStatus::Active,
        health_status: HealthStatus::Unknown,
        avg_response_time_ms: None,
        last_checked_at: None,
        created_at: now,
        updated_at: now,
    };
    server.store.create_website(website.clone()).await?;

    Ok((StatusCode::CREATED, Json(json!({ "website": website }))))
}

pub async fn list_websites(
    State(server): State<Arc<Server>>,
    headers: HeaderMap,
) -> Result<Json<JsonValue>> {
    let websites = server.store.list_websites(&tenant_id(&headers)).await?;
    Ok(Json(json!({ "websites": websites })))
}

pub async fn delete_website(
    State(server): State<Arc<Server>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<JsonValue>> {
    if !server.store.delete_website(id, &tenant_id(&headers)).await? {
        return Err(Error::NotFound("Website not found".into()));
    }
    Ok(Json(json!({ "success": true })))
}

// Health checks

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerHealthCheckRequest {
    pub website_id: Uuid,
}

/// Synchronous single-probe endpoint: probes now, persists the
/// observation, and returns it with the classified result.
pub async fn trigger_health_check(
    State(server): State<Arc<Server>>,
    headers: HeaderMap,
    Json(request): Json<TriggerHealthCheckRequest>,
) -> Result<Json<JsonValue>> {
    let tenant = tenant_id(&headers);
    let website = server
        .store
        .get_website(request.website_id, &tenant)
        .await?
        .ok_or_else(|| Error::NotFound("Website not found".into()))?;

    let outcome = server.prober.check(&website.url, server.probe_timeout).await;

    let check = HealthCheck {
        id: Uuid::new_v4(),
        website_id: website.id,
        checked_at: Utc::now(),
        status: outcome.status,
        status_code: outcome.status_code,
        response_time_ms: Some(outcome.response_time_ms),
        tls_valid: outcome.tls_valid,
        error_message: outcome.error_message.clone(),
    };
    server.store.save_health_check(check.clone()).await?;
    server
        .store
        .update_website_health(website.id, outcome.status, Some(outcome.response_time_ms))
        .await?;
    crate_metrics::HEALTH_CHECKS_TOTAL.inc();

    Ok(Json(json!({ "healthCheck": check, "result": outcome })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListHealthChecksQuery {
    pub website_id: Uuid,
    pub limit: Option<i64>,
}

pub async fn list_health_checks(
    State(server): State<Arc<Server>>,
    headers: HeaderMap,
    Query(query): Query<ListHealthChecksQuery>,
) -> Result<Json<JsonValue>> {
    let tenant = tenant_id(&headers);

    // ownership check before reading observations
    server
        .store
        .get_website(query.website_id, &tenant)
        .await?
        .ok_or_else(|| Error::NotFound("Website not found".into()))?;

    let checks = server
        .store
        .recent_health_checks(query.website_id, query.limit.unwrap_or(100))
        .await?;

    Ok(Json(json!({ "healthChecks": checks })))
}

// Agent tasks

pub async fn create_agent_task(
    State(server): State<Arc<Server>>,
    headers: HeaderMap,
    Json(request): Json<DispatchRequest>,
) -> Result<(StatusCode, Json<JsonValue>)> {
    let task = dispatch(
        server.store.as_ref(),
        &server.engine,
        request,
        &tenant_id(&headers),
        &user_id(&headers),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(json!({ "task": task }))))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTasksQuery {
    pub status: Option<String>,
    pub agent_type: Option<String>,
    pub limit: Option<i64>,
}

pub async fn list_agent_tasks(
    State(server): State<Arc<Server>>,
    headers: HeaderMap,
    Query(query): Query<ListTasksQuery>,
) -> Result<Json<JsonValue>> {
    let status = query.status.as_deref().map(str::parse).transpose()?;
    let kind = query.agent_type.as_deref().map(str::parse).transpose()?;

    let tasks = server
        .store
        .list_tasks(
            &tenant_id(&headers),
            status,
            kind,
            query.limit.unwrap_or(DEFAULT_LIST_LIMIT),
        )
        .await?;

    Ok(Json(json!({ "tasks": tasks })))
}

pub async fn get_agent_task(
    State(server): State<Arc<Server>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<JsonValue>> {
    let task = server
        .store
        .get_task(id, &tenant_id(&headers))
        .await?
        .ok_or_else(|| Error::NotFound("Task not found".into()))?;
    let logs = server.store.list_task_logs(task.id).await?;

    Ok(Json(json!({ "task": task, "logs": logs })))
}

// Incidents

#[derive(Debug, Deserialize)]
pub struct CreateIncidentRequest {
    pub title: String,
    pub description: Option<String>,
    pub severity: String,
    pub source: Option<String>,
    pub metadata: Option<JsonValue>,
}

pub async fn create_incident(
    State(server): State<Arc<Server>>,
    headers: HeaderMap,
    Json(request): Json<CreateIncidentRequest>,
) -> Result<(StatusCode, Json<JsonValue>)> {
    let severity: IncidentSeverity = request.severity.parse()?;

    let now = Utc::now();
    let incident = Incident {
        id: Uuid::new_v4(),
        tenant_id: tenant_id(&headers),
        title: request.title,
        description: request.description.unwrap_or_default(),
        severity,
        status: IncidentStatus::Open,
        source: request.source.unwrap_or_else(|| sources::MANUAL.to_string()),
        correlation_key: None,
        metadata: request.metadata.unwrap_or_else(|| json!({})),
        root_cause: None,
        resolved_at: None,
        created_at: now,
        updated_at: now,
    };
    server.store.create_incident(incident.clone()).await?;

    Ok((StatusCode::CREATED, Json(json!({ "incident": incident }))))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListIncidentsQuery {
    pub status: Option<String>,
    pub severity: Option<String>,
    pub limit: Option<i64>,
}

pub async fn list_incidents(
    State(server): State<Arc<Server>>,
    headers: HeaderMap,
    Query(query): Query<ListIncidentsQuery>,
) -> Result<Json<JsonValue>> {
    let status = query.status.as_deref().map(str::parse).transpose()?;
    let severity = query.severity.as_deref().map(str::parse).transpose()?;

    let incidents = server
        .store
        .list_incidents(
            &tenant_id(&headers),
            status,
            severity,
            query.limit.unwrap_or(DEFAULT_LIST_LIMIT),
        )
        .await?;

    Ok(Json(json!({ "incidents": incidents })))
}

pub async fn get_incident(
    State(server): State<Arc<Server>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<JsonValue>> {
    let incident = server
        .store
        .get_incident(id, &tenant_id(&headers))
        .await?
        .ok_or_else(|| Error::NotFound("Incident not found".into()))?;
    let events = server.store.list_incident_events(incident.id, 50).await?;
    let remediations = server.store.list_remediations(incident.id).await?;

    Ok(Json(json!({
        "incident": incident,
        "events": events,
        "remediations": remediations,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateIncidentRequest {
    pub status: Option<String>,
    pub severity: Option<String>,
    pub description: Option<String>,
    pub root_cause: Option<String>,
}

pub async fn update_incident(
    State(server): State<Arc<Server>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateIncidentRequest>,
) -> Result<Json<JsonValue>> {
    let patch = IncidentPatch {
        status: request.status.as_deref().map(str::parse).transpose()?,
        severity: request.severity.as_deref().map(str::parse).transpose()?,
        description: request.description,
        root_cause: request.root_cause,
    };

    let incident = server
        .store
        .update_incident(id, &tenant_id(&headers), patch)
        .await?
        .ok_or_else(|| Error::NotFound("Incident not found".into()))?;

    Ok(Json(json!({ "incident": incident })))
}

// LLM settings

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLlmSettingsRequest {
    pub default_provider: Option<String>,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
}

// Keys are write-only: reads report presence, never the secrets.
fn settings_view(settings: &LlmSettings) -> JsonValue {
    json!({
        "defaultProvider": settings.default_provider,
        "openaiKeySet": settings.openai_api_key.is_some(),
        "anthropicKeySet": settings.anthropic_api_key.is_some(),
        "geminiKeySet": settings.gemini_api_key.is_some(),
    })
}

pub async fn get_llm_settings(
    State(server): State<Arc<Server>>,
    headers: HeaderMap,
) -> Result<Json<JsonValue>> {
    let settings = server.store.get_llm_settings(&user_id(&headers)).await?;

    Ok(Json(match settings {
        Some(settings) => json!({ "settings": settings_view(&settings) }),
        None => json!({ "settings": JsonValue::Null }),
    }))
}

pub async fn update_llm_settings(
    State(server): State<Arc<Server>>,
    headers: HeaderMap,
    Json(request): Json<UpdateLlmSettingsRequest>,
) -> Result<Json<JsonValue>> {
    let default_provider: Option<ProviderKind> =
        request.default_provider.as_deref().map(str::parse).transpose()?;

    let settings = LlmSettings {
        user_id: user_id(&headers),
        tenant_id: tenant_id(&headers),
        default_provider,
        openai_api_key: request.openai_api_key,
        anthropic_api_key: request.anthropic_api_key,
        gemini_api_key: request.gemini_api_key,
        updated_at: Utc::now(),
    };
    server.store.upsert_llm_settings(settings.clone()).await?;

    Ok(Json(json!({ "settings": settings_view(&settings) })))
}
