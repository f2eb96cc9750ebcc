use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{http::StatusCode, routing::get, Router};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use agentops_engine::{
    llm::ProviderKind,
    store::{
        create_store, sources, AgentKind, DatabaseConfig, DatabaseType, HealthStatus, Incident,
        IncidentSeverity, IncidentStatus, LlmSettings, OpenOrReuse, RemediationStatus, Store,
        TaskStatus, Website, WebsiteStatus,
    },
    workflow::{dispatch, AgentEngine, DispatchRequest},
    Error,
};

async fn memory_store() -> Arc<dyn Store> {
    let config = DatabaseConfig {
        db_type: DatabaseType::Sqlite,
        sqlite_path: Some(std::path::PathBuf::from(":memory:")),
        connection_string: None,
    };
    let store = create_store(&config).await.expect("Failed to create store");
    store.init().await.expect("Failed to initialize store");
    store
}

fn test_engine(store: Arc<dyn Store>) -> AgentEngine {
    // The engine is deliberately not started: tests drive execute_task
    // directly so completion is deterministic.
    AgentEngine::new(store, Duration::from_secs(5), Duration::from_secs(30))
}

// A local stub website whose health is flipped at runtime: 200 when
// healthy, 503 otherwise. No hardening headers are sent, which the
// security pipeline tests rely on.
async fn spawn_stub_site(healthy: Arc<AtomicBool>) -> String {
    let app = Router::new().route(
        "/",
        get(move || {
            let healthy = healthy.clone();
            async move {
                if healthy.load(Ordering::SeqCst) {
                    StatusCode::OK
                } else {
                    StatusCode::SERVICE_UNAVAILABLE
                }
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}/", addr)
}

async fn seed_website(store: &dyn Store, tenant_id: &str, url: &str) -> Website {
    let now = Utc::now();
    let website = Website {
        id: Uuid::new_v4(),
        tenant_id: tenant_id.to_string(),
        name: "Stub Site".to_string(),
        url: url.to_string(),
        domain: format!("stub-{}.test", Uuid::new_v4().simple()),
        verified: true,
        verification_token: None,
        status: WebsiteStatus::Active,
        health_status: HealthStatus::Unknown,
        avg_response_time_ms: None,
        last_checked_at: None,
        created_at: now,
        updated_at: now,
    };
    store.create_website(website.clone()).await.unwrap();
    website
}

async fn seed_mock_provider(store: &dyn Store, tenant_id: &str, user_id: &str) {
    store
        .upsert_llm_settings(LlmSettings {
            user_id: user_id.to_string(),
            tenant_id: tenant_id.to_string(),
            default_provider: Some(ProviderKind::Mock),
            openai_api_key: None,
            anthropic_api_key: None,
            gemini_api_key: None,
            updated_at: Utc::now(),
        })
        .await
        .unwrap();
}

fn incident_for(tenant_id: &str, key: &str) -> Incident {
    let now = Utc::now();
    Incident {
        id: Uuid::new_v4(),
        tenant_id: tenant_id.to_string(),
        title: "Stub outage".to_string(),
        description: "probe failure".to_string(),
        severity: IncidentSeverity::Critical,
        status: IncidentStatus::Open,
        source: sources::HEALTH_CHECK.to_string(),
        correlation_key: Some(key.to_string()),
        metadata: json!({}),
        root_cause: None,
        resolved_at: None,
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
async fn open_or_reuse_is_idempotent_while_open() {
    let store = memory_store().await;
    let key = Incident::correlation_fingerprint(sources::HEALTH_CHECK, &[("website_id", "w1")]);

    let first = store
        .open_or_reuse_incident(incident_for("t1", &key))
        .await
        .unwrap();
    assert!(first.was_opened());

    let second = store
        .open_or_reuse_incident(incident_for("t1", &key))
        .await
        .unwrap();
    match second {
        OpenOrReuse::Reused(incident) => assert_eq!(incident.id, first.incident().id),
        OpenOrReuse::Opened(_) => panic!("duplicate incident opened for the same key"),
    }

    let open = store
        .list_incidents("t1", Some(IncidentStatus::Open), None, 10)
        .await
        .unwrap();
    assert_eq!(open.len(), 1);
}

#[tokio::test]
async fn resolve_then_reopen_creates_a_new_incident() {
    let store = memory_store().await;
    let key = Incident::correlation_fingerprint(sources::HEALTH_CHECK, &[("website_id", "w2")]);

    let first = store
        .open_or_reuse_incident(incident_for("t1", &key))
        .await
        .unwrap();
    let first_id = first.incident().id;

    let resolved = store
        .resolve_open_incidents("t1", sources::HEALTH_CHECK, &key)
        .await
        .unwrap();
    assert_eq!(resolved, 1);

    let incident = store.get_incident(first_id, "t1").await.unwrap().unwrap();
    assert_eq!(incident.status, IncidentStatus::Resolved);
    assert!(incident.resolved_at.is_some());

    // a resolved incident is not reused; a fresh one opens
    let reopened = store
        .open_or_reuse_incident(incident_for("t1", &key))
        .await
        .unwrap();
    assert!(reopened.was_opened());
    assert_ne!(reopened.incident().id, first_id);
}

#[tokio::test]
async fn incident_lookup_is_tenant_scoped() {
    let store = memory_store().await;
    let key = Incident::correlation_fingerprint(sources::HEALTH_CHECK, &[("website_id", "w3")]);

    let opened = store
        .open_or_reuse_incident(incident_for("t1", &key))
        .await
        .unwrap();

    // the same key under another tenant is a different incident space
    assert!(store
        .find_open_incident("t2", sources::HEALTH_CHECK, &key)
        .await
        .unwrap()
        .is_none());
    assert!(store
        .get_incident(opened.incident().id, "t2")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn terminal_task_state_is_immutable() {
    let store = memory_store().await;
    let engine = test_engine(store.clone());

    let task = dispatch(
        store.as_ref(),
        &engine,
        DispatchRequest {
            agent_type: AgentKind::Deployment,
            name: "Deployment stub".to_string(),
            trigger: None,
            website_id: None,
            incident_id: None,
            input: None,
        },
        "t1",
        "u1",
    )
    .await
    .unwrap();

    // placeholder kinds complete at dispatch time
    assert_eq!(task.status, TaskStatus::Completed);
    let completed_at = task.completed_at.expect("completed_at must be set");

    // a second terminal transition is refused and changes nothing
    let changed = store
        .complete_task(task.id, TaskStatus::Failed, None, Some("late error".into()))
        .await
        .unwrap();
    assert!(!changed);

    let reloaded = store.get_task(task.id, "t1").await.unwrap().unwrap();
    assert_eq!(reloaded.status, TaskStatus::Completed);
    assert_eq!(reloaded.completed_at, Some(completed_at));
    assert!(reloaded.error_message.is_none());
}

#[tokio::test]
async fn dispatch_rejects_missing_correlating_ids() {
    let store = memory_store().await;
    let engine = test_engine(store.clone());

    let result = dispatch(
        store.as_ref(),
        &engine,
        DispatchRequest {
            agent_type: AgentKind::Rca,
            name: "RCA without incident".to_string(),
            trigger: None,
            website_id: None,
            incident_id: None,
            input: None,
        },
        "t1",
        "u1",
    )
    .await;

    assert!(matches!(result, Err(Error::Validation(_))));

    // no task row was created
    let tasks = store.list_tasks("t1", None, None, 10).await.unwrap();
    assert!(tasks.is_empty());
}

#[tokio::test]
async fn monitoring_opens_incident_on_down_and_resolves_on_recovery() {
    let store = memory_store().await;
    let engine = test_engine(store.clone());

    let healthy = Arc::new(AtomicBool::new(false));
    let url = spawn_stub_site(healthy.clone()).await;
    let website = seed_website(store.as_ref(), "t1", &url).await;

    // Down pass: 503 -> down, incident opened with the health_check source
    let task = dispatch(
        store.as_ref(),
        &engine,
        DispatchRequest {
            agent_type: AgentKind::Monitoring,
            name: "Monitoring run".to_string(),
            trigger: None,
            website_id: Some(website.id),
            incident_id: None,
            input: None,
        },
        "t1",
        "u1",
    )
    .await
    .unwrap();
    engine.execute_task(task.clone()).await.unwrap();

    let done = store.get_task(task.id, "t1").await.unwrap().unwrap();
    assert_eq!(done.status, TaskStatus::Completed);
    assert!(done.started_at.is_some());
    let output = done.output.unwrap();
    assert_eq!(output["status"], "down");

    let reloaded = store.get_website(website.id, "t1").await.unwrap().unwrap();
    assert_eq!(reloaded.health_status, HealthStatus::Down);

    let checks = store.recent_health_checks(website.id, 10).await.unwrap();
    assert_eq!(checks.len(), 1);
    assert_eq!(checks[0].status_code, Some(503));

    let open = store
        .list_incidents("t1", Some(IncidentStatus::Open), None, 10)
        .await
        .unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].source, sources::HEALTH_CHECK);
    assert_eq!(open[0].severity, IncidentSeverity::Critical);

    // step-level progress was recorded
    let logs = store.list_task_logs(task.id).await.unwrap();
    assert!(logs.iter().any(|l| l.step == "save-health-check"));

    // Recovery pass: 200 -> up, the open incident auto-resolves
    healthy.store(true, Ordering::SeqCst);

    let task = dispatch(
        store.as_ref(),
        &engine,
        DispatchRequest {
            agent_type: AgentKind::Monitoring,
            name: "Monitoring run".to_string(),
            trigger: None,
            website_id: Some(website.id),
            incident_id: None,
            input: None,
        },
        "t1",
        "u1",
    )
    .await
    .unwrap();
    engine.execute_task(task.clone()).await.unwrap();

    let done = store.get_task(task.id, "t1").await.unwrap().unwrap();
    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(done.output.unwrap()["status"], "up");

    let open = store
        .list_incidents("t1", Some(IncidentStatus::Open), None, 10)
        .await
        .unwrap();
    assert!(open.is_empty());

    let resolved = store
        .list_incidents("t1", Some(IncidentStatus::Resolved), None, 10)
        .await
        .unwrap();
    assert_eq!(resolved.len(), 1);
    assert!(resolved[0].resolved_at.is_some());
}

#[tokio::test]
async fn concurrent_monitoring_runs_open_a_single_incident() {
    let store = memory_store().await;
    let engine = test_engine(store.clone());

    let healthy = Arc::new(AtomicBool::new(false));
    let url = spawn_stub_site(healthy).await;
    let website = seed_website(store.as_ref(), "t1", &url).await;

    let request = DispatchRequest {
        agent_type: AgentKind::Monitoring,
        name: "Monitoring run".to_string(),
        trigger: None,
        website_id: Some(website.id),
        incident_id: None,
        input: None,
    };

    let first = dispatch(store.as_ref(), &engine, request.clone(), "t1", "u1")
        .await
        .unwrap();
    let second = dispatch(store.as_ref(), &engine, request, "t1", "u1")
        .await
        .unwrap();

    let (a, b) = tokio::join!(engine.execute_task(first), engine.execute_task(second));
    a.unwrap();
    b.unwrap();

    let open = store
        .list_incidents("t1", Some(IncidentStatus::Open), None, 10)
        .await
        .unwrap();
    assert_eq!(open.len(), 1, "both runs observed down; dedup must hold");
}

#[tokio::test]
async fn rca_fails_without_an_ai_provider() {
    let store = memory_store().await;
    let engine = test_engine(store.clone());

    let opened = store
        .open_or_reuse_incident(incident_for(
            "t1",
            &Incident::correlation_fingerprint(sources::HEALTH_CHECK, &[("website_id", "w4")]),
        ))
        .await
        .unwrap();

    let task = dispatch(
        store.as_ref(),
        &engine,
        DispatchRequest {
            agent_type: AgentKind::Rca,
            name: "RCA run".to_string(),
            trigger: None,
            website_id: None,
            incident_id: Some(opened.incident().id),
            input: None,
        },
        "t1",
        "user-without-keys",
    )
    .await
    .unwrap();
    engine.execute_task(task.clone()).await.unwrap();

    let done = store.get_task(task.id, "t1").await.unwrap().unwrap();
    assert_eq!(done.status, TaskStatus::Failed);
    assert!(done
        .error_message
        .unwrap()
        .contains("No AI provider configured"));
}

#[tokio::test]
async fn rca_records_analysis_and_moves_incident_to_investigating() {
    let store = memory_store().await;
    let engine = test_engine(store.clone());
    seed_mock_provider(store.as_ref(), "t1", "u1").await;

    let opened = store
        .open_or_reuse_incident(incident_for(
            "t1",
            &Incident::correlation_fingerprint(sources::HEALTH_CHECK, &[("website_id", "w5")]),
        ))
        .await
        .unwrap();
    let incident_id = opened.incident().id;

    let task = dispatch(
        store.as_ref(),
        &engine,
        DispatchRequest {
            agent_type: AgentKind::Rca,
            name: "RCA run".to_string(),
            trigger: None,
            website_id: None,
            incident_id: Some(incident_id),
            input: None,
        },
        "t1",
        "u1",
    )
    .await
    .unwrap();
    engine.execute_task(task.clone()).await.unwrap();

    let done = store.get_task(task.id, "t1").await.unwrap().unwrap();
    assert_eq!(done.status, TaskStatus::Completed);

    let incident = store.get_incident(incident_id, "t1").await.unwrap().unwrap();
    assert_eq!(incident.status, IncidentStatus::Investigating);

    let events = store.list_incident_events(incident_id, 10).await.unwrap();
    let rca = events
        .iter()
        .find(|e| e.event_type == "rca_completed")
        .expect("rca event recorded");
    assert!(rca.data["analysis"].as_str().unwrap().contains("Root Cause"));
}

#[tokio::test]
async fn remediation_reads_rca_and_persists_a_pending_fix() {
    let store = memory_store().await;
    let engine = test_engine(store.clone());
    seed_mock_provider(store.as_ref(), "t1", "u1").await;

    let opened = store
        .open_or_reuse_incident(incident_for(
            "t1",
            &Incident::correlation_fingerprint(sources::HEALTH_CHECK, &[("website_id", "w6")]),
        ))
        .await
        .unwrap();
    let incident_id = opened.incident().id;

    // RCA first, so remediation has root-cause context to read
    let rca_task = dispatch(
        store.as_ref(),
        &engine,
        DispatchRequest {
            agent_type: AgentKind::Rca,
            name: "RCA run".to_string(),
            trigger: None,
            website_id: None,
            incident_id: Some(incident_id),
            input: None,
        },
        "t1",
        "u1",
    )
    .await
    .unwrap();
    engine.execute_task(rca_task).await.unwrap();

    let task = dispatch(
        store.as_ref(),
        &engine,
        DispatchRequest {
            agent_type: AgentKind::Remediation,
            name: "Remediation run".to_string(),
            trigger: None,
            website_id: None,
            incident_id: Some(incident_id),
            input: None,
        },
        "t1",
        "u1",
    )
    .await
    .unwrap();
    engine.execute_task(task.clone()).await.unwrap();

    let done = store.get_task(task.id, "t1").await.unwrap().unwrap();
    assert_eq!(done.status, TaskStatus::Completed);

    let remediations = store.list_remediations(incident_id).await.unwrap();
    assert_eq!(remediations.len(), 1);
    assert_eq!(
        remediations[0].status,
        RemediationStatus::Pending
    );

    let events = store.list_incident_events(incident_id, 10).await.unwrap();
    assert!(events.iter().any(|e| e.event_type == "remediation_suggested"));
}

#[tokio::test]
async fn remediation_tolerates_a_missing_rca_event() {
    let store = memory_store().await;
    let engine = test_engine(store.clone());
    seed_mock_provider(store.as_ref(), "t1", "u1").await;

    let opened = store
        .open_or_reuse_incident(incident_for(
            "t1",
            &Incident::correlation_fingerprint(sources::HEALTH_CHECK, &[("website_id", "w7")]),
        ))
        .await
        .unwrap();
    let incident_id = opened.incident().id;

    let task = dispatch(
        store.as_ref(),
        &engine,
        DispatchRequest {
            agent_type: AgentKind::Remediation,
            name: "Remediation without RCA".to_string(),
            trigger: None,
            website_id: None,
            incident_id: Some(incident_id),
            input: None,
        },
        "t1",
        "u1",
    )
    .await
    .unwrap();
    engine.execute_task(task.clone()).await.unwrap();

    // proceeds with empty root-cause context rather than failing
    let done = store.get_task(task.id, "t1").await.unwrap().unwrap();
    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(store.list_remediations(incident_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn security_scan_opens_high_severity_incident_when_most_checks_fail() {
    let store = memory_store().await;
    let engine = test_engine(store.clone());

    // http (no TLS) and no hardening headers: all four checks fail
    let healthy = Arc::new(AtomicBool::new(true));
    let url = spawn_stub_site(healthy).await;
    let website = seed_website(store.as_ref(), "t1", &url).await;

    let task = dispatch(
        store.as_ref(),
        &engine,
        DispatchRequest {
            agent_type: AgentKind::Security,
            name: "Security scan".to_string(),
            trigger: None,
            website_id: Some(website.id),
            incident_id: None,
            input: None,
        },
        "t1",
        "user-without-keys",
    )
    .await
    .unwrap();
    engine.execute_task(task.clone()).await.unwrap();

    let done = store.get_task(task.id, "t1").await.unwrap().unwrap();
    assert_eq!(done.status, TaskStatus::Completed);

    let output = done.output.unwrap();
    let checks = output["checks"].as_array().unwrap();
    assert_eq!(checks.len(), 4);
    assert!(checks.iter().all(|c| c["passed"] == false));

    let open = store
        .list_incidents("t1", Some(IncidentStatus::Open), None, 10)
        .await
        .unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].severity, IncidentSeverity::High);
    assert_eq!(open[0].source, sources::SECURITY_AGENT);
    assert!(open[0].description.starts_with("4 security issues found."));
}

#[tokio::test]
async fn scheduler_sweep_drives_the_incident_lifecycle() {
    use agentops_engine::scheduler::HealthCheckScheduler;

    let store = memory_store().await;
    let scheduler = HealthCheckScheduler::new(
        store.clone(),
        Duration::from_secs(60),
        Duration::from_secs(5),
    );

    let healthy = Arc::new(AtomicBool::new(false));
    let url = spawn_stub_site(healthy.clone()).await;
    let website = seed_website(store.as_ref(), "t1", &url).await;

    // unverified websites are never swept
    let now = Utc::now();
    store
        .create_website(Website {
            id: Uuid::new_v4(),
            tenant_id: "t1".to_string(),
            name: "Unverified".to_string(),
            url: url.clone(),
            domain: format!("unverified-{}.test", Uuid::new_v4().simple()),
            verified: false,
            verification_token: None,
            status: WebsiteStatus::Active,
            health_status: HealthStatus::Unknown,
            avg_response_time_ms: None,
            last_checked_at: None,
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();

    // Down tick: observation persisted, incident opened
    let summary = scheduler.sweep().await.unwrap();
    assert_eq!(summary.checked, 1);
    assert_eq!(summary.incidents_opened, 1);
    assert_eq!(summary.failures, 0);

    let reloaded = store.get_website(website.id, "t1").await.unwrap().unwrap();
    assert_eq!(reloaded.health_status, HealthStatus::Down);
    assert!(reloaded.last_checked_at.is_some());

    // A second down tick reuses the open incident
    let summary = scheduler.sweep().await.unwrap();
    assert_eq!(summary.incidents_opened, 0);
    let open = store
        .list_incidents("t1", Some(IncidentStatus::Open), None, 10)
        .await
        .unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].title, format!("{} is down", website.name));

    // Recovery tick resolves it
    healthy.store(true, Ordering::SeqCst);
    let summary = scheduler.sweep().await.unwrap();
    assert_eq!(summary.incidents_resolved, 1);

    let resolved = store
        .list_incidents("t1", Some(IncidentStatus::Resolved), None, 10)
        .await
        .unwrap();
    assert_eq!(resolved.len(), 1);
    assert!(resolved[0].resolved_at.is_some());

    let checks = store.recent_health_checks(website.id, 10).await.unwrap();
    assert_eq!(checks.len(), 3);
}
