mod routes;

use axum::{
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use http::StatusCode;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::{config::Config, probe::HealthProber, store::Store, workflow::AgentEngine, Error};

pub struct Server {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) engine: Arc<AgentEngine>,
    pub(crate) prober: HealthProber,
    pub(crate) probe_timeout: Duration,
}

impl Server {
    pub fn new(config: &Config, store: Arc<dyn Store>, engine: Arc<AgentEngine>) -> Self {
        Self {
            store,
            engine,
            prober: HealthProber::new(),
            probe_timeout: config.scheduler.probe_timeout(),
        }
    }

    pub fn build_router(self) -> Router {
        let state = Arc::new(self);

        Router::new()
            .route("/health", get(routes::health))
            .route("/metrics", get(routes::metrics))
            .route("/websites", post(routes::create_website).get(routes::list_websites))
            .route("/websites/{id}", axum::routing::delete(routes::delete_website))
            .route(
                "/health-checks",
                post(routes::trigger_health_check).get(routes::list_health_checks),
            )
            .route(
                "/agent-tasks",
                post(routes::create_agent_task).get(routes::list_agent_tasks),
            )
            .route("/agent-tasks/{id}", get(routes::get_agent_task))
            .route(
                "/incidents",
                post(routes::create_incident).get(routes::list_incidents),
            )
            .route(
                "/incidents/{id}",
                get(routes::get_incident).patch(routes::update_incident),
            )
            .route(
                "/settings/llm",
                get(routes::get_llm_settings).put(routes::update_llm_settings),
            )
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    pub async fn start(self, addr: &str) -> crate::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, self.build_router()).await?;
        Ok(())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {}", self);
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
