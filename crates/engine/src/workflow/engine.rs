//! Agent task executor.
//!
//! Dispatch enqueues tasks; the execution loop spawns one pipeline run per
//! task. A task is transitioned PENDING -> RUNNING as the explicit first
//! step, runs its pipeline under an end-to-end deadline, and is completed
//! exactly once at the pipeline boundary. Steps are never retried here;
//! retry means an explicit re-dispatch.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value as JsonValue};
use tokio::sync::{mpsc, RwLock};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    metrics,
    probe::HealthProber,
    security::SecurityScanner,
    store::{AgentKind, AgentTask, AgentTaskLog, Store, TaskStatus},
    Error, Result,
};

pub struct AgentEngine {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) prober: HealthProber,
    pub(crate) scanner: SecurityScanner,
    pub(crate) probe_timeout: Duration,
    task_deadline: Duration,
    queue_tx: mpsc::Sender<AgentTask>,
    queue_rx: Arc<RwLock<mpsc::Receiver<AgentTask>>>,
}

impl AgentEngine {
    pub fn new(store: Arc<dyn Store>, probe_timeout: Duration, task_deadline: Duration) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(100);

        Self {
            store,
            prober: HealthProber::new(),
            scanner: SecurityScanner::new(),
            probe_timeout,
            task_deadline,
            queue_tx,
            queue_rx: Arc::new(RwLock::new(queue_rx)),
        }
    }

    pub async fn start(self: Arc<Self>) {
        info!("Starting agent engine");

        let engine = self.clone();
        tokio::spawn(async move {
            engine.execution_loop().await;
        });
    }

    async fn execution_loop(self: Arc<Self>) {
        let mut rx = self.queue_rx.write().await;

        while let Some(task) = rx.recv().await {
            let engine = self.clone();
            tokio::spawn(async move {
                if let Err(e) = engine.execute_task(task).await {
                    error!("Agent task execution failed: {}", e);
                }
            });
        }
    }

    pub async fn enqueue(&self, task: AgentTask) -> Result<()> {
        self.queue_tx
            .send(task)
            .await
            .map_err(|e| Error::Execution(format!("Failed to queue agent task: {}", e)))
    }

    /// Run one task to a terminal state. Public so tests and embedded
    /// callers can execute a task without going through the queue.
    pub async fn execute_task(&self, task: AgentTask) -> Result<()> {
        info!("Executing agent task {} ({})", task.id, task.kind);

        if !self.store.mark_task_running(task.id).await? {
            warn!("Agent task {} is not pending; skipping execution", task.id);
            return Ok(());
        }

        match tokio::time::timeout(self.task_deadline, self.run_pipeline(&task)).await {
            Ok(Ok(output)) => {
                self.store
                    .complete_task(task.id, TaskStatus::Completed, Some(output), None)
                    .await?;
                metrics::TASKS_COMPLETED_TOTAL.inc();
                info!("Agent task {} completed", task.id);
            }
            Ok(Err(e)) => {
                error!("Agent task {} failed: {}", task.id, e);
                self.store
                    .complete_task(task.id, TaskStatus::Failed, None, Some(e.to_string()))
                    .await?;
                metrics::TASKS_FAILED_TOTAL.inc();
            }
            Err(_) => {
                error!("Agent task {} exceeded its deadline", task.id);
                self.store
                    .complete_task(
                        task.id,
                        TaskStatus::Failed,
                        None,
                        Some(format!(
                            "task deadline of {}s exceeded",
                            self.task_deadline.as_secs()
                        )),
                    )
                    .await?;
                metrics::TASKS_FAILED_TOTAL.inc();
            }
        }

        Ok(())
    }

    async fn run_pipeline(&self, task: &AgentTask) -> Result<JsonValue> {
        match task.kind {
            AgentKind::Monitoring => self.run_monitoring(task).await,
            AgentKind::Rca => self.run_rca(task).await,
            AgentKind::Security => self.run_security(task).await,
            AgentKind::Remediation => self.run_remediation(task).await,
            // placeholder kinds are normally completed at dispatch and
            // never reach the queue
            AgentKind::Incident | AgentKind::Deployment => {
                Ok(json!({ "message": "no pipeline defined for this agent type" }))
            }
        }
    }

    /// Append a step-level progress record. Observability only: a failed
    /// log write is reported and swallowed, never control flow.
    pub(crate) async fn log_step(&self, task_id: Uuid, step: &str, message: &str) {
        let log = AgentTaskLog {
            id: Uuid::new_v4(),
            task_id,
            step: step.to_string(),
            message: message.to_string(),
            created_at: Utc::now(),
        };

        if let Err(e) = self.store.append_task_log(log).await {
            warn!("Failed to append task log for {}: {}", task_id, e);
        }
    }
}
