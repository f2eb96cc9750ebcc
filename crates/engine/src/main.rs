use std::sync::Arc;
use tracing::info;

use agentops_engine::{
    config::Config,
    scheduler::HealthCheckScheduler,
    server::Server,
    store::create_store,
    workflow::AgentEngine,
    Result,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Load configuration
    let config = Config::load()?;
    info!("Loaded configuration: {:?}", config);

    // Initialize store
    let store = create_store(&config.database).await?;
    store.init().await?;

    // Initialize agent engine
    let engine = Arc::new(AgentEngine::new(
        store.clone(),
        config.scheduler.probe_timeout(),
        config.engine.task_deadline(),
    ));
    engine.clone().start().await;

    // Initialize health check scheduler
    let scheduler = Arc::new(HealthCheckScheduler::new(
        store.clone(),
        config.scheduler.check_interval(),
        config.scheduler.probe_timeout(),
    ));
    scheduler.start();

    // Initialize server
    let server = Server::new(&config, store, engine);

    // Start server
    info!("Starting server on {}", config.server.addr);
    server.start(&config.server.addr).await?;

    Ok(())
}
