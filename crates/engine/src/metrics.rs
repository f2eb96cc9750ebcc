use lazy_static::lazy_static;
use prometheus::{register_int_counter, Encoder, IntCounter, TextEncoder};

lazy_static! {
    pub static ref HEALTH_CHECKS_TOTAL: IntCounter = register_int_counter!(
        "agentops_health_checks_total",
        "Total number of health probes executed."
    )
    .unwrap();
    pub static ref INCIDENTS_OPENED_TOTAL: IntCounter = register_int_counter!(
        "agentops_incidents_opened_total",
        "Total number of incidents opened automatically."
    )
    .unwrap();
    pub static ref INCIDENTS_RESOLVED_TOTAL: IntCounter = register_int_counter!(
        "agentops_incidents_resolved_total",
        "Total number of incidents auto-resolved."
    )
    .unwrap();
    pub static ref TASKS_DISPATCHED_TOTAL: IntCounter = register_int_counter!(
        "agentops_agent_tasks_dispatched_total",
        "Total number of agent tasks dispatched."
    )
    .unwrap();
    pub static ref TASKS_COMPLETED_TOTAL: IntCounter = register_int_counter!(
        "agentops_agent_tasks_completed_total",
        "Total number of agent tasks that reached COMPLETED."
    )
    .unwrap();
    pub static ref TASKS_FAILED_TOTAL: IntCounter = register_int_counter!(
        "agentops_agent_tasks_failed_total",
        "Total number of agent tasks that reached FAILED."
    )
    .unwrap();
}

// Function to gather metrics for exposition
pub fn gather_metrics() -> String {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode(&metric_families, &mut buffer)
        .expect("Failed to encode metrics");
    String::from_utf8(buffer).expect("Failed to convert metrics to string")
}
