// Prometheus metrics for gate decisions
//
// - Rate limit decisions by outcome (counter)
// - Bucket evictions (counter)
// - Permission decisions by outcome (counter)
// - Recorded actions by ruled action name (counter)

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, Registry, TextEncoder};
use std::sync::Arc;

lazy_static! {
    pub static ref REGISTRY: Arc<Registry> = Arc::new(Registry::new());

    // Rate limiter metrics
    pub static ref RATE_LIMIT_DECISIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("rate_limit_decisions_total", "Rate limiter decisions by outcome"),
        &["outcome"]
    ).expect("Failed to create rate limit decisions metric");

    pub static ref RATE_LIMIT_EVICTIONS_TOTAL: IntCounter = IntCounter::new(
        "rate_limit_evictions_total",
        "Buckets evicted from a full bucket table"
    ).expect("Failed to create rate limit evictions metric");

    // Permission metrics
    pub static ref PERMISSION_DECISIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("permission_decisions_total", "Permission decisions by outcome"),
        &["outcome"]
    ).expect("Failed to create permission decisions metric");

    pub static ref ACTIONS_RECORDED_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new(
            "actions_recorded_total",
            "Actions recorded after execution; actions without a rule share one label"
        ),
        &["action"]
    ).expect("Failed to create actions recorded metric");
}

/// Label for actions recorded without a rule of their own
pub const UNRULED_ACTION_LABEL: &str = "unruled";

/// Register all collectors; calling more than once is harmless
pub fn init() -> prometheus::Result<()> {
    register(Box::new(RATE_LIMIT_DECISIONS_TOTAL.clone()))?;
    register(Box::new(RATE_LIMIT_EVICTIONS_TOTAL.clone()))?;
    register(Box::new(PERMISSION_DECISIONS_TOTAL.clone()))?;
    register(Box::new(ACTIONS_RECORDED_TOTAL.clone()))?;
    Ok(())
}

fn register(collector: Box<dyn prometheus::core::Collector>) -> prometheus::Result<()> {
    match REGISTRY.register(collector) {
        Err(prometheus::Error::AlreadyReg) => Ok(()),
        other => other,
    }
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("Invalid UTF-8 in metrics: {}", e))
}
