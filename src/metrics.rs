// src/metrics.rs

#[cfg(feature = "observability")]
pub use metrics::{counter, describe_counter, describe_gauge, gauge, Unit};

// NOTE: When observability feature is disabled, provide stub implementations
#[cfg(not(feature = "observability"))]
pub enum Unit {
    Count,
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! counter {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {{
        let _ = &$value;
        $( let _ = &$label_value; )*
    }};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! gauge {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {{
        let _ = &$value;
        $( let _ = &$label_value; )*
    }};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_counter {
    ($name:expr, $unit:expr, $desc:expr) => {};
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_gauge {
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
use crate::{counter, describe_counter, describe_gauge, gauge};

/// Initializes the descriptions for all the metrics in the application.
/// This should be called once at startup.
pub fn describe_metrics() {
    describe_counter!(
        "controller_rebalances_total",
        Unit::Count,
        "Total number of successful rebalance actions, labeled by kind (reindex, reweigh)."
    );
    describe_counter!(
        "controller_rejections_total",
        Unit::Count,
        "Total number of rejected controller actions, labeled by action and error class."
    );
    describe_counter!(
        "controller_pools_total",
        Unit::Count,
        "Total number of pools, labeled by lifecycle stage reached (prepared, finalized)."
    );
    describe_gauge!(
        "controller_category_tokens",
        "Current number of member tokens per category."
    );
}

/// Installs the Prometheus exporter on `addr`.
#[cfg(feature = "observability")]
pub fn install_prometheus_exporter(addr: std::net::SocketAddr) -> anyhow::Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    describe_metrics();
    Ok(())
}

// --- Helper functions to update metrics ---

pub fn increment_rebalance(kind: &'static str) {
    counter!("controller_rebalances_total", 1, "kind" => kind);
}

pub fn increment_rejection(action: &'static str, class: &'static str) {
    counter!("controller_rejections_total", 1, "action" => action, "class" => class);
}

pub fn increment_pool_stage(stage: &'static str) {
    counter!("controller_pools_total", 1, "stage" => stage);
}

pub fn set_category_tokens(category_id: u64, count: usize) {
    gauge!("controller_category_tokens", count as f64, "category" => category_id.to_string());
}
