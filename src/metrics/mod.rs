//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Transaction builds
//! - Approval submissions by outcome
//! - Execution attempts and broadcast latency
//! - Persistence and account resolution failures

use crate::error::{CoordinatorError, CoordinatorResult};
use crate::ledger::SubmissionOutcome;

use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram, Counter,
    CounterVec, Encoder, Gauge, Histogram, TextEncoder,
};
use std::net::SocketAddr;
use tracing::{error, info};

lazy_static! {
    pub static ref BUILDS: Counter = register_counter!(
        "cosigner_builds_total",
        "Total transaction records built"
    ).unwrap();

    pub static ref APPROVALS: CounterVec = register_counter_vec!(
        "cosigner_approvals_total",
        "Total approval submissions by outcome",
        &["outcome"]
    ).unwrap();

    pub static ref DISTINCT_APPROVALS: Gauge = register_gauge!(
        "cosigner_distinct_approvals",
        "Distinct authorized approvals on the active record"
    ).unwrap();

    pub static ref EXECUTIONS: CounterVec = register_counter_vec!(
        "cosigner_executions_total",
        "Total execution attempts by outcome",
        &["outcome"]
    ).unwrap();

    pub static ref BROADCAST_LATENCY: Histogram = register_histogram!(
        "cosigner_broadcast_latency_seconds",
        "Time from broadcast start to result",
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
    ).unwrap();

    pub static ref PERSISTENCE_FAILURES: Counter = register_counter!(
        "cosigner_persistence_failures_total",
        "Total failed state store writes"
    ).unwrap();

    pub static ref ACCOUNT_RESOLUTIONS: CounterVec = register_counter_vec!(
        "cosigner_account_resolutions_total",
        "Account config fetches by result",
        &["result"]
    ).unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> CoordinatorResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app)
            .await
            .map_err(|e| CoordinatorError::Internal(format!("metrics server: {}", e)))
    }
}

async fn metrics_handler() -> Result<String, StatusCode> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).map_err(|e| {
        error!("Failed to encode metrics: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    String::from_utf8(buffer).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

// Helper functions to record metrics

pub fn record_build() {
    BUILDS.inc();
}

pub fn record_submission(outcome: SubmissionOutcome) {
    let label = match outcome {
        SubmissionOutcome::Counted => "counted",
        SubmissionOutcome::Duplicate => "duplicate",
        SubmissionOutcome::Unauthorized => "unauthorized",
        SubmissionOutcome::IdentityUnresolved => "identity_unresolved",
        SubmissionOutcome::InvalidSignature => "invalid_signature",
    };
    APPROVALS.with_label_values(&[label]).inc();
}

pub fn set_distinct_approvals(count: usize) {
    DISTINCT_APPROVALS.set(count as f64);
}

pub fn record_execution(outcome: &str) {
    EXECUTIONS.with_label_values(&[outcome]).inc();
}

pub fn observe_broadcast_latency(latency_secs: f64) {
    BROADCAST_LATENCY.observe(latency_secs);
}

pub fn record_persistence_failure() {
    PERSISTENCE_FAILURES.inc();
}

pub fn record_account_resolution(success: bool) {
    ACCOUNT_RESOLUTIONS
        .with_label_values(&[if success { "ok" } else { "error" }])
        .inc();
}
