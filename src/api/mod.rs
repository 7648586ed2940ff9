//! HTTP API for building, approving and executing transactions

use crate::account::AccountConfig;
use crate::config::ApiConfig;
use crate::coordination::{ApprovalSubmission, Coordinator, Cycle};
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::ledger::{Approval, SubmissionResult};
use crate::record::{CommitmentHash, RawTransactionFields};

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
}

/// Run the HTTP API server
pub async fn run_server(config: ApiConfig, coordinator: Arc<Coordinator>) -> CoordinatorResult<()> {
    let app = router(AppState { coordinator });

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .await
        .map_err(|e| CoordinatorError::Internal(format!("api server: {}", e)))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/account", get(get_account))
        .route("/account/refresh", post(refresh_account))
        .route("/transactions", post(build_transaction))
        .route("/transactions/current", get(current_transaction))
        .route("/approvals", get(list_approvals).post(submit_approval))
        .route("/approvals/bulk", post(submit_bulk))
        .route("/approvals/retry", post(retry_unresolved))
        .route("/status", get(get_status))
        .route("/execute", post(execute))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

impl IntoResponse for CoordinatorError {
    fn into_response(self) -> Response {
        let status = match &self {
            CoordinatorError::Validation(_) => StatusCode::BAD_REQUEST,
            CoordinatorError::NoActiveTransaction => StatusCode::NOT_FOUND,
            CoordinatorError::StaleCommitment { .. }
            | CoordinatorError::ThresholdNotMet { .. }
            | CoordinatorError::AlreadyExecuting
            | CoordinatorError::AlreadySubmitted { .. }
            | CoordinatorError::OutcomeUnknown => StatusCode::CONFLICT,
            CoordinatorError::BroadcastFailed { .. } => StatusCode::BAD_GATEWAY,
            CoordinatorError::Resolution(_) | CoordinatorError::HashUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            CoordinatorError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            CoordinatorError::Storage(_)
            | CoordinatorError::Config(_)
            | CoordinatorError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(ErrorResponse::from(&self))).into_response()
    }
}

/// Health check endpoint - basic liveness
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness check - verify store and account resolver
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let (store, account) = state.coordinator.readiness().await;
    let ready = store && account;

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(ReadinessResponse {
            ready,
            store,
            account,
        }),
    )
}

/// Cached account config, or the single-party fallback; never fetches
async fn get_account(State(state): State<AppState>) -> impl IntoResponse {
    let directory = state.coordinator.directory();
    let response = match directory.cached().await {
        Some(cached) => AccountResponse {
            account: cached.config,
            resolved: true,
            stale: cached.stale,
        },
        None => AccountResponse {
            account: directory.current_or_default().await,
            resolved: false,
            stale: false,
        },
    };
    Json(response)
}

async fn refresh_account(State(state): State<AppState>) -> Result<Json<AccountResponse>, CoordinatorError> {
    let refreshed = state.coordinator.directory().refresh().await?;
    Ok(Json(AccountResponse {
        account: refreshed.config,
        resolved: true,
        stale: refreshed.stale,
    }))
}

async fn build_transaction(
    State(state): State<AppState>,
    Json(fields): Json<RawTransactionFields>,
) -> Result<impl IntoResponse, CoordinatorError> {
    let outcome = state.coordinator.build(fields).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

async fn current_transaction(State(state): State<AppState>) -> Result<Json<Cycle>, CoordinatorError> {
    Ok(Json(state.coordinator.current().await?))
}

async fn submit_approval(
    State(state): State<AppState>,
    Json(submission): Json<ApprovalSubmission>,
) -> Result<Json<SubmissionResult>, CoordinatorError> {
    Ok(Json(state.coordinator.submit(submission).await?))
}

async fn submit_bulk(
    State(state): State<AppState>,
    Json(request): Json<BulkRequest>,
) -> impl IntoResponse {
    let results = state
        .coordinator
        .submit_bulk(&request.signatures, request.commitment_hash)
        .await
        .into_iter()
        .map(|result| match result {
            Ok(result) => BulkItem {
                result: Some(result),
                error: None,
            },
            Err(e) => BulkItem {
                result: None,
                error: Some(ErrorResponse::from(&e)),
            },
        })
        .collect();

    Json(BulkResponse { results })
}

async fn retry_unresolved(State(state): State<AppState>) -> Result<impl IntoResponse, CoordinatorError> {
    Ok(Json(state.coordinator.retry_unresolved().await?))
}

async fn list_approvals(State(state): State<AppState>) -> Result<Json<Vec<Approval>>, CoordinatorError> {
    Ok(Json(state.coordinator.approvals().await?))
}

async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.coordinator.status().await)
}

async fn execute(
    State(state): State<AppState>,
    request: Option<Json<ExecuteRequest>>,
) -> Result<impl IntoResponse, CoordinatorError> {
    let force = request.map(|Json(r)| r.force).unwrap_or(false);
    Ok(Json(state.coordinator.execute(force).await?))
}

// Request types

#[derive(Deserialize)]
struct BulkRequest {
    /// One hex signature per line
    signatures: String,
    #[serde(default)]
    commitment_hash: Option<CommitmentHash>,
}

#[derive(Deserialize)]
struct ExecuteRequest {
    #[serde(default)]
    force: bool,
}

// Response types

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    retryable: bool,
}

impl From<&CoordinatorError> for ErrorResponse {
    fn from(e: &CoordinatorError) -> Self {
        Self {
            error: e.kind().to_string(),
            message: e.to_string(),
            retryable: e.is_retryable(),
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct ReadinessResponse {
    ready: bool,
    store: bool,
    account: bool,
}

#[derive(Serialize)]
struct AccountResponse {
    #[serde(flatten)]
    account: AccountConfig,
    /// False when the single-party fallback is shown
    resolved: bool,
    /// True when the last fetch failed and an older value is shown
    stale: bool,
}

#[derive(Serialize)]
struct BulkItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<SubmissionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorResponse>,
}

#[derive(Serialize)]
struct BulkResponse {
    results: Vec<BulkItem>,
}
