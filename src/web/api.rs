//! Defines the Axum API routes and handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::Error;
use crate::model::{Job, Order};
use crate::package::validator::ValidationReport;
use crate::queue::matcher::ConcatenationProposal;
use crate::service::{BatchOutcome, ConsolidationService, MergeOutcome};
use crate::web::models::{
    CreateOrderRequest, ErrorResponse, MergeRequest, RegisterJobRequest, TransitionRequest,
    ValidateRequest,
};

pub type AppState = Arc<ConsolidationService>;

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Creates the Axum router with all the API endpoints.
pub fn create_router(service: AppState) -> Router {
    Router::new()
        .route("/api/v1/orders", get(list_orders).post(create_order))
        .route("/api/v1/orders/{id}", get(get_order))
        .route("/api/v1/orders/{id}/state", post(transition_order))
        .route("/api/v1/jobs", get(list_jobs).post(register_job))
        .route("/api/v1/jobs/reanalyze", post(reanalyze_jobs))
        .route("/api/v1/packages/validate", post(validate_package))
        .route("/api/v1/queue/proposals", get(proposals))
        .route("/api/v1/queue/merge", post(merge))
        .with_state(service)
}

fn api_error(e: Error) -> ApiError {
    let status = match &e {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Parse(_) | Error::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        Error::InvalidTransition(_) | Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        Error::RemoteIo(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorResponse { error: e.to_string() }))
}

async fn list_orders(State(service): State<AppState>) -> Result<Json<Vec<Order>>, ApiError> {
    service.list_orders().await.map(Json).map_err(api_error)
}

async fn get_order(
    State(service): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, ApiError> {
    service.get_order(id).await.map(Json).map_err(api_error)
}

async fn create_order(
    State(service): State<AppState>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let order = service
        .submit_order(
            payload.job_id,
            payload.project_id,
            payload.requested_by,
            payload.quantity,
            payload.due_at,
        )
        .await
        .map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(order)))
}

async fn transition_order(
    State(service): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TransitionRequest>,
) -> Result<Json<Order>, ApiError> {
    service
        .transition_order(id, payload.target)
        .await
        .map(Json)
        .map_err(api_error)
}

async fn list_jobs(State(service): State<AppState>) -> Result<Json<Vec<Job>>, ApiError> {
    service.list_jobs().await.map(Json).map_err(api_error)
}

async fn register_job(
    State(service): State<AppState>,
    Json(payload): Json<RegisterJobRequest>,
) -> Result<(StatusCode, Json<Job>), ApiError> {
    let file_id = payload.file_id.unwrap_or_else(Uuid::new_v4);
    let job = service
        .register_job(&payload.package_path, file_id)
        .await
        .map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(job)))
}

async fn reanalyze_jobs(
    State(service): State<AppState>,
) -> Result<Json<BatchOutcome>, ApiError> {
    service.reanalyze_jobs().await.map(Json).map_err(api_error)
}

async fn validate_package(
    State(service): State<AppState>,
    Json(payload): Json<ValidateRequest>,
) -> Result<Json<ValidationReport>, ApiError> {
    service
        .validate_package(&payload.package_path)
        .await
        .map(Json)
        .map_err(api_error)
}

async fn proposals(
    State(service): State<AppState>,
) -> Result<Json<Vec<ConcatenationProposal>>, ApiError> {
    service.proposals().await.map(Json).map_err(api_error)
}

async fn merge(
    State(service): State<AppState>,
    Json(payload): Json<MergeRequest>,
) -> Result<Json<MergeOutcome>, ApiError> {
    service
        .execute_merge(&payload.order_ids)
        .await
        .map(Json)
        .map_err(api_error)
}
