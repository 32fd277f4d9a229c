//! Contains the data models for API requests and responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::OrderState;

/// Request to submit a new order.
#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub job_id: Uuid,
    pub project_id: Uuid,
    pub requested_by: String,
    pub quantity: u32,
    #[serde(default)]
    pub due_at: Option<DateTime<Utc>>,
}

/// Request to move an order to a new lifecycle state.
#[derive(Deserialize)]
pub struct TransitionRequest {
    pub target: OrderState,
}

/// Request to register a job from a stored package archive.
#[derive(Deserialize)]
pub struct RegisterJobRequest {
    pub package_path: String,
    #[serde(default)]
    pub file_id: Option<Uuid>,
}

/// Request to execute a merge over the given orders.
#[derive(Deserialize)]
pub struct MergeRequest {
    pub order_ids: Vec<Uuid>,
}

/// Request to re-validate a stored package.
#[derive(Deserialize)]
pub struct ValidateRequest {
    pub package_path: String,
}

/// Error payload returned with non-2xx statuses.
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
