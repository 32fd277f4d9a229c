//! Row and value types shared across the service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Lifecycle state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    /// Just submitted, not yet accepted onto the queue.
    Processing,
    /// Accepted, waiting for a printer.
    Queued,
    /// On a printer.
    Printing,
    /// Printed, waiting for pickup/delivery.
    Ready,
    /// Handed over. Terminal.
    Delivered,
    /// Failed. Terminal; a replacement order is created instead of retrying.
    Error,
}

impl OrderState {
    /// States whose orders the candidate matcher considers.
    pub fn is_merge_eligible(self) -> bool {
        matches!(
            self,
            OrderState::Queued | OrderState::Printing | OrderState::Ready | OrderState::Error
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderState::Delivered | OrderState::Error)
    }
}

impl std::fmt::Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderState::Processing => "processing",
            OrderState::Queued => "queued",
            OrderState::Printing => "printing",
            OrderState::Ready => "ready",
            OrderState::Delivered => "delivered",
            OrderState::Error => "error",
        };
        f.write_str(s)
    }
}

/// A unit of demand for a printed item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub job_id: Uuid,
    pub project_id: Uuid,
    pub requested_by: String,
    pub quantity: u32,
    pub state: OrderState,
    pub created_at: DateTime<Utc>,
    pub due_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
}

impl Order {
    /// New order in the initial `processing` state. Quantity must be
    /// positive; zero-quantity demand is meaningless.
    pub fn new(
        job_id: Uuid,
        project_id: Uuid,
        requested_by: String,
        quantity: u32,
        due_at: Option<DateTime<Utc>>,
    ) -> crate::error::Result<Self> {
        if quantity == 0 {
            return Err(crate::error::Error::InvalidInput(
                "order quantity must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            job_id,
            project_id,
            requested_by,
            quantity,
            state: OrderState::Processing,
            created_at: Utc::now(),
            due_at,
            started_at: None,
            finished_at: None,
            note: None,
        })
    }
}

/// Metadata about one sliceable unit, backed by a stored package archive.
/// One job may back many orders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub file_id: Uuid,
    pub package_path: String,
    /// Extracted material weight in grams, 0.0 when unknown.
    pub weight_g: f64,
    /// Estimated print duration in minutes, 0.0 when unknown.
    pub duration_min: f64,
    /// Material name, empty when unknown.
    pub material: String,
    /// Free-text printer identifier, empty when unknown.
    pub printer_model: String,
    /// Print-profile name recovered from slicer metadata.
    pub print_profile: String,
    pub uploaded_at: DateTime<Utc>,
}

/// A proposed merge of one or more orders into a single printable artifact.
/// Computed on demand, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcatenationCandidate {
    pub order_ids: Vec<Uuid>,
    pub job_ids: Vec<Uuid>,
    pub printer_model: String,
    pub material: String,
    pub print_profile: String,
    /// Total replicated quantity, equal to the sum of the constituent
    /// orders' quantities.
    pub total_quantity: u32,
    /// True when every constituent order shares one job.
    pub is_same_gcode: bool,
}

/// Display metadata for a freshly built package.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageSummary {
    pub original_files: Vec<String>,
    pub total_layers: u64,
    pub total_time_min: f64,
    pub total_material_g: f64,
    /// Entry name -> hex digest for the rebuilt checksum entries.
    pub checksums: BTreeMap<String, String>,
}
