// src/queue/state.rs - Order lifecycle state machine
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::{Order, OrderState};

/// Marker written into the note of a compensating order.
pub const REPRINT_NOTE: &str = "reprint";

/// Whether `from -> to` is a legal lifecycle step. The happy path is
/// forward-only; `error` is reachable from any non-terminal state.
pub fn can_transition(from: OrderState, to: OrderState) -> bool {
    use OrderState::*;
    match (from, to) {
        (Processing, Queued) => true,
        (Queued, Printing) => true,
        (Printing, Ready) => true,
        (Ready, Delivered) => true,
        (from, Error) => !from.is_terminal(),
        _ => false,
    }
}

/// Result of applying a transition: the mutated order, and for the `error`
/// transition the compensating replacement order that still has to be
/// persisted by the caller.
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub order: Order,
    pub reprint: Option<Order>,
}

/// Apply a lifecycle transition. Entering `printing` stamps the start time,
/// entering `ready` the finish time. Entering `error` additionally builds a
/// replacement order: the original is never retried in place.
pub fn apply_transition(
    mut order: Order,
    target: OrderState,
    now: DateTime<Utc>,
) -> Result<TransitionOutcome> {
    if !can_transition(order.state, target) {
        return Err(Error::InvalidTransition(format!(
            "order {}: {} -> {}",
            order.id, order.state, target
        )));
    }

    let mut reprint = None;
    match target {
        OrderState::Printing => order.started_at = Some(now),
        OrderState::Ready => order.finished_at = Some(now),
        OrderState::Error => reprint = Some(build_reprint(&order, now)),
        _ => {}
    }
    order.state = target;

    Ok(TransitionOutcome { order, reprint })
}

/// The compensating order: same demand, fresh identity, forced straight
/// onto the queue.
fn build_reprint(original: &Order, now: DateTime<Utc>) -> Order {
    Order {
        id: Uuid::new_v4(),
        job_id: original.job_id,
        project_id: original.project_id,
        requested_by: original.requested_by.clone(),
        quantity: original.quantity,
        state: OrderState::Queued,
        created_at: now,
        due_at: original.due_at,
        started_at: None,
        finished_at: None,
        note: Some(format!("{} of order {}", REPRINT_NOTE, original.id)),
    }
}
