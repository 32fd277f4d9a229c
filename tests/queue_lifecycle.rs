//! Order lifecycle tests through the service layer.

mod common;

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use printforge::config::Config;
use printforge::error::Error;
use printforge::model::{Order, OrderState};
use printforge::queue::state::REPRINT_NOTE;
use printforge::service::ConsolidationService;
use printforge::store::{
    MemoryJobStore, MemoryObjectStore, MemoryOrderStore, ObjectStore, OrderStore,
};

use common::package_with;

async fn service_with_order(
    orders: Arc<dyn OrderStore>,
) -> (ConsolidationService, Order) {
    let objects = Arc::new(MemoryObjectStore::new());
    objects
        .upload("jobs/widget.gcode.3mf", &package_with("X1C", "PLA"))
        .await
        .unwrap();
    let jobs = Arc::new(MemoryJobStore::new());
    let service = ConsolidationService::new(objects, orders, jobs, Config::default());
    let job = service
        .register_job("jobs/widget.gcode.3mf", Uuid::new_v4())
        .await
        .unwrap();
    let order = service
        .submit_order(job.id, Uuid::new_v4(), "alice".to_string(), 3, None)
        .await
        .unwrap();
    (service, order)
}

#[tokio::test]
async fn happy_path_stamps_timestamps() {
    let orders = Arc::new(MemoryOrderStore::new());
    let (service, order) = service_with_order(orders).await;

    let order = service
        .transition_order(order.id, OrderState::Queued)
        .await
        .unwrap();
    assert!(order.started_at.is_none());

    let order = service
        .transition_order(order.id, OrderState::Printing)
        .await
        .unwrap();
    assert!(order.started_at.is_some());
    assert!(order.finished_at.is_none());

    let order = service
        .transition_order(order.id, OrderState::Ready)
        .await
        .unwrap();
    assert!(order.finished_at.is_some());

    let order = service
        .transition_order(order.id, OrderState::Delivered)
        .await
        .unwrap();
    assert_eq!(order.state, OrderState::Delivered);
}

#[tokio::test]
async fn skipping_a_step_is_rejected() {
    let orders = Arc::new(MemoryOrderStore::new());
    let (service, order) = service_with_order(orders).await;
    let err = service
        .transition_order(order.id, OrderState::Printing)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidTransition(_)));
}

#[tokio::test]
async fn error_creates_exactly_one_queued_reprint() {
    let orders = Arc::new(MemoryOrderStore::new());
    let (service, order) = service_with_order(orders.clone()).await;
    service
        .transition_order(order.id, OrderState::Queued)
        .await
        .unwrap();
    service
        .transition_order(order.id, OrderState::Printing)
        .await
        .unwrap();
    let failed = service
        .transition_order(order.id, OrderState::Error)
        .await
        .unwrap();
    assert_eq!(failed.state, OrderState::Error);

    let all = orders.list().await.unwrap();
    assert_eq!(all.len(), 2);
    let reprint = all.iter().find(|o| o.id != order.id).unwrap();
    assert_eq!(reprint.state, OrderState::Queued);
    assert_eq!(reprint.quantity, order.quantity);
    assert_eq!(reprint.job_id, order.job_id);
    assert_eq!(reprint.project_id, order.project_id);
    assert!(reprint.note.as_deref().unwrap().contains(REPRINT_NOTE));

    // The original is never retried in place.
    let original = orders.get(order.id).await.unwrap();
    assert_eq!(original.state, OrderState::Error);
    let err = service
        .transition_order(order.id, OrderState::Queued)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidTransition(_)));
}

/// Order store whose inserts can be made to fail on demand, to exercise the
/// compensation failure path.
struct FlakyOrderStore {
    inner: MemoryOrderStore,
    fail_inserts: AtomicBool,
}

impl FlakyOrderStore {
    fn new() -> Self {
        Self {
            inner: MemoryOrderStore::new(),
            fail_inserts: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl OrderStore for FlakyOrderStore {
    async fn insert(&self, order: Order) -> printforge::Result<()> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(Error::RemoteIo("insert refused".to_string()));
        }
        self.inner.insert(order).await
    }

    async fn get(&self, id: Uuid) -> printforge::Result<Order> {
        self.inner.get(id).await
    }

    async fn update(&self, order: Order) -> printforge::Result<()> {
        self.inner.update(order).await
    }

    async fn list(&self) -> printforge::Result<Vec<Order>> {
        self.inner.list().await
    }

    async fn list_by_states(
        &self,
        states: &[OrderState],
    ) -> printforge::Result<Vec<Order>> {
        self.inner.list_by_states(states).await
    }
}

#[tokio::test]
async fn failed_compensation_does_not_fail_the_transition() {
    let orders = Arc::new(FlakyOrderStore::new());
    let (service, order) = service_with_order(orders.clone()).await;
    service
        .transition_order(order.id, OrderState::Queued)
        .await
        .unwrap();

    // Every insert from here on fails, including the reprint's.
    orders.fail_inserts.store(true, Ordering::SeqCst);
    let failed = service
        .transition_order(order.id, OrderState::Error)
        .await
        .unwrap();
    assert_eq!(failed.state, OrderState::Error);

    // The primary transition stuck; only the reprint is missing.
    let all = orders.list().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].state, OrderState::Error);
}
