// src/store/memory.rs - In-memory store implementations
//
// Used by tests and by standalone deployments that keep the queue in
// process memory.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::{Job, Order, OrderState};
use crate::store::{JobStore, ObjectStore, OrderStore};

/// In-memory blob store.
#[derive(Clone, Default)]
pub struct MemoryObjectStore {
    objects: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn download(&self, path: &str) -> Result<Vec<u8>> {
        let objects = self.objects.read().await;
        objects
            .get(path)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("object '{}'", path)))
    }

    async fn upload(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let mut objects = self.objects.write().await;
        if objects.contains_key(path) {
            return Err(Error::RemoteIo(format!("object '{}' already exists", path)));
        }
        objects.insert(path.to_string(), bytes.to_vec());
        Ok(())
    }
}

/// In-memory order rows. Listing preserves insertion order so proposal
/// discovery order is stable.
#[derive(Clone, Default)]
pub struct MemoryOrderStore {
    rows: Arc<RwLock<Vec<Order>>>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn insert(&self, order: Order) -> Result<()> {
        self.rows.write().await.push(order);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Order> {
        let rows = self.rows.read().await;
        rows.iter()
            .find(|o| o.id == id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("order {}", id)))
    }

    async fn update(&self, order: Order) -> Result<()> {
        let mut rows = self.rows.write().await;
        match rows.iter_mut().find(|o| o.id == order.id) {
            Some(row) => {
                *row = order;
                Ok(())
            }
            None => Err(Error::NotFound(format!("order {}", order.id))),
        }
    }

    async fn list(&self) -> Result<Vec<Order>> {
        Ok(self.rows.read().await.clone())
    }

    async fn list_by_states(&self, states: &[OrderState]) -> Result<Vec<Order>> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|o| states.contains(&o.state))
            .cloned()
            .collect())
    }
}

/// In-memory job rows.
#[derive(Clone, Default)]
pub struct MemoryJobStore {
    rows: Arc<RwLock<Vec<Job>>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: Job) -> Result<()> {
        self.rows.write().await.push(job);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Job> {
        let rows = self.rows.read().await;
        rows.iter()
            .find(|j| j.id == id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("job {}", id)))
    }

    async fn update(&self, job: Job) -> Result<()> {
        let mut rows = self.rows.write().await;
        match rows.iter_mut().find(|j| j.id == job.id) {
            Some(row) => {
                *row = job;
                Ok(())
            }
            None => Err(Error::NotFound(format!("job {}", job.id))),
        }
    }

    async fn list(&self) -> Result<Vec<Job>> {
        Ok(self.rows.read().await.clone())
    }
}
