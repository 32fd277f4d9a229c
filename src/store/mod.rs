//! Storage collaborator seams.
//!
//! The core talks to object storage and the relational rows through these
//! traits so tests and deployments can swap backends. All implementations
//! are injected; none are reachable through globals.

pub mod fs;
pub mod memory;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::model::{Job, Order, OrderState};

pub use fs::FsObjectStore;
pub use memory::{MemoryJobStore, MemoryOrderStore, MemoryObjectStore};

/// Blob storage for package archives and merged artifacts.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch the bytes at `path`. `Error::NotFound` when absent.
    async fn download(&self, path: &str) -> Result<Vec<u8>>;

    /// Store bytes at `path`. `Error::RemoteIo` on conflict with an
    /// existing object.
    async fn upload(&self, path: &str, bytes: &[u8]) -> Result<()>;
}

/// Row access for orders.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert(&self, order: Order) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Order>;
    async fn update(&self, order: Order) -> Result<()>;
    async fn list(&self) -> Result<Vec<Order>>;
    async fn list_by_states(&self, states: &[OrderState]) -> Result<Vec<Order>>;
}

/// Row access for jobs.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: Job) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Job>;
    async fn update(&self, job: Job) -> Result<()>;
    async fn list(&self) -> Result<Vec<Job>>;
}
