//! Endpoint records and status storage.
//!
//! The core consults storage through the [`Store`] trait; check outcomes are
//! folded into per-endpoint status records and a bounded outcome history
//! backs the latest-failure query. The bundled implementation keeps
//! everything in memory.

pub mod memory;
pub mod models;

pub use memory::MemoryStore;

use std::time::SystemTime;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::checking::types::CheckOutcome;
use models::{Endpoint, EndpointStatus, FailureRecord};

#[async_trait]
pub trait Store: Send + Sync {
    /// All endpoints eligible for checking.
    async fn list_endpoints(&self) -> Result<Vec<Endpoint>>;

    async fn get_endpoint(&self, id: Uuid) -> Result<Option<Endpoint>>;

    /// Insert or replace an endpoint definition. Replacing keeps the
    /// endpoint's status history.
    async fn upsert_endpoint(&self, endpoint: Endpoint) -> Result<()>;

    async fn remove_endpoint(&self, id: Uuid) -> Result<()>;

    /// Fold an outcome into the endpoint's status record.
    async fn record_outcome(
        &self,
        id: Uuid,
        outcome: CheckOutcome,
        timestamp: SystemTime,
    ) -> Result<()>;

    async fn get_status(&self, id: Uuid) -> Result<Option<EndpointStatus>>;

    /// The most recent non-OK outcome across all endpoints.
    async fn latest_failure(&self) -> Result<Option<FailureRecord>>;

    /// Current endpoint/status pairs, for displays and emergency snapshots.
    async fn snapshot(&self) -> Result<Vec<(Endpoint, EndpointStatus)>>;
}
