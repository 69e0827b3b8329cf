use std::collections::{HashMap, VecDeque};
use std::time::SystemTime;

use anyhow::{Result, bail};
use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::Store;
use super::models::{Endpoint, EndpointStatus, FailureRecord};
use crate::checking::types::CheckOutcome;

/// Outcomes retained per endpoint for the latest-failure query.
const HISTORY_LIMIT: usize = 100;

struct Entry {
    endpoint: Endpoint,
    status: EndpointStatus,
    history: VecDeque<(CheckOutcome, SystemTime)>,
}

impl Entry {
    fn new(endpoint: Endpoint) -> Self {
        Self { endpoint, status: EndpointStatus::default(), history: VecDeque::new() }
    }
}

/// In-memory [`Store`] implementation.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<Uuid, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_endpoints(&self) -> Result<Vec<Endpoint>> {
        let entries = self.entries.read().await;
        Ok(entries.values().map(|entry| entry.endpoint.clone()).collect())
    }

    async fn get_endpoint(&self, id: Uuid) -> Result<Option<Endpoint>> {
        let entries = self.entries.read().await;
        Ok(entries.get(&id).map(|entry| entry.endpoint.clone()))
    }

    async fn upsert_endpoint(&self, endpoint: Endpoint) -> Result<()> {
        let mut entries = self.entries.write().await;
        match entries.get_mut(&endpoint.id) {
            Some(entry) => entry.endpoint = endpoint,
            None => {
                entries.insert(endpoint.id, Entry::new(endpoint));
            }
        }
        Ok(())
    }

    async fn remove_endpoint(&self, id: Uuid) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.remove(&id);
        Ok(())
    }

    async fn record_outcome(
        &self,
        id: Uuid,
        outcome: CheckOutcome,
        timestamp: SystemTime,
    ) -> Result<()> {
        let mut entries = self.entries.write().await;
        let Some(entry) = entries.get_mut(&id) else {
            bail!("unknown endpoint {id}");
        };
        entry.status.apply(&outcome, timestamp);
        entry.history.push_back((outcome, timestamp));
        if entry.history.len() > HISTORY_LIMIT {
            entry.history.pop_front();
        }
        Ok(())
    }

    async fn get_status(&self, id: Uuid) -> Result<Option<EndpointStatus>> {
        let entries = self.entries.read().await;
        Ok(entries.get(&id).map(|entry| entry.status.clone()))
    }

    async fn latest_failure(&self) -> Result<Option<FailureRecord>> {
        let entries = self.entries.read().await;
        let mut latest: Option<FailureRecord> = None;
        for entry in entries.values() {
            // History is chronological; the newest failure per endpoint wins.
            let Some((outcome, timestamp)) = entry
                .history
                .iter()
                .rev()
                .find(|(outcome, _)| outcome.category.is_failure())
            else {
                continue;
            };
            if latest.as_ref().is_none_or(|failure| *timestamp > failure.timestamp) {
                latest = Some(FailureRecord {
                    endpoint_id: entry.endpoint.id,
                    name: entry.endpoint.name.clone(),
                    url: entry.endpoint.url.clone(),
                    category: outcome.category,
                    detail: outcome.detail.clone(),
                    timestamp: *timestamp,
                });
            }
        }
        Ok(latest)
    }

    async fn snapshot(&self) -> Result<Vec<(Endpoint, EndpointStatus)>> {
        let entries = self.entries.read().await;
        Ok(entries
            .values()
            .map(|entry| (entry.endpoint.clone(), entry.status.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::checking::types::Category;

    #[tokio::test]
    async fn upsert_and_list_roundtrip() {
        let store = MemoryStore::new();
        let endpoint = Endpoint::new("example", "https://example.test");
        let id = endpoint.id;

        store.upsert_endpoint(endpoint.clone()).await.unwrap();
        assert_eq!(store.list_endpoints().await.unwrap().len(), 1);
        assert_eq!(store.get_endpoint(id).await.unwrap().unwrap().name, "example");

        store.remove_endpoint(id).await.unwrap();
        assert!(store.list_endpoints().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn recording_for_unknown_endpoint_is_an_error() {
        let store = MemoryStore::new();
        let result = store
            .record_outcome(Uuid::new_v4(), CheckOutcome::ok("200"), SystemTime::now())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn latest_failure_picks_most_recent_across_endpoints() {
        let store = MemoryStore::new();
        let first = Endpoint::new("first", "http://first.test");
        let second = Endpoint::new("second", "http://second.test");
        store.upsert_endpoint(first.clone()).await.unwrap();
        store.upsert_endpoint(second.clone()).await.unwrap();

        let t0 = SystemTime::now();
        store
            .record_outcome(first.id, CheckOutcome::fail(Category::Dns, "Not Found"), t0)
            .await
            .unwrap();
        store
            .record_outcome(
                second.id,
                CheckOutcome::fail(Category::Http, "503"),
                t0 + Duration::from_secs(5),
            )
            .await
            .unwrap();
        // A later OK must not displace the failure record.
        store
            .record_outcome(second.id, CheckOutcome::ok("200"), t0 + Duration::from_secs(10))
            .await
            .unwrap();

        let failure = store.latest_failure().await.unwrap().unwrap();
        assert_eq!(failure.endpoint_id, second.id);
        assert_eq!(failure.category, Category::Http);
        assert_eq!(failure.detail, "503");
    }

    #[tokio::test]
    async fn history_is_bounded() {
        let store = MemoryStore::new();
        let endpoint = Endpoint::new("busy", "http://busy.test");
        store.upsert_endpoint(endpoint.clone()).await.unwrap();

        let t0 = SystemTime::now();
        for i in 0..(HISTORY_LIMIT + 20) {
            store
                .record_outcome(
                    endpoint.id,
                    CheckOutcome::ok("200"),
                    t0 + Duration::from_secs(i as u64),
                )
                .await
                .unwrap();
        }

        let entries = store.entries.read().await;
        assert_eq!(entries[&endpoint.id].history.len(), HISTORY_LIMIT);
    }
}
