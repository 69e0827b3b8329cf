use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime};

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{Semaphore, broadcast};
use tokio::time::timeout;
use tracing::{info, warn};

use super::engine::Checker;
use super::types::{Category, CheckOutcome};
use crate::storage::Store;
use crate::storage::models::Endpoint;

/// Progress events published while a batch runs. Plain data only, so any
/// consumer (status display, log sink) can subscribe.
#[derive(Debug, Clone)]
pub enum BatchEvent {
    BatchStarted { total: usize },
    EndpointChecked { endpoint: Endpoint, outcome: CheckOutcome },
    /// The unit around the check failed: it timed out or panicked. The
    /// stored outcome is `Error` with the same detail.
    EndpointFailed { endpoint: Endpoint, error: String },
    BatchComplete { total: usize, succeeded: usize, duration_secs: f64 },
}

/// Runs one batch of endpoint checks at a time.
///
/// Each endpoint gets one bounded unit of work; results are persisted and
/// published as they arrive, in completion order. At most one batch is in
/// flight; a second `start_batch` while one runs is rejected, not queued.
pub struct Orchestrator {
    checker: Arc<dyn Checker>,
    store: Arc<dyn Store>,
    events: broadcast::Sender<BatchEvent>,
    running: AtomicBool,
    stop: Arc<AtomicBool>,
    unit_timeout: Duration,
    max_concurrent: usize,
}

impl Orchestrator {
    pub fn new(
        checker: Arc<dyn Checker>,
        store: Arc<dyn Store>,
        polling_interval: Duration,
        max_concurrent: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            checker,
            store,
            events,
            running: AtomicBool::new(false),
            stop: Arc::new(AtomicBool::new(false)),
            unit_timeout: unit_timeout(polling_interval),
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BatchEvent> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Dispatch one check per endpoint and return immediately. `false` when
    /// a batch is already in flight or there is nothing to check.
    pub fn start_batch(self: &Arc<Self>, endpoints: Vec<Endpoint>) -> bool {
        if endpoints.is_empty() {
            return false;
        }
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!("check batch already in progress, skipping");
            return false;
        }
        self.stop.store(false, Ordering::SeqCst);
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move { orchestrator.run_batch(endpoints).await });
        true
    }

    /// Cooperative stop: units that have not started are skipped; in-flight
    /// network calls are left to their own timeouts.
    pub fn stop_batch(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    async fn run_batch(self: Arc<Self>, endpoints: Vec<Endpoint>) {
        let started = Instant::now();
        let total = endpoints.len();
        let mut succeeded = 0usize;
        self.publish(BatchEvent::BatchStarted { total });

        let workers = Arc::new(Semaphore::new(self.max_concurrent));
        let mut units = FuturesUnordered::new();
        for endpoint in endpoints {
            let checker = Arc::clone(&self.checker);
            let stop = Arc::clone(&self.stop);
            let workers = Arc::clone(&workers);
            let unit_timeout = self.unit_timeout;
            units.push(async move {
                let Ok(_permit) = workers.acquire().await else {
                    return (endpoint, Unit::Skipped);
                };
                if stop.load(Ordering::SeqCst) {
                    return (endpoint, Unit::Skipped);
                }
                let check = tokio::spawn({
                    let endpoint = endpoint.clone();
                    async move { checker.check(&endpoint).await }
                });
                match timeout(unit_timeout, check).await {
                    Ok(Ok(outcome)) => (endpoint, Unit::Finished(outcome)),
                    Ok(Err(join_error)) => (endpoint, Unit::Failed(panic_detail(join_error))),
                    // The spawned check is abandoned, not killed; its own
                    // request timeout bounds whatever it still holds.
                    Err(_) => (endpoint, Unit::Failed("Checker timeout".to_string())),
                }
            });
        }

        while let Some((endpoint, unit)) = units.next().await {
            match unit {
                Unit::Skipped => {}
                Unit::Finished(outcome) => {
                    succeeded += 1;
                    self.record(&endpoint, &outcome).await;
                    self.publish(BatchEvent::EndpointChecked { endpoint, outcome });
                }
                Unit::Failed(error) => {
                    let outcome = CheckOutcome::fail(Category::Error, error.clone());
                    self.record(&endpoint, &outcome).await;
                    self.publish(BatchEvent::EndpointFailed { endpoint, error });
                }
            }
        }

        let duration_secs = started.elapsed().as_secs_f64();
        self.running.store(false, Ordering::SeqCst);
        self.publish(BatchEvent::BatchComplete { total, succeeded, duration_secs });
        info!(total, succeeded, duration_secs, "check batch finished");
    }

    /// A failed status write must not stall monitoring; log and move on.
    async fn record(&self, endpoint: &Endpoint, outcome: &CheckOutcome) {
        if let Err(error) = self
            .store
            .record_outcome(endpoint.id, outcome.clone(), SystemTime::now())
            .await
        {
            warn!(endpoint = %endpoint.name, %error, "failed to persist check outcome");
        }
    }

    fn publish(&self, event: BatchEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

enum Unit {
    Skipped,
    Finished(CheckOutcome),
    Failed(String),
}

/// One slow endpoint may never consume the whole polling interval.
fn unit_timeout(polling_interval: Duration) -> Duration {
    Duration::from_secs(30).min(polling_interval / 2)
}

fn panic_detail(error: tokio::task::JoinError) -> String {
    match error.try_into_panic() {
        Ok(panic) => panic
            .downcast_ref::<&str>()
            .map(|message| message.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "check task panicked".to_string()),
        Err(error) => error.to_string(),
    }
}
