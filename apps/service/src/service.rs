//! Host process glue: wires the store, engine, orchestrator, and watchdog
//! together and runs the monitored event loop.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::checking::engine::host_of;
use crate::checking::{BatchEvent, Checker, InstrumentedChecker, Orchestrator, ProtocolChecker};
use crate::config::Config;
use crate::storage::models::Endpoint;
use crate::storage::{MemoryStore, Store};
use crate::watchdog::heartbeat::{self, HeartbeatResponder};
use crate::watchdog::{Watchdog, WatchdogHost};

/// Control messages into the monitored loop.
#[derive(Debug)]
pub enum Command {
    /// Drain queued heartbeat pings; sent by the watchdog's remediation hook.
    Drain,
    Shutdown,
}

/// The monitored event loop: polling ticks, orchestrator events, heartbeat
/// echoes, and control commands all pass through here.
pub struct Service {
    orchestrator: Arc<Orchestrator>,
    store: Arc<dyn Store>,
    instrument: Arc<InstrumentedChecker>,
    poll_interval: std::time::Duration,
}

/// Everything `Service::build` wires up. The watchdog is spawned separately
/// so it keeps running even if the monitored loop wedges.
pub struct Built {
    pub service: Service,
    pub watchdog: Watchdog,
    pub responder: HeartbeatResponder,
    pub commands_tx: mpsc::Sender<Command>,
    pub commands_rx: mpsc::Receiver<Command>,
}

impl Service {
    pub async fn build(config: &Config) -> Result<Built> {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        for seed in &config.endpoints {
            let name = seed.name.clone().unwrap_or_else(|| host_of(&seed.url));
            let mut endpoint = Endpoint::new(name, seed.url.clone());
            if let Some(check_string) = &seed.check_string {
                endpoint = endpoint.with_check_string(check_string.clone());
            }
            store.upsert_endpoint(endpoint).await?;
        }

        let engine =
            ProtocolChecker::new(config.check_config()).context("failed to build check engine")?;
        let instrument = Arc::new(InstrumentedChecker::new(Arc::new(engine)));
        let checker: Arc<dyn Checker> = instrument.clone();
        let orchestrator = Arc::new(Orchestrator::new(
            checker,
            Arc::clone(&store),
            config.poll_interval(),
            config.timing.max_concurrent_checks,
        ));

        let (probe, responder) = heartbeat::channel(8);
        let (commands_tx, commands_rx) = mpsc::channel(8);
        let host = Arc::new(ServiceHost {
            orchestrator: Arc::clone(&orchestrator),
            store: Arc::clone(&store),
            commands: commands_tx.clone(),
            snapshot_path: PathBuf::from(&config.logging.snapshot_file),
        });
        let watchdog = Watchdog::new(config.watchdog_config(), probe, host);

        let service =
            Service { orchestrator, store, instrument, poll_interval: config.poll_interval() };
        Ok(Built { service, watchdog, responder, commands_tx, commands_rx })
    }

    /// Run the monitored loop until a shutdown command arrives.
    pub async fn run(
        self,
        mut heartbeat: HeartbeatResponder,
        mut commands: mpsc::Receiver<Command>,
    ) {
        let mut poll = interval(self.poll_interval);
        let mut events = self.orchestrator.subscribe();
        loop {
            tokio::select! {
                _ = poll.tick() => self.trigger_batch().await,
                alive = heartbeat.serve_one() => {
                    if !alive {
                        break;
                    }
                }
                event = events.recv() => self.handle_event(event),
                command = commands.recv() => match command {
                    Some(Command::Drain) => heartbeat.serve_pending(),
                    Some(Command::Shutdown) | None => break,
                },
            }
        }
        self.orchestrator.stop_batch();
        info!("monitored loop stopped");
    }

    /// Run a single batch to completion and report the latest failure.
    pub async fn run_once(self) -> Result<()> {
        let mut events = self.orchestrator.subscribe();
        let endpoints = self.store.list_endpoints().await?;
        if endpoints.is_empty() {
            info!("no endpoints configured");
            return Ok(());
        }
        if !self.orchestrator.start_batch(endpoints) {
            anyhow::bail!("a check batch is already running");
        }
        loop {
            let event = events.recv().await;
            let done = matches!(
                event,
                Ok(BatchEvent::BatchComplete { .. })
                    | Err(broadcast::error::RecvError::Closed)
            );
            self.handle_event(event);
            if done {
                break;
            }
        }
        if let Some(failure) = self.store.latest_failure().await? {
            warn!(
                endpoint = %failure.name,
                url = %failure.url,
                category = %failure.category,
                detail = %failure.detail,
                "most recent failure"
            );
        }
        Ok(())
    }

    async fn trigger_batch(&self) {
        match self.store.list_endpoints().await {
            Ok(endpoints) if endpoints.is_empty() => {
                debug!("no endpoints configured, skipping cycle");
            }
            Ok(endpoints) => {
                if self.orchestrator.is_running() {
                    warn!("previous batch still running, skipping this cycle");
                } else {
                    self.orchestrator.start_batch(endpoints);
                }
            }
            Err(error) => warn!(%error, "failed to list endpoints"),
        }
    }

    fn handle_event(&self, event: Result<BatchEvent, broadcast::error::RecvError>) {
        match event {
            Ok(BatchEvent::BatchStarted { total }) => info!(total, "check batch started"),
            Ok(BatchEvent::EndpointChecked { endpoint, outcome }) => {
                if outcome.is_ok() {
                    info!(endpoint = %endpoint.name, detail = %outcome.detail, "endpoint up");
                } else {
                    warn!(
                        endpoint = %endpoint.name,
                        category = %outcome.category,
                        detail = %outcome.detail,
                        "endpoint down"
                    );
                }
            }
            Ok(BatchEvent::EndpointFailed { endpoint, error }) => {
                warn!(endpoint = %endpoint.name, %error, "check failed");
            }
            Ok(BatchEvent::BatchComplete { total, succeeded, duration_secs }) => {
                info!(
                    total,
                    succeeded,
                    duration_secs,
                    lifetime_checks = self.instrument.checks_run(),
                    lifetime_failures = self.instrument.failures_seen(),
                    "check batch complete"
                );
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "event consumer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => {}
        }
    }
}

/// Production watchdog host: drains via the command channel, stops the
/// orchestrator and snapshots the store to JSON on the way down, then exits
/// the process.
pub struct ServiceHost {
    orchestrator: Arc<Orchestrator>,
    store: Arc<dyn Store>,
    commands: mpsc::Sender<Command>,
    snapshot_path: PathBuf,
}

#[async_trait]
impl WatchdogHost for ServiceHost {
    async fn drain_pending(&self) {
        let _ = self.commands.try_send(Command::Drain);
        tokio::task::yield_now().await;
    }

    async fn emergency_save(&self) -> Result<()> {
        self.orchestrator.stop_batch();
        let entries = self.store.snapshot().await?;
        let snapshot: Vec<StatusSnapshot> =
            entries.iter().map(|(endpoint, status)| StatusSnapshot {
                id: endpoint.id.to_string(),
                name: endpoint.name.clone(),
                url: endpoint.url.clone(),
                category: status.category.map(|category| category.to_string()),
                detail: status.detail.clone(),
                last_check: status.last_check.map(rfc3339),
                last_seen: status.last_seen.map(rfc3339),
                last_failure: status.last_failure.map(rfc3339),
            })
            .collect();
        let file = std::fs::File::create(&self.snapshot_path)?;
        serde_json::to_writer_pretty(file, &snapshot)?;
        error!(path = %self.snapshot_path.display(), "emergency snapshot written");
        Ok(())
    }

    fn terminate(&self, hard: bool) {
        if hard {
            std::process::abort();
        }
        std::process::exit(1);
    }
}

#[derive(Debug, Serialize)]
struct StatusSnapshot {
    id: String,
    name: String,
    url: String,
    category: Option<String>,
    detail: Option<String>,
    last_check: Option<String>,
    last_seen: Option<String>,
    last_failure: Option<String>,
}

fn rfc3339(time: SystemTime) -> String {
    chrono::DateTime::<chrono::Utc>::from(time).to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checking::CheckConfig;
    use crate::checking::types::{Category, CheckOutcome};

    fn test_orchestrator(store: Arc<dyn Store>) -> Arc<Orchestrator> {
        let engine = ProtocolChecker::new(CheckConfig::default()).unwrap();
        Arc::new(Orchestrator::new(
            Arc::new(engine),
            store,
            std::time::Duration::from_secs(300),
            4,
        ))
    }

    #[tokio::test]
    async fn emergency_save_writes_a_readable_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot_path = dir.path().join("snapshot.json");

        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let endpoint = Endpoint::new("example", "https://example.test");
        store.upsert_endpoint(endpoint.clone()).await.unwrap();
        store
            .record_outcome(
                endpoint.id,
                CheckOutcome::fail(Category::Ssl, "Certificate Verification Error"),
                SystemTime::now(),
            )
            .await
            .unwrap();

        let (commands_tx, _commands_rx) = mpsc::channel(1);
        let host = ServiceHost {
            orchestrator: test_orchestrator(Arc::clone(&store)),
            store,
            commands: commands_tx,
            snapshot_path: snapshot_path.clone(),
        };
        host.emergency_save().await.unwrap();

        let raw = std::fs::read_to_string(&snapshot_path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let entry = &parsed.as_array().unwrap()[0];
        assert_eq!(entry["name"], "example");
        assert_eq!(entry["category"], "SSL");
        assert_eq!(entry["detail"], "Certificate Verification Error");
        assert!(entry["last_failure"].is_string());
        assert!(entry["last_seen"].is_null());
    }

    #[tokio::test]
    async fn emergency_save_fails_on_an_unwritable_path() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let (commands_tx, _commands_rx) = mpsc::channel(1);
        let host = ServiceHost {
            orchestrator: test_orchestrator(Arc::clone(&store)),
            store,
            commands: commands_tx,
            snapshot_path: PathBuf::from("/nonexistent-dir/snapshot.json"),
        };
        assert!(host.emergency_save().await.is_err());
    }

    #[tokio::test]
    async fn built_service_seeds_endpoints_from_config() {
        let mut config = Config::default();
        config.endpoints.push(crate::config::EndpointSeed {
            name: None,
            url: "https://example.test/status".into(),
            check_string: Some("ok".into()),
        });

        let built = Service::build(&config).await.unwrap();
        let endpoints = built.service.store.list_endpoints().await.unwrap();
        assert_eq!(endpoints.len(), 1);
        // Name defaults to the hostname when the seed leaves it out.
        assert_eq!(endpoints[0].name, "example.test");
        assert_eq!(endpoints[0].check_string.as_deref(), Some("ok"));
    }
}
