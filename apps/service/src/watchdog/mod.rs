//! Liveness watchdog for the host event loop.
//!
//! Runs independently of the orchestrator: a fast timer pings the monitored
//! loop, a slower timer checks how long ago the last echo arrived. A stalled
//! loop is escalated through bounded recovery attempts to an emergency save
//! and a forced shutdown.

pub mod heartbeat;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{Instant, interval};
use tracing::{error, info, warn};

use heartbeat::HeartbeatProbe;

/// Hooks the watchdog drives on the host process.
#[async_trait]
pub trait WatchdogHost: Send + Sync {
    /// Lightweight remediation: push the monitored loop to drain pending
    /// work.
    async fn drain_pending(&self);

    /// Best-effort snapshot of current status before a forced shutdown.
    async fn emergency_save(&self) -> anyhow::Result<()>;

    /// Forced process termination. `hard` bypasses normal cleanup; shutdown
    /// liveness outranks save completeness.
    fn terminate(&self, hard: bool);
}

#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    /// Time without an echo before the loop counts as frozen.
    pub threshold: Duration,
    /// How often to compare the echo clock against the threshold.
    pub check_interval: Duration,
    /// How often to ping the monitored loop.
    pub ping_interval: Duration,
    pub max_recovery_attempts: u32,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            threshold: Duration::from_secs(10),
            check_interval: Duration::from_secs(5),
            ping_interval: Duration::from_secs(2),
            max_recovery_attempts: 3,
        }
    }
}

/// Watchdog phase; `Terminated` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Healthy,
    Suspected,
    Recovering,
    Terminated,
}

/// Owns all watchdog state; nothing outside its own task mutates it.
pub struct Watchdog {
    config: WatchdogConfig,
    probe: HeartbeatProbe,
    host: Arc<dyn WatchdogHost>,
    last_heartbeat: Instant,
    recovery_attempts: u32,
    phase: Phase,
}

impl Watchdog {
    pub fn new(config: WatchdogConfig, probe: HeartbeatProbe, host: Arc<dyn WatchdogHost>) -> Self {
        Self {
            config,
            probe,
            host,
            last_heartbeat: Instant::now(),
            recovery_attempts: 0,
            phase: Phase::Healthy,
        }
    }

    /// Run until terminated or the monitored loop goes away entirely.
    pub async fn run(mut self) {
        let mut ping_timer = interval(self.config.ping_interval);
        let mut check_timer = interval(self.config.check_interval);
        info!("watchdog started");
        loop {
            tokio::select! {
                _ = ping_timer.tick() => self.probe.ping(),
                _ = check_timer.tick() => {
                    if self.check().await == Phase::Terminated {
                        return;
                    }
                }
                pong = self.probe.recv_pong() => match pong {
                    Some(echoed_at) => self.record_pong(echoed_at),
                    None => {
                        info!("heartbeat channel closed, watchdog exiting");
                        return;
                    }
                },
            }
        }
    }

    fn record_pong(&mut self, echoed_at: Instant) {
        self.last_heartbeat = echoed_at;
        self.recovery_attempts = 0;
        if self.phase != Phase::Healthy {
            info!("monitored loop responsive again");
        }
        self.phase = Phase::Healthy;
    }

    fn stalled_for(&self) -> Duration {
        self.last_heartbeat.elapsed()
    }

    async fn check(&mut self) -> Phase {
        if self.stalled_for() <= self.config.threshold {
            return self.phase;
        }
        warn!(
            stalled_secs = self.stalled_for().as_secs(),
            "monitored loop appears frozen"
        );
        self.phase = Phase::Suspected;
        self.recover().await;
        self.phase
    }

    async fn recover(&mut self) {
        self.phase = Phase::Recovering;
        self.recovery_attempts += 1;
        warn!(
            attempt = self.recovery_attempts,
            max = self.config.max_recovery_attempts,
            "attempting recovery"
        );

        self.host.drain_pending().await;

        // Remediation may have released queued echoes; re-check immediately.
        while let Some(echoed_at) = self.probe.try_pong() {
            self.record_pong(echoed_at);
        }
        if self.phase == Phase::Healthy && self.stalled_for() <= self.config.threshold {
            info!("monitored loop recovered after draining pending work");
            return;
        }

        if self.recovery_attempts >= self.config.max_recovery_attempts {
            self.phase = Phase::Terminated;
            self.shutdown().await;
        } else {
            // Bounded retry: wait for the next scheduled check rather than
            // spinning.
            self.phase = Phase::Suspected;
            warn!("recovery attempt unsuccessful, will retry at next check");
        }
    }

    async fn shutdown(&self) {
        error!("monitored loop failed to recover, forcing shutdown");
        match self.host.emergency_save().await {
            Ok(()) => {
                error!("emergency snapshot saved, terminating");
                self.host.terminate(false);
            }
            Err(save_error) => {
                error!(%save_error, "emergency save failed, terminating immediately");
                self.host.terminate(true);
            }
        }
    }
}
