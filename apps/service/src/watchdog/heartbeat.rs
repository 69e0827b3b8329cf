//! Ping/pong liveness probe between the watchdog and the monitored loop.
//!
//! The watchdog sends pings over a channel into the monitored context; a
//! responsive loop echoes the receipt instant back. A blocked loop never
//! echoes, so the watchdog's view of the last heartbeat stops advancing.

use tokio::sync::mpsc;
use tokio::time::Instant;

/// A liveness probe message. Carries nothing; the echo is the signal.
#[derive(Debug)]
pub struct Ping;

/// Watchdog-side handle: emits pings, receives echo timestamps.
pub struct HeartbeatProbe {
    ping_tx: mpsc::Sender<Ping>,
    pong_rx: mpsc::Receiver<Instant>,
}

/// Monitored-loop side: receives pings and echoes the receipt instant.
pub struct HeartbeatResponder {
    ping_rx: mpsc::Receiver<Ping>,
    pong_tx: mpsc::Sender<Instant>,
}

pub fn channel(capacity: usize) -> (HeartbeatProbe, HeartbeatResponder) {
    let (ping_tx, ping_rx) = mpsc::channel(capacity);
    let (pong_tx, pong_rx) = mpsc::channel(capacity);
    (HeartbeatProbe { ping_tx, pong_rx }, HeartbeatResponder { ping_rx, pong_tx })
}

impl HeartbeatProbe {
    /// Fire-and-forget. A full ping queue means the monitored loop is
    /// already behind; the stalled echo clock will surface that.
    pub fn ping(&self) {
        let _ = self.ping_tx.try_send(Ping);
    }

    /// Await the next echo. `None` once the responder is gone.
    pub async fn recv_pong(&mut self) -> Option<Instant> {
        self.pong_rx.recv().await
    }

    /// Collect an already-queued echo without waiting.
    pub fn try_pong(&mut self) -> Option<Instant> {
        self.pong_rx.try_recv().ok()
    }
}

impl HeartbeatResponder {
    /// Await the next ping and echo it. `false` once the probe is gone.
    pub async fn serve_one(&mut self) -> bool {
        match self.ping_rx.recv().await {
            Some(Ping) => {
                let _ = self.pong_tx.try_send(Instant::now());
                true
            }
            None => false,
        }
    }

    /// Echo every queued ping without waiting.
    pub fn serve_pending(&mut self) {
        while let Ok(Ping) = self.ping_rx.try_recv() {
            let _ = self.pong_tx.try_send(Instant::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_carries_the_receipt_instant() {
        let (mut probe, mut responder) = channel(4);
        let before = Instant::now();

        probe.ping();
        assert!(responder.serve_one().await);

        let echoed = probe.recv_pong().await.unwrap();
        assert!(echoed >= before);
    }

    #[tokio::test]
    async fn pending_pings_are_all_echoed() {
        let (mut probe, mut responder) = channel(4);
        probe.ping();
        probe.ping();
        probe.ping();

        responder.serve_pending();

        assert!(probe.try_pong().is_some());
        assert!(probe.try_pong().is_some());
        assert!(probe.try_pong().is_some());
        assert!(probe.try_pong().is_none());
    }
}
