use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use tracing::debug;

use super::engine::Checker;
use super::types::CheckOutcome;
use crate::storage::models::Endpoint;

/// Counting and timing wrapper around a [`Checker`], composed around the
/// engine when the orchestrator is built.
pub struct InstrumentedChecker {
    inner: Arc<dyn Checker>,
    checks: AtomicU64,
    failures: AtomicU64,
}

impl InstrumentedChecker {
    pub fn new(inner: Arc<dyn Checker>) -> Self {
        Self { inner, checks: AtomicU64::new(0), failures: AtomicU64::new(0) }
    }

    /// Total checks completed through this wrapper.
    pub fn checks_run(&self) -> u64 {
        self.checks.load(Ordering::Relaxed)
    }

    /// Checks that produced a non-OK category.
    pub fn failures_seen(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Checker for InstrumentedChecker {
    async fn check(&self, endpoint: &Endpoint) -> CheckOutcome {
        let started = Instant::now();
        let outcome = self.inner.check(endpoint).await;
        self.checks.fetch_add(1, Ordering::Relaxed);
        if outcome.category.is_failure() {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
        debug!(
            endpoint = %endpoint.name,
            category = %outcome.category,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "check finished"
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checking::types::Category;

    struct FixedChecker(Category);

    #[async_trait]
    impl Checker for FixedChecker {
        async fn check(&self, _endpoint: &Endpoint) -> CheckOutcome {
            CheckOutcome::fail(self.0, "x")
        }
    }

    #[tokio::test]
    async fn counts_checks_and_failures() {
        let wrapper = InstrumentedChecker::new(Arc::new(FixedChecker(Category::Http)));
        let endpoint = Endpoint::new("counted", "http://counted.test");

        wrapper.check(&endpoint).await;
        wrapper.check(&endpoint).await;

        assert_eq!(wrapper.checks_run(), 2);
        assert_eq!(wrapper.failures_seen(), 2);
    }
}
