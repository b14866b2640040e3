use crate::error::{GatewayError, Result};
use crate::types::{CallSample, ProviderRuntimeState};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Per-provider inflight counters and EMA performance stats. State is born
/// lazily on first reference to a provider name and lives for the rest of
/// the process.
///
/// A per-provider lock (rather than one global lock) keeps cross-provider
/// contention out of the critical section, while `begin`'s concurrency
/// check-and-increment still happens atomically under that lock so the
/// `inflight <= max_concurrent` invariant holds under contention.
#[derive(Debug, Default)]
pub struct Tracker {
    states: RwLock<HashMap<String, Arc<tokio::sync::Mutex<ProviderRuntimeState>>>>,
}

impl Tracker {
    pub fn new() -> Self {
        Self::default()
    }

    async fn entry(&self, name: &str) -> Arc<tokio::sync::Mutex<ProviderRuntimeState>> {
        if let Some(state) = self.states.read().await.get(name) {
            return state.clone();
        }
        let mut states = self.states.write().await;
        states
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(ProviderRuntimeState::default())))
            .clone()
    }

    /// Verify `inflight < max_concurrent`, then increment. Refuses admission
    /// rather than letting the invariant be violated.
    pub async fn begin(&self, name: &str, max_concurrent: u32) -> Result<()> {
        let entry = self.entry(name).await;
        let mut state = entry.lock().await;
        if state.inflight >= max_concurrent {
            return Err(GatewayError::ModelUnavailable(format!(
                "{} is over its concurrency limit ({})",
                name, max_concurrent
            )));
        }
        state.inflight += 1;
        debug!(provider = name, inflight = state.inflight, "admitted");
        Ok(())
    }

    /// Decrement inflight (floored at 0), and if a sample is provided,
    /// fold it into the three EMAs using the cumulative form
    /// `new = (old*n + x)/(n+1)`.
    pub async fn end(&self, name: &str, sample: Option<CallSample>) {
        let entry = self.entry(name).await;
        let mut state = entry.lock().await;
        state.inflight = state.inflight.saturating_sub(1);

        if let Some(sample) = sample {
            let n = state.total_calls as f64;
            state.ema_latency_ms = (state.ema_latency_ms * n + sample.latency_ms) / (n + 1.0);
            let success_value = if sample.success { 1.0 } else { 0.0 };
            state.ema_success_rate = (state.ema_success_rate * n + success_value) / (n + 1.0);
            state.ema_cost_efficiency =
                (state.ema_cost_efficiency * n + sample.cost_efficiency) / (n + 1.0);
            state.total_calls += 1;
        }
    }

    pub async fn snapshot(&self, name: &str) -> ProviderRuntimeState {
        let entry = self.entry(name).await;
        entry.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn begin_refuses_over_limit() {
        let tracker = Tracker::new();
        tracker.begin("p", 1).await.unwrap();
        let result = tracker.begin("p", 1).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn end_decrements_and_floors_at_zero() {
        let tracker = Tracker::new();
        tracker.end("p", None).await;
        let state = tracker.snapshot("p").await;
        assert_eq!(state.inflight, 0);
    }

    #[tokio::test]
    async fn exactly_at_limit_then_next_fails() {
        let tracker = Tracker::new();
        // inflight = max_concurrent - 1 after these two begins succeed.
        tracker.begin("p", 3).await.unwrap();
        tracker.begin("p", 3).await.unwrap();
        assert!(tracker.begin("p", 3).await.is_ok());
        assert!(tracker.begin("p", 3).await.is_err());
    }

    #[tokio::test]
    async fn ema_uses_cumulative_mean() {
        let tracker = Tracker::new();
        tracker.begin("p", 2).await.unwrap();
        tracker
            .end(
                "p",
                Some(CallSample {
                    latency_ms: 100.0,
                    success: true,
                    cost_efficiency: 1.0,
                }),
            )
            .await;
        let state = tracker.snapshot("p").await;
        // default ema_latency_ms is 500; after one sample of 100 with n=0:
        // (500*0 + 100)/1 = 100.
        assert_eq!(state.ema_latency_ms, 100.0);
        assert_eq!(state.total_calls, 1);
    }
}
