use crate::config::MetricsConfig;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

const WINDOW_SECONDS: u64 = 60;
const LATENCY_SAMPLE_CAP: usize = 1_000;
const COST_HISTORY_MAX_AGE: Duration = Duration::from_secs(30 * 24 * 3600);

/// One terminal dispatch event: emitted exactly once per
/// dispatch, success or failure.
#[derive(Debug, Clone)]
pub struct RequestEvent {
    pub request_id: String,
    pub provider: String,
    pub success: bool,
    pub latency_ms: f64,
    pub cost: f64,
    pub tokens: u32,
    pub complexity: f64,
    pub failure_kind: Option<String>,
}

#[derive(Debug, Clone, Copy)]
struct CostSample {
    at: Instant,
    cost: f64,
}

#[derive(Debug, Default)]
struct ProviderWindow {
    count: u64,
    error_count: u64,
    latency_sum_ms: f64,
    latencies: VecDeque<f64>,
}

#[derive(Debug, Default)]
struct AggregatorState {
    request_timestamps: VecDeque<Instant>,
    providers: HashMap<String, ProviderWindow>,
    cost_history: VecDeque<CostSample>,
}

impl AggregatorState {
    fn record(&mut self, event: &RequestEvent) {
        let now = Instant::now();
        self.request_timestamps.push_back(now);
        self.prune_request_window(now);

        let window = self.providers.entry(event.provider.clone()).or_default();
        window.count += 1;
        if !event.success {
            window.error_count += 1;
        }
        window.latency_sum_ms += event.latency_ms;
        window.latencies.push_back(event.latency_ms);
        if window.latencies.len() > LATENCY_SAMPLE_CAP {
            window.latencies.pop_front();
        }

        if event.cost > 0.0 {
            self.cost_history.push_back(CostSample {
                at: now,
                cost: event.cost,
            });
        }
        self.prune_cost_history(now);
    }

    fn prune_request_window(&mut self, now: Instant) {
        let cutoff = Duration::from_secs(WINDOW_SECONDS);
        while let Some(front) = self.request_timestamps.front() {
            if now.duration_since(*front) > cutoff {
                self.request_timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Bounds cost history by dropping entries older than 30 days on
    /// insert, rather than letting it grow without bound.
    fn prune_cost_history(&mut self, now: Instant) {
        while let Some(front) = self.cost_history.front() {
            if now.duration_since(front.at) > COST_HISTORY_MAX_AGE {
                self.cost_history.pop_front();
            } else {
                break;
            }
        }
    }

    fn cost_since(&self, now: Instant, age: Duration) -> f64 {
        self.cost_history
            .iter()
            .filter(|sample| now.duration_since(sample.at) <= age)
            .map(|sample| sample.cost)
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    ErrorRate,
    Latency,
    Memory,
    Cpu,
    CostDaily,
    CostMonthly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Resolved,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub message: String,
    pub data: serde_json::Value,
    pub status: AlertStatus,
}

/// A process-level resource reading. Modeled as an injectable source so
/// alerting is testable without reading `/proc`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceSample {
    pub rss_fraction: f64,
    pub cpu_fraction: f64,
}

pub trait ResourceSampler: Send + Sync + std::fmt::Debug {
    fn sample(&self) -> ResourceSample;
}

#[derive(Debug, Default)]
pub struct ZeroResourceSampler;

impl ResourceSampler for ZeroResourceSampler {
    fn sample(&self) -> ResourceSample {
        ResourceSample::default()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub requests_last_60s: u64,
    pub provider_stats: HashMap<String, ProviderStatsSnapshot>,
    pub alerts: Vec<Alert>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatsSnapshot {
    pub count: u64,
    pub error_count: u64,
    pub avg_latency_ms: f64,
}

/// Consumes dispatcher events over an mpsc channel so the dispatcher is
/// never blocked on metrics processing; thresholds and alert state belong
/// exclusively here.
#[derive(Debug)]
pub struct MetricsAggregator {
    sender: mpsc::Sender<RequestEvent>,
    state: Arc<RwLock<AggregatorState>>,
    alerts: Arc<RwLock<HashMap<(AlertKind, bool), Alert>>>,
    config: RwLock<MetricsConfig>,
    resource_sampler: Arc<dyn ResourceSampler>,
}

/// Partial update to alert thresholds; absent fields leave the running
/// value untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThresholdsPatch {
    pub error_rate_threshold: Option<f64>,
    pub latency_threshold_ms: Option<f64>,
    pub memory_threshold: Option<f64>,
    pub cpu_threshold: Option<f64>,
    pub cost_daily_threshold: Option<f64>,
    pub cost_monthly_threshold: Option<f64>,
}

impl MetricsAggregator {
    pub fn spawn(config: MetricsConfig, resource_sampler: Arc<dyn ResourceSampler>) -> Arc<Self> {
        let (sender, mut receiver) = mpsc::channel::<RequestEvent>(1024);
        let state = Arc::new(RwLock::new(AggregatorState::default()));
        let aggregator = Arc::new(Self {
            sender,
            state: state.clone(),
            alerts: Arc::new(RwLock::new(HashMap::new())),
            config: RwLock::new(config),
            resource_sampler,
        });

        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                let mut state = state.write().await;
                state.record(&event);
            }
        });

        aggregator
    }

    pub async fn record(&self, event: RequestEvent) {
        if self.sender.send(event).await.is_err() {
            warn!("metrics aggregator channel closed, dropping event");
        }
    }

    /// Merges a partial threshold update into the running config. Guarded
    /// by the same lock `evaluate_alerts` reads, so a threshold change is
    /// visible to the very next evaluation pass or not at all.
    pub async fn update_thresholds(&self, patch: ThresholdsPatch) {
        let mut config = self.config.write().await;
        if let Some(v) = patch.error_rate_threshold {
            config.error_rate_threshold = v;
        }
        if let Some(v) = patch.latency_threshold_ms {
            config.latency_threshold_ms = v;
        }
        if let Some(v) = patch.memory_threshold {
            config.memory_threshold = v;
        }
        if let Some(v) = patch.cpu_threshold {
            config.cpu_threshold = v;
        }
        if let Some(v) = patch.cost_daily_threshold {
            config.cost_daily_threshold = v;
        }
        if let Some(v) = patch.cost_monthly_threshold {
            config.cost_monthly_threshold = v;
        }
        debug!("alert thresholds updated");
    }

    /// Evaluates alert rules against the current window and merges any
    /// breaches into the running alert set, deduplicated by `(kind, active)`.
    pub async fn evaluate_alerts(&self) {
        let now = Instant::now();
        let config = self.config.read().await.clone();
        let (total, errors, provider_stats, cost_daily, cost_monthly) = {
            let state = self.state.read().await;
            let total: u64 = state.providers.values().map(|w| w.count).sum();
            let errors: u64 = state.providers.values().map(|w| w.error_count).sum();
            let provider_stats: HashMap<String, ProviderStatsSnapshot> = state
                .providers
                .iter()
                .map(|(name, window)| {
                    let avg = if window.count == 0 {
                        0.0
                    } else {
                        window.latency_sum_ms / window.count as f64
                    };
                    (
                        name.clone(),
                        ProviderStatsSnapshot {
                            count: window.count,
                            error_count: window.error_count,
                            avg_latency_ms: avg,
                        },
                    )
                })
                .collect();
            let cost_daily = state.cost_since(now, Duration::from_secs(24 * 3600));
            let cost_monthly = state.cost_since(now, COST_HISTORY_MAX_AGE);
            (total, errors, provider_stats, cost_daily, cost_monthly)
        };

        let mut fresh = Vec::new();

        if total > 0 {
            let error_rate = errors as f64 / total as f64;
            if error_rate > config.error_rate_threshold {
                fresh.push(Alert {
                    id: alert_id(AlertKind::ErrorRate),
                    kind: AlertKind::ErrorRate,
                    severity: AlertSeverity::High,
                    message: format!("error rate {:.2}% over threshold", error_rate * 100.0),
                    data: serde_json::json!({ "error_rate": error_rate }),
                    status: AlertStatus::Active,
                });
            }

            let avg_latency: f64 = provider_stats
                .values()
                .map(|s| s.avg_latency_ms * s.count as f64)
                .sum::<f64>()
                / total as f64;
            if avg_latency > config.latency_threshold_ms {
                fresh.push(Alert {
                    id: alert_id(AlertKind::Latency),
                    kind: AlertKind::Latency,
                    severity: AlertSeverity::Medium,
                    message: format!("average latency {:.0}ms over threshold", avg_latency),
                    data: serde_json::json!({ "avg_latency_ms": avg_latency }),
                    status: AlertStatus::Active,
                });
            }
        }

        let resource = self.resource_sampler.sample();
        if resource.rss_fraction > config.memory_threshold {
            fresh.push(Alert {
                id: alert_id(AlertKind::Memory),
                kind: AlertKind::Memory,
                severity: AlertSeverity::High,
                message: "process memory over threshold".to_string(),
                data: serde_json::json!({ "rss_fraction": resource.rss_fraction }),
                status: AlertStatus::Active,
            });
        }
        if resource.cpu_fraction > config.cpu_threshold {
            fresh.push(Alert {
                id: alert_id(AlertKind::Cpu),
                kind: AlertKind::Cpu,
                severity: AlertSeverity::Medium,
                message: "process cpu over threshold".to_string(),
                data: serde_json::json!({ "cpu_fraction": resource.cpu_fraction }),
                status: AlertStatus::Active,
            });
        }

        if cost_daily > config.cost_daily_threshold {
            fresh.push(Alert {
                id: alert_id(AlertKind::CostDaily),
                kind: AlertKind::CostDaily,
                severity: AlertSeverity::High,
                message: format!("daily cost ${:.2} over threshold", cost_daily),
                data: serde_json::json!({ "cost_daily": cost_daily }),
                status: AlertStatus::Active,
            });
        }
        if cost_monthly > config.cost_monthly_threshold {
            fresh.push(Alert {
                id: alert_id(AlertKind::CostMonthly),
                kind: AlertKind::CostMonthly,
                severity: AlertSeverity::Critical,
                message: format!("monthly cost ${:.2} over threshold", cost_monthly),
                data: serde_json::json!({ "cost_monthly": cost_monthly }),
                status: AlertStatus::Active,
            });
        }

        let mut alerts = self.alerts.write().await;
        for alert in fresh {
            debug!(kind = ?alert.kind, "alert raised");
            alerts.insert((alert.kind, true), alert);
        }
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        self.evaluate_alerts().await;

        let state = self.state.read().await;
        let provider_stats = state
            .providers
            .iter()
            .map(|(name, window)| {
                let avg = if window.count == 0 {
                    0.0
                } else {
                    window.latency_sum_ms / window.count as f64
                };
                (
                    name.clone(),
                    ProviderStatsSnapshot {
                        count: window.count,
                        error_count: window.error_count,
                        avg_latency_ms: avg,
                    },
                )
            })
            .collect();

        let alerts = self.alerts.read().await.values().cloned().collect();

        MetricsSnapshot {
            requests_last_60s: state.request_timestamps.len() as u64,
            provider_stats,
            alerts,
        }
    }
}

fn alert_id(kind: AlertKind) -> String {
    format!("{:?}", kind).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aggregator() -> Arc<MetricsAggregator> {
        MetricsAggregator::spawn(MetricsConfig::default(), Arc::new(ZeroResourceSampler))
    }

    fn event(provider: &str, success: bool, latency_ms: f64, cost: f64) -> RequestEvent {
        RequestEvent {
            request_id: "r".to_string(),
            provider: provider.to_string(),
            success,
            latency_ms,
            cost,
            tokens: 10,
            complexity: 0.5,
            failure_kind: if success { None } else { Some("MODEL_UNAVAILABLE".to_string()) },
        }
    }

    #[tokio::test]
    async fn raises_error_rate_alert_above_threshold() {
        let aggregator = aggregator();
        for i in 0..10 {
            aggregator.record(event("p", i >= 7, 50.0, 0.0)).await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        let snapshot = aggregator.snapshot().await;
        assert!(snapshot
            .alerts
            .iter()
            .any(|a| a.kind == AlertKind::ErrorRate && a.severity == AlertSeverity::High));
    }

    #[tokio::test]
    async fn raises_latency_alert_above_threshold() {
        let aggregator = aggregator();
        for _ in 0..5 {
            aggregator.record(event("p", true, 3000.0, 0.0)).await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        let snapshot = aggregator.snapshot().await;
        assert!(snapshot.alerts.iter().any(|a| a.kind == AlertKind::Latency));
    }

    #[tokio::test]
    async fn raises_cost_daily_alert_above_threshold() {
        let mut config = MetricsConfig::default();
        config.cost_daily_threshold = 10.0;
        let aggregator = MetricsAggregator::spawn(config, Arc::new(ZeroResourceSampler));
        for _ in 0..10 {
            aggregator.record(event("p", true, 50.0, 2.0)).await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        let snapshot = aggregator.snapshot().await;
        assert!(snapshot
            .alerts
            .iter()
            .any(|a| a.kind == AlertKind::CostDaily && a.severity == AlertSeverity::High));
    }

    #[tokio::test]
    async fn update_thresholds_merges_only_patched_fields() {
        let aggregator = aggregator();
        let default_latency = MetricsConfig::default().latency_threshold_ms;

        aggregator
            .update_thresholds(ThresholdsPatch {
                error_rate_threshold: Some(0.01),
                ..Default::default()
            })
            .await;

        let config = aggregator.config.read().await;
        assert_eq!(config.error_rate_threshold, 0.01);
        assert_eq!(config.latency_threshold_ms, default_latency);
    }

    #[tokio::test]
    async fn update_thresholds_takes_effect_on_next_evaluation() {
        let aggregator = aggregator();
        for i in 0..10 {
            aggregator.record(event("p", i >= 1, 50.0, 0.0)).await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        // 90% error rate is under a relaxed 0.95 threshold.
        aggregator
            .update_thresholds(ThresholdsPatch {
                error_rate_threshold: Some(0.95),
                ..Default::default()
            })
            .await;

        let snapshot = aggregator.snapshot().await;
        assert!(!snapshot.alerts.iter().any(|a| a.kind == AlertKind::ErrorRate));
    }
}
