use crate::config::RoutingConfig;
use crate::error::{GatewayError, Result};
use crate::registry::ProviderRegistry;
use crate::tracker::Tracker;
use crate::types::{ModelType, ProviderDescriptor, RoutingDecision};
use std::collections::HashMap;
use std::sync::Arc;

/// Maps `(score, factors, metadata)` to a `RoutingDecision`: candidate
/// filtering, weighted scoring, cost-control downgrade, and backup
/// selection all live here.
#[derive(Debug)]
pub struct Router {
    registry: Arc<ProviderRegistry>,
    tracker: Arc<Tracker>,
    config: RoutingConfig,
}

struct ScoredCandidate<'a> {
    descriptor: &'a ProviderDescriptor,
    score: f64,
}

impl Router {
    pub fn new(registry: Arc<ProviderRegistry>, tracker: Arc<Tracker>, config: RoutingConfig) -> Self {
        Self {
            registry,
            tracker,
            config,
        }
    }

    pub fn type_for_score(&self, score: f64) -> ModelType {
        if score < self.config.lo {
            ModelType::Local
        } else if score < self.config.hi {
            ModelType::Hybrid
        } else {
            ModelType::Remote
        }
    }

    async fn candidates_for_type(&self, model_type: ModelType) -> Vec<&ProviderDescriptor> {
        let mut candidates = Vec::new();
        for descriptor in self.registry.list_by_type(model_type) {
            if descriptor.status == crate::types::ProviderStatus::Offline {
                continue;
            }
            let state = self.tracker.snapshot(&descriptor.name).await;
            if state.inflight < descriptor.max_concurrent {
                candidates.push(descriptor);
            }
        }
        candidates
    }

    async fn score_candidate(&self, descriptor: &ProviderDescriptor) -> f64 {
        let state = self.tracker.snapshot(&descriptor.name).await;
        let load = 1.0 - (state.inflight as f64 / descriptor.max_concurrent as f64);
        let cost = descriptor.cost_efficiency;
        let perf = state.ema_success_rate * 1000.0 / (state.ema_latency_ms + 100.0);
        0.4 * load + 0.3 * cost + 0.3 * perf
    }

    /// Highest `score_p` wins; ties break lexicographically by provider name
    /// to guarantee determinism.
    async fn best_of<'a>(&self, candidates: Vec<&'a ProviderDescriptor>) -> Option<&'a ProviderDescriptor> {
        let mut scored = Vec::with_capacity(candidates.len());
        for descriptor in candidates {
            let score = self.score_candidate(descriptor).await;
            scored.push(ScoredCandidate { descriptor, score });
        }
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.descriptor.name.cmp(&b.descriptor.name))
        });
        scored.into_iter().next().map(|c| c.descriptor)
    }

    fn estimate_cost(descriptor: &ProviderDescriptor, score: f64, query_length: f64) -> f64 {
        let est = descriptor.base_cost * (1.0 + score) * (1.0 + query_length / 1000.0);
        est.min(descriptor.max_cost)
    }

    fn query_length(metadata: &HashMap<String, String>) -> f64 {
        metadata
            .get("queryLength")
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(0.0)
    }

    /// Entry point: type choice, candidate filter, scoring, and cost control.
    pub async fn route(
        &self,
        score: f64,
        _factors: &[String],
        metadata: &HashMap<String, String>,
    ) -> Result<RoutingDecision> {
        let model_type = self.type_for_score(score);
        let query_length = Self::query_length(metadata);

        let candidates = self.candidates_for_type(model_type).await;
        if candidates.is_empty() {
            return Err(GatewayError::ModelUnavailable(format!(
                "no {} providers available",
                model_type.as_str()
            )));
        }

        let best = self
            .best_of(candidates)
            .await
            .expect("non-empty candidate list yields a winner");
        let est_cost = Self::estimate_cost(best, score, query_length);

        let budget = metadata
            .get("budget")
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|b| *b >= 0.0);

        let Some(budget) = budget else {
            return Ok(RoutingDecision {
                provider: best.name.clone(),
                model_type,
                estimated_cost: est_cost,
                is_backup: false,
                was_cost_downgraded: false,
            });
        };

        if est_cost <= budget {
            return Ok(RoutingDecision {
                provider: best.name.clone(),
                model_type,
                estimated_cost: est_cost,
                is_backup: false,
                was_cost_downgraded: false,
            });
        }

        self.downgrade_for_budget(model_type, budget, query_length)
            .await
    }

    /// Walks the `remote -> hybrid -> local` chain, at `score = 0.5`, until
    /// a candidate fits the budget or the chain is exhausted.
    async fn downgrade_for_budget(
        &self,
        from: ModelType,
        budget: f64,
        query_length: f64,
    ) -> Result<RoutingDecision> {
        let mut current = from.downgrade();
        const DOWNGRADE_SCORE: f64 = 0.5;

        while let Some(model_type) = current {
            let candidates = self.candidates_for_type(model_type).await;
            if let Some(best) = self.best_of(candidates).await {
                let est_cost = Self::estimate_cost(best, DOWNGRADE_SCORE, query_length);
                if est_cost <= budget {
                    return Ok(RoutingDecision {
                        provider: best.name.clone(),
                        model_type,
                        estimated_cost: est_cost,
                        is_backup: false,
                        was_cost_downgraded: true,
                    });
                }
            }
            current = model_type.downgrade();
        }

        Err(GatewayError::CostLimitExceeded(format!(
            "no provider satisfies budget ${:.4} after exhausting the downgrade chain",
            budget
        )))
    }

    /// Best candidate of the same type excluding `primary`; if none,
    /// recurses on a lower type along `remote -> hybrid -> local`. Costed
    /// the same way as `route`, using the original request's score and
    /// query length rather than the primary's already-spent estimate.
    pub async fn backup_for(
        &self,
        primary: &str,
        model_type: ModelType,
        score: f64,
        metadata: &HashMap<String, String>,
    ) -> Option<RoutingDecision> {
        let query_length = Self::query_length(metadata);
        let mut current = Some(model_type);
        while let Some(t) = current {
            let candidates: Vec<&ProviderDescriptor> = self
                .candidates_for_type(t)
                .await
                .into_iter()
                .filter(|d| d.name != primary)
                .collect();

            if let Some(best) = self.best_of(candidates).await {
                return Some(RoutingDecision {
                    provider: best.name.clone(),
                    model_type: t,
                    estimated_cost: Self::estimate_cost(best, score, query_length),
                    is_backup: true,
                    was_cost_downgraded: false,
                });
            }
            current = t.downgrade();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProviderStatus;

    fn descriptor(name: &str, t: ModelType, max_concurrent: u32) -> ProviderDescriptor {
        ProviderDescriptor {
            name: name.to_string(),
            status: ProviderStatus::Online,
            supported_types: vec![t],
            capabilities: vec![],
            max_concurrent,
            base_cost: 0.01,
            max_cost: 10.0,
            cost_efficiency: 0.8,
        }
    }

    fn router_with(descriptors: Vec<ProviderDescriptor>) -> Router {
        let registry = Arc::new(ProviderRegistry::from_descriptors(descriptors));
        let tracker = Arc::new(Tracker::new());
        let config = RoutingConfig {
            lo: 0.3,
            hi: 0.7,
            default_cost_cap: 1.0,
        };
        Router::new(registry, tracker, config)
    }

    #[test]
    fn type_boundaries_are_half_open_lower_closed_upper() {
        let router = router_with(vec![]);
        assert_eq!(router.type_for_score(0.3), ModelType::Hybrid);
        assert_eq!(router.type_for_score(0.7), ModelType::Remote);
        assert_eq!(router.type_for_score(0.29), ModelType::Local);
    }

    #[tokio::test]
    async fn empty_candidate_set_is_unavailable() {
        let router = router_with(vec![]);
        let result = router.route(0.2, &[], &HashMap::new()).await;
        assert!(matches!(result, Err(GatewayError::ModelUnavailable(_))));
    }

    #[tokio::test]
    async fn routes_low_score_to_local() {
        let router = router_with(vec![descriptor("local-a", ModelType::Local, 4)]);
        let decision = router.route(0.2, &[], &HashMap::new()).await.unwrap();
        assert_eq!(decision.model_type, ModelType::Local);
        assert_eq!(decision.provider, "local-a");
    }

    #[tokio::test]
    async fn budget_too_small_exhausts_chain() {
        let router = router_with(vec![descriptor("remote-a", ModelType::Remote, 4)]);
        let mut metadata = HashMap::new();
        metadata.insert("budget".to_string(), "0.0000001".to_string());
        let result = router.route(0.9, &[], &metadata).await;
        assert!(matches!(result, Err(GatewayError::CostLimitExceeded(_))));
    }

    #[tokio::test]
    async fn budget_above_max_cost_never_downgrades() {
        let router = router_with(vec![descriptor("remote-a", ModelType::Remote, 4)]);
        let mut metadata = HashMap::new();
        metadata.insert("budget".to_string(), "1000".to_string());
        let decision = router.route(0.9, &[], &metadata).await.unwrap();
        assert!(!decision.was_cost_downgraded);
        assert_eq!(decision.model_type, ModelType::Remote);
    }

    #[tokio::test]
    async fn backup_excludes_primary() {
        let router = router_with(vec![
            descriptor("remote-a", ModelType::Remote, 4),
            descriptor("remote-b", ModelType::Remote, 4),
        ]);
        let backup = router
            .backup_for("remote-a", ModelType::Remote, 0.8, &HashMap::new())
            .await
            .unwrap();
        assert_eq!(backup.provider, "remote-b");
        assert!(backup.is_backup);
    }

    #[tokio::test]
    async fn backup_recurses_to_lower_type_when_none_at_same_type() {
        let router = router_with(vec![descriptor("local-a", ModelType::Local, 4)]);
        let backup = router
            .backup_for("remote-a", ModelType::Remote, 0.8, &HashMap::new())
            .await
            .unwrap();
        assert_eq!(backup.provider, "local-a");
        assert_eq!(backup.model_type, ModelType::Local);
    }

    #[tokio::test]
    async fn backup_cost_uses_the_same_formula_as_route() {
        let router = router_with(vec![
            descriptor("remote-a", ModelType::Remote, 4),
            descriptor("remote-b", ModelType::Remote, 4),
        ]);
        let mut metadata = HashMap::new();
        metadata.insert("queryLength".to_string(), "400".to_string());
        let backup = router
            .backup_for("remote-a", ModelType::Remote, 0.8, &metadata)
            .await
            .unwrap();
        let remote_b = router.registry.get("remote-b").unwrap();
        let expected = Router::estimate_cost(remote_b, 0.8, 400.0);
        assert_eq!(backup.estimated_cost, expected);
    }
}
