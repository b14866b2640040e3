use crate::adapters::Adapter;
use crate::error::{GatewayError, Result};
use crate::evaluator;
use crate::metrics::{MetricsAggregator, RequestEvent};
use crate::registry::ProviderRegistry;
use crate::router::Router;
use crate::tracker::Tracker;
use crate::types::{
    AdapterOptions, AdapterQuery, CallSample, ProcessQueryRequest, ProcessQueryResponse,
    QueryRequest,
};
use crate::validator;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info_span, instrument, Instrument};

/// Per-request orchestration: validate -> evaluate -> route -> admit ->
/// call -> fallback -> finalize -> reply. Holds `Arc` handles
/// into the tracker, registry, and router rather than owning them, which is
/// how the dispatcher/router/tracker/metrics cycle is broken.
#[derive(Debug)]
pub struct Dispatcher {
    registry: Arc<ProviderRegistry>,
    tracker: Arc<Tracker>,
    router: Arc<Router>,
    metrics: Arc<MetricsAggregator>,
    adapters: HashMap<String, Arc<dyn Adapter>>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        tracker: Arc<Tracker>,
        router: Arc<Router>,
        metrics: Arc<MetricsAggregator>,
        adapters: HashMap<String, Arc<dyn Adapter>>,
    ) -> Self {
        Self {
            registry,
            tracker,
            router,
            metrics,
            adapters,
        }
    }

    #[instrument(skip(self, request), fields(request_id))]
    pub async fn process_query(&self, request: ProcessQueryRequest) -> Result<ProcessQueryResponse> {
        let start = Instant::now();

        // 1. Validate
        let normalized = validator::validate_and_normalize(QueryRequest {
            request_id: request.request_id,
            query: request.query,
            metadata: request.metadata,
        })?;
        tracing::Span::current().record("request_id", &normalized.request_id);

        // 2. Evaluate
        let complexity = evaluator::evaluate(&normalized.query_text);

        // 3. Route (includes cost-control strategy)
        let decision = match self
            .router
            .route(complexity.score, &complexity.factors, &normalized.metadata)
            .instrument(info_span!("route"))
            .await
        {
            Ok(decision) => decision,
            Err(error) => {
                self.emit_failure(&normalized.request_id, None, complexity.score, &error, start)
                    .await;
                return Err(error);
            }
        };

        // 4-6. Admit, call, and fall back on failure.
        let outcome = self
            .admit_and_call(
                &normalized.query_text,
                &normalized.metadata,
                &decision,
                complexity.score,
            )
            .await;

        match outcome {
            Ok((provider_used, call_outcome)) => {
                self.metrics
                    .record(RequestEvent {
                        request_id: normalized.request_id.clone(),
                        provider: provider_used.clone(),
                        success: true,
                        latency_ms: call_outcome.latency_ms,
                        cost: call_outcome.actual_cost,
                        tokens: call_outcome.token_usage.total,
                        complexity: complexity.score,
                        failure_kind: None,
                    })
                    .await;

                Ok(ProcessQueryResponse {
                    request_id: normalized.request_id,
                    response: call_outcome.text,
                    complexity_score: complexity.score,
                    model_used: provider_used,
                    cost: call_outcome.actual_cost,
                    token_usage: Some(call_outcome.token_usage),
                    processing_time: Some(start.elapsed().as_millis() as u64),
                })
            }
            Err(error) => {
                self.emit_failure(
                    &normalized.request_id,
                    Some(decision.provider.clone()),
                    complexity.score,
                    &error,
                    start,
                )
                .await;
                Err(error)
            }
        }
    }

    /// Admits the primary, calls it, and on failure tries exactly one
    /// backup. `Tracker.end` is called exactly once per successful `begin`
    /// on every exit path.
    async fn admit_and_call(
        &self,
        query_text: &str,
        metadata: &HashMap<String, String>,
        decision: &crate::types::RoutingDecision,
        score: f64,
    ) -> Result<(String, crate::types::CallOutcome)> {
        let descriptor = self
            .registry
            .get(&decision.provider)
            .ok_or_else(|| GatewayError::ModelUnavailable(decision.provider.clone()))?;

        // Admission failure (over the concurrency limit) is handled the
        // same way as a call failure: try one backup before surfacing.
        if self
            .tracker
            .begin(&descriptor.name, descriptor.max_concurrent)
            .await
            .is_err()
        {
            return self
                .try_backup(query_text, metadata, &decision.provider, decision.model_type, score)
                .await;
        }

        let call_start = Instant::now();
        let primary_result = self
            .call_adapter(&decision.provider, query_text, metadata, score, decision.estimated_cost)
            .await;

        match primary_result {
            Ok(outcome) => {
                self.finalize(&decision.provider, &outcome).await;
                Ok((decision.provider.clone(), outcome))
            }
            Err(_primary_error) => {
                self.end_as_failure(&descriptor.name, call_start).await;
                self.try_backup(query_text, metadata, &decision.provider, decision.model_type, score)
                    .await
            }
        }
    }

    /// Finds a backup via the router, admits it, and calls it. Succeeds at
    /// most once on fallback: if the backup also fails, the error surfaces.
    async fn try_backup(
        &self,
        query_text: &str,
        metadata: &HashMap<String, String>,
        primary: &str,
        model_type: crate::types::ModelType,
        score: f64,
    ) -> Result<(String, crate::types::CallOutcome)> {
        let Some(backup) = self.router.backup_for(primary, model_type, score, metadata).await else {
            return Err(GatewayError::ModelUnavailable(
                "no backup provider available".to_string(),
            ));
        };

        let backup_descriptor = self
            .registry
            .get(&backup.provider)
            .ok_or_else(|| GatewayError::ModelUnavailable(backup.provider.clone()))?;

        self.tracker
            .begin(&backup_descriptor.name, backup_descriptor.max_concurrent)
            .await?;

        let call_start = Instant::now();
        match self
            .call_adapter(&backup.provider, query_text, metadata, score, backup.estimated_cost)
            .await
        {
            Ok(outcome) => {
                self.finalize(&backup.provider, &outcome).await;
                Ok((backup.provider.clone(), outcome))
            }
            Err(error) => {
                self.end_as_failure(&backup_descriptor.name, call_start).await;
                Err(error)
            }
        }
    }

    /// Folds a failed call into the tracker's EMAs. Only called once a call
    /// has actually reached the adapter — an admission refusal never gets
    /// here, since it never dials out.
    async fn end_as_failure(&self, provider: &str, call_start: Instant) {
        self.tracker
            .end(
                provider,
                Some(CallSample {
                    latency_ms: call_start.elapsed().as_millis() as f64,
                    success: false,
                    cost_efficiency: 0.0,
                }),
            )
            .await;
    }

    async fn call_adapter(
        &self,
        provider: &str,
        query_text: &str,
        metadata: &HashMap<String, String>,
        score: f64,
        estimated_cost: f64,
    ) -> Result<crate::types::CallOutcome> {
        let adapter = self
            .adapters
            .get(provider)
            .ok_or_else(|| GatewayError::ModelUnavailable(format!("no adapter registered for {}", provider)))?;

        let options = AdapterOptions {
            max_tokens: metadata.get("maxTokens").and_then(|v| v.parse().ok()),
            temperature: metadata.get("temperature").and_then(|v| v.parse().ok()),
            top_p: metadata.get("topP").and_then(|v| v.parse().ok()),
            system_message: metadata.get("systemMessage").cloned(),
            stop_sequences: vec![],
            budget: metadata.get("budget").and_then(|v| v.parse().ok()),
            timeout_ms: metadata.get("timeout").and_then(|v| v.parse().ok()),
        };

        let query = AdapterQuery {
            text: query_text.to_string(),
            context: vec![],
            score,
        };

        let mut outcome = adapter.call(provider, &query, &options).await?;
        if outcome.actual_cost == 0.0 {
            outcome.actual_cost = estimated_cost;
        }
        Ok(outcome)
    }

    async fn finalize(&self, provider: &str, outcome: &crate::types::CallOutcome) {
        self.tracker
            .end(
                provider,
                Some(CallSample {
                    latency_ms: outcome.latency_ms,
                    success: outcome.success,
                    cost_efficiency: 1.0,
                }),
            )
            .await;
    }

    async fn emit_failure(
        &self,
        request_id: &str,
        provider: Option<String>,
        complexity: f64,
        error: &GatewayError,
        start: Instant,
    ) {
        self.metrics
            .record(RequestEvent {
                request_id: request_id.to_string(),
                provider: provider.unwrap_or_else(|| "none".to_string()),
                success: false,
                latency_ms: start.elapsed().as_millis() as f64,
                cost: 0.0,
                tokens: 0,
                complexity,
                failure_kind: Some(error.failure_kind().to_string()),
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::{MockAdapter, Scripted};
    use crate::config::RoutingConfig;
    use crate::metrics::{MetricsAggregator, ZeroResourceSampler};
    use crate::types::{ModelType, ProviderDescriptor, ProviderStatus};

    fn descriptor(name: &str, types: Vec<ModelType>) -> ProviderDescriptor {
        ProviderDescriptor {
            name: name.to_string(),
            status: ProviderStatus::Online,
            supported_types: types,
            capabilities: vec!["chat".to_string()],
            max_concurrent: 4,
            base_cost: 0.01,
            max_cost: 10.0,
            cost_efficiency: 0.8,
        }
    }

    fn build(
        descriptors: Vec<ProviderDescriptor>,
        adapters: Vec<(&str, Arc<dyn Adapter>)>,
    ) -> Dispatcher {
        let registry = Arc::new(ProviderRegistry::from_descriptors(descriptors));
        let tracker = Arc::new(Tracker::new());
        let router = Arc::new(Router::new(registry.clone(), tracker.clone(), RoutingConfig::default()));
        let metrics = MetricsAggregator::spawn(Default::default(), Arc::new(ZeroResourceSampler));
        let adapters = adapters
            .into_iter()
            .map(|(name, adapter)| (name.to_string(), adapter))
            .collect();
        Dispatcher::new(registry, tracker, router, metrics, adapters)
    }

    fn request(query: &str) -> ProcessQueryRequest {
        ProcessQueryRequest {
            request_id: None,
            query: query.to_string(),
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn simple_query_routes_to_local() {
        let dispatcher = build(
            vec![descriptor("local-llama", vec![ModelType::Local])],
            vec![("local-llama", Arc::new(MockAdapter::new("local-llama")) as Arc<dyn Adapter>)],
        );

        let response = dispatcher.process_query(request("hi")).await.unwrap();
        assert_eq!(response.model_used, "local-llama");
        assert!(response.response.contains("hi"));
    }

    #[tokio::test]
    async fn failure_falls_back_to_backup_exactly_once() {
        // Two providers of the same type: `backup_for` prefers a sibling at
        // the same type over walking down the chain.
        let primary = Arc::new(MockAdapter::new("local-llama").with_script(vec![Scripted::Err("down".to_string())]));
        let backup = Arc::new(MockAdapter::new("local-phi").with_script(vec![Scripted::Ok("backup text".to_string())]));

        let dispatcher = build(
            vec![
                descriptor("local-llama", vec![ModelType::Local]),
                descriptor("local-phi", vec![ModelType::Local]),
            ],
            vec![
                ("local-llama", primary.clone() as Arc<dyn Adapter>),
                ("local-phi", backup.clone() as Arc<dyn Adapter>),
            ],
        );

        let response = dispatcher.process_query(request("hi")).await.unwrap();
        assert_eq!(response.model_used, "local-phi");
        assert_eq!(response.response, "backup text");
        assert_eq!(primary.calls(), 1);
        assert_eq!(backup.calls(), 1);
    }

    #[tokio::test]
    async fn all_providers_failing_surfaces_model_unavailable() {
        let only = Arc::new(MockAdapter::new("local-llama").with_script(vec![Scripted::Err("down".to_string())]));

        let dispatcher = build(
            vec![descriptor("local-llama", vec![ModelType::Local])],
            vec![("local-llama", only as Arc<dyn Adapter>)],
        );

        let error = dispatcher.process_query(request("hi")).await.unwrap_err();
        assert_eq!(error.code(), crate::error::ErrorCode::ModelUnavailable);
    }

    #[tokio::test]
    async fn budget_too_small_exhausts_downgrade_chain() {
        let dispatcher = build(
            vec![
                descriptor("remote-gpt4", vec![ModelType::Remote]),
                descriptor("hybrid-mixtral", vec![ModelType::Hybrid]),
                descriptor("local-llama", vec![ModelType::Local]),
            ],
            vec![
                ("remote-gpt4", Arc::new(MockAdapter::new("remote-gpt4")) as Arc<dyn Adapter>),
                ("hybrid-mixtral", Arc::new(MockAdapter::new("hybrid-mixtral"))),
                ("local-llama", Arc::new(MockAdapter::new("local-llama"))),
            ],
        );

        let mut metadata = HashMap::new();
        metadata.insert("budget".to_string(), "0.0000001".to_string());
        // Long, lexically dense text to push the complexity score into the
        // remote band so the downgrade chain has somewhere to walk from.
        let req = ProcessQueryRequest {
            request_id: None,
            query: "architecture ".repeat(150).trim().to_string(),
            metadata,
        };

        let error = dispatcher.process_query(req).await.unwrap_err();
        assert_eq!(error.code(), crate::error::ErrorCode::CostLimitExceeded);
    }

    #[tokio::test]
    async fn unsafe_query_is_rejected_before_routing() {
        let dispatcher = build(
            vec![descriptor("local-llama", vec![ModelType::Local])],
            vec![("local-llama", Arc::new(MockAdapter::new("local-llama")) as Arc<dyn Adapter>)],
        );

        let error = dispatcher.process_query(request("please exec(rm -rf /)")).await.unwrap_err();
        assert_eq!(error.code(), crate::error::ErrorCode::InvalidRequest);
    }
}
