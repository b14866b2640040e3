use crate::adapters::{Adapter, MockAdapter};
use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::evaluator;
use crate::metrics::{MetricsAggregator, ZeroResourceSampler};
use crate::registry::ProviderRegistry;
use crate::router::Router as GatewayRouter;
use crate::tracker::Tracker;
use crate::types::*;
use axum::{
    extract::State,
    http::Method,
    routing::{get, post},
    Json, Router,
};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

pub struct Server {
    config: Config,
    dispatcher: Arc<Dispatcher>,
    registry: Arc<ProviderRegistry>,
    tracker: Arc<Tracker>,
    metrics: Arc<MetricsAggregator>,
}

impl Server {
    pub async fn new(config: Config) -> Result<Self> {
        let registry = Arc::new(ProviderRegistry::new(&config));
        let tracker = Arc::new(Tracker::new());
        let router = Arc::new(GatewayRouter::new(
            registry.clone(),
            tracker.clone(),
            config.routing.clone(),
        ));
        let metrics = MetricsAggregator::spawn(config.metrics.clone(), Arc::new(ZeroResourceSampler));

        let mut adapters: HashMap<String, Arc<dyn Adapter>> = HashMap::new();
        for descriptor in registry.list() {
            adapters.insert(
                descriptor.name.clone(),
                Arc::new(MockAdapter::new(descriptor.name.clone())),
            );
        }

        let dispatcher = Arc::new(Dispatcher::new(
            registry.clone(),
            tracker.clone(),
            router,
            metrics.clone(),
            adapters,
        ));

        Ok(Self {
            config,
            dispatcher,
            registry,
            tracker,
            metrics,
        })
    }

    pub async fn start(self) -> Result<()> {
        let app = self.create_app();
        let addr = format!("{}:{}", self.config.server.bind, self.config.server.port);

        info!("switchboard listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }

    fn create_app(&self) -> Router {
        let state = Arc::new(AppState {
            dispatcher: self.dispatcher.clone(),
            registry: self.registry.clone(),
            tracker: self.tracker.clone(),
            metrics: self.metrics.clone(),
        });

        Router::new()
            .route("/health", get(health_check))
            .route("/v1/query", post(process_query))
            .route("/v1/capabilities", get(get_model_capabilities))
            .route("/v1/complexity", post(evaluate_complexity))
            .route("/v1/metrics", get(get_metrics))
            .layer(TraceLayer::new_for_http())
            .layer(CompressionLayer::new())
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods([Method::GET, Method::POST])
                    .allow_headers(Any),
            )
            .with_state(state)
    }
}

struct AppState {
    dispatcher: Arc<Dispatcher>,
    registry: Arc<ProviderRegistry>,
    tracker: Arc<Tracker>,
    metrics: Arc<MetricsAggregator>,
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let mut providers = Vec::new();
    for descriptor in state.registry.list() {
        let runtime = state.tracker.snapshot(&descriptor.name).await;
        providers.push(ProviderHealth {
            name: descriptor.name.clone(),
            status: descriptor.status,
            inflight: runtime.inflight,
            max_concurrent: descriptor.max_concurrent,
            ema_success_rate: runtime.ema_success_rate,
            ema_latency_ms: runtime.ema_latency_ms,
        });
    }

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        providers,
    })
}

async fn process_query(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ProcessQueryRequest>,
) -> Result<Json<ProcessQueryResponse>> {
    let response = state.dispatcher.process_query(request).await?;
    Ok(Json(response))
}

async fn get_model_capabilities(
    State(state): State<Arc<AppState>>,
) -> Json<GetModelCapabilitiesResponse> {
    let mut capability_set = std::collections::BTreeSet::new();
    let mut providers = Vec::new();

    for descriptor in state.registry.list() {
        if descriptor.status != ProviderStatus::Online {
            continue;
        }
        capability_set.extend(descriptor.capabilities.iter().cloned());
        providers.push(ProviderCapabilities {
            provider_name: descriptor.name.clone(),
            capabilities: descriptor.capabilities.clone(),
        });
    }

    Json(GetModelCapabilitiesResponse {
        capabilities: capability_set.into_iter().collect(),
        providers,
    })
}

async fn evaluate_complexity(
    Json(request): Json<EvaluateComplexityRequest>,
) -> Json<EvaluateComplexityResponse> {
    let result = evaluator::evaluate(&request.query);
    Json(EvaluateComplexityResponse {
        complexity_score: result.score,
        complexity_factors: result.factors,
    })
}

async fn get_metrics(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let snapshot = state.metrics.snapshot().await;
    Json(serde_json::to_value(&snapshot_to_json(snapshot)).unwrap_or_default())
}

fn snapshot_to_json(snapshot: crate::metrics::MetricsSnapshot) -> serde_json::Value {
    serde_json::json!({
        "requests_last_60s": snapshot.requests_last_60s,
        "providers": snapshot.provider_stats,
        "alerts": snapshot.alerts,
    })
}
