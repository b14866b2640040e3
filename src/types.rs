use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Coarse class of backend. Drives which providers are even candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    Local,
    Hybrid,
    Remote,
}

impl ModelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::Local => "local",
            ModelType::Hybrid => "hybrid",
            ModelType::Remote => "remote",
        }
    }

    /// One step down the `remote -> hybrid -> local` downgrade chain, if any.
    pub fn downgrade(&self) -> Option<ModelType> {
        match self {
            ModelType::Remote => Some(ModelType::Hybrid),
            ModelType::Hybrid => Some(ModelType::Local),
            ModelType::Local => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
    Online,
    Degraded,
    Offline,
}

/// Inbound request as received over the RPC surface, before normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub request_id: Option<String>,
    pub query: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Request after `validate_and_normalize`: `request_id` is always present,
/// and `metadata` carries the derived `queryLength`/`wordCount` fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedRequest {
    pub request_id: String,
    pub query_text: String,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplexityResult {
    pub score: f64,
    pub factors: Vec<String>,
}

/// Static description of a provider, loaded once at startup and immutable
/// thereafter. Status changes are applied by atomic replacement, not mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    pub name: String,
    pub status: ProviderStatus,
    pub supported_types: Vec<ModelType>,
    pub capabilities: Vec<String>,
    pub max_concurrent: u32,
    pub base_cost: f64,
    pub max_cost: f64,
    pub cost_efficiency: f64,
}

impl ProviderDescriptor {
    pub fn supports(&self, t: ModelType) -> bool {
        self.supported_types.contains(&t)
    }
}

/// Live, mutable per-provider state. Born lazily on first reference to a
/// provider name and lives for the remainder of the process.
#[derive(Debug, Clone)]
pub struct ProviderRuntimeState {
    pub inflight: u32,
    pub ema_latency_ms: f64,
    pub ema_success_rate: f64,
    pub ema_cost_efficiency: f64,
    pub total_calls: u64,
}

impl Default for ProviderRuntimeState {
    fn default() -> Self {
        Self {
            inflight: 0,
            ema_latency_ms: 500.0,
            ema_success_rate: 0.95,
            ema_cost_efficiency: 0.8,
            total_calls: 0,
        }
    }
}

/// A single sample fed into the tracker's EMA update on call completion.
#[derive(Debug, Clone, Copy)]
pub struct CallSample {
    pub latency_ms: f64,
    pub success: bool,
    pub cost_efficiency: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub provider: String,
    pub model_type: ModelType,
    pub estimated_cost: f64,
    pub is_backup: bool,
    pub was_cost_downgraded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u32,
    pub output: u32,
    pub total: u32,
}

impl TokenUsage {
    /// Rough `len/4` per side, used when an adapter omits real usage.
    pub fn estimate(input_len: usize, output_len: usize) -> Self {
        let input = input_len.div_ceil(4) as u32;
        let output = output_len.div_ceil(4) as u32;
        Self {
            input,
            output,
            total: input + output,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallOutcome {
    pub text: String,
    pub token_usage: TokenUsage,
    pub actual_cost: f64,
    pub latency_ms: f64,
    pub provider_used: String,
    pub success: bool,
    #[serde(default)]
    pub failure_kind: Option<String>,
}

/// A single turn of conversational context, forwarded to chat-style adapters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextMessage {
    pub role: String,
    pub content: String,
}

/// The query shape an adapter actually receives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterQuery {
    pub text: String,
    #[serde(default)]
    pub context: Vec<ContextMessage>,
    pub score: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdapterOptions {
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub system_message: Option<String>,
    #[serde(default)]
    pub stop_sequences: Vec<String>,
    #[serde(default)]
    pub budget: Option<f64>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

// ---- RPC request/response shapes ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessQueryRequest {
    #[serde(default)]
    pub request_id: Option<String>,
    pub query: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessQueryResponse {
    pub request_id: String,
    pub response: String,
    pub complexity_score: f64,
    pub model_used: String,
    pub cost: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GetModelCapabilitiesRequest {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    pub provider_name: String,
    pub capabilities: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetModelCapabilitiesResponse {
    pub capabilities: Vec<String>,
    pub providers: Vec<ProviderCapabilities>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateComplexityRequest {
    pub query: String,
    #[serde(default)]
    pub features: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateComplexityResponse {
    pub complexity_score: f64,
    pub complexity_factors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub name: String,
    pub status: ProviderStatus,
    pub inflight: u32,
    pub max_concurrent: u32,
    pub ema_success_rate: f64,
    pub ema_latency_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub providers: Vec<ProviderHealth>,
}

/// Generates a fresh request id the way the validator does when a caller
/// omits one.
pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}
