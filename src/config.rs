use crate::error::Result;
use crate::types::{ModelType, ProviderDescriptor, ProviderStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub providers: HashMap<String, ProviderEntryConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            workers: default_workers(),
            timeout_seconds: default_timeout(),
        }
    }
}

/// Routing thresholds and defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default = "default_lo")]
    pub lo: f64,
    #[serde(default = "default_hi")]
    pub hi: f64,
    #[serde(default = "default_cost_cap")]
    pub default_cost_cap: f64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            lo: default_lo(),
            hi: default_hi(),
            default_cost_cap: default_cost_cap(),
        }
    }
}

/// One entry of the static provider registry, as loaded from config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntryConfig {
    #[serde(default = "default_status")]
    pub status: ProviderStatus,
    pub supported_types: Vec<ModelType>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    pub max_concurrent: u32,
    pub base_cost: f64,
    pub max_cost: f64,
    #[serde(default = "default_cost_efficiency")]
    pub cost_efficiency: f64,
}

impl ProviderEntryConfig {
    pub fn into_descriptor(self, name: String) -> ProviderDescriptor {
        ProviderDescriptor {
            name,
            status: self.status,
            supported_types: self.supported_types,
            capabilities: self.capabilities,
            max_concurrent: self.max_concurrent,
            base_cost: self.base_cost,
            max_cost: self.max_cost,
            cost_efficiency: self.cost_efficiency,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Alert thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_error_rate_threshold")]
    pub error_rate_threshold: f64,
    #[serde(default = "default_latency_threshold_ms")]
    pub latency_threshold_ms: f64,
    #[serde(default = "default_memory_threshold")]
    pub memory_threshold: f64,
    #[serde(default = "default_cpu_threshold")]
    pub cpu_threshold: f64,
    #[serde(default = "default_cost_daily_threshold")]
    pub cost_daily_threshold: f64,
    #[serde(default = "default_cost_monthly_threshold")]
    pub cost_monthly_threshold: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            error_rate_threshold: default_error_rate_threshold(),
            latency_threshold_ms: default_latency_threshold_ms(),
            memory_threshold: default_memory_threshold(),
            cpu_threshold: default_cpu_threshold(),
            cost_daily_threshold: default_cost_daily_threshold(),
            cost_monthly_threshold: default_cost_monthly_threshold(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_workers() -> usize {
    num_cpus::get()
}

fn default_timeout() -> u64 {
    30
}

fn default_lo() -> f64 {
    0.3
}

fn default_hi() -> f64 {
    0.7
}

fn default_cost_cap() -> f64 {
    1.0
}

fn default_status() -> ProviderStatus {
    ProviderStatus::Online
}

fn default_cost_efficiency() -> f64 {
    0.8
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_error_rate_threshold() -> f64 {
    0.1
}

fn default_latency_threshold_ms() -> f64 {
    2000.0
}

fn default_memory_threshold() -> f64 {
    0.9
}

fn default_cpu_threshold() -> f64 {
    0.8
}

fn default_cost_daily_threshold() -> f64 {
    1000.0
}

fn default_cost_monthly_threshold() -> f64 {
    20_000.0
}

fn default_providers() -> HashMap<String, ProviderEntryConfig> {
    let mut providers = HashMap::new();
    providers.insert(
        "local-llama".to_string(),
        ProviderEntryConfig {
            status: ProviderStatus::Online,
            supported_types: vec![ModelType::Local],
            capabilities: vec!["chat".to_string(), "summarize".to_string()],
            max_concurrent: 8,
            base_cost: 0.0005,
            max_cost: 0.01,
            cost_efficiency: 0.95,
        },
    );
    providers.insert(
        "hybrid-mixtral".to_string(),
        ProviderEntryConfig {
            status: ProviderStatus::Online,
            supported_types: vec![ModelType::Hybrid],
            capabilities: vec!["chat".to_string(), "reasoning".to_string()],
            max_concurrent: 4,
            base_cost: 0.002,
            max_cost: 0.05,
            cost_efficiency: 0.8,
        },
    );
    providers.insert(
        "remote-gpt4".to_string(),
        ProviderEntryConfig {
            status: ProviderStatus::Online,
            supported_types: vec![ModelType::Remote],
            capabilities: vec!["chat".to_string(), "reasoning".to_string(), "code".to_string()],
            max_concurrent: 2,
            base_cost: 0.02,
            max_cost: 1.0,
            cost_efficiency: 0.6,
        },
    );
    providers
}

impl Config {
    pub async fn load(path: &str) -> Result<Self> {
        use std::fs;

        if let Ok(content) = fs::read_to_string(path) {
            let mut config: Config = toml::from_str(&content)?;
            config.apply_env_overrides();
            return Ok(config);
        }

        let mut config = Self::default();
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(bind) = std::env::var("GATEWAY_BIND") {
            self.server.bind = bind;
        }
        if let Ok(port) = std::env::var("GATEWAY_PORT") {
            if let Ok(port_num) = port.parse() {
                self.server.port = port_num;
            }
        }
        if let Ok(lo) = std::env::var("GATEWAY_ROUTING_LO") {
            if let Ok(lo_num) = lo.parse() {
                self.routing.lo = lo_num;
            }
        }
        if let Ok(hi) = std::env::var("GATEWAY_ROUTING_HI") {
            if let Ok(hi_num) = hi.parse() {
                self.routing.hi = hi_num;
            }
        }
        if let Ok(level) = std::env::var("GATEWAY_LOG_LEVEL") {
            self.logging.level = level;
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            routing: RoutingConfig::default(),
            providers: default_providers(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}
