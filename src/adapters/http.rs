use super::Adapter;
use crate::error::{GatewayError, Result};
use crate::types::{AdapterOptions, AdapterQuery, CallOutcome, TokenUsage};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Real HTTP-backed adapter for remote/hybrid providers. Speaks a generic
/// OpenAI-compatible chat-completions endpoint; swapping in a different
/// provider's wire shape means a different adapter, not a different trait.
///
/// Honors its own timeout and a bounded retry policy for retryable
/// transport/server errors: 3 attempts, exponential backoff
/// starting at 1s, factor 2. Authentication and quota errors are not retried.
#[derive(Debug)]
pub struct HttpAdapter {
    provider: String,
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

impl HttpAdapter {
    pub fn new(provider: impl Into<String>, base_url: String, api_key: Option<String>, timeout_seconds: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()?;
        Ok(Self {
            provider: provider.into(),
            client,
            base_url,
            api_key,
        })
    }

    fn is_retryable(status: reqwest::StatusCode) -> bool {
        status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS
    }

    async fn send_once(&self, model: &str, query: &AdapterQuery, options: &AdapterOptions) -> std::result::Result<serde_json::Value, (bool, String)> {
        let mut request = self.client.post(format!("{}/chat/completions", self.base_url)).json(&json!({
            "model": model,
            "messages": [{"role": "user", "content": query.text}],
            "max_tokens": options.max_tokens,
            "temperature": options.temperature,
        }));

        if let Some(ref key) = self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request.send().await.map_err(|e| (true, e.to_string()))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err((false, "unauthorized".to_string()));
        }
        if !response.status().is_success() {
            let retryable = Self::is_retryable(response.status());
            return Err((retryable, format!("status {}", response.status())));
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| (false, e.to_string()))
    }
}

#[async_trait]
impl Adapter for HttpAdapter {
    fn provider_name(&self) -> &str {
        &self.provider
    }

    async fn call(&self, model: &str, query: &AdapterQuery, options: &AdapterOptions) -> Result<CallOutcome> {
        let start = Instant::now();
        let mut backoff = INITIAL_BACKOFF;
        let mut last_error = String::new();

        for attempt in 1..=MAX_ATTEMPTS {
            match self.send_once(model, query, options).await {
                Ok(body) => {
                    let text = body["choices"][0]["message"]["content"]
                        .as_str()
                        .unwrap_or_default()
                        .to_string();
                    let token_usage = TokenUsage::estimate(query.text.len(), text.len());
                    return Ok(CallOutcome {
                        text,
                        token_usage,
                        actual_cost: 0.0,
                        latency_ms: start.elapsed().as_millis() as f64,
                        provider_used: self.provider.clone(),
                        success: true,
                        failure_kind: None,
                    });
                }
                Err((retryable, message)) => {
                    last_error = message;
                    if !retryable || attempt == MAX_ATTEMPTS {
                        break;
                    }
                    warn!(provider = %self.provider, attempt, "retrying after transient failure: {}", last_error);
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }

        debug!(provider = %self.provider, "adapter call exhausted retries: {}", last_error);
        Err(GatewayError::ModelUnavailable(format!(
            "{} unavailable: {}",
            self.provider, last_error
        )))
    }
}
