use super::Adapter;
use crate::error::{GatewayError, Result};
use crate::types::{AdapterOptions, AdapterQuery, CallOutcome, TokenUsage};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// A scripted call: either a successful body text or a failure message.
#[derive(Debug, Clone)]
pub enum Scripted {
    Ok(String),
    Err(String),
}

/// Deterministic in-memory adapter used for tests and local-style providers
/// that have no real backend to call. Each invocation pops the next
/// scripted outcome; once the script is exhausted it echoes the query back
/// as a successful response, which is enough to drive the common routing
/// scenarios without per-test boilerplate.
#[derive(Debug)]
pub struct MockAdapter {
    provider: String,
    script: Mutex<VecDeque<Scripted>>,
    call_count: AtomicU32,
    latency_ms: u64,
}

impl MockAdapter {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            script: Mutex::new(VecDeque::new()),
            call_count: AtomicU32::new(0),
            latency_ms: 5,
        }
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub fn with_script(self, script: Vec<Scripted>) -> Self {
        *self.script.lock().unwrap() = script.into();
        self
    }

    pub fn calls(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Adapter for MockAdapter {
    fn provider_name(&self) -> &str {
        &self.provider
    }

    async fn call(
        &self,
        model: &str,
        query: &AdapterQuery,
        _options: &AdapterOptions,
    ) -> Result<CallOutcome> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(self.latency_ms)).await;

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Scripted::Err(message)) => {
                debug!(provider = %self.provider, %message, "mock adapter scripted failure");
                Err(GatewayError::ModelUnavailable(message))
            }
            Some(Scripted::Ok(text)) => Ok(self.build_outcome(model, &text)),
            None => {
                let text = format!("Response from {} ({}): {}", self.provider, model, query.text);
                Ok(self.build_outcome(model, &text))
            }
        }
    }
}

impl MockAdapter {
    fn build_outcome(&self, _model: &str, text: &str) -> CallOutcome {
        let token_usage = TokenUsage::estimate(32, text.len());
        CallOutcome {
            text: text.to_string(),
            token_usage,
            actual_cost: 0.0,
            latency_ms: self.latency_ms as f64,
            provider_used: self.provider.clone(),
            success: true,
            failure_kind: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(text: &str) -> AdapterQuery {
        AdapterQuery {
            text: text.to_string(),
            context: vec![],
            score: 0.5,
        }
    }

    #[tokio::test]
    async fn echoes_when_script_empty() {
        let adapter = MockAdapter::new("local-llama");
        let outcome = adapter
            .call("llama-small", &query("hello"), &AdapterOptions::default())
            .await
            .unwrap();
        assert!(outcome.success);
        assert!(outcome.text.contains("hello"));
    }

    #[tokio::test]
    async fn fails_once_then_succeeds() {
        let adapter = MockAdapter::new("remote-gpt4").with_script(vec![
            Scripted::Err("transient".to_string()),
            Scripted::Ok("Backup model response".to_string()),
        ]);

        let first = adapter
            .call("gpt-4", &query("hi"), &AdapterOptions::default())
            .await;
        assert!(first.is_err());

        let second = adapter
            .call("gpt-4", &query("hi"), &AdapterOptions::default())
            .await
            .unwrap();
        assert_eq!(second.text, "Backup model response");
        assert_eq!(adapter.calls(), 2);
    }
}
