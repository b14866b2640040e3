use crate::error::Result;
use crate::types::{AdapterOptions, AdapterQuery, CallOutcome};
use async_trait::async_trait;

pub mod http;
pub mod mock;

pub use http::HttpAdapter;
pub use mock::MockAdapter;

/// Uniform contract any backend implements. Shared retry/cost
/// bookkeeping lives in the dispatcher and tracker, not here: an adapter's
/// only job is to turn a query into a `CallOutcome` or a typed failure.
#[async_trait]
pub trait Adapter: Send + Sync + std::fmt::Debug {
    /// Name of the provider this adapter speaks for, matching its registry entry.
    fn provider_name(&self) -> &str;

    async fn call(
        &self,
        model: &str,
        query: &AdapterQuery,
        options: &AdapterOptions,
    ) -> Result<CallOutcome>;
}
