//! An intelligent routing gateway for heterogeneous language-model
//! providers: complexity scoring, cost-aware provider selection, load
//! tracking, and dispatch with fallback.

pub mod adapters;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod evaluator;
pub mod metrics;
pub mod registry;
pub mod router;
pub mod server;
pub mod tracker;
pub mod types;
pub mod validator;

pub use config::Config;
pub use error::{GatewayError, Result};
pub use server::Server;
pub use types::*;

/// Initialize the gateway's tracing/logging subsystem.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "switchboard=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
