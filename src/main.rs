use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod adapters;
mod config;
mod dispatcher;
mod error;
mod evaluator;
mod metrics;
mod registry;
mod router;
mod server;
mod tracker;
mod types;
mod validator;

use config::Config;
use server::Server;

#[derive(Parser)]
#[command(name = "switchboard")]
#[command(about = "An intelligent routing gateway for heterogeneous language-model providers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Serve {
        #[arg(short, long, default_value = "switchboard.toml")]
        config: String,
        #[arg(short, long)]
        bind: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Check configuration and provider registry
    Check {
        #[arg(short, long, default_value = "switchboard.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "switchboard=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenv::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, bind, port } => {
            info!("starting switchboard v{}", env!("CARGO_PKG_VERSION"));

            let mut cfg = Config::load(&config).await?;

            if let Some(bind_addr) = bind {
                cfg.server.bind = bind_addr;
            }
            if let Some(port_num) = port {
                cfg.server.port = port_num;
            }

            let server = Server::new(cfg).await?;
            server.start().await?;
        }
        Commands::Check { config } => {
            info!("checking switchboard configuration...");

            let cfg = Config::load(&config).await?;
            info!("configuration loaded successfully");

            let registry = registry::ProviderRegistry::new(&cfg);
            if registry.is_empty() {
                warn!("no providers configured");
            } else {
                for descriptor in registry.list() {
                    info!(
                        "provider {}: types={:?} max_concurrent={}",
                        descriptor.name, descriptor.supported_types, descriptor.max_concurrent
                    );
                }
            }

            info!("configuration check complete");
        }
    }

    Ok(())
}
