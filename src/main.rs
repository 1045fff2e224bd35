//! Agent binary: load config, wire subsystems, serve the API.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use url::Url;

use nested_agent::api::HttpServer;
use nested_agent::auth::{Authorizer, HttpAuthorizer};
use nested_agent::config::{load_config, AgentConfig};
use nested_agent::containerizer::RemoteContainerizer;
use nested_agent::lifecycle::Shutdown;
use nested_agent::observability::{logging, metrics};
use nested_agent::state::Registry;

#[derive(Parser)]
#[command(name = "nested-agent")]
#[command(about = "Cluster-node agent control plane for nested containers")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => AgentConfig::default(),
    };

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "nested-agent starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        runtime_endpoint = %config.runtime.endpoint,
        authorization = config.authorization.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(address) => metrics::init_metrics(address),
            Err(error) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %error,
                "Failed to parse metrics address"
            ),
        }
    }

    let runtime_endpoint = Url::parse(&config.runtime.endpoint)?;
    let containerizer = Arc::new(RemoteContainerizer::new(runtime_endpoint));

    let authorizer: Option<Arc<dyn Authorizer>> = if config.authorization.enabled {
        let endpoint = Url::parse(&config.authorization.endpoint)?;
        Some(Arc::new(HttpAuthorizer::new(endpoint)))
    } else {
        tracing::warn!(
            "No authorizer configured; authorization-sensitive calls are allowed for everyone"
        );
        None
    };

    let registry = Registry::spawn();

    let listener = TcpListener::bind(&config.listener.bind_address).await?;

    // There is no checkpointed state to replay yet; recovery is complete
    // once the tables exist and the listener is bound.
    registry.mark_recovered();

    let shutdown = Shutdown::new();
    let signal = shutdown.subscribe();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.trigger();
        }
    });

    let server = HttpServer::new(config, registry, containerizer, authorizer);
    server.run(listener, signal).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
