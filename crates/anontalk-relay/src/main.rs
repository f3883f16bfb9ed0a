use tracing::info;
use tracing_subscriber::EnvFilter;

use anontalk_graph::MemoryGraph;
use anontalk_relay::{seed, serve, spawn_sweeper, AppState, RelayConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,anontalk_relay=debug")),
        )
        .init();

    info!("Starting AnonTalk relay v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = RelayConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Seed the graph
    // -----------------------------------------------------------------------
    let graph = MemoryGraph::new();
    seed(&graph, &config.default_channel).await?;

    // -----------------------------------------------------------------------
    // 4. Spawn the presence sweep
    // -----------------------------------------------------------------------
    spawn_sweeper(graph.clone(), config.sweep_interval, config.sweep_threshold);
    info!(
        interval = ?config.sweep_interval,
        threshold = ?config.sweep_threshold,
        "Presence sweep scheduled"
    );

    // -----------------------------------------------------------------------
    // 5. Serve until Ctrl+C
    // -----------------------------------------------------------------------
    tokio::select! {
        result = serve(AppState::new(graph), config.listen_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Relay server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
