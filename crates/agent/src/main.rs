//! Host agent - per-node enforcement endpoint
//!
//! Runs one process per worker node, serving the controller's command
//! channel over TCP and the load balancer's weights poll over HTTP.

use anyhow::Result;
use arbiter_lib::session::SharedWeights;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;
mod server;
mod weights;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting host agent");

    let config = config::AgentConfig::load()?;
    info!(
        command_port = config.command_port,
        weights_port = config.weights_port,
        "Agent configured"
    );

    let lb_weights = SharedWeights::new();

    let command_server = tokio::spawn(server::serve(config.clone(), lb_weights.clone()));
    let weights_server = tokio::spawn(weights::serve(config.weights_port, lb_weights));

    tokio::select! {
        result = command_server => result??,
        result = weights_server => result??,
        _ = tokio::signal::ctrl_c() => info!("SIGINT received, shutting down"),
    }

    Ok(())
}
