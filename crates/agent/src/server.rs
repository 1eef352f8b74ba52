//! TCP command channel server
//!
//! Accepts controller connections and dedicates a task to each one for
//! its lifetime. Per-connection state lives in the session; the shared
//! weights handle is the only state that crosses connections.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use arbiter_lib::cgroup::{CgroupWriter, CpuAcctReader, ShellWriter};
use arbiter_lib::session::{run_connection, Session, SharedWeights};
use tokio::net::TcpListener;
use tracing::info;

use crate::config::AgentConfig;

/// Accept controller connections forever.
pub async fn serve(config: AgentConfig, weights: SharedWeights) -> Result<()> {
    let addr = format!("0.0.0.0:{}", config.command_port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind command channel on {}", addr))?;
    info!(addr = %addr, "Command channel listening");

    let writer: Arc<dyn CgroupWriter> = Arc::new(ShellWriter::new(&config.helper_path));
    let sample_interval = Duration::from_millis(config.sample_interval_ms);

    loop {
        let (stream, peer) = listener
            .accept()
            .await
            .context("Failed to accept on command channel")?;
        info!(peer = %peer, "Controller connected");

        let session = Session::new(
            CpuAcctReader::new(&config.cgroup_root),
            writer.clone(),
            weights.clone(),
            sample_interval,
        );
        tokio::spawn(run_connection(stream, session));
    }
}
