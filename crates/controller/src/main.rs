//! Central controller for the CPU arbitration control plane
//!
//! Connects to every host agent at startup, installs the pod maps,
//! then runs exactly one enforcement loop until the configured run
//! duration elapses: sample the fleet, solve the allocation problem,
//! push the decisions back out.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use arbiter_lib::models::{Enforcement, Topology};
use arbiter_lib::protocol::{self, Command};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;
mod decision;
mod demand;
mod loops;
mod optimizer;
mod roundlog;
mod transport;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting controller");

    let config = config::ControllerConfig::load()?;
    let enforcement: Enforcement = config.enforcement.parse()?;
    info!(enforcement = %config.enforcement, "Controller configured");

    let log =
        roundlog::RoundLog::create(&config.log_prefix, &config.log_folder, config.run_number)
            .await?;

    let topology = Topology::load(&config.topology_path).await?;
    for node in &topology.nodes {
        info!(
            node = %node.name,
            ip = %node.ip,
            pods = node.pods.len(),
            milli_cores = node.milli_cores,
            "Node"
        );
    }

    // Connect to every agent; any failure here is fatal.
    let command_timeout = Duration::from_secs(config.command_timeout_secs);
    let mut channels = Vec::with_capacity(topology.nodes.len());
    for node in &topology.nodes {
        channels.push(Arc::new(
            transport::NodeChannel::connect(node, command_timeout).await?,
        ));
    }

    // Install the pod maps; a rejection here is fatal.
    for (node, channel) in topology.nodes.iter().zip(&channels) {
        let pairs = node
            .pods
            .values()
            .map(|pod| (pod.name.clone(), pod.cgroup_path.clone()))
            .collect();
        let reply = channel.exchange(&Command::UpdatePods(pairs)).await?;
        if reply != protocol::SUCCESS {
            bail!("Failed to update pod state on node {}", node.ip);
        }
    }

    let control = loops::ControlLoop {
        topology,
        channels,
        optimizer: optimizer::OptimizerClient::new(&config.optimizer_url)?,
        log,
    };

    control
        .push_default_lb_weights(&config.default_lb_weights)
        .await;

    let run = match enforcement {
        Enforcement::None => tokio::spawn(control.run_none()),
        Enforcement::Lb => {
            info!("Enforcing LB weights");
            tokio::spawn(control.run_lb())
        }
        Enforcement::CpuQuota => {
            control.push_default_cpu_quotas().await;
            control.push_default_cpu_shares().await;
            info!("Enforcing CPU quotas");
            tokio::spawn(control.run_quota())
        }
        Enforcement::CpuShare => {
            control.push_default_cpu_quotas().await;
            control.push_default_cpu_shares().await;
            info!("Enforcing CPU shares");
            tokio::spawn(control.run_share())
        }
        Enforcement::Both => {
            control.push_default_cpu_quotas().await;
            control.push_default_cpu_shares().await;
            info!("Enforcing CPU quotas and shares");
            tokio::spawn(control.run_both())
        }
    };

    // Bounded experiment run: the loop is cut off once the duration
    // elapses.
    tokio::time::sleep(Duration::from_millis(config.run_duration_ms)).await;
    run.abort();
    info!("Run duration elapsed, shutting down");

    Ok(())
}
