//! Enforcement loops
//!
//! Exactly one of these runs for the life of the process. Every round
//! fans sampling out to all nodes, rejoins at a barrier, runs the
//! mode's demand and decision pipeline, writes one log line, then
//! applies sequentially in topology order. A bad round is warned and
//! skipped; the loop never wedges on one.

use std::sync::Arc;

use anyhow::Result;
use arbiter_lib::constants::WINDOW_ROUNDS;
use arbiter_lib::models::Topology;
use arbiter_lib::protocol::{self, Command};
use arbiter_lib::rolling::RollingWindow;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::decision;
use crate::demand;
use crate::optimizer::{LegacyResponse, OptimizerClient, STATUS_OPTIMAL};
use crate::roundlog::{RoundLog, RoundRecord};
use crate::transport::NodeChannel;

/// Host capacity figure handed to the legacy optimizer API.
const LEGACY_HOST_CAP: f64 = 200.0;

/// Everything one enforcement loop needs for a run.
pub struct ControlLoop {
    pub topology: Topology,
    pub channels: Vec<Arc<NodeChannel>>,
    pub optimizer: OptimizerClient,
    pub log: RoundLog,
}

impl ControlLoop {
    /// Fan `getCPUUtilizations` out to every node and rejoin by node
    /// index. The round does not proceed until every node answered;
    /// a failed node leaves an empty slot that the demand parser
    /// rejects downstream.
    pub async fn sample_all(&self) -> Vec<String> {
        let (tx, mut rx) = mpsc::channel(self.channels.len().max(1));
        for channel in &self.channels {
            let channel = channel.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let reply = channel.exchange(&Command::GetCpuUtilizations).await;
                let _ = tx.send((channel.node_index, reply)).await;
            });
        }
        drop(tx);

        let mut replies = vec![String::new(); self.channels.len()];
        while let Some((index, reply)) = rx.recv().await {
            match reply {
                Ok(text) => {
                    info!(node = index, utils = %text, "CPU utilizations");
                    replies[index] = text;
                }
                Err(e) => warn!(node = index, error = %e, "Sampling failed"),
            }
        }
        replies
    }

    /// Apply one command per node, sequentially in topology order. A
    /// rejection on one node does not stop the rest.
    async fn apply_all(&self, commands: &[Command]) {
        for (channel, command) in self.channels.iter().zip(commands) {
            match channel.exchange(command).await {
                Ok(reply) if reply == protocol::SUCCESS => {}
                Ok(reply) => {
                    warn!(node = channel.node_index, reply = %reply, "Apply rejected")
                }
                Err(e) => warn!(node = channel.node_index, error = %e, "Apply failed"),
            }
        }
    }

    /// Send the same command to every node in topology order.
    async fn apply_everywhere(&self, command: &Command) {
        for channel in &self.channels {
            match channel.exchange(command).await {
                Ok(reply) if reply == protocol::SUCCESS => {}
                Ok(reply) => {
                    warn!(node = channel.node_index, reply = %reply, "Apply rejected")
                }
                Err(e) => warn!(node = channel.node_index, error = %e, "Apply failed"),
            }
        }
    }

    async fn write_record(&mut self, record: &RoundRecord) {
        if let Err(e) = self.log.write(record).await {
            warn!(error = %e, "Failed to write round record");
        }
    }

    /// Push configured default weights. An empty default has nothing
    /// to apply.
    pub async fn push_default_lb_weights(&self, default_weights: &str) {
        if default_weights.is_empty() {
            warn!("No default LB weights configured");
            return;
        }
        self.apply_everywhere(&Command::ApplyLbWeights(default_weights.to_string()))
            .await;
    }

    /// Reset every pod to an unlimited quota before enforcement begins.
    pub async fn push_default_cpu_quotas(&self) {
        self.apply_all(&decision::default_cpu_quotas(&self.topology))
            .await;
    }

    /// Reset every node to the equal share split before enforcement
    /// begins.
    pub async fn push_default_cpu_shares(&self) {
        self.apply_all(&decision::default_cpu_shares(&self.topology))
            .await;
    }

    /// Observation only: sample and log every round.
    pub async fn run_none(mut self) {
        loop {
            let replies = self.sample_all().await;
            let record = RoundRecord::from_utilizations(&replies);
            self.write_record(&record).await;
        }
    }

    /// LB enforcement: raw demand through the generic optimizer API,
    /// weights pushed to every agent.
    pub async fn run_lb(mut self) {
        let mut window = RollingWindow::new(WINDOW_ROUNDS);
        loop {
            let replies = self.sample_all().await;
            let mut record = RoundRecord::from_utilizations(&replies);
            match self.solve_lb(&replies, &mut window).await {
                Ok(weights) => {
                    record.record_lb_weights(&weights);
                    self.write_record(&record).await;
                    self.apply_everywhere(&Command::ApplyLbWeights(weights)).await;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to get optimal LB weights");
                    self.write_record(&record).await;
                }
            }
        }
    }

    /// Quota enforcement through the legacy optimizer API.
    pub async fn run_quota(mut self) {
        let mut window = RollingWindow::new(WINDOW_ROUNDS);
        loop {
            let replies = self.sample_all().await;
            self.quota_round(&replies, &mut window).await;
        }
    }

    /// Share enforcement through the legacy optimizer API.
    pub async fn run_share(mut self) {
        let mut window = RollingWindow::new(WINDOW_ROUNDS);
        loop {
            let replies = self.sample_all().await;
            self.share_round(&replies, &mut window).await;
        }
    }

    /// Quota and share enforcement together: each sub-round makes its
    /// own optimizer call, writes its own log line and applies its own
    /// decisions, both from the same sample.
    pub async fn run_both(mut self) {
        let mut window = RollingWindow::new(WINDOW_ROUNDS);
        loop {
            let replies = self.sample_all().await;
            self.quota_round(&replies, &mut window).await;
            self.share_round(&replies, &mut window).await;
        }
    }

    async fn quota_round(&mut self, replies: &[String], window: &mut RollingWindow) {
        let mut record = RoundRecord::from_utilizations(replies);
        match self.solve_legacy(replies, window).await {
            Ok(Some(response)) => {
                let commands = decision::cpu_quotas(&self.topology, &response);
                record.record_quotas(&commands);
                self.write_record(&record).await;
                self.apply_all(&commands).await;
            }
            // non-optimal: the round is logged but nothing is applied
            Ok(None) => self.write_record(&record).await,
            Err(e) => {
                warn!(error = %e, "Failed to get optimal CPU quotas");
                self.write_record(&record).await;
            }
        }
    }

    async fn share_round(&mut self, replies: &[String], window: &mut RollingWindow) {
        let mut record = RoundRecord::from_utilizations(replies);
        match self.solve_legacy(replies, window).await {
            Ok(Some(response)) => {
                let commands = decision::cpu_shares(&self.topology, &response);
                record.record_shares(&commands);
                self.write_record(&record).await;
                self.apply_all(&commands).await;
            }
            Ok(None) => self.write_record(&record).await,
            Err(e) => {
                warn!(error = %e, "Failed to get optimal CPU shares");
                self.write_record(&record).await;
            }
        }
    }

    /// The quota/share demand pipeline: noise filter, overhead pad,
    /// rolling average, then the legacy optimizer call. A non-optimal
    /// status drops the decision for this round.
    async fn solve_legacy(
        &self,
        replies: &[String],
        window: &mut RollingWindow,
    ) -> Result<Option<LegacyResponse>> {
        let utils = demand::per_app_utilizations(replies)?;
        let effective = demand::add_overhead(demand::suppress_noise(utils));
        let average = window.push_and_average(effective);

        let response = self.optimizer.solve_legacy(LEGACY_HOST_CAP, &average).await?;
        if response.status != STATUS_OPTIMAL {
            warn!(status = response.status, "Optimizer returned non-optimal status");
            return Ok(None);
        }
        Ok(Some(response))
    }

    /// The LB demand pipeline: raw demand, rolling average, generic
    /// optimizer call, rendered weights.
    async fn solve_lb(&self, replies: &[String], window: &mut RollingWindow) -> Result<String> {
        let utils = demand::per_app_utilizations(replies)?;
        let average = window.push_and_average(utils);
        let response = self.optimizer.solve_generic(&self.topology, &average).await?;
        Ok(decision::lb_weights(&response))
    }
}
