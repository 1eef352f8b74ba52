//! Experiment round log: one JSON object per line
//!
//! Every round writes a record with the sampled utilizations and the
//! decisions that applied in the running mode; the other decision
//! fields stay as empty maps so downstream tooling sees a fixed shape.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use arbiter_lib::protocol::Command;
use serde::Serialize;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

/// A single control round, serialized as one log line.
#[derive(Debug, Default, Serialize)]
pub struct RoundRecord {
    pub time: i64,
    #[serde(rename = "CPUUtilizations")]
    pub cpu_utilizations: BTreeMap<String, String>,
    #[serde(rename = "CPUShares")]
    pub cpu_shares: BTreeMap<String, String>,
    #[serde(rename = "CPUQuotas")]
    pub cpu_quotas: BTreeMap<String, String>,
    #[serde(rename = "LBWeights")]
    pub lb_weights: BTreeMap<String, BTreeMap<String, f64>>,
}

impl RoundRecord {
    /// Start a record from the raw node replies, keeping each pod's
    /// reported value verbatim.
    pub fn from_utilizations(replies: &[String]) -> Self {
        let mut record = RoundRecord {
            time: chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default(),
            ..Default::default()
        };
        for reply in replies {
            for token in reply.split_whitespace().skip(1) {
                if let Some((pod, pct)) = token.split_once(':') {
                    record
                        .cpu_utilizations
                        .insert(pod.to_string(), pct.to_string());
                }
            }
        }
        record
    }

    pub fn record_shares(&mut self, commands: &[Command]) {
        for command in commands {
            if let Command::ApplyCpuShares(entries) = command {
                for (pod, share) in entries {
                    self.cpu_shares
                        .insert(pod.clone(), format!("{:.6}", share));
                }
            }
        }
    }

    pub fn record_quotas(&mut self, commands: &[Command]) {
        for command in commands {
            if let Command::ApplyCpuQuotas(entries) = command {
                for (pod, quota) in entries {
                    self.cpu_quotas.insert(pod.clone(), quota.to_string());
                }
            }
        }
    }

    pub fn record_lb_weights(&mut self, weights: &str) {
        self.lb_weights = parse_lb_weights(weights);
    }
}

/// Break a rendered weights string back into per-replica values, keyed
/// by the synthetic replica name `<app>-<index>`.
pub fn parse_lb_weights(weights: &str) -> BTreeMap<String, BTreeMap<String, f64>> {
    let mut parsed = BTreeMap::new();
    for group in weights.split_whitespace() {
        let Some((app, values)) = group.split_once(':') else {
            continue;
        };
        let mut replicas = BTreeMap::new();
        for (index, value) in values.split('|').enumerate() {
            if let Ok(weight) = value.parse::<f64>() {
                replicas.insert(format!("{}-{}", app, index), weight);
            }
        }
        parsed.insert(app.to_string(), replicas);
    }
    parsed
}

/// Append-only log file, flushed after every record.
pub struct RoundLog {
    writer: BufWriter<File>,
}

impl RoundLog {
    /// Create `<prefix>/<folder>/none_CPU_<run>`. Failure here is
    /// fatal to startup.
    pub async fn create(prefix: &str, folder: &str, run: u32) -> Result<Self> {
        let path = format!("{}/{}/none_CPU_{}", prefix, folder, run);
        Self::create_at(&path).await
    }

    pub async fn create_at(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)
            .await
            .with_context(|| format!("Failed to create log file {}", path.display()))?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    pub async fn write(&mut self, record: &RoundRecord) -> Result<()> {
        let line = serde_json::to_string(record).context("Failed to serialize round record")?;
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }
}
