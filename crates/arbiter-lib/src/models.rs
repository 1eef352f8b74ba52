//! Topology snapshot types
//!
//! The topology is loaded once at startup and treated as immutable for
//! the life of the process. Pod names are globally unique across the
//! snapshot and each pod's cgroup path is stable.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// A single pod replica pinned to a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pod {
    pub name: String,
    pub app_name: String,
    pub fair_share: f64,
    pub cgroup_path: String,
}

/// One worker node and the pods placed on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub index: usize,
    pub name: String,
    pub ip: String,
    pub agent_port: u16,
    pub milli_cores: u64,
    pub pods: BTreeMap<String, Pod>,
}

impl Node {
    pub fn agent_addr(&self) -> String {
        format!("{}:{}", self.ip, self.agent_port)
    }
}

/// Immutable cluster snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topology {
    pub nodes: Vec<Node>,
}

impl Topology {
    /// Load and validate a topology snapshot from a JSON file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read topology from {}", path.display()))?;
        let topology: Topology =
            serde_json::from_str(&raw).context("Failed to parse topology JSON")?;
        topology.validate()?;
        Ok(topology)
    }

    /// Reject snapshots the control loop cannot operate on.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for node in &self.nodes {
            for pod in node.pods.values() {
                if !seen.insert(pod.name.as_str()) {
                    bail!("Duplicate pod name in topology: {}", pod.name);
                }
            }
        }
        for app in self.app_names() {
            if self.fair_share_load(&app) == 0.0 {
                bail!("App {} has zero fair-share load", app);
            }
        }
        Ok(())
    }

    /// All distinct app names in the snapshot, sorted.
    pub fn app_names(&self) -> Vec<String> {
        let names: BTreeSet<String> = self
            .nodes
            .iter()
            .flat_map(|node| node.pods.values().map(|pod| pod.app_name.clone()))
            .collect();
        names.into_iter().collect()
    }

    /// Nominal load of an app given node capacities: the sum of
    /// fair_share x milli_cores over the app's pods.
    pub fn fair_share_load(&self, app_name: &str) -> f64 {
        self.nodes
            .iter()
            .flat_map(|node| {
                node.pods
                    .values()
                    .filter(|pod| pod.app_name == app_name)
                    .map(move |pod| pod.fair_share * node.milli_cores as f64)
            })
            .sum()
    }
}

/// Which enforcement loop the controller runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enforcement {
    None,
    Lb,
    CpuQuota,
    CpuShare,
    Both,
}

impl FromStr for Enforcement {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "NONE" => Ok(Enforcement::None),
            "LB" => Ok(Enforcement::Lb),
            "CPU_QUOTA" => Ok(Enforcement::CpuQuota),
            "CPU_SHARE" => Ok(Enforcement::CpuShare),
            "BOTH" => Ok(Enforcement::Both),
            other => bail!("Invalid enforcement type: {}", other),
        }
    }
}
