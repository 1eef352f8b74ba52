//! Agent configuration

use anyhow::Result;
use arbiter_lib::cgroup::{DEFAULT_CGROUP_ROOT, DEFAULT_HELPER_PATH};
use arbiter_lib::constants::{AGENT_COMMAND_PORT, AGENT_WEIGHTS_PORT, SAMPLE_INTERVAL_MS};
use serde::Deserialize;

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// TCP port for the controller command channel
    #[serde(default = "default_command_port")]
    pub command_port: u16,

    /// HTTP port the load balancer polls for weights
    #[serde(default = "default_weights_port")]
    pub weights_port: u16,

    /// Root of the kubepods cpu controller hierarchy
    #[serde(default = "default_cgroup_root")]
    pub cgroup_root: String,

    /// Privileged shell helper used for all cgroup writes
    #[serde(default = "default_helper_path")]
    pub helper_path: String,

    /// Utilization sampling interval in milliseconds
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,
}

fn default_command_port() -> u16 {
    AGENT_COMMAND_PORT
}

fn default_weights_port() -> u16 {
    AGENT_WEIGHTS_PORT
}

fn default_cgroup_root() -> String {
    DEFAULT_CGROUP_ROOT.to_string()
}

fn default_helper_path() -> String {
    DEFAULT_HELPER_PATH.to_string()
}

fn default_sample_interval_ms() -> u64 {
    SAMPLE_INTERVAL_MS
}

impl AgentConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("AGENT"))
            .build()?;

        Ok(config.try_deserialize().unwrap_or_else(|_| AgentConfig {
            command_port: default_command_port(),
            weights_port: default_weights_port(),
            cgroup_root: default_cgroup_root(),
            helper_path: default_helper_path(),
            sample_interval_ms: default_sample_interval_ms(),
        }))
    }
}
