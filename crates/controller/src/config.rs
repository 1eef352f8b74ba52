//! Controller configuration
//!
//! The experiment log folder and run number come from the environment
//! alongside everything else, so a run can be scripted end to end.

use anyhow::Result;
use arbiter_lib::constants::RUN_DURATION_MS;
use serde::Deserialize;

/// Controller configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ControllerConfig {
    /// Enforcement mode: NONE | LB | CPU_QUOTA | CPU_SHARE | BOTH
    #[serde(default = "default_enforcement")]
    pub enforcement: String,

    /// Path to the topology snapshot file
    #[serde(default = "default_topology_path")]
    pub topology_path: String,

    /// Base URL of the optimizer service
    #[serde(default = "default_optimizer_url")]
    pub optimizer_url: String,

    /// Directory prefix for experiment logs
    #[serde(default = "default_log_prefix")]
    pub log_prefix: String,

    /// Log folder name within the prefix
    #[serde(default = "default_log_folder")]
    pub log_folder: String,

    /// Run number appended to the log file name
    #[serde(default)]
    pub run_number: u32,

    /// Weights pushed to every agent before the loop starts; empty
    /// means nothing is pushed
    #[serde(default)]
    pub default_lb_weights: String,

    /// Deadline for each command exchange with an agent, in seconds
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,

    /// Wall-clock lifetime of this run, in milliseconds
    #[serde(default = "default_run_duration_ms")]
    pub run_duration_ms: u64,
}

fn default_enforcement() -> String {
    "LB".to_string()
}

fn default_topology_path() -> String {
    "./topology.json".to_string()
}

fn default_optimizer_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_log_prefix() -> String {
    "./logs".to_string()
}

fn default_log_folder() -> String {
    "experiment".to_string()
}

fn default_command_timeout_secs() -> u64 {
    10
}

fn default_run_duration_ms() -> u64 {
    RUN_DURATION_MS
}

impl ControllerConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("CONTROLLER"))
            .build()?;

        Ok(config
            .try_deserialize()
            .unwrap_or_else(|_| ControllerConfig {
                enforcement: default_enforcement(),
                topology_path: default_topology_path(),
                optimizer_url: default_optimizer_url(),
                log_prefix: default_log_prefix(),
                log_folder: default_log_folder(),
                run_number: 0,
                default_lb_weights: String::new(),
                command_timeout_secs: default_command_timeout_secs(),
                run_duration_ms: default_run_duration_ms(),
            }))
    }
}
