//! Control-plane wide tuning constants

/// CFS bandwidth period assumed for every pod cgroup, in microseconds.
pub const CFS_PERIOD_US: i64 = 100_000;

/// CPUs available on every worker node.
pub const CPUS_IN_NODE: i64 = 2;

/// Floor for any emitted CFS quota, in microseconds.
pub const MINIMUM_CPU_QUOTA: i64 = 1000;

/// Rounds kept in the rolling demand window.
pub const WINDOW_ROUNDS: usize = 50;

/// Padding added to each tenant's effective demand, in percent.
pub const OVERHEAD: f64 = 5.0;

/// Extra headroom folded into every quota, as a percentage of the
/// node's full bandwidth.
pub const POD_QUOTA_OVERHEAD: f64 = 10.0;

/// Demand below this percentage is treated as measurement noise.
pub const NOISE: f64 = 2.0;

/// Total cpu.shares credit budget per node.
pub const NODE_SHARE_BUDGET: f64 = 512.0;

/// Wall-clock lifetime of one controller run, in milliseconds.
pub const RUN_DURATION_MS: u64 = 80_000;

/// Agent-side sampling interval for utilization deltas, in milliseconds.
pub const SAMPLE_INTERVAL_MS: u64 = 100;

/// TCP port the agent command channel listens on.
pub const AGENT_COMMAND_PORT: u16 = 9988;

/// HTTP port the agent serves LB weights on.
pub const AGENT_WEIGHTS_PORT: u16 = 9989;
