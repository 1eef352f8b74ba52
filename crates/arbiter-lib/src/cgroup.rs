//! Cgroup read and write plumbing
//!
//! Reads go straight to the cgroup filesystem. Writes are funneled
//! through a privileged shell helper so the agent process itself does
//! not need write access to the hierarchy; the helper's exit status is
//! the single source of truth for success.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::fs;
use tokio::process;

/// Where the kubepods cpu controller hierarchy is mounted inside the
/// agent container.
pub const DEFAULT_CGROUP_ROOT: &str = "/host/sys/fs/cgroup/cpu/kubepods";

/// Default location of the privileged write helper.
pub const DEFAULT_HELPER_PATH: &str = "./writetofile.sh";

/// Reader for per-pod cpuacct counters under a configurable root.
#[derive(Debug, Clone)]
pub struct CpuAcctReader {
    root: PathBuf,
}

impl CpuAcctReader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Read the monotonic nanosecond usage counter for one pod cgroup.
    pub async fn read_usage(&self, uid: &str) -> Result<u64> {
        let usage_file = self.root.join(uid).join("cpuacct.usage");
        let content = fs::read_to_string(&usage_file)
            .await
            .with_context(|| format!("Failed to read {}", usage_file.display()))?;
        content
            .trim()
            .parse()
            .with_context(|| format!("Failed to parse {}", usage_file.display()))
    }

    pub fn shares_path(&self, uid: &str) -> PathBuf {
        self.root.join(uid).join("cpu.shares")
    }

    pub fn quota_path(&self, uid: &str) -> PathBuf {
        self.root.join(uid).join("cpu.cfs_quota_us")
    }
}

/// Seam for cgroup writes so the session logic can be exercised
/// without a real hierarchy or a privileged helper.
#[async_trait]
pub trait CgroupWriter: Send + Sync {
    async fn write(&self, value: &str, path: &Path) -> Result<()>;
}

/// Writes through `bash <helper> <value> <path>`.
#[derive(Debug, Clone)]
pub struct ShellWriter {
    helper: PathBuf,
}

impl ShellWriter {
    pub fn new(helper: impl Into<PathBuf>) -> Self {
        Self {
            helper: helper.into(),
        }
    }
}

#[async_trait]
impl CgroupWriter for ShellWriter {
    async fn write(&self, value: &str, path: &Path) -> Result<()> {
        let output = process::Command::new("bash")
            .arg(&self.helper)
            .arg(value)
            .arg(path)
            .output()
            .await
            .with_context(|| format!("Failed to run helper {}", self.helper.display()))?;
        if !output.status.success() {
            bail!(
                "Helper exited with {} writing {} to {}",
                output.status,
                value,
                path.display()
            );
        }
        Ok(())
    }
}
