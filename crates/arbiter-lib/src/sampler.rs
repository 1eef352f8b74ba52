//! Utilization sampling over one interval
//!
//! The sleep happens on the command handler on purpose: holding the
//! channel for the duration of the sample keeps the controller and
//! agent time bases trivially aligned.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::time::Instant;
use tracing::warn;

use crate::cgroup::CpuAcctReader;
use crate::protocol::UTILS_PREFIX;

/// Sentinel reported when either read of a pod's counter fails.
const READ_FAILED: f64 = -1.0;

/// Capture usage deltas for every known pod and render the wire reply.
///
/// Counters are read serially before and after one sleep interval; a
/// failed read on either side yields the sentinel for that pod only.
pub async fn sample(
    reader: &CpuAcctReader,
    pods: &BTreeMap<String, String>,
    interval: Duration,
) -> String {
    let mut initial = BTreeMap::new();
    for (name, uid) in pods {
        initial.insert(name.as_str(), read_counter(reader, uid).await);
    }
    let started = Instant::now();

    tokio::time::sleep(interval).await;

    let mut finals = BTreeMap::new();
    for (name, uid) in pods {
        finals.insert(name.as_str(), read_counter(reader, uid).await);
    }
    let elapsed_ns = started.elapsed().as_nanos() as f64;

    let mut reply = String::from(UTILS_PREFIX);
    for name in pods.keys() {
        let pct = match (initial[name.as_str()], finals[name.as_str()]) {
            (Some(before), Some(after)) => {
                ((after as f64 - before as f64) / elapsed_ns) * 100.0
            }
            _ => READ_FAILED,
        };
        reply.push_str(&format!(" {}:{:.6}", name, pct));
    }
    reply
}

async fn read_counter(reader: &CpuAcctReader, uid: &str) -> Option<u64> {
    match reader.read_usage(uid).await {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(uid = %uid, error = %e, "Failed to read cpuacct.usage");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::fs;

    async fn write_usage(root: &std::path::Path, uid: &str, value: u64) {
        let pod_dir = root.join(uid);
        fs::create_dir_all(&pod_dir).await.unwrap();
        fs::write(pod_dir.join("cpuacct.usage"), format!("{}\n", value))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn idle_pod_reports_zero() {
        let dir = tempfile::tempdir().unwrap();
        write_usage(dir.path(), "u1", 5_000_000).await;

        let reader = CpuAcctReader::new(dir.path());
        let pods = BTreeMap::from([("app1-0".to_string(), "u1".to_string())]);
        let reply = sample(&reader, &pods, Duration::from_millis(10)).await;
        assert_eq!(reply, "utils: app1-0:0.000000");
    }

    #[tokio::test]
    async fn failed_read_reports_sentinel_for_that_pod_only() {
        let dir = tempfile::tempdir().unwrap();
        write_usage(dir.path(), "u1", 1_000).await;

        let reader = CpuAcctReader::new(dir.path());
        let pods = BTreeMap::from([
            ("app1-0".to_string(), "u1".to_string()),
            ("app2-0".to_string(), "missing".to_string()),
        ]);
        let reply = sample(&reader, &pods, Duration::from_millis(10)).await;
        assert!(reply.contains(" app1-0:0.000000"));
        assert!(reply.contains(" app2-0:-1.000000"));
    }

    #[tokio::test]
    async fn empty_pod_set_yields_bare_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let reader = CpuAcctReader::new(dir.path());
        let reply = sample(&reader, &BTreeMap::new(), Duration::from_millis(1)).await;
        assert_eq!(reply, "utils:");
    }
}
