//! Agent-side command session
//!
//! Each controller connection owns one Session: the pod map installed
//! by updatePods plus everything needed to answer the other commands.
//! The shared LB weights string is the only state that crosses
//! sessions, and the only contended mutable resource on the agent.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::cgroup::{CgroupWriter, CpuAcctReader};
use crate::protocol::{self, Command, ParseError};
use crate::sampler;

/// Largest message the command channel accepts; one read is one
/// whole command.
pub const MAX_COMMAND_BYTES: usize = 4096;

/// Most recently accepted LB weights payload, shared between the
/// command handler (writer) and the HTTP handler (reader). The mutex
/// is held only for the assignment or the clone, so replacement is
/// atomic and readers never observe a partial write.
#[derive(Clone, Default)]
pub struct SharedWeights {
    inner: Arc<Mutex<String>>,
}

impl SharedWeights {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn replace(&self, weights: String) {
        *self.inner.lock().await = weights;
    }

    pub async fn current(&self) -> String {
        self.inner.lock().await.clone()
    }
}

enum CgroupFile {
    Shares,
    Quota,
}

/// State owned by a single controller connection.
pub struct Session {
    pods: BTreeMap<String, String>,
    reader: CpuAcctReader,
    writer: Arc<dyn CgroupWriter>,
    weights: SharedWeights,
    sample_interval: Duration,
}

impl Session {
    pub fn new(
        reader: CpuAcctReader,
        writer: Arc<dyn CgroupWriter>,
        weights: SharedWeights,
        sample_interval: Duration,
    ) -> Self {
        Self {
            pods: BTreeMap::new(),
            reader,
            writer,
            weights,
            sample_interval,
        }
    }

    /// Handle one received message and produce its single response.
    pub async fn handle(&mut self, msg: &str) -> String {
        match Command::parse(msg) {
            Ok(Command::UpdatePods(pairs)) => self.update_pods(pairs),
            Ok(Command::ApplyLbWeights(payload)) => {
                info!(weights = %payload, "Updated LB weights");
                self.weights.replace(payload).await;
                protocol::SUCCESS.to_string()
            }
            Ok(Command::ApplyCpuShares(pairs)) => {
                let entries: Vec<(String, i64)> = pairs
                    .into_iter()
                    .map(|(name, share)| (name, share.floor() as i64))
                    .collect();
                self.apply_values(&entries, CgroupFile::Shares).await
            }
            Ok(Command::ApplyCpuQuotas(pairs)) => {
                self.apply_values(&pairs, CgroupFile::Quota).await
            }
            Ok(Command::GetCpuUtilizations) => {
                sampler::sample(&self.reader, &self.pods, self.sample_interval).await
            }
            Err(ParseError::UnknownType(word)) => {
                warn!(word = %word, "Unknown command");
                protocol::UNKNOWN.to_string()
            }
            Err(ParseError::Malformed(reason)) => {
                warn!(reason = %reason, "Malformed command");
                protocol::FAILURE.to_string()
            }
        }
    }

    /// Replace the whole pod map. A malformed batch never installs.
    fn update_pods(&mut self, pairs: Vec<(String, String)>) -> String {
        self.pods = pairs.into_iter().collect();
        info!(pods = self.pods.len(), "Updated pods");
        protocol::SUCCESS.to_string()
    }

    /// Write one value per pod through the helper. The whole batch is
    /// resolved against the pod map before the first write, so an
    /// unknown pod fails the command without touching the hierarchy; a
    /// write error stops the batch and reports which entry failed.
    async fn apply_values(&self, entries: &[(String, i64)], file: CgroupFile) -> String {
        let mut writes = Vec::with_capacity(entries.len());
        for (pod, value) in entries {
            let Some(uid) = self.pods.get(pod) else {
                warn!(pod = %pod, "Unknown pod in apply batch");
                return protocol::FAILURE.to_string();
            };
            let path = match file {
                CgroupFile::Shares => self.reader.shares_path(uid),
                CgroupFile::Quota => self.reader.quota_path(uid),
            };
            writes.push((pod, value.to_string(), path));
        }

        for (pod, value, path) in &writes {
            if let Err(e) = self.writer.write(value, path).await {
                warn!(pod = %pod, error = %e, "Cgroup write failed");
                return protocol::FAILURE.to_string();
            }
        }
        info!(count = writes.len(), "Applied cgroup batch");
        protocol::SUCCESS.to_string()
    }
}

/// Serve one controller connection until EOF or a read error.
pub async fn run_connection(mut stream: TcpStream, mut session: Session) {
    let mut buffer = vec![0u8; MAX_COMMAND_BYTES];
    loop {
        let n = match stream.read(&mut buffer).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "Read error on command channel");
                break;
            }
        };
        let msg = String::from_utf8_lossy(&buffer[..n]).into_owned();
        info!(msg = %msg, "Received command");

        let response = session.handle(&msg).await;
        if let Err(e) = stream.write_all(response.as_bytes()).await {
            warn!(error = %e, "Write error on command channel");
            break;
        }
    }
    warn!("Controller disconnected");
}
