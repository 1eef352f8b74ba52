//! Persistent command channels to the host agents
//!
//! One TCP connection per node, opened at startup and held for the
//! life of the process. Commands to a node are strictly serialized
//! through the channel's mutex, so the agent observes them in issue
//! order; different nodes proceed independently.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use arbiter_lib::models::Node;
use arbiter_lib::protocol::Command;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::debug;

/// Largest reply a single exchange accepts; one read is one message.
const MAX_REPLY_BYTES: usize = 4096;

/// One persistent connection to a node's agent.
pub struct NodeChannel {
    pub node_index: usize,
    addr: String,
    stream: Mutex<TcpStream>,
    command_timeout: Duration,
}

impl NodeChannel {
    /// Dial the agent. A failure here is fatal to startup.
    pub async fn connect(node: &Node, command_timeout: Duration) -> Result<Self> {
        let addr = node.agent_addr();
        let stream = TcpStream::connect(&addr)
            .await
            .with_context(|| format!("Failed to connect to agent at {}", addr))?;
        Ok(Self {
            node_index: node.index,
            addr,
            stream: Mutex::new(stream),
            command_timeout,
        })
    }

    /// Send one command and read its single reply.
    pub async fn exchange(&self, command: &Command) -> Result<String> {
        let encoded = command.encode();
        let mut stream = self.stream.lock().await;

        timeout(self.command_timeout, async {
            stream
                .write_all(encoded.as_bytes())
                .await
                .with_context(|| format!("Failed to send to {}", self.addr))?;
            debug!(addr = %self.addr, sent = %encoded, "Command sent");

            let mut buffer = vec![0u8; MAX_REPLY_BYTES];
            let n = stream
                .read(&mut buffer)
                .await
                .with_context(|| format!("Failed to read from {}", self.addr))?;
            if n == 0 {
                bail!("Agent at {} closed the connection", self.addr);
            }
            let reply = String::from_utf8_lossy(&buffer[..n]).into_owned();
            debug!(addr = %self.addr, reply = %reply, "Reply received");
            Ok(reply)
        })
        .await
        .with_context(|| format!("Command to {} timed out", self.addr))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tokio::net::TcpListener;

    fn test_node(index: usize, port: u16) -> Node {
        Node {
            index,
            name: format!("node{}", index + 1),
            ip: "127.0.0.1".to_string(),
            agent_port: port,
            milli_cores: 2000,
            pods: BTreeMap::new(),
        }
    }

    /// A fake agent that answers every message with a canned reply.
    async fn spawn_fake_agent(reply: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            loop {
                match stream.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
                if stream.write_all(reply.as_bytes()).await.is_err() {
                    break;
                }
            }
        });
        port
    }

    #[tokio::test]
    async fn exchange_returns_the_agent_reply() {
        let port = spawn_fake_agent("Success").await;
        let channel = NodeChannel::connect(&test_node(0, port), Duration::from_secs(5))
            .await
            .unwrap();

        let reply = channel
            .exchange(&Command::GetCpuUtilizations)
            .await
            .unwrap();
        assert_eq!(reply, "Success");
    }

    #[tokio::test]
    async fn exchanges_are_serialized_per_node() {
        let port = spawn_fake_agent("Success").await;
        let channel = std::sync::Arc::new(
            NodeChannel::connect(&test_node(0, port), Duration::from_secs(5))
                .await
                .unwrap(),
        );

        let mut handles = Vec::new();
        for _ in 0..8 {
            let channel = channel.clone();
            handles.push(tokio::spawn(async move {
                channel.exchange(&Command::GetCpuUtilizations).await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "Success");
        }
    }

    #[tokio::test]
    async fn connect_failure_is_an_error() {
        // nothing listens on this port
        let node = test_node(0, 1);
        assert!(NodeChannel::connect(&node, Duration::from_secs(1))
            .await
            .is_err());
    }
}
