//! Line-oriented ASCII command protocol between controller and agent
//!
//! Each command is a single write and each party treats a single read
//! as one whole message; there is no length prefix. Encoding never
//! appends a newline, and parsing tolerates one trailing newline so a
//! newline-framing peer interoperates with a message-per-read peer.

use std::fmt;

pub const SUCCESS: &str = "Success";
pub const FAILURE: &str = "Failure";
pub const UNKNOWN: &str = "Unknown message type";
pub const UTILS_PREFIX: &str = "utils:";

/// A command sent from the controller to an agent.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Replace the agent's pod name to UID map.
    UpdatePods(Vec<(String, String)>),
    /// Write cpu.shares for each named pod. Values are floored on the
    /// agent side before hitting the kernel.
    ApplyCpuShares(Vec<(String, f64)>),
    /// Write cpu.cfs_quota_us for each named pod. -1 means unlimited.
    ApplyCpuQuotas(Vec<(String, i64)>),
    /// Replace the shared LB weights string with the payload verbatim.
    ApplyLbWeights(String),
    /// Sample utilization deltas for every known pod.
    GetCpuUtilizations,
}

/// How a received message failed to parse. Unknown command words keep
/// the connection open with a distinct response; malformed payloads of
/// a known command are plain failures.
#[derive(Debug)]
pub enum ParseError {
    UnknownType(String),
    Malformed(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::UnknownType(word) => write!(f, "unknown message type: {}", word),
            ParseError::Malformed(reason) => write!(f, "malformed command: {}", reason),
        }
    }
}

impl std::error::Error for ParseError {}

impl Command {
    /// Render to the single-message wire form.
    pub fn encode(&self) -> String {
        match self {
            Command::UpdatePods(pairs) => {
                let mut msg = String::from("updatePods");
                for (name, uid) in pairs {
                    msg.push_str(&format!(" {}:{}", name, uid));
                }
                msg
            }
            Command::ApplyCpuShares(pairs) => {
                let mut msg = String::from("applyCPUShares");
                for (name, share) in pairs {
                    msg.push_str(&format!(" {}:{:.6}", name, share));
                }
                msg
            }
            Command::ApplyCpuQuotas(pairs) => {
                let mut msg = String::from("applyCPUQuotas");
                for (name, quota) in pairs {
                    msg.push_str(&format!(" {}:{}", name, quota));
                }
                msg
            }
            Command::ApplyLbWeights(payload) => format!("applyLBWeights {}", payload),
            Command::GetCpuUtilizations => String::from("getCPUUtilizations"),
        }
    }

    /// Parse one received message.
    pub fn parse(msg: &str) -> Result<Command, ParseError> {
        let msg = msg.trim_end_matches(['\r', '\n']);
        let (head, rest) = match msg.split_once(' ') {
            Some((head, rest)) => (head, Some(rest)),
            None => (msg, None),
        };

        match head {
            "updatePods" => Ok(Command::UpdatePods(parse_pairs(rest.unwrap_or(""))?)),
            "applyCPUShares" => Ok(Command::ApplyCpuShares(parse_float_pairs(
                rest.unwrap_or(""),
            )?)),
            "applyCPUQuotas" => Ok(Command::ApplyCpuQuotas(
                parse_float_pairs(rest.unwrap_or(""))?
                    .into_iter()
                    .map(|(name, value)| (name, value as i64))
                    .collect(),
            )),
            "applyLBWeights" => Ok(Command::ApplyLbWeights(rest.unwrap_or("").to_string())),
            "getCPUUtilizations" => Ok(Command::GetCpuUtilizations),
            other => Err(ParseError::UnknownType(other.to_string())),
        }
    }
}

/// Parse space-separated `name:value` string pairs. One malformed pair
/// fails the whole batch.
fn parse_pairs(payload: &str) -> Result<Vec<(String, String)>, ParseError> {
    payload
        .split_whitespace()
        .map(|token| {
            token
                .split_once(':')
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .ok_or_else(|| ParseError::Malformed(format!("bad pair {:?}", token)))
        })
        .collect()
}

/// Parse space-separated `name:float` pairs.
fn parse_float_pairs(payload: &str) -> Result<Vec<(String, f64)>, ParseError> {
    parse_pairs(payload)?
        .into_iter()
        .map(|(name, value)| {
            value
                .parse::<f64>()
                .map(|v| (name, v))
                .map_err(|_| ParseError::Malformed(format!("bad number {:?}", value)))
        })
        .collect()
}

/// Parse an agent's `utils: pod:pct ...` reply on the controller side.
pub fn parse_utils_reply(reply: &str) -> anyhow::Result<Vec<(String, f64)>> {
    let reply = reply.trim_end_matches(['\r', '\n']);
    let mut tokens = reply.split_whitespace();
    match tokens.next() {
        Some(UTILS_PREFIX) => {}
        _ => anyhow::bail!("Malformed utilization reply: {:?}", reply),
    }
    tokens
        .map(|token| {
            let (pod, pct) = token
                .split_once(':')
                .ok_or_else(|| anyhow::anyhow!("Bad utilization pair {:?}", token))?;
            let pct: f64 = pct
                .parse()
                .map_err(|_| anyhow::anyhow!("Bad utilization value {:?}", token))?;
            Ok((pod.to_string(), pct))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_update_pods() {
        let cmd = Command::UpdatePods(vec![
            ("app1-0".to_string(), "uid1".to_string()),
            ("app2-0".to_string(), "uid2".to_string()),
        ]);
        assert_eq!(cmd.encode(), "updatePods app1-0:uid1 app2-0:uid2");
    }

    #[test]
    fn encode_apply_shares_uses_six_decimals() {
        let cmd = Command::ApplyCpuShares(vec![("app1-0".to_string(), 256.0)]);
        assert_eq!(cmd.encode(), "applyCPUShares app1-0:256.000000");
    }

    #[test]
    fn encode_apply_quotas_uses_integers() {
        let cmd = Command::ApplyCpuQuotas(vec![
            ("app1-0".to_string(), -1),
            ("app2-0".to_string(), 21000),
        ]);
        assert_eq!(cmd.encode(), "applyCPUQuotas app1-0:-1 app2-0:21000");
    }

    #[test]
    fn parse_round_trips_every_command() {
        let commands = vec![
            Command::UpdatePods(vec![("p1".to_string(), "u1".to_string())]),
            Command::ApplyCpuShares(vec![("p1".to_string(), 256.0)]),
            Command::ApplyCpuQuotas(vec![("p1".to_string(), -1)]),
            Command::ApplyLbWeights("app1:100.000000 ".to_string()),
            Command::GetCpuUtilizations,
        ];
        for cmd in commands {
            assert_eq!(Command::parse(&cmd.encode()).unwrap(), cmd);
        }
    }

    #[test]
    fn parse_tolerates_trailing_newline() {
        let cmd = Command::parse("getCPUUtilizations\n").unwrap();
        assert_eq!(cmd, Command::GetCpuUtilizations);
    }

    #[test]
    fn parse_quota_floors_float_text() {
        let cmd = Command::parse("applyCPUQuotas p1:21000.900000").unwrap();
        assert_eq!(cmd, Command::ApplyCpuQuotas(vec![("p1".to_string(), 21000)]));
    }

    #[test]
    fn parse_lb_weights_keeps_payload_verbatim() {
        let cmd = Command::parse("applyLBWeights app1:50.000000|50.000000 ").unwrap();
        assert_eq!(
            cmd,
            Command::ApplyLbWeights("app1:50.000000|50.000000 ".to_string())
        );
    }

    #[test]
    fn parse_rejects_unknown_type() {
        match Command::parse("selfDestruct now") {
            Err(ParseError::UnknownType(word)) => assert_eq!(word, "selfDestruct"),
            other => panic!("unexpected parse result: {:?}", other),
        }
    }

    #[test]
    fn parse_rejects_malformed_pair() {
        assert!(matches!(
            Command::parse("updatePods p1:u1 p2"),
            Err(ParseError::Malformed(_))
        ));
        assert!(matches!(
            Command::parse("applyCPUShares p1:abc"),
            Err(ParseError::Malformed(_))
        ));
    }

    #[test]
    fn utils_reply_parses_pairs() {
        let pairs = parse_utils_reply("utils: app1-0:40.000000 app2-0:-1.000000").unwrap();
        assert_eq!(
            pairs,
            vec![("app1-0".to_string(), 40.0), ("app2-0".to_string(), -1.0)]
        );
    }

    #[test]
    fn utils_reply_allows_empty_pod_set() {
        assert!(parse_utils_reply("utils:").unwrap().is_empty());
    }

    #[test]
    fn utils_reply_rejects_other_responses() {
        assert!(parse_utils_reply("Failure").is_err());
        assert!(parse_utils_reply("").is_err());
        assert!(parse_utils_reply("utils: app1-0").is_err());
    }
}
