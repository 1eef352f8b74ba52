//! Translation of optimizer allocations into enforcement commands
//!
//! Decisions are computed per node from the app-level allocations and
//! emitted against the actual pod names in the topology. A zero node
//! denominator falls back to the quota floor or the equal share split.

use std::collections::BTreeMap;

use arbiter_lib::constants::{
    CFS_PERIOD_US, CPUS_IN_NODE, MINIMUM_CPU_QUOTA, NODE_SHARE_BUDGET, POD_QUOTA_OVERHEAD,
};
use arbiter_lib::models::{Node, Topology};
use arbiter_lib::protocol::Command;

use crate::optimizer::{GenericResponse, LegacyResponse};

/// Headroom folded into every quota: a slice of the node's full
/// bandwidth.
fn quota_pad() -> i64 {
    ((CFS_PERIOD_US * CPUS_IN_NODE) as f64 * (POD_QUOTA_OVERHEAD / 100.0)) as i64
}

/// Quota for one app's allocation against the node total, floored at
/// the minimum and padded.
pub fn quota_for(alloc: f64, node_sum: f64) -> i64 {
    let raw = if node_sum > 0.0 {
        ((alloc * (CFS_PERIOD_US * CPUS_IN_NODE) as f64) / node_sum) as i64
    } else {
        MINIMUM_CPU_QUOTA
    };
    raw.max(MINIMUM_CPU_QUOTA) + quota_pad()
}

/// App-level allocations present on one node, in app order.
fn node_allocations(node: &Node, response: &LegacyResponse) -> BTreeMap<String, f64> {
    let mut allocations = BTreeMap::new();
    for pod in node.pods.values() {
        if let Some(alloc) = response.allocation(&pod.app_name, node.index) {
            allocations.insert(pod.app_name.clone(), alloc);
        }
    }
    allocations
}

/// One applyCPUQuotas command per node from a legacy response.
pub fn cpu_quotas(topology: &Topology, response: &LegacyResponse) -> Vec<Command> {
    topology
        .nodes
        .iter()
        .map(|node| {
            let allocations = node_allocations(node, response);
            let node_sum: f64 = allocations.values().sum();
            let entries = node
                .pods
                .values()
                .filter_map(|pod| {
                    allocations
                        .get(&pod.app_name)
                        .map(|alloc| (pod.name.clone(), quota_for(*alloc, node_sum)))
                })
                .collect();
            Command::ApplyCpuQuotas(entries)
        })
        .collect()
}

/// One applyCPUShares command per node from a legacy response. The
/// node's 512-credit budget is split proportionally to allocations, or
/// equally when the allocations sum to zero.
pub fn cpu_shares(topology: &Topology, response: &LegacyResponse) -> Vec<Command> {
    topology
        .nodes
        .iter()
        .map(|node| {
            let allocations = node_allocations(node, response);
            let node_sum: f64 = allocations.values().sum();
            let equal_split = NODE_SHARE_BUDGET / allocations.len().max(1) as f64;
            let entries = node
                .pods
                .values()
                .filter_map(|pod| {
                    allocations.get(&pod.app_name).map(|alloc| {
                        let share = if node_sum > 0.0 {
                            alloc * NODE_SHARE_BUDGET / node_sum
                        } else {
                            equal_split
                        };
                        (pod.name.clone(), share)
                    })
                })
                .collect();
            Command::ApplyCpuShares(entries)
        })
        .collect()
}

/// Render the LB weights string from a generic response: per app, the
/// replica weights normalized to 100 in ascending pod-key order and
/// joined by `|`, each app group followed by a single space.
pub fn lb_weights(response: &GenericResponse) -> String {
    let apps: BTreeMap<&String, &std::collections::HashMap<String, f64>> =
        response.result.iter().collect();

    let mut rendered = String::new();
    for (app, pods) in apps {
        let ordered: BTreeMap<&String, &f64> = pods.iter().collect();
        let values: Vec<f64> = ordered.values().map(|v| **v).collect();
        let total: f64 = values.iter().sum();

        let weights: Vec<String> = values
            .iter()
            .map(|value| {
                let weight = if total == 0.0 {
                    100.0 / values.len() as f64
                } else {
                    value * 100.0 / total
                };
                format!("{:.6}", weight)
            })
            .collect();

        rendered.push_str(app);
        rendered.push(':');
        rendered.push_str(&weights.join("|"));
        rendered.push(' ');
    }
    rendered
}

/// Default quota for every pod on every node: unlimited.
pub fn default_cpu_quotas(topology: &Topology) -> Vec<Command> {
    topology
        .nodes
        .iter()
        .map(|node| {
            Command::ApplyCpuQuotas(node.pods.values().map(|pod| (pod.name.clone(), -1)).collect())
        })
        .collect()
}

/// Default shares: the node budget split equally across its pods.
pub fn default_cpu_shares(topology: &Topology) -> Vec<Command> {
    topology
        .nodes
        .iter()
        .map(|node| {
            let split = NODE_SHARE_BUDGET / node.pods.len().max(1) as f64;
            Command::ApplyCpuShares(
                node.pods
                    .values()
                    .map(|pod| (pod.name.clone(), split))
                    .collect(),
            )
        })
        .collect()
}
