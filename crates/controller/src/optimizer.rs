//! Optimizer service adapter
//!
//! Hides the two optimizer APIs behind one client: the legacy GET
//! endpoint used by the quota and share paths over the fixed
//! three-app, three-node layout, and the generic POST endpoint used
//! for LB weights. Network and decode errors here are fatal to the
//! current round only.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use arbiter_lib::models::Topology;
use serde::{Deserialize, Serialize};

/// Optimal solution status in the optimizer's response.
pub const STATUS_OPTIMAL: i32 = 2;

/// Legacy response: five allocation cells over the fixed layout.
#[derive(Debug, Clone, Deserialize)]
pub struct LegacyResponse {
    pub status: i32,
    #[serde(rename = "t00")]
    pub app1_node1: f64,
    #[serde(rename = "t01")]
    pub app1_node2: f64,
    #[serde(rename = "t11")]
    pub app2_node2: f64,
    #[serde(rename = "t12")]
    pub app2_node3: f64,
    #[serde(rename = "t20")]
    pub app3_node1: f64,
}

impl LegacyResponse {
    /// Allocation for an app on a node index. Cells outside the fixed
    /// layout have no allocation.
    pub fn allocation(&self, app: &str, node_index: usize) -> Option<f64> {
        match (app, node_index) {
            ("app1", 0) => Some(self.app1_node1),
            ("app1", 1) => Some(self.app1_node2),
            ("app2", 1) => Some(self.app2_node2),
            ("app2", 2) => Some(self.app2_node3),
            ("app3", 0) => Some(self.app3_node1),
            _ => None,
        }
    }
}

/// Generic response: per-app, per-pod allocations.
#[derive(Debug, Clone, Deserialize)]
pub struct GenericResponse {
    pub status: i32,
    pub result: HashMap<String, HashMap<String, f64>>,
}

#[derive(Debug, Serialize)]
struct HostPayload {
    name: String,
    cap: f64,
}

#[derive(Debug, Serialize)]
struct TenantPayload {
    name: String,
    load: f64,
    fshareload: f64,
}

#[derive(Debug, Serialize)]
struct PodPayload {
    name: String,
    tenant: String,
    host: String,
}

/// HTTP client for the optimizer service.
pub struct OptimizerClient {
    client: reqwest::Client,
    base_url: String,
}

impl OptimizerClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Legacy GET API: three scalar demands against one host cap.
    pub async fn solve_legacy(
        &self,
        host_cap: f64,
        demand: &HashMap<String, f64>,
    ) -> Result<LegacyResponse> {
        let demand_for = |app: &str| demand.get(app).copied().unwrap_or(0.0);
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("host_cap", format!("{:.6}", host_cap)),
                ("t0", format!("{:.6}", demand_for("app1"))),
                ("t1", format!("{:.6}", demand_for("app2"))),
                ("t2", format!("{:.6}", demand_for("app3"))),
            ])
            .send()
            .await
            .context("Optimizer request failed")?;

        if !response.status().is_success() {
            bail!("Optimizer returned {}", response.status());
        }
        response
            .json()
            .await
            .context("Failed to parse optimizer response")
    }

    /// Generic POST API: the full topology and per-tenant demand as a
    /// three-element JSON array of hosts, tenants and pods.
    pub async fn solve_generic(
        &self,
        topology: &Topology,
        demand: &HashMap<String, f64>,
    ) -> Result<GenericResponse> {
        let hosts: Vec<HostPayload> = topology
            .nodes
            .iter()
            .map(|node| HostPayload {
                name: node.name.clone(),
                cap: node.milli_cores as f64 / 10.0,
            })
            .collect();

        let mut apps: Vec<&String> = demand.keys().collect();
        apps.sort();
        let mut tenants = Vec::with_capacity(apps.len());
        for app in apps {
            let fshareload = topology.fair_share_load(app);
            if fshareload == 0.0 {
                bail!("App {} has no fair-share capacity in the topology", app);
            }
            tenants.push(TenantPayload {
                name: app.clone(),
                load: demand[app],
                fshareload,
            });
        }

        let pods: Vec<PodPayload> = topology
            .nodes
            .iter()
            .flat_map(|node| {
                node.pods.values().map(move |pod| PodPayload {
                    name: pod.name.clone(),
                    tenant: pod.app_name.clone(),
                    host: node.name.clone(),
                })
            })
            .collect();

        let payload = (hosts, tenants, pods);
        let response = self
            .client
            .post(&self.base_url)
            .json(&payload)
            .send()
            .await
            .context("Optimizer request failed")?;

        if !response.status().is_success() {
            bail!("Optimizer returned {}", response.status());
        }
        response
            .json()
            .await
            .context("Failed to parse optimizer response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_response_deserializes_cells() {
        let json = r#"{"status":2,"t00":30.0,"t01":10.0,"t11":25.0,"t12":15.0,"t20":20.0}"#;
        let response: LegacyResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.status, STATUS_OPTIMAL);
        assert_eq!(response.allocation("app1", 0), Some(30.0));
        assert_eq!(response.allocation("app1", 1), Some(10.0));
        assert_eq!(response.allocation("app2", 1), Some(25.0));
        assert_eq!(response.allocation("app2", 2), Some(15.0));
        assert_eq!(response.allocation("app3", 0), Some(20.0));
    }

    #[test]
    fn legacy_allocation_is_none_outside_the_layout() {
        let json = r#"{"status":2,"t00":1.0,"t01":1.0,"t11":1.0,"t12":1.0,"t20":1.0}"#;
        let response: LegacyResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.allocation("app2", 0), None);
        assert_eq!(response.allocation("app3", 2), None);
        assert_eq!(response.allocation("app4", 0), None);
    }

    #[test]
    fn generic_response_deserializes_result_maps() {
        let json = r#"{"status":2,"result":{"app1":{"app1-0":17.0,"app1-1":3.0}}}"#;
        let response: GenericResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.result["app1"]["app1-0"], 17.0);
        assert_eq!(response.result["app1"]["app1-1"], 3.0);
    }

    #[test]
    fn payload_tuple_serializes_as_three_element_array() {
        let hosts = vec![HostPayload {
            name: "node1".to_string(),
            cap: 200.0,
        }];
        let tenants = vec![TenantPayload {
            name: "app1".to_string(),
            load: 40.0,
            fshareload: 1000.0,
        }];
        let pods = vec![PodPayload {
            name: "app1-0".to_string(),
            tenant: "app1".to_string(),
            host: "node1".to_string(),
        }];
        let json = serde_json::to_value((hosts, tenants, pods)).unwrap();
        assert!(json.is_array());
        assert_eq!(json.as_array().unwrap().len(), 3);
        assert_eq!(json[0][0]["cap"], 200.0);
        assert_eq!(json[1][0]["fshareload"], 1000.0);
        assert_eq!(json[2][0]["tenant"], "app1");
    }
}
