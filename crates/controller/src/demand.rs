//! Demand pipeline: node utilization replies to per-app demand
//!
//! Pod names carry a trailing replica index (`app1-0`); stripping it
//! recovers the app name so replicas of a tenant aggregate together.

use std::collections::HashMap;

use anyhow::Result;
use arbiter_lib::constants::{NOISE, OVERHEAD};
use arbiter_lib::protocol;

/// Sum utilization per app across all node replies.
pub fn per_app_utilizations(replies: &[String]) -> Result<HashMap<String, f64>> {
    let mut totals = HashMap::new();
    for reply in replies {
        for (pod, pct) in protocol::parse_utils_reply(reply)? {
            *totals.entry(app_name(&pod).to_string()).or_insert(0.0) += pct;
        }
    }
    Ok(totals)
}

/// Strip a trailing `-<digits>` replica suffix. Names without one
/// aggregate under themselves; app names that themselves end in digits
/// are assumed not to exist.
pub fn app_name(pod: &str) -> &str {
    match pod.rsplit_once('-') {
        Some((head, tail))
            if !head.is_empty() && !tail.is_empty() && tail.bytes().all(|b| b.is_ascii_digit()) =>
        {
            head
        }
        _ => pod,
    }
}

/// Zero out demand below the noise floor.
pub fn suppress_noise(mut utils: HashMap<String, f64>) -> HashMap<String, f64> {
    for value in utils.values_mut() {
        if *value < NOISE {
            *value = 0.0;
        }
    }
    utils
}

/// Pad each app's demand for enforcement headroom. app3 gets half the
/// pad of the other tenants.
pub fn add_overhead(mut utils: HashMap<String, f64>) -> HashMap<String, f64> {
    for (app, value) in utils.iter_mut() {
        if app == "app3" {
            *value += OVERHEAD;
        } else {
            *value += OVERHEAD * 2.0;
        }
    }
    utils
}
