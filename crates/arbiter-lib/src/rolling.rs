//! Rolling per-app demand window
//!
//! The controller smooths each app's demand over the last W rounds.
//! Apps missing from a snapshot contribute zero for that round, and
//! during warm-up the mean divides by the rounds seen so far, not W.

use std::collections::{HashMap, VecDeque};

/// Bounded window of per-app utilization snapshots.
#[derive(Debug)]
pub struct RollingWindow {
    capacity: usize,
    rounds: VecDeque<HashMap<String, f64>>,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            rounds: VecDeque::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }

    /// Append a snapshot, dropping the oldest when over capacity, and
    /// return the arithmetic mean per app over the current window.
    pub fn push_and_average(&mut self, snapshot: HashMap<String, f64>) -> HashMap<String, f64> {
        self.rounds.push_back(snapshot);
        if self.rounds.len() > self.capacity {
            self.rounds.pop_front();
        }

        let mut totals: HashMap<String, f64> = HashMap::new();
        for round in &self.rounds {
            for (app, util) in round {
                *totals.entry(app.clone()).or_insert(0.0) += util;
            }
        }
        let count = self.rounds.len() as f64;
        for total in totals.values_mut() {
            *total /= count;
        }
        totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs
            .iter()
            .map(|(app, util)| (app.to_string(), *util))
            .collect()
    }

    #[test]
    fn warm_up_divides_by_rounds_seen() {
        let mut window = RollingWindow::new(50);
        window.push_and_average(snapshot(&[("app1", 10.0)]));
        let avg = window.push_and_average(snapshot(&[("app1", 30.0)]));
        assert_eq!(avg["app1"], 20.0);
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn window_never_exceeds_capacity() {
        let mut window = RollingWindow::new(3);
        for i in 0..10 {
            window.push_and_average(snapshot(&[("app1", i as f64)]));
            assert!(window.len() <= 3);
        }
        // only rounds 7, 8 and 9 remain
        let avg = window.push_and_average(snapshot(&[("app1", 10.0)]));
        assert_eq!(avg["app1"], (8.0 + 9.0 + 10.0) / 3.0);
    }

    #[test]
    fn missing_app_contributes_zero() {
        let mut window = RollingWindow::new(50);
        window.push_and_average(snapshot(&[("app1", 10.0), ("app2", 40.0)]));
        let avg = window.push_and_average(snapshot(&[("app1", 20.0)]));
        assert_eq!(avg["app1"], 15.0);
        // app2 was only seen once but still averages over both rounds
        assert_eq!(avg["app2"], 20.0);
    }
}
