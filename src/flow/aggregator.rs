// flow/aggregator.rs

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Sliding-window store of per-lane vehicle counts, keyed by intersection
/// and lane. One sample is appended per engine step; once a window holds
/// `capacity` samples the oldest is evicted first. The capacity is a sample
/// count (the configured optimization interval), not a wall-clock duration.
#[derive(Debug)]
pub struct FlowAggregator {
    capacity: usize,
    windows: Mutex<HashMap<String, HashMap<String, VecDeque<f64>>>>,
}

impl FlowAggregator {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Appends one sample to the lane's window, creating it on first use.
    pub fn record_sample(&self, intersection_id: &str, lane_id: &str, count: f64) {
        let mut windows = self.windows.lock().unwrap();
        let window = windows
            .entry(intersection_id.to_string())
            .or_default()
            .entry(lane_id.to_string())
            .or_insert_with(VecDeque::new);
        window.push_back(count);
        while window.len() > self.capacity {
            window.pop_front();
        }
    }

    /// Arithmetic mean of the samples currently in the window.
    /// Returns 0.0 for an unknown lane or an empty window.
    pub fn average_flow(&self, intersection_id: &str, lane_id: &str) -> f64 {
        let windows = self.windows.lock().unwrap();
        if let Some(lanes) = windows.get(intersection_id) {
            if let Some(window) = lanes.get(lane_id) {
                if !window.is_empty() {
                    let sum: f64 = window.iter().sum();
                    return sum / window.len() as f64;
                }
            }
        }
        0.0
    }

    /// Whether any lane of this intersection has at least one sample.
    pub fn has_samples(&self, intersection_id: &str) -> bool {
        let windows = self.windows.lock().unwrap();
        windows
            .get(intersection_id)
            .map(|lanes| lanes.values().any(|w| !w.is_empty()))
            .unwrap_or(false)
    }

    /// Drops every window for one intersection.
    pub fn reset(&self, intersection_id: &str) {
        let mut windows = self.windows.lock().unwrap();
        windows.remove(intersection_id);
    }

    /// Drops all windows. Called on simulation start and stop so samples
    /// never leak across runs.
    pub fn reset_all(&self) {
        let mut windows = self.windows.lock().unwrap();
        windows.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_over_empty_window_is_zero() {
        let aggregator = FlowAggregator::new(10);
        assert_eq!(aggregator.average_flow("tl_1", "lane_0"), 0.0);
        assert!(!aggregator.has_samples("tl_1"));
    }

    #[test]
    fn averages_recorded_samples() {
        let aggregator = FlowAggregator::new(10);
        aggregator.record_sample("tl_1", "lane_0", 2.0);
        aggregator.record_sample("tl_1", "lane_0", 4.0);
        aggregator.record_sample("tl_1", "lane_0", 6.0);
        assert_eq!(aggregator.average_flow("tl_1", "lane_0"), 4.0);
        assert!(aggregator.has_samples("tl_1"));
        // Other lanes at the same intersection stay independent.
        assert_eq!(aggregator.average_flow("tl_1", "lane_1"), 0.0);
    }

    #[test]
    fn window_evicts_oldest_sample_first() {
        let aggregator = FlowAggregator::new(3);
        for count in [1.0, 2.0, 3.0, 4.0, 5.0] {
            aggregator.record_sample("tl_1", "lane_0", count);
        }
        // Only the three newest samples (3, 4, 5) remain.
        assert_eq!(aggregator.average_flow("tl_1", "lane_0"), 4.0);
    }

    #[test]
    fn reset_clears_one_intersection_only() {
        let aggregator = FlowAggregator::new(5);
        aggregator.record_sample("tl_1", "lane_0", 3.0);
        aggregator.record_sample("tl_2", "lane_0", 7.0);
        aggregator.reset("tl_1");
        assert_eq!(aggregator.average_flow("tl_1", "lane_0"), 0.0);
        assert_eq!(aggregator.average_flow("tl_2", "lane_0"), 7.0);
    }

    #[test]
    fn reset_all_clears_every_window() {
        let aggregator = FlowAggregator::new(5);
        aggregator.record_sample("tl_1", "lane_0", 3.0);
        aggregator.record_sample("tl_2", "lane_1", 7.0);
        aggregator.reset_all();
        assert_eq!(aggregator.average_flow("tl_1", "lane_0"), 0.0);
        assert_eq!(aggregator.average_flow("tl_2", "lane_1"), 0.0);
        assert!(!aggregator.has_samples("tl_1"));
        assert!(!aggregator.has_samples("tl_2"));
    }
}
