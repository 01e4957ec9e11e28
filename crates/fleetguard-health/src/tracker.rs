//! Status history and before/after diffing.

use std::collections::{HashMap, VecDeque};

use serde::Serialize;

use fleetguard_types::NodeStatus;

/// Statuses retained per node unless configured otherwise.
pub const DEFAULT_HISTORY_SIZE: usize = 100;

/// What changed between a node's previous and current observation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusDiff {
    /// Health or error text differs, or this is the first observation.
    pub changed: bool,
    pub health_flipped: bool,
    pub became_healthy: bool,
    pub became_unhealthy: bool,
    pub error_appeared: bool,
    pub error_cleared: bool,
    /// `current.latency - previous.latency` in seconds; 0 on first observation.
    pub latency_delta_secs: f64,
}

impl StatusDiff {
    /// Diff two observations of the same node.
    pub fn between(previous: Option<&NodeStatus>, current: &NodeStatus) -> Self {
        let Some(previous) = previous else {
            return Self {
                changed: true,
                ..Self::default()
            };
        };

        let health_flipped = previous.is_healthy != current.is_healthy;
        let error_appeared = previous.error_message.is_none() && current.error_message.is_some();
        let error_cleared = previous.error_message.is_some() && current.error_message.is_none();

        Self {
            changed: health_flipped || previous.error_message != current.error_message,
            health_flipped,
            became_healthy: health_flipped && current.is_healthy,
            became_unhealthy: health_flipped && !current.is_healthy,
            error_appeared,
            error_cleared,
            latency_delta_secs: current.latency.as_secs_f64() - previous.latency.as_secs_f64(),
        }
    }
}

/// Bounded per-node status history.
#[derive(Debug)]
pub struct StatusTracker {
    histories: HashMap<String, VecDeque<NodeStatus>>,
    capacity: usize,
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_SIZE)
    }
}

impl StatusTracker {
    /// Create a tracker keeping at most `capacity` statuses per node.
    pub fn new(capacity: usize) -> Self {
        Self {
            histories: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Append a status, evicting the oldest on overflow, and return the
    /// diff against the node's previous status.
    pub fn update(&mut self, status: NodeStatus) -> StatusDiff {
        let history = self.histories.entry(status.node_id.clone()).or_default();
        let diff = StatusDiff::between(history.back(), &status);

        if history.len() == self.capacity {
            history.pop_front();
        }
        history.push_back(status);
        diff
    }

    /// Most recent status for a node.
    pub fn latest(&self, node_id: &str) -> Option<&NodeStatus> {
        self.histories.get(node_id).and_then(VecDeque::back)
    }

    /// The most recent `limit` statuses, oldest first.
    pub fn history(&self, node_id: &str, limit: usize) -> Vec<NodeStatus> {
        self.histories
            .get(node_id)
            .map(|h| h.iter().skip(h.len().saturating_sub(limit)).cloned().collect())
            .unwrap_or_default()
    }

    /// Node ids with at least one observation.
    pub fn nodes(&self) -> Vec<String> {
        self.histories.keys().cloned().collect()
    }

    /// Number of statuses retained for a node.
    pub fn len(&self, node_id: &str) -> usize {
        self.histories.get(node_id).map_or(0, VecDeque::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn up(ms: u64) -> NodeStatus {
        NodeStatus::healthy("kafka-1", "tcp", Duration::from_millis(ms))
    }

    fn down(error: &str) -> NodeStatus {
        NodeStatus::unhealthy("kafka-1", "failed", Duration::from_millis(100), error)
    }

    #[test]
    fn first_observation_is_changed_without_flip() {
        let mut tracker = StatusTracker::default();
        let diff = tracker.update(down("Connection refused"));
        assert!(diff.changed);
        assert!(!diff.health_flipped);
        assert!(!diff.became_unhealthy);
        assert!(!diff.error_appeared);
        assert_eq!(diff.latency_delta_secs, 0.0);
    }

    #[test]
    fn identical_update_is_unchanged() {
        let mut tracker = StatusTracker::default();
        tracker.update(up(10));
        let diff = tracker.update(up(10));
        assert!(!diff.changed);
        assert_eq!(diff, StatusDiff::default());

        tracker.update(down("Connection refused"));
        assert!(!tracker.update(down("Connection refused")).changed);
    }

    #[test]
    fn going_down_sets_flip_and_error_flags() {
        let mut tracker = StatusTracker::default();
        tracker.update(up(10));
        let diff = tracker.update(down("Connection refused"));
        assert!(diff.changed);
        assert!(diff.health_flipped);
        assert!(diff.became_unhealthy);
        assert!(!diff.became_healthy);
        assert!(diff.error_appeared);
        assert!(!diff.error_cleared);
    }

    #[test]
    fn coming_back_clears_error() {
        let mut tracker = StatusTracker::default();
        tracker.update(down("Connection refused"));
        let diff = tracker.update(up(10));
        assert!(diff.became_healthy);
        assert!(diff.error_cleared);
        assert!(!diff.error_appeared);
    }

    #[test]
    fn different_error_text_is_a_change() {
        let mut tracker = StatusTracker::default();
        tracker.update(down("Connection refused"));
        let diff = tracker.update(down("health check timed out after 10s"));
        assert!(diff.changed);
        assert!(!diff.health_flipped);
    }

    #[test]
    fn latency_delta_is_signed() {
        let mut tracker = StatusTracker::default();
        tracker.update(up(500));
        let diff = tracker.update(up(200));
        assert!((diff.latency_delta_secs + 0.3).abs() < 1e-9);
        assert!(!diff.changed);
    }

    #[test]
    fn ring_buffer_evicts_oldest() {
        let mut tracker = StatusTracker::new(3);
        for ms in 1..=5 {
            tracker.update(up(ms));
        }
        assert_eq!(tracker.len("kafka-1"), 3);

        let latencies: Vec<_> = tracker
            .history("kafka-1", 10)
            .iter()
            .map(|s| s.latency.as_millis())
            .collect();
        assert_eq!(latencies, vec![3, 4, 5]);
        assert_eq!(tracker.latest("kafka-1").unwrap().latency, Duration::from_millis(5));
    }

    #[test]
    fn history_limit_returns_most_recent() {
        let mut tracker = StatusTracker::default();
        for ms in 1..=4 {
            tracker.update(up(ms));
        }
        let recent: Vec<_> = tracker.history("kafka-1", 2).iter().map(|s| s.latency.as_millis()).collect();
        assert_eq!(recent, vec![3, 4]);
        assert!(tracker.history("unknown", 5).is_empty());
        assert!(tracker.latest("unknown").is_none());
    }
}
