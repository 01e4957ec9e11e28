//! Failure classification — maps an unhealthy status to a category and
//! a ranked list of remediation names.

use std::time::Duration;

use fleetguard_types::{FailureCategory, NodeRole, NodeStatus};

/// Latency above which an otherwise unexplained failure counts as a timeout.
pub const SLOW_RESPONSE_THRESHOLD: Duration = Duration::from_secs(10);

/// Case-insensitive substrings per category. Table order is priority:
/// the first category with a matching pattern wins.
const PATTERNS: &[(FailureCategory, &[&str])] = &[
    (FailureCategory::Timeout, &["timeout", "timed out"]),
    (
        FailureCategory::Authentication,
        &[
            "authentication",
            "unauthorized",
            "sasl",
            "access denied",
            "permission denied",
            "invalid credentials",
            "ssl handshake",
        ],
    ),
    (
        FailureCategory::ServiceUnavailable,
        &[
            "connection refused",
            "service unavailable",
            "not running",
            "no such process",
            "broker not available",
        ],
    ),
    (
        FailureCategory::ResourceExhaustion,
        &[
            "out of memory",
            "outofmemory",
            "no space left",
            "disk full",
            "too many open files",
            "resource exhausted",
        ],
    ),
    (
        FailureCategory::NetworkUnreachable,
        &[
            "network is unreachable",
            "network unreachable",
            "no route to host",
            "host unreachable",
            "name or service not known",
            "failed to lookup address",
        ],
    ),
    (
        FailureCategory::ManagementConnection,
        &["jmx", "rmi registry", "management port", "management interface"],
    ),
    (
        FailureCategory::CoordinationService,
        &["zookeeper", "coordination", "session expired", "connectionloss"],
    ),
];

/// Placeholder replaced by the role-qualified restart action.
const GENERIC_RESTART: &str = "restart_service";

/// Stateless failure classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailureClassifier;

impl FailureClassifier {
    /// Create a classifier.
    pub fn new() -> Self {
        Self
    }

    /// Classify an unhealthy status by its error text, falling back to
    /// latency and then to a generic health-check failure.
    pub fn classify(&self, status: &NodeStatus) -> FailureCategory {
        if let Some(message) = &status.error_message {
            let message = message.to_lowercase();
            for (category, patterns) in PATTERNS {
                if patterns.iter().any(|p| message.contains(p)) {
                    return *category;
                }
            }
        }

        if status.latency > SLOW_RESPONSE_THRESHOLD {
            FailureCategory::Timeout
        } else {
            FailureCategory::HealthCheckFailure
        }
    }

    /// Urgency of a category; 1 is most urgent.
    pub fn priority(&self, category: FailureCategory) -> u8 {
        match category {
            FailureCategory::ServiceUnavailable | FailureCategory::CoordinationService => 1,
            FailureCategory::ResourceExhaustion
            | FailureCategory::NetworkUnreachable
            | FailureCategory::Timeout => 2,
            FailureCategory::Authentication | FailureCategory::ManagementConnection => 3,
            FailureCategory::HealthCheckFailure => 4,
        }
    }

    /// Remediation names for a category, best first, with the generic
    /// restart replaced by the restart for `role`.
    pub fn recommended_actions(&self, category: FailureCategory, role: NodeRole) -> Vec<String> {
        let generic: &[&str] = match category {
            FailureCategory::Timeout => &[GENERIC_RESTART, "check_network"],
            FailureCategory::Authentication => &["refresh_credentials", GENERIC_RESTART],
            FailureCategory::ServiceUnavailable => &[GENERIC_RESTART, "run_recovery_script", "run_playbook"],
            FailureCategory::ResourceExhaustion => &["cleanup_disk", GENERIC_RESTART],
            FailureCategory::NetworkUnreachable => &["check_network", "restart_network"],
            FailureCategory::ManagementConnection => &["restart_management_agent", GENERIC_RESTART],
            FailureCategory::CoordinationService => &[GENERIC_RESTART, "run_playbook"],
            FailureCategory::HealthCheckFailure => &[GENERIC_RESTART, "run_recovery_script"],
        };

        let restart = restart_action(role);
        generic
            .iter()
            .map(|&name| if name == GENERIC_RESTART { restart } else { name })
            .map(str::to_string)
            .collect()
    }
}

fn restart_action(role: NodeRole) -> &'static str {
    match role {
        NodeRole::Broker => "restart_broker",
        NodeRole::Coordinator => "restart_coordinator",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(error: &str) -> NodeStatus {
        NodeStatus::unhealthy("kafka-1", "failed", Duration::from_millis(20), error)
    }

    #[test]
    fn connection_refused_is_service_unavailable() {
        let classifier = FailureClassifier::new();
        let category = classifier.classify(&failed("Connection refused by server"));
        assert_eq!(category, FailureCategory::ServiceUnavailable);

        let actions = classifier.recommended_actions(category, NodeRole::Broker);
        assert_eq!(actions[0], "restart_broker");
    }

    #[test]
    fn matching_is_case_insensitive() {
        let classifier = FailureClassifier::new();
        assert_eq!(
            classifier.classify(&failed("SASL AUTHENTICATION FAILED")),
            FailureCategory::Authentication
        );
        assert_eq!(
            classifier.classify(&failed("No Route To Host")),
            FailureCategory::NetworkUnreachable
        );
    }

    #[test]
    fn table_order_decides_ties() {
        let classifier = FailureClassifier::new();
        // Matches both timeout and coordination-service patterns.
        assert_eq!(
            classifier.classify(&failed("zookeeper session timed out")),
            FailureCategory::Timeout
        );
        // Matches both service-unavailable and management patterns.
        assert_eq!(
            classifier.classify(&failed("JMX connection refused")),
            FailureCategory::ServiceUnavailable
        );
    }

    #[test]
    fn each_category_is_reachable() {
        let classifier = FailureClassifier::new();
        let cases = [
            ("read timeout", FailureCategory::Timeout),
            ("unauthorized", FailureCategory::Authentication),
            ("service unavailable", FailureCategory::ServiceUnavailable),
            ("java.lang.OutOfMemoryError", FailureCategory::ResourceExhaustion),
            ("network is unreachable", FailureCategory::NetworkUnreachable),
            ("failed to reach rmi registry", FailureCategory::ManagementConnection),
            ("ConnectionLoss for /brokers/ids", FailureCategory::CoordinationService),
        ];
        for (message, expected) in cases {
            assert_eq!(classifier.classify(&failed(message)), expected, "{message}");
        }
    }

    #[test]
    fn slow_unexplained_failure_is_timeout() {
        let classifier = FailureClassifier::new();
        let mut status = failed("tcp check reported node unhealthy");
        assert_eq!(classifier.classify(&status), FailureCategory::HealthCheckFailure);

        status.latency = Duration::from_secs(11);
        assert_eq!(classifier.classify(&status), FailureCategory::Timeout);

        status.error_message = None;
        status.latency = Duration::from_secs(1);
        assert_eq!(classifier.classify(&status), FailureCategory::HealthCheckFailure);
    }

    #[test]
    fn restart_is_role_qualified() {
        let classifier = FailureClassifier::new();
        for category in FailureCategory::ALL {
            for role in [NodeRole::Broker, NodeRole::Coordinator] {
                let actions = classifier.recommended_actions(category, role);
                assert!(!actions.is_empty());
                assert!(!actions.iter().any(|a| a == GENERIC_RESTART));
            }
        }
        assert_eq!(
            classifier.recommended_actions(FailureCategory::CoordinationService, NodeRole::Coordinator),
            vec!["restart_coordinator", "run_playbook"]
        );
    }

    #[test]
    fn priorities_rank_outages_first() {
        let classifier = FailureClassifier::new();
        assert!(
            classifier.priority(FailureCategory::ServiceUnavailable)
                < classifier.priority(FailureCategory::Authentication)
        );
        assert_eq!(classifier.priority(FailureCategory::HealthCheckFailure), 4);
    }
}
