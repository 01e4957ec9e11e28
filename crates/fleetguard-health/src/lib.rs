//! fleetguard-health — health checking for messaging-cluster nodes.
//!
//! Runs pluggable probes against brokers and coordination-service
//! members, keeps a bounded status history per node, and drives the
//! polling cadence of the whole control loop.
//!
//! # Architecture
//!
//! ```text
//! MonitoringLoop (one background task, fixed interval)
//!   ├── HealthCheckDispatcher
//!   │   ├── bounded worker pool (≤ 10 nodes in flight)
//!   │   └── per node: check methods in order, retries + linear backoff
//!   ├── StatusTracker (ring buffer per node → StatusDiff)
//!   └── TransitionHandler(s) (failure / recovery signals)
//! ```
//!
//! A probe that cannot complete is retried and then downgraded to an
//! unhealthy [`NodeStatus`](fleetguard_types::NodeStatus); a check task
//! that panics becomes an unhealthy status with `method_used = "error"`.
//! Nothing a single node does can abort a tick.

pub mod dispatcher;
pub mod monitor;
pub mod strategy;
pub mod tracker;

pub use dispatcher::{DispatcherConfig, HealthCheckDispatcher, MAX_WORKERS};
pub use monitor::{MonitorConfig, MonitorHandle, MonitoringLoop, TransitionHandler};
pub use strategy::{CheckStrategy, ProbeError};
pub use tracker::{StatusDiff, StatusTracker, DEFAULT_HISTORY_SIZE};
