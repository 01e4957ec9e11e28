//! fleetd — assembles the fleetguard control loop from a config file.
//!
//! ```text
//! FleetConfig ─┬─ HealthCheckDispatcher (tcp probe)
//!              ├─ RecoveryEngine (shell-command actions)
//!              ├─ Coordinator (+ LogNotifier)
//!              └─ MonitoringLoop ──TransitionHandler──▶ Coordinator
//! ```

pub mod actions;
pub mod config;
pub mod notify;
pub mod probes;

use std::sync::Arc;

use fleetguard_coordinator::Coordinator;
use fleetguard_health::{HealthCheckDispatcher, MonitoringLoop};
use fleetguard_recovery::RecoveryEngine;

use crate::actions::CommandAction;
use crate::config::FleetConfig;
use crate::notify::LogNotifier;
use crate::probes::{TcpProbe, TCP_METHOD};

/// The wired control loop.
pub struct Daemon {
    pub monitor: Arc<MonitoringLoop>,
    pub coordinator: Arc<Coordinator>,
}

/// Dispatcher with every built-in strategy registered.
pub fn build_dispatcher(config: &FleetConfig) -> HealthCheckDispatcher {
    HealthCheckDispatcher::new(config.monitor.dispatcher_config()).with_strategy(TCP_METHOD, Arc::new(TcpProbe))
}

/// Engine with one [`CommandAction`] per configured action.
pub fn build_engine(config: &FleetConfig) -> anyhow::Result<RecoveryEngine> {
    let mut engine = RecoveryEngine::new().with_history_size(config.recovery.history_size);
    for settings in &config.actions {
        engine.register_action(&settings.name, Arc::new(CommandAction::from_settings(settings)))?;
    }
    Ok(engine)
}

impl Daemon {
    /// Wire the dispatcher, engine, coordinator and loop from `config`.
    pub fn build(config: &FleetConfig) -> anyhow::Result<Self> {
        let engine = build_engine(config)?;
        let coordinator = Arc::new(
            Coordinator::new(Arc::new(engine), config.recovery.coordinator_config())
                .with_notifier(Arc::new(LogNotifier)),
        );
        let monitor = MonitoringLoop::new(
            config.nodes.clone(),
            build_dispatcher(config),
            config.monitor.monitor_config(),
        )?
        .with_handler(coordinator.clone());

        Ok(Self {
            monitor: Arc::new(monitor),
            coordinator,
        })
    }
}

/// A monitoring loop with no transition handlers, for one-shot checks.
pub fn build_probe_only(config: &FleetConfig) -> anyhow::Result<MonitoringLoop> {
    Ok(MonitoringLoop::new(
        config.nodes.clone(),
        build_dispatcher(config),
        config.monitor.monitor_config(),
    )?)
}
