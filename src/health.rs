//! Liveness and readiness reporting for orchestrator probes.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::shutdown::ShutdownState;

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Detailed health report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub state: HealthState,
    pub ready: bool,
    pub accepting_requests: bool,
    pub models_ready: usize,
    pub pending_requests: usize,
    pub uptime_secs: u64,
}

/// Health check configuration.
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Readiness requires at least one Ready model when set.
    pub require_model_ready: bool,
    /// Pending-request depth at which the process reports degraded.
    pub max_queue_depth: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            require_model_ready: false,
            max_queue_depth: 256,
        }
    }
}

/// Aggregates health information from runtime components.
pub struct HealthChecker {
    config: HealthConfig,
    start_time: Instant,
}

impl HealthChecker {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            start_time: Instant::now(),
        }
    }

    /// Liveness: the process is responsive.
    pub fn is_alive(&self) -> bool {
        true
    }

    /// Readiness: accepting traffic and within capacity.
    pub fn is_ready(&self, shutdown: ShutdownState, models_ready: usize, pending: usize) -> bool {
        if shutdown != ShutdownState::Running {
            return false;
        }
        if self.config.require_model_ready && models_ready == 0 {
            return false;
        }
        pending < self.config.max_queue_depth
    }

    /// Full health report.
    pub fn report(
        &self,
        shutdown: ShutdownState,
        models_ready: usize,
        pending: usize,
    ) -> HealthReport {
        HealthReport {
            state: self.compute_state(shutdown, models_ready, pending),
            ready: self.is_ready(shutdown, models_ready, pending),
            accepting_requests: shutdown == ShutdownState::Running,
            models_ready,
            pending_requests: pending,
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    fn compute_state(
        &self,
        shutdown: ShutdownState,
        models_ready: usize,
        pending: usize,
    ) -> HealthState {
        if shutdown != ShutdownState::Running {
            return HealthState::Unhealthy;
        }
        if self.config.require_model_ready && models_ready == 0 {
            return HealthState::Degraded;
        }
        if pending >= self.config.max_queue_depth {
            return HealthState::Degraded;
        }
        HealthState::Healthy
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new(HealthConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_process_with_capacity_is_healthy() {
        let checker = HealthChecker::default();
        let report = checker.report(ShutdownState::Running, 1, 3);
        assert_eq!(report.state, HealthState::Healthy);
        assert!(report.ready);
        assert!(report.accepting_requests);
    }

    #[test]
    fn draining_process_is_unhealthy_and_not_ready() {
        let checker = HealthChecker::default();
        let report = checker.report(ShutdownState::Draining, 2, 0);
        assert_eq!(report.state, HealthState::Unhealthy);
        assert!(!report.ready);
        assert!(!report.accepting_requests);
    }

    #[test]
    fn queue_at_depth_cap_degrades() {
        let checker = HealthChecker::new(HealthConfig {
            require_model_ready: false,
            max_queue_depth: 4,
        });
        let report = checker.report(ShutdownState::Running, 1, 4);
        assert_eq!(report.state, HealthState::Degraded);
        assert!(!report.ready);
    }

    #[test]
    fn model_floor_applies_when_required() {
        let checker = HealthChecker::new(HealthConfig {
            require_model_ready: true,
            max_queue_depth: 256,
        });
        assert!(!checker.is_ready(ShutdownState::Running, 0, 0));
        assert!(checker.is_ready(ShutdownState::Running, 1, 0));
    }
}
