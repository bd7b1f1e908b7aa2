use metrics::HealthChecker;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthReport {
    sequencer_connection_healthy: bool,
    l2_node_connection_healthy: bool,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.sequencer_connection_healthy && self.l2_node_connection_healthy
    }
}

pub struct HealthReporter {
    sequencer_connection: HealthChecker,
    l2_node_connection: HealthChecker,
}

impl HealthReporter {
    #[must_use]
    pub fn new(sequencer_health_check: HealthChecker, l2_node_health_check: HealthChecker) -> Self {
        Self {
            sequencer_connection: sequencer_health_check,
            l2_node_connection: l2_node_health_check,
        }
    }

    #[must_use]
    pub fn generate_report(&self) -> HealthReport {
        HealthReport {
            sequencer_connection_healthy: self.sequencer_connection.healthy(),
            l2_node_connection_healthy: self.l2_node_connection.healthy(),
        }
    }
}
