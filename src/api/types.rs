//! API response and query types.

use serde::{Deserialize, Serialize};

use crate::sim::kpi::KpiReport;
use crate::sim::types::{SimConfig, StepResult};

/// Combined state response: config, KPIs, and the last recorded step.
#[derive(Debug, Serialize)]
pub struct StateResponse<'a> {
    /// Simulation configuration.
    pub config: &'a SimConfig,
    /// Strategy that produced the results.
    pub strategy: &'a str,
    pub kpi: &'a KpiReport,
    /// One record per grid connector for the last timestep.
    pub latest_step: Vec<&'a StepResult>,
}

/// Optional filters for the telemetry endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct TelemetryQuery {
    /// Start timestep (inclusive).
    pub from: Option<usize>,
    /// End timestep (inclusive).
    pub to: Option<usize>,
    /// Restrict to one grid connector.
    pub grid_connector: Option<String>,
}

impl TelemetryQuery {
    pub fn matches(&self, r: &StepResult) -> bool {
        self.from.is_none_or(|from| r.timestep >= from)
            && self.to.is_none_or(|to| r.timestep <= to)
            && self
                .grid_connector
                .as_deref()
                .is_none_or(|gc| r.grid_connector_id == gc)
    }
}

/// Error response body for 400-class errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
}
