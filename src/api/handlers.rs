//! Request handlers for the API endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use super::AppState;
use super::types::{ErrorResponse, StateResponse, TelemetryQuery};
use crate::sim::types::StepResult;

/// Returns simulation config, KPI report, and the last step of every connector.
///
/// `GET /state` → 200 + `StateResponse` JSON
pub async fn get_state(State(state): State<Arc<AppState>>) -> Response {
    let output = &state.output;
    let last = output.results.last().map(|r| r.timestep);
    let latest_step = output
        .results
        .iter()
        .filter(|r| Some(r.timestep) == last)
        .collect();

    Json(StateResponse {
        config: &output.sim_config,
        strategy: output.strategy,
        kpi: &output.kpi,
        latest_step,
    })
    .into_response()
}

/// Returns telemetry records, optionally filtered by timestep range and
/// grid connector.
///
/// `GET /telemetry` → 200 + `Vec<StepResult>` JSON
/// `GET /telemetry?from=N&to=M&grid_connector=GC1` → filtered (inclusive)
/// `GET /telemetry?from=10&to=5` → 400 + `ErrorResponse`
pub async fn get_telemetry(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TelemetryQuery>,
) -> Response {
    if let (Some(from), Some(to)) = (query.from, query.to) {
        if from > to {
            let body = ErrorResponse {
                error: format!("`from` ({from}) must be <= `to` ({to})"),
            };
            return (StatusCode::BAD_REQUEST, Json(body)).into_response();
        }
    }

    let records: Vec<&StepResult> = state
        .output
        .results
        .iter()
        .filter(|r| query.matches(r))
        .collect();
    Json(records).into_response()
}
