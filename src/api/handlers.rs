use axum::{
    Json,
    extract::{Query, State, rejection::QueryRejection},
};
use chrono::{DateTime, Utc};
use futures::future::join;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};

use super::error::ApiError;
use super::state::AppState;
use crate::core::{Evaluation, MetricsReport, Rating, evaluate as evaluate_metrics};

#[derive(Debug, Deserialize)]
pub struct SymbolQuery {
    pub symbol: Option<String>,
}

impl SymbolQuery {
    /// Malformed query strings count as a missing symbol.
    fn required(query: Result<Query<Self>, QueryRejection>) -> Result<String, ApiError> {
        let Query(query) = query.map_err(|e| {
            debug!(error = %e, "Rejected query string");
            ApiError::MissingSymbol
        })?;
        let symbol = query
            .symbol
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_uppercase();
        if symbol.is_empty() {
            return Err(ApiError::MissingSymbol);
        }
        Ok(symbol)
    }
}

#[derive(Debug, Serialize)]
pub struct EvaluateResponse {
    pub report: MetricsReport,
    pub evaluation: Evaluation,
    pub rating: Rating,
}

#[derive(Debug, Serialize)]
pub struct PingResponse {
    pub ok: bool,
    pub ts: DateTime<Utc>,
}

/// GET /api/metrics - Canonical metrics for one symbol
pub async fn metrics(
    State(state): State<Arc<AppState>>,
    query: Result<Query<SymbolQuery>, QueryRejection>,
) -> Result<Json<MetricsReport>, ApiError> {
    let symbol = SymbolQuery::required(query)?;

    let report = state.provider.fetch_metrics(&symbol).await.map_err(|e| {
        error!(%symbol, error = %e, "Metrics fetch failed");
        ApiError::provider(state.provider.name(), &e)
    })?;

    Ok(Json(report))
}

/// GET /api/evaluate - Metrics plus role evaluation for one symbol
pub async fn evaluate(
    State(state): State<Arc<AppState>>,
    query: Result<Query<SymbolQuery>, QueryRejection>,
) -> Result<Json<EvaluateResponse>, ApiError> {
    let symbol = SymbolQuery::required(query)?;

    // Independent requests, awaited together
    let (report, rules) = join(state.provider.fetch_metrics(&symbol), state.rules.get()).await;

    let rules = rules.map_err(|e| {
        error!(error = %e, "Rules unavailable");
        ApiError::ConfigUnavailable(format!("{e:#}"))
    })?;
    let report = report.map_err(|e| {
        error!(%symbol, error = %e, "Metrics fetch failed");
        ApiError::provider(state.provider.name(), &e)
    })?;

    let evaluation = evaluate_metrics(&report.metrics, &rules);
    let rating = evaluation.rating();
    debug!(%symbol, role = ?evaluation.role, %rating, "Evaluated");

    Ok(Json(EvaluateResponse {
        report,
        evaluation,
        rating,
    }))
}

/// GET /api/ping - Liveness check
pub async fn ping() -> Json<PingResponse> {
    Json(PingResponse {
        ok: true,
        ts: Utc::now(),
    })
}

/// Any non-GET method on an API route
pub async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}
