use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use super::ApiResponse;
use crate::context::RequestContext;
use crate::error::{BeaconError, Result};
use crate::server::state::AppState;
use crate::types::{
    ActiveAlertSummary, AlertDetails, AlertId, CancelAlert, CancelledAlert, CreateAlert,
    CreatedAlert, LocationReport, RecordedLocation,
};

pub(crate) fn invalid_body(rejection: JsonRejection) -> BeaconError {
    BeaconError::InvalidInput(format!("Invalid request body: {}", rejection.body_text()))
}

pub(crate) fn invalid_query(rejection: QueryRejection) -> BeaconError {
    BeaconError::InvalidInput(format!("Invalid query: {}", rejection.body_text()))
}

#[derive(Debug, Default, Deserialize)]
pub struct ActiveQuery {
    #[serde(default)]
    pub limit: Option<i64>,
}

/// POST /api/alerts/create - Raise an alert.
pub async fn create(
    State(state): State<AppState>,
    ctx: RequestContext,
    body: std::result::Result<Json<CreateAlert>, JsonRejection>,
) -> Result<ApiResponse<CreatedAlert>> {
    let Json(request) = body.map_err(invalid_body)?;
    let created = state.alerts.create(&ctx, request).await?;
    Ok(ApiResponse::ok("Alert created", created))
}

/// POST /api/alerts/record-location - Append a location ping.
pub async fn record_location(
    State(state): State<AppState>,
    ctx: RequestContext,
    body: std::result::Result<Json<LocationReport>, JsonRejection>,
) -> Result<ApiResponse<RecordedLocation>> {
    let Json(report) = body.map_err(invalid_body)?;
    let recorded = state.locations.record(&ctx, report).await?;
    Ok(ApiResponse::ok("Location recorded", recorded))
}

/// PUT /api/alerts/cancel - Cancel an active alert.
pub async fn cancel(
    State(state): State<AppState>,
    ctx: RequestContext,
    body: std::result::Result<Json<CancelAlert>, JsonRejection>,
) -> Result<ApiResponse<CancelledAlert>> {
    let Json(request) = body.map_err(invalid_body)?;
    let cancelled = state.alerts.cancel(&ctx, request).await?;
    Ok(ApiResponse::ok("Alert cancelled", cancelled))
}

/// GET /api/alerts/active - Active alerts, newest first.
pub async fn list_active(
    State(state): State<AppState>,
    query: std::result::Result<Query<ActiveQuery>, QueryRejection>,
) -> Result<ApiResponse<Vec<ActiveAlertSummary>>> {
    let Query(query) = query.map_err(invalid_query)?;
    let alerts = state.alerts.list_active(query.limit).await?;
    Ok(ApiResponse::ok("OK", alerts))
}

/// GET /api/alerts/:id - One alert with its trajectory.
pub async fn get(
    State(state): State<AppState>,
    id: std::result::Result<Path<AlertId>, PathRejection>,
) -> Result<ApiResponse<AlertDetails>> {
    let Path(id) = id.map_err(|e| {
        BeaconError::InvalidInput(format!("Invalid alert id: {}", e.body_text()))
    })?;
    let details = state.alerts.get(id).await?;
    Ok(ApiResponse::ok("OK", details))
}
