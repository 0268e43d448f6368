use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};

use super::alerts::invalid_query;
use super::ApiResponse;
use crate::error::Result;
use crate::server::state::AppState;
use crate::types::{NearbyQuery, NearbyService};

/// GET /api/services/nearby - Support services around a point.
pub async fn nearby(
    State(state): State<AppState>,
    query: std::result::Result<Query<NearbyQuery>, QueryRejection>,
) -> Result<ApiResponse<Vec<NearbyService>>> {
    let Query(query) = query.map_err(invalid_query)?;
    let services = state.proximity.nearby(query).await?;
    Ok(ApiResponse::ok("OK", services))
}
