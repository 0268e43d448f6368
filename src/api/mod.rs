//! HTTP surface
//!
//! Every response, success or failure, uses the envelope
//! `{success, message, data}`.

pub mod alerts;
pub mod context;
pub mod services;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Serialize;

use crate::error::{failure_response, Result};
use crate::server::state::AppState;

/// Success envelope
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
}

/// Build the API routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/alerts/create", post(alerts::create))
        .route("/api/alerts/record-location", post(alerts::record_location))
        .route("/api/alerts/cancel", put(alerts::cancel))
        .route("/api/alerts/active", get(alerts::list_active))
        .route("/api/alerts/:id", get(alerts::get))
        .route("/api/services/nearby", get(services::nearby))
        .method_not_allowed_fallback(method_not_allowed)
        .fallback(unknown_route)
}

async fn unknown_route() -> Response {
    failure_response(StatusCode::NOT_FOUND, "Route not found")
}

async fn method_not_allowed() -> Response {
    failure_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

/// GET /health - Liveness plus a database round trip.
async fn health(State(state): State<AppState>) -> Result<ApiResponse<Health>> {
    state.store.ping().await?;
    Ok(ApiResponse::ok(
        "OK",
        Health {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
        },
    ))
}
