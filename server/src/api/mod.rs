//! HTTP surface of the audit engine.
//!
//! Everything goes through `POST /api/audit`, dispatched on the body's
//! `mode`. Analysis modes and `run-audit` answer with line-delimited JSON
//! frames; the rest answer with plain JSON.

pub mod modes;
pub mod ndjson;

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Text served at `GET /`.
pub const HEALTH_TEXT: &str = "Vantage Audit Server is running";

/// Build the application router.
///
/// Stored screenshots are served under `/screenshots`, matching the default
/// public base URL of the object store.
pub fn router(state: AppState) -> Router {
    let body_limit = state.config.server.body_limit_bytes;
    let screenshots = ServeDir::new(&state.config.storage.objects_dir);

    Router::new()
        .route("/", get(health))
        .route("/api/status", get(status))
        .route("/api/audit", post(audit))
        .nest_service("/screenshots", screenshots)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    HEALTH_TEXT
}

/// Occupancy of the shared pools.
async fn status(State(state): State<AppState>) -> Json<Value> {
    let pool = |p: &vantage_core::BoundedSemaphore| {
        json!({"inUse": p.in_use(), "available": p.available(), "max": p.max()})
    };
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "analysisCalls": pool(state.analysis_pool()),
        "browserSessions": pool(&state.browser_sessions),
    }))
}

async fn audit(State(state): State<AppState>, payload: Result<Json<Value>, JsonRejection>) -> Response {
    match payload {
        Ok(Json(payload)) => modes::dispatch(state, payload).await,
        Err(rejection) => ApiError::BadRequest(rejection.body_text()).into_response(),
    }
}
