// ============================
// crates/backend-lib/src/router.rs
// ============================
//! HTTP router for the access-check and token endpoints.
use std::sync::Arc;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::error;
use meetgate_common::{AccessCheckResponse, TokenRequest, TokenResponse};
use crate::error::AppError;
use crate::middleware::rate_limit;
use crate::store::BookingStore;
use crate::token::{guest_identity, issue_checked};
use crate::AppState;

/// Create the API router
pub fn create_router<S: BookingStore + Clone + Send + Sync + 'static>(
    state: Arc<AppState<S>>,
) -> Router {
    Router::new()
        .route("/api/meeting-access", get(access_handler::<S>))
        .route("/api/meeting-token", post(token_handler::<S>))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::<S>,
        ))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Deserialize)]
struct AccessQuery {
    room: Option<String>,
}

/// `GET /api/meeting-access?room=<key>` — re-derive the gate decision for
/// this instant. Business outcomes are 200 with an `ok` flag; only
/// infrastructure faults are 500, with the same generic body either way.
async fn access_handler<S: BookingStore + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<AccessQuery>,
) -> Response {
    let room = params.room.unwrap_or_default();
    if room.trim().is_empty() {
        return AppError::MissingLookupKey.into_response();
    }

    match state.gate.evaluate(&room, Utc::now()).await {
        Ok(decision) => Json(AccessCheckResponse::from_decision(&decision)).into_response(),
        Err(AppError::MissingLookupKey) => AppError::MissingLookupKey.into_response(),
        Err(err) => {
            error!(code = err.error_code(), %err, "access check failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(AccessCheckResponse::internal_error()),
            )
                .into_response()
        },
    }
}

/// `POST /api/meeting-token` — mint a room credential after a fresh ALLOWED
/// decision. A missing display name gets a generated guest label.
async fn token_handler<S: BookingStore + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<TokenRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let identity = match req.name.as_deref() {
        Some(name) if !name.trim().is_empty() => name.trim().to_string(),
        _ => guest_identity(),
    };

    let token = issue_checked(&state.gate, &state.issuer, &req.room, &identity, Utc::now()).await?;
    Ok(Json(TokenResponse { token }))
}

async fn health_handler() -> StatusCode {
    StatusCode::OK
}
