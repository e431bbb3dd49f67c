// ============================
// crates/backend-lib/src/middleware/rate_limit.rs
// ============================
//! Per-IP fixed-window rate limiting for the API routes.
use std::sync::Arc;
use std::time::{Duration, Instant};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use metrics::counter;
use tracing::warn;
use crate::error::AppError;
use crate::metrics::HTTP_RATE_LIMITED;
use crate::store::BookingStore;
use crate::AppState;

/// Rate limit entry for a client
#[derive(Debug)]
pub struct RateLimitEntry {
    requests: u32,
    window_start: Instant,
}

/// Rate limiter middleware
pub async fn rate_limit<S: BookingStore + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<S>>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    // Get client IP
    let client_ip = request
        .headers()
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let max_requests = state.settings.rate_limit.max_requests;
    let window = Duration::from_secs(state.settings.rate_limit.window_secs);

    let mut entry = state
        .rate_limits
        .entry(client_ip.clone())
        .or_insert_with(|| RateLimitEntry {
            requests: 0,
            window_start: Instant::now(),
        });

    // Check if window has expired
    if entry.window_start.elapsed() > window {
        entry.requests = 0;
        entry.window_start = Instant::now();
    }

    if entry.requests >= max_requests {
        drop(entry);
        counter!(HTTP_RATE_LIMITED).increment(1);
        warn!(%client_ip, "rate limit exceeded");
        return Err(AppError::RateLimitExceeded);
    }

    entry.requests += 1;
    drop(entry);

    Ok(next.run(request).await)
}
