// ============================
// meetgate-backend-lib/src/lib.rs
// ============================
//! Core backend-lib functionality for the `MeetGate` booking/video-session
//! server: the meeting-access gate, the room-credential issuer, and the
//! session controller that drives a meeting-page visit through its
//! lifecycle.

pub mod config;
pub mod error;
pub mod gate;
pub mod metrics;
pub mod middleware;
pub mod router;
pub mod session;
pub mod store;
pub mod token;

use std::sync::Arc;
use dashmap::DashMap;
use tracing::warn;
use crate::config::Settings;
use crate::error::AppError;
use crate::gate::AccessGate;
use crate::middleware::RateLimitEntry;
use crate::store::BookingStore;
use crate::token::TokenIssuer;

/// Application state shared across all handlers
pub struct AppState<S> {
    /// Access gate over the booking store
    pub gate: AccessGate<S>,
    /// Room-credential issuer
    pub issuer: Arc<TokenIssuer>,
    /// Settings manager
    pub settings: Arc<Settings>,
    /// Per-client rate-limit windows
    pub rate_limits: Arc<DashMap<String, RateLimitEntry>>,
}

impl<S: Clone> Clone for AppState<S> {
    fn clone(&self) -> Self {
        AppState {
            gate: self.gate.clone(),
            issuer: Arc::clone(&self.issuer),
            settings: Arc::clone(&self.settings),
            rate_limits: Arc::clone(&self.rate_limits),
        }
    }
}

impl<S: BookingStore + Clone> AppState<S> {
    /// Create a new application state
    pub fn new(store: S, settings: Settings) -> Result<Self, AppError> {
        let issuer = match settings.token_key.as_deref() {
            Some(key) => TokenIssuer::from_base64_key(key)?,
            None => {
                warn!("no token_key configured; using an ephemeral signing key");
                TokenIssuer::ephemeral()
            },
        };

        Ok(Self {
            gate: AccessGate::new(store),
            issuer: Arc::new(issuer),
            settings: Arc::new(settings),
            rate_limits: Arc::new(DashMap::new()),
        })
    }
}
