// ================
// crates/common/src/lib.rs
// ================
//! Common types shared between the `MeetGate` backend and its clients.
//! Defines the booking record, the access-gate decision model, the wire
//! shapes of the HTTP endpoints, and the time-window constants that the
//! gate and the session controller must agree on.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Minutes before the scheduled start during which joining is permitted.
pub const EARLY_TOLERANCE_MINS: i64 = 5;
/// Minutes after the scheduled start during which joining remains permitted.
pub const LATE_EXPIRY_MINS: i64 = 60;
/// Minutes before expiry at which the "ending soon" warning fires.
pub const ENDING_SOON_MINS: i64 = 2;

/// Grace period before the scheduled start.
pub fn early_tolerance() -> Duration {
    Duration::minutes(EARLY_TOLERANCE_MINS)
}

/// Grace period after the scheduled start.
pub fn late_expiry() -> Duration {
    Duration::minutes(LATE_EXPIRY_MINS)
}

/// Warning threshold before the meeting window closes.
pub fn ending_soon_window() -> Duration {
    Duration::minutes(ENDING_SOON_MINS)
}

/// A paid, scheduled session. Created externally at payment confirmation;
/// the gate only ever reads these.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Booking {
    /// Opaque unique identifier.
    pub id: String,
    /// Instant at which the session is meant to begin (UTC).
    pub scheduled_start: DateTime<Utc>,
    /// Opaque string embedded in the shareable join URL; matched by substring.
    pub meeting_link_token: String,
    /// Opaque identifier from the payment provider, usable as a lookup key.
    pub external_payment_ref: String,
}

/// Outcome of an access-gate evaluation.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessOutcome {
    Allowed,
    TooEarly,
    Expired,
    NotFound,
}

/// Ephemeral result of one gate evaluation. Never persisted; re-derived on
/// every poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDecision {
    pub outcome: AccessOutcome,
    /// Scheduled start of the matched booking, for display. `None` only when
    /// the outcome is `NotFound`.
    pub scheduled_start: Option<DateTime<Utc>>,
    /// The matched booking, present only when the outcome is `Allowed`.
    pub booking: Option<Booking>,
}

impl AccessDecision {
    pub fn not_found() -> Self {
        AccessDecision {
            outcome: AccessOutcome::NotFound,
            scheduled_start: None,
            booking: None,
        }
    }

    pub fn too_early(start: DateTime<Utc>) -> Self {
        AccessDecision {
            outcome: AccessOutcome::TooEarly,
            scheduled_start: Some(start),
            booking: None,
        }
    }

    pub fn expired(start: DateTime<Utc>) -> Self {
        AccessDecision {
            outcome: AccessOutcome::Expired,
            scheduled_start: Some(start),
            booking: None,
        }
    }

    pub fn allowed(booking: Booking) -> Self {
        AccessDecision {
            outcome: AccessOutcome::Allowed,
            scheduled_start: Some(booking.scheduled_start),
            booking: Some(booking),
        }
    }
}

/// Booking fields exposed over the access-check endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BookingSummary {
    pub id: String,
    pub time: DateTime<Utc>,
    #[serde(rename = "meetingLink")]
    pub meeting_link: String,
}

/// Wire shape of `GET /api/meeting-access`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AccessCheckResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking: Option<BookingSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(rename = "meetingTime", skip_serializing_if = "Option::is_none")]
    pub meeting_time: Option<DateTime<Utc>>,
}

impl AccessCheckResponse {
    pub fn allowed(booking: &Booking) -> Self {
        AccessCheckResponse {
            ok: true,
            booking: Some(BookingSummary {
                id: booking.id.clone(),
                time: booking.scheduled_start,
                meeting_link: booking.meeting_link_token.clone(),
            }),
            message: None,
            meeting_time: None,
        }
    }

    pub fn too_early(start: DateTime<Utc>) -> Self {
        AccessCheckResponse {
            ok: false,
            booking: None,
            message: Some("meeting not started yet".to_string()),
            meeting_time: Some(start),
        }
    }

    pub fn expired(start: DateTime<Utc>) -> Self {
        AccessCheckResponse {
            ok: false,
            booking: None,
            message: Some("meeting expired".to_string()),
            meeting_time: Some(start),
        }
    }

    pub fn not_found() -> Self {
        AccessCheckResponse {
            ok: false,
            booking: None,
            message: Some("booking not found".to_string()),
            meeting_time: None,
        }
    }

    pub fn internal_error() -> Self {
        AccessCheckResponse {
            ok: false,
            booking: None,
            message: Some("internal error".to_string()),
            meeting_time: None,
        }
    }

    pub fn from_decision(decision: &AccessDecision) -> Self {
        match decision.outcome {
            AccessOutcome::Allowed => {
                // Allowed decisions always carry the booking they matched.
                match &decision.booking {
                    Some(booking) => Self::allowed(booking),
                    None => Self::internal_error(),
                }
            },
            AccessOutcome::TooEarly => match decision.scheduled_start {
                Some(start) => Self::too_early(start),
                None => Self::internal_error(),
            },
            AccessOutcome::Expired => match decision.scheduled_start {
                Some(start) => Self::expired(start),
                None => Self::internal_error(),
            },
            AccessOutcome::NotFound => Self::not_found(),
        }
    }
}

/// Body of `POST /api/meeting-token`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TokenRequest {
    /// Room lookup key (same key the access endpoint accepts).
    pub room: String,
    /// Display name for the participant; a guest label is generated when
    /// absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Response of `POST /api/meeting-token`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TokenResponse {
    pub token: String,
}
