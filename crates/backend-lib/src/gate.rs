// ============================
// crates/backend-lib/src/gate.rs
// ============================
//! The meeting-access gate.
//!
//! Answers "can this participant join now?" without any server-side session
//! state: every call re-derives the decision from the booking store and the
//! supplied clock reading. Both window bounds are inclusive.
use chrono::{DateTime, Utc};
use metrics::counter;
use tracing::debug;
use meetgate_common::{
    early_tolerance, late_expiry, AccessDecision, AccessOutcome,
};
use crate::error::AppError;
use crate::metrics::{GATE_EVALUATION, GATE_STORE_ERROR};
use crate::store::BookingStore;

/// Pure window math: outcome of `(now, scheduled_start)` for a found booking.
pub fn window_outcome(now: DateTime<Utc>, scheduled_start: DateTime<Utc>) -> AccessOutcome {
    if now < scheduled_start - early_tolerance() {
        AccessOutcome::TooEarly
    } else if now > scheduled_start + late_expiry() {
        AccessOutcome::Expired
    } else {
        AccessOutcome::Allowed
    }
}

fn outcome_label(outcome: AccessOutcome) -> &'static str {
    match outcome {
        AccessOutcome::Allowed => "allowed",
        AccessOutcome::TooEarly => "too_early",
        AccessOutcome::Expired => "expired",
        AccessOutcome::NotFound => "not_found",
    }
}

/// Stateless decision function over a booking store.
#[derive(Clone)]
pub struct AccessGate<S> {
    store: S,
}

impl<S: BookingStore> AccessGate<S> {
    pub fn new(store: S) -> Self {
        AccessGate { store }
    }

    /// Evaluate whether the booking matched by `lookup_key` may be joined at
    /// `now`. An empty key is a caller error, not a gate decision. A store
    /// failure propagates as an infrastructure fault, distinct from
    /// `NotFound`.
    pub async fn evaluate(
        &self,
        lookup_key: &str,
        now: DateTime<Utc>,
    ) -> Result<AccessDecision, AppError> {
        if lookup_key.trim().is_empty() {
            return Err(AppError::MissingLookupKey);
        }

        let booking = match self.store.find_booking(lookup_key).await {
            Ok(found) => found,
            Err(err) => {
                counter!(GATE_STORE_ERROR).increment(1);
                return Err(err);
            },
        };

        let decision = match booking {
            None => AccessDecision::not_found(),
            Some(booking) => match window_outcome(now, booking.scheduled_start) {
                AccessOutcome::TooEarly => AccessDecision::too_early(booking.scheduled_start),
                AccessOutcome::Expired => AccessDecision::expired(booking.scheduled_start),
                // window_outcome never yields NotFound
                _ => AccessDecision::allowed(booking),
            },
        };

        counter!(GATE_EVALUATION, "outcome" => outcome_label(decision.outcome)).increment(1);
        debug!(%lookup_key, outcome = outcome_label(decision.outcome), "gate evaluated");
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use meetgate_common::Booking;
    use crate::store::MemoryBookingStore;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 15, 0, 0).unwrap()
    }

    fn booking() -> Booking {
        Booking {
            id: "bk-1".to_string(),
            scheduled_start: start(),
            meeting_link_token: "link-aaa-111".to_string(),
            external_payment_ref: "cs_pay_1".to_string(),
        }
    }

    async fn gate_with_booking() -> AccessGate<MemoryBookingStore> {
        let store = MemoryBookingStore::new();
        store.put_booking(booking()).await.unwrap();
        AccessGate::new(store)
    }

    #[test]
    fn test_window_outcome_ranges() {
        let t = start();
        assert_eq!(
            window_outcome(t - Duration::minutes(10), t),
            AccessOutcome::TooEarly
        );
        assert_eq!(window_outcome(t, t), AccessOutcome::Allowed);
        assert_eq!(
            window_outcome(t + Duration::minutes(30), t),
            AccessOutcome::Allowed
        );
        assert_eq!(
            window_outcome(t + Duration::minutes(61), t),
            AccessOutcome::Expired
        );
    }

    #[test]
    fn test_window_bounds_inclusive() {
        let t = start();
        // Exactly at the open of the early-tolerance window: allowed.
        assert_eq!(
            window_outcome(t - Duration::minutes(5), t),
            AccessOutcome::Allowed
        );
        // One millisecond before it: still too early.
        assert_eq!(
            window_outcome(t - Duration::minutes(5) - Duration::milliseconds(1), t),
            AccessOutcome::TooEarly
        );
        // Exactly at the expiry bound: allowed.
        assert_eq!(
            window_outcome(t + Duration::minutes(60), t),
            AccessOutcome::Allowed
        );
        // One millisecond past it: expired.
        assert_eq!(
            window_outcome(t + Duration::minutes(60) + Duration::milliseconds(1), t),
            AccessOutcome::Expired
        );
    }

    #[tokio::test]
    async fn test_evaluate_is_idempotent() {
        let gate = gate_with_booking().await;
        let now = start() + Duration::minutes(10);
        let first = gate.evaluate("bk-1", now).await.unwrap();
        for _ in 0..5 {
            assert_eq!(gate.evaluate("bk-1", now).await.unwrap(), first);
        }
    }

    #[tokio::test]
    async fn test_evaluate_outcomes() {
        let gate = gate_with_booking().await;
        let t = start();

        let decision = gate.evaluate("bk-1", t - Duration::minutes(10)).await.unwrap();
        assert_eq!(decision.outcome, AccessOutcome::TooEarly);
        assert_eq!(decision.scheduled_start, Some(t));
        assert!(decision.booking.is_none());

        let decision = gate.evaluate("bk-1", t + Duration::minutes(61)).await.unwrap();
        assert_eq!(decision.outcome, AccessOutcome::Expired);
        assert_eq!(decision.scheduled_start, Some(t));

        let decision = gate.evaluate("bk-1", t).await.unwrap();
        assert_eq!(decision.outcome, AccessOutcome::Allowed);
        assert_eq!(decision.booking.as_ref().map(|b| b.id.as_str()), Some("bk-1"));

        let decision = gate.evaluate("no-such-key", t).await.unwrap();
        assert_eq!(decision.outcome, AccessOutcome::NotFound);
        assert_eq!(decision.scheduled_start, None);
    }

    #[tokio::test]
    async fn test_empty_lookup_key_is_caller_error() {
        let gate = gate_with_booking().await;
        let err = gate.evaluate("", start()).await.unwrap_err();
        assert!(matches!(err, AppError::MissingLookupKey));
        let err = gate.evaluate("   ", start()).await.unwrap_err();
        assert!(matches!(err, AppError::MissingLookupKey));
    }

    struct FailingStore;

    #[async_trait]
    impl BookingStore for FailingStore {
        async fn find_booking(&self, _lookup_key: &str) -> Result<Option<Booking>, AppError> {
            Err(AppError::Internal("store unreachable".to_string()))
        }

        async fn put_booking(&self, _booking: Booking) -> Result<(), AppError> {
            Err(AppError::Internal("store unreachable".to_string()))
        }

        async fn list_bookings(&self) -> Result<Vec<Booking>, AppError> {
            Err(AppError::Internal("store unreachable".to_string()))
        }
    }

    #[tokio::test]
    async fn test_store_failure_is_not_a_denial() {
        let gate = AccessGate::new(FailingStore);
        let err = gate.evaluate("bk-1", start()).await.unwrap_err();
        assert!(err.is_infrastructure());
    }
}
