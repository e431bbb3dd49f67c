// ============================
// crates/backend-lib/src/token.rs
// ============================
//! Video-room credential issuing.
//!
//! A credential is a sealed grant: the grant struct serialized to JSON,
//! encrypted with AES-256-GCM under the configured signing key, and encoded
//! base64-url with the nonce prefixed. Issuing requires a prior ALLOWED gate
//! decision; `issue_checked` bundles the two steps.
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;
use meetgate_common::{late_expiry, AccessOutcome};
use crate::error::AppError;
use crate::gate::AccessGate;
use crate::metrics::{TOKEN_ISSUED, TOKEN_REFUSED};
use crate::store::BookingStore;

/// AES-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;
/// Key length for AES-256.
const KEY_LEN: usize = 32;
/// Floor on credential lifetime, so a join at the very end of the window
/// still yields a usable token.
const MIN_TTL_MINS: i64 = 1;

/// The grant carried inside a sealed credential.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RoomCredential {
    pub room: String,
    pub identity: String,
    pub can_publish: bool,
    pub can_subscribe: bool,
    pub expires_at: DateTime<Utc>,
}

/// Mints and verifies sealed room credentials.
pub struct TokenIssuer {
    cipher: Aes256Gcm,
}

impl TokenIssuer {
    /// Build an issuer from a base64-url encoded 32-byte key.
    pub fn from_base64_key(key_b64: &str) -> Result<Self, AppError> {
        let key = URL_SAFE_NO_PAD.decode(key_b64.trim()).map_err(|_| {
            AppError::TokenIssuerMisconfigured("signing key is not valid base64".to_string())
        })?;
        if key.len() != KEY_LEN {
            return Err(AppError::TokenIssuerMisconfigured(format!(
                "signing key must be {KEY_LEN} bytes, got {}",
                key.len()
            )));
        }
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|_| AppError::TokenIssuerMisconfigured("invalid signing key".to_string()))?;
        Ok(TokenIssuer { cipher })
    }

    /// Build an issuer with a random key. Tokens do not survive a restart;
    /// intended for development setups without a configured key.
    pub fn ephemeral() -> Self {
        let key = Aes256Gcm::generate_key(&mut OsRng);
        TokenIssuer {
            cipher: Aes256Gcm::new(&key),
        }
    }

    /// Seal a grant for `room`/`identity`, valid until `expires_at`.
    pub fn issue(
        &self,
        room: &str,
        identity: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<String, AppError> {
        let grant = RoomCredential {
            room: room.to_string(),
            identity: identity.to_string(),
            can_publish: true,
            can_subscribe: true,
            expires_at,
        };

        let plaintext = serde_json::to_vec(&grant)?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_ref())
            .map_err(|_| AppError::Internal("credential encryption failed".to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(nonce.as_slice());
        sealed.extend_from_slice(&ciphertext);

        counter!(TOKEN_ISSUED).increment(1);
        Ok(URL_SAFE_NO_PAD.encode(sealed))
    }

    /// Unseal a credential and reject it if expired at `now`.
    pub fn open(&self, token: &str, now: DateTime<Utc>) -> Result<RoomCredential, AppError> {
        let sealed = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| AppError::InvalidCredential)?;
        if sealed.len() <= NONCE_LEN {
            return Err(AppError::InvalidCredential);
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| AppError::InvalidCredential)?;
        let grant: RoomCredential =
            serde_json::from_slice(&plaintext).map_err(|_| AppError::InvalidCredential)?;

        if now > grant.expires_at {
            return Err(AppError::InvalidCredential);
        }
        Ok(grant)
    }
}

/// Randomized guest label for participants who do not supply a name.
pub fn guest_identity() -> String {
    let suffix: u16 = rand::thread_rng().gen();
    format!("guest-{suffix:04x}")
}

/// Evaluate the gate and, only on an ALLOWED decision, mint a credential
/// scoped to the matched room. Denials map to their gate errors so the
/// endpoint surfaces the right status.
pub async fn issue_checked<S: BookingStore>(
    gate: &AccessGate<S>,
    issuer: &Arc<TokenIssuer>,
    room_key: &str,
    identity: &str,
    now: DateTime<Utc>,
) -> Result<String, AppError> {
    let decision = gate.evaluate(room_key, now).await?;
    match decision.outcome {
        AccessOutcome::Allowed => {
            let start = decision
                .scheduled_start
                .ok_or_else(|| AppError::Internal("allowed decision without start".to_string()))?;
            let window_end = start + late_expiry();
            let expires_at = window_end.max(now + Duration::minutes(MIN_TTL_MINS));
            issuer.issue(room_key, identity, expires_at)
        },
        AccessOutcome::TooEarly => {
            counter!(TOKEN_REFUSED, "reason" => "too_early").increment(1);
            Err(AppError::MeetingNotStarted)
        },
        AccessOutcome::Expired => {
            counter!(TOKEN_REFUSED, "reason" => "expired").increment(1);
            Err(AppError::MeetingExpired)
        },
        AccessOutcome::NotFound => {
            counter!(TOKEN_REFUSED, "reason" => "not_found").increment(1);
            warn!(%room_key, "token requested for unknown booking");
            Err(AppError::BookingNotFound)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use meetgate_common::Booking;
    use crate::store::MemoryBookingStore;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 15, 0, 0).unwrap()
    }

    #[test]
    fn test_issue_and_open_round_trip() {
        let issuer = TokenIssuer::ephemeral();
        let token = issuer
            .issue("room-1", "guest-abcd", now() + Duration::minutes(60))
            .unwrap();

        let grant = issuer.open(&token, now()).unwrap();
        assert_eq!(grant.room, "room-1");
        assert_eq!(grant.identity, "guest-abcd");
        assert!(grant.can_publish);
        assert!(grant.can_subscribe);
    }

    #[test]
    fn test_expired_grant_rejected() {
        let issuer = TokenIssuer::ephemeral();
        let token = issuer
            .issue("room-1", "guest-abcd", now() - Duration::minutes(1))
            .unwrap();
        let err = issuer.open(&token, now()).unwrap_err();
        assert!(matches!(err, AppError::InvalidCredential));
    }

    #[test]
    fn test_foreign_or_garbled_token_rejected() {
        let issuer = TokenIssuer::ephemeral();
        let other = TokenIssuer::ephemeral();
        let token = issuer
            .issue("room-1", "guest-abcd", now() + Duration::minutes(60))
            .unwrap();

        assert!(other.open(&token, now()).is_err());
        assert!(issuer.open("not-a-token", now()).is_err());
        assert!(issuer.open("", now()).is_err());
    }

    #[test]
    fn test_misconfigured_key() {
        assert!(matches!(
            TokenIssuer::from_base64_key("%%%"),
            Err(AppError::TokenIssuerMisconfigured(_))
        ));
        // Valid base64 but wrong length.
        let short = URL_SAFE_NO_PAD.encode([0u8; 16]);
        assert!(matches!(
            TokenIssuer::from_base64_key(&short),
            Err(AppError::TokenIssuerMisconfigured(_))
        ));
        let ok = URL_SAFE_NO_PAD.encode([7u8; 32]);
        assert!(TokenIssuer::from_base64_key(&ok).is_ok());
    }

    #[test]
    fn test_guest_identity_shape() {
        let name = guest_identity();
        assert!(name.starts_with("guest-"));
        assert_eq!(name.len(), "guest-".len() + 4);
    }

    #[tokio::test]
    async fn test_issue_checked_requires_allowed() {
        let store = MemoryBookingStore::new();
        store
            .put_booking(Booking {
                id: "bk-1".to_string(),
                scheduled_start: now(),
                meeting_link_token: "link-aaa".to_string(),
                external_payment_ref: "cs_pay_1".to_string(),
            })
            .await
            .unwrap();
        let gate = AccessGate::new(store);
        let issuer = Arc::new(TokenIssuer::ephemeral());

        // Inside the window: a credential scoped until window end.
        let token = issue_checked(&gate, &issuer, "bk-1", "guest-1", now())
            .await
            .unwrap();
        let grant = issuer.open(&token, now()).unwrap();
        assert_eq!(grant.expires_at, now() + late_expiry());

        // Too early / expired / unknown all refuse.
        let err = issue_checked(&gate, &issuer, "bk-1", "g", now() - Duration::minutes(10))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::MeetingNotStarted));

        let err = issue_checked(&gate, &issuer, "bk-1", "g", now() + Duration::minutes(61))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::MeetingExpired));

        let err = issue_checked(&gate, &issuer, "missing", "g", now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BookingNotFound));
    }
}
