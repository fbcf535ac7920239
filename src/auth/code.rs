//! One-time email codes for account verification and password reset.
//!
//! Codes are 6-digit numerics, stored only as a keyed HMAC-SHA256 hex digest
//! next to an issue timestamp. A code is valid for a bounded window after
//! issuance and is cleared on first successful use.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodeError {
    #[error("No code is pending; request a new one")]
    NotPending,

    #[error("Code has expired; request a new one")]
    Expired,

    #[error("Code does not match")]
    Mismatch,
}

#[derive(Clone)]
pub struct OneTimeCodes {
    secret: String,
    ttl_minutes: i64,
}

impl OneTimeCodes {
    #[must_use]
    pub fn new(secret: &str, ttl_minutes: i64) -> Self {
        Self {
            secret: secret.to_string(),
            ttl_minutes,
        }
    }

    /// Generates a fresh 6-digit code.
    #[must_use]
    pub fn generate(&self) -> String {
        let mut rng = rand::rng();
        format!("{:06}", rng.random_range(100_000..1_000_000))
    }

    /// Keyed digest of a code, the only form ever persisted.
    #[must_use]
    pub fn digest(&self, code: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(code.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Checks a submitted code against the stored digest and issue timestamp.
    pub fn check(
        &self,
        stored_digest: Option<&str>,
        sent_at: Option<&str>,
        submitted: &str,
    ) -> Result<(), CodeError> {
        self.check_at(stored_digest, sent_at, submitted, Utc::now())
    }

    fn check_at(
        &self,
        stored_digest: Option<&str>,
        sent_at: Option<&str>,
        submitted: &str,
        now: DateTime<Utc>,
    ) -> Result<(), CodeError> {
        let (stored, sent_at) = match (stored_digest, sent_at) {
            (Some(digest), Some(sent_at)) => (digest, sent_at),
            _ => return Err(CodeError::NotPending),
        };

        let issued = DateTime::parse_from_rfc3339(sent_at)
            .map_err(|_| CodeError::NotPending)?
            .with_timezone(&Utc);

        if now.signed_duration_since(issued) > chrono::Duration::minutes(self.ttl_minutes) {
            return Err(CodeError::Expired);
        }

        if self.digest(submitted) != stored {
            return Err(CodeError::Mismatch);
        }

        Ok(())
    }
}
