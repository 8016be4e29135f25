//! Confirmation codes for the email login flow.
//!
//! A code is `<issued_at as hex>-<truncated HMAC-SHA256>`. The MAC covers the user's
//! id, username, email and per-user `confirmation_secret` plus the issue time, so no
//! code needs to be stored: verification recomputes it. Rotating the user's secret
//! (done after a successful token exchange) revokes every outstanding code.

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use crate::models::User;

type HmacSha256 = Hmac<Sha256>;

/// Bytes of the MAC kept in the code (20 hex characters).
const TAG_BYTES: usize = 10;

/// Tolerated clock skew for codes stamped slightly in the future.
const MAX_FUTURE_SKEW_SECS: i64 = 60;

/// ConfirmationCodes
///
/// Issues and verifies confirmation codes with a server-side key and a fixed lifetime.
#[derive(Clone)]
pub struct ConfirmationCodes {
    secret: Vec<u8>,
    ttl: Duration,
}

impl std::fmt::Debug for ConfirmationCodes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfirmationCodes")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl ConfirmationCodes {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            ttl,
        }
    }

    /// A fresh per-user salt, stored on the user record.
    pub fn new_user_secret() -> String {
        Uuid::new_v4().simple().to_string()
    }

    pub fn issue(&self, user: &User) -> String {
        self.issue_at(user, Utc::now())
    }

    pub fn issue_at(&self, user: &User, now: DateTime<Utc>) -> String {
        let issued_at = now.timestamp();
        let tag = self.mac(user, issued_at).finalize().into_bytes();
        format!("{issued_at:x}-{}", hex::encode(&tag[..TAG_BYTES]))
    }

    pub fn verify(&self, user: &User, code: &str) -> bool {
        self.verify_at(user, code, Utc::now())
    }

    /// Checks shape, age and MAC. The MAC comparison is constant-time.
    pub fn verify_at(&self, user: &User, code: &str, now: DateTime<Utc>) -> bool {
        let Some((stamp, tag_hex)) = code.trim().split_once('-') else {
            return false;
        };
        let Ok(issued_at) = i64::from_str_radix(stamp, 16) else {
            return false;
        };
        let age = now.timestamp() - issued_at;
        if age > self.ttl.num_seconds() || age < -MAX_FUTURE_SKEW_SECS {
            return false;
        }
        let Ok(tag) = hex::decode(tag_hex) else {
            return false;
        };
        if tag.len() != TAG_BYTES {
            return false;
        }
        self.mac(user, issued_at).verify_truncated_left(&tag).is_ok()
    }

    fn mac(&self, user: &User, issued_at: i64) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size");
        // Length-prefix the variable fields so "ab"+"c" never collides with "a"+"bc".
        mac.update(user.id.as_bytes());
        for field in [&user.username, &user.email, &user.confirmation_secret] {
            mac.update(&(field.len() as u64).to_be_bytes());
            mac.update(field.as_bytes());
        }
        mac.update(&issued_at.to_be_bytes());
        mac
    }
}
