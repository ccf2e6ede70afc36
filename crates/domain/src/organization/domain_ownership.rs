use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use sentinel_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Label prepended to the domain for the DNS TXT challenge record.
pub const DOMAIN_CHALLENGE_LABEL: &str = "_sentinelshield";

/// How an organization proves control of its domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMethod {
    /// TXT record under [`DOMAIN_CHALLENGE_LABEL`].
    Dns,
    /// Token sent to an administrator mailbox on the domain.
    Email,
}

impl VerificationMethod {
    /// Returns the stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dns => "dns",
            Self::Email => "email",
        }
    }

    /// Returns how long an issued token stays valid.
    #[must_use]
    pub fn token_validity(&self) -> Duration {
        match self {
            Self::Dns => Duration::hours(48),
            Self::Email => Duration::hours(24),
        }
    }
}

impl FromStr for VerificationMethod {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "dns" => Ok(Self::Dns),
            "email" => Ok(Self::Email),
            _ => Err(AppError::Validation(format!(
                "unknown verification method '{value}'"
            ))),
        }
    }
}

/// Outstanding domain ownership challenge. Only the token hash is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDomainVerification {
    /// Challenge method.
    pub method: VerificationMethod,
    /// SHA-256 hex digest of the issued token.
    pub token_hash: String,
    /// Issue time.
    pub requested_at: DateTime<Utc>,
    /// Expiry time.
    pub expires_at: DateTime<Utc>,
}

impl PendingDomainVerification {
    /// Builds a challenge for a freshly generated token.
    #[must_use]
    pub fn issue(method: VerificationMethod, raw_token: &str, now: DateTime<Utc>) -> Self {
        Self {
            method,
            token_hash: hash_verification_token(raw_token),
            requested_at: now,
            expires_at: now + method.token_validity(),
        }
    }

    /// Returns whether `raw_token` answers this challenge at `now`.
    #[must_use]
    pub fn accepts(&self, raw_token: &str, now: DateTime<Utc>) -> bool {
        now < self.expires_at && hash_verification_token(raw_token.trim()) == self.token_hash
    }
}

/// Hashes a domain verification token for storage and comparison.
#[must_use]
pub fn hash_verification_token(raw_token: &str) -> String {
    hex::encode(Sha256::digest(raw_token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{PendingDomainVerification, VerificationMethod};

    #[test]
    fn tokens_expire_per_method() {
        let now = Utc::now();
        let dns = PendingDomainVerification::issue(VerificationMethod::Dns, "token", now);
        let email = PendingDomainVerification::issue(VerificationMethod::Email, "token", now);

        assert!(dns.accepts("token", now + Duration::hours(47)));
        assert!(!dns.accepts("token", now + Duration::hours(48)));
        assert!(email.accepts(" token ", now + Duration::hours(23)));
        assert!(!email.accepts("token", now + Duration::hours(25)));
    }

    #[test]
    fn only_the_issued_token_is_accepted() {
        let now = Utc::now();
        let pending = PendingDomainVerification::issue(VerificationMethod::Dns, "token", now);

        assert_ne!(pending.token_hash, "token");
        assert!(!pending.accepts("other", now));
    }
}
