//! Operator account entity and persistence seam.

pub mod repository;

use anyhow::{anyhow, Error};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Normalize an email for lookup/uniqueness checks.
#[must_use]
pub fn canonicalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Account status. Only `Active` accounts may authenticate with a password.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Active,
    Suspended,
    NotActivated,
    Locked,
}

impl UserStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::NotActivated => "not_activated",
            Self::Locked => "locked",
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserStatus {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "active" => Ok(Self::Active),
            "suspended" => Ok(Self::Suspended),
            "not_activated" => Ok(Self::NotActivated),
            "locked" => Ok(Self::Locked),
            other => Err(anyhow!("invalid user account status: {other}")),
        }
    }
}

/// An operator account as stored by the gateway.
///
/// The password hash is optional: accounts created without a password stay
/// `not_activated` until the one-time password-set flow completes.
#[derive(Clone, Debug)]
pub struct UserAccount {
    pub id: i64,
    pub email: String,
    pub password_hash: Option<String>,
    pub status: UserStatus,
    pub is_admin: bool,
    pub unsuccessful_login_attempts: i32,
    pub one_time_password_set_token: Option<String>,
    pub one_time_password_set_token_generated_at: Option<DateTime<Utc>>,
    pub last_logged_in: Option<DateTime<Utc>>,
    pub created: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
}

impl UserAccount {
    /// Locked for authentication purposes: anything that is not `active`.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.status != UserStatus::Active
    }

    pub fn increment_unsuccessful_login_attempts(&mut self) {
        self.unsuccessful_login_attempts += 1;
    }

    pub fn reset_unsuccessful_login_attempts(&mut self) {
        self.unsuccessful_login_attempts = 0;
    }

    #[must_use]
    pub fn has_exceeded_unsuccessful_login_attempts(&self, limit: u32) -> bool {
        self.unsuccessful_login_attempts >= i32::try_from(limit).unwrap_or(i32::MAX)
    }

    pub fn stamp_last_logged_in(&mut self) {
        self.last_logged_in = Some(Utc::now());
    }

    /// Generate a fresh one-time password-set token.
    ///
    /// The token and its generation timestamp are always set together; the
    /// raw token is returned so it can be embedded in an email link.
    pub fn issue_one_time_password_set_token(&mut self) -> String {
        let mut bytes = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        let token = URL_SAFE_NO_PAD.encode(bytes);

        self.one_time_password_set_token = Some(token.clone());
        self.one_time_password_set_token_generated_at = Some(Utc::now());

        token
    }

    /// Clear the one-time token pair (single use).
    pub fn clear_one_time_password_set_token(&mut self) {
        self.one_time_password_set_token = None;
        self.one_time_password_set_token_generated_at = None;
    }

    /// Check a supplied one-time token against the stored pair and its
    /// expiry window. Missing token or timestamp means no valid token.
    #[must_use]
    pub fn validate_one_time_password_set_token(&self, token: &str, lifetime: Duration) -> bool {
        let (Some(stored), Some(generated_at)) = (
            self.one_time_password_set_token.as_deref(),
            self.one_time_password_set_token_generated_at,
        ) else {
            return false;
        };

        let now = Utc::now();

        token == stored && now >= generated_at && now <= generated_at + lifetime
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(status: UserStatus) -> UserAccount {
        UserAccount {
            id: 1,
            email: "a@example.com".to_string(),
            password_hash: None,
            status,
            is_admin: false,
            unsuccessful_login_attempts: 0,
            one_time_password_set_token: None,
            one_time_password_set_token_generated_at: None,
            last_logged_in: None,
            created: None,
            updated: None,
        }
    }

    #[test]
    fn status_parses_only_known_values() {
        assert_eq!("active".parse::<UserStatus>().ok(), Some(UserStatus::Active));
        assert_eq!(
            "not_activated".parse::<UserStatus>().ok(),
            Some(UserStatus::NotActivated)
        );
        assert!("deleted".parse::<UserStatus>().is_err());
    }

    #[test]
    fn only_active_accounts_are_unlocked() {
        assert!(!account(UserStatus::Active).is_locked());
        assert!(account(UserStatus::Suspended).is_locked());
        assert!(account(UserStatus::NotActivated).is_locked());
        assert!(account(UserStatus::Locked).is_locked());
    }

    #[test]
    fn canonicalize_email_trims_and_lowercases() {
        assert_eq!(canonicalize_email(" A@Example.COM "), "a@example.com");
    }

    #[test]
    fn attempts_threshold_check() {
        let mut account = account(UserStatus::Active);
        account.increment_unsuccessful_login_attempts();
        account.increment_unsuccessful_login_attempts();
        assert!(!account.has_exceeded_unsuccessful_login_attempts(3));
        account.increment_unsuccessful_login_attempts();
        assert!(account.has_exceeded_unsuccessful_login_attempts(3));
        account.reset_unsuccessful_login_attempts();
        assert_eq!(account.unsuccessful_login_attempts, 0);
    }

    #[test]
    fn one_time_token_pair_set_and_cleared_together() {
        let mut account = account(UserStatus::NotActivated);
        let token = account.issue_one_time_password_set_token();
        assert!(account.one_time_password_set_token.is_some());
        assert!(account.one_time_password_set_token_generated_at.is_some());
        assert!(account.validate_one_time_password_set_token(&token, Duration::days(1)));

        account.clear_one_time_password_set_token();
        assert!(account.one_time_password_set_token.is_none());
        assert!(account.one_time_password_set_token_generated_at.is_none());
        assert!(!account.validate_one_time_password_set_token(&token, Duration::days(1)));
    }

    #[test]
    fn expired_one_time_token_is_rejected() {
        let mut account = account(UserStatus::NotActivated);
        let token = account.issue_one_time_password_set_token();
        account.one_time_password_set_token_generated_at = Some(Utc::now() - Duration::days(2));
        assert!(!account.validate_one_time_password_set_token(&token, Duration::days(1)));
    }

    #[test]
    fn wrong_one_time_token_is_rejected() {
        let mut account = account(UserStatus::NotActivated);
        let _token = account.issue_one_time_password_set_token();
        assert!(!account.validate_one_time_password_set_token("other", Duration::days(1)));
    }
}
