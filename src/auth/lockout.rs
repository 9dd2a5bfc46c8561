//! Lockout stage: failed-attempt counting and automatic account locking.

use anyhow::Result;

use super::resolve::IdentityResolutionAdapter;
use super::{AuthAttempt, AuthenticationResult, FailureCode};
use crate::audit::SecurityAuditLog;
use crate::identity::UserStatus;

/// Wraps the resolution adapter and enforces the unsuccessful-attempt
/// threshold. Must wrap, not precede, resolution: the lockout check needs
/// the resolved account.
pub struct LockoutAdapter {
    wrapped: IdentityResolutionAdapter,
    max_login_attempts: u32,
    audit: SecurityAuditLog,
}

impl LockoutAdapter {
    #[must_use]
    pub fn new(
        wrapped: IdentityResolutionAdapter,
        max_login_attempts: u32,
        audit: SecurityAuditLog,
    ) -> Self {
        Self {
            wrapped,
            max_login_attempts,
            audit,
        }
    }

    /// Run the chain and apply lockout policy to the outcome.
    ///
    /// A locked/suspended/not-activated account never authenticates, even
    /// with the correct password. On other failures the attempt counter is
    /// incremented; crossing the threshold transitions the account to
    /// `locked` and overrides the failure code. Mutated accounts ride on
    /// the returned result for the caller to persist.
    pub async fn authenticate(&self, attempt: &AuthAttempt) -> Result<AuthenticationResult> {
        let result = self.wrapped.authenticate(attempt).await?;

        Ok(match result {
            AuthenticationResult::Success(account) if account.is_locked() => {
                AuthenticationResult::Failure {
                    code: FailureCode::AccountLocked,
                    account: Some(account),
                }
            }
            AuthenticationResult::Success(account) => AuthenticationResult::Success(account),
            AuthenticationResult::Failure {
                code,
                account: Some(mut account),
            } => {
                if account.is_locked() {
                    return Ok(AuthenticationResult::Failure {
                        code: FailureCode::AccountLocked,
                        account: Some(account),
                    });
                }

                account.increment_unsuccessful_login_attempts();

                let code = if account.has_exceeded_unsuccessful_login_attempts(self.max_login_attempts)
                {
                    account.status = UserStatus::Locked;
                    self.audit.user_automatically_locked(account.id);
                    FailureCode::AccountLocked
                } else {
                    code
                };

                AuthenticationResult::Failure {
                    code,
                    account: Some(account),
                }
            }
            failure @ AuthenticationResult::Failure { account: None, .. } => failure,
        })
    }
}
