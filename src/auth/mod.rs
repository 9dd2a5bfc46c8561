//! Authentication decision pipeline.
//!
//! The pipeline is an ordered chain of stages, each contributing one
//! concern: identity resolution ([`resolve`]), credential verification
//! ([`verifier`]) and lockout enforcement ([`lockout`]). Results flow
//! through as an [`AuthenticationResult`] sum type rather than sentinel
//! codes; only the lockout stage produces [`FailureCode::AccountLocked`].

pub mod context;
pub mod lockout;
pub mod resolve;
pub mod verifier;

use crate::identity::UserAccount;

/// Why an authentication attempt failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureCode {
    IdentityNotFound,
    CredentialInvalid,
    AccountLocked,
}

impl FailureCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::IdentityNotFound => "identity not found",
            Self::CredentialInvalid => "credential invalid",
            Self::AccountLocked => "account locked",
        }
    }
}

/// Outcome of one pass through the adapter chain.
///
/// Failures carry the resolved account when resolution succeeded, so the
/// lockout stage (and callers) can act on it; accounts returned here may
/// have been mutated (attempt counter, rehash, lock transition) and must be
/// persisted by the caller before the response is returned.
#[derive(Debug)]
pub enum AuthenticationResult {
    Success(UserAccount),
    Failure {
        code: FailureCode,
        account: Option<UserAccount>,
    },
}

impl AuthenticationResult {
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// The resolved account, if resolution got that far.
    #[must_use]
    pub const fn account(&self) -> Option<&UserAccount> {
        match self {
            Self::Success(account) => Some(account),
            Self::Failure { account, .. } => account.as_ref(),
        }
    }
}

/// Buffered identity/credential pair consumed by the chain.
#[derive(Clone, Debug)]
pub struct AuthAttempt {
    pub identity: String,
    pub credential: String,
}

impl AuthAttempt {
    #[must_use]
    pub fn new(identity: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            credential: credential.into(),
        }
    }
}
