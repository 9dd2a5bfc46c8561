//! Identity resolution stage: canonical email lookup plus delegated
//! credential verification.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::verifier;
use super::{AuthAttempt, AuthenticationResult, FailureCode};
use crate::identity::{canonicalize_email, UserAccount};
use crate::identity::repository::UserRepository;

/// Read-through cache scoped to a single request lifecycle.
///
/// Writing an account in and reading it back must yield the same object,
/// not a re-queried one, so mutations made by later stages stay visible
/// within the request.
#[derive(Debug, Default)]
pub struct RequestCache {
    accounts: Mutex<HashMap<String, UserAccount>>,
}

impl RequestCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, email: &str) -> Option<UserAccount> {
        self.accounts.lock().await.get(email).cloned()
    }

    pub async fn put(&self, account: &UserAccount) {
        self.accounts
            .lock()
            .await
            .insert(account.email.clone(), account.clone());
    }
}

/// Resolves a submitted identity to a [`UserAccount`] and delegates the
/// credential check to the verifier.
pub struct IdentityResolutionAdapter {
    repo: Arc<dyn UserRepository>,
    cache: RequestCache,
}

impl IdentityResolutionAdapter {
    #[must_use]
    pub fn new(repo: Arc<dyn UserRepository>) -> Self {
        Self {
            repo,
            cache: RequestCache::new(),
        }
    }

    /// Resolve and verify one attempt.
    ///
    /// Unknown identities fail without an account; a resolved account is
    /// always carried on the result so the lockout stage can act on it.
    pub async fn authenticate(&self, attempt: &AuthAttempt) -> Result<AuthenticationResult> {
        let email = canonicalize_email(&attempt.identity);

        let account = match self.cache.get(&email).await {
            Some(account) => Some(account),
            None => {
                let looked_up = self.repo.find_by_email(&email).await?;
                if let Some(account) = &looked_up {
                    self.cache.put(account).await;
                }
                looked_up
            }
        };

        let Some(mut account) = account else {
            return Ok(AuthenticationResult::Failure {
                code: FailureCode::IdentityNotFound,
                account: None,
            });
        };

        let verified = verifier::verify(&mut account, &attempt.credential)?;
        self.cache.put(&account).await;

        if verified {
            Ok(AuthenticationResult::Success(account))
        } else {
            Ok(AuthenticationResult::Failure {
                code: FailureCode::CredentialInvalid,
                account: Some(account),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::verifier::hash_password;
    use crate::identity::repository::{
        InsertOutcome, MemoryUserRepository, NewUserAccount, UserRepository,
    };
    use crate::identity::UserStatus;

    async fn repo_with_user(email: &str, password: &str) -> Result<Arc<MemoryUserRepository>> {
        let repo = Arc::new(MemoryUserRepository::new());
        let outcome = repo
            .insert(NewUserAccount {
                email: email.to_string(),
                password_hash: Some(hash_password(password)?),
                status: UserStatus::Active,
                is_admin: false,
                one_time_password_set_token: None,
                one_time_password_set_token_generated_at: None,
            })
            .await?;
        assert!(matches!(outcome, InsertOutcome::Created(_)));
        Ok(repo)
    }

    #[tokio::test]
    async fn unknown_identity_fails_without_account() -> Result<()> {
        let repo = Arc::new(MemoryUserRepository::new());
        let adapter = IdentityResolutionAdapter::new(repo);

        let result = adapter
            .authenticate(&AuthAttempt::new("nobody@example.com", "pw"))
            .await?;

        assert!(matches!(
            result,
            AuthenticationResult::Failure {
                code: FailureCode::IdentityNotFound,
                account: None,
            }
        ));

        Ok(())
    }

    #[tokio::test]
    async fn identity_is_canonicalized_before_lookup() -> Result<()> {
        let repo = repo_with_user("a@example.com", "Password1").await?;
        let adapter = IdentityResolutionAdapter::new(repo);

        let result = adapter
            .authenticate(&AuthAttempt::new(" A@Example.COM ", "Password1"))
            .await?;

        assert!(result.is_valid());
        assert_eq!(result.account().map(|a| a.email.as_str()), Some("a@example.com"));

        Ok(())
    }

    #[tokio::test]
    async fn wrong_credential_carries_resolved_account() -> Result<()> {
        let repo = repo_with_user("a@example.com", "Password1").await?;
        let adapter = IdentityResolutionAdapter::new(repo);

        let result = adapter
            .authenticate(&AuthAttempt::new("a@example.com", "wrong"))
            .await?;

        match result {
            AuthenticationResult::Failure { code, account } => {
                assert_eq!(code, FailureCode::CredentialInvalid);
                assert!(account.is_some());
            }
            AuthenticationResult::Success(_) => panic!("expected failure"),
        }

        Ok(())
    }

    #[tokio::test]
    async fn cache_read_after_write_yields_same_object() -> Result<()> {
        let cache = RequestCache::new();
        let repo = repo_with_user("a@example.com", "Password1").await?;
        let mut account = repo
            .find_by_email("a@example.com")
            .await?
            .expect("account exists");
        account.unsuccessful_login_attempts = 7;

        cache.put(&account).await;
        let cached = cache.get("a@example.com").await.expect("cached");

        // The repository still holds the unmutated row; the cache must not.
        assert_eq!(cached.unsuccessful_login_attempts, 7);

        Ok(())
    }
}
