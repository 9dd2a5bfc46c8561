//! Session lifecycle orchestration: login, logout and preauthorized
//! session issuance as one unit of work.

use anyhow::Result;

use super::SessionContext;
use crate::auth::context::{AuthenticationContext, AuthenticationService};
use crate::auth::{AuthAttempt, AuthenticationResult, FailureCode};
use crate::identity::repository::UserRepository;
use crate::identity::{canonicalize_email, UserStatus};
use crate::token::TokenSigner;
use std::sync::Arc;

/// Outcome of a login attempt, ready for the REST boundary to render.
#[derive(Debug)]
pub enum OpenSessionOutcome {
    Opened {
        email: String,
        user_id: i64,
        session_id: String,
        jwt: Option<String>,
    },
    Locked {
        user_id: i64,
    },
    /// Any other failure; the code is kept for internal logging only and
    /// never leaks to the client.
    Invalid {
        code: FailureCode,
        user_id: Option<i64>,
    },
}

#[derive(Debug)]
pub enum PreauthorizedOutcome {
    Opened {
        email: String,
        user_id: i64,
        session_id: String,
    },
    Refused {
        status: UserStatus,
    },
    NoIdentity,
}

#[derive(Debug)]
pub enum CloseSessionOutcome {
    Closed,
    NotLoggedIn,
    Mismatch { current: String, supplied: String },
}

impl CloseSessionOutcome {
    /// Client-facing error message, when the close was refused.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        match self {
            Self::Closed => None,
            Self::NotLoggedIn => Some("User is not logged in".to_string()),
            Self::Mismatch { current, supplied } => Some(format!(
                "User session id ('{current}') does not match the given session id ('{supplied}')"
            )),
        }
    }
}

/// Drives the adapter chain and the session/token stores for one request.
pub struct SessionLifecycleService {
    auth: AuthenticationContext,
    session: SessionContext,
    users: Arc<dyn UserRepository>,
    signer: TokenSigner,
    jwt_expiry_seconds: i64,
}

impl SessionLifecycleService {
    #[must_use]
    pub fn new(
        auth: AuthenticationContext,
        session: SessionContext,
        users: Arc<dyn UserRepository>,
        signer: TokenSigner,
        jwt_expiry_seconds: i64,
    ) -> Self {
        Self {
            auth,
            session,
            users,
            signer,
            jwt_expiry_seconds,
        }
    }

    /// Authenticate and open a fresh session.
    ///
    /// The account is persisted on every branch so attempt-counter and
    /// lock-state changes are committed before the response goes out.
    pub async fn open_session(
        &self,
        email: &str,
        password: &str,
        issue_token: bool,
    ) -> Result<OpenSessionOutcome> {
        let email = canonicalize_email(email);
        let adapter = self.auth.adapter();
        let result = adapter
            .authenticate(&AuthAttempt::new(email, password))
            .await?;

        match result {
            AuthenticationResult::Success(mut account) => {
                account.stamp_last_logged_in();
                self.users.save(&account).await?;

                let session_id = self.session.open(&account.email).await?;
                let jwt = if issue_token {
                    Some(
                        self.signer
                            .create_signed_token(&account.email, self.jwt_expiry_seconds)?,
                    )
                } else {
                    None
                };

                Ok(OpenSessionOutcome::Opened {
                    email: account.email,
                    user_id: account.id,
                    session_id,
                    jwt,
                })
            }
            AuthenticationResult::Failure { code, account } => {
                if let Some(account) = &account {
                    self.users.save(account).await?;
                }

                match (code, account) {
                    (FailureCode::AccountLocked, Some(account)) => {
                        Ok(OpenSessionOutcome::Locked {
                            user_id: account.id,
                        })
                    }
                    (code, account) => Ok(OpenSessionOutcome::Invalid {
                        code,
                        user_id: account.map(|account| account.id),
                    }),
                }
            }
        }
    }

    /// Open a session for an identity already established via the bypass
    /// mechanism; no password involved, but the account status still gates.
    pub async fn preauthorized_open(
        &self,
        service: &AuthenticationService,
    ) -> Result<PreauthorizedOutcome> {
        let Some(account) = service.identity().await? else {
            return Ok(PreauthorizedOutcome::NoIdentity);
        };

        if matches!(account.status, UserStatus::Locked | UserStatus::Suspended) {
            return Ok(PreauthorizedOutcome::Refused {
                status: account.status,
            });
        }

        let session_id = self.session.open(&account.email).await?;

        Ok(PreauthorizedOutcome::Opened {
            email: account.email,
            user_id: account.id,
            session_id,
        })
    }

    /// Close a session. The caller must be logged in and must own the
    /// session it is closing.
    pub async fn close_session(
        &self,
        supplied_id: &str,
        service: &AuthenticationService,
    ) -> Result<CloseSessionOutcome> {
        if !service.has_identity().await? {
            return Ok(CloseSessionOutcome::NotLoggedIn);
        }

        let current = self.session.current_id().unwrap_or_default();
        if current != supplied_id {
            return Ok(CloseSessionOutcome::Mismatch {
                current: current.to_string(),
                supplied: supplied_id.to_string(),
            });
        }

        service.clear_identity().await?;
        self.session.destroy_current().await?;

        Ok(CloseSessionOutcome::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::SecurityAuditLog;
    use crate::auth::context::AuthMode;
    use crate::auth::verifier::hash_password;
    use crate::identity::repository::{
        InsertOutcome, MemoryUserRepository, NewUserAccount, UserRepository,
    };
    use crate::session::{MemorySessionStore, SessionStore, SESSION_COOKIE_NAME};
    use axum::http::header::COOKIE;
    use axum::http::{HeaderMap, HeaderValue};
    use secrecy::SecretString;

    struct Fixture {
        auth: AuthenticationContext,
        users: Arc<MemoryUserRepository>,
        sessions: Arc<MemorySessionStore>,
        signer: TokenSigner,
    }

    impl Fixture {
        async fn new(status: UserStatus) -> Result<Self> {
            let users = Arc::new(MemoryUserRepository::new());
            let outcome = users
                .insert(NewUserAccount {
                    email: "a@example.com".to_string(),
                    password_hash: Some(hash_password("Password1")?),
                    status,
                    is_admin: false,
                    one_time_password_set_token: None,
                    one_time_password_set_token_generated_at: None,
                })
                .await?;
            assert!(matches!(outcome, InsertOutcome::Created(_)));

            let sessions = Arc::new(MemorySessionStore::new());
            let signer = TokenSigner::new(&SecretString::from("test-secret"), "membrane");
            let auth = AuthenticationContext::new(
                users.clone(),
                sessions.clone(),
                signer.clone(),
                SecurityAuditLog::new(),
                3,
            );

            Ok(Self {
                auth,
                users,
                sessions,
                signer,
            })
        }

        fn lifecycle(&self, headers: &HeaderMap) -> SessionLifecycleService {
            SessionLifecycleService::new(
                self.auth.clone(),
                self.auth.session_context(headers),
                self.users.clone(),
                self.signer.clone(),
                3600,
            )
        }
    }

    fn cookie_headers(session_id: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&format!("{SESSION_COOKIE_NAME}={session_id}"))?,
        );
        Ok(headers)
    }

    #[tokio::test]
    async fn mixed_case_login_opens_session_with_canonical_email() -> Result<()> {
        let fixture = Fixture::new(UserStatus::Active).await?;
        let lifecycle = fixture.lifecycle(&HeaderMap::new());

        let outcome = lifecycle
            .open_session(" A@Example.COM ", "Password1", false)
            .await?;

        let OpenSessionOutcome::Opened {
            email,
            user_id,
            session_id,
            jwt,
        } = outcome
        else {
            panic!("expected opened session");
        };
        assert_eq!(email, "a@example.com");
        assert_eq!(user_id, 1);
        assert!(jwt.is_none());
        assert_eq!(
            fixture.sessions.get(&session_id).await?.as_deref(),
            Some("a@example.com")
        );

        let account = fixture.users.find_by_id(1).await?.expect("account exists");
        assert!(account.last_logged_in.is_some());

        Ok(())
    }

    #[tokio::test]
    async fn jwt_is_issued_on_request() -> Result<()> {
        let fixture = Fixture::new(UserStatus::Active).await?;
        let lifecycle = fixture.lifecycle(&HeaderMap::new());

        let outcome = lifecycle
            .open_session("a@example.com", "Password1", true)
            .await?;

        let OpenSessionOutcome::Opened { jwt: Some(jwt), .. } = outcome else {
            panic!("expected opened session with jwt");
        };
        assert_eq!(fixture.signer.verify(&jwt)?.session, "a@example.com");

        Ok(())
    }

    #[tokio::test]
    async fn third_failure_locks_and_is_reported_as_locked() -> Result<()> {
        let fixture = Fixture::new(UserStatus::Active).await?;

        for _ in 0..2 {
            let lifecycle = fixture.lifecycle(&HeaderMap::new());
            let outcome = lifecycle
                .open_session("a@example.com", "wrong", false)
                .await?;
            assert!(matches!(outcome, OpenSessionOutcome::Invalid { .. }));
        }

        let lifecycle = fixture.lifecycle(&HeaderMap::new());
        let outcome = lifecycle
            .open_session("a@example.com", "wrong", false)
            .await?;
        assert!(matches!(
            outcome,
            OpenSessionOutcome::Locked { user_id: 1 }
        ));

        // Lock state was flushed: the next attempt with the right password
        // still fails as locked.
        let lifecycle = fixture.lifecycle(&HeaderMap::new());
        let outcome = lifecycle
            .open_session("a@example.com", "Password1", false)
            .await?;
        assert!(matches!(outcome, OpenSessionOutcome::Locked { user_id: 1 }));

        Ok(())
    }

    #[tokio::test]
    async fn unknown_email_is_a_generic_failure() -> Result<()> {
        let fixture = Fixture::new(UserStatus::Active).await?;
        let lifecycle = fixture.lifecycle(&HeaderMap::new());

        let outcome = lifecycle
            .open_session("nobody@example.com", "Password1", false)
            .await?;

        assert!(matches!(
            outcome,
            OpenSessionOutcome::Invalid {
                code: FailureCode::IdentityNotFound,
                user_id: None,
            }
        ));

        Ok(())
    }

    #[tokio::test]
    async fn close_requires_matching_session_id() -> Result<()> {
        let fixture = Fixture::new(UserStatus::Active).await?;
        let session_id = fixture.sessions.create("a@example.com").await?;
        let headers = cookie_headers(&session_id)?;

        let lifecycle = fixture.lifecycle(&headers);
        let service = fixture.auth.service(AuthMode::Normal, &headers);

        let outcome = lifecycle.close_session("some-other-id", &service).await?;
        let CloseSessionOutcome::Mismatch { current, supplied } = outcome else {
            panic!("expected mismatch");
        };
        assert_eq!(current, session_id);
        assert_eq!(supplied, "some-other-id");

        // Session is still alive after the refused close.
        assert!(fixture.sessions.get(&session_id).await?.is_some());

        let outcome = lifecycle.close_session(&session_id, &service).await?;
        assert!(matches!(outcome, CloseSessionOutcome::Closed));
        assert!(fixture.sessions.get(&session_id).await?.is_none());

        Ok(())
    }

    #[tokio::test]
    async fn close_without_identity_is_refused() -> Result<()> {
        let fixture = Fixture::new(UserStatus::Active).await?;
        let headers = HeaderMap::new();

        let lifecycle = fixture.lifecycle(&headers);
        let service = fixture.auth.service(AuthMode::Normal, &headers);

        let outcome = lifecycle.close_session("anything", &service).await?;
        assert!(matches!(outcome, CloseSessionOutcome::NotLoggedIn));

        Ok(())
    }

    #[tokio::test]
    async fn preauthorized_open_gates_on_status() -> Result<()> {
        for (status, locked) in [
            (UserStatus::Active, false),
            (UserStatus::Locked, true),
            (UserStatus::Suspended, true),
        ] {
            let fixture = Fixture::new(status).await?;
            let token = fixture.signer.create_signed_token("a@example.com", 60)?;

            let mut headers = HeaderMap::new();
            headers.insert(
                axum::http::header::AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {token}"))?,
            );

            let lifecycle = fixture.lifecycle(&headers);
            let service = fixture.auth.service(AuthMode::Preauthorized, &headers);
            let outcome = lifecycle.preauthorized_open(&service).await?;

            if locked {
                assert!(matches!(outcome, PreauthorizedOutcome::Refused { .. }));
            } else {
                assert!(matches!(outcome, PreauthorizedOutcome::Opened { .. }));
            }
        }

        Ok(())
    }

    #[tokio::test]
    async fn preauthorized_open_without_token_is_refused() -> Result<()> {
        let fixture = Fixture::new(UserStatus::Active).await?;
        let headers = HeaderMap::new();

        let lifecycle = fixture.lifecycle(&headers);
        let service = fixture.auth.service(AuthMode::Preauthorized, &headers);

        let outcome = lifecycle.preauthorized_open(&service).await?;
        assert!(matches!(outcome, PreauthorizedOutcome::NoIdentity));

        Ok(())
    }
}
