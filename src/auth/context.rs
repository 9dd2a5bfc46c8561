//! Dual-mode authentication services sharing one adapter chain.
//!
//! The normal mode binds identity to the cookie session; the preauthorized
//! ("bypass") mode binds it to a signed bearer token presented by internal
//! callers. Which mode applies is resolved once per request from the bypass
//! signal and threaded through as an [`AuthMode`].

use anyhow::Result;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use std::sync::Arc;

use super::lockout::LockoutAdapter;
use super::resolve::IdentityResolutionAdapter;
use crate::audit::SecurityAuditLog;
use crate::identity::repository::UserRepository;
use crate::identity::UserAccount;
use crate::session::{SessionContext, SessionStore};
use crate::token::TokenSigner;

/// Header (or query parameter) carrying the bypass signal; the exact value
/// "1" selects the preauthorized mode.
pub const BYPASS_SIGNAL: &str = "Membrane-Bypass";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthMode {
    Normal,
    Preauthorized,
}

impl AuthMode {
    /// Resolve the mode for a request from its headers and raw query string.
    #[must_use]
    pub fn from_request(headers: &HeaderMap, query: Option<&str>) -> Self {
        let header_set = headers
            .get(BYPASS_SIGNAL)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value == "1");

        let query_set = query.is_some_and(|query| {
            url::form_urlencoded::parse(query.as_bytes())
                .any(|(name, value)| name == BYPASS_SIGNAL && value == "1")
        });

        if header_set || query_set {
            Self::Preauthorized
        } else {
            Self::Normal
        }
    }
}

/// Factory for the two authentication services. Both share the same adapter
/// chain; they differ only in where the established identity lives.
#[derive(Clone)]
pub struct AuthenticationContext {
    users: Arc<dyn UserRepository>,
    sessions: Arc<dyn SessionStore>,
    signer: TokenSigner,
    audit: SecurityAuditLog,
    max_login_attempts: u32,
}

impl AuthenticationContext {
    #[must_use]
    pub fn new(
        users: Arc<dyn UserRepository>,
        sessions: Arc<dyn SessionStore>,
        signer: TokenSigner,
        audit: SecurityAuditLog,
        max_login_attempts: u32,
    ) -> Self {
        Self {
            users,
            sessions,
            signer,
            audit,
            max_login_attempts,
        }
    }

    /// Fresh adapter chain (resolve → verify → lockout) with a
    /// request-scoped lookup cache.
    #[must_use]
    pub fn adapter(&self) -> LockoutAdapter {
        LockoutAdapter::new(
            IdentityResolutionAdapter::new(self.users.clone()),
            self.max_login_attempts,
            self.audit,
        )
    }

    /// Authentication service bound to cookie-session storage.
    #[must_use]
    pub fn normal(&self, headers: &HeaderMap) -> AuthenticationService {
        AuthenticationService {
            storage: IdentityStorage::Session(SessionContext::from_headers(
                self.sessions.clone(),
                headers,
            )),
            users: self.users.clone(),
        }
    }

    /// Authentication service bound to bearer-token storage, for
    /// already-authenticated internal calls and single-sign-on continuation.
    #[must_use]
    pub fn preauthorized(&self, headers: &HeaderMap) -> AuthenticationService {
        AuthenticationService {
            storage: IdentityStorage::Token {
                signer: self.signer.clone(),
                bearer: extract_bearer_token(headers),
            },
            users: self.users.clone(),
        }
    }

    #[must_use]
    pub fn service(&self, mode: AuthMode, headers: &HeaderMap) -> AuthenticationService {
        match mode {
            AuthMode::Normal => self.normal(headers),
            AuthMode::Preauthorized => self.preauthorized(headers),
        }
    }

    #[must_use]
    pub fn session_context(&self, headers: &HeaderMap) -> SessionContext {
        SessionContext::from_headers(self.sessions.clone(), headers)
    }
}

enum IdentityStorage {
    Session(SessionContext),
    Token {
        signer: TokenSigner,
        bearer: Option<String>,
    },
}

/// Read side of an established identity: cookie session or bearer token.
pub struct AuthenticationService {
    storage: IdentityStorage,
    users: Arc<dyn UserRepository>,
}

impl AuthenticationService {
    /// Resolve the current identity to a full account, if one is
    /// established and still exists.
    pub async fn identity(&self) -> Result<Option<UserAccount>> {
        let email = match &self.storage {
            IdentityStorage::Session(context) => context.identity_email().await?,
            IdentityStorage::Token { signer, bearer } => bearer
                .as_deref()
                .and_then(|token| signer.verify(token).ok())
                .map(|claims| claims.session),
        };

        match email {
            Some(email) => self.users.find_by_email(&email).await,
            None => Ok(None),
        }
    }

    pub async fn has_identity(&self) -> Result<bool> {
        Ok(self.identity().await?.is_some())
    }

    /// Clear the established identity. Sessions are destroyed; bearer
    /// tokens are stateless and simply stop being honored once expired.
    pub async fn clear_identity(&self) -> Result<()> {
        match &self.storage {
            IdentityStorage::Session(context) => context.destroy_current().await,
            IdentityStorage::Token { .. } => Ok(()),
        }
    }
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}
