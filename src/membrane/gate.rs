//! Ingress gate for forwarded traffic.
//!
//! Every request not handled by a managed route lands here: forged trust
//! headers are rejected outright, the authentication mode is resolved once,
//! and only requests with an established identity reach the backend, with
//! the trust headers injected by the gateway itself.

use axum::body::{Body, to_bytes};
use axum::extract::Extension;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderName, HeaderValue, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tracing::error;

use super::GatewayState;
use super::handlers::internal_error;
use crate::auth::context::AuthMode;
use crate::proxy::{HEADER_USER_ID, HEADER_USER_ROLES};

/// Header carrying a legacy secure token; stripped before forwarding.
pub const HEADER_SECURE_TOKEN: HeaderName = HeaderName::from_static("http-secure-token");

/// Catch-all handler: authenticate, inject trust headers, forward.
pub async fn forward(
    Extension(state): Extension<Arc<GatewayState>>,
    request: Request<Body>,
) -> Response {
    let (parts, body) = request.into_parts();
    let mut headers = parts.headers;

    // Trust headers are gateway-owned; an inbound copy is a forgery.
    if headers.contains_key(&HEADER_USER_ID) || headers.contains_key(&HEADER_USER_ROLES) {
        error!(
            category = "Security",
            subcategory = "User authentication",
            uri = %parts.uri,
            "Request headers invalid"
        );

        return StatusCode::UNAUTHORIZED.into_response();
    }

    let mode = AuthMode::from_request(&headers, parts.uri.query());
    let service = state.auth.service(mode, &headers);

    let identity = match service.identity().await {
        Ok(identity) => identity,
        Err(err) => return internal_error(&err),
    };

    let Some(account) = identity else {
        state.audit.authentication_failed();

        return StatusCode::UNAUTHORIZED.into_response();
    };

    // An identity without an email cannot be asserted to the backend.
    if account.email.is_empty() {
        state.audit.authentication_failed();

        return StatusCode::UNAUTHORIZED.into_response();
    }

    let token = match state
        .signer
        .create_signed_token(&account.email, state.config.jwt_expiry_seconds())
    {
        Ok(token) => token,
        Err(err) => return internal_error(&err),
    };

    headers.remove(&HEADER_SECURE_TOKEN);

    let Ok(user_id_value) = HeaderValue::from_str(&account.email) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    headers.insert(HEADER_USER_ID, user_id_value);

    let Ok(bearer_value) = HeaderValue::from_str(&format!("Bearer {token}")) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    headers.insert(AUTHORIZATION, bearer_value);

    let body = match to_bytes(body, usize::MAX).await {
        Ok(body) => body,
        Err(err) => return internal_error(&anyhow::anyhow!("failed to read request body: {err}")),
    };

    state
        .proxy
        .forward(parts.method, &parts.uri, &headers, body)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::verifier::hash_password;
    use crate::email::LogEmailSender;
    use crate::identity::repository::{
        InsertOutcome, MemoryUserRepository, NewUserAccount, UserRepository,
    };
    use crate::identity::UserStatus;
    use crate::membrane::config::GatewayConfig;
    use crate::session::{MemorySessionStore, SessionStore, SESSION_COOKIE_NAME};
    use anyhow::Result;
    use axum::http::header::COOKIE;
    use secrecy::SecretString;

    async fn state() -> Result<Arc<GatewayState>> {
        let users = Arc::new(MemoryUserRepository::new());
        let outcome = users
            .insert(NewUserAccount {
                email: "a@example.com".to_string(),
                password_hash: Some(hash_password("Password1")?),
                status: UserStatus::Active,
                is_admin: false,
                one_time_password_set_token: None,
                one_time_password_set_token_generated_at: None,
            })
            .await?;
        assert!(matches!(outcome, InsertOutcome::Created(_)));

        let state = GatewayState::new(
            GatewayConfig::new(SecretString::from("test-secret"))
                .with_proxy_timeout_seconds(1)
                .with_backend_base_uri("http://127.0.0.1:9"),
            users,
            Arc::new(MemorySessionStore::new()),
            Arc::new(LogEmailSender),
            None,
        )?;

        Ok(Arc::new(state))
    }

    #[tokio::test]
    async fn forged_trust_headers_are_rejected_before_auth() -> Result<()> {
        let state = state().await?;

        for header in ["x-user-id", "x-user-roles"] {
            let request = Request::builder()
                .uri("/api/anything")
                .header(header, "attacker@example.com")
                .body(Body::empty())?;

            let response = forward(Extension(state.clone()), request).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }

        Ok(())
    }

    #[tokio::test]
    async fn request_without_identity_is_rejected() -> Result<()> {
        let state = state().await?;

        let request = Request::builder()
            .uri("/api/anything")
            .body(Body::empty())?;

        let response = forward(Extension(state), request).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        Ok(())
    }

    #[tokio::test]
    async fn authenticated_request_reaches_the_forwarder() -> Result<()> {
        let state = state().await?;
        let session_id = state.sessions.create("a@example.com").await?;

        let request = Request::builder()
            .uri("/api/anything")
            .header(COOKIE, format!("{SESSION_COOKIE_NAME}={session_id}"))
            .body(Body::empty())?;

        // The backend address is unroutable, so an authenticated request
        // surfaces the forwarder's transport failure instead of a 401.
        let response = forward(Extension(state), request).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        Ok(())
    }
}
