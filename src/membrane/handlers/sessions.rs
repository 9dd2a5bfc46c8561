//! Login and logout endpoints, classic (`/sessions`) and v1
//! (`/v1/sessions`, which also issues a JWT and accepts preauthorized
//! callers).

use axum::extract::{Extension, Path};
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use utoipa::ToSchema;

use super::{internal_error, json_response};
use crate::auth::context::AuthMode;
use crate::membrane::GatewayState;
use crate::session::lifecycle::{
    OpenSessionOutcome, PreauthorizedOutcome, SessionLifecycleService,
};
use crate::session::SESSION_COOKIE_NAME;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginUser {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub user: Option<LoginUser>,
    #[serde(default)]
    pub preauthorized: Option<bool>,
}

fn lifecycle(state: &GatewayState, headers: &HeaderMap) -> SessionLifecycleService {
    SessionLifecycleService::new(
        state.auth.clone(),
        state.auth.session_context(headers),
        state.users.clone(),
        state.signer.clone(),
        state.config.jwt_expiry_seconds(),
    )
}

fn session_cookie(session_id: &str) -> String {
    format!("{SESSION_COOKIE_NAME}={session_id}; Path=/; HttpOnly")
}

#[utoipa::path(
    post,
    path= "/auth/sessions",
    request_body = LoginRequest,
    responses (
        (status = 201, description = "Session opened"),
        (status = 400, description = "Missing email and/or password"),
        (status = 401, description = "Invalid email or password"),
        (status = 403, description = "Account locked"),
    ),
    tag= "sessions"
)]
pub async fn login(
    Extension(state): Extension<Arc<GatewayState>>,
    headers: HeaderMap,
    payload: Option<Json<LoginRequest>>,
) -> Response {
    open_session(&state, &headers, payload, false).await
}

#[utoipa::path(
    post,
    path= "/auth/v1/sessions",
    request_body = LoginRequest,
    responses (
        (status = 201, description = "Session opened, body carries a JWT"),
        (status = 400, description = "Missing email and/or password"),
        (status = 401, description = "Invalid credentials or unverifiable token"),
        (status = 403, description = "Account locked or suspended"),
    ),
    tag= "sessions"
)]
pub async fn login_v1(
    Extension(state): Extension<Arc<GatewayState>>,
    headers: HeaderMap,
    payload: Option<Json<LoginRequest>>,
) -> Response {
    let preauthorized = payload
        .as_ref()
        .is_some_and(|Json(request)| request.preauthorized == Some(true));

    if preauthorized {
        return open_preauthorized_session(&state, &headers).await;
    }

    open_session(&state, &headers, payload, true).await
}

async fn open_session(
    state: &GatewayState,
    headers: &HeaderMap,
    payload: Option<Json<LoginRequest>>,
    issue_token: bool,
) -> Response {
    let credentials = payload.and_then(|Json(request)| request.user).and_then(
        |user| match (user.email, user.password) {
            (Some(email), Some(password)) => Some((email, password)),
            _ => None,
        },
    );

    let Some((email, password)) = credentials else {
        state
            .audit
            .login_failed("Missing email and/or password.", None);

        return json_response(
            StatusCode::BAD_REQUEST,
            json!({"error": "Missing email and/or password."}),
        );
    };

    let outcome = match lifecycle(state, headers)
        .open_session(&email, &password, issue_token)
        .await
    {
        Ok(outcome) => outcome,
        Err(err) => return internal_error(&err),
    };

    match outcome {
        OpenSessionOutcome::Opened {
            email,
            user_id,
            session_id,
            jwt,
        } => {
            state.audit.login_successful(user_id);

            let mut body = json!({
                "email": email,
                "userId": user_id,
                "authentication_token": session_id,
            });
            if let Some(jwt) = jwt {
                body["jwt"] = json!(jwt);
            }

            let mut response = json_response(StatusCode::CREATED, body);
            if let Ok(cookie) = session_cookie(&session_id).parse() {
                response.headers_mut().insert(SET_COOKIE, cookie);
            }

            response
        }
        OpenSessionOutcome::Locked { user_id } => json_response(
            StatusCode::FORBIDDEN,
            json!({
                "userId": user_id,
                "error": "Unsuccessful login attempts exceeded.",
                "locked": true,
            }),
        ),
        OpenSessionOutcome::Invalid { user_id, .. } => {
            state
                .audit
                .login_failed("Invalid email or password.", user_id);

            json_response(
                StatusCode::UNAUTHORIZED,
                json!({"error": "Invalid email or password."}),
            )
        }
    }
}

async fn open_preauthorized_session(state: &GatewayState, headers: &HeaderMap) -> Response {
    let service = state.auth.service(AuthMode::Preauthorized, headers);

    let outcome = match lifecycle(state, headers).preauthorized_open(&service).await {
        Ok(outcome) => outcome,
        Err(err) => return internal_error(&err),
    };

    match outcome {
        PreauthorizedOutcome::NoIdentity => {
            state
                .audit
                .preauthorized_login_failed("Could not verify token");

            json_response(
                StatusCode::UNAUTHORIZED,
                json!({"error": "Could not verify token"}),
            )
        }
        PreauthorizedOutcome::Refused { status } => {
            state
                .audit
                .preauthorized_login_failed(&format!("Account is {status}"));

            json_response(StatusCode::FORBIDDEN, json!({"status": status}))
        }
        PreauthorizedOutcome::Opened {
            email,
            user_id,
            session_id,
        } => {
            state.audit.preauthorized_login_successful(user_id);

            let mut response = json_response(
                StatusCode::CREATED,
                json!({
                    "email": email,
                    "authentication_token": session_id,
                }),
            );
            if let Ok(cookie) = session_cookie(&session_id).parse() {
                response.headers_mut().insert(SET_COOKIE, cookie);
            }

            response
        }
    }
}

#[utoipa::path(
    delete,
    path= "/auth/sessions/{id}",
    responses (
        (status = 204, description = "Session closed"),
        (status = 401, description = "Not logged in or session id mismatch"),
    ),
    tag= "sessions"
)]
pub async fn logout(
    Extension(state): Extension<Arc<GatewayState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    close_session(&state, &headers, &id, AuthMode::Normal).await
}

#[utoipa::path(
    delete,
    path= "/auth/v1/sessions/{id}",
    responses (
        (status = 204, description = "Session closed"),
        (status = 401, description = "Not logged in or session id mismatch"),
    ),
    tag= "sessions"
)]
pub async fn logout_v1(
    Extension(state): Extension<Arc<GatewayState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    close_session(&state, &headers, &id, AuthMode::Preauthorized).await
}

async fn close_session(
    state: &GatewayState,
    headers: &HeaderMap,
    supplied_id: &str,
    mode: AuthMode,
) -> Response {
    let service = state.auth.service(mode, headers);

    let outcome = match lifecycle(state, headers)
        .close_session(supplied_id, &service)
        .await
    {
        Ok(outcome) => outcome,
        Err(err) => return internal_error(&err),
    };

    match outcome.error_message() {
        None => {
            state.audit.logout_successful(supplied_id);

            StatusCode::NO_CONTENT.into_response()
        }
        Some(message) => {
            state.audit.logout_failed(supplied_id, &message);

            json_response(StatusCode::UNAUTHORIZED, json!({"error": message}))
        }
    }
}
