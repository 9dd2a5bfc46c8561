//! User account management endpoints.

use axum::extract::{Extension, Path, Query, RawQuery};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::str::FromStr;
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;

use super::{
    header_value, internal_error, json_response, password_complexity_problems, valid_email,
};
use crate::auth::context::AuthMode;
use crate::auth::verifier;
use crate::email::send_activation_email;
use crate::identity::repository::{InsertOutcome, NewUserAccount};
use crate::identity::{canonicalize_email, UserAccount, UserStatus};
use crate::membrane::GatewayState;

/// Role name granting the admin flag.
const SYSTEM_ADMIN_ROLE: &str = "System Admin";

/// Header carrying a one-time password-set token (activation / reset).
pub const HEADER_ONE_TIME_TOKEN: &str = "sirius-one-time-password-set-token";
/// Header carrying the current password for a logged-in password change.
pub const HEADER_EXISTING_PASSWORD: &str = "sirius-existing-password";

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UserSummary {
    pub id: i64,
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
pub struct NewUserBody {
    pub email: Option<String>,
    pub password: Option<String>,
    pub roles: Option<serde_json::Value>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CreateUserRequest {
    pub user: Option<NewUserBody>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
pub struct UpdateUserRequest {
    pub status: Option<String>,
    pub email: Option<String>,
    pub roles: Option<Vec<String>>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
pub struct PasswordChangeRequest {
    pub password: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct ListQuery {
    pub email: Option<String>,
}

/// Resolve the caller's identity using the mode signalled by the bypass
/// header or query parameter.
async fn caller_identity(
    state: &GatewayState,
    headers: &HeaderMap,
    query: Option<&str>,
) -> anyhow::Result<Option<UserAccount>> {
    let mode = AuthMode::from_request(headers, query);
    state.auth.service(mode, headers).identity().await
}

#[utoipa::path(
    get,
    path= "/auth/users",
    params(("email" = Option<String>, Query, description = "Filter by email")),
    responses (
        (status = 200, description = "User list", body = [UserSummary]),
        (status = 401, description = "Not logged in"),
    ),
    tag= "users"
)]
pub async fn list(
    Extension(state): Extension<Arc<GatewayState>>,
    headers: HeaderMap,
    RawQuery(raw_query): RawQuery,
    Query(query): Query<ListQuery>,
) -> Response {
    match caller_identity(&state, &headers, raw_query.as_deref()).await {
        Ok(Some(_)) => {}
        Ok(None) => return StatusCode::UNAUTHORIZED.into_response(),
        Err(err) => return internal_error(&err),
    }

    let email = query
        .email
        .as_deref()
        .filter(|email| !email.is_empty())
        .map(canonicalize_email);

    match state.users.list(email.as_deref()).await {
        Ok(accounts) => {
            let summaries: Vec<UserSummary> = accounts
                .into_iter()
                .map(|account| UserSummary {
                    id: account.id,
                    email: account.email,
                })
                .collect();

            Json(summaries).into_response()
        }
        Err(err) => internal_error(&err),
    }
}

#[utoipa::path(
    post,
    path= "/auth/users",
    request_body = CreateUserRequest,
    responses (
        (status = 201, description = "User created"),
        (status = 400, description = "Validation failed or user already exists"),
        (status = 402, description = "Caller is not an admin"),
    ),
    tag= "users"
)]
pub async fn create(
    Extension(state): Extension<Arc<GatewayState>>,
    headers: HeaderMap,
    RawQuery(raw_query): RawQuery,
    payload: Option<Json<CreateUserRequest>>,
) -> Response {
    let caller = match caller_identity(&state, &headers, raw_query.as_deref()).await {
        Ok(caller) => caller,
        Err(err) => return internal_error(&err),
    };

    // Legacy status code for this route, kept for client compatibility.
    if !caller.is_some_and(|account| account.is_admin) {
        return json_response(
            StatusCode::PAYMENT_REQUIRED,
            json!({"error": "Invalid credentials"}),
        );
    }

    let user = payload
        .and_then(|Json(request)| request.user)
        .unwrap_or_default();

    let email = user.email.unwrap_or_default();
    if !valid_email(&email) {
        return json_response(
            StatusCode::BAD_REQUEST,
            json!({"errors": {"email": "Invalid email address"}}),
        );
    }

    let password = user.password.filter(|password| !password.is_empty());
    if let Some(password) = &password {
        if !password_complexity_problems(password).is_empty() {
            return json_response(
                StatusCode::BAD_REQUEST,
                json!({"errors": {"password": "Password does not meet complexity requirement"}}),
            );
        }
    }

    let Some(roles) = user.roles.as_ref().and_then(|roles| roles.as_array()) else {
        return json_response(
            StatusCode::BAD_REQUEST,
            json!({"errors": {"roles": "Roles must be specified as an array"}}),
        );
    };
    let is_admin = roles.iter().any(|role| role == SYSTEM_ADMIN_ROLE);

    let password_hash = match &password {
        Some(password) => match verifier::hash_password(password) {
            Ok(hash) => Some(hash),
            Err(err) => return internal_error(&err),
        },
        None => None,
    };

    // Accounts created without a password must activate via email.
    let status = if password.is_some() {
        UserStatus::Active
    } else {
        UserStatus::NotActivated
    };

    let new_account = NewUserAccount {
        email: canonicalize_email(&email),
        password_hash,
        status,
        is_admin,
        one_time_password_set_token: None,
        one_time_password_set_token_generated_at: None,
    };

    let mut account = match state.users.insert(new_account).await {
        Ok(InsertOutcome::Created(account)) => account,
        Ok(InsertOutcome::Conflict) => {
            return json_response(
                StatusCode::BAD_REQUEST,
                json!({"errors": {"email": "User already exists"}}),
            );
        }
        Err(err) => return internal_error(&err),
    };

    // The activation email needs the persisted id, so the token is issued
    // after the insert.
    if account.status == UserStatus::NotActivated {
        let token = account.issue_one_time_password_set_token();
        if let Err(err) = state.users.save(&account).await {
            return internal_error(&err);
        }

        send_activation_email(state.email.as_ref(), &account, &token);
    }

    json_response(StatusCode::CREATED, json!({"email": account.email}))
}

#[utoipa::path(
    put,
    path= "/auth/users/{id}",
    request_body = UpdateUserRequest,
    responses (
        (status = 200, description = "User updated"),
        (status = 401, description = "Caller is neither admin nor the user"),
        (status = 404, description = "Unknown user id"),
    ),
    tag= "users"
)]
pub async fn update(
    Extension(state): Extension<Arc<GatewayState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    RawQuery(raw_query): RawQuery,
    payload: Option<Json<UpdateUserRequest>>,
) -> Response {
    let caller = match caller_identity(&state, &headers, raw_query.as_deref()).await {
        Ok(caller) => caller,
        Err(err) => return internal_error(&err),
    };

    let authorized = caller.is_some_and(|account| account.is_admin || account.id == id);
    if !authorized {
        return json_response(StatusCode::UNAUTHORIZED, json!({}));
    }

    let update = payload.map(|Json(update)| update).unwrap_or_default();

    let mut account = match state.users.find_by_id(id).await {
        Ok(Some(account)) => account,
        Ok(None) => return json_response(StatusCode::NOT_FOUND, json!({})),
        Err(err) => return internal_error(&err),
    };

    if let Some(status) = update.status.as_deref() {
        let Ok(new_status) = UserStatus::from_str(status) else {
            return json_response(
                StatusCode::BAD_REQUEST,
                json!({"errors": {"status": "Invalid status"}}),
            );
        };

        if new_status != account.status {
            match new_status {
                UserStatus::Locked => state.audit.user_locked(id),
                UserStatus::Suspended => state.audit.user_suspended(id),
                UserStatus::Active => state.audit.user_activated(id),
                UserStatus::NotActivated => {}
            }

            // Reactivation gives the user a clean slate of attempts.
            if new_status == UserStatus::Active {
                account.reset_unsuccessful_login_attempts();
            }
        }

        account.status = new_status;
    }

    if let Some(email) = update.email.as_deref() {
        account.email = canonicalize_email(email);
    }

    account.is_admin = update
        .roles
        .as_ref()
        .is_some_and(|roles| roles.iter().any(|role| role == SYSTEM_ADMIN_ROLE));

    match state.users.save(&account).await {
        Ok(()) => json_response(StatusCode::OK, json!({})),
        Err(err) => internal_error(&err),
    }
}

#[utoipa::path(
    patch,
    path= "/auth/users/{id}",
    request_body = PasswordChangeRequest,
    responses (
        (status = 200, description = "Password updated"),
        (status = 400, description = "Complexity or current-password failure"),
        (status = 401, description = "Invalid token or unauthorised caller"),
        (status = 404, description = "Unknown user id"),
    ),
    tag= "users"
)]
pub async fn patch(
    Extension(state): Extension<Arc<GatewayState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    RawQuery(raw_query): RawQuery,
    payload: Option<Json<PasswordChangeRequest>>,
) -> Response {
    let password = payload
        .and_then(|Json(request)| request.password)
        .unwrap_or_default();

    // Scenario 1: setting own password via a single-use token.
    if let Some(token) = header_value(&headers, HEADER_ONE_TIME_TOKEN) {
        return set_password_via_one_time_token(&state, &token, id, &password).await;
    }

    // Scenario 2: logged in and supplying the existing password.
    let caller = match caller_identity(&state, &headers, raw_query.as_deref()).await {
        Ok(caller) => caller,
        Err(err) => return internal_error(&err),
    };

    let Some(caller) = caller else {
        error!(
            category = "Security",
            subcategory = "User password change",
            userId = id,
            "Attempting to update user account without authorisation"
        );

        return json_response(
            StatusCode::UNAUTHORIZED,
            json!({"user": "Attempting to update user account without authorisation"}),
        );
    };

    if caller.id != id {
        error!(
            category = "Security",
            subcategory = "User password change",
            callerId = caller.id,
            accountToChange = id,
            "User attempting to change password on account that is not their own"
        );

        return json_response(
            StatusCode::UNAUTHORIZED,
            json!({"user": "User attempting to change password on account that is not their own"}),
        );
    }

    let Some(existing_password) = header_value(&headers, HEADER_EXISTING_PASSWORD) else {
        error!(
            category = "Security",
            subcategory = "User password change",
            userId = id,
            "Existing password was not supplied and thus could not be verified"
        );

        return json_response(
            StatusCode::BAD_REQUEST,
            json!({"password": "Enter your current password"}),
        );
    };

    set_password_via_existing_password(&state, caller.id, &existing_password, &password).await
}

async fn set_password_via_one_time_token(
    state: &GatewayState,
    token: &str,
    id: i64,
    password: &str,
) -> Response {
    if !password_complexity_problems(password).is_empty() {
        state
            .audit
            .password_update_via_single_use_token_failed(id, None);

        return json_response(
            StatusCode::BAD_REQUEST,
            json!({"password": "Password does not meet complexity requirement"}),
        );
    }

    let mut account = match state.users.find_by_id(id).await {
        Ok(Some(account)) => account,
        Ok(None) => {
            state
                .audit
                .password_update_via_single_use_token_failed(id, Some("User does not exist"));

            return json_response(StatusCode::NOT_FOUND, json!({"user": "User does not exist"}));
        }
        Err(err) => return internal_error(&err),
    };

    let lifetime = Duration::from_std(state.config.one_time_token_ttl()).unwrap_or_else(|_| Duration::days(1));
    if !account.validate_one_time_password_set_token(token, lifetime) {
        state
            .audit
            .password_update_via_single_use_token_failed(id, None);

        return json_response(
            StatusCode::UNAUTHORIZED,
            json!({"one-time-password-set-token": "One-time password set token is invalid"}),
        );
    }

    // Activate account if it's new.
    if account.status == UserStatus::NotActivated {
        account.status = UserStatus::Active;
    }

    account.password_hash = match verifier::hash_password(password) {
        Ok(hash) => Some(hash),
        Err(err) => return internal_error(&err),
    };
    account.clear_one_time_password_set_token();

    match state.users.save(&account).await {
        Ok(()) => {
            state.audit.password_update_via_single_use_token_successful(id);

            json_response(StatusCode::OK, json!({}))
        }
        Err(err) => internal_error(&err),
    }
}

async fn set_password_via_existing_password(
    state: &GatewayState,
    id: i64,
    existing_password: &str,
    new_password: &str,
) -> Response {
    let problems = password_complexity_problems(new_password);
    if !problems.is_empty() {
        let message = format!("Password must {}", problems.join(" and "));
        state
            .audit
            .password_update_via_supplied_password_failed(id, &message);

        return json_response(StatusCode::BAD_REQUEST, json!({"password": message}));
    }

    // Re-fetch for consistency; the cached identity may be stale.
    let mut account = match state.users.find_by_id(id).await {
        Ok(Some(account)) => account,
        Ok(None) => {
            return json_response(StatusCode::NOT_FOUND, json!({"user": "User does not exist"}));
        }
        Err(err) => return internal_error(&err),
    };

    let verified = match verifier::verify(&mut account, existing_password) {
        Ok(verified) => verified && !account.is_locked(),
        Err(err) => return internal_error(&err),
    };

    if !verified {
        let message = "Password supplied was incorrect or user is not active";
        state
            .audit
            .password_update_via_supplied_password_failed(id, message);

        return json_response(StatusCode::BAD_REQUEST, json!({"password": message}));
    }

    account.password_hash = match verifier::hash_password(new_password) {
        Ok(hash) => Some(hash),
        Err(err) => return internal_error(&err),
    };

    match state.users.save(&account).await {
        Ok(()) => {
            state
                .audit
                .password_update_via_supplied_password_successful(id);

            json_response(StatusCode::OK, json!({}))
        }
        Err(err) => internal_error(&err),
    }
}

#[utoipa::path(
    delete,
    path= "/auth/users/{id}",
    responses (
        (status = 200, description = "User deleted"),
        (status = 401, description = "Caller is not an admin"),
    ),
    tag= "users"
)]
pub async fn remove(
    Extension(state): Extension<Arc<GatewayState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    RawQuery(raw_query): RawQuery,
) -> Response {
    let caller = match caller_identity(&state, &headers, raw_query.as_deref()).await {
        Ok(caller) => caller,
        Err(err) => return internal_error(&err),
    };

    if !caller.is_some_and(|account| account.is_admin) {
        return json_response(StatusCode::UNAUTHORIZED, json!({}));
    }

    match state.users.delete(id).await {
        Ok(()) => json_response(StatusCode::OK, json!({})),
        Err(err) => internal_error(&err),
    }
}

#[utoipa::path(
    get,
    path= "/auth/users/{id}/status",
    responses (
        (status = 200, description = "Account status"),
        (status = 404, description = "Unknown user id"),
    ),
    tag= "users"
)]
pub async fn status(
    Extension(state): Extension<Arc<GatewayState>>,
    Path(id): Path<i64>,
) -> Response {
    match state.users.find_by_id(id).await {
        Ok(Some(account)) => json_response(StatusCode::OK, json!({"status": account.status})),
        Ok(None) => json_response(StatusCode::NOT_FOUND, json!({"errors": "User not found."})),
        Err(err) => internal_error(&err),
    }
}
