//! Activation email resend and password-reset request endpoints.

use axum::extract::{Extension, Path, RawQuery};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use serde_json::json;
use std::sync::Arc;
use tracing::error;

use super::{internal_error, json_response};
use crate::auth::context::AuthMode;
use crate::email::{send_activation_email, send_password_reset_email};
use crate::identity::UserStatus;
use crate::membrane::GatewayState;

#[utoipa::path(
    post,
    path= "/auth/users/{id}/activation-request",
    responses (
        (status = 200, description = "Request accepted"),
        (status = 401, description = "Caller is not logged in"),
    ),
    tag= "users"
)]
pub async fn resend_activation(
    Extension(state): Extension<Arc<GatewayState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    RawQuery(raw_query): RawQuery,
) -> Response {
    let mode = AuthMode::from_request(&headers, raw_query.as_deref());
    let caller = match state.auth.service(mode, &headers).identity().await {
        Ok(caller) => caller,
        Err(err) => return internal_error(&err),
    };

    let Some(caller) = caller else {
        error!(
            category = "Security",
            subcategory = "User activation",
            userId = id,
            "Attempting to update user account without authorisation"
        );

        return json_response(
            StatusCode::UNAUTHORIZED,
            json!({"user": "Attempting to update user account without authorisation"}),
        );
    };

    // Non-admin callers get the same blank success; whether the account
    // exists or was re-issued a token is not disclosed.
    if caller.is_admin {
        match state.users.find_by_id(id).await {
            Ok(Some(mut account)) => {
                account.status = UserStatus::NotActivated;
                let token = account.issue_one_time_password_set_token();

                if let Err(err) = state.users.save(&account).await {
                    return internal_error(&err);
                }

                send_activation_email(state.email.as_ref(), &account, &token);
            }
            Ok(None) => {}
            Err(err) => return internal_error(&err),
        }
    }

    json_response(StatusCode::OK, json!({}))
}

#[utoipa::path(
    post,
    path= "/auth/users/{id}/password-reset-request",
    responses (
        (status = 201, description = "Reset email sent"),
        (status = 404, description = "Unknown user id"),
    ),
    tag= "users"
)]
pub async fn password_reset_request(
    Extension(state): Extension<Arc<GatewayState>>,
    Path(id): Path<i64>,
) -> Response {
    let mut account = match state.users.find_by_id(id).await {
        Ok(Some(account)) => account,
        Ok(None) => {
            state.audit.password_reset_failed(id);

            return json_response(
                StatusCode::NOT_FOUND,
                json!({"errors": {"user": "User does not exist"}}),
            );
        }
        Err(err) => return internal_error(&err),
    };

    let token = account.issue_one_time_password_set_token();
    if let Err(err) = state.users.save(&account).await {
        return internal_error(&err);
    }

    send_password_reset_email(state.email.as_ref(), &account, &token);
    state.audit.password_reset_successful(id);

    json_response(StatusCode::CREATED, json!({"errors": {}}))
}
