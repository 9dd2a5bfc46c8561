//! Security audit log: structured events with a fixed category/subcategory
//! pair, consumed downstream by log tooling. Field names are part of the
//! log contract and must not change casually.

use tracing::info;

const CATEGORY: &str = "Security";

#[derive(Clone, Copy, Debug, Default)]
pub struct SecurityAuditLog;

impl SecurityAuditLog {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    pub fn login_successful(&self, user_id: i64) {
        info!(
            category = CATEGORY,
            subcategory = "Authentication",
            userId = user_id,
            "User login successful"
        );
    }

    pub fn login_failed(&self, reason: &str, user_id: Option<i64>) {
        info!(
            category = CATEGORY,
            subcategory = "Authentication",
            userId = user_id,
            error = reason,
            "User login failed"
        );
    }

    pub fn preauthorized_login_successful(&self, user_id: i64) {
        info!(
            category = CATEGORY,
            subcategory = "Authentication",
            userId = user_id,
            "Preauthorized login successful"
        );
    }

    pub fn preauthorized_login_failed(&self, reason: &str) {
        info!(
            category = CATEGORY,
            subcategory = "Authentication",
            error = reason,
            "Preauthorized login failed"
        );
    }

    pub fn authentication_failed(&self) {
        info!(
            category = CATEGORY,
            subcategory = "User authentication",
            "User authentication failed"
        );
    }

    pub fn logout_successful(&self, session_id: &str) {
        info!(
            category = CATEGORY,
            subcategory = "Authentication",
            sessionId = session_id,
            "User logout successful"
        );
    }

    pub fn logout_failed(&self, session_id: &str, reason: &str) {
        info!(
            category = CATEGORY,
            subcategory = "Authentication",
            sessionId = session_id,
            error = reason,
            "User logout failed"
        );
    }

    pub fn user_locked(&self, user_id: i64) {
        info!(
            category = CATEGORY,
            subcategory = "User status change",
            userId = user_id,
            "User account locked"
        );
    }

    pub fn user_automatically_locked(&self, user_id: i64) {
        info!(
            category = CATEGORY,
            subcategory = "User status change",
            userId = user_id,
            "User account automatically locked"
        );
    }

    pub fn user_suspended(&self, user_id: i64) {
        info!(
            category = CATEGORY,
            subcategory = "User status change",
            userId = user_id,
            "User account suspended"
        );
    }

    pub fn user_activated(&self, user_id: i64) {
        info!(
            category = CATEGORY,
            subcategory = "User status change",
            userId = user_id,
            "User account activated"
        );
    }

    pub fn password_reset_successful(&self, user_id: i64) {
        info!(
            category = CATEGORY,
            subcategory = "User password reset",
            userId = user_id,
            "User password reset email requested"
        );
    }

    pub fn password_reset_failed(&self, user_id: i64) {
        info!(
            category = CATEGORY,
            subcategory = "User password reset",
            userId = user_id,
            "User password reset error"
        );
    }

    pub fn password_update_via_single_use_token_successful(&self, user_id: i64) {
        info!(
            category = CATEGORY,
            subcategory = "User password change",
            userId = user_id,
            "Successful password update via single-use token"
        );
    }

    pub fn password_update_via_single_use_token_failed(&self, user_id: i64, reason: Option<&str>) {
        info!(
            category = CATEGORY,
            subcategory = "User password change",
            userId = user_id,
            reason = reason,
            "Unsuccessful password update via single-use token"
        );
    }

    pub fn password_update_via_supplied_password_successful(&self, user_id: i64) {
        info!(
            category = CATEGORY,
            subcategory = "User password change",
            userId = user_id,
            "Successful password update via supplied password"
        );
    }

    pub fn password_update_via_supplied_password_failed(&self, user_id: i64, errors: &str) {
        info!(
            category = CATEGORY,
            subcategory = "User password change",
            userId = user_id,
            error = errors,
            "Unsuccessful password update via supplied password"
        );
    }
}
