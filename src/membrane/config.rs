//! Gateway runtime configuration.

use secrecy::SecretString;
use std::time::Duration;

const DEFAULT_BACKEND_BASE_URI: &str = "http://api";
const DEFAULT_MOUNT_PREFIX: &str = "/auth";
const DEFAULT_MAX_LOGIN_ATTEMPTS: u32 = 3;
const DEFAULT_JWT_EXPIRY_SECONDS: i64 = 3600;
const DEFAULT_ONE_TIME_TOKEN_TTL: Duration = Duration::from_secs(60 * 60 * 24);
const DEFAULT_PROXY_TIMEOUT: Duration = Duration::from_secs(300);
const TOKEN_ISSUER: &str = "membrane";

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    backend_base_uri: String,
    mount_prefix: String,
    max_login_attempts: u32,
    jwt_expiry_seconds: i64,
    one_time_token_ttl: Duration,
    proxy_timeout: Duration,
    jwt_secret: SecretString,
}

impl GatewayConfig {
    /// Defaults: backend at `http://api`, mounted under `/auth`, three login
    /// attempts before lockout, one-hour tokens, one-day password-set
    /// tokens, five-minute proxy timeout.
    #[must_use]
    pub fn new(jwt_secret: SecretString) -> Self {
        Self {
            backend_base_uri: DEFAULT_BACKEND_BASE_URI.to_string(),
            mount_prefix: DEFAULT_MOUNT_PREFIX.to_string(),
            max_login_attempts: DEFAULT_MAX_LOGIN_ATTEMPTS,
            jwt_expiry_seconds: DEFAULT_JWT_EXPIRY_SECONDS,
            one_time_token_ttl: DEFAULT_ONE_TIME_TOKEN_TTL,
            proxy_timeout: DEFAULT_PROXY_TIMEOUT,
            jwt_secret,
        }
    }

    #[must_use]
    pub fn with_backend_base_uri(mut self, base_uri: impl Into<String>) -> Self {
        self.backend_base_uri = base_uri.into();
        self
    }

    #[must_use]
    pub fn with_mount_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.mount_prefix = prefix.into();
        self
    }

    #[must_use]
    pub const fn with_max_login_attempts(mut self, attempts: u32) -> Self {
        self.max_login_attempts = attempts;
        self
    }

    #[must_use]
    pub const fn with_jwt_expiry_seconds(mut self, seconds: i64) -> Self {
        self.jwt_expiry_seconds = seconds;
        self
    }

    #[must_use]
    pub const fn with_one_time_token_ttl_seconds(mut self, seconds: u64) -> Self {
        self.one_time_token_ttl = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub const fn with_proxy_timeout_seconds(mut self, seconds: u64) -> Self {
        self.proxy_timeout = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn backend_base_uri(&self) -> &str {
        &self.backend_base_uri
    }

    #[must_use]
    pub fn mount_prefix(&self) -> &str {
        &self.mount_prefix
    }

    #[must_use]
    pub const fn max_login_attempts(&self) -> u32 {
        self.max_login_attempts
    }

    #[must_use]
    pub const fn jwt_expiry_seconds(&self) -> i64 {
        self.jwt_expiry_seconds
    }

    #[must_use]
    pub const fn one_time_token_ttl(&self) -> Duration {
        self.one_time_token_ttl
    }

    #[must_use]
    pub const fn proxy_timeout(&self) -> Duration {
        self.proxy_timeout
    }

    #[must_use]
    pub const fn jwt_secret(&self) -> &SecretString {
        &self.jwt_secret
    }

    #[must_use]
    pub const fn token_issuer(&self) -> &'static str {
        TOKEN_ISSUER
    }
}
