pub mod server;

use secrecy::SecretString;

#[derive(Debug)]
pub enum Action {
    Server {
        port: u16,
        dsn: String,
        jwt_secret: SecretString,
        backend_base_uri: String,
        mount_prefix: String,
        max_login_attempts: u32,
        jwt_expiry_seconds: i64,
        one_time_token_ttl_seconds: u64,
        proxy_timeout_seconds: u64,
    },
}
