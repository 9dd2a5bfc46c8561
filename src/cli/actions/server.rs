use crate::cli::actions::Action;
use crate::membrane::{config::GatewayConfig, new};
use anyhow::Result;

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server {
            port,
            dsn,
            jwt_secret,
            backend_base_uri,
            mount_prefix,
            max_login_attempts,
            jwt_expiry_seconds,
            one_time_token_ttl_seconds,
            proxy_timeout_seconds,
        } => {
            let config = GatewayConfig::new(jwt_secret)
                .with_backend_base_uri(backend_base_uri)
                .with_mount_prefix(mount_prefix)
                .with_max_login_attempts(max_login_attempts)
                .with_jwt_expiry_seconds(jwt_expiry_seconds)
                .with_one_time_token_ttl_seconds(one_time_token_ttl_seconds)
                .with_proxy_timeout_seconds(proxy_timeout_seconds);

            new(port, dsn, config).await?;
        }
    }

    Ok(())
}
