//! HTTP surface of the gateway: routing, request tracing and shared state.

use anyhow::{Context, Result};
use axum::{
    Extension, Router,
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    routing::{delete, get, post},
};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{Span, info, info_span};
use ulid::Ulid;
use utoipa::OpenApi;

use crate::audit::SecurityAuditLog;
use crate::auth::context::AuthenticationContext;
use crate::email::{EmailSender, LogEmailSender};
use crate::identity::repository::{PgUserRepository, UserRepository};
use crate::proxy::ForwardingProxy;
use crate::session::{MemorySessionStore, SessionStore};
use crate::token::TokenSigner;

pub mod config;
pub mod gate;
pub(crate) mod handlers;

use config::GatewayConfig;
use handlers::{activation, sessions, users};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health,
        handlers::sessions::login,
        handlers::sessions::logout,
        handlers::sessions::login_v1,
        handlers::sessions::logout_v1,
        handlers::users::list,
        handlers::users::create,
        handlers::users::update,
        handlers::users::patch,
        handlers::users::remove,
        handlers::users::status,
        handlers::activation::resend_activation,
        handlers::activation::password_reset_request,
    ),
    components(schemas(
        handlers::health::Health,
        handlers::sessions::LoginRequest,
        handlers::sessions::LoginUser,
        handlers::users::UserSummary,
        handlers::users::NewUserBody,
        handlers::users::CreateUserRequest,
        handlers::users::UpdateUserRequest,
        handlers::users::PasswordChangeRequest,
    )),
    tags(
        (name = "membrane", description = "Authentication gateway API")
    )
)]
struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

/// Everything a request handler needs, shared behind an `Arc`.
pub struct GatewayState {
    pub config: GatewayConfig,
    pub users: Arc<dyn UserRepository>,
    pub sessions: Arc<dyn SessionStore>,
    pub auth: AuthenticationContext,
    pub signer: TokenSigner,
    pub proxy: ForwardingProxy,
    pub audit: SecurityAuditLog,
    pub email: Arc<dyn EmailSender>,
    pub pool: Option<PgPool>,
}

impl GatewayState {
    pub fn new(
        config: GatewayConfig,
        users: Arc<dyn UserRepository>,
        sessions: Arc<dyn SessionStore>,
        email: Arc<dyn EmailSender>,
        pool: Option<PgPool>,
    ) -> Result<Self> {
        let signer = TokenSigner::new(config.jwt_secret(), config.token_issuer());
        let audit = SecurityAuditLog::new();
        let auth = AuthenticationContext::new(
            users.clone(),
            sessions.clone(),
            signer.clone(),
            audit,
            config.max_login_attempts(),
        );
        let proxy = ForwardingProxy::new(
            config.backend_base_uri(),
            config.mount_prefix(),
            config.proxy_timeout(),
        )?;

        Ok(Self {
            config,
            users,
            sessions,
            auth,
            signer,
            proxy,
            audit,
            email,
            pool,
        })
    }
}

/// Build the gateway router: the managed routes under the mount prefix and
/// the catch-all forwarding gate for everything else.
pub fn router(state: Arc<GatewayState>) -> Router {
    let prefix = state.config.mount_prefix().to_string();

    let managed = Router::new()
        .route("/health", get(handlers::health).options(handlers::health))
        .route("/openapi.json", get(|| async { axum::Json(openapi()) }))
        .route("/sessions", post(sessions::login))
        .route("/sessions/:id", delete(sessions::logout))
        .route("/v1/sessions", post(sessions::login_v1))
        .route("/v1/sessions/:id", delete(sessions::logout_v1))
        .route("/users", get(users::list).post(users::create))
        .route(
            "/users/:id",
            axum::routing::put(users::update)
                .patch(users::patch)
                .delete(users::remove),
        )
        .route("/users/:id/status", get(users::status))
        .route(
            "/users/:id/activation-request",
            post(activation::resend_activation),
        )
        .route(
            "/users/:id/password-reset-request",
            post(activation::password_reset_request),
        );

    Router::new()
        .nest(&prefix, managed)
        .fallback(gate::forward)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(state)),
        )
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, dsn: String, config: GatewayConfig) -> Result<()> {
    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let users: Arc<dyn UserRepository> = Arc::new(PgUserRepository::new(pool.clone()));
    let sessions: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
    let email: Arc<dyn EmailSender> = Arc::new(LogEmailSender);

    let state = Arc::new(GatewayState::new(
        config,
        users,
        sessions,
        email,
        Some(pool),
    )?);

    let app = router(state);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
