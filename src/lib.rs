//! # Membrane (Authentication Gateway)
//!
//! `membrane` sits in front of a backend API and owns authentication for it.
//! It answers two questions for every request: who is the caller, and may
//! the request pass.
//!
//! ## Authentication
//!
//! Two modes, resolved once per request from a bypass signal (the
//! `Membrane-Bypass: 1` header or query parameter):
//!
//! - **Normal:** email and password checked against the user store, with an
//!   automatic lockout after too many unsuccessful attempts.
//! - **Preauthorized:** identity taken from the session established by an
//!   upstream trusted login, no password check.
//!
//! ## Sessions and tokens
//!
//! A successful login opens a server-side session, returned to the client as
//! the `membrane_session` cookie. Requests forwarded to the backend carry a
//! short-lived signed JWT plus `X-User-Id`, injected by the gateway; inbound
//! copies of the trust headers are rejected as forgeries.
//!
//! ## Forwarding
//!
//! Everything outside the gateway's own mount prefix is proxied to the
//! backend with a fixed header whitelist and an optional
//! `forwardMethodOverride` query parameter.

pub mod audit;
pub mod auth;
pub mod cli;
pub mod email;
pub mod identity;
pub mod membrane;
pub mod proxy;
pub mod session;
pub mod token;

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
