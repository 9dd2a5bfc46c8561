//! Outbound forwarding to the backend API.
//!
//! The proxy rewrites the inbound URI onto the backend base URI, copies a
//! fixed whitelist of headers and the body, and passes the backend response
//! through verbatim. One attempt per request, bounded by a timeout.

use anyhow::{Context, Result};
use axum::body::Body;
use axum::http::header::{
    HeaderName, ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, AUTHORIZATION, CONNECTION,
    CONTENT_LENGTH, CONTENT_TYPE, TRANSFER_ENCODING, USER_AGENT,
};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::Response;
use axum::body::Bytes;
use reqwest::Client;
use std::time::Duration;
use tracing::{instrument, warn};

use crate::APP_USER_AGENT;

/// Trust headers asserting the caller's identity to the backend. Injected by
/// the gateway only; their presence on an inbound request is a forgery.
pub const HEADER_USER_ID: HeaderName = HeaderName::from_static("x-user-id");
pub const HEADER_USER_ROLES: HeaderName = HeaderName::from_static("x-user-roles");

/// Query parameter overriding the forwarded method, e.g.
/// `?forwardMethodOverride=POST` forwards a PUT as POST.
pub const FORWARD_METHOD_OVERRIDE: &str = "forwardMethodOverride";

pub const HEADER_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Headers copied onto the forwarded request; everything else is dropped.
fn forwarded_headers() -> [HeaderName; 9] {
    [
        CONTENT_TYPE,
        USER_AGENT,
        ACCEPT_LANGUAGE,
        ACCEPT_ENCODING,
        ACCEPT,
        HEADER_REQUEST_ID,
        HEADER_USER_ID,
        HEADER_USER_ROLES,
        AUTHORIZATION,
    ]
}

/// Single-attempt HTTP forwarder with a hard per-request timeout.
#[derive(Clone)]
pub struct ForwardingProxy {
    client: Client,
    base_uri: String,
    mount_prefix: String,
}

impl ForwardingProxy {
    pub fn new(base_uri: &str, mount_prefix: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(timeout)
            .build()
            .context("failed to build forwarding client")?;

        Ok(Self {
            client,
            base_uri: base_uri.trim_end_matches('/').to_string(),
            mount_prefix: mount_prefix.to_string(),
        })
    }

    /// Forward one request and pass the backend response through.
    ///
    /// Transport failures never surface as errors: a timeout becomes 504,
    /// anything else 502, so the caller always has a response to return.
    #[instrument(skip(self, headers, body), fields(method = %method, uri = %uri))]
    pub async fn forward(
        &self,
        method: Method,
        uri: &Uri,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Response {
        let url = self.build_forward_url(uri);
        let forward_method = resolve_forward_method(&method, uri.query());

        // GET forwards the query string; other methods forward the body.
        let target = match (method == Method::GET, uri.query()) {
            (true, Some(query)) => format!("{url}?{query}"),
            _ => url.clone(),
        };

        let mut request = self
            .client
            .request(forward_method, &target)
            .headers(filter_headers(headers));

        if method != Method::GET {
            request = request.body(body);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_server_error() {
                    warn!(%status, url, "backend returned server error");
                }

                let mut builder = Response::builder().status(status);
                if let Some(response_headers) = builder.headers_mut() {
                    *response_headers = passthrough_headers(response.headers());
                }

                match response.bytes().await {
                    Ok(bytes) => builder
                        .body(Body::from(bytes))
                        .unwrap_or_else(|_| bad_gateway(StatusCode::BAD_GATEWAY)),
                    Err(err) => {
                        warn!(%err, url, "failed to read backend response body");
                        bad_gateway(StatusCode::BAD_GATEWAY)
                    }
                }
            }
            Err(err) if err.is_timeout() => {
                warn!(%err, url, "backend request timed out");
                bad_gateway(StatusCode::GATEWAY_TIMEOUT)
            }
            Err(err) => {
                warn!(%err, url, "backend request failed");
                bad_gateway(StatusCode::BAD_GATEWAY)
            }
        }
    }

    /// Substitute the backend base URI, dropping the gateway mount prefix
    /// from the front of the path only.
    fn build_forward_url(&self, uri: &Uri) -> String {
        let path = uri.path();
        let stripped = path.strip_prefix(self.mount_prefix.as_str()).unwrap_or(path);

        format!("{}{stripped}", self.base_uri)
    }
}

fn bad_gateway(status: StatusCode) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}

/// The override query parameter wins over the inbound method.
fn resolve_forward_method(method: &Method, query: Option<&str>) -> Method {
    let Some(query) = query else {
        return method.clone();
    };

    url::form_urlencoded::parse(query.as_bytes())
        .find(|(name, _)| name == FORWARD_METHOD_OVERRIDE)
        .and_then(|(_, value)| Method::from_bytes(value.to_uppercase().as_bytes()).ok())
        .unwrap_or_else(|| method.clone())
}

/// Backend response headers minus the framing ones. The body is re-buffered
/// before it goes out, so the backend's Content-Length and Transfer-Encoding
/// no longer describe it and the server sets its own.
fn passthrough_headers(headers: &HeaderMap) -> HeaderMap {
    let mut passed = headers.clone();
    passed.remove(TRANSFER_ENCODING);
    passed.remove(CONTENT_LENGTH);
    passed.remove(CONNECTION);
    passed
}

fn filter_headers(headers: &HeaderMap) -> HeaderMap {
    let mut filtered = HeaderMap::new();

    for name in forwarded_headers() {
        if let Some(value) = headers.get(&name) {
            filtered.insert(name, value.clone());
        }
    }

    filtered
}
