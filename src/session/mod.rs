//! Server-side session storage and the per-request session context.

pub mod lifecycle;

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::http::header::COOKIE;
use axum::http::HeaderMap;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub const SESSION_COOKIE_NAME: &str = "membrane_session";

/// Create a fresh opaque session id.
///
/// The raw value is only handed to the client; the store keys on a hash so
/// raw ids never sit at rest.
fn generate_session_id() -> Result<String> {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate session id")?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

fn hash_session_id(id: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(id.as_bytes());
    hasher.finalize().to_vec()
}

/// Opaque session id allocation and lookup.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Allocate a fresh session id bound to `email`. Ids are never reused.
    async fn create(&self, email: &str) -> Result<String>;
    /// Resolve a session id to the identity it was bound to.
    async fn get(&self, id: &str) -> Result<Option<String>>;
    async fn destroy(&self, id: &str) -> Result<()>;
}

/// In-process session store; hashed ids map to identity emails.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<Vec<u8>, String>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, email: &str) -> Result<String> {
        let id = generate_session_id()?;
        self.sessions
            .write()
            .await
            .insert(hash_session_id(&id), email.to_string());
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<Option<String>> {
        Ok(self.sessions.read().await.get(&hash_session_id(id)).cloned())
    }

    async fn destroy(&self, id: &str) -> Result<()> {
        self.sessions.write().await.remove(&hash_session_id(id));
        Ok(())
    }
}

/// The session view of one request: the store plus the session id presented
/// by the caller's cookie, resolved once and threaded through explicitly.
#[derive(Clone)]
pub struct SessionContext {
    store: Arc<dyn SessionStore>,
    current_id: Option<String>,
}

impl SessionContext {
    #[must_use]
    pub fn from_headers(store: Arc<dyn SessionStore>, headers: &HeaderMap) -> Self {
        Self {
            current_id: extract_session_cookie(headers),
            store,
        }
    }

    #[must_use]
    pub fn current_id(&self) -> Option<&str> {
        self.current_id.as_deref()
    }

    /// Identity bound to the presented session id, if any.
    pub async fn identity_email(&self) -> Result<Option<String>> {
        match &self.current_id {
            Some(id) => self.store.get(id).await,
            None => Ok(None),
        }
    }

    /// Open a fresh session for `email`. Any session presented with the
    /// request is discarded so ids are never carried across logins.
    pub async fn open(&self, email: &str) -> Result<String> {
        if let Some(previous) = &self.current_id {
            self.store.destroy(previous).await?;
        }
        self.store.create(email).await
    }

    /// Destroy the session presented with the request (logout).
    pub async fn destroy_current(&self) -> Result<()> {
        match &self.current_id {
            Some(id) => self.store.destroy(id).await,
            None => Ok(()),
        }
    }
}

fn extract_session_cookie(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(COOKIE)?.to_str().ok()?;

    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE_NAME && !value.is_empty()).then(|| value.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with_cookie(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(value).expect("valid header"));
        headers
    }

    #[tokio::test]
    async fn create_get_destroy_round_trip() -> Result<()> {
        let store = MemorySessionStore::new();

        let id = store.create("a@example.com").await?;
        assert_eq!(store.get(&id).await?.as_deref(), Some("a@example.com"));

        store.destroy(&id).await?;
        assert_eq!(store.get(&id).await?, None);

        Ok(())
    }

    #[tokio::test]
    async fn session_ids_are_unique_per_login() -> Result<()> {
        let store = MemorySessionStore::new();
        let first = store.create("a@example.com").await?;
        let second = store.create("a@example.com").await?;
        assert_ne!(first, second);
        Ok(())
    }

    #[tokio::test]
    async fn context_resolves_identity_from_cookie() -> Result<()> {
        let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
        let id = store.create("a@example.com").await?;

        let headers = headers_with_cookie(&format!("{SESSION_COOKIE_NAME}={id}; other=1"));
        let context = SessionContext::from_headers(store, &headers);

        assert_eq!(context.current_id(), Some(id.as_str()));
        assert_eq!(
            context.identity_email().await?.as_deref(),
            Some("a@example.com")
        );

        Ok(())
    }

    #[tokio::test]
    async fn open_discards_previous_session() -> Result<()> {
        let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
        let old = store.create("a@example.com").await?;

        let headers = headers_with_cookie(&format!("{SESSION_COOKIE_NAME}={old}"));
        let context = SessionContext::from_headers(store.clone(), &headers);

        let fresh = context.open("a@example.com").await?;
        assert_ne!(fresh, old);
        assert_eq!(store.get(&old).await?, None);
        assert_eq!(store.get(&fresh).await?.as_deref(), Some("a@example.com"));

        Ok(())
    }

    #[tokio::test]
    async fn missing_cookie_means_no_identity() -> Result<()> {
        let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
        let context = SessionContext::from_headers(store, &HeaderMap::new());

        assert_eq!(context.current_id(), None);
        assert_eq!(context.identity_email().await?, None);
        context.destroy_current().await?;

        Ok(())
    }
}
