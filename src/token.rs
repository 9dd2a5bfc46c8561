//! Signed bearer tokens carrying the identity claim.

use anyhow::{Context, Result};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Identity claim (canonical email).
    pub session: String,
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
    pub iss: String,
}

/// HS256 signer/verifier for the gateway's short-lived bearer tokens.
#[derive(Clone)]
pub struct TokenSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
}

impl TokenSigner {
    #[must_use]
    pub fn new(secret: &SecretString, issuer: impl Into<String>) -> Self {
        let secret = secret.expose_secret().as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: issuer.into(),
        }
    }

    /// Mint a signed token asserting `subject` for `ttl_seconds`.
    pub fn create_signed_token(&self, subject: &str, ttl_seconds: i64) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            session: subject.to_string(),
            sub: subject.to_string(),
            exp: now + ttl_seconds,
            iat: now,
            iss: self.issuer.clone(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).context("failed to sign token")
    }

    /// Verify signature, expiry and issuer; returns the claims on success.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.issuer]);

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .context("token verification failed")
    }
}
