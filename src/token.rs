//! Embed Token Issuer
//!
//! Signs the short-lived identity tokens Grafana's JWT auth trusts for iframe
//! auto-login, and publishes the matching public key as a JWKS document.
//!
//! # Token Shape
//!
//! - **Header**: `alg=RS256`, `kid=grafana-key-1`
//! - **Claims**: `iss=glpi_plugin`, `sub=<service account>`, `iat`, `exp=iat+1h`
//!
//! The subject is always the configured Grafana service account. Which helpdesk
//! profile may see which dashboard is decided by the rights table, never by
//! the token identity.
//!
//! `KEY_ID` is shared by the signer and the JWKS document. Bump it on both
//! sides together if keys are ever rotated.

use crate::keys::{KeyCache, KeyError, KeyPair};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, Header};
use rsa::traits::PublicKeyParts;
use rsa::RsaPublicKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Issuer claim identifying this integration
pub const ISSUER: &str = "glpi_plugin";

/// Key identifier shared between token header and JWKS document
pub const KEY_ID: &str = "grafana-key-1";

/// Token lifetime (1 hour)
pub const TOKEN_TTL_SECS: i64 = 3600;

/// Client-side refresh interval (55 minutes, inside the TTL)
pub const REFRESH_INTERVAL_SECS: u64 = 55 * 60;

/// Token issuance errors
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Token subject must not be empty")]
    EmptySubject,

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error("Signing failed: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

/// Embed token claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedClaims {
    /// Issuer
    pub iss: String,
    /// Subject (Grafana service account)
    pub sub: String,
    /// Issued at
    pub iat: i64,
    /// Expiration
    pub exp: i64,
}

/// A signed, time-bounded embed token
#[derive(Debug, Clone)]
pub struct EmbedToken {
    token: String,
    claims: EmbedClaims,
}

impl EmbedToken {
    /// Compact JWS serialization
    pub fn as_str(&self) -> &str {
        &self.token
    }

    pub fn into_string(self) -> String {
        self.token
    }

    pub fn claims(&self) -> &EmbedClaims {
        &self.claims
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.claims.exp, 0)
    }
}

/// Single JSON Web Key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    pub kid: String,
    #[serde(rename = "use")]
    pub key_use: String,
    pub alg: String,
    pub n: String,
    pub e: String,
}

/// JSON Web Key Set document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

/// Issue a token for `subject`, valid for one hour from now
pub fn issue_token(subject: &str, keys: &KeyPair) -> Result<EmbedToken, TokenError> {
    issue_token_at(subject, keys, Utc::now())
}

/// Issue a token as if the current time were `now`
pub fn issue_token_at(
    subject: &str,
    keys: &KeyPair,
    now: DateTime<Utc>,
) -> Result<EmbedToken, TokenError> {
    if subject.is_empty() {
        return Err(TokenError::EmptySubject);
    }

    let claims = EmbedClaims {
        iss: ISSUER.to_string(),
        sub: subject.to_string(),
        iat: now.timestamp(),
        exp: (now + Duration::seconds(TOKEN_TTL_SECS)).timestamp(),
    };

    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(KEY_ID.to_string());

    let token = encode(&header, &claims, keys.encoding_key())?;

    Ok(EmbedToken { token, claims })
}

/// Export the public key as a single-key JWKS document
pub fn publish_jwks(public_key: &RsaPublicKey) -> JwkSet {
    JwkSet {
        keys: vec![Jwk {
            kty: "RSA".to_string(),
            kid: KEY_ID.to_string(),
            key_use: "sig".to_string(),
            alg: "RS256".to_string(),
            n: URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
            e: URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
        }],
    }
}

/// Token issuer backed by the cached key pair
#[derive(Debug)]
pub struct TokenIssuer {
    keys: KeyCache,
}

impl TokenIssuer {
    pub fn new(keys: KeyCache) -> Self {
        Self { keys }
    }

    /// Issue a fresh token for the service account
    pub fn issue(&self, subject: &str) -> Result<EmbedToken, TokenError> {
        let keys = self.keys.get()?;
        let token = issue_token(subject, &keys)?;

        debug!("Issued embed token for {} (exp {})", subject, token.claims.exp);
        Ok(token)
    }

    /// Replace an embedded token before it expires; same as `issue`
    pub fn refresh(&self, subject: &str) -> Result<EmbedToken, TokenError> {
        self.issue(subject)
    }

    /// JWKS document for the current public key
    pub fn jwks(&self) -> Result<JwkSet, TokenError> {
        let keys = self.keys.get()?;
        Ok(publish_jwks(keys.public_key()))
    }
}
