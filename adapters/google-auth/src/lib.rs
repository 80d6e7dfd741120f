//! google-auth: Google ID token verification adapter (claims + JWKS signature).
//!
//! Purpose
//! - Verify the ID token a shopper's browser obtains from Google Sign-In so
//!   the API can log them in or create their account.
//! - By default, verifies the RS256 signature against Google's JWKS and
//!   validates core claims (audience, expiry, issuer, verified email). An
//!   optional hosted domain restricts sign-in to one Google Workspace.
//! - For development, signature verification can be disabled per verifier
//!   (`insecure_skip_signature`); only the claims are checked then.
//!
//! API
//! - `GoogleVerifier::new(client_id)` and builder-style options
//! - `GoogleVerifier::verify(id_token)` → `Result<GoogleIdentity, AuthError>`
//!
//! Notes
//! - Fetches JWKS with `reqwest` and caches keys per verifier for a short
//!   TTL to follow key rotation.

use base64::Engine;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, trace, warn};

/// Identity asserted by a verified Google ID token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleIdentity {
    pub sub: String,
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing or malformed token")]
    Malformed,
    #[error("invalid token payload: {0}")]
    InvalidPayload(&'static str),
    #[error("signature invalid")]
    SignatureInvalid,
    #[error("token expired")]
    Expired,
    #[error("audience mismatch")]
    BadAudience,
    #[error("email not verified")]
    EmailNotVerified,
    #[error("domain not allowed")]
    DomainNotAllowed,
    #[error("network or jwks fetch error")]
    Network,
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    aud: serde_json::Value, // can be string or array
    exp: Option<u64>,
    email: Option<String>,
    email_verified: Option<bool>,
    hd: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

const JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";
const JWKS_TTL: Duration = Duration::from_secs(15 * 60);
const ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

#[derive(Debug, Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kid: String,
    kty: String,
    n: Option<String>,
    e: Option<String>,
}

struct JwksCache {
    fetched_at: SystemTime,
    keys: HashMap<String, DecodingKey>,
}

enum KeySource {
    Remote(reqwest::Client),
    /// Fixed key set, never refreshed.
    Static,
}

/// Verifies Google ID tokens for one OAuth client.
pub struct GoogleVerifier {
    client_id: String,
    hosted_domain: Option<String>,
    insecure_skip_signature: bool,
    source: KeySource,
    cache: Mutex<JwksCache>,
}

impl GoogleVerifier {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            hosted_domain: None,
            insecure_skip_signature: false,
            source: KeySource::Remote(reqwest::Client::new()),
            cache: Mutex::new(JwksCache {
                fetched_at: UNIX_EPOCH,
                keys: HashMap::new(),
            }),
        }
    }

    /// Only accept accounts of this Google Workspace domain.
    pub fn with_hosted_domain(mut self, domain: Option<String>) -> Self {
        self.hosted_domain = domain.filter(|d| !d.trim().is_empty());
        self
    }

    /// Skip signature verification. Development only.
    pub fn insecure_skip_signature(mut self, skip: bool) -> Self {
        if skip {
            warn!("google-auth: signature verification disabled");
        }
        self.insecure_skip_signature = skip;
        self
    }

    /// Use a fixed JWKS document instead of fetching Google's.
    pub fn with_static_jwks(mut self, jwks_json: &str) -> Result<Self, AuthError> {
        let jwks: Jwks = serde_json::from_str(jwks_json).map_err(|_| AuthError::Malformed)?;
        self.source = KeySource::Static;
        self.cache = Mutex::new(JwksCache {
            fetched_at: SystemTime::now(),
            keys: decoding_keys(jwks),
        });
        Ok(self)
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Verify an ID token and return the identity it asserts.
    pub async fn verify(&self, id_token: &str) -> Result<GoogleIdentity, AuthError> {
        if self.insecure_skip_signature {
            trace!("google-auth: insecure mode – skipping signature verification");
            return self.verify_claims_only(id_token, SystemTime::now());
        }

        let header = decode_header(id_token).map_err(|_| AuthError::Malformed)?;
        if header.alg != Algorithm::RS256 {
            // Only RS256 supported for Google ID tokens
            return Err(AuthError::Malformed);
        }
        let kid = header.kid.ok_or(AuthError::Malformed)?;
        let key = self.key_for(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[self.client_id.as_str()]);
        validation.set_issuer(&ISSUERS);

        let token_data =
            decode::<Claims>(id_token, &key, &validation).map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::InvalidToken
                | jsonwebtoken::errors::ErrorKind::InvalidSignature => AuthError::SignatureInvalid,
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
                jsonwebtoken::errors::ErrorKind::InvalidAudience => AuthError::BadAudience,
                _ => AuthError::Malformed,
            })?;

        self.identity_from(token_data.claims)
    }

    fn verify_claims_only(
        &self,
        id_token: &str,
        now: SystemTime,
    ) -> Result<GoogleIdentity, AuthError> {
        let parts: Vec<&str> = id_token.split('.').collect();
        if parts.len() != 3 {
            return Err(AuthError::Malformed);
        }
        let payload_bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(parts[1].as_bytes())
            .map_err(|_| AuthError::Malformed)?;
        let claims: Claims = serde_json::from_slice(&payload_bytes)
            .map_err(|_| AuthError::InvalidPayload("json"))?;

        // Audience check (string or array)
        let expected = self.client_id.as_str();
        match &claims.aud {
            serde_json::Value::String(s) if s == expected => {}
            serde_json::Value::Array(arr) if arr.iter().any(|v| v.as_str() == Some(expected)) => {}
            _ => return Err(AuthError::BadAudience),
        }

        if let Some(exp) = claims.exp {
            let now = now
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs();
            if exp <= now {
                return Err(AuthError::Expired);
            }
        }

        self.identity_from(claims)
    }

    fn identity_from(&self, claims: Claims) -> Result<GoogleIdentity, AuthError> {
        let email = claims.email.ok_or(AuthError::InvalidPayload("email"))?;
        if claims.email_verified != Some(true) {
            return Err(AuthError::EmailNotVerified);
        }

        // Domain enforcement: prefer `hd`, fallback to email domain
        if let Some(allowed) = &self.hosted_domain {
            let domain_ok = match &claims.hd {
                Some(hd) => hd.eq_ignore_ascii_case(allowed),
                None => email
                    .rsplit_once('@')
                    .map(|(_, d)| d.eq_ignore_ascii_case(allowed))
                    .unwrap_or(false),
            };
            if !domain_ok {
                return Err(AuthError::DomainNotAllowed);
            }
        }

        Ok(GoogleIdentity {
            sub: claims.sub,
            email,
            name: claims.name,
            picture: claims.picture,
        })
    }

    async fn key_for(&self, kid: &str) -> Result<DecodingKey, AuthError> {
        // Check the cache without holding the lock across the fetch.
        {
            let cache = self.cache.lock().map_err(|_| AuthError::Network)?;
            let fresh = cache.fetched_at + JWKS_TTL > SystemTime::now();
            if fresh || matches!(self.source, KeySource::Static) {
                if let Some(k) = cache.keys.get(kid) {
                    return Ok(k.clone());
                }
            }
        }

        let client = match &self.source {
            KeySource::Remote(client) => client,
            KeySource::Static => return Err(AuthError::SignatureInvalid),
        };
        debug!(kid, "google-auth: refreshing JWKS");
        let keys = fetch_jwks(client).await.map_err(|e| {
            warn!(error = %e, "google-auth: JWKS fetch failed");
            AuthError::Network
        })?;
        let mut cache = self.cache.lock().map_err(|_| AuthError::Network)?;
        cache.keys = keys;
        cache.fetched_at = SystemTime::now();
        // An unknown kid after a refresh means the token was not signed by Google.
        cache
            .keys
            .get(kid)
            .cloned()
            .ok_or(AuthError::SignatureInvalid)
    }
}

fn decoding_keys(jwks: Jwks) -> HashMap<String, DecodingKey> {
    let mut map = HashMap::new();
    for k in jwks.keys.into_iter() {
        if k.kty == "RSA" {
            if let (Some(n), Some(e)) = (k.n.as_deref(), k.e.as_deref()) {
                if let Ok(key) = DecodingKey::from_rsa_components(n, e) {
                    map.insert(k.kid, key);
                }
            }
        }
    }
    map
}

async fn fetch_jwks(client: &reqwest::Client) -> Result<HashMap<String, DecodingKey>, reqwest::Error> {
    let resp = client.get(JWKS_URL).send().await?.error_for_status()?;
    let jwks: Jwks = resp.json().await?;
    Ok(decoding_keys(jwks))
}
