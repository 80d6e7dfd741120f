//! Token issuing, password hashing and request authentication.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap};
use domain::service::Actor;
use domain::{CoreError, PasswordHasher, Role, User, UserEmail};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub const DEBUG_USER_HEADER: &str = "x-debug-user";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub kind: TokenKind,
    pub iat: u64,
    pub exp: u64,
    /// Makes every issued token distinct, so rotation always changes it.
    pub jti: String,
}

/// A freshly issued access/refresh pair.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
}

/// HS256 signer and verifier for session tokens.
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn issue(
        &self,
        user_id: &str,
        role: Role,
        kind: TokenKind,
        now: SystemTime,
    ) -> ApiResult<String> {
        let iat = now
            .duration_since(UNIX_EPOCH)
            .map_err(|e| ApiError::Internal(format!("clock before epoch: {e}")))?
            .as_secs();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let claims = Claims {
            sub: user_id.to_string(),
            role: role.as_str().to_string(),
            kind,
            iat,
            exp: iat + ttl.as_secs(),
            jti: uuid::Uuid::new_v4().to_string(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| ApiError::Internal(format!("token signing failed: {e}")))
    }

    pub fn issue_pair(&self, user: &User, now: SystemTime) -> ApiResult<TokenPair> {
        Ok(TokenPair {
            access_token: self.issue(&user.id, user.role, TokenKind::Access, now)?,
            refresh_token: self.issue(&user.id, user.role, TokenKind::Refresh, now)?,
            expires_in: self.access_ttl.as_secs(),
        })
    }

    /// Decode a token and check that it is of the expected kind.
    pub fn verify(&self, token: &str, kind: TokenKind) -> ApiResult<Claims> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            debug!(err = %e, "token rejected");
            ApiError::Unauthorized("invalid or expired token")
        })?;
        if data.claims.kind != kind {
            return Err(ApiError::Unauthorized("wrong token type"));
        }
        Ok(data.claims)
    }
}

/// bcrypt-backed [`PasswordHasher`].
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }
}

impl Default for BcryptHasher {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

impl PasswordHasher for BcryptHasher {
    fn hash(&self, plain: &str) -> Result<String, CoreError> {
        bcrypt::hash(plain, self.cost).map_err(|e| CoreError::Repository(e.to_string()))
    }

    fn verify(&self, plain: &str, hash: &str) -> bool {
        bcrypt::verify(plain, hash).unwrap_or(false)
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolve the caller from a bearer token, an explicit token (the socket
/// passes it as a query parameter) or, in debug mode, `X-Debug-User`.
///
/// Returns `Ok(None)` when no credentials were presented at all. The account
/// is re-read so role changes and blocks apply to live tokens.
pub fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
    explicit_token: Option<&str>,
) -> ApiResult<Option<Actor>> {
    let user_id = if let Some(token) = explicit_token.or_else(|| bearer_token(headers)) {
        state.tokens.verify(token, TokenKind::Access)?.sub
    } else if state.auth_debug_header {
        match headers.get(DEBUG_USER_HEADER).and_then(|v| v.to_str().ok()) {
            Some(who) => debug_user_id(state, who)?,
            None => return Ok(None),
        }
    } else {
        return Ok(None);
    };

    let user = match state.accounts.get(&user_id) {
        Ok(u) => u,
        Err(CoreError::NotFound) => return Err(ApiError::Unauthorized("unknown account")),
        Err(e) => return Err(e.into()),
    };
    if user.is_blocked {
        warn!(user_id = %user.id, "blocked account presented a token");
        return Err(CoreError::Forbidden.into());
    }
    Ok(Some(Actor::new(user.id, user.role)))
}

/// `X-Debug-User` carries either a user id or an email.
fn debug_user_id(state: &AppState, who: &str) -> ApiResult<String> {
    if who.contains('@') {
        let email = UserEmail::new(who)?;
        return state
            .accounts
            .find_by_email(&email)?
            .map(|u| u.id)
            .ok_or(ApiError::Unauthorized("unknown debug user"));
    }
    Ok(who.to_string())
}

/// The authenticated caller. Rejects with 401 when no credentials were sent.
pub struct AuthUser(pub Actor);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        authenticate(state, &parts.headers, None)?
            .map(AuthUser)
            .ok_or(ApiError::Unauthorized("missing credentials"))
    }
}

/// An authenticated admin; other roles get 403.
pub struct AdminUser(pub Actor);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthUser(actor) = AuthUser::from_request_parts(parts, state).await?;
        if !actor.is_admin() {
            return Err(CoreError::Forbidden.into());
        }
        Ok(AdminUser(actor))
    }
}

/// The caller if credentials were sent. Bad credentials still reject.
pub struct MaybeUser(pub Option<Actor>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(authenticate(state, &parts.headers, None)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(
            "test-secret-0123456789",
            Duration::from_secs(900),
            Duration::from_secs(3600),
        )
    }

    #[test]
    fn access_token_round_trips() {
        let t = issuer();
        let token = t
            .issue("u1", Role::Consultant, TokenKind::Access, SystemTime::now())
            .unwrap();
        let claims = t.verify(&token, TokenKind::Access).unwrap();
        assert_eq!(claims.sub, "u1");
        assert_eq!(claims.role, "consultant");
        assert_eq!(claims.exp - claims.iat, 900);
    }

    #[test]
    fn kinds_are_not_interchangeable() {
        let t = issuer();
        let refresh = t
            .issue("u1", Role::Customer, TokenKind::Refresh, SystemTime::now())
            .unwrap();
        assert!(matches!(
            t.verify(&refresh, TokenKind::Access),
            Err(ApiError::Unauthorized(_))
        ));
        assert!(t.verify(&refresh, TokenKind::Refresh).is_ok());
    }

    #[test]
    fn expired_and_foreign_tokens_are_rejected() {
        let t = issuer();
        let past = SystemTime::now() - Duration::from_secs(7200);
        let old = t.issue("u1", Role::Customer, TokenKind::Access, past).unwrap();
        assert!(t.verify(&old, TokenKind::Access).is_err());

        let other = TokenIssuer::new(
            "another-secret-9876543210",
            Duration::from_secs(900),
            Duration::from_secs(3600),
        );
        let forged = other
            .issue("u1", Role::Admin, TokenKind::Access, SystemTime::now())
            .unwrap();
        assert!(t.verify(&forged, TokenKind::Access).is_err());
        assert!(t.verify("not.a.jwt", TokenKind::Access).is_err());
    }

    #[test]
    fn rotated_tokens_differ() {
        let t = issuer();
        let now = SystemTime::now();
        let a = t.issue("u1", Role::Customer, TokenKind::Refresh, now).unwrap();
        let b = t.issue("u1", Role::Customer, TokenKind::Refresh, now).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn bcrypt_hasher_verifies() {
        let h = BcryptHasher::new(4);
        let hash = h.hash("hunter2hunter2").unwrap();
        assert!(h.verify("hunter2hunter2", &hash));
        assert!(!h.verify("wrong-password", &hash));
        assert!(!h.verify("hunter2hunter2", "not-a-bcrypt-hash"));
    }

    #[test]
    fn bearer_header_is_parsed() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert(header::AUTHORIZATION, "Bearer abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc"));
        headers.insert(header::AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
    }
}
