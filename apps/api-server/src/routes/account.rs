//! Registration, login, token refresh and the caller's own profile.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use domain::account::{GoogleProfile, ProfilePatch};
use domain::{CoreError, User};
use google_auth::AuthError;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::auth::{AuthUser, TokenKind};
use crate::dto::UserOut;
use crate::error::{ApiError, ApiResult};
use crate::extract::ApiJson;
use crate::routes::double_option;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct RegisterReq {
    name: String,
    email: String,
    password: String,
}

#[derive(Deserialize)]
pub struct LoginReq {
    email: String,
    password: String,
}

#[derive(Deserialize)]
pub struct GoogleReq {
    id_token: String,
}

#[derive(Deserialize)]
pub struct RefreshReq {
    refresh_token: String,
}

#[derive(Deserialize)]
pub struct UpdateMeReq {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    avatar_url: Option<Option<String>>,
}

#[derive(Deserialize)]
pub struct ChangePasswordReq {
    #[serde(default)]
    current_password: Option<String>,
    new_password: String,
}

#[derive(Serialize)]
pub struct SessionOut {
    user: UserOut,
    access_token: String,
    refresh_token: String,
    token_type: &'static str,
    expires_in: u64,
}

/// Issue a token pair and remember the refresh token as the only valid one.
fn start_session(state: &AppState, user: User) -> ApiResult<SessionOut> {
    let pair = state.tokens.issue_pair(&user, state.now())?;
    state
        .accounts
        .store_refresh_token(&user.id, &pair.refresh_token)?;
    Ok(SessionOut {
        user: user.into(),
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        token_type: "Bearer",
        expires_in: pair.expires_in,
    })
}

pub async fn register(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RegisterReq>,
) -> ApiResult<(StatusCode, Json<SessionOut>)> {
    let user = state
        .accounts
        .register(&body.name, &body.email, &body.password)?;
    info!(user_id = %user.id, role = user.role.as_str(), "account registered");
    Ok((StatusCode::CREATED, Json(start_session(&state, user)?)))
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<LoginReq>,
) -> ApiResult<Json<SessionOut>> {
    let user = state.accounts.authenticate(&body.email, &body.password)?;
    info!(user_id = %user.id, "login ok");
    Ok(Json(start_session(&state, user)?))
}

pub async fn google_sign_in(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<GoogleReq>,
) -> ApiResult<Json<SessionOut>> {
    let verifier = state
        .google
        .as_ref()
        .ok_or(ApiError::NotFound("google sign-in is not configured"))?;
    let identity = verifier.verify(&body.id_token).await.map_err(|e| {
        warn!(err = %e, "google token rejected");
        match e {
            AuthError::DomainNotAllowed => ApiError::Core(CoreError::Forbidden),
            AuthError::Network => ApiError::Unavailable("google keys unavailable"),
            _ => ApiError::Unauthorized("invalid google token"),
        }
    })?;
    let user = state.accounts.sign_in_with_google(GoogleProfile {
        subject: identity.sub,
        email: identity.email,
        name: identity.name,
        picture: identity.picture,
    })?;
    info!(user_id = %user.id, "google sign-in ok");
    Ok(Json(start_session(&state, user)?))
}

/// Exchange a refresh token for a new pair. The old refresh token stops
/// working.
pub async fn refresh(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RefreshReq>,
) -> ApiResult<Json<SessionOut>> {
    let claims = state.tokens.verify(&body.refresh_token, TokenKind::Refresh)?;
    let user = state
        .accounts
        .verify_refresh_token(&claims.sub, &body.refresh_token)?;
    Ok(Json(start_session(&state, user)?))
}

pub async fn logout(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
) -> ApiResult<StatusCode> {
    state.accounts.clear_refresh_token(&actor.user_id)?;
    info!(user_id = %actor.user_id, "logout");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn me(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
) -> ApiResult<Json<UserOut>> {
    Ok(Json(state.accounts.get(&actor.user_id)?.into()))
}

pub async fn update_me(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ApiJson(body): ApiJson<UpdateMeReq>,
) -> ApiResult<Json<UserOut>> {
    let user = state.accounts.update_profile(
        &actor.user_id,
        ProfilePatch {
            name: body.name,
            avatar_url: body.avatar_url,
        },
    )?;
    Ok(Json(user.into()))
}

pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ApiJson(body): ApiJson<ChangePasswordReq>,
) -> ApiResult<StatusCode> {
    state.accounts.change_password(
        &actor.user_id,
        body.current_password.as_deref(),
        &body.new_password,
    )?;
    info!(user_id = %actor.user_id, "password changed");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::testkit::{self, TestApp, ADMIN_EMAIL};
    use axum::http::Method;
    use google_auth::GoogleVerifier;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::{SystemTime, UNIX_EPOCH};

    async fn login_as(app: &TestApp, email: &str, password: &str) -> (StatusCode, serde_json::Value) {
        app.call(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({"email": email, "password": password})),
        )
        .await
    }

    #[tokio::test]
    async fn register_login_and_me() {
        let app = TestApp::new();
        let (token, id) = app.register("Lan", "lan@mail.com").await;

        let (status, me) = app.call(Method::GET, "/api/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["id"], id.as_str());
        assert_eq!(me["role"], "customer");
        assert_eq!(me["has_password"], true);

        let (status, body) = login_as(&app, "LAN@mail.com", "correct-horse").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["token_type"], "Bearer");

        let (status, body) = login_as(&app, "lan@mail.com", "wrong-horse").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "unauthorized");
    }

    #[tokio::test]
    async fn duplicate_and_invalid_registrations_are_rejected() {
        let app = TestApp::new();
        app.register("Lan", "lan@mail.com").await;
        let (status, body) = app
            .call(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({"name": "Lan 2", "email": "lan@mail.com", "password": "long-enough"})),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "conflict");

        let (status, body) = app
            .call(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({"name": "Mai", "email": "mai@mail.com", "password": "short"})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "validation");
    }

    #[tokio::test]
    async fn bootstrap_admin_email_gets_admin_role() {
        let app = TestApp::new();
        let token = app.admin().await;
        let (_, me) = app.call(Method::GET, "/api/me", Some(&token), None).await;
        assert_eq!(me["email"], ADMIN_EMAIL);
        assert_eq!(me["role"], "admin");
    }

    #[tokio::test]
    async fn refresh_rotates_and_logout_revokes() {
        let app = TestApp::new();
        let (status, session) = app
            .call(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({"name": "Lan", "email": "lan@mail.com", "password": "correct-horse"})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let first = session["refresh_token"].as_str().unwrap().to_string();

        let (status, rotated) = app
            .call(
                Method::POST,
                "/api/auth/refresh",
                None,
                Some(json!({"refresh_token": first})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let second = rotated["refresh_token"].as_str().unwrap().to_string();
        assert_ne!(first, second);

        // The superseded token no longer works.
        let (status, _) = app
            .call(
                Method::POST,
                "/api/auth/refresh",
                None,
                Some(json!({"refresh_token": first})),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        // Access tokens are not accepted as refresh tokens.
        let access = rotated["access_token"].as_str().unwrap();
        let (status, _) = app
            .call(
                Method::POST,
                "/api/auth/refresh",
                None,
                Some(json!({"refresh_token": access})),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = app
            .call(Method::POST, "/api/auth/logout", Some(access), None)
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = app
            .call(
                Method::POST,
                "/api/auth/refresh",
                None,
                Some(json!({"refresh_token": second})),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn profile_update_and_password_change() {
        let app = TestApp::new();
        let (token, _) = app.register("Lan", "lan@mail.com").await;

        let (status, me) = app
            .call(
                Method::PATCH,
                "/api/me",
                Some(&token),
                Some(json!({"name": "Lan Nguyen", "avatar_url": "https://cdn.shop.vn/a.png"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["name"], "Lan Nguyen");
        assert_eq!(me["avatar_url"], "https://cdn.shop.vn/a.png");

        let (_, me) = app
            .call(Method::PATCH, "/api/me", Some(&token), Some(json!({"avatar_url": null})))
            .await;
        assert!(me.get("avatar_url").is_none());
        assert_eq!(me["name"], "Lan Nguyen");

        let (status, _) = app
            .call(
                Method::POST,
                "/api/me/password",
                Some(&token),
                Some(json!({"current_password": "nope-nope", "new_password": "brand-new-pass"})),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = app
            .call(
                Method::POST,
                "/api/me/password",
                Some(&token),
                Some(json!({"current_password": "correct-horse", "new_password": "brand-new-pass"})),
            )
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = login_as(&app, "lan@mail.com", "brand-new-pass").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_or_garbage_tokens_are_401() {
        let app = TestApp::new();
        let (status, _) = app.call(Method::GET, "/api/me", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = app
            .call(Method::GET, "/api/me", Some("garbage"), None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn google_sign_in_is_404_when_unconfigured() {
        let app = TestApp::new();
        let (status, _) = app
            .call(
                Method::POST,
                "/api/auth/google",
                None,
                Some(json!({"id_token": "x.y.z"})),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    fn unsigned_google_token(email: &str) -> String {
        let exp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
            + 600;
        let claims = json!({
            "sub": "g-123",
            "aud": "client-1",
            "exp": exp,
            "email": email,
            "email_verified": true,
            "name": "Lan G",
        });
        jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(b"irrelevant"),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn google_sign_in_links_existing_account() {
        let mut state = testkit::state();
        state.google = Some(Arc::new(
            GoogleVerifier::new("client-1").insecure_skip_signature(true),
        ));
        let app = TestApp::with_state(state);
        let (_, id) = app.register("Lan", "lan@mail.com").await;

        let (status, body) = app
            .call(
                Method::POST,
                "/api/auth/google",
                None,
                Some(json!({"id_token": unsigned_google_token("lan@mail.com")})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["id"], id.as_str());
        assert_eq!(body["user"]["google_linked"], true);

        let (status, body) = app
            .call(
                Method::POST,
                "/api/auth/google",
                None,
                Some(json!({"id_token": "not-a-token"})),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{body}");
    }
}
