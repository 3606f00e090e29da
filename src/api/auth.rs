//! Session tokens, auth endpoints, and the request guards.
//!
//! Sessions are stateless: a signed, time-boxed JWT embedding the user id.
//! Verification checks the signature and expiry, then cross-checks the live
//! user record. A token signed before the user's last password change is
//! rejected even if it has not expired.

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, HeaderMap, StatusCode},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{AuthConfig, Config, Environment};
use crate::db::users::{self, NewUser};
use crate::db::{
    ForgotPasswordRequest, LoginRequest, ResetPasswordRequest, SignupRequest, User, UserResponse,
};
use crate::AppState;

use super::error::ApiError;

pub const SESSION_COOKIE: &str = "jwt";

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

/// Sign a session token for the given user id.
pub fn sign_token(user_id: &str, auth: &AuthConfig) -> Result<String, ApiError> {
    let now = chrono::Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        iat: now.timestamp(),
        exp: (now + chrono::Duration::days(auth.jwt_expires_in_days)).timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(auth.jwt_secret.as_bytes()),
    )
    .map_err(|e| ApiError::unexpected(e.to_string()))
}

/// Verify signature and expiry, returning the embedded claims.
pub fn verify_token(token: &str, auth: &AuthConfig) -> Result<Claims, ApiError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(auth.jwt_secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

/// The session cookie mirrors the token: http-only, secure in production.
fn session_cookie(token: String, config: &Config) -> Cookie<'static> {
    let mut cookie = Cookie::new(SESSION_COOKIE, token);
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_max_age(time::Duration::days(config.auth.cookie_expires_in_days));
    if config.environment == Environment::Production {
        cookie.set_secure(true);
    }
    cookie
}

/// Extract a bearer token from the Authorization header.
fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.to_string())
}

/// The authenticated caller. Extracting this is the login gate: handlers
/// that take a `CurrentUser` reject unauthenticated requests with 401.
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or_else(|| {
            ApiError::unauthorized("You are not logged in. Please log in to get access")
        })?;

        let claims = verify_token(&token, &state.config.auth)?;

        let user = users::find_by_id(&state.db, &claims.sub)
            .await
            .map_err(ApiError::from)?
            .ok_or_else(|| {
                ApiError::unauthorized("The user belonging to this token no longer exists")
            })?;

        if users::changed_password_after(&user, claims.iat) {
            return Err(ApiError::unauthorized(
                "User recently changed password, please log in again",
            ));
        }

        Ok(CurrentUser(user))
    }
}

/// Role gate for handlers that already resolved the caller.
pub fn restrict_to(user: &User, roles: &[&str]) -> Result<(), ApiError> {
    if roles.contains(&user.role.as_str()) {
        Ok(())
    } else {
        Err(ApiError::unauthorized(
            "You are not allowed to perform this action",
        ))
    }
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub status: &'static str,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub status: &'static str,
    pub token: String,
    pub data: SignupData,
}

#[derive(Debug, Serialize)]
pub struct SignupData {
    pub user: UserResponse,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub status: &'static str,
    pub message: String,
}

/// POST /api/v1/users/signup
pub async fn signup(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(req): Json<SignupRequest>,
) -> Result<(StatusCode, CookieJar, Json<SignupResponse>), ApiError> {
    let user = users::create(
        &state.db,
        NewUser {
            name: req.name,
            email: req.email,
            password: req.password,
            password_confirm: req.password_confirm,
        },
    )
    .await?;

    let token = sign_token(&user.id, &state.config.auth)?;
    let jar = jar.add(session_cookie(token.clone(), &state.config));

    tracing::info!(email = %user.email, "New user signed up");

    Ok((
        StatusCode::CREATED,
        jar,
        Json(SignupResponse {
            status: "success",
            token,
            data: SignupData {
                user: UserResponse::from(user),
            },
        }),
    ))
}

/// POST /api/v1/users/login
///
/// Unknown email and wrong password fail identically, so callers cannot
/// probe which addresses exist.
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, Json<TokenResponse>), ApiError> {
    let (Some(email), Some(password)) = (req.email, req.password) else {
        return Err(ApiError::bad_request("Please provide email and password"));
    };

    let user = users::find_by_email(&state.db, &email).await?;
    let verified = user
        .as_ref()
        .is_some_and(|u| users::verify_password(&password, &u.password_hash));
    let Some(user) = user.filter(|_| verified) else {
        return Err(ApiError::bad_request("Incorrect email or password"));
    };

    let token = sign_token(&user.id, &state.config.auth)?;
    let jar = jar.add(session_cookie(token.clone(), &state.config));

    Ok((
        jar,
        Json(TokenResponse {
            status: "success",
            token,
        }),
    ))
}

/// POST /api/v1/users/forgot-password
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let user = users::find_by_email(&state.db, &req.email)
        .await?
        .ok_or_else(|| ApiError::bad_request("There is no user with that email address"))?;

    let raw_token = users::create_reset_token(&state.db, &user.id).await?;

    let base_url = state
        .config
        .server
        .public_url
        .clone()
        .unwrap_or_else(|| {
            format!(
                "http://{}:{}",
                state.config.server.host, state.config.server.port
            )
        });
    let reset_url = format!("{base_url}/api/v1/users/reset-password/{raw_token}");

    if let Err(err) = state.mailer.send_password_reset(&user.email, &reset_url).await {
        tracing::error!(error = %err, "Failed to send password reset email");
        // The stored hash is useless without its raw token; drop it
        users::clear_reset_token(&state.db, &user.id).await?;
        return Err(ApiError::internal(
            "There was an error sending the email. Try again later",
        ));
    }

    Ok(Json(MessageResponse {
        status: "success",
        message: "Token sent to email".to_string(),
    }))
}

/// PATCH /api/v1/users/reset-password/:token
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(token): Path<String>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<(CookieJar, Json<TokenResponse>), ApiError> {
    let user = users::find_by_reset_token(&state.db, &token)
        .await?
        .ok_or_else(|| ApiError::bad_request("Reset token is invalid or has expired"))?;

    if let Err(e) = crate::db::validation::validate_password_pair(&req.password, &req.password_confirm)
    {
        return Err(ApiError::validation(&[e]));
    }

    // Rehashes, stamps password_changed_at, and clears the reset fields
    users::update_password(&state.db, &user.id, &req.password).await?;

    let token = sign_token(&user.id, &state.config.auth)?;
    let jar = jar.add(session_cookie(token.clone(), &state.config));

    Ok((
        jar,
        Json(TokenResponse {
            status: "success",
            token,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_auth() -> AuthConfig {
        AuthConfig {
            jwt_secret: "test-secret".to_string(),
            jwt_expires_in_days: 90,
            cookie_expires_in_days: 90,
        }
    }

    #[test]
    fn token_roundtrip() {
        let auth = test_auth();
        let token = sign_token("user-1", &auth).unwrap();
        let claims = verify_token(&token, &auth).unwrap();

        assert_eq!(claims.sub, "user-1");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = sign_token("user-1", &test_auth()).unwrap();

        let mut other = test_auth();
        other.jwt_secret = "different-secret".to_string();
        let err = verify_token(&token, &other).unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn tampered_token_is_rejected() {
        let auth = test_auth();
        let mut token = sign_token("user-1", &auth).unwrap();
        token.push('x');
        assert!(verify_token(&token, &auth).is_err());
    }

    #[test]
    fn role_gate() {
        let user = User {
            id: "u1".to_string(),
            name: "Admin".to_string(),
            email: "admin@example.com".to_string(),
            password_hash: String::new(),
            photo: None,
            role: "admin".to_string(),
            active: true,
            password_changed_at: None,
            password_reset_token: None,
            password_reset_expires: None,
            created_at: String::new(),
            updated_at: String::new(),
        };

        assert!(restrict_to(&user, &["admin"]).is_ok());
        assert!(restrict_to(&user, &["lead-guide"]).is_err());
    }

    #[test]
    fn bearer_extraction() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_none());

        headers.insert("Authorization", "Bearer abc.def.ghi".parse().unwrap());
        assert_eq!(bearer_token(&headers).unwrap(), "abc.def.ghi");

        headers.insert("Authorization", "Basic xyz".parse().unwrap());
        assert!(bearer_token(&headers).is_none());
    }
}
