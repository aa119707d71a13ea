use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use axum_extra::extract::CookieJar;
use thiserror::Error;
use tracing::{debug, warn};

use crate::auth::cookie::SESSION_COOKIE;
use crate::auth::dto::Identity;
use crate::auth::jwt::{JwtKeys, TokenError};
use crate::auth::repo::{StoreError, UserStore};
use crate::error::AppError;

pub const MSG_NO_TOKEN: &str = "Not authorized to access this route, please login";
pub const MSG_INVALID_TOKEN: &str = "Invalid token";
pub const MSG_EXPIRED_TOKEN: &str = "Token expired";
pub const MSG_USER_NOT_FOUND: &str = "User not found";

/// Where an inbound token was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Cookie,
    Bearer,
}

/// Finds the session token: the `token` cookie first, then
/// `Authorization: Bearer <token>`. Empty values count as absent.
pub fn extract_token(headers: &HeaderMap) -> Option<(String, TokenSource)> {
    let jar = CookieJar::from_headers(headers);
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if !cookie.value().is_empty() {
            return Some((cookie.value().to_owned(), TokenSource::Cookie));
        }
    }

    let header = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, token) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| (token.to_owned(), TokenSource::Bearer))
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no token")]
    NoToken,
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("user not found")]
    UserNotFound,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NoToken => AppError::Unauthorized(MSG_NO_TOKEN.into()),
            SessionError::Token(TokenError::Expired) => {
                AppError::Unauthorized(MSG_EXPIRED_TOKEN.into())
            }
            SessionError::Token(TokenError::Malformed | TokenError::SignatureInvalid) => {
                AppError::Unauthorized(MSG_INVALID_TOKEN.into())
            }
            SessionError::UserNotFound => AppError::Unauthorized(MSG_USER_NOT_FOUND.into()),
            SessionError::Store(e) => AppError::Internal(e.into()),
        }
    }
}

/// Runs the whole session state machine for one request.
pub async fn resolve_session(
    headers: &HeaderMap,
    keys: &JwtKeys,
    users: &dyn UserStore,
) -> Result<Identity, SessionError> {
    let (token, source) = extract_token(headers).ok_or(SessionError::NoToken)?;
    let claims = keys.verify(&token).map_err(|e| {
        warn!(error = %e, ?source, "session token rejected");
        e
    })?;
    let user = users
        .find_by_id(claims.sub)
        .await?
        .ok_or_else(|| {
            warn!(user_id = %claims.sub, "session token for unknown user");
            SessionError::UserNotFound
        })?;
    debug!(user_id = %user.id, ?source, "session resolved");
    Ok(Identity::from(&user))
}

/// Requires a valid session; rejects with 401 otherwise.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Identity);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
    Arc<dyn UserStore>: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let users = Arc::<dyn UserStore>::from_ref(state);
        let identity = resolve_session(&parts.headers, &keys, users.as_ref()).await?;
        parts.extensions.insert(identity.clone());
        Ok(AuthUser(identity))
    }
}

/// Same resolution as `AuthUser`, but never rejects.
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<Identity>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeAuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
    Arc<dyn UserStore>: FromRef<S>,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let users = Arc::<dyn UserStore>::from_ref(state);
        match resolve_session(&parts.headers, &keys, users.as_ref()).await {
            Ok(identity) => {
                parts.extensions.insert(identity.clone());
                Ok(MaybeAuthUser(Some(identity)))
            }
            Err(e) => {
                debug!(error = %e, "optional session not resolved");
                Ok(MaybeAuthUser(None))
            }
        }
    }
}
