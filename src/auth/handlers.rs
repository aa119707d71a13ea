use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::{CookieJar, WithRejection};
use tracing::instrument;

use crate::{
    auth::{
        cookie::{cleared_cookie, session_cookie},
        dto::{
            AuthResponse, LoginRequest, MessageResponse, ProfileResponse, RegisterRequest,
            SessionResponse, VerifyResponse,
        },
        extractors::{AuthUser, MaybeAuthUser},
        services::AuthService,
    },
    error::AppError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/profile", get(profile))
        .route("/auth/verify", get(verify))
        .route("/auth/session", get(session))
}

#[instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    State(auth): State<AuthService>,
    jar: CookieJar,
    WithRejection(Json(payload), _): WithRejection<Json<RegisterRequest>, AppError>,
) -> Result<(StatusCode, CookieJar, Json<AuthResponse>), AppError> {
    let session = auth.register(payload).await?;
    let jar = jar.add(session_cookie(&state.config, session.token.clone()));
    Ok((
        StatusCode::CREATED,
        jar,
        Json(AuthResponse {
            success: true,
            token: session.token,
            user: session.user,
        }),
    ))
}

#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    State(auth): State<AuthService>,
    jar: CookieJar,
    WithRejection(Json(payload), _): WithRejection<Json<LoginRequest>, AppError>,
) -> Result<(CookieJar, Json<AuthResponse>), AppError> {
    let session = auth.login(payload).await?;
    let jar = jar.add(session_cookie(&state.config, session.token.clone()));
    Ok((
        jar,
        Json(AuthResponse {
            success: true,
            token: session.token,
            user: session.user,
        }),
    ))
}

#[instrument(skip_all, fields(user_id = %identity.id))]
pub async fn profile(
    State(auth): State<AuthService>,
    AuthUser(identity): AuthUser,
) -> Result<Json<ProfileResponse>, AppError> {
    let user = auth.profile(&identity).await?;
    Ok(Json(ProfileResponse {
        success: true,
        user,
    }))
}

#[instrument(skip_all, fields(user_id = %identity.id))]
pub async fn logout(
    State(state): State<AppState>,
    State(auth): State<AuthService>,
    jar: CookieJar,
    AuthUser(identity): AuthUser,
) -> (CookieJar, Json<MessageResponse>) {
    auth.logout(&identity);
    (
        jar.add(cleared_cookie(&state.config)),
        Json(MessageResponse {
            success: true,
            message: "Logged out successfully",
        }),
    )
}

#[instrument(skip_all, fields(user_id = %identity.id))]
pub async fn verify(
    State(auth): State<AuthService>,
    AuthUser(identity): AuthUser,
) -> Json<VerifyResponse> {
    Json(VerifyResponse {
        success: true,
        authenticated: true,
        user: auth.verify(identity),
    })
}

pub async fn session(MaybeAuthUser(identity): MaybeAuthUser) -> Json<SessionResponse> {
    Json(SessionResponse {
        success: true,
        authenticated: identity.is_some(),
        user: identity,
    })
}
