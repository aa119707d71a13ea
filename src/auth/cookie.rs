use axum_extra::extract::cookie::{Cookie, SameSite};
use time::{Duration, OffsetDateTime, PrimitiveDateTime};

use crate::config::AppConfig;

pub const SESSION_COOKIE: &str = "token";

pub fn session_cookie(cfg: &AppConfig, token: String) -> Cookie<'static> {
    let max_age = Duration::days(cfg.cookie.expire_days);
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(cfg.environment.is_production())
        .same_site(SameSite::Strict)
        .max_age(max_age)
        .expires(
            OffsetDateTime::now_utc()
                .checked_add(max_age)
                .unwrap_or(PrimitiveDateTime::MAX.assume_utc()),
        )
        .build()
}

/// Overwrites the session cookie with an empty value that is already expired.
pub fn cleared_cookie(cfg: &AppConfig) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .http_only(true)
        .secure(cfg.environment.is_production())
        .same_site(SameSite::Strict)
        .max_age(Duration::ZERO)
        .expires(OffsetDateTime::UNIX_EPOCH)
        .build()
}
