use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

impl FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(anyhow!("unknown APP_ENV `{other}`")),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => f.write_str("development"),
            Environment::Production => f.write_str("production"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_seconds: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CookieConfig {
    pub expire_days: i64,
}

/// Argon2 work factor.
#[derive(Debug, Clone, Deserialize)]
pub struct HashConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub environment: Environment,
    pub host: String,
    pub port: u16,
    pub client_url: String,
    pub jwt: JwtConfig,
    pub cookie: CookieConfig,
    pub hash: HashConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let environment = match std::env::var("APP_ENV") {
            Ok(v) => v.parse()?,
            Err(_) => Environment::Development,
        };
        let ttl_seconds = match std::env::var("JWT_EXPIRE") {
            Ok(v) => parse_duration_secs(&v)?,
            Err(_) => 7 * 24 * 60 * 60,
        };
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "authgate".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "authgate-users".into()),
            ttl_seconds,
        };
        let cookie = CookieConfig {
            expire_days: cookie_expire_days(std::env::var("COOKIE_EXPIRE").ok().as_deref()),
        };
        let defaults = HashConfig::default();
        let hash = HashConfig {
            memory_kib: env_or("ARGON2_MEMORY_KIB", defaults.memory_kib),
            iterations: env_or("ARGON2_ITERATIONS", defaults.iterations),
            parallelism: env_or("ARGON2_PARALLELISM", defaults.parallelism),
        };
        Ok(Self {
            database_url,
            environment,
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env_or("APP_PORT", 8080),
            client_url: std::env::var("CLIENT_URL")
                .unwrap_or_else(|_| "http://localhost:3000".into()),
            jwt,
            cookie,
            hash,
        })
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

/// Upper bound for token and cookie lifetimes: ten years.
pub const MAX_LIFETIME_SECS: i64 = 10 * 365 * 24 * 60 * 60;

pub const DEFAULT_COOKIE_DAYS: i64 = 7;

/// Cookie lifetime in days. Unparseable, non-positive or oversized values
/// fall back to the default.
pub fn cookie_expire_days(raw: Option<&str>) -> i64 {
    let Some(raw) = raw else {
        return DEFAULT_COOKIE_DAYS;
    };
    match raw.trim().parse::<i64>() {
        Ok(days) if days > 0 && days <= MAX_LIFETIME_SECS / (24 * 60 * 60) => days,
        _ => {
            tracing::warn!(value = %raw, "invalid COOKIE_EXPIRE, using default");
            DEFAULT_COOKIE_DAYS
        }
    }
}

/// Parses `7d`, `12h`, `30m`, `45s` or a bare number of seconds.
pub fn parse_duration_secs(raw: &str) -> anyhow::Result<i64> {
    let raw = raw.trim();
    let (digits, unit) = match raw.char_indices().last() {
        Some((idx, c)) if c.is_ascii_alphabetic() => (&raw[..idx], Some(c)),
        _ => (raw, None),
    };
    let value: i64 = digits
        .parse()
        .with_context(|| format!("invalid duration `{raw}`"))?;
    let factor = match unit.map(|c| c.to_ascii_lowercase()) {
        None | Some('s') => 1,
        Some('m') => 60,
        Some('h') => 60 * 60,
        Some('d') => 24 * 60 * 60,
        Some(other) => anyhow::bail!("unknown duration unit `{other}` in `{raw}`"),
    };
    if value <= 0 {
        anyhow::bail!("duration must be positive, got `{raw}`");
    }
    match value.checked_mul(factor) {
        Some(secs) if secs <= MAX_LIFETIME_SECS => Ok(secs),
        _ => anyhow::bail!("duration `{raw}` exceeds the ten year maximum"),
    }
}
