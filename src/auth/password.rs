use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use std::sync::Arc;

use rand::rngs::OsRng;
use tracing::error;

use crate::config::HashConfig;

/// A password as it travels toward the store.
///
/// Only `Plain` values are ever hashed, so a value that already went through
/// the hasher cannot be hashed a second time by accident.
#[derive(Clone)]
pub enum Password {
    Plain(String),
    Hashed(String),
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Password::Plain(_) => f.write_str("Password::Plain(<redacted>)"),
            Password::Hashed(h) => write!(f, "Password::Hashed({h})"),
        }
    }
}

/// Argon2id hasher with a configurable work factor.
#[derive(Clone)]
pub struct Hasher {
    params: Params,
    // Verified against when there is no stored hash, at the same cost as a real one.
    dummy_hash: Arc<str>,
}

impl Hasher {
    pub fn new(cfg: &HashConfig) -> anyhow::Result<Self> {
        let params = Params::new(cfg.memory_kib, cfg.iterations, cfg.parallelism, None)
            .map_err(|e| anyhow::anyhow!("invalid argon2 params: {e}"))?;
        let mut hasher = Self {
            params,
            dummy_hash: Arc::from(""),
        };
        hasher.dummy_hash = Arc::from(hasher.hash("no such user")?);
        Ok(hasher)
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    pub fn hash(&self, plain: &str) -> anyhow::Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| {
                error!(error = %e, "argon2 hash_password error");
                anyhow::anyhow!(e.to_string())
            })?
            .to_string();
        Ok(hash)
    }

    /// Cost parameters are read from the stored hash, not from `self`.
    pub fn verify(&self, plain: &str, hash: &str) -> anyhow::Result<bool> {
        let parsed = PasswordHash::new(hash).map_err(|e| {
            error!(error = %e, "argon2 parse hash error");
            anyhow::anyhow!(e.to_string())
        })?;
        Ok(self
            .argon2()
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok())
    }

    pub fn hash_once(&self, password: Password) -> anyhow::Result<String> {
        match password {
            Password::Plain(plain) => self.hash(&plain),
            Password::Hashed(hash) => Ok(hash),
        }
    }

    /// `hash_once` on the blocking pool.
    pub async fn hash_once_blocking(&self, password: Password) -> anyhow::Result<String> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.hash_once(password)).await?
    }

    /// `verify` on the blocking pool.
    pub async fn verify_blocking(&self, plain: String, hash: String) -> anyhow::Result<bool> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&plain, &hash)).await?
    }

    /// Like `verify_blocking`, but with no stored hash it still pays for a full
    /// Argon2 run against the dummy hash and then answers `false`.
    pub async fn verify_or_dummy_blocking(
        &self,
        plain: String,
        hash: Option<String>,
    ) -> anyhow::Result<bool> {
        match hash {
            Some(hash) => self.verify_blocking(plain, hash).await,
            None => {
                self.verify_blocking(plain, self.dummy_hash.to_string())
                    .await?;
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
pub(crate) fn test_hasher() -> Hasher {
    Hasher::new(&HashConfig {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    })
    .expect("test params are valid")
}
