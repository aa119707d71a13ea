use std::sync::Arc;

use axum::extract::FromRef;

use crate::auth::jwt::JwtKeys;
use crate::auth::password::Hasher;
use crate::auth::repo::UserStore;
use crate::auth::services::AuthService;
use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
    pub hasher: Hasher,
    pub keys: JwtKeys,
}

impl AppState {
    /// Wires the store handle and configuration together. The store's own
    /// lifecycle (connect, migrate, close) stays with the caller.
    pub fn new(config: AppConfig, users: Arc<dyn UserStore>) -> anyhow::Result<Self> {
        let hasher = Hasher::new(&config.hash)?;
        let keys = JwtKeys::new(&config.jwt);
        Ok(Self {
            config: Arc::new(config),
            users,
            hasher,
            keys,
        })
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        state.keys.clone()
    }
}

impl FromRef<AppState> for Arc<dyn UserStore> {
    fn from_ref(state: &AppState) -> Self {
        state.users.clone()
    }
}

impl FromRef<AppState> for AuthService {
    fn from_ref(state: &AppState) -> Self {
        AuthService::new(state.users.clone(), state.hasher.clone(), state.keys.clone())
    }
}
