use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{info, warn};

use crate::auth::dto::{Identity, LoginRequest, PublicUser, RegisterRequest};
use crate::auth::jwt::JwtKeys;
use crate::auth::password::{Hasher, Password};
use crate::auth::repo::{StoreError, UserStore};
use crate::auth::repo_types::{NewUser, User};
use crate::auth::validation::{
    normalize_login, normalize_register, validate_login, validate_register,
};
use crate::error::AppError;

pub const MSG_PASSWORD_MISMATCH: &str = "Passwords do not match";
pub const MSG_EMAIL_TAKEN: &str = "Email already registered";
pub const MSG_BAD_CREDENTIALS: &str = "Invalid email or password";

/// A freshly minted session: the token plus who it belongs to.
#[derive(Debug)]
pub struct Session {
    pub token: String,
    pub user: PublicUser,
}

/// Register/login/profile orchestration over an injected store.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    hasher: Hasher,
    keys: JwtKeys,
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateEmail => AppError::Conflict(MSG_EMAIL_TAKEN.into()),
            StoreError::Database(e) => AppError::Internal(e.into()),
        }
    }
}

impl AuthService {
    pub fn new(users: Arc<dyn UserStore>, hasher: Hasher, keys: JwtKeys) -> Self {
        Self {
            users,
            hasher,
            keys,
        }
    }

    pub async fn register(&self, mut req: RegisterRequest) -> Result<Session, AppError> {
        normalize_register(&mut req);

        let errors = validate_register(&req);
        if !errors.is_empty() {
            let fields: Vec<&str> = errors.iter().map(|e| e.field).collect();
            warn!(?fields, "register validation failed");
            return Err(AppError::Validation(errors));
        }

        if req.password != req.confirm_password {
            warn!("register password mismatch");
            return Err(AppError::Conflict(MSG_PASSWORD_MISMATCH.into()));
        }

        // Fast path; the store's unique constraint still closes the race below.
        if self.users.find_by_email(&req.email).await?.is_some() {
            warn!(email = %req.email, "email already registered");
            return Err(AppError::Conflict(MSG_EMAIL_TAKEN.into()));
        }

        let password_hash = self
            .hasher
            .hash_once_blocking(Password::Plain(req.password))
            .await?;

        let user = self
            .users
            .insert(NewUser::new(req.name, req.email, password_hash))
            .await
            .map_err(|e| {
                if matches!(e, StoreError::DuplicateEmail) {
                    warn!("email registered concurrently");
                }
                AppError::from(e)
            })?;

        let token = self.keys.issue(user.id, &user.email)?;
        info!(user_id = %user.id, email = %user.email, "user registered");
        Ok(Session {
            token,
            user: PublicUser::from(&user),
        })
    }

    pub async fn login(&self, mut req: LoginRequest) -> Result<Session, AppError> {
        normalize_login(&mut req);

        let errors = validate_login(&req);
        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }

        // Unknown emails still pay for one Argon2 verify so both failures take as long.
        let found = self.users.find_by_email(&req.email).await?;
        let stored_hash = found.as_ref().map(|u| u.password_hash.clone());
        let ok = self
            .hasher
            .verify_or_dummy_blocking(req.password, stored_hash)
            .await?;
        let Some(user) = found else {
            warn!(email = %req.email, "login unknown email");
            return Err(AppError::Unauthorized(MSG_BAD_CREDENTIALS.into()));
        };
        if !ok {
            warn!(email = %req.email, user_id = %user.id, "login invalid password");
            return Err(AppError::Unauthorized(MSG_BAD_CREDENTIALS.into()));
        }

        let now = OffsetDateTime::now_utc().max(user.created_at);
        let user = self
            .users
            .record_login(user.id, now)
            .await?
            .ok_or_else(|| AppError::Unauthorized(MSG_BAD_CREDENTIALS.into()))?;

        let token = self.keys.issue(user.id, &user.email)?;
        info!(user_id = %user.id, email = %user.email, "user logged in");
        Ok(Session {
            token,
            user: PublicUser::from(&user),
        })
    }

    pub async fn profile(&self, identity: &Identity) -> Result<PublicUser, AppError> {
        let user: User = self
            .users
            .find_by_id(identity.id)
            .await?
            .ok_or_else(|| {
                warn!(user_id = %identity.id, "profile for vanished user");
                AppError::NotFound("User not found".into())
            })?;
        Ok(PublicUser::from(&user))
    }

    /// Nothing to invalidate server-side: the bearer token stays valid until
    /// it expires. Only the cookie is cleared, by the handler.
    pub fn logout(&self, identity: &Identity) {
        info!(user_id = %identity.id, "user logged out");
    }

    pub fn verify(&self, identity: Identity) -> Identity {
        identity
    }
}
