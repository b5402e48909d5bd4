use std::collections::BTreeMap;
use std::sync::LazyLock;

use argon2::Argon2;
use argon2::password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use async_trait::async_trait;
use rand::RngCore;
use tracing::warn;

use crate::context::AuthContext;
use crate::error::AuthError;
use crate::store::UserStore;
use crate::user::{Criteria, SharedUser};

/// Hash checked when the username is unknown, so a miss costs one argon2
/// verification just like a wrong password.
static ABSENT_USER_PHC: LazyLock<String> = LazyLock::new(|| {
    hash_password("multiauth-absent-user").unwrap_or_else(|e| {
        warn!("Could not hash placeholder password: {}", e);
        String::new()
    })
});

#[derive(Debug, Clone)]
struct PasswordEntry {
    phc: String,
    user: SharedUser,
}

/// Username/password store holding argon2 PHC hashes.
///
/// Credential lookups need both `"username"` and `"password"` as strings; the
/// store owns the secret comparison.
#[derive(Debug, Default, Clone)]
pub struct PasswordUserStore {
    by_username: BTreeMap<String, PasswordEntry>,
}

impl PasswordUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user with an already-hashed password (PHC string).
    pub fn with_user(mut self, username: impl Into<String>, phc: impl Into<String>, user: SharedUser) -> Self {
        self.by_username.insert(
            username.into(),
            PasswordEntry {
                phc: phc.into(),
                user,
            },
        );
        self
    }

    pub fn len(&self) -> usize {
        self.by_username.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_username.is_empty()
    }
}

#[async_trait]
impl UserStore for PasswordUserStore {
    async fn find_user_by_id(&self, _ctx: &AuthContext, id: &str) -> Result<SharedUser, AuthError> {
        self.by_username
            .values()
            .find(|e| e.user.id() == id)
            .map(|e| e.user.clone())
            .ok_or(AuthError::UserNotFound)
    }

    async fn find_user_by_credentials(
        &self,
        ctx: &AuthContext,
        criteria: &Criteria,
    ) -> Result<SharedUser, AuthError> {
        let (Some(username), Some(password)) =
            (criteria.get_str("username"), criteria.get_str("password"))
        else {
            return Err(AuthError::InvalidCredentials);
        };

        let entry = self.by_username.get(username);
        let phc = entry.map(|e| e.phc.clone());
        let password = password.to_string();
        let verified = ctx
            .guard(async move {
                tokio::task::spawn_blocking(move || {
                    let phc = phc.as_deref().unwrap_or(ABSENT_USER_PHC.as_str());
                    verify_password(phc, &password)
                })
                .await
                .map_err(|e| {
                    warn!("Password verification task failed: {}", e);
                    AuthError::InvalidCredentials
                })
            })
            .await?;

        match entry {
            Some(entry) if verified => Ok(entry.user.clone()),
            _ => Err(AuthError::InvalidCredentials),
        }
    }
}

/// Hash a password into an argon2 PHC string with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, password_hash::Error> {
    let mut salt_bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes)?;
    let phc = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(phc.to_string())
}

fn verify_password(phc: &str, password: &str) -> bool {
    match PasswordHash::new(phc) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!("Stored password hash is not a valid PHC string: {}", e);
            false
        }
    }
}
