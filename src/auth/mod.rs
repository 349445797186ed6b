//! Dashboard accounts and login sessions.
//!
//! [`CredentialStore`] is the async trait the login flow talks to.
//! [`JsonCredentialStore`] implements it over a flat JSON file holding Argon2 hashes.
//! [`SessionStore`] maps session cookies to the user that logged in.

mod json_store;
mod password;
mod session;

pub use json_store::JsonCredentialStore;
pub use password::{hash_password, verify_password};
pub use session::{SESSION_COOKIE, SessionStore};

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Can reload data and manage accounts.
    Admin,
    Inspector,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Inspector => "inspector",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "inspector" => Ok(Role::Inspector),
            other => Err(AuthError::InvalidInput(format!("unknown role `{other}`"))),
        }
    }
}

/// An authenticated account, without its password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub username: String,
    pub name: String,
    pub role: Role,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("user `{0}` already exists")]
    UserExists(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error("credential file I/O failed: {0}")]
    Storage(#[from] std::io::Error),

    #[error("credential file is not valid JSON: {0}")]
    Format(#[from] serde_json::Error),
}

/// Source of truth for who may log in.
#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    /// Returns the user when `password` matches, `None` otherwise.
    async fn authenticate(&self, username: &str, password: &str) -> Result<Option<User>, AuthError>;

    async fn add_user(
        &self,
        username: &str,
        password: &str,
        role: Role,
        name: &str,
    ) -> Result<(), AuthError>;

    /// Returns `false` when no such user existed.
    async fn remove_user(&self, username: &str) -> Result<bool, AuthError>;

    /// All accounts, ordered by username.
    async fn list_users(&self) -> Result<Vec<User>, AuthError>;
}
