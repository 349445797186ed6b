use super::password::{hash_password, verify_password};
use super::{AuthError, CredentialStore, Role, User};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// On-disk layout:
/// ```json
/// {
///   "users": {
///     "admin": { "password_hash": "$argon2id$...", "role": "admin", "name": "Site Admin" }
///   }
/// }
/// ```
#[derive(Debug, Default, Serialize, Deserialize)]
struct UsersFile {
    #[serde(default)]
    users: BTreeMap<String, StoredUser>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredUser {
    password_hash: String,
    role: Role,
    name: String,
}

/// Credential store backed by a JSON file that is re-read on every call, so
/// edits made by the CLI show up without a restart.
pub struct JsonCredentialStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file is an empty user list.
    async fn read(&self) -> Result<UsersFile, AuthError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Credential file not found, treating as empty");
                Ok(UsersFile::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, file: &UsersFile) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let body = serde_json::to_string_pretty(file)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl CredentialStore for JsonCredentialStore {
    async fn authenticate(&self, username: &str, password: &str) -> Result<Option<User>, AuthError> {
        let file = self.read().await?;

        let Some(stored) = file.users.get(username) else {
            return Ok(None);
        };

        if !verify_password(password, &stored.password_hash) {
            return Ok(None);
        }

        Ok(Some(User {
            username: username.to_string(),
            name: stored.name.clone(),
            role: stored.role,
        }))
    }

    async fn add_user(
        &self,
        username: &str,
        password: &str,
        role: Role,
        name: &str,
    ) -> Result<(), AuthError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() || name.trim().is_empty() {
            return Err(AuthError::InvalidInput(
                "username, password and name are all required".to_string(),
            ));
        }

        let _guard = self.write_lock.lock().await;
        let mut file = self.read().await?;

        if file.users.contains_key(username) {
            return Err(AuthError::UserExists(username.to_string()));
        }

        file.users.insert(
            username.to_string(),
            StoredUser {
                password_hash: hash_password(password)?,
                role,
                name: name.trim().to_string(),
            },
        );
        self.write(&file).await?;

        info!(username, role = %role, "User added");
        Ok(())
    }

    async fn remove_user(&self, username: &str) -> Result<bool, AuthError> {
        let _guard = self.write_lock.lock().await;
        let mut file = self.read().await?;

        if file.users.remove(username).is_none() {
            return Ok(false);
        }
        self.write(&file).await?;

        info!(username, "User removed");
        Ok(true)
    }

    async fn list_users(&self) -> Result<Vec<User>, AuthError> {
        let file = self.read().await?;
        Ok(file
            .users
            .into_iter()
            .map(|(username, stored)| User {
                username,
                name: stored.name,
                role: stored.role,
            })
            .collect())
    }
}
