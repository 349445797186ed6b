use super::User;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "myki_session";

struct Session {
    user: User,
    expires_at: DateTime<Utc>,
}

/// In-memory session table keyed by random token.
pub struct SessionStore {
    ttl: Duration,
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Starts a session for `user` and returns its token.
    pub fn create(&self, user: User) -> String {
        let token = uuid::Uuid::new_v4().simple().to_string();
        let session = Session {
            user,
            expires_at: Utc::now() + self.ttl,
        };
        self.sessions.lock().insert(token.clone(), session);
        token
    }

    /// The user behind `token`, if the session exists and has not expired.
    pub fn get(&self, token: &str) -> Option<User> {
        let mut sessions = self.sessions.lock();
        match sessions.get(token) {
            Some(s) if s.expires_at > Utc::now() => Some(s.user.clone()),
            Some(_) => {
                sessions.remove(token);
                None
            }
            None => None,
        }
    }

    pub fn revoke(&self, token: &str) {
        self.sessions.lock().remove(token);
    }

    /// Ends every session belonging to `username`.
    pub fn revoke_user(&self, username: &str) -> usize {
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, s| s.user.username != username);
        before - sessions.len()
    }

    /// Drops expired sessions and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_at > now);
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;

    fn alice() -> User {
        User {
            username: "alice".into(),
            name: "Alice".into(),
            role: Role::Inspector,
        }
    }

    #[test]
    fn test_create_and_get() {
        let store = SessionStore::new(Duration::hours(1));
        let token = store.create(alice());

        assert_eq!(store.get(&token), Some(alice()));
        assert_eq!(store.get("not-a-token"), None);
    }

    #[test]
    fn test_expired_session_is_rejected() {
        let store = SessionStore::new(Duration::seconds(-1));
        let token = store.create(alice());

        assert_eq!(store.get(&token), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_revoke_user_ends_all_their_sessions() {
        let store = SessionStore::new(Duration::hours(1));
        let a = store.create(alice());
        let _b = store.create(alice());
        let bob = store.create(User {
            username: "bob".into(),
            name: "Bob".into(),
            role: Role::Admin,
        });

        assert_eq!(store.revoke_user("alice"), 2);
        assert_eq!(store.get(&a), None);
        assert!(store.get(&bob).is_some());
    }

    #[test]
    fn test_purge_expired() {
        let store = SessionStore::new(Duration::seconds(-1));
        store.create(alice());
        store.create(alice());
        assert_eq!(store.purge_expired(), 2);
    }
}
