//! Server-side sessions and pending OAuth logins.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, OptionalExtension};
use tracing::debug;
use uuid::Uuid;

use letterbox_common::{Result, UserId};

use crate::db::{conversion_err, from_millis, to_millis, Database};

/// A browser session bound to exactly one user id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

#[derive(Clone)]
pub struct SessionStore {
    db: Database,
}

impl SessionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Open a new session for `user_id` that lives for `ttl`.
    pub fn create(&self, user_id: &UserId, ttl: Duration) -> Result<Session> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.clone(),
            created_at: now,
            expires_at: now + ttl,
        };

        debug!("Opening session for user {}", user_id);
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (id, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    session.id,
                    session.user_id.as_str(),
                    to_millis(session.created_at),
                    to_millis(session.expires_at),
                ],
            )
        })?;
        Ok(session)
    }

    /// Look up a live session. Expired sessions are deleted and reported as absent.
    pub fn find_active(&self, id: &str) -> Result<Option<Session>> {
        let session = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT id, user_id, created_at, expires_at FROM sessions WHERE id = ?1",
                [id],
                |row| {
                    let user: String = row.get(1)?;
                    Ok(Session {
                        id: row.get(0)?,
                        user_id: UserId::new(user).map_err(|e| conversion_err(1, e))?,
                        created_at: from_millis(row.get(2)?),
                        expires_at: from_millis(row.get(3)?),
                    })
                },
            )
            .optional()
        })?;

        match session {
            Some(s) if s.is_expired() => {
                self.delete(&s.id)?;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    /// End a session. Deleting an unknown id is not an error.
    pub fn delete(&self, id: &str) -> Result<()> {
        debug!("Closing session");
        self.db.with_conn(|conn| conn.execute("DELETE FROM sessions WHERE id = ?1", [id]))?;
        Ok(())
    }

    /// Drop every expired session and stale pending login. Returns rows removed.
    pub fn purge_expired(&self, pending_max_age: Duration) -> Result<usize> {
        let now = Utc::now();
        let cutoff = to_millis(now - pending_max_age);
        self.db.with_conn(|conn| {
            let sessions =
                conn.execute("DELETE FROM sessions WHERE expires_at <= ?1", [to_millis(now)])?;
            let pending =
                conn.execute("DELETE FROM pending_logins WHERE created_at <= ?1", [cutoff])?;
            Ok(sessions + pending)
        })
    }

    /// Remember an OAuth `state` value handed out with a consent redirect.
    pub fn insert_pending_login(&self, state: &str) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO pending_logins (state, created_at) VALUES (?1, ?2)",
                params![state, to_millis(Utc::now())],
            )
        })?;
        Ok(())
    }

    /// Consume an OAuth `state` value.
    ///
    /// Returns true only if the value was issued by us, not yet used, and is
    /// younger than `max_age`. The value is removed either way.
    pub fn take_pending_login(&self, state: &str, max_age: Duration) -> Result<bool> {
        let created = self.db.with_conn(|conn| {
            let created: Option<i64> = conn
                .query_row(
                    "SELECT created_at FROM pending_logins WHERE state = ?1",
                    [state],
                    |row| row.get(0),
                )
                .optional()?;
            conn.execute("DELETE FROM pending_logins WHERE state = ?1", [state])?;
            Ok(created)
        })?;

        Ok(created
            .map(from_millis)
            .is_some_and(|at| at + max_age > Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::{CredentialStore, UserIdentity};
    use letterbox_common::TokenPair;

    fn setup() -> (SessionStore, UserId) {
        let db = Database::in_memory().unwrap();
        let user = UserIdentity::provision("p", "p@example.com", "P", TokenPair::empty());
        CredentialStore::new(db.clone()).insert(&user).unwrap();
        (SessionStore::new(db), user.id)
    }

    #[test]
    fn test_create_and_find_session() {
        let (sessions, user) = setup();
        let session = sessions.create(&user, Duration::hours(24)).unwrap();

        let found = sessions.find_active(&session.id).unwrap().unwrap();
        assert_eq!(found.user_id, user);
    }

    #[test]
    fn test_expired_session_is_absent_and_removed() {
        let (sessions, user) = setup();
        let session = sessions.create(&user, Duration::seconds(-1)).unwrap();

        assert!(sessions.find_active(&session.id).unwrap().is_none());
        assert_eq!(sessions.purge_expired(Duration::minutes(10)).unwrap(), 0);
    }

    #[test]
    fn test_delete_session() {
        let (sessions, user) = setup();
        let session = sessions.create(&user, Duration::hours(1)).unwrap();
        sessions.delete(&session.id).unwrap();
        assert!(sessions.find_active(&session.id).unwrap().is_none());
        // Second delete is a no-op.
        sessions.delete(&session.id).unwrap();
    }

    #[test]
    fn test_pending_login_is_single_use() {
        let (sessions, _) = setup();
        sessions.insert_pending_login("state-1").unwrap();

        assert!(sessions.take_pending_login("state-1", Duration::minutes(10)).unwrap());
        assert!(!sessions.take_pending_login("state-1", Duration::minutes(10)).unwrap());
        assert!(!sessions.take_pending_login("never-issued", Duration::minutes(10)).unwrap());
    }

    #[test]
    fn test_pending_login_expires() {
        let (sessions, _) = setup();
        sessions.insert_pending_login("old").unwrap();
        assert!(!sessions.take_pending_login("old", Duration::seconds(-1)).unwrap());
    }
}
