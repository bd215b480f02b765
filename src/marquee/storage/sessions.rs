//! Session persistence keyed by the SHA-256 of the cookie value, so a copy of
//! the table never yields a usable cookie.
//!
//! PostgreSQL is the backend the server runs with. The in-memory backend
//! serves tests and tools that drive the router without a database.

use crate::marquee::session::Session;
use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use std::{
    collections::HashMap,
    time::{Duration, Instant},
};
use tokio::sync::RwLock;
use tracing::{warn, Instrument};

#[derive(Debug)]
struct Entry {
    session: Session,
    touched: Instant,
}

#[derive(Debug)]
enum Backend {
    Postgres(PgPool),
    Memory(RwLock<HashMap<Vec<u8>, Entry>>),
}

/// Sessions expire after `ttl` without a request.
#[derive(Debug)]
pub struct SessionStore {
    ttl: Duration,
    backend: Backend,
}

/// Hash a session id so raw values never reach storage.
#[must_use]
pub fn hash_session_id(id: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(id.as_bytes());
    hasher.finalize().to_vec()
}

impl SessionStore {
    #[must_use]
    pub fn postgres(pool: PgPool, ttl: Duration) -> Self {
        Self {
            ttl,
            backend: Backend::Postgres(pool),
        }
    }

    #[must_use]
    pub fn in_memory(ttl: Duration) -> Self {
        Self {
            ttl,
            backend: Backend::Memory(RwLock::new(HashMap::new())),
        }
    }

    fn ttl_seconds(&self) -> i64 {
        i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX)
    }

    /// Fetch a live session. Unknown, expired and unreadable ids all yield `None`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be queried.
    pub async fn load(&self, id: &str) -> Result<Option<Session>> {
        let hash = hash_session_id(id);
        match &self.backend {
            Backend::Postgres(pool) => {
                let query = r"
                    SELECT data::text
                    FROM sessions
                    WHERE session_hash = $1
                      AND expires_at > NOW()
                ";
                let span = tracing::info_span!(
                    "db.query",
                    db.system = "postgresql",
                    db.operation = "SELECT",
                    db.statement = query
                );
                let data: Option<String> = sqlx::query_scalar(query)
                    .bind(&hash)
                    .fetch_optional(pool)
                    .instrument(span)
                    .await
                    .context("failed to load session")?;

                Ok(data.and_then(|data| match serde_json::from_str(&data) {
                    Ok(session) => Some(session),
                    Err(err) => {
                        warn!("discarding unreadable session: {err}");
                        None
                    }
                }))
            }
            Backend::Memory(entries) => {
                let mut entries = entries.write().await;
                let expired = entries
                    .get(&hash)
                    .map(|entry| entry.touched.elapsed() >= self.ttl);
                match expired {
                    Some(true) => {
                        entries.remove(&hash);
                        Ok(None)
                    }
                    Some(false) => Ok(entries.get(&hash).map(|entry| entry.session.clone())),
                    None => Ok(None),
                }
            }
        }
    }

    /// Write the session and push its expiry `ttl` into the future.
    ///
    /// # Errors
    /// Returns an error if the session cannot be serialized or stored.
    pub async fn save(&self, id: &str, session: &Session) -> Result<()> {
        let hash = hash_session_id(id);
        match &self.backend {
            Backend::Postgres(pool) => {
                let data = serde_json::to_string(session).context("failed to serialize session")?;
                let query = r"
                    INSERT INTO sessions (session_hash, data, expires_at)
                    VALUES ($1, $2::jsonb, NOW() + ($3 * INTERVAL '1 second'))
                    ON CONFLICT (session_hash) DO UPDATE
                    SET data = EXCLUDED.data, expires_at = EXCLUDED.expires_at
                ";
                let span = tracing::info_span!(
                    "db.query",
                    db.system = "postgresql",
                    db.operation = "UPSERT",
                    db.statement = query
                );
                sqlx::query(query)
                    .bind(&hash)
                    .bind(data)
                    .bind(self.ttl_seconds())
                    .execute(pool)
                    .instrument(span)
                    .await
                    .context("failed to save session")?;
            }
            Backend::Memory(entries) => {
                entries.write().await.insert(
                    hash,
                    Entry {
                        session: session.clone(),
                        touched: Instant::now(),
                    },
                );
            }
        }
        Ok(())
    }

    /// Remove a session; unknown ids are not an error.
    ///
    /// # Errors
    /// Returns an error if the database cannot be reached.
    pub async fn destroy(&self, id: &str) -> Result<()> {
        let hash = hash_session_id(id);
        match &self.backend {
            Backend::Postgres(pool) => {
                let query = "DELETE FROM sessions WHERE session_hash = $1";
                let span = tracing::info_span!(
                    "db.query",
                    db.system = "postgresql",
                    db.operation = "DELETE",
                    db.statement = query
                );
                sqlx::query(query)
                    .bind(&hash)
                    .execute(pool)
                    .instrument(span)
                    .await
                    .context("failed to delete session")?;
            }
            Backend::Memory(entries) => {
                entries.write().await.remove(&hash);
            }
        }
        Ok(())
    }

    /// Drop every expired session, returning how many were removed.
    ///
    /// # Errors
    /// Returns an error if the database cannot be reached.
    pub async fn purge_expired(&self) -> Result<u64> {
        match &self.backend {
            Backend::Postgres(pool) => {
                let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= NOW()")
                    .execute(pool)
                    .await
                    .context("failed to purge sessions")?;
                Ok(result.rows_affected())
            }
            Backend::Memory(entries) => {
                let mut entries = entries.write().await;
                let before = entries.len();
                entries.retain(|_, entry| entry.touched.elapsed() < self.ttl);
                Ok((before - entries.len()) as u64)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marquee::session::FLASH_SUCCESS;

    #[test]
    fn hash_is_stable_and_hides_the_id() {
        let first = hash_session_id("token");
        assert_eq!(first, hash_session_id("token"));
        assert_ne!(first, hash_session_id("other"));
        assert_eq!(first.len(), 32);
        assert_ne!(first, b"token".to_vec());
    }

    #[tokio::test]
    async fn memory_round_trip_and_destroy() -> Result<()> {
        let store = SessionStore::in_memory(Duration::from_secs(60));
        let mut session = Session::default();
        session.set_flash(FLASH_SUCCESS, "hello");
        store.save("id", &session).await?;

        assert_eq!(store.load("id").await?, Some(session));
        assert_eq!(store.load("other").await?, None);
        store.destroy("id").await?;
        assert_eq!(store.load("id").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn memory_expires_idle_sessions() -> Result<()> {
        let store = SessionStore::in_memory(Duration::ZERO);
        store.save("id", &Session::default()).await?;
        assert_eq!(store.load("id").await?, None);

        store.save("other", &Session::default()).await?;
        assert_eq!(store.purge_expired().await?, 1);
        Ok(())
    }
}
