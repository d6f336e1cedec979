use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::trace;

use crate::errors::{AppError, AppResult};

/// Well-known keys shared with the query side.
pub mod keys {
    pub const PHARMACIES: &str = "pharmacies";
    pub const META: &str = "meta";
    pub const GEOCODE_PREFIX: &str = "geocode:";
}

/// Durable key-value store with optional per-entry expiry, backed by SQLite.
#[derive(Clone)]
pub struct KvStore {
    db: Arc<Mutex<Connection>>,
}

impl KvStore {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    pub fn get(&self, key: &str) -> AppResult<Option<String>> {
        self.get_at(key, Utc::now())
    }

    pub fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> AppResult<()> {
        self.put_at(key, value, ttl, Utc::now())
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> AppResult<Option<T>> {
        self.get(key)?
            .map(|payload| serde_json::from_str::<T>(&payload))
            .transpose()
            .map_err(AppError::from)
    }

    pub fn put_json<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> AppResult<()> {
        let payload = serde_json::to_string(value)?;
        self.put(key, &payload, ttl)
    }

    pub fn purge_expired(&self) -> AppResult<usize> {
        let now = Utc::now().timestamp();
        let conn = self.db.lock();
        let removed = conn.execute(
            "DELETE FROM kv_entries WHERE expires_at IS NOT NULL AND expires_at <= ?1",
            [now],
        )?;
        Ok(removed)
    }

    pub fn count_prefixed(&self, prefix: &str) -> AppResult<usize> {
        let pattern = format!("{}%", escape_like(prefix));
        let conn = self.db.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM kv_entries WHERE key LIKE ?1 ESCAPE '\\'",
            [pattern],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as usize)
    }

    pub(crate) fn get_at(&self, key: &str, now: DateTime<Utc>) -> AppResult<Option<String>> {
        let conn = self.db.lock();
        let entry: Option<(String, Option<i64>)> = conn
            .query_row(
                "SELECT value, expires_at FROM kv_entries WHERE key = ?1",
                [key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match entry {
            Some((_, Some(expires_at))) if expires_at <= now.timestamp() => {
                trace!(key, "kv entry expired");
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value)),
            None => Ok(None),
        }
    }

    pub(crate) fn put_at(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let expires_at = ttl.map(|ttl| (now + ttl).timestamp());
        let conn = self.db.lock();
        conn.execute(
            "INSERT INTO kv_entries (key, value, expires_at, updated_at)
            VALUES (?1, ?2, ?3, DATETIME('now'))
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                expires_at = excluded.expires_at,
                updated_at = DATETIME('now')",
            (key, value, expires_at),
        )?;
        Ok(())
    }
}

fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::bootstrap_in_memory;

    fn store() -> KvStore {
        KvStore::new(Arc::new(Mutex::new(bootstrap_in_memory().unwrap())))
    }

    #[test]
    fn overwrites_existing_values() {
        let store = store();
        store.put("meta", "first", None).unwrap();
        store.put("meta", "second", None).unwrap();
        assert_eq!(store.get("meta").unwrap().as_deref(), Some("second"));
    }

    #[test]
    fn hides_entries_past_expiry() {
        let store = store();
        let written = Utc::now() - Duration::days(31);
        store
            .put_at("geocode:old", "{}", Some(Duration::days(30)), written)
            .unwrap();
        store
            .put("geocode:fresh", "{}", Some(Duration::days(30)))
            .unwrap();

        assert!(store.get("geocode:old").unwrap().is_none());
        assert!(store.get("geocode:fresh").unwrap().is_some());
        assert_eq!(store.purge_expired().unwrap(), 1);
        assert_eq!(store.count_prefixed(keys::GEOCODE_PREFIX).unwrap(), 1);
    }

    #[test]
    fn entries_without_ttl_never_expire() {
        let store = store();
        let long_ago = Utc::now() - Duration::days(3650);
        store.put_at("pharmacies", "[]", None, long_ago).unwrap();
        assert_eq!(store.get("pharmacies").unwrap().as_deref(), Some("[]"));
        assert_eq!(store.purge_expired().unwrap(), 0);

        store.put("pharmacies", "[{}]", None).unwrap();
        assert_eq!(store.get("pharmacies").unwrap().as_deref(), Some("[{}]"));
    }
}
