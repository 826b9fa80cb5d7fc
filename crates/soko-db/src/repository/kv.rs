//! # Key/Value Document Repository
//!
//! JSON documents addressed by well-known keys.
//!
//! ## Read-Modify-Write
//! ```text
//!   update(key, f)
//!     │
//!     ├── lock write_lock          (other writers wait here)
//!     ├── BEGIN
//!     ├── SELECT value WHERE key   → T (or T::default())
//!     ├── f(&mut T)                 → Err? ROLLBACK, nothing written
//!     ├── UPSERT whole document
//!     └── COMMIT, unlock
//! ```

use std::sync::Arc;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use tokio::sync::Mutex;
use tracing::trace;

use crate::error::DbResult;

#[derive(Debug, Clone)]
pub struct KvRepository {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
}

impl KvRepository {
    pub(crate) fn new(pool: SqlitePool, write_lock: Arc<Mutex<()>>) -> Self {
        KvRepository { pool, write_lock }
    }

    /// Reads and decodes a document.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> DbResult<Option<T>> {
        let mut conn = self.pool.acquire().await?;
        match read_raw(&mut conn, key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Replaces a document.
    pub async fn put<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> DbResult<()> {
        let raw = serde_json::to_string(value)?;
        let _guard = self.write_lock.lock().await;
        let mut conn = self.pool.acquire().await?;
        write_raw(&mut conn, key, &raw).await
    }

    /// Deletes a document. Returns whether it existed.
    pub async fn remove(&self, key: &str) -> DbResult<bool> {
        let _guard = self.write_lock.lock().await;
        let result = sqlx::query("DELETE FROM local_kv WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Atomically reads, mutates and rewrites a document.
    ///
    /// A missing document starts from `T::default()`. If `f` fails the
    /// stored document is left as it was.
    pub async fn update<T, R, F>(&self, key: &str, f: F) -> DbResult<R>
    where
        T: DeserializeOwned + Serialize + Default,
        F: FnOnce(&mut T) -> DbResult<R>,
    {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let mut value: T = match read_raw(&mut tx, key).await? {
            Some(raw) => serde_json::from_str(&raw)?,
            None => T::default(),
        };

        let result = f(&mut value)?;

        let raw = serde_json::to_string(&value)?;
        write_raw(&mut tx, key, &raw).await?;
        tx.commit().await?;

        trace!(key = %key, bytes = raw.len(), "Document rewritten");
        Ok(result)
    }
}

async fn read_raw(conn: &mut SqliteConnection, key: &str) -> DbResult<Option<String>> {
    let raw: Option<String> = sqlx::query_scalar("SELECT value FROM local_kv WHERE key = ?1")
        .bind(key)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(raw)
}

async fn write_raw(conn: &mut SqliteConnection, key: &str, raw: &str) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO local_kv (key, value, updated_at)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(key) DO UPDATE SET
            value = excluded.value,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(key)
    .bind(raw)
    .bind(Utc::now().to_rfc3339())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::error::DbError;
    use crate::pool::{Database, DbConfig};
    use std::collections::BTreeMap;

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_put_get_remove() {
        let kv = db().await.kv();
        assert_eq!(kv.get::<Vec<u32>>("numbers").await.unwrap(), None);

        kv.put("numbers", &vec![1u32, 2, 3]).await.unwrap();
        assert_eq!(kv.get::<Vec<u32>>("numbers").await.unwrap(), Some(vec![1, 2, 3]));

        kv.put("numbers", &vec![9u32]).await.unwrap();
        assert_eq!(kv.get::<Vec<u32>>("numbers").await.unwrap(), Some(vec![9]));

        assert!(kv.remove("numbers").await.unwrap());
        assert!(!kv.remove("numbers").await.unwrap());
    }

    #[tokio::test]
    async fn test_update_starts_from_default() {
        let kv = db().await.kv();
        let len = kv
            .update("map", |m: &mut BTreeMap<String, i64>| {
                m.insert("a".into(), 1);
                Ok(m.len())
            })
            .await
            .unwrap();
        assert_eq!(len, 1);
    }

    #[tokio::test]
    async fn test_failed_update_writes_nothing() {
        let kv = db().await.kv();
        kv.put("list", &vec![1u32]).await.unwrap();

        let result: Result<(), DbError> = kv
            .update("list", |v: &mut Vec<u32>| {
                v.clear();
                Err(DbError::not_found("thing", "x"))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(kv.get::<Vec<u32>>("list").await.unwrap(), Some(vec![1]));
    }

    #[tokio::test]
    async fn test_corrupt_document_is_reported() {
        let db = db().await;
        sqlx::query("INSERT INTO local_kv (key, value, updated_at) VALUES ('bad', 'not json', '')")
            .execute(db.pool())
            .await
            .unwrap();
        assert!(matches!(
            db.kv().get::<Vec<u32>>("bad").await,
            Err(DbError::Serialization(_))
        ));
    }
}
