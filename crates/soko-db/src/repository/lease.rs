//! # Sync Lease
//!
//! A store-wide lock for the resync pass, kept under [`SYNC_LEASE_KEY`].
//! Every process and every `Database` handle on the same file sees the
//! same lease, so at most one pass drains the queue at a time.
//!
//! ```text
//!   try_acquire(owner, ttl)
//!     no lease / expired / same owner ──► write {owner, expires_at}, true
//!     held by someone else            ──► false
//!
//!   renew(owner, ttl)    pushes expires_at forward while the pass runs
//!   release(owner)       clears the lease if `owner` still holds it
//! ```
//!
//! A pass that dies without releasing blocks others only until expiry.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DbResult;
use crate::repository::kv::KvRepository;
use crate::SYNC_LEASE_KEY;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncLease {
    pub owner: String,
    pub expires_at: DateTime<Utc>,
}

impl SyncLease {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

#[derive(Debug, Clone)]
pub struct SyncLeaseRepository {
    kv: KvRepository,
}

impl SyncLeaseRepository {
    pub(crate) fn new(kv: KvRepository) -> Self {
        SyncLeaseRepository { kv }
    }

    /// Takes the lease for `owner` unless another owner holds a live one.
    pub async fn try_acquire(&self, owner: &str, ttl: Duration) -> DbResult<bool> {
        let acquired = self
            .kv
            .update(SYNC_LEASE_KEY, |lease: &mut Option<SyncLease>| {
                let now = Utc::now();
                if let Some(held) = lease.as_ref() {
                    if held.owner != owner && held.is_live(now) {
                        return Ok(false);
                    }
                }
                *lease = Some(SyncLease {
                    owner: owner.to_string(),
                    expires_at: now + ttl,
                });
                Ok(true)
            })
            .await?;

        debug!(owner = %owner, acquired, "Sync lease requested");
        Ok(acquired)
    }

    /// Extends the lease. Returns false if `owner` no longer holds it.
    pub async fn renew(&self, owner: &str, ttl: Duration) -> DbResult<bool> {
        self.kv
            .update(SYNC_LEASE_KEY, |lease: &mut Option<SyncLease>| {
                match lease.as_mut() {
                    Some(held) if held.owner == owner => {
                        held.expires_at = Utc::now() + ttl;
                        Ok(true)
                    }
                    _ => Ok(false),
                }
            })
            .await
    }

    /// Drops the lease if `owner` still holds it.
    pub async fn release(&self, owner: &str) -> DbResult<bool> {
        let released = self
            .kv
            .update(SYNC_LEASE_KEY, |lease: &mut Option<SyncLease>| {
                if lease.as_ref().is_some_and(|held| held.owner == owner) {
                    *lease = None;
                    return Ok(true);
                }
                Ok(false)
            })
            .await?;

        debug!(owner = %owner, released, "Sync lease released");
        Ok(released)
    }

    /// The live lease, if any.
    pub async fn holder(&self) -> DbResult<Option<SyncLease>> {
        let now = Utc::now();
        Ok(self
            .kv
            .get::<Option<SyncLease>>(SYNC_LEASE_KEY)
            .await?
            .flatten()
            .filter(|lease| lease.is_live(now)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    async fn repo() -> (Database, SyncLeaseRepository) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.sync_lease();
        (db, repo)
    }

    #[tokio::test]
    async fn test_lease_is_exclusive_until_released() {
        let (_db, leases) = repo().await;
        let ttl = Duration::minutes(5);

        assert!(leases.try_acquire("pass-a", ttl).await.unwrap());
        assert!(!leases.try_acquire("pass-b", ttl).await.unwrap());
        assert_eq!(leases.holder().await.unwrap().unwrap().owner, "pass-a");

        // Only the holder can release.
        assert!(!leases.release("pass-b").await.unwrap());
        assert!(leases.release("pass-a").await.unwrap());

        assert!(leases.holder().await.unwrap().is_none());
        assert!(leases.try_acquire("pass-b", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_lease_is_shared_across_handles() {
        let (db, leases) = repo().await;
        let other = db.clone().sync_lease();

        assert!(leases.try_acquire("pass-a", Duration::minutes(5)).await.unwrap());
        assert!(!other.try_acquire("pass-b", Duration::minutes(5)).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_lease_can_be_taken_over() {
        let (_db, leases) = repo().await;

        assert!(leases.try_acquire("crashed", Duration::seconds(-1)).await.unwrap());
        assert!(leases.holder().await.unwrap().is_none());
        assert!(leases.try_acquire("pass-b", Duration::minutes(5)).await.unwrap());

        // The old owner cannot renew what it lost.
        assert!(!leases.renew("crashed", Duration::minutes(5)).await.unwrap());
        assert!(leases.renew("pass-b", Duration::minutes(5)).await.unwrap());
    }
}
