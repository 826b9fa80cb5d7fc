//! # Pending Transaction Queue
//!
//! The durable offline queue: an ordered list of `PendingQueueEntry`
//! stored under [`PENDING_TRANSACTIONS_KEY`] and rewritten whole on every
//! mutation.
//!
//! ## Queue Discipline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Finalizer (sync failed)  ──► append(entry)      push to tail          │
//! │                                                                         │
//! │  Resync pass              ──► list()             FIFO snapshot         │
//! │                           ──► remove(local_id)   only after backend ack│
//! │                           ──► record_failure()   attempts += 1         │
//! │                                                                         │
//! │  No operation replaces the list with anything other than itself plus   │
//! │  one append, minus one acknowledged entry, or with one entry's retry   │
//! │  bookkeeping changed.                                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use soko_core::PendingQueueEntry;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::repository::kv::KvRepository;
use crate::PENDING_TRANSACTIONS_KEY;

#[derive(Debug, Clone)]
pub struct PendingQueueRepository {
    kv: KvRepository,
}

impl PendingQueueRepository {
    pub(crate) fn new(kv: KvRepository) -> Self {
        PendingQueueRepository { kv }
    }

    /// All queued entries, oldest first.
    pub async fn list(&self) -> DbResult<Vec<PendingQueueEntry>> {
        Ok(self
            .kv
            .get::<Vec<PendingQueueEntry>>(PENDING_TRANSACTIONS_KEY)
            .await?
            .unwrap_or_default())
    }

    pub async fn count(&self) -> DbResult<usize> {
        Ok(self.list().await?.len())
    }

    /// Appends an entry to the tail. Returns the new queue length.
    ///
    /// Fails with `UniqueViolation` if the same `local_id` is already queued.
    pub async fn append(&self, entry: PendingQueueEntry) -> DbResult<usize> {
        let local_id = entry.local_id.clone();
        let len = self
            .kv
            .update(PENDING_TRANSACTIONS_KEY, |queue: &mut Vec<PendingQueueEntry>| {
                if queue.iter().any(|e| e.local_id == entry.local_id) {
                    return Err(DbError::duplicate("local_id", entry.local_id.clone()));
                }
                queue.push(entry);
                Ok(queue.len())
            })
            .await?;

        info!(local_id = %local_id, queued = len, "Transaction queued for sync");
        Ok(len)
    }

    /// Removes an acknowledged entry. Returns whether it was present.
    pub async fn remove(&self, local_id: &str) -> DbResult<bool> {
        let removed = self
            .kv
            .update(PENDING_TRANSACTIONS_KEY, |queue: &mut Vec<PendingQueueEntry>| {
                let before = queue.len();
                queue.retain(|e| e.local_id != local_id);
                Ok(queue.len() != before)
            })
            .await?;

        debug!(local_id = %local_id, removed, "Queue entry removed");
        Ok(removed)
    }

    /// Records a failed replay on an entry.
    pub async fn record_failure(&self, local_id: &str, error: &str) -> DbResult<()> {
        self.kv
            .update(PENDING_TRANSACTIONS_KEY, |queue: &mut Vec<PendingQueueEntry>| {
                let entry = queue
                    .iter_mut()
                    .find(|e| e.local_id == local_id)
                    .ok_or_else(|| DbError::not_found("PendingQueueEntry", local_id))?;
                entry.record_failure(error);
                Ok(())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::Utc;
    use soko_core::{
        Currency, Customer, Discount, Money, OrderSnapshot, OrderTotals, PaymentAttempt,
        PaymentPayload, TaxDescriptor, Transaction,
    };

    fn entry() -> PendingQueueEntry {
        let order = OrderSnapshot {
            order_id: uuid::Uuid::new_v4().to_string(),
            items: vec![],
            customer: Customer::walk_in(),
            discount: Discount::none(),
            note: None,
            tax: TaxDescriptor::no_tax(),
            currency: Currency::new("UGX").unwrap(),
            totals: OrderTotals::default(),
            created_at: Utc::now(),
        };
        let attempt = PaymentAttempt::new(&order, PaymentPayload::Cash { received: Money::zero() });
        PendingQueueEntry::new(Transaction::new(order, attempt))
    }

    async fn repo() -> PendingQueueRepository {
        Database::new(DbConfig::in_memory()).await.unwrap().pending_queue()
    }

    #[tokio::test]
    async fn test_append_preserves_fifo_order() {
        let repo = repo().await;
        let (a, b, c) = (entry(), entry(), entry());
        repo.append(a.clone()).await.unwrap();
        repo.append(b.clone()).await.unwrap();
        assert_eq!(repo.append(c.clone()).await.unwrap(), 3);

        let ids: Vec<_> = repo.list().await.unwrap().into_iter().map(|e| e.local_id).collect();
        assert_eq!(ids, vec![a.local_id, b.local_id, c.local_id]);
    }

    #[tokio::test]
    async fn test_duplicate_append_is_rejected() {
        let repo = repo().await;
        let a = entry();
        repo.append(a.clone()).await.unwrap();
        assert!(matches!(repo.append(a).await, Err(DbError::UniqueViolation { .. })));
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_remove_only_named_entry() {
        let repo = repo().await;
        let (a, b) = (entry(), entry());
        repo.append(a.clone()).await.unwrap();
        repo.append(b.clone()).await.unwrap();

        assert!(repo.remove(&a.local_id).await.unwrap());
        assert!(!repo.remove(&a.local_id).await.unwrap());

        let remaining = repo.list().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].local_id, b.local_id);
    }

    #[tokio::test]
    async fn test_record_failure() {
        let repo = repo().await;
        let a = entry();
        repo.append(a.clone()).await.unwrap();
        repo.record_failure(&a.local_id, "connection refused").await.unwrap();

        let stored = &repo.list().await.unwrap()[0];
        assert_eq!(stored.attempts, 1);
        assert_eq!(stored.last_error.as_deref(), Some("connection refused"));

        assert!(repo.record_failure("missing", "x").await.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_not_lost() {
        let repo = repo().await;
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let repo = repo.clone();
                tokio::spawn(async move { repo.append(entry()).await })
            })
            .collect();
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(repo.count().await.unwrap(), 10);
    }
}
