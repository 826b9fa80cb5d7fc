//! # Finalized Transactions
//!
//! A `Transaction` is the immutable record of a settled sale: the frozen
//! order, the completed payment attempt, and where the record lives.
//!
//! ```text
//!   Completed attempt ──► Transaction { provenance: Synced }   (backend ok)
//!                     └─► Transaction { provenance: Pending }  (queued)
//!                                │
//!                                ▼  resync acknowledged
//!                         provenance: Synced
//! ```
//!
//! Provenance is the only field that ever changes, and only pending → synced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::cart::OrderSnapshot;
use crate::error::{CoreError, CoreResult};
use crate::payment::PaymentAttempt;
use crate::types::Provenance;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Transaction {
    /// Backend-assigned id once synced, otherwise equal to `local_id`.
    pub id: String,
    /// Device-generated id; doubles as the backend idempotency key.
    pub local_id: String,
    pub order: OrderSnapshot,
    pub attempt: PaymentAttempt,
    #[ts(as = "String")]
    pub settled_at: DateTime<Utc>,
    pub provenance: Provenance,
}

impl Transaction {
    /// Builds a pending transaction from a frozen order and its attempt.
    pub fn new(order: OrderSnapshot, attempt: PaymentAttempt) -> Self {
        let local_id = Uuid::new_v4().to_string();
        Transaction {
            id: local_id.clone(),
            local_id,
            order,
            attempt,
            settled_at: Utc::now(),
            provenance: Provenance::Pending,
        }
    }

    /// Records the backend acknowledgement.
    pub fn mark_synced(&mut self, server_id: Option<String>) -> CoreResult<()> {
        if self.provenance == Provenance::Synced {
            return Err(CoreError::AlreadySynced(self.local_id.clone()));
        }
        if let Some(id) = server_id {
            self.id = id;
        }
        self.provenance = Provenance::Synced;
        Ok(())
    }

    pub fn is_synced(&self) -> bool {
        self.provenance == Provenance::Synced
    }
}

/// A transaction waiting in the offline queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PendingQueueEntry {
    /// Equal to `transaction.local_id`.
    pub local_id: String,
    #[ts(as = "String")]
    pub queued_at: DateTime<Utc>,
    /// Replay attempts made so far.
    pub attempts: u32,
    pub last_error: Option<String>,
    pub transaction: Transaction,
}

impl PendingQueueEntry {
    pub fn new(transaction: Transaction) -> Self {
        PendingQueueEntry {
            local_id: transaction.local_id.clone(),
            queued_at: Utc::now(),
            attempts: 0,
            last_error: None,
            transaction,
        }
    }

    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.attempts += 1;
        self.last_error = Some(error.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;
    use crate::payment::PaymentPayload;
    use crate::pricing::OrderTotals;
    use crate::types::{Currency, Customer, Discount, TaxDescriptor};

    fn transaction() -> Transaction {
        let order = OrderSnapshot {
            order_id: "order-1".into(),
            items: vec![],
            customer: Customer::walk_in(),
            discount: Discount::none(),
            note: None,
            tax: TaxDescriptor::no_tax(),
            currency: Currency::new("KES").unwrap(),
            totals: OrderTotals::default(),
            created_at: Utc::now(),
        };
        let attempt = PaymentAttempt::new(&order, PaymentPayload::Cash { received: Money::zero() });
        Transaction::new(order, attempt)
    }

    #[test]
    fn test_new_transaction_is_pending() {
        let tx = transaction();
        assert_eq!(tx.provenance, Provenance::Pending);
        assert_eq!(tx.id, tx.local_id);
    }

    #[test]
    fn test_mark_synced_only_once() {
        let mut tx = transaction();
        tx.mark_synced(Some("srv-42".into())).unwrap();
        assert!(tx.is_synced());
        assert_eq!(tx.id, "srv-42");
        assert!(matches!(tx.mark_synced(None), Err(CoreError::AlreadySynced(_))));
    }

    #[test]
    fn test_queue_entry_tracks_failures() {
        let tx = transaction();
        let mut entry = PendingQueueEntry::new(tx.clone());
        assert_eq!(entry.local_id, tx.local_id);

        entry.record_failure("503 Service Unavailable");
        entry.record_failure("timeout");
        assert_eq!(entry.attempts, 2);
        assert_eq!(entry.last_error.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_queue_entry_json_has_iso_timestamp() {
        let entry = PendingQueueEntry::new(transaction());
        let value = serde_json::to_value(&entry).unwrap();
        let queued_at = value["queued_at"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(queued_at).is_ok());
    }
}
