//! # Offline Sync Queue
//!
//! Replays queued sales to the backend.
//!
//! ## Resync Pass
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  sync_pending()                                                         │
//! │     │                                                                   │
//! │     ├── sync lease held elsewhere? ──► AlreadyRunning (untouched)      │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  for entry in queue (oldest first):                                     │
//! │     complete_transaction(entry)                                         │
//! │        ack        ──► remove entry, synced += 1                         │
//! │        rejected   ──► record attempt + error, keep, continue           │
//! │        network    ──► record attempt + error, keep, STOP               │
//! │                                                                         │
//! │  An entry is removed only after its acknowledgement, so a crash        │
//! │  mid-pass at worst replays one sale, which the backend dedupes by      │
//! │  local_id.                                                              │
//! │                                                                         │
//! │  The lease lives in the local store, so it also excludes passes from   │
//! │  other queues and other processes on the same database file.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use soko_db::Database;

use crate::backend::{CompleteTransactionRequest, SalesBackend};
use crate::error::CheckoutResult;
use crate::events::{CheckoutEvent, CheckoutEventEmitter};

/// How long a pass may go without progress before its lease lapses.
const SYNC_LEASE_TTL_SECS: i64 = 300;

fn lease_ttl() -> chrono::Duration {
    chrono::Duration::seconds(SYNC_LEASE_TTL_SECS)
}

/// Outcome of one resync pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncReport {
    Finished(SyncSummary),
    /// Another pass held the queue; nothing was done.
    AlreadyRunning,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub synced: usize,
    pub remaining: usize,
    /// First entry that failed during the pass.
    pub failed_id: Option<String>,
}

#[derive(Clone)]
pub struct OfflineQueue {
    db: Database,
    backend: Arc<dyn SalesBackend>,
    business_id: String,
    emitter: Arc<dyn CheckoutEventEmitter>,
}

impl OfflineQueue {
    pub fn new(
        db: Database,
        backend: Arc<dyn SalesBackend>,
        business_id: impl Into<String>,
        emitter: Arc<dyn CheckoutEventEmitter>,
    ) -> Self {
        OfflineQueue {
            db,
            backend,
            business_id: business_id.into(),
            emitter,
        }
    }

    /// Number of sales waiting to sync.
    pub async fn pending_count(&self) -> CheckoutResult<usize> {
        Ok(self.db.pending_queue().count().await?)
    }

    /// Whether any pass on this database currently holds the sync lease.
    pub async fn is_running(&self) -> CheckoutResult<bool> {
        Ok(self.db.sync_lease().holder().await?.is_some())
    }

    /// Runs one resync pass over the queue.
    pub async fn sync_pending(&self) -> CheckoutResult<SyncReport> {
        let owner = format!("resync-{}", Uuid::new_v4().simple());
        let leases = self.db.sync_lease();

        if !leases.try_acquire(&owner, lease_ttl()).await? {
            info!("Resync already running, skipping");
            return Ok(SyncReport::AlreadyRunning);
        }

        let result = self.drain(&owner).await;

        if let Err(e) = leases.release(&owner).await {
            warn!(owner = %owner, error = %e, "Sync lease not released, it will lapse");
        }
        result.map(SyncReport::Finished)
    }

    async fn drain(&self, owner: &str) -> CheckoutResult<SyncSummary> {
        let queue = self.db.pending_queue();
        let entries = queue.list().await?;
        if entries.is_empty() {
            return Ok(SyncSummary::default());
        }
        info!(pending = entries.len(), "Starting resync pass");

        let leases = self.db.sync_lease();
        let mut summary = SyncSummary::default();
        for entry in entries {
            let request = CompleteTransactionRequest::new(&entry.transaction, &self.business_id);

            match self.backend.complete_transaction(&request).await {
                Ok(server_id) => {
                    queue.remove(&entry.local_id).await?;
                    summary.synced += 1;
                    info!(local_id = %entry.local_id, transaction_id = %server_id, "Queued sale synced");
                    self.emitter.emit(&CheckoutEvent::SyncProgress {
                        synced: summary.synced,
                        remaining: queue.count().await?,
                    });
                }
                Err(e) => {
                    warn!(
                        local_id = %entry.local_id,
                        attempts = entry.attempts + 1,
                        error = %e,
                        "Queued sale failed to sync"
                    );
                    queue.record_failure(&entry.local_id, &e.to_string()).await?;
                    summary.failed_id.get_or_insert_with(|| entry.local_id.clone());
                    if e.is_network() {
                        break;
                    }
                }
            }

            if !leases.renew(owner, lease_ttl()).await? {
                warn!(owner = %owner, "Sync lease lost mid-pass, stopping");
                break;
            }
        }

        summary.remaining = queue.count().await?;
        info!(
            synced = summary.synced,
            remaining = summary.remaining,
            "Resync pass finished"
        );
        Ok(summary)
    }
}
