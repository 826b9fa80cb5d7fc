//! # Settlement & Receipt Finalizer
//!
//! Runs once per completed payment. The customer has already paid, so the
//! only outcomes are "recorded on the backend" and "queued for later":
//! a sale is never lost to a network failure.
//!
//! ## Finalization Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. Transaction::new(order, attempt)          provenance = Pending     │
//! │  2. SalesBackend::complete_transaction                                  │
//! │        ok   ──► mark_synced(server id)        provenance = Synced      │
//! │        err  ──► PendingQueueRepository::append                          │
//! │  3. StockRepository::decrement_for_sale       (both provenances)       │
//! │  4. Receipt::build                                                      │
//! │  5. SMS receipt, only for synced sales with a phone number             │
//! │        failure is reported, never fatal                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use soko_core::validation::validate_phone_number;
use soko_core::{BusinessIdentity, OrderSnapshot, PaymentAttempt, PendingQueueEntry, Receipt, Transaction};
use soko_db::Database;

use crate::backend::{CompleteTransactionRequest, SalesBackend, SendReceiptRequest};
use crate::error::{CheckoutError, CheckoutResult};
use crate::events::{CheckoutEvent, CheckoutEventEmitter};

/// What happened to the SMS receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiptDispatch {
    /// No phone number was given.
    NotRequested,
    Sent { phone_number: String },
    /// The sale is still queued; the backend cannot text a receipt for a
    /// transaction it has not seen yet.
    Deferred,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct FinalizedSale {
    pub transaction: Transaction,
    pub receipt: Receipt,
    pub receipt_dispatch: ReceiptDispatch,
}

impl FinalizedSale {
    pub fn is_synced(&self) -> bool {
        self.transaction.is_synced()
    }
}

pub struct SettlementFinalizer {
    backend: Arc<dyn SalesBackend>,
    db: Database,
    business: BusinessIdentity,
    emitter: Arc<dyn CheckoutEventEmitter>,
}

impl SettlementFinalizer {
    pub fn new(
        backend: Arc<dyn SalesBackend>,
        db: Database,
        business: BusinessIdentity,
        emitter: Arc<dyn CheckoutEventEmitter>,
    ) -> Self {
        SettlementFinalizer {
            backend,
            db,
            business,
            emitter,
        }
    }

    /// Records a sale whose payment has completed.
    ///
    /// `receipt_phone` overrides the customer's own phone as the SMS target.
    /// Fails only if the attempt is not completed or the sale could be
    /// neither recorded remotely nor queued locally.
    pub async fn finalize(
        &self,
        order: OrderSnapshot,
        attempt: PaymentAttempt,
        receipt_phone: Option<String>,
    ) -> CheckoutResult<FinalizedSale> {
        if !attempt.is_completed() {
            return Err(CheckoutError::Internal(format!(
                "cannot finalize attempt {} in state {}",
                attempt.id, attempt.state
            )));
        }

        let mut tx = Transaction::new(order, attempt);
        let request = CompleteTransactionRequest::new(&tx, &self.business.id);

        match self.backend.complete_transaction(&request).await {
            Ok(server_id) => {
                tx.mark_synced(Some(server_id))?;
                info!(local_id = %tx.local_id, transaction_id = %tx.id, total = %tx.order.totals.total, "Sale recorded");
            }
            Err(e) => {
                warn!(local_id = %tx.local_id, error = %e, network = e.is_network(), "Sale not recorded, queueing for sync");
                self.db
                    .pending_queue()
                    .append(PendingQueueEntry::new(tx.clone()))
                    .await?;
            }
        }

        if let Err(e) = self.db.stock().decrement_for_sale(&tx.order.items).await {
            warn!(local_id = %tx.local_id, error = %e, "Local stock mirror not updated");
        }

        let receipt = Receipt::build(self.business.clone(), &tx, Utc::now());
        self.emitter.emit(&CheckoutEvent::SaleFinalized {
            transaction_id: tx.id.clone(),
            receipt_number: receipt.receipt_number.clone(),
            provenance: tx.provenance,
        });

        let phone = receipt_phone
            .filter(|p| !p.trim().is_empty())
            .or_else(|| tx.order.customer.phone.clone());
        let receipt_dispatch = match phone {
            None => ReceiptDispatch::NotRequested,
            Some(_) if !tx.is_synced() => ReceiptDispatch::Deferred,
            Some(phone) => match self.send_receipt(&receipt, &phone).await {
                Ok(phone_number) => ReceiptDispatch::Sent { phone_number },
                Err(e) => ReceiptDispatch::Failed(e.to_string()),
            },
        };

        Ok(FinalizedSale {
            transaction: tx,
            receipt,
            receipt_dispatch,
        })
    }

    /// Texts a receipt for a synced sale, e.g. from a post-sale prompt.
    ///
    /// Returns the normalized phone number it was sent to. Failures are
    /// also emitted as `ReceiptDispatchFailed`.
    pub async fn send_receipt(&self, receipt: &Receipt, phone: &str) -> CheckoutResult<String> {
        let result = self.try_send_receipt(receipt, phone).await;
        if let Err(e) = &result {
            warn!(transaction_id = %receipt.transaction_id, error = %e, "Receipt dispatch failed");
            self.emitter.emit(&CheckoutEvent::ReceiptDispatchFailed {
                transaction_id: receipt.transaction_id.clone(),
                message: e.to_string(),
            });
        }
        result
    }

    async fn try_send_receipt(&self, receipt: &Receipt, phone: &str) -> CheckoutResult<String> {
        let phone_number = validate_phone_number(phone)?;
        let request = SendReceiptRequest {
            transaction_id: receipt.transaction_id.clone(),
            phone_number: phone_number.clone(),
            receipt_number: receipt.receipt_number.clone(),
            message: receipt.render_text(),
        };
        self.backend.send_receipt(&request).await?;
        info!(transaction_id = %receipt.transaction_id, "Receipt sent by SMS");
        Ok(phone_number)
    }
}
