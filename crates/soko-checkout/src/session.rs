//! # Checkout Session
//!
//! The POS screen's view of a checkout: one cart, at most one live payment
//! attempt, and the services that take a paid order the rest of the way.
//!
//! ```text
//!   add_item / set_quantity / discount / customer / note
//!         │            (refused while a payment is live)
//!         ▼
//!   begin_payment ──► snapshot ──► PaymentOrchestrator
//!         │
//!         ▼
//!   complete_sale ──► wait ──► Completed ──► SettlementFinalizer ──► cart cleared
//!                          └─► Failed / Expired / Cancelled ──► cart kept
//! ```

use std::sync::Arc;

use tracing::info;

use soko_core::{
    AttemptState, Cart, Customer, Discount, LineItem, OrderSnapshot, PaymentAttempt, Product,
};
use soko_db::Database;

use crate::attempt::AttemptHandle;
use crate::backend::{PaymentGateway, SalesBackend};
use crate::config::CheckoutConfig;
use crate::error::{CheckoutError, CheckoutResult};
use crate::events::CheckoutEventEmitter;
use crate::finalizer::{FinalizedSale, SettlementFinalizer};
use crate::orchestrator::{OrchestratorSettings, PaymentOrchestrator, PaymentRequest};
use crate::queue::{OfflineQueue, SyncReport};

pub struct CheckoutSession {
    cart: Cart,
    /// The order frozen when the live attempt started.
    paying_for: Option<OrderSnapshot>,
    orchestrator: Arc<PaymentOrchestrator>,
    finalizer: Arc<SettlementFinalizer>,
    queue: OfflineQueue,
}

impl CheckoutSession {
    pub fn new(
        cart: Cart,
        orchestrator: Arc<PaymentOrchestrator>,
        finalizer: Arc<SettlementFinalizer>,
        queue: OfflineQueue,
    ) -> Self {
        CheckoutSession {
            cart,
            paying_for: None,
            orchestrator,
            finalizer,
            queue,
        }
    }

    /// Wires a session from configuration.
    ///
    /// `gateway` and `backend` are usually the same `HttpBackend`.
    pub fn from_config(
        config: &CheckoutConfig,
        gateway: Arc<dyn PaymentGateway>,
        backend: Arc<dyn SalesBackend>,
        db: Database,
        emitter: Arc<dyn CheckoutEventEmitter>,
    ) -> CheckoutResult<Self> {
        config.validate()?;
        let business = config.business_identity();

        let cart = Cart::new(config.currency()?, Arc::new(config.tax_policy()));
        let orchestrator = Arc::new(PaymentOrchestrator::new(
            gateway,
            emitter.clone(),
            OrchestratorSettings::from_config(config),
            business.id.clone(),
        ));
        let queue = OfflineQueue::new(db.clone(), backend.clone(), business.id.clone(), emitter.clone());
        let finalizer = Arc::new(SettlementFinalizer::new(backend, db, business, emitter));

        Ok(Self::new(cart, orchestrator, finalizer, queue))
    }

    // =========================================================================
    // Cart
    // =========================================================================

    pub fn cart(&self) -> &Cart {
        &self.cart
    }

    fn ensure_cart_mutable(&self) -> CheckoutResult<()> {
        if self.orchestrator.has_live_attempt() {
            return Err(CheckoutError::AttemptInProgress);
        }
        Ok(())
    }

    pub fn add_item(&mut self, product: &Product) -> CheckoutResult<()> {
        self.ensure_cart_mutable()?;
        Ok(self.cart.add_item(product)?)
    }

    pub fn set_quantity(&mut self, product_id: &str, quantity: i64) -> CheckoutResult<()> {
        self.ensure_cart_mutable()?;
        Ok(self.cart.set_quantity(product_id, quantity)?)
    }

    pub fn remove_item(&mut self, product_id: &str) -> CheckoutResult<LineItem> {
        self.ensure_cart_mutable()?;
        Ok(self.cart.remove_item(product_id)?)
    }

    pub fn apply_discount(&mut self, discount: Discount) -> CheckoutResult<()> {
        self.ensure_cart_mutable()?;
        Ok(self.cart.apply_discount(discount)?)
    }

    pub fn select_customer(&mut self, customer: Option<Customer>) -> CheckoutResult<()> {
        self.ensure_cart_mutable()?;
        self.cart.select_customer(customer);
        Ok(())
    }

    pub fn set_note(&mut self, note: Option<String>) -> CheckoutResult<()> {
        self.ensure_cart_mutable()?;
        self.cart.set_note(note);
        Ok(())
    }

    /// Abandons the order, cancelling any live payment first.
    ///
    /// Refused with `AttemptInProgress` while a card charge awaits the
    /// gateway; the order stays so the sale can still be completed.
    pub fn cancel_order(&mut self) -> CheckoutResult<()> {
        if let Some(handle) = self.orchestrator.active() {
            if !handle.cancel() && !handle.is_terminal() {
                return Err(CheckoutError::AttemptInProgress);
            }
        }
        self.orchestrator.release();
        self.paying_for = None;
        self.cart.clear();
        info!(order_id = %self.cart.order_id(), "Order cancelled, new cart started");
        Ok(())
    }

    // =========================================================================
    // Payment
    // =========================================================================

    /// Freezes the cart and starts a payment attempt.
    pub fn begin_payment(&mut self, request: PaymentRequest) -> CheckoutResult<AttemptHandle> {
        let order = self.cart.snapshot();
        let handle = self.orchestrator.begin(&order, request)?;
        self.paying_for = Some(order);
        Ok(handle)
    }

    pub fn active_attempt(&self) -> Option<AttemptHandle> {
        self.orchestrator.active()
    }

    pub fn cancel_payment(&mut self) -> CheckoutResult<PaymentAttempt> {
        let attempt = self.orchestrator.cancel_active()?;
        self.orchestrator.release();
        self.paying_for = None;
        Ok(attempt)
    }

    /// Waits for the live attempt, then finalizes a completed sale.
    ///
    /// A failed, expired or cancelled attempt returns the matching error
    /// and keeps the cart so the operator can try again.
    pub async fn complete_sale(&mut self, receipt_phone: Option<String>) -> CheckoutResult<FinalizedSale> {
        let handle = self.orchestrator.active().ok_or(CheckoutError::NoActiveAttempt)?;
        let order = self.paying_for.clone().ok_or(CheckoutError::NoActiveAttempt)?;
        let attempt = handle.wait().await;

        if !attempt.is_completed() {
            self.orchestrator.release();
            self.paying_for = None;
            return Err(match attempt.state {
                AttemptState::Expired => CheckoutError::Expired,
                AttemptState::Cancelled => CheckoutError::Cancelled,
                _ => CheckoutError::GatewayRejected(
                    attempt.failure.unwrap_or_else(|| "Payment failed".to_string()),
                ),
            });
        }

        let sale = self.finalizer.finalize(order, attempt, receipt_phone).await?;
        self.orchestrator.release();
        self.paying_for = None;
        self.cart.clear();
        Ok(sale)
    }

    /// Texts the receipt of a finished sale from a post-sale prompt.
    pub async fn send_receipt(&self, sale: &FinalizedSale, phone: &str) -> CheckoutResult<String> {
        if !sale.is_synced() {
            return Err(CheckoutError::NetworkUnavailable(
                "sale has not reached the server yet".to_string(),
            ));
        }
        self.finalizer.send_receipt(&sale.receipt, phone).await
    }

    // =========================================================================
    // Sync
    // =========================================================================

    pub async fn pending_sync_count(&self) -> CheckoutResult<usize> {
        self.queue.pending_count().await
    }

    pub async fn sync_pending(&self) -> CheckoutResult<SyncReport> {
        self.queue.sync_pending().await
    }

    pub fn queue(&self) -> &OfflineQueue {
        &self.queue
    }
}
