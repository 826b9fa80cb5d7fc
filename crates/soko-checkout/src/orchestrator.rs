//! # Payment Orchestrator
//!
//! Turns a frozen order plus the operator's choice of method into a running
//! [`PaymentAttempt`], and drives it to a terminal state.
//!
//! ## Flows
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Cash         Created ─► Submitting ─► Completed (change computed)     │
//! │               (insufficient cash is refused before an attempt exists)  │
//! │                                                                         │
//! │  Card         Created ─► Submitting ─► Completed | Failed(message)     │
//! │                                                                         │
//! │  Mobile money Created ─► Submitting ─► AwaitingExternalAction          │
//! │                 ─► Polling ─► Completed | Failed | Expired (budget)    │
//! │                                                                         │
//! │  Dynamic QR   Created ─► Submitting ─► AwaitingExternalAction (QR up)  │
//! │                 ─► Polling ─► Completed | Failed                       │
//! │                             | Expired (budget or countdown)            │
//! │               QR create failed: local QR + simulated completion        │
//! │                                                                         │
//! │  Any live state ─► Cancelled (operator), except a submitted card       │
//! │  charge, which only the gateway's answer can end                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only one attempt is live at a time. Starting another while one is
//! non-terminal fails with `AttemptInProgress`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use soko_core::payment::settle_cash;
use soko_core::validation::{validate_card, validate_payment_amount, validate_phone_number};
use soko_core::{
    AttemptState, CardDetails, Money, OrderSnapshot, PaymentAttempt, PaymentPayload, QrDisplay,
};

use crate::attempt::{AttemptCell, AttemptHandle};
use crate::backend::{CardPaymentRequest, MobileMoneyRequest, PaymentGateway, QrCreateRequest};
use crate::config::CheckoutConfig;
use crate::error::{CheckoutError, CheckoutResult};
use crate::events::{CheckoutEvent, CheckoutEventEmitter};
use crate::poller::{poll_until_settled, PollOutcome, PollingPolicy, StatusProbe};

/// What the operator asked to be paid with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentRequest {
    Cash { received: Money },
    Card(CardDetails),
    MobileMoney { phone_number: String },
    Qr,
}

/// Timing knobs for the asynchronous methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorSettings {
    pub mobile_money: PollingPolicy,
    pub qr: PollingPolicy,
    /// Delay before the local QR fallback reports completion.
    pub qr_fallback_completion: Duration,
}

impl OrchestratorSettings {
    pub fn from_config(config: &CheckoutConfig) -> Self {
        OrchestratorSettings {
            mobile_money: config.mobile_money_polling(),
            qr: config.qr_polling(),
            qr_fallback_completion: config.qr_fallback_completion(),
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&CheckoutConfig::default())
    }
}

pub struct PaymentOrchestrator {
    gateway: Arc<dyn PaymentGateway>,
    emitter: Arc<dyn CheckoutEventEmitter>,
    settings: Arc<OrchestratorSettings>,
    business_id: String,
    active: Mutex<Option<AttemptHandle>>,
}

impl PaymentOrchestrator {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        emitter: Arc<dyn CheckoutEventEmitter>,
        settings: OrchestratorSettings,
        business_id: impl Into<String>,
    ) -> Self {
        PaymentOrchestrator {
            gateway,
            emitter,
            settings: Arc::new(settings),
            business_id: business_id.into(),
            active: Mutex::new(None),
        }
    }

    fn active_slot(&self) -> MutexGuard<'_, Option<AttemptHandle>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The most recent attempt, live or finished.
    pub fn active(&self) -> Option<AttemptHandle> {
        self.active_slot().clone()
    }

    pub fn has_live_attempt(&self) -> bool {
        self.active_slot().as_ref().is_some_and(|h| !h.is_terminal())
    }

    /// Starts paying for `order`.
    ///
    /// Local guards (empty order, live attempt, short cash, invalid card or
    /// phone) are checked before any attempt exists, so a refusal leaves
    /// nothing behind. Cash settles before this returns; the other methods
    /// run on a spawned task and must be called from inside a Tokio runtime.
    pub fn begin(
        &self,
        order: &OrderSnapshot,
        request: PaymentRequest,
    ) -> CheckoutResult<AttemptHandle> {
        if order.items.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let mut slot = self.active_slot();
        if slot.as_ref().is_some_and(|h| !h.is_terminal()) {
            return Err(CheckoutError::AttemptInProgress);
        }

        let (payload, change) = prepare(order, request)?;
        let attempt = PaymentAttempt::new(order, payload.clone());
        info!(
            attempt_id = %attempt.id,
            order_id = %attempt.order_id,
            method = %attempt.method,
            amount = %attempt.amount_due,
            currency = %attempt.currency,
            "Payment attempt created"
        );

        let cell = AttemptCell::new(attempt, self.emitter.clone());
        let cancel = CancellationToken::new();
        let handle = AttemptHandle::new(cell.clone(), cancel.clone());
        *slot = Some(handle.clone());
        drop(slot);

        let gateway = self.gateway.clone();
        let settings = self.settings.clone();
        let business_id = self.business_id.clone();

        match payload {
            PaymentPayload::Cash { .. } => {
                cell.transition(AttemptState::Submitting);
                cell.transition_with(AttemptState::Completed, |a| a.change = change);
            }
            PaymentPayload::Card(card) => {
                tokio::spawn(drive_card(gateway, cell, card, business_id));
            }
            PaymentPayload::MobileMoney { phone_number } => {
                tokio::spawn(drive_mobile_money(
                    gateway,
                    cell,
                    cancel,
                    settings,
                    phone_number,
                    business_id,
                ));
            }
            PaymentPayload::Qr { .. } => {
                tokio::spawn(drive_qr(
                    gateway,
                    cell,
                    cancel,
                    settings,
                    order.clone(),
                    business_id,
                ));
            }
        }

        Ok(handle)
    }

    /// Cancels the live attempt.
    ///
    /// Fails with `AttemptInProgress` while a card charge awaits the
    /// gateway, and with `NoActiveAttempt` if nothing is live.
    pub fn cancel_active(&self) -> CheckoutResult<PaymentAttempt> {
        let handle = self.active().ok_or(CheckoutError::NoActiveAttempt)?;
        if !handle.cancel() {
            if handle.is_terminal() {
                return Err(CheckoutError::NoActiveAttempt);
            }
            warn!(attempt_id = %handle.id(), "Cancel refused, card charge awaiting gateway");
            return Err(CheckoutError::AttemptInProgress);
        }
        Ok(handle.snapshot())
    }

    /// Forgets a finished attempt. A live one is left alone.
    pub fn release(&self) {
        let mut slot = self.active_slot();
        if slot.as_ref().is_some_and(|h| h.is_terminal()) {
            *slot = None;
        }
    }
}

/// Validates the request and turns it into the attempt payload.
///
/// For cash also returns the change due.
fn prepare(
    order: &OrderSnapshot,
    request: PaymentRequest,
) -> CheckoutResult<(PaymentPayload, Option<Money>)> {
    match request {
        PaymentRequest::Cash { received } => {
            validate_payment_amount(received)?;
            let change = settle_cash(received, order.totals.total)?;
            Ok((PaymentPayload::Cash { received }, Some(change)))
        }
        PaymentRequest::Card(card) => {
            validate_card(&card, Utc::now())?;
            Ok((PaymentPayload::Card(card), None))
        }
        PaymentRequest::MobileMoney { phone_number } => {
            let phone_number = validate_phone_number(&phone_number)?;
            Ok((PaymentPayload::MobileMoney { phone_number }, None))
        }
        PaymentRequest::Qr => {
            let transaction_id = format!("QR-{}", Uuid::new_v4().simple()).to_uppercase();
            Ok((PaymentPayload::Qr { transaction_id }, None))
        }
    }
}

// =============================================================================
// Drivers
// =============================================================================

async fn drive_card(
    gateway: Arc<dyn PaymentGateway>,
    cell: AttemptCell,
    card: CardDetails,
    business_id: String,
) {
    if !cell.transition(AttemptState::Submitting) {
        return;
    }

    let attempt = cell.snapshot();
    let request = CardPaymentRequest::new(&attempt, &card, &business_id);
    info!(attempt_id = %attempt.id, card = %card.masked(), "Submitting card payment");

    // Not raced against cancellation; the attempt refuses to cancel
    // until this answer is in.
    match gateway.process_card(&request).await {
        Ok(payment_id) => {
            if !cell.transition_with(AttemptState::Completed, |a| {
                a.gateway_ref = Some(payment_id.clone())
            }) {
                warn!(attempt_id = %attempt.id, payment_id = %payment_id, "Card approved after the attempt ended");
            }
        }
        Err(e) => {
            warn!(attempt_id = %attempt.id, error = %e, "Card payment failed");
            cell.fail(e.to_string());
        }
    }
}

async fn drive_mobile_money(
    gateway: Arc<dyn PaymentGateway>,
    cell: AttemptCell,
    cancel: CancellationToken,
    settings: Arc<OrchestratorSettings>,
    phone_number: String,
    business_id: String,
) {
    if !cell.transition(AttemptState::Submitting) {
        return;
    }

    let attempt = cell.snapshot();
    let request = MobileMoneyRequest::new(&attempt, &phone_number, &business_id);
    let initiated = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        result = gateway.initiate_mobile_money(&request) => result,
    };

    let gateway_ref = match initiated {
        Ok(id) => id,
        Err(e) => {
            warn!(attempt_id = %attempt.id, error = %e, "Mobile money initiation failed");
            cell.fail(e.to_string());
            return;
        }
    };

    let reference = gateway_ref.clone();
    if !cell.transition_with(AttemptState::AwaitingExternalAction, |a| {
        a.gateway_ref = Some(reference)
    }) {
        return;
    }
    if !cell.transition(AttemptState::Polling) {
        return;
    }

    let outcome = poll_until_settled(
        gateway.as_ref(),
        &StatusProbe::MobileMoney(gateway_ref),
        &settings.mobile_money,
        &cell,
        &cancel,
    )
    .await;
    apply_outcome(&cell, outcome);
}

async fn drive_qr(
    gateway: Arc<dyn PaymentGateway>,
    cell: AttemptCell,
    cancel: CancellationToken,
    settings: Arc<OrchestratorSettings>,
    order: OrderSnapshot,
    business_id: String,
) {
    if !cell.transition(AttemptState::Submitting) {
        return;
    }

    let attempt = cell.snapshot();
    let request = QrCreateRequest::new(&order, &attempt, &business_id);
    let created = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        result = gateway.create_qr(&request) => result,
    };

    let (qr, probe, reference) = match created {
        Ok(created) => (
            QrDisplay {
                data: created.qr_data,
                simulated: false,
            },
            StatusProbe::Qr(created.transaction_id.clone()),
            created.transaction_id,
        ),
        Err(e) => {
            warn!(attempt_id = %attempt.id, error = %e, "QR creation failed, showing a local QR code");
            (
                QrDisplay {
                    data: request.synthesize_payload(),
                    simulated: true,
                },
                StatusProbe::Simulated {
                    completes_at: Instant::now() + settings.qr_fallback_completion,
                },
                request.transaction_id.clone(),
            )
        }
    };

    let shown = qr.clone();
    if !cell.transition_with(AttemptState::AwaitingExternalAction, |a| {
        a.qr = Some(shown);
        a.gateway_ref = Some(reference);
    }) {
        return;
    }
    cell.emit(CheckoutEvent::QrReady {
        attempt_id: attempt.id.clone(),
        qr,
    });
    if !cell.transition(AttemptState::Polling) {
        return;
    }

    let outcome = poll_until_settled(gateway.as_ref(), &probe, &settings.qr, &cell, &cancel).await;
    apply_outcome(&cell, outcome);
}

/// Each outcome maps to exactly one transition attempt. If the operator
/// got there first the transition is refused and nothing changes.
fn apply_outcome(cell: &AttemptCell, outcome: PollOutcome) {
    match outcome {
        PollOutcome::Completed => {
            cell.transition(AttemptState::Completed);
        }
        PollOutcome::Failed(message) => {
            cell.fail(message);
        }
        PollOutcome::Expired(cause) => {
            info!(attempt_id = %cell.id(), ?cause, "Payment attempt expired");
            cell.transition(AttemptState::Expired);
        }
        PollOutcome::Cancelled => {
            cell.transition(AttemptState::Cancelled);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{GatewayStatus, StatusReport};
    use crate::testing::{sample_cart, sample_order, sample_product, RecordingEmitter, StubBackend};
    use soko_core::CoreError;

    struct Fixture {
        stub: Arc<StubBackend>,
        emitter: Arc<RecordingEmitter>,
        orchestrator: PaymentOrchestrator,
    }

    fn fixture() -> Fixture {
        let stub = Arc::new(StubBackend::new());
        let emitter = Arc::new(RecordingEmitter::new());
        let orchestrator = PaymentOrchestrator::new(
            stub.clone(),
            emitter.clone(),
            OrchestratorSettings::default(),
            "biz-1",
        );
        Fixture {
            stub,
            emitter,
            orchestrator,
        }
    }

    fn card() -> CardDetails {
        CardDetails {
            number: "4242 4242 4242 4242".into(),
            expiry_month: 12,
            expiry_year: 2099,
            cvc: "123".into(),
            holder_name: "Deng Garang".into(),
        }
    }

    fn expired_count(emitter: &RecordingEmitter) -> usize {
        emitter
            .transitions()
            .into_iter()
            .filter(|s| *s == AttemptState::Expired)
            .count()
    }

    #[tokio::test]
    async fn test_cash_insufficient_is_refused_without_attempt() {
        let f = fixture();
        let order = sample_order();

        let err = f
            .orchestrator
            .begin(&order, PaymentRequest::Cash { received: Money::from_minor(2_000) })
            .unwrap_err();

        assert!(matches!(err, CheckoutError::Core(CoreError::InsufficientPayment { .. })));
        assert!(f.orchestrator.active().is_none());
        assert!(f.emitter.transitions().is_empty());
    }

    #[tokio::test]
    async fn test_cash_completes_with_change() {
        let f = fixture();
        let order = sample_order();
        assert_eq!(order.totals.total.minor(), 2_360);

        let handle = f
            .orchestrator
            .begin(&order, PaymentRequest::Cash { received: Money::from_minor(5_000) })
            .unwrap();

        let attempt = handle.snapshot();
        assert!(attempt.is_completed());
        assert_eq!(attempt.change, Some(Money::from_minor(2_640)));
        assert_eq!(
            f.emitter.transitions(),
            vec![AttemptState::Submitting, AttemptState::Completed]
        );
    }

    #[tokio::test]
    async fn test_empty_order_is_refused() {
        let f = fixture();
        let order = sample_cart().snapshot();
        let err = f.orchestrator.begin(&order, PaymentRequest::Qr).unwrap_err();
        assert_eq!(err, CheckoutError::EmptyCart);
    }

    #[tokio::test]
    async fn test_card_decline_message_is_verbatim() {
        let f = fixture();
        f.stub.decline_cards("Do not honour (05)");

        let handle = f
            .orchestrator
            .begin(&sample_order(), PaymentRequest::Card(card()))
            .unwrap();
        let attempt = handle.wait().await;

        assert_eq!(attempt.state, AttemptState::Failed);
        assert_eq!(attempt.failure.as_deref(), Some("Do not honour (05)"));
        assert_eq!(f.stub.calls().card, 1);
    }

    #[tokio::test]
    async fn test_card_approval_records_payment_id() {
        let f = fixture();
        let handle = f
            .orchestrator
            .begin(&sample_order(), PaymentRequest::Card(card()))
            .unwrap();
        let attempt = handle.wait().await;

        assert!(attempt.is_completed());
        assert_eq!(attempt.gateway_ref.as_deref(), Some("PAY-STUB-1"));
    }

    #[tokio::test]
    async fn test_invalid_card_never_reaches_gateway() {
        let f = fixture();
        let mut bad = card();
        bad.number = "4242 4242 4242 4241".into();

        let err = f
            .orchestrator
            .begin(&sample_order(), PaymentRequest::Card(bad))
            .unwrap_err();
        assert!(matches!(err, CheckoutError::Core(CoreError::Validation(_))));
        assert_eq!(f.stub.calls().card, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mobile_money_expires_after_budget_and_stops() {
        let f = fixture();
        let handle = f
            .orchestrator
            .begin(
                &sample_order(),
                PaymentRequest::MobileMoney {
                    phone_number: "+211 912 345 678".into(),
                },
            )
            .unwrap();

        let attempt = handle.wait().await;
        assert_eq!(attempt.state, AttemptState::Expired);
        assert_eq!(attempt.gateway_ref.as_deref(), Some("MM-STUB-1"));
        assert_eq!(f.stub.calls().mobile_money_status, 30);
        assert_eq!(
            f.emitter.transitions(),
            vec![
                AttemptState::Submitting,
                AttemptState::AwaitingExternalAction,
                AttemptState::Polling,
                AttemptState::Expired,
            ]
        );

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(f.stub.calls().mobile_money_status, 30);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mobile_money_completes() {
        let f = fixture();
        f.stub.script_mobile_money([
            Ok(StatusReport::new(GatewayStatus::Pending)),
            Ok(StatusReport::new(GatewayStatus::Completed)),
        ]);
        let handle = f
            .orchestrator
            .begin(
                &sample_order(),
                PaymentRequest::MobileMoney {
                    phone_number: "211912345678".into(),
                },
            )
            .unwrap();

        assert!(handle.wait().await.is_completed());
        assert_eq!(f.stub.calls().mobile_money_status, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_polling_stops_network_calls() {
        let f = fixture();
        let handle = f
            .orchestrator
            .begin(
                &sample_order(),
                PaymentRequest::MobileMoney {
                    phone_number: "211912345678".into(),
                },
            )
            .unwrap();

        tokio::time::sleep(Duration::from_secs(12)).await;
        let cancelled = f.orchestrator.cancel_active().unwrap();
        assert_eq!(cancelled.state, AttemptState::Cancelled);
        assert_eq!(f.stub.calls().mobile_money_status, 2);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(f.stub.calls().mobile_money_status, 2);
        assert_eq!(handle.state(), AttemptState::Cancelled);
        assert_eq!(
            f.emitter.transitions().last(),
            Some(&AttemptState::Cancelled)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_flight() {
        let f = fixture();
        let order = sample_order();
        let first = f
            .orchestrator
            .begin(
                &order,
                PaymentRequest::MobileMoney {
                    phone_number: "211912345678".into(),
                },
            )
            .unwrap();

        let err = f.orchestrator.begin(&order, PaymentRequest::Qr).unwrap_err();
        assert_eq!(err, CheckoutError::AttemptInProgress);

        first.cancel();
        assert!(f
            .orchestrator
            .begin(&order, PaymentRequest::Cash { received: Money::from_minor(10_000) })
            .is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_qr_expires_exactly_once() {
        let f = fixture();
        let started = Instant::now();
        let handle = f.orchestrator.begin(&sample_order(), PaymentRequest::Qr).unwrap();

        let attempt = handle.wait().await;
        assert_eq!(attempt.state, AttemptState::Expired);
        assert!(started.elapsed() <= Duration::from_secs(300));
        assert!(f.stub.calls().qr_status <= 60);
        assert_eq!(f.stub.calls().qr_create, 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(expired_count(&f.emitter), 1);
        assert!(f.stub.calls().qr_status <= 60);

        let qr = attempt.qr.unwrap();
        assert!(!qr.simulated);
        assert!(qr.data.starts_with("soko://pay/QR-"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_qr_creation_failure_falls_back_to_local_code() {
        let f = fixture();
        f.stub
            .fail_qr_creation(CheckoutError::NetworkUnavailable("connection refused".into()));

        let handle = f.orchestrator.begin(&sample_order(), PaymentRequest::Qr).unwrap();
        let attempt = handle.wait().await;

        assert!(attempt.is_completed());
        let qr = attempt.qr.unwrap();
        assert!(qr.simulated);
        let payload: serde_json::Value = serde_json::from_str(&qr.data).unwrap();
        assert_eq!(payload["business_id"], "biz-1");
        assert_eq!(payload["amount"], "23.60");
        assert_eq!(f.stub.calls().qr_status, 0);

        assert!(f
            .emitter
            .events()
            .iter()
            .any(|e| matches!(e, CheckoutEvent::QrReady { qr, .. } if qr.simulated)));
    }

    #[tokio::test]
    async fn test_amount_due_ignores_later_cart_changes() {
        let f = fixture();
        let mut cart = sample_cart();
        cart.add_item(&sample_product("tea", 1_000, 10)).unwrap();
        let order = cart.snapshot();

        let handle = f
            .orchestrator
            .begin(&order, PaymentRequest::Cash { received: Money::from_minor(5_000) })
            .unwrap();
        cart.add_item(&sample_product("sugar", 2_000, 10)).unwrap();

        assert_eq!(handle.snapshot().amount_due, order.totals.total);
        assert_ne!(cart.totals().total, order.totals.total);
    }

    #[tokio::test(start_paused = true)]
    async fn test_card_charge_in_flight_is_not_cancelled() {
        let f = fixture();
        f.stub.set_card_delay(Duration::from_secs(3));
        let handle = f
            .orchestrator
            .begin(&sample_order(), PaymentRequest::Card(card()))
            .unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(handle.state(), AttemptState::Submitting);
        assert_eq!(
            f.orchestrator.cancel_active().unwrap_err(),
            CheckoutError::AttemptInProgress
        );
        assert!(!handle.cancel());

        let attempt = handle.wait().await;
        assert!(attempt.is_completed());
        assert_eq!(attempt.gateway_ref.as_deref(), Some("PAY-STUB-1"));
        assert_eq!(f.stub.calls().card, 1);
    }
}
