//! Scripted in-memory backend and event recorder for tests.
//!
//! [`StubBackend`] implements both backend ports without a network. Each
//! endpoint answers from a script (or a default once the script runs out)
//! and counts its calls, so tests can assert exactly how many requests a
//! flow made.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use soko_core::AttemptState;

use crate::backend::{
    CardPaymentRequest, CompleteTransactionRequest, GatewayStatus, MobileMoneyRequest,
    PaymentGateway, QrCreateRequest, QrCreated, SalesBackend, SendReceiptRequest, StatusReport,
};
use crate::error::{CheckoutError, CheckoutResult};
use crate::events::{CheckoutEvent, CheckoutEventEmitter};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Stub Backend
// =============================================================================

/// Per-endpoint call counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CallCounts {
    pub card: usize,
    pub mobile_money_initiate: usize,
    pub mobile_money_status: usize,
    pub qr_create: usize,
    pub qr_status: usize,
    pub complete_transaction: usize,
    pub send_receipt: usize,
}

struct StubState {
    card_result: CheckoutResult<String>,
    card_delay: Duration,
    mobile_money_initiate: CheckoutResult<String>,
    mobile_money_script: VecDeque<CheckoutResult<StatusReport>>,
    mobile_money_default: StatusReport,
    qr_create_failure: Option<CheckoutError>,
    qr_script: VecDeque<CheckoutResult<StatusReport>>,
    qr_default: StatusReport,
    status_delay: Duration,
    online: bool,
    /// Acknowledgements left before the backend goes offline.
    ack_budget: Option<usize>,
    rejected: HashSet<String>,
    complete_delay: Duration,
    server_ids: HashMap<String, String>,
    recorded: Vec<CompleteTransactionRequest>,
    receipt_failure: Option<CheckoutError>,
    receipts: Vec<SendReceiptRequest>,
    calls: CallCounts,
    in_flight: usize,
    max_in_flight: usize,
}

/// Stub payments + sales backend.
///
/// Defaults: cards approve, mobile money and QR stay `pending` forever,
/// the sales backend is online and deduplicates by `local_id`.
pub struct StubBackend {
    state: Mutex<StubState>,
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StubBackend {
    pub fn new() -> Self {
        StubBackend {
            state: Mutex::new(StubState {
                card_result: Ok("PAY-STUB-1".to_string()),
                card_delay: Duration::ZERO,
                mobile_money_initiate: Ok("MM-STUB-1".to_string()),
                mobile_money_script: VecDeque::new(),
                mobile_money_default: StatusReport::new(GatewayStatus::Pending),
                qr_create_failure: None,
                qr_script: VecDeque::new(),
                qr_default: StatusReport::new(GatewayStatus::Pending),
                status_delay: Duration::ZERO,
                online: true,
                ack_budget: None,
                rejected: HashSet::new(),
                complete_delay: Duration::ZERO,
                server_ids: HashMap::new(),
                recorded: Vec::new(),
                receipt_failure: None,
                receipts: Vec::new(),
                calls: CallCounts::default(),
                in_flight: 0,
                max_in_flight: 0,
            }),
        }
    }

    /// Makes the next card payments decline with `message`.
    pub fn decline_cards(&self, message: &str) {
        lock(&self.state).card_result = Err(CheckoutError::GatewayRejected(message.to_string()));
    }

    /// Makes the card gateway take `delay` to answer.
    pub fn set_card_delay(&self, delay: Duration) {
        lock(&self.state).card_delay = delay;
    }

    pub fn fail_mobile_money_initiation(&self, err: CheckoutError) {
        lock(&self.state).mobile_money_initiate = Err(err);
    }

    /// Queues status answers; once exhausted the default answer repeats.
    pub fn script_mobile_money<I>(&self, statuses: I)
    where
        I: IntoIterator<Item = CheckoutResult<StatusReport>>,
    {
        lock(&self.state).mobile_money_script.extend(statuses);
    }

    pub fn script_qr<I>(&self, statuses: I)
    where
        I: IntoIterator<Item = CheckoutResult<StatusReport>>,
    {
        lock(&self.state).qr_script.extend(statuses);
    }

    /// Makes every status check take `delay` before answering.
    pub fn set_status_delay(&self, delay: Duration) {
        lock(&self.state).status_delay = delay;
    }

    pub fn fail_qr_creation(&self, err: CheckoutError) {
        lock(&self.state).qr_create_failure = Some(err);
    }

    pub fn set_online(&self, online: bool) {
        lock(&self.state).online = online;
    }

    /// Accepts `n` more sales, then behaves as offline.
    pub fn set_ack_budget(&self, n: usize) {
        lock(&self.state).ack_budget = Some(n);
    }

    /// Rejects the sale with this `local_id` (a non-network failure).
    pub fn reject_transaction(&self, local_id: &str) {
        lock(&self.state).rejected.insert(local_id.to_string());
    }

    pub fn set_complete_delay(&self, delay: Duration) {
        lock(&self.state).complete_delay = delay;
    }

    pub fn fail_receipts(&self, err: CheckoutError) {
        lock(&self.state).receipt_failure = Some(err);
    }

    pub fn calls(&self) -> CallCounts {
        lock(&self.state).calls
    }

    /// Distinct sales the backend has recorded, in arrival order.
    pub fn recorded_transactions(&self) -> Vec<CompleteTransactionRequest> {
        lock(&self.state).recorded.clone()
    }

    pub fn receipts(&self) -> Vec<SendReceiptRequest> {
        lock(&self.state).receipts.clone()
    }

    /// Highest number of `complete_transaction` calls seen in flight at once.
    pub fn max_concurrent_completes(&self) -> usize {
        lock(&self.state).max_in_flight
    }
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

fn next_status(
    script: &mut VecDeque<CheckoutResult<StatusReport>>,
    default: &StatusReport,
) -> CheckoutResult<StatusReport> {
    script.pop_front().unwrap_or_else(|| Ok(default.clone()))
}

#[async_trait]
impl PaymentGateway for StubBackend {
    async fn process_card(&self, _request: &CardPaymentRequest) -> CheckoutResult<String> {
        let delay = {
            let mut state = lock(&self.state);
            state.calls.card += 1;
            state.card_delay
        };
        pause(delay).await;
        lock(&self.state).card_result.clone()
    }

    async fn initiate_mobile_money(&self, _request: &MobileMoneyRequest) -> CheckoutResult<String> {
        let mut state = lock(&self.state);
        state.calls.mobile_money_initiate += 1;
        state.mobile_money_initiate.clone()
    }

    async fn mobile_money_status(&self, _transaction_id: &str) -> CheckoutResult<StatusReport> {
        let delay = {
            let mut state = lock(&self.state);
            state.calls.mobile_money_status += 1;
            state.status_delay
        };
        pause(delay).await;
        let mut state = lock(&self.state);
        let StubState {
            mobile_money_script,
            mobile_money_default,
            ..
        } = &mut *state;
        next_status(mobile_money_script, mobile_money_default)
    }

    async fn create_qr(&self, request: &QrCreateRequest) -> CheckoutResult<QrCreated> {
        let mut state = lock(&self.state);
        state.calls.qr_create += 1;
        if let Some(err) = &state.qr_create_failure {
            return Err(err.clone());
        }
        Ok(QrCreated {
            qr_data: format!("soko://pay/{}", request.transaction_id),
            transaction_id: request.transaction_id.clone(),
        })
    }

    async fn qr_status(&self, _transaction_id: &str) -> CheckoutResult<StatusReport> {
        let delay = {
            let mut state = lock(&self.state);
            state.calls.qr_status += 1;
            state.status_delay
        };
        pause(delay).await;
        let mut state = lock(&self.state);
        let StubState {
            qr_script,
            qr_default,
            ..
        } = &mut *state;
        next_status(qr_script, qr_default)
    }
}

#[async_trait]
impl SalesBackend for StubBackend {
    async fn complete_transaction(
        &self,
        request: &CompleteTransactionRequest,
    ) -> CheckoutResult<String> {
        let delay = {
            let mut state = lock(&self.state);
            state.calls.complete_transaction += 1;
            if !state.online {
                return Err(CheckoutError::NetworkUnavailable("stub backend offline".into()));
            }
            if let Some(budget) = state.ack_budget.as_mut() {
                if *budget == 0 {
                    return Err(CheckoutError::NetworkUnavailable("stub backend offline".into()));
                }
                *budget -= 1;
            }
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
            state.complete_delay
        };

        pause(delay).await;

        let mut state = lock(&self.state);
        state.in_flight -= 1;
        if state.rejected.contains(&request.local_id) {
            return Err(CheckoutError::GatewayRejected("Sale rejected by backend".into()));
        }
        if let Some(id) = state.server_ids.get(&request.local_id) {
            return Ok(id.clone());
        }
        let id = format!("SRV-{}", state.server_ids.len() + 1);
        state.server_ids.insert(request.local_id.clone(), id.clone());
        state.recorded.push(request.clone());
        Ok(id)
    }

    async fn send_receipt(&self, request: &SendReceiptRequest) -> CheckoutResult<()> {
        let mut state = lock(&self.state);
        state.calls.send_receipt += 1;
        if let Some(err) = &state.receipt_failure {
            return Err(err.clone());
        }
        state.receipts.push(request.clone());
        Ok(())
    }
}

// =============================================================================
// Recording Emitter
// =============================================================================

/// Keeps every emitted event.
#[derive(Default)]
pub struct RecordingEmitter {
    events: Mutex<Vec<CheckoutEvent>>,
}

impl RecordingEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<CheckoutEvent> {
        lock(&self.events).clone()
    }

    /// Target states of every attempt transition, in order.
    pub fn transitions(&self) -> Vec<AttemptState> {
        lock(&self.events)
            .iter()
            .filter_map(|e| match e {
                CheckoutEvent::AttemptStateChanged { to, .. } => Some(*to),
                _ => None,
            })
            .collect()
    }

    pub fn countdown_ticks(&self) -> Vec<u64> {
        lock(&self.events)
            .iter()
            .filter_map(|e| match e {
                CheckoutEvent::CountdownTick { remaining_secs, .. } => Some(*remaining_secs),
                _ => None,
            })
            .collect()
    }
}

impl CheckoutEventEmitter for RecordingEmitter {
    fn emit(&self, event: &CheckoutEvent) {
        lock(&self.events).push(event.clone());
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// A South Sudan shop: SSP prices, 18% sales tax.
pub fn sample_cart() -> soko_core::Cart {
    let policy = soko_core::TaxPolicy::new(
        soko_core::TaxTable::default(),
        "SS",
        soko_core::TaxPrecedence::default(),
    );
    soko_core::Cart::new(sample_currency(), std::sync::Arc::new(policy))
}

pub fn sample_currency() -> soko_core::Currency {
    soko_core::Currency::new("SSP").unwrap_or_else(|_| unreachable!("SSP is a valid code"))
}

pub fn sample_product(id: &str, price_minor: i64, stock: i64) -> soko_core::Product {
    soko_core::Product {
        id: id.to_string(),
        name: format!("Product {id}"),
        price: soko_core::Money::from_minor(price_minor),
        currency: sample_currency(),
        stock,
        category: None,
    }
}

/// One line of 2 x 10.00 SSP: subtotal 20.00, tax 3.60, total 23.60.
pub fn sample_order() -> soko_core::OrderSnapshot {
    let mut cart = sample_cart();
    let product = sample_product("tea", 1_000, 50);
    for _ in 0..2 {
        if let Err(e) = cart.add_item(&product) {
            unreachable!("fixture cart rejected item: {e}");
        }
    }
    cart.snapshot()
}
