//! # Live Payment Attempts
//!
//! A running attempt is shared between the task driving it and the
//! operator holding an [`AttemptHandle`]. Both sides go through one
//! [`AttemptCell`], which only ever applies legal state-machine edges, so
//! whichever of "gateway answered", "budget ran out", "countdown hit zero"
//! or "operator cancelled" lands first wins and the others become no-ops.
//!
//! A card charge that has been submitted cannot be cancelled: the gateway
//! may already have taken the money, so only its answer ends the attempt.
//!
//! ```text
//!          driver task                       operator
//!              │                                │
//!              ▼                                ▼
//!   cell.transition(Polling)         handle.cancel()
//!   cell.transition(Completed) ──┐     cell.transition(Cancelled)
//!                                ▼     token.cancel()
//!                      watch::Sender<PaymentAttempt>
//!                                │
//!                                ▼
//!                     handle.wait() / subscribe()
//! ```

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;

use soko_core::{AttemptState, PaymentAttempt, PaymentMethod};

use crate::events::{CheckoutEvent, CheckoutEventEmitter};

/// Shared, transition-guarded attempt state.
#[derive(Clone)]
pub(crate) struct AttemptCell {
    tx: Arc<watch::Sender<PaymentAttempt>>,
    emitter: Arc<dyn CheckoutEventEmitter>,
}

impl AttemptCell {
    pub(crate) fn new(attempt: PaymentAttempt, emitter: Arc<dyn CheckoutEventEmitter>) -> Self {
        let (tx, _rx) = watch::channel(attempt);
        AttemptCell {
            tx: Arc::new(tx),
            emitter,
        }
    }

    pub(crate) fn snapshot(&self) -> PaymentAttempt {
        self.tx.borrow().clone()
    }

    pub(crate) fn state(&self) -> AttemptState {
        self.tx.borrow().state
    }

    pub(crate) fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<PaymentAttempt> {
        self.tx.subscribe()
    }

    /// Applies `to` if legal from the current state, then `extra` on the
    /// same write. Returns whether the transition happened.
    pub(crate) fn transition_with<F>(&self, to: AttemptState, extra: F) -> bool
    where
        F: FnOnce(&mut PaymentAttempt),
    {
        self.transition_if(to, |_| true, extra)
    }

    /// Like [`transition_with`](Self::transition_with), but only when
    /// `allow` accepts the current attempt. Checked on the same write.
    fn transition_if<G, F>(&self, to: AttemptState, allow: G, extra: F) -> bool
    where
        G: FnOnce(&PaymentAttempt) -> bool,
        F: FnOnce(&mut PaymentAttempt),
    {
        let mut applied = None;
        self.tx.send_if_modified(|attempt| {
            let from = attempt.state;
            if !allow(attempt) || attempt.transition(to).is_err() {
                return false;
            }
            extra(attempt);
            applied = Some((from, attempt.id.clone(), attempt.method));
            true
        });

        match applied {
            Some((from, attempt_id, method)) => {
                info!(attempt_id = %attempt_id, %method, %from, %to, "Payment attempt transition");
                self.emitter.emit(&CheckoutEvent::AttemptStateChanged {
                    attempt_id,
                    method,
                    from,
                    to,
                });
                true
            }
            None => false,
        }
    }

    pub(crate) fn transition(&self, to: AttemptState) -> bool {
        self.transition_with(to, |_| {})
    }

    /// Moves to `Failed` with the operator-facing reason.
    pub(crate) fn fail(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        self.transition_with(AttemptState::Failed, move |a| a.failure = Some(reason))
    }

    /// Moves to `Cancelled` unless a card charge is already with the gateway.
    pub(crate) fn cancel(&self) -> bool {
        self.transition_if(AttemptState::Cancelled, |a| !charge_in_flight(a), |_| {})
    }

    pub(crate) fn record_poll(&self, polls: u32) {
        self.tx.send_modify(|a| a.polls = polls);
    }

    pub(crate) fn emit(&self, event: CheckoutEvent) {
        self.emitter.emit(&event);
    }

    pub(crate) fn id(&self) -> String {
        self.tx.borrow().id.clone()
    }
}

fn charge_in_flight(attempt: &PaymentAttempt) -> bool {
    attempt.method == PaymentMethod::Card && attempt.state == AttemptState::Submitting
}

/// Operator-side view of a running attempt.
#[derive(Clone)]
pub struct AttemptHandle {
    cell: AttemptCell,
    cancel: CancellationToken,
}

impl AttemptHandle {
    pub(crate) fn new(cell: AttemptCell, cancel: CancellationToken) -> Self {
        AttemptHandle { cell, cancel }
    }

    pub fn id(&self) -> String {
        self.cell.id()
    }

    pub fn snapshot(&self) -> PaymentAttempt {
        self.cell.snapshot()
    }

    pub fn state(&self) -> AttemptState {
        self.cell.state()
    }

    pub fn is_terminal(&self) -> bool {
        self.cell.is_terminal()
    }

    /// Watches every update of the attempt.
    pub fn subscribe(&self) -> watch::Receiver<PaymentAttempt> {
        self.cell.subscribe()
    }

    /// Cancels the attempt.
    ///
    /// The state becomes `Cancelled` before this returns and the driving
    /// task is told to stop, so no poll or transition runs afterwards.
    /// Returns false if the attempt had already ended, or if it is a card
    /// charge the gateway has not answered yet; that attempt keeps running.
    pub fn cancel(&self) -> bool {
        if !self.cell.cancel() {
            return false;
        }
        self.cancel.cancel();
        true
    }

    /// Whether [`cancel`](Self::cancel) would take effect right now.
    pub fn is_cancellable(&self) -> bool {
        let attempt = self.cell.snapshot();
        !attempt.is_terminal() && !charge_in_flight(&attempt)
    }

    /// Waits for a terminal state and returns the final attempt.
    pub async fn wait(&self) -> PaymentAttempt {
        let mut rx = self.cell.subscribe();
        loop {
            {
                let attempt = rx.borrow_and_update();
                if attempt.is_terminal() {
                    return attempt.clone();
                }
            }
            if rx.changed().await.is_err() {
                return self.cell.snapshot();
            }
        }
    }
}

impl std::fmt::Debug for AttemptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let attempt = self.cell.snapshot();
        f.debug_struct("AttemptHandle")
            .field("id", &attempt.id)
            .field("method", &attempt.method)
            .field("state", &attempt.state)
            .finish()
    }
}
