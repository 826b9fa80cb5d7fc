//! # Status Polling
//!
//! One poll loop serves mobile money, dynamic QR, and the simulated QR
//! fallback. It stops on the first of:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  (checked in this order on every wake-up)                              │
//! │                                                                         │
//! │  1. cancellation token        ──► Cancelled                            │
//! │  2. countdown deadline (QR)   ──► Expired                              │
//! │  3. 1 s clock (QR)            ──► CountdownTick event, keep going      │
//! │  4. poll ticker (every 5 s)   ──► status check                         │
//! │        completed              ──► Completed                            │
//! │        failed / cancelled     ──► Failed(message)                      │
//! │        pending / error        ──► keep going                           │
//! │        budget used up         ──► Expired                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A status request already in flight is dropped if the attempt is
//! cancelled, and nothing is sent once the loop has returned.

use std::time::Duration;

use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::attempt::AttemptCell;
use crate::backend::{GatewayStatus, PaymentGateway, StatusReport};
use crate::error::CheckoutResult;
use crate::events::CheckoutEvent;

const COUNTDOWN_TICK: Duration = Duration::from_secs(1);

/// Stand-in deadline when there is no countdown; its branch is disabled.
const NO_DEADLINE: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// How often and how long to poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingPolicy {
    pub interval: Duration,
    pub max_polls: u32,
    /// Independent on-screen countdown; reaching zero expires the attempt.
    pub countdown: Option<Duration>,
}

/// Where each status answer comes from.
#[derive(Debug, Clone)]
pub(crate) enum StatusProbe {
    MobileMoney(String),
    Qr(String),
    /// No gateway: report completed once `completes_at` has passed.
    Simulated { completes_at: Instant },
}

impl StatusProbe {
    async fn check(&self, gateway: &dyn PaymentGateway) -> CheckoutResult<StatusReport> {
        match self {
            StatusProbe::MobileMoney(id) => gateway.mobile_money_status(id).await,
            StatusProbe::Qr(id) => gateway.qr_status(id).await,
            StatusProbe::Simulated { completes_at } => {
                let status = if Instant::now() >= *completes_at {
                    GatewayStatus::Completed
                } else {
                    GatewayStatus::Pending
                };
                Ok(StatusReport::new(status))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExpiryCause {
    Budget,
    Countdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PollOutcome {
    Completed,
    Failed(String),
    Expired(ExpiryCause),
    Cancelled,
}

fn remaining_secs(deadline: Instant) -> u64 {
    let left = deadline.saturating_duration_since(Instant::now());
    left.as_millis().div_ceil(1000) as u64
}

/// Polls until the payment settles, expires, or is cancelled.
pub(crate) async fn poll_until_settled(
    gateway: &dyn PaymentGateway,
    probe: &StatusProbe,
    policy: &PollingPolicy,
    cell: &AttemptCell,
    cancel: &CancellationToken,
) -> PollOutcome {
    let started = Instant::now();
    let deadline = policy.countdown.map(|c| started + c);

    let countdown = sleep_until(deadline.unwrap_or(started + NO_DEADLINE));
    tokio::pin!(countdown);

    let mut clock = interval_at(started + COUNTDOWN_TICK, COUNTDOWN_TICK);
    clock.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut ticker = interval_at(started + policy.interval, policy.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let attempt_id = cell.id();
    if let Some(total) = policy.countdown {
        cell.emit(CheckoutEvent::CountdownTick {
            attempt_id: attempt_id.clone(),
            remaining_secs: total.as_secs(),
        });
    }

    let mut polls: u32 = 0;
    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => return PollOutcome::Cancelled,

            _ = &mut countdown, if deadline.is_some() => {
                info!(attempt_id = %attempt_id, polls, "Countdown reached zero");
                return PollOutcome::Expired(ExpiryCause::Countdown);
            }

            _ = clock.tick(), if deadline.is_some() => {
                if let Some(deadline) = deadline {
                    cell.emit(CheckoutEvent::CountdownTick {
                        attempt_id: attempt_id.clone(),
                        remaining_secs: remaining_secs(deadline),
                    });
                }
            }

            _ = ticker.tick() => {
                if cancel.is_cancelled() || cell.is_terminal() {
                    return PollOutcome::Cancelled;
                }

                polls += 1;
                cell.record_poll(polls);

                // A slow check must not carry the attempt past its countdown.
                let report = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return PollOutcome::Cancelled,
                    _ = &mut countdown, if deadline.is_some() => {
                        info!(attempt_id = %attempt_id, polls, "Countdown reached zero during a status check");
                        return PollOutcome::Expired(ExpiryCause::Countdown);
                    }
                    report = probe.check(gateway) => report,
                };

                match report {
                    Ok(report) => match report.status {
                        GatewayStatus::Completed => return PollOutcome::Completed,
                        GatewayStatus::Failed | GatewayStatus::Cancelled => {
                            return PollOutcome::Failed(report.failure_message());
                        }
                        GatewayStatus::Pending | GatewayStatus::Unknown => {
                            debug!(attempt_id = %attempt_id, poll = polls, "Payment still pending");
                        }
                    },
                    Err(e) => {
                        warn!(attempt_id = %attempt_id, poll = polls, error = %e, "Status check failed");
                    }
                }

                if polls >= policy.max_polls {
                    info!(attempt_id = %attempt_id, polls, "Poll budget exhausted");
                    return PollOutcome::Expired(ExpiryCause::Budget);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CheckoutError;
    use crate::events::NoOpEmitter;
    use crate::testing::{RecordingEmitter, StubBackend};
    use chrono::Utc;
    use soko_core::{
        Currency, Customer, Discount, OrderSnapshot, OrderTotals, PaymentAttempt, PaymentPayload,
        TaxDescriptor,
    };
    use std::sync::Arc;

    fn cell_with(emitter: Arc<dyn crate::events::CheckoutEventEmitter>) -> AttemptCell {
        let order = OrderSnapshot {
            order_id: "o1".into(),
            items: vec![],
            customer: Customer::walk_in(),
            discount: Discount::none(),
            note: None,
            tax: TaxDescriptor::no_tax(),
            currency: Currency::new("UGX").unwrap(),
            totals: OrderTotals::default(),
            created_at: Utc::now(),
        };
        let attempt = PaymentAttempt::new(
            &order,
            PaymentPayload::Qr {
                transaction_id: "QR-1".into(),
            },
        );
        AttemptCell::new(attempt, emitter)
    }

    fn policy(max_polls: u32, countdown: Option<u64>) -> PollingPolicy {
        PollingPolicy {
            interval: Duration::from_secs(5),
            max_polls,
            countdown: countdown.map(Duration::from_secs),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_exhaustion_makes_exact_number_of_calls() {
        let stub = StubBackend::new();
        let cell = cell_with(Arc::new(NoOpEmitter));
        let started = Instant::now();

        let outcome = poll_until_settled(
            &stub,
            &StatusProbe::MobileMoney("MM-1".into()),
            &policy(30, None),
            &cell,
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(outcome, PollOutcome::Expired(ExpiryCause::Budget));
        assert_eq!(stub.calls().mobile_money_status, 30);
        assert_eq!(cell.snapshot().polls, 30);
        assert_eq!(started.elapsed(), Duration::from_secs(150));
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_status_stops_polling() {
        let stub = StubBackend::new();
        stub.script_mobile_money([
            Ok(StatusReport::new(GatewayStatus::Pending)),
            Err(CheckoutError::NetworkUnavailable("blip".into())),
            Ok(StatusReport::new(GatewayStatus::Completed)),
        ]);
        let cell = cell_with(Arc::new(NoOpEmitter));

        let outcome = poll_until_settled(
            &stub,
            &StatusProbe::MobileMoney("MM-1".into()),
            &policy(30, None),
            &cell,
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(outcome, PollOutcome::Completed);
        assert_eq!(stub.calls().mobile_money_status, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gateway_cancelled_maps_to_failed() {
        let stub = StubBackend::new();
        stub.script_mobile_money([Ok(StatusReport {
            status: GatewayStatus::Cancelled,
            message: Some("Customer rejected the prompt".into()),
        })]);
        let cell = cell_with(Arc::new(NoOpEmitter));

        let outcome = poll_until_settled(
            &stub,
            &StatusProbe::MobileMoney("MM-1".into()),
            &policy(30, None),
            &cell,
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(outcome, PollOutcome::Failed("Customer rejected the prompt".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_wins_over_budget() {
        let stub = StubBackend::new();
        let emitter = Arc::new(RecordingEmitter::new());
        let cell = cell_with(emitter.clone());

        let outcome = poll_until_settled(
            &stub,
            &StatusProbe::Qr("QR-1".into()),
            &policy(60, Some(300)),
            &cell,
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(outcome, PollOutcome::Expired(ExpiryCause::Countdown));
        assert!(stub.calls().qr_status <= 60);

        let ticks = emitter.countdown_ticks();
        assert_eq!(ticks.first(), Some(&300));
        assert_eq!(ticks.last(), Some(&1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_countdown_expires_before_budget() {
        let stub = StubBackend::new();
        let cell = cell_with(Arc::new(NoOpEmitter));
        let started = Instant::now();

        let outcome = poll_until_settled(
            &stub,
            &StatusProbe::Qr("QR-1".into()),
            &policy(60, Some(12)),
            &cell,
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(outcome, PollOutcome::Expired(ExpiryCause::Countdown));
        assert_eq!(stub.calls().qr_status, 2);
        assert_eq!(started.elapsed(), Duration::from_secs(12));
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_expires_during_slow_status_check() {
        let stub = StubBackend::new();
        stub.set_status_delay(Duration::from_secs(4));
        stub.script_qr([Ok(StatusReport::new(GatewayStatus::Completed))]);
        let cell = cell_with(Arc::new(NoOpEmitter));
        let started = Instant::now();

        // The only check starts at 5 s and would answer at 9 s.
        let outcome = poll_until_settled(
            &stub,
            &StatusProbe::Qr("QR-1".into()),
            &policy(60, Some(7)),
            &cell,
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(outcome, PollOutcome::Expired(ExpiryCause::Countdown));
        assert_eq!(stub.calls().qr_status, 1);
        assert_eq!(started.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_further_calls() {
        let stub = Arc::new(StubBackend::new());
        let cell = cell_with(Arc::new(NoOpEmitter));
        let token = CancellationToken::new();

        let task = tokio::spawn({
            let (stub, cell, token) = (stub.clone(), cell.clone(), token.clone());
            async move {
                poll_until_settled(
                    stub.as_ref(),
                    &StatusProbe::MobileMoney("MM-1".into()),
                    &policy(30, None),
                    &cell,
                    &token,
                )
                .await
            }
        });

        tokio::time::sleep(Duration::from_secs(12)).await;
        token.cancel();
        assert_eq!(task.await.unwrap(), PollOutcome::Cancelled);
        assert_eq!(stub.calls().mobile_money_status, 2);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(stub.calls().mobile_money_status, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_status_completes_after_delay() {
        let stub = StubBackend::new();
        let cell = cell_with(Arc::new(NoOpEmitter));
        let probe = StatusProbe::Simulated {
            completes_at: Instant::now() + Duration::from_secs(10),
        };

        let outcome =
            poll_until_settled(&stub, &probe, &policy(60, Some(300)), &cell, &CancellationToken::new())
                .await;

        assert_eq!(outcome, PollOutcome::Completed);
        assert_eq!(stub.calls().qr_status, 0);
        assert_eq!(cell.snapshot().polls, 2);
    }
}
