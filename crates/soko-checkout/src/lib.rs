//! # soko-checkout: Payments, Settlement and Offline Sync for Soko POS
//!
//! Everything in a checkout that waits on something outside the device:
//! the payment gateway, the customer's phone, the sales backend, a timer.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         CheckoutSession                                 │
//! │                                                                         │
//! │   Cart (soko-core) ──snapshot──► PaymentOrchestrator                   │
//! │                                      │  cash: settled inline           │
//! │                                      │  card: one gateway call         │
//! │                                      │  momo / QR: spawned driver      │
//! │                                      │        └─► poller (5 s ticks,   │
//! │                                      │            budget, countdown)   │
//! │                                      ▼                                  │
//! │                              AttemptHandle (wait / cancel)              │
//! │                                      │ Completed                        │
//! │                                      ▼                                  │
//! │                              SettlementFinalizer                        │
//! │                                │ synced        │ offline                │
//! │                                ▼               ▼                        │
//! │                         SalesBackend    PendingQueue (soko-db)          │
//! │                                                ▲                        │
//! │                                   OfflineQueue::sync_pending            │
//! │                                   (single-flight resync pass)           │
//! │                                                                         │
//! │  EVENTS (to the UI via CheckoutEventEmitter):                          │
//! │  • attempt state changes      • QR ready / countdown ticks             │
//! │  • sale finalized             • receipt failures, sync progress        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`attempt`] - Shared attempt state and the operator's `AttemptHandle`
//! - [`backend`] - Gateway / sales ports, wire types, reqwest client
//! - [`config`] - Checkout configuration (TOML + env)
//! - [`error`] - Checkout error types
//! - [`events`] - UI event emitter
//! - [`finalizer`] - Turns a paid order into a recorded or queued sale
//! - [`orchestrator`] - Payment attempts per method
//! - [`poller`] - Status polling loop
//! - [`queue`] - Offline queue resync
//! - [`session`] - The POS checkout session

pub mod attempt;
pub mod backend;
pub mod config;
pub mod error;
pub mod events;
pub mod finalizer;
pub mod orchestrator;
pub mod poller;
pub mod queue;
pub mod session;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use attempt::AttemptHandle;
pub use backend::{HttpBackend, PaymentGateway, SalesBackend};
pub use config::CheckoutConfig;
pub use error::{CheckoutError, CheckoutResult};
pub use events::{CheckoutEvent, CheckoutEventEmitter, NoOpEmitter};
pub use finalizer::{FinalizedSale, ReceiptDispatch, SettlementFinalizer};
pub use orchestrator::{OrchestratorSettings, PaymentOrchestrator, PaymentRequest};
pub use poller::PollingPolicy;
pub use queue::{OfflineQueue, SyncReport, SyncSummary};
pub use session::CheckoutSession;
