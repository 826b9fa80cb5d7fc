//! # Backend Ports
//!
//! The two remote collaborators of a checkout, expressed as traits so the
//! orchestrator and finalizer never see HTTP.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   PaymentOrchestrator ──► PaymentGateway   card / mobile money / QR    │
//! │                                                                         │
//! │   SettlementFinalizer ──► SalesBackend     complete sale / SMS receipt │
//! │   OfflineQueue        ──►                                               │
//! │                                                                         │
//! │   Implementations:                                                      │
//! │   • HttpBackend  (reqwest, production)                                  │
//! │   • StubBackend  (scripted, tests)                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every method returns `Err(GatewayRejected(message))` when the remote side
//! answered with a definitive "no", and a network-category error when it
//! could not be reached. Callers rely on that split.

pub mod http;
pub mod protocol;

use async_trait::async_trait;

use crate::error::CheckoutResult;

pub use http::HttpBackend;
pub use protocol::{
    CardPaymentRequest, CompleteTransactionRequest, GatewayStatus, MobileMoneyRequest,
    QrCreateRequest, QrCreated, SendReceiptRequest, StatusReport,
};

/// Port for the payment gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Charges a card in a single synchronous call.
    ///
    /// # Returns
    /// The gateway's payment id on approval. A decline is
    /// `GatewayRejected` carrying the gateway's message unchanged.
    async fn process_card(&self, request: &CardPaymentRequest) -> CheckoutResult<String>;

    /// Sends the approval prompt to the customer's phone.
    ///
    /// # Returns
    /// The gateway transaction id to poll.
    async fn initiate_mobile_money(&self, request: &MobileMoneyRequest) -> CheckoutResult<String>;

    async fn mobile_money_status(&self, transaction_id: &str) -> CheckoutResult<StatusReport>;

    /// Registers a dynamic QR code for the order.
    async fn create_qr(&self, request: &QrCreateRequest) -> CheckoutResult<QrCreated>;

    async fn qr_status(&self, transaction_id: &str) -> CheckoutResult<StatusReport>;
}

/// Port for the sales backend.
#[async_trait]
pub trait SalesBackend: Send + Sync {
    /// Records a settled sale.
    ///
    /// The request carries the device `local_id`, which the backend treats
    /// as an idempotency key: replaying the same sale must not create a
    /// second record.
    ///
    /// # Returns
    /// The backend's transaction id.
    async fn complete_transaction(
        &self,
        request: &CompleteTransactionRequest,
    ) -> CheckoutResult<String>;

    /// Asks the backend to text a receipt to the customer.
    async fn send_receipt(&self, request: &SendReceiptRequest) -> CheckoutResult<()>;
}
