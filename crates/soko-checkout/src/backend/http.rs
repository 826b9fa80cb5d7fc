//! # HTTP Backend
//!
//! `reqwest` implementation of both backend ports against the REST API.
//!
//! ## Response Handling
//! ```text
//! send ──► timeout? ─────────────────────────► GatewayTimeout
//!      ──► connect / transport error ────────► NetworkUnavailable
//!      ──► 5xx ──────────────────────────────► NetworkUnavailable
//!      ──► 408 / 504 ────────────────────────► GatewayTimeout
//!      ──► other 4xx ────────────────────────► GatewayRejected(body.message)
//!      ──► 2xx, body.success == false ───────► GatewayRejected(body.message)
//!      ──► 2xx, body unparseable ────────────► InvalidResponse
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, warn};
use url::Url;

use crate::backend::protocol::{
    Ack, CardPaymentRequest, CardPaymentResponse, CompleteTransactionRequest,
    CompleteTransactionResponse, MobileMoneyRequest, MobileMoneyResponse, QrCreateRequest,
    QrCreateResponse, QrCreated, SendReceiptRequest, StatusReport,
};
use crate::backend::{PaymentGateway, SalesBackend};
use crate::config::CheckoutConfig;
use crate::error::{CheckoutError, CheckoutResult};

const QR_CREATE: &str = "payments/qr/create";
const QR_STATUS: &str = "payments/qr/status";
const CARD_PROCESS: &str = "payments/pos/process-card";
const MOBILE_MONEY_PROCESS: &str = "payments/pos/process-mobile-money";
const MOBILE_MONEY_STATUS: &str = "payments/mobile-money/status";
const COMPLETE_TRANSACTION: &str = "sales/pos/complete-transaction";
const SEND_RECEIPT: &str = "sales/pos/send-receipt";

/// Error body shape shared by the API's non-2xx responses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default, alias = "detail", alias = "error")]
    message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: Url,
    auth_token: Option<String>,
    request_timeout: Duration,
}

impl HttpBackend {
    pub fn new(
        base_url: &str,
        request_timeout: Duration,
        auth_token: Option<String>,
    ) -> CheckoutResult<Self> {
        // Url::join drops the last path segment unless it ends in '/'.
        let mut normalized = base_url.trim().to_string();
        if !normalized.ends_with('/') {
            normalized.push('/');
        }
        let base_url = Url::parse(&normalized)?;

        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| CheckoutError::Config(format!("HTTP client: {e}")))?;

        Ok(HttpBackend {
            client,
            base_url,
            auth_token,
            request_timeout,
        })
    }

    pub fn from_config(config: &CheckoutConfig) -> CheckoutResult<Self> {
        Self::new(
            &config.backend.base_url,
            config.request_timeout(),
            config.backend.auth_token.clone(),
        )
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> CheckoutResult<Url> {
        Ok(self.base_url.join(path)?)
    }

    /// `path/{id}` with the id percent-encoded as a single segment.
    fn endpoint_with_id(&self, path: &str, id: &str) -> CheckoutResult<Url> {
        let mut url = self.endpoint(path)?;
        let rendered = url.to_string();
        url.path_segments_mut()
            .map_err(|_| CheckoutError::Config(format!("base URL cannot be a base: {rendered}")))?
            .pop_if_empty()
            .push(id);
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn post<B, R>(&self, path: &str, body: &B, idempotency_key: Option<&str>) -> CheckoutResult<R>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        debug!(%url, "POST");

        let mut request = self.authorize(self.client.post(url).json(body));
        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key);
        }
        self.send(path, request).await
    }

    async fn get<R: DeserializeOwned>(&self, path: &str, id: &str) -> CheckoutResult<R> {
        let url = self.endpoint_with_id(path, id)?;
        debug!(%url, "GET");
        let request = self.authorize(self.client.get(url));
        self.send(path, request).await
    }

    async fn send<R: DeserializeOwned>(
        &self,
        path: &str,
        request: reqwest::RequestBuilder,
    ) -> CheckoutResult<R> {
        let response = timeout(self.request_timeout, request.send())
            .await
            .map_err(|_| CheckoutError::GatewayTimeout(format!("{path} after {:?}", self.request_timeout)))??;

        let status = response.status();
        let body = response.text().await?;

        interpret(status, &body).inspect_err(|e| {
            warn!(path, status = status.as_u16(), error = %e, "Backend request failed");
        })
    }
}

/// Maps an HTTP answer to a typed body or the matching error category.
fn interpret<R: DeserializeOwned>(status: StatusCode, body: &str) -> CheckoutResult<R> {
    if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::GATEWAY_TIMEOUT {
        return Err(CheckoutError::GatewayTimeout(format!("HTTP {status}")));
    }
    if status.is_server_error() {
        return Err(CheckoutError::NetworkUnavailable(format!("HTTP {status}")));
    }
    if !status.is_success() {
        let message = serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|b| b.message)
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| format!("HTTP {status}"));
        return Err(CheckoutError::GatewayRejected(message));
    }

    serde_json::from_str(body).map_err(|e| CheckoutError::InvalidResponse(e.to_string()))
}

/// `success == false` bodies carry the gateway's reason in `message`.
fn rejected(message: Option<String>, fallback: &str) -> CheckoutError {
    CheckoutError::GatewayRejected(
        message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| fallback.to_string()),
    )
}

/// The reference of an approved charge.
///
/// An approval without a `payment_id` still means the card was charged,
/// so it gets a local reference derived from the attempt.
fn card_payment_reference(response: CardPaymentResponse, attempt_id: &str) -> CheckoutResult<String> {
    if !response.success {
        return Err(rejected(response.message, "Card payment declined"));
    }
    match response.payment_id.filter(|id| !id.trim().is_empty()) {
        Some(id) => Ok(id),
        None => {
            warn!(attempt_id = %attempt_id, "Card approved without a payment_id, using local reference");
            Ok(format!("CARD-{attempt_id}"))
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpBackend {
    async fn process_card(&self, request: &CardPaymentRequest) -> CheckoutResult<String> {
        let response: CardPaymentResponse = self.post(CARD_PROCESS, request, None).await?;
        card_payment_reference(response, &request.metadata.attempt_id)
    }

    async fn initiate_mobile_money(&self, request: &MobileMoneyRequest) -> CheckoutResult<String> {
        let response: MobileMoneyResponse =
            self.post(MOBILE_MONEY_PROCESS, request, None).await?;
        if !response.success {
            return Err(rejected(response.message, "Mobile money request was not accepted"));
        }
        response
            .transaction_id
            .ok_or_else(|| CheckoutError::InvalidResponse("missing transaction_id".into()))
    }

    async fn mobile_money_status(&self, transaction_id: &str) -> CheckoutResult<StatusReport> {
        self.get(MOBILE_MONEY_STATUS, transaction_id).await
    }

    async fn create_qr(&self, request: &QrCreateRequest) -> CheckoutResult<QrCreated> {
        let response: QrCreateResponse = self.post(QR_CREATE, request, None).await?;
        if response.success == Some(false) {
            return Err(rejected(response.message, "QR code could not be created"));
        }
        let qr_data = response
            .qr_data
            .ok_or_else(|| CheckoutError::InvalidResponse("missing qr_data".into()))?;
        Ok(QrCreated {
            qr_data,
            transaction_id: response
                .transaction_id
                .unwrap_or_else(|| request.transaction_id.clone()),
        })
    }

    async fn qr_status(&self, transaction_id: &str) -> CheckoutResult<StatusReport> {
        self.get(QR_STATUS, transaction_id).await
    }
}

#[async_trait]
impl SalesBackend for HttpBackend {
    async fn complete_transaction(
        &self,
        request: &CompleteTransactionRequest,
    ) -> CheckoutResult<String> {
        let response: CompleteTransactionResponse = self
            .post(COMPLETE_TRANSACTION, request, Some(&request.local_id))
            .await?;
        if !response.success {
            return Err(rejected(response.message, "Sale was not accepted"));
        }
        // A backend that does not assign its own id keeps ours.
        Ok(response
            .transaction_id
            .unwrap_or_else(|| request.local_id.clone()))
    }

    async fn send_receipt(&self, request: &SendReceiptRequest) -> CheckoutResult<()> {
        let response: Ack = self.post(SEND_RECEIPT, request, None).await?;
        if !response.success {
            return Err(rejected(response.message, "Receipt could not be sent"));
        }
        Ok(())
    }
}
