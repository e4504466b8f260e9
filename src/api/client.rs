use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use url::Url;

use super::{CreateIntentRequest, PaymentBackend};
use crate::config::Config;
use crate::core::checkout::CheckoutProof;
use crate::error::AppError;
use crate::observability::{
    sanitize_signature, sanitize_token, FlowContext, CORRELATION_ID_HEADER, REQUEST_ID_HEADER,
};
use crate::types::{
    to_subunits, BillingMonth, OrderDescriptor, PaymentIntent, PaymentMethod, PaymentStatus,
    Receipt, RentPayResult, Room, RoomRef,
};

/// Order as embedded in the create response
#[derive(Debug, Deserialize)]
struct WireOrder {
    id: String,
    #[serde(default)]
    amount: Option<u64>,
    #[serde(default)]
    currency: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateIntentResponse {
    #[serde(alias = "_id")]
    payment_id: String,
    #[serde(default)]
    transaction_id: String,
    #[serde(default)]
    amount: Option<u64>,
    #[serde(default)]
    month: Option<BillingMonth>,
    #[serde(default)]
    status: Option<PaymentStatus>,
    #[serde(default)]
    order_id: Option<String>,
    #[serde(default)]
    order: Option<WireOrder>,
    #[serde(default)]
    razorpay_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct VerifyRequest<'a> {
    razorpay_order_id: &'a str,
    razorpay_payment_id: &'a str,
    razorpay_signature: &'a str,
    #[serde(rename = "paymentId")]
    payment_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PaymentIdRequest<'a> {
    payment_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PaymentEnvelope {
    payment: PaymentIntent,
}

#[derive(Debug, Deserialize)]
struct SuccessEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    payments: Vec<PaymentIntent>,
}

#[derive(Debug, Deserialize)]
struct ReceiptEnvelope {
    #[serde(default)]
    success: bool,
    receipt: Option<Receipt>,
}

/// Lists come back bare or wrapped depending on the route
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListBody<T> {
    Bare(Vec<T>),
    Rooms { rooms: Vec<T> },
    Payments { payments: Vec<T> },
}

impl<T> ListBody<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            ListBody::Bare(items) => items,
            ListBody::Rooms { rooms } => rooms,
            ListBody::Payments { payments } => payments,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RoomBody {
    Wrapped { room: Room },
    Bare(Room),
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Rental backend client over HTTP
#[derive(Clone)]
pub struct HttpBackend {
    http_client: Client,
    base_url: Url,
    auth_token: Option<String>,
    fallback_key: Option<String>,
    currency: String,
    flow: FlowContext,
}

impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackend")
            .field("base_url", &self.base_url.as_str())
            .field(
                "auth_token",
                &self.auth_token.as_ref().map(|t| sanitize_token(t).to_string()),
            )
            .field("currency", &self.currency)
            .field("correlation_id", &self.flow.correlation_id)
            .finish()
    }
}

impl HttpBackend {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let http_client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("rentpay/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http_client,
            base_url: config.base_url()?,
            auth_token: config.auth_token.clone().filter(|t| !t.is_empty()),
            fallback_key: config.checkout.key.clone(),
            currency: config.checkout.currency.clone(),
            flow: FlowContext::default(),
        })
    }

    /// Tag every subsequent request with this flow's correlation id
    pub fn with_flow(mut self, flow: FlowContext) -> Self {
        self.flow = flow;
        self
    }

    pub fn flow(&self) -> &FlowContext {
        &self.flow
    }

    fn endpoint(&self, path: &str) -> RentPayResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| AppError::internal_error(format!("Invalid endpoint '{}': {}", path, e)))
    }

    fn request(&self, method: Method, path: &str) -> RentPayResult<RequestBuilder> {
        Ok(self.request_url(method, self.endpoint(path)?))
    }

    fn request_url(&self, method: Method, url: Url) -> RequestBuilder {
        let mut builder = self
            .http_client
            .request(method, url)
            .header(CORRELATION_ID_HEADER, &self.flow.correlation_id)
            .header(REQUEST_ID_HEADER, self.flow.next_request_id());
        if let Some(token) = &self.auth_token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> RentPayResult<T> {
        let correlation_id = self.flow.correlation_id.clone();
        let response = builder
            .send()
            .await
            .map_err(|e| AppError::from(e).with_correlation_id(correlation_id.clone()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| AppError::from(e).with_correlation_id(correlation_id.clone()))?;

        if !status.is_success() {
            let message = error_message(status, &body);
            debug!(status = %status, message = %message, "Backend returned error");
            return Err(AppError::from_response(status, message).with_correlation_id(correlation_id));
        }

        serde_json::from_slice(&body)
            .map_err(|e| AppError::from(e).with_correlation_id(correlation_id))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> RentPayResult<T> {
        let builder = self.request(Method::GET, path)?;
        self.send(builder).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> RentPayResult<T> {
        let builder = self.request(Method::POST, path)?.json(body);
        self.send(builder).await
    }

    fn order_descriptor(
        &self,
        response: &CreateIntentResponse,
        amount: u64,
    ) -> Option<OrderDescriptor> {
        let order_id = response
            .order
            .as_ref()
            .map(|o| o.id.clone())
            .or_else(|| response.order_id.clone())?;

        let amount_subunits = response
            .order
            .as_ref()
            .and_then(|o| o.amount)
            .or_else(|| to_subunits(amount))
            .unwrap_or(0);

        let currency = response
            .order
            .as_ref()
            .and_then(|o| o.currency.clone())
            .unwrap_or_else(|| self.currency.clone());

        // Empty key is left for the checkout bridge to reject
        let key = response
            .razorpay_key
            .clone()
            .or_else(|| self.fallback_key.clone())
            .unwrap_or_default();

        Some(OrderDescriptor {
            order_id,
            key,
            amount_subunits,
            currency,
        })
    }

    /// `GET /rooms/{id}`
    #[instrument(skip(self), fields(correlation_id = %self.flow.correlation_id))]
    pub async fn room(&self, room_id: &str) -> RentPayResult<Room> {
        let body: RoomBody = self.get(&format!("rooms/{}", room_id)).await?;
        Ok(match body {
            RoomBody::Wrapped { room } | RoomBody::Bare(room) => room,
        })
    }

    /// `GET /rooms/my-room`
    #[instrument(skip(self), fields(correlation_id = %self.flow.correlation_id))]
    pub async fn my_room(&self) -> RentPayResult<Room> {
        let body: RoomBody = self.get("rooms/my-room").await?;
        Ok(match body {
            RoomBody::Wrapped { room } | RoomBody::Bare(room) => room,
        })
    }

    /// `GET /rooms`
    pub async fn rooms(&self) -> RentPayResult<Vec<Room>> {
        let body: ListBody<Room> = self.get("rooms").await?;
        Ok(body.into_vec())
    }

    /// `GET /payments/history`: the tenant's own payments
    #[instrument(skip(self), fields(correlation_id = %self.flow.correlation_id))]
    pub async fn payment_history(&self) -> RentPayResult<Vec<PaymentIntent>> {
        let body: HistoryEnvelope = self.get("payments/history").await?;
        if !body.success {
            warn!("History endpoint reported failure; treating as empty");
        }
        Ok(body.payments)
    }

    /// `GET /payments`: every payment, for administrator reports
    pub async fn all_payments(&self) -> RentPayResult<Vec<PaymentIntent>> {
        let body: ListBody<PaymentIntent> = self.get("payments").await?;
        Ok(body.into_vec())
    }

    /// `GET /payments/receipt/{id}`
    #[instrument(skip(self), fields(correlation_id = %self.flow.correlation_id))]
    pub async fn receipt(&self, payment_id: &str) -> RentPayResult<Receipt> {
        let body: ReceiptEnvelope = self.get(&format!("payments/receipt/{}", payment_id)).await?;
        match body.receipt {
            Some(receipt) if body.success => Ok(receipt),
            _ => Err(AppError::not_found(format!(
                "No receipt available for payment {}",
                payment_id
            ))),
        }
    }

    /// `POST /payments/confirm-cash`: administrator acknowledges cash received
    #[instrument(skip(self, notes), fields(correlation_id = %self.flow.correlation_id))]
    pub async fn confirm_cash(
        &self,
        payment_id: &str,
        notes: Option<&str>,
    ) -> RentPayResult<PaymentIntent> {
        let body = PaymentIdRequest { payment_id, notes };
        let envelope: PaymentEnvelope = self.post("payments/confirm-cash", &body).await?;
        Ok(envelope.payment)
    }
}

#[async_trait]
impl PaymentBackend for HttpBackend {
    #[instrument(
        skip(self, request),
        fields(
            room_id = %request.room_id,
            method = %request.payment_method,
            correlation_id = %self.flow.correlation_id,
        )
    )]
    async fn create_intent(&self, request: &CreateIntentRequest) -> RentPayResult<PaymentIntent> {
        let response: CreateIntentResponse = self.post("payments/create", request).await?;

        let amount = response.amount.unwrap_or(request.amount);
        let order = match request.payment_method {
            PaymentMethod::Online => self.order_descriptor(&response, amount),
            PaymentMethod::Cash => None,
        };

        Ok(PaymentIntent {
            payment_id: response.payment_id,
            transaction_id: response.transaction_id,
            room: Some(RoomRef::Id(request.room_id.clone())),
            amount,
            billing_month: response.month.unwrap_or(request.month),
            method: request.payment_method,
            status: response.status.unwrap_or(PaymentStatus::Pending),
            notes: request.notes.clone(),
            order,
            paid_on: None,
            receipt_number: None,
            confirmed_by: None,
            created_at: None,
            month_display: None,
        })
    }

    #[instrument(
        skip(self, proof),
        fields(
            order_id = %proof.order_id,
            signature = %sanitize_signature(&proof.signature),
            correlation_id = %self.flow.correlation_id,
        )
    )]
    async fn verify_intent(
        &self,
        proof: &CheckoutProof,
        payment_id: &str,
    ) -> RentPayResult<PaymentIntent> {
        let body = VerifyRequest {
            razorpay_order_id: &proof.order_id,
            razorpay_payment_id: &proof.gateway_payment_id,
            razorpay_signature: &proof.signature,
            payment_id,
        };
        let envelope: PaymentEnvelope = self.post("payments/verify", &body).await?;
        Ok(envelope.payment)
    }

    async fn payment_status(&self, payment_id: &str) -> RentPayResult<PaymentIntent> {
        let mut url = self.endpoint("payments/status")?;
        url.query_pairs_mut().append_pair("paymentId", payment_id);

        let builder = self.request_url(Method::GET, url);
        let envelope: PaymentEnvelope = self.send(builder).await?;
        Ok(envelope.payment)
    }

    #[instrument(skip(self), fields(correlation_id = %self.flow.correlation_id))]
    async fn cancel_intent(&self, payment_id: &str) -> RentPayResult<()> {
        let body = PaymentIdRequest {
            payment_id,
            notes: None,
        };
        let envelope: SuccessEnvelope = self.post("payments/cancel", &body).await?;
        if envelope.success {
            Ok(())
        } else {
            let message = envelope
                .message
                .unwrap_or_else(|| "Backend declined the cancellation".to_string());
            Err(AppError::from_response(StatusCode::CONFLICT, message)
                .with_correlation_id(self.flow.correlation_id.clone()))
        }
    }
}

/// Pull `{message}` out of an error body, falling back to the status text
fn error_message(status: StatusCode, body: &[u8]) -> String {
    serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message.or(b.error))
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string()
        })
}
