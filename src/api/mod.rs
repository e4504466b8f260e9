//! Backend seam for the payment lifecycle.
//!
//! [`PaymentBackend`] is the narrow set of calls the flow depends on; the
//! reqwest-based [`HttpBackend`] implements it against the rental REST API and
//! adds the read-only lookups used by history, receipts and reports.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::checkout::CheckoutProof;
use crate::types::{BillingMonth, PaymentIntent, PaymentMethod, RentPayResult};

pub mod client;

pub use client::HttpBackend;

/// Body of `POST /payments/create`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntentRequest {
    pub room_id: String,
    pub amount: u64,
    pub month: BillingMonth,
    pub payment_method: PaymentMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[async_trait]
pub trait PaymentBackend: Send + Sync {
    /// Create a pending payment record. Online intents come back with an
    /// order descriptor.
    async fn create_intent(&self, request: &CreateIntentRequest) -> RentPayResult<PaymentIntent>;

    /// Hand the gateway proof to the backend for signature verification
    async fn verify_intent(
        &self,
        proof: &CheckoutProof,
        payment_id: &str,
    ) -> RentPayResult<PaymentIntent>;

    /// Current server-side record for a payment
    async fn payment_status(&self, payment_id: &str) -> RentPayResult<PaymentIntent>;

    /// Ask the backend to cancel a pending payment
    async fn cancel_intent(&self, payment_id: &str) -> RentPayResult<()>;
}
