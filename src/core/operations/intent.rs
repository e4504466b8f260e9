use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::api::{CreateIntentRequest, PaymentBackend};
use crate::error::AppError;
use crate::events::{EventBus, RentEvent};
use crate::observability::FlowContext;
use crate::types::{
    format_inr, BillingMonth, PaymentIntent, PaymentMethod, RentPayResult, Room,
};

/// Draft payment as entered by the tenant. Values are kept as typed so the
/// validator can report on them; nothing here has been checked yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentForm {
    pub room_id: String,
    pub room_number: Option<String>,
    /// Rent for the room when known; amounts below it are rejected
    pub monthly_rent: Option<u64>,
    /// Signed so that a negative entry can be reported rather than
    /// unrepresentable
    pub amount: i64,
    /// Raw `YYYY-MM` text
    pub billing_month: String,
    pub method: Option<PaymentMethod>,
    pub notes: Option<String>,
    pub terms_accepted: bool,
}

impl PaymentForm {
    /// Form pre-filled with the room's rent and the current month
    pub fn for_room(room: &Room) -> Self {
        Self {
            room_id: room.room_id.clone(),
            room_number: Some(room.room_number.clone()),
            monthly_rent: Some(room.monthly_rent),
            amount: i64::try_from(room.monthly_rent).unwrap_or(i64::MAX),
            billing_month: BillingMonth::current().to_string(),
            method: None,
            notes: None,
            terms_accepted: false,
        }
    }

    /// Check every field and collect all failures. On success the form is
    /// turned into the create request body.
    pub fn validate(&self) -> RentPayResult<CreateIntentRequest> {
        let mut reasons = Vec::new();

        let amount = match u64::try_from(self.amount) {
            Ok(amount) if amount > 0 => Some(amount),
            _ => {
                reasons.push(format!(
                    "invalid amount {}: must be greater than zero",
                    self.amount
                ));
                None
            }
        };

        if let (Some(amount), Some(rent)) = (amount, self.monthly_rent) {
            if amount < rent {
                reasons.push(format!(
                    "amount cannot be less than the monthly rent of {}",
                    format_inr(rent)
                ));
            }
        }

        let month = if self.billing_month.trim().is_empty() {
            reasons.push("billing month is required".to_string());
            None
        } else {
            match self.billing_month.parse::<BillingMonth>() {
                Ok(month) => Some(month),
                Err(e) => {
                    reasons.extend(e.reasons);
                    None
                }
            }
        };

        if self.method.is_none() {
            reasons.push("a payment method must be selected".to_string());
        }

        if !self.terms_accepted {
            reasons.push("the terms and conditions must be accepted".to_string());
        }

        if self.room_id.trim().is_empty() {
            reasons.push("room is required".to_string());
        }

        match (amount, month, self.method) {
            (Some(amount), Some(month), Some(payment_method)) if reasons.is_empty() => {
                Ok(CreateIntentRequest {
                    room_id: self.room_id.clone(),
                    amount,
                    month,
                    payment_method,
                    notes: self
                        .notes
                        .as_ref()
                        .map(|n| n.trim().to_string())
                        .filter(|n| !n.is_empty()),
                })
            }
            _ => Err(AppError::validation(reasons)),
        }
    }
}

/// Turns a validated form into a server-side payment record
pub struct IntentCreator {
    backend: Arc<dyn PaymentBackend>,
    event_bus: Arc<EventBus>,
}

impl IntentCreator {
    pub fn new(backend: Arc<dyn PaymentBackend>, event_bus: Arc<EventBus>) -> Self {
        Self { backend, event_bus }
    }

    /// Validate locally, then issue exactly one create call. The form is only
    /// borrowed and is never modified.
    #[instrument(skip(self, form, flow), fields(room_id = %form.room_id, correlation_id = %flow.correlation_id))]
    pub async fn create(
        &self,
        form: &PaymentForm,
        flow: &FlowContext,
    ) -> RentPayResult<PaymentIntent> {
        let request = match form.validate() {
            Ok(request) => request,
            Err(e) => {
                self.event_bus
                    .publish(RentEvent::IntentRejected {
                        room_id: form.room_id.clone(),
                        reasons: e.reasons.clone(),
                        correlation_id: Some(flow.correlation_id.clone()),
                        timestamp: Utc::now(),
                    })
                    .await;
                return Err(e.with_correlation_id(flow.correlation_id.clone()));
            }
        };

        let intent = self.backend.create_intent(&request).await?;

        info!(
            payment_id = %intent.payment_id,
            transaction_id = %intent.transaction_id,
            method = %intent.method,
            "Payment intent created"
        );

        self.event_bus
            .publish(RentEvent::IntentCreated {
                payment_id: intent.payment_id.clone(),
                transaction_id: intent.transaction_id.clone(),
                room_id: request.room_id,
                amount: intent.amount,
                month: intent.billing_month.to_string(),
                method: intent.method.to_string(),
                correlation_id: Some(flow.correlation_id.clone()),
                timestamp: Utc::now(),
            })
            .await;

        Ok(intent)
    }
}
