//! Tenant-side payment lifecycle.
//!
//! ```text
//! Idle ─submit─▶ Submitting ─┬─▶ AwaitingOnlineCheckout ─approve─▶ Verifying ─▶ Confirmed
//!   ▲                        │        │ dismiss / gateway error      │ rejected
//!   │                        │        ▼                              ▼
//!   └────────────────────────┴──── Idle                 AwaitingOnlineCheckout
//!                            └─▶ AwaitingCashConfirmation ─paid─▶ Confirmed
//!                                     │ cancel (confirmed) ─▶ Cancelled
//!                                     │ cancelled/failed by backend ─▶ Idle
//! ```
//!
//! A single owner drives the flow through `&mut self`. The only background
//! work is the cash status poller, whose records are applied when the owner
//! calls [`PaymentFlow::next_poll_update`].

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::checkout::{CheckoutBridge, CheckoutOutcome};
use super::operations::{IntentCreator, PaymentForm};
use super::services::{PollHandle, StatusPoller};
use crate::api::PaymentBackend;
use crate::error::{AppError, ErrorCategory};
use crate::events::{EventBus, RentEvent};
use crate::observability::FlowContext;
use crate::types::{
    BuyerInfo, PaymentIntent, PaymentMethod, PaymentStatus, RentPayResult, Room, RoomRef,
};

pub const NOTICE_CHECKOUT_DISMISSED: &str = "Payment cancelled. You can choose a method again.";
pub const NOTICE_CANCELLED_BY_BACKEND: &str = "This payment was cancelled.";
pub const NOTICE_FAILED: &str = "This payment failed. Please try again.";
pub const NOTICE_REFUNDED: &str = "This payment was refunded.";

/// Instructions shown while a cash payment waits for the administrator
pub const CASH_INSTRUCTIONS: [&str; 3] = [
    "Hand the amount in cash to the property administrator.",
    "Quote the transaction reference so the payment can be matched.",
    "This page updates automatically once receipt is confirmed.",
];

#[derive(Debug, Clone, PartialEq)]
pub enum FlowState {
    Idle {
        form: PaymentForm,
        notice: Option<String>,
    },
    Submitting,
    AwaitingOnlineCheckout {
        intent: PaymentIntent,
    },
    AwaitingCashConfirmation {
        intent: PaymentIntent,
    },
    Verifying {
        intent: PaymentIntent,
    },
    Confirmed {
        intent: PaymentIntent,
    },
    Cancelled {
        intent: PaymentIntent,
    },
}

impl FlowState {
    pub fn name(&self) -> &'static str {
        match self {
            FlowState::Idle { .. } => "idle",
            FlowState::Submitting => "submitting",
            FlowState::AwaitingOnlineCheckout { .. } => "awaiting_online_checkout",
            FlowState::AwaitingCashConfirmation { .. } => "awaiting_cash_confirmation",
            FlowState::Verifying { .. } => "verifying",
            FlowState::Confirmed { .. } => "confirmed",
            FlowState::Cancelled { .. } => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, FlowState::Confirmed { .. } | FlowState::Cancelled { .. })
    }

    /// Cached record for the current attempt, if there is one
    pub fn intent(&self) -> Option<&PaymentIntent> {
        match self {
            FlowState::AwaitingOnlineCheckout { intent }
            | FlowState::AwaitingCashConfirmation { intent }
            | FlowState::Verifying { intent }
            | FlowState::Confirmed { intent }
            | FlowState::Cancelled { intent } => Some(intent),
            FlowState::Idle { .. } | FlowState::Submitting => None,
        }
    }

    fn intent_mut(&mut self) -> Option<&mut PaymentIntent> {
        match self {
            FlowState::AwaitingOnlineCheckout { intent }
            | FlowState::AwaitingCashConfirmation { intent }
            | FlowState::Verifying { intent }
            | FlowState::Confirmed { intent }
            | FlowState::Cancelled { intent } => Some(intent),
            FlowState::Idle { .. } | FlowState::Submitting => None,
        }
    }
}

/// What the cash presenter shows while waiting
#[derive(Debug, Clone, PartialEq)]
pub struct CashInstructions {
    pub transaction_id: String,
    pub amount: u64,
    pub billing_month: String,
    pub month_display: String,
    pub steps: &'static [&'static str],
}

impl CashInstructions {
    pub fn for_intent(intent: &PaymentIntent) -> Self {
        Self {
            transaction_id: intent.transaction_id.clone(),
            amount: intent.amount,
            billing_month: intent.billing_month.to_string(),
            month_display: intent.month_display(),
            steps: &CASH_INSTRUCTIONS,
        }
    }
}

/// Services a flow talks to
pub struct FlowServices {
    pub backend: Arc<dyn PaymentBackend>,
    pub creator: IntentCreator,
    pub bridge: CheckoutBridge,
    pub poller: StatusPoller,
    pub event_bus: Arc<EventBus>,
}

pub struct PaymentFlow {
    room: Room,
    buyer: BuyerInfo,
    context: FlowContext,
    state: FlowState,
    /// Form behind the current attempt, restored when the flow returns to Idle
    last_form: PaymentForm,
    revision: u64,
    poll_handle: Option<PollHandle>,
    services: FlowServices,
}

impl PaymentFlow {
    pub fn new(room: Room, buyer: BuyerInfo, context: FlowContext, services: FlowServices) -> Self {
        let form = PaymentForm::for_room(&room);
        Self {
            room,
            buyer,
            context,
            state: FlowState::Idle {
                form: form.clone(),
                notice: None,
            },
            last_form: form,
            revision: 0,
            poll_handle: None,
            services,
        }
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    /// Bumped every time a backend record is applied
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn room(&self) -> &Room {
        &self.room
    }

    pub fn context(&self) -> &FlowContext {
        &self.context
    }

    pub fn payment_id(&self) -> Option<&str> {
        self.state.intent().map(|i| i.payment_id.as_str())
    }

    pub fn is_polling(&self) -> bool {
        self.poll_handle.as_ref().map_or(false, PollHandle::is_running)
    }

    /// Editable form; only available while idle
    pub fn form_mut(&mut self) -> Option<&mut PaymentForm> {
        match &mut self.state {
            FlowState::Idle { form, .. } => Some(form),
            _ => None,
        }
    }

    pub fn cash_instructions(&self) -> Option<CashInstructions> {
        match &self.state {
            FlowState::AwaitingCashConfirmation { intent } => {
                Some(CashInstructions::for_intent(intent))
            }
            _ => None,
        }
    }

    /// Create the payment record for the current form
    pub async fn submit(&mut self) -> RentPayResult<&FlowState> {
        let form = match &self.state {
            FlowState::Idle { form, .. } => form.clone(),
            other => {
                return Err(invalid_transition("submit", other));
            }
        };

        self.transition(FlowState::Submitting);

        match self.services.creator.create(&form, &self.context).await {
            Ok(mut intent) => {
                // Some backends answer with a bare room id; the widget notes
                // need the room number
                if intent.room_number().is_none() {
                    intent.room = Some(RoomRef::Summary {
                        id: self.room.room_id.clone(),
                        room_number: Some(self.room.room_number.clone()),
                        building: self.room.building.clone(),
                    });
                }
                self.last_form = form;
                self.revision += 1;
                match intent.method {
                    PaymentMethod::Online => {
                        self.transition(FlowState::AwaitingOnlineCheckout { intent });
                    }
                    PaymentMethod::Cash => {
                        let payment_id = intent.payment_id.clone();
                        self.transition(FlowState::AwaitingCashConfirmation { intent });
                        self.start_polling(payment_id);
                    }
                }
                Ok(&self.state)
            }
            Err(e) => {
                self.transition(FlowState::Idle { form, notice: None });
                Err(e)
            }
        }
    }

    /// Open the hosted checkout for the pending online intent and verify the
    /// result. May be repeated with the same intent after a rejected proof.
    pub async fn checkout(&mut self) -> RentPayResult<&FlowState> {
        let intent = match &self.state {
            FlowState::AwaitingOnlineCheckout { intent } => intent.clone(),
            other => return Err(invalid_transition("checkout", other)),
        };
        let correlation_id = Some(self.context.correlation_id.clone());

        if let Some(order) = &intent.order {
            self.services
                .event_bus
                .publish(RentEvent::CheckoutOpened {
                    payment_id: intent.payment_id.clone(),
                    order_id: order.order_id.clone(),
                    amount_subunits: order.amount_subunits,
                    correlation_id: correlation_id.clone(),
                    timestamp: Utc::now(),
                })
                .await;
        }

        let outcome = match self.services.bridge.launch(&intent, &self.buyer).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.services
                    .event_bus
                    .publish(RentEvent::GatewayFailed {
                        payment_id: intent.payment_id.clone(),
                        reason: e.message.clone(),
                        correlation_id,
                        timestamp: Utc::now(),
                    })
                    .await;
                self.return_to_idle(None);
                return Err(e.with_correlation_id(self.context.correlation_id.clone()));
            }
        };

        let proof = match outcome {
            CheckoutOutcome::Dismissed => {
                self.services
                    .event_bus
                    .publish(RentEvent::CheckoutDismissed {
                        payment_id: intent.payment_id.clone(),
                        correlation_id,
                        timestamp: Utc::now(),
                    })
                    .await;
                self.return_to_idle(Some(NOTICE_CHECKOUT_DISMISSED.to_string()));
                return Ok(&self.state);
            }
            CheckoutOutcome::Approved(proof) => proof,
        };

        self.transition(FlowState::Verifying {
            intent: intent.clone(),
        });

        let verified = self
            .services
            .bridge
            .verify(&proof, &intent.payment_id)
            .await
            .and_then(|record| {
                if record.status == PaymentStatus::Paid {
                    Ok(record)
                } else {
                    Err(AppError::verification_error(format!(
                        "Payment is {} after verification",
                        record.status
                    )))
                }
            });

        match verified {
            Ok(record) => {
                self.apply(record);
                self.confirm().await;
                Ok(&self.state)
            }
            Err(e) => {
                if e.category == ErrorCategory::VerificationError {
                    self.services
                        .event_bus
                        .publish(RentEvent::VerificationFailed {
                            payment_id: intent.payment_id.clone(),
                            reason: e.message.clone(),
                            correlation_id,
                            timestamp: Utc::now(),
                        })
                        .await;
                }
                // Same intent; the tenant may relaunch checkout
                if let Some(current) = self.state.intent().cloned() {
                    self.transition(FlowState::AwaitingOnlineCheckout { intent: current });
                }
                Err(e.with_correlation_id(self.context.correlation_id.clone()))
            }
        }
    }

    /// Wait for the next background status record and apply it. Returns
    /// `None` when no poller is running.
    pub async fn next_poll_update(&mut self) -> Option<&FlowState> {
        let record = self.poll_handle.as_mut()?.next_update().await;
        match record {
            Some(record) => {
                self.on_record(record).await;
                Some(&self.state)
            }
            None => {
                self.stop_polling();
                None
            }
        }
    }

    /// Drive the poller until the flow leaves `AwaitingCashConfirmation`
    pub async fn wait_for_confirmation(&mut self) -> &FlowState {
        while matches!(self.state, FlowState::AwaitingCashConfirmation { .. }) {
            if self.next_poll_update().await.is_none() {
                break;
            }
        }
        &self.state
    }

    /// Manual status check. Unlike background polls, errors are returned.
    pub async fn refresh(&mut self) -> RentPayResult<&FlowState> {
        let payment_id = match &self.state {
            FlowState::AwaitingOnlineCheckout { intent }
            | FlowState::AwaitingCashConfirmation { intent } => intent.payment_id.clone(),
            other => return Err(invalid_transition("refresh", other)),
        };

        let record = self.services.poller.poll(&payment_id).await?;
        self.on_record(record).await;
        Ok(&self.state)
    }

    /// Cancel a pending cash payment. `confirm` is asked first; declining
    /// leaves everything untouched.
    pub async fn cancel<F>(&mut self, confirm: F) -> RentPayResult<&FlowState>
    where
        F: FnOnce(&PaymentIntent) -> bool,
    {
        let intent = match &self.state {
            FlowState::AwaitingCashConfirmation { intent } => intent.clone(),
            other => return Err(invalid_transition("cancel", other)),
        };

        if !confirm(&intent) {
            debug!(payment_id = %intent.payment_id, "Cancellation declined by tenant");
            return Ok(&self.state);
        }

        self.stop_polling();

        if let Err(e) = self.services.backend.cancel_intent(&intent.payment_id).await {
            // Still pending on the backend; keep waiting
            self.start_polling(intent.payment_id.clone());
            return Err(e.with_correlation_id(self.context.correlation_id.clone()));
        }

        match self.services.poller.poll(&intent.payment_id).await {
            Ok(record) => {
                self.apply(record);
            }
            Err(e) => {
                warn!(
                    payment_id = %intent.payment_id,
                    error = %e,
                    "Could not refetch payment after cancellation"
                );
            }
        }

        let current = self.state.intent().cloned().unwrap_or(intent);
        if current.status == PaymentStatus::Paid {
            // Confirmed before the cancellation landed
            self.confirm().await;
            return Ok(&self.state);
        }

        self.services
            .event_bus
            .publish(RentEvent::PaymentCancelled {
                payment_id: current.payment_id.clone(),
                by_user: true,
                correlation_id: Some(self.context.correlation_id.clone()),
                timestamp: Utc::now(),
            })
            .await;
        self.transition(FlowState::Cancelled { intent: current });
        Ok(&self.state)
    }

    /// "Make another payment": fresh form, no link to the previous attempt
    pub fn start_over(&mut self) -> RentPayResult<&FlowState> {
        if !self.state.is_terminal() {
            return Err(invalid_transition("start_over", &self.state));
        }
        self.stop_polling();
        let form = PaymentForm::for_room(&self.room);
        self.last_form = form.clone();
        self.transition(FlowState::Idle { form, notice: None });
        Ok(&self.state)
    }

    /// Apply a fetched record if it is for the current payment and does not
    /// move the status backwards. Returns whether it was applied.
    pub fn apply(&mut self, record: PaymentIntent) -> bool {
        let Some(current) = self.state.intent_mut() else {
            debug!(payment_id = %record.payment_id, "No payment in flight; record ignored");
            return false;
        };

        if record.payment_id != current.payment_id {
            debug!(
                expected = %current.payment_id,
                received = %record.payment_id,
                "Record for another payment ignored"
            );
            return false;
        }

        if !current.status.accepts(record.status) {
            debug!(
                payment_id = %record.payment_id,
                current = %current.status,
                received = %record.status,
                "Stale status ignored"
            );
            return false;
        }

        *current = current.refreshed_with(record);
        self.revision += 1;
        true
    }

    async fn on_record(&mut self, record: PaymentIntent) {
        if !self.apply(record) {
            return;
        }

        let Some(intent) = self.state.intent().cloned() else {
            return;
        };
        let correlation_id = Some(self.context.correlation_id.clone());

        match intent.status {
            PaymentStatus::Pending => {}
            PaymentStatus::Paid => {
                self.stop_polling();
                self.confirm().await;
            }
            PaymentStatus::Cancelled => {
                self.stop_polling();
                self.services
                    .event_bus
                    .publish(RentEvent::PaymentCancelled {
                        payment_id: intent.payment_id.clone(),
                        by_user: false,
                        correlation_id,
                        timestamp: Utc::now(),
                    })
                    .await;
                self.return_to_idle(Some(NOTICE_CANCELLED_BY_BACKEND.to_string()));
            }
            PaymentStatus::Failed | PaymentStatus::Refunded => {
                self.stop_polling();
                let (reason, notice) = if intent.status == PaymentStatus::Refunded {
                    ("reported refunded by backend", NOTICE_REFUNDED)
                } else {
                    ("reported failed by backend", NOTICE_FAILED)
                };
                self.services
                    .event_bus
                    .publish(RentEvent::PaymentFailed {
                        payment_id: intent.payment_id.clone(),
                        reason: reason.to_string(),
                        correlation_id,
                        timestamp: Utc::now(),
                    })
                    .await;
                self.return_to_idle(Some(notice.to_string()));
            }
        }
    }

    async fn confirm(&mut self) {
        let Some(intent) = self.state.intent().cloned() else {
            return;
        };

        info!(
            payment_id = %intent.payment_id,
            receipt_number = ?intent.receipt_number,
            "Payment confirmed"
        );

        self.services
            .event_bus
            .publish(RentEvent::PaymentConfirmed {
                payment_id: intent.payment_id.clone(),
                amount: intent.amount,
                method: intent.method.to_string(),
                receipt_number: intent.receipt_number.clone(),
                confirmed_by: intent.confirmed_by.as_ref().map(|c| c.name().to_string()),
                correlation_id: Some(self.context.correlation_id.clone()),
                timestamp: Utc::now(),
            })
            .await;
        self.transition(FlowState::Confirmed { intent });
    }

    fn return_to_idle(&mut self, notice: Option<String>) {
        let form = self.last_form.clone();
        self.transition(FlowState::Idle { form, notice });
    }

    fn start_polling(&mut self, payment_id: String) {
        self.stop_polling();
        self.poll_handle = Some(
            self.services
                .poller
                .start(payment_id, self.context.clone()),
        );
    }

    fn stop_polling(&mut self) {
        if let Some(mut handle) = self.poll_handle.take() {
            handle.stop();
        }
    }

    fn transition(&mut self, next: FlowState) {
        debug!(
            from = self.state.name(),
            to = next.name(),
            correlation_id = %self.context.correlation_id,
            "Flow transition"
        );
        if !matches!(next, FlowState::AwaitingCashConfirmation { .. }) {
            self.stop_polling();
        }
        self.state = next;
    }
}

fn invalid_transition(operation: &str, state: &FlowState) -> AppError {
    AppError::with_category(
        ErrorCategory::Conflict,
        format!("Cannot {} while {}", operation, state.name()),
    )
}
