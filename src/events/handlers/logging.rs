use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{EventHandler, RentEvent};
use crate::observability::sanitization::sanitize_reference;

/// Event handler that logs every lifecycle event at a level matching its
/// severity
pub struct LoggingEventHandler {
    include_debug_events: bool,
}

impl LoggingEventHandler {
    pub fn new(include_debug_events: bool) -> Self {
        Self {
            include_debug_events,
        }
    }
}

#[async_trait]
impl EventHandler for LoggingEventHandler {
    async fn handle(&self, event: RentEvent) -> anyhow::Result<()> {
        match event {
            RentEvent::IntentCreated {
                payment_id,
                transaction_id,
                room_id,
                amount,
                month,
                method,
                correlation_id,
                timestamp,
            } => {
                info!(
                    event_type = "intent_created",
                    payment_id = %payment_id,
                    transaction_id = %sanitize_reference(&transaction_id),
                    room_id = %room_id,
                    amount = amount,
                    month = %month,
                    method = %method,
                    correlation_id = ?correlation_id,
                    timestamp = %timestamp,
                    "Payment intent created"
                );
            }
            RentEvent::IntentRejected {
                room_id,
                reasons,
                correlation_id,
                timestamp,
            } => {
                warn!(
                    event_type = "intent_rejected",
                    room_id = %room_id,
                    reasons = ?reasons,
                    correlation_id = ?correlation_id,
                    timestamp = %timestamp,
                    "Payment intent rejected"
                );
            }
            RentEvent::CheckoutOpened {
                payment_id,
                order_id,
                amount_subunits,
                correlation_id,
                timestamp,
            } => {
                if self.include_debug_events {
                    debug!(
                        event_type = "checkout_opened",
                        payment_id = %payment_id,
                        order_id = %sanitize_reference(&order_id),
                        amount_subunits = amount_subunits,
                        correlation_id = ?correlation_id,
                        timestamp = %timestamp,
                        "Checkout widget opened"
                    );
                }
            }
            RentEvent::CheckoutDismissed {
                payment_id,
                correlation_id,
                timestamp,
            } => {
                info!(
                    event_type = "checkout_dismissed",
                    payment_id = %payment_id,
                    correlation_id = ?correlation_id,
                    timestamp = %timestamp,
                    "Checkout dismissed by tenant"
                );
            }
            RentEvent::GatewayFailed {
                payment_id,
                reason,
                correlation_id,
                timestamp,
            } => {
                warn!(
                    event_type = "gateway_failed",
                    payment_id = %payment_id,
                    reason = %reason,
                    correlation_id = ?correlation_id,
                    timestamp = %timestamp,
                    "Gateway reported failure"
                );
            }
            RentEvent::VerificationFailed {
                payment_id,
                reason,
                correlation_id,
                timestamp,
            } => {
                error!(
                    event_type = "verification_failed",
                    payment_id = %payment_id,
                    reason = %reason,
                    correlation_id = ?correlation_id,
                    timestamp = %timestamp,
                    "Payment verification failed"
                );
            }
            RentEvent::PaymentConfirmed {
                payment_id,
                amount,
                method,
                receipt_number,
                confirmed_by,
                correlation_id,
                timestamp,
            } => {
                info!(
                    event_type = "payment_confirmed",
                    payment_id = %payment_id,
                    amount = amount,
                    method = %method,
                    receipt_number = ?receipt_number,
                    confirmed_by = ?confirmed_by,
                    correlation_id = ?correlation_id,
                    timestamp = %timestamp,
                    "Payment confirmed"
                );
            }
            RentEvent::PaymentCancelled {
                payment_id,
                by_user,
                correlation_id,
                timestamp,
            } => {
                info!(
                    event_type = "payment_cancelled",
                    payment_id = %payment_id,
                    by_user = by_user,
                    correlation_id = ?correlation_id,
                    timestamp = %timestamp,
                    "Payment cancelled"
                );
            }
            RentEvent::PaymentFailed {
                payment_id,
                reason,
                correlation_id,
                timestamp,
            } => {
                warn!(
                    event_type = "payment_failed",
                    payment_id = %payment_id,
                    reason = %reason,
                    correlation_id = ?correlation_id,
                    timestamp = %timestamp,
                    "Payment failed"
                );
            }
            RentEvent::StatusPollFailed {
                payment_id,
                reason,
                correlation_id,
                timestamp,
            } => {
                if self.include_debug_events {
                    debug!(
                        event_type = "status_poll_failed",
                        payment_id = %payment_id,
                        reason = %reason,
                        correlation_id = ?correlation_id,
                        timestamp = %timestamp,
                        "Status poll failed; will retry on next tick"
                    );
                }
            }
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "logging"
    }
}
