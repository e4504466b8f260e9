use async_trait::async_trait;
use metrics::{counter, histogram};
use tracing::debug;

use crate::events::{EventHandler, RentEvent};
use crate::metrics::{
    CHECKOUTS_TOTAL, EVENT_BUS_EVENTS_TOTAL, INTENTS_TOTAL, INTENT_AMOUNT_RUPEES,
    PAYMENT_AMOUNT_RUPEES, PAYMENT_OUTCOMES_TOTAL, STATUS_POLL_FAILURES_TOTAL,
    VERIFICATIONS_TOTAL,
};

/// Event handler that turns lifecycle events into counters and histograms
pub struct MetricsEventHandler {
    service_name: String,
}

impl MetricsEventHandler {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    fn record_intent(&self, method: &str, status: &str, amount: Option<u64>) {
        counter!(INTENTS_TOTAL,
            "service" => self.service_name.clone(),
            "method" => method.to_string(),
            "status" => status.to_string()
        )
        .increment(1);

        if let Some(amount) = amount {
            histogram!(INTENT_AMOUNT_RUPEES, "method" => method.to_string()).record(amount as f64);
        }
    }

    fn record_checkout(&self, result: &str) {
        counter!(CHECKOUTS_TOTAL,
            "service" => self.service_name.clone(),
            "result" => result.to_string()
        )
        .increment(1);
    }

    fn record_outcome(&self, status: &str, method: Option<&str>, amount: Option<u64>) {
        let method = method.unwrap_or("unknown").to_string();
        counter!(PAYMENT_OUTCOMES_TOTAL,
            "service" => self.service_name.clone(),
            "method" => method.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        if let Some(amount) = amount {
            histogram!(PAYMENT_AMOUNT_RUPEES, "method" => method).record(amount as f64);
        }
    }
}

#[async_trait]
impl EventHandler for MetricsEventHandler {
    async fn handle(&self, event: RentEvent) -> anyhow::Result<()> {
        let event_type = event.event_type();

        match event {
            RentEvent::IntentCreated { amount, method, .. } => {
                self.record_intent(&method, "created", Some(amount));
            }
            RentEvent::IntentRejected { .. } => {
                self.record_intent("unknown", "rejected", None);
            }
            RentEvent::CheckoutOpened { .. } => self.record_checkout("opened"),
            RentEvent::CheckoutDismissed { .. } => self.record_checkout("dismissed"),
            RentEvent::GatewayFailed { .. } => self.record_checkout("gateway_error"),
            RentEvent::VerificationFailed { .. } => {
                counter!(VERIFICATIONS_TOTAL, "result" => "rejected").increment(1);
            }
            RentEvent::PaymentConfirmed { amount, method, .. } => {
                if method == "online" {
                    counter!(VERIFICATIONS_TOTAL, "result" => "verified").increment(1);
                }
                self.record_outcome("paid", Some(&method), Some(amount));
            }
            RentEvent::PaymentCancelled { by_user, .. } => {
                let status = if by_user { "cancelled_by_user" } else { "cancelled" };
                self.record_outcome(status, None, None);
            }
            RentEvent::PaymentFailed { .. } => self.record_outcome("failed", None, None),
            RentEvent::StatusPollFailed { .. } => {
                counter!(STATUS_POLL_FAILURES_TOTAL).increment(1);
            }
        }

        counter!(EVENT_BUS_EVENTS_TOTAL, "event_type" => event_type).increment(1);

        debug!(handler = self.name(), "Event metrics recorded");

        Ok(())
    }

    fn name(&self) -> &str {
        "metrics"
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[tokio::test]
    async fn test_metrics_handler_accepts_confirmed_payment() {
        let handler = MetricsEventHandler::new("test");

        let event = RentEvent::PaymentConfirmed {
            payment_id: "pay_1".to_string(),
            amount: 8500,
            method: "online".to_string(),
            receipt_number: Some("RCP-0001".to_string()),
            confirmed_by: None,
            correlation_id: Some("test_correlation".to_string()),
            timestamp: Utc::now(),
        };

        assert!(handler.handle(event).await.is_ok());
    }

    #[tokio::test]
    async fn test_metrics_handler_accepts_rejected_intent() {
        let handler = MetricsEventHandler::new("test");

        let event = RentEvent::IntentRejected {
            room_id: "room_1".to_string(),
            reasons: vec!["invalid amount".to_string()],
            correlation_id: None,
            timestamp: Utc::now(),
        };

        assert!(handler.handle(event).await.is_ok());
    }

    #[tokio::test]
    async fn test_metrics_handler_is_not_critical() {
        let handler = MetricsEventHandler::new("test");
        assert!(!handler.is_critical());
        assert_eq!(handler.name(), "metrics");
    }
}
