#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use crate::core::operations::{IntentCreator, PaymentForm};
    use crate::core::test_support::*;
    use crate::error::ErrorCategory;
    use crate::events::EventBus;
    use crate::types::{PaymentMethod, PaymentStatus};

    fn valid_form() -> PaymentForm {
        let mut form = PaymentForm::for_room(&room());
        form.billing_month = "2025-03".to_string();
        form.method = Some(PaymentMethod::Cash);
        form.terms_accepted = true;
        form
    }

    #[test]
    fn test_form_prefilled_from_room() {
        let form = PaymentForm::for_room(&room());

        assert_eq!(form.room_id, "room_1");
        assert_eq!(form.amount, 5000);
        assert_eq!(form.method, None);
        assert!(!form.terms_accepted);
        assert!(form.billing_month.parse::<crate::types::BillingMonth>().is_ok());
    }

    #[test]
    fn test_validation_collects_every_reason() {
        let form = PaymentForm {
            room_id: String::new(),
            room_number: None,
            monthly_rent: Some(5000),
            amount: 0,
            billing_month: String::new(),
            method: None,
            notes: None,
            terms_accepted: false,
        };

        let err = form.validate().unwrap_err();

        assert_eq!(err.category, ErrorCategory::ValidationError);
        assert_eq!(
            err.reasons,
            vec![
                "invalid amount 0: must be greater than zero".to_string(),
                "billing month is required".to_string(),
                "a payment method must be selected".to_string(),
                "the terms and conditions must be accepted".to_string(),
                "room is required".to_string(),
            ]
        );
    }

    #[test]
    fn test_malformed_month_rejected() {
        let mut form = valid_form();
        form.billing_month = "2025-13".to_string();

        let err = form.validate().unwrap_err();
        assert_eq!(err.reasons.len(), 1);
    }

    #[test]
    fn test_overpayment_allowed_and_notes_trimmed() {
        let mut form = valid_form();
        form.amount = 7500;
        form.notes = Some("  advance  ".to_string());

        let request = form.validate().unwrap();

        assert_eq!(request.amount, 7500);
        assert_eq!(request.month.to_string(), "2025-03");
        assert_eq!(request.notes.as_deref(), Some("advance"));

        form.notes = Some("   ".to_string());
        assert!(form.validate().unwrap().notes.is_none());
    }

    #[tokio::test]
    async fn test_create_issues_one_call_and_leaves_form_untouched() {
        let backend = MockBackend::new();
        let creator = IntentCreator::new(backend.clone(), Arc::new(EventBus::new(16)));
        let form = valid_form();
        let before = form.clone();

        let intent = creator.create(&form, &flow_context()).await.unwrap();

        assert_eq!(intent.payment_id, PAYMENT_ID);
        assert_eq!(intent.status, PaymentStatus::Pending);
        assert!(intent.order.is_none());
        assert_eq!(backend.create_calls.load(Ordering::SeqCst), 1);
        assert_eq!(form, before);
    }

    #[tokio::test]
    async fn test_invalid_form_never_reaches_backend() {
        let backend = MockBackend::new();
        let event_bus = Arc::new(EventBus::new(16));
        let mut events = event_bus.subscribe();
        let creator = IntentCreator::new(backend.clone(), event_bus);
        let mut form = valid_form();
        form.terms_accepted = false;

        let err = creator.create(&form, &flow_context()).await.unwrap_err();

        assert_eq!(err.category, ErrorCategory::ValidationError);
        assert_eq!(err.correlation_id.as_deref(), Some("test-flow"));
        assert_eq!(backend.total_calls(), 0);
        assert_eq!(events.recv().await.unwrap().event_type(), "intent_rejected");
    }

    #[tokio::test]
    async fn test_online_intent_carries_order() {
        let backend = MockBackend::new();
        let creator = IntentCreator::new(backend.clone(), Arc::new(EventBus::new(16)));
        let mut form = valid_form();
        form.method = Some(PaymentMethod::Online);

        let intent = creator.create(&form, &flow_context()).await.unwrap();

        let order = intent.order.unwrap();
        assert_eq!(order.amount_subunits, 500_000);
        assert_eq!(order.currency, "INR");
    }
}
