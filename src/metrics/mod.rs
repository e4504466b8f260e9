use std::sync::Once;

use metrics::{describe_counter, describe_histogram, Unit};

// Metric names
pub const INTENTS_TOTAL: &str = "rentpay_intents_total";
pub const INTENT_AMOUNT_RUPEES: &str = "rentpay_intent_amount_rupees";

pub const CHECKOUTS_TOTAL: &str = "rentpay_checkouts_total";
pub const VERIFICATIONS_TOTAL: &str = "rentpay_verifications_total";

pub const PAYMENT_OUTCOMES_TOTAL: &str = "rentpay_payment_outcomes_total";
pub const PAYMENT_AMOUNT_RUPEES: &str = "rentpay_payment_amount_rupees";

pub const STATUS_POLL_FAILURES_TOTAL: &str = "rentpay_status_poll_failures_total";

pub const EVENT_BUS_EVENTS_TOTAL: &str = "rentpay_event_bus_events_total";

static METRICS_DESCRIBED: Once = Once::new();

/// Attach descriptions to every metric. Safe to call more than once; only
/// the first call reaches the installed recorder.
pub fn describe_metrics() {
    METRICS_DESCRIBED.call_once(|| {
        describe_counter!(INTENTS_TOTAL, "Payment intents created or rejected");
        describe_histogram!(
            INTENT_AMOUNT_RUPEES,
            Unit::Count,
            "Intent amounts in whole rupees"
        );

        describe_counter!(CHECKOUTS_TOTAL, "Checkout widget launches by outcome");
        describe_counter!(VERIFICATIONS_TOTAL, "Server-side verification results");

        describe_counter!(PAYMENT_OUTCOMES_TOTAL, "Terminal payment outcomes");
        describe_histogram!(
            PAYMENT_AMOUNT_RUPEES,
            Unit::Count,
            "Confirmed payment amounts in whole rupees"
        );

        describe_counter!(STATUS_POLL_FAILURES_TOTAL, "Failed status fetches");
        describe_counter!(EVENT_BUS_EVENTS_TOTAL, "Events published on the bus");
    });
}
