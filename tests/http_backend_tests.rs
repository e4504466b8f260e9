#![allow(clippy::unwrap_used)]

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use rentpay::core::flow::FlowState;
use rentpay::observability::FlowContext;
use rentpay::types::BillingMonth;
use rentpay::{
    CheckoutOutcome, CheckoutProof, CreateIntentRequest, ErrorCategory, HttpBackend,
    PaymentBackend, PaymentMethod, PaymentStatus, RentPay, StatusPollerConfig,
};

fn backend_for(addr: std::net::SocketAddr) -> HttpBackend {
    HttpBackend::new(&config_for(addr))
        .unwrap()
        .with_flow(FlowContext::new(Some("it-flow-1".to_string())))
}

fn request(method: PaymentMethod) -> CreateIntentRequest {
    CreateIntentRequest {
        room_id: "room_1".to_string(),
        amount: 5000,
        month: BillingMonth::new(2025, 3).unwrap(),
        payment_method: method,
        notes: Some("March rent".to_string()),
    }
}

#[tokio::test]
async fn test_create_online_intent_builds_order() {
    let (addr, server) = spawn_backend().await;
    let backend = backend_for(addr);

    let intent = backend
        .create_intent(&request(PaymentMethod::Online))
        .await
        .unwrap();

    assert_eq!(intent.payment_id, PAYMENT_ID);
    assert_eq!(intent.transaction_id, "TXN-20250301-0001");
    assert_eq!(intent.status, PaymentStatus::Pending);
    let order = intent.order.unwrap();
    assert_eq!(order.order_id, "order_1");
    assert_eq!(order.key, "rzp_test_key");
    assert_eq!(order.amount_subunits, 500_000);
    assert_eq!(order.currency, "INR");

    let sent = server.requests_to("/payments/create");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].body["roomId"], "room_1");
    assert_eq!(sent[0].body["amount"], 5000);
    assert_eq!(sent[0].body["month"], "2025-03");
    assert_eq!(sent[0].body["paymentMethod"], "online");
    assert_eq!(sent[0].correlation_id.as_deref(), Some("it-flow-1"));
    assert!(sent[0].request_id.is_some());
    assert_eq!(
        sent[0].authorization.as_deref(),
        Some(format!("Bearer {}", TOKEN).as_str())
    );
}

#[tokio::test]
async fn test_cash_intent_has_no_order() {
    let (addr, _server) = spawn_backend().await;

    let intent = backend_for(addr)
        .create_intent(&request(PaymentMethod::Cash))
        .await
        .unwrap();

    assert_eq!(intent.method, PaymentMethod::Cash);
    assert!(intent.order.is_none());
}

#[tokio::test]
async fn test_rejected_proof_keeps_backend_message() {
    let (addr, server) = spawn_backend().await;
    let proof = CheckoutProof {
        order_id: "order_1".to_string(),
        gateway_payment_id: "pay_gw_1".to_string(),
        signature: "bad".to_string(),
    };

    let err = backend_for(addr)
        .verify_intent(&proof, PAYMENT_ID)
        .await
        .unwrap_err();

    assert!(err.is_rejection());
    assert_eq!(err.message, "Invalid payment signature");
    assert_eq!(err.correlation_id.as_deref(), Some("it-flow-1"));

    let sent = server.requests_to("/payments/verify");
    assert_eq!(sent[0].body["razorpay_order_id"], "order_1");
    assert_eq!(sent[0].body["razorpay_payment_id"], "pay_gw_1");
    assert_eq!(sent[0].body["paymentId"], PAYMENT_ID);
}

#[tokio::test]
async fn test_status_reads_envelope() {
    let (addr, server) = spawn_backend().await;
    server.serve_statuses(&["paid"]);

    let payment = backend_for(addr).payment_status(PAYMENT_ID).await.unwrap();

    assert_eq!(payment.status, PaymentStatus::Paid);
    assert_eq!(payment.receipt_number.as_deref(), Some("RCP-0001"));
    assert_eq!(payment.confirmed_by.as_ref().unwrap().name(), "Ravi Admin");
    assert_eq!(payment.room_number(), Some("R-1001"));
    assert_eq!(
        server.requests_to("/payments/status")[0].body["paymentId"],
        PAYMENT_ID
    );
}

#[tokio::test]
async fn test_refused_cancel_is_conflict() {
    let (addr, server) = spawn_backend().await;
    server.refuse_cancel.store(true, Ordering::SeqCst);

    let err = backend_for(addr).cancel_intent(PAYMENT_ID).await.unwrap_err();

    assert_eq!(err.category, ErrorCategory::Conflict);
    assert_eq!(err.message, "Payment already confirmed");
}

#[tokio::test]
async fn test_history_rooms_and_receipts() {
    let (addr, _server) = spawn_backend().await;
    let backend = backend_for(addr);

    let history = backend.payment_history().await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].method, PaymentMethod::Cash);

    let rooms = backend.rooms().await.unwrap();
    assert_eq!(rooms.len(), 2);
    assert_eq!(rooms[1].is_available, Some(true));

    let mine = backend.my_room().await.unwrap();
    assert_eq!(mine.room_number, "R-1001");
    assert_eq!(mine.monthly_rent, 5000);

    let other = backend.room("room_9").await.unwrap();
    assert_eq!(other.room_id, "room_9");

    let all = backend.all_payments().await.unwrap();
    assert_eq!(all.len(), 1);

    let receipt = backend.receipt(PAYMENT_ID).await.unwrap();
    assert_eq!(receipt.receipt_number.as_deref(), Some("RCP-0001"));
    assert_eq!(receipt.extra["tenantName"], "Asha Tenant");

    let err = backend.receipt("pay_missing").await.unwrap_err();
    assert_eq!(err.category, ErrorCategory::NotFound);
}

#[tokio::test]
async fn test_confirm_cash_sends_notes() {
    let (addr, server) = spawn_backend().await;

    let payment = backend_for(addr)
        .confirm_cash(PAYMENT_ID, Some("counted twice"))
        .await
        .unwrap();

    assert_eq!(payment.status, PaymentStatus::Paid);
    let sent = server.requests_to("/payments/confirm-cash");
    assert_eq!(sent[0].body["paymentId"], PAYMENT_ID);
    assert_eq!(sent[0].body["notes"], "counted twice");
}

#[tokio::test]
async fn test_unreachable_backend_is_network_error() {
    let mut config = rentpay::Config::default();
    config.api_base_url = "http://127.0.0.1:9/api".to_string();
    config.request_timeout_secs = 2;

    let err = HttpBackend::new(&config)
        .unwrap()
        .payment_status(PAYMENT_ID)
        .await
        .unwrap_err();

    assert_eq!(err.category, ErrorCategory::NetworkError);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_online_flow_end_to_end() {
    let (addr, server) = spawn_backend().await;
    let backend = Arc::new(backend_for(addr));
    let room = backend.my_room().await.unwrap();
    let widget = QueuedWidget::new(vec![CheckoutOutcome::Approved(CheckoutProof {
        order_id: "order_1".to_string(),
        gateway_payment_id: "pay_gw_1".to_string(),
        signature: "sig_ok".to_string(),
    })]);
    let injector = Arc::new(NoopInjector::default());
    let rentpay = RentPay::new(config_for(addr), backend, widget.clone(), injector.clone()).await;

    let mut flow = rentpay.start_flow(
        room,
        rentpay::BuyerInfo {
            name: "Asha Tenant".to_string(),
            email: "asha@example.com".to_string(),
            contact: None,
        },
        FlowContext::new(Some("it-flow-1".to_string())),
    );
    {
        let form = flow.form_mut().unwrap();
        form.method = Some(PaymentMethod::Online);
        form.billing_month = "2025-03".to_string();
        form.terms_accepted = true;
    }

    flow.submit().await.unwrap();
    flow.checkout().await.unwrap();

    match flow.state() {
        FlowState::Confirmed { intent } => {
            assert_eq!(intent.receipt_number.as_deref(), Some("RCP-0001"));
        }
        other => panic!("expected Confirmed, got {:?}", other),
    }
    assert_eq!(injector.calls.load(Ordering::SeqCst), 1);
    let opened = widget.opened.lock().unwrap();
    assert_eq!(opened[0].amount, 500_000);
    assert_eq!(opened[0].notes.room_number, "R-1001");
    assert_eq!(server.requests_to("/payments/verify").len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cash_flow_confirmed_by_polling() {
    let (addr, server) = spawn_backend().await;
    server.serve_statuses(&["pending", "paid"]);
    let backend = Arc::new(backend_for(addr));
    let room = backend.my_room().await.unwrap();
    let rentpay = RentPay::new(
        config_for(addr),
        backend,
        QueuedWidget::new(vec![]),
        Arc::new(NoopInjector::default()),
    )
    .await
    .with_poller_config(StatusPollerConfig {
        interval: Duration::from_millis(50),
        ..Default::default()
    });

    let mut flow = rentpay.start_flow(
        room,
        rentpay::BuyerInfo {
            name: "Asha Tenant".to_string(),
            email: "asha@example.com".to_string(),
            contact: Some("9876543210".to_string()),
        },
        FlowContext::new(None),
    );
    {
        let form = flow.form_mut().unwrap();
        form.method = Some(PaymentMethod::Cash);
        form.billing_month = "2025-03".to_string();
        form.terms_accepted = true;
    }

    flow.submit().await.unwrap();
    let state = tokio::time::timeout(Duration::from_secs(5), flow.wait_for_confirmation())
        .await
        .unwrap();

    match state {
        FlowState::Confirmed { intent } => {
            assert_eq!(intent.confirmed_by.as_ref().unwrap().name(), "Ravi Admin");
        }
        other => panic!("expected Confirmed, got {:?}", other),
    }
    assert_eq!(server.status_calls.load(Ordering::SeqCst), 2);
}
