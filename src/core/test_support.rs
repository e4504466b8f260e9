//! In-process fakes for the backend and the checkout widget

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use super::checkout::{CheckoutOptions, CheckoutOutcome, CheckoutProof, CheckoutWidget, ScriptInjector};
use super::services::StatusPollerConfig;
use super::RentPay;
use crate::api::{CreateIntentRequest, PaymentBackend};
use crate::config::Config;
use crate::error::AppError;
use crate::observability::FlowContext;
use crate::types::{
    BuyerInfo, ConfirmedBy, OrderDescriptor, PaymentIntent, PaymentMethod, PaymentStatus,
    RentPayResult, Room, RoomRef,
};

pub const PAYMENT_ID: &str = "pay_1";
pub const TRANSACTION_ID: &str = "TXN-20250301-0001";

pub fn room() -> Room {
    Room {
        room_id: "room_1".to_string(),
        room_number: "R-1001".to_string(),
        monthly_rent: 5000,
        building: Some("A".to_string()),
        floor: Some("1".to_string()),
        description: None,
        is_available: Some(false),
    }
}

pub fn buyer() -> BuyerInfo {
    BuyerInfo {
        name: "Asha Tenant".to_string(),
        email: "asha@example.com".to_string(),
        contact: Some("9876543210".to_string()),
    }
}

pub fn proof() -> CheckoutProof {
    CheckoutProof {
        order_id: "order_1".to_string(),
        gateway_payment_id: "pay_gw_1".to_string(),
        signature: "sig_1".to_string(),
    }
}

/// Scriptable backend with per-call counters
#[derive(Default)]
pub struct MockBackend {
    pub create_calls: AtomicUsize,
    pub verify_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub cancel_calls: AtomicUsize,
    /// Successive statuses served by `payment_status`; the last one repeats
    statuses: Mutex<VecDeque<PaymentStatus>>,
    /// Number of upcoming verify calls answered with 400
    verify_rejections: AtomicUsize,
    status_fails: AtomicBool,
    status_missing: AtomicBool,
    cancel_fails: AtomicBool,
    omit_order: AtomicBool,
    bare_room: AtomicBool,
    created: Mutex<Option<PaymentIntent>>,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve_statuses(&self, statuses: &[PaymentStatus]) {
        *self.statuses.lock().unwrap() = statuses.iter().copied().collect();
    }

    pub fn reject_verifications(&self, count: usize) {
        self.verify_rejections.store(count, Ordering::SeqCst);
    }

    pub fn fail_status(&self, fail: bool) {
        self.status_fails.store(fail, Ordering::SeqCst);
    }

    /// Answer status calls with 404 instead of a network failure
    pub fn lose_payment(&self) {
        self.status_missing.store(true, Ordering::SeqCst);
    }

    pub fn fail_cancel(&self, fail: bool) {
        self.cancel_fails.store(fail, Ordering::SeqCst);
    }

    pub fn omit_order(&self) {
        self.omit_order.store(true, Ordering::SeqCst);
    }

    /// Answer create with a bare room id instead of a room summary
    pub fn answer_with_bare_room(&self) {
        self.bare_room.store(true, Ordering::SeqCst);
    }

    pub fn total_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
            + self.verify_calls.load(Ordering::SeqCst)
            + self.status_calls.load(Ordering::SeqCst)
            + self.cancel_calls.load(Ordering::SeqCst)
    }

    fn record(&self, status: PaymentStatus) -> RentPayResult<PaymentIntent> {
        let mut record = self
            .created
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| AppError::not_found("Payment not found"))?;
        // The status endpoint does not echo create-time extras
        record.order = None;
        record.status = status;
        if status == PaymentStatus::Paid {
            record.receipt_number = Some("RCP-0001".to_string());
            record.confirmed_by = Some(ConfirmedBy::Admin {
                id: "admin_1".to_string(),
                name: "Ravi Admin".to_string(),
            });
        }
        Ok(record)
    }

    fn next_status(&self) -> PaymentStatus {
        let mut statuses = self.statuses.lock().unwrap();
        if statuses.len() > 1 {
            statuses.pop_front().unwrap_or(PaymentStatus::Pending)
        } else {
            statuses.front().copied().unwrap_or(PaymentStatus::Pending)
        }
    }
}

#[async_trait]
impl PaymentBackend for MockBackend {
    async fn create_intent(&self, request: &CreateIntentRequest) -> RentPayResult<PaymentIntent> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);

        let order = match request.payment_method {
            PaymentMethod::Online if !self.omit_order.load(Ordering::SeqCst) => {
                Some(OrderDescriptor {
                    order_id: "order_1".to_string(),
                    key: "rzp_test_key".to_string(),
                    amount_subunits: request.amount * 100,
                    currency: "INR".to_string(),
                })
            }
            _ => None,
        };

        let intent = PaymentIntent {
            payment_id: PAYMENT_ID.to_string(),
            transaction_id: TRANSACTION_ID.to_string(),
            room: Some(if self.bare_room.load(Ordering::SeqCst) {
                RoomRef::Id(request.room_id.clone())
            } else {
                RoomRef::Summary {
                    id: request.room_id.clone(),
                    room_number: Some("R-1001".to_string()),
                    building: None,
                }
            }),
            amount: request.amount,
            billing_month: request.month,
            method: request.payment_method,
            status: PaymentStatus::Pending,
            notes: request.notes.clone(),
            order,
            paid_on: None,
            receipt_number: None,
            confirmed_by: None,
            created_at: None,
            month_display: None,
        };
        *self.created.lock().unwrap() = Some(intent.clone());
        Ok(intent)
    }

    async fn verify_intent(
        &self,
        _proof: &CheckoutProof,
        _payment_id: &str,
    ) -> RentPayResult<PaymentIntent> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.verify_rejections.load(Ordering::SeqCst);
        if remaining > 0 {
            self.verify_rejections.store(remaining - 1, Ordering::SeqCst);
            return Err(AppError::from_response(
                StatusCode::BAD_REQUEST,
                "Invalid payment signature",
            ));
        }
        self.record(PaymentStatus::Paid)
    }

    async fn payment_status(&self, _payment_id: &str) -> RentPayResult<PaymentIntent> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if self.status_fails.load(Ordering::SeqCst) {
            return Err(AppError::network_error("connection reset"));
        }
        if self.status_missing.load(Ordering::SeqCst) {
            return Err(AppError::not_found("Payment not found"));
        }
        let status = self.next_status();
        self.record(status)
    }

    async fn cancel_intent(&self, _payment_id: &str) -> RentPayResult<()> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        if self.cancel_fails.load(Ordering::SeqCst) {
            return Err(AppError::network_error("connection reset"));
        }
        self.serve_statuses(&[PaymentStatus::Cancelled]);
        Ok(())
    }
}

/// Widget that plays back queued outcomes
#[derive(Default)]
pub struct ScriptedWidget {
    pub opens: AtomicUsize,
    outcomes: Mutex<VecDeque<CheckoutOutcome>>,
    last_options: Mutex<Option<CheckoutOptions>>,
}

impl ScriptedWidget {
    pub fn with_outcomes(outcomes: Vec<CheckoutOutcome>) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into()),
            ..Default::default()
        })
    }

    pub fn last_options(&self) -> Option<CheckoutOptions> {
        self.last_options.lock().unwrap().clone()
    }
}

#[async_trait]
impl CheckoutWidget for ScriptedWidget {
    async fn open(&self, options: &CheckoutOptions) -> anyhow::Result<CheckoutOutcome> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        *self.last_options.lock().unwrap() = Some(options.clone());
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("widget closed unexpectedly"))
    }
}

/// Injector that counts side effects and can fail the first attempts
#[derive(Default)]
pub struct CountingInjector {
    pub injections: AtomicUsize,
    failures_left: AtomicUsize,
    delay: Duration,
}

impl CountingInjector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Default::default()
        })
    }

    pub fn failing(times: usize) -> Arc<Self> {
        Arc::new(Self {
            failures_left: AtomicUsize::new(times),
            ..Default::default()
        })
    }
}

#[async_trait]
impl ScriptInjector for CountingInjector {
    async fn inject(&self, _script_url: &str) -> anyhow::Result<()> {
        self.injections.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            anyhow::bail!("script blocked");
        }
        Ok(())
    }
}

pub const TEST_POLL_INTERVAL: Duration = Duration::from_millis(20);

pub async fn rentpay(
    backend: Arc<MockBackend>,
    widget: Arc<ScriptedWidget>,
    injector: Arc<CountingInjector>,
) -> RentPay {
    RentPay::new(Config::default(), backend, widget, injector)
        .await
        .with_poller_config(StatusPollerConfig {
            interval: TEST_POLL_INTERVAL,
            ..Default::default()
        })
}

pub fn flow_context() -> FlowContext {
    FlowContext::new(Some("test-flow".to_string()))
}
