#![allow(clippy::unwrap_used, dead_code)]

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use rentpay::config::Config;
use rentpay::{CheckoutOptions, CheckoutOutcome, CheckoutWidget, ScriptInjector};
use serde_json::{json, Value};
use tokio::net::TcpListener;

pub const PAYMENT_ID: &str = "pay_1";
pub const TOKEN: &str = "tenant-token-123";

/// A request as the mock backend saw it
#[derive(Debug, Clone)]
pub struct Recorded {
    pub path: String,
    pub correlation_id: Option<String>,
    pub request_id: Option<String>,
    pub authorization: Option<String>,
    pub body: Value,
}

/// Shared state behind the mock rental backend
#[derive(Default)]
pub struct Backend {
    pub requests: Mutex<Vec<Recorded>>,
    pub status_calls: AtomicUsize,
    /// Successive statuses for `/payments/status`; the last one repeats
    pub statuses: Mutex<VecDeque<&'static str>>,
    pub refuse_cancel: AtomicBool,
    pub omit_order: AtomicBool,
}

impl Backend {
    pub fn serve_statuses(&self, statuses: &[&'static str]) {
        *self.statuses.lock().unwrap() = statuses.iter().copied().collect();
    }

    pub fn requests_to(&self, path: &str) -> Vec<Recorded> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }

    fn record(&self, path: &str, headers: &HeaderMap, body: Value) {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        self.requests.lock().unwrap().push(Recorded {
            path: path.to_string(),
            correlation_id: header("x-correlation-id"),
            request_id: header("x-request-id"),
            authorization: header("authorization"),
            body,
        });
    }

    fn next_status(&self) -> &'static str {
        let mut statuses = self.statuses.lock().unwrap();
        if statuses.len() > 1 {
            statuses.pop_front().unwrap_or("pending")
        } else {
            statuses.front().copied().unwrap_or("pending")
        }
    }
}

pub fn payment_json(status: &str, method: &str) -> Value {
    let mut payment = json!({
        "_id": PAYMENT_ID,
        "transactionId": "TXN-20250301-0001",
        "roomId": { "_id": "room_1", "roomNumber": "R-1001", "building": "A" },
        "amount": 5000,
        "month": "2025-03",
        "paymentMethod": method,
        "status": status,
        "createdAt": "2025-03-01T10:00:00Z",
    });
    if status == "paid" {
        payment["receiptNumber"] = json!("RCP-0001");
        payment["paidOn"] = json!("2025-03-02T09:30:00Z");
        payment["confirmedBy"] = json!({ "_id": "admin_1", "name": "Ravi Admin" });
    }
    payment
}

type Shared = State<Arc<Backend>>;

async fn create(State(backend): Shared, headers: HeaderMap, Json(body): Json<Value>) -> Json<Value> {
    backend.record("/payments/create", &headers, body.clone());
    let mut response = json!({
        "success": true,
        "paymentId": PAYMENT_ID,
        "transactionId": "TXN-20250301-0001",
        "amount": body["amount"],
        "month": body["month"],
    });
    if body["paymentMethod"] == "online" && !backend.omit_order.load(Ordering::SeqCst) {
        response["orderId"] = json!("order_1");
        response["razorpayKey"] = json!("rzp_test_key");
    }
    Json(response)
}

async fn verify(State(backend): Shared, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    backend.record("/payments/verify", &headers, body.clone());
    if body["razorpay_signature"] == "bad" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "success": false, "message": "Invalid payment signature" })),
        )
            .into_response();
    }
    Json(json!({ "success": true, "payment": payment_json("paid", "online") })).into_response()
}

async fn status(
    State(backend): Shared,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    backend.record("/payments/status", &headers, json!(query));
    backend.status_calls.fetch_add(1, Ordering::SeqCst);
    let status = backend.next_status();
    Json(json!({ "success": true, "payment": payment_json(status, "cash") }))
}

async fn cancel(State(backend): Shared, headers: HeaderMap, Json(body): Json<Value>) -> Json<Value> {
    backend.record("/payments/cancel", &headers, body);
    if backend.refuse_cancel.load(Ordering::SeqCst) {
        return Json(json!({ "success": false, "message": "Payment already confirmed" }));
    }
    backend.serve_statuses(&["cancelled"]);
    Json(json!({ "success": true, "message": "Payment cancelled" }))
}

async fn confirm_cash(State(backend): Shared, headers: HeaderMap, Json(body): Json<Value>) -> Json<Value> {
    backend.record("/payments/confirm-cash", &headers, body);
    Json(json!({ "success": true, "payment": payment_json("paid", "cash") }))
}

async fn history(State(backend): Shared, headers: HeaderMap) -> Json<Value> {
    backend.record("/payments/history", &headers, Value::Null);
    Json(json!({
        "success": true,
        "payments": [payment_json("paid", "online"), payment_json("pending", "cash")],
    }))
}

async fn all_payments() -> Json<Value> {
    Json(json!([payment_json("paid", "online")]))
}

async fn receipt(Path(payment_id): Path<String>) -> Response {
    if payment_id != PAYMENT_ID {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "message": "Receipt not found" })),
        )
            .into_response();
    }
    Json(json!({
        "success": true,
        "receipt": {
            "receiptNumber": "RCP-0001",
            "transactionId": "TXN-20250301-0001",
            "amount": 5000,
            "month": "2025-03",
            "tenantName": "Asha Tenant",
        },
    }))
    .into_response()
}

fn room_json(id: &str, number: &str, available: bool) -> Value {
    json!({
        "_id": id,
        "roomNumber": number,
        "monthlyRent": 5000,
        "building": "A",
        "isAvailable": available,
    })
}

async fn rooms() -> Json<Value> {
    Json(json!([
        room_json("room_1", "R-1001", false),
        room_json("room_2", "R-1002", true),
    ]))
}

async fn my_room() -> Json<Value> {
    Json(room_json("room_1", "R-1001", false))
}

async fn room(Path(room_id): Path<String>) -> Json<Value> {
    Json(json!({ "room": room_json(&room_id, "R-2001", true) }))
}

/// Start the mock backend on an ephemeral port
pub async fn spawn_backend() -> (SocketAddr, Arc<Backend>) {
    let backend = Arc::new(Backend::default());

    let api = Router::new()
        .route("/payments/create", post(create))
        .route("/payments/verify", post(verify))
        .route("/payments/status", get(status))
        .route("/payments/cancel", post(cancel))
        .route("/payments/confirm-cash", post(confirm_cash))
        .route("/payments/history", get(history))
        .route("/payments/receipt/:id", get(receipt))
        .route("/payments", get(all_payments))
        .route("/rooms", get(rooms))
        .route("/rooms/my-room", get(my_room))
        .route("/rooms/:id", get(room))
        .with_state(backend.clone());
    let app = Router::new().nest("/api", api);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, backend)
}

pub fn config_for(addr: SocketAddr) -> Config {
    Config {
        api_base_url: format!("http://{}/api", addr),
        auth_token: Some(TOKEN.to_string()),
        ..Default::default()
    }
}

/// Widget that plays back queued outcomes
#[derive(Default)]
pub struct QueuedWidget {
    pub outcomes: Mutex<VecDeque<CheckoutOutcome>>,
    pub opened: Mutex<Vec<CheckoutOptions>>,
}

impl QueuedWidget {
    pub fn new(outcomes: Vec<CheckoutOutcome>) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into()),
            ..Default::default()
        })
    }
}

#[async_trait]
impl CheckoutWidget for QueuedWidget {
    async fn open(&self, options: &CheckoutOptions) -> anyhow::Result<CheckoutOutcome> {
        self.opened.lock().unwrap().push(options.clone());
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("no outcome queued"))
    }
}

#[derive(Default)]
pub struct NoopInjector {
    pub calls: AtomicUsize,
}

#[async_trait]
impl ScriptInjector for NoopInjector {
    async fn inject(&self, _script_url: &str) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
