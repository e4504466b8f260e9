//! Online checkout hand-off.
//!
//! The hosted widget is reached through two seams: [`ScriptInjector`] loads
//! the gateway script once per process and [`CheckoutWidget`] opens the modal
//! and reports how the tenant left it. [`CheckoutBridge`] ties both to the
//! backend's verification call.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use crate::api::PaymentBackend;
use crate::config::CheckoutConfig;
use crate::error::{AppError, ErrorCategory};
use crate::observability::sanitize_contact;
use crate::types::{BuyerInfo, OrderDescriptor, PaymentIntent, RentPayResult};

/// What the gateway hands back on a successful payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutProof {
    #[serde(rename = "razorpay_order_id")]
    pub order_id: String,
    #[serde(rename = "razorpay_payment_id")]
    pub gateway_payment_id: String,
    #[serde(rename = "razorpay_signature")]
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Prefill {
    pub name: String,
    pub email: String,
    pub contact: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutNotes {
    #[serde(rename = "roomNumber")]
    pub room_number: String,
    pub month: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Theme {
    pub color: String,
}

/// The modal can only be closed through its own dismiss control
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModalOptions {
    pub escape: bool,
    pub backdropclose: bool,
}

impl Default for ModalOptions {
    fn default() -> Self {
        Self {
            escape: false,
            backdropclose: false,
        }
    }
}

/// Options object passed to the widget constructor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutOptions {
    pub key: String,
    /// Amount in currency subunits
    pub amount: u64,
    pub currency: String,
    pub name: String,
    pub description: String,
    pub order_id: String,
    pub prefill: Prefill,
    pub notes: CheckoutNotes,
    pub theme: Theme,
    pub modal: ModalOptions,
}

impl CheckoutOptions {
    /// Build widget options, rejecting descriptors the gateway cannot open
    pub fn build(
        order: &OrderDescriptor,
        buyer: &BuyerInfo,
        intent: &PaymentIntent,
        settings: &CheckoutConfig,
    ) -> RentPayResult<Self> {
        if order.order_id.trim().is_empty() {
            return Err(AppError::gateway_error("Gateway order id is missing"));
        }
        if order.key.trim().is_empty() {
            return Err(AppError::gateway_error("Gateway key is missing"));
        }
        if order.amount_subunits == 0 {
            return Err(AppError::gateway_error("Gateway order amount is zero"));
        }

        let room_number = intent.room_number().unwrap_or("N/A").to_string();
        let month = intent.month_display();

        let currency = if order.currency.trim().is_empty() {
            settings.currency.clone()
        } else {
            order.currency.clone()
        };

        Ok(Self {
            key: order.key.clone(),
            amount: order.amount_subunits,
            currency,
            name: settings.merchant_name.clone(),
            description: format!("Rent for Room {} - {}", room_number, month),
            order_id: order.order_id.clone(),
            prefill: Prefill {
                name: buyer.name.clone(),
                email: buyer.email.clone(),
                contact: buyer.contact.clone().unwrap_or_default(),
            },
            notes: CheckoutNotes { room_number, month },
            theme: Theme {
                color: settings.theme_color.clone(),
            },
            modal: ModalOptions::default(),
        })
    }
}

/// How the tenant left the widget
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutOutcome {
    Approved(CheckoutProof),
    Dismissed,
}

/// Loads the gateway script into the host environment
#[async_trait]
pub trait ScriptInjector: Send + Sync {
    async fn inject(&self, script_url: &str) -> anyhow::Result<()>;
}

/// Opens the hosted checkout modal and waits for it to close
#[async_trait]
pub trait CheckoutWidget: Send + Sync {
    async fn open(&self, options: &CheckoutOptions) -> anyhow::Result<CheckoutOutcome>;
}

/// Process-lifetime, memoized script load. Concurrent callers share one
/// in-flight load; a failed load is retried by the next caller.
pub struct WidgetLoader {
    script_url: String,
    injector: Arc<dyn ScriptInjector>,
    loaded: OnceCell<()>,
}

impl WidgetLoader {
    pub fn new(script_url: impl Into<String>, injector: Arc<dyn ScriptInjector>) -> Self {
        Self {
            script_url: script_url.into(),
            injector,
            loaded: OnceCell::new(),
        }
    }

    pub async fn ensure_loaded(&self) -> RentPayResult<()> {
        self.loaded
            .get_or_try_init(|| async {
                info!(script_url = %self.script_url, "Loading checkout script");
                self.injector
                    .inject(&self.script_url)
                    .await
                    .map_err(|e| {
                        warn!(error = ?e, "Checkout script failed to load");
                        AppError::gateway_error(format!("Failed to load payment gateway: {}", e))
                    })
            })
            .await
            .map(|_| ())
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.initialized()
    }
}

/// Online checkout: open the widget for an intent and verify what it returns
pub struct CheckoutBridge {
    loader: Arc<WidgetLoader>,
    widget: Arc<dyn CheckoutWidget>,
    backend: Arc<dyn PaymentBackend>,
    settings: CheckoutConfig,
}

impl CheckoutBridge {
    pub fn new(
        loader: Arc<WidgetLoader>,
        widget: Arc<dyn CheckoutWidget>,
        backend: Arc<dyn PaymentBackend>,
        settings: CheckoutConfig,
    ) -> Self {
        Self {
            loader,
            widget,
            backend,
            settings,
        }
    }

    /// Open the widget for a pending online intent. Every failure before the
    /// tenant acts is a `GatewayError`.
    #[instrument(skip(self, intent, buyer), fields(payment_id = %intent.payment_id, buyer = %sanitize_contact(&buyer.email)))]
    pub async fn launch(
        &self,
        intent: &PaymentIntent,
        buyer: &BuyerInfo,
    ) -> RentPayResult<CheckoutOutcome> {
        let order = intent
            .order
            .as_ref()
            .ok_or_else(|| AppError::gateway_error("Payment has no gateway order attached"))?;

        let options = CheckoutOptions::build(order, buyer, intent, &self.settings)?;

        self.loader.ensure_loaded().await?;

        debug!(order_id = %options.order_id, amount = options.amount, "Opening checkout widget");

        self.widget
            .open(&options)
            .await
            .map_err(|e| AppError::gateway_error(format!("Failed to open checkout: {}", e)))
    }

    /// Relay the proof to the backend. A 4xx answer means the proof was
    /// rejected.
    #[instrument(skip(self, proof), fields(order_id = %proof.order_id))]
    pub async fn verify(
        &self,
        proof: &CheckoutProof,
        payment_id: &str,
    ) -> RentPayResult<PaymentIntent> {
        match self.backend.verify_intent(proof, payment_id).await {
            Ok(record) => Ok(record),
            Err(e) if e.is_rejection() => Err(as_verification_error(e)),
            Err(e) => Err(e),
        }
    }
}

fn as_verification_error(mut err: AppError) -> AppError {
    err.category = ErrorCategory::VerificationError;
    err
}
