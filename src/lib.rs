// Library exports for the CLI and embedding clients
pub mod api;
pub mod config;
pub mod core;
pub mod error;
pub mod events;
pub mod metrics;
pub mod observability;
pub mod types;

pub use crate::api::{CreateIntentRequest, HttpBackend, PaymentBackend};
pub use crate::config::Config;
pub use crate::core::checkout::{
    CheckoutBridge, CheckoutOptions, CheckoutOutcome, CheckoutProof, CheckoutWidget,
    ScriptInjector, WidgetLoader,
};
pub use crate::core::flow::{FlowState, PaymentFlow};
pub use crate::core::operations::{IntentCreator, PaymentForm};
pub use crate::core::services::{PollHandle, StatusPoller, StatusPollerConfig};
pub use crate::core::RentPay;
pub use crate::error::{AppError, ErrorCategory};
pub use crate::types::{
    BillingMonth, BuyerInfo, PaymentIntent, PaymentMethod, PaymentStatus, RentPayResult, Room,
};
