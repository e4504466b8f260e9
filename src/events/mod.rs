use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info};
use uuid::Uuid;

pub mod handlers;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RentEvent {
    // Intent events
    IntentCreated {
        payment_id: String,
        transaction_id: String,
        room_id: String,
        amount: u64,
        month: String,
        method: String,
        correlation_id: Option<String>,
        timestamp: DateTime<Utc>,
    },
    IntentRejected {
        room_id: String,
        reasons: Vec<String>,
        correlation_id: Option<String>,
        timestamp: DateTime<Utc>,
    },

    // Online checkout events
    CheckoutOpened {
        payment_id: String,
        order_id: String,
        amount_subunits: u64,
        correlation_id: Option<String>,
        timestamp: DateTime<Utc>,
    },
    CheckoutDismissed {
        payment_id: String,
        correlation_id: Option<String>,
        timestamp: DateTime<Utc>,
    },
    GatewayFailed {
        payment_id: String,
        reason: String,
        correlation_id: Option<String>,
        timestamp: DateTime<Utc>,
    },
    VerificationFailed {
        payment_id: String,
        reason: String,
        correlation_id: Option<String>,
        timestamp: DateTime<Utc>,
    },

    // Outcome events
    PaymentConfirmed {
        payment_id: String,
        amount: u64,
        method: String,
        receipt_number: Option<String>,
        confirmed_by: Option<String>,
        correlation_id: Option<String>,
        timestamp: DateTime<Utc>,
    },
    PaymentCancelled {
        payment_id: String,
        by_user: bool,
        correlation_id: Option<String>,
        timestamp: DateTime<Utc>,
    },
    PaymentFailed {
        payment_id: String,
        reason: String,
        correlation_id: Option<String>,
        timestamp: DateTime<Utc>,
    },

    // Poller events
    StatusPollFailed {
        payment_id: String,
        reason: String,
        correlation_id: Option<String>,
        timestamp: DateTime<Utc>,
    },
}

impl RentEvent {
    /// Generate a unique event ID
    pub fn event_id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            RentEvent::IntentCreated { timestamp, .. }
            | RentEvent::IntentRejected { timestamp, .. }
            | RentEvent::CheckoutOpened { timestamp, .. }
            | RentEvent::CheckoutDismissed { timestamp, .. }
            | RentEvent::GatewayFailed { timestamp, .. }
            | RentEvent::VerificationFailed { timestamp, .. }
            | RentEvent::PaymentConfirmed { timestamp, .. }
            | RentEvent::PaymentCancelled { timestamp, .. }
            | RentEvent::PaymentFailed { timestamp, .. }
            | RentEvent::StatusPollFailed { timestamp, .. } => *timestamp,
        }
    }

    pub fn correlation_id(&self) -> Option<&String> {
        match self {
            RentEvent::IntentCreated { correlation_id, .. }
            | RentEvent::IntentRejected { correlation_id, .. }
            | RentEvent::CheckoutOpened { correlation_id, .. }
            | RentEvent::CheckoutDismissed { correlation_id, .. }
            | RentEvent::GatewayFailed { correlation_id, .. }
            | RentEvent::VerificationFailed { correlation_id, .. }
            | RentEvent::PaymentConfirmed { correlation_id, .. }
            | RentEvent::PaymentCancelled { correlation_id, .. }
            | RentEvent::PaymentFailed { correlation_id, .. }
            | RentEvent::StatusPollFailed { correlation_id, .. } => correlation_id.as_ref(),
        }
    }

    pub fn payment_id(&self) -> Option<&str> {
        match self {
            RentEvent::IntentRejected { .. } => None,
            RentEvent::IntentCreated { payment_id, .. }
            | RentEvent::CheckoutOpened { payment_id, .. }
            | RentEvent::CheckoutDismissed { payment_id, .. }
            | RentEvent::GatewayFailed { payment_id, .. }
            | RentEvent::VerificationFailed { payment_id, .. }
            | RentEvent::PaymentConfirmed { payment_id, .. }
            | RentEvent::PaymentCancelled { payment_id, .. }
            | RentEvent::PaymentFailed { payment_id, .. }
            | RentEvent::StatusPollFailed { payment_id, .. } => Some(payment_id),
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            RentEvent::IntentCreated { .. } => "intent_created",
            RentEvent::IntentRejected { .. } => "intent_rejected",
            RentEvent::CheckoutOpened { .. } => "checkout_opened",
            RentEvent::CheckoutDismissed { .. } => "checkout_dismissed",
            RentEvent::GatewayFailed { .. } => "gateway_failed",
            RentEvent::VerificationFailed { .. } => "verification_failed",
            RentEvent::PaymentConfirmed { .. } => "payment_confirmed",
            RentEvent::PaymentCancelled { .. } => "payment_cancelled",
            RentEvent::PaymentFailed { .. } => "payment_failed",
            RentEvent::StatusPollFailed { .. } => "status_poll_failed",
        }
    }
}

/// Trait for handling events asynchronously
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: RentEvent) -> anyhow::Result<()>;

    fn name(&self) -> &str;

    /// Critical handlers are awaited inline by `publish`
    fn is_critical(&self) -> bool {
        false
    }
}

/// Event bus for distributing events to multiple handlers
pub struct EventBus {
    sender: broadcast::Sender<RentEvent>,
    handlers: Arc<RwLock<Vec<Arc<dyn EventHandler>>>>,
    max_capacity: usize,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("max_capacity", &self.max_capacity)
            .field(
                "handlers_count",
                &self.handlers.try_read().map(|h| h.len()).unwrap_or(0),
            )
            .finish()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            handlers: Arc::new(RwLock::new(Vec::new())),
            max_capacity: capacity,
        }
    }

    pub async fn register_handler(&self, handler: Arc<dyn EventHandler>) {
        let mut handlers = self.handlers.write().await;
        let handler_name = handler.name().to_string();
        handlers.push(handler);
        info!(
            handler_name = %handler_name,
            total_handlers = handlers.len(),
            "Event handler registered"
        );
    }

    /// Publish an event to subscribers and registered handlers. Handler
    /// failures are logged, never returned.
    pub async fn publish(&self, event: RentEvent) {
        let event_id = event.event_id();
        let event_type = event.event_type();

        debug!(
            event_id = %event_id,
            event_type = %event_type,
            correlation_id = ?event.correlation_id(),
            "Publishing event"
        );

        // No receivers is not an error
        if let Ok(subscriber_count) = self.sender.send(event.clone()) {
            debug!(
                event_id = %event_id,
                event_type = %event_type,
                subscriber_count = subscriber_count,
                "Event broadcast to subscribers"
            );
        }

        let handlers = self.handlers.read().await;
        let mut critical = Vec::new();

        for handler in handlers.iter() {
            let is_critical = handler.is_critical();
            let handler = handler.clone();
            let event = event.clone();
            let event_id = event_id.clone();

            let run = async move {
                if let Err(e) = handler.handle(event).await {
                    error!(
                        event_id = %event_id,
                        handler_name = %handler.name(),
                        error = ?e,
                        "Event handler failed"
                    );
                }
            };

            if is_critical {
                critical.push(run);
            } else {
                tokio::spawn(run);
            }
        }

        for run in critical {
            run.await;
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RentEvent> {
        self.sender.subscribe()
    }

    pub async fn handler_count(&self) -> usize {
        self.handlers.read().await.len()
    }

    pub async fn stats(&self) -> EventBusStats {
        let handlers = self.handlers.read().await;
        EventBusStats {
            capacity: self.max_capacity,
            handler_count: handlers.len(),
            critical_handler_count: handlers.iter().filter(|h| h.is_critical()).count(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventBusStats {
    pub capacity: usize,
    pub handler_count: usize,
    pub critical_handler_count: usize,
}
