pub mod checkout;
pub mod flow;
pub mod history;
pub mod operations;
pub mod reports;
pub mod services;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;

use tracing::info;

use self::checkout::{CheckoutBridge, CheckoutWidget, ScriptInjector, WidgetLoader};
use self::flow::{FlowServices, PaymentFlow};
use self::operations::IntentCreator;
use self::services::{StatusPoller, StatusPollerConfig};
use crate::api::PaymentBackend;
use crate::config::Config;
use crate::events::handlers::{LoggingEventHandler, MetricsEventHandler};
use crate::events::EventBus;
use crate::observability::FlowContext;
use crate::types::{BuyerInfo, Room};

/// Shared wiring for payment flows: one backend, one event bus and one
/// memoized checkout loader for the whole process
pub struct RentPay {
    config: Config,
    backend: Arc<dyn PaymentBackend>,
    event_bus: Arc<EventBus>,
    loader: Arc<WidgetLoader>,
    widget: Arc<dyn CheckoutWidget>,
    poller_config: StatusPollerConfig,
}

impl RentPay {
    pub async fn new(
        config: Config,
        backend: Arc<dyn PaymentBackend>,
        widget: Arc<dyn CheckoutWidget>,
        injector: Arc<dyn ScriptInjector>,
    ) -> Self {
        let event_bus = Arc::new(EventBus::new(256));

        // Register default event handlers
        event_bus
            .register_handler(Arc::new(LoggingEventHandler::new(false)))
            .await;
        event_bus
            .register_handler(Arc::new(MetricsEventHandler::new("rentpay")))
            .await;
        crate::metrics::describe_metrics();

        info!("Event bus initialized with all handlers");

        let loader = Arc::new(WidgetLoader::new(
            config.checkout.script_url.clone(),
            injector,
        ));

        let poller_config = StatusPollerConfig {
            interval: config.poll_interval(),
            ..Default::default()
        };

        Self {
            config,
            backend,
            event_bus,
            loader,
            widget,
            poller_config,
        }
    }

    pub fn with_poller_config(mut self, poller_config: StatusPollerConfig) -> Self {
        self.poller_config = poller_config;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn loader(&self) -> &Arc<WidgetLoader> {
        &self.loader
    }

    /// New flow for one room, starting in `Idle` with the rent and current
    /// month filled in
    pub fn start_flow(&self, room: Room, buyer: BuyerInfo, context: FlowContext) -> PaymentFlow {
        let services = FlowServices {
            backend: self.backend.clone(),
            creator: IntentCreator::new(self.backend.clone(), self.event_bus.clone()),
            bridge: CheckoutBridge::new(
                self.loader.clone(),
                self.widget.clone(),
                self.backend.clone(),
                self.config.checkout.clone(),
            ),
            poller: StatusPoller::new(
                self.backend.clone(),
                self.event_bus.clone(),
                self.poller_config.clone(),
            ),
            event_bus: self.event_bus.clone(),
        };
        PaymentFlow::new(room, buyer, context, services)
    }
}
