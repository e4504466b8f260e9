use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::api::PaymentBackend;
use crate::events::{EventBus, RentEvent};
use crate::observability::FlowContext;
use crate::types::{PaymentIntent, RentPayResult};

/// Configuration for the status poller
#[derive(Debug, Clone)]
pub struct StatusPollerConfig {
    /// Time between status fetches (default: 30 seconds)
    pub interval: Duration,
    /// Buffered records not yet consumed by the flow
    pub channel_capacity: usize,
}

impl Default for StatusPollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            channel_capacity: 8,
        }
    }
}

/// Fetches payment status on demand or on a fixed timer
#[derive(Clone)]
pub struct StatusPoller {
    backend: Arc<dyn PaymentBackend>,
    event_bus: Arc<EventBus>,
    config: StatusPollerConfig,
}

impl StatusPoller {
    pub fn new(
        backend: Arc<dyn PaymentBackend>,
        event_bus: Arc<EventBus>,
        config: StatusPollerConfig,
    ) -> Self {
        Self {
            backend,
            event_bus,
            config,
        }
    }

    pub fn config(&self) -> &StatusPollerConfig {
        &self.config
    }

    /// One fetch; errors go to the caller
    #[instrument(skip(self))]
    pub async fn poll(&self, payment_id: &str) -> RentPayResult<PaymentIntent> {
        self.backend.payment_status(payment_id).await
    }

    /// Start polling in the background. Fetched records arrive on the
    /// returned handle; fetch errors are logged and the next tick retries.
    /// The task ends by itself after delivering a terminal status.
    pub fn start(&self, payment_id: String, flow: FlowContext) -> PollHandle {
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        let (updates_tx, updates_rx) = mpsc::channel(self.config.channel_capacity);

        let backend = self.backend.clone();
        let event_bus = self.event_bus.clone();
        let period = self.config.interval;

        info!(
            payment_id = %payment_id,
            interval_secs = period.as_secs_f64(),
            "Starting status poller"
        );

        let task = tokio::spawn(async move {
            let mut timer = interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;

                    _ = shutdown_rx.recv() => {
                        debug!(payment_id = %payment_id, "Status poller received shutdown signal");
                        break;
                    }
                    _ = timer.tick() => {
                        match backend.payment_status(&payment_id).await {
                            Ok(record) => {
                                let terminal = record.status.is_terminal();
                                if updates_tx.send(record).await.is_err() {
                                    break;
                                }
                                if terminal {
                                    break;
                                }
                            }
                            Err(e) => {
                                if e.category.is_transient() {
                                    debug!(
                                        payment_id = %payment_id,
                                        error = %e,
                                        "Status poll failed; retrying on next tick"
                                    );
                                } else {
                                    warn!(
                                        payment_id = %payment_id,
                                        error = %e,
                                        "Status poll rejected; retrying on next tick"
                                    );
                                }
                                event_bus
                                    .publish(RentEvent::StatusPollFailed {
                                        payment_id: payment_id.clone(),
                                        reason: e.to_string(),
                                        correlation_id: Some(flow.correlation_id.clone()),
                                        timestamp: Utc::now(),
                                    })
                                    .await;
                            }
                        }
                    }
                }
            }

            debug!(payment_id = %payment_id, "Status poller stopped");
        });

        PollHandle {
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
            updates: updates_rx,
        }
    }
}

/// Owned timer for one payment. Released exactly once: on `stop`, or when
/// dropped.
#[derive(Debug)]
pub struct PollHandle {
    shutdown_tx: Option<broadcast::Sender<()>>,
    task: Option<JoinHandle<()>>,
    updates: mpsc::Receiver<PaymentIntent>,
}

impl PollHandle {
    /// Next fetched record, or `None` once the poller has stopped
    pub async fn next_update(&mut self) -> Option<PaymentIntent> {
        self.updates.recv().await
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().map_or(false, |t| !t.is_finished())
    }

    /// Stop the timer. Idempotent; no fetch is started afterwards and an
    /// in-flight one is abandoned.
    pub fn stop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.updates.close();
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
