//! Scheduled-message worker: lease, deliver, record.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use careline_core::{defaults, EmailService, MessageComposer, Result, ScheduledPayloadKind, Store};

use crate::deliverers::{CaseMessageDeliverer, EmailDeliverer, TreatmentPlanMessageDeliverer};
use crate::handler::{Deliverer, DeliveryOutcome};

/// Configuration for the scheduled-message worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Sleep between lease attempts when nothing is due.
    pub poll_interval_ms: u64,
    /// `processing` rows older than this are returned to the queue.
    pub stale_after_secs: u64,
    /// Whether to run the loop at all.
    pub enabled: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: defaults::SCHEDMSG_POLL_INTERVAL_MS,
            stale_after_secs: defaults::SCHEDMSG_STALE_AFTER_SECS,
            enabled: true,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `SCHEDMSG_WORKER_ENABLED` | `true` | Enable/disable delivery |
    /// | `SCHEDMSG_POLL_INTERVAL_MS` | `20000` | Sleep when nothing is due |
    /// | `SCHEDMSG_STALE_AFTER_SECS` | `600` | Age at which a lease is presumed dead |
    pub fn from_env() -> Self {
        let enabled = std::env::var("SCHEDMSG_WORKER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let poll_interval_ms = std::env::var("SCHEDMSG_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::SCHEDMSG_POLL_INTERVAL_MS);

        let stale_after_secs = std::env::var("SCHEDMSG_STALE_AFTER_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::SCHEDMSG_STALE_AFTER_SECS);

        Self {
            poll_interval_ms,
            stale_after_secs,
            enabled,
        }
    }

    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_stale_after(mut self, secs: u64) -> Self {
        self.stale_after_secs = secs;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Event emitted by the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    WorkerStarted,
    WorkerStopped,
    /// A due message was moved to `processing`.
    MessageLeased {
        scheduled_message_id: i64,
        kind: ScheduledPayloadKind,
    },
    /// The message was delivered, or skipped as undeliverable.
    MessageSent {
        scheduled_message_id: i64,
        kind: ScheduledPayloadKind,
    },
    /// Delivery failed and the message is queued again.
    MessageRescheduled {
        scheduled_message_id: i64,
        kind: ScheduledPayloadKind,
        error: String,
    },
    /// Abandoned leases were returned to the queue.
    StaleRequeued { count: u64 },
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<WorkerEvent>,
}

impl WorkerHandle {
    /// Signal the worker to stop after any in-flight delivery.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| careline_core::Error::Internal("Failed to send shutdown signal".into()))?;
        Ok(())
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }
}

/// Single-lease delivery loop over the scheduled-message queue.
pub struct ScheduledMessageWorker {
    store: Store,
    config: WorkerConfig,
    deliverers: RwLock<HashMap<ScheduledPayloadKind, Arc<dyn Deliverer>>>,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl ScheduledMessageWorker {
    pub fn new(store: Store, config: WorkerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(defaults::WORKER_EVENT_CAPACITY);
        Self {
            store,
            config,
            deliverers: RwLock::new(HashMap::new()),
            event_tx,
        }
    }

    /// Register a deliverer for its payload kind, replacing any earlier one.
    pub async fn register_deliverer<D: Deliverer + 'static>(&self, deliverer: D) {
        let kind = deliverer.kind();
        self.deliverers.write().await.insert(kind, Arc::new(deliverer));
        debug!(kind = kind.as_str(), "Registered scheduled message deliverer");
    }

    /// Payload kinds this worker will lease.
    pub async fn known_kinds(&self) -> Vec<ScheduledPayloadKind> {
        self.deliverers.read().await.keys().copied().collect()
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    /// Start the worker and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();

        tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });

        WorkerHandle {
            shutdown_tx,
            event_rx,
        }
    }

    #[instrument(skip(self, shutdown_rx))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!("Scheduled message worker is disabled, not starting");
            return;
        }

        let kinds = self.known_kinds().await;
        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            stale_after_secs = self.config.stale_after_secs,
            kinds = ?kinds,
            "Scheduled message worker started"
        );
        let _ = self.event_tx.send(WorkerEvent::WorkerStarted);

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        loop {
            if shutdown_rx.try_recv().is_ok() {
                info!("Scheduled message worker received shutdown signal");
                break;
            }

            let delivered = match self.consume_once().await {
                Ok(delivered) => delivered,
                Err(e) => {
                    debug!(error = %e, "Scheduled message pass failed");
                    false
                }
            };
            if delivered {
                continue;
            }

            if let Err(e) = self.requeue_stale().await {
                error!(error = %e, "Failed to requeue stale scheduled messages");
            }

            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Scheduled message worker received shutdown signal");
                    break;
                }
                _ = sleep(poll_interval) => {}
            }
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped);
        info!("Scheduled message worker stopped");
    }

    /// Lease and deliver at most one due message.
    ///
    /// Returns `false` when nothing was due. Delivery failures are recorded
    /// on the row, not returned.
    pub async fn consume_once(&self) -> Result<bool> {
        let kinds = self.known_kinds().await;
        let leased = match self.store.scheduled_messages.lease_next(&kinds).await {
            Ok(leased) => leased,
            Err(e) => {
                error!(error = %e, "Failed to lease scheduled message");
                return Err(e);
            }
        };
        let Some(msg) = leased else {
            return Ok(false);
        };

        let start = Instant::now();
        let kind = msg.payload.kind();
        let scheduled_message_id = msg.id;
        let _ = self.event_tx.send(WorkerEvent::MessageLeased {
            scheduled_message_id,
            kind,
        });
        debug!(
            scheduled_message_id,
            kind = kind.as_str(),
            event = %msg.event,
            "Leased scheduled message"
        );

        let deliverer = self.deliverers.read().await.get(&kind).cloned();
        let outcome = match deliverer {
            Some(deliverer) => DeliveryOutcome::from_result(deliverer.deliver(&msg).await),
            None => DeliveryOutcome::Retry(format!("no deliverer for {}", kind.as_str())),
        };

        if let Err(e) = self
            .store
            .scheduled_messages
            .update_status(scheduled_message_id, outcome.status(), outcome.error())
            .await
        {
            error!(
                scheduled_message_id,
                kind = kind.as_str(),
                status = outcome.status().as_str(),
                error = %e,
                "Failed to record scheduled message delivery status"
            );
            return Err(e);
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        match outcome {
            DeliveryOutcome::Sent => {
                info!(scheduled_message_id, kind = kind.as_str(), duration_ms, "Scheduled message sent");
                let _ = self.event_tx.send(WorkerEvent::MessageSent {
                    scheduled_message_id,
                    kind,
                });
            }
            DeliveryOutcome::Skipped(reason) => {
                warn!(
                    scheduled_message_id,
                    kind = kind.as_str(),
                    %reason,
                    duration_ms,
                    "Scheduled message undeliverable, marked sent"
                );
                let _ = self.event_tx.send(WorkerEvent::MessageSent {
                    scheduled_message_id,
                    kind,
                });
            }
            DeliveryOutcome::Retry(error) => {
                warn!(
                    scheduled_message_id,
                    kind = kind.as_str(),
                    %error,
                    duration_ms,
                    "Scheduled message delivery failed, rescheduled"
                );
                let _ = self.event_tx.send(WorkerEvent::MessageRescheduled {
                    scheduled_message_id,
                    kind,
                    error,
                });
            }
        }
        Ok(true)
    }

    /// Return leases older than the stale threshold to the queue.
    pub async fn requeue_stale(&self) -> Result<u64> {
        let cutoff = Utc::now() - chrono::Duration::seconds(self.config.stale_after_secs as i64);
        let count = self.store.scheduled_messages.requeue_stale(cutoff).await?;
        if count > 0 {
            warn!(count, "Requeued stale scheduled messages");
            let _ = self.event_tx.send(WorkerEvent::StaleRequeued { count });
        }
        Ok(count)
    }
}

/// Builder for creating a worker with deliverers.
pub struct WorkerBuilder {
    store: Store,
    config: WorkerConfig,
    deliverers: Vec<Box<dyn Deliverer>>,
}

impl WorkerBuilder {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            config: WorkerConfig::default(),
            deliverers: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_deliverer<D: Deliverer + 'static>(mut self, deliverer: D) -> Self {
        self.deliverers.push(Box::new(deliverer));
        self
    }

    /// Register the case-message and treatment-plan deliverers, plus email
    /// when a service is configured.
    pub fn with_standard_deliverers(
        self,
        composer: Arc<MessageComposer>,
        email: Option<Arc<dyn EmailService>>,
    ) -> Self {
        let store = self.store.clone();
        let builder = self
            .with_deliverer(CaseMessageDeliverer::new(store.clone(), composer.clone()))
            .with_deliverer(TreatmentPlanMessageDeliverer::new(store, composer));
        match email {
            Some(service) => builder.with_deliverer(EmailDeliverer::new(service)),
            None => builder,
        }
    }

    /// Build and return the worker.
    pub async fn build(self) -> ScheduledMessageWorker {
        let worker = ScheduledMessageWorker::new(self.store, self.config);
        {
            let mut deliverers = worker.deliverers.write().await;
            for deliverer in self.deliverers {
                deliverers.insert(deliverer.kind(), Arc::from(deliverer));
            }
        }
        worker
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_config_default() {
        let config = WorkerConfig::default();
        assert_eq!(config.poll_interval_ms, 20_000);
        assert_eq!(config.stale_after_secs, 600);
        assert!(config.enabled);
    }

    #[test]
    fn test_worker_config_builder() {
        let config = WorkerConfig::default()
            .with_poll_interval(50)
            .with_stale_after(5)
            .with_enabled(false);

        assert_eq!(config.poll_interval_ms, 50);
        assert_eq!(config.stale_after_secs, 5);
        assert!(!config.enabled);
    }

    #[test]
    fn test_worker_event_equality() {
        let a = WorkerEvent::MessageSent {
            scheduled_message_id: 1,
            kind: ScheduledPayloadKind::Email,
        };
        assert_eq!(a.clone(), a);
        assert_ne!(a, WorkerEvent::WorkerStarted);
    }
}
