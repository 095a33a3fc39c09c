// Shared engine state and the per-item delivery path
//
// Lock order: a queue's mutex before the dead-letter mutex, never the reverse.

use super::dead_letter::DeadLetterStore;
use super::queue_state::QueueState;
use super::EngineSettings;
use crate::application::dispatcher::constants::{HANDLER_PANIC_CODE, NO_HANDLER_CODE};
use crate::application::events::{EventBus, QueueEvent};
use crate::application::registry::HandlerRegistry;
use crate::application::retry::{RetryDecision, RetryPolicy};
use crate::domain::{DeadLetterItem, ItemState, Notification, QueueConfig, QueueItem, QueueName};
use crate::error::{AppError, Result};
use crate::port::{DeliveryError, DeliveryHandler, IdProvider, QueueRepository, TimeProvider};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

pub(crate) type SharedQueue = Arc<Mutex<QueueState>>;

pub(crate) struct EngineCore {
    pub(crate) queues: RwLock<HashMap<QueueName, SharedQueue>>,
    pub(crate) dead_letters: Mutex<DeadLetterStore>,
    pub(crate) handlers: HandlerRegistry,
    pub(crate) repo: Arc<dyn QueueRepository>,
    pub(crate) time: Arc<dyn TimeProvider>,
    pub(crate) ids: Arc<dyn IdProvider>,
    pub(crate) events: EventBus,
    pub(crate) retry: RetryPolicy,
    pub(crate) settings: EngineSettings,
    sequence: AtomicU64,
}

impl EngineCore {
    pub(crate) fn new(
        repo: Arc<dyn QueueRepository>,
        time: Arc<dyn TimeProvider>,
        ids: Arc<dyn IdProvider>,
        settings: EngineSettings,
    ) -> Self {
        // Storage trims to the same capacity as the in-memory store
        let settings = EngineSettings {
            dead_letter_capacity: settings.dead_letter_capacity.max(1),
            ..settings
        };
        Self {
            queues: RwLock::new(HashMap::new()),
            dead_letters: Mutex::new(DeadLetterStore::new(settings.dead_letter_capacity)),
            handlers: HandlerRegistry::new(),
            repo,
            time,
            ids,
            events: EventBus::new(settings.event_buffer),
            retry: RetryPolicy::new(),
            settings,
            sequence: AtomicU64::new(0),
        }
    }

    pub(crate) async fn queue(&self, name: &str) -> Result<SharedQueue> {
        self.queues
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::QueueNotFound(name.to_string()))
    }

    /// Get or create the live state for a config's queue
    pub(crate) async fn queue_or_insert(&self, config: &QueueConfig) -> SharedQueue {
        let mut queues = self.queues.write().await;
        Arc::clone(
            queues
                .entry(config.name.clone())
                .or_insert_with(|| Arc::new(Mutex::new(QueueState::new(config.clone())))),
        )
    }

    /// Monotonic tie-breaker for items added in the same millisecond
    pub(crate) fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// One dispatcher tick's selection: eligible items move to Processing
    /// and into the in-flight set atomically under the queue mutex.
    pub(crate) async fn select_batch(&self, queue_name: &str) -> Result<Vec<QueueItem>> {
        let shared = self.queue(queue_name).await?;
        let mut state = shared.lock().await;
        if state.is_empty() {
            return Ok(Vec::new());
        }

        let batch = state.take_batch(self.time.now_millis());
        for item in &batch {
            self.persist(queue_name, item).await;
        }
        if !batch.is_empty() {
            debug!(
                queue = %queue_name,
                selected = batch.len(),
                in_flight = state.in_flight_count(),
                "Selected items for delivery"
            );
        }
        Ok(batch)
    }

    /// Invoke the channel's handler once, then settle the outcome
    pub(crate) async fn deliver(&self, queue_name: &str, item: QueueItem) {
        let outcome = match self.handlers.get(item.notification.channel()).await {
            Some(handler) => {
                invoke_handler(
                    handler,
                    item.notification.clone(),
                    self.settings.delivery_timeout,
                )
                .await
            }
            None => Err(DeliveryError::new(
                NO_HANDLER_CODE,
                format!(
                    "no delivery handler registered for channel {}",
                    item.notification.channel()
                ),
            )),
        };

        if let Err(e) = self.settle(queue_name, &item.id, outcome).await {
            error!(
                queue = %queue_name,
                item_id = %item.id,
                error = %e,
                "Failed to settle delivery outcome"
            );
        }
    }

    async fn settle(
        &self,
        queue_name: &str,
        item_id: &str,
        outcome: std::result::Result<(), DeliveryError>,
    ) -> Result<()> {
        let shared = self.queue(queue_name).await?;
        let mut state = shared.lock().await;
        state.release(item_id);
        let now = self.time.now_millis();

        match outcome {
            Ok(()) => {
                let Some(mut item) = state.remove(item_id) else {
                    warn!(queue = %queue_name, item_id, "Delivered item was cleared while in flight");
                    return Ok(());
                };
                item.complete(now)?;
                state.metrics_mut().record_processed(now);
                self.delete(queue_name, &item.id).await;

                info!(
                    queue = %queue_name,
                    item_id = %item.id,
                    notification_id = %item.notification.id,
                    "Notification delivered"
                );
                self.events.publish(QueueEvent::NotificationDelivered {
                    queue: queue_name.to_string(),
                    item_id: item.id,
                    notification_id: item.notification.id,
                    attempts: item.attempts,
                });
            }
            Err(error) => {
                let config = state.config().clone();
                let Some(item) = state.get_mut(item_id) else {
                    warn!(
                        queue = %queue_name,
                        item_id,
                        code = %error.code,
                        "Failed item was cleared while in flight"
                    );
                    return Ok(());
                };

                match self.retry.apply(item, &error, &config, now) {
                    RetryDecision::Retry { delay_ms } => {
                        let eligible_at = now.saturating_add(delay_ms);
                        item.schedule_retry(now, eligible_at)?;
                        let snapshot = item.clone();
                        state.metrics_mut().record_retry();
                        self.persist(queue_name, &snapshot).await;

                        self.events.publish(QueueEvent::RetryScheduled {
                            queue: queue_name.to_string(),
                            item_id: snapshot.id,
                            attempt: snapshot.attempts,
                            next_eligible_at: eligible_at,
                        });
                    }
                    RetryDecision::DeadLetter => {
                        let Some(mut item) = state.remove(item_id) else {
                            return Ok(());
                        };
                        item.dead_letter(now)?;
                        state.metrics_mut().record_failed(now);
                        self.dead_letter_or_discard(queue_name, &config, item, now)
                            .await;
                    }
                }
            }
        }
        Ok(())
    }

    /// Dead-letter (or discard) waiting items already past the queue's retry
    /// budget, e.g. after `retry_attempts` was lowered. In-flight items are
    /// settled against the new budget when their delivery finishes.
    /// Caller holds the queue lock.
    pub(crate) async fn expire_exhausted(&self, queue_name: &str, state: &mut QueueState) -> usize {
        let exhausted = state.exhausted_ids();
        if exhausted.is_empty() {
            return 0;
        }

        let now = self.time.now_millis();
        let config = state.config().clone();
        for item_id in &exhausted {
            let Some(mut item) = state.remove(item_id) else {
                continue;
            };
            item.state = ItemState::DeadLettered;
            item.completed_at = Some(now);
            self.dead_letter_or_discard(queue_name, &config, item, now)
                .await;
        }
        info!(
            queue = %queue_name,
            expired = exhausted.len(),
            retry_attempts = config.retry_attempts,
            "Expired items past the retry budget"
        );
        exhausted.len()
    }

    /// Move an exhausted item into the dead-letter store, or drop it when
    /// dead-lettering is disabled for its queue. Caller holds the queue lock.
    async fn dead_letter_or_discard(
        &self,
        queue_name: &str,
        config: &QueueConfig,
        item: QueueItem,
        now: i64,
    ) {
        let item_id = item.id.clone();
        let notification_id = item.notification.id.clone();

        if !config.dead_letter_enabled {
            self.delete(queue_name, &item_id).await;
            warn!(queue = %queue_name, item_id = %item_id, "Retries exhausted, item discarded");
            self.events.publish(QueueEvent::ItemDiscarded {
                queue: queue_name.to_string(),
                item_id,
                notification_id,
            });
            return;
        }

        let dead = DeadLetterItem {
            item,
            queue: queue_name.to_string(),
            dead_lettered_at: now,
        };
        let error_code = dead.last_error_code().unwrap_or_default().to_string();

        self.dead_letters.lock().await.push(dead.clone());
        // Append before delete: a crash in between leaves a duplicate, never a loss
        if let Err(e) = self
            .repo
            .append_dead_letter_item(&dead, self.settings.dead_letter_capacity)
            .await
        {
            error!(item_id = %item_id, error = %e, "Failed to persist dead letter");
        }
        self.delete(queue_name, &item_id).await;

        warn!(
            queue = %queue_name,
            item_id = %item_id,
            attempts = dead.item.attempts,
            code = %error_code,
            "Item moved to dead-letter queue"
        );
        self.events.publish(QueueEvent::ItemMovedToDlq {
            queue: queue_name.to_string(),
            item_id,
            notification_id,
            error_code,
        });
    }

    /// Mirror an item to storage. Failures are logged: the in-memory view
    /// stays authoritative for the running process.
    pub(crate) async fn persist(&self, queue_name: &str, item: &QueueItem) {
        if let Err(e) = self.repo.save_queue_item(queue_name, item).await {
            error!(queue = %queue_name, item_id = %item.id, error = %e, "Failed to persist item");
        }
    }

    async fn delete(&self, queue_name: &str, item_id: &String) {
        if let Err(e) = self.repo.delete_queue_item(queue_name, item_id).await {
            error!(queue = %queue_name, item_id = %item_id, error = %e, "Failed to delete item");
        }
    }
}

/// Run one handler invocation on its own task, bounded by `timeout`.
///
/// A panic inside the handler surfaces as a retryable `HANDLER_PANIC` error
/// and an expired timeout as a retryable `TIMEOUT`; neither escapes.
pub(crate) async fn invoke_handler(
    handler: Arc<dyn DeliveryHandler>,
    notification: Notification,
    timeout: Duration,
) -> std::result::Result<(), DeliveryError> {
    let notification_id = notification.id.clone();
    let mut handle = tokio::spawn(async move { handler.deliver(&notification).await });

    match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) if join_err.is_panic() => {
            let payload = join_err.into_panic();
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "delivery handler panicked".to_string());
            error!(notification_id = %notification_id, panic = %message, "Delivery handler panicked");
            Err(DeliveryError::new(HANDLER_PANIC_CODE, message))
        }
        Ok(Err(join_err)) => Err(DeliveryError::uncoded(format!(
            "delivery task cancelled: {}",
            join_err
        ))),
        Err(_) => {
            handle.abort();
            let after_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
            warn!(notification_id = %notification_id, timeout_ms = after_ms, "Delivery timed out");
            Err(DeliveryError::timeout(after_ms))
        }
    }
}
