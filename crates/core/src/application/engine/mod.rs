// Queue engine: owns every queue, the dead-letter store and the dispatchers

mod dead_letter;
mod queue_state;
mod shared;

pub use dead_letter::DeadLetterStore;
pub use queue_state::QueueState;
pub(crate) use shared::{invoke_handler, EngineCore};

use crate::application::batch;
use crate::application::dispatcher::constants::{
    DEFAULT_DEAD_LETTER_CAPACITY, DEFAULT_DELIVERY_TIMEOUT, DEFAULT_SHUTDOWN_DRAIN_TIMEOUT,
    EVENT_BUFFER_SIZE,
};
use crate::application::dispatcher::{shutdown_channel, Dispatcher, ShutdownSender};
use crate::application::events::QueueEvent;
use crate::application::recovery::RecoveryService;
use crate::domain::{
    BatchDeliveryResult, Channel, DeadLetterItem, ItemId, Notification, QueueConfig, QueueItem,
    QueueMetrics, QueueName,
};
use crate::error::{AppError, Result};
use crate::port::{DeliveryHandler, IdProvider, QueueRepository, TimeProvider};
use futures::future::join_all;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Engine-wide settings (per-queue settings live in `QueueConfig`)
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub dead_letter_capacity: usize,
    pub delivery_timeout: Duration,
    pub shutdown_drain_timeout: Duration,
    pub event_buffer: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            dead_letter_capacity: DEFAULT_DEAD_LETTER_CAPACITY,
            delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
            shutdown_drain_timeout: DEFAULT_SHUTDOWN_DRAIN_TIMEOUT,
            event_buffer: EVENT_BUFFER_SIZE,
        }
    }
}

/// Options for `QueueEngine::enqueue`
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    /// Overrides the priority class weight
    pub priority: Option<i32>,
    /// Not eligible before now + delay
    pub delay_ms: Option<i64>,
    /// Return the existing item id if the notification is already queued
    pub deduplicate: bool,
}

struct DispatcherHandle {
    shutdown: ShutdownSender,
    task: JoinHandle<()>,
}

/// The notification queueing engine
///
/// Constructed once by the host and shared by handle. All queue mutation
/// goes through the owning queue's mutex.
pub struct QueueEngine {
    core: Arc<EngineCore>,
    dispatchers: Mutex<HashMap<QueueName, DispatcherHandle>>,
    initialized: Mutex<bool>,
    running: AtomicBool,
}

impl QueueEngine {
    pub fn new(
        repo: Arc<dyn QueueRepository>,
        time_provider: Arc<dyn TimeProvider>,
        id_provider: Arc<dyn IdProvider>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            core: Arc::new(EngineCore::new(repo, time_provider, id_provider, settings)),
            dispatchers: Mutex::new(HashMap::new()),
            initialized: Mutex::new(false),
            running: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.core.settings
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    pub async fn register_handler(&self, channel: Channel, handler: Arc<dyn DeliveryHandler>) {
        self.core.handlers.register(channel, handler).await;
    }

    /// Load configs (creating defaults), dead letters and live items.
    /// Runs once; later calls are no-ops.
    pub async fn initialize(&self) -> Result<()> {
        let mut initialized = self.initialized.lock().await;
        if *initialized {
            return Ok(());
        }

        let mut configs: BTreeMap<QueueName, QueueConfig> = self
            .core
            .repo
            .load_configs()
            .await?
            .into_iter()
            .filter(|c| match c.validate() {
                Ok(()) => true,
                Err(e) => {
                    warn!(queue = %c.name, error = %e, "Ignoring invalid persisted queue config");
                    false
                }
            })
            .map(|c| (c.name.clone(), c))
            .collect();
        let persisted = configs.len();
        for default in QueueConfig::defaults() {
            if !configs.contains_key(&default.name) {
                self.core.repo.save_config(&default).await?;
                configs.insert(default.name.clone(), default);
            }
        }

        // Dead letters first so recovered ones land after them
        let dead_letters = self.core.repo.load_dead_letter_items().await?;
        let loaded_dead_letters = dead_letters.len();
        {
            let mut store = self.core.dead_letters.lock().await;
            for dead in dead_letters {
                store.push(dead);
            }
        }

        let recovery = RecoveryService::new(
            Arc::clone(&self.core.repo),
            Arc::clone(&self.core.time),
            self.core.settings.dead_letter_capacity,
        );
        let mut live_items = 0;
        for config in configs.into_values() {
            let shared = self.core.queue_or_insert(&config).await;
            let mut state = shared.lock().await;
            let report = recovery.recover_queue(state.config()).await?;

            live_items += report.live.len();
            for mut item in report.live {
                item.sequence = self.core.next_sequence();
                state.insert(item);
            }
            if !report.dead_lettered.is_empty() {
                let mut store = self.core.dead_letters.lock().await;
                for dead in report.dead_lettered {
                    store.push(dead);
                }
            }
        }

        *initialized = true;
        info!(
            persisted_configs = persisted,
            live_items,
            dead_letters = loaded_dead_letters,
            "Queue engine initialized"
        );
        Ok(())
    }

    /// Initialize if needed and spawn one dispatcher per queue
    pub async fn start(&self) -> Result<()> {
        self.initialize().await?;

        let mut dispatchers = self.dispatchers.lock().await;
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        for config in self.list_queues().await {
            self.spawn_dispatcher(&mut dispatchers, &config);
        }
        info!(dispatchers = dispatchers.len(), "Queue engine started");
        Ok(())
    }

    /// Signal every dispatcher, then wait for each to drain and stop
    pub async fn shutdown(&self) {
        let handles: Vec<(QueueName, DispatcherHandle)> = {
            let mut dispatchers = self.dispatchers.lock().await;
            self.running.store(false, Ordering::SeqCst);
            dispatchers.drain().collect()
        };
        if handles.is_empty() {
            return;
        }

        info!(dispatchers = handles.len(), "Shutting down queue engine");
        for (_, handle) in &handles {
            handle.shutdown.shutdown();
        }
        for (queue, handle) in handles {
            if let Err(e) = handle.task.await {
                error!(queue = %queue, error = %e, "Dispatcher task failed during shutdown");
            }
        }
        info!("Queue engine stopped");
    }

    fn spawn_dispatcher(
        &self,
        dispatchers: &mut HashMap<QueueName, DispatcherHandle>,
        config: &QueueConfig,
    ) {
        let (shutdown, token) = shutdown_channel();
        let dispatcher = Dispatcher::new(
            Arc::clone(&self.core),
            config.name.clone(),
            Duration::from_millis(config.tick_interval_ms()),
        );
        let task = tokio::spawn(dispatcher.run(token));
        dispatchers.insert(config.name.clone(), DispatcherHandle { shutdown, task });
    }

    /// Spawn a dispatcher for a queue whose previous one was stopped,
    /// unless the engine shut down or another call already replaced it
    async fn respawn_dispatcher(&self, queue_name: &str) -> Result<()> {
        let config = self.queue_config(queue_name).await?;
        let mut dispatchers = self.dispatchers.lock().await;
        if self.is_running() && !dispatchers.contains_key(queue_name) {
            self.spawn_dispatcher(&mut dispatchers, &config);
        }
        Ok(())
    }

    async fn stop_dispatcher(queue: &str, handle: DispatcherHandle) {
        handle.shutdown.shutdown();
        if let Err(e) = handle.task.await {
            error!(queue = %queue, error = %e, "Dispatcher task failed while stopping");
        }
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    /// Validate, persist and apply a queue config, restarting its dispatcher.
    ///
    /// Waiting items whose attempts exceed a lowered `retry_attempts` are
    /// dead-lettered immediately.
    pub async fn configure_queue(&self, config: QueueConfig) -> Result<()> {
        config.validate()?;
        self.core.repo.save_config(&config).await?;

        let shared = self.core.queue_or_insert(&config).await;
        let expired = {
            let mut state = shared.lock().await;
            state.config = config.clone();
            self.core.expire_exhausted(&config.name, &mut state).await
        };

        if self.is_running() {
            let previous = self.dispatchers.lock().await.remove(&config.name);
            if let Some(handle) = previous {
                Self::stop_dispatcher(&config.name, handle).await;
            }
            self.respawn_dispatcher(&config.name).await?;
        }

        info!(
            queue = %config.name,
            max_size = config.max_size,
            rate = config.processing_rate_per_second,
            batch_size = config.batch_size,
            retry_attempts = config.retry_attempts,
            expired,
            "Queue configured"
        );
        Ok(())
    }

    /// Configs of every queue, sorted by name
    pub async fn list_queues(&self) -> Vec<QueueConfig> {
        let shared: Vec<_> = self.core.queues.read().await.values().cloned().collect();
        let mut configs = Vec::with_capacity(shared.len());
        for queue in shared {
            configs.push(queue.lock().await.config().clone());
        }
        configs.sort_by(|a, b| a.name.cmp(&b.name));
        configs
    }

    pub async fn queue_config(&self, name: &str) -> Result<QueueConfig> {
        let shared = self.core.queue(name).await?;
        let config = shared.lock().await.config().clone();
        Ok(config)
    }

    // ========================================================================
    // Enqueue / delivery
    // ========================================================================

    /// Add a notification to its `{channel}_{priority}` queue, returning the item id
    pub async fn enqueue(&self, notification: Notification, options: EnqueueOptions) -> Result<ItemId> {
        if notification.id.trim().is_empty() {
            return Err(AppError::Validation("notification id must not be empty".into()));
        }
        if matches!(options.delay_ms, Some(delay) if delay < 0) {
            return Err(AppError::Validation("delay must not be negative".into()));
        }

        let queue_name = notification.queue_name();
        let shared = self.core.queue(&queue_name).await?;
        let mut state = shared.lock().await;

        if options.deduplicate {
            if let Some(existing) = state.find_by_notification(&notification.id) {
                debug!(
                    queue = %queue_name,
                    item_id = %existing.id,
                    notification_id = %notification.id,
                    "Duplicate enqueue, returning existing item"
                );
                return Ok(existing.id.clone());
            }
        }

        if state.is_full() {
            warn!(queue = %queue_name, max_size = state.config().max_size, "Queue full, enqueue rejected");
            return Err(AppError::QueueFull {
                queue: queue_name,
                max_size: state.config().max_size,
            });
        }

        let now = self.core.time.now_millis();
        let priority = options
            .priority
            .unwrap_or_else(|| notification.priority.weight());
        let mut item = QueueItem::new(self.core.ids.generate_id(), notification, priority, now);
        item.sequence = self.core.next_sequence();
        item.next_eligible_at = options.delay_ms.map(|delay| now.saturating_add(delay));

        self.core.repo.save_queue_item(&queue_name, &item).await?;

        let item_id = item.id.clone();
        let notification_id = item.notification.id.clone();
        state.insert(item);
        state.metrics_mut().record_enqueued();

        info!(
            queue = %queue_name,
            item_id = %item_id,
            notification_id = %notification_id,
            priority,
            size = state.len(),
            "Item enqueued"
        );
        self.core.events.publish(QueueEvent::ItemEnqueued {
            queue: queue_name,
            item_id: item_id.clone(),
            notification_id,
        });
        Ok(item_id)
    }

    /// Run one dispatcher tick inline and wait for its deliveries.
    /// Returns the number of items dispatched.
    pub async fn dispatch_once(&self, queue_name: &str) -> Result<usize> {
        let batch = self.core.select_batch(queue_name).await?;
        let count = batch.len();
        join_all(
            batch
                .into_iter()
                .map(|item| self.core.deliver(queue_name, item)),
        )
        .await;
        Ok(count)
    }

    /// Make a live item eligible now. `false` if absent or in flight.
    pub async fn retry_notification(&self, item_id: &str, queue_name: &str) -> Result<bool> {
        let shared = self.core.queue(queue_name).await?;
        let mut state = shared.lock().await;
        if state.is_in_flight(item_id) {
            return Ok(false);
        }
        let Some(item) = state.get_mut(item_id) else {
            return Ok(false);
        };

        item.next_eligible_at = None;
        let snapshot = item.clone();
        self.core.repo.save_queue_item(queue_name, &snapshot).await?;
        info!(queue = %queue_name, item_id, "Item made eligible for immediate retry");
        Ok(true)
    }

    /// Deliver a batch directly, without queueing or retries
    pub async fn process_batch(
        &self,
        channel: Channel,
        notifications: Vec<Notification>,
    ) -> Result<BatchDeliveryResult> {
        batch::process_batch(&self.core, channel, notifications).await
    }

    // ========================================================================
    // Metrics / maintenance
    // ========================================================================

    pub async fn queue_metrics(&self, queue_name: &str) -> Result<QueueMetrics> {
        let shared = self.core.queue(queue_name).await?;
        let metrics = shared.lock().await.metrics();
        Ok(metrics)
    }

    /// Metrics of every queue, sorted by name
    pub async fn all_queue_metrics(&self) -> Vec<QueueMetrics> {
        let shared: Vec<_> = self.core.queues.read().await.values().cloned().collect();
        let mut metrics = Vec::with_capacity(shared.len());
        for queue in shared {
            metrics.push(queue.lock().await.metrics());
        }
        metrics.sort_by(|a, b| a.queue.cmp(&b.queue));
        metrics
    }

    /// Empty a live queue, returning the number of items removed.
    ///
    /// Fails with `QueueBusy` while deliveries are in flight unless `force`.
    /// The queue's dispatcher is stopped for the duration of the clear, and
    /// stopping it drains its in-flight deliveries (bounded by the shutdown
    /// drain timeout), so with `force` those settle before the items are
    /// removed. Deliveries still running after that have their outcome dropped.
    pub async fn clear_queue(&self, queue_name: &str, force: bool) -> Result<usize> {
        let shared = self.core.queue(queue_name).await?;
        {
            let state = shared.lock().await;
            let in_flight = state.in_flight_count();
            if in_flight > 0 && !force {
                return Err(AppError::QueueBusy {
                    queue: queue_name.to_string(),
                    in_flight,
                });
            }
        }

        let previous = self.dispatchers.lock().await.remove(queue_name);
        let stopped = previous.is_some();
        if let Some(handle) = previous {
            Self::stop_dispatcher(queue_name, handle).await;
        }

        let removed = shared.lock().await.clear();
        let persisted = self.core.repo.clear_queue_items(queue_name).await;

        if stopped {
            self.respawn_dispatcher(queue_name).await?;
        }
        persisted?;

        info!(queue = %queue_name, removed, force, "Queue cleared");
        Ok(removed)
    }

    // ========================================================================
    // Dead letters
    // ========================================================================

    /// Most recent dead letters first
    pub async fn dead_letter_queue(&self, limit: usize) -> Vec<DeadLetterItem> {
        self.core.dead_letters.lock().await.recent(limit)
    }

    pub async fn dead_letter_count(&self) -> usize {
        self.core.dead_letters.lock().await.len()
    }

    /// Move a dead letter back into its live queue with a fresh attempt count
    pub async fn reprocess_dlq_item(&self, item_id: &str) -> Result<bool> {
        let not_found = || AppError::NotFound(format!("dead-letter item {}", item_id));

        let queue_name = self
            .core
            .dead_letters
            .lock()
            .await
            .get(item_id)
            .map(|d| d.item.notification.queue_name())
            .ok_or_else(not_found)?;

        let shared = self.core.queue(&queue_name).await?;
        let mut state = shared.lock().await;
        if state.is_full() {
            return Err(AppError::QueueFull {
                queue: queue_name,
                max_size: state.config().max_size,
            });
        }

        let dead = self
            .core
            .dead_letters
            .lock()
            .await
            .remove(item_id)
            .ok_or_else(not_found)?;

        let mut item = dead.item.clone();
        item.reset_for_reprocess();
        item.added_at = self.core.time.now_millis();
        item.sequence = self.core.next_sequence();

        if let Err(e) = self.core.repo.save_queue_item(&queue_name, &item).await {
            self.core.dead_letters.lock().await.push(dead);
            return Err(e);
        }
        if let Err(e) = self.core.repo.remove_dead_letter_item(&item.id).await {
            error!(item_id = %item.id, error = %e, "Failed to remove persisted dead letter");
        }

        let notification_id = item.notification.id.clone();
        state.insert(item);
        state.metrics_mut().record_enqueued();

        info!(
            queue = %queue_name,
            item_id,
            previous_attempts = dead.item.attempts,
            "Dead letter reprocessed"
        );
        self.core.events.publish(QueueEvent::ItemEnqueued {
            queue: queue_name,
            item_id: item_id.to_string(),
            notification_id,
        });
        Ok(true)
    }

    /// Drop every dead letter, returning the count removed
    pub async fn purge_dead_letters(&self) -> Result<usize> {
        let removed = self.core.dead_letters.lock().await.clear();
        self.core.repo.purge_dead_letter_items().await?;
        warn!(removed, "Dead-letter queue purged");
        Ok(removed)
    }

    // ========================================================================
    // Events
    // ========================================================================

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.core.events.subscribe()
    }
}
