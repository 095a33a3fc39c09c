// Direct batch delivery (bypasses the live queues)

use crate::application::dispatcher::constants::BATCH_CONCURRENCY;
use crate::application::engine::{invoke_handler, EngineCore};
use crate::application::events::QueueEvent;
use crate::domain::{BatchDeliveryResult, Channel, DeliveryResult, Notification};
use crate::error::{AppError, Result};
use futures::future::join_all;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::info;

/// Deliver `notifications` synchronously in chunks of `BATCH_CONCURRENCY`.
///
/// Every notification gets exactly one attempt and one entry in `results`;
/// a failure never aborts the rest of the batch. No retry bookkeeping.
pub(crate) async fn process_batch(
    core: &EngineCore,
    channel: Channel,
    notifications: Vec<Notification>,
) -> Result<BatchDeliveryResult> {
    if let Some(mismatch) = notifications.iter().find(|n| n.channel() != channel) {
        return Err(AppError::Validation(format!(
            "notification {} is for channel {}, not {}",
            mismatch.id,
            mismatch.channel(),
            channel
        )));
    }

    let handler = core
        .handlers
        .get(channel)
        .await
        .ok_or_else(|| AppError::NotFound(format!("no delivery handler for channel {}", channel)))?;

    let batch_id = core.ids.generate_id();
    let started = Instant::now();
    let mut results = Vec::with_capacity(notifications.len());

    for chunk in notifications.chunks(BATCH_CONCURRENCY) {
        let outcomes = join_all(chunk.iter().map(|notification| {
            invoke_handler(
                Arc::clone(&handler),
                notification.clone(),
                core.settings.delivery_timeout,
            )
        }))
        .await;

        for (notification, outcome) in chunk.iter().zip(outcomes) {
            results.push(match outcome {
                Ok(()) => DeliveryResult::delivered(
                    notification.id.clone(),
                    channel,
                    core.time.now_millis(),
                ),
                Err(error) => DeliveryResult::failed(notification.id.clone(), channel, error),
            });
        }
    }

    let successful = results.iter().filter(|r| r.success).count();
    let result = BatchDeliveryResult {
        batch_id,
        total_items: results.len(),
        successful,
        failed: results.len() - successful,
        results,
        processing_time_ms: i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX),
    };

    info!(
        batch_id = %result.batch_id,
        channel = %channel,
        total = result.total_items,
        successful = result.successful,
        failed = result.failed,
        processing_time_ms = result.processing_time_ms,
        "Batch processed"
    );
    core.events.publish(QueueEvent::BatchProcessed {
        batch_id: result.batch_id.clone(),
        channel,
        total: result.total_items,
        successful: result.successful,
        failed: result.failed,
    });

    Ok(result)
}
