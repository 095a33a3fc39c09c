//! RPC Method Handlers
//!
//! Thin translation between wire types and the queue engine. Mutating
//! methods are admitted through the rate limiter first.

use crate::error::{throttled, to_rpc_error};
use crate::rate_limiter::RateLimiter;
use crate::types::{
    ClearRequest, ClearResponse, ConfigureRequest, ConfigureResponse, DlqListRequest,
    DlqListResponse, DlqPurgeRequest, DlqPurgeResponse, DlqReprocessRequest,
    DlqReprocessResponse, EnqueueRequest, EnqueueResponse, ListQueuesRequest,
    ListQueuesResponse, MetricsRequest, MetricsResponse, ProcessBatchRequest,
    ProcessBatchResponse, RetryRequest, RetryResponse,
};
use jsonrpsee::types::ErrorObjectOwned;
use notiq_core::{EnqueueOptions, QueueEngine};
use std::sync::Arc;
use tracing::warn;

pub type RpcResult<T> = Result<T, ErrorObjectOwned>;

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    engine: Arc<QueueEngine>,
    rate_limiter: RateLimiter,
}

impl RpcHandler {
    pub fn new(engine: Arc<QueueEngine>, rate_limit_burst: u32, rate_limit_rate: u32) -> Self {
        Self {
            engine,
            rate_limiter: RateLimiter::new(rate_limit_burst, rate_limit_rate),
        }
    }

    fn admit(&self, method: &str) -> RpcResult<()> {
        if self.rate_limiter.try_acquire() {
            Ok(())
        } else {
            warn!(method, "Call rejected by rate limiter");
            Err(throttled())
        }
    }

    /// queue.enqueue.v1
    pub async fn enqueue(&self, params: EnqueueRequest) -> RpcResult<EnqueueResponse> {
        self.admit("queue.enqueue.v1")?;

        let queue = params.notification.queue_name();
        let options = EnqueueOptions {
            priority: params.priority,
            delay_ms: params.delay_ms,
            deduplicate: params.deduplicate,
        };
        let item_id = self
            .engine
            .enqueue(params.notification, options)
            .await
            .map_err(to_rpc_error)?;

        Ok(EnqueueResponse { item_id, queue })
    }

    /// queue.process_batch.v1
    pub async fn process_batch(
        &self,
        params: ProcessBatchRequest,
    ) -> RpcResult<ProcessBatchResponse> {
        self.admit("queue.process_batch.v1")?;

        self.engine
            .process_batch(params.channel, params.notifications)
            .await
            .map_err(to_rpc_error)
    }

    /// queue.retry.v1
    pub async fn retry(&self, params: RetryRequest) -> RpcResult<RetryResponse> {
        self.admit("queue.retry.v1")?;

        let retried = self
            .engine
            .retry_notification(&params.item_id, &params.queue)
            .await
            .map_err(to_rpc_error)?;

        Ok(RetryResponse {
            item_id: params.item_id,
            retried,
        })
    }

    /// queue.metrics.v1
    pub async fn metrics(&self, params: MetricsRequest) -> RpcResult<MetricsResponse> {
        let queues = match params.queue {
            Some(name) => vec![self.engine.queue_metrics(&name).await.map_err(to_rpc_error)?],
            None => self.engine.all_queue_metrics().await,
        };

        Ok(MetricsResponse {
            queues,
            dead_letter_count: self.engine.dead_letter_count().await,
        })
    }

    /// queue.clear.v1
    pub async fn clear(&self, params: ClearRequest) -> RpcResult<ClearResponse> {
        self.admit("queue.clear.v1")?;

        let removed = self
            .engine
            .clear_queue(&params.queue, params.force)
            .await
            .map_err(to_rpc_error)?;

        Ok(ClearResponse {
            queue: params.queue,
            removed,
        })
    }

    /// queue.configure.v1
    pub async fn configure(&self, params: ConfigureRequest) -> RpcResult<ConfigureResponse> {
        self.admit("queue.configure.v1")?;

        let name = params.config.name.clone();
        self.engine
            .configure_queue(params.config)
            .await
            .map_err(to_rpc_error)?;
        let config = self.engine.queue_config(&name).await.map_err(to_rpc_error)?;

        Ok(ConfigureResponse { config })
    }

    /// queue.list.v1
    pub async fn list_queues(&self, _params: ListQueuesRequest) -> RpcResult<ListQueuesResponse> {
        Ok(ListQueuesResponse {
            queues: self.engine.list_queues().await,
        })
    }

    /// dlq.list.v1
    pub async fn dlq_list(&self, params: DlqListRequest) -> RpcResult<DlqListResponse> {
        Ok(DlqListResponse {
            items: self.engine.dead_letter_queue(params.limit).await,
            total: self.engine.dead_letter_count().await,
        })
    }

    /// dlq.reprocess.v1
    pub async fn dlq_reprocess(
        &self,
        params: DlqReprocessRequest,
    ) -> RpcResult<DlqReprocessResponse> {
        self.admit("dlq.reprocess.v1")?;

        let reprocessed = self
            .engine
            .reprocess_dlq_item(&params.item_id)
            .await
            .map_err(to_rpc_error)?;

        Ok(DlqReprocessResponse {
            item_id: params.item_id,
            reprocessed,
        })
    }

    /// dlq.purge.v1
    pub async fn dlq_purge(&self, _params: DlqPurgeRequest) -> RpcResult<DlqPurgeResponse> {
        self.admit("dlq.purge.v1")?;

        let removed = self
            .engine
            .purge_dead_letters()
            .await
            .map_err(to_rpc_error)?;

        Ok(DlqPurgeResponse { removed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::code;
    use notiq_core::domain::{Channel, Notification, PriorityClass};
    use notiq_core::port::delivery_handler::mocks::ScriptedHandler;
    use notiq_core::port::id_provider::SequentialIdProvider;
    use notiq_core::port::time_provider::mocks::ManualTimeProvider;
    use notiq_core::port::InMemoryQueueRepository;
    use notiq_core::EngineSettings;

    async fn setup_handler(burst: u32) -> (RpcHandler, Arc<QueueEngine>) {
        let engine = Arc::new(QueueEngine::new(
            Arc::new(InMemoryQueueRepository::new()),
            Arc::new(ManualTimeProvider::new(1_700_000_000_000)),
            Arc::new(SequentialIdProvider::default()),
            EngineSettings::default(),
        ));
        engine
            .register_handler(Channel::Email, Arc::new(ScriptedHandler::new_fail("NETWORK")))
            .await;
        engine.initialize().await.unwrap();
        (RpcHandler::new(engine.clone(), burst, 1), engine)
    }

    fn enqueue_request(id: &str) -> EnqueueRequest {
        EnqueueRequest {
            notification: Notification::email_test(id, PriorityClass::High),
            priority: None,
            delay_ms: None,
            deduplicate: false,
        }
    }

    #[tokio::test]
    async fn test_enqueue_and_metrics() {
        let (handler, _) = setup_handler(100).await;

        let response = handler.enqueue(enqueue_request("n-1")).await.unwrap();
        assert_eq!(response.item_id, "item-1");
        assert_eq!(response.queue, "email_high");

        let metrics = handler
            .metrics(MetricsRequest {
                queue: Some("email_high".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(metrics.queues.len(), 1);
        assert_eq!(metrics.queues[0].size, 1);
        assert_eq!(metrics.dead_letter_count, 0);
    }

    #[tokio::test]
    async fn test_unknown_queue_maps_to_not_found() {
        let (handler, _) = setup_handler(100).await;

        let err = handler
            .metrics(MetricsRequest {
                queue: Some("fax_high".to_string()),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), code::NOT_FOUND);

        let err = handler
            .dlq_reprocess(DlqReprocessRequest {
                item_id: "missing".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), code::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_mutations_are_throttled() {
        let (handler, _) = setup_handler(2).await;

        handler.enqueue(enqueue_request("n-1")).await.unwrap();
        handler.enqueue(enqueue_request("n-2")).await.unwrap();
        let err = handler.enqueue(enqueue_request("n-3")).await.unwrap_err();
        assert_eq!(err.code(), code::THROTTLED);

        // Reads are never throttled
        let queues = handler.list_queues(ListQueuesRequest {}).await.unwrap();
        assert_eq!(queues.queues.len(), 20);
    }

    #[tokio::test]
    async fn test_clear_and_configure() {
        let (handler, engine) = setup_handler(100).await;
        handler.enqueue(enqueue_request("n-1")).await.unwrap();

        let cleared = handler
            .clear(ClearRequest {
                queue: "email_high".to_string(),
                force: false,
            })
            .await
            .unwrap();
        assert_eq!(cleared.removed, 1);

        let mut config = engine.queue_config("email_high").await.unwrap();
        config.max_size = 0;
        let err = handler
            .configure(ConfigureRequest { config })
            .await
            .unwrap_err();
        assert_eq!(err.code(), code::VALIDATION_ERROR);
    }

    #[tokio::test]
    async fn test_batch_reports_failures() {
        let (handler, _) = setup_handler(100).await;

        let result = handler
            .process_batch(ProcessBatchRequest {
                channel: Channel::Email,
                notifications: vec![
                    Notification::email_test("b-1", PriorityClass::Low),
                    Notification::email_test("b-2", PriorityClass::Low),
                ],
            })
            .await
            .unwrap();
        assert_eq!(result.total_items, 2);
        assert_eq!(result.failed, 2);
    }
}
