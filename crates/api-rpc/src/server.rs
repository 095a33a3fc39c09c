//! JSON-RPC Server
//!
//! Serves the engine over HTTP JSON-RPC 2.0 on a TCP address.

use crate::handler::RpcHandler;
use crate::types::{
    ClearRequest, ConfigureRequest, DlqListRequest, DlqPurgeRequest, DlqReprocessRequest,
    EnqueueRequest, ListQueuesRequest, MetricsRequest, ProcessBatchRequest, RetryRequest,
};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::types::{ErrorObjectOwned, Params};
use jsonrpsee::RpcModule;
use notiq_core::error::{AppError, Result};
use notiq_core::QueueEngine;
use serde::de::DeserializeOwned;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

const DEFAULT_RPC_HOST: &str = "127.0.0.1";
const DEFAULT_RPC_PORT: u16 = 9631;
const DEFAULT_RATE_LIMIT_BURST: u32 = 500;
const DEFAULT_RATE_LIMIT_RATE: u32 = 250;

/// RPC Server Configuration
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    pub host: String,
    pub port: u16,
    pub rate_limit_burst: u32,
    pub rate_limit_rate: u32,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
            rate_limit_burst: DEFAULT_RATE_LIMIT_BURST,
            rate_limit_rate: DEFAULT_RATE_LIMIT_RATE,
        }
    }
}

/// A started server: its bound address and the handle used to stop it
pub struct RunningServer {
    pub local_addr: SocketAddr,
    pub handle: ServerHandle,
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

/// Parameterless calls parse as an empty object
fn parse_params<T: DeserializeOwned>(params: Params<'static>) -> std::result::Result<T, ErrorObjectOwned> {
    if params.as_str().is_some() {
        return params.parse();
    }
    Params::new(Some("{}")).parse()
}

fn registration_error(method: &str, e: impl std::fmt::Display) -> AppError {
    AppError::Internal(format!("Failed to register {}: {}", method, e))
}

impl RpcServer {
    pub fn new(config: RpcServerConfig, engine: Arc<QueueEngine>) -> Self {
        let handler = Arc::new(RpcHandler::new(
            engine,
            config.rate_limit_burst,
            config.rate_limit_rate,
        ));
        Self { config, handler }
    }

    /// Bind and start serving. Port 0 picks a free port.
    pub async fn start(self) -> Result<RunningServer> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        let server = Server::builder()
            .build(&addr)
            .await
            .map_err(|e| AppError::Config(format!("Failed to bind RPC server on {}: {}", addr, e)))?;
        let local_addr = server
            .local_addr()
            .map_err(|e| AppError::Internal(format!("Failed to read bound address: {}", e)))?;

        let mut module = RpcModule::new(());

        let handler = self.handler.clone();
        module
            .register_async_method("queue.enqueue.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: EnqueueRequest = parse_params(params)?;
                    handler.enqueue(req).await
                }
            })
            .map_err(|e| registration_error("queue.enqueue.v1", e))?;

        let handler = self.handler.clone();
        module
            .register_async_method("queue.process_batch.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: ProcessBatchRequest = parse_params(params)?;
                    handler.process_batch(req).await
                }
            })
            .map_err(|e| registration_error("queue.process_batch.v1", e))?;

        let handler = self.handler.clone();
        module
            .register_async_method("queue.retry.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: RetryRequest = parse_params(params)?;
                    handler.retry(req).await
                }
            })
            .map_err(|e| registration_error("queue.retry.v1", e))?;

        let handler = self.handler.clone();
        module
            .register_async_method("queue.metrics.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: MetricsRequest = parse_params(params)?;
                    handler.metrics(req).await
                }
            })
            .map_err(|e| registration_error("queue.metrics.v1", e))?;

        let handler = self.handler.clone();
        module
            .register_async_method("queue.clear.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: ClearRequest = parse_params(params)?;
                    handler.clear(req).await
                }
            })
            .map_err(|e| registration_error("queue.clear.v1", e))?;

        let handler = self.handler.clone();
        module
            .register_async_method("queue.configure.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: ConfigureRequest = parse_params(params)?;
                    handler.configure(req).await
                }
            })
            .map_err(|e| registration_error("queue.configure.v1", e))?;

        let handler = self.handler.clone();
        module
            .register_async_method("queue.list.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: ListQueuesRequest = parse_params(params)?;
                    handler.list_queues(req).await
                }
            })
            .map_err(|e| registration_error("queue.list.v1", e))?;

        // Dead-letter administration
        let handler = self.handler.clone();
        module
            .register_async_method("dlq.list.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: DlqListRequest = parse_params(params)?;
                    handler.dlq_list(req).await
                }
            })
            .map_err(|e| registration_error("dlq.list.v1", e))?;

        let handler = self.handler.clone();
        module
            .register_async_method("dlq.reprocess.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: DlqReprocessRequest = parse_params(params)?;
                    handler.dlq_reprocess(req).await
                }
            })
            .map_err(|e| registration_error("dlq.reprocess.v1", e))?;

        let handler = self.handler.clone();
        module
            .register_async_method("dlq.purge.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: DlqPurgeRequest = parse_params(params)?;
                    handler.dlq_purge(req).await
                }
            })
            .map_err(|e| registration_error("dlq.purge.v1", e))?;

        let handle = server.start(module);
        info!(addr = %local_addr, "JSON-RPC server started");

        Ok(RunningServer { local_addr, handle })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonrpsee::core::client::ClientT;
    use jsonrpsee::http_client::HttpClientBuilder;
    use jsonrpsee::rpc_params;
    use notiq_core::domain::{Channel, Notification, PriorityClass};
    use notiq_core::port::delivery_handler::mocks::ScriptedHandler;
    use notiq_core::port::id_provider::SequentialIdProvider;
    use notiq_core::port::time_provider::SystemTimeProvider;
    use notiq_core::port::InMemoryQueueRepository;
    use notiq_core::EngineSettings;
    use serde_json::{json, Value};

    async fn start_server() -> RunningServer {
        let engine = Arc::new(QueueEngine::new(
            Arc::new(InMemoryQueueRepository::new()),
            Arc::new(SystemTimeProvider),
            Arc::new(SequentialIdProvider::default()),
            EngineSettings::default(),
        ));
        engine
            .register_handler(Channel::Email, Arc::new(ScriptedHandler::new_success()))
            .await;
        engine.initialize().await.unwrap();

        let config = RpcServerConfig {
            port: 0,
            ..Default::default()
        };
        RpcServer::new(config, engine).start().await.unwrap()
    }

    #[tokio::test]
    async fn test_enqueue_then_list_over_http() {
        let server = start_server().await;
        let client = HttpClientBuilder::default()
            .build(format!("http://{}", server.local_addr))
            .unwrap();

        let notification = Notification::email_test("n-1", PriorityClass::Critical);
        let params = json!({ "notification": notification });
        let response: Value = client
            .request("queue.enqueue.v1", params_object(params))
            .await
            .unwrap();
        assert_eq!(response["item_id"], "item-1");
        assert_eq!(response["queue"], "email_critical");

        // No params at all
        let queues: Value = client.request("queue.list.v1", rpc_params![]).await.unwrap();
        assert_eq!(queues["queues"].as_array().unwrap().len(), 20);

        let dlq: Value = client.request("dlq.list.v1", rpc_params![]).await.unwrap();
        assert_eq!(dlq["total"], 0);

        server.handle.stop().unwrap();
        server.handle.stopped().await;
    }

    #[tokio::test]
    async fn test_error_code_over_http() {
        let server = start_server().await;
        let client = HttpClientBuilder::default()
            .build(format!("http://{}", server.local_addr))
            .unwrap();

        let err = client
            .request::<Value, _>(
                "queue.clear.v1",
                params_object(json!({ "queue": "fax_low" })),
            )
            .await
            .unwrap_err();
        match err {
            jsonrpsee::core::client::Error::Call(obj) => {
                assert_eq!(obj.code(), crate::error::code::NOT_FOUND)
            }
            other => panic!("unexpected error: {other:?}"),
        }

        server.handle.stop().unwrap();
    }

    fn params_object(value: Value) -> jsonrpsee::core::params::ObjectParams {
        let mut params = jsonrpsee::core::params::ObjectParams::new();
        if let Value::Object(map) = value {
            for (key, value) in map {
                params.insert(&key, value).unwrap();
            }
        }
        params
    }
}
