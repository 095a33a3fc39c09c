//! Notiq daemon - composition root
//!
//! Wires SQLite persistence, channel adapters, the queue engine and the
//! JSON-RPC server, then runs until Ctrl+C.

mod channels;
mod config;
mod telemetry;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use channels::{LogSinkHandler, WebhookHandler};
use config::{DaemonConfig, LogFormat};
use notiq_api_rpc::RpcServer;
use notiq_core::domain::Channel;
use notiq_core::port::id_provider::UuidProvider;
use notiq_core::port::time_provider::SystemTimeProvider;
use notiq_core::port::DeliveryHandler;
use notiq_core::QueueEngine;
use notiq_infra_sqlite::{create_pool, run_migrations, SqliteQueueRepository};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn init_logging(format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("notiq=info"))
        .context("Failed to create env filter")?;
    let otel = telemetry::otel_layer()?;

    match format {
        LogFormat::Json => {
            // Production: JSON structured logging
            tracing_subscriber::registry()
                .with(otel)
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(otel)
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Configuration and logging
    let config = DaemonConfig::from_env()?;
    init_logging(config.log_format)?;

    info!("Notiq daemon v{} starting...", VERSION);

    // 2. Database
    if let Some(parent) = Path::new(&config.db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    info!(db_path = %config.db_path, "Initializing database...");
    let pool = create_pool(&config.db_path)
        .await
        .context("DB pool creation failed")?;
    run_migrations(&pool).await.context("Migration failed")?;

    // 3. Engine (DI wiring)
    let engine = Arc::new(QueueEngine::new(
        Arc::new(SqliteQueueRepository::new(pool.clone())),
        Arc::new(SystemTimeProvider),
        Arc::new(UuidProvider),
        config.engine.clone(),
    ));

    let webhook: Arc<dyn DeliveryHandler> = Arc::new(WebhookHandler::new(config.webhook_timeout)?);
    let log_sink: Arc<dyn DeliveryHandler> = Arc::new(LogSinkHandler);
    for channel in Channel::ALL {
        let handler = match channel {
            Channel::Webhook => Arc::clone(&webhook),
            _ => Arc::clone(&log_sink),
        };
        engine.register_handler(channel, handler).await;
    }

    // 4. Recover persisted state and start dispatchers
    engine.start().await.context("Queue engine start failed")?;
    spawn_event_logger(&engine);

    // 5. JSON-RPC server
    let rpc = RpcServer::new(config.rpc.clone(), Arc::clone(&engine))
        .start()
        .await
        .context("RPC server start failed")?;

    info!(rpc_addr = %rpc.local_addr, "System ready. Press Ctrl+C to shutdown");

    // 6. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting gracefully...");

    // 7. Graceful shutdown: stop admitting calls, drain deliveries, close storage
    if let Err(e) = rpc.handle.stop() {
        warn!(error = %e, "RPC server was already stopped");
    }
    engine.shutdown().await;
    rpc.handle.stopped().await;
    pool.close().await;
    telemetry::shutdown();

    info!("Shutdown complete.");
    Ok(())
}

/// Mirror engine events into the debug log
fn spawn_event_logger(engine: &QueueEngine) {
    let mut events = engine.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => debug!(event = event.name(), detail = ?event, "Queue event"),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event logger fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}
