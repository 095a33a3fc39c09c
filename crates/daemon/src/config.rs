//! Daemon configuration from environment variables

use anyhow::{ensure, Context, Result};
use notiq_api_rpc::RpcServerConfig;
use notiq_core::EngineSettings;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_DB_PATH: &str = "~/.notiq/queue.db";
const DEFAULT_WEBHOOK_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub db_path: String,
    pub rpc: RpcServerConfig,
    pub engine: EngineSettings,
    pub webhook_timeout: Duration,
    pub log_format: LogFormat,
}

impl DaemonConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let rpc_defaults = RpcServerConfig::default();
        let engine_defaults = EngineSettings::default();

        let db_path = lookup("NOTIQ_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string());
        let db_path = shellexpand::tilde(&db_path).into_owned();

        let rpc = RpcServerConfig {
            host: lookup("NOTIQ_RPC_HOST").unwrap_or(rpc_defaults.host),
            port: parse_var(&lookup, "NOTIQ_RPC_PORT", rpc_defaults.port)?,
            rate_limit_burst: parse_var(&lookup, "NOTIQ_RATE_LIMIT_BURST", rpc_defaults.rate_limit_burst)?,
            rate_limit_rate: parse_var(&lookup, "NOTIQ_RATE_LIMIT_RATE", rpc_defaults.rate_limit_rate)?,
        };

        let engine = EngineSettings {
            dead_letter_capacity: parse_var(
                &lookup,
                "NOTIQ_DLQ_CAPACITY",
                engine_defaults.dead_letter_capacity,
            )?,
            delivery_timeout: parse_millis(
                &lookup,
                "NOTIQ_DELIVERY_TIMEOUT_MS",
                engine_defaults.delivery_timeout,
            )?,
            shutdown_drain_timeout: parse_millis(
                &lookup,
                "NOTIQ_SHUTDOWN_DRAIN_MS",
                engine_defaults.shutdown_drain_timeout,
            )?,
            ..engine_defaults
        };

        ensure!(
            engine.dead_letter_capacity > 0,
            "NOTIQ_DLQ_CAPACITY must be at least 1"
        );

        let webhook_timeout = parse_millis(
            &lookup,
            "NOTIQ_WEBHOOK_TIMEOUT_MS",
            Duration::from_millis(DEFAULT_WEBHOOK_TIMEOUT_MS),
        )?;

        let log_format = match lookup("NOTIQ_LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            db_path,
            rpc,
            engine,
            webhook_timeout,
            log_format,
        })
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}

fn parse_millis(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Result<Duration> {
    let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    parse_var(lookup, key, default_ms).map(Duration::from_millis)
}
