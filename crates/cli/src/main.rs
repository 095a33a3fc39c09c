//! Notiq CLI - operator interface to the Notiq daemon over JSON-RPC

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tabled::{Table, Tabled};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9631";

#[derive(Parser)]
#[command(name = "notiq")]
#[command(about = "Notiq notification queue CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, env = "NOTIQ_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Enqueue a notification
    Enqueue {
        /// Notification ID (used for deduplication)
        #[arg(long)]
        id: String,

        /// Channel: email, push, sms, in_app, webhook
        #[arg(short, long)]
        channel: String,

        /// Priority class: critical, high, medium, low
        #[arg(short, long, default_value = "medium")]
        priority: String,

        /// Channel payload fields as a JSON object, e.g. '{"to":"a@b.c","subject":"s","body":"b"}'
        #[arg(long)]
        payload: String,

        /// Override the priority weight within the queue
        #[arg(long)]
        weight: Option<i32>,

        /// Hold the item back for this many milliseconds
        #[arg(long)]
        delay_ms: Option<i64>,

        /// Return the existing item if the notification is already queued
        #[arg(long)]
        dedup: bool,
    },

    /// Deliver a batch of notifications directly (no queueing, no retries)
    Batch {
        /// Channel every notification in the file belongs to
        #[arg(short, long)]
        channel: String,

        /// JSON file holding an array of notifications
        #[arg(short, long)]
        file: String,
    },

    /// Show queue metrics
    Status {
        /// Only this queue
        #[arg(short, long)]
        queue: Option<String>,
    },

    /// List queue configurations
    Queues,

    /// Remove every item from a queue
    Clear {
        queue: String,

        /// Clear even while deliveries are in flight
        #[arg(long)]
        force: bool,
    },

    /// Make a queued item eligible for delivery immediately
    Retry { queue: String, item_id: String },

    /// Dead-letter queue administration
    Dlq {
        #[command(subcommand)]
        command: DlqCommands,
    },
}

#[derive(Subcommand)]
enum DlqCommands {
    /// Show the most recent dead letters
    List {
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },

    /// Move a dead letter back into its queue
    Reprocess { item_id: String },

    /// Drop every dead letter
    Purge {
        /// Skip the safety check
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: Value,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

#[derive(Tabled)]
struct MetricsRow {
    queue: String,
    size: String,
    processing: String,
    enqueued: String,
    processed: String,
    failed: String,
    retried: String,
    error_rate: String,
}

#[derive(Tabled)]
struct QueueRow {
    name: String,
    max_size: String,
    rate_per_sec: String,
    batch: String,
    retries: String,
    base_delay_ms: String,
    dlq: String,
}

#[derive(Tabled)]
struct DeadLetterRow {
    item_id: String,
    queue: String,
    attempts: String,
    last_error: String,
    dead_lettered_at: String,
}

#[derive(Tabled)]
struct DeliveryRow {
    notification_id: String,
    success: String,
    error: String,
}

async fn call_rpc(url: &str, method: &str, params: Value) -> Result<Value> {
    let request = JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        method: method.to_string(),
        params,
        id: 1,
    };

    let client = reqwest::Client::new();
    let response: JsonRpcResponse = client
        .post(url)
        .json(&request)
        .send()
        .await
        .context("Failed to connect to daemon")?
        .json()
        .await
        .context("Failed to parse response")?;

    if let Some(error) = response.error {
        anyhow::bail!("RPC error ({}): {}", error.code, error.message);
    }

    response
        .result
        .ok_or_else(|| anyhow::anyhow!("No result in response"))
}

/// Assemble the wire form of a notification from CLI arguments
fn build_notification(id: &str, channel: &str, priority: &str, payload: &str) -> Result<Value> {
    let mut payload: Value = serde_json::from_str(payload).context("Invalid JSON payload")?;
    let fields = payload
        .as_object_mut()
        .ok_or_else(|| anyhow::anyhow!("Payload must be a JSON object"))?;
    fields.insert("channel".to_string(), json!(channel.to_ascii_lowercase()));

    Ok(json!({
        "id": id,
        "priority": priority.to_ascii_lowercase(),
        "payload": payload,
        "created_at": chrono::Utc::now().timestamp_millis(),
    }))
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}

fn format_millis(value: &Value) -> String {
    value
        .as_i64()
        .and_then(chrono::DateTime::from_timestamp_millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn metrics_row(m: &Value) -> MetricsRow {
    MetricsRow {
        queue: text(&m["queue"]),
        size: text(&m["size"]),
        processing: text(&m["processing"]),
        enqueued: text(&m["enqueued"]),
        processed: text(&m["processed"]),
        failed: text(&m["failed"]),
        retried: text(&m["retried"]),
        error_rate: format!("{:.1}%", m["error_rate"].as_f64().unwrap_or(0.0) * 100.0),
    }
}

fn queue_row(c: &Value) -> QueueRow {
    QueueRow {
        name: text(&c["name"]),
        max_size: text(&c["max_size"]),
        rate_per_sec: text(&c["processing_rate_per_second"]),
        batch: text(&c["batch_size"]),
        retries: text(&c["retry_attempts"]),
        base_delay_ms: text(&c["retry_base_delay_ms"]),
        dlq: if c["dead_letter_enabled"].as_bool().unwrap_or(false) {
            "on".to_string()
        } else {
            "off".to_string()
        },
    }
}

fn dead_letter_row(d: &Value) -> DeadLetterRow {
    let item = &d["item"];
    let last_error = item["error_history"]
        .as_array()
        .and_then(|errors| errors.last())
        .map(|e| format!("{}: {}", text(&e["code"]), text(&e["message"])))
        .unwrap_or_else(|| "-".to_string());
    DeadLetterRow {
        item_id: text(&item["id"]),
        queue: text(&d["queue"]),
        attempts: text(&item["attempts"]),
        last_error,
        dead_lettered_at: format_millis(&d["dead_lettered_at"]),
    }
}

fn rows<T>(value: &Value, map: fn(&Value) -> T) -> Vec<T> {
    value
        .as_array()
        .map(|items| items.iter().map(map).collect())
        .unwrap_or_default()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Enqueue {
            id,
            channel,
            priority,
            payload,
            weight,
            delay_ms,
            dedup,
        } => {
            let notification = build_notification(&id, &channel, &priority, &payload)?;
            let params = json!({
                "notification": notification,
                "priority": weight,
                "delay_ms": delay_ms,
                "deduplicate": dedup,
            });

            let result = call_rpc(&cli.rpc_url, "queue.enqueue.v1", params).await?;

            println!("{}", "✓ Notification enqueued".green().bold());
            println!("  {} {}", "Item:".bold(), text(&result["item_id"]));
            println!("  {} {}", "Queue:".bold(), text(&result["queue"]));
        }

        Commands::Batch { channel, file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file))?;
            let notifications: Value =
                serde_json::from_str(&raw).context("Batch file is not valid JSON")?;
            let params = json!({
                "channel": channel.to_ascii_lowercase(),
                "notifications": notifications,
            });

            let result = call_rpc(&cli.rpc_url, "queue.process_batch.v1", params).await?;

            let failed = result["failed"].as_u64().unwrap_or(0);
            let summary = format!(
                "Batch {}: {}/{} delivered in {} ms",
                text(&result["batch_id"]),
                text(&result["successful"]),
                text(&result["total_items"]),
                text(&result["processing_time_ms"]),
            );
            if failed == 0 {
                println!("{}", summary.green().bold());
            } else {
                println!("{}", summary.yellow().bold());
            }

            let deliveries = rows(&result["results"], |r| DeliveryRow {
                notification_id: text(&r["notification_id"]),
                success: if r["success"].as_bool().unwrap_or(false) {
                    "✓".to_string()
                } else {
                    "✗".to_string()
                },
                error: match &r["error"] {
                    Value::Null => "-".to_string(),
                    e => format!("{}: {}", text(&e["code"]), text(&e["message"])),
                },
            });
            println!("{}", Table::new(deliveries));
        }

        Commands::Status { queue } => {
            println!("{}", "Queue Status".cyan().bold());
            println!();

            match call_rpc(&cli.rpc_url, "queue.metrics.v1", json!({ "queue": queue })).await {
                Ok(metrics) => {
                    println!("  {} {}", "RPC URL:".bold(), cli.rpc_url);
                    println!("  {} {}", "Status:".bold(), "ONLINE".green());
                    println!(
                        "  {} {}",
                        "Dead letters:".bold(),
                        text(&metrics["dead_letter_count"])
                    );
                    println!();
                    println!("{}", Table::new(rows(&metrics["queues"], metrics_row)));
                }
                Err(e) => {
                    println!("  {} {}", "Status:".bold(), "ERROR".red());
                    println!("  {} {}", "Error:".bold(), e);
                }
            }
        }

        Commands::Queues => {
            let result = call_rpc(&cli.rpc_url, "queue.list.v1", json!({})).await?;
            println!("{}", Table::new(rows(&result["queues"], queue_row)));
        }

        Commands::Clear { queue, force } => {
            let params = json!({ "queue": queue, "force": force });
            let result = call_rpc(&cli.rpc_url, "queue.clear.v1", params).await?;
            println!(
                "{}",
                format!("✓ Cleared {} items from {}", text(&result["removed"]), queue)
                    .green()
                    .bold()
            );
        }

        Commands::Retry { queue, item_id } => {
            let params = json!({ "queue": queue, "item_id": item_id });
            let result = call_rpc(&cli.rpc_url, "queue.retry.v1", params).await?;
            if result["retried"].as_bool().unwrap_or(false) {
                println!("{}", format!("✓ {} is eligible now", item_id).green().bold());
            } else {
                println!(
                    "{}",
                    format!("○ {} is not queued or is being delivered", item_id).yellow()
                );
            }
        }

        Commands::Dlq { command } => match command {
            DlqCommands::List { limit } => {
                let result = call_rpc(&cli.rpc_url, "dlq.list.v1", json!({ "limit": limit })).await?;
                println!(
                    "{}",
                    format!("Dead letters ({} total)", text(&result["total"]))
                        .cyan()
                        .bold()
                );
                println!("{}", Table::new(rows(&result["items"], dead_letter_row)));
            }

            DlqCommands::Reprocess { item_id } => {
                let params = json!({ "item_id": item_id });
                call_rpc(&cli.rpc_url, "dlq.reprocess.v1", params).await?;
                println!("{}", format!("✓ {} moved back to its queue", item_id).green().bold());
            }

            DlqCommands::Purge { yes } => {
                if !yes {
                    anyhow::bail!("Refusing to purge without --yes");
                }
                let result = call_rpc(&cli.rpc_url, "dlq.purge.v1", json!({})).await?;
                println!(
                    "{}",
                    format!("✓ Purged {} dead letters", text(&result["removed"]))
                        .green()
                        .bold()
                );
            }
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_build_notification() {
        let n = build_notification("n-1", "SMS", "High", r#"{"phone_number":"+1555","text":"hi"}"#)
            .unwrap();
        assert_eq!(n["id"], "n-1");
        assert_eq!(n["priority"], "high");
        assert_eq!(n["payload"]["channel"], "sms");
        assert_eq!(n["payload"]["text"], "hi");
        assert!(n["created_at"].as_i64().unwrap() > 0);

        assert!(build_notification("n-2", "sms", "low", "[1, 2]").is_err());
        assert!(build_notification("n-3", "sms", "low", "{not json").is_err());
    }

    #[test]
    fn test_dead_letter_row() {
        let dead = json!({
            "queue": "email_high",
            "dead_lettered_at": 1_700_000_000_000_i64,
            "item": {
                "id": "item-9",
                "attempts": 4,
                "error_history": [
                    {"code": "TIMEOUT", "message": "slow"},
                    {"code": "NETWORK", "message": "reset"}
                ]
            }
        });
        let row = dead_letter_row(&dead);
        assert_eq!(row.item_id, "item-9");
        assert_eq!(row.attempts, "4");
        assert_eq!(row.last_error, "NETWORK: reset");
        assert!(row.dead_lettered_at.starts_with("2023-11-14"));
    }
}
