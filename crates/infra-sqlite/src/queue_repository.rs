// SQLite QueueRepository Implementation

use crate::map_sqlx_error;
use async_trait::async_trait;
use notiq_core::domain::codec;
use notiq_core::domain::{DeadLetterItem, ItemId, QueueConfig, QueueItem};
use notiq_core::error::{AppError, Result};
use notiq_core::port::QueueRepository;
use sqlx::SqlitePool;
use tracing::debug;

/// Durable queue storage. Items and dead letters are stored as versioned
/// JSON envelopes (see `notiq_core::domain::codec`); a few columns are
/// denormalized for ordering and inspection.
pub struct SqliteQueueRepository {
    pool: SqlitePool,
}

impl SqliteQueueRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl QueueRepository for SqliteQueueRepository {
    async fn load_queue_items(&self, queue: &str) -> Result<Vec<QueueItem>> {
        let records: Vec<String> = sqlx::query_scalar(
            "SELECT record FROM queue_items WHERE queue = ? ORDER BY added_at ASC, id ASC",
        )
        .bind(queue)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        records
            .iter()
            .map(|raw| codec::decode_item(raw).map_err(AppError::from))
            .collect()
    }

    async fn save_queue_item(&self, queue: &str, item: &QueueItem) -> Result<()> {
        let record = codec::encode_item(item)?;

        sqlx::query(
            r#"
            INSERT INTO queue_items (queue, id, state, added_at, record)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (queue, id) DO UPDATE SET
                state = excluded.state,
                added_at = excluded.added_at,
                record = excluded.record
            "#,
        )
        .bind(queue)
        .bind(&item.id)
        .bind(item.state.to_string())
        .bind(item.added_at)
        .bind(&record)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn delete_queue_item(&self, queue: &str, item_id: &ItemId) -> Result<()> {
        sqlx::query("DELETE FROM queue_items WHERE queue = ? AND id = ?")
            .bind(queue)
            .bind(item_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn clear_queue_items(&self, queue: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM queue_items WHERE queue = ?")
            .bind(queue)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn load_configs(&self) -> Result<Vec<QueueConfig>> {
        let records: Vec<String> =
            sqlx::query_scalar("SELECT record FROM queue_configs ORDER BY name ASC")
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        records
            .iter()
            .map(|raw| serde_json::from_str(raw).map_err(AppError::from))
            .collect()
    }

    async fn save_config(&self, config: &QueueConfig) -> Result<()> {
        let record = serde_json::to_string(config)?;

        sqlx::query(
            r#"
            INSERT INTO queue_configs (name, record) VALUES (?, ?)
            ON CONFLICT (name) DO UPDATE SET record = excluded.record
            "#,
        )
        .bind(&config.name)
        .bind(&record)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn load_dead_letter_items(&self) -> Result<Vec<DeadLetterItem>> {
        let records: Vec<String> =
            sqlx::query_scalar("SELECT record FROM dead_letters ORDER BY seq ASC")
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        records
            .iter()
            .map(|raw| codec::decode_dead_letter(raw).map_err(AppError::from))
            .collect()
    }

    async fn append_dead_letter_item(&self, item: &DeadLetterItem, capacity: usize) -> Result<()> {
        let record = codec::encode_dead_letter(item)?;
        let capacity = i64::try_from(capacity).unwrap_or(i64::MAX);

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        // Re-dead-lettering a reprocessed item replaces its old row
        sqlx::query("DELETE FROM dead_letters WHERE id = ?")
            .bind(&item.item.id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        sqlx::query(
            "INSERT INTO dead_letters (id, queue, dead_lettered_at, record) VALUES (?, ?, ?, ?)",
        )
        .bind(&item.item.id)
        .bind(&item.queue)
        .bind(item.dead_lettered_at)
        .bind(&record)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let trimmed = sqlx::query(
            r#"
            DELETE FROM dead_letters
            WHERE seq NOT IN (SELECT seq FROM dead_letters ORDER BY seq DESC LIMIT ?)
            "#,
        )
        .bind(capacity)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?
        .rows_affected();

        tx.commit().await.map_err(map_sqlx_error)?;

        if trimmed > 0 {
            debug!(trimmed, "Trimmed oldest dead letters over capacity");
        }
        Ok(())
    }

    async fn remove_dead_letter_item(&self, item_id: &ItemId) -> Result<()> {
        sqlx::query("DELETE FROM dead_letters WHERE id = ?")
            .bind(item_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn purge_dead_letter_items(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM dead_letters")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};
    use notiq_core::domain::{Channel, ItemState, Notification, PriorityClass};

    async fn setup_test_repo() -> SqliteQueueRepository {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteQueueRepository::new(pool)
    }

    fn item(id: &str, added_at: i64) -> QueueItem {
        QueueItem::new(
            id,
            Notification::email_test(format!("n-{}", id), PriorityClass::High),
            3,
            added_at,
        )
    }

    #[tokio::test]
    async fn test_save_load_update_delete() {
        let repo = setup_test_repo().await;
        repo.save_queue_item("email_high", &item("b", 20)).await.unwrap();
        repo.save_queue_item("email_high", &item("a", 10)).await.unwrap();
        repo.save_queue_item("sms_low", &item("c", 5)).await.unwrap();

        let loaded = repo.load_queue_items("email_high").await.unwrap();
        let ids: Vec<&str> = loaded.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        // Upsert keeps one row per (queue, id)
        let mut updated = item("a", 10);
        updated.start(11).unwrap();
        repo.save_queue_item("email_high", &updated).await.unwrap();
        let loaded = repo.load_queue_items("email_high").await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].state, ItemState::Processing);

        repo.delete_queue_item("email_high", &"a".to_string())
            .await
            .unwrap();
        assert_eq!(repo.load_queue_items("email_high").await.unwrap().len(), 1);
        assert_eq!(repo.clear_queue_items("email_high").await.unwrap(), 1);
        assert_eq!(repo.load_queue_items("sms_low").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_config_upsert() {
        let repo = setup_test_repo().await;
        let mut config = QueueConfig::default_for(Channel::Push, PriorityClass::Low);
        repo.save_config(&config).await.unwrap();
        config.batch_size = 7;
        repo.save_config(&config).await.unwrap();

        let configs = repo.load_configs().await.unwrap();
        assert_eq!(configs, vec![config]);
    }

    #[tokio::test]
    async fn test_dead_letters_bounded_and_ordered() {
        let repo = setup_test_repo().await;
        for i in 0..4 {
            let dead = DeadLetterItem {
                item: item(&format!("d{}", i), i),
                queue: "email_high".to_string(),
                dead_lettered_at: 100 + i,
            };
            repo.append_dead_letter_item(&dead, 3).await.unwrap();
        }

        let loaded = repo.load_dead_letter_items().await.unwrap();
        let ids: Vec<&str> = loaded.iter().map(|d| d.id()).collect();
        assert_eq!(ids, vec!["d1", "d2", "d3"]);

        repo.remove_dead_letter_item(&"d2".to_string()).await.unwrap();
        assert_eq!(repo.load_dead_letter_items().await.unwrap().len(), 2);
        assert_eq!(repo.purge_dead_letter_items().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_legacy_record_migrated_on_read() {
        let repo = setup_test_repo().await;
        let legacy = serde_json::json!({
            "id": "legacy-1",
            "notification": {
                "id": "n-legacy",
                "channel": "sms",
                "priority": "high",
                "data": {"phone_number": "+15550100", "text": "hi"},
                "created_at": 1
            },
            "retry_count": 1,
            "errors": ["gateway timeout"],
            "added_at": 2
        });
        sqlx::query("INSERT INTO queue_items (queue, id, state, added_at, record) VALUES (?, ?, ?, ?, ?)")
            .bind("sms_high")
            .bind("legacy-1")
            .bind("QUEUED")
            .bind(2_i64)
            .bind(legacy.to_string())
            .execute(repo.pool())
            .await
            .unwrap();

        let items = repo.load_queue_items("sms_high").await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].notification.channel(), Channel::Sms);
        assert_eq!(items[0].attempts, 1);
        assert_eq!(items[0].error_history[0].code, "LEGACY_ERROR");
    }
}
