//! Shared fixtures for the cross-crate scenario tests

use notiq_core::domain::Channel;
use notiq_core::port::delivery_handler::mocks::ScriptedHandler;
use notiq_core::port::id_provider::SequentialIdProvider;
use notiq_core::port::time_provider::mocks::ManualTimeProvider;
use notiq_core::{EngineSettings, QueueEngine, Result};
use notiq_infra_sqlite::{create_pool, run_migrations, SqliteQueueRepository};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub const START: i64 = 1_700_000_000_000;

/// An engine on SQLite with a manual clock and a scripted email handler
pub struct Fixture {
    pub engine: Arc<QueueEngine>,
    pub repo: Arc<SqliteQueueRepository>,
    pub time: Arc<ManualTimeProvider>,
    pub handler: Arc<ScriptedHandler>,
}

pub fn test_settings() -> EngineSettings {
    EngineSettings {
        delivery_timeout: Duration::from_secs(2),
        shutdown_drain_timeout: Duration::from_secs(2),
        ..Default::default()
    }
}

/// Build and initialize an engine over `database_url`.
///
/// `time` is shared so a restarted engine keeps the same clock.
pub async fn fixture(database_url: &str, time: Arc<ManualTimeProvider>) -> Result<Fixture> {
    let pool = create_pool(database_url).await?;
    run_migrations(&pool).await?;
    let repo = Arc::new(SqliteQueueRepository::new(pool));

    let engine = Arc::new(QueueEngine::new(
        repo.clone(),
        time.clone(),
        Arc::new(SequentialIdProvider::default()),
        test_settings(),
    ));
    let handler = Arc::new(ScriptedHandler::new_success());
    engine.register_handler(Channel::Email, handler.clone()).await;
    engine.initialize().await?;

    Ok(Fixture {
        engine,
        repo,
        time,
        handler,
    })
}

pub async fn memory_fixture() -> Result<Fixture> {
    fixture("sqlite::memory:", Arc::new(ManualTimeProvider::new(START))).await
}

/// A database file under the temp dir, removed on drop
pub struct TempDb {
    pub path: PathBuf,
}

impl TempDb {
    pub fn new(name: &str) -> Self {
        let path =
            std::env::temp_dir().join(format!("notiq_{}_{}.db", name, std::process::id()));
        let db = Self { path };
        db.remove();
        db
    }

    pub fn url(&self) -> String {
        self.path.display().to_string()
    }

    fn remove(&self) {
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", self.path.display(), suffix));
        }
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        self.remove();
    }
}
