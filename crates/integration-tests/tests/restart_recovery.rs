//! Restart scenarios: state written by one engine is recovered by the next

use notiq_core::domain::{ItemState, Notification, PriorityClass};
use notiq_core::port::delivery_handler::mocks::MockBehavior;
use notiq_core::port::time_provider::mocks::ManualTimeProvider;
use notiq_core::port::QueueRepository;
use notiq_core::EnqueueOptions;
use notiq_integration_tests::{fixture, TempDb, START};
use std::sync::Arc;

fn email(id: &str, priority: PriorityClass) -> Notification {
    Notification::email_test(id, priority)
}

/// Items queued or mid-delivery at shutdown are delivered after restart,
/// in priority-then-FIFO order.
#[tokio::test]
async fn test_restart_restores_queued_and_in_flight_items() {
    let db = TempDb::new("restart_live");
    let time = Arc::new(ManualTimeProvider::new(START));

    {
        let f = fixture(&db.url(), time.clone()).await.unwrap();
        for id in ["first", "second", "third"] {
            f.engine
                .enqueue(email(id, PriorityClass::High), EnqueueOptions::default())
                .await
                .unwrap();
            time.advance(1);
        }

        // Simulate a crash mid-delivery of "second"
        let mut rows = f.repo.load_queue_items("email_high").await.unwrap();
        let in_flight = rows.iter_mut().find(|i| i.notification.id == "second").unwrap();
        in_flight.start(START + 10).unwrap();
        f.repo.save_queue_item("email_high", in_flight).await.unwrap();

        f.repo.pool().close().await;
    }

    let f = fixture(&db.url(), time.clone()).await.unwrap();
    let metrics = f.engine.queue_metrics("email_high").await.unwrap();
    assert_eq!(metrics.size, 3);
    assert_eq!(metrics.processing, 0);

    let rows = f.repo.load_queue_items("email_high").await.unwrap();
    assert!(rows.iter().all(|i| i.state == ItemState::Queued));

    assert_eq!(f.engine.dispatch_once("email_high").await.unwrap(), 3);
    assert_eq!(f.handler.calls(), vec!["first", "second", "third"]);
    assert!(f.repo.load_queue_items("email_high").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_dead_letters_and_configs_survive_restart() {
    let db = TempDb::new("restart_dlq");
    let time = Arc::new(ManualTimeProvider::new(START));

    let item_id = {
        let f = fixture(&db.url(), time.clone()).await.unwrap();

        let mut config = f.engine.queue_config("email_medium").await.unwrap();
        config.batch_size = 7;
        config.retry_attempts = 0;
        f.engine.configure_queue(config).await.unwrap();

        f.handler.script(
            "n-1",
            vec![MockBehavior::Fail("NETWORK".into(), "connection reset".into())],
        );
        let item_id = f
            .engine
            .enqueue(email("n-1", PriorityClass::Medium), EnqueueOptions::default())
            .await
            .unwrap();
        f.engine.dispatch_once("email_medium").await.unwrap();
        assert_eq!(f.engine.dead_letter_count().await, 1);

        f.repo.pool().close().await;
        item_id
    };

    let f = fixture(&db.url(), time).await.unwrap();

    let config = f.engine.queue_config("email_medium").await.unwrap();
    assert_eq!(config.batch_size, 7);
    assert_eq!(config.retry_attempts, 0);

    let dead = f.engine.dead_letter_queue(10).await;
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].id(), item_id);
    assert_eq!(dead[0].item.error_history[0].code, "NETWORK");
    assert_eq!(dead[0].item.attempts, 1);

    // A reprocessed dead letter is deliverable by the restarted engine
    assert!(f.engine.reprocess_dlq_item(&item_id).await.unwrap());
    assert_eq!(f.engine.dispatch_once("email_medium").await.unwrap(), 1);
    assert_eq!(f.engine.dead_letter_count().await, 0);
    assert!(f.repo.load_dead_letter_items().await.unwrap().is_empty());
}

/// A persisted item past its retry budget is dead-lettered on load
#[tokio::test]
async fn test_exhausted_item_dead_lettered_on_recovery() {
    let db = TempDb::new("restart_exhausted");
    let time = Arc::new(ManualTimeProvider::new(START));

    {
        let f = fixture(&db.url(), time.clone()).await.unwrap();
        let item_id = f
            .engine
            .enqueue(email("n-1", PriorityClass::Low), EnqueueOptions::default())
            .await
            .unwrap();

        // Low priority allows 2 retries; pretend 3 failures were recorded
        let mut rows = f.repo.load_queue_items("email_low").await.unwrap();
        let item = rows.iter_mut().find(|i| i.id == item_id).unwrap();
        item.attempts = 3;
        f.repo.save_queue_item("email_low", item).await.unwrap();

        f.repo.pool().close().await;
    }

    let f = fixture(&db.url(), time).await.unwrap();
    assert_eq!(f.engine.queue_metrics("email_low").await.unwrap().size, 0);
    assert_eq!(f.engine.dead_letter_count().await, 1);
    assert!(f.repo.load_queue_items("email_low").await.unwrap().is_empty());
    assert_eq!(f.repo.load_dead_letter_items().await.unwrap().len(), 1);
}
