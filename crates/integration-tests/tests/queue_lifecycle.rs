//! Queue lifecycle scenarios: engine + SQLite persistence
//!
//! Every scenario checks both the engine's view and the persisted rows.

use notiq_core::domain::{Channel, ItemState, Notification, PriorityClass};
use notiq_core::port::delivery_handler::mocks::MockBehavior;
use notiq_core::port::QueueRepository;
use notiq_core::{AppError, EnqueueOptions, QueueEvent};
use notiq_integration_tests::{memory_fixture, Fixture, START};

fn email(id: &str, priority: PriorityClass) -> Notification {
    Notification::email_test(id, priority)
}

async fn configure(f: &Fixture, name: &str, apply: impl FnOnce(&mut notiq_core::domain::QueueConfig)) {
    let mut config = f.engine.queue_config(name).await.unwrap();
    apply(&mut config);
    f.engine.configure_queue(config).await.unwrap();
}

#[tokio::test]
async fn test_delivered_item_leaves_storage() {
    let f = memory_fixture().await.unwrap();

    f.engine
        .enqueue(email("n-1", PriorityClass::High), EnqueueOptions::default())
        .await
        .unwrap();
    assert_eq!(f.repo.load_queue_items("email_high").await.unwrap().len(), 1);

    assert_eq!(f.engine.dispatch_once("email_high").await.unwrap(), 1);

    assert!(f.repo.load_queue_items("email_high").await.unwrap().is_empty());
    let metrics = f.engine.queue_metrics("email_high").await.unwrap();
    assert_eq!(metrics.size, 0);
    assert_eq!(metrics.processed, 1);
    assert_eq!(metrics.last_processed_at, Some(START));
    assert_eq!(metrics.error_rate, 0.0);
}

/// Critical queue, maxSize 2, one retry at 1000 ms base delay: two timeouts
/// end in the dead-letter queue with both errors recorded.
#[tokio::test]
async fn test_timeout_retry_then_dead_letter_persisted() {
    let f = memory_fixture().await.unwrap();
    configure(&f, "email_critical", |c| {
        c.max_size = 2;
        c.retry_attempts = 1;
        c.retry_base_delay_ms = 1_000;
    })
    .await;
    f.handler.script(
        "n-1",
        vec![
            MockBehavior::Fail("TIMEOUT".into(), "provider timed out".into()),
            MockBehavior::Fail("TIMEOUT".into(), "provider timed out".into()),
        ],
    );
    let mut events = f.engine.subscribe();

    let item_id = f
        .engine
        .enqueue(email("n-1", PriorityClass::Critical), EnqueueOptions::default())
        .await
        .unwrap();

    f.engine.dispatch_once("email_critical").await.unwrap();
    let rows = f.repo.load_queue_items("email_critical").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].attempts, 1);
    assert_eq!(rows[0].state, ItemState::Queued);
    assert_eq!(rows[0].next_eligible_at, Some(START + 1_000));
    assert_eq!(rows[0].error_history[0].code, "TIMEOUT");

    // Not yet eligible
    assert_eq!(f.engine.dispatch_once("email_critical").await.unwrap(), 0);

    f.time.advance(1_000);
    assert_eq!(f.engine.dispatch_once("email_critical").await.unwrap(), 1);

    assert!(f.repo.load_queue_items("email_critical").await.unwrap().is_empty());
    let dead = f.repo.load_dead_letter_items().await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].id(), item_id);
    assert_eq!(dead[0].item.attempts, 2);
    assert_eq!(dead[0].item.error_history.len(), 2);
    assert_eq!(dead[0].dead_lettered_at, START + 1_000);

    let names: Vec<&str> = std::iter::from_fn(|| events.try_recv().ok())
        .map(|e| e.name())
        .collect();
    assert_eq!(
        names,
        vec!["itemEnqueued", "retryScheduled", "itemMovedToDLQ"]
    );
}

#[tokio::test]
async fn test_priority_then_fifo_order() {
    let f = memory_fixture().await.unwrap();
    configure(&f, "email_low", |c| c.batch_size = 1).await;

    for (id, priority) in [("a", None), ("b", Some(5)), ("c", None), ("d", Some(5))] {
        f.engine
            .enqueue(
                email(id, PriorityClass::Low),
                EnqueueOptions {
                    priority,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }
    for _ in 0..4 {
        assert_eq!(f.engine.dispatch_once("email_low").await.unwrap(), 1);
    }

    assert_eq!(f.handler.calls(), vec!["b", "d", "a", "c"]);
}

#[tokio::test]
async fn test_capacity_rejection_leaves_no_row() {
    let f = memory_fixture().await.unwrap();
    configure(&f, "email_medium", |c| c.max_size = 1).await;

    f.engine
        .enqueue(email("n-1", PriorityClass::Medium), EnqueueOptions::default())
        .await
        .unwrap();
    let err = f
        .engine
        .enqueue(email("n-2", PriorityClass::Medium), EnqueueOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::QueueFull { max_size: 1, .. }));
    assert_eq!(f.repo.load_queue_items("email_medium").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_deduplicated_enqueue() {
    let f = memory_fixture().await.unwrap();
    let dedup = EnqueueOptions {
        deduplicate: true,
        ..Default::default()
    };

    let first = f
        .engine
        .enqueue(email("n-1", PriorityClass::High), dedup.clone())
        .await
        .unwrap();
    let again = f
        .engine
        .enqueue(email("n-1", PriorityClass::High), dedup)
        .await
        .unwrap();
    assert_eq!(first, again);
    assert_eq!(f.repo.load_queue_items("email_high").await.unwrap().len(), 1);

    // Without the flag the same notification is queued twice
    f.engine
        .enqueue(email("n-1", PriorityClass::High), EnqueueOptions::default())
        .await
        .unwrap();
    assert_eq!(f.repo.load_queue_items("email_high").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_dead_letter_reprocess_round_trip() {
    let f = memory_fixture().await.unwrap();
    f.handler.script(
        "n-1",
        vec![MockBehavior::Fail("BLOCKED".into(), "sender blocked".into())],
    );

    let item_id = f
        .engine
        .enqueue(email("n-1", PriorityClass::High), EnqueueOptions::default())
        .await
        .unwrap();
    f.engine.dispatch_once("email_high").await.unwrap();
    assert_eq!(f.engine.dead_letter_count().await, 1);
    assert_eq!(f.repo.load_dead_letter_items().await.unwrap().len(), 1);

    assert!(f.engine.reprocess_dlq_item(&item_id).await.unwrap());
    assert_eq!(f.engine.dead_letter_count().await, 0);
    assert!(f.repo.load_dead_letter_items().await.unwrap().is_empty());

    let rows = f.repo.load_queue_items("email_high").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, item_id);
    assert_eq!(rows[0].attempts, 0);
    assert!(rows[0].error_history.is_empty());

    // Script exhausted: the default behavior delivers it
    assert_eq!(f.engine.dispatch_once("email_high").await.unwrap(), 1);
    assert!(f.repo.load_queue_items("email_high").await.unwrap().is_empty());

    let err = f.engine.reprocess_dlq_item(&item_id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_non_retryable_failures_then_purge() {
    let f = memory_fixture().await.unwrap();
    configure(&f, "email_low", |c| c.batch_size = 50).await;

    for i in 0..5 {
        let id = format!("n-{}", i);
        f.handler.script(
            &id,
            vec![MockBehavior::Fail("UNSUBSCRIBED".into(), "gone".into())],
        );
        f.engine
            .enqueue(email(&id, PriorityClass::Low), EnqueueOptions::default())
            .await
            .unwrap();
    }
    f.engine.dispatch_once("email_low").await.unwrap();

    assert_eq!(f.engine.dead_letter_count().await, 5);
    let purged = f.engine.purge_dead_letters().await.unwrap();
    assert_eq!(purged, 5);
    assert!(f.repo.load_dead_letter_items().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_process_batch_bypasses_queues() {
    let f = memory_fixture().await.unwrap();
    f.handler.script(
        "b-2",
        vec![MockBehavior::Fail("INVALID_RECIPIENT".into(), "bad address".into())],
    );
    let mut events = f.engine.subscribe();

    let notifications: Vec<Notification> = (1..=3)
        .map(|i| email(&format!("b-{}", i), PriorityClass::Medium))
        .collect();
    let result = f
        .engine
        .process_batch(Channel::Email, notifications)
        .await
        .unwrap();

    assert_eq!(result.total_items, 3);
    assert_eq!(result.successful, 2);
    assert_eq!(result.failed, 1);
    let failed = result.results.iter().find(|r| !r.success).unwrap();
    assert_eq!(failed.notification_id, "b-2");
    assert_eq!(failed.error.as_ref().unwrap().code, "INVALID_RECIPIENT");

    // Nothing was queued, nothing dead-lettered
    assert!(f.repo.load_queue_items("email_medium").await.unwrap().is_empty());
    assert_eq!(f.engine.dead_letter_count().await, 0);

    match events.try_recv().unwrap() {
        QueueEvent::BatchProcessed {
            total,
            successful,
            failed,
            ..
        } => assert_eq!((total, successful, failed), (3, 2, 1)),
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_clear_queue_removes_rows() {
    let f = memory_fixture().await.unwrap();
    for id in ["a", "b", "c"] {
        f.engine
            .enqueue(email(id, PriorityClass::Critical), EnqueueOptions::default())
            .await
            .unwrap();
    }

    let removed = f.engine.clear_queue("email_critical", false).await.unwrap();
    assert_eq!(removed, 3);
    tokio_test::assert_ok!(f.repo.load_queue_items("email_critical").await);
    assert!(f.repo.load_queue_items("email_critical").await.unwrap().is_empty());
}
