use std::time::Duration;

use anyhow::Result;
use redis::Commands;
use workq::{
    ExpiredItemAction, FailedItemAction, PeekDirection, QueueConfig, QueueHandle,
    RemoveFailedItemsOptions, SublistTag,
};

const ROOT_URL: &str = "redis://127.0.0.1";

/// Best-effort cleanup for a test queue's sublists and per-item records.
/// Drop can't be async, so this opens its own short-lived sync connection,
/// mirroring the source pack's `RedisKeyDrop` pattern.
struct TestQueueCleanup {
    queue_name: String,
}

impl Drop for TestQueueCleanup {
    fn drop(&mut self) {
        let client = redis::Client::open(ROOT_URL).unwrap();
        let mut conn = client.get_connection().unwrap();
        let keys: Vec<String> = conn.keys(format!("{}*", self.queue_name)).unwrap_or_default();
        if !keys.is_empty() {
            let _: () = conn.del(keys).unwrap_or(());
        }
    }
}

async fn make_test_queue() -> Result<(QueueHandle, TestQueueCleanup)> {
    let suffix: String = std::iter::repeat_with(fastrand::alphanumeric)
        .take(8)
        .collect();
    let queue_name = format!("it-{suffix}");

    let config = QueueConfig::new("127.0.0.1", 6379, queue_name.clone())
        .claim_wait_timeout(Duration::from_millis(200));
    let handle = QueueHandle::connect(config).await?;

    Ok((handle, TestQueueCleanup { queue_name }))
}

#[tokio::test]
async fn enqueue_claim_ack_round_trip() -> Result<()> {
    let (queue, _cleanup) = make_test_queue().await?;

    let items = queue
        .enqueue_items(&[b"hello".to_vec(), b"world".to_vec()])
        .await?;
    assert_eq!(items.len(), 2);
    assert_eq!(queue.queue_length(SublistTag::Unprocessed).await?, 2);

    let claimed = queue.claim_items(2).await?;
    assert_eq!(claimed.len(), 2);
    assert_eq!(queue.queue_length(SublistTag::Unprocessed).await?, 0);
    assert_eq!(queue.queue_length(SublistTag::Working).await?, 2);

    let outcome = queue.mark_items_as_processed(&claimed).await?;
    assert_eq!(outcome.flushed.len(), 2);
    assert!(outcome.failed.is_empty());
    assert_eq!(queue.queue_length(SublistTag::Working).await?, 0);
    Ok(())
}

#[tokio::test]
async fn poison_item_diverges_to_failed() -> Result<()> {
    let (base, _cleanup) = make_test_queue().await?;
    let queue_name = base.queue_name().to_owned();

    // A tight requeue_limit makes the second retry exceed it immediately.
    let config = QueueConfig::new("127.0.0.1", 6379, queue_name).requeue_limit(1);
    let queue = QueueHandle::connect(config).await?;

    queue.enqueue_items(&[b"poison".to_vec()]).await?;
    let item = queue.claim_items(1).await?.remove(0);

    let moved = queue.requeue_busy(std::slice::from_ref(&item)).await?;
    assert_eq!(moved, 1);
    assert_eq!(queue.queue_length(SublistTag::Failed).await?, 1);
    assert_eq!(queue.queue_length(SublistTag::Unprocessed).await?, 0);

    let failed = queue.raw_items_failed(0).await?;
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].metadata.bail_count, 1);
    Ok(())
}

#[tokio::test]
async fn expired_working_item_is_reclaimed() -> Result<()> {
    let (queue, _cleanup) = make_test_queue().await?;

    queue.enqueue_items(&[b"slow".to_vec()]).await?;
    let claimed = queue.claim_items(1).await?;
    assert_eq!(claimed.len(), 1);

    tokio::time::sleep(Duration::from_millis(50)).await;

    let reclaimed = queue
        .handle_expired_items(Duration::from_millis(10), ExpiredItemAction::Requeue)
        .await?;
    assert_eq!(reclaimed.len(), 1);
    assert_eq!(reclaimed[0].payload, b"slow");
    assert_eq!(reclaimed[0].metadata.process_count, 2);
    assert_eq!(queue.queue_length(SublistTag::Unprocessed).await?, 1);
    assert_eq!(queue.queue_length(SublistTag::Working).await?, 0);
    Ok(())
}

#[tokio::test]
async fn bulk_claim_returns_partial_batch_when_supply_is_short() -> Result<()> {
    let (queue, _cleanup) = make_test_queue().await?;

    queue
        .enqueue_items(&[b"a".to_vec(), b"b".to_vec(), b"c".to_vec()])
        .await?;

    let claimed = queue.claim_items_nonblocking(10).await?;
    assert_eq!(claimed.len(), 3);
    assert_eq!(queue.queue_length(SublistTag::Unprocessed).await?, 0);
    Ok(())
}

#[tokio::test]
async fn remove_failed_items_drops_only_past_the_fail_count_threshold() -> Result<()> {
    let (base, _cleanup) = make_test_queue().await?;
    let queue = QueueHandle::connect(
        QueueConfig::new("127.0.0.1", 6379, base.queue_name().to_owned()).requeue_limit(2),
    )
    .await?;

    queue.enqueue_items(&[b"drop-me".to_vec()]).await?;
    let mut current = queue.claim_items(1).await?.remove(0);
    loop {
        queue.requeue_busy(std::slice::from_ref(&current)).await?;
        if queue.queue_length(SublistTag::Failed).await? == 1 {
            break;
        }
        current = queue.claim_items(1).await?.remove(0);
    }

    let outcome = queue
        .remove_failed_items(RemoveFailedItemsOptions {
            min_fail_count: Some(1),
            ..Default::default()
        })
        .await?;
    assert_eq!(outcome.removed, 1);
    assert_eq!(outcome.retained, 0);
    assert_eq!(queue.queue_length(SublistTag::Failed).await?, 0);
    Ok(())
}

#[tokio::test]
async fn peek_does_not_remove_the_item() -> Result<()> {
    let (queue, _cleanup) = make_test_queue().await?;

    queue.enqueue_items(&[b"visible".to_vec()]).await?;

    let peeked = queue
        .peek_item(SublistTag::Unprocessed, PeekDirection::Front)
        .await?
        .ok_or_else(|| anyhow::anyhow!("expected item to be present"))?;
    assert_eq!(peeked.payload, b"visible");
    assert_eq!(queue.queue_length(SublistTag::Unprocessed).await?, 1);

    // Handling an empty _failed area is a no-op, not an error.
    assert_eq!(queue.handle_failed_items(FailedItemAction::Return).await?, 0);
    Ok(())
}
