//! End-to-end consumer behaviour against the in-memory lease queue.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::*;
use pgmq_events::{
    Consumer, ConsumerError, ConsumerState, HandlerError, HandlerTable, QueueClient, StopReason,
};
use serde_json::json;

fn consumer(
    queue: &Arc<pgmq_events::InMemoryQueue>,
    handlers: HandlerTable,
    config: pgmq_events::ConsumerConfig,
) -> Consumer {
    Consumer::new(queue.clone(), registry(), Arc::new(handlers), config).expect("valid consumer")
}

#[tokio::test]
async fn test_every_published_event_reaches_its_handler() {
    let (queue, publisher) = queue_and_publisher().await;
    publish_values(&publisher, 0..3).await;

    let counter = Arc::new(AtomicUsize::new(0));
    let mut handlers = HandlerTable::new();
    handlers.on_event(counting_handler(&counter));

    let consumer = consumer(&queue, handlers, fast_config());
    let watcher = stop_when_empty(queue.clone(), consumer.stop_flag());

    let summary = consumer.run().await.unwrap();
    watcher.await.unwrap();

    assert_eq!(counter.load(Ordering::SeqCst), 3);
    assert!(queue.is_empty(QUEUE));
    assert_eq!(summary.dispatched, 3);
    assert_eq!(summary.deleted, 3);
    assert_eq!(summary.stop_reason, Some(StopReason::StopFlag));
    assert_eq!(summary.final_state, ConsumerState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_slow_handler_times_out_and_processing_continues() {
    let (queue, publisher) = queue_and_publisher().await;
    publish_values(&publisher, [0, 1]).await;

    let finished = Arc::new(AtomicUsize::new(0));
    let seen = finished.clone();
    let mut handlers = HandlerTable::new();
    handlers.on_event_named("sometimes_slow", move |event: Arc<TypeA>| {
        let seen = seen.clone();
        async move {
            if event.value == 0 {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });

    let consumer = consumer(&queue, handlers, fast_config());
    let watcher = stop_when_empty(queue.clone(), consumer.stop_flag());

    let summary = consumer.run().await.unwrap();
    watcher.await.unwrap();

    // Only the fast invocation finished; the slow one was cut off at 1s
    assert_eq!(finished.load(Ordering::SeqCst), 1);
    assert_eq!(summary.deleted, 2);
    assert!(queue.is_empty(QUEUE));
}

#[tokio::test]
async fn test_unknown_type_is_left_for_redelivery() {
    let (queue, publisher) = queue_and_publisher().await;
    queue
        .send_one(QUEUE, &json!({"_type": "GhostEvent", "haunts": true}), 0)
        .await
        .unwrap();
    publish_values(&publisher, [7]).await;

    let counter = Arc::new(AtomicUsize::new(0));
    let mut handlers = HandlerTable::new();
    handlers.on_event(counting_handler(&counter));

    let consumer = consumer(&queue, handlers, fast_config());
    let observed = counter.clone();
    let watched = queue.clone();
    let watcher = stop_when(consumer.stop_flag(), move || {
        observed.load(Ordering::SeqCst) == 1 && watched.len(QUEUE) == 1
    });

    let summary = consumer.run().await.unwrap();
    watcher.await.unwrap();

    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert!(summary.decode_failures >= 1);
    assert_eq!(summary.deleted, 1);

    let remaining = queue.payloads(QUEUE);
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0]["_type"], "GhostEvent");
}

#[tokio::test]
async fn test_end_event_stops_reading_after_batch_finishes() {
    let (queue, publisher) = queue_and_publisher().await;
    publish_values(&publisher, [1, 2, 3]).await;
    publisher.publish_end(Some(5.0)).await.unwrap();
    publish_values(&publisher, [4, 5]).await;

    let counter = Arc::new(AtomicUsize::new(0));
    let mut handlers = HandlerTable::new();
    handlers.on_event(counting_handler(&counter));

    let consumer = consumer(&queue, handlers, fast_config().with_batch_size(4));
    let summary = consumer.run().await.unwrap();

    assert_eq!(counter.load(Ordering::SeqCst), 3);
    assert_eq!(summary.read, 4);
    assert_eq!(summary.stop_reason, Some(StopReason::End));
    assert_eq!(queue.read_calls(), 1);

    let remaining: Vec<i64> = queue
        .payloads(QUEUE)
        .iter()
        .filter_map(|payload| payload["value"].as_i64())
        .collect();
    assert_eq!(remaining, vec![4, 5]);
}

#[tokio::test]
async fn test_interrupt_event_drains_and_reports_interrupt() {
    let (queue, publisher) = queue_and_publisher().await;
    publish_values(&publisher, [1, 2]).await;
    publisher.publish_interrupt().await.unwrap();
    publish_values(&publisher, [3, 4]).await;

    let counter = Arc::new(AtomicUsize::new(0));
    let seen = counter.clone();
    let mut handlers = HandlerTable::new();
    handlers.on_event_named("slowish", move |_event: Arc<TypeA>| {
        let seen = seen.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });

    let consumer = consumer(&queue, handlers, fast_config().with_batch_size(3));
    let summary = match consumer.run().await {
        Err(ConsumerError::Interrupted { summary }) => summary,
        other => panic!("expected an interrupt, got {other:?}"),
    };
    // Spawned work was drained before returning
    assert_eq!(counter.load(Ordering::SeqCst), 2);
    assert_eq!(summary.dispatched, 3);
    assert_eq!(summary.stop_reason, Some(StopReason::Interrupt));
    assert_eq!(queue.len(QUEUE), 2);
}

#[tokio::test]
async fn test_handler_end_signal_keeps_its_envelope() {
    let (queue, publisher) = queue_and_publisher().await;
    publish_values(&publisher, [1, 99, 2]).await;

    let counter = Arc::new(AtomicUsize::new(0));
    let mut handlers = HandlerTable::new();
    handlers
        .on_event(counting_handler(&counter))
        .on_event_named("ender", |event: Arc<TypeA>| async move {
            if event.value == 99 {
                return Err(HandlerError::End);
            }
            Ok(())
        });

    let consumer = consumer(&queue, handlers, fast_config());
    let summary = consumer.run().await.unwrap();

    // The sibling handler still saw all three events
    assert_eq!(counter.load(Ordering::SeqCst), 3);
    assert_eq!(summary.stop_reason, Some(StopReason::End));
    assert_eq!(summary.deleted, 2);
    assert_eq!(queue.payloads(QUEUE), vec![json!({"_type": "TypeA", "value": 99})]);
}

#[tokio::test]
async fn test_faults_and_panics_still_delete() {
    let (queue, publisher) = queue_and_publisher().await;
    publish_values(&publisher, [1, 2]).await;

    let counter = Arc::new(AtomicUsize::new(0));
    let mut handlers = HandlerTable::new();
    handlers
        .on_event_named("failing", |_event: Arc<TypeA>| async {
            Err(HandlerError::from(anyhow::anyhow!("downstream unavailable")))
        })
        .on_event_named("panicking", |event: Arc<TypeA>| async move {
            if event.value == 2 {
                panic!("unexpected value");
            }
            Ok(())
        })
        .on_event(counting_handler(&counter));

    let consumer = consumer(&queue, handlers, fast_config());
    let watcher = stop_when_empty(queue.clone(), consumer.stop_flag());
    let summary = consumer.run().await.unwrap();
    watcher.await.unwrap();

    assert_eq!(counter.load(Ordering::SeqCst), 2);
    assert_eq!(summary.deleted, 2);
    assert!(queue.is_empty(QUEUE));
}

#[tokio::test]
async fn test_transient_read_failures_are_retried() {
    let (queue, publisher) = queue_and_publisher().await;
    publish_values(&publisher, [1]).await;
    queue.fail_next_reads(2);

    let counter = Arc::new(AtomicUsize::new(0));
    let mut handlers = HandlerTable::new();
    handlers.on_event(counting_handler(&counter));

    let consumer = consumer(&queue, handlers, fast_config());
    let watcher = stop_when_empty(queue.clone(), consumer.stop_flag());
    let summary = consumer.run().await.unwrap();
    watcher.await.unwrap();

    assert_eq!(summary.read_errors, 2);
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_events_without_handlers_are_consumed() {
    let (queue, publisher) = queue_and_publisher().await;
    publisher
        .publish_event(
            &TypeB {
                label: "unhandled".to_string(),
                tags: vec![],
            },
            None,
        )
        .await
        .unwrap();
    publisher.publish_end(None).await.unwrap();

    let consumer = consumer(&queue, HandlerTable::new(), fast_config());
    let summary = consumer.run().await.unwrap();

    assert_eq!(summary.dispatched, 2);
    assert_eq!(summary.deleted, 2);
    assert!(queue.is_empty(QUEUE));
}

#[tokio::test(start_paused = true)]
async fn test_lease_expiry_redelivers_escalated_envelope() {
    let (queue, publisher) = queue_and_publisher().await;
    publish_values(&publisher, [99]).await;

    let mut handlers = HandlerTable::new();
    handlers.on_event(|_event: Arc<TypeA>| async { Err(HandlerError::End) });
    let handlers = Arc::new(handlers);

    let first = Consumer::new(queue.clone(), registry(), handlers.clone(), fast_config()).unwrap();
    first.run().await.unwrap();
    assert_eq!(queue.visible_len(QUEUE), 0);

    tokio::time::advance(Duration::from_secs(3)).await;
    assert_eq!(queue.visible_len(QUEUE), 1);

    let second = Consumer::new(queue.clone(), registry(), handlers, fast_config()).unwrap();
    let summary = second.run().await.unwrap();
    assert_eq!(summary.read, 1);
}

#[tokio::test]
async fn test_envelope_with_unknown_fields_is_not_deleted() {
    let (queue, publisher) = queue_and_publisher().await;
    queue
        .send_one(
            QUEUE,
            &json!({"_type": "TypeA", "value": 1, "customer_id": 42}),
            0,
        )
        .await
        .unwrap();
    publish_values(&publisher, [2]).await;

    let counter = Arc::new(AtomicUsize::new(0));
    let mut handlers = HandlerTable::new();
    handlers.on_event(counting_handler(&counter));

    let consumer = consumer(&queue, handlers, fast_config());
    let observed = counter.clone();
    let watched = queue.clone();
    let watcher = stop_when(consumer.stop_flag(), move || {
        observed.load(Ordering::SeqCst) == 1 && watched.len(QUEUE) == 1
    });

    let summary = consumer.run().await.unwrap();
    watcher.await.unwrap();

    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert!(summary.decode_failures >= 1);
    assert_eq!(summary.deleted, 1);

    let remaining = queue.payloads(QUEUE);
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0]["customer_id"], 42);
}

#[tokio::test(start_paused = true)]
async fn test_two_consumers_each_take_one_end_event() {
    let (queue, publisher) = queue_and_publisher().await;
    publish_values(&publisher, 0..3).await;
    publisher.publish_end(None).await.unwrap();
    publisher.publish_end(None).await.unwrap();

    let counter = Arc::new(AtomicUsize::new(0));
    let mut handlers = HandlerTable::new();
    handlers.on_event(counting_handler(&counter));
    let handlers = Arc::new(handlers);

    let first = Consumer::new(queue.clone(), registry(), handlers.clone(), fast_config()).unwrap();
    let second = Consumer::new(queue.clone(), registry(), handlers, fast_config()).unwrap();

    let (first, second) = tokio::time::timeout(Duration::from_secs(30), async {
        tokio::join!(first.run(), second.run())
    })
    .await
    .expect("both consumers stop");
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_eq!(counter.load(Ordering::SeqCst), 3);
    assert!(queue.is_empty(QUEUE));
    assert_eq!(first.stop_reason, Some(StopReason::End));
    assert_eq!(second.stop_reason, Some(StopReason::End));
    assert_eq!(first.dispatched + second.dispatched, 5);
    assert_eq!(first.deleted + second.deleted, 5);
}
