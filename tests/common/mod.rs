//! Shared fixtures for consumer and publisher integration tests.
#![allow(dead_code)]

pub mod strategies;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pgmq_events::{
    ConsumerConfig, Event, EventRegistry, HandlerResult, InMemoryQueue, Publisher, StopFlag,
};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

pub const QUEUE: &str = "integration_events";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeA {
    pub value: i64,
}

impl Event for TypeA {
    const TYPE_NAME: &'static str = "TypeA";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeB {
    pub label: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Event for TypeB {
    const TYPE_NAME: &'static str = "TypeB";
}

pub fn registry() -> Arc<EventRegistry> {
    let mut registry = EventRegistry::new();
    registry
        .register::<TypeA>()
        .and_then(|registry| registry.register::<TypeB>())
        .expect("register test events");
    Arc::new(registry)
}

/// Short delays so scenarios finish quickly in real time
pub fn fast_config() -> ConsumerConfig {
    ConsumerConfig::new(QUEUE)
        .with_batch_size(10)
        .with_handler_timeout(Duration::from_secs(1))
        .with_empty_poll_delay(Duration::from_millis(5))
        .with_error_backoff(Duration::from_millis(10))
}

pub async fn queue_and_publisher() -> (Arc<InMemoryQueue>, Publisher) {
    let queue = Arc::new(InMemoryQueue::new());
    let publisher = Publisher::new(queue.clone(), QUEUE)
        .await
        .expect("create publisher");
    (queue, publisher)
}

pub async fn publish_values(publisher: &Publisher, values: impl IntoIterator<Item = i64>) {
    for value in values {
        publisher
            .publish_event(&TypeA { value }, None)
            .await
            .expect("publish TypeA");
    }
}

/// Handler that counts every `TypeA` it sees
pub fn counting_handler(
    counter: &Arc<AtomicUsize>,
) -> impl Fn(Arc<TypeA>) -> futures::future::BoxFuture<'static, HandlerResult> + Send + Sync + 'static
{
    use futures::FutureExt;

    let counter = counter.clone();
    move |_event| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        .boxed()
    }
}

/// Raise `stop` once `condition` holds, polling every few milliseconds
pub fn stop_when<F>(stop: StopFlag, condition: F) -> JoinHandle<()>
where
    F: Fn() -> bool + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            if condition() {
                stop.stop();
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
}

/// Raise `stop` once the test queue holds no messages at all
pub fn stop_when_empty(queue: Arc<InMemoryQueue>, stop: StopFlag) -> JoinHandle<()> {
    stop_when(stop, move || queue.is_empty(QUEUE))
}
