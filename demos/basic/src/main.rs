use std::time::Duration;

use fnqueue::prelude::*;
use futures::{FutureExt, StreamExt};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("Some error")]
struct SomeError;

#[tokio::main]
pub async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let queue = QueueManager::new(Capacity::Ten);

    let mut events = queue.events().boxed();
    let reporter = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            if event.is_terminal() {
                println!("Finished: {event:?}");
            }
        }
    });

    let jobs = [
        JobBuilder::sync(|| {
            println!("Sync Function 1");
            Ok::<_, SomeError>(())
        })
        .with_name("sync_fn_1"),
        JobBuilder::deferred(|| async { Err::<(), _>(SomeError) })
            .with_name("async_fn_1")
            .with_retry_times(5),
        JobBuilder::sync(|| Err::<(), _>(SomeError))
            .with_name("sync_fn_2")
            .with_retry_times(7),
        JobBuilder::deferred(|| {
            println!("Async Function 2");
            tokio::time::sleep(Duration::from_millis(500)).map(Ok::<_, SomeError>)
        })
        .with_name("async_fn_2"),
        JobBuilder::sync(|| {
            println!("Sync Function 3");
            Ok::<_, SomeError>(())
        })
        .with_name("sync_fn_3"),
        JobBuilder::deferred(|| {
            println!("Async Function 3");
            tokio::time::sleep(Duration::from_millis(700)).map(Ok::<_, SomeError>)
        })
        .with_name("async_fn_3"),
    ];

    for job in jobs {
        match job.enqueue(&queue) {
            Ok(job_id) => println!("Inserted job {job_id}"),
            Err(error) => println!("Failed to insert job: {error}"),
        }
    }

    queue.wait_until_idle().await;
    drop(queue);
    let _ = tokio::time::timeout(Duration::from_secs(1), reporter).await;
}
