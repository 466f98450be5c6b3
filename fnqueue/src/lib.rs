//! A capacity bounded queue that executes submitted functions one at a time.
//!
//! Functions are run in first in, first out order. A function may complete synchronously or hand
//! back a future, see [`job::Execution`]; either way the next job only starts once the current one
//! has finished. Failed jobs are retried by putting them back at the end of the queue, up to a per
//! job retry budget.
//!
//! # Example
//!
//! ```
//! use fnqueue::prelude::*;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
//! let queue = QueueManager::new(Capacity::One);
//!
//! // Synchronous jobs run, and are retried, inside the call to enqueue.
//! let job_id = JobBuilder::sync(|| Err::<(), _>("Some error"))
//!     .with_retry_times(2)
//!     .enqueue(&queue)
//!     .unwrap();
//! assert!(!queue.contains(&job_id));
//!
//! // A deferred job holds the execution slot until its future resolves.
//! queue.enqueue_async(|| async { Ok::<_, String>(()) }).unwrap();
//! queue.enqueue_sync(|| Ok::<_, String>(())).unwrap();
//! assert_eq!(queue.len(), 1);
//! assert!(matches!(
//!     queue.enqueue_sync(|| Ok::<_, String>(())),
//!     Err(QueueError::QueueFull { capacity: Capacity::One })
//! ));
//!
//! queue.wait_until_idle().await;
//! assert!(queue.is_empty());
//! # });
//! ```
pub mod capacity;
pub mod config;
pub mod events;
pub mod job;
pub mod manager;
pub mod prelude;

pub use capacity::Capacity;
pub use config::QueueConfig;
pub use manager::QueueManager;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Queue is already full, capacity {capacity}")]
    QueueFull { capacity: Capacity },
    #[error("Invalid queue capacity {0}, expected one of 1, 2, 3, 5, 10, 15 or 20")]
    InvalidCapacity(usize),
}
