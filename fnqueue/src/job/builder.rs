use std::{fmt::Display, future::Future};

use crate::{QueueError, QueueManager};

use super::{Execution, JobFn, JobId};

/// Per job options accepted by [`QueueManager::enqueue_with_options`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnqueueOptions {
    /// Overrides [`crate::QueueConfig::retry_times`] for this job.
    pub retry_times: Option<u16>,
    pub name: Option<String>,
}

impl EnqueueOptions {
    pub fn with_retry_times(self, retry_times: u16) -> Self {
        Self {
            retry_times: Some(retry_times),
            ..self
        }
    }

    pub fn with_name(self, name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..self
        }
    }
}

/// Builds a job and submits it to a [`QueueManager`].
///
/// # Example
///
/// ```
/// use fnqueue::prelude::*;
///
/// let queue = QueueManager::new(Capacity::Three).paused();
///
/// let job_id = JobBuilder::sync(|| Ok::<_, std::fmt::Error>(()))
///     .with_retry_times(3)
///     .with_name("sync_fn")
///     .enqueue(&queue)
///     .unwrap();
///
/// let job = queue.get_active_job(&job_id).unwrap();
/// assert_eq!(job.retry_times, 3);
/// assert_eq!(job.name.as_deref(), Some("sync_fn"));
/// ```
pub struct JobBuilder {
    function: JobFn,
    options: EnqueueOptions,
}

impl JobBuilder {
    /// A job from a function returning an explicit [`Execution`].
    pub fn new<F>(function: F) -> Self
    where
        F: FnMut() -> Execution + Send + 'static,
    {
        Self {
            function: Box::new(function),
            options: EnqueueOptions::default(),
        }
    }

    /// A job whose outcome is known as soon as the function returns.
    pub fn sync<F, T, E>(mut function: F) -> Self
    where
        F: FnMut() -> Result<T, E> + Send + 'static,
        E: Display,
    {
        Self::new(move || Execution::ready(function()))
    }

    /// A job whose outcome is known once the returned future resolves.
    pub fn deferred<F, Fut, T, E>(mut function: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Display,
    {
        Self::new(move || Execution::deferred(function()))
    }

    pub fn with_retry_times(self, retry_times: u16) -> Self {
        Self {
            options: self.options.with_retry_times(retry_times),
            ..self
        }
    }

    pub fn with_name(self, name: impl Into<String>) -> Self {
        Self {
            options: self.options.with_name(name),
            ..self
        }
    }

    pub fn enqueue(self, queue: &QueueManager) -> Result<JobId, QueueError> {
        queue.enqueue_boxed(self.function, self.options)
    }
}
