//! The [`QueueManager`] and its drain loop.
//!
//! Jobs are executed strictly one at a time in the order they reach the front of the queue.
//! Every outcome of a job (success, retry, or final failure) immediately starts the next one, so
//! the only external trigger the loop needs is [`QueueManager::enqueue`].
//!
//! # Example
//!
//! ```
//! use fnqueue::prelude::*;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
//! let queue = QueueManager::new(Capacity::Five);
//!
//! queue.enqueue_sync(|| Ok::<_, std::fmt::Error>("Sync Function 1")).unwrap();
//! queue
//!     .enqueue_async(|| async {
//!         tokio::time::sleep(std::time::Duration::from_millis(5)).await;
//!         Ok::<_, std::fmt::Error>(())
//!     })
//!     .unwrap();
//!
//! queue.wait_until_idle().await;
//! assert!(queue.is_empty());
//! # });
//! ```
use std::{
    collections::VecDeque,
    fmt::Display,
    future::Future,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use chrono::Utc;
use futures::Stream;
use fxhash::FxHashSet;
use tokio::{
    runtime::Handle,
    sync::{broadcast, Notify},
};

use crate::{
    events::{self, Notifier, QueueEvent},
    job::{
        builder::EnqueueOptions,
        generate_id,
        runner::{self, Dispatch},
        ErrorType, Execution, Job, JobError, JobFn, JobId, QueuedJob,
    },
    Capacity, QueueConfig, QueueError,
};

/// A capacity bounded queue executing one function at a time.
///
/// The manager is a cheap handle: clones share the same queue. Separately constructed managers
/// are fully independent.
#[derive(Clone, Default)]
pub struct QueueManager {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    config: QueueConfig,
    state: Mutex<State>,
    notifier: Notifier,
    idle: Notify,
}

#[derive(Default)]
struct State {
    pending: VecDeque<QueuedJob>,
    /// Snapshot of the job currently executing.
    active: Option<Job>,
    is_processing: bool,
    /// Ids of jobs that are pending or executing.
    tracked: FxHashSet<JobId>,
    paused: bool,
}

impl State {
    fn is_full(&self, capacity: Capacity) -> bool {
        self.pending.len() >= capacity.get()
    }
}

impl std::fmt::Debug for QueueManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("QueueManager")
            .field("capacity", &self.inner.config.capacity)
            .field("pending", &state.pending.len())
            .field("active_job_id", &state.active.as_ref().map(|job| &job.id))
            .field("is_processing", &state.is_processing)
            .field("paused", &state.paused)
            .finish()
    }
}

impl QueueManager {
    pub fn new(capacity: Capacity) -> Self {
        Self::with_config(QueueConfig::new(capacity))
    }

    pub fn with_config(config: QueueConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(State {
                    paused: config.paused,
                    ..Default::default()
                }),
                notifier: Default::default(),
                idle: Notify::new(),
            }),
        }
    }

    /// Stops the drain loop from starting jobs until [`QueueManager::resume`] is called.
    ///
    /// Useful for staging several jobs before any of them runs. A job that is already executing
    /// is not affected.
    pub fn paused(self) -> Self {
        self.pause();
        self
    }

    pub fn pause(&self) {
        self.state().paused = true;
    }

    /// Clears the paused flag and starts draining the queue.
    pub fn resume(&self) {
        self.state().paused = false;
        self.process_queue();
    }

    pub fn is_paused(&self) -> bool {
        self.state().paused
    }

    /// Submits a job with the default options.
    ///
    /// Returns the id of the job, or [`QueueError::QueueFull`] when the queue already holds
    /// [`QueueManager::capacity`] jobs. A rejected job is never run.
    pub fn enqueue<F>(&self, function: F) -> Result<JobId, QueueError>
    where
        F: FnMut() -> Execution + Send + 'static,
    {
        self.enqueue_with_options(function, EnqueueOptions::default())
    }

    pub fn enqueue_with_options<F>(
        &self,
        function: F,
        options: EnqueueOptions,
    ) -> Result<JobId, QueueError>
    where
        F: FnMut() -> Execution + Send + 'static,
    {
        self.enqueue_boxed(Box::new(function), options)
    }

    /// Submits a function whose outcome is known as soon as it returns.
    pub fn enqueue_sync<F, T, E>(&self, mut function: F) -> Result<JobId, QueueError>
    where
        F: FnMut() -> Result<T, E> + Send + 'static,
        E: Display,
    {
        self.enqueue(move || Execution::ready(function()))
    }

    /// Submits a function returning a future; the job completes when the future resolves.
    ///
    /// Deferred jobs are driven on the tokio runtime the queue is used from.
    pub fn enqueue_async<F, Fut, T, E>(&self, mut function: F) -> Result<JobId, QueueError>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Display,
    {
        self.enqueue(move || Execution::deferred(function()))
    }

    pub(crate) fn enqueue_boxed(
        &self,
        function: JobFn,
        options: EnqueueOptions,
    ) -> Result<JobId, QueueError> {
        let capacity = self.inner.config.capacity;
        let job_id = {
            let mut state = self.state();
            if state.is_full(capacity) {
                drop(state);
                tracing::warn!(%capacity, "Queue is already full");
                self.inner.notifier.notify(QueueEvent::Rejected {
                    capacity,
                    at: Utc::now(),
                });
                return Err(QueueError::QueueFull { capacity });
            }

            let job_id = self.generate_id();
            let job = Job::new(
                job_id.clone(),
                options.name,
                options.retry_times.unwrap_or(self.inner.config.retry_times),
            );
            self.inner.notifier.notify(QueueEvent::Enqueued {
                id: job_id.clone(),
                at: job.time_of_entry,
            });
            state.pending.push_back(QueuedJob { job, function });
            state.tracked.insert(job_id.clone());
            job_id
        };
        tracing::debug!(%job_id, "Enqueued job {job_id}");

        self.process_queue();

        Ok(job_id)
    }

    /// Runs jobs from the front of the queue until it is empty or a deferred job is in flight.
    ///
    /// Does nothing while another job is executing or the queue is paused, so it is safe to call
    /// at any time, including from inside a job.
    pub fn process_queue(&self) {
        loop {
            let mut job = {
                let mut state = self.state();
                if state.is_processing {
                    return;
                }
                let next = if state.paused {
                    None
                } else {
                    state.pending.pop_front()
                };
                let Some(mut job) = next else {
                    let is_idle = state.pending.is_empty();
                    drop(state);
                    if is_idle {
                        self.inner.idle.notify_waiters();
                    }
                    return;
                };
                state.is_processing = true;
                job.is_active = true;
                state.active = Some(job.job.clone());
                // Events are sent under the lock so subscribers see them in lifecycle order.
                self.inner.notifier.notify(QueueEvent::Started {
                    id: job.id.clone(),
                    attempt: job.attempt(),
                    at: Utc::now(),
                });
                job
            };

            let job_id = &job.id;
            tracing::debug!(
                %job_id,
                attempt = job.attempt(),
                "Executing job {job_id} ({})",
                job.label(),
            );

            match runner::dispatch(&mut job.function) {
                Dispatch::Complete(result) => self.finish(job, result),
                Dispatch::Deferred(future) => match Handle::try_current() {
                    Ok(handle) => {
                        let in_flight = InFlight {
                            queue: self.clone(),
                            job: Some(job),
                        };
                        handle.spawn({
                            let handle = handle.clone();
                            async move {
                                let result = runner::complete_deferred(&handle, future).await;
                                in_flight.complete(result);
                            }
                        });
                        return;
                    }
                    Err(error) => self.finish(
                        job,
                        Err(JobError::new(ErrorType::Runtime, error.to_string())),
                    ),
                },
            }
        }
    }

    /// Records the outcome of an attempt and releases the processing slot.
    fn finish(&self, job: QueuedJob, result: Result<(), JobError>) {
        match result {
            Ok(()) => self.handle_success(job),
            Err(error) => self.handle_error(job, error),
        }
    }

    fn handle_success(&self, mut job: QueuedJob) {
        let end_time = Utc::now();
        job.is_active = false;
        job.end_time = Some(end_time);
        let elapsed = end_time - job.time_of_entry;
        {
            let mut state = self.state();
            self.inner.notifier.notify(QueueEvent::Completed {
                id: job.id.clone(),
                elapsed,
                at: end_time,
            });
            state.is_processing = false;
            state.active = None;
            state.tracked.remove(&job.id);
        }

        let job_id = &job.id;
        let seconds = elapsed.num_milliseconds() as f64 / 1000.0;
        tracing::info!(%job_id, seconds, "({}) of id: {job_id} took {seconds}s", job.label());
    }

    fn handle_error(&self, mut job: QueuedJob, mut error: JobError) {
        let now = Utc::now();
        error.attempt = job.attempt();
        job.has_errors = true;
        job.error_time = Some(now);
        job.is_active = false;
        job.errors.push(error.clone());

        let job_id = job.id.clone();
        let mut state = self.state();
        state.is_processing = false;
        state.active = None;

        if job.number_of_retries < job.retry_times {
            job.number_of_retries += 1;
            let retry = job.number_of_retries;
            tracing::warn!(
                %job_id,
                ?error,
                "Retrying {} for {retry} time(s): {error}",
                job.label(),
            );
            self.inner.notifier.notify(QueueEvent::Retrying {
                id: job_id,
                retry,
                error,
            });
            state.pending.push_back(job);
        } else {
            job.end_time = Some(now);
            tracing::error!(
                %job_id,
                ?error,
                "Job {job_id} ({}) failed and will be discarded after {} attempt(s): {error}",
                job.label(),
                job.attempt(),
            );
            self.inner.notifier.notify(QueueEvent::Discarded {
                id: job_id.clone(),
                errors: job.job.errors,
                at: now,
            });
            state.tracked.remove(&job_id);
        }
    }

    /// Generates a fresh id with the configured length.
    pub fn generate_id(&self) -> JobId {
        generate_id(self.inner.config.id_length)
    }

    /// Looks up a job by id, searching the executing job and then the pending jobs.
    pub fn get_active_job(&self, id: &JobId) -> Option<Job> {
        let state = self.state();
        state
            .active
            .iter()
            .chain(state.pending.iter().map(|job| &job.job))
            .find(|job| &job.id == id)
            .cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.state().pending.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.state().is_full(self.inner.config.capacity)
    }

    /// The number of pending jobs, not counting the one executing.
    pub fn len(&self) -> usize {
        self.state().pending.len()
    }

    pub fn capacity(&self) -> Capacity {
        self.inner.config.capacity
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    pub fn active_job_id(&self) -> Option<JobId> {
        self.state().active.as_ref().map(|job| job.id.clone())
    }

    pub fn active_job(&self) -> Option<Job> {
        self.state().active.clone()
    }

    /// A snapshot of the pending jobs, front of the queue first.
    pub fn pending(&self) -> Vec<Job> {
        self.state()
            .pending
            .iter()
            .map(|job| job.job.clone())
            .collect()
    }

    pub fn is_processing(&self) -> bool {
        self.state().is_processing
    }

    /// True while the job is pending or executing.
    pub fn contains(&self, id: &JobId) -> bool {
        self.state().tracked.contains(id)
    }

    /// True when no job is pending and none is executing.
    pub fn is_idle(&self) -> bool {
        let state = self.state();
        !state.is_processing && state.pending.is_empty()
    }

    /// Waits until no job is pending and none is executing.
    ///
    /// On a paused queue holding jobs this only returns once the queue is resumed and drained.
    pub async fn wait_until_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.inner.notifier.subscribe()
    }

    /// A stream of every [`QueueEvent`] produced after this call.
    pub fn events(&self) -> impl Stream<Item = QueueEvent> {
        events::into_stream(self.subscribe())
    }

    fn wake_if_idle(&self) {
        if self.is_idle() {
            self.inner.idle.notify_waiters();
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // Job functions never run while the lock is held, so a poisoned state is still consistent.
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// A deferred job whose future is being driven on a spawned task.
///
/// If the task is dropped before the future resolves, for instance because its runtime shut
/// down, the attempt is recorded as a runtime failure so the slot is not held forever.
struct InFlight {
    queue: QueueManager,
    job: Option<QueuedJob>,
}

impl InFlight {
    fn complete(mut self, result: Result<(), JobError>) {
        if let Some(job) = self.job.take() {
            self.queue.finish(job, result);
        }
        self.queue.process_queue();
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let Some(job) = self.job.take() else {
            return;
        };
        let job_id = &job.id;
        tracing::warn!(%job_id, "Job {job_id} ({}) was dropped before it completed", job.label());
        let error = JobError::new(
            ErrorType::Runtime,
            "the task driving the job was dropped before it completed",
        );
        // The next attempt is left for the next call to `process_queue`, the runtime may be
        // shutting down.
        self.queue.finish(job, Err(error));
        self.queue.wake_if_idle();
    }
}
