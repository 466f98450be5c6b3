use std::{fmt::Display, future::Future};

use chrono::{DateTime, TimeDelta, Utc};
use futures::{future::BoxFuture, FutureExt};
use rand::Rng;

pub mod builder;
pub(crate) mod runner;

const HEX_CHARACTERS: &[u8; 16] = b"0123456789abcdef";

/// The default number of characters in a generated [`JobId`].
pub const DEFAULT_ID_LENGTH: usize = 16;

/// An opaque identifier for a job, generated when the job is enqueued.
#[derive(Debug, Eq, PartialEq, Clone, Hash, PartialOrd, Ord)]
pub struct JobId(String);

impl JobId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<JobId> for String {
    fn from(value: JobId) -> Self {
        value.0
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Generates a random identifier of `length` lowercase hexadecimal characters.
///
/// Every character is drawn uniformly and independently. Collisions are astronomically unlikely
/// with the default length and are not checked for.
///
/// ```
/// let id = fnqueue::job::generate_id(16);
///
/// assert_eq!(id.as_str().len(), 16);
/// assert!(id.as_str().bytes().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
/// ```
pub fn generate_id(length: usize) -> JobId {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| HEX_CHARACTERS[rng.gen_range(0..HEX_CHARACTERS.len())] as char)
        .collect::<String>()
        .into()
}

/// The metadata of a job held by the [`crate::QueueManager`].
///
/// This is a snapshot: the queue hands out clones, so mutating it has no effect on the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: JobId,
    /// An optional label used in diagnostics.
    pub name: Option<String>,
    /// Only true while this job is the one being executed.
    pub is_active: bool,
    pub has_errors: bool,
    /// One entry per failed attempt, oldest first.
    pub errors: Vec<JobError>,
    /// The maximum number of additional attempts after the first failure.
    pub retry_times: u16,
    pub number_of_retries: u16,
    pub time_of_entry: DateTime<Utc>,
    /// When the job last finished, either successfully or with its final failure.
    pub end_time: Option<DateTime<Utc>>,
    /// When the most recent failure was recorded.
    pub error_time: Option<DateTime<Utc>>,
}

impl Job {
    pub(crate) fn new(id: JobId, name: Option<String>, retry_times: u16) -> Self {
        Self {
            id,
            name,
            is_active: false,
            has_errors: false,
            errors: Vec::new(),
            retry_times,
            number_of_retries: 0,
            time_of_entry: Utc::now(),
            end_time: None,
            error_time: None,
        }
    }

    /// The 1-based number of the current (or next) attempt.
    pub fn attempt(&self) -> u16 {
        self.number_of_retries.saturating_add(1)
    }

    pub fn is_final_attempt(&self) -> bool {
        self.number_of_retries >= self.retry_times
    }

    /// Time between entering the queue and finishing, if the job has finished.
    pub fn elapsed(&self) -> Option<TimeDelta> {
        self.end_time.map(|end_time| end_time - self.time_of_entry)
    }

    pub(crate) fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("anonymous")
    }
}

/// A failure recorded against a job attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobError {
    pub attempt: u16,
    pub error_type: ErrorType,
    pub message: String,
    pub recorded_at: DateTime<Utc>,
}

impl JobError {
    pub(crate) fn new(error_type: ErrorType, message: impl Into<String>) -> Self {
        Self {
            attempt: 0,
            error_type,
            message: message.into(),
            recorded_at: Utc::now(),
        }
    }

    /// Wraps an error returned by a job function.
    pub fn failed(error: impl Display) -> Self {
        Self::new(ErrorType::Failed, error.to_string())
    }
}

impl Display for JobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (attempt {}): {}", self.error_type, self.attempt, self.message)
    }
}

impl std::error::Error for JobError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorType {
    /// The job function panicked.
    Panic,
    /// A deferred job was dispatched outside of a tokio runtime.
    Runtime,
    /// The job function returned an error.
    Failed,
}

impl Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorType::Panic => write!(f, "panic"),
            ErrorType::Runtime => write!(f, "runtime"),
            ErrorType::Failed => write!(f, "failed"),
        }
    }
}

/// What a job function hands back to the queue.
///
/// The tag tells the drain loop whether the outcome is already known or has to be awaited.
pub enum Execution {
    /// The job ran to completion synchronously.
    Ready(Result<(), JobError>),
    /// The job will complete when the future resolves.
    Deferred(BoxFuture<'static, Result<(), JobError>>),
}

impl Execution {
    /// An already known outcome. The success value is discarded.
    ///
    /// ```
    /// use fnqueue::job::Execution;
    ///
    /// let execution = Execution::ready(Ok::<_, std::fmt::Error>(42));
    /// assert!(matches!(execution, Execution::Ready(Ok(()))));
    /// ```
    pub fn ready<T, E>(result: Result<T, E>) -> Self
    where
        E: Display,
    {
        Self::Ready(result.map(|_| ()).map_err(JobError::failed))
    }

    /// An outcome that is only known once `future` resolves.
    pub fn deferred<F, T, E>(future: F) -> Self
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        E: Display,
    {
        Self::Deferred(
            future
                .map(|result| result.map(|_| ()).map_err(JobError::failed))
                .boxed(),
        )
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred(_))
    }
}

impl std::fmt::Debug for Execution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready(result) => f.debug_tuple("Ready").field(result).finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// A zero argument callable the queue can invoke once per attempt.
pub(crate) type JobFn = Box<dyn FnMut() -> Execution + Send + 'static>;

/// A job waiting in the queue, together with the function to run.
pub(crate) struct QueuedJob {
    pub(crate) job: Job,
    pub(crate) function: JobFn,
}

impl std::ops::Deref for QueuedJob {
    type Target = Job;

    fn deref(&self) -> &Self::Target {
        &self.job
    }
}

impl std::ops::DerefMut for QueuedJob {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.job
    }
}

#[cfg(test)]
pub(crate) mod test {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    };

    use super::*;

    /// Records the order in which job functions are invoked.
    #[derive(Clone, Default)]
    pub(crate) struct CallLog(Arc<Mutex<Vec<&'static str>>>);

    impl CallLog {
        pub(crate) fn record(&self, name: &'static str) {
            self.0.lock().unwrap().push(name);
        }

        pub(crate) fn calls(&self) -> Vec<&'static str> {
            self.0.lock().unwrap().clone()
        }
    }

    #[derive(Debug)]
    pub(crate) struct MockError(pub &'static str);

    impl Display for MockError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    pub(crate) fn succeeding(log: &CallLog, name: &'static str) -> impl FnMut() -> Execution {
        let log = log.clone();
        move || {
            log.record(name);
            Execution::ready(Ok::<_, MockError>(()))
        }
    }

    pub(crate) fn failing(log: &CallLog, name: &'static str) -> impl FnMut() -> Execution {
        let log = log.clone();
        move || {
            log.record(name);
            Execution::ready(Err::<(), _>(MockError("job failed")))
        }
    }

    pub(crate) fn counting(counter: &Arc<AtomicUsize>) -> impl FnMut() -> Execution {
        let counter = counter.clone();
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Execution::ready(Err::<(), _>(MockError("always fails")))
        }
    }

    #[test]
    fn generate_id_is_lowercase_hex_of_given_length() {
        for length in [1, 8, 16, 32] {
            let id = generate_id(length);
            assert_eq!(id.as_str().len(), length);
            assert!(id
                .as_str()
                .chars()
                .all(|c| matches!(c, '0'..='9' | 'a'..='f')));
        }
    }

    #[test]
    fn generate_id_does_not_collide() {
        let ids = (0..10_000)
            .map(|_| generate_id(DEFAULT_ID_LENGTH))
            .collect::<std::collections::HashSet<_>>();

        assert_eq!(ids.len(), 10_000);
        assert!(ids.iter().all(|id| {
            id.as_str().len() == DEFAULT_ID_LENGTH
                && id.as_str().chars().all(|c| matches!(c, '0'..='9' | 'a'..='f'))
        }));
    }

    #[test]
    fn new_job_has_clean_state() {
        let job = Job::new("abc".into(), None, 3);

        assert!(!job.is_active);
        assert!(!job.has_errors);
        assert!(job.errors.is_empty());
        assert_eq!(job.number_of_retries, 0);
        assert_eq!(job.attempt(), 1);
        assert_eq!(job.end_time, None);
        assert_eq!(job.error_time, None);
        assert_eq!(job.elapsed(), None);
        assert!(!job.is_final_attempt());
        assert_eq!(job.label(), "anonymous");
    }

    #[test]
    fn ready_maps_errors_to_failed() {
        let execution = Execution::ready(Err::<(), _>(MockError("boom")));

        match execution {
            Execution::Ready(Err(error)) => {
                assert_eq!(error.error_type, ErrorType::Failed);
                assert_eq!(error.message, "boom");
            }
            other => panic!("unexpected execution {other:?}"),
        }
    }

    #[tokio::test]
    async fn deferred_maps_errors_to_failed() {
        let execution = Execution::deferred(async { Err::<u8, _>(MockError("later")) });
        assert!(execution.is_deferred());

        let Execution::Deferred(future) = execution else {
            panic!("expected a deferred execution");
        };
        let error = future.await.unwrap_err();
        assert_eq!(error.error_type, ErrorType::Failed);
        assert_eq!(error.message, "later");
    }
}
