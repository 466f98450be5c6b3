use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
};

use futures::future::BoxFuture;
use tokio::{runtime::Handle, task::JoinError};

use super::{ErrorType, Execution, JobError, JobFn};

/// The result of invoking a job function once.
pub(crate) enum Dispatch {
    Complete(Result<(), JobError>),
    Deferred(BoxFuture<'static, Result<(), JobError>>),
}

/// Invokes the job function, turning a panic raised before it returns into a failed attempt.
pub(crate) fn dispatch(function: &mut JobFn) -> Dispatch {
    match panic::catch_unwind(AssertUnwindSafe(|| function())) {
        Ok(Execution::Ready(result)) => Dispatch::Complete(result),
        Ok(Execution::Deferred(future)) => Dispatch::Deferred(future),
        Err(panic) => Dispatch::Complete(Err(JobError::new(
            ErrorType::Panic,
            panic_message(panic),
        ))),
    }
}

/// Drives a deferred job on its own task so a panic inside the future is caught by the runtime.
pub(crate) async fn complete_deferred(
    handle: &Handle,
    future: BoxFuture<'static, Result<(), JobError>>,
) -> Result<(), JobError> {
    match handle.spawn(future).await {
        Ok(result) => result,
        Err(error) => Err(error.into()),
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    panic
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "job panicked".to_owned())
}

impl From<JoinError> for JobError {
    fn from(value: JoinError) -> Self {
        if value.is_cancelled() {
            return Self::new(ErrorType::Runtime, value.to_string());
        }
        let msg = value.to_string();
        let message = match value.try_into_panic() {
            Ok(panic) => panic_message(panic),
            Err(_) => msg,
        };
        Self::new(ErrorType::Panic, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_ready_success() {
        let mut function: JobFn = Box::new(|| Execution::ready(Ok::<_, String>(())));
        assert!(matches!(dispatch(&mut function), Dispatch::Complete(Ok(()))));
    }

    #[test]
    fn dispatch_captures_panics() {
        let mut function: JobFn = Box::new(|| -> Execution { panic!("job exploded") });

        let error = match dispatch(&mut function) {
            Dispatch::Complete(Err(error)) => error,
            _ => panic!("expected the panic to be captured"),
        };
        assert_eq!(error.error_type, ErrorType::Panic);
        assert_eq!(error.message, "job exploded");
    }

    #[test]
    fn dispatch_captures_formatted_panics() {
        let code = 7;
        let mut function: JobFn =
            Box::new(move || -> Execution { panic!("job exploded with {code}") });

        let error = match dispatch(&mut function) {
            Dispatch::Complete(Err(error)) => error,
            _ => panic!("expected the panic to be captured"),
        };
        assert_eq!(error.message, "job exploded with 7");
    }

    #[tokio::test]
    async fn deferred_panic_becomes_job_error() {
        let mut function: JobFn = Box::new(|| {
            Execution::deferred(async {
                if true {
                    panic!("async exploded");
                }
                Ok::<_, String>(())
            })
        });

        let Dispatch::Deferred(future) = dispatch(&mut function) else {
            panic!("expected a deferred dispatch");
        };
        let error = complete_deferred(&Handle::current(), future)
            .await
            .unwrap_err();
        assert_eq!(error.error_type, ErrorType::Panic);
        assert_eq!(error.message, "async exploded");
    }

    #[tokio::test]
    async fn deferred_result_is_passed_through() {
        let mut function: JobFn = Box::new(|| Execution::deferred(async { Err::<(), _>("nope") }));

        let Dispatch::Deferred(future) = dispatch(&mut function) else {
            panic!("expected a deferred dispatch");
        };
        let error = complete_deferred(&Handle::current(), future)
            .await
            .unwrap_err();
        assert_eq!(error.error_type, ErrorType::Failed);
        assert_eq!(error.message, "nope");
    }

    #[tokio::test]
    async fn cancelled_task_is_a_runtime_error() {
        let task = tokio::spawn(std::future::pending::<()>());
        task.abort();

        let error = JobError::from(task.await.unwrap_err());
        assert_eq!(error.error_type, ErrorType::Runtime);
        assert!(error.message.contains("cancelled"));
    }
}
