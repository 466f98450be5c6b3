//! Notifications about the lifecycle of jobs.
//!
//! The return value of [`crate::QueueManager::enqueue`] only says whether a job was admitted.
//! Callers interested in what happened afterwards can subscribe to [`QueueEvent`]s.
use chrono::{DateTime, TimeDelta, Utc};
use futures::Stream;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::{
    job::{JobError, JobId},
    Capacity,
};

/// The number of events buffered for a slow subscriber before it starts missing events.
pub(crate) const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
    /// A job was admitted to the queue.
    Enqueued { id: JobId, at: DateTime<Utc> },
    /// A job was refused because the queue was full.
    Rejected {
        capacity: Capacity,
        at: DateTime<Utc>,
    },
    /// An attempt of a job was dispatched.
    Started {
        id: JobId,
        attempt: u16,
        at: DateTime<Utc>,
    },
    /// A job finished successfully.
    Completed {
        id: JobId,
        /// Time since the job entered the queue.
        elapsed: TimeDelta,
        at: DateTime<Utc>,
    },
    /// An attempt failed and the job was put back at the end of the queue.
    Retrying {
        id: JobId,
        retry: u16,
        error: JobError,
    },
    /// An attempt failed and the job had no retries left.
    Discarded {
        id: JobId,
        errors: Vec<JobError>,
        at: DateTime<Utc>,
    },
}

impl QueueEvent {
    /// The job the event is about, if any.
    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            QueueEvent::Enqueued { id, .. }
            | QueueEvent::Started { id, .. }
            | QueueEvent::Completed { id, .. }
            | QueueEvent::Retrying { id, .. }
            | QueueEvent::Discarded { id, .. } => Some(id),
            QueueEvent::Rejected { .. } => None,
        }
    }

    /// True for the last event a job will ever produce.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QueueEvent::Completed { .. } | QueueEvent::Discarded { .. }
        )
    }
}

#[derive(Debug)]
pub(crate) struct Notifier {
    sender: broadcast::Sender<QueueEvent>,
}

impl Default for Notifier {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUFFER);
        Self { sender }
    }
}

impl Notifier {
    pub(crate) fn notify(&self, event: QueueEvent) {
        // Sending only fails when nobody is subscribed.
        let _ = self.sender.send(event);
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.sender.subscribe()
    }
}

/// Adapts a receiver into a stream that skips over events a lagging subscriber missed.
pub(crate) fn into_stream(
    mut receiver: broadcast::Receiver<QueueEvent>,
) -> impl Stream<Item = QueueEvent> {
    async_stream::stream! {
        loop {
            match receiver.recv().await {
                Ok(event) => yield event,
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Queue event subscriber lagged, skipped {missed} events");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    fn enqueued(id: &str) -> QueueEvent {
        QueueEvent::Enqueued {
            id: id.into(),
            at: Utc::now(),
        }
    }

    #[test]
    fn job_id_and_terminal() {
        let rejected = QueueEvent::Rejected {
            capacity: Capacity::One,
            at: Utc::now(),
        };
        let completed = QueueEvent::Completed {
            id: "a".into(),
            elapsed: TimeDelta::zero(),
            at: Utc::now(),
        };

        assert_eq!(rejected.job_id(), None);
        assert!(!rejected.is_terminal());
        assert_eq!(completed.job_id(), Some(&JobId::from("a")));
        assert!(completed.is_terminal());
        assert!(!enqueued("b").is_terminal());
    }

    #[test]
    fn notify_without_subscribers_is_dropped() {
        let notifier = Notifier::default();
        notifier.notify(enqueued("a"));

        let mut receiver = notifier.subscribe();
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn stream_yields_events_in_order() {
        let notifier = Notifier::default();
        let stream = into_stream(notifier.subscribe());
        notifier.notify(enqueued("a"));
        notifier.notify(enqueued("b"));
        drop(notifier);

        let ids = stream
            .map(|event| event.job_id().cloned().unwrap())
            .collect::<Vec<_>>()
            .await;
        assert_eq!(ids, vec![JobId::from("a"), JobId::from("b")]);
    }

    #[tokio::test]
    async fn stream_skips_missed_events() {
        let (sender, receiver) = broadcast::channel(2);
        let stream = into_stream(receiver);
        for id in ["a", "b", "c", "d"] {
            sender.send(enqueued(id)).unwrap();
        }
        drop(sender);

        let ids = stream
            .map(|event| event.job_id().cloned().unwrap())
            .collect::<Vec<_>>()
            .await;
        assert_eq!(ids, vec![JobId::from("c"), JobId::from("d")]);
    }
}
