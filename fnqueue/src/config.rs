//! Configuration for a [`crate::QueueManager`].
//!
//! All of the configuration functions are `const`, so a configuration can live in a constant.
//!
//! # Example
//!
//! ```
//! use fnqueue::{Capacity, QueueConfig, QueueManager};
//!
//! const CONFIG: QueueConfig = QueueConfig::new(Capacity::Five)
//!     .with_retry_times(3)
//!     .with_id_length(24);
//!
//! let queue = QueueManager::with_config(CONFIG);
//! assert_eq!(queue.capacity(), Capacity::Five);
//! assert_eq!(queue.generate_id().as_str().len(), 24);
//! ```
use serde::{Deserialize, Serialize};

use crate::job::DEFAULT_ID_LENGTH;

/// The default retry budget for a job enqueued without options.
pub const DEFAULT_RETRY_TIMES: u16 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub capacity: crate::Capacity,
    /// The maximum additional attempts after a first failure, unless overridden per job.
    pub retry_times: u16,
    /// The number of characters in generated job ids.
    pub id_length: usize,
    /// Start the queue without draining until [`crate::QueueManager::resume`] is called.
    pub paused: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::new(crate::Capacity::Ten)
    }
}

impl QueueConfig {
    pub const fn new(capacity: crate::Capacity) -> Self {
        Self {
            capacity,
            retry_times: DEFAULT_RETRY_TIMES,
            id_length: DEFAULT_ID_LENGTH,
            paused: false,
        }
    }

    pub const fn with_retry_times(self, retry_times: u16) -> Self {
        Self {
            retry_times,
            ..self
        }
    }

    pub const fn with_id_length(self, id_length: usize) -> Self {
        Self { id_length, ..self }
    }

    pub const fn paused(self) -> Self {
        Self {
            paused: true,
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Capacity;

    #[test]
    fn defaults() {
        let config = QueueConfig::default();

        assert_eq!(config.capacity, Capacity::Ten);
        assert_eq!(config.retry_times, 1);
        assert_eq!(config.id_length, 16);
        assert!(!config.paused);
    }

    #[test]
    fn deserialize_partial_config() {
        let config: QueueConfig =
            serde_json::from_str(r#"{ "capacity": 3, "retry_times": 5 }"#).unwrap();

        assert_eq!(config, QueueConfig::new(Capacity::Three).with_retry_times(5));
    }

    #[test]
    fn deserialize_rejects_invalid_capacity() {
        let error = serde_json::from_str::<QueueConfig>(r#"{ "capacity": 4 }"#).unwrap_err();

        assert!(error.to_string().contains("Invalid queue capacity 4"));
    }
}
