//! The purpose of this module is to alleviate the need to import many of the `[fnqueue]` types.
//!
//! ```
//! # #![allow(unused_imports)]
//! use fnqueue::prelude::*;
//! ```
pub use crate::events::QueueEvent;
pub use crate::job::builder::{EnqueueOptions, JobBuilder};
pub use crate::job::{ErrorType, Execution, Job, JobError, JobId};
pub use crate::Capacity;
pub use crate::QueueConfig;
pub use crate::QueueError;
pub use crate::QueueManager;
