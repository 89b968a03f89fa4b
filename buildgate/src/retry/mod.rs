//! Retry of failed builds, either from a task or from the start.

mod resolver;

pub use resolver::{find_retry_target, RetryResolver};
