//! User and service shutdown of builds, and worker exit handling.

mod coordinator;

pub use coordinator::{CancellationCoordinator, WorkerResult};
