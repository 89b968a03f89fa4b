//! Distributed leases.
//!
//! Two lock classes guard the core:
//! - an exclusive per-build lock (blocking acquire with backoff) that
//!   serializes retry and shutdown of the same build;
//! - a per-pipeline throttle token (`try_acquire`, short TTL) that bounds
//!   launch frequency.
//!
//! Both are TTL-bounded so a crashed holder never blocks others for longer
//! than the TTL.

mod distributed;
mod lease;

pub use distributed::{DistributedLock, LeaseGuard, LockConfig};
pub use lease::{InMemoryLeaseStore, LeaseStore};

/// Key of the exclusive per-build lock used by retry and user shutdown.
#[must_use]
pub fn build_lock_key(build_id: &str) -> String {
    format!("lock:build:{build_id}")
}

/// Key of the per-build lock used by service shutdown.
#[must_use]
pub fn shutdown_lock_key(build_id: &str) -> String {
    format!("process.pipeline.build.shutdown.{build_id}")
}

/// Key of the per-pipeline launch throttle token.
#[must_use]
pub fn rate_limit_key(pipeline_id: &str) -> String {
    format!("build:limit:{pipeline_id}")
}
