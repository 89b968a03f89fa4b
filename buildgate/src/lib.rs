//! # Buildgate
//!
//! The build orchestration core of a CI pipeline engine.
//!
//! Buildgate decides whether and how a pipeline build may start, resumes
//! failed builds, gates paused manual reviews and stops running builds.
//! Everything stateful (pipeline definitions, build records, parameter
//! snapshots, authorization, leases) sits behind the collaborator traits
//! in [`ports`].
//!
//! - **Launch gating**: per-pipeline throttling, version pinning, quality
//!   rules and an ordered interceptor chain in front of every start
//! - **Parameter resolution**: declared defaults, required checks, skip
//!   flags and reuse of the last build's values
//! - **Retry**: full or task-scoped retry of failed builds under a
//!   per-build lock
//! - **Manual review**: reviewer resolution with `${var}` substitution
//! - **Cancellation**: user shutdown, sub-pipeline aware service shutdown
//!   and worker exit handling
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use buildgate::prelude::*;
//!
//! let service = BuildService::new(collaborators, InterceptorChain::new(), BuildCoreConfig::default());
//!
//! let build_id = service
//!     .start_manual(StartRequest::new("alice", "proj", "p-1").with_value("env", "prod"))
//!     .await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod build;
pub mod cancellation;
pub mod config;
pub mod errors;
pub mod events;
pub mod interceptors;
pub mod launcher;
pub mod lock;
pub mod model;
pub mod observability;
pub mod params;
pub mod ports;
pub mod retry;
pub mod review;
pub mod service;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::build::{BuildInstance, BuildStatus, ChannelCode, ParamMap, PipelineInfo, ReservedKey, StartType};
    pub use crate::cancellation::{CancellationCoordinator, WorkerResult};
    pub use crate::config::BuildCoreConfig;
    pub use crate::errors::{BuildError, ConflictError, ErrorKind, NotFoundError, Result, ValidationError};
    pub use crate::events::{EventDispatcher, LoggingEventDispatcher, PipelineEvent};
    pub use crate::interceptors::{InterceptContext, InterceptResult, InterceptorChain, LaunchInterceptor};
    pub use crate::launcher::{BuildLauncher, LaunchRequest};
    pub use crate::lock::{DistributedLock, LeaseStore, LockConfig};
    pub use crate::model::{BuildFormProperty, Container, Element, PipelineModel, Stage};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::params::{BuildParameter, ManualStartupInfo, ParameterResolver};
    pub use crate::ports::{
        BuildDetailStore, BuildLogSink, BuildRuntime, Collaborators, Permission, PermissionService,
        PipelineRepository, QualityRuleFiller, StartupParamStore,
    };
    pub use crate::retry::RetryResolver;
    pub use crate::review::{ReviewDescriptor, ReviewGate, ReviewRequest};
    pub use crate::service::{BuildService, StartRequest, SubPipelineStart};
}
