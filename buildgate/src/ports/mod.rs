//! Collaborator interfaces consumed by the orchestration core.
//!
//! Everything stateful lives behind these traits: pipeline definitions,
//! build records, parameter snapshots, authorization, quality rules, build
//! logs and the lease store. The core itself keeps no long-lived state.

mod repository;
mod runtime;
mod services;

pub use repository::PipelineRepository;
pub use runtime::{BuildDetailStore, BuildRuntime, StartupParamStore};
pub use services::{
    BuildLogSink, PassThroughRuleFiller, Permission, PermissionService, QualityRuleFiller,
    TracingLogSink,
};

#[cfg(test)]
pub use services::MockPermissionService;

use crate::events::EventDispatcher;
use crate::lock::LeaseStore;
use std::sync::Arc;

/// The full set of collaborators shared by every component.
#[derive(Clone)]
pub struct Collaborators {
    /// Pipeline definitions.
    pub repository: Arc<dyn PipelineRepository>,
    /// Build records and the execution engine.
    pub runtime: Arc<dyn BuildRuntime>,
    /// Start parameter snapshots.
    pub param_store: Arc<dyn StartupParamStore>,
    /// Cancel-user attribution.
    pub build_details: Arc<dyn BuildDetailStore>,
    /// Authorization checks.
    pub permissions: Arc<dyn PermissionService>,
    /// Quality gate rule filling.
    pub rule_filler: Arc<dyn QualityRuleFiller>,
    /// Build log markers.
    pub build_logs: Arc<dyn BuildLogSink>,
    /// Lifecycle event bus.
    pub events: Arc<dyn EventDispatcher>,
    /// Distributed leases.
    pub leases: Arc<dyn LeaseStore>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
