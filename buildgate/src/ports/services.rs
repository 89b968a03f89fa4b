//! Authorization, quality rules and build log collaborators.

use async_trait::async_trait;
use std::fmt;
use tracing::warn;

use crate::build::ParamMap;
use crate::errors::Result;
use crate::model::PipelineModel;

/// Pipeline permissions checked by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    /// Start, retry, or stop builds.
    Execute,
    /// Read build details.
    View,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Execute => write!(f, "execute"),
            Self::View => write!(f, "view"),
        }
    }
}

/// Authorization policy, consulted before any side effect.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PermissionService: Send + Sync {
    /// Fails with [`crate::errors::BuildError::PermissionDenied`] when the
    /// user lacks `permission` on the pipeline.
    async fn validate(
        &self,
        user_id: &str,
        project_id: &str,
        pipeline_id: &str,
        permission: Permission,
    ) -> Result<()>;
}

/// Materializes quality-gate rules into a model before launch.
#[async_trait]
pub trait QualityRuleFiller: Send + Sync {
    /// Returns the model with rule elements filled in.
    async fn fill_rules(
        &self,
        project_id: &str,
        pipeline_id: &str,
        params: &ParamMap,
        model: PipelineModel,
    ) -> Result<PipelineModel>;
}

/// A rule filler that returns the model unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughRuleFiller;

#[async_trait]
impl QualityRuleFiller for PassThroughRuleFiller {
    async fn fill_rules(
        &self,
        _project_id: &str,
        _pipeline_id: &str,
        _params: &ParamMap,
        model: PipelineModel,
    ) -> Result<PipelineModel> {
        Ok(model)
    }
}

/// Fire-and-forget writer of build log markers.
pub trait BuildLogSink: Send + Sync {
    /// Writes a highlighted line into a task's log.
    fn add_warn_line(&self, build_id: &str, message: &str, tag: &str, job_id: &str, execute_count: u32);

    /// Closes the fold group of a task's log.
    fn add_fold_end(&self, build_id: &str, tag_name: &str, tag: &str, job_id: &str, execute_count: u32);
}

/// A log sink that forwards markers to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogSink;

impl BuildLogSink for TracingLogSink {
    fn add_warn_line(&self, build_id: &str, message: &str, tag: &str, job_id: &str, execute_count: u32) {
        warn!(
            build_id = %build_id,
            tag = %tag,
            job_id = %job_id,
            execute_count,
            "{}", message
        );
    }

    fn add_fold_end(&self, build_id: &str, tag_name: &str, tag: &str, job_id: &str, execute_count: u32) {
        warn!(
            build_id = %build_id,
            tag = %tag,
            job_id = %job_id,
            execute_count,
            "fold end: {}", tag_name
        );
    }
}
