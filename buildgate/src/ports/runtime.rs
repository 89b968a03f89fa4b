//! Build runtime, parameter snapshot and build detail stores.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::build::{BuildInstance, BuildStatus, ParamMap, PipelineInfo, RunningTask};
use crate::errors::Result;
use crate::model::PipelineModel;
use crate::review::ReviewRequest;

/// The execution engine and its build records.
#[async_trait]
pub trait BuildRuntime: Send + Sync {
    /// Fetches a build.
    async fn get_build_info(&self, build_id: &str) -> Result<Option<BuildInstance>>;

    /// Materializes a new QUEUED build and returns its id.
    async fn start_build(
        &self,
        pipeline: &PipelineInfo,
        model: &PipelineModel,
        params: &ParamMap,
    ) -> Result<String>;

    /// Moves a build to a terminal status.
    async fn cancel_build(
        &self,
        project_id: &str,
        pipeline_id: &str,
        build_id: &str,
        user_id: &str,
        status: BuildStatus,
    ) -> Result<()>;

    /// Current runtime variables of a build.
    async fn get_all_variables(&self, build_id: &str) -> Result<HashMap<String, String>>;

    /// Most recent finished build of a pipeline.
    async fn get_last_completed_build(&self, pipeline_id: &str) -> Result<Option<BuildInstance>>;

    /// Completes a paused manual review task.
    async fn manual_decide_task(
        &self,
        build_id: &str,
        element_id: &str,
        user_id: &str,
        request: &ReviewRequest,
    ) -> Result<()>;

    /// Tasks currently executing.
    async fn get_running_tasks(&self, project_id: &str, build_id: &str) -> Result<Vec<RunningTask>>;

    /// Links a parent task to the sub-pipeline build it launched.
    async fn update_task_sub_build_id(
        &self,
        build_id: &str,
        task_id: &str,
        sub_build_id: &str,
    ) -> Result<()>;
}

/// Write-once store of start parameter snapshots, serialized as JSON.
#[async_trait]
pub trait StartupParamStore: Send + Sync {
    /// Reads the snapshot of a build.
    async fn get(&self, build_id: &str) -> Result<Option<String>>;

    /// Persists the snapshot of a build.
    async fn put(&self, project_id: &str, pipeline_id: &str, build_id: &str, json: &str) -> Result<()>;
}

/// Build detail attributes maintained next to the build record.
#[async_trait]
pub trait BuildDetailStore: Send + Sync {
    /// The user a cancel is attributed to, if any.
    async fn cancel_user(&self, build_id: &str) -> Result<Option<String>>;

    /// Records who cancelled the build.
    async fn update_cancel_user(&self, build_id: &str, user_id: &str) -> Result<()>;
}
