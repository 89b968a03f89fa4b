//! Pipeline and build records returned by collaborators.

use super::{BuildStatus, ChannelCode, StartType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity and publishing state of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineInfo {
    /// Owning project.
    pub project_id: String,
    /// Pipeline id.
    pub pipeline_id: String,
    /// Display name.
    pub pipeline_name: String,
    /// Product channel.
    #[serde(default)]
    pub channel: ChannelCode,
    /// Current published version.
    pub version: u32,
    /// Creator of the pipeline.
    pub creator: String,
    /// Last user to publish a version; sub-pipeline builds run as this user.
    pub last_modify_user: String,
}

impl PipelineInfo {
    /// Creates pipeline info at version 1 owned by `creator`.
    #[must_use]
    pub fn new(
        project_id: impl Into<String>,
        pipeline_id: impl Into<String>,
        pipeline_name: impl Into<String>,
        creator: impl Into<String>,
    ) -> Self {
        let creator = creator.into();
        Self {
            project_id: project_id.into(),
            pipeline_id: pipeline_id.into(),
            pipeline_name: pipeline_name.into(),
            channel: ChannelCode::Bs,
            version: 1,
            last_modify_user: creator.clone(),
            creator,
        }
    }

    /// Sets the published version.
    #[must_use]
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Sets the channel.
    #[must_use]
    pub fn with_channel(mut self, channel: ChannelCode) -> Self {
        self.channel = channel;
        self
    }
}

/// One execution attempt of a pinned pipeline version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInstance {
    /// Unique build id.
    pub build_id: String,
    /// Owning project.
    pub project_id: String,
    /// Pipeline id.
    pub pipeline_id: String,
    /// Model version the build runs.
    pub version: u32,
    /// Current status.
    pub status: BuildStatus,
    /// User the build runs as.
    pub start_user: String,
    /// How the build was started.
    pub trigger: StartType,
    /// Upstream build when launched as a sub-pipeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_build_id: Option<String>,
    /// Upstream task when launched as a sub-pipeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_task_id: Option<String>,
    /// Number of task-scoped retries.
    #[serde(default)]
    pub retry_count: u32,
    /// When the build was queued.
    pub queue_time: DateTime<Utc>,
    /// When the build started running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    /// When the build finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

impl BuildInstance {
    /// Returns true when this build was launched by another build's task.
    #[must_use]
    pub fn is_sub_pipeline(&self) -> bool {
        self.trigger == StartType::Pipeline
            && self
                .parent_build_id
                .as_deref()
                .is_some_and(|parent| parent != self.build_id)
            && self.parent_task_id.is_some()
    }
}

/// A task currently executing on a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningTask {
    /// Element id of the task.
    pub task_id: String,
    /// Container the task runs in.
    pub container_id: String,
    /// Task status as reported by the engine.
    pub status: String,
}
