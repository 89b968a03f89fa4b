//! Requests accepted by [`super::BuildService`].

use std::collections::HashMap;

use crate::build::{ChannelCode, ParamMap};

/// A user-initiated start (manual, remote or webhook).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartRequest {
    /// Acting user.
    pub user: String,
    /// Owning project.
    pub project_id: String,
    /// Pipeline to start.
    pub pipeline_id: String,
    /// Raw values keyed by parameter id, plus skip flags.
    pub values: HashMap<String, String>,
    /// Channel the pipeline must belong to.
    pub channel: ChannelCode,
    /// Whether the start came from a mobile client.
    pub mobile: bool,
    /// Whether to check the execute permission.
    pub check_permission: bool,
    /// User reported by the webhook, for webhook starts.
    pub webhook_user: Option<String>,
}

impl StartRequest {
    /// Creates a permission-checked request on the default channel.
    #[must_use]
    pub fn new(user: impl Into<String>, project_id: impl Into<String>, pipeline_id: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            project_id: project_id.into(),
            pipeline_id: pipeline_id.into(),
            values: HashMap::new(),
            channel: ChannelCode::default(),
            mobile: false,
            check_permission: true,
            webhook_user: None,
        }
    }

    /// Adds one raw value.
    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Replaces the raw values.
    #[must_use]
    pub fn with_values(mut self, values: HashMap<String, String>) -> Self {
        self.values = values;
        self
    }

    /// Sets the channel.
    #[must_use]
    pub fn with_channel(mut self, channel: ChannelCode) -> Self {
        self.channel = channel;
        self
    }

    /// Marks the start as coming from a mobile client.
    #[must_use]
    pub fn with_mobile(mut self, mobile: bool) -> Self {
        self.mobile = mobile;
        self
    }

    /// Sets the webhook user.
    #[must_use]
    pub fn with_webhook_user(mut self, user: impl Into<String>) -> Self {
        self.webhook_user = Some(user.into());
        self
    }

    /// Skips the permission check.
    #[must_use]
    pub fn without_permission_check(mut self) -> Self {
        self.check_permission = false;
        self
    }
}

/// A start requested by a task of another build.
#[derive(Debug, Clone, PartialEq)]
pub struct SubPipelineStart {
    /// User that triggered the upstream build.
    pub user: String,
    /// Owning project.
    pub project_id: String,
    /// Pipeline to start.
    pub pipeline_id: String,
    /// Upstream pipeline.
    pub parent_pipeline_id: String,
    /// Upstream build.
    pub parent_build_id: String,
    /// Upstream task.
    pub parent_task_id: String,
    /// Channel the pipeline must belong to.
    pub channel: ChannelCode,
    /// Values passed down by the upstream task.
    pub params: ParamMap,
    /// Whether the start came from a mobile client.
    pub mobile: bool,
    /// Whether to check the execute permission.
    pub check_permission: bool,
}

impl SubPipelineStart {
    /// Creates a permission-checked request on the default channel.
    #[must_use]
    pub fn new(
        user: impl Into<String>,
        project_id: impl Into<String>,
        pipeline_id: impl Into<String>,
        parent_pipeline_id: impl Into<String>,
        parent_build_id: impl Into<String>,
        parent_task_id: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            project_id: project_id.into(),
            pipeline_id: pipeline_id.into(),
            parent_pipeline_id: parent_pipeline_id.into(),
            parent_build_id: parent_build_id.into(),
            parent_task_id: parent_task_id.into(),
            channel: ChannelCode::default(),
            params: ParamMap::new(),
            mobile: false,
            check_permission: true,
        }
    }

    /// Sets the values passed down.
    #[must_use]
    pub fn with_params(mut self, params: ParamMap) -> Self {
        self.params = params;
        self
    }

    /// Sets the channel.
    #[must_use]
    pub fn with_channel(mut self, channel: ChannelCode) -> Self {
        self.channel = channel;
        self
    }

    /// Skips the permission check.
    #[must_use]
    pub fn without_permission_check(mut self) -> Self {
        self.check_permission = false;
        self
    }
}
