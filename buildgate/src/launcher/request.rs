//! Launch request.

use crate::build::{ChannelCode, ParamMap, PipelineInfo, StartType};
use crate::model::PipelineModel;

/// Everything [`super::BuildLauncher::start`] needs to create a build.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    /// User the build runs as.
    pub user: String,
    /// The pipeline being launched.
    pub pipeline: PipelineInfo,
    /// How the build is started.
    pub start_type: StartType,
    /// Resolved start parameters.
    pub params: ParamMap,
    /// Channel stamped into the parameters.
    pub channel: ChannelCode,
    /// Whether the start came from a mobile client.
    pub mobile: bool,
    /// The model to run.
    pub model: PipelineModel,
    /// Version to pin instead of the pipeline's current one.
    pub version_override: Option<u32>,
    /// Whether the per-pipeline throttle applies.
    pub frequency_limit: bool,
}

impl LaunchRequest {
    /// Creates a throttled request on the pipeline's channel.
    #[must_use]
    pub fn new(
        user: impl Into<String>,
        pipeline: PipelineInfo,
        model: PipelineModel,
        start_type: StartType,
    ) -> Self {
        Self {
            user: user.into(),
            channel: pipeline.channel,
            pipeline,
            start_type,
            params: ParamMap::new(),
            mobile: false,
            model,
            version_override: None,
            frequency_limit: true,
        }
    }

    /// Sets the start parameters.
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

    /// Marks the start as coming from a mobile client.
    #[must_use]
    pub fn with_mobile(mut self, mobile: bool) -> Self {
        self.mobile = mobile;
        self
    }

    /// Pins the build to `version`.
    #[must_use]
    pub fn with_version_override(mut self, version: u32) -> Self {
        self.version_override = Some(version);
        self
    }

    /// Enables or disables the throttle.
    #[must_use]
    pub fn with_frequency_limit(mut self, enabled: bool) -> Self {
        self.frequency_limit = enabled;
        self
    }
}
