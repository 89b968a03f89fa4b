//! Pipeline definition repository.

use async_trait::async_trait;

use crate::build::{ChannelCode, PipelineInfo};
use crate::errors::Result;
use crate::model::PipelineModel;

/// Read access to published pipelines.
#[async_trait]
pub trait PipelineRepository: Send + Sync {
    /// Fetches pipeline info, optionally restricted to a channel.
    async fn get_pipeline_info(
        &self,
        project_id: &str,
        pipeline_id: &str,
        channel: Option<ChannelCode>,
    ) -> Result<Option<PipelineInfo>>;

    /// Fetches the model at `version`, or the latest published one.
    async fn get_model(&self, pipeline_id: &str, version: Option<u32>) -> Result<Option<PipelineModel>>;
}
