//! Build service facade.

use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn, Instrument};

use super::{StartRequest, SubPipelineStart};
use crate::build::{ChannelCode, ParamMap, PipelineInfo, ReservedKey, StartType};
use crate::cancellation::{CancellationCoordinator, WorkerResult};
use crate::config::BuildCoreConfig;
use crate::errors::{NotFoundError, Result, ValidationError};
use crate::interceptors::InterceptorChain;
use crate::launcher::{BuildLauncher, LaunchRequest};
use crate::model::{PipelineModel, TriggerKind};
use crate::observability::operation_span;
use crate::params::{BuildParameter, ManualStartupInfo, ParameterResolver};
use crate::ports::{Collaborators, Permission};
use crate::retry::RetryResolver;
use crate::review::{ReviewDescriptor, ReviewGate, ReviewRequest};

/// Every public operation of the core: starts, retry, review and shutdown.
#[derive(Debug, Clone)]
pub struct BuildService {
    collab: Collaborators,
    resolver: ParameterResolver,
    launcher: BuildLauncher,
    retry: RetryResolver,
    review: ReviewGate,
    cancellation: CancellationCoordinator,
}

impl BuildService {
    /// Wires the service over `collab`.
    pub fn new(collab: Collaborators, chain: InterceptorChain, config: BuildCoreConfig) -> Self {
        let config = Arc::new(config);
        let launcher = BuildLauncher::new(collab.clone(), Arc::new(chain), config.clone());
        Self {
            resolver: ParameterResolver::new(collab.runtime.clone(), collab.param_store.clone()),
            retry: RetryResolver::new(collab.clone(), launcher.clone(), config.clone()),
            review: ReviewGate::new(collab.clone()),
            cancellation: CancellationCoordinator::new(collab.clone(), config),
            launcher,
            collab,
        }
    }

    async fn authorize(
        &self,
        check: bool,
        user: &str,
        project_id: &str,
        pipeline_id: &str,
        permission: Permission,
    ) -> Result<()> {
        if !check {
            return Ok(());
        }
        self.collab
            .permissions
            .validate(user, project_id, pipeline_id, permission)
            .await
            .inspect_err(|e| warn!(user = %user, pipeline_id = %pipeline_id, %permission, error = %e, "permission check failed"))
    }

    async fn pipeline(&self, project_id: &str, pipeline_id: &str, channel: Option<ChannelCode>) -> Result<PipelineInfo> {
        Ok(self
            .collab
            .repository
            .get_pipeline_info(project_id, pipeline_id, channel)
            .await?
            .ok_or_else(|| NotFoundError::pipeline(pipeline_id))?)
    }

    async fn model(&self, pipeline: &PipelineInfo) -> Result<PipelineModel> {
        Ok(self
            .collab
            .repository
            .get_model(&pipeline.pipeline_id, Some(pipeline.version))
            .await?
            .ok_or_else(|| NotFoundError::model(format!("{}@{}", pipeline.pipeline_id, pipeline.version)))?)
    }

    /// Starts a build from the UI or API.
    pub async fn start_manual(&self, request: StartRequest) -> Result<String> {
        let span = operation_span("start_manual", &request.pipeline_id, None);
        self.user_start(StartType::Manual, request).instrument(span).await
    }

    /// Starts a build from a remote call.
    pub async fn start_remote(&self, request: StartRequest) -> Result<String> {
        let span = operation_span("start_remote", &request.pipeline_id, None);
        self.user_start(StartType::Remote, request).instrument(span).await
    }

    /// Starts a build from a repository webhook.
    pub async fn start_webhook(&self, request: StartRequest) -> Result<String> {
        let span = operation_span("start_webhook", &request.pipeline_id, None);
        self.user_start(StartType::WebHook, request).instrument(span).await
    }

    async fn user_start(&self, start_type: StartType, request: StartRequest) -> Result<String> {
        let StartRequest {
            user,
            project_id,
            pipeline_id,
            values,
            channel,
            mobile,
            check_permission,
            webhook_user,
        } = request;

        self.authorize(check_permission, &user, &project_id, &pipeline_id, Permission::Execute)
            .await?;
        let pipeline = self.pipeline(&project_id, &pipeline_id, Some(channel)).await?;
        let model = self.model(&pipeline).await?;

        match start_type {
            StartType::Manual if model.enabled_trigger(TriggerKind::Manual).is_none() => {
                return Err(ValidationError::ManualStartNotAllowed(pipeline_id).into());
            }
            StartType::Remote if model.enabled_trigger(TriggerKind::Remote).is_none() => {
                return Err(ValidationError::RemoteStartNotAllowed(pipeline_id).into());
            }
            _ => {}
        }

        let mut params = self.resolver.resolve_manual(&model, &values)?;
        if let Some(webhook_user) = webhook_user {
            params.insert(
                ReservedKey::StartWebhookUserId.as_str().to_string(),
                Value::String(webhook_user),
            );
        }

        let request = LaunchRequest::new(user, pipeline, model, start_type)
            .with_params(params)
            .with_channel(channel)
            .with_mobile(mobile);
        self.launcher.start(request).await
    }

    /// Starts a build from its timer. Returns `None` when the pipeline no
    /// longer exists.
    pub async fn start_timer(
        &self,
        user: &str,
        project_id: &str,
        pipeline_id: &str,
        params: ParamMap,
        check_permission: bool,
    ) -> Result<Option<String>> {
        async {
            self.authorize(check_permission, user, project_id, pipeline_id, Permission::Execute)
                .await?;
            let Some(pipeline) = self
                .collab
                .repository
                .get_pipeline_info(project_id, pipeline_id, None)
                .await?
            else {
                info!(pipeline_id = %pipeline_id, "timer fired for a deleted pipeline");
                return Ok(None);
            };
            let model = self.model(&pipeline).await?;
            let params = self.resolver.resolve_with_defaults(&model, params)?;

            let request = LaunchRequest::new(user, pipeline, model, StartType::TimeTrigger)
                .with_params(params)
                .with_frequency_limit(false);
            self.launcher.start(request).await.map(Some)
        }
        .instrument(operation_span("start_timer", pipeline_id, None))
        .await
    }

    /// Starts a build on behalf of another build's task and links the task
    /// to it. The build runs as the pipeline's last modifier.
    pub async fn start_sub_pipeline(&self, request: SubPipelineStart) -> Result<String> {
        let span = operation_span("start_sub_pipeline", &request.pipeline_id, Some(&request.parent_build_id));
        self.sub_pipeline_start(request).instrument(span).await
    }

    async fn sub_pipeline_start(&self, request: SubPipelineStart) -> Result<String> {
        let SubPipelineStart {
            user,
            project_id,
            pipeline_id,
            parent_pipeline_id,
            parent_build_id,
            parent_task_id,
            channel,
            params,
            mobile,
            check_permission,
        } = request;

        self.authorize(check_permission, &user, &project_id, &pipeline_id, Permission::Execute)
            .await?;
        let pipeline = self.pipeline(&project_id, &pipeline_id, Some(channel)).await?;
        let model = self.model(&pipeline).await?;

        let mut params = self.resolver.resolve_with_defaults(&model, params)?;
        let parent_stamps = [
            (ReservedKey::StartPipelineUserId, user),
            (ReservedKey::ParentPipelineId, parent_pipeline_id),
            (ReservedKey::ParentBuildId, parent_build_id.clone()),
            (ReservedKey::ParentBuildTaskId, parent_task_id.clone()),
        ];
        for (key, value) in parent_stamps {
            params.insert(key.as_str().to_string(), Value::String(value));
        }

        let run_as = pipeline.last_modify_user.clone();
        let request = LaunchRequest::new(run_as, pipeline, model, StartType::Pipeline)
            .with_params(params)
            .with_channel(channel)
            .with_mobile(mobile)
            .with_frequency_limit(false);
        let sub_build_id = self.launcher.start(request).await?;

        self.collab
            .runtime
            .update_task_sub_build_id(&parent_build_id, &parent_task_id, &sub_build_id)
            .await?;
        Ok(sub_build_id)
    }

    /// Retries a failed build, from `task_id` when given.
    pub async fn retry(
        &self,
        user: &str,
        project_id: &str,
        pipeline_id: &str,
        build_id: &str,
        task_id: Option<&str>,
        check_permission: bool,
    ) -> Result<String> {
        async {
            self.authorize(check_permission, user, project_id, pipeline_id, Permission::Execute)
                .await?;
            self.retry
                .retry(user, project_id, pipeline_id, build_id, task_id)
                .await
        }
        .instrument(operation_span("retry", pipeline_id, Some(build_id)))
        .await
    }

    /// Describes a paused review task to a reviewer.
    pub async fn review_describe(
        &self,
        user: &str,
        pipeline_id: &str,
        build_id: &str,
        element_id: &str,
    ) -> Result<ReviewDescriptor> {
        self.review
            .describe(user, build_id, element_id)
            .instrument(operation_span("review_describe", pipeline_id, Some(build_id)))
            .await
    }

    /// Submits a reviewer's decision.
    pub async fn review_decide(
        &self,
        user: &str,
        pipeline_id: &str,
        build_id: &str,
        element_id: &str,
        request: ReviewRequest,
    ) -> Result<()> {
        self.review
            .decide(user, build_id, element_id, request)
            .instrument(operation_span("review_decide", pipeline_id, Some(build_id)))
            .await
    }

    /// Cancels a build on a user's request.
    pub async fn user_shutdown(
        &self,
        user: &str,
        project_id: &str,
        pipeline_id: &str,
        build_id: &str,
        channel: ChannelCode,
        check_permission: bool,
    ) -> Result<()> {
        async {
            self.authorize(check_permission, user, project_id, pipeline_id, Permission::Execute)
                .await?;
            self.cancellation
                .user_shutdown(user, project_id, pipeline_id, build_id, channel)
                .await
        }
        .instrument(operation_span("user_shutdown", pipeline_id, Some(build_id)))
        .await
    }

    /// Fails a build on behalf of the platform.
    pub async fn service_shutdown(
        &self,
        project_id: &str,
        pipeline_id: &str,
        build_id: &str,
        channel: ChannelCode,
    ) -> Result<()> {
        self.cancellation
            .service_shutdown(project_id, pipeline_id, build_id, channel)
            .instrument(operation_span("service_shutdown", pipeline_id, Some(build_id)))
            .await
    }

    /// Describes the manual start form of the current version.
    pub async fn manual_startup_info(
        &self,
        user: &str,
        project_id: &str,
        pipeline_id: &str,
        channel: ChannelCode,
        check_permission: bool,
    ) -> Result<ManualStartupInfo> {
        self.authorize(check_permission, user, project_id, pipeline_id, Permission::Execute)
            .await?;
        let pipeline = self.pipeline(project_id, pipeline_id, Some(channel)).await?;
        let model = self.model(&pipeline).await?;
        self.resolver.startup_info(pipeline_id, &model).await
    }

    /// Lists the start parameters of a build.
    pub async fn build_parameters(
        &self,
        user: &str,
        project_id: &str,
        pipeline_id: &str,
        build_id: &str,
    ) -> Result<Vec<BuildParameter>> {
        self.authorize(true, user, project_id, pipeline_id, Permission::View)
            .await?;
        self.resolver.build_parameters(build_id).await
    }

    /// Reports that the worker agent of a job exited.
    pub async fn worker_build_finish(&self, build_id: &str, vm_seq_id: &str, result: &WorkerResult) -> Result<()> {
        self.cancellation
            .worker_build_finish(build_id, vm_seq_id, result)
            .await
    }
}
