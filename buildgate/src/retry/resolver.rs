//! Retry resolution under the per-build lock.

use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::build::{BuildInstance, ParamMap, PipelineInfo, ReservedKey, StartType};
use crate::config::BuildCoreConfig;
use crate::errors::{ConflictError, NotFoundError, Resource, Result, ValidationError};
use crate::launcher::{BuildLauncher, LaunchRequest};
use crate::lock::{build_lock_key, DistributedLock};
use crate::model::{ModelNode, PipelineModel, TriggerKind};
use crate::ports::Collaborators;

/// Relaunches failed builds at their pinned version.
#[derive(Debug, Clone)]
pub struct RetryResolver {
    collab: Collaborators,
    launcher: BuildLauncher,
    config: Arc<BuildCoreConfig>,
}

impl RetryResolver {
    /// Creates a resolver launching through `launcher`.
    pub fn new(collab: Collaborators, launcher: BuildLauncher, config: Arc<BuildCoreConfig>) -> Self {
        Self {
            collab,
            launcher,
            config,
        }
    }

    /// Retries a failed build and returns the new build id.
    ///
    /// With a non-blank `task_id` the new build resumes from that task (or
    /// from the first element of that container) with the current runtime
    /// variables; otherwise it starts over with the original parameters.
    /// The build's lock is held for the whole resolution.
    pub async fn retry(
        &self,
        user: &str,
        project_id: &str,
        pipeline_id: &str,
        build_id: &str,
        task_id: Option<&str>,
    ) -> Result<String> {
        let lock = DistributedLock::new(
            self.collab.leases.clone(),
            build_lock_key(build_id),
            self.config.locks.build_lock(),
        );
        let guard = lock.acquire().await?;

        let result = self
            .retry_locked(user, project_id, pipeline_id, build_id, task_id)
            .await;

        guard.release().await;
        result
    }

    async fn retry_locked(
        &self,
        user: &str,
        project_id: &str,
        pipeline_id: &str,
        build_id: &str,
        task_id: Option<&str>,
    ) -> Result<String> {
        let pipeline = self
            .collab
            .repository
            .get_pipeline_info(project_id, pipeline_id, None)
            .await?
            .ok_or_else(|| NotFoundError::pipeline(pipeline_id))?;

        let build = self
            .collab
            .runtime
            .get_build_info(build_id)
            .await?
            .ok_or_else(|| NotFoundError::build(build_id))?;

        if !build.status.is_failure() {
            return Err(ConflictError::RetryOfNonFailedBuild {
                build_id: build_id.to_string(),
                status: build.status.to_string(),
            }
            .into());
        }

        let model = self
            .collab
            .repository
            .get_model(pipeline_id, Some(build.version))
            .await?
            .ok_or_else(|| NotFoundError::model(format!("{pipeline_id}@{}", build.version)))?;

        if model.enabled_trigger(TriggerKind::Manual).is_none() {
            return Err(ValidationError::ManualStartNotAllowed(pipeline_id.to_string()).into());
        }

        let mut params = match task_id.map(str::trim).filter(|t| !t.is_empty()) {
            Some(task_id) => self.task_retry_params(&build, &model, task_id).await?,
            None => self.full_retry_params(build_id).await,
        };

        params.insert(ReservedKey::StartUserId.as_str().to_string(), Value::from(user));
        params.insert(
            ReservedKey::StartType.as_str().to_string(),
            Value::from(StartType::Manual.as_str()),
        );
        params.insert(ReservedKey::RetryBuildId.as_str().to_string(), Value::from(build_id));

        info!(
            build_id = %build_id,
            pipeline_id = %pipeline_id,
            user = %user,
            task_id = task_id.unwrap_or_default(),
            "retrying build"
        );

        self.launch(user, pipeline, model, params, build.version).await
    }

    async fn task_retry_params(&self, build: &BuildInstance, model: &PipelineModel, task_id: &str) -> Result<ParamMap> {
        let variables = self.collab.runtime.get_all_variables(&build.build_id).await?;
        let target = find_retry_target(model, task_id)?;

        let retry_count = variables
            .get(ReservedKey::RetryCount.as_str())
            .and_then(|count| count.trim().parse::<u32>().ok())
            .map_or(1, |count| count + 1);

        let mut params: ParamMap = variables
            .into_iter()
            .map(|(key, value)| (key, Value::String(value)))
            .collect();
        params.insert(ReservedKey::RetryStartTaskId.as_str().to_string(), Value::from(target));
        params.insert(ReservedKey::RetryCount.as_str().to_string(), Value::from(retry_count));
        Ok(params)
    }

    async fn full_retry_params(&self, build_id: &str) -> ParamMap {
        let mut params = match self.collab.param_store.get(build_id).await {
            Ok(Some(json)) => serde_json::from_str::<ParamMap>(&json).unwrap_or_else(|e| {
                warn!(build_id = %build_id, error = %e, "unreadable parameter snapshot, retrying with empty parameters");
                ParamMap::new()
            }),
            Ok(None) => ParamMap::new(),
            Err(e) => {
                warn!(build_id = %build_id, error = %e, "failed to read parameter snapshot, retrying with empty parameters");
                ParamMap::new()
            }
        };

        params.remove(ReservedKey::RetryCount.as_str());
        params.remove(ReservedKey::RetryStartTaskId.as_str());
        params
    }

    async fn launch(
        &self,
        user: &str,
        pipeline: PipelineInfo,
        model: PipelineModel,
        params: ParamMap,
        version: u32,
    ) -> Result<String> {
        let request = LaunchRequest::new(user, pipeline, model, StartType::Manual)
            .with_params(params)
            .with_version_override(version)
            .with_frequency_limit(true);
        self.launcher.start(request).await
    }
}

/// Finds the element a task-scoped retry resumes from.
///
/// A container id resolves to the container's first element; an element id
/// resolves to itself. The trigger stage is never a target.
pub fn find_retry_target(model: &PipelineModel, task_id: &str) -> Result<String> {
    for stage in model.executable_stages() {
        for container in &stage.containers {
            if container.id() == task_id {
                return container
                    .elements
                    .first()
                    .map(|element| element.id.clone())
                    .ok_or_else(|| ValidationError::EmptyRetryContainer(container.id.clone()).into());
            }
            if let Some(element) = container.elements.iter().find(|e| e.id() == task_id) {
                return Ok(element.id.clone());
            }
        }
    }
    Err(NotFoundError::new(Resource::Task, task_id).into())
}
