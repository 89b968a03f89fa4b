//! Build launch: throttle, version pin, interception, stamping, snapshot.

use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::LaunchRequest;
use crate::build::{ParamMap, ReservedKey, StartType};
use crate::config::BuildCoreConfig;
use crate::errors::{BuildError, Result};
use crate::interceptors::{InterceptContext, InterceptorChain};
use crate::lock::{rate_limit_key, DistributedLock, LeaseGuard};
use crate::ports::Collaborators;

/// Creates builds.
#[derive(Debug, Clone)]
pub struct BuildLauncher {
    collab: Collaborators,
    chain: Arc<InterceptorChain>,
    config: Arc<BuildCoreConfig>,
}

impl BuildLauncher {
    /// Creates a launcher.
    pub fn new(collab: Collaborators, chain: Arc<InterceptorChain>, config: Arc<BuildCoreConfig>) -> Self {
        Self { collab, chain, config }
    }

    /// Launches a build and returns its id.
    ///
    /// A throttled launch holds the pipeline's rate token for the duration
    /// of the call and releases it on every exit path. Nothing is created
    /// when throttling, quality rules or an interceptor reject the launch.
    pub async fn start(&self, request: LaunchRequest) -> Result<String> {
        let started = Instant::now();
        let throttle = self.acquire_throttle(&request).await?;

        let result = self.launch(request, started).await;

        if let Some(guard) = throttle {
            guard.release().await;
        }
        result
    }

    async fn acquire_throttle(&self, request: &LaunchRequest) -> Result<Option<LeaseGuard>> {
        if !request.frequency_limit || self.config.launcher.is_exempt(request.channel) {
            return Ok(None);
        }

        let pipeline_id = &request.pipeline.pipeline_id;
        let lock = DistributedLock::new(
            self.collab.leases.clone(),
            rate_limit_key(pipeline_id),
            self.config.launcher.rate_limit_lock(),
        );
        match lock.try_acquire().await? {
            Some(guard) => Ok(Some(guard)),
            None => {
                warn!(pipeline_id = %pipeline_id, user = %request.user, "launch throttled");
                Err(BuildError::rate_limited(pipeline_id.clone()))
            }
        }
    }

    async fn launch(&self, request: LaunchRequest, started: Instant) -> Result<String> {
        let LaunchRequest {
            user,
            mut pipeline,
            start_type,
            mut params,
            channel,
            mobile,
            model,
            version_override,
            ..
        } = request;

        if let Some(version) = version_override {
            pipeline.version = version;
        }

        let model = self
            .collab
            .rule_filler
            .fill_rules(&pipeline.project_id, &pipeline.pipeline_id, &params, model)
            .await?;

        let verdict = self
            .chain
            .filter(&InterceptContext {
                pipeline: &pipeline,
                model: &model,
                start_type,
            })
            .await;
        if !verdict.ok {
            return Err(BuildError::rejected(verdict.status, verdict.message));
        }

        let persist_snapshot = !params.is_empty();

        let start_user_name = start_user_name(&params, start_type, &user);
        let stamps = [
            (ReservedKey::Version, Value::from(pipeline.version)),
            (ReservedKey::StartUserId, Value::from(user.as_str())),
            (ReservedKey::StartUserName, Value::from(start_user_name)),
            (ReservedKey::StartType, Value::from(start_type.as_str())),
            (ReservedKey::StartChannel, Value::from(channel.as_str())),
            (ReservedKey::StartMobile, Value::from(mobile)),
            (ReservedKey::PipelineName, Value::from(pipeline.pipeline_name.as_str())),
        ];
        for (key, value) in stamps {
            params.insert(key.as_str().to_string(), value);
        }

        let build_id = self.collab.runtime.start_build(&pipeline, &model, &params).await?;

        if persist_snapshot {
            self.persist_snapshot(&pipeline.project_id, &pipeline.pipeline_id, &build_id, &params)
                .await;
        }

        info!(
            pipeline_id = %pipeline.pipeline_id,
            build_id = %build_id,
            version = pipeline.version,
            start_type = %start_type,
            user = %user,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "build started"
        );
        Ok(build_id)
    }

    async fn persist_snapshot(&self, project_id: &str, pipeline_id: &str, build_id: &str, params: &ParamMap) {
        let json = match serde_json::to_string(params) {
            Ok(json) => json,
            Err(e) => {
                warn!(build_id = %build_id, error = %e, "failed to serialize start parameters");
                return;
            }
        };

        match self.collab.param_store.put(project_id, pipeline_id, build_id, &json).await {
            Ok(()) => debug!(build_id = %build_id, "start parameters persisted"),
            Err(e) => warn!(build_id = %build_id, error = %e, "failed to persist start parameters"),
        }
    }
}

/// Display identity of the starter.
fn start_user_name(params: &ParamMap, start_type: StartType, user: &str) -> String {
    let upstream = match start_type {
        StartType::Pipeline => params.get(ReservedKey::StartPipelineUserId.as_str()),
        StartType::WebHook => params.get(ReservedKey::StartWebhookUserId.as_str()),
        _ => None,
    };

    match upstream {
        Some(Value::String(name)) if !name.is_empty() => name.clone(),
        _ => user.to_string(),
    }
}
