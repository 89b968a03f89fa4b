//! In-memory collaborators.

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use uuid::Uuid;

use crate::build::{
    BuildInstance, BuildStatus, ChannelCode, ParamMap, PipelineInfo, ReservedKey, RunningTask, StartType,
};
use crate::errors::Result;
use crate::interceptors::{InterceptContext, InterceptResult, LaunchInterceptor};
use crate::model::PipelineModel;
use crate::ports::{
    BuildDetailStore, BuildLogSink, BuildRuntime, Permission, PermissionService, PipelineRepository,
    StartupParamStore,
};
use crate::review::ReviewRequest;

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn param_str<'a>(params: &'a ParamMap, key: ReservedKey) -> Option<&'a str> {
    params.get(key.as_str()).and_then(Value::as_str)
}

/// Pipelines and their published models.
#[derive(Debug, Default)]
pub struct InMemoryPipelineRepository {
    pipelines: DashMap<String, PipelineInfo>,
    models: DashMap<(String, u32), PipelineModel>,
}

impl InMemoryPipelineRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `model` as the pipeline's current version.
    pub fn publish(&self, info: PipelineInfo, model: PipelineModel) {
        self.models.insert((info.pipeline_id.clone(), info.version), model);
        self.pipelines.insert(info.pipeline_id.clone(), info);
    }
}

#[async_trait]
impl PipelineRepository for InMemoryPipelineRepository {
    async fn get_pipeline_info(
        &self,
        project_id: &str,
        pipeline_id: &str,
        channel: Option<ChannelCode>,
    ) -> Result<Option<PipelineInfo>> {
        Ok(self
            .pipelines
            .get(pipeline_id)
            .map(|info| info.clone())
            .filter(|info| info.project_id == project_id)
            .filter(|info| channel.map_or(true, |channel| info.channel == channel)))
    }

    async fn get_model(&self, pipeline_id: &str, version: Option<u32>) -> Result<Option<PipelineModel>> {
        let version = match version {
            Some(version) => version,
            None => match self.pipelines.get(pipeline_id) {
                Some(info) => info.version,
                None => return Ok(None),
            },
        };
        Ok(self
            .models
            .get(&(pipeline_id.to_string(), version))
            .map(|model| model.clone()))
    }
}

/// A decision forwarded to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewDecision {
    /// Build id.
    pub build_id: String,
    /// Review element id.
    pub element_id: String,
    /// Deciding user.
    pub user: String,
    /// The forwarded request.
    pub request: ReviewRequest,
}

/// A cancel applied to a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelRecord {
    /// Build id.
    pub build_id: String,
    /// User the cancel is attributed to.
    pub user: String,
    /// Terminal status applied.
    pub status: BuildStatus,
}

/// Build records and engine calls, kept in memory.
#[derive(Debug, Default)]
pub struct InMemoryBuildRuntime {
    builds: DashMap<String, BuildInstance>,
    launched: DashMap<String, ParamMap>,
    variables: DashMap<String, HashMap<String, String>>,
    running: DashMap<String, Vec<RunningTask>>,
    decisions: Mutex<Vec<ReviewDecision>>,
    cancellations: Mutex<Vec<CancelRecord>>,
    sub_build_links: Mutex<Vec<(String, String, String)>>,
    fail_cancels: AtomicBool,
}

impl InMemoryBuildRuntime {
    /// Creates an empty runtime.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_build_id() -> String {
        format!("b-{}", Uuid::new_v4().simple())
    }

    /// Inserts a manually started build of project `proj` run by `alice`.
    pub fn insert_build(&self, pipeline_id: &str, version: u32, status: BuildStatus) -> String {
        let build_id = Self::next_build_id();
        self.insert(BuildInstance {
            build_id: build_id.clone(),
            project_id: "proj".to_string(),
            pipeline_id: pipeline_id.to_string(),
            version,
            status,
            start_user: "alice".to_string(),
            trigger: StartType::Manual,
            parent_build_id: None,
            parent_task_id: None,
            retry_count: 0,
            queue_time: Utc::now(),
            start_time: None,
            end_time: None,
        });
        build_id
    }

    /// Inserts a running sub-pipeline build launched by `parent_task_id` of
    /// `parent_build_id`.
    pub fn insert_sub_build(&self, pipeline_id: &str, parent_build_id: &str, parent_task_id: &str) -> String {
        let build_id = self.insert_build(pipeline_id, 1, BuildStatus::Running);
        if let Some(mut build) = self.builds.get_mut(&build_id) {
            build.trigger = StartType::Pipeline;
            build.parent_build_id = Some(parent_build_id.to_string());
            build.parent_task_id = Some(parent_task_id.to_string());
        }
        build_id
    }

    /// Inserts or replaces a build.
    pub fn insert(&self, build: BuildInstance) {
        self.builds.insert(build.build_id.clone(), build);
    }

    /// Returns a build.
    #[must_use]
    pub fn build(&self, build_id: &str) -> Option<BuildInstance> {
        self.builds.get(build_id).map(|b| b.clone())
    }

    /// Overrides a build's status.
    pub fn set_status(&self, build_id: &str, status: BuildStatus) {
        if let Some(mut build) = self.builds.get_mut(build_id) {
            build.status = status;
        }
    }

    /// Replaces a build's runtime variables.
    pub fn set_variables(&self, build_id: &str, variables: HashMap<String, String>) {
        self.variables.insert(build_id.to_string(), variables);
    }

    /// Replaces a build's running tasks.
    pub fn set_running_tasks(&self, build_id: &str, tasks: Vec<RunningTask>) {
        self.running.insert(build_id.to_string(), tasks);
    }

    /// Makes every `cancel_build` call fail.
    pub fn fail_cancels(&self, fail: bool) {
        self.fail_cancels.store(fail, Ordering::SeqCst);
    }

    /// The parameters a build was started with.
    #[must_use]
    pub fn launched(&self, build_id: &str) -> Option<ParamMap> {
        self.launched.get(build_id).map(|p| p.clone())
    }

    /// Number of builds created through `start_build`.
    #[must_use]
    pub fn start_count(&self) -> usize {
        self.launched.len()
    }

    /// Forwarded review decisions.
    #[must_use]
    pub fn decisions(&self) -> Vec<ReviewDecision> {
        self.decisions.lock().clone()
    }

    /// Applied cancels.
    #[must_use]
    pub fn cancellations(&self) -> Vec<CancelRecord> {
        self.cancellations.lock().clone()
    }

    /// Recorded `(build, task, sub_build)` links.
    #[must_use]
    pub fn sub_build_links(&self) -> Vec<(String, String, String)> {
        self.sub_build_links.lock().clone()
    }
}

#[async_trait]
impl BuildRuntime for InMemoryBuildRuntime {
    async fn get_build_info(&self, build_id: &str) -> Result<Option<BuildInstance>> {
        Ok(self.build(build_id))
    }

    async fn start_build(&self, pipeline: &PipelineInfo, _model: &PipelineModel, params: &ParamMap) -> Result<String> {
        let build_id = Self::next_build_id();

        let trigger = param_str(params, ReservedKey::StartType)
            .and_then(|t| t.parse().ok())
            .unwrap_or(StartType::Manual);
        let retry_count = params
            .get(ReservedKey::RetryCount.as_str())
            .and_then(|count| value_to_string(count).parse().ok())
            .unwrap_or(0);

        self.insert(BuildInstance {
            build_id: build_id.clone(),
            project_id: pipeline.project_id.clone(),
            pipeline_id: pipeline.pipeline_id.clone(),
            version: pipeline.version,
            status: BuildStatus::Queued,
            start_user: param_str(params, ReservedKey::StartUserId)
                .map_or_else(|| pipeline.last_modify_user.clone(), String::from),
            trigger,
            parent_build_id: param_str(params, ReservedKey::ParentBuildId).map(String::from),
            parent_task_id: param_str(params, ReservedKey::ParentBuildTaskId).map(String::from),
            retry_count,
            queue_time: Utc::now(),
            start_time: None,
            end_time: None,
        });

        let variables = params
            .iter()
            .map(|(key, value)| (key.clone(), value_to_string(value)))
            .collect();
        self.variables.insert(build_id.clone(), variables);
        self.launched.insert(build_id.clone(), params.clone());
        Ok(build_id)
    }

    async fn cancel_build(
        &self,
        _project_id: &str,
        _pipeline_id: &str,
        build_id: &str,
        user_id: &str,
        status: BuildStatus,
    ) -> Result<()> {
        if self.fail_cancels.load(Ordering::SeqCst) {
            return Err(anyhow!("engine unavailable").into());
        }
        if let Some(mut build) = self.builds.get_mut(build_id) {
            build.status = status;
            build.end_time = Some(Utc::now());
        }
        self.cancellations.lock().push(CancelRecord {
            build_id: build_id.to_string(),
            user: user_id.to_string(),
            status,
        });
        Ok(())
    }

    async fn get_all_variables(&self, build_id: &str) -> Result<HashMap<String, String>> {
        Ok(self.variables.get(build_id).map(|v| v.clone()).unwrap_or_default())
    }

    async fn get_last_completed_build(&self, pipeline_id: &str) -> Result<Option<BuildInstance>> {
        Ok(self
            .builds
            .iter()
            .filter(|b| b.pipeline_id == pipeline_id && b.status.is_finished())
            .max_by_key(|b| b.queue_time)
            .map(|b| b.clone()))
    }

    async fn manual_decide_task(
        &self,
        build_id: &str,
        element_id: &str,
        user_id: &str,
        request: &ReviewRequest,
    ) -> Result<()> {
        self.decisions.lock().push(ReviewDecision {
            build_id: build_id.to_string(),
            element_id: element_id.to_string(),
            user: user_id.to_string(),
            request: request.clone(),
        });
        Ok(())
    }

    async fn get_running_tasks(&self, _project_id: &str, build_id: &str) -> Result<Vec<RunningTask>> {
        Ok(self.running.get(build_id).map(|t| t.clone()).unwrap_or_default())
    }

    async fn update_task_sub_build_id(&self, build_id: &str, task_id: &str, sub_build_id: &str) -> Result<()> {
        self.sub_build_links
            .lock()
            .push((build_id.to_string(), task_id.to_string(), sub_build_id.to_string()));
        Ok(())
    }
}

/// Parameter snapshots, kept in memory.
#[derive(Debug, Default)]
pub struct InMemoryStartupParamStore {
    snapshots: DashMap<String, String>,
    fail_writes: AtomicBool,
}

impl InMemoryStartupParamStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a raw snapshot.
    pub fn insert(&self, build_id: &str, json: &str) {
        self.snapshots.insert(build_id.to_string(), json.to_string());
    }

    /// Parses a build's snapshot.
    #[must_use]
    pub fn snapshot(&self, build_id: &str) -> Option<ParamMap> {
        self.snapshots
            .get(build_id)
            .and_then(|json| serde_json::from_str(&json).ok())
    }

    /// Makes every `put` fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl StartupParamStore for InMemoryStartupParamStore {
    async fn get(&self, build_id: &str) -> Result<Option<String>> {
        Ok(self.snapshots.get(build_id).map(|json| json.clone()))
    }

    async fn put(&self, _project_id: &str, _pipeline_id: &str, build_id: &str, json: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("snapshot store unavailable").into());
        }
        self.insert(build_id, json);
        Ok(())
    }
}

/// Cancel-user attribution, kept in memory.
#[derive(Debug, Default)]
pub struct InMemoryBuildDetailStore {
    cancel_users: DashMap<String, String>,
}

impl InMemoryBuildDetailStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The recorded cancel user of a build.
    #[must_use]
    pub fn get(&self, build_id: &str) -> Option<String> {
        self.cancel_users.get(build_id).map(|u| u.clone())
    }
}

#[async_trait]
impl BuildDetailStore for InMemoryBuildDetailStore {
    async fn cancel_user(&self, build_id: &str) -> Result<Option<String>> {
        Ok(self.get(build_id))
    }

    async fn update_cancel_user(&self, build_id: &str, user_id: &str) -> Result<()> {
        self.cancel_users.insert(build_id.to_string(), user_id.to_string());
        Ok(())
    }
}

/// Grants every permission.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllPermissions;

#[async_trait]
impl PermissionService for AllowAllPermissions {
    async fn validate(&self, _user_id: &str, _project_id: &str, _pipeline_id: &str, _permission: Permission) -> Result<()> {
        Ok(())
    }
}

/// A build log marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    /// Build id.
    pub build_id: String,
    /// Line text, or the tag name of a fold end.
    pub message: String,
    /// Task tag.
    pub tag: String,
    /// Container id.
    pub job_id: String,
    /// Whether this closes a fold group.
    pub fold_end: bool,
}

/// Records build log markers.
#[derive(Debug, Default)]
pub struct RecordingLogSink {
    lines: Mutex<Vec<LogLine>>,
}

impl RecordingLogSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded markers.
    #[must_use]
    pub fn lines(&self) -> Vec<LogLine> {
        self.lines.lock().clone()
    }

    fn push(&self, build_id: &str, message: &str, tag: &str, job_id: &str, fold_end: bool) {
        self.lines.lock().push(LogLine {
            build_id: build_id.to_string(),
            message: message.to_string(),
            tag: tag.to_string(),
            job_id: job_id.to_string(),
            fold_end,
        });
    }
}

impl BuildLogSink for RecordingLogSink {
    fn add_warn_line(&self, build_id: &str, message: &str, tag: &str, job_id: &str, _execute_count: u32) {
        self.push(build_id, message, tag, job_id, false);
    }

    fn add_fold_end(&self, build_id: &str, tag_name: &str, tag: &str, job_id: &str, _execute_count: u32) {
        self.push(build_id, tag_name, tag, job_id, true);
    }
}

/// An interceptor that waits before letting the launch through.
#[derive(Debug, Clone)]
pub struct SlowInterceptor {
    delay: Duration,
}

impl SlowInterceptor {
    /// Creates an interceptor sleeping for `delay`.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl LaunchInterceptor for SlowInterceptor {
    fn name(&self) -> &str {
        "slow"
    }

    async fn intercept(&self, _ctx: &InterceptContext<'_>) -> InterceptResult {
        tokio::time::sleep(self.delay).await;
        InterceptResult::ok()
    }
}

/// An interceptor that always vetoes.
#[derive(Debug, Clone)]
pub struct RejectingInterceptor {
    status: i32,
    message: String,
}

impl RejectingInterceptor {
    /// Creates an interceptor rejecting with `status` and `message`.
    #[must_use]
    pub fn new(status: i32, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

#[async_trait]
impl LaunchInterceptor for RejectingInterceptor {
    fn name(&self) -> &str {
        "rejecting"
    }

    async fn intercept(&self, _ctx: &InterceptContext<'_>) -> InterceptResult {
        InterceptResult::reject(self.status, self.message.clone())
    }
}
