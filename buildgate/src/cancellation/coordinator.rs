//! Cancellation coordinator.
//!
//! User shutdown runs under the exclusive per-build lock. Service shutdown
//! climbs from a sub-pipeline build to the top of its parent chain, one
//! short-lived lock per build, and fails the root.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::build::{BuildInstance, BuildStatus, ChannelCode};
use crate::config::BuildCoreConfig;
use crate::errors::{ConflictError, NotFoundError, Result, ValidationError};
use crate::events::{ActionType, PipelineEvent};
use crate::lock::{build_lock_key, shutdown_lock_key, DistributedLock};
use crate::model::PipelineModel;
use crate::ports::Collaborators;

/// How a worker agent exited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerResult {
    /// Whether the agent exited cleanly.
    pub success: bool,
    /// Failure detail reported by the agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl WorkerResult {
    /// A clean exit.
    #[must_use]
    pub fn success() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    /// A failed exit.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }

    fn reason(&self) -> String {
        match (&self.message, self.success) {
            (Some(message), false) => format!("Worker agent of the job exited: {message}"),
            _ => "Worker agent of the job exited".to_string(),
        }
    }
}

enum ShutdownStep {
    Done,
    Ascend(String),
}

/// Stops builds.
#[derive(Debug, Clone)]
pub struct CancellationCoordinator {
    collab: Collaborators,
    config: Arc<BuildCoreConfig>,
}

impl CancellationCoordinator {
    /// Creates a coordinator.
    pub fn new(collab: Collaborators, config: Arc<BuildCoreConfig>) -> Self {
        Self { collab, config }
    }

    /// Cancels a build on a user's request.
    ///
    /// Repeating the request as the same user is a no-op; a build already
    /// cancelled by somebody else is a conflict. Missing pipelines, channel
    /// mismatches and finished builds are no-ops.
    pub async fn user_shutdown(
        &self,
        user: &str,
        project_id: &str,
        pipeline_id: &str,
        build_id: &str,
        channel: ChannelCode,
    ) -> Result<()> {
        let lock = DistributedLock::new(
            self.collab.leases.clone(),
            build_lock_key(build_id),
            self.config.locks.build_lock(),
        );
        let guard = lock.acquire().await?;

        let result = self
            .user_shutdown_locked(user, project_id, pipeline_id, build_id, channel)
            .await;

        guard.release().await;
        result
    }

    async fn user_shutdown_locked(
        &self,
        user: &str,
        project_id: &str,
        pipeline_id: &str,
        build_id: &str,
        channel: ChannelCode,
    ) -> Result<()> {
        if let Some(cancel_user) = self.collab.build_details.cancel_user(build_id).await? {
            if cancel_user == user {
                info!(build_id = %build_id, user = %user, "build already cancelled by the same user");
                return Ok(());
            }
            return Err(ConflictError::AlreadyCancelledByOther {
                build_id: build_id.to_string(),
                user: cancel_user,
            }
            .into());
        }

        let pipeline = self
            .collab
            .repository
            .get_pipeline_info(project_id, pipeline_id, Some(channel))
            .await?;
        match pipeline {
            Some(pipeline) if pipeline.channel == channel => {}
            _ => {
                warn!(pipeline_id = %pipeline_id, channel = %channel, "pipeline not found on channel, nothing to stop");
                return Ok(());
            }
        }

        let build = self
            .collab
            .runtime
            .get_build_info(build_id)
            .await?
            .ok_or_else(|| NotFoundError::build(build_id))?;

        if build.status.is_finished() {
            info!(build_id = %build_id, status = %build.status, "build already finished");
            return Ok(());
        }

        let model = self
            .collab
            .repository
            .get_model(pipeline_id, Some(build.version))
            .await?;
        self.write_termination_markers(user, project_id, build_id, model.as_ref())
            .await?;

        if let Err(e) = self
            .collab
            .runtime
            .cancel_build(project_id, pipeline_id, build_id, user, BuildStatus::Canceled)
            .await
        {
            warn!(build_id = %build_id, error = %e, "failed to cancel build");
        }
        if let Err(e) = self.collab.build_details.update_cancel_user(build_id, user).await {
            warn!(build_id = %build_id, error = %e, "failed to record cancel user");
        }

        info!(build_id = %build_id, pipeline_id = %pipeline_id, user = %user, "build cancelled by user");
        Ok(())
    }

    async fn write_termination_markers(
        &self,
        user: &str,
        project_id: &str,
        build_id: &str,
        model: Option<&PipelineModel>,
    ) -> Result<()> {
        let message = format!("Pipeline terminated by user, operator: {user}");
        let running = self.collab.runtime.get_running_tasks(project_id, build_id).await?;
        let logs = &self.collab.build_logs;

        let mut matched = 0usize;
        if let Some(model) = model {
            for task in &running {
                let Some((_, container, element)) = model
                    .executable_elements()
                    .find(|(_, _, element)| element.id == task.task_id)
                else {
                    continue;
                };

                logs.add_warn_line(build_id, &message, &task.task_id, &container.id, 1);
                logs.add_fold_end(
                    build_id,
                    &format!("{}-[{}]", element.name, task.task_id),
                    &task.task_id,
                    &container.id,
                    1,
                );
                matched += 1;
            }
        }

        if matched == 0 {
            logs.add_warn_line(build_id, &message, "", "", 1);
        }
        debug!(build_id = %build_id, tasks = matched, "termination markers written");
        Ok(())
    }

    /// Fails a build on behalf of the platform.
    ///
    /// A sub-pipeline build hands the shutdown to its parent, repeatedly,
    /// so the root of the chain is the one that fails. The climb is capped
    /// at the configured depth; exceeding it changes nothing. The channel is
    /// only recorded; platform shutdowns are not filtered by it.
    pub async fn service_shutdown(
        &self,
        project_id: &str,
        pipeline_id: &str,
        build_id: &str,
        channel: ChannelCode,
    ) -> Result<()> {
        info!(
            project_id = %project_id,
            pipeline_id = %pipeline_id,
            build_id = %build_id,
            channel = %channel,
            "service shutdown requested"
        );

        let max_depth = self.config.cancellation.max_parent_depth;
        let mut current = build_id.to_string();
        let mut depth = 0u32;

        loop {
            let lock = DistributedLock::new(
                self.collab.leases.clone(),
                shutdown_lock_key(&current),
                self.config.locks.shutdown_lock(),
            );
            let guard = lock.acquire().await?;
            let step = self.shutdown_step(&current).await;
            guard.release().await;

            match step? {
                ShutdownStep::Done => return Ok(()),
                ShutdownStep::Ascend(parent) => {
                    depth += 1;
                    if depth > max_depth {
                        warn!(build_id = %build_id, max_depth, "parent chain too deep, giving up");
                        return Err(ValidationError::ParentChainTooDeep {
                            build_id: build_id.to_string(),
                            max_depth,
                        }
                        .into());
                    }
                    debug!(build_id = %current, parent_build_id = %parent, "shutdown ascends to parent build");
                    current = parent;
                }
            }
        }
    }

    async fn shutdown_step(&self, build_id: &str) -> Result<ShutdownStep> {
        let Some(build) = self.collab.runtime.get_build_info(build_id).await? else {
            info!(build_id = %build_id, "build not found, nothing to stop");
            return Ok(ShutdownStep::Done);
        };

        if let Some(parent) = self.live_parent(&build).await? {
            return Ok(ShutdownStep::Ascend(parent));
        }

        if build.status.is_finished() {
            info!(build_id = %build_id, status = %build.status, "build already finished");
            return Ok(ShutdownStep::Done);
        }

        match self
            .collab
            .runtime
            .cancel_build(
                &build.project_id,
                &build.pipeline_id,
                build_id,
                &build.start_user,
                BuildStatus::Failed,
            )
            .await
        {
            Ok(()) => {
                info!(build_id = %build_id, "build failed by service shutdown");
                if let Err(e) = self
                    .collab
                    .build_details
                    .update_cancel_user(build_id, &build.start_user)
                    .await
                {
                    warn!(build_id = %build_id, error = %e, "failed to record cancel user");
                }
            }
            Err(e) => warn!(build_id = %build_id, error = %e, "service shutdown failed to stop build"),
        }
        Ok(ShutdownStep::Done)
    }

    async fn live_parent(&self, build: &BuildInstance) -> Result<Option<String>> {
        if !build.is_sub_pipeline() {
            return Ok(None);
        }
        let Some(parent_id) = build.parent_build_id.as_deref() else {
            return Ok(None);
        };
        Ok(self
            .collab
            .runtime
            .get_build_info(parent_id)
            .await?
            .map(|parent| parent.build_id))
    }

    /// Reports that a worker agent exited.
    ///
    /// For a running build, publishes a terminate event for the worker's
    /// container. Unknown builds and containers are ignored.
    pub async fn worker_build_finish(&self, build_id: &str, vm_seq_id: &str, result: &WorkerResult) -> Result<()> {
        let Some(build) = self.collab.runtime.get_build_info(build_id).await? else {
            debug!(build_id = %build_id, "worker finished for unknown build");
            return Ok(());
        };
        if build.status.is_finished() {
            info!(build_id = %build_id, status = %build.status, "build already finished");
            return Ok(());
        }

        let reason = result.reason();
        info!(build_id = %build_id, vm_seq_id = %vm_seq_id, success = result.success, "{}", reason);

        let Some(model) = self
            .collab
            .repository
            .get_model(&build.pipeline_id, Some(build.version))
            .await?
        else {
            warn!(build_id = %build_id, "worker build finish: model not found");
            return Ok(());
        };
        let Some((stage, container)) = model.find_container(vm_seq_id) else {
            warn!(build_id = %build_id, vm_seq_id = %vm_seq_id, "worker build finish: container not found");
            return Ok(());
        };

        self.collab.events.dispatch(PipelineEvent::ContainerTerminate {
            source: "worker_build_finish".to_string(),
            project_id: build.project_id.clone(),
            pipeline_id: build.pipeline_id.clone(),
            user_id: build.start_user.clone(),
            build_id: build_id.to_string(),
            stage_id: stage.id.clone(),
            container_id: vm_seq_id.to_string(),
            container_type: container.kind.class_type().to_string(),
            action: ActionType::Terminate,
            reason,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{PipelineInfo, RunningTask, StartType};
    use crate::errors::BuildError;
    use crate::testing::{ModelFixture, TestHarness};
    use pretty_assertions::assert_eq;

    fn setup() -> (TestHarness, String) {
        let harness = TestHarness::new();
        harness.publish(
            PipelineInfo::new("proj", "p-1", "demo", "alice"),
            ModelFixture::new("demo").with_job("job-1", &["t-1", "t-2"]).build(),
        );
        let build_id = harness.runtime.insert_build("p-1", 1, BuildStatus::Running);
        (harness, build_id)
    }

    fn coordinator(harness: &TestHarness) -> CancellationCoordinator {
        CancellationCoordinator::new(harness.collaborators(), Arc::new(BuildCoreConfig::default()))
    }

    #[tokio::test]
    async fn test_user_shutdown_cancels_and_marks_tasks() {
        let (harness, build_id) = setup();
        harness.runtime.set_running_tasks(
            &build_id,
            vec![RunningTask {
                task_id: "t-2".into(),
                container_id: "job-1".into(),
                status: "RUNNING".into(),
            }],
        );

        coordinator(&harness)
            .user_shutdown("bob", "proj", "p-1", &build_id, ChannelCode::Bs)
            .await
            .unwrap();

        assert_eq!(harness.runtime.build(&build_id).unwrap().status, BuildStatus::Canceled);
        assert_eq!(harness.build_details.get(&build_id).as_deref(), Some("bob"));

        let lines = harness.build_logs.lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].tag, "t-2");
        assert_eq!(lines[0].job_id, "job-1");
        assert!(lines[1].fold_end);
        assert!(lines[1].message.contains("[t-2]"));
        assert!(!harness.leases.is_held(&build_lock_key(&build_id)));
    }

    #[tokio::test]
    async fn test_user_shutdown_without_running_tasks_writes_one_line() {
        let (harness, build_id) = setup();
        coordinator(&harness)
            .user_shutdown("bob", "proj", "p-1", &build_id, ChannelCode::Bs)
            .await
            .unwrap();

        let lines = harness.build_logs.lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].tag, "");
    }

    #[tokio::test]
    async fn test_double_cancel() {
        let (harness, build_id) = setup();
        let coordinator = coordinator(&harness);

        coordinator
            .user_shutdown("bob", "proj", "p-1", &build_id, ChannelCode::Bs)
            .await
            .unwrap();
        coordinator
            .user_shutdown("bob", "proj", "p-1", &build_id, ChannelCode::Bs)
            .await
            .unwrap();
        assert_eq!(harness.runtime.cancellations().len(), 1);

        let err = coordinator
            .user_shutdown("carol", "proj", "p-1", &build_id, ChannelCode::Bs)
            .await
            .unwrap_err();
        match err {
            BuildError::Conflict(ConflictError::AlreadyCancelledByOther { user, .. }) => assert_eq!(user, "bob"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_user_shutdown_no_ops() {
        let (harness, build_id) = setup();
        let coordinator = coordinator(&harness);

        coordinator
            .user_shutdown("bob", "proj", "p-1", &build_id, ChannelCode::Am)
            .await
            .unwrap();
        coordinator
            .user_shutdown("bob", "proj", "p-missing", &build_id, ChannelCode::Bs)
            .await
            .unwrap();

        harness.runtime.set_status(&build_id, BuildStatus::Succeed);
        coordinator
            .user_shutdown("bob", "proj", "p-1", &build_id, ChannelCode::Bs)
            .await
            .unwrap();

        assert!(harness.runtime.cancellations().is_empty());
        assert!(harness.build_details.get(&build_id).is_none());

        let err = coordinator
            .user_shutdown("bob", "proj", "p-1", "b-missing", ChannelCode::Bs)
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_user_shutdown_swallows_cancel_failure() {
        let (harness, build_id) = setup();
        harness.runtime.fail_cancels(true);

        coordinator(&harness)
            .user_shutdown("bob", "proj", "p-1", &build_id, ChannelCode::Bs)
            .await
            .unwrap();
        assert_eq!(harness.build_details.get(&build_id).as_deref(), Some("bob"));
    }

    fn chain(harness: &TestHarness, levels: usize) -> Vec<String> {
        let mut ids = vec![harness.runtime.insert_build("p-1", 1, BuildStatus::Running)];
        for _ in 1..levels {
            let parent = ids.last().cloned().unwrap_or_default();
            ids.push(harness.runtime.insert_sub_build("p-1", &parent, "sub-task"));
        }
        ids
    }

    #[tokio::test]
    async fn test_service_shutdown_fails_root_of_chain() {
        let (harness, _) = setup();
        let ids = chain(&harness, 3);

        coordinator(&harness)
            .service_shutdown("proj", "p-1", &ids[2], ChannelCode::Bs)
            .await
            .unwrap();

        assert_eq!(harness.runtime.build(&ids[0]).unwrap().status, BuildStatus::Failed);
        assert_eq!(harness.runtime.build(&ids[1]).unwrap().status, BuildStatus::Running);
        assert_eq!(harness.runtime.build(&ids[2]).unwrap().status, BuildStatus::Running);

        let cancellations = harness.runtime.cancellations();
        assert_eq!(cancellations.len(), 1);
        assert_eq!(cancellations[0].user, "alice");
        assert_eq!(harness.build_details.get(&ids[0]).as_deref(), Some("alice"));
        assert_eq!(harness.build_details.get(&ids[2]), None);
    }

    #[tokio::test]
    async fn test_service_shutdown_ignores_channel() {
        let (harness, build_id) = setup();

        coordinator(&harness)
            .service_shutdown("proj", "p-1", &build_id, ChannelCode::Am)
            .await
            .unwrap();

        assert_eq!(harness.runtime.build(&build_id).unwrap().status, BuildStatus::Failed);
        assert_eq!(harness.build_details.get(&build_id).as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_service_shutdown_depth_cap() {
        let (harness, _) = setup();
        let ids = chain(&harness, 4);
        let coordinator = CancellationCoordinator::new(
            harness.collaborators(),
            Arc::new(BuildCoreConfig::default().with_max_parent_depth(2)),
        );

        let err = coordinator
            .service_shutdown("proj", "p-1", &ids[3], ChannelCode::Bs)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BuildError::Validation(ValidationError::ParentChainTooDeep { max_depth: 2, .. })
        ));
        assert!(harness.runtime.cancellations().is_empty());
    }

    #[tokio::test]
    async fn test_service_shutdown_of_finished_or_missing_build() {
        let (harness, build_id) = setup();
        harness.runtime.set_status(&build_id, BuildStatus::Succeed);
        let coordinator = coordinator(&harness);

        coordinator
            .service_shutdown("proj", "p-1", &build_id, ChannelCode::Bs)
            .await
            .unwrap();
        coordinator
            .service_shutdown("proj", "p-1", "b-missing", ChannelCode::Bs)
            .await
            .unwrap();
        assert!(harness.runtime.cancellations().is_empty());
    }

    #[tokio::test]
    async fn test_orphaned_sub_build_fails_itself() {
        let (harness, _) = setup();
        let orphan = harness.runtime.insert_sub_build("p-1", "b-gone", "sub-task");
        assert_eq!(harness.runtime.build(&orphan).unwrap().trigger, StartType::Pipeline);

        coordinator(&harness)
            .service_shutdown("proj", "p-1", &orphan, ChannelCode::Bs)
            .await
            .unwrap();
        assert_eq!(harness.runtime.build(&orphan).unwrap().status, BuildStatus::Failed);
    }

    #[tokio::test]
    async fn test_worker_build_finish_dispatches_terminate() {
        let (harness, build_id) = setup();
        let coordinator = coordinator(&harness);

        coordinator
            .worker_build_finish(&build_id, "job-1", &WorkerResult::failure("oom"))
            .await
            .unwrap();
        coordinator
            .worker_build_finish(&build_id, "job-unknown", &WorkerResult::success())
            .await
            .unwrap();
        coordinator
            .worker_build_finish("b-missing", "job-1", &WorkerResult::success())
            .await
            .unwrap();

        let events = harness.events.events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            PipelineEvent::ContainerTerminate {
                source,
                container_id,
                container_type,
                action,
                reason,
                ..
            } => {
                assert_eq!(source, "worker_build_finish");
                assert_eq!(container_id, "job-1");
                assert_eq!(container_type, "vmBuild");
                assert_eq!(*action, ActionType::Terminate);
                assert!(reason.ends_with("oom"));
            }
        }
    }
}
