//! Model fixtures and the collaborator harness.

use std::sync::Arc;

use super::mocks::{
    AllowAllPermissions, InMemoryBuildDetailStore, InMemoryBuildRuntime, InMemoryPipelineRepository,
    InMemoryStartupParamStore, RecordingLogSink,
};
use crate::build::PipelineInfo;
use crate::events::CollectingEventDispatcher;
use crate::lock::InMemoryLeaseStore;
use crate::model::{
    BuildFormProperty, Container, ContainerKind, Element, ElementKind, ManualReviewParam, PipelineModel, Stage,
};
use crate::ports::{Collaborators, PassThroughRuleFiller, PermissionService};

/// Builder of pipeline models for tests.
///
/// The trigger stage holds container `"0"` with an enabled manual trigger
/// element `"manual"`. Every job is placed in a stage of its own.
#[derive(Debug, Clone)]
pub struct ModelFixture {
    name: String,
    params: Vec<BuildFormProperty>,
    manual_enabled: bool,
    can_element_skip: bool,
    use_latest_parameters: bool,
    remote: bool,
    timer: bool,
    stages: Vec<Stage>,
}

impl ModelFixture {
    /// Creates a fixture with only the trigger stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            manual_enabled: true,
            can_element_skip: false,
            use_latest_parameters: false,
            remote: false,
            timer: false,
            stages: Vec::new(),
        }
    }

    /// Declares a start parameter.
    #[must_use]
    pub fn with_param(mut self, param: BuildFormProperty) -> Self {
        self.params.push(param);
        self
    }

    /// Disables the manual trigger element.
    #[must_use]
    pub fn without_manual_trigger(mut self) -> Self {
        self.manual_enabled = false;
        self
    }

    /// Lets users skip elements on manual start.
    #[must_use]
    pub fn with_element_skip(mut self) -> Self {
        self.can_element_skip = true;
        self
    }

    /// Pre-fills the start form from the last completed build.
    #[must_use]
    pub fn with_latest_parameters(mut self) -> Self {
        self.use_latest_parameters = true;
        self
    }

    /// Adds an enabled remote trigger element `"remote"`.
    #[must_use]
    pub fn with_remote_trigger(mut self) -> Self {
        self.remote = true;
        self
    }

    /// Adds an enabled timer trigger element `"timer"`.
    #[must_use]
    pub fn with_timer_trigger(mut self) -> Self {
        self.timer = true;
        self
    }

    fn push_stage(&mut self, container: Container) {
        let id = format!("stage-{}", self.stages.len() + 2);
        self.stages.push(Stage::new(id.clone(), id).with_container(container));
    }

    /// Adds a job running `element_ids` as plain tasks.
    #[must_use]
    pub fn with_job(mut self, container_id: &str, element_ids: &[&str]) -> Self {
        let container = element_ids.iter().fold(
            Container::new(container_id, container_id, ContainerKind::Vm { base_os: None }),
            |container, id| {
                container.with_element(Element::new(
                    *id,
                    format!("Task {id}"),
                    ElementKind::Task {
                        atom_code: "run".to_string(),
                    },
                ))
            },
        );
        self.push_stage(container);
        self
    }

    /// Adds a job without elements.
    #[must_use]
    pub fn with_empty_job(mut self, container_id: &str) -> Self {
        self.push_stage(Container::new(container_id, container_id, ContainerKind::Vm { base_os: None }));
        self
    }

    /// Adds a job holding one manual review element.
    #[must_use]
    pub fn with_review(
        mut self,
        container_id: &str,
        element_id: &str,
        reviewers: &[&str],
        desc: Option<&str>,
        params: Vec<ManualReviewParam>,
    ) -> Self {
        let element = Element::new(
            element_id,
            "Review",
            ElementKind::ManualReview {
                review_users: reviewers.iter().map(|r| (*r).to_string()).collect(),
                desc: desc.map(String::from),
                params,
            },
        );
        self.push_stage(Container::new(container_id, container_id, ContainerKind::Normal).with_element(element));
        self
    }

    /// Adds a job holding one sub-pipeline element.
    #[must_use]
    pub fn with_sub_pipeline(mut self, container_id: &str, element_id: &str, sub_pipeline_id: &str) -> Self {
        let element = Element::new(
            element_id,
            "Sub pipeline",
            ElementKind::SubPipeline {
                sub_pipeline_id: sub_pipeline_id.to_string(),
                asynchronous: false,
            },
        );
        self.push_stage(Container::new(container_id, container_id, ContainerKind::Normal).with_element(element));
        self
    }

    /// Builds the model.
    #[must_use]
    pub fn build(self) -> PipelineModel {
        let mut manual = Element::new(
            "manual",
            "Manual",
            ElementKind::ManualTrigger {
                can_element_skip: self.can_element_skip,
                use_latest_parameters: self.use_latest_parameters,
            },
        );
        if !self.manual_enabled {
            manual = manual.disabled();
        }

        let mut trigger = Container::new("0", "Trigger", ContainerKind::Trigger { params: self.params }).with_element(manual);
        if self.remote {
            trigger = trigger.with_element(Element::new(
                "remote",
                "Remote",
                ElementKind::RemoteTrigger { remote_token: None },
            ));
        }
        if self.timer {
            trigger = trigger.with_element(Element::new(
                "timer",
                "Timer",
                ElementKind::TimerTrigger {
                    expression: Some("0 0 2 * * ?".to_string()),
                },
            ));
        }

        let mut stages = vec![Stage::new("stage-1", "Trigger").with_container(trigger)];
        stages.extend(self.stages);
        PipelineModel::new(self.name, stages)
    }
}

/// In-memory collaborators with handles for inspection.
#[derive(Clone)]
pub struct TestHarness {
    /// Pipelines and models.
    pub repository: Arc<InMemoryPipelineRepository>,
    /// Builds and engine calls.
    pub runtime: Arc<InMemoryBuildRuntime>,
    /// Parameter snapshots.
    pub param_store: Arc<InMemoryStartupParamStore>,
    /// Cancel users.
    pub build_details: Arc<InMemoryBuildDetailStore>,
    /// Build log markers.
    pub build_logs: Arc<RecordingLogSink>,
    /// Dispatched events.
    pub events: Arc<CollectingEventDispatcher>,
    /// Leases.
    pub leases: Arc<InMemoryLeaseStore>,
    permissions: Arc<dyn PermissionService>,
}

impl std::fmt::Debug for TestHarness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestHarness").finish_non_exhaustive()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    /// Creates a harness granting every permission.
    #[must_use]
    pub fn new() -> Self {
        Self {
            repository: Arc::new(InMemoryPipelineRepository::new()),
            runtime: Arc::new(InMemoryBuildRuntime::new()),
            param_store: Arc::new(InMemoryStartupParamStore::new()),
            build_details: Arc::new(InMemoryBuildDetailStore::new()),
            build_logs: Arc::new(RecordingLogSink::new()),
            events: Arc::new(CollectingEventDispatcher::new()),
            leases: Arc::new(InMemoryLeaseStore::new()),
            permissions: Arc::new(AllowAllPermissions),
        }
    }

    /// Replaces the permission service.
    #[must_use]
    pub fn with_permissions(mut self, permissions: Arc<dyn PermissionService>) -> Self {
        self.permissions = permissions;
        self
    }

    /// Publishes a pipeline and its model.
    pub fn publish(&self, info: PipelineInfo, model: PipelineModel) {
        self.repository.publish(info, model);
    }

    /// Wires the collaborators.
    #[must_use]
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            repository: self.repository.clone(),
            runtime: self.runtime.clone(),
            param_store: self.param_store.clone(),
            build_details: self.build_details.clone(),
            permissions: self.permissions.clone(),
            rule_filler: Arc::new(PassThroughRuleFiller),
            build_logs: self.build_logs.clone(),
            events: self.events.clone(),
            leases: self.leases.clone(),
        }
    }
}
