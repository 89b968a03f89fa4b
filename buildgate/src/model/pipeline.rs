//! Pipeline model and stage traversal.

use super::{BuildFormProperty, Container, Element, ElementKind, ModelNode, TriggerKind};
use serde::{Deserialize, Serialize};

fn default_enabled() -> bool {
    true
}

/// A stage: containers that run in parallel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    /// Stage id.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Whether the stage is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Ordered containers.
    #[serde(default)]
    pub containers: Vec<Container>,
}

impl Stage {
    /// Creates an enabled, empty stage.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            enabled: true,
            containers: Vec::new(),
        }
    }

    /// Appends a container.
    #[must_use]
    pub fn with_container(mut self, container: Container) -> Self {
        self.containers.push(container);
        self
    }
}

impl ModelNode for Stage {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// A published, immutable pipeline definition at one version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineModel {
    /// Pipeline display name.
    pub name: String,
    /// Ordered stages, stage 0 is the trigger stage.
    pub stages: Vec<Stage>,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
}

impl PipelineModel {
    /// Creates a model from stages.
    #[must_use]
    pub fn new(name: impl Into<String>, stages: Vec<Stage>) -> Self {
        Self {
            name: name.into(),
            stages,
            desc: None,
        }
    }

    /// The trigger container: the first container of stage 0.
    #[must_use]
    pub fn trigger_container(&self) -> Option<&Container> {
        self.stages
            .first()
            .and_then(|stage| stage.containers.first())
            .filter(|container| container.is_trigger())
    }

    /// Mutable access to the trigger container.
    pub fn trigger_container_mut(&mut self) -> Option<&mut Container> {
        self.stages
            .first_mut()
            .and_then(|stage| stage.containers.first_mut())
            .filter(|container| container.is_trigger())
    }

    /// Declared start parameters.
    #[must_use]
    pub fn trigger_params(&self) -> &[BuildFormProperty] {
        self.trigger_container().map_or(&[][..], Container::params)
    }

    /// The first enabled trigger element of the given kind.
    #[must_use]
    pub fn enabled_trigger(&self, kind: TriggerKind) -> Option<&Element> {
        self.trigger_container()?
            .elements
            .iter()
            .find(|e| e.enabled && e.kind.trigger_kind() == Some(kind))
    }

    /// Returns `(can_element_skip, use_latest_parameters)` of the enabled
    /// manual trigger, if there is one.
    #[must_use]
    pub fn manual_trigger_settings(&self) -> Option<(bool, bool)> {
        match self.enabled_trigger(TriggerKind::Manual).map(|e| &e.kind) {
            Some(ElementKind::ManualTrigger {
                can_element_skip,
                use_latest_parameters,
            }) => Some((*can_element_skip, *use_latest_parameters)),
            _ => None,
        }
    }

    /// Stages after the trigger stage.
    pub fn executable_stages(&self) -> impl Iterator<Item = &Stage> {
        self.stages.iter().skip(1)
    }

    /// Every element outside the trigger stage, in execution order, with its
    /// owning stage and container.
    pub fn executable_elements(&self) -> impl Iterator<Item = (&Stage, &Container, &Element)> {
        self.executable_stages().flat_map(|stage| {
            stage.containers.iter().flat_map(move |container| {
                container
                    .elements
                    .iter()
                    .map(move |element| (stage, container, element))
            })
        })
    }

    /// Finds a container by id in any stage.
    #[must_use]
    pub fn find_container(&self, container_id: &str) -> Option<(&Stage, &Container)> {
        self.stages.iter().find_map(|stage| {
            stage
                .containers
                .iter()
                .find(|c| c.id == container_id)
                .map(|c| (stage, c))
        })
    }

    /// Finds an executable element by id.
    #[must_use]
    pub fn find_executable_element(&self, element_id: &str) -> Option<&Element> {
        self.executable_elements()
            .map(|(_, _, element)| element)
            .find(|element| element.id == element_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ModelFixture;

    #[test]
    fn test_trigger_container_and_params() {
        let model = ModelFixture::new("demo")
            .with_param(BuildFormProperty::new("env", serde_json::json!("prod")).required())
            .build();

        let trigger = model.trigger_container().unwrap();
        assert!(trigger.is_trigger());
        assert_eq!(model.trigger_params()[0].id, "env");
    }

    #[test]
    fn test_enabled_trigger_ignores_disabled() {
        let model = ModelFixture::new("demo").without_manual_trigger().build();
        assert!(model.enabled_trigger(TriggerKind::Manual).is_none());
        assert!(model.manual_trigger_settings().is_none());

        let model = ModelFixture::new("demo").with_remote_trigger().build();
        assert!(model.enabled_trigger(TriggerKind::Remote).is_some());
    }

    #[test]
    fn test_executable_elements_skip_trigger_stage() {
        let model = ModelFixture::new("demo")
            .with_job("job-1", &["t-1", "t-2"])
            .with_job("job-2", &["t-3"])
            .build();

        let ids: Vec<&str> = model
            .executable_elements()
            .map(|(_, _, e)| e.id.as_str())
            .collect();
        assert_eq!(ids, vec!["t-1", "t-2", "t-3"]);
        assert!(model.find_executable_element("manual").is_none());
        assert!(model.find_executable_element("t-3").is_some());
    }

}
