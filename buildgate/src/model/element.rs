//! Containers and elements of the pipeline model.

use super::{BuildFormProperty, ModelNode};
use serde::{Deserialize, Serialize};

fn default_enabled() -> bool {
    true
}

/// Which kind of trigger an element represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerKind {
    /// Started by a user from the UI or API.
    Manual,
    /// Started by a remote call carrying a token.
    Remote,
    /// Started by a cron-like timer.
    Timer,
}

/// A parameter attached to a manual review element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualReviewParam {
    /// Parameter key.
    pub key: String,
    /// Parameter value, may contain `${var}` references.
    #[serde(default)]
    pub value: String,
    /// Whether the reviewer must fill the value.
    #[serde(default)]
    pub required: bool,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
}

impl ManualReviewParam {
    /// Creates a review parameter.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            required: false,
            desc: None,
        }
    }
}

/// The closed set of element kinds the orchestration core dispatches on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ElementKind {
    /// Manual start trigger.
    ManualTrigger {
        /// Whether users may skip elements when starting.
        #[serde(default)]
        can_element_skip: bool,
        /// Whether the start form pre-fills the last build's parameters.
        #[serde(default)]
        use_latest_parameters: bool,
    },
    /// Remote start trigger.
    RemoteTrigger {
        /// Token expected from remote callers.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        remote_token: Option<String>,
    },
    /// Timer trigger.
    TimerTrigger {
        /// Cron expression.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expression: Option<String>,
    },
    /// A task pausing the build until a reviewer decides.
    ManualReview {
        /// Reviewer tokens, each may contain `${var}` references and commas.
        #[serde(default)]
        review_users: Vec<String>,
        /// Description shown to reviewers.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        desc: Option<String>,
        /// Parameters reviewers may adjust.
        #[serde(default)]
        params: Vec<ManualReviewParam>,
    },
    /// A task launching another pipeline.
    SubPipeline {
        /// The pipeline to launch.
        sub_pipeline_id: String,
        /// Whether the parent waits for the child.
        #[serde(default)]
        asynchronous: bool,
    },
    /// Any other task executed by a worker.
    Task {
        /// The plugin code of the task.
        atom_code: String,
    },
}

impl ElementKind {
    /// Returns the trigger kind if this is a trigger element.
    #[must_use]
    pub fn trigger_kind(&self) -> Option<TriggerKind> {
        match self {
            Self::ManualTrigger { .. } => Some(TriggerKind::Manual),
            Self::RemoteTrigger { .. } => Some(TriggerKind::Remote),
            Self::TimerTrigger { .. } => Some(TriggerKind::Timer),
            Self::ManualReview { .. } | Self::SubPipeline { .. } | Self::Task { .. } => None,
        }
    }
}

/// A single task of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    /// Element id.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Whether the element is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// What the element does.
    #[serde(flatten)]
    pub kind: ElementKind,
}

impl Element {
    /// Creates an enabled element.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: ElementKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            enabled: true,
            kind,
        }
    }

    /// Disables the element.
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

impl ModelNode for Element {
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

/// What a container is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContainerKind {
    /// The trigger container of stage 0.
    Trigger {
        /// Declared start parameters.
        #[serde(default)]
        params: Vec<BuildFormProperty>,
    },
    /// A job running on a build machine.
    Vm {
        /// Requested operating system.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        base_os: Option<String>,
    },
    /// A job running without a build machine.
    Normal,
}

impl ContainerKind {
    /// Type name reported in lifecycle events.
    #[must_use]
    pub fn class_type(&self) -> &'static str {
        match self {
            Self::Trigger { .. } => "trigger",
            Self::Vm { .. } => "vmBuild",
            Self::Normal => "normal",
        }
    }
}

/// A job: an ordered list of elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    /// Container id.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Whether the container is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// What the container is.
    pub kind: ContainerKind,
    /// Ordered elements.
    #[serde(default)]
    pub elements: Vec<Element>,
}

impl Container {
    /// Creates an enabled container.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: ContainerKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            enabled: true,
            kind,
            elements: Vec::new(),
        }
    }

    /// Appends an element.
    #[must_use]
    pub fn with_element(mut self, element: Element) -> Self {
        self.elements.push(element);
        self
    }

    /// Declared start parameters, empty unless this is the trigger container.
    #[must_use]
    pub fn params(&self) -> &[BuildFormProperty] {
        match &self.kind {
            ContainerKind::Trigger { params } => params,
            ContainerKind::Vm { .. } | ContainerKind::Normal => &[],
        }
    }

    /// Mutable access to the declared start parameters.
    pub fn params_mut(&mut self) -> Option<&mut Vec<BuildFormProperty>> {
        match &mut self.kind {
            ContainerKind::Trigger { params } => Some(params),
            ContainerKind::Vm { .. } | ContainerKind::Normal => None,
        }
    }

    /// Returns true for the trigger container.
    #[must_use]
    pub fn is_trigger(&self) -> bool {
        matches!(self.kind, ContainerKind::Trigger { .. })
    }
}

impl ModelNode for Container {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_deserializes_flattened_kind() {
        let json = serde_json::json!({
            "id": "e-1",
            "name": "Review",
            "type": "manual_review",
            "review_users": ["${approvers}", "bob"],
            "desc": "release ${version}"
        });

        let element: Element = serde_json::from_value(json).unwrap();
        assert!(element.enabled);
        match element.kind {
            ElementKind::ManualReview { review_users, desc, params } => {
                assert_eq!(review_users, vec!["${approvers}", "bob"]);
                assert_eq!(desc.as_deref(), Some("release ${version}"));
                assert!(params.is_empty());
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn test_trigger_kind_dispatch() {
        let manual = ElementKind::ManualTrigger {
            can_element_skip: false,
            use_latest_parameters: false,
        };
        let task = ElementKind::Task { atom_code: "shell".into() };

        assert_eq!(manual.trigger_kind(), Some(TriggerKind::Manual));
        assert_eq!(task.trigger_kind(), None);
    }

    #[test]
    fn test_params_only_on_trigger_container() {
        let trigger = Container::new(
            "0",
            "trigger",
            ContainerKind::Trigger {
                params: vec![BuildFormProperty::new("env", serde_json::json!("prod"))],
            },
        );
        let job = Container::new("1", "job", ContainerKind::Normal);

        assert_eq!(trigger.params().len(), 1);
        assert!(job.params().is_empty());
        assert_eq!(ContainerKind::Vm { base_os: None }.class_type(), "vmBuild");
    }
}
