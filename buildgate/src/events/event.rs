//! Event payloads.

use serde::{Deserialize, Serialize};

/// What the engine should do with the target of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    /// Start the target.
    Start,
    /// Refresh the target's state.
    Refresh,
    /// Stop the target at the user's request.
    End,
    /// Stop the target because its worker went away.
    Terminate,
}

impl ActionType {
    /// Returns true for the stopping actions.
    #[must_use]
    pub fn is_end(self) -> bool {
        matches!(self, Self::End | Self::Terminate)
    }
}

/// An event on the pipeline bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A container's worker exited; the engine should settle the container.
    ContainerTerminate {
        /// Component that produced the event.
        source: String,
        /// Owning project.
        project_id: String,
        /// Pipeline id.
        pipeline_id: String,
        /// User the action is attributed to.
        user_id: String,
        /// Build id.
        build_id: String,
        /// Stage holding the container.
        stage_id: String,
        /// Container id.
        container_id: String,
        /// Container class, e.g. `vmBuild`.
        container_type: String,
        /// Requested action.
        action: ActionType,
        /// Human-readable reason.
        reason: String,
    },
}

impl PipelineEvent {
    /// Dotted event type name used in logs.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ContainerTerminate { .. } => "container.terminate",
        }
    }

    /// Build the event belongs to.
    #[must_use]
    pub fn build_id(&self) -> &str {
        match self {
            Self::ContainerTerminate { build_id, .. } => build_id,
        }
    }

    /// JSON view of the event.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terminate() -> PipelineEvent {
        PipelineEvent::ContainerTerminate {
            source: "worker_build_finish".into(),
            project_id: "proj".into(),
            pipeline_id: "p-1".into(),
            user_id: "alice".into(),
            build_id: "b-1".into(),
            stage_id: "stage-2".into(),
            container_id: "1".into(),
            container_type: "vmBuild".into(),
            action: ActionType::Terminate,
            reason: "worker exited".into(),
        }
    }

    #[test]
    fn test_accessors() {
        let event = terminate();
        assert_eq!(event.event_type(), "container.terminate");
        assert_eq!(event.build_id(), "b-1");
        assert!(ActionType::Terminate.is_end());
        assert!(!ActionType::Start.is_end());
    }

    #[test]
    fn test_json_shape() {
        let json = terminate().to_json();
        assert_eq!(json["event"], "container_terminate");
        assert_eq!(json["action"], "TERMINATE");
        assert_eq!(json["container_type"], "vmBuild");
    }
}
